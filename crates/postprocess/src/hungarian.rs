//! Hungarian algorithm for minimum cost assignment
//!
//! Kuhn-Munkres with row/column potentials, O(n^2 m) for an n x m cost
//! matrix with n <= m. Wider-than-tall problems are transposed first.

use nalgebra::{DMatrix, Vector3};

/// Minimum cost assignment of rows to columns.
///
/// Returns, for every row, the assigned column. Every row gets a column
/// when `rows <= cols`; otherwise `cols` rows are assigned and the rest
/// are `None`.
pub fn minimize(cost: &DMatrix<f64>) -> Vec<Option<usize>> {
    let (rows, cols) = cost.shape();
    if rows == 0 || cols == 0 {
        return vec![None; rows];
    }
    if rows <= cols {
        return kuhn_munkres(cost).into_iter().map(Some).collect();
    }

    // Solve columns -> rows and invert
    let by_col = kuhn_munkres(&cost.transpose());
    let mut by_row = vec![None; rows];
    for (col, row) in by_col.into_iter().enumerate() {
        by_row[row] = Some(col);
    }
    by_row
}

/// Core solver, requires `rows <= cols`. Returns the column of each row.
fn kuhn_munkres(cost: &DMatrix<f64>) -> Vec<usize> {
    let (n, m) = cost.shape();
    debug_assert!(n <= m);

    // 1-based; index 0 is the virtual start column
    let mut u = vec![0.0f64; n + 1];
    let mut v = vec![0.0f64; m + 1];
    let mut owner = vec![0usize; m + 1];
    let mut way = vec![0usize; m + 1];

    for row in 1..=n {
        owner[0] = row;
        let mut col0 = 0usize;
        let mut min_v = vec![f64::INFINITY; m + 1];
        let mut used = vec![false; m + 1];

        loop {
            used[col0] = true;
            let row0 = owner[col0];
            let mut delta = f64::INFINITY;
            let mut col1 = 0usize;

            for col in 1..=m {
                if used[col] {
                    continue;
                }
                let reduced = cost[(row0 - 1, col - 1)] - u[row0] - v[col];
                if reduced < min_v[col] {
                    min_v[col] = reduced;
                    way[col] = col0;
                }
                if min_v[col] < delta {
                    delta = min_v[col];
                    col1 = col;
                }
            }

            for col in 0..=m {
                if used[col] {
                    u[owner[col]] += delta;
                    v[col] -= delta;
                } else {
                    min_v[col] -= delta;
                }
            }

            col0 = col1;
            if owner[col0] == 0 {
                break;
            }
        }

        // Augment along the alternating path
        loop {
            let prev = way[col0];
            owner[col0] = owner[prev];
            col0 = prev;
            if col0 == 0 {
                break;
            }
        }
    }

    let mut assignment = vec![0usize; n];
    for col in 1..=m {
        if owner[col] != 0 {
            assignment[owner[col] - 1] = col - 1;
        }
    }
    assignment
}

/// Match every `to` point to at most one `from` point.
///
/// Cost is Euclidean distance. Pairs farther apart than `radius` (or with
/// non-finite coordinates) are never matched. Among feasible assignments
/// the solver first maximizes the number of matches, then minimizes the
/// summed distance.
pub fn solve(from: &[Vector3<f32>], to: &[Vector3<f32>], radius: f32) -> Vec<Option<usize>> {
    if from.is_empty() || to.is_empty() {
        return vec![None; to.len()];
    }

    let radius = f64::from(radius);
    let gated = |t: &Vector3<f32>, f: &Vector3<f32>| -> Option<f64> {
        let d = f64::from((t - f).norm());
        (d.is_finite() && d <= radius).then_some(d)
    };

    // Any single feasible match must outweigh every feasible total
    let forbidden = radius * (to.len().min(from.len()) as f64 + 1.0) + 1.0;
    let cost = DMatrix::from_fn(to.len(), from.len(), |i, j| {
        gated(&to[i], &from[j]).unwrap_or(forbidden)
    });

    minimize(&cost)
        .into_iter()
        .enumerate()
        .map(|(i, j)| j.filter(|&j| gated(&to[i], &from[j]).is_some()))
        .collect()
}
