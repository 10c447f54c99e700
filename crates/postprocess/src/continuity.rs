//! Identity continuity across frames
//!
//! Samples of the previous processed frame (FROM) are matched to samples
//! of the current frame (TO) by position. A match records
//! `new key -> existing key` in the mapping table and rewrites the TO
//! trackable so it carries the existing identity.

use std::collections::{HashMap, HashSet};

use contracts::{ContinuityConfig, Frame, KeyType, MappingClass, Trackable, TrackableKey};
use nalgebra::Vector3;
use tracing::{debug, error, trace};

use crate::hungarian;

/// Position of a trackable as a solver vector
pub(crate) fn position_of(trackable: &Trackable) -> Vector3<f32> {
    let p = trackable.position;
    Vector3::new(p.x, p.y, p.z)
}

/// What one resolve pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ContinuityReport {
    /// TO samples matched to a FROM sample
    pub matched: usize,
    /// Matches skipped by permanent-key protection
    pub protected: usize,
    /// Mapping entries written
    pub mappings_written: usize,
    /// Fresh cuids handed to unmatched unidentifiable samples
    pub cuids_assigned: usize,
    /// Chains that hit the recursion limit
    pub recursion_exceeded: usize,
}

struct Sample {
    key: TrackableKey,
    index: usize,
    position: Vector3<f32>,
}

/// Hungarian-based identity continuity resolver
///
/// Owned by exactly one postprocessor worker; no internal locking.
pub struct ContinuityResolver {
    config: ContinuityConfig,
    temporary: Vec<KeyType>,
    permanent: Vec<KeyType>,
    mappings: HashMap<TrackableKey, TrackableKey>,
    previous: Vec<(TrackableKey, Vector3<f32>)>,
    next_cuid: u64,
}

impl ContinuityResolver {
    pub fn new(config: ContinuityConfig) -> Self {
        let temporary = KeyType::parse_list(&config.temporary_key_types);
        let permanent = KeyType::parse_list(&config.permanent_key_types);
        Self {
            config,
            temporary,
            permanent,
            mappings: HashMap::new(),
            previous: Vec::new(),
            next_cuid: 1,
        }
    }

    fn is_included(&self, key_type: KeyType, class: MappingClass) -> bool {
        let temporary = self.temporary.contains(&key_type);
        let permanent = self.permanent.contains(&key_type);
        match class {
            MappingClass::Temporary => temporary,
            MappingClass::Permanent => permanent,
            MappingClass::Both => temporary || permanent,
        }
    }

    fn is_permanent(&self, key: &TrackableKey) -> bool {
        self.permanent.contains(&key.key_type())
    }

    /// Current mapping table
    pub fn mappings(&self) -> &HashMap<TrackableKey, TrackableKey> {
        &self.mappings
    }

    /// Resolved identity for `key`, following the chain
    pub fn resolve_key(&self, key: &TrackableKey) -> TrackableKey {
        self.collapse(key.clone()).0
    }

    /// Follow mapping chain from `key`; the flag is true if the recursion
    /// limit stopped the walk before the end of the chain.
    fn collapse(&self, mut key: TrackableKey) -> (TrackableKey, bool) {
        let mut remaining = self.config.recursion_limit;
        while let Some(next) = self.mappings.get(&key) {
            if remaining == 0 {
                return (key, true);
            }
            key = next.clone();
            remaining -= 1;
        }
        (key, false)
    }

    /// Store `frame` as the FROM set of the next pass
    pub fn remember(&mut self, frame: &Frame) {
        self.previous.clear();
        self.previous.extend(
            frame
                .trackables
                .iter()
                .map(|t| (TrackableKey::derive(t), position_of(t))),
        );
    }

    /// Forget mappings and the previous frame
    pub fn reset(&mut self) {
        self.mappings.clear();
        self.previous.clear();
    }

    /// Match `frame` against the previous frame and rewrite identities
    /// in place.
    pub fn resolve(&mut self, frame: &mut Frame) -> ContinuityReport {
        let mut report = ContinuityReport::default();

        let mut from: Vec<Sample> = self
            .previous
            .iter()
            .enumerate()
            .filter(|(_, (key, _))| self.is_included(key.key_type(), self.config.mapping_from))
            .map(|(index, (key, position))| Sample {
                key: key.clone(),
                index,
                position: *position,
            })
            .collect();

        let mut to: Vec<Sample> = frame
            .trackables
            .iter()
            .enumerate()
            .filter_map(|(index, t)| {
                let key = TrackableKey::derive(t);
                let key_type = key.key_type();
                (key_type == KeyType::None || self.is_included(key_type, self.config.mapping_to))
                    .then(|| Sample {
                        key,
                        index,
                        position: position_of(t),
                    })
            })
            .collect();

        if self.config.remove_exact_matches {
            let to_keys: HashSet<TrackableKey> = to
                .iter()
                .filter(|s| !s.key.is_none())
                .map(|s| s.key.clone())
                .collect();
            let from_keys: HashSet<TrackableKey> = from.iter().map(|s| s.key.clone()).collect();
            from.retain(|s| !to_keys.contains(&s.key));
            to.retain(|s| s.key.is_none() || !from_keys.contains(&s.key));
        }

        let from_positions: Vec<Vector3<f32>> = from.iter().map(|s| s.position).collect();
        let to_positions: Vec<Vector3<f32>> = to.iter().map(|s| s.position).collect();
        let assignment = hungarian::solve(&from_positions, &to_positions, self.config.radius);

        let mut matched_indices = HashSet::new();
        for (sample, matched) in to.iter().zip(assignment) {
            let Some(from_idx) = matched else { continue };
            report.matched += 1;
            matched_indices.insert(sample.index);

            let (existing, exceeded) = self.collapse(from[from_idx].key.clone());
            if exceeded {
                report.recursion_exceeded += 1;
                metrics::counter!("rtls_key_mapping_recursion_exceeded_total").increment(1);
                error!(
                    key = %sample.key,
                    limit = self.config.recursion_limit,
                    "key mapping chain exceeded recursion limit"
                );
            }

            if existing == sample.key || existing.is_none() {
                continue;
            }
            if !self.config.allow_remapping_from_permanent && self.is_permanent(&sample.key) {
                report.protected += 1;
                trace!(key = %sample.key, "permanent key protected from remapping");
                continue;
            }
            if !self.config.allow_remapping_to_permanent && self.is_permanent(&existing) {
                report.protected += 1;
                trace!(key = %sample.key, existing = %existing, "remap onto permanent key refused");
                continue;
            }

            // Unidentifiable keys are shared by many samples, so they never
            // get a mapping entry of their own
            if !sample.key.is_none() {
                self.mappings.insert(sample.key.clone(), existing.clone());
                report.mappings_written += 1;
            }
            existing.reconcile(&mut frame.trackables[sample.index]);
        }

        if self.config.assign_cuid_to_unmatched {
            for sample in to.iter().filter(|s| s.key.is_none()) {
                if matched_indices.contains(&sample.index) {
                    continue;
                }
                let key = self.fresh_cuid();
                key.reconcile(&mut frame.trackables[sample.index]);
                report.cuids_assigned += 1;
            }
        }

        if report.matched > 0 || report.cuids_assigned > 0 {
            debug!(
                matched = report.matched,
                mappings = self.mappings.len(),
                cuids_assigned = report.cuids_assigned,
                "continuity resolved"
            );
        }
        report
    }

    fn fresh_cuid(&mut self) -> TrackableKey {
        let key = TrackableKey::from_parts(KeyType::Cuid, &format!("h{:015x}", self.next_cuid));
        self.next_cuid += 1;
        key
    }
}
