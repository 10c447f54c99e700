//! `inspect-take` command implementation.

use anyhow::{Context, Result};
use recorder::PlayerTake;
use serde::Serialize;
use tracing::info;

use crate::cli::InspectTakeArgs;
use crate::error::CliError;

#[derive(Serialize)]
struct TakeSummary {
    path: String,
    fps: f32,
    frames: usize,
    duration_secs: f32,
    points: usize,
    units: String,
    parameters: Vec<ParameterInfo>,
    streams: Vec<StreamInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    labels: Vec<LabelInfo>,
}

#[derive(Serialize)]
struct ParameterInfo {
    name: String,
    value: String,
}

#[derive(Serialize)]
struct StreamInfo {
    route: String,
    trackables: usize,
    /// Ticks in which at least one trackable of the stream is present
    present_frames: usize,
}

#[derive(Serialize)]
struct LabelInfo {
    label: String,
    description: String,
}

/// Execute the `inspect-take` command
pub fn run_inspect_take(args: &InspectTakeArgs) -> Result<()> {
    info!(take = %args.take.display(), "Inspecting take");

    let take = PlayerTake::load(&args.take).map_err(|e| CliError::take_load(&args.take, e))?;
    let summary = summarize(&take, args.labels);

    if args.json {
        let json =
            serde_json::to_string_pretty(&summary).context("Failed to serialize take summary")?;
        println!("{}", json);
    } else {
        print_summary(&summary);
    }
    Ok(())
}

fn summarize(take: &PlayerTake, with_labels: bool) -> TakeSummary {
    let container = take.container();

    let streams = take
        .templates()
        .map(|template| {
            let present_frames = container
                .frames
                .iter()
                .filter(|frame| {
                    template
                        .points
                        .iter()
                        .any(|&p| frame.get(p).is_some_and(|pos| !pos.is_nan()))
                })
                .count();
            StreamInfo {
                route: template.context().to_string(),
                trackables: template.trackables.len(),
                present_frames,
            }
        })
        .collect();

    let labels = if with_labels {
        container
            .labels
            .iter()
            .zip(&container.descriptions)
            .map(|(label, description)| LabelInfo {
                label: label.clone(),
                description: description.clone(),
            })
            .collect()
    } else {
        Vec::new()
    };

    TakeSummary {
        path: take.path().display().to_string(),
        fps: take.fps(),
        frames: take.frame_count(),
        duration_secs: take.duration_secs(),
        points: container.point_count(),
        units: container.units.clone(),
        parameters: container
            .parameters
            .iter()
            .map(|p| ParameterInfo {
                name: format!("{}:{}", p.group, p.name),
                value: p.value.clone(),
            })
            .collect(),
        streams,
        labels,
    }
}

fn print_summary(summary: &TakeSummary) {
    println!("=== Take: {} ===\n", summary.path);
    println!("  Rate: {} fps", summary.fps);
    println!("  Frames: {}", summary.frames);
    println!("  Duration: {:.2}s", summary.duration_secs);
    println!("  Points: {} ({})", summary.points, summary.units);

    if !summary.parameters.is_empty() {
        println!("\nParameters");
        for p in &summary.parameters {
            println!("  {} = {}", p.name, p.value);
        }
    }

    println!("\nStreams ({})", summary.streams.len());
    for s in &summary.streams {
        println!(
            "  {}: {} trackables, present in {}/{} frames",
            s.route, s.trackables, s.present_frames, summary.frames
        );
    }

    if !summary.labels.is_empty() {
        println!("\nLabels");
        for l in &summary.labels {
            println!("  {}  {}", l.label, l.description);
        }
    }

    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{Frame, Position, SystemType, Trackable, TrackableType};
    use recorder::{tagged, Take};
    use tempfile::tempdir;

    fn write_take(path: &std::path::Path) {
        let mut take = Take::new(path);
        for tick in 0..4 {
            let mut trackables = vec![Trackable::at(Position::new(tick as f32, 0.0, 0.0)).with_id(1)];
            if tick % 2 == 0 {
                trackables.push(Trackable::at(Position::new(0.0, 1.0, 0.0)).with_id(2));
            }
            take.append(
                SystemType::Null,
                30.0,
                tagged(SystemType::Null, TrackableType::Sample, Frame::new(trackables)),
            )
            .unwrap();
        }
        take.finish();
        take.into_container(|_| {}).unwrap().write(path).unwrap();
    }

    #[test]
    fn test_summary_counts_streams_and_presence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.c3d");
        write_take(&path);

        let take = PlayerTake::load(&path).unwrap();
        let summary = summarize(&take, true);
        assert_eq!(summary.frames, 4);
        assert_eq!(summary.points, 2);
        assert_eq!(summary.labels.len(), 2);
        assert_eq!(summary.streams.len(), 1);
        assert_eq!(summary.streams[0].route, "null/sample");
        assert_eq!(summary.streams[0].trackables, 2);
        assert_eq!(summary.streams[0].present_frames, 4);
        assert!(summary
            .parameters
            .iter()
            .any(|p| p.name == "MANUFACTURER:SOFTWARE"));
    }

    #[test]
    fn test_inspect_rejects_non_take() {
        let args = InspectTakeArgs {
            take: "notes.txt".into(),
            json: false,
            labels: false,
        };
        let err = run_inspect_take(&args).unwrap_err();
        assert!(err.to_string().contains("notes.txt"));
    }
}
