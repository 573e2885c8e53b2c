//! Progress band arithmetic shared by every worker.
//!
//! A job reports a single 0-100 percent. Each stage owns a sub-range (a
//! "band") of that scale and remaps its own 0-100 sub-progress into it.
//! The export pipeline splits its processing band evenly between the
//! enabled stages.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Bands
// ---------------------------------------------------------------------------

/// Highest percent a job may report before it is actually completed.
pub const MAX_IN_FLIGHT_PERCENT: i16 = 99;

/// A sub-range of the overall 0-100 progress scale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBand {
    pub start: f64,
    pub end: f64,
}

impl ProgressBand {
    pub const fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    /// Linearly remap a 0-100 sub-progress into this band.
    ///
    /// Out-of-range input is clamped so a misbehaving stage can never push
    /// progress outside its slice.
    pub fn map(&self, sub_percent: f64) -> f64 {
        let fraction = (sub_percent / 100.0).clamp(0.0, 1.0);
        self.start + (self.end - self.start) * fraction
    }

    /// Remap a step counter (`value` of `max`) into this band.
    pub fn map_steps(&self, value: i64, max: i64) -> f64 {
        self.map(step_percent(value, max))
    }

    pub fn width(&self) -> f64 {
        self.end - self.start
    }

    /// Split the band into `parts` consecutive equal sub-bands.
    pub fn split(&self, parts: usize) -> Vec<ProgressBand> {
        if parts == 0 {
            return Vec::new();
        }
        let step = self.width() / parts as f64;
        (0..parts)
            .map(|i| ProgressBand::new(self.start + step * i as f64, self.start + step * (i + 1) as f64))
            .collect()
    }
}

/// Convert a step counter into a 0-100 percent.
pub fn step_percent(value: i64, max: i64) -> f64 {
    if max <= 0 {
        return 0.0;
    }
    (value as f64 / max as f64 * 100.0).clamp(0.0, 100.0)
}

/// Round a fractional percent to the integer persisted on the job row,
/// clamped below 100 (100 is reserved for completion).
pub fn to_persisted_percent(percent: f64) -> i16 {
    (percent.floor() as i16).clamp(0, MAX_IN_FLIGHT_PERCENT)
}

// ---------------------------------------------------------------------------
// Generation milestones
// ---------------------------------------------------------------------------

/// Milestones for a single clip generation job.
pub mod generate {
    use super::ProgressBand;

    pub const STARTED: f64 = 2.0;
    pub const GRAPH_BUILT: f64 = 8.0;
    pub const SUBMITTED: f64 = 15.0;
    /// Inference phase of the job.
    pub const INFERENCE: ProgressBand = ProgressBand::new(15.0, 85.0);
    pub const DOWNLOADED: f64 = 88.0;
    pub const THUMBNAIL: f64 = 93.0;
    pub const DB_UPDATED: f64 = 97.0;
}

/// Milestones for single-pass media jobs (merge, upscale, interpolate).
pub mod media_pass {
    use super::ProgressBand;

    pub const STARTED: f64 = 5.0;
    pub const INPUTS_RESOLVED: f64 = 10.0;
    pub const PROCESSING: ProgressBand = ProgressBand::new(10.0, 85.0);
    pub const PROBED: f64 = 90.0;
    pub const THUMBNAIL: f64 = 94.0;
    pub const DB_UPDATED: f64 = 97.0;
}

/// Milestones for the long-video orchestrator.
pub mod long_video {
    use super::ProgressBand;

    pub const STARTED: f64 = 1.0;
    pub const REFERENCE_READY: f64 = 5.0;
    /// All segments share this band equally.
    pub const SEGMENTS: ProgressBand = ProgressBand::new(5.0, 85.0);
    pub const CONCATENATED: f64 = 88.0;
    pub const ENHANCE: ProgressBand = ProgressBand::new(88.0, 96.0);
    pub const DB_UPDATED: f64 = 98.0;
}

// ---------------------------------------------------------------------------
// Export stage weighting
// ---------------------------------------------------------------------------

/// Setup share of the export job before the processing band.
pub const EXPORT_SETUP_PERCENT: f64 = 10.0;
/// Processing band shared by the enabled export stages (80 points).
pub const EXPORT_PROCESSING_BAND: ProgressBand = ProgressBand::new(10.0, 90.0);
/// Thumbnail milestone after processing.
pub const EXPORT_THUMBNAIL_PERCENT: f64 = 94.0;
/// Database finalization milestone.
pub const EXPORT_DB_PERCENT: f64 = 98.0;

/// One stage of the export pipeline, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportStage {
    Merge,
    Upscale,
    Interpolate,
    Encode,
}

impl ExportStage {
    /// All stages in execution order.
    pub const ORDER: [ExportStage; 4] = [
        ExportStage::Merge,
        ExportStage::Upscale,
        ExportStage::Interpolate,
        ExportStage::Encode,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExportStage::Merge => "merge",
            ExportStage::Upscale => "upscale",
            ExportStage::Interpolate => "interpolate",
            ExportStage::Encode => "encode",
        }
    }
}

/// Progress allocation for a run of the export pipeline.
///
/// With `k` enabled stages each gets `80 / k` points of the processing band.
/// Stages run in [`ExportStage::ORDER`]; encode is always enabled.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<(ExportStage, ProgressBand)>,
}

impl StagePlan {
    /// Build a plan from the optional stage toggles. Encode is always added.
    pub fn new(merge: bool, upscale: bool, interpolate: bool) -> Self {
        let enabled: Vec<ExportStage> = ExportStage::ORDER
            .into_iter()
            .filter(|stage| match stage {
                ExportStage::Merge => merge,
                ExportStage::Upscale => upscale,
                ExportStage::Interpolate => interpolate,
                ExportStage::Encode => true,
            })
            .collect();
        let bands = EXPORT_PROCESSING_BAND.split(enabled.len());
        Self {
            stages: enabled.into_iter().zip(bands).collect(),
        }
    }

    /// Enabled stages with their bands, in execution order.
    pub fn stages(&self) -> &[(ExportStage, ProgressBand)] {
        &self.stages
    }

    /// Points allotted to each stage.
    pub fn per_stage_points(&self) -> f64 {
        EXPORT_PROCESSING_BAND.width() / self.stages.len() as f64
    }

    pub fn contains(&self, stage: ExportStage) -> bool {
        self.stages.iter().any(|(s, _)| *s == stage)
    }

    /// Overall percent for `stage` at the given sub-progress.
    pub fn overall(&self, stage: ExportStage, sub_percent: f64) -> Option<f64> {
        self.stages
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, band)| band.map(sub_percent))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
