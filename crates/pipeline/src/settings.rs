//! Typed views of the per-job-type `settings` payload.
//!
//! The payload is stored verbatim on the job row; handlers deserialize it
//! into these structs and validate it before touching any external
//! service.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use reelforge_core::ffmpeg::{EncodeSettings, Transition};
use reelforge_core::generation::{
    GenerationMode, GenerationParams, ModelId, DEFAULT_ADAPTER_WEIGHT, MAX_FRAME_COUNT,
};
use reelforge_core::resolution::{parse_resolution, scale_for_budget, ScaledResolution};
use reelforge_core::segments::{MAX_SEGMENTS, SEGMENT_CFG_SCALE, SEGMENT_STEPS};

use crate::error::PipelineError;

/// Longest allowed cross-fade between two clips.
pub const MAX_TRANSITION_SECS: f64 = 5.0;
/// Highest frame rate interpolation may target.
pub const MAX_TARGET_FPS: u32 = 120;
/// Largest accepted upscale factor.
pub const MAX_SCALE_FACTOR: f64 = 4.0;

/// Deserialize a job's settings payload.
pub fn parse<T: DeserializeOwned>(settings: &serde_json::Value) -> Result<T, PipelineError> {
    // An absent payload behaves like an empty object.
    if settings.is_null() {
        return Ok(serde_json::from_value(serde_json::json!({}))?);
    }
    Ok(serde_json::from_value(settings.clone())?)
}

// ---------------------------------------------------------------------------
// Generate
// ---------------------------------------------------------------------------

/// Options for a single clip generation. Prompt, seed and sampler settings
/// live on the clip row created at enqueue time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateSettings {
    #[serde(default)]
    pub frame_count: Option<u32>,
    #[serde(default)]
    pub denoise: Option<f64>,
}

// ---------------------------------------------------------------------------
// Media passes
// ---------------------------------------------------------------------------

fn default_transition_duration() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeSettings {
    #[serde(default)]
    pub transition: Transition,
    #[serde(default = "default_transition_duration")]
    pub transition_duration: f64,
}

impl Default for MergeSettings {
    fn default() -> Self {
        Self {
            transition: Transition::None,
            transition_duration: default_transition_duration(),
        }
    }
}

impl MergeSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.transition != Transition::None
            && !(self.transition_duration > 0.0 && self.transition_duration <= MAX_TRANSITION_SECS)
        {
            return Err(PipelineError::Validation(format!(
                "Transition duration must be in (0, {MAX_TRANSITION_SECS}] seconds (got {})",
                self.transition_duration
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UpscaleSettings {
    /// Defaults to the project's upscale multiplier.
    #[serde(default)]
    pub scale_factor: Option<f64>,
}

impl UpscaleSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self.scale_factor {
            Some(f) if !(f > 1.0 && f <= MAX_SCALE_FACTOR) => Err(PipelineError::Validation(
                format!("Scale factor must be in (1, {MAX_SCALE_FACTOR}] (got {f})"),
            )),
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InterpolateSettings {
    /// Defaults to the configured enhance frame rate.
    #[serde(default)]
    pub target_fps: Option<u32>,
}

impl InterpolateSettings {
    pub fn validate(&self) -> Result<(), PipelineError> {
        match self.target_fps {
            Some(fps) if fps == 0 || fps > MAX_TARGET_FPS => Err(PipelineError::Validation(
                format!("Target fps must be between 1 and {MAX_TARGET_FPS} (got {fps})"),
            )),
            _ => Ok(()),
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Stage toggles of the export pipeline. A present section enables its
/// stage; encode always runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportSettings {
    #[serde(default)]
    pub merge: Option<MergeSettings>,
    #[serde(default)]
    pub upscale: Option<UpscaleSettings>,
    #[serde(default)]
    pub interpolate: Option<InterpolateSettings>,
    #[serde(default)]
    pub encode: EncodeSettings,
}

impl ExportSettings {
    pub fn validate(&self, clip_count: usize) -> Result<(), PipelineError> {
        if clip_count == 0 {
            return Err(PipelineError::Validation(
                "Export needs at least one clip".to_string(),
            ));
        }
        if clip_count > 1 && self.merge.is_none() {
            return Err(PipelineError::Validation(
                "Exporting several clips requires the merge stage".to_string(),
            ));
        }
        if let Some(merge) = &self.merge {
            merge.validate()?;
        }
        if let Some(upscale) = &self.upscale {
            upscale.validate()?;
        }
        if let Some(interpolate) = &self.interpolate {
            interpolate.validate()?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Long video
// ---------------------------------------------------------------------------

fn default_long_video_model() -> ModelId {
    ModelId::Wan
}

fn default_denoise() -> f64 {
    1.0
}

/// Stands in for the conditioning image while checking a plan; the real
/// one is only known once the job runs.
const PLANNED_REFERENCE: &str = "planned_reference.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LongVideoSettings {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Local starting image; synthesized from the prompt when absent.
    #[serde(default)]
    pub reference_image: Option<String>,
    #[serde(default)]
    pub target_duration: Option<f64>,
    #[serde(default)]
    pub segment_count: Option<u32>,
    #[serde(default)]
    pub frames_per_segment: Option<u32>,
    #[serde(default = "default_long_video_model")]
    pub model: ModelId,
    #[serde(default = "default_denoise")]
    pub denoise: f64,
    #[serde(default)]
    pub enhance: bool,
    #[serde(default)]
    pub enhance_fps: Option<u32>,
}

impl LongVideoSettings {
    pub fn frames_per_segment(&self) -> u32 {
        self.frames_per_segment
            .unwrap_or_else(|| self.model.default_frame_count())
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.prompt.trim().is_empty() {
            return Err(PipelineError::Validation(
                "Prompt must not be empty".to_string(),
            ));
        }
        if !self.model.supports(GenerationMode::ImageToVideo) {
            return Err(PipelineError::Validation(format!(
                "Model '{}' cannot chain segments",
                self.model
            )));
        }
        let frames = self.frames_per_segment();
        if frames == 0 || frames > MAX_FRAME_COUNT {
            return Err(PipelineError::Validation(format!(
                "Frames per segment must be between 1 and {MAX_FRAME_COUNT} (got {frames})"
            )));
        }
        if !(self.denoise > 0.0 && self.denoise <= 1.0) {
            return Err(PipelineError::Validation(format!(
                "Denoise must be in (0, 1] (got {})",
                self.denoise
            )));
        }
        if let Some(count) = self.segment_count {
            if count == 0 || count > MAX_SEGMENTS {
                return Err(PipelineError::Validation(format!(
                    "Segment count must be between 1 and {MAX_SEGMENTS} (got {count})"
                )));
            }
        }
        if let Some(fps) = self.enhance_fps {
            if fps == 0 || fps > MAX_TARGET_FPS {
                return Err(PipelineError::Validation(format!(
                    "Enhance fps must be between 1 and {MAX_TARGET_FPS} (got {fps})"
                )));
            }
        }
        Ok(())
    }

    /// Size the segments for a project resolution and check that every
    /// segment's generation parameters are acceptable to the model.
    pub fn plan_segments(&self, resolution: &str) -> Result<ScaledResolution, PipelineError> {
        let (width, height) = parse_resolution(resolution)?;
        let size = scale_for_budget(
            width,
            height,
            self.frames_per_segment(),
            GenerationMode::ImageToVideo,
            self.model,
        );
        self.segment_params(size.width, size.height, PLANNED_REFERENCE.to_string(), 0, String::new())
            .validate(self.model, GenerationMode::ImageToVideo)?;
        Ok(size)
    }

    /// Generation parameters for one image-conditioned segment.
    pub fn segment_params(
        &self,
        width: u32,
        height: u32,
        reference: String,
        seed: u64,
        filename_prefix: String,
    ) -> GenerationParams {
        GenerationParams {
            prompt: self.prompt.clone(),
            negative_prompt: self.negative_prompt.clone(),
            width,
            height,
            frame_count: self.frames_per_segment(),
            fps: self.model.native_fps(),
            steps: SEGMENT_STEPS,
            cfg_scale: SEGMENT_CFG_SCALE,
            seed,
            denoise: self.denoise,
            reference_image: Some(reference),
            adapter_weight: DEFAULT_ADAPTER_WEIGHT,
            filename_prefix,
        }
    }
}
