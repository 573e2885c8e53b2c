//! Model variants, generation modes, and generation parameter validation.
//!
//! The graph builder and the resource scaler both key off [`ModelId`] and
//! [`GenerationMode`]; parameter validation lives here so it runs before
//! any node graph is built or any network call is made.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Model variants
// ---------------------------------------------------------------------------

/// Model identifier: baseline motion-module diffusion.
pub const MODEL_ANIMATEDIFF: &str = "animatediff";
/// Model identifier: single-image-conditioned video diffusion.
pub const MODEL_STABLE_VIDEO: &str = "svd";
/// Model identifier: masked-conditioning large video model.
pub const MODEL_WAN: &str = "wan";

/// All recognized model identifiers.
pub const ALL_MODEL_IDS: &[&str] = &[MODEL_ANIMATEDIFF, MODEL_STABLE_VIDEO, MODEL_WAN];

/// A supported video model variant. Each maps to a fixed node template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "animatediff")]
    AnimateDiff,
    #[serde(rename = "svd")]
    StableVideo,
    #[serde(rename = "wan")]
    Wan,
}

impl ModelId {
    /// Stable string identifier used in settings payloads and the database.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelId::AnimateDiff => MODEL_ANIMATEDIFF,
            ModelId::StableVideo => MODEL_STABLE_VIDEO,
            ModelId::Wan => MODEL_WAN,
        }
    }

    /// Parse a model identifier, rejecting unknown names.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            MODEL_ANIMATEDIFF => Ok(ModelId::AnimateDiff),
            MODEL_STABLE_VIDEO => Ok(ModelId::StableVideo),
            MODEL_WAN => Ok(ModelId::Wan),
            other => Err(CoreError::Validation(format!(
                "Unknown model '{other}'. Valid models: {}",
                ALL_MODEL_IDS.join(", ")
            ))),
        }
    }

    /// Frame rate the model was trained at.
    pub fn native_fps(self) -> u32 {
        match self {
            ModelId::AnimateDiff => 8,
            ModelId::StableVideo => 6,
            ModelId::Wan => 16,
        }
    }

    /// Frame count used when the caller does not specify one.
    pub fn default_frame_count(self) -> u32 {
        match self {
            ModelId::AnimateDiff => 16,
            ModelId::StableVideo => 25,
            ModelId::Wan => 81,
        }
    }

    /// Whether the model can run in the given mode.
    pub fn supports(self, mode: GenerationMode) -> bool {
        !matches!(
            (self, mode),
            (ModelId::StableVideo, GenerationMode::TextToVideo)
        )
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Generation modes
// ---------------------------------------------------------------------------

/// Whether a generation is conditioned on text alone or on a reference image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    TextToVideo,
    ImageToVideo,
}

impl GenerationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            GenerationMode::TextToVideo => "text_to_video",
            GenerationMode::ImageToVideo => "image_to_video",
        }
    }

    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value {
            "text_to_video" => Ok(GenerationMode::TextToVideo),
            "image_to_video" => Ok(GenerationMode::ImageToVideo),
            other => Err(CoreError::Validation(format!(
                "Unknown generation mode '{other}'. Valid modes: text_to_video, image_to_video"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Generation parameters
// ---------------------------------------------------------------------------

/// Maximum number of sampler steps accepted.
pub const MAX_STEPS: u32 = 150;
/// Maximum number of frames accepted for a single generation.
pub const MAX_FRAME_COUNT: u32 = 241;
/// Default adapter (image prompt) weight for image-to-video on the baseline model.
pub const DEFAULT_ADAPTER_WEIGHT: f64 = 0.8;

/// Parameters substituted into a model's node template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    pub width: u32,
    pub height: u32,
    pub frame_count: u32,
    pub fps: u32,
    pub steps: u32,
    pub cfg_scale: f64,
    pub seed: u64,
    /// Denoise strength (1.0 = full generation).
    #[serde(default = "default_denoise")]
    pub denoise: f64,
    /// Filename of the reference image in the inference service's input store.
    #[serde(default)]
    pub reference_image: Option<String>,
    #[serde(default = "default_adapter_weight")]
    pub adapter_weight: f64,
    /// Prefix for the output artifact written by the service.
    #[serde(default = "default_filename_prefix")]
    pub filename_prefix: String,
}

fn default_denoise() -> f64 {
    1.0
}

fn default_adapter_weight() -> f64 {
    DEFAULT_ADAPTER_WEIGHT
}

fn default_filename_prefix() -> String {
    "reelforge".to_string()
}

impl GenerationParams {
    /// Clip duration implied by frame count and frame rate.
    pub fn duration_secs(&self) -> f64 {
        if self.fps == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.fps as f64
    }

    /// Validate the parameters for a model/mode combination.
    ///
    /// Runs before graph construction so a bad request never reaches the
    /// inference service.
    pub fn validate(&self, model: ModelId, mode: GenerationMode) -> Result<(), CoreError> {
        if !model.supports(mode) {
            return Err(CoreError::Validation(format!(
                "Model '{model}' does not support {}",
                mode.as_str()
            )));
        }
        if mode == GenerationMode::TextToVideo && self.prompt.trim().is_empty() {
            return Err(CoreError::Validation(
                "Prompt must not be empty for text-to-video".to_string(),
            ));
        }
        if mode == GenerationMode::ImageToVideo
            && self
                .reference_image
                .as_deref()
                .map_or(true, |name| name.trim().is_empty())
        {
            return Err(CoreError::Validation(format!(
                "Model '{model}' requires a reference image for image-to-video"
            )));
        }
        if self.width == 0 || self.height == 0 {
            return Err(CoreError::Validation(
                "Width and height must be greater than 0".to_string(),
            ));
        }
        if self.width % 8 != 0 || self.height % 8 != 0 {
            return Err(CoreError::Validation(format!(
                "Width and height must be multiples of 8 (got {}x{})",
                self.width, self.height
            )));
        }
        if self.frame_count == 0 || self.frame_count > MAX_FRAME_COUNT {
            return Err(CoreError::Validation(format!(
                "Frame count must be between 1 and {MAX_FRAME_COUNT} (got {})",
                self.frame_count
            )));
        }
        if model == ModelId::Wan && (self.frame_count - 1) % 4 != 0 {
            return Err(CoreError::Validation(format!(
                "Model '{model}' requires a frame count of the form 4n+1 (got {})",
                self.frame_count
            )));
        }
        if self.fps == 0 {
            return Err(CoreError::Validation(
                "Frame rate must be greater than 0".to_string(),
            ));
        }
        if self.steps == 0 || self.steps > MAX_STEPS {
            return Err(CoreError::Validation(format!(
                "Steps must be between 1 and {MAX_STEPS} (got {})",
                self.steps
            )));
        }
        if !(self.cfg_scale > 0.0 && self.cfg_scale <= 30.0) {
            return Err(CoreError::Validation(format!(
                "CFG scale must be in (0, 30] (got {})",
                self.cfg_scale
            )));
        }
        if !(self.denoise > 0.0 && self.denoise <= 1.0) {
            return Err(CoreError::Validation(format!(
                "Denoise must be in (0, 1] (got {})",
                self.denoise
            )));
        }
        if !(0.0..=2.0).contains(&self.adapter_weight) {
            return Err(CoreError::Validation(format!(
                "Adapter weight must be in [0, 2] (got {})",
                self.adapter_weight
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
