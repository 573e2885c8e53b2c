//! GPU-memory-safe resolution scaling.
//!
//! Every model/mode combination has a pixel budget (`width * height *
//! frames`) it can process without running out of GPU memory.  The
//! generate worker and the resolution preview endpoint both call
//! [`scale_for_budget`], so the effective resolution shown before
//! submission is exactly the one used at generation time.

use serde::Serialize;

use crate::error::CoreError;
use crate::generation::{GenerationMode, ModelId};

/* --------------------------------------------------------------------------
Named constants
-------------------------------------------------------------------------- */

/// Every dimension handed to the inference service is a multiple of this.
pub const DIMENSION_ALIGNMENT: u32 = 8;

/// Maximum dimension (width or height) allowed.
const MAX_DIMENSION: u32 = 7680;

/// Native output size of the single-image-conditioned model.
pub const STABLE_VIDEO_NATIVE: (u32, u32) = (1024, 576);

/// Pixel budget for the baseline model, text-conditioned (768x432x32).
pub const BUDGET_ANIMATEDIFF_T2V: u64 = 768 * 432 * 32;
/// Pixel budget for the baseline model, image-conditioned (640x360x32).
pub const BUDGET_ANIMATEDIFF_I2V: u64 = 640 * 360 * 32;
/// Pixel budget for the large model, text-conditioned (832x480x81).
pub const BUDGET_WAN_T2V: u64 = 832 * 480 * 81;
/// Pixel budget for the large model, image-conditioned (720x400x81).
pub const BUDGET_WAN_I2V: u64 = 720 * 400 * 81;

/* --------------------------------------------------------------------------
Types
-------------------------------------------------------------------------- */

/// Effective generation resolution after applying the pixel budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaledResolution {
    pub width: u32,
    pub height: u32,
    /// `true` when the requested resolution was not honored.
    pub was_scaled: bool,
}

/* --------------------------------------------------------------------------
Budgets
-------------------------------------------------------------------------- */

/// Pixel budget for a model/mode pair, or `None` for fixed-resolution models.
///
/// Image-conditioned budgets are tighter than text-conditioned ones because
/// the conditioning image and its encoder share the same GPU memory.
pub fn pixel_budget(model: ModelId, mode: GenerationMode) -> Option<u64> {
    match (model, mode) {
        (ModelId::AnimateDiff, GenerationMode::TextToVideo) => Some(BUDGET_ANIMATEDIFF_T2V),
        (ModelId::AnimateDiff, GenerationMode::ImageToVideo) => Some(BUDGET_ANIMATEDIFF_I2V),
        (ModelId::Wan, GenerationMode::TextToVideo) => Some(BUDGET_WAN_T2V),
        (ModelId::Wan, GenerationMode::ImageToVideo) => Some(BUDGET_WAN_I2V),
        (ModelId::StableVideo, _) => None,
    }
}

/// Fixed native resolution for models that ignore the requested size.
pub fn native_resolution(model: ModelId) -> Option<(u32, u32)> {
    match model {
        ModelId::StableVideo => Some(STABLE_VIDEO_NATIVE),
        ModelId::AnimateDiff | ModelId::Wan => None,
    }
}

/* --------------------------------------------------------------------------
Scaling
-------------------------------------------------------------------------- */

/// Compute a GPU-memory-safe resolution for the requested generation.
///
/// When `base_width * base_height * frame_count` exceeds the model's budget
/// both sides are multiplied by `sqrt(budget / total)` and rounded *down*
/// to a multiple of [`DIMENSION_ALIGNMENT`].  Fixed-resolution models return
/// their native size with `was_scaled = true`.
pub fn scale_for_budget(
    base_width: u32,
    base_height: u32,
    frame_count: u32,
    mode: GenerationMode,
    model: ModelId,
) -> ScaledResolution {
    if let Some((width, height)) = native_resolution(model) {
        return ScaledResolution {
            width,
            height,
            was_scaled: true,
        };
    }

    let Some(budget) = pixel_budget(model, mode) else {
        return ScaledResolution {
            width: base_width,
            height: base_height,
            was_scaled: false,
        };
    };

    let total = base_width as u64 * base_height as u64 * frame_count as u64;
    if total <= budget {
        return ScaledResolution {
            width: base_width,
            height: base_height,
            was_scaled: false,
        };
    }

    let scale = (budget as f64 / total as f64).sqrt();
    ScaledResolution {
        width: align_down(base_width as f64 * scale),
        height: align_down(base_height as f64 * scale),
        was_scaled: true,
    }
}

/// Floor to a multiple of [`DIMENSION_ALIGNMENT`], never below one unit.
fn align_down(value: f64) -> u32 {
    let aligned = (value / DIMENSION_ALIGNMENT as f64).floor() as u32 * DIMENSION_ALIGNMENT;
    aligned.max(DIMENSION_ALIGNMENT)
}

/* --------------------------------------------------------------------------
Parsing and validation
-------------------------------------------------------------------------- */

/// Parse a project resolution string of the form `WxH` (e.g. `832x480`).
pub fn parse_resolution(value: &str) -> Result<(u32, u32), CoreError> {
    let invalid = || {
        CoreError::Validation(format!(
            "Invalid resolution '{value}'. Expected the form WIDTHxHEIGHT"
        ))
    };
    let (w, h) = value.trim().split_once(['x', 'X']).ok_or_else(invalid)?;
    let width = w.trim().parse::<u32>().map_err(|_| invalid())?;
    let height = h.trim().parse::<u32>().map_err(|_| invalid())?;
    validate_dimensions(width, height)?;
    Ok((width, height))
}

/// Validate that width and height are positive and within bounds.
pub fn validate_dimensions(width: u32, height: u32) -> Result<(), CoreError> {
    if width == 0 || height == 0 {
        return Err(CoreError::Validation(
            "Width and height must be greater than 0".to_string(),
        ));
    }
    if width > MAX_DIMENSION || height > MAX_DIMENSION {
        return Err(CoreError::Validation(format!(
            "Dimensions must not exceed {MAX_DIMENSION}px (got {width}x{height})"
        )));
    }
    Ok(())
}

/// Multiply a resolution by a scale factor, keeping both sides even.
///
/// Used by upscale stages; most encoders reject odd dimensions.
pub fn multiply_resolution(width: u32, height: u32, factor: f64) -> (u32, u32) {
    let even = |v: f64| ((v / 2.0).round() as u32 * 2).max(2);
    (even(width as f64 * factor), even(height as f64 * factor))
}

/* --------------------------------------------------------------------------
Tests
-------------------------------------------------------------------------- */

#[cfg(test)]
mod tests {
    use super::*;

    const MODES: [GenerationMode; 2] = [GenerationMode::TextToVideo, GenerationMode::ImageToVideo];

    // -- scale_for_budget --

    #[test]
    fn within_budget_is_unchanged() {
        let r = scale_for_budget(832, 480, 81, GenerationMode::TextToVideo, ModelId::Wan);
        assert_eq!(
            r,
            ScaledResolution {
                width: 832,
                height: 480,
                was_scaled: false
            }
        );
    }

    #[test]
    fn over_budget_is_scaled_down() {
        let r = scale_for_budget(1280, 720, 81, GenerationMode::TextToVideo, ModelId::Wan);
        assert!(r.was_scaled);
        assert!(r.width < 1280 && r.height < 720);
    }

    #[test]
    fn image_mode_budget_is_tighter_than_text_mode() {
        for model in [ModelId::AnimateDiff, ModelId::Wan] {
            let t2v = pixel_budget(model, GenerationMode::TextToVideo).unwrap();
            let i2v = pixel_budget(model, GenerationMode::ImageToVideo).unwrap();
            assert!(i2v < t2v, "{model}: {i2v} should be < {t2v}");
        }
    }

    #[test]
    fn fixed_resolution_model_bypasses_scaling() {
        let r = scale_for_budget(640, 360, 14, GenerationMode::ImageToVideo, ModelId::StableVideo);
        assert_eq!((r.width, r.height), STABLE_VIDEO_NATIVE);
        assert!(r.was_scaled);
    }

    #[test]
    fn scaled_output_respects_budget_alignment_and_aspect() {
        let sizes = [
            (1920, 1080),
            (1280, 720),
            (1080, 1920),
            (1024, 1024),
            (2560, 1080),
            (960, 544),
            (3840, 2160),
        ];
        let frames = [16, 24, 33, 49, 81, 121];

        for model in [ModelId::AnimateDiff, ModelId::Wan] {
            for mode in MODES {
                let budget = pixel_budget(model, mode).unwrap();
                for &(w, h) in &sizes {
                    for &f in &frames {
                        let total = w as u64 * h as u64 * f as u64;
                        if total <= budget {
                            continue;
                        }
                        let r = scale_for_budget(w, h, f, mode, model);
                        assert!(r.was_scaled);
                        assert_eq!(r.width % 8, 0, "{w}x{h}x{f} -> {r:?}");
                        assert_eq!(r.height % 8, 0, "{w}x{h}x{f} -> {r:?}");
                        assert!(
                            r.width as u64 * r.height as u64 * f as u64 <= budget,
                            "{w}x{h}x{f} -> {r:?} exceeds {budget}"
                        );
                        let requested = w as f64 / h as f64;
                        let got = r.width as f64 / r.height as f64;
                        // Each side loses at most one alignment step to rounding.
                        let tolerance = requested * (8.0 / r.height as f64 + 8.0 / r.width as f64);
                        assert!(
                            (requested - got).abs() <= tolerance,
                            "{w}x{h}x{f} -> {r:?} aspect drift"
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn scaling_is_deterministic() {
        let a = scale_for_budget(1920, 1080, 81, GenerationMode::ImageToVideo, ModelId::Wan);
        let b = scale_for_budget(1920, 1080, 81, GenerationMode::ImageToVideo, ModelId::Wan);
        assert_eq!(a, b);
    }

    // -- parse_resolution --

    #[test]
    fn parse_valid_resolution() {
        assert_eq!(parse_resolution("832x480").unwrap(), (832, 480));
        assert_eq!(parse_resolution(" 1280X720 ").unwrap(), (1280, 720));
    }

    #[test]
    fn parse_invalid_resolution() {
        assert!(parse_resolution("832").is_err());
        assert!(parse_resolution("axb").is_err());
        assert!(parse_resolution("0x480").is_err());
    }

    // -- validate_dimensions --

    #[test]
    fn oversized_dimension_rejected() {
        let msg = validate_dimensions(7681, 1080).unwrap_err().to_string();
        assert!(msg.contains("must not exceed 7680"));
    }

    // -- multiply_resolution --

    #[test]
    fn multiply_keeps_dimensions_even() {
        assert_eq!(multiply_resolution(832, 480, 2.0), (1664, 960));
        let (w, h) = multiply_resolution(833, 481, 1.5);
        assert_eq!(w % 2, 0);
        assert_eq!(h % 2, 0);
    }
}
