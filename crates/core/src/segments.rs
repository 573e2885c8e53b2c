//! Long-video segment planning and continuation-frame chaining.
//!
//! A long video is a chain of short image-to-video segments. Segment `i`
//! is conditioned on the last frame of segment `i - 1`; the first segment
//! uses the supplied (or synthesized) reference image.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Clips produced by long-video jobs get order indexes at or above this
/// value so they never collide with ordinary clips.
pub const LONG_VIDEO_ORDER_BASE: i32 = 100_000;

/// Hard ceiling on segments per long-video job.
pub const MAX_SEGMENTS: u32 = 200;

/// How far before the end of a segment the continuation frame is grabbed.
pub const CONTINUATION_SEEK_BACK_SECS: f64 = 0.1;

/// Sampler steps used for every long-video segment.
pub const SEGMENT_STEPS: u32 = 20;

/// CFG scale used for every long-video segment.
pub const SEGMENT_CFG_SCALE: f64 = 5.0;

/// Target frame rate of the enhance pass.
pub const DEFAULT_ENHANCE_FPS: u32 = 32;

// ---------------------------------------------------------------------------
// Planning
// ---------------------------------------------------------------------------

/// Length of one segment in seconds.
pub fn segment_duration_secs(frames_per_segment: u32, fps: u32) -> f64 {
    if fps == 0 {
        return 0.0;
    }
    frames_per_segment as f64 / fps as f64
}

/// Decide how many segments a long-video job produces.
///
/// An explicit `segment_count` wins; otherwise the count is
/// `ceil(target_duration / segment_duration)`. The result must lie in
/// `1..=MAX_SEGMENTS`.
pub fn plan_segment_count(
    target_duration_secs: Option<f64>,
    segment_count: Option<u32>,
    segment_duration_secs: f64,
) -> Result<u32, CoreError> {
    let count = match (segment_count, target_duration_secs) {
        (Some(count), _) => count,
        (None, Some(target)) => {
            if !(target > 0.0) {
                return Err(CoreError::Validation(
                    "target_duration must be positive".to_string(),
                ));
            }
            if !(segment_duration_secs > 0.0) {
                return Err(CoreError::Validation(
                    "Segment duration must be positive".to_string(),
                ));
            }
            let raw = (target / segment_duration_secs).ceil();
            if raw > MAX_SEGMENTS as f64 {
                return Err(CoreError::Validation(format!(
                    "Target duration needs {raw} segments; the limit is {MAX_SEGMENTS}"
                )));
            }
            raw as u32
        }
        (None, None) => {
            return Err(CoreError::Validation(
                "Either target_duration or segment_count must be set".to_string(),
            ))
        }
    };

    if count == 0 || count > MAX_SEGMENTS {
        return Err(CoreError::Validation(format!(
            "Segment count must be between 1 and {MAX_SEGMENTS} (got {count})"
        )));
    }
    Ok(count)
}

/// Timestamp at which to grab the continuation frame of a segment.
pub fn continuation_timestamp(duration_secs: f64) -> f64 {
    (duration_secs - CONTINUATION_SEEK_BACK_SECS).max(0.0)
}

/// Order index for 1-based segment `segment` given the first free index.
pub fn segment_order_index(first_index: i32, segment: u32) -> i32 {
    first_index + segment as i32 - 1
}

// ---------------------------------------------------------------------------
// Chain state
// ---------------------------------------------------------------------------

/// Tracks which reference image each segment is conditioned on.
///
/// Segment 1 uses the initial reference; every later segment uses the
/// continuation frame registered after the previous segment finished.
#[derive(Debug, Clone)]
pub struct SegmentChain {
    total: u32,
    references: Vec<String>,
}

impl SegmentChain {
    pub fn new(initial_reference: impl Into<String>, total: u32) -> Self {
        Self {
            total,
            references: vec![initial_reference.into()],
        }
    }

    pub fn total(&self) -> u32 {
        self.total
    }

    /// 1-based number of the segment that will run next.
    pub fn current_segment(&self) -> u32 {
        self.references.len() as u32
    }

    /// Reference image for the segment that will run next.
    pub fn current_reference(&self) -> &str {
        // `references` starts non-empty and only grows.
        self.references.last().map(String::as_str).unwrap_or_default()
    }

    /// Whether the segment that will run next is the last one.
    pub fn is_last(&self) -> bool {
        self.current_segment() >= self.total
    }

    /// Register the continuation frame extracted from the current segment.
    pub fn advance(&mut self, continuation_frame: impl Into<String>) -> Result<(), CoreError> {
        if self.is_last() {
            return Err(CoreError::Internal(format!(
                "Cannot advance past segment {} of {}",
                self.current_segment(),
                self.total
            )));
        }
        self.references.push(continuation_frame.into());
        Ok(())
    }

    /// All references in segment order (index 0 = segment 1).
    pub fn references(&self) -> &[String] {
        &self.references
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ninety_seconds_of_wan_segments_needs_eighteen() {
        let seg = segment_duration_secs(81, 16);
        assert!((seg - 5.0625).abs() < 1e-9);
        assert_eq!(plan_segment_count(Some(90.0), None, seg).unwrap(), 18);
    }

    #[test]
    fn explicit_segment_count_wins() {
        assert_eq!(plan_segment_count(Some(90.0), Some(3), 5.0).unwrap(), 3);
    }

    #[test]
    fn exact_fit_does_not_add_a_segment() {
        assert_eq!(plan_segment_count(Some(30.0), None, 5.0).unwrap(), 6);
    }

    #[test]
    fn missing_target_and_count_rejected() {
        assert!(plan_segment_count(None, None, 5.0).is_err());
    }

    #[test]
    fn zero_segments_rejected() {
        assert!(plan_segment_count(None, Some(0), 5.0).is_err());
        assert!(plan_segment_count(Some(0.0), None, 5.0).is_err());
    }

    #[test]
    fn too_many_segments_rejected() {
        assert!(plan_segment_count(Some(100_000.0), None, 1.0).is_err());
        assert!(plan_segment_count(None, Some(MAX_SEGMENTS + 1), 1.0).is_err());
    }

    #[test]
    fn continuation_timestamp_seeks_back_and_clamps() {
        assert!((continuation_timestamp(5.0625) - 4.9625).abs() < 1e-9);
        assert_eq!(continuation_timestamp(0.05), 0.0);
    }

    #[test]
    fn order_indexes_are_consecutive() {
        assert_eq!(segment_order_index(LONG_VIDEO_ORDER_BASE, 1), 100_000);
        assert_eq!(segment_order_index(LONG_VIDEO_ORDER_BASE, 18), 100_017);
    }

    #[test]
    fn each_segment_references_previous_continuation_frame() {
        let mut chain = SegmentChain::new("reference.png", 18);
        let mut used = Vec::new();
        loop {
            let segment = chain.current_segment();
            used.push(chain.current_reference().to_string());
            if chain.is_last() {
                break;
            }
            chain.advance(format!("segment_{segment}_last.png")).unwrap();
        }

        assert_eq!(used.len(), 18);
        assert_eq!(used[0], "reference.png");
        for i in 1..used.len() {
            assert_eq!(used[i], format!("segment_{i}_last.png"));
        }
    }

    #[test]
    fn advancing_past_last_segment_fails() {
        let mut chain = SegmentChain::new("ref.png", 1);
        assert!(chain.is_last());
        assert!(chain.advance("x.png").is_err());
    }
}
