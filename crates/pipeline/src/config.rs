use std::path::PathBuf;
use std::time::Duration;

use reelforge_core::job_type::JobType;
use reelforge_core::segments::{DEFAULT_ENHANCE_FPS, LONG_VIDEO_ORDER_BASE};

/// Wall-clock ceiling of one job run, per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobTimeouts {
    pub generate: Duration,
    pub merge: Duration,
    pub upscale: Duration,
    pub interpolate: Duration,
    pub export: Duration,
    pub long_video: Duration,
}

impl Default for JobTimeouts {
    fn default() -> Self {
        Self {
            generate: Duration::from_secs(30 * 60),
            merge: Duration::from_secs(10 * 60),
            upscale: Duration::from_secs(10 * 60),
            interpolate: Duration::from_secs(10 * 60),
            export: Duration::from_secs(30 * 60),
            long_video: Duration::from_secs(6 * 60 * 60),
        }
    }
}

impl JobTimeouts {
    pub fn for_type(&self, job_type: JobType) -> Duration {
        match job_type {
            JobType::Generate => self.generate,
            JobType::Merge => self.merge,
            JobType::Upscale => self.upscale,
            JobType::Interpolate => self.interpolate,
            JobType::Export => self.export,
            JobType::LongVideo => self.long_video,
        }
    }
}

/// Pipeline configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// HTTP base URL of the inference service.
    pub comfyui_url: String,
    /// Where finished clips, merges and exports are written.
    pub output_dir: PathBuf,
    /// Parent of the per-job scratch directories.
    pub scratch_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub timeouts: JobTimeouts,
    /// Ceiling for a single inference execution (one clip or segment).
    pub inference_timeout: Duration,
    /// First order index reserved for long-video segments.
    pub long_video_order_base: i32,
    pub enhance_target_fps: u32,
    /// Width of generated thumbnails.
    pub thumbnail_width: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let timeouts = JobTimeouts::default();
        Self {
            comfyui_url: "http://localhost:8188".into(),
            output_dir: PathBuf::from("./storage/outputs"),
            scratch_dir: std::env::temp_dir().join("reelforge"),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            inference_timeout: timeouts.generate,
            timeouts,
            long_video_order_base: LONG_VIDEO_ORDER_BASE,
            enhance_target_fps: DEFAULT_ENHANCE_FPS,
            thumbnail_width: 320,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                       | Default                  |
    /// |-------------------------------|--------------------------|
    /// | `COMFYUI_URL`                 | `http://localhost:8188`  |
    /// | `OUTPUT_DIR`                  | `./storage/outputs`      |
    /// | `SCRATCH_DIR`                 | `$TMPDIR/reelforge`      |
    /// | `FFMPEG_PATH`                 | `ffmpeg`                 |
    /// | `FFPROBE_PATH`                | `ffprobe`                |
    /// | `GENERATE_TIMEOUT_SECS`       | `1800`                   |
    /// | `MERGE_TIMEOUT_SECS`          | `600`                    |
    /// | `UPSCALE_TIMEOUT_SECS`        | `600`                    |
    /// | `INTERPOLATE_TIMEOUT_SECS`    | `600`                    |
    /// | `EXPORT_TIMEOUT_SECS`         | `1800`                   |
    /// | `LONG_VIDEO_TIMEOUT_SECS`     | `21600`                  |
    /// | `INFERENCE_TIMEOUT_SECS`      | `1800`                   |
    /// | `LONG_VIDEO_ORDER_BASE`       | `100000`                 |
    /// | `ENHANCE_TARGET_FPS`          | `32`                     |
    /// | `THUMBNAIL_WIDTH`             | `320`                    |
    ///
    /// # Panics
    ///
    /// On a value that does not parse; this runs during start-up only.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let timeouts = JobTimeouts {
            generate: env_secs("GENERATE_TIMEOUT_SECS", defaults.timeouts.generate),
            merge: env_secs("MERGE_TIMEOUT_SECS", defaults.timeouts.merge),
            upscale: env_secs("UPSCALE_TIMEOUT_SECS", defaults.timeouts.upscale),
            interpolate: env_secs("INTERPOLATE_TIMEOUT_SECS", defaults.timeouts.interpolate),
            export: env_secs("EXPORT_TIMEOUT_SECS", defaults.timeouts.export),
            long_video: env_secs("LONG_VIDEO_TIMEOUT_SECS", defaults.timeouts.long_video),
        };

        Self {
            comfyui_url: std::env::var("COMFYUI_URL").unwrap_or(defaults.comfyui_url),
            output_dir: env_path("OUTPUT_DIR", defaults.output_dir),
            scratch_dir: env_path("SCRATCH_DIR", defaults.scratch_dir),
            ffmpeg_path: env_path("FFMPEG_PATH", defaults.ffmpeg_path),
            ffprobe_path: env_path("FFPROBE_PATH", defaults.ffprobe_path),
            inference_timeout: env_secs("INFERENCE_TIMEOUT_SECS", defaults.inference_timeout),
            timeouts,
            long_video_order_base: env_parse("LONG_VIDEO_ORDER_BASE", defaults.long_video_order_base),
            enhance_target_fps: env_parse("ENHANCE_TARGET_FPS", defaults.enhance_target_fps),
            thumbnail_width: env_parse("THUMBNAIL_WIDTH", defaults.thumbnail_width),
        }
    }
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var_os(key).map(PathBuf::from).unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    Duration::from_secs(env_parse(key, default.as_secs()))
}

fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>())),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_video_has_the_longest_ceiling() {
        let t = JobTimeouts::default();
        for job_type in JobType::ALL {
            assert!(t.for_type(job_type) <= t.long_video);
        }
        assert_eq!(t.for_type(JobType::Generate), Duration::from_secs(1800));
        assert!(t.interpolate < t.export);
    }

    #[test]
    fn defaults_reserve_the_long_video_range() {
        let config = PipelineConfig::default();
        assert_eq!(config.long_video_order_base, 100_000);
        assert_eq!(config.enhance_target_fps, 32);
    }
}
