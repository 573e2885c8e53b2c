//! FFmpeg/FFprobe command adapter.
//!
//! [`MediaService`] is the seam the pipelines depend on: one async method
//! per media operation (probe, frame extraction, thumbnail, lossless
//! concat, transition merge, scale, frame interpolation, final encode).
//! [`MediaTool`] implements it over the two binaries. Long-running
//! operations run with `-progress pipe:1` and report a 0-100 sub-progress
//! through a caller-supplied callback.
//!
//! Filter graphs and argument lists are built by pure functions so they
//! can be tested without the binaries installed.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;

use crate::segments::continuation_timestamp;

/// Sub-progress callback, receives 0-100.
pub type ProgressFn<'a> = &'a (dyn Fn(f64) + Send + Sync);

/// Bytes of stderr kept for error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Error type for FFmpeg/FFprobe operations.
#[derive(Debug, thiserror::Error)]
pub enum FfmpegError {
    #[error("ffprobe/ffmpeg binary not found: {0}")]
    NotFound(std::io::Error),

    #[error("ffprobe/ffmpeg execution failed (exit code {exit_code:?}): {stderr}")]
    ExecutionFailed {
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("failed to parse ffprobe output: {0}")]
    ParseError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("video file not found: {0}")]
    VideoNotFound(String),

    #[error("ffmpeg reported success but produced no output at {0}")]
    OutputMissing(String),

    #[error("invalid media operation: {0}")]
    InvalidArgument(String),
}

// ---------------------------------------------------------------------------
// ffprobe JSON output structures
// ---------------------------------------------------------------------------

/// Top-level ffprobe JSON output (`-print_format json -show_format -show_streams`).
#[derive(Debug, Deserialize)]
pub struct FfprobeOutput {
    pub streams: Vec<FfprobeStream>,
    pub format: FfprobeFormat,
}

/// A single stream from ffprobe output.
#[derive(Debug, Deserialize)]
pub struct FfprobeStream {
    pub index: i32,
    pub codec_name: Option<String>,
    pub codec_type: Option<String>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    /// e.g. "30/1" or "24000/1001"
    pub r_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub nb_frames: Option<String>,
}

/// Format-level metadata from ffprobe.
#[derive(Debug, Deserialize)]
pub struct FfprobeFormat {
    pub duration: Option<String>,
    pub size: Option<String>,
    pub format_name: Option<String>,
}

/// Derived metadata written back to clip and job rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MediaInfo {
    pub duration_secs: f64,
    pub frame_count: i64,
    pub width: i32,
    pub height: i32,
    pub fps: f64,
}

impl MediaInfo {
    pub fn from_probe(probe: &FfprobeOutput) -> Self {
        let (width, height) = parse_resolution(probe);
        Self {
            duration_secs: parse_duration(probe),
            frame_count: parse_total_frames(probe),
            width,
            height,
            fps: parse_framerate(probe),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation settings
// ---------------------------------------------------------------------------

/// Transition applied between consecutive clips when merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    /// Hard cut; merged with a lossless stream copy.
    #[default]
    None,
    Fade,
    Dissolve,
    WipeLeft,
    SlideLeft,
}

impl Transition {
    /// Name of the matching `xfade` transition, `None` for hard cuts.
    pub fn xfade_name(self) -> Option<&'static str> {
        match self {
            Transition::None => None,
            Transition::Fade => Some("fade"),
            Transition::Dissolve => Some("dissolve"),
            Transition::WipeLeft => Some("wipeleft"),
            Transition::SlideLeft => Some("slideleft"),
        }
    }
}

/// Container/codec of the final export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeFormat {
    #[default]
    Mp4,
    Webm,
    Mov,
}

impl EncodeFormat {
    pub fn extension(self) -> &'static str {
        match self {
            EncodeFormat::Mp4 => "mp4",
            EncodeFormat::Webm => "webm",
            EncodeFormat::Mov => "mov",
        }
    }
}

/// Quality tier of the final export; selects CRF and preset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeQuality {
    Draft,
    #[default]
    Standard,
    High,
    Lossless,
}

impl EncodeQuality {
    /// Constant rate factor for x264 / VP9.
    pub fn crf(self) -> u32 {
        match self {
            EncodeQuality::Draft => 28,
            EncodeQuality::Standard => 23,
            EncodeQuality::High => 18,
            EncodeQuality::Lossless => 0,
        }
    }

    /// x264 preset.
    pub fn preset(self) -> &'static str {
        match self {
            EncodeQuality::Draft => "veryfast",
            EncodeQuality::Standard => "medium",
            EncodeQuality::High => "slow",
            EncodeQuality::Lossless => "veryslow",
        }
    }
}

/// Final encode selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EncodeSettings {
    #[serde(default)]
    pub format: EncodeFormat,
    #[serde(default)]
    pub quality: EncodeQuality,
}

// ---------------------------------------------------------------------------
// Pure builders
// ---------------------------------------------------------------------------

/// Contents of a concat-demuxer list file.
pub fn concat_list(inputs: &[PathBuf]) -> String {
    inputs
        .iter()
        .map(|p| {
            let escaped = p.to_string_lossy().replace('\'', r"'\''");
            format!("file '{escaped}'\n")
        })
        .collect()
}

/// Duration of clips joined with overlapping transitions of `transition_secs`.
pub fn merged_duration(durations: &[f64], transition_secs: f64) -> f64 {
    let total: f64 = durations.iter().sum();
    let overlaps = durations.len().saturating_sub(1) as f64;
    total - overlaps * transition_secs
}

/// Build the `xfade` filter chain joining `durations.len()` video inputs.
///
/// Input `k` (k >= 1) starts fading in at offset `sum(d_0..d_{k-1}) - k * t`.
/// Returns the filter graph and the label of its final output.
pub fn xfade_filter(
    durations: &[f64],
    transition: Transition,
    transition_secs: f64,
    fps: u32,
) -> Result<(String, String), FfmpegError> {
    let name = transition.xfade_name().ok_or_else(|| {
        FfmpegError::InvalidArgument("hard cuts do not use a filter graph".to_string())
    })?;
    if durations.len() < 2 {
        return Err(FfmpegError::InvalidArgument(
            "a transition merge needs at least two clips".to_string(),
        ));
    }
    if !(transition_secs > 0.0) {
        return Err(FfmpegError::InvalidArgument(
            "transition duration must be positive".to_string(),
        ));
    }
    if let Some(short) = durations.iter().find(|d| **d <= transition_secs) {
        return Err(FfmpegError::InvalidArgument(format!(
            "clip of {short:.3}s is not longer than the {transition_secs:.3}s transition"
        )));
    }

    let mut parts: Vec<String> = (0..durations.len())
        .map(|i| format!("[{i}:v]fps={fps},settb=AVTB,setpts=PTS-STARTPTS,format=yuv420p[s{i}]"))
        .collect();

    let mut previous = "s0".to_string();
    let mut elapsed = durations[0];
    for (k, _) in durations.iter().enumerate().skip(1) {
        let offset = elapsed - k as f64 * transition_secs;
        let label = format!("x{k}");
        parts.push(format!(
            "[{previous}][s{k}]xfade=transition={name}:duration={transition_secs:.3}:offset={offset:.3}[{label}]"
        ));
        elapsed += durations[k];
        previous = label;
    }

    Ok((parts.join(";"), previous))
}

/// High-quality resampling filter.
pub fn scale_filter(width: u32, height: u32) -> String {
    format!("scale={width}:{height}:flags=lanczos")
}

/// Motion-compensated frame-rate conversion filter.
pub fn interpolate_filter(fps: u32) -> String {
    format!("minterpolate=fps={fps}:mi_mode=mci:mc_mode=aobmc:me_mode=bidir:vsbmc=1")
}

/// Codec arguments for the final encode.
pub fn encode_args(settings: EncodeSettings) -> Vec<String> {
    let crf = settings.quality.crf().to_string();
    let args: Vec<&str> = match settings.format {
        EncodeFormat::Mp4 => vec![
            "-c:v",
            "libx264",
            "-preset",
            settings.quality.preset(),
            "-crf",
            &crf,
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ],
        EncodeFormat::Webm => vec!["-c:v", "libvpx-vp9", "-crf", &crf, "-b:v", "0", "-row-mt", "1"],
        EncodeFormat::Mov => {
            let profile = match settings.quality {
                EncodeQuality::Draft => "0",
                EncodeQuality::Standard => "2",
                EncodeQuality::High => "3",
                EncodeQuality::Lossless => "4",
            };
            vec!["-c:v", "prores_ks", "-profile:v", profile]
        }
    };
    args.into_iter().map(String::from).collect()
}

/// Intermediate encode used between pipeline stages (near-lossless x264).
fn intermediate_args() -> Vec<String> {
    ["-c:v", "libx264", "-preset", "medium", "-crf", "16", "-pix_fmt", "yuv420p"]
        .into_iter()
        .map(String::from)
        .collect()
}

/// A parsed line of `-progress` output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressLine {
    /// Output timestamp reached, in microseconds.
    OutTimeUs(i64),
    /// The encoder finished.
    End,
}

/// Parse one `key=value` line of ffmpeg `-progress` output.
pub fn parse_progress_line(line: &str) -> Option<ProgressLine> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        // Despite the name, `out_time_ms` is also in microseconds.
        "out_time_us" | "out_time_ms" => value.parse::<i64>().ok().map(ProgressLine::OutTimeUs),
        "progress" if value == "end" => Some(ProgressLine::End),
        _ => None,
    }
}

/// Convert an output timestamp into a 0-100 sub-progress.
pub fn progress_percent(out_time_us: i64, expected_duration_secs: f64) -> f64 {
    if expected_duration_secs <= 0.0 || out_time_us <= 0 {
        return 0.0;
    }
    (out_time_us as f64 / 1_000_000.0 / expected_duration_secs * 100.0).clamp(0.0, 100.0)
}

// ---------------------------------------------------------------------------
// MediaService
// ---------------------------------------------------------------------------

/// Media operations used by the job pipelines.
///
/// Every operation that writes a file fails unless the file exists and is
/// non-empty afterwards.
#[async_trait]
pub trait MediaService: Send + Sync {
    /// Duration, frame count, resolution and frame rate of a video.
    async fn info(&self, path: &Path) -> Result<MediaInfo, FfmpegError>;

    /// Grab the continuation frame (0.1s before the end); returns its timestamp.
    async fn extract_last_frame(
        &self,
        video_path: &Path,
        output_path: &Path,
    ) -> Result<f64, FfmpegError>;

    async fn thumbnail(
        &self,
        video_path: &Path,
        output_path: &Path,
        width: u32,
    ) -> Result<(), FfmpegError>;

    /// Lossless concatenation in input order. `list_path` receives the
    /// generated list file; the caller owns its cleanup.
    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;

    async fn merge_with_transition(
        &self,
        inputs: &[PathBuf],
        transition: Transition,
        transition_secs: f64,
        fps: u32,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;

    async fn scale(
        &self,
        input: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;

    async fn interpolate(
        &self,
        input: &Path,
        output_path: &Path,
        fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;

    async fn upscale_interpolate(
        &self,
        input: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;

    async fn encode(
        &self,
        input: &Path,
        output_path: &Path,
        settings: EncodeSettings,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError>;
}

// ---------------------------------------------------------------------------
// MediaTool
// ---------------------------------------------------------------------------

/// Handle to the ffmpeg/ffprobe binaries.
#[derive(Debug, Clone)]
pub struct MediaTool {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for MediaTool {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl MediaTool {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Run `ffprobe` on a video file and return the parsed JSON output.
    pub async fn probe(&self, path: &Path) -> Result<FfprobeOutput, FfmpegError> {
        ensure_exists(path)?;

        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(FfmpegError::NotFound)?;

        if !output.status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        serde_json::from_str::<FfprobeOutput>(&stdout)
            .map_err(|e| FfmpegError::ParseError(format!("{e}: {stdout}")))
    }

    /// Extract a single full-resolution frame at `timestamp_secs`.
    pub async fn extract_frame(
        &self,
        video_path: &Path,
        output_path: &Path,
        timestamp_secs: f64,
    ) -> Result<(), FfmpegError> {
        ensure_exists(video_path)?;
        let args = vec![
            OsString::from("-ss"),
            format!("{timestamp_secs:.3}").into(),
            "-i".into(),
            video_path.into(),
            "-frames:v".into(),
            "1".into(),
            "-q:v".into(),
            "2".into(),
            output_path.into(),
        ];
        self.run(args, 0.0, None).await?;
        ensure_output(output_path)
    }
}

#[async_trait]
impl MediaService for MediaTool {
    /// Probe a file and reduce the output to [`MediaInfo`].
    async fn info(&self, path: &Path) -> Result<MediaInfo, FfmpegError> {
        Ok(MediaInfo::from_probe(&self.probe(path).await?))
    }

    /// Extract the continuation frame (0.1s before the end) of a segment.
    async fn extract_last_frame(
        &self,
        video_path: &Path,
        output_path: &Path,
    ) -> Result<f64, FfmpegError> {
        let info = self.info(video_path).await?;
        let timestamp = continuation_timestamp(info.duration_secs);
        self.extract_frame(video_path, output_path, timestamp).await?;
        Ok(timestamp)
    }

    /// Write a JPEG thumbnail scaled to `width` (height keeps aspect).
    async fn thumbnail(
        &self,
        video_path: &Path,
        output_path: &Path,
        width: u32,
    ) -> Result<(), FfmpegError> {
        let info = self.info(video_path).await?;
        let timestamp = (info.duration_secs / 2.0).min(1.0);
        let args = vec![
            OsString::from("-ss"),
            format!("{timestamp:.3}").into(),
            "-i".into(),
            video_path.into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            format!("scale={width}:-2").into(),
            "-q:v".into(),
            "3".into(),
            output_path.into(),
        ];
        self.run(args, 0.0, None).await?;
        ensure_output(output_path)
    }

    /// Concatenate clips losslessly (stream copy) via a generated list file.
    ///
    /// The list file is written to `list_path`; the caller owns its cleanup.
    async fn concat(
        &self,
        inputs: &[PathBuf],
        list_path: &Path,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        if inputs.is_empty() {
            return Err(FfmpegError::InvalidArgument(
                "concat needs at least one input".to_string(),
            ));
        }
        let mut expected = 0.0;
        for input in inputs {
            expected += self.info(input).await?.duration_secs;
        }
        tokio::fs::write(list_path, concat_list(inputs)).await?;

        let args = vec![
            OsString::from("-f"),
            "concat".into(),
            "-safe".into(),
            "0".into(),
            "-i".into(),
            list_path.into(),
            "-c".into(),
            "copy".into(),
            output_path.into(),
        ];
        self.run(args, expected, on_progress).await?;
        ensure_output(output_path)
    }

    /// Join clips with an overlapping transition (re-encodes).
    async fn merge_with_transition(
        &self,
        inputs: &[PathBuf],
        transition: Transition,
        transition_secs: f64,
        fps: u32,
        output_path: &Path,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        let mut durations = Vec::with_capacity(inputs.len());
        for input in inputs {
            durations.push(self.info(input).await?.duration_secs);
        }
        let (graph, out_label) = xfade_filter(&durations, transition, transition_secs, fps)?;

        let mut args: Vec<OsString> = Vec::new();
        for input in inputs {
            args.push("-i".into());
            args.push(input.into());
        }
        args.extend([
            OsString::from("-filter_complex"),
            graph.into(),
            "-map".into(),
            format!("[{out_label}]").into(),
        ]);
        args.extend(intermediate_args().into_iter().map(OsString::from));
        args.push(output_path.into());

        self.run(args, merged_duration(&durations, transition_secs), on_progress)
            .await?;
        ensure_output(output_path)
    }

    /// Resize with lanczos resampling.
    async fn scale(
        &self,
        input: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.filter_pass(input, output_path, scale_filter(width, height), on_progress)
            .await
    }

    /// Raise the frame rate with motion-compensated interpolation.
    async fn interpolate(
        &self,
        input: &Path,
        output_path: &Path,
        fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        self.filter_pass(input, output_path, interpolate_filter(fps), on_progress)
            .await
    }

    /// Upscale and interpolate in a single pass.
    async fn upscale_interpolate(
        &self,
        input: &Path,
        output_path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        let filter = format!("{},{}", scale_filter(width, height), interpolate_filter(fps));
        self.filter_pass(input, output_path, filter, on_progress).await
    }

    /// Final encode with the selected format and quality tier.
    async fn encode(
        &self,
        input: &Path,
        output_path: &Path,
        settings: EncodeSettings,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        let expected = self.info(input).await?.duration_secs;
        let mut args = vec![OsString::from("-i"), input.into()];
        args.extend(encode_args(settings).into_iter().map(OsString::from));
        args.push("-an".into());
        args.push(output_path.into());
        self.run(args, expected, on_progress).await?;
        ensure_output(output_path)
    }
}

impl MediaTool {
    // ---- private helpers ----

    /// Re-encode `input` through a single video filter.
    async fn filter_pass(
        &self,
        input: &Path,
        output_path: &Path,
        filter: String,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        let expected = self.info(input).await?.duration_secs;
        let mut args = vec![
            OsString::from("-i"),
            input.into(),
            "-vf".into(),
            filter.into(),
        ];
        args.extend(intermediate_args().into_iter().map(OsString::from));
        args.push(output_path.into());
        self.run(args, expected, on_progress).await?;
        ensure_output(output_path)
    }

    /// Spawn ffmpeg, relay `-progress` output, and capture the stderr tail.
    async fn run(
        &self,
        args: Vec<OsString>,
        expected_duration_secs: f64,
        on_progress: Option<ProgressFn<'_>>,
    ) -> Result<(), FfmpegError> {
        tracing::debug!(binary = %self.ffmpeg.display(), ?args, "Running ffmpeg");

        let mut child = Command::new(&self.ffmpeg)
            .args(["-y", "-hide_banner", "-nostats", "-progress", "pipe:1"])
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(FfmpegError::NotFound)?;

        let stderr_task = child.stderr.take().map(|mut stderr| {
            tokio::spawn(async move {
                let mut buf = Vec::new();
                let _ = stderr.read_to_end(&mut buf).await;
                let start = buf.len().saturating_sub(STDERR_TAIL_BYTES);
                String::from_utf8_lossy(&buf[start..]).to_string()
            })
        });

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                let Some(callback) = on_progress else {
                    continue;
                };
                match parse_progress_line(&line) {
                    Some(ProgressLine::OutTimeUs(us)) => {
                        callback(progress_percent(us, expected_duration_secs));
                    }
                    Some(ProgressLine::End) => callback(100.0),
                    None => {}
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(FfmpegError::ExecutionFailed {
                exit_code: status.code(),
                stderr,
            });
        }
        Ok(())
    }
}

fn ensure_exists(path: &Path) -> Result<(), FfmpegError> {
    if !path.exists() {
        return Err(FfmpegError::VideoNotFound(
            path.to_string_lossy().to_string(),
        ));
    }
    Ok(())
}

fn ensure_output(path: &Path) -> Result<(), FfmpegError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(FfmpegError::OutputMissing(path.to_string_lossy().to_string())),
    }
}

// ---------------------------------------------------------------------------
// Parsing helpers
// ---------------------------------------------------------------------------

/// Find the first video stream in the ffprobe output.
fn first_video_stream(probe: &FfprobeOutput) -> Option<&FfprobeStream> {
    probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
}

/// Parse the video duration in seconds from ffprobe output.
pub fn parse_duration(probe: &FfprobeOutput) -> f64 {
    // Try format-level duration first.
    if let Some(d) = &probe.format.duration {
        if let Ok(secs) = d.parse::<f64>() {
            return secs;
        }
    }
    // Fall back to the first video stream's duration.
    if let Some(stream) = first_video_stream(probe) {
        if let Some(d) = &stream.duration {
            if let Ok(secs) = d.parse::<f64>() {
                return secs;
            }
        }
    }
    0.0
}

/// Parse the video framerate from ffprobe output.
///
/// The `r_frame_rate` field is a fraction like `"30/1"` or `"24000/1001"`.
pub fn parse_framerate(probe: &FfprobeOutput) -> f64 {
    first_video_stream(probe)
        .and_then(|s| s.r_frame_rate.as_deref())
        .map(parse_fraction)
        .unwrap_or(0.0)
}

/// Parse a fraction string like `"30/1"` into a float.
fn parse_fraction(s: &str) -> f64 {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() == 2 {
        let num = parts[0].parse::<f64>().unwrap_or(0.0);
        let den = parts[1].parse::<f64>().unwrap_or(1.0);
        if den > 0.0 {
            return num / den;
        }
    }
    s.parse::<f64>().unwrap_or(0.0)
}

/// Count total frames from ffprobe output.
pub fn parse_total_frames(probe: &FfprobeOutput) -> i64 {
    if let Some(stream) = first_video_stream(probe) {
        if let Some(nb) = &stream.nb_frames {
            if let Ok(n) = nb.parse::<i64>() {
                return n;
            }
        }
    }
    // Estimate from duration * framerate.
    let duration = parse_duration(probe);
    let fps = parse_framerate(probe);
    if duration > 0.0 && fps > 0.0 {
        return (duration * fps).round() as i64;
    }
    0
}

/// Find the first video stream's resolution.
pub fn parse_resolution(probe: &FfprobeOutput) -> (i32, i32) {
    first_video_stream(probe)
        .map(|s| (s.width.unwrap_or(0), s.height.unwrap_or(0)))
        .unwrap_or((0, 0))
}
