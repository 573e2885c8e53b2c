//! Fixed node templates, one per model variant and mode.
//!
//! Templates only substitute parameters; their structure never depends
//! on the input values.

use reelforge_core::generation::GenerationParams;

use super::graph::{GraphBuilder, Input, NodeId, Output};

// ---------------------------------------------------------------------------
// Model files
// ---------------------------------------------------------------------------

pub const SD15_CHECKPOINT: &str = "v1-5-pruned-emaonly.safetensors";
pub const ANIMATEDIFF_MOTION_MODULE: &str = "mm_sd_v15_v2.ckpt";
pub const IPADAPTER_PRESET: &str = "PLUS (high strength)";
pub const SVD_CHECKPOINT: &str = "svd_xt.safetensors";
pub const WAN_T2V_UNET: &str = "wan2.1_t2v_14B_fp8_e4m3fn.safetensors";
pub const WAN_I2V_UNET: &str = "wan2.1_i2v_480p_14B_fp8_e4m3fn.safetensors";
pub const WAN_TEXT_ENCODER: &str = "umt5_xxl_fp8_e4m3fn_scaled.safetensors";
pub const WAN_VAE: &str = "wan_2.1_vae.safetensors";
pub const WAN_CLIP_VISION: &str = "clip_vision_h.safetensors";

/// Sampling shift for the large model.
const WAN_SHIFT: f64 = 8.0;
/// Motion strength for the single-image model.
const SVD_MOTION_BUCKET: u32 = 127;

// ---------------------------------------------------------------------------
// Shared fragments
// ---------------------------------------------------------------------------

fn seed(params: &GenerationParams) -> Input {
    Input::from(params.seed)
}

fn text_encode(b: &mut GraphBuilder, clip: Output, text: &str) -> NodeId {
    b.add("CLIPTextEncode", [("text", text.into()), ("clip", clip.into())])
}

#[allow(clippy::too_many_arguments)]
fn ksampler(
    b: &mut GraphBuilder,
    params: &GenerationParams,
    model: Output,
    positive: Output,
    negative: Output,
    latent: Output,
    sampler: &str,
    scheduler: &str,
) -> NodeId {
    b.add(
        "KSampler",
        [
            ("model", model.into()),
            ("positive", positive.into()),
            ("negative", negative.into()),
            ("latent_image", latent.into()),
            ("seed", seed(params)),
            ("steps", params.steps.into()),
            ("cfg", params.cfg_scale.into()),
            ("sampler_name", sampler.into()),
            ("scheduler", scheduler.into()),
            ("denoise", params.denoise.into()),
        ],
    )
}

/// Decode latents and write an H.264 video through the video-combine node.
fn decode_and_combine(b: &mut GraphBuilder, params: &GenerationParams, samples: Output, vae: Output) {
    let decoded = b.add("VAEDecode", [("samples", samples.into()), ("vae", vae.into())]);
    b.add(
        "VHS_VideoCombine",
        [
            ("images", decoded.out(0).into()),
            ("frame_rate", params.fps.into()),
            ("loop_count", 0u32.into()),
            ("filename_prefix", params.filename_prefix.as_str().into()),
            ("format", "video/h264-mp4".into()),
            ("pix_fmt", "yuv420p".into()),
            ("crf", 19u32.into()),
            ("pingpong", false.into()),
            ("save_output", true.into()),
        ],
    );
}

fn load_image(b: &mut GraphBuilder, image: &str) -> NodeId {
    b.add("LoadImage", [("image", image.into())])
}

fn reference(params: &GenerationParams) -> &str {
    params.reference_image.as_deref().unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Baseline motion-module model
// ---------------------------------------------------------------------------

fn animatediff_loader(b: &mut GraphBuilder, model: Output) -> NodeId {
    b.add(
        "ADE_AnimateDiffLoaderGen1",
        [
            ("model", model.into()),
            ("model_name", ANIMATEDIFF_MOTION_MODULE.into()),
            ("beta_schedule", "sqrt_linear (AnimateDiff)".into()),
        ],
    )
}

pub(super) fn animatediff_text(b: &mut GraphBuilder, params: &GenerationParams) {
    let ckpt = b.add("CheckpointLoaderSimple", [("ckpt_name", SD15_CHECKPOINT.into())]);
    let motion = animatediff_loader(b, ckpt.out(0));
    let positive = text_encode(b, ckpt.out(1), &params.prompt);
    let negative = text_encode(b, ckpt.out(1), &params.negative_prompt);
    let latent = b.add(
        "EmptyLatentImage",
        [
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("batch_size", params.frame_count.into()),
        ],
    );
    let sampled = ksampler(
        b,
        params,
        motion.out(0),
        positive.out(0),
        negative.out(0),
        latent.out(0),
        "euler_ancestral",
        "normal",
    );
    decode_and_combine(b, params, sampled.out(0), ckpt.out(2));
}

/// Image-conditioned variant: the reference is encoded once, repeated
/// across the batch, and steered with an image-prompt adapter.
pub(super) fn animatediff_image(b: &mut GraphBuilder, params: &GenerationParams) {
    let ckpt = b.add("CheckpointLoaderSimple", [("ckpt_name", SD15_CHECKPOINT.into())]);
    let image = load_image(b, reference(params));
    let adapter = b.add(
        "IPAdapterUnifiedLoader",
        [("model", ckpt.out(0).into()), ("preset", IPADAPTER_PRESET.into())],
    );
    let adapted = b.add(
        "IPAdapterAdvanced",
        [
            ("model", adapter.out(0).into()),
            ("ipadapter", adapter.out(1).into()),
            ("image", image.out(0).into()),
            ("weight", params.adapter_weight.into()),
            ("weight_type", "linear".into()),
            ("combine_embeds", "concat".into()),
            ("start_at", 0.0f64.into()),
            ("end_at", 1.0f64.into()),
            ("embeds_scaling", "V only".into()),
        ],
    );
    let motion = animatediff_loader(b, adapted.out(0));
    let positive = text_encode(b, ckpt.out(1), &params.prompt);
    let negative = text_encode(b, ckpt.out(1), &params.negative_prompt);
    let scaled = b.add(
        "ImageScale",
        [
            ("image", image.out(0).into()),
            ("upscale_method", "lanczos".into()),
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("crop", "center".into()),
        ],
    );
    let encoded = b.add(
        "VAEEncode",
        [("pixels", scaled.out(0).into()), ("vae", ckpt.out(2).into())],
    );
    let repeated = b.add(
        "RepeatLatentBatch",
        [("samples", encoded.out(0).into()), ("amount", params.frame_count.into())],
    );
    let sampled = ksampler(
        b,
        params,
        motion.out(0),
        positive.out(0),
        negative.out(0),
        repeated.out(0),
        "euler_ancestral",
        "normal",
    );
    decode_and_combine(b, params, sampled.out(0), ckpt.out(2));
}

// ---------------------------------------------------------------------------
// Single-image-conditioned model
// ---------------------------------------------------------------------------

pub(super) fn stable_video(b: &mut GraphBuilder, params: &GenerationParams) {
    let ckpt = b.add("ImageOnlyCheckpointLoader", [("ckpt_name", SVD_CHECKPOINT.into())]);
    let image = load_image(b, reference(params));
    let cond = b.add(
        "SVD_img2vid_Conditioning",
        [
            ("clip_vision", ckpt.out(1).into()),
            ("init_image", image.out(0).into()),
            ("vae", ckpt.out(2).into()),
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("video_frames", params.frame_count.into()),
            ("motion_bucket_id", SVD_MOTION_BUCKET.into()),
            ("fps", params.fps.into()),
            ("augmentation_level", 0.0f64.into()),
        ],
    );
    let guided = b.add(
        "VideoLinearCFGGuidance",
        [("model", ckpt.out(0).into()), ("min_cfg", 1.0f64.into())],
    );
    let sampled = ksampler(
        b,
        params,
        guided.out(0),
        cond.out(0),
        cond.out(1),
        cond.out(2),
        "euler",
        "karras",
    );
    decode_and_combine(b, params, sampled.out(0), ckpt.out(2));
}

// ---------------------------------------------------------------------------
// Large masked-conditioning model
// ---------------------------------------------------------------------------

struct WanLoaders {
    model: NodeId,
    clip: NodeId,
    vae: NodeId,
}

fn wan_loaders(b: &mut GraphBuilder, unet: &str) -> WanLoaders {
    let unet = b.add(
        "UNETLoader",
        [("unet_name", unet.into()), ("weight_dtype", "default".into())],
    );
    let clip = b.add(
        "CLIPLoader",
        [("clip_name", WAN_TEXT_ENCODER.into()), ("type", "wan".into())],
    );
    let vae = b.add("VAELoader", [("vae_name", WAN_VAE.into())]);
    let model = b.add(
        "ModelSamplingSD3",
        [("model", unet.out(0).into()), ("shift", WAN_SHIFT.into())],
    );
    WanLoaders { model, clip, vae }
}

pub(super) fn wan_text(b: &mut GraphBuilder, params: &GenerationParams) {
    let l = wan_loaders(b, WAN_T2V_UNET);
    let positive = text_encode(b, l.clip.out(0), &params.prompt);
    let negative = text_encode(b, l.clip.out(0), &params.negative_prompt);
    let latent = b.add(
        "EmptyHunyuanLatentVideo",
        [
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("length", params.frame_count.into()),
            ("batch_size", 1u32.into()),
        ],
    );
    let sampled = ksampler(
        b,
        params,
        l.model.out(0),
        positive.out(0),
        negative.out(0),
        latent.out(0),
        "uni_pc",
        "simple",
    );
    decode_and_combine(b, params, sampled.out(0), l.vae.out(0));
}

/// The start image is injected as masked conditioning; the node emits
/// adjusted positive/negative conditioning and the latent.
pub(super) fn wan_image(b: &mut GraphBuilder, params: &GenerationParams) {
    let l = wan_loaders(b, WAN_I2V_UNET);
    let vision = b.add("CLIPVisionLoader", [("clip_name", WAN_CLIP_VISION.into())]);
    let image = load_image(b, reference(params));
    let vision_out = b.add(
        "CLIPVisionEncode",
        [
            ("clip_vision", vision.out(0).into()),
            ("image", image.out(0).into()),
            ("crop", "none".into()),
        ],
    );
    let positive = text_encode(b, l.clip.out(0), &params.prompt);
    let negative = text_encode(b, l.clip.out(0), &params.negative_prompt);
    let cond = b.add(
        "WanImageToVideo",
        [
            ("positive", positive.out(0).into()),
            ("negative", negative.out(0).into()),
            ("vae", l.vae.out(0).into()),
            ("clip_vision_output", vision_out.out(0).into()),
            ("start_image", image.out(0).into()),
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("length", params.frame_count.into()),
            ("batch_size", 1u32.into()),
        ],
    );
    let sampled = ksampler(
        b,
        params,
        l.model.out(0),
        cond.out(0),
        cond.out(1),
        cond.out(2),
        "uni_pc",
        "simple",
    );
    decode_and_combine(b, params, sampled.out(0), l.vae.out(0));
}

// ---------------------------------------------------------------------------
// Still image
// ---------------------------------------------------------------------------

/// Text-to-image graph used to synthesize a missing reference image.
pub(super) fn still_image(b: &mut GraphBuilder, params: &GenerationParams) {
    let ckpt = b.add("CheckpointLoaderSimple", [("ckpt_name", SD15_CHECKPOINT.into())]);
    let positive = text_encode(b, ckpt.out(1), &params.prompt);
    let negative = text_encode(b, ckpt.out(1), &params.negative_prompt);
    let latent = b.add(
        "EmptyLatentImage",
        [
            ("width", params.width.into()),
            ("height", params.height.into()),
            ("batch_size", 1u32.into()),
        ],
    );
    let sampled = ksampler(
        b,
        params,
        ckpt.out(0),
        positive.out(0),
        negative.out(0),
        latent.out(0),
        "dpmpp_2m",
        "karras",
    );
    let decoded = b.add(
        "VAEDecode",
        [("samples", sampled.out(0).into()), ("vae", ckpt.out(2).into())],
    );
    b.add(
        "SaveImage",
        [
            ("images", decoded.out(0).into()),
            ("filename_prefix", params.filename_prefix.as_str().into()),
        ],
    );
}
