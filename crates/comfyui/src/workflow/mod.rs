//! Graph Builder: generation parameters to node graph.
//!
//! [`build`] validates the parameters for the chosen model and mode, then
//! fills in that combination's fixed template. It is pure; a fresh
//! [`GraphBuilder`] is created per call so concurrent builds never share
//! id state.

pub mod graph;
mod templates;

use reelforge_core::error::CoreError;
use reelforge_core::generation::{GenerationMode, GenerationParams, ModelId};

pub use graph::{Graph, GraphBuilder, Input, Node, NodeId, Output};
pub use templates::{SD15_CHECKPOINT, SVD_CHECKPOINT, WAN_I2V_UNET, WAN_T2V_UNET};

/// Build the node graph for one video generation.
pub fn build(
    mode: GenerationMode,
    model: ModelId,
    params: &GenerationParams,
) -> Result<Graph, CoreError> {
    params.validate(model, mode)?;

    let mut b = GraphBuilder::new();
    match (model, mode) {
        (ModelId::AnimateDiff, GenerationMode::TextToVideo) => templates::animatediff_text(&mut b, params),
        (ModelId::AnimateDiff, GenerationMode::ImageToVideo) => templates::animatediff_image(&mut b, params),
        (ModelId::StableVideo, GenerationMode::ImageToVideo) => templates::stable_video(&mut b, params),
        (ModelId::Wan, GenerationMode::TextToVideo) => templates::wan_text(&mut b, params),
        (ModelId::Wan, GenerationMode::ImageToVideo) => templates::wan_image(&mut b, params),
        // Rejected by `validate`.
        (ModelId::StableVideo, GenerationMode::TextToVideo) => {
            return Err(CoreError::Validation(format!(
                "Model '{model}' does not support {}",
                mode.as_str()
            )))
        }
    }
    Ok(b.finish())
}

/// Build a single-frame text-to-image graph.
pub fn build_still_image(params: &GenerationParams) -> Result<Graph, CoreError> {
    if params.prompt.trim().is_empty() {
        return Err(CoreError::Validation(
            "Prompt must not be empty for still-image generation".to_string(),
        ));
    }
    reelforge_core::resolution::validate_dimensions(params.width, params.height)?;
    if params.width % 8 != 0 || params.height % 8 != 0 {
        return Err(CoreError::Validation(format!(
            "Width and height must be multiples of 8 (got {}x{})",
            params.width, params.height
        )));
    }
    if params.steps == 0 {
        return Err(CoreError::Validation("Steps must be greater than 0".to_string()));
    }

    let mut b = GraphBuilder::new();
    templates::still_image(&mut b, params);
    Ok(b.finish())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use reelforge_core::generation::DEFAULT_ADAPTER_WEIGHT;

    use super::*;

    fn params(model: ModelId, mode: GenerationMode) -> GenerationParams {
        let (width, height) = match model {
            ModelId::StableVideo => (1024, 576),
            _ => (832, 480),
        };
        GenerationParams {
            prompt: "a red kite over dunes".into(),
            negative_prompt: "blurry".into(),
            width,
            height,
            frame_count: model.default_frame_count(),
            fps: model.native_fps(),
            steps: 20,
            cfg_scale: 5.0,
            seed: 1234,
            denoise: 1.0,
            reference_image: (mode == GenerationMode::ImageToVideo).then(|| "ref.png".to_string()),
            adapter_weight: DEFAULT_ADAPTER_WEIGHT,
            filename_prefix: "clip_1".into(),
        }
    }

    const COMBOS: [(ModelId, GenerationMode); 5] = [
        (ModelId::AnimateDiff, GenerationMode::TextToVideo),
        (ModelId::AnimateDiff, GenerationMode::ImageToVideo),
        (ModelId::StableVideo, GenerationMode::ImageToVideo),
        (ModelId::Wan, GenerationMode::TextToVideo),
        (ModelId::Wan, GenerationMode::ImageToVideo),
    ];

    #[test]
    fn same_inputs_give_identical_graphs() {
        for (model, mode) in COMBOS {
            let p = params(model, mode);
            let a = build(mode, model, &p).unwrap();
            let b = build(mode, model, &p).unwrap();
            assert_eq!(a.len(), b.len());
            assert_eq!(a.class_types(), b.class_types());
            assert_eq!(a.edges(), b.edges());
            assert_eq!(
                serde_json::to_string(&a).unwrap(),
                serde_json::to_string(&b).unwrap(),
                "{model} {mode:?}"
            );
        }
    }

    #[test]
    fn node_ids_restart_at_one_per_call() {
        for (model, mode) in COMBOS {
            let p = params(model, mode);
            for _ in 0..3 {
                let graph = build(mode, model, &p).unwrap();
                let ids: Vec<u32> = graph.nodes().map(|(id, _)| id.get()).collect();
                let expected: Vec<u32> = (1..=graph.len() as u32).collect();
                assert_eq!(ids, expected);
            }
        }
    }

    #[test]
    fn links_only_point_backward() {
        for (model, mode) in COMBOS {
            let graph = build(mode, model, &params(model, mode)).unwrap();
            for (from, _, to, name) in graph.edges() {
                assert!(from < to, "{model} {mode:?}: {name} links {from} -> {to}");
                assert!(graph.node(from).is_some());
            }
        }
    }

    #[test]
    fn only_the_seed_differs_between_seeds() {
        let (model, mode) = (ModelId::Wan, GenerationMode::ImageToVideo);
        let mut p = params(model, mode);
        let a = build(mode, model, &p).unwrap();
        p.seed = 99;
        let b = build(mode, model, &p).unwrap();
        assert_eq!(a.class_types(), b.class_types());
        assert_eq!(a.edges(), b.edges());
        let (_, sampler) = b.find("KSampler").unwrap();
        assert_eq!(sampler.value("seed"), Some(&serde_json::json!(99)));
    }

    #[test]
    fn templates_use_expected_operations() {
        let graph = build(
            GenerationMode::ImageToVideo,
            ModelId::AnimateDiff,
            &params(ModelId::AnimateDiff, GenerationMode::ImageToVideo),
        )
        .unwrap();
        let ops = graph.class_types();
        assert!(ops.contains(&"RepeatLatentBatch"));
        assert!(ops.contains(&"IPAdapterAdvanced"));
        let (_, adapter) = graph.find("IPAdapterAdvanced").unwrap();
        assert_eq!(adapter.value("weight"), Some(&serde_json::json!(DEFAULT_ADAPTER_WEIGHT)));

        let wan = build(
            GenerationMode::ImageToVideo,
            ModelId::Wan,
            &params(ModelId::Wan, GenerationMode::ImageToVideo),
        )
        .unwrap();
        let (_, load) = wan.find("LoadImage").unwrap();
        assert_eq!(load.value("image"), Some(&serde_json::json!("ref.png")));
        assert!(wan.find("WanImageToVideo").is_some());

        let svd = build(
            GenerationMode::ImageToVideo,
            ModelId::StableVideo,
            &params(ModelId::StableVideo, GenerationMode::ImageToVideo),
        )
        .unwrap();
        assert_eq!(svd.class_types()[0], "ImageOnlyCheckpointLoader");
    }

    #[test]
    fn missing_reference_image_fails_fast() {
        let mut p = params(ModelId::Wan, GenerationMode::ImageToVideo);
        p.reference_image = None;
        assert_matches!(
            build(GenerationMode::ImageToVideo, ModelId::Wan, &p),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn unsupported_combination_rejected() {
        let p = params(ModelId::StableVideo, GenerationMode::ImageToVideo);
        assert!(build(GenerationMode::TextToVideo, ModelId::StableVideo, &p).is_err());
    }

    #[test]
    fn concurrent_builds_do_not_interfere() {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                std::thread::spawn(move || {
                    let mut p = params(ModelId::Wan, GenerationMode::TextToVideo);
                    p.seed = i;
                    build(GenerationMode::TextToVideo, ModelId::Wan, &p).unwrap()
                })
            })
            .collect();
        for handle in handles {
            let graph = handle.join().unwrap();
            assert_eq!(graph.nodes().next().map(|(id, _)| id.get()), Some(1));
        }
    }

    #[test]
    fn still_image_graph_saves_one_image() {
        let mut p = params(ModelId::AnimateDiff, GenerationMode::TextToVideo);
        p.frame_count = 1;
        let graph = build_still_image(&p).unwrap();
        assert_eq!(graph.class_types().last(), Some(&"SaveImage"));
        let (_, latent) = graph.find("EmptyLatentImage").unwrap();
        assert_eq!(latent.value("batch_size"), Some(&serde_json::json!(1)));

        p.prompt = " ".into();
        assert!(build_still_image(&p).is_err());
    }
}
