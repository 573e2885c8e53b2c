use std::sync::Arc;

use reelforge_comfyui::InferenceService;
use reelforge_core::ffmpeg::{MediaService, MediaTool};
use reelforge_db::DbPool;
use reelforge_events::ProgressBus;

use crate::config::PipelineConfig;

/// Collaborators shared by every handler.
///
/// Constructed once by the process entry point and cloned into each
/// worker; nothing here is a global.
#[derive(Clone)]
pub struct PipelineContext {
    pub pool: DbPool,
    pub inference: Arc<dyn InferenceService>,
    pub media: Arc<dyn MediaService>,
    pub bus: Arc<ProgressBus>,
    pub config: Arc<PipelineConfig>,
}

impl PipelineContext {
    pub fn new(
        pool: DbPool,
        inference: Arc<dyn InferenceService>,
        bus: Arc<ProgressBus>,
        config: PipelineConfig,
    ) -> Self {
        let media = Arc::new(MediaTool::new(
            config.ffmpeg_path.clone(),
            config.ffprobe_path.clone(),
        ));
        Self {
            pool,
            inference,
            media,
            bus,
            config: Arc::new(config),
        }
    }

    /// Swap the media backend, e.g. for a scripted one in tests.
    pub fn with_media(mut self, media: Arc<dyn MediaService>) -> Self {
        self.media = media;
        self
    }
}
