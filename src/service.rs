//! Service facade shared by the HTTP surface.

use crate::{
    config::Config,
    metrics::{MetricsSnapshot, PipelineMetrics},
    pipeline::{ExtractionPipeline, LopdfTextExtractor, PdfTextExtractor, PipelineOutcome, PipelineSettings},
    session::{SessionInfo, SessionStore, StorageStats},
    transforms::{Answer, Summary, TextTransforms, TransformError, TransformModels, Translation},
    upload::{UploadError, UploadLimits, UploadProcessor, UploadReceipt, UploadedFile},
    upstream::{ClientError, FailoverRouter, RouterStatus, UpstreamError},
};
use async_trait::async_trait;
use std::sync::Arc;

/// Abstraction over the extraction service used by external surfaces.
#[async_trait]
pub trait InkreadApi: Send + Sync {
    /// Snapshot of the credential router.
    fn router_status(&self) -> RouterStatus;

    /// Send a short prompt upstream to verify that a credential works.
    async fn probe(&self) -> Result<String, UpstreamError>;

    /// Validate and store an upload batch.
    async fn upload(&self, files: Vec<UploadedFile>) -> Result<UploadReceipt, UploadError>;

    /// Limits applied to uploads.
    fn upload_limits(&self) -> UploadLimits;

    /// Run the extraction pipeline over a session.
    async fn extract(&self, session_id: &str, handwritten: bool) -> PipelineOutcome;

    /// Session snapshot.
    fn session_info(&self, session_id: &str) -> SessionInfo;

    /// Remove a session. Returns whether it existed.
    fn delete_session(&self, session_id: &str) -> bool;

    /// Store-wide counters.
    fn storage_stats(&self) -> StorageStats;

    /// Pipeline counters.
    fn metrics_snapshot(&self) -> MetricsSnapshot;

    /// Grade-level summary.
    async fn summarize(&self, text: &str, grade_level: &str) -> Result<Summary, TransformError>;

    /// Translation.
    async fn translate(&self, text: &str, target_language: &str)
    -> Result<Translation, TransformError>;

    /// Question answering.
    async fn answer(&self, text: &str, question: &str) -> Result<Answer, TransformError>;
}

/// Owns the router, store, pipeline, upload intake and transforms.
///
/// Construct once at process start and share through an `Arc`.
pub struct InkreadService {
    store: Arc<SessionStore>,
    router: Arc<FailoverRouter>,
    pipeline: ExtractionPipeline,
    uploads: Arc<UploadProcessor>,
    transforms: TextTransforms,
    metrics: Arc<PipelineMetrics>,
}

impl InkreadService {
    /// Wire the service around an existing router and store.
    pub fn new(router: Arc<FailoverRouter>, store: Arc<SessionStore>, config: &Config) -> Self {
        let pdf: Arc<dyn PdfTextExtractor> = Arc::new(LopdfTextExtractor);
        let metrics = Arc::new(PipelineMetrics::new());
        let pipeline = ExtractionPipeline::new(
            store.clone(),
            router.clone(),
            pdf.clone(),
            metrics.clone(),
            PipelineSettings::from_config(config),
        );
        let uploads = Arc::new(UploadProcessor::new(
            store.clone(),
            pdf,
            UploadLimits::from_config(config),
        ));
        let transforms = TextTransforms::new(router.clone(), TransformModels::from_config(config));

        Self {
            store,
            router,
            pipeline,
            uploads,
            transforms,
            metrics,
        }
    }

    /// Build the service with Gemini clients for the configured credentials.
    pub fn from_config(config: &Config) -> Result<Self, ClientError> {
        let router = Arc::new(FailoverRouter::from_config(config)?);
        let store = Arc::new(SessionStore::new(config.session_ttl));
        Ok(Self::new(router, store, config))
    }

    /// Shared session store, for the background sweeper.
    pub fn store(&self) -> Arc<SessionStore> {
        self.store.clone()
    }
}

#[async_trait]
impl InkreadApi for InkreadService {
    fn router_status(&self) -> RouterStatus {
        self.router.status()
    }

    async fn probe(&self) -> Result<String, UpstreamError> {
        self.transforms.probe().await
    }

    async fn upload(&self, files: Vec<UploadedFile>) -> Result<UploadReceipt, UploadError> {
        let uploads = self.uploads.clone();
        tokio::task::spawn_blocking(move || uploads.accept(files))
            .await
            .map_err(|error| UploadError::Worker(error.to_string()))?
    }

    fn upload_limits(&self) -> UploadLimits {
        self.uploads.limits().clone()
    }

    async fn extract(&self, session_id: &str, handwritten: bool) -> PipelineOutcome {
        self.pipeline.process(session_id, handwritten).await
    }

    fn session_info(&self, session_id: &str) -> SessionInfo {
        self.store.get_info(session_id)
    }

    fn delete_session(&self, session_id: &str) -> bool {
        self.store.delete_session(session_id)
    }

    fn storage_stats(&self) -> StorageStats {
        self.store.stats()
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    async fn summarize(&self, text: &str, grade_level: &str) -> Result<Summary, TransformError> {
        self.transforms.summarize(text, grade_level).await
    }

    async fn translate(
        &self,
        text: &str,
        target_language: &str,
    ) -> Result<Translation, TransformError> {
        self.transforms.translate(text, target_language).await
    }

    async fn answer(&self, text: &str, question: &str) -> Result<Answer, TransformError> {
        self.transforms.answer(text, question).await
    }
}
