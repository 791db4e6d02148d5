// src/orchestrator.rs
// Batch orchestration: creates batches of placeholder assets, dispatches
// one generation per variant through the retry controller and merges each
// result back into history by `(batch id, asset id)`.
//
// Within a batch, calls are gated by a semaphore whose width comes from
// configuration. At width 1 the variants run strictly one after another.
// Batches, regenerations and videos are independent of each other.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::downloads::{DownloadSink, high_res_file_name, video_file_name};
use crate::errors::LuxeError;
use crate::history::History;
use crate::models::{
    Asset, AspectRatio, AssetId, Batch, BatchId, BatchView, EncodedImage, GenerationInputs,
    GenerationMode, GenerationSettings, GenerationTask, Resolution,
};
use crate::prompts::{self, Refinement};
use crate::region::Region;
use crate::retry::{RetryPolicy, with_retry};
use crate::services::{
    FeedbackInterpreter, GenerationRequest, ImageGenerator, VideoGenerator, VideoJobRequest,
    VideoResolution,
};
use crate::session::{ApiKey, SessionContext};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrchestratorOptions {
    pub retry: RetryPolicy,
    /// Generation calls in flight per batch.
    pub batch_concurrency: usize,
    pub video_poll_interval: Duration,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            batch_concurrency: 1,
            video_poll_interval: Duration::from_secs(10),
        }
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        Self {
            retry: config.retry,
            batch_concurrency: config.batch_concurrency.max(1),
            video_poll_interval: config.video_poll_interval,
        }
    }
}

/// External services the orchestrator drives.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ImageGenerator>,
    pub interpreter: Arc<dyn FeedbackInterpreter>,
    pub video: Arc<dyn VideoGenerator>,
    pub downloads: Arc<dyn DownloadSink>,
}

/// Handle on work running in the background.
#[derive(Debug)]
pub struct Dispatch {
    pub batch_id: BatchId,
    pub asset_id: Option<AssetId>,
    completion: JoinHandle<()>,
}

impl Dispatch {
    /// Wait until every call of this dispatch has settled.
    pub async fn settled(self) {
        if let Err(e) = self.completion.await {
            error!("Dispatch for batch {} ended abnormally: {}", self.batch_id, e);
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct VideoOptions {
    pub prompt: Option<String>,
    pub resolution: VideoResolution,
    pub aspect_ratio: Option<AspectRatio>,
}

/// Everything needed to run one variant again, captured under the lock.
struct VariantJob {
    batch_id: BatchId,
    asset_id: AssetId,
    task: GenerationTask,
    inputs: Arc<GenerationInputs>,
    settings: GenerationSettings,
    aspect_ratio: AspectRatio,
    /// Asset generation this job renders for.
    generation: u64,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    pub(crate) history: Arc<RwLock<History>>,
    pub(crate) session: Arc<SessionContext>,
    pub(crate) services: Collaborators,
    pub(crate) options: OrchestratorOptions,
}

impl BatchOrchestrator {
    pub fn new(session: Arc<SessionContext>, services: Collaborators, options: OrchestratorOptions) -> Self {
        Self {
            history: Arc::new(RwLock::new(History::new())),
            session,
            services,
            options,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    /// Snapshot of every batch, most recent first.
    pub async fn history(&self) -> Vec<BatchView> {
        self.history.read().await.views()
    }

    pub async fn batch(&self, batch_id: &BatchId) -> Option<BatchView> {
        self.history.read().await.batch(batch_id).map(Batch::view)
    }

    pub async fn asset(&self, asset_id: &AssetId) -> Option<Asset> {
        self.history
            .read()
            .await
            .find_asset(asset_id)
            .map(|(_, asset)| asset.clone())
    }

    /// Create a batch of loading placeholders and start generating them.
    ///
    /// The batch is in history before this returns; generation continues in
    /// the background.
    pub async fn start_generation(
        &self,
        mode: GenerationMode,
        inputs: GenerationInputs,
        settings: GenerationSettings,
    ) -> Result<Dispatch, LuxeError> {
        inputs.validate(mode)?;
        let key = self.session.authorize()?;

        let batch = Batch::create(mode, inputs, settings);
        let batch_id = batch.id.clone();
        let jobs: Vec<VariantJob> = batch
            .assets
            .values()
            .map(|asset| VariantJob {
                batch_id: batch_id.clone(),
                asset_id: asset.id.clone(),
                task: asset.task.clone(),
                inputs: batch.inputs.clone(),
                settings: batch.settings.clone(),
                aspect_ratio: asset.aspect_ratio,
                generation: asset.generation(),
            })
            .collect();

        self.history.write().await.prepend(batch);
        info!("Started {:?} batch {} with {} variants", mode, batch_id, jobs.len());

        let this = self.clone();
        let driver_batch = batch_id.clone();
        let completion = tokio::spawn(async move {
            this.run_batch(key, driver_batch, jobs).await;
        });

        Ok(Dispatch {
            batch_id,
            asset_id: None,
            completion,
        })
    }

    async fn run_batch(&self, key: ApiKey, batch_id: BatchId, jobs: Vec<VariantJob>) {
        let gate = Arc::new(Semaphore::new(self.options.batch_concurrency.max(1)));
        let mut workers = Vec::with_capacity(jobs.len());

        for job in jobs {
            // Acquired here, in task order, so variants start in sequence.
            let permit = match gate.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!("Dispatch gate for batch {} closed: {}", batch_id, e);
                    return;
                }
            };

            let this = self.clone();
            let key = key.clone();
            workers.push(tokio::spawn(async move {
                let _permit = permit;
                let request = GenerationRequest {
                    parts: prompts::generation_parts(&job.task, &job.inputs, &job.settings, None),
                    aspect_ratio: job.aspect_ratio,
                    resolution: job.settings.resolution,
                };
                let result = this.generate(&key, &request, job.task.label()).await;
                if let Err(e) = &result {
                    warn!("Variant {} of batch {} failed: {}", job.asset_id, job.batch_id, e);
                }

                this.merge_result(&job, |asset| match &result {
                    Ok(image) => asset.apply_image(image),
                    Err(e) => asset.apply_error(e),
                })
                .await;
            }));
        }

        for worker in workers {
            if let Err(e) = worker.await {
                error!("Generation worker for batch {} panicked: {}", batch_id, e);
            }
        }
        info!("Batch {} settled", batch_id);
    }

    pub(crate) async fn generate(
        &self,
        key: &ApiKey,
        request: &GenerationRequest,
        label: &str,
    ) -> Result<EncodedImage, LuxeError> {
        let generator = &self.services.generator;
        with_retry(&self.options.retry, label, || generator.generate(key, request)).await
    }

    /// Apply a finished render to its asset, unless a newer render of the
    /// same asset has started since.
    async fn merge_result<F>(&self, job: &VariantJob, apply: F)
    where
        F: FnOnce(&mut Asset),
    {
        self.history
            .write()
            .await
            .update_asset(&job.batch_id, &job.asset_id, |asset| {
                if asset.generation() == job.generation {
                    apply(asset);
                } else {
                    debug!(
                        "Dropping stale result for {} (generation {}, now {})",
                        job.asset_id,
                        job.generation,
                        asset.generation()
                    );
                }
            });
    }

    /// Capture what is needed to re-run a variant and apply `begin` to the
    /// asset, all under one write lock. The job carries the asset's
    /// generation as left by `begin`.
    async fn prepare_variant<F, T>(&self, asset_id: &AssetId, begin: F) -> Result<(VariantJob, T), LuxeError>
    where
        F: FnOnce(&mut Asset) -> Result<T, LuxeError>,
    {
        let mut history = self.history.write().await;
        let batch_id = history
            .owner_of(asset_id)
            .cloned()
            .ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))?;
        let batch = history
            .batch(&batch_id)
            .ok_or_else(|| LuxeError::NotFound(format!("batch {batch_id}")))?;
        let asset = batch
            .assets
            .get(asset_id)
            .ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))?;

        let mut job = VariantJob {
            batch_id: batch_id.clone(),
            asset_id: asset_id.clone(),
            task: asset.task.clone(),
            inputs: batch.inputs.clone(),
            settings: batch.settings.clone(),
            aspect_ratio: asset.aspect_ratio,
            generation: asset.generation(),
        };

        let mut outcome = None;
        history.update_asset(&batch_id, asset_id, |asset| {
            outcome = Some(begin(asset).map(|value| (value, asset.generation())));
        });
        let (value, generation) = outcome.ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))??;
        job.generation = generation;
        Ok((job, value))
    }

    /// Generate a variant again with the user's correction applied.
    ///
    /// Reuses the variant's instruction, aspect ratio, resolution and the
    /// batch's original inputs, plus any stored feedback reference images
    /// and region.
    pub async fn regenerate(&self, asset_id: &AssetId, feedback_text: &str) -> Result<Dispatch, LuxeError> {
        let feedback_text = feedback_text.trim().to_string();
        self.regenerate_with(asset_id, |_| Ok(feedback_text)).await
    }

    /// Regenerate with the feedback text chosen by `feedback` from the asset
    /// as it is under the write lock.
    pub(crate) async fn regenerate_with<F>(&self, asset_id: &AssetId, feedback: F) -> Result<Dispatch, LuxeError>
    where
        F: FnOnce(&Asset) -> Result<String, LuxeError>,
    {
        let key = self.session.authorize()?;

        let (job, (refinement, resolution)) = self
            .prepare_variant(asset_id, |asset| {
                let refinement = Refinement {
                    feedback: feedback(&*asset)?,
                    reference_images: asset.feedback.reference_images.clone(),
                    region: Region::effective(asset.feedback.region),
                };
                asset.begin_regeneration();
                Ok((refinement, asset.resolution))
            })
            .await?;

        info!("Regenerating {} in batch {}", job.asset_id, job.batch_id);
        let this = self.clone();
        let batch_id = job.batch_id.clone();
        let completion = tokio::spawn(async move {
            let request = GenerationRequest {
                parts: prompts::generation_parts(&job.task, &job.inputs, &job.settings, Some(&refinement)),
                aspect_ratio: job.aspect_ratio,
                resolution,
            };
            let result = this.generate(&key, &request, job.task.label()).await;
            if let Err(e) = &result {
                warn!("Regeneration of {} failed: {}", job.asset_id, e);
            }

            this.merge_result(&job, |asset| {
                match &result {
                    Ok(image) => {
                        asset.apply_image(image);
                        asset.feedback.draft = None;
                    }
                    Err(e) => asset.apply_error(e),
                }
                asset.feedback.reference_images.clear();
                asset.feedback.region = None;
                asset.feedback.interpretation = None;
            })
            .await;
        });

        Ok(Dispatch {
            batch_id,
            asset_id: Some(asset_id.clone()),
            completion,
        })
    }

    /// Re-render a variant at `resolution` and hand the result to the
    /// download sink. Refused while the variant is still rendering.
    pub async fn download_high_res(&self, asset_id: &AssetId, resolution: Resolution) -> Result<Dispatch, LuxeError> {
        let key = self.session.authorize()?;

        let (job, current) = self
            .prepare_variant(asset_id, Asset::begin_high_res)
            .await?;

        let refinement = current.map(|image| Refinement {
            feedback: "Reproduce the attached current image faithfully at higher resolution \
                       without changing its content."
                .to_string(),
            reference_images: vec![image],
            region: None,
        });

        info!("Rendering {} at {}", job.asset_id, resolution);
        let this = self.clone();
        let batch_id = job.batch_id.clone();
        let completion = tokio::spawn(async move {
            let request = GenerationRequest {
                parts: prompts::generation_parts(&job.task, &job.inputs, &job.settings, refinement.as_ref()),
                aspect_ratio: job.aspect_ratio,
                resolution,
            };
            let result = this.generate(&key, &request, job.task.label()).await;

            if let Ok(image) = &result {
                match image.decode() {
                    Ok(bytes) => {
                        let file_name = high_res_file_name(&job.settings.file_stem(), &job.asset_id, resolution);
                        this.services
                            .downloads
                            .save(&file_name, &image.mime_type, bytes.into());
                    }
                    Err(e) => warn!("Could not decode {} for download: {}", job.asset_id, e),
                }
            }

            this.merge_result(&job, |asset| match &result {
                Ok(image) => {
                    asset.apply_image(image);
                    asset.resolution = resolution;
                }
                Err(e) => asset.apply_error(e),
            })
            .await;
        });

        Ok(Dispatch {
            batch_id,
            asset_id: Some(asset_id.clone()),
            completion,
        })
    }

    /// Render a short showcase video from a variant's current image.
    pub async fn generate_video(&self, asset_id: &AssetId, options: VideoOptions) -> Result<Dispatch, LuxeError> {
        let key = self.session.authorize()?;

        let (job, image) = self
            .prepare_variant(asset_id, |asset| {
                if asset.video.is_loading {
                    return Err(LuxeError::Validation("A video is already rendering for this image".to_string()));
                }
                let image = asset
                    .current_image()
                    .ok_or_else(|| LuxeError::Validation("The image is not ready yet".to_string()))?;
                asset.video.is_loading = true;
                asset.video.error = None;
                Ok(image)
            })
            .await?;

        let aspect_ratio = match options.aspect_ratio.unwrap_or(job.aspect_ratio) {
            AspectRatio::Portrait | AspectRatio::Story => AspectRatio::Story,
            _ => AspectRatio::Widescreen,
        };
        let prompt = options
            .prompt
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| {
                format!(
                    "A slow, elegant showcase shot ({}) with gentle camera movement and the jewelry \
                     catching soft light.",
                    job.task.label()
                )
            });
        let request = VideoJobRequest {
            image,
            prompt,
            resolution: options.resolution,
            aspect_ratio,
        };

        info!("Starting video for {}", job.asset_id);
        let this = self.clone();
        let batch_id = job.batch_id.clone();
        let completion = tokio::spawn(async move {
            let result = this.render_video(&key, &job.asset_id, &request).await;
            if let Err(e) = &result {
                warn!("Video for {} failed: {}", job.asset_id, e);
            }

            this.history
                .write()
                .await
                .update_asset(&job.batch_id, &job.asset_id, |asset| {
                    asset.video.is_loading = false;
                    match result {
                        Ok(url) => {
                            asset.video.video_url = Some(url);
                            asset.video.error = None;
                        }
                        Err(e) => asset.video.error = Some(e.user_message()),
                    }
                });
        });

        Ok(Dispatch {
            batch_id,
            asset_id: Some(asset_id.clone()),
            completion,
        })
    }

    async fn render_video(&self, key: &ApiKey, asset_id: &AssetId, request: &VideoJobRequest) -> Result<String, LuxeError> {
        let video = &self.services.video;
        let retry = &self.options.retry;

        let job = with_retry(retry, "video start", || video.start_video_job(key, request)).await?;
        loop {
            tokio::time::sleep(self.options.video_poll_interval).await;
            let status = with_retry(retry, "video poll", || video.poll(key, &job)).await?;
            if !status.done {
                continue;
            }

            let uri = status.video_uri.ok_or(LuxeError::NoVideoReturned)?;
            let bytes = with_retry(retry, "video fetch", || video.fetch(key, &uri)).await?;
            let file_name = video_file_name(asset_id);
            return Ok(self.services.downloads.save(&file_name, "video/mp4", bytes));
        }
    }
}
