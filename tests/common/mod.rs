#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use mockall::mock;
use uuid::Uuid;

use luxefit::downloads::MemoryDownloads;
use luxefit::errors::LuxeError;
use luxefit::models::{EncodedImage, GenerationInputs, UploadedFile};
use luxefit::orchestrator::{BatchOrchestrator, Collaborators, OrchestratorOptions};
use luxefit::retry::RetryPolicy;
use luxefit::services::{
    FeedbackInterpreter, GenerationRequest, ImageGenerator, InterpretationRequest, PromptPart,
    VideoGenerator, VideoJob, VideoJobRequest, VideoJobStatus,
};
use luxefit::session::{ApiKey, SessionContext};

mock! {
    pub Interpreter {}

    #[async_trait]
    impl FeedbackInterpreter for Interpreter {
        async fn interpret(&self, key: &ApiKey, request: &InterpretationRequest) -> Result<String, LuxeError>;
    }
}

/// Image generator that sleeps, counts and records every call.
#[derive(Default)]
pub struct FakeGenerator {
    pub delay: Duration,
    /// Labels whose generation fails fatally.
    pub failing_labels: Vec<String>,
    /// Calls that fail with a retryable 503 before anything succeeds.
    pub transient_failures: AtomicUsize,
    pub calls: AtomicUsize,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| prompt_text(r))
            .collect()
    }

    /// 1-based number of the first call whose prompt contains `needle`.
    pub fn call_mentioning(&self, needle: &str) -> Option<usize> {
        self.prompts().iter().position(|p| p.contains(needle)).map(|i| i + 1)
    }

    pub fn last_request(&self) -> Option<GenerationRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

/// Data URL of the image `FakeGenerator` returns on its `call`-th call.
pub fn rendered_url(call: usize) -> String {
    EncodedImage::from_bytes("image/png", format!("image-{call}").as_bytes()).data_url()
}

pub fn prompt_text(request: &GenerationRequest) -> String {
    match request.parts.first() {
        Some(PromptPart::Text(text)) => text.clone(),
        _ => String::new(),
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(&self, _key: &ApiKey, request: &GenerationRequest) -> Result<EncodedImage, LuxeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests.lock().unwrap().push(request.clone());

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(LuxeError::upstream(Some(503), "Service Unavailable"));
        }

        let text = prompt_text(request);
        if self.failing_labels.iter().any(|label| text.contains(label.as_str())) {
            return Err(LuxeError::upstream(Some(400), "Invalid argument"));
        }

        Ok(EncodedImage::from_bytes("image/png", format!("image-{call}").as_bytes()))
    }
}

/// Video service finishing after a fixed number of polls.
pub struct FakeVideo {
    pub polls_until_done: usize,
    pub video_uri: Option<String>,
    pub polls: AtomicUsize,
    pub started: AtomicUsize,
}

impl FakeVideo {
    pub fn new(polls_until_done: usize, video_uri: Option<&str>) -> Self {
        Self {
            polls_until_done,
            video_uri: video_uri.map(str::to_string),
            polls: AtomicUsize::new(0),
            started: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl VideoGenerator for FakeVideo {
    async fn start_video_job(&self, _key: &ApiKey, _request: &VideoJobRequest) -> Result<VideoJob, LuxeError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        Ok(VideoJob {
            name: "operations/video-1".to_string(),
        })
    }

    async fn poll(&self, _key: &ApiKey, _job: &VideoJob) -> Result<VideoJobStatus, LuxeError> {
        let polls = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        let done = polls >= self.polls_until_done;
        Ok(VideoJobStatus {
            done,
            video_uri: if done { self.video_uri.clone() } else { None },
        })
    }

    async fn fetch(&self, _key: &ApiKey, _video_uri: &str) -> Result<Bytes, LuxeError> {
        Ok(Bytes::from_static(b"mp4"))
    }
}

pub struct Harness {
    pub orchestrator: BatchOrchestrator,
    pub generator: Arc<FakeGenerator>,
    pub video: Arc<FakeVideo>,
    pub downloads: Arc<MemoryDownloads>,
}

pub fn options(batch_concurrency: usize) -> OrchestratorOptions {
    OrchestratorOptions {
        retry: RetryPolicy::new(3, Duration::from_millis(100)),
        batch_concurrency,
        video_poll_interval: Duration::from_secs(5),
    }
}

pub fn harness_with(
    generator: FakeGenerator,
    interpreter: Arc<dyn FeedbackInterpreter>,
    video: FakeVideo,
    options: OrchestratorOptions,
    key: Option<&str>,
) -> Harness {
    let generator = Arc::new(generator);
    let video = Arc::new(video);
    let downloads = Arc::new(MemoryDownloads::new("/api/v1/downloads"));
    let session = Arc::new(SessionContext::new(key.map(|k| ApiKey::new(k).unwrap())));

    let orchestrator = BatchOrchestrator::new(
        session,
        Collaborators {
            generator: generator.clone(),
            interpreter,
            video: video.clone(),
            downloads: downloads.clone(),
        },
        options,
    );

    Harness {
        orchestrator,
        generator,
        video,
        downloads,
    }
}

/// Harness whose interpreter must never be called.
pub fn harness(generator: FakeGenerator) -> Harness {
    let mut interpreter = MockInterpreter::new();
    interpreter.expect_interpret().never();
    harness_with(
        generator,
        Arc::new(interpreter),
        FakeVideo::new(2, Some("https://video.test/v.mp4")),
        options(1),
        Some("test-key"),
    )
}

pub fn upload(name: &str) -> UploadedFile {
    UploadedFile {
        id: Uuid::new_v4(),
        file_name: name.to_string(),
        image: EncodedImage::from_bytes("image/png", name.as_bytes()),
    }
}

pub fn try_on_inputs() -> GenerationInputs {
    GenerationInputs {
        product_images: vec![upload("ring.png")],
        reference_images: vec![upload("reference.png")],
        model_image: Some(upload("model.png")),
    }
}

pub fn scene_inputs() -> GenerationInputs {
    GenerationInputs {
        product_images: vec![upload("ring.png")],
        ..Default::default()
    }
}
