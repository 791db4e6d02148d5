// src/services/mod.rs
pub mod gemini;
pub mod image_processor;

pub use gemini::GeminiService;
pub use image_processor::ImageProcessor;

use async_trait::async_trait;
use bytes::Bytes;

use crate::errors::LuxeError;
use crate::models::{AspectRatio, EncodedImage, Resolution};
use crate::region::Region;
use crate::session::ApiKey;

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image(EncodedImage),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub parts: Vec<PromptPart>,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpretationRequest {
    pub original_prompt: String,
    pub feedback_text: String,
    pub current_image: Option<EncodedImage>,
    pub reference_images: Vec<EncodedImage>,
    pub region: Option<Region>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoJobRequest {
    pub image: EncodedImage,
    pub prompt: String,
    pub resolution: VideoResolution,
    pub aspect_ratio: AspectRatio,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum VideoResolution {
    #[default]
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "1080p")]
    FullHd,
}

impl VideoResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            VideoResolution::Hd => "720p",
            VideoResolution::FullHd => "1080p",
        }
    }
}

/// Handle of a long-running video job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoJob {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VideoJobStatus {
    pub done: bool,
    pub video_uri: Option<String>,
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    async fn generate(&self, key: &ApiKey, request: &GenerationRequest) -> Result<EncodedImage, LuxeError>;
}

#[async_trait]
pub trait FeedbackInterpreter: Send + Sync {
    /// Restate the user's correction request in plain language.
    async fn interpret(&self, key: &ApiKey, request: &InterpretationRequest) -> Result<String, LuxeError>;
}

#[async_trait]
pub trait VideoGenerator: Send + Sync {
    async fn start_video_job(&self, key: &ApiKey, request: &VideoJobRequest) -> Result<VideoJob, LuxeError>;

    async fn poll(&self, key: &ApiKey, job: &VideoJob) -> Result<VideoJobStatus, LuxeError>;

    async fn fetch(&self, key: &ApiKey, video_uri: &str) -> Result<Bytes, LuxeError>;
}
