// src/lib.rs
pub mod config;
pub mod downloads;
pub mod errors;
pub mod feedback;
pub mod handlers;
pub mod history;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod region;
pub mod retry;
pub mod services;
pub mod session;
pub mod uploads;

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::downloads::MemoryDownloads;
use crate::orchestrator::BatchOrchestrator;
use crate::services::ImageProcessor;
use crate::uploads::FormState;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: BatchOrchestrator,
    pub form: Arc<RwLock<FormState>>,
    pub downloads: Arc<MemoryDownloads>,
    pub image_processor: Arc<ImageProcessor>,
}
