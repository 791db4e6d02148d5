// src/main.rs
use std::sync::Arc;

use actix_files::Files;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use anyhow::Context;
use log::{info, warn};
use tokio::sync::RwLock;

use luxefit::AppState;
use luxefit::config::Config;
use luxefit::downloads::MemoryDownloads;
use luxefit::handlers::{self, DOWNLOADS_PREFIX};
use luxefit::orchestrator::{BatchOrchestrator, Collaborators, OrchestratorOptions};
use luxefit::services::{GeminiService, ImageProcessor};
use luxefit::session::SessionContext;
use luxefit::uploads::FormState;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting LuxeFit studio service...");

    let config = Config::from_env().context("invalid configuration")?;
    if config.api_key.is_none() {
        warn!("No API key configured; generation is disabled until one is set");
    }

    // Initialize services
    let gemini = Arc::new(GeminiService::new(&config).context("failed to create model client")?);
    let downloads = Arc::new(MemoryDownloads::with_limit(DOWNLOADS_PREFIX, config.max_downloads));
    let session = Arc::new(SessionContext::new(config.api_key.clone()));

    let orchestrator = BatchOrchestrator::new(
        session,
        Collaborators {
            generator: gemini.clone(),
            interpreter: gemini.clone(),
            video: gemini,
            downloads: downloads.clone(),
        },
        OrchestratorOptions::from(&config),
    );

    let app_state = AppState {
        orchestrator,
        form: Arc::new(RwLock::new(FormState::default())),
        downloads,
        image_processor: Arc::new(ImageProcessor::new()),
    };

    let static_dir = config.static_dir.clone();
    info!("Starting HTTP server on {}", config.bind_addr);

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(app_state.clone()))
            .app_data(web::JsonConfig::default().limit(32 * 1024 * 1024))
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
            .route("/health", web::get().to(health_check))
            .service(Files::new("/", &static_dir).index_file("index.html"))
    })
    .bind(&config.bind_addr)
    .with_context(|| format!("failed to bind {}", config.bind_addr))?
    .run()
    .await?;

    Ok(())
}

async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "luxefit",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
