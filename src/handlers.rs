// src/handlers.rs
use actix_multipart::Multipart;
use actix_web::{Error, HttpResponse, web};
use futures_util::TryStreamExt;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::AppState;
use crate::errors::LuxeError;
use crate::feedback::FeedbackSubmission;
use crate::models::{AspectRatio, AssetId, EncodedImage, GenerationMode, GenerationSettings, Resolution};
use crate::orchestrator::VideoOptions;
use crate::region::{Point, Region};
use crate::services::VideoResolution;
use crate::session::ApiKey;
use crate::uploads::UploadSlot;

pub const DOWNLOADS_PREFIX: &str = "/api/v1/downloads";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetKeyRequest {
    pub api_key: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartGenerationRequest {
    pub mode: GenerationMode,
    #[serde(default)]
    pub settings: GenerationSettings,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegenerateRequest {
    #[serde(default)]
    pub feedback: String,
}

/// Two raw drag corners, in image percentages.
#[derive(Debug, Deserialize)]
pub struct DragSelection {
    pub start: Point,
    pub end: Point,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyFeedbackRequest {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reference_images: Vec<EncodedImage>,
    #[serde(default)]
    pub region: Option<Region>,
    #[serde(default)]
    pub selection: Option<DragSelection>,
}

impl From<VerifyFeedbackRequest> for FeedbackSubmission {
    fn from(request: VerifyFeedbackRequest) -> Self {
        let region = request
            .region
            .or_else(|| request.selection.map(|s| Region::from_corners(s.start, s.end)));
        FeedbackSubmission {
            text: request.text,
            reference_images: request.reference_images,
            region,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HighResRequest {
    #[serde(default = "default_high_res")]
    pub resolution: Resolution,
}

fn default_high_res() -> Resolution {
    Resolution::FourK
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRequest {
    pub prompt: Option<String>,
    #[serde(default)]
    pub resolution: VideoResolution,
    pub aspect_ratio: Option<AspectRatio>,
}

pub async fn session_status(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "hasKey": data.orchestrator.session().check_key()
    }))
}

pub async fn set_key(
    data: web::Data<AppState>,
    body: web::Json<SetKeyRequest>,
) -> Result<HttpResponse, Error> {
    let key = ApiKey::new(body.into_inner().api_key)?;
    data.orchestrator.session().set_key(key);
    Ok(HttpResponse::Ok().json(serde_json::json!({ "hasKey": true })))
}

pub async fn upload_images(
    path: web::Path<String>,
    mut payload: Multipart,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let slot: UploadSlot = path.into_inner().parse()?;
    let mut uploaded = Vec::new();

    while let Some(mut field) = payload.try_next().await? {
        let file_name = field
            .content_disposition()
            .get_filename()
            .map(|name| name.to_string())
            .ok_or_else(|| LuxeError::Validation("No filename provided".to_string()))?;

        let mut image_data = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            image_data.extend_from_slice(&chunk);
        }

        let upload = data.image_processor.prepare_upload(&file_name, &image_data)?;
        uploaded.push(upload);
    }

    if uploaded.is_empty() {
        return Err(LuxeError::Validation("No files in upload".to_string()).into());
    }

    let mut form = data.form.write().await;
    for upload in &uploaded {
        form.add(slot, upload.clone());
    }
    info!("Stored {} upload(s) in {:?} slot", uploaded.len(), slot);

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "uploaded": uploaded,
        "count": uploaded.len()
    })))
}

pub async fn get_form(data: web::Data<AppState>) -> HttpResponse {
    let form = data.form.read().await;
    HttpResponse::Ok().json(&*form)
}

pub async fn clear_slot(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let slot: UploadSlot = path.into_inner().parse()?;
    data.form.write().await.clear(slot);
    Ok(HttpResponse::NoContent().finish())
}

pub async fn remove_upload(
    path: web::Path<(String, Uuid)>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let (slot, upload_id) = path.into_inner();
    let slot: UploadSlot = slot.parse()?;
    data.form.write().await.remove(slot, upload_id)?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn start_generation(
    data: web::Data<AppState>,
    body: web::Json<StartGenerationRequest>,
) -> Result<HttpResponse, Error> {
    let request = body.into_inner();
    let inputs = data.form.read().await.inputs();

    let dispatch = data
        .orchestrator
        .start_generation(request.mode, inputs, request.settings)
        .await?;
    let batch = data
        .orchestrator
        .batch(&dispatch.batch_id)
        .await
        .ok_or_else(|| LuxeError::NotFound(format!("batch {}", dispatch.batch_id)))?;

    Ok(HttpResponse::Accepted().json(&batch))
}

pub async fn list_batches(data: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(data.orchestrator.history().await)
}

pub async fn regenerate_asset(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<RegenerateRequest>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    data.orchestrator
        .regenerate(&asset_id, &body.feedback)
        .await?;
    asset_response(&data, &asset_id).await
}

pub async fn verify_feedback(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: web::Json<VerifyFeedbackRequest>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    let feedback = data
        .orchestrator
        .verify_feedback(&asset_id, body.into_inner().into())
        .await?;
    Ok(HttpResponse::Ok().json(&feedback))
}

pub async fn confirm_feedback(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    data.orchestrator.confirm_feedback(&asset_id).await?;
    asset_response(&data, &asset_id).await
}

pub async fn modify_feedback(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    let feedback = data.orchestrator.modify_feedback(&asset_id).await?;
    Ok(HttpResponse::Ok().json(&feedback))
}

pub async fn download_high_res(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: Option<web::Json<HighResRequest>>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    let resolution = body.map(|b| b.resolution).unwrap_or_else(default_high_res);
    data.orchestrator
        .download_high_res(&asset_id, resolution)
        .await?;
    asset_response(&data, &asset_id).await
}

pub async fn generate_video(
    path: web::Path<String>,
    data: web::Data<AppState>,
    body: Option<web::Json<VideoRequest>>,
) -> Result<HttpResponse, Error> {
    let asset_id = AssetId::new(path.into_inner());
    let request = body.map(|b| b.into_inner()).unwrap_or_default();
    let options = VideoOptions {
        prompt: request.prompt,
        resolution: request.resolution,
        aspect_ratio: request.aspect_ratio,
    };
    data.orchestrator.generate_video(&asset_id, options).await?;
    asset_response(&data, &asset_id).await
}

pub async fn get_download(
    path: web::Path<String>,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let file_name = path.into_inner();
    let file = data
        .downloads
        .get(&file_name)
        .ok_or_else(|| LuxeError::NotFound(format!("download {file_name}")))?;

    Ok(HttpResponse::Ok()
        .content_type(file.mime_type)
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{file_name}\""),
        ))
        .body(file.data))
}

async fn asset_response(data: &web::Data<AppState>, asset_id: &AssetId) -> Result<HttpResponse, Error> {
    let asset = data
        .orchestrator
        .asset(asset_id)
        .await
        .ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))?;
    Ok(HttpResponse::Accepted().json(&asset))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .route("/session", web::get().to(session_status))
            .route("/session/key", web::post().to(set_key))
            .route("/uploads", web::get().to(get_form))
            .route("/uploads/{slot}", web::post().to(upload_images))
            .route("/uploads/{slot}", web::delete().to(clear_slot))
            .route("/uploads/{slot}/{upload_id}", web::delete().to(remove_upload))
            .route("/batches", web::post().to(start_generation))
            .route("/batches", web::get().to(list_batches))
            .route("/assets/{asset_id}/regenerate", web::post().to(regenerate_asset))
            .route("/assets/{asset_id}/feedback/verify", web::post().to(verify_feedback))
            .route("/assets/{asset_id}/feedback/confirm", web::post().to(confirm_feedback))
            .route("/assets/{asset_id}/feedback/modify", web::post().to(modify_feedback))
            .route("/assets/{asset_id}/high-res", web::post().to(download_high_res))
            .route("/assets/{asset_id}/video", web::post().to(generate_video))
            .route("/downloads/{file_name}", web::get().to(get_download)),
    );
}
