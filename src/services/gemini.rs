// src/services/gemini.rs
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::debug;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::Config;
use crate::errors::LuxeError;
use crate::models::EncodedImage;
use crate::prompts;
use crate::services::{
    FeedbackInterpreter, GenerationRequest, ImageGenerator, InterpretationRequest, PromptPart,
    VideoGenerator, VideoJob, VideoJobRequest, VideoJobStatus,
};
use crate::session::ApiKey;

/// Generative Language REST client for images, text and video.
pub struct GeminiService {
    api_base: String,
    image_model: String,
    text_model: String,
    video_model: String,
    client: Client,
}

impl GeminiService {
    pub fn new(config: &Config) -> Result<Self, LuxeError> {
        let client = Client::builder()
            .timeout(config.http_timeout)
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| LuxeError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            image_model: config.image_model.clone(),
            text_model: config.text_model.clone(),
            video_model: config.video_model.clone(),
            client,
        })
    }

    fn model_url(&self, model: &str, method: &str) -> String {
        format!("{}/models/{}:{}", self.api_base, model, method)
    }

    async fn post_json(&self, key: &ApiKey, url: &str, body: &Value) -> Result<Value, LuxeError> {
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", key.expose())
            .json(body)
            .send()
            .await?;
        read_json(response).await
    }

    async fn get_json(&self, key: &ApiKey, url: &str) -> Result<Value, LuxeError> {
        let response = self
            .client
            .get(url)
            .header("x-goog-api-key", key.expose())
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json(response: reqwest::Response) -> Result<Value, LuxeError> {
    let status = response.status();
    if !status.is_success() {
        let error_text = response.text().await.unwrap_or_default();
        return Err(LuxeError::upstream(
            Some(status.as_u16()),
            upstream_message(&error_text),
        ));
    }

    response
        .json()
        .await
        .map_err(|e| LuxeError::Transport(format!("Failed to parse model response: {}", e)))
}

/// Prefer the API's own error message over the raw body.
fn upstream_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.trim().to_string())
}

fn request_parts(parts: &[PromptPart]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| match part {
            PromptPart::Text(text) => json!({ "text": text }),
            PromptPart::Image(image) => inline_image(image),
        })
        .collect()
}

fn inline_image(image: &EncodedImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.data
        }
    })
}

/// First inline image in a generateContent response.
fn extract_image(result: &Value) -> Option<EncodedImage> {
    result["candidates"]
        .as_array()?
        .iter()
        .filter_map(|candidate| candidate["content"]["parts"].as_array())
        .flatten()
        .find_map(|part| {
            let inline = part.get("inlineData").or_else(|| part.get("inline_data"))?;
            let data = inline["data"].as_str()?;
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            Some(EncodedImage {
                mime_type: mime_type.to_string(),
                data: data.to_string(),
            })
        })
}

fn extract_text(result: &Value) -> Option<String> {
    let text = result["candidates"][0]["content"]["parts"]
        .as_array()?
        .iter()
        .filter_map(|part| part["text"].as_str())
        .collect::<Vec<_>>()
        .join("");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn parse_video_status(result: &Value) -> VideoJobStatus {
    let done = result["done"].as_bool().unwrap_or(false);
    let video_uri = result["response"]["generateVideoResponse"]["generatedSamples"][0]["video"]["uri"]
        .as_str()
        .or_else(|| result["response"]["generatedVideos"][0]["video"]["uri"].as_str())
        .map(str::to_string);
    VideoJobStatus { done, video_uri }
}

#[async_trait]
impl ImageGenerator for GeminiService {
    async fn generate(&self, key: &ApiKey, request: &GenerationRequest) -> Result<EncodedImage, LuxeError> {
        let body = json!({
            "contents": [{ "role": "user", "parts": request_parts(&request.parts) }],
            "generationConfig": {
                "responseModalities": ["IMAGE"],
                "imageConfig": {
                    "aspectRatio": request.aspect_ratio.as_str(),
                    "imageSize": request.resolution.as_str()
                }
            }
        });

        debug!(
            "Requesting {} image at {} ({})",
            self.image_model,
            request.resolution,
            request.aspect_ratio.as_str()
        );
        let result = self
            .post_json(key, &self.model_url(&self.image_model, "generateContent"), &body)
            .await?;

        extract_image(&result).ok_or(LuxeError::NoImageReturned)
    }
}

#[async_trait]
impl FeedbackInterpreter for GeminiService {
    async fn interpret(&self, key: &ApiKey, request: &InterpretationRequest) -> Result<String, LuxeError> {
        let mut parts = vec![json!({ "text": prompts::interpretation_prompt(request) })];
        if let Some(current) = &request.current_image {
            parts.push(json!({ "text": "Current image:" }));
            parts.push(inline_image(current));
        }
        if !request.reference_images.is_empty() {
            parts.push(json!({ "text": "Reference images from the user:" }));
            parts.extend(request.reference_images.iter().map(inline_image));
        }

        let body = json!({ "contents": [{ "role": "user", "parts": parts }] });
        let result = self
            .post_json(key, &self.model_url(&self.text_model, "generateContent"), &body)
            .await?;

        extract_text(&result).ok_or_else(|| LuxeError::upstream(None, "No text in interpretation response"))
    }
}

#[async_trait]
impl VideoGenerator for GeminiService {
    async fn start_video_job(&self, key: &ApiKey, request: &VideoJobRequest) -> Result<VideoJob, LuxeError> {
        let body = json!({
            "instances": [{
                "prompt": request.prompt,
                "image": {
                    "bytesBase64Encoded": request.image.data,
                    "mimeType": request.image.mime_type
                }
            }],
            "parameters": {
                "aspectRatio": request.aspect_ratio.as_str(),
                "resolution": request.resolution.as_str()
            }
        });

        let result = self
            .post_json(key, &self.model_url(&self.video_model, "predictLongRunning"), &body)
            .await?;

        let name = result["name"]
            .as_str()
            .ok_or_else(|| LuxeError::upstream(None, "No operation name in video response"))?;
        Ok(VideoJob {
            name: name.to_string(),
        })
    }

    async fn poll(&self, key: &ApiKey, job: &VideoJob) -> Result<VideoJobStatus, LuxeError> {
        let result = self
            .get_json(key, &format!("{}/{}", self.api_base, job.name))
            .await?;
        if let Some(message) = result["error"]["message"].as_str() {
            return Err(LuxeError::upstream(
                result["error"]["code"].as_u64().map(|c| c as u16),
                message,
            ));
        }
        Ok(parse_video_status(&result))
    }

    async fn fetch(&self, key: &ApiKey, video_uri: &str) -> Result<Bytes, LuxeError> {
        let response = self
            .client
            .get(video_uri)
            .header("x-goog-api-key", key.expose())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(LuxeError::upstream(Some(status.as_u16()), upstream_message(&error_text)));
        }
        Ok(response.bytes().await?)
    }
}
