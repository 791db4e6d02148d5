// src/services/image_processor.rs
use image::{GenericImageView, ImageFormat as ImgFormat};
use uuid::Uuid;

use crate::errors::LuxeError;
use crate::models::{EncodedImage, UploadedFile};

/// Longest edge sent to the model for an uploaded photo.
pub const MAX_UPLOAD_EDGE: u32 = 2048;

pub struct ImageProcessor;

impl Default for ImageProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageProcessor {
    pub fn new() -> Self {
        Self
    }

    pub fn validate_image(&self, data: &[u8]) -> Result<(u32, u32), LuxeError> {
        let img = image::load_from_memory(data)
            .map_err(|e| LuxeError::ImageProcessing(format!("Invalid image format: {}", e)))?;

        let (width, height) = img.dimensions();

        if width > 8192 || height > 8192 {
            return Err(LuxeError::ImageProcessing(
                "Image dimensions exceed 8192x8192".to_string(),
            ));
        }

        Ok((width, height))
    }

    /// Downscale so the longest edge is at most `max_size`. Returns the bytes
    /// and their mime type.
    pub fn resize_if_needed(&self, data: &[u8], max_size: u32) -> Result<(Vec<u8>, String), LuxeError> {
        let format = image::guess_format(data)
            .map_err(|e| LuxeError::ImageProcessing(format!("Unknown image format: {}", e)))?;

        let img = image::load_from_memory(data)
            .map_err(|e| LuxeError::ImageProcessing(format!("Failed to load image: {}", e)))?;

        let (width, height) = img.dimensions();

        if width <= max_size && height <= max_size {
            return Ok((data.to_vec(), format.to_mime_type().to_string()));
        }

        let ratio = (max_size as f32 / width.max(height) as f32).min(1.0);
        let new_width = ((width as f32 * ratio) as u32).max(1);
        let new_height = ((height as f32 * ratio) as u32).max(1);

        let resized = img.resize(new_width, new_height, image::imageops::FilterType::Lanczos3);

        let mut output = Vec::new();
        resized
            .write_to(&mut std::io::Cursor::new(&mut output), ImgFormat::Png)
            .map_err(|e| {
                LuxeError::ImageProcessing(format!("Failed to encode resized image: {}", e))
            })?;

        Ok((output, ImgFormat::Png.to_mime_type().to_string()))
    }

    /// Validate, shrink and base64-encode one uploaded photo.
    pub fn prepare_upload(&self, file_name: &str, data: &[u8]) -> Result<UploadedFile, LuxeError> {
        self.validate_image(data)?;
        let (bytes, mime_type) = self.resize_if_needed(data, MAX_UPLOAD_EDGE)?;

        Ok(UploadedFile {
            id: Uuid::new_v4(),
            file_name: file_name.to_string(),
            image: EncodedImage::from_bytes(mime_type, &bytes),
        })
    }
}
