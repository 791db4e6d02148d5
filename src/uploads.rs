// src/uploads.rs
use std::str::FromStr;

use serde::Serialize;
use uuid::Uuid;

use crate::errors::LuxeError;
use crate::models::{GenerationInputs, UploadedFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadSlot {
    Product,
    Reference,
    Model,
}

impl FromStr for UploadSlot {
    type Err = LuxeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "product" => Ok(UploadSlot::Product),
            "reference" => Ok(UploadSlot::Reference),
            "model" => Ok(UploadSlot::Model),
            other => Err(LuxeError::Validation(format!("Unknown upload slot: {other}"))),
        }
    }
}

/// Photos the user has staged for the next batch.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormState {
    pub product_images: Vec<UploadedFile>,
    pub reference_images: Vec<UploadedFile>,
    pub model_image: Option<UploadedFile>,
}

impl FormState {
    /// The model slot holds one photo; a new one replaces it.
    pub fn add(&mut self, slot: UploadSlot, file: UploadedFile) {
        match slot {
            UploadSlot::Product => self.product_images.push(file),
            UploadSlot::Reference => self.reference_images.push(file),
            UploadSlot::Model => self.model_image = Some(file),
        }
    }

    pub fn remove(&mut self, slot: UploadSlot, id: Uuid) -> Result<(), LuxeError> {
        let removed = match slot {
            UploadSlot::Product => remove_by_id(&mut self.product_images, id),
            UploadSlot::Reference => remove_by_id(&mut self.reference_images, id),
            UploadSlot::Model => {
                if self.model_image.as_ref().map(|f| f.id) == Some(id) {
                    self.model_image = None;
                    true
                } else {
                    false
                }
            }
        };
        if removed {
            Ok(())
        } else {
            Err(LuxeError::NotFound(format!("upload {id}")))
        }
    }

    pub fn clear(&mut self, slot: UploadSlot) {
        match slot {
            UploadSlot::Product => self.product_images.clear(),
            UploadSlot::Reference => self.reference_images.clear(),
            UploadSlot::Model => self.model_image = None,
        }
    }

    /// Snapshot handed to a new batch.
    pub fn inputs(&self) -> GenerationInputs {
        GenerationInputs {
            product_images: self.product_images.clone(),
            reference_images: self.reference_images.clone(),
            model_image: self.model_image.clone(),
        }
    }
}

fn remove_by_id(files: &mut Vec<UploadedFile>, id: Uuid) -> bool {
    let before = files.len();
    files.retain(|f| f.id != id);
    files.len() != before
}
