// src/models.rs
use std::fmt;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::LuxeError;
use crate::region::Region;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(String);

impl BatchId {
    /// Creation time in millis plus a random suffix.
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        BatchId(format!("{}-{}", at.timestamp_millis(), &suffix[..8]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(String);

impl AssetId {
    pub fn new(id: impl Into<String>) -> Self {
        AssetId(id.into())
    }

    pub fn for_task(batch_id: &BatchId, index: usize) -> Self {
        AssetId(format!("{batch_id}-{index}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenerationMode {
    TryOn,
    Scene,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    #[default]
    #[serde(rename = "2K")]
    TwoK,
    #[serde(rename = "4K")]
    FourK,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resolution::TwoK => "2K",
            Resolution::FourK => "4K",
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AspectRatio {
    #[serde(rename = "1:1")]
    Square,
    #[default]
    #[serde(rename = "3:4")]
    Portrait,
    #[serde(rename = "4:3")]
    Landscape,
    #[serde(rename = "9:16")]
    Story,
    #[serde(rename = "16:9")]
    Widescreen,
}

impl AspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Story => "9:16",
            AspectRatio::Widescreen => "16:9",
        }
    }
}

/// Base64 image payload as exchanged with the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodedImage {
    pub mime_type: String,
    pub data: String,
}

impl EncodedImage {
    pub fn from_bytes(mime_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.data)
    }

    pub fn decode(&self) -> Result<Vec<u8>, LuxeError> {
        general_purpose::STANDARD
            .decode(&self.data)
            .map_err(|e| LuxeError::ImageProcessing(format!("Invalid base64 payload: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub id: Uuid,
    pub file_name: String,
    pub image: EncodedImage,
}

impl UploadedFile {
    pub fn preview_url(&self) -> String {
        self.image.data_url()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationInputs {
    pub product_images: Vec<UploadedFile>,
    pub reference_images: Vec<UploadedFile>,
    pub model_image: Option<UploadedFile>,
}

impl GenerationInputs {
    pub fn validate(&self, mode: GenerationMode) -> Result<(), LuxeError> {
        if self.product_images.is_empty() {
            return Err(LuxeError::Validation(
                "At least one product image is required".to_string(),
            ));
        }
        if mode == GenerationMode::TryOn {
            if self.reference_images.is_empty() {
                return Err(LuxeError::Validation(
                    "Try-on needs at least one reference image".to_string(),
                ));
            }
            if self.model_image.is_none() {
                return Err(LuxeError::Validation(
                    "Try-on needs a model image".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationSettings {
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub aspect_ratio: AspectRatio,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub notes: Option<String>,
}

impl GenerationSettings {
    /// File name stem derived from the product name.
    pub fn file_stem(&self) -> String {
        let slug = self
            .product_name
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("-");
        if slug.is_empty() {
            "luxefit".to_string()
        } else {
            slug
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TryOnTask {
    pub label: String,
    pub pose_instruction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneTask {
    pub label: String,
    pub scene_instruction: String,
}

/// One predefined variation within a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum GenerationTask {
    TryOn(TryOnTask),
    Scene(SceneTask),
}

impl GenerationTask {
    pub fn for_mode(mode: GenerationMode) -> Vec<GenerationTask> {
        match mode {
            GenerationMode::TryOn => [
                ("Front View", "Model facing the camera, jewelry centered and clearly visible, soft studio lighting."),
                ("Side Profile", "Model in three-quarter side profile so the piece catches the light from the side."),
                ("Close-up Detail", "Tight close-up crop on the jewelry as worn, showing materials and stone detail."),
                ("Lifestyle Pose", "Relaxed, natural pose in an elegant setting, jewelry as the focal point."),
            ]
            .into_iter()
            .map(|(label, pose)| {
                GenerationTask::TryOn(TryOnTask {
                    label: label.to_string(),
                    pose_instruction: pose.to_string(),
                })
            })
            .collect(),
            GenerationMode::Scene => [
                ("Studio Display", "Product on a minimal pedestal against a seamless backdrop, luxury catalogue lighting."),
                ("Natural Setting", "Product arranged among natural textures such as stone, silk and soft daylight."),
                ("Editorial Flat Lay", "Top-down editorial flat lay with complementary props and a refined palette."),
            ]
            .into_iter()
            .map(|(label, scene)| {
                GenerationTask::Scene(SceneTask {
                    label: label.to_string(),
                    scene_instruction: scene.to_string(),
                })
            })
            .collect(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            GenerationTask::TryOn(task) => &task.label,
            GenerationTask::Scene(task) => &task.label,
        }
    }

    pub fn instruction(&self) -> &str {
        match self {
            GenerationTask::TryOn(task) => &task.pose_instruction,
            GenerationTask::Scene(task) => &task.scene_instruction,
        }
    }

    pub fn mode(&self) -> GenerationMode {
        match self {
            GenerationTask::TryOn(_) => GenerationMode::TryOn,
            GenerationTask::Scene(_) => GenerationMode::Scene,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeedbackPhase {
    Idle,
    Verifying,
    Interpreted,
}

/// In-progress "confirm before regenerate" negotiation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackState {
    pub draft: Option<String>,
    pub is_verifying: bool,
    pub interpretation: Option<String>,
    pub reference_images: Vec<EncodedImage>,
    pub region: Option<Region>,
}

impl FeedbackState {
    pub fn phase(&self) -> FeedbackPhase {
        if self.is_verifying {
            FeedbackPhase::Verifying
        } else if self.interpretation.is_some() {
            FeedbackPhase::Interpreted
        } else {
            FeedbackPhase::Idle
        }
    }

    pub fn clear(&mut self) {
        *self = FeedbackState::default();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoState {
    pub is_loading: bool,
    pub video_url: Option<String>,
    pub error: Option<String>,
}

/// One generated image variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Asset {
    pub id: AssetId,
    pub image_prompt: String,
    pub task: GenerationTask,
    pub is_image_loading: bool,
    pub image_url: Option<String>,
    pub error: Option<String>,
    pub aspect_ratio: AspectRatio,
    pub resolution: Resolution,
    pub feedback: FeedbackState,
    pub video: VideoState,
    /// Bumped whenever a new render of this variant starts. Results carrying
    /// an older value are dropped.
    #[serde(skip)]
    generation: u64,
}

impl Asset {
    pub fn placeholder(id: AssetId, task: GenerationTask, settings: &GenerationSettings) -> Self {
        Self {
            id,
            image_prompt: task.label().to_string(),
            task,
            is_image_loading: true,
            image_url: None,
            error: None,
            aspect_ratio: settings.aspect_ratio,
            resolution: settings.resolution,
            feedback: FeedbackState::default(),
            video: VideoState::default(),
            generation: 0,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Enter loading for a new render. Any render still in flight is
    /// superseded.
    fn enter_loading(&mut self) {
        self.generation += 1;
        self.is_image_loading = true;
        self.error = None;
    }

    pub fn feedback_phase(&self) -> FeedbackPhase {
        self.feedback.phase()
    }

    /// Enter loading for a fresh generation of the same variant.
    pub fn begin_regeneration(&mut self) {
        self.enter_loading();
        self.feedback.interpretation = None;
        self.feedback.is_verifying = false;
    }

    /// Enter loading for a higher-resolution render of the current image,
    /// which is returned. Refused while another render is running.
    pub fn begin_high_res(&mut self) -> Result<Option<EncodedImage>, LuxeError> {
        if self.is_image_loading {
            return Err(LuxeError::Validation(
                "The image is still rendering".to_string(),
            ));
        }
        let current = self.current_image();
        self.enter_loading();
        Ok(current)
    }

    pub fn apply_image(&mut self, image: &EncodedImage) {
        self.image_url = Some(image.data_url());
        self.error = None;
        self.is_image_loading = false;
    }

    pub fn apply_error(&mut self, err: &LuxeError) {
        self.error = Some(err.user_message());
        self.is_image_loading = false;
    }

    /// The current image, if it is a data URL we can send back to the model.
    pub fn current_image(&self) -> Option<EncodedImage> {
        let url = self.image_url.as_deref()?;
        let rest = url.strip_prefix("data:")?;
        let (mime_type, data) = rest.split_once(";base64,")?;
        Some(EncodedImage {
            mime_type: mime_type.to_string(),
            data: data.to_string(),
        })
    }
}

/// One user-triggered generation request.
#[derive(Debug, Clone)]
pub struct Batch {
    pub id: BatchId,
    pub timestamp: DateTime<Utc>,
    pub mode: GenerationMode,
    pub settings: GenerationSettings,
    pub inputs: Arc<GenerationInputs>,
    pub assets: IndexMap<AssetId, Asset>,
}

impl Batch {
    /// New batch with one loading placeholder per task of `mode`.
    pub fn create(mode: GenerationMode, inputs: GenerationInputs, settings: GenerationSettings) -> Self {
        let timestamp = Utc::now();
        let id = BatchId::generate(timestamp);
        let assets = GenerationTask::for_mode(mode)
            .into_iter()
            .enumerate()
            .map(|(index, task)| {
                let asset_id = AssetId::for_task(&id, index);
                let asset = Asset::placeholder(asset_id.clone(), task, &settings);
                (asset_id, asset)
            })
            .collect();

        Self {
            id,
            timestamp,
            mode,
            settings,
            inputs: Arc::new(inputs),
            assets,
        }
    }

    pub fn view(&self) -> BatchView {
        BatchView {
            id: self.id.clone(),
            timestamp: self.timestamp,
            mode: self.mode,
            product_name: self.settings.product_name.clone(),
            assets: self.assets.values().cloned().collect(),
        }
    }
}

/// What the client renders for a batch.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchView {
    pub id: BatchId,
    pub timestamp: DateTime<Utc>,
    pub mode: GenerationMode,
    pub product_name: String,
    pub assets: Vec<Asset>,
}
