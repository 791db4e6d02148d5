// src/feedback.rs
// "Verify intent, then confirm" negotiation for feedback on a variant.
//
// idle -> verifying -> interpreted -> confirmed -> regenerating -> idle
//                                  \-> modified -> idle
//
// Verifying with no text, no reference images and no effective region is a
// clear request: the feedback state is reset without calling the
// interpreter. It doubles as "cancel" for an interpreted request.

use log::{info, warn};
use serde::Deserialize;

use crate::errors::LuxeError;
use crate::models::{Asset, AssetId, BatchId, EncodedImage, FeedbackState};
use crate::orchestrator::{BatchOrchestrator, Dispatch};
use crate::prompts;
use crate::region::Region;
use crate::retry::with_retry;
use crate::services::InterpretationRequest;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackSubmission {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reference_images: Vec<EncodedImage>,
    #[serde(default)]
    pub region: Option<Region>,
}

impl FeedbackSubmission {
    /// Nothing the model could act on.
    pub fn is_clear_request(&self) -> bool {
        self.text.trim().is_empty()
            && self.reference_images.is_empty()
            && Region::effective(self.region).is_none()
    }
}

impl BatchOrchestrator {
    async fn update_feedback<F>(&self, asset_id: &AssetId, update: F) -> Result<FeedbackState, LuxeError>
    where
        F: FnOnce(&mut Asset),
    {
        let mut history = self.history.write().await;
        let batch_id: BatchId = history
            .owner_of(asset_id)
            .cloned()
            .ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))?;

        let mut snapshot = None;
        history.update_asset(&batch_id, asset_id, |asset| {
            update(asset);
            snapshot = Some(asset.feedback.clone());
        });
        snapshot.ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))
    }

    /// Ask the interpreter to restate the user's correction before anything is
    /// regenerated.
    ///
    /// Interpreter failures never surface: a fallback restatement of the raw
    /// feedback is stored instead so the asset cannot stay stuck verifying.
    pub async fn verify_feedback(
        &self,
        asset_id: &AssetId,
        submission: FeedbackSubmission,
    ) -> Result<FeedbackState, LuxeError> {
        if submission.is_clear_request() {
            return self.update_feedback(asset_id, |asset| asset.feedback.clear()).await;
        }

        let key = self.session.authorize()?;
        let text = submission.text.trim().to_string();
        let region = Region::effective(submission.region);

        let mut request = None;
        self.update_feedback(asset_id, |asset| {
            asset.feedback.draft = (!text.is_empty()).then(|| text.clone());
            asset.feedback.reference_images = submission.reference_images.clone();
            asset.feedback.region = region;
            asset.feedback.interpretation = None;
            asset.feedback.is_verifying = true;

            request = Some(InterpretationRequest {
                original_prompt: format!("{}: {}", asset.task.label(), asset.task.instruction()),
                feedback_text: text.clone(),
                current_image: asset.current_image(),
                reference_images: submission.reference_images.clone(),
                region,
            });
        })
        .await?;
        let request = request.ok_or_else(|| LuxeError::NotFound(format!("asset {asset_id}")))?;

        let interpreter = &self.services.interpreter;
        let interpretation = match with_retry(&self.options.retry, "feedback interpretation", || {
            interpreter.interpret(&key, &request)
        })
        .await
        {
            Ok(interpretation) => interpretation,
            Err(e) => {
                warn!("Interpretation for {} failed, using fallback: {}", asset_id, e);
                prompts::fallback_interpretation(&text, request.reference_images.len(), region)
            }
        };

        info!("Feedback for {} interpreted", asset_id);
        self.update_feedback(asset_id, |asset| {
            // A regeneration may have started while we waited.
            if asset.feedback.is_verifying {
                asset.feedback.is_verifying = false;
                asset.feedback.interpretation = Some(interpretation);
            }
        })
        .await
    }

    /// Reject the interpretation and drop all feedback.
    pub async fn modify_feedback(&self, asset_id: &AssetId) -> Result<FeedbackState, LuxeError> {
        self.update_feedback(asset_id, |asset| asset.feedback.clear()).await
    }

    /// Accept the interpretation and regenerate with the stored feedback.
    pub async fn confirm_feedback(&self, asset_id: &AssetId) -> Result<Dispatch, LuxeError> {
        self.regenerate_with(asset_id, |asset| {
            if asset.feedback.interpretation.is_none() {
                return Err(LuxeError::Validation(
                    "There is no interpreted feedback to confirm".to_string(),
                ));
            }
            Ok(asset.feedback.draft.clone().unwrap_or_default())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_request_ignores_degenerate_region() {
        let zero = FeedbackSubmission {
            region: Some(Region {
                x: 40.0,
                y: 40.0,
                width: 0.0,
                height: 0.0,
            }),
            ..Default::default()
        };
        assert!(zero.is_clear_request());
        assert!(FeedbackSubmission::default().is_clear_request());

        let whitespace = FeedbackSubmission {
            text: "   ".into(),
            ..Default::default()
        };
        assert!(whitespace.is_clear_request());
    }

    #[test]
    fn any_input_makes_a_real_request() {
        let text = FeedbackSubmission {
            text: "more sparkle".into(),
            ..Default::default()
        };
        assert!(!text.is_clear_request());

        let image = FeedbackSubmission {
            reference_images: vec![EncodedImage::from_bytes("image/png", b"x")],
            ..Default::default()
        };
        assert!(!image.is_clear_request());

        let region = FeedbackSubmission {
            region: Some(Region {
                x: 10.0,
                y: 10.0,
                width: 20.0,
                height: 20.0,
            }),
            ..Default::default()
        };
        assert!(!region.is_clear_request());
    }
}
