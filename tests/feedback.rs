mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use common::*;
use luxefit::errors::LuxeError;
use luxefit::feedback::FeedbackSubmission;
use luxefit::models::{Asset, EncodedImage, FeedbackPhase, GenerationMode, GenerationSettings};
use luxefit::region::Region;
use luxefit::services::{FeedbackInterpreter, InterpretationRequest, PromptPart};
use luxefit::session::ApiKey;

/// Interpreter that answers only after a long pause.
struct SlowInterpreter {
    delay: Duration,
    calls: AtomicUsize,
}

#[async_trait]
impl FeedbackInterpreter for SlowInterpreter {
    async fn interpret(&self, _key: &ApiKey, request: &InterpretationRequest) -> Result<String, LuxeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(format!("I will {}.", request.feedback_text))
    }
}

fn with_interpreter(interpreter: Arc<dyn FeedbackInterpreter>) -> Harness {
    harness_with(
        FakeGenerator::default(),
        interpreter,
        FakeVideo::new(1, Some("https://video.test/v.mp4")),
        options(1),
        Some("test-key"),
    )
}

async fn first_ready_asset(h: &Harness) -> Asset {
    let dispatch = h
        .orchestrator
        .start_generation(GenerationMode::Scene, scene_inputs(), GenerationSettings::default())
        .await
        .unwrap();
    let batch_id = dispatch.batch_id.clone();
    dispatch.settled().await;
    h.orchestrator.batch(&batch_id).await.unwrap().assets[0].clone()
}

fn text(feedback: &str) -> FeedbackSubmission {
    FeedbackSubmission {
        text: feedback.to_string(),
        ..Default::default()
    }
}

fn region() -> Region {
    Region {
        x: 10.0,
        y: 20.0,
        width: 30.0,
        height: 40.0,
    }
}

#[tokio::test(start_paused = true)]
async fn empty_submission_clears_without_calling_interpreter() {
    let h = harness(FakeGenerator::default());
    let asset = first_ready_asset(&h).await;

    let once = h
        .orchestrator
        .verify_feedback(&asset.id, FeedbackSubmission::default())
        .await
        .unwrap();
    let twice = h
        .orchestrator
        .verify_feedback(&asset.id, FeedbackSubmission::default())
        .await
        .unwrap();

    assert_eq!(once, twice);
    assert_eq!(twice.phase(), FeedbackPhase::Idle);
    assert!(twice.draft.is_none());
}

#[tokio::test(start_paused = true)]
async fn zero_size_region_counts_as_no_input() {
    let h = harness(FakeGenerator::default());
    let asset = first_ready_asset(&h).await;

    let state = h
        .orchestrator
        .verify_feedback(
            &asset.id,
            FeedbackSubmission {
                text: "  ".to_string(),
                region: Some(Region {
                    x: 50.0,
                    y: 50.0,
                    width: 0.0,
                    height: 0.0,
                }),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(state.phase(), FeedbackPhase::Idle);
    assert!(state.region.is_none());
}

#[tokio::test(start_paused = true)]
async fn interpretation_is_stored_with_the_draft() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .withf(|_, request| request.feedback_text == "make the band thinner" && request.current_image.is_some())
        .times(1)
        .returning(|_, _| Ok("I will make the band thinner while keeping the stone.".to_string()));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;

    let state = h
        .orchestrator
        .verify_feedback(&asset.id, text("  make the band thinner "))
        .await
        .unwrap();

    assert_eq!(state.phase(), FeedbackPhase::Interpreted);
    assert!(!state.is_verifying);
    assert_eq!(state.draft.as_deref(), Some("make the band thinner"));
    assert_eq!(
        state.interpretation.as_deref(),
        Some("I will make the band thinner while keeping the stone.")
    );

    let stored = h.orchestrator.asset(&asset.id).await.unwrap();
    assert_eq!(stored.feedback, state);
    // Verifying does not touch the image.
    assert_eq!(stored.image_url, asset.image_url);
    assert!(!stored.is_image_loading);
}

#[tokio::test(start_paused = true)]
async fn fatal_interpreter_error_falls_back_to_restatement() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .times(1)
        .returning(|_, _| Err(LuxeError::upstream(Some(400), "Invalid argument")));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;

    let state = h
        .orchestrator
        .verify_feedback(
            &asset.id,
            FeedbackSubmission {
                text: "warmer light".to_string(),
                region: Some(region()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(
        state.interpretation.as_deref(),
        Some("I will apply your request: \"warmer light\" within the selected area.")
    );
    assert!(!state.is_verifying);
    assert_eq!(state.region, Some(region()));
}

#[tokio::test(start_paused = true)]
async fn transient_interpreter_error_is_retried() {
    let mut interpreter = MockInterpreter::new();
    let mut failures_left = 2;
    interpreter
        .expect_interpret()
        .times(3)
        .returning(move |_, _| {
            if failures_left > 0 {
                failures_left -= 1;
                Err(LuxeError::upstream(Some(429), "Resource exhausted"))
            } else {
                Ok("I will remove the reflection.".to_string())
            }
        });
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;

    let state = h
        .orchestrator
        .verify_feedback(&asset.id, text("remove the reflection"))
        .await
        .unwrap();

    assert_eq!(state.interpretation.as_deref(), Some("I will remove the reflection."));
}

#[tokio::test(start_paused = true)]
async fn modify_discards_feedback_without_regenerating() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .times(1)
        .returning(|_, _| Ok("I will add a pendant.".to_string()));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;
    let calls_before = h.generator.call_count();

    h.orchestrator
        .verify_feedback(&asset.id, text("add a pendant"))
        .await
        .unwrap();
    let state = h.orchestrator.modify_feedback(&asset.id).await.unwrap();

    assert_eq!(state.phase(), FeedbackPhase::Idle);
    assert!(state.draft.is_none());
    assert!(state.interpretation.is_none());

    let stored = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(!stored.is_image_loading);
    assert_eq!(stored.image_url, asset.image_url);
    assert_eq!(h.generator.call_count(), calls_before);
}

#[tokio::test(start_paused = true)]
async fn confirm_regenerates_with_stored_feedback() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .withf(|_, request| request.region == Some(region()) && request.reference_images.len() == 1)
        .times(1)
        .returning(|_, _| Ok("I will swap the metal to rose gold in that area.".to_string()));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;
    let swatch = EncodedImage::from_bytes("image/png", b"rose-gold-swatch");

    h.orchestrator
        .verify_feedback(
            &asset.id,
            FeedbackSubmission {
                text: "swap to rose gold".to_string(),
                reference_images: vec![swatch.clone()],
                region: Some(region()),
            },
        )
        .await
        .unwrap();

    let dispatch = h.orchestrator.confirm_feedback(&asset.id).await.unwrap();
    let pending = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(pending.is_image_loading);
    assert!(pending.feedback.interpretation.is_none());
    assert_eq!(pending.feedback.phase(), FeedbackPhase::Idle);
    dispatch.settled().await;

    let request = h.generator.last_request().unwrap();
    let prompt = prompt_text(&request);
    assert!(prompt.contains("swap to rose gold"));
    assert!(prompt.contains(&region().describe()));
    assert!(request.parts.contains(&PromptPart::Image(swatch)));

    let done = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(!done.is_image_loading);
    assert_ne!(done.image_url, asset.image_url);
    assert!(done.feedback.draft.is_none());
    assert!(done.feedback.reference_images.is_empty());
    assert!(done.feedback.region.is_none());
}

#[tokio::test(start_paused = true)]
async fn confirm_needs_an_interpretation() {
    let h = harness(FakeGenerator::default());
    let asset = first_ready_asset(&h).await;
    let calls_before = h.generator.call_count();

    let err = h.orchestrator.confirm_feedback(&asset.id).await.unwrap_err();
    assert!(matches!(err, LuxeError::Validation(_)));
    assert_eq!(h.generator.call_count(), calls_before);
}

#[tokio::test(start_paused = true)]
async fn late_interpretation_is_discarded_after_regeneration_starts() {
    let interpreter = Arc::new(SlowInterpreter {
        delay: Duration::from_secs(30),
        calls: AtomicUsize::new(0),
    });
    let h = with_interpreter(interpreter.clone());
    let asset = first_ready_asset(&h).await;

    let orchestrator = h.orchestrator.clone();
    let asset_id = asset.id.clone();
    let verifying = tokio::spawn(async move {
        orchestrator
            .verify_feedback(&asset_id, text("brighter stones"))
            .await
    });

    tokio::time::sleep(Duration::from_millis(10)).await;
    let stored = h.orchestrator.asset(&asset.id).await.unwrap();
    assert_eq!(stored.feedback.phase(), FeedbackPhase::Verifying);
    assert_eq!(interpreter.calls.load(Ordering::SeqCst), 1);

    h.orchestrator
        .regenerate(&asset.id, "brighter stones")
        .await
        .unwrap()
        .settled()
        .await;

    let state = verifying.await.unwrap().unwrap();
    assert!(state.interpretation.is_none());
    assert!(!state.is_verifying);

    let done = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(done.feedback.interpretation.is_none());
    assert_eq!(done.feedback.phase(), FeedbackPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn verify_unknown_asset_is_not_found() {
    let h = harness(FakeGenerator::default());
    let err = h
        .orchestrator
        .verify_feedback(&luxefit::models::AssetId::new("missing"), text("anything"))
        .await
        .unwrap_err();
    assert!(matches!(err, LuxeError::NotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn empty_submission_cancels_an_interpreted_request() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .times(1)
        .returning(|_, _| Ok("I will engrave the initials on the band.".to_string()));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;

    let interpreted = h
        .orchestrator
        .verify_feedback(
            &asset.id,
            FeedbackSubmission {
                text: "engrave the initials".to_string(),
                reference_images: vec![EncodedImage::from_bytes("image/png", b"font-sample")],
                region: Some(region()),
            },
        )
        .await
        .unwrap();
    assert_eq!(interpreted.phase(), FeedbackPhase::Interpreted);
    assert_eq!(interpreted.reference_images.len(), 1);

    let cancelled = h
        .orchestrator
        .verify_feedback(&asset.id, FeedbackSubmission::default())
        .await
        .unwrap();
    assert_eq!(cancelled.phase(), FeedbackPhase::Idle);
    assert!(cancelled.draft.is_none());
    assert!(cancelled.interpretation.is_none());
    assert!(cancelled.reference_images.is_empty());
    assert!(cancelled.region.is_none());
    assert!(!cancelled.is_verifying);

    let again = h
        .orchestrator
        .verify_feedback(&asset.id, FeedbackSubmission::default())
        .await
        .unwrap();
    assert_eq!(again, cancelled);
    assert_eq!(h.orchestrator.asset(&asset.id).await.unwrap().feedback, cancelled);

    // Cancelling never regenerates.
    let stored = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(!stored.is_image_loading);
    assert_eq!(stored.image_url, asset.image_url);
}

#[tokio::test(start_paused = true)]
async fn confirm_after_modify_is_rejected() {
    let mut interpreter = MockInterpreter::new();
    interpreter
        .expect_interpret()
        .times(1)
        .returning(|_, _| Ok("I will darken the background.".to_string()));
    let h = with_interpreter(Arc::new(interpreter));
    let asset = first_ready_asset(&h).await;
    let calls_before = h.generator.call_count();

    h.orchestrator
        .verify_feedback(
            &asset.id,
            FeedbackSubmission {
                text: "darken the background".to_string(),
                region: Some(region()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    h.orchestrator.modify_feedback(&asset.id).await.unwrap();

    let err = h.orchestrator.confirm_feedback(&asset.id).await.unwrap_err();
    assert!(matches!(err, LuxeError::Validation(_)));

    let stored = h.orchestrator.asset(&asset.id).await.unwrap();
    assert!(!stored.is_image_loading);
    assert_eq!(stored.feedback.phase(), FeedbackPhase::Idle);
    assert_eq!(h.generator.call_count(), calls_before);
}
