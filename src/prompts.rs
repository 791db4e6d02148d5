// src/prompts.rs
// Prompt assembly for the remote model.

use crate::models::{EncodedImage, GenerationInputs, GenerationSettings, GenerationTask};
use crate::region::Region;
use crate::services::{InterpretationRequest, PromptPart};

/// Correction applied on top of a variant's original instruction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Refinement {
    pub feedback: String,
    pub reference_images: Vec<EncodedImage>,
    pub region: Option<Region>,
}

impl Refinement {
    pub fn is_empty(&self) -> bool {
        self.feedback.trim().is_empty() && self.reference_images.is_empty() && self.region.is_none()
    }
}

/// Text and image parts for one variant. Images follow the text that
/// introduces them.
pub fn generation_parts(
    task: &GenerationTask,
    inputs: &GenerationInputs,
    settings: &GenerationSettings,
    refinement: Option<&Refinement>,
) -> Vec<PromptPart> {
    let product = if settings.product_name.trim().is_empty() {
        "the jewelry piece".to_string()
    } else {
        format!("the jewelry piece \"{}\"", settings.product_name.trim())
    };

    let mut text = match task {
        GenerationTask::TryOn(task) => format!(
            "Create a photorealistic try-on photograph of the model from the model image wearing {product} \
             shown in the product images. Match the styling of the reference images. \
             Keep the model's identity and the product's exact design, metal and stones. \
             Shot: {} {}",
            task.label, task.pose_instruction
        ),
        GenerationTask::Scene(task) => format!(
            "Create a luxury product photograph of {product} shown in the product images. \
             Preserve the exact design, metal and stones. Scene: {} {}",
            task.label, task.scene_instruction
        ),
    };

    if let Some(notes) = settings.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        text.push_str(&format!("\nAdditional direction: {}", notes.trim()));
    }

    if let Some(refinement) = refinement.filter(|r| !r.is_empty()) {
        if !refinement.feedback.trim().is_empty() {
            text.push_str(&format!(
                "\nApply this correction requested by the user: {}",
                refinement.feedback.trim()
            ));
        }
        if let Some(region) = refinement.region {
            text.push_str(&format!(
                "\nRestrict the change to {} of the image and keep everything else unchanged.",
                region.describe()
            ));
        }
        if !refinement.reference_images.is_empty() {
            text.push_str("\nUse the correction reference images at the end as visual guidance for the change.");
        }
    }

    let mut parts = vec![PromptPart::Text(text)];
    push_images(&mut parts, "Product images:", inputs.product_images.iter().map(|f| &f.image));
    push_images(&mut parts, "Reference images:", inputs.reference_images.iter().map(|f| &f.image));
    push_images(&mut parts, "Model image:", inputs.model_image.iter().map(|f| &f.image));
    if let Some(refinement) = refinement {
        push_images(&mut parts, "Correction reference images:", refinement.reference_images.iter());
    }
    parts
}

fn push_images<'a>(parts: &mut Vec<PromptPart>, heading: &str, images: impl Iterator<Item = &'a EncodedImage>) {
    let images: Vec<_> = images.cloned().collect();
    if images.is_empty() {
        return;
    }
    parts.push(PromptPart::Text(heading.to_string()));
    parts.extend(images.into_iter().map(PromptPart::Image));
}

/// Instruction for restating a correction request before it is applied.
pub fn interpretation_prompt(request: &InterpretationRequest) -> String {
    let mut text = format!(
        "You help a jewelry photographer refine a generated image. The image was created with this \
         instruction: \"{}\".\nThe user asked for this change: \"{}\".",
        request.original_prompt,
        request.feedback_text.trim()
    );
    if let Some(region) = request.region {
        text.push_str(&format!("\nThe change applies to {}.", region.describe()));
    }
    if !request.reference_images.is_empty() {
        text.push_str(&format!(
            "\nThe user attached {} reference image(s) showing what they want.",
            request.reference_images.len()
        ));
    }
    text.push_str(
        "\nIn one or two short sentences, restate what you will change so the user can confirm. \
         Do not ask questions.",
    );
    text
}

/// Interpretation shown when the interpreter could not be reached.
pub fn fallback_interpretation(feedback: &str, reference_count: usize, region: Option<Region>) -> String {
    let feedback = feedback.trim();
    let mut text = if feedback.is_empty() {
        "I will adjust the image".to_string()
    } else {
        format!("I will apply your request: \"{feedback}\"")
    };
    if region.is_some() {
        text.push_str(" within the selected area");
    }
    if reference_count > 0 {
        text.push_str(&format!(", guided by {reference_count} reference image(s)"));
    }
    text.push('.');
    text
}
