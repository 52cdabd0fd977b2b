//! Request building: turn one [`Batch`] into a multi-part chat request.
//!
//! ## Message Layout
//!
//! 1. **System message**: [`SYSTEM_PROMPT`], verbatim
//! 2. **User message**: [`EXTRACTION_INSTRUCTION`] as a text part, followed
//!    by one `image_url` part per image, in batch order
//!
//! Decoding parameters are fixed policy: near-zero temperature, a fixed
//! nucleus threshold, and no reasoning trace. Only the token ceiling varies,
//! and only by model family.

use crate::pipeline::batch::Batch;
use crate::prompts::{EXTRACTION_INSTRUCTION, SYSTEM_PROMPT};
use serde::Serialize;

/// Sampling temperature for every request.
pub const TEMPERATURE: f32 = 0.01;

/// Nucleus-sampling threshold for every request.
pub const TOP_P: f32 = 0.7;

/// Model-name prefix of the family that accepts the extended ceiling.
pub const EXTENDED_MODEL_PREFIX: &str = "doubao-seed-1.6";

/// Completion-token ceiling for the extended family.
pub const EXTENDED_MAX_TOKENS: u32 = 32_768;

/// Completion-token ceiling for every other model.
pub const STANDARD_MAX_TOKENS: u32 = 16_384;

/// Token ceiling for `model`: a pure lookup on the name.
pub fn max_tokens_for(model: &str) -> u32 {
    if model.starts_with(EXTENDED_MODEL_PREFIX) {
        EXTENDED_MAX_TOKENS
    } else {
        STANDARD_MAX_TOKENS
    }
}

/// One chat message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    System { content: String },
    User { content: Vec<ContentPart> },
}

/// One part of a multi-part user message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Reasoning-trace switch; always disabled for extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Thinking {
    Disabled,
}

/// An immutable request derived from exactly one batch.
///
/// Serialises to the body of an OpenAI-compatible chat completion request
/// (without the streaming switches, which belong to the transport).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisRequest {
    /// Ordinal of the batch this request was built from.
    #[serde(skip)]
    pub batch_index: usize,
    /// Number of images attached.
    #[serde(skip)]
    pub image_count: usize,
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub thinking: Thinking,
}

impl AnalysisRequest {
    /// The instruction text and image data URIs of the user message, in order.
    pub fn user_parts(&self) -> (&str, Vec<&str>) {
        let mut text = "";
        let mut images = Vec::new();
        for message in &self.messages {
            if let ChatMessage::User { content } = message {
                for part in content {
                    match part {
                        ContentPart::Text { text: t } => text = t.as_str(),
                        ContentPart::ImageUrl { image_url } => images.push(image_url.url.as_str()),
                    }
                }
            }
        }
        (text, images)
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match m {
            ChatMessage::System { content } => Some(content.as_str()),
            _ => None,
        })
    }
}

/// Build the request for `batch`.
///
/// Batches from [`crate::pipeline::batch::split`] are never empty; an empty
/// batch here is a programming error and trips a debug assertion.
pub fn build(model: &str, batch: &Batch) -> AnalysisRequest {
    debug_assert!(!batch.is_empty(), "batch {} is empty", batch.index());

    let mut parts = Vec::with_capacity(batch.len() + 1);
    parts.push(ContentPart::Text {
        text: EXTRACTION_INSTRUCTION.to_string(),
    });
    parts.extend(batch.images().iter().map(|img| ContentPart::ImageUrl {
        image_url: ImageUrl {
            url: img.to_data_uri(),
        },
    }));

    AnalysisRequest {
        batch_index: batch.index(),
        image_count: batch.len(),
        model: model.to_string(),
        messages: vec![
            ChatMessage::System {
                content: SYSTEM_PROMPT.to_string(),
            },
            ChatMessage::User { content: parts },
        ],
        temperature: TEMPERATURE,
        top_p: TOP_P,
        max_tokens: max_tokens_for(model),
        thinking: Thinking::Disabled,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::batch::{split, EncodedImage};

    fn batch_of(n: usize) -> Batch {
        let images = (0..n)
            .map(|i| EncodedImage::new(i, "image/jpeg", format!("IMG{i}")))
            .collect();
        split(images, n).unwrap().remove(0)
    }

    #[test]
    fn token_ceiling_by_family() {
        assert_eq!(max_tokens_for("doubao-seed-1.6-vision-250815"), 32_768);
        assert_eq!(max_tokens_for("doubao-seed-1.6"), 32_768);
        assert_eq!(max_tokens_for("doubao-1.5-vision-pro"), 16_384);
        assert_eq!(max_tokens_for("gpt-4.1"), 16_384);
    }

    #[test]
    fn system_message_comes_first() {
        let req = build("m", &batch_of(2));
        assert!(matches!(req.messages[0], ChatMessage::System { .. }));
        assert_eq!(req.system_prompt(), Some(SYSTEM_PROMPT));
        assert_eq!(req.messages.len(), 2);
    }

    #[test]
    fn images_follow_instruction_in_batch_order() {
        let req = build("m", &batch_of(3));
        let (text, images) = req.user_parts();
        assert_eq!(text, EXTRACTION_INSTRUCTION);
        assert_eq!(
            images,
            vec![
                "data:image/jpeg;base64,IMG0",
                "data:image/jpeg;base64,IMG1",
                "data:image/jpeg;base64,IMG2",
            ]
        );
        assert_eq!(req.image_count, 3);
        assert_eq!(req.batch_index, 0);
    }

    #[test]
    fn fixed_decoding_policy() {
        let req = build("m", &batch_of(1));
        assert_eq!(req.temperature, TEMPERATURE);
        assert_eq!(req.top_p, TOP_P);
        assert_eq!(req.thinking, Thinking::Disabled);
    }

    #[test]
    fn serialises_to_chat_completion_shape() {
        let req = build("doubao-seed-1.6-vision", &batch_of(1));
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["model"], "doubao-seed-1.6-vision");
        assert_eq!(json["max_tokens"], 32_768);
        assert_eq!(json["thinking"]["type"], "disabled");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"][0]["type"], "text");
        assert_eq!(json["messages"][1]["content"][1]["type"], "image_url");
        assert_eq!(
            json["messages"][1]["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,IMG0"
        );
        assert!(json.get("batch_index").is_none());
    }
}
