//! Wire Normalizer
//!
//! Pure, bidirectional translation between canonical [`Message`]s and the two
//! provider wire families. Nothing here performs I/O.
//!
//! | Concern | OpenAI-compatible | Gemini |
//! |---|---|---|
//! | System prompt | leading `system` message | single `systemInstruction` |
//! | Images | `image_url` parts (data URL) | `inlineData` parts (base64) |
//! | Tool calls | `tool_calls[]` with ids | `functionCall` parts, no ids |
//! | Tool results | `role: tool` + `tool_call_id` | `functionResponse` parts |

mod gemini;
mod openai;

use serde_json::Value;
use tracing::warn;

use crate::error::{ChatError, FailureSignal, Result, error_detail};
use crate::message::Message;
use crate::provider::{CompletionRequest, ParsedResponse, ProviderId, WireFormat};

/// Build the request payload for `provider`
pub fn to_wire(provider: ProviderId, model: &str, request: &CompletionRequest<'_>) -> Result<Value> {
    match provider.wire_format() {
        WireFormat::OpenAiCompatible => openai::build_request(model, request),
        WireFormat::Gemini => gemini::build_request(request),
    }
}

/// Reduce a raw provider response to canonical fields
pub fn from_wire(provider: ProviderId, raw: &Value) -> Result<ParsedResponse> {
    let mut parsed = match provider.wire_format() {
        WireFormat::OpenAiCompatible => openai::parse_response(raw)?,
        WireFormat::Gemini => gemini::parse_response(raw)?,
    };

    if !provider.embeds_response_images() {
        parsed.images.clear();
    }

    Ok(parsed)
}

/// Error object returned inside a success body (OpenRouter and Gemini do this)
fn embedded_error(error: &Value) -> ChatError {
    let body = serde_json::json!({ "error": error }).to_string();
    match error
        .get("code")
        .and_then(Value::as_u64)
        .and_then(|code| u16::try_from(code).ok())
    {
        Some(status) if status >= 400 => FailureSignal::HttpStatus { status, body }.into(),
        _ => ChatError::malformed(error_detail(&body)),
    }
}

/// Image destined for a multimodal user message
#[derive(Clone, Debug, PartialEq, Eq)]
enum ImageRef {
    /// Base64 payload split out of a data URL
    Inline { mime_type: String, data: String },
    /// Remote URL, passed through where the wire format allows it
    Remote(String),
}

impl ImageRef {
    fn from_url(url: &str) -> Option<Self> {
        if !url.starts_with("data:") {
            return Some(Self::Remote(url.to_string()));
        }

        let data_url = crate::message::DataUrl::parse(url)?;
        if data_url.decode().is_err() {
            return None;
        }
        Some(Self::Inline {
            mime_type: data_url.mime_type.to_string(),
            data: data_url.payload.trim().to_string(),
        })
    }
}

/// User message body split into its leading text and its images
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct UserContent {
    text: String,
    images: Vec<ImageRef>,
}

/// Split a user message into text and images.
///
/// Non-image attachments are appended to the leading text as delimited
/// blocks; image attachments whose payload does not decode are dropped.
fn split_user_content(message: &Message) -> UserContent {
    let mut content = UserContent {
        text: message.content.text(),
        images: Vec::new(),
    };

    for url in message.content.image_urls() {
        match ImageRef::from_url(url) {
            Some(image) => content.images.push(image),
            None => warn!(message_id = %message.id, "Dropping image part with an undecodable data URL"),
        }
    }

    for attachment in &message.attachments {
        if attachment.is_image() {
            match ImageRef::from_url(&attachment.data) {
                Some(image) => content.images.push(image),
                None => warn!(attachment = %attachment.name, "Dropping image attachment with an undecodable payload"),
            }
        } else {
            content.text.push_str(&format!(
                "\n\n--- File: {name} ---\n{body}\n--- End of {name} ---",
                name = attachment.name,
                body = attachment.text_content(),
            ));
        }
    }

    content
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Attachment, Content, ContentPart};

    #[test]
    fn test_split_user_content() {
        let message = Message::user("Look at these").with_attachments(vec![
            Attachment::new("cat.png", "image/png", "data:image/png;base64,iVBORw0KGgo="),
            Attachment::new("notes.txt", "text/plain", "remember milk"),
            Attachment::new("broken.png", "image/png", "data:image/png;base64,@@@"),
        ]);

        let content = split_user_content(&message);
        assert_eq!(
            content.images,
            vec![ImageRef::Inline {
                mime_type: "image/png".into(),
                data: "iVBORw0KGgo=".into()
            }]
        );
        assert!(content.text.starts_with("Look at these"));
        assert!(content.text.contains("--- File: notes.txt ---\nremember milk\n--- End of notes.txt ---"));
        assert!(!content.text.contains("broken.png"));
    }

    #[test]
    fn test_remote_image_part() {
        let message = Message::user(Content::Parts(vec![
            ContentPart::Text { text: "what is this".into() },
            ContentPart::Image { url: "https://img.example/1.png".into() },
        ]));
        let content = split_user_content(&message);
        assert_eq!(content.text, "what is this");
        assert_eq!(content.images, vec![ImageRef::Remote("https://img.example/1.png".into())]);
    }

    #[test]
    fn test_images_only_for_embedding_providers() {
        let raw = serde_json::json!({
            "choices": [{"message": {
                "content": "here you go",
                "images": [{"type": "image_url", "image_url": {"url": "data:image/png;base64,AAAA"}}]
            }}]
        });

        let openrouter = from_wire(ProviderId::OpenRouter, &raw).unwrap();
        assert_eq!(openrouter.images, vec!["data:image/png;base64,AAAA".to_string()]);

        let openai = from_wire(ProviderId::OpenAi, &raw).unwrap();
        assert!(openai.images.is_empty());
        assert_eq!(openai.text, "here you go");
    }
}
