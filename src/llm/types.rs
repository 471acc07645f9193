use crate::schema::{Message, Role};
use serde::{Deserialize, Serialize};

/// Which model a request needs. Image turns go to the vision model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    Text,
    Vision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A message in the shape chat-completion endpoints accept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(content.into()),
        }
    }
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        match &message.image {
            Some(url) => Self {
                role: message.role,
                content: MessageContent::Parts(vec![
                    ContentPart::Text {
                        text: message.content.clone(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: Some("high".to_string()),
                        },
                    },
                ]),
            },
            None => Self::text(message.role, message.content.clone()),
        }
    }
}

/// Provider-neutral completion request. Clients map `model` and the
/// optional overrides onto their configured defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub model: ModelVariant,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl CompletionRequest {
    /// Builds a request from conversation messages, picking the vision model
    /// when any of them carries an image.
    pub fn from_messages(messages: &[Message]) -> Self {
        let model = if messages.iter().any(Message::has_image) {
            ModelVariant::Vision
        } else {
            ModelVariant::Text
        };

        Self {
            messages: messages.iter().map(ChatMessage::from).collect(),
            model,
            temperature: None,
            max_tokens: None,
        }
    }

    /// A two-message system/user request.
    pub fn prompt(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            messages: vec![
                ChatMessage::text(Role::System, system),
                ChatMessage::text(Role::User, user),
            ],
            model: ModelVariant::Text,
            temperature: None,
            max_tokens: None,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Concatenated text of the last user message, mostly useful for logging and fakes.
    pub fn last_user_text(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .and_then(|m| match &m.content {
                MessageContent::Text(text) => Some(text.as_str()),
                MessageContent::Parts(parts) => parts.iter().find_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                }),
            })
    }
}

#[cfg(feature = "openai")]
#[derive(Debug, Clone, Serialize)]
pub(crate) struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: &'a [ChatMessage],
    pub temperature: f32,
    pub max_tokens: u32,
}

#[cfg(feature = "openai")]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[cfg(feature = "openai")]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[cfg(feature = "openai")]
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}
