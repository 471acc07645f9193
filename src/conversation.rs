use crate::schema::{FarmInfo, Message, Role};
use crate::utils::truncate_chars;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "New Conversation";
pub const TITLE_MAX_CHARS: usize = 40;

/// Ordered message log for one chat thread.
///
/// Messages are only ever appended, except for the single system message,
/// which is placed at the front once and reused afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default, rename = "farmInfo", skip_serializing_if = "Option::is_none")]
    pub farm_info: Option<FarmInfo>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.into(),
            title: DEFAULT_TITLE.to_string(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            is_archived: false,
            farm_info: None,
        }
    }

    /// Appends a message, nudging its timestamp forward if the clock went
    /// backwards so the log stays ordered.
    pub fn push(&mut self, mut message: Message) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = Message>) {
        for message in messages {
            self.push(message);
        }
    }

    pub fn system_message(&self) -> Option<&Message> {
        self.messages.iter().find(|m| m.role == Role::System)
    }

    /// Puts the operating instructions at the front of the log. Returns
    /// `false` when a system message is already present.
    pub fn ensure_system_prompt(&mut self, content: impl Into<String>) -> bool {
        if self.system_message().is_some() {
            return false;
        }

        let mut message = Message::system(content);
        if let Some(first) = self.messages.first() {
            message.timestamp = message.timestamp.min(first.timestamp);
        }
        self.messages.insert(0, message);
        self.updated_at = Utc::now().max(self.updated_at);
        true
    }

    /// Names an untitled conversation after its first user message.
    pub fn title_from_first_message(&mut self) {
        if self.title != DEFAULT_TITLE {
            return;
        }
        if let Some(first) = self
            .messages
            .iter()
            .find(|m| m.role == Role::User && !m.content.trim().is_empty())
        {
            self.title = truncate_chars(first.content.trim(), TITLE_MAX_CHARS);
        }
    }

    /// Messages to send with a free-chat request: `system` first, then the
    /// most recent `max_messages` non-system entries.
    pub fn completion_messages(&self, system: &str, max_messages: usize) -> Vec<Message> {
        let history: Vec<&Message> = self
            .messages
            .iter()
            .filter(|m| m.role != Role::System)
            .collect();
        let skip = history.len().saturating_sub(max_messages);

        std::iter::once(Message::system(system))
            .chain(history.into_iter().skip(skip).cloned())
            .collect()
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_push_keeps_timestamps_monotonic() {
        let mut conversation = Conversation::new("user-1");
        let first = Message::user("hello", None);
        let mut earlier = Message::assistant("hi");
        earlier.timestamp = first.timestamp - Duration::seconds(5);

        conversation.push(first.clone());
        conversation.push(earlier);

        assert_eq!(conversation.messages[1].timestamp, first.timestamp);
        assert!(conversation
            .messages
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_system_prompt_prepended_once() {
        let mut conversation = Conversation::new("user-1");
        conversation.push(Message::assistant("Which farm?"));
        conversation.push(Message::user("1", None));

        assert!(conversation.ensure_system_prompt("persona"));
        assert!(!conversation.ensure_system_prompt("persona again"));

        assert_eq!(conversation.messages[0].role, Role::System);
        assert_eq!(conversation.messages[0].content, "persona");
        assert_eq!(
            conversation
                .messages
                .iter()
                .filter(|m| m.role == Role::System)
                .count(),
            1
        );
        assert!(conversation.messages[0].timestamp <= conversation.messages[1].timestamp);
    }

    #[test]
    fn test_completion_window() {
        let mut conversation = Conversation::new("user-1");
        conversation.ensure_system_prompt("stored persona");
        for i in 0..60 {
            conversation.push(Message::user(format!("m{}", i), None));
        }

        let window = conversation.completion_messages("fresh persona", 50);
        assert_eq!(window.len(), 51);
        assert_eq!(window[0].role, Role::System);
        assert_eq!(window[0].content, "fresh persona");
        assert_eq!(window[1].content, "m10");
        assert_eq!(window[50].content, "m59");
        assert_eq!(window.iter().filter(|m| m.role == Role::System).count(), 1);
    }

    #[test]
    fn test_title_from_first_user_message() {
        let mut conversation = Conversation::new("user-1");
        conversation.push(Message::assistant("Which farm?"));
        conversation.push(Message::user(
            "What should I plant after soybeans on heavy clay ground?",
            None,
        ));
        conversation.title_from_first_message();
        assert_eq!(conversation.title, "What should I plant after soybeans on he…");

        conversation.push(Message::user("second", None));
        conversation.title_from_first_message();
        assert!(conversation.title.starts_with("What should"));
    }
}
