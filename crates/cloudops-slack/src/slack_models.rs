//! Normalized Slack records shared by the Web API client, the markup
//! formatter and the reaction workflow.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A single Slack message as returned by `conversations.history`.
pub struct SlackMessage {
    pub ts: String,
    #[serde(default)]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub text: String,
}

impl SlackMessage {
    /// Timestamp of the thread this message belongs to; a message outside any
    /// thread is its own root.
    pub fn thread_root_ts(&self) -> &str {
        self.thread_ts
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(self.ts.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlackUserProfile {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub real_name: String,
}

impl SlackUserProfile {
    /// Display name when the user set one, real name otherwise.
    pub fn preferred_name(&self) -> &str {
        if self.display_name.trim().is_empty() {
            self.real_name.as_str()
        } else {
            self.display_name.as_str()
        }
    }

    /// Real name when present, display name otherwise.
    pub fn full_name(&self) -> &str {
        if self.real_name.trim().is_empty() {
            self.display_name.as_str()
        } else {
            self.real_name.as_str()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A normalized `reaction_added` notification.
pub struct ReactionEvent {
    pub event_id: String,
    pub channel: String,
    pub item_ts: String,
    pub reaction: String,
    pub user_id: String,
}

#[async_trait]
/// Resolves Slack user ids to profiles.
pub trait UserDirectory: Send + Sync {
    async fn user_profile(&self, user_id: &str) -> Result<SlackUserProfile>;
}

#[cfg(test)]
mod tests {
    use super::{SlackMessage, SlackUserProfile};

    #[test]
    fn unit_thread_root_ts_falls_back_to_message_ts() {
        let root = SlackMessage {
            ts: "1700000000.000100".to_string(),
            thread_ts: None,
            user: Some("U1".to_string()),
            text: "help".to_string(),
        };
        assert_eq!(root.thread_root_ts(), "1700000000.000100");

        let reply = SlackMessage {
            thread_ts: Some("1700000000.000001".to_string()),
            ..root
        };
        assert_eq!(reply.thread_root_ts(), "1700000000.000001");
    }

    #[test]
    fn unit_profile_name_preferences() {
        let profile = SlackUserProfile {
            display_name: String::new(),
            real_name: "Jane Doe".to_string(),
        };
        assert_eq!(profile.preferred_name(), "Jane Doe");
        assert_eq!(profile.full_name(), "Jane Doe");

        let profile = SlackUserProfile {
            display_name: "jd".to_string(),
            real_name: "Jane Doe".to_string(),
        };
        assert_eq!(profile.preferred_name(), "jd");
        assert_eq!(profile.full_name(), "Jane Doe");
    }
}
