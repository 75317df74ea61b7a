//! Reaction-driven ticket lifecycle: create, acknowledge and close.

use std::sync::Arc;

use cloudops_devops::{TicketDraft, TrackerError};
use cloudops_slack::{convert_slack_markup, ReactionEvent, SlackMessage};
use thiserror::Error;

use crate::gateways::{ChatGateway, TicketTracker};
use crate::thread_state_store::{ThreadStateError, ThreadStateStore};

pub const DEFAULT_TITLE_PREFIX: &str = "Azure Support Request from";
pub const DEFAULT_TEAM_NAME: &str = "CloudOps";
pub const DEFAULT_CREATE_REACTIONS: &[&str] = &["eyes"];
pub const DEFAULT_ACKNOWLEDGE_REACTIONS: &[&str] = &["key"];
pub const DEFAULT_CLOSE_REACTIONS: &[&str] = &["white_check_mark", "checkered_flag"];
pub const TICKET_CLOSED_REPLY: &str = "Ticket has been closed!";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// What happens to a thread claim when ticket creation fails.
pub enum ClaimPolicy {
    /// The thread stays claimed; no later reaction retries creation.
    #[default]
    RetainOnFailure,
    /// The claim is cleared so a later create reaction may retry.
    ReleaseOnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReactionKind {
    Create,
    Acknowledge,
    Close,
}

#[derive(Debug, Clone)]
pub struct ReactionWorkflowConfig {
    pub area_path: String,
    pub parent_work_item_id: u64,
    /// Archive base used for thread permalinks, e.g. `https://acme.slack.com/archives`.
    pub workspace_url: String,
    pub channel_filter: Option<String>,
    pub title_prefix: String,
    pub team_name: String,
    pub create_reactions: Vec<String>,
    pub acknowledge_reactions: Vec<String>,
    pub close_reactions: Vec<String>,
    pub claim_policy: ClaimPolicy,
}

impl Default for ReactionWorkflowConfig {
    fn default() -> Self {
        Self {
            area_path: String::new(),
            parent_work_item_id: 0,
            workspace_url: String::new(),
            channel_filter: None,
            title_prefix: DEFAULT_TITLE_PREFIX.to_string(),
            team_name: DEFAULT_TEAM_NAME.to_string(),
            create_reactions: owned(DEFAULT_CREATE_REACTIONS),
            acknowledge_reactions: owned(DEFAULT_ACKNOWLEDGE_REACTIONS),
            close_reactions: owned(DEFAULT_CLOSE_REACTIONS),
            claim_policy: ClaimPolicy::default(),
        }
    }
}

fn owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl ReactionWorkflowConfig {
    pub fn classify(&self, reaction: &str) -> Option<ReactionKind> {
        let matches = |names: &[String]| names.iter().any(|name| name == reaction);
        if matches(&self.create_reactions) {
            Some(ReactionKind::Create)
        } else if matches(&self.acknowledge_reactions) {
            Some(ReactionKind::Acknowledge)
        } else if matches(&self.close_reactions) {
            Some(ReactionKind::Close)
        } else {
            None
        }
    }

    /// Slack permalink of a thread root: the archive URL with the dot-less timestamp.
    pub fn thread_permalink(&self, channel: &str, thread_ts: &str) -> String {
        format!(
            "{}/{}/p{}",
            self.workspace_url.trim_end_matches('/'),
            channel,
            thread_ts.replace('.', "")
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReactionOutcome {
    Ignored { reason: String },
    AlreadyClaimed { thread_ts: String },
    TicketCreated { thread_ts: String, work_item_id: u64 },
    Acknowledged { thread_ts: String },
    TicketClosed { thread_ts: String, work_item_id: u64 },
    NoTicketRecorded { thread_ts: String },
}

#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("slack lookup failed: {0:#}")]
    Lookup(anyhow::Error),
    #[error("slack reply failed: {0:#}")]
    Reply(anyhow::Error),
    #[error("work item tracker request failed: {0}")]
    Tracker(#[from] TrackerError),
    #[error("thread state conflict: {0}")]
    StateConflict(#[from] ThreadStateError),
}

/// Applies reaction events to the thread store and the ticket tracker.
pub struct ReactionWorkflow {
    chat: Arc<dyn ChatGateway>,
    tracker: Arc<dyn TicketTracker>,
    store: Arc<ThreadStateStore>,
    config: ReactionWorkflowConfig,
}

impl ReactionWorkflow {
    pub fn new(
        chat: Arc<dyn ChatGateway>,
        tracker: Arc<dyn TicketTracker>,
        store: Arc<ThreadStateStore>,
        config: ReactionWorkflowConfig,
    ) -> Self {
        Self {
            chat,
            tracker,
            store,
            config,
        }
    }

    pub fn store(&self) -> &ThreadStateStore {
        &self.store
    }

    pub fn config(&self) -> &ReactionWorkflowConfig {
        &self.config
    }

    /// Runs one event to completion and logs the result. Never fails.
    pub async fn handle_reaction(&self, event: &ReactionEvent) {
        match self.process_reaction(event).await {
            Ok(ReactionOutcome::Ignored { reason }) => {
                tracing::debug!(
                    event_id = %event.event_id,
                    reaction = %event.reaction,
                    channel = %event.channel,
                    reason = %reason,
                    "reaction ignored"
                );
            }
            Ok(ReactionOutcome::NoTicketRecorded { thread_ts }) => {
                tracing::info!(
                    thread_ts = %thread_ts,
                    reaction = %event.reaction,
                    "no work item found for thread"
                );
            }
            Ok(outcome) => {
                tracing::info!(
                    event_id = %event.event_id,
                    reaction = %event.reaction,
                    channel = %event.channel,
                    outcome = ?outcome,
                    "reaction processed"
                );
            }
            Err(error) => {
                tracing::error!(
                    event_id = %event.event_id,
                    reaction = %event.reaction,
                    channel = %event.channel,
                    item_ts = %event.item_ts,
                    error = %error,
                    "reaction processing failed"
                );
            }
        }
    }

    pub async fn process_reaction(
        &self,
        event: &ReactionEvent,
    ) -> Result<ReactionOutcome, WorkflowError> {
        let Some(kind) = self.config.classify(&event.reaction) else {
            return Ok(ignored(format!("unhandled reaction '{}'", event.reaction)));
        };
        if let Some(channel) = self.config.channel_filter.as_deref() {
            if channel != event.channel {
                return Ok(ignored(format!(
                    "channel {} is not the configured channel",
                    event.channel
                )));
            }
        }

        let message = self
            .chat
            .message(&event.channel, &event.item_ts)
            .await
            .map_err(WorkflowError::Lookup)?;
        if message.ts != event.item_ts || message.thread_root_ts() != event.item_ts {
            return Ok(ignored(format!(
                "message {} is not a thread root",
                event.item_ts
            )));
        }
        let thread_ts = event.item_ts.as_str();

        match kind {
            ReactionKind::Create => self.create_ticket(event, &message, thread_ts).await,
            ReactionKind::Acknowledge => self.acknowledge(event, &message, thread_ts).await,
            ReactionKind::Close => self.close_ticket(event, thread_ts).await,
        }
    }

    async fn create_ticket(
        &self,
        event: &ReactionEvent,
        message: &SlackMessage,
        thread_ts: &str,
    ) -> Result<ReactionOutcome, WorkflowError> {
        if !self.store.try_claim(thread_ts) {
            return Ok(ReactionOutcome::AlreadyClaimed {
                thread_ts: thread_ts.to_string(),
            });
        }
        tracing::debug!(thread_ts, reaction = %event.reaction, "claimed thread for ticket creation");

        let result = self.file_ticket(event, message, thread_ts).await;
        if result.is_err()
            && self.config.claim_policy == ClaimPolicy::ReleaseOnFailure
            && self.store.release_claim(thread_ts)
        {
            tracing::warn!(thread_ts, "released thread claim after failed ticket creation");
        }
        result
    }

    async fn file_ticket(
        &self,
        event: &ReactionEvent,
        message: &SlackMessage,
        thread_ts: &str,
    ) -> Result<ReactionOutcome, WorkflowError> {
        let author_id = message_author(message)?;
        let author = self
            .chat
            .user_profile(author_id)
            .await
            .map_err(WorkflowError::Lookup)?;
        let reactor = self
            .chat
            .user_profile(&event.user_id)
            .await
            .map_err(WorkflowError::Lookup)?;
        let formatted = convert_slack_markup(&message.text, self.chat.as_ref())
            .await
            .map_err(WorkflowError::Lookup)?;

        let iteration_path = match self.tracker.current_iteration().await? {
            Some(iteration) => Some(iteration.path),
            None => {
                tracing::warn!(thread_ts, "no current iteration; using the project default");
                None
            }
        };

        let link = self.config.thread_permalink(&event.channel, thread_ts);
        let draft = TicketDraft {
            title: format!("{} {}", self.config.title_prefix, author.full_name()),
            description_html: format!(
                "{}<br><br>Slack Conversation: <a href=\"{link}\">{link}</a><br>",
                formatted.replace('\n', "<br>")
            ),
            area_path: self.config.area_path.clone(),
            assignee: reactor.full_name().to_string(),
            parent_work_item_id: self.config.parent_work_item_id,
            iteration_path,
        };

        let work_item_id = self.tracker.create_ticket(&draft).await?;
        self.store.record_ticket(thread_ts, work_item_id)?;
        tracing::info!(thread_ts, work_item_id, "work item created");

        let reply = format!(
            "Work item created for this concern: <{}|{}>",
            self.tracker.ticket_url(work_item_id),
            work_item_id
        );
        self.chat
            .post_reply(&event.channel, thread_ts, &reply)
            .await
            .map_err(WorkflowError::Reply)?;

        Ok(ReactionOutcome::TicketCreated {
            thread_ts: thread_ts.to_string(),
            work_item_id,
        })
    }

    async fn acknowledge(
        &self,
        event: &ReactionEvent,
        message: &SlackMessage,
        thread_ts: &str,
    ) -> Result<ReactionOutcome, WorkflowError> {
        let author_id = message_author(message)?;
        let author = self
            .chat
            .user_profile(author_id)
            .await
            .map_err(WorkflowError::Lookup)?;
        let reply = format!(
            "Hey <@{author_id}>, {} team will address your concern asap.",
            self.config.team_name
        );
        self.chat
            .post_reply(&event.channel, thread_ts, &reply)
            .await
            .map_err(WorkflowError::Reply)?;
        tracing::debug!(thread_ts, user = %author.preferred_name(), "acknowledged thread author");

        Ok(ReactionOutcome::Acknowledged {
            thread_ts: thread_ts.to_string(),
        })
    }

    async fn close_ticket(
        &self,
        event: &ReactionEvent,
        thread_ts: &str,
    ) -> Result<ReactionOutcome, WorkflowError> {
        let Some(work_item_id) = self.store.lookup_ticket(thread_ts) else {
            return Ok(ReactionOutcome::NoTicketRecorded {
                thread_ts: thread_ts.to_string(),
            });
        };

        self.tracker.close_ticket(work_item_id).await?;
        self.chat
            .post_reply(&event.channel, thread_ts, TICKET_CLOSED_REPLY)
            .await
            .map_err(WorkflowError::Reply)?;
        tracing::info!(thread_ts, work_item_id, "work item closed");

        Ok(ReactionOutcome::TicketClosed {
            thread_ts: thread_ts.to_string(),
            work_item_id,
        })
    }
}

fn ignored(reason: String) -> ReactionOutcome {
    ReactionOutcome::Ignored { reason }
}

fn message_author(message: &SlackMessage) -> Result<&str, WorkflowError> {
    message
        .user
        .as_deref()
        .filter(|user| !user.trim().is_empty())
        .ok_or_else(|| {
            WorkflowError::Lookup(anyhow::anyhow!(
                "slack message {} has no author",
                message.ts
            ))
        })
}
