//! Collaborator seams between the reaction workflow and the Slack and Azure
//! DevOps clients.

use anyhow::Result;
use async_trait::async_trait;
use cloudops_devops::{DevOpsApiClient, Iteration, TicketDraft, TrackerError};
use cloudops_slack::{SlackApiClient, SlackMessage, UserDirectory};

#[async_trait]
/// Slack operations the workflow performs besides user lookups.
pub trait ChatGateway: UserDirectory {
    async fn message(&self, channel: &str, ts: &str) -> Result<SlackMessage>;
    async fn post_reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()>;
}

#[async_trait]
pub trait TicketTracker: Send + Sync {
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<u64, TrackerError>;
    async fn close_ticket(&self, id: u64) -> Result<(), TrackerError>;
    async fn current_iteration(&self) -> Result<Option<Iteration>, TrackerError>;
    fn ticket_url(&self, id: u64) -> String;
}

#[async_trait]
impl ChatGateway for SlackApiClient {
    async fn message(&self, channel: &str, ts: &str) -> Result<SlackMessage> {
        SlackApiClient::message(self, channel, ts).await
    }

    async fn post_reply(&self, channel: &str, thread_ts: &str, text: &str) -> Result<()> {
        self.post_message(channel, text, Some(thread_ts)).await?;
        Ok(())
    }
}

#[async_trait]
impl TicketTracker for DevOpsApiClient {
    async fn create_ticket(&self, draft: &TicketDraft) -> Result<u64, TrackerError> {
        self.create_work_item(draft).await
    }

    async fn close_ticket(&self, id: u64) -> Result<(), TrackerError> {
        self.close_work_item(id).await
    }

    async fn current_iteration(&self) -> Result<Option<Iteration>, TrackerError> {
        self.fetch_current_iteration().await
    }

    fn ticket_url(&self, id: u64) -> String {
        self.work_item_url(id)
    }
}
