//! Slack integration for the CloudOps reaction bridge.
//!
//! Hosts the Web API client, Events API request handling and the mrkdwn to
//! HTML formatter used for work item descriptions.

pub mod slack_api_client;
pub mod slack_events;
pub mod slack_markup;
pub mod slack_models;
mod slack_transport_helpers;

pub use slack_api_client::{SlackApiClient, SlackPostedMessage, DEFAULT_SLACK_API_BASE};
pub use slack_events::{
    parse_slack_events_request, verify_slack_request_signature, SlackEventsRequest,
    SLACK_SIGNATURE_HEADER, SLACK_TIMESTAMP_HEADER,
};
pub use slack_markup::convert_slack_markup;
pub use slack_models::{ReactionEvent, SlackMessage, SlackUserProfile, UserDirectory};
