//! Slack Events API request verification and envelope normalization.

use anyhow::{anyhow, bail, Context, Result};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::slack_models::ReactionEvent;

pub const SLACK_SIGNATURE_HEADER: &str = "x-slack-signature";
pub const SLACK_TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
const SLACK_SIGNATURE_VERSION_PREFIX: &str = "v0=";
const SLACK_DIGEST_HEX_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Classified Events API request body.
pub enum SlackEventsRequest {
    UrlVerification { challenge: String },
    ReactionAdded(ReactionEvent),
    Ignored { reason: String },
}

#[derive(Debug, Deserialize)]
struct SlackEventsEnvelope {
    #[serde(rename = "type")]
    envelope_type: String,
    #[serde(default)]
    challenge: Option<String>,
    #[serde(default)]
    event_id: Option<String>,
    #[serde(default)]
    event: Option<SlackEventPayload>,
}

#[derive(Debug, Deserialize)]
struct SlackEventPayload {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    reaction: Option<String>,
    #[serde(default)]
    item: Option<SlackReactionItem>,
}

#[derive(Debug, Deserialize)]
struct SlackReactionItem {
    #[serde(rename = "type")]
    item_type: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    ts: Option<String>,
}

pub fn parse_slack_events_request(body: &str) -> Result<SlackEventsRequest> {
    let envelope = serde_json::from_str::<SlackEventsEnvelope>(body)
        .context("failed to parse slack events api payload")?;

    match envelope.envelope_type.as_str() {
        "url_verification" => {
            let challenge = envelope
                .challenge
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("slack url_verification payload missing challenge"))?;
            Ok(SlackEventsRequest::UrlVerification { challenge })
        }
        "event_callback" => {
            let event_id = envelope
                .event_id
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| anyhow!("slack event_callback payload missing event_id"))?;
            let event = envelope
                .event
                .ok_or_else(|| anyhow!("slack event_callback payload missing event"))?;
            Ok(normalize_event(event_id, event))
        }
        other => Ok(SlackEventsRequest::Ignored {
            reason: format!("unsupported envelope type '{other}'"),
        }),
    }
}

fn normalize_event(event_id: String, event: SlackEventPayload) -> SlackEventsRequest {
    if event.event_type != "reaction_added" {
        return SlackEventsRequest::Ignored {
            reason: format!("unsupported event type '{}'", event.event_type),
        };
    }
    let Some(item) = event.item else {
        return ignored("reaction_added without item");
    };
    if item.item_type != "message" {
        return SlackEventsRequest::Ignored {
            reason: format!("reaction on unsupported item type '{}'", item.item_type),
        };
    }
    let Some(channel) = non_empty(item.channel) else {
        return ignored("reaction item missing channel");
    };
    let Some(item_ts) = non_empty(item.ts) else {
        return ignored("reaction item missing ts");
    };
    let Some(reaction) = non_empty(event.reaction) else {
        return ignored("reaction_added missing reaction name");
    };
    let Some(user_id) = non_empty(event.user) else {
        return ignored("reaction_added missing user");
    };

    SlackEventsRequest::ReactionAdded(ReactionEvent {
        event_id,
        channel,
        item_ts,
        reaction,
        user_id,
    })
}

fn ignored(reason: &str) -> SlackEventsRequest {
    SlackEventsRequest::Ignored {
        reason: reason.to_string(),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

/// Verifies a Slack `v0` request signature and the request timestamp skew.
pub fn verify_slack_request_signature(
    body: &str,
    signature: Option<&str>,
    timestamp: Option<&str>,
    signing_secret: &str,
    now_unix_ms: u64,
    max_skew_seconds: u64,
) -> Result<()> {
    let signature = signature
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("missing {SLACK_SIGNATURE_HEADER} header"))?;
    let timestamp = timestamp
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("missing {SLACK_TIMESTAMP_HEADER} header"))?;
    validate_timestamp_skew(timestamp, now_unix_ms, max_skew_seconds)?;

    let Some(digest_hex) = signature.strip_prefix(SLACK_SIGNATURE_VERSION_PREFIX) else {
        bail!("{SLACK_SIGNATURE_HEADER} must look like v0=<sha256 hex>");
    };
    let expected_digest = decode_signature_digest(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(signing_secret.as_bytes())
        .context("slack signing secret cannot key hmac-sha256")?;
    mac.update(format!("v0:{timestamp}:{body}").as_bytes());
    mac.verify_slice(&expected_digest)
        .map_err(|_| anyhow!("request body does not match {SLACK_SIGNATURE_HEADER}"))
}

fn validate_timestamp_skew(timestamp: &str, now_unix_ms: u64, max_skew_seconds: u64) -> Result<()> {
    let timestamp_seconds = timestamp
        .parse::<u64>()
        .with_context(|| format!("invalid slack request timestamp '{timestamp}'"))?;
    if max_skew_seconds == 0 {
        return Ok(());
    }
    let now_seconds = now_unix_ms / 1_000;
    let skew = now_seconds.abs_diff(timestamp_seconds);
    if skew > max_skew_seconds {
        bail!("slack request timestamp skew {skew}s exceeds max {max_skew_seconds}s");
    }
    Ok(())
}

/// Decodes the hex part of a `v0=` signature into the 32-byte sha256 digest.
fn decode_signature_digest(digest_hex: &str) -> Result<Vec<u8>> {
    if digest_hex.len() != SLACK_DIGEST_HEX_LEN {
        bail!(
            "{SLACK_SIGNATURE_HEADER} digest must be {SLACK_DIGEST_HEX_LEN} hex characters, got {}",
            digest_hex.len()
        );
    }
    digest_hex
        .as_bytes()
        .chunks(2)
        .map(|pair| match (hex_nibble(pair[0]), hex_nibble(pair[1])) {
            (Some(high), Some(low)) => Ok((high << 4) | low),
            _ => Err(anyhow!(
                "{SLACK_SIGNATURE_HEADER} digest contains non-hex characters"
            )),
        })
        .collect()
}

fn hex_nibble(byte: u8) -> Option<u8> {
    char::from(byte).to_digit(16).map(|digit| digit as u8)
}
