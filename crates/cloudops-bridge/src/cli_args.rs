use anyhow::{bail, Result};
use clap::Parser;
use cloudops_devops::{DEFAULT_CLOSED_STATE, DEFAULT_DEVOPS_API_BASE, DEFAULT_WORK_ITEM_TYPE};
use cloudops_slack::DEFAULT_SLACK_API_BASE;
use cloudops_workflow::reaction_workflow::{DEFAULT_TEAM_NAME, DEFAULT_TITLE_PREFIX};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "cloudops-bridge",
    about = "Turns Slack reactions into Azure DevOps work items for the CloudOps support channel",
    version
)]
pub struct Cli {
    #[arg(
        long = "bind",
        env = "CLOUDOPS_BIND",
        default_value = "0.0.0.0:3000",
        help = "Address the Slack events endpoint listens on"
    )]
    pub bind: String,

    #[arg(
        long = "slack-signing-secret",
        env = "SLACK_SIGNING_SECRET",
        hide_env_values = true,
        help = "Slack app signing secret used to verify event requests"
    )]
    pub slack_signing_secret: String,

    #[arg(
        long = "slack-token",
        env = "SLACK_TOKEN",
        hide_env_values = true,
        help = "Slack bot token (xoxb-...)"
    )]
    pub slack_token: String,

    #[arg(
        long = "ado-organization",
        env = "ADO_ORGANIZATION",
        help = "Azure DevOps organization name"
    )]
    pub ado_organization: String,

    #[arg(
        long = "project-name",
        env = "PROJECT_NAME",
        help = "Azure DevOps project that receives work items"
    )]
    pub project_name: String,

    #[arg(
        long = "personal-access-token",
        env = "PERSONAL_ACCESS_TOKEN",
        hide_env_values = true,
        help = "Azure DevOps personal access token with work item write scope"
    )]
    pub personal_access_token: String,

    #[arg(
        long = "area-path",
        env = "AREA_PATH",
        help = "Area path assigned to created work items"
    )]
    pub area_path: String,

    #[arg(
        long = "slack-workspace-url",
        env = "SLACK_WORKSPACE_URL",
        help = "Slack archive base URL used for thread links, e.g. https://acme.slack.com/archives"
    )]
    pub slack_workspace_url: String,

    #[arg(
        long = "channel-id",
        env = "CHANNEL_ID",
        help = "Only react to events from this Slack channel"
    )]
    pub channel_id: Option<String>,

    #[arg(
        long = "work-item-id",
        env = "WORK_ITEM_ID",
        value_parser = parse_positive_u64,
        help = "Parent work item every created ticket is linked under"
    )]
    pub work_item_id: u64,

    #[arg(
        long = "slack-api-base",
        env = "CLOUDOPS_SLACK_API_BASE",
        default_value = DEFAULT_SLACK_API_BASE,
        help = "Slack Web API base URL"
    )]
    pub slack_api_base: String,

    #[arg(
        long = "ado-api-base",
        env = "CLOUDOPS_ADO_API_BASE",
        default_value = DEFAULT_DEVOPS_API_BASE,
        help = "Azure DevOps REST API base URL"
    )]
    pub ado_api_base: String,

    #[arg(
        long = "work-item-type",
        env = "CLOUDOPS_WORK_ITEM_TYPE",
        default_value = DEFAULT_WORK_ITEM_TYPE,
        help = "Work item type created for support requests"
    )]
    pub work_item_type: String,

    #[arg(
        long = "closed-state",
        env = "CLOUDOPS_CLOSED_STATE",
        default_value = DEFAULT_CLOSED_STATE,
        help = "State a work item moves to when its thread is closed"
    )]
    pub closed_state: String,

    #[arg(
        long = "team-name",
        env = "CLOUDOPS_TEAM_NAME",
        default_value = DEFAULT_TEAM_NAME,
        help = "Team named in acknowledgement replies"
    )]
    pub team_name: String,

    #[arg(
        long = "title-prefix",
        env = "CLOUDOPS_TITLE_PREFIX",
        default_value = DEFAULT_TITLE_PREFIX,
        help = "Work item title prefix; the thread author's name is appended"
    )]
    pub title_prefix: String,

    #[arg(
        long = "create-reactions",
        env = "CLOUDOPS_CREATE_REACTIONS",
        value_delimiter = ',',
        default_value = "eyes",
        help = "Reactions that file a work item for a thread"
    )]
    pub create_reactions: Vec<String>,

    #[arg(
        long = "acknowledge-reactions",
        env = "CLOUDOPS_ACKNOWLEDGE_REACTIONS",
        value_delimiter = ',',
        default_value = "key",
        help = "Reactions that post an acknowledgement to the thread author"
    )]
    pub acknowledge_reactions: Vec<String>,

    #[arg(
        long = "close-reactions",
        env = "CLOUDOPS_CLOSE_REACTIONS",
        value_delimiter = ',',
        default_value = "white_check_mark,checkered_flag",
        help = "Reactions that close the thread's work item"
    )]
    pub close_reactions: Vec<String>,

    #[arg(
        long = "request-timeout-ms",
        env = "CLOUDOPS_REQUEST_TIMEOUT_MS",
        default_value_t = 15_000,
        value_parser = parse_positive_u64,
        help = "Timeout for outbound Slack and Azure DevOps requests"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "slack-retry-max-attempts",
        env = "CLOUDOPS_SLACK_RETRY_MAX_ATTEMPTS",
        default_value_t = 3,
        value_parser = parse_positive_usize,
        help = "Attempts per Slack request when rate limited"
    )]
    pub slack_retry_max_attempts: usize,

    #[arg(
        long = "slack-retry-base-delay-ms",
        env = "CLOUDOPS_SLACK_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        help = "Base backoff between Slack retries when no Retry-After is sent"
    )]
    pub slack_retry_base_delay_ms: u64,

    #[arg(
        long = "signature-max-skew-seconds",
        env = "CLOUDOPS_SIGNATURE_MAX_SKEW_SECONDS",
        default_value_t = 300,
        help = "Maximum age of a signed Slack request; 0 disables the check"
    )]
    pub signature_max_skew_seconds: u64,

    #[arg(
        long = "processed-event-cap",
        env = "CLOUDOPS_PROCESSED_EVENT_CAP",
        default_value_t = 10_000,
        value_parser = parse_positive_usize,
        help = "Number of recent Slack event ids remembered for redelivery detection"
    )]
    pub processed_event_cap: usize,

    #[arg(
        long = "release-claim-on-failure",
        env = "CLOUDOPS_RELEASE_CLAIM_ON_FAILURE",
        default_value_t = false,
        help = "Let a later reaction retry ticket creation after a failure"
    )]
    pub release_claim_on_failure: bool,
}

impl Cli {
    /// Rejects blank required values, which `env` fallbacks can otherwise supply.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("--slack-signing-secret", &self.slack_signing_secret),
            ("--slack-token", &self.slack_token),
            ("--ado-organization", &self.ado_organization),
            ("--project-name", &self.project_name),
            ("--personal-access-token", &self.personal_access_token),
            ("--area-path", &self.area_path),
            ("--slack-workspace-url", &self.slack_workspace_url),
        ];
        for (flag, value) in required {
            if value.trim().is_empty() {
                bail!("{flag} must not be empty");
            }
        }
        if self.create_reactions.iter().all(|name| name.trim().is_empty()) {
            bail!("--create-reactions must name at least one reaction");
        }
        Ok(())
    }

    pub fn channel_filter(&self) -> Option<String> {
        self.channel_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::Cli;

    fn required_args() -> Vec<&'static str> {
        vec![
            "cloudops-bridge",
            "--slack-signing-secret",
            "secret",
            "--slack-token",
            "xoxb-test",
            "--ado-organization",
            "acme",
            "--project-name",
            "Cloud Ops",
            "--personal-access-token",
            "pat",
            "--area-path",
            "Cloud Ops\\Support",
            "--slack-workspace-url",
            "https://acme.slack.com/archives",
            "--work-item-id",
            "42",
        ]
    }

    #[test]
    fn unit_cli_defaults_match_documented_values() {
        let cli = Cli::try_parse_from(required_args()).expect("parse");
        assert_eq!(cli.bind, "0.0.0.0:3000");
        assert_eq!(cli.slack_api_base, "https://slack.com/api");
        assert_eq!(cli.ado_api_base, "https://dev.azure.com");
        assert_eq!(cli.work_item_type, "User Story");
        assert_eq!(cli.closed_state, "Completed");
        assert_eq!(cli.create_reactions, vec!["eyes"]);
        assert_eq!(cli.acknowledge_reactions, vec!["key"]);
        assert_eq!(cli.close_reactions, vec!["white_check_mark", "checkered_flag"]);
        assert_eq!(cli.signature_max_skew_seconds, 300);
        assert_eq!(cli.work_item_id, 42);
        assert!(!cli.release_claim_on_failure);
        cli.validate().expect("valid");
    }

    #[test]
    fn functional_cli_parses_overrides() {
        let mut args = required_args();
        args.extend([
            "--channel-id",
            "C0CLOUDOPS",
            "--close-reactions",
            "white_check_mark",
            "--release-claim-on-failure",
            "--processed-event-cap",
            "5",
        ]);
        let cli = Cli::try_parse_from(args).expect("parse");
        assert_eq!(cli.channel_filter().as_deref(), Some("C0CLOUDOPS"));
        assert_eq!(cli.close_reactions, vec!["white_check_mark"]);
        assert!(cli.release_claim_on_failure);
        assert_eq!(cli.processed_event_cap, 5);
    }

    #[test]
    fn regression_cli_rejects_blank_and_zero_values() {
        let mut cli = Cli::try_parse_from(required_args()).expect("parse");
        cli.slack_token = " ".to_string();
        let error = cli.validate().expect_err("blank token");
        assert!(error.to_string().contains("--slack-token"));

        cli.channel_id = Some("  ".to_string());
        assert_eq!(cli.channel_filter(), None);

        let args = required_args()
            .into_iter()
            .map(|arg| if arg == "42" { "0" } else { arg })
            .collect::<Vec<_>>();
        assert!(Cli::try_parse_from(args).is_err());
    }
}
