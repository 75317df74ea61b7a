use std::sync::Arc;

use anyhow::{Context, Result};
use cloudops_devops::{DevOpsApiClient, DevOpsClientConfig};
use cloudops_slack::SlackApiClient;
use cloudops_workflow::{ClaimPolicy, ReactionWorkflow, ReactionWorkflowConfig, ThreadStateStore};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::cli_args::Cli;
use crate::events_server::{run_events_server, EventsServerConfig, EventsServerState};

pub fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

pub fn build_workflow_config(cli: &Cli) -> ReactionWorkflowConfig {
    ReactionWorkflowConfig {
        area_path: cli.area_path.trim().to_string(),
        parent_work_item_id: cli.work_item_id,
        workspace_url: cli.slack_workspace_url.trim().to_string(),
        channel_filter: cli.channel_filter(),
        title_prefix: cli.title_prefix.trim().to_string(),
        team_name: cli.team_name.trim().to_string(),
        create_reactions: reaction_names(&cli.create_reactions),
        acknowledge_reactions: reaction_names(&cli.acknowledge_reactions),
        close_reactions: reaction_names(&cli.close_reactions),
        claim_policy: if cli.release_claim_on_failure {
            ClaimPolicy::ReleaseOnFailure
        } else {
            ClaimPolicy::RetainOnFailure
        },
    }
}

/// Accepts `:eyes:` as well as `eyes`.
fn reaction_names(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|name| name.trim().trim_matches(':').to_string())
        .filter(|name| !name.is_empty())
        .collect()
}

pub fn build_events_state(cli: &Cli) -> Result<Arc<EventsServerState>> {
    let slack = SlackApiClient::new(
        cli.slack_api_base.clone(),
        cli.slack_token.trim().to_string(),
        cli.request_timeout_ms,
        cli.slack_retry_max_attempts,
        cli.slack_retry_base_delay_ms,
    )?;
    let devops = DevOpsApiClient::new(DevOpsClientConfig {
        api_base: cli.ado_api_base.clone(),
        organization: cli.ado_organization.clone(),
        project: cli.project_name.clone(),
        personal_access_token: cli.personal_access_token.clone(),
        work_item_type: cli.work_item_type.clone(),
        closed_state: cli.closed_state.clone(),
        request_timeout_ms: cli.request_timeout_ms,
    })
    .context("failed to create azure devops client")?;

    let workflow = Arc::new(ReactionWorkflow::new(
        Arc::new(slack),
        Arc::new(devops),
        Arc::new(ThreadStateStore::new()),
        build_workflow_config(cli),
    ));
    Ok(Arc::new(EventsServerState::new(
        workflow,
        &EventsServerConfig {
            signing_secret: cli.slack_signing_secret.trim().to_string(),
            max_skew_seconds: cli.signature_max_skew_seconds,
            processed_event_cap: cli.processed_event_cap,
        },
    )))
}

pub async fn run_bridge(cli: Cli) -> Result<()> {
    cli.validate()?;
    let state = build_events_state(&cli)?;
    tracing::info!(
        organization = %cli.ado_organization,
        project = %cli.project_name,
        parent_work_item_id = cli.work_item_id,
        channel = cli.channel_filter().as_deref().unwrap_or("*"),
        "cloudops bridge starting"
    );
    run_events_server(&cli.bind, state).await
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use cloudops_workflow::ClaimPolicy;

    use super::{build_events_state, build_workflow_config};
    use crate::cli_args::Cli;

    fn cli(extra: &[&str]) -> Cli {
        let mut args = vec![
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
            "https://acme.slack.com/archives/",
            "--work-item-id",
            "42",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).expect("parse cli")
    }

    #[test]
    fn unit_build_workflow_config_maps_cli_values() {
        let config = build_workflow_config(&cli(&[
            "--close-reactions",
            ":white_check_mark:, checkered_flag",
            "--release-claim-on-failure",
        ]));
        assert_eq!(config.parent_work_item_id, 42);
        assert_eq!(config.area_path, "Cloud Ops\\Support");
        assert_eq!(config.close_reactions, vec!["white_check_mark", "checkered_flag"]);
        assert_eq!(config.claim_policy, ClaimPolicy::ReleaseOnFailure);
        assert_eq!(config.channel_filter, None);
        assert_eq!(
            config.thread_permalink("C1", "1700000000.000100"),
            "https://acme.slack.com/archives/C1/p1700000000000100"
        );
    }

    #[test]
    fn functional_build_events_state_constructs_clients() {
        build_events_state(&cli(&[])).expect("state");
    }
}
