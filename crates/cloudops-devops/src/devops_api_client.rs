//! Azure DevOps REST client for work item creation, updates and iteration lookup.

use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;

use crate::devops_error::TrackerError;
use crate::work_item::{
    render_create_patch, render_field_patch, Iteration, IterationListResponse, TicketDraft,
    WorkItemResponse, FIELD_STATE,
};

pub const DEFAULT_DEVOPS_API_BASE: &str = "https://dev.azure.com";
pub const DEFAULT_WORK_ITEM_TYPE: &str = "User Story";
pub const DEFAULT_CLOSED_STATE: &str = "Completed";
const WORK_ITEM_API_VERSION: &str = "6.1";
const ITERATION_API_VERSION: &str = "6.0";
const JSON_PATCH_CONTENT_TYPE: &str = "application/json-patch+json";

#[derive(Debug, Clone)]
pub struct DevOpsClientConfig {
    pub api_base: String,
    pub organization: String,
    pub project: String,
    pub personal_access_token: String,
    pub work_item_type: String,
    pub closed_state: String,
    pub request_timeout_ms: u64,
}

impl Default for DevOpsClientConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_DEVOPS_API_BASE.to_string(),
            organization: String::new(),
            project: String::new(),
            personal_access_token: String::new(),
            work_item_type: DEFAULT_WORK_ITEM_TYPE.to_string(),
            closed_state: DEFAULT_CLOSED_STATE.to_string(),
            request_timeout_ms: 15_000,
        }
    }
}

#[derive(Clone)]
pub struct DevOpsApiClient {
    http: reqwest::Client,
    project_base: String,
    work_item_type: String,
    closed_state: String,
}

impl DevOpsApiClient {
    pub fn new(config: DevOpsClientConfig) -> Result<Self, TrackerError> {
        let organization = config.organization.trim();
        let project = config.project.trim();
        let token = config.personal_access_token.trim();
        if organization.is_empty() || project.is_empty() {
            return Err(TrackerError::InvalidConfig(
                "organization and project are required".to_string(),
            ));
        }
        if token.is_empty() {
            return Err(TrackerError::InvalidConfig(
                "personal access token is required".to_string(),
            ));
        }

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("cloudops-bridge"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let auth_header = format!("Basic {}", BASE64_STANDARD.encode(format!(":{token}")));
        let mut auth_value = reqwest::header::HeaderValue::from_str(&auth_header)
            .map_err(|_| TrackerError::InvalidConfig("invalid personal access token".to_string()))?;
        auth_value.set_sensitive(true);
        headers.insert(reqwest::header::AUTHORIZATION, auth_value);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.request_timeout_ms.max(1)))
            .build()?;

        Ok(Self {
            http,
            project_base: format!(
                "{}/{}/{}",
                config.api_base.trim_end_matches('/'),
                encode_path_segment(organization),
                encode_path_segment(project)
            ),
            work_item_type: config.work_item_type.trim().to_string(),
            closed_state: config.closed_state.trim().to_string(),
        })
    }

    /// Browser URL of a work item.
    pub fn work_item_url(&self, id: u64) -> String {
        format!("{}/_workitems/edit/{id}", self.project_base)
    }

    /// REST resource URL of a work item, used as a relation target.
    pub fn work_item_api_url(&self, id: u64) -> String {
        format!("{}/_apis/wit/workItems/{id}", self.project_base)
    }

    pub async fn create_work_item(&self, draft: &TicketDraft) -> Result<u64, TrackerError> {
        let patch = render_create_patch(draft, &self.work_item_api_url(draft.parent_work_item_id));
        let url = format!(
            "{}/_apis/wit/workitems/${}",
            self.project_base,
            encode_path_segment(&self.work_item_type)
        );
        tracing::debug!(title = %draft.title, work_item_type = %self.work_item_type, "creating work item");
        let response: WorkItemResponse = self
            .send_json(
                "create work item",
                self.http
                    .patch(url)
                    .query(&[("api-version", WORK_ITEM_API_VERSION)])
                    .header(reqwest::header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
                    .body(serde_json::to_vec(&patch)?),
            )
            .await?;
        response.id.ok_or_else(|| {
            TrackerError::InvalidResponse("work item creation response missing id".to_string())
        })
    }

    pub async fn update_work_item_fields(
        &self,
        id: u64,
        fields: &[(&str, &str)],
    ) -> Result<(), TrackerError> {
        let patch = render_field_patch(fields);
        let result: Result<WorkItemResponse, TrackerError> = self
            .send_json(
                "update work item",
                self.http
                    .patch(format!("{}/_apis/wit/workitems/{id}", self.project_base))
                    .query(&[("api-version", WORK_ITEM_API_VERSION)])
                    .header(reqwest::header::CONTENT_TYPE, JSON_PATCH_CONTENT_TYPE)
                    .body(serde_json::to_vec(&patch)?),
            )
            .await;
        match result {
            Ok(_) => Ok(()),
            Err(TrackerError::HttpStatus { status: 404, .. }) => {
                Err(TrackerError::WorkItemNotFound { id })
            }
            Err(error) => Err(error),
        }
    }

    /// Moves the work item to the configured terminal state.
    pub async fn close_work_item(&self, id: u64) -> Result<(), TrackerError> {
        tracing::debug!(work_item_id = id, state = %self.closed_state, "closing work item");
        self.update_work_item_fields(id, &[(FIELD_STATE, self.closed_state.as_str())])
            .await
    }

    pub async fn list_iterations(&self) -> Result<Vec<Iteration>, TrackerError> {
        let response: IterationListResponse = self
            .send_json(
                "list iterations",
                self.http
                    .get(format!(
                        "{}/_apis/work/teamsettings/iterations",
                        self.project_base
                    ))
                    .query(&[("api-version", ITERATION_API_VERSION)]),
            )
            .await?;
        Ok(response.value.into_iter().map(Iteration::from).collect())
    }

    /// The iteration flagged current, or `None` when the team has none.
    pub async fn fetch_current_iteration(&self) -> Result<Option<Iteration>, TrackerError> {
        Ok(self
            .list_iterations()
            .await?
            .into_iter()
            .find(Iteration::is_current))
    }

    async fn send_json<T>(
        &self,
        operation: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, TrackerError>
    where
        T: DeserializeOwned,
    {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TrackerError::HttpStatus {
                operation,
                status: status.as_u16(),
                body: truncate_body(&body, 800),
            });
        }
        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn encode_path_segment(raw: &str) -> String {
    let mut encoded = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(char::from(byte))
            }
            _ => encoded.push_str(&format!("%{byte:02X}")),
        }
    }
    encoded
}

fn truncate_body(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut truncated = text.chars().take(max_chars).collect::<String>();
    truncated.push_str("...");
    truncated
}
