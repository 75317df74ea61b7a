use thiserror::Error;

#[derive(Debug, Error)]
/// Failures talking to the Azure DevOps REST API.
pub enum TrackerError {
    #[error("invalid azure devops configuration: {0}")]
    InvalidConfig(String),
    #[error("azure devops http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("azure devops {operation} returned non-success status {status}: {body}")]
    HttpStatus {
        operation: &'static str,
        status: u16,
        body: String,
    },
    #[error("azure devops work item {id} not found")]
    WorkItemNotFound { id: u64 },
    #[error("azure devops serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("azure devops returned an invalid response: {0}")]
    InvalidResponse(String),
}
