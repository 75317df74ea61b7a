//! Work item records and JSON Patch documents for the Azure DevOps work item API.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FIELD_TITLE: &str = "System.Title";
pub const FIELD_DESCRIPTION: &str = "System.Description";
pub const FIELD_AREA_PATH: &str = "System.AreaPath";
pub const FIELD_ASSIGNED_TO: &str = "System.AssignedTo";
pub const FIELD_ITERATION_PATH: &str = "System.IterationPath";
pub const FIELD_STATE: &str = "System.State";
pub const PARENT_RELATION: &str = "System.LinkTypes.Hierarchy-Reverse";
pub const CURRENT_TIME_FRAME: &str = "current";

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fields of a work item about to be created.
pub struct TicketDraft {
    pub title: String,
    pub description_html: String,
    pub area_path: String,
    /// Display name of the assignee; Azure DevOps resolves it to an identity.
    pub assignee: String,
    pub parent_work_item_id: u64,
    pub iteration_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: String,
    pub name: String,
    pub path: String,
    pub time_frame: Option<String>,
}

impl Iteration {
    pub fn is_current(&self) -> bool {
        self.time_frame.as_deref() == Some(CURRENT_TIME_FRAME)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IterationListResponse {
    #[serde(default)]
    pub(crate) value: Vec<IterationPayload>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct IterationPayload {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    attributes: IterationAttributes,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct IterationAttributes {
    #[serde(default, rename = "timeFrame")]
    time_frame: Option<String>,
}

impl From<IterationPayload> for Iteration {
    fn from(payload: IterationPayload) -> Self {
        Self {
            id: payload.id,
            name: payload.name,
            path: payload.path,
            time_frame: payload.attributes.time_frame,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WorkItemResponse {
    pub(crate) id: Option<u64>,
}

fn add_field(field: &str, value: &str) -> Value {
    json!({ "op": "add", "path": format!("/fields/{field}"), "value": value })
}

/// Builds the creation document for `draft`, linking it under the parent at
/// `parent_url`.
pub(crate) fn render_create_patch(draft: &TicketDraft, parent_url: &str) -> Value {
    let mut operations = vec![
        add_field(FIELD_TITLE, &draft.title),
        add_field(FIELD_DESCRIPTION, &draft.description_html),
        add_field(FIELD_AREA_PATH, &draft.area_path),
        add_field(FIELD_ASSIGNED_TO, &draft.assignee),
        json!({
            "op": "add",
            "path": "/relations/-",
            "value": { "rel": PARENT_RELATION, "url": parent_url },
        }),
    ];
    if let Some(iteration_path) = draft.iteration_path.as_deref() {
        operations.push(add_field(FIELD_ITERATION_PATH, iteration_path));
    }
    Value::Array(operations)
}

pub(crate) fn render_field_patch(fields: &[(&str, &str)]) -> Value {
    Value::Array(
        fields
            .iter()
            .map(|(field, value)| add_field(field, value))
            .collect(),
    )
}
