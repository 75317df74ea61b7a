//! Reaction workflow engine tying Slack threads to Azure DevOps work items.

pub mod gateways;
pub mod reaction_workflow;
pub mod thread_state_store;

pub use gateways::{ChatGateway, TicketTracker};
pub use reaction_workflow::{
    ClaimPolicy, ReactionKind, ReactionOutcome, ReactionWorkflow, ReactionWorkflowConfig,
    WorkflowError,
};
pub use thread_state_store::{ThreadRecord, ThreadStateError, ThreadStateStore};
