//! Azure DevOps Boards client used to file and close CloudOps support tickets.

pub mod devops_api_client;
mod devops_error;
pub mod work_item;

pub use devops_api_client::{
    DevOpsApiClient, DevOpsClientConfig, DEFAULT_CLOSED_STATE, DEFAULT_DEVOPS_API_BASE,
    DEFAULT_WORK_ITEM_TYPE,
};
pub use devops_error::TrackerError;
pub use work_item::{Iteration, TicketDraft};
