//! HTTP front end and process bootstrap for the CloudOps reaction bridge.

pub mod bootstrap;
pub mod cli_args;
pub mod events_server;
pub mod processed_event_index;

pub use bootstrap::{build_events_state, build_workflow_config, init_tracing, run_bridge};
pub use cli_args::Cli;
pub use events_server::{
    build_events_router, run_events_server, EventsServerConfig, EventsServerState,
};
