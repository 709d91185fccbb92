pub mod agent;
pub mod api;
pub mod auth;
pub mod health;

pub use agent::AgentServerState;
pub use api::{start_server, AppState};
pub use health::HealthCheck;
