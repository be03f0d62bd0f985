//! Dashboard analysis orchestration: backend gateway, validation and
//! similarity gates, session state and the request handler tying them up.

pub mod analyzer;
pub mod backends;
pub mod config;
pub mod gateway;
pub mod imaging;
pub mod session;
pub mod similarity;
pub mod validator;

pub use analyzer::{Analyzer, ComparisonOutcome, DashboardUpload, Rejection};
pub use config::{BackendKind, Settings};
pub use gateway::InferenceGateway;
pub use session::{DashboardContext, DashboardKey, Session};
