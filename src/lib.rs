/// Moderation desk
///
/// Content reports and appeals for a community platform: members flag posts
/// and comments, moderators act on the flags, and members contest outcomes.
/// Served over HTTP with SQLite persistence.

pub mod api;
pub mod auth;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod metrics;
pub mod moderation;
pub mod server;

pub use config::ServerConfig;
pub use context::AppContext;
pub use error::{ModResult, ModerationError};
