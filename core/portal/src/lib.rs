//! Broadcast portal backend: viewer presence for the TV and radio streams,
//! site content, admin sessions and dashboard metrics over a JSON API.

pub mod auth;
pub mod clock;
pub mod config;
pub mod content;
pub mod db;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod presence;
pub mod routes;
pub mod state;
pub mod sweep;

pub use routes::router;
pub use state::AppState;
