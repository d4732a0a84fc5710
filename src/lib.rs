pub mod auth;
pub mod comment_tree;
pub mod config;
pub mod error;
pub mod media;
pub mod models;
pub mod openapi;
pub mod repo;
pub mod routes;
pub mod security;
pub mod upload;

// Re-export commonly used items for tests / external users
pub use config::AppConfig;
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
