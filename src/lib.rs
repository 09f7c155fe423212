// fitlog client - library root

pub mod auth;
pub mod config;
pub mod error;
pub mod http_client;
pub mod models;
pub mod services;

pub use auth::TokenManager;
pub use error::ApiError;
pub use http_client::ApiClient;
pub use models::{ApiResponse, Method, RequestDescriptor};
