// Endpoint services layered on the request pipeline

mod auth;
mod resources;
mod users;

pub use auth::AuthService;
pub use resources::{Resource, ResourceClient};
pub use users::UserService;

use serde::de::DeserializeOwned;

use crate::error::ApiError;
use crate::models::request::ApiResponse;

/// Decode a successful envelope into a typed DTO
fn decode<T: DeserializeOwned>(response: ApiResponse) -> Result<T, ApiError> {
    let status = response.status;
    response.into_json().map_err(|e| ApiError::Parse {
        status,
        message: e.to_string(),
    })
}
