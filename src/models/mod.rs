// Data models for the request pipeline and backend DTOs

pub mod api;
pub mod request;

pub use api::{AuthResponse, GoogleLoginRequest, LoginRequest, RefreshRequest, SignupRequest, User};
pub use request::{ApiResponse, Method, RequestDescriptor};
