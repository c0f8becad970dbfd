pub mod auth;
pub mod client;
pub mod error;
pub mod files;
pub mod session;
pub mod users;

pub use client::ApiClient;
pub use error::ApiError;
