//! HTTP client against the per-GPU inference backend (`/easy/submit`,
//! `/easy/query`) and its paired TTS backend (`/v1/invoke`).

mod error;
mod http_backend_client;

pub use error::ClientError;
pub use http_backend_client::{HttpBackendClient, HttpBackendClientConfig};
