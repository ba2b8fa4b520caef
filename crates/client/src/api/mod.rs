//! Backend REST API client.
//!
//! # Architecture
//!
//! - `reqwest` for HTTP, JSON bodies via `serde`
//! - Every endpoint has an explicit request/response schema in [`types`];
//!   responses are parsed at this boundary before reaching the workflow
//! - Bearer credential attached to every request; a 401 surfaces as
//!   [`ApiError::Unauthorized`] and is left to the auth layer
//!
//! # Example
//!
//! ```rust,ignore
//! use deliverly_client::api::{BackendClient, OrderRef};
//!
//! let client = BackendClient::new(&config)?;
//! let user = client.current_user().await?;
//! let status = client.payment_status(OrderRef::Store(order_id)).await?;
//! ```

mod client;
pub mod types;

pub use client::BackendClient;
pub use types::*;

use thiserror::Error;

/// Longest server-provided detail kept in an error message.
const MAX_DETAIL_CHARS: usize = 500;

/// Errors that can occur when talking to the backend.
#[derive(Debug, Error)]
pub enum ApiError {
    /// HTTP request failed (connection, timeout, TLS).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Backend answered with a non-success status.
    #[error("API error: {status} - {detail}")]
    Rejected { status: u16, detail: String },

    /// Credential missing, expired or rejected.
    #[error("Unauthorized")]
    Unauthorized,

    /// Response body did not match the expected schema.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Endpoint URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Extract a human-readable detail from an error response body.
///
/// The backend answers with `{"detail": "..."}` for domain errors and with
/// field maps (`{"field": ["msg", ...]}`) for validation errors. Field maps
/// are flattened into `"msg, msg"`. Anything else is returned as raw text.
pub(crate) fn extract_detail(body: &str) -> String {
    let trimmed = body.trim();
    let detail = match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(serde_json::Value::Object(map)) => {
            if let Some(serde_json::Value::String(detail)) = map.get("detail") {
                detail.clone()
            } else {
                let mut messages = Vec::new();
                for value in map.values() {
                    collect_messages(value, &mut messages);
                }
                messages.join(", ")
            }
        }
        Ok(value @ serde_json::Value::Array(_)) => {
            let mut messages = Vec::new();
            collect_messages(&value, &mut messages);
            messages.join(", ")
        }
        _ => String::new(),
    };

    let detail = if detail.is_empty() {
        trimmed.to_string()
    } else {
        detail
    };
    detail.chars().take(MAX_DETAIL_CHARS).collect()
}

fn collect_messages(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.push(s.clone()),
        serde_json::Value::Array(items) => {
            for item in items {
                collect_messages(item, out);
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values() {
                collect_messages(item, out);
            }
        }
        serde_json::Value::Number(n) => out.push(n.to_string()),
        serde_json::Value::Bool(_) | serde_json::Value::Null => {}
    }
}
