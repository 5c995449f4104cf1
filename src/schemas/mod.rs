use std::collections::HashMap;

use serde::Serialize;

pub(crate) mod admin;
pub(crate) mod auth;
pub(crate) mod classroom;
pub(crate) mod user;

#[derive(Debug, Serialize)]
pub(crate) struct HealthResponse {
    pub(crate) service: String,
    pub(crate) status: String,
    pub(crate) components: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct RootResponse {
    pub(crate) message: String,
    pub(crate) version: String,
    pub(crate) docs_url: String,
}

/// Result shape of administrative actions; failures are reported here rather than as 5xx.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct ActionResponse {
    pub(crate) success: bool,
    pub(crate) message: String,
}

impl ActionResponse {
    pub(crate) fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }

    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self { success: false, message: message.into() }
    }
}
