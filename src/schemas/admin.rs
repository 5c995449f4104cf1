use serde::Deserialize;
use serde_json::{Map, Value};
use validator::Validate;

use crate::db::types::PurgeTarget;

#[derive(Debug, Deserialize)]
pub(crate) struct PurgeRequest {
    pub(crate) target: PurgeTarget,
    #[serde(alias = "adminSecret")]
    pub(crate) admin_secret: String,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ClaimsRequest {
    #[validate(length(min = 1, message = "uid is required"))]
    pub(crate) uid: String,
    #[serde(default)]
    pub(crate) claims: Map<String, Value>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn purge_request_parses_client_shape() {
        let request: PurgeRequest =
            serde_json::from_value(json!({ "target": "schedules", "adminSecret": "x" })).unwrap();
        assert_eq!(request.target, PurgeTarget::Schedules);

        let unknown = serde_json::from_value::<PurgeRequest>(
            json!({ "target": "everything", "adminSecret": "x" }),
        );
        assert!(unknown.is_err());
    }
}
