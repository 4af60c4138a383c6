//! Boundary to the capability services.
//!
//! The router never knows how a backend is reached. Hosts supply a
//! [`ServiceTransport`]; the router bounds every call by the decision timeout
//! and treats a timeout the same as a failed response.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use switchboard_core::{Operation, ServiceStatus};

/// Request issued to a capability service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
    /// Operation name (the tool name).
    pub operation_type: String,
    /// Operation arguments and routing context.
    pub payload: Value,
}

impl ServiceRequest {
    /// Build the request for an operation.
    #[must_use]
    pub fn for_operation(operation: &Operation) -> Self {
        Self {
            operation_type: operation.name.clone(),
            payload: serde_json::json!({
                "operationId": operation.id,
                "sessionId": operation.session_id,
                "arguments": operation.arguments,
                "priority": operation.effective_priority(),
            }),
        }
    }
}

/// Response from a capability service.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceResponse {
    /// Whether the service handled the request.
    pub success: bool,
    /// Result payload on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceResponse {
    /// Successful response carrying `result`.
    #[must_use]
    pub fn ok(result: Value) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Failed response carrying `error`.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Client for the capability services.
///
/// Transport-level errors are reported as a failed [`ServiceResponse`]; the
/// router enforces timeouts itself.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceTransport: Send + Sync {
    /// Issue a request to `service_id`.
    async fn issue(&self, service_id: &str, request: ServiceRequest) -> ServiceResponse;

    /// Probe the current health of `service_id`.
    async fn probe(&self, service_id: &str) -> ServiceStatus;
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::{Priority, SessionId};

    #[test]
    fn request_carries_operation_context() {
        let op = Operation::new("Grep", SessionId::from("sess-1"))
            .with_arguments(serde_json::json!({"pattern": "fn main"}))
            .with_priority(Priority::High);
        let req = ServiceRequest::for_operation(&op);
        assert_eq!(req.operation_type, "Grep");
        assert_eq!(req.payload["sessionId"], "sess-1");
        assert_eq!(req.payload["arguments"]["pattern"], "fn main");
        assert_eq!(req.payload["priority"], "high");
    }

    #[test]
    fn response_omits_absent_fields() {
        let json = serde_json::to_value(ServiceResponse::ok(serde_json::json!(1))).unwrap();
        assert!(json.get("error").is_none());
        let json = serde_json::to_value(ServiceResponse::failed("boom")).unwrap();
        assert_eq!(json["error"], "boom");
        assert!(json.get("result").is_none());
    }
}
