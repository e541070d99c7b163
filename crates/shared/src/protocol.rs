use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ErrorCode};

/// Body accepted by the delivery boundary. Both fields are optional on the wire so that a
/// missing value surfaces as a bad request instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryRequest {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub route_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facility_level_kg: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl DeliveryResponse {
    pub fn ok(message: impl Into<String>, facility_level_kg: Option<f64>) -> Self {
        Self {
            success: true,
            message: message.into(),
            facility_level_kg,
            code: None,
        }
    }

    pub fn failure(error: ApiError) -> Self {
        Self {
            success: false,
            message: error.message,
            facility_level_kg: None,
            code: Some(error.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_route_id() {
        let request: DeliveryRequest =
            serde_json::from_str(r#"{"action":"complete","routeId":7}"#).expect("json");
        assert_eq!(request.action.as_deref(), Some("complete"));
        assert_eq!(request.route_id, Some(7));

        let empty: DeliveryRequest = serde_json::from_str("{}").expect("json");
        assert!(empty.action.is_none());
        assert!(empty.route_id.is_none());
    }

    #[test]
    fn failure_response_carries_code_and_hides_level() {
        let response =
            DeliveryResponse::failure(ApiError::new(ErrorCode::StateConflict, "already delivered"));
        let value = serde_json::to_value(&response).expect("json");
        assert_eq!(value["success"], false);
        assert_eq!(value["code"], "state_conflict");
        assert!(value.get("facilityLevelKg").is_none());
    }
}
