use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailRequest {
    /// Message to send
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct EmailResponse {
    /// Delivery error, empty when the message was accepted
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}
