use serde::{Deserialize, Serialize};
use rocket_okapi::okapi::schemars::JsonSchema;

use super::flow::{FlowPhase, FlowSignal, VerificationAttempt};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct StartFlowDto {
    pub mobile: String,
    #[serde(default)]
    pub country_code: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DigitInputDto {
    pub slot: usize,
    pub text: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BackspaceDto {
    pub slot: usize,
}

/// What the client needs to render one flow.
#[derive(Debug, Serialize, JsonSchema)]
pub struct FlowView {
    pub id: String,
    pub display_phone: String,
    pub slots: Vec<String>,
    pub focus: usize,
    pub phase: FlowPhase,
    pub complete: bool,
    pub seconds_remaining: u32,
    pub can_resend: bool,
    pub signals: Vec<FlowSignal>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct VerifyResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempt: Option<VerificationAttempt>,
    pub flow: FlowView,
    #[serde(rename = "accessToken", skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ResendResponse {
    pub resent: bool,
    pub flow: FlowView,
}
