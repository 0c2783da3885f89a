use log::{info, warn};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use crate::config::Config;
use crate::models::Destination;
use crate::services::dispatcher::{CodeDispatcher, DispatchError};
use crate::services::verifier::{CodeVerifier, VerifierError};
use crate::utils::strip_non_digits;

const MSG91_BASE: &str = "https://control.msg91.com/api/v5/otp";

#[derive(Debug, Deserialize)]
struct Msg91Reply {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    message: Option<String>,
}

/// MSG91 OTP API: sends codes by SMS and checks them.
pub struct Msg91Service {
    client: Client,
    auth_key: Option<String>,
    template_id: Option<String>,
}

impl Msg91Service {
    pub fn new(auth_key: Option<String>, template_id: Option<String>) -> Self {
        Msg91Service {
            client: Client::new(),
            auth_key,
            template_id,
        }
    }

    pub fn from_config() -> Self {
        let service = Self::new(Config::msg91_auth_key(), Config::msg91_template_id());
        if !service.is_enabled() {
            warn!("MSG91 credentials not configured. Codes will not be delivered.");
        }
        service
    }

    pub fn is_enabled(&self) -> bool {
        self.auth_key.is_some() && self.template_id.is_some()
    }

    fn auth_key(&self) -> Result<&str, String> {
        self.auth_key
            .as_deref()
            .ok_or_else(|| "MSG91_AUTH_KEY not configured".to_string())
    }

    fn template_id(&self) -> Result<&str, String> {
        self.template_id
            .as_deref()
            .ok_or_else(|| "MSG91_TEMPLATE_ID not configured".to_string())
    }

    /// International number without the plus sign, e.g. `919876543210`.
    fn recipient(destination: &Destination) -> String {
        format!(
            "{}{}",
            strip_non_digits(&destination.country_code),
            destination.mobile
        )
    }
}

#[rocket::async_trait]
impl CodeDispatcher for Msg91Service {
    async fn request_new_code(&self, destination: &Destination) -> Result<(), DispatchError> {
        let template_id = self.template_id().map_err(DispatchError::NotConfigured)?;
        let auth_key = self.auth_key().map_err(DispatchError::NotConfigured)?;

        let body = json!({
            "template_id": template_id,
            "mobile": Self::recipient(destination),
            "authkey": auth_key,
        });

        let res = self
            .client
            .post(MSG91_BASE)
            .json(&body)
            .send()
            .await
            .map_err(|e| DispatchError::Request(format!("MSG91 request failed: {}", e)))?;

        if !res.status().is_success() {
            let text = res.text().await.unwrap_or_else(|_| "MSG91 error".to_string());
            return Err(DispatchError::Request(text));
        }

        info!("OTP SMS requested for {}", destination.mobile);
        Ok(())
    }
}

#[rocket::async_trait]
impl CodeVerifier for Msg91Service {
    async fn verify(&self, destination: &Destination, code: &str) -> Result<bool, VerifierError> {
        let auth_key = self.auth_key().map_err(VerifierError::NotConfigured)?;
        let mobile = Self::recipient(destination);

        let res = self
            .client
            .post(format!("{}/verify", MSG91_BASE))
            .query(&[("mobile", mobile.as_str()), ("otp", code), ("authkey", auth_key)])
            .send()
            .await
            .map_err(|e| VerifierError::Request(format!("MSG91 request failed: {}", e)))?;

        if !res.status().is_success() {
            let text = res
                .text()
                .await
                .unwrap_or_else(|_| "MSG91 verification failed".to_string());
            return Err(VerifierError::Request(text));
        }

        let reply: Msg91Reply = res
            .json()
            .await
            .map_err(|e| VerifierError::Request(format!("Unexpected MSG91 reply: {}", e)))?;

        if reply.kind != "success" {
            info!(
                "MSG91 rejected code for {}: {}",
                destination.mobile,
                reply.message.unwrap_or_default()
            );
        }
        Ok(reply.kind == "success")
    }
}
