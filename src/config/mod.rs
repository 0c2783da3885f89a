use rocket::figment::{Figment, Profile, providers::{Env, Format, Toml}};
use rocket::Config as RocketConfig;

use crate::models::{
    DEFAULT_FLOW_TTL_SECS, DEFAULT_RESEND_COOLDOWN_SECS, DEFAULT_SUCCESS_DELAY_MS,
    ErrorPresentation, FlowOptions,
};

pub struct Config;

impl Config {
    /// Same fallback as Rocket: `debug` or `release` depending on the build.
    fn profile() -> Profile {
        Profile::from_env_or("ROCKET_PROFILE", RocketConfig::DEFAULT_PROFILE)
    }

    fn figment() -> Figment {
        Figment::from(RocketConfig::default())
            .merge(Toml::file("Rocket.toml").nested())
            .select(Self::profile())
            .merge(Env::prefixed("ROCKET_"))
    }

    pub fn jwt_secret() -> String {
        Self::figment()
            .extract_inner("jwt_secret")
            .unwrap_or_else(|_| "default-secret".to_string())
    }

    pub fn jwt_expiry() -> i64 {
        Self::figment()
            .extract_inner("jwt_expiry")
            .unwrap_or(900)
    }

    /// Fixed code every flow is checked against. Unset means MSG91 decides.
    pub fn otp_expected_code() -> Option<String> {
        expected_code_in(&Self::figment())
    }

    pub fn otp_success_delay_ms() -> u64 {
        Self::figment()
            .extract_inner("otp_success_delay_ms")
            .unwrap_or(DEFAULT_SUCCESS_DELAY_MS)
    }

    pub fn otp_error_presentation() -> ErrorPresentation {
        Self::figment()
            .extract_inner("otp_error_presentation")
            .unwrap_or_default()
    }

    pub fn otp_resend_cooldown_secs() -> u32 {
        Self::figment()
            .extract_inner("otp_resend_cooldown_secs")
            .unwrap_or(DEFAULT_RESEND_COOLDOWN_SECS)
    }

    pub fn otp_flow_ttl_secs() -> u64 {
        Self::figment()
            .extract_inner("otp_flow_ttl_secs")
            .unwrap_or(DEFAULT_FLOW_TTL_SECS)
    }

    pub fn flow_options() -> FlowOptions {
        FlowOptions {
            expected_code: Self::otp_expected_code(),
            success_delay_ms: Self::otp_success_delay_ms(),
            error_presentation: Self::otp_error_presentation(),
            resend_cooldown_secs: Self::otp_resend_cooldown_secs(),
            flow_ttl_secs: Self::otp_flow_ttl_secs(),
        }
    }

    pub fn msg91_auth_key() -> Option<String> {
        Self::figment()
            .extract_inner("msg91_auth_key")
            .ok()
            .filter(|key: &String| !key.is_empty())
    }

    pub fn msg91_template_id() -> Option<String> {
        Self::figment()
            .extract_inner("msg91_template_id")
            .ok()
            .filter(|id: &String| !id.is_empty())
    }
}

fn expected_code_in(figment: &Figment) -> Option<String> {
    figment
        .extract_inner::<String>("otp_expected_code")
        .ok()
        .filter(|code| !code.is_empty())
}
