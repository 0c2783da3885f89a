use chrono::{DateTime, Utc};
use rocket_okapi::okapi::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CODE_LENGTH: usize = 6;
pub const LAST_SLOT: usize = CODE_LENGTH - 1;
pub const DEFAULT_RESEND_COOLDOWN_SECS: u32 = 60;
pub const DEFAULT_SUCCESS_DELAY_MS: u64 = 800;
pub const DEFAULT_FLOW_TTL_SECS: u64 = 600;

/// Errors raised by the OTP entry flow. The display strings are shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FlowError {
    #[error("Please enter all 6 digits")]
    IncompleteCode,

    #[error("The OTP you entered is incorrect. Please try again.")]
    Mismatch,

    #[error("We couldn't verify the code right now. Please try again later.")]
    VerifierUnavailable,

    #[error("You can request a new code in {seconds_remaining}s")]
    ResendTooSoon { seconds_remaining: u32 },

    #[error("Slot {slot} does not exist")]
    SlotOutOfRange { slot: usize },

    #[error("The code can't be changed right now")]
    NotEditable,
}

/// Where the code was sent. Passed through to the collaborators untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Destination {
    pub mobile: String,
    pub country_code: String,
}

impl Destination {
    pub fn new(mobile: impl Into<String>, country_code: impl Into<String>) -> Self {
        Destination {
            mobile: mobile.into(),
            country_code: country_code.into(),
        }
    }
}

/// Fixed-size buffer of single digits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeBuffer {
    slots: [Option<char>; CODE_LENGTH],
}

impl CodeBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, slot: usize) -> Option<char> {
        self.slots.get(slot).copied().flatten()
    }

    /// Non-digits are dropped; writes past the last slot are ignored.
    pub(crate) fn set(&mut self, slot: usize, digit: char) {
        if !digit.is_ascii_digit() {
            return;
        }
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = Some(digit);
        }
    }

    pub(crate) fn clear_slot(&mut self, slot: usize) {
        if let Some(cell) = self.slots.get_mut(slot) {
            *cell = None;
        }
    }

    pub(crate) fn reset(&mut self) {
        self.slots = [None; CODE_LENGTH];
    }

    pub fn is_filled(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn filled(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Concatenation of the filled slots.
    pub fn code(&self) -> String {
        self.slots.iter().flatten().collect()
    }

    /// One string per slot, empty when the slot is empty.
    pub fn to_strings(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.map(String::from).unwrap_or_default())
            .collect()
    }
}

/// Countdown gating the resend affordance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResendTimer {
    cooldown_secs: u32,
    seconds_remaining: u32,
    can_resend: bool,
}

impl ResendTimer {
    pub fn new(cooldown_secs: u32) -> Self {
        ResendTimer {
            cooldown_secs,
            seconds_remaining: cooldown_secs,
            can_resend: cooldown_secs == 0,
        }
    }

    pub fn seconds_remaining(&self) -> u32 {
        self.seconds_remaining
    }

    pub fn can_resend(&self) -> bool {
        self.can_resend
    }

    /// Returns true on the tick that ends the cooldown.
    pub(crate) fn tick(&mut self) -> bool {
        if self.can_resend {
            return false;
        }
        self.seconds_remaining = self.seconds_remaining.saturating_sub(1);
        if self.seconds_remaining == 0 {
            self.can_resend = true;
            return true;
        }
        false
    }

    pub(crate) fn restart(&mut self) {
        self.seconds_remaining = self.cooldown_secs;
        self.can_resend = self.cooldown_secs == 0;
    }
}

impl Default for ResendTimer {
    fn default() -> Self {
        Self::new(DEFAULT_RESEND_COOLDOWN_SECS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum AttemptResult {
    Pending,
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct VerificationAttempt {
    pub submitted_code: String,
    pub result: AttemptResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<FlowError>,
    pub attempted_at: DateTime<Utc>,
}

impl VerificationAttempt {
    pub fn pending(code: impl Into<String>) -> Self {
        VerificationAttempt {
            submitted_code: code.into(),
            result: AttemptResult::Pending,
            failure_message: None,
            error: None,
            attempted_at: Utc::now(),
        }
    }

    pub(crate) fn succeed(mut self) -> Self {
        self.result = AttemptResult::Success;
        self
    }

    pub(crate) fn fail(mut self, error: FlowError) -> Self {
        self.result = AttemptResult::Failure;
        self.failure_message = Some(error.to_string());
        self.error = Some(error);
        self
    }

    pub fn is_success(&self) -> bool {
        self.result == AttemptResult::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    Entering,
    Ready,
    Verifying,
    Succeeded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPresentation {
    Inline,
    #[default]
    Modal,
}

/// Instructions for the host. Drained after every operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FlowSignal {
    Focus { slot: usize },
    Shake,
    Error {
        message: String,
        presentation: ErrorPresentation,
    },
    Completed,
    CodeRequested,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowOptions {
    /// `None` leaves the decision to the external verifier.
    pub expected_code: Option<String>,
    pub success_delay_ms: u64,
    pub error_presentation: ErrorPresentation,
    pub resend_cooldown_secs: u32,
    /// Lifetime of a flow, counted from its start or its last resend.
    pub flow_ttl_secs: u64,
}

impl Default for FlowOptions {
    fn default() -> Self {
        FlowOptions {
            expected_code: None,
            success_delay_ms: DEFAULT_SUCCESS_DELAY_MS,
            error_presentation: ErrorPresentation::default(),
            resend_cooldown_secs: DEFAULT_RESEND_COOLDOWN_SECS,
            flow_ttl_secs: DEFAULT_FLOW_TTL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_ignores_non_digits_and_out_of_range_slots() {
        let mut buffer = CodeBuffer::new();
        buffer.set(0, 'a');
        buffer.set(CODE_LENGTH, '1');
        assert!(buffer.is_empty());

        buffer.set(2, '7');
        assert_eq!(buffer.to_strings(), vec!["", "", "7", "", "", ""]);
        assert_eq!(buffer.code(), "7");
        assert_eq!(buffer.filled(), 1);
    }

    #[test]
    fn timer_elapses_once() {
        let mut timer = ResendTimer::new(2);
        assert!(!timer.tick());
        assert!(timer.tick());
        assert!(timer.can_resend());
        assert!(!timer.tick());
        assert_eq!(timer.seconds_remaining(), 0);

        timer.restart();
        assert_eq!(timer.seconds_remaining(), 2);
        assert!(!timer.can_resend());
    }

    #[test]
    fn failed_attempt_carries_user_message() {
        let attempt = VerificationAttempt::pending("111111").fail(FlowError::Mismatch);
        assert_eq!(attempt.result, AttemptResult::Failure);
        assert_eq!(
            attempt.failure_message.as_deref(),
            Some("The OTP you entered is incorrect. Please try again.")
        );
    }

    #[test]
    fn signals_serialize_with_type_tag() {
        let value = serde_json::to_value(FlowSignal::Focus { slot: 3 }).unwrap();
        assert_eq!(value, serde_json::json!({ "type": "focus", "slot": 3 }));
    }
}
