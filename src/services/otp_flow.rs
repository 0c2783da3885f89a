use log::{debug, info, warn};

use crate::models::{
    CODE_LENGTH, CodeBuffer, Destination, FlowError, FlowOptions, FlowPhase, FlowSignal, LAST_SLOT,
    ResendTimer, VerificationAttempt,
};
use crate::services::verifier::{CodeVerifier, VerifierError};
use crate::utils::strip_non_digits;

/// Outcome of asking the flow to submit its code.
#[derive(Debug)]
pub enum Submission {
    /// The code is complete and must be checked by the verifier.
    Dispatch(PendingVerification),
    /// Rejected locally without calling the verifier.
    Settled(VerificationAttempt),
    /// A submission is already in flight, or the flow already succeeded.
    Ignored,
}

/// A submission in flight. Handed back to [`OtpFlow::finish_submit`].
#[derive(Debug)]
pub struct PendingVerification {
    attempt: VerificationAttempt,
}

impl PendingVerification {
    pub fn code(&self) -> &str {
        &self.attempt.submitted_code
    }
}

/// One OTP entry session: a six slot buffer, its focus cursor and the resend countdown.
///
/// Every mutating operation queues [`FlowSignal`]s which the host drains and
/// forwards to whatever renders the slots.
#[derive(Debug)]
pub struct OtpFlow {
    destination: Destination,
    options: FlowOptions,
    buffer: CodeBuffer,
    focus: usize,
    timer: ResendTimer,
    submitting: bool,
    succeeded: bool,
    signals: Vec<FlowSignal>,
}

impl OtpFlow {
    pub fn new(destination: Destination, options: FlowOptions) -> Self {
        let timer = ResendTimer::new(options.resend_cooldown_secs);
        OtpFlow {
            destination,
            options,
            buffer: CodeBuffer::new(),
            focus: 0,
            timer,
            submitting: false,
            succeeded: false,
            signals: vec![FlowSignal::Focus { slot: 0 }],
        }
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn buffer(&self) -> &CodeBuffer {
        &self.buffer
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn timer(&self) -> &ResendTimer {
        &self.timer
    }

    pub fn is_complete(&self) -> bool {
        self.buffer.is_complete()
    }

    pub fn is_submitting(&self) -> bool {
        self.submitting
    }

    pub fn phase(&self) -> FlowPhase {
        if self.succeeded {
            FlowPhase::Succeeded
        } else if self.submitting {
            FlowPhase::Verifying
        } else if self.buffer.is_complete() {
            FlowPhase::Ready
        } else {
            FlowPhase::Entering
        }
    }

    pub fn drain_signals(&mut self) -> Vec<FlowSignal> {
        std::mem::take(&mut self.signals)
    }

    /// Writes typed or pasted text starting at `slot` and returns the new focus.
    pub fn on_digit_input(&mut self, slot: usize, raw_text: &str) -> Result<usize, FlowError> {
        self.ensure_editable()?;
        check_slot(slot)?;

        let digits: Vec<char> = strip_non_digits(raw_text).chars().collect();
        match digits.as_slice() {
            [] => return Ok(self.focus),
            [digit] => {
                self.buffer.set(slot, *digit);
                self.focus = (slot + 1).min(LAST_SLOT);
            }
            pasted => {
                let written = pasted.len().min(CODE_LENGTH - slot);
                for (offset, digit) in pasted.iter().take(written).enumerate() {
                    self.buffer.set(slot + offset, *digit);
                }

                let mut next = (slot + written).min(LAST_SLOT);
                while next < LAST_SLOT && self.buffer.is_filled(next) {
                    next += 1;
                }
                self.focus = next;
            }
        }

        self.emit_focus();
        Ok(self.focus)
    }

    pub fn on_backspace(&mut self, slot: usize) -> Result<usize, FlowError> {
        self.ensure_editable()?;
        check_slot(slot)?;

        self.buffer.clear_slot(slot);
        self.focus = slot.saturating_sub(1);
        self.emit_focus();
        Ok(self.focus)
    }

    /// First half of a submission. The verifier is only involved for [`Submission::Dispatch`].
    pub fn begin_submit(&mut self) -> Submission {
        if self.succeeded || self.submitting {
            debug!("Ignoring submit for {}", self.destination.mobile);
            return Submission::Ignored;
        }

        let attempt = VerificationAttempt::pending(self.buffer.code());
        if !self.buffer.is_complete() {
            self.report(FlowError::IncompleteCode);
            return Submission::Settled(attempt.fail(FlowError::IncompleteCode));
        }

        self.submitting = true;
        Submission::Dispatch(PendingVerification { attempt })
    }

    /// Second half of a submission: applies what the verifier answered.
    pub fn finish_submit(
        &mut self,
        pending: PendingVerification,
        outcome: Result<bool, VerifierError>,
    ) -> VerificationAttempt {
        self.submitting = false;
        let attempt = pending.attempt;

        match outcome {
            Ok(true) => {
                info!("OTP verified for {}", self.destination.mobile);
                self.succeeded = true;
                self.signals.push(FlowSignal::Completed);
                attempt.succeed()
            }
            Ok(false) => {
                warn!("Incorrect OTP entered for {}", self.destination.mobile);
                self.buffer.reset();
                self.focus = 0;
                self.signals.push(FlowSignal::Shake);
                self.report(FlowError::Mismatch);
                self.emit_focus();
                attempt.fail(FlowError::Mismatch)
            }
            Err(e) => {
                warn!("Verifier unavailable for {}: {}", self.destination.mobile, e);
                self.report(FlowError::VerifierUnavailable);
                attempt.fail(FlowError::VerifierUnavailable)
            }
        }
    }

    /// Submits against `verifier`. `None` when the flow already succeeded.
    pub async fn submit<V>(&mut self, verifier: &V) -> Option<VerificationAttempt>
    where
        V: CodeVerifier + ?Sized,
    {
        match self.begin_submit() {
            Submission::Dispatch(pending) => {
                let outcome = verifier.verify(&self.destination, pending.code()).await;
                Some(self.finish_submit(pending, outcome))
            }
            Submission::Settled(attempt) => Some(attempt),
            Submission::Ignored => None,
        }
    }

    /// One second of the resend countdown.
    pub fn tick(&mut self) {
        if self.succeeded {
            return;
        }
        if self.timer.tick() {
            debug!("Resend available for {}", self.destination.mobile);
        }
    }

    /// Restarts entry with a fresh cooldown. The caller dispatches the new code.
    pub fn resend(&mut self) -> Result<(), FlowError> {
        self.ensure_editable()?;
        if !self.timer.can_resend() {
            return Err(FlowError::ResendTooSoon {
                seconds_remaining: self.timer.seconds_remaining(),
            });
        }

        self.buffer.reset();
        self.timer.restart();
        self.focus = 0;
        self.emit_focus();
        self.signals.push(FlowSignal::CodeRequested);
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), FlowError> {
        if self.submitting || self.succeeded {
            return Err(FlowError::NotEditable);
        }
        Ok(())
    }

    fn emit_focus(&mut self) {
        self.signals.push(FlowSignal::Focus { slot: self.focus });
    }

    fn report(&mut self, error: FlowError) {
        self.signals.push(FlowSignal::Error {
            message: error.to_string(),
            presentation: self.options.error_presentation,
        });
    }
}

fn check_slot(slot: usize) -> Result<(), FlowError> {
    if slot >= CODE_LENGTH {
        return Err(FlowError::SlotOutOfRange { slot });
    }
    Ok(())
}
