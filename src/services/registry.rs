use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use log::{debug, info, warn};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, interval_at, sleep_until};
use uuid::Uuid;

use crate::config::Config;
use crate::models::{Destination, FlowError, FlowOptions, VerificationAttempt};
use crate::services::dispatcher::{CodeDispatcher, DispatchError};
use crate::services::msg91::Msg91Service;
use crate::services::otp_flow::{OtpFlow, Submission};
use crate::services::verifier::{CodeVerifier, FixedCodeVerifier};

const TICK_PERIOD: Duration = Duration::from_secs(1);

pub type FlowHandle = Arc<Mutex<OtpFlow>>;

type FlowMap = RwLock<HashMap<Uuid, FlowEntry>>;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("OTP flow not found")]
    NotFound,

    #[error(transparent)]
    Flow(#[from] FlowError),
}

struct FlowEntry {
    flow: FlowHandle,
    rearm: Arc<Notify>,
    ticker: JoinHandle<()>,
}

impl Drop for FlowEntry {
    fn drop(&mut self) {
        self.ticker.abort();
    }
}

/// Live OTP flows and the collaborators they share.
pub struct FlowRegistry {
    options: FlowOptions,
    verifier: Arc<dyn CodeVerifier>,
    dispatcher: Arc<dyn CodeDispatcher>,
    flows: Arc<FlowMap>,
}

impl FlowRegistry {
    pub fn new(
        options: FlowOptions,
        verifier: Arc<dyn CodeVerifier>,
        dispatcher: Arc<dyn CodeDispatcher>,
    ) -> Self {
        FlowRegistry {
            options,
            verifier,
            dispatcher,
            flows: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn from_config() -> Self {
        let options = Config::flow_options();
        let msg91 = Arc::new(Msg91Service::from_config());

        let verifier = match &options.expected_code {
            Some(code) => {
                info!("OTP flows verify against a fixed code");
                Arc::new(FixedCodeVerifier::new(code.clone())) as Arc<dyn CodeVerifier>
            }
            None => Arc::clone(&msg91) as Arc<dyn CodeVerifier>,
        };

        Self::new(options, verifier, msg91)
    }

    /// Sends the first code, before any flow exists for the destination.
    pub async fn issue_initial_code(&self, destination: &Destination) -> Result<(), DispatchError> {
        match self.dispatcher.request_new_code(destination).await {
            Err(DispatchError::NotConfigured(reason)) => {
                warn!("Skipping OTP dispatch for {}: {}", destination.mobile, reason);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn start(&self, destination: Destination) -> (Uuid, FlowHandle) {
        let id = Uuid::new_v4();
        info!("Starting OTP flow {} for {}", id, destination.mobile);

        let flow = Arc::new(Mutex::new(OtpFlow::new(destination, self.options.clone())));
        let rearm = Arc::new(Notify::new());

        // The ticker can only expire the entry once it has been inserted.
        let mut flows = self.flows.write().await;
        let ticker = spawn_ticker(Ticker {
            id,
            flow: Arc::downgrade(&flow),
            flows: Arc::downgrade(&self.flows),
            rearm: Arc::clone(&rearm),
            ttl: Duration::from_secs(self.options.flow_ttl_secs),
        });
        flows.insert(
            id,
            FlowEntry {
                flow: Arc::clone(&flow),
                rearm,
                ticker,
            },
        );
        debug!("{} OTP flows active", flows.len());
        drop(flows);

        (id, flow)
    }

    pub async fn get(&self, id: Uuid) -> Result<FlowHandle, RegistryError> {
        self.flows
            .read()
            .await
            .get(&id)
            .map(|entry| Arc::clone(&entry.flow))
            .ok_or(RegistryError::NotFound)
    }

    /// Drops the flow and stops its countdown. Returns false for unknown ids.
    pub async fn teardown(&self, id: Uuid) -> bool {
        let removed = self.flows.write().await.remove(&id);
        if removed.is_some() {
            info!("OTP flow {} closed", id);
        }
        removed.is_some()
    }

    /// Submits the flow's code. The flow lock is released while the verifier runs.
    ///
    /// The attempt is `None` when the submission was ignored. A successful flow is
    /// closed once the configured success delay has passed.
    pub async fn verify(
        &self,
        id: Uuid,
    ) -> Result<(FlowHandle, Option<VerificationAttempt>), RegistryError> {
        let handle = self.get(id).await?;

        let (submission, destination) = {
            let mut flow = handle.lock().await;
            (flow.begin_submit(), flow.destination().clone())
        };

        let attempt = match submission {
            Submission::Dispatch(pending) => {
                let outcome = self.verifier.verify(&destination, pending.code()).await;
                let attempt = handle.lock().await.finish_submit(pending, outcome);

                if attempt.is_success() {
                    if self.options.success_delay_ms > 0 {
                        tokio::time::sleep(Duration::from_millis(self.options.success_delay_ms))
                            .await;
                    }
                    self.teardown(id).await;
                }
                Some(attempt)
            }
            Submission::Settled(attempt) => Some(attempt),
            Submission::Ignored => None,
        };

        Ok((handle, attempt))
    }

    /// Restarts the flow and requests a new code. `false` while the cooldown runs.
    pub async fn resend(&self, id: Uuid) -> Result<(FlowHandle, bool), RegistryError> {
        let handle = self.get(id).await?;

        let destination = {
            let mut flow = handle.lock().await;
            let restarted = flow.resend();
            match restarted {
                Ok(()) => flow.destination().clone(),
                Err(FlowError::ResendTooSoon { seconds_remaining }) => {
                    debug!("Resend for {} refused, {}s left", id, seconds_remaining);
                    drop(flow);
                    return Ok((handle, false));
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(entry) = self.flows.read().await.get(&id) {
            entry.rearm.notify_one();
        }

        if let Err(e) = self.dispatcher.request_new_code(&destination).await {
            warn!("Failed to resend OTP for {}: {}", destination.mobile, e);
        }
        Ok((handle, true))
    }
}

/// Drives one flow's countdown and removes the flow once its lifetime is over.
struct Ticker {
    id: Uuid,
    flow: Weak<Mutex<OtpFlow>>,
    flows: Weak<FlowMap>,
    rearm: Arc<Notify>,
    ttl: Duration,
}

impl Ticker {
    async fn run(self) {
        let mut deadline = Instant::now() + self.ttl;
        let mut interval = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = sleep_until(deadline) => break,
            }

            let Some(flow) = self.flow.upgrade() else {
                return;
            };
            let elapsed = {
                let mut flow = flow.lock().await;
                flow.tick();
                flow.timer().can_resend()
            };
            drop(flow);

            // Parked until a resend restarts the countdown.
            if elapsed {
                tokio::select! {
                    _ = self.rearm.notified() => {
                        deadline = Instant::now() + self.ttl;
                        interval.reset();
                    }
                    _ = sleep_until(deadline) => break,
                }
            }
        }

        self.expire().await;
    }

    async fn expire(self) {
        let Some(flows) = self.flows.upgrade() else {
            return;
        };
        let expired = flows.write().await.remove(&self.id);
        if expired.is_some() {
            info!("OTP flow {} expired", self.id);
        }
    }
}

fn spawn_ticker(ticker: Ticker) -> JoinHandle<()> {
    tokio::spawn(ticker.run())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DEFAULT_FLOW_TTL_SECS, FlowPhase};
    use crate::services::testing::{GatedVerifier, RecordingDispatcher, RecordingVerifier};

    fn destination() -> Destination {
        Destination::new("9876543210", "+91")
    }

    fn registry_with(
        options: FlowOptions,
        verifier: Arc<dyn CodeVerifier>,
    ) -> (Arc<FlowRegistry>, Arc<RecordingDispatcher>) {
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let registry = FlowRegistry::new(options, verifier, dispatcher.clone());
        (Arc::new(registry), dispatcher)
    }

    fn registry() -> (Arc<FlowRegistry>, Arc<RecordingDispatcher>) {
        registry_with(
            FlowOptions::default(),
            Arc::new(RecordingVerifier::expecting("000000")),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_elapses_after_sixty_seconds() {
        let (registry, _) = registry();
        let (_, flow) = registry.start(destination()).await;

        tokio::time::sleep(Duration::from_millis(59_500)).await;
        {
            let flow = flow.lock().await;
            assert!(!flow.timer().can_resend());
            assert_eq!(flow.timer().seconds_remaining(), 1);
        }

        tokio::time::sleep(Duration::from_secs(1)).await;
        let flow = flow.lock().await;
        assert!(flow.timer().can_resend());
        assert_eq!(flow.timer().seconds_remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_stops_the_countdown() {
        let (registry, _) = registry();
        let (id, flow) = registry.start(destination()).await;

        assert!(registry.teardown(id).await);
        assert!(!registry.teardown(id).await);
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert_eq!(flow.lock().await.timer().seconds_remaining(), 60);
        assert!(matches!(
            registry.get(id).await,
            Err(RegistryError::NotFound)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn successful_verification_closes_the_flow() {
        let (registry, _) = registry();
        let (id, flow) = registry.start(destination()).await;
        flow.lock().await.on_digit_input(0, "000000").unwrap();

        let (_, attempt) = registry.verify(id).await.unwrap();

        assert!(attempt.unwrap().is_success());
        assert!(registry.get(id).await.is_err());
        assert_eq!(flow.lock().await.phase(), FlowPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_keeps_the_flow_open() {
        let (registry, _) = registry();
        let (id, flow) = registry.start(destination()).await;
        flow.lock().await.on_digit_input(0, "111111").unwrap();

        let (_, attempt) = registry.verify(id).await.unwrap();

        assert!(!attempt.unwrap().is_success());
        assert!(registry.get(id).await.is_ok());
        assert!(flow.lock().await.buffer().is_empty());
    }

    #[tokio::test]
    async fn overlapping_submit_is_ignored() {
        let verifier = Arc::new(GatedVerifier::new());
        let options = FlowOptions {
            success_delay_ms: 0,
            ..FlowOptions::default()
        };
        let (registry, _) = registry_with(options, verifier.clone());
        let (id, flow) = registry.start(destination()).await;
        flow.lock().await.on_digit_input(0, "123456").unwrap();

        let first = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.verify(id).await })
        };
        verifier.wait_until_entered().await;

        let (_, second) = registry.verify(id).await.unwrap();
        assert!(second.is_none());
        assert_eq!(flow.lock().await.phase(), FlowPhase::Verifying);

        verifier.release();
        let (_, attempt) = first.await.unwrap().unwrap();
        assert!(attempt.unwrap().is_success());
        assert_eq!(verifier.calls(), 1);
    }

    #[tokio::test]
    async fn resend_requests_a_new_code_once_allowed() {
        let (registry, dispatcher) = registry();
        let (id, flow) = registry.start(destination()).await;

        let (_, resent) = registry.resend(id).await.unwrap();
        assert!(!resent);
        assert!(dispatcher.requests().is_empty());

        for _ in 0..60 {
            flow.lock().await.tick();
        }
        let (_, resent) = registry.resend(id).await.unwrap();
        assert!(resent);
        assert_eq!(dispatcher.requests(), vec![destination()]);
        assert_eq!(flow.lock().await.timer().seconds_remaining(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_flow_expires() {
        let (registry, _) = registry();
        let (id, flow) = registry.start(destination()).await;
        let abandoned = Arc::downgrade(&flow);
        drop(flow);

        tokio::time::sleep(Duration::from_secs(DEFAULT_FLOW_TTL_SECS - 1)).await;
        assert!(registry.get(id).await.is_ok());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(matches!(
            registry.get(id).await,
            Err(RegistryError::NotFound)
        ));
        assert!(abandoned.upgrade().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_finishes_once_the_flow_expires() {
        let flows: Arc<FlowMap> = Arc::new(RwLock::new(HashMap::new()));
        let flow = Arc::new(Mutex::new(OtpFlow::new(
            destination(),
            FlowOptions::default(),
        )));
        let ticker = spawn_ticker(Ticker {
            id: Uuid::new_v4(),
            flow: Arc::downgrade(&flow),
            flows: Arc::downgrade(&flows),
            rearm: Arc::new(Notify::new()),
            ttl: Duration::from_secs(90),
        });

        tokio::time::sleep(Duration::from_secs(89)).await;
        assert!(!ticker.is_finished());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(ticker.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn resend_extends_the_flow_lifetime() {
        let options = FlowOptions {
            flow_ttl_secs: 120,
            ..FlowOptions::default()
        };
        let (registry, _) =
            registry_with(options, Arc::new(RecordingVerifier::expecting("000000")));
        let (id, flow) = registry.start(destination()).await;

        tokio::time::sleep(Duration::from_secs(61)).await;
        let (_, resent) = registry.resend(id).await.unwrap();
        assert!(resent);

        tokio::time::sleep(Duration::from_millis(30_500)).await;
        assert_eq!(flow.lock().await.timer().seconds_remaining(), 30);

        tokio::time::sleep(Duration::from_secs(70)).await;
        assert!(registry.get(id).await.is_ok());

        tokio::time::sleep(Duration::from_secs(20)).await;
        assert!(registry.get(id).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_countdown_leaves_the_flow_alone() {
        let (registry, _) = registry();
        let (_, flow) = registry.start(destination()).await;

        tokio::time::sleep(Duration::from_millis(60_500)).await;
        let guard = flow.lock().await;
        assert!(guard.timer().can_resend());

        // A ticker waiting on the lock would hold a strong reference.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(Arc::strong_count(&flow), 2);
        drop(guard);
    }

    #[tokio::test]
    async fn unknown_flow_is_reported() {
        let (registry, _) = registry();
        assert!(matches!(
            registry.verify(Uuid::new_v4()).await,
            Err(RegistryError::NotFound)
        ));
        assert!(matches!(
            registry.resend(Uuid::new_v4()).await,
            Err(RegistryError::NotFound)
        ));
    }
}
