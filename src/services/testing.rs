//! In-memory collaborators for tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

use crate::models::Destination;
use crate::services::dispatcher::{CodeDispatcher, DispatchError};
use crate::services::verifier::{CodeVerifier, VerifierError};

pub struct RecordingVerifier {
    expected: String,
    calls: AtomicUsize,
    last_code: Mutex<Option<String>>,
}

impl RecordingVerifier {
    pub fn expecting(code: &str) -> Self {
        RecordingVerifier {
            expected: code.to_string(),
            calls: AtomicUsize::new(0),
            last_code: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_code(&self) -> Option<String> {
        self.last_code.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl CodeVerifier for RecordingVerifier {
    async fn verify(&self, _destination: &Destination, code: &str) -> Result<bool, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_code.lock().unwrap() = Some(code.to_string());
        Ok(code == self.expected)
    }
}

pub struct UnavailableVerifier;

#[rocket::async_trait]
impl CodeVerifier for UnavailableVerifier {
    async fn verify(&self, _destination: &Destination, _code: &str) -> Result<bool, VerifierError> {
        Err(VerifierError::Request("connection refused".into()))
    }
}

/// Holds every verification until [`GatedVerifier::release`] is called.
pub struct GatedVerifier {
    gate: Notify,
    entered: Notify,
    calls: AtomicUsize,
}

impl GatedVerifier {
    pub fn new() -> Self {
        GatedVerifier {
            gate: Notify::new(),
            entered: Notify::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub async fn wait_until_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[rocket::async_trait]
impl CodeVerifier for GatedVerifier {
    async fn verify(&self, _destination: &Destination, _code: &str) -> Result<bool, VerifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.entered.notify_one();
        self.gate.notified().await;
        Ok(true)
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    requests: Mutex<Vec<Destination>>,
}

impl RecordingDispatcher {
    pub fn requests(&self) -> Vec<Destination> {
        self.requests.lock().unwrap().clone()
    }
}

#[rocket::async_trait]
impl CodeDispatcher for RecordingDispatcher {
    async fn request_new_code(&self, destination: &Destination) -> Result<(), DispatchError> {
        self.requests.lock().unwrap().push(destination.clone());
        Ok(())
    }
}
