// Test Doubles
// Stub back ends and a call-counting oracle for engine tests

use super::backends::GenerationBackend;
use super::error::{BackendError, OracleError};
use super::oracle::PerplexityOracle;
use crate::models::GenerationRequest;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub struct CountingOracle {
    value: Option<f64>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl CountingOracle {
    pub fn new(value: f64) -> Self {
        Self { value: Some(value), delay: None, calls: AtomicUsize::new(0) }
    }

    pub fn failing() -> Self {
        Self { value: None, delay: None, calls: AtomicUsize::new(0) }
    }

    /// Blocks for `delay` on every call
    pub fn slow(value: f64, delay: Duration) -> Self {
        Self { value: Some(value), delay: Some(delay), calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PerplexityOracle for CountingOracle {
    fn name(&self) -> &str {
        "counting"
    }

    fn score(&self, _text: &str) -> Result<f64, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.value
            .ok_or_else(|| OracleError::Unavailable("stub oracle offline".to_string()))
    }
}

#[derive(Clone)]
pub enum StubBehavior {
    /// Return these outputs for every call
    Fixed(Vec<String>),
    /// Return the request's source text with a suffix appended
    Append(String),
    Fail(BackendError),
    Delay(Duration, Vec<String>),
}

pub struct StubBackend {
    id: String,
    behavior: StubBehavior,
    calls: AtomicUsize,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl StubBackend {
    pub fn new(id: &str, behavior: StubBehavior) -> Self {
        Self {
            id: id.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn fixed(id: &str, outputs: &[&str]) -> Self {
        Self::new(id, StubBehavior::Fixed(outputs.iter().map(|s| s.to_string()).collect()))
    }

    pub fn failing(id: &str) -> Self {
        Self::new(id, StubBehavior::Fail(BackendError::Provider("stub failure".to_string())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl GenerationBackend for StubBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<String>, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        match &self.behavior {
            StubBehavior::Fixed(outputs) => Ok(outputs.clone()),
            StubBehavior::Append(suffix) => Ok(vec![format!("{} {}", request.source_text, suffix)]),
            StubBehavior::Fail(err) => Err(err.clone()),
            StubBehavior::Delay(delay, outputs) => {
                tokio::time::sleep(*delay).await;
                Ok(outputs.clone())
            }
        }
    }
}
