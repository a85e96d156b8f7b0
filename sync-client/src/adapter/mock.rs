//! Mock adapter for testing.
//!
//! Records every request, can be told to fail, to report the capability
//! unavailable, or to take a while, and tracks how many deliveries were in
//! flight per id at once.

use super::{AdapterError, SyncAdapter, SyncReceipt, SyncRequest};
use async_trait::async_trait;
use hearth_sync_types::RecordId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock adapter for testing.
#[derive(Debug)]
pub struct MockAdapter {
    inner: Arc<Mutex<MockAdapterInner>>,
}

#[derive(Debug)]
struct MockAdapterInner {
    available: bool,
    requests: Vec<SyncRequest>,
    fail_next: VecDeque<AdapterError>,
    fail_always: Option<AdapterError>,
    delay: Option<Duration>,
    in_flight: HashMap<RecordId, usize>,
    max_in_flight_per_id: usize,
    next_external_id: u64,
}

impl Default for MockAdapterInner {
    fn default() -> Self {
        Self {
            available: true,
            requests: Vec::new(),
            fail_next: VecDeque::new(),
            fail_always: None,
            delay: None,
            in_flight: HashMap::new(),
            max_in_flight_per_id: 0,
            next_external_id: 1,
        }
    }
}

impl MockAdapter {
    /// Create a new mock adapter that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the capability available or not.
    pub fn set_available(&self, available: bool) {
        let mut inner = self.inner.lock().unwrap();
        inner.available = available;
    }

    /// Cause the next call to fail with the given error.
    pub fn fail_next(&self, error: AdapterError) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next.push_back(error);
    }

    /// Cause every call to fail with the given error (`None` to stop).
    pub fn fail_always(&self, error: Option<AdapterError>) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_always = error;
    }

    /// Make every call take `delay` before answering.
    pub fn set_delay(&self, delay: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        inner.delay = delay;
    }

    /// All requests received, in order.
    pub fn requests(&self) -> Vec<SyncRequest> {
        let inner = self.inner.lock().unwrap();
        inner.requests.clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.len()
    }

    /// Number of calls received for one id.
    pub fn calls_for(&self, id: &RecordId) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.requests.iter().filter(|r| &r.id == id).count()
    }

    /// Highest number of concurrent calls seen for a single id.
    pub fn max_in_flight_per_id(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.max_in_flight_per_id
    }

    /// Clear all state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        *inner = MockAdapterInner::default();
    }
}

impl Default for MockAdapter {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(MockAdapterInner::default())),
        }
    }
}

impl Clone for MockAdapter {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[async_trait]
impl SyncAdapter for MockAdapter {
    fn is_available(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.available
    }

    async fn sync_resource(&self, request: &SyncRequest) -> Result<SyncReceipt, AdapterError> {
        let delay = {
            let mut inner = self.inner.lock().unwrap();
            inner.requests.push(request.clone());
            let count = inner.in_flight.entry(request.id.clone()).or_insert(0);
            *count += 1;
            let current = *count;
            inner.max_in_flight_per_id = inner.max_in_flight_per_id.max(current);
            inner.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut inner = self.inner.lock().unwrap();
        if let Some(count) = inner.in_flight.get_mut(&request.id) {
            *count = count.saturating_sub(1);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next.pop_front() {
            return Err(error);
        }
        if let Some(error) = inner.fail_always.clone() {
            return Err(error);
        }

        let external_id = match request.external_id() {
            Some(existing) => existing.to_string(),
            None => {
                let id = format!("ext-{}", inner.next_external_id);
                inner.next_external_id += 1;
                id
            }
        };
        Ok(SyncReceipt {
            external_id: Some(external_id),
        })
    }
}
