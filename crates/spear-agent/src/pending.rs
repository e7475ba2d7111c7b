use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Instant;

use tracing::{debug, warn};

use crate::envelope::Response;

/// Called exactly once with the Response matching a pending id.
pub type Completion = Box<dyn FnOnce(Response) + Send + 'static>;

struct PendingRequest {
    method: String,
    issued_at: Instant,
    completion: Completion,
}

/// Outbound requests awaiting a Response, keyed by id.
#[derive(Default)]
pub struct PendingTable {
    entries: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a completion for `id`. Must happen before the request is sent.
    pub fn insert(&self, id: u64, method: &str, completion: Completion) {
        let previous = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                PendingRequest {
                    method: method.to_string(),
                    issued_at: Instant::now(),
                    completion,
                },
            );
        if previous.is_some() {
            warn!(id, method, "replaced pending request with duplicate id");
        }
    }

    /// Route `response` to its pending entry. Returns `false` when no entry
    /// matches, in which case the response is dropped.
    pub fn complete(&self, response: Response) -> bool {
        let entry = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&response.id);

        match entry {
            Some(pending) => {
                debug!(
                    id = response.id,
                    method = %pending.method,
                    code = response.code,
                    elapsed_ms = pending.issued_at.elapsed().as_millis() as u64,
                    "completing pending request"
                );
                (pending.completion)(response);
                true
            }
            None => {
                warn!(id = response.id, "response for unknown request id dropped");
                false
            }
        }
    }

    /// Forget `id` without completing it. Returns whether an entry was removed.
    pub fn cancel(&self, id: u64) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
