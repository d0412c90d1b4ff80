//! Single-run admission gate
//!
//! At most one tool run executes at a time. Admission is an atomic
//! compare-and-set on a shared flag; the returned token resets the flag when
//! dropped, so every exit path of a run returns the gate to idle.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Default)]
pub struct AdmissionGate {
    running: Arc<AtomicBool>,
}

impl AdmissionGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the gate. Returns `None` while another run holds it.
    pub fn try_acquire(&self) -> Option<AdmissionToken> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| {
                let token = AdmissionToken {
                    running: Arc::clone(&self.running),
                    run_id: Uuid::new_v4(),
                };
                tracing::debug!(run_id = %token.run_id, "Run admitted");
                token
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of admission. Holding it keeps the gate in the running state.
#[derive(Debug)]
pub struct AdmissionToken {
    running: Arc<AtomicBool>,
    run_id: Uuid,
}

impl AdmissionToken {
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }
}

impl Drop for AdmissionToken {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        tracing::debug!(run_id = %self.run_id, "Run released");
    }
}
