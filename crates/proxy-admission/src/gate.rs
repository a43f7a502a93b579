//! Counting admission gate bounding concurrent backend requests.

use std::sync::Arc;
use std::time::Duration;

use proxy_core::ProxyError;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, trace};

/// Bounds how many requests may be in flight to the backend at once.
///
/// Waiters are queued in arrival order: a request that arrived earlier is
/// never passed over for one that arrived later. A limit of zero disables
/// the gate entirely; `acquire` then returns immediately with no
/// bookkeeping.
#[derive(Debug)]
pub struct AdmissionGate {
    limit: usize,
    queue_timeout: Option<Duration>,
    semaphore: Option<Arc<Semaphore>>,
}

impl AdmissionGate {
    /// Create a gate admitting at most `limit` concurrent requests
    /// (0 = unlimited).
    pub fn new(limit: usize) -> Self {
        let semaphore = (limit > 0).then(|| Arc::new(Semaphore::new(limit)));
        Self {
            limit,
            queue_timeout: None,
            semaphore,
        }
    }

    /// Fail `acquire` with [`ProxyError::Unavailable`] after `timeout`
    /// instead of waiting indefinitely for a slot.
    #[must_use]
    pub fn with_queue_timeout(mut self, timeout: Duration) -> Self {
        self.queue_timeout = Some(timeout);
        self
    }

    /// Wait for an admission slot.
    ///
    /// The returned permit holds the slot until dropped, tying release to
    /// scope exit on every path out of the forwarding stage.
    pub async fn acquire(&self) -> Result<AdmissionPermit, ProxyError> {
        let Some(semaphore) = &self.semaphore else {
            return Ok(AdmissionPermit { permit: None });
        };

        if semaphore.available_permits() == 0 {
            debug!(limit = self.limit, "Admission gate saturated, queueing request");
        }

        let acquired = match self.queue_timeout {
            Some(deadline) => {
                tokio::time::timeout(deadline, Arc::clone(semaphore).acquire_owned())
                    .await
                    .map_err(|_| ProxyError::Unavailable)?
            }
            None => Arc::clone(semaphore).acquire_owned().await,
        };
        // Closed semaphore means no slot will ever be granted again.
        let permit = acquired.map_err(|_| ProxyError::Unavailable)?;

        trace!(
            available = semaphore.available_permits(),
            "Admission slot granted"
        );
        Ok(AdmissionPermit {
            permit: Some(permit),
        })
    }

    /// Configured limit (0 = unlimited).
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Whether the gate admits without bounding.
    pub fn is_unlimited(&self) -> bool {
        self.semaphore.is_none()
    }

    /// Slots currently free. Unlimited gates report `usize::MAX`.
    pub fn available_slots(&self) -> usize {
        self.semaphore
            .as_ref()
            .map_or(usize::MAX, |semaphore| semaphore.available_permits())
    }
}

/// One granted admission slot, returned to the gate on drop.
#[derive(Debug)]
pub struct AdmissionPermit {
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.permit.is_some() {
            trace!("Admission slot released");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_acquire_and_release_cycle() {
        let gate = AdmissionGate::new(2);
        assert_eq!(gate.available_slots(), 2);

        let first = gate.acquire().await.expect("first slot");
        let second = gate.acquire().await.expect("second slot");
        assert_eq!(gate.available_slots(), 0);

        drop(first);
        assert_eq!(gate.available_slots(), 1);
        drop(second);
        assert_eq!(gate.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_limit_never_exceeded() {
        let gate = Arc::new(AdmissionGate::new(2));
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..5 {
            let gate = Arc::clone(&gate);
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.expect("slot");
                let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                current.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.expect("task completes");
        }

        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(current.load(Ordering::SeqCst), 0);
        assert_eq!(gate.available_slots(), 2);
    }

    #[tokio::test]
    async fn test_unlimited_mode_bypasses_gate() {
        let gate = AdmissionGate::new(0);
        assert!(gate.is_unlimited());

        let mut permits = Vec::new();
        for _ in 0..64 {
            permits.push(gate.acquire().await.expect("always granted"));
        }
        assert_eq!(gate.available_slots(), usize::MAX);
        drop(permits);
    }

    #[tokio::test]
    async fn test_queue_timeout_rejects_when_saturated() {
        let gate = AdmissionGate::new(1).with_queue_timeout(Duration::from_millis(50));
        let _held = gate.acquire().await.expect("first slot");

        let err = gate.acquire().await.expect_err("gate is full");
        assert!(matches!(err, ProxyError::Unavailable));
    }

    #[tokio::test]
    async fn test_queue_timeout_grants_when_slot_frees() {
        let gate = Arc::new(AdmissionGate::new(1).with_queue_timeout(Duration::from_millis(200)));
        let held = gate.acquire().await.expect("first slot");

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            drop(held);
        });

        gate.acquire().await.expect("slot frees within the deadline");
        releaser.await.expect("releaser completes");
    }

    #[tokio::test]
    async fn test_slots_granted_in_arrival_order() {
        let gate = Arc::new(AdmissionGate::new(1));
        let order = Arc::new(Mutex::new(Vec::new()));
        let held = gate.acquire().await.expect("first slot");

        let mut waiters = Vec::new();
        for name in ["first", "second", "third"] {
            let gate = Arc::clone(&gate);
            let order = Arc::clone(&order);
            waiters.push(tokio::spawn(async move {
                let _permit = gate.acquire().await.expect("slot");
                order.lock().expect("order lock").push(name);
            }));
            // Let this waiter enqueue before spawning the next one.
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        drop(held);
        for waiter in waiters {
            waiter.await.expect("waiter completes");
        }

        let order = order.lock().expect("order lock");
        assert_eq!(*order, vec!["first", "second", "third"]);
    }
}
