//! Bounded renderer-instance pool
//!
//! Renderer processes are expensive, so a small pool amortizes launch cost
//! across many page fetches while capping memory. Instances are reused
//! round-robin: pages within one instance are independent tabs, so optimal
//! load balancing is not worth the bookkeeping.

use crate::renderer::{Renderer, RendererError, RendererInstance};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Bounded pool of reusable renderer instances
///
/// `acquire` hands out instances round-robin, launching new ones until the
/// pool reaches capacity. `release_all` closes everything; while that
/// teardown is in flight, `acquire` fails fast with
/// [`RendererError::PoolDraining`] rather than racing the shutdown.
pub struct RendererPool {
    launcher: Arc<dyn Renderer>,
    capacity: usize,
    instances: Mutex<Vec<Arc<dyn RendererInstance>>>,
    next: AtomicUsize,
    draining: AtomicBool,
}

impl RendererPool {
    /// Creates an empty pool that launches instances via `launcher`
    pub fn new(launcher: Arc<dyn Renderer>, capacity: usize) -> Self {
        Self {
            launcher,
            capacity: capacity.max(1),
            instances: Mutex::new(Vec::new()),
            next: AtomicUsize::new(0),
            draining: AtomicBool::new(false),
        }
    }

    /// Acquires a renderer instance
    ///
    /// Returns an existing pooled instance (round-robin) when the pool is
    /// at capacity, otherwise launches and registers a new one.
    ///
    /// # Errors
    ///
    /// [`RendererError::PoolDraining`] if called while `release_all` is in
    /// flight. Callers must not acquire during teardown; this is a hard
    /// precondition, not a retryable race.
    pub async fn acquire(&self) -> Result<Arc<dyn RendererInstance>, RendererError> {
        if self.draining.load(Ordering::SeqCst) {
            return Err(RendererError::PoolDraining);
        }

        let mut instances = self.instances.lock().await;

        // Teardown may have started while we waited on the lock
        if self.draining.load(Ordering::SeqCst) {
            return Err(RendererError::PoolDraining);
        }

        if instances.len() < self.capacity {
            tracing::debug!(
                "Launching renderer instance {}/{}",
                instances.len() + 1,
                self.capacity
            );
            let instance = self.launcher.launch().await?;
            instances.push(Arc::clone(&instance));
            return Ok(instance);
        }

        let index = self.next.fetch_add(1, Ordering::Relaxed) % instances.len();
        Ok(Arc::clone(&instances[index]))
    }

    /// Closes every pooled instance and clears the pool
    ///
    /// Idempotent; individual close failures are logged and do not stop the
    /// teardown of the remaining instances.
    pub async fn release_all(&self) {
        self.draining.store(true, Ordering::SeqCst);

        let drained = {
            let mut instances = self.instances.lock().await;
            std::mem::take(&mut *instances)
        };

        for instance in drained {
            if let Err(e) = instance.close().await {
                tracing::warn!("Failed to close renderer instance: {}", e);
            }
        }

        self.draining.store(false, Ordering::SeqCst);
    }

    /// Number of instances currently registered in the pool
    pub async fn live_instances(&self) -> usize {
        self.instances.lock().await.len()
    }
}
