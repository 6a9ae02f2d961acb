//! Rotating-credential cell shared by all fetch workers.
//!
//! One slot, one use counter, one supplier. The outer mutex guards the
//! counter and the initialized check; a separate init mutex serializes the
//! first-time supplier call so concurrent first users collapse into a single
//! acquisition (double-checked initialization). Rotation at the use limit
//! runs under the outer mutex: the caller that trips the threshold pays the
//! supplier cost while the rest queue behind the lock.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::Mutex;

use crate::error::AcquireError;

/// Produces a fresh credential value. Implementations may be slow (DNS
/// lookups, browser automation) and may fail; the rotator owns the retry
/// story, the supplier just attempts once.
#[async_trait]
pub trait CredentialSupplier<T>: Send + Sync {
    async fn supply(&self) -> Result<T, AcquireError>;
}

/// Adapts an async closure into a [`CredentialSupplier`], mirroring how the
/// host wires acquisition callbacks in.
pub struct FnSupplier<F>(pub F);

#[async_trait]
impl<T, F, Fut> CredentialSupplier<T> for FnSupplier<F>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync,
    Fut: std::future::Future<Output = Result<T, AcquireError>> + Send,
{
    async fn supply(&self) -> Result<T, AcquireError> {
        (self.0)().await
    }
}

struct Slot<T> {
    value: Option<T>,
    uses: u32,
}

pub struct CredentialRotator<T> {
    slot: Mutex<Slot<T>>,
    init: Mutex<()>,
    limit: u32,
    supplier: Box<dyn CredentialSupplier<T>>,
    supplier_timeout: Option<Duration>,
    supplier_calls: AtomicU64,
}

impl<T: Clone + Send> CredentialRotator<T> {
    /// `limit` is the number of `acquire` calls served by one value before
    /// the supplier runs again. Must be positive.
    pub fn new(limit: u32, supplier: impl CredentialSupplier<T> + 'static) -> Self {
        assert!(limit > 0, "rotation limit must be positive");
        Self {
            slot: Mutex::new(Slot {
                value: None,
                uses: 0,
            }),
            init: Mutex::new(()),
            limit,
            supplier: Box::new(supplier),
            supplier_timeout: None,
            supplier_calls: AtomicU64::new(0),
        }
    }

    /// Caps every supplier invocation. A supplier that hangs past the cap
    /// surfaces [`AcquireError::Timeout`] instead of stalling the queue of
    /// callers behind the outer mutex forever.
    pub fn with_supplier_timeout(mut self, timeout: Duration) -> Self {
        self.supplier_timeout = Some(timeout);
        self
    }

    /// Returns the shared value, counting one use and rotating at the limit.
    ///
    /// Threshold check happens before the increment: with limit L the
    /// supplier reruns on calls L+1, 2L+1, … A supplier failure propagates
    /// with the slot untouched, so the next caller retries the acquisition
    /// instead of reusing a value past its window.
    pub async fn acquire(&self) -> Result<T, AcquireError> {
        {
            let mut slot = self.slot.lock().await;
            if slot.value.is_some() {
                if slot.uses >= self.limit {
                    debug!("rotation limit {} reached, re-acquiring", self.limit);
                    let fresh = self.run_supplier().await?;
                    slot.value = Some(fresh);
                    slot.uses = 0;
                }
                slot.uses += 1;
                return Ok(slot.value.as_ref().expect("slot populated").clone());
            }
        }

        // First use: serialize initialization, then re-check. A caller that
        // lost the race observes the winner's value and skips the supplier.
        let _init = self.init.lock().await;
        {
            let mut slot = self.slot.lock().await;
            if slot.value.is_some() {
                slot.uses += 1;
                return Ok(slot.value.as_ref().expect("slot populated").clone());
            }
        }
        let fresh = self.run_supplier().await?;
        let mut slot = self.slot.lock().await;
        slot.value = Some(fresh.clone());
        slot.uses = 1;
        Ok(fresh)
    }

    /// Returns the current value without consuming a use, initializing the
    /// slot if this is the very first access. Used by the auth supplier to
    /// stay proxy-consistent without perturbing proxy rotation counts.
    pub async fn current(&self) -> Result<T, AcquireError> {
        {
            let slot = self.slot.lock().await;
            if let Some(value) = slot.value.as_ref() {
                return Ok(value.clone());
            }
        }

        let _init = self.init.lock().await;
        {
            let slot = self.slot.lock().await;
            if let Some(value) = slot.value.as_ref() {
                return Ok(value.clone());
            }
        }
        let fresh = self.run_supplier().await?;
        let mut slot = self.slot.lock().await;
        slot.value = Some(fresh.clone());
        Ok(fresh)
    }

    /// Total supplier invocations, successful or not.
    pub fn supplier_invocations(&self) -> u64 {
        self.supplier_calls.load(Ordering::Relaxed)
    }

    async fn run_supplier(&self) -> Result<T, AcquireError> {
        self.supplier_calls.fetch_add(1, Ordering::Relaxed);
        match self.supplier_timeout {
            Some(cap) => tokio::time::timeout(cap, self.supplier.supply())
                .await
                .map_err(|_| AcquireError::Timeout(cap))?,
            None => self.supplier.supply().await,
        }
    }
}
