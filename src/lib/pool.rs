//! Bounded pool of exclusively leased reader bundles.
//!
//! The pool opens bundles lazily, up to a fixed capacity, and never blocks: when every bundle
//! it may hold is leased, [`ReaderLeasePool::acquire_exclusive`] fails with
//! [`DataSourceError::PoolExhausted`] and the caller decides what to do. Bundles live until
//! the pool itself is dropped.
//!
//! Pool bookkeeping sits behind one short-held lock that covers only list membership.
//! Opening a bundle happens outside the lock after a capacity slot has been reserved, so
//! concurrent acquirers can never exceed the capacity.
//!
//! Every bundle after the first is compared against the first one when it is opened. A
//! bundle whose per-file headers or index presence diverge is discarded with
//! [`DataSourceError::HeaderMismatch`], and its slot is freed.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, error};
use parking_lot::Mutex;

use crate::bundle::{BundleMetadata, ReaderBundle};
use crate::codec::{AlignmentCodec, ValidationStringency};
use crate::errors::{DataSourceError, Result};
use crate::source::SourceFileId;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// A cheaply cloneable handle to a bounded pool of reader bundles.
#[derive(Clone)]
pub struct ReaderLeasePool {
    inner: Arc<PoolShared>,
}

struct PoolShared {
    id: u64,
    capacity: usize,
    files: Vec<SourceFileId>,
    codec: Arc<dyn AlignmentCodec>,
    stringency: ValidationStringency,
    state: Mutex<PoolState>,
}

#[derive(Default)]
struct PoolState {
    /// Metadata of every bundle ever created, in creation order.
    created: Vec<Arc<BundleMetadata>>,
    /// Bundles not currently leased.
    available: Vec<ReaderBundle>,
    /// Bundles being opened outside the lock.
    pending: usize,
    next_serial: usize,
}

impl ReaderLeasePool {
    /// Creates an empty pool that will hold at most `capacity` bundles over `files`.
    #[must_use]
    pub fn new(
        files: Vec<SourceFileId>,
        capacity: usize,
        codec: Arc<dyn AlignmentCodec>,
        stringency: ValidationStringency,
    ) -> Self {
        let shared = PoolShared {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            capacity,
            files,
            codec,
            stringency,
            state: Mutex::new(PoolState::default()),
        };
        Self { inner: Arc::new(shared) }
    }

    /// Identifier distinguishing this pool's bundles from other pools'.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Maximum number of bundles.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Files every bundle covers, in registration order.
    #[must_use]
    pub fn files(&self) -> &[SourceFileId] {
        &self.inner.files
    }

    /// Number of bundles created so far.
    #[must_use]
    pub fn created_count(&self) -> usize {
        self.inner.state.lock().created.len()
    }

    /// Number of created bundles that are currently leased.
    #[must_use]
    pub fn leased_count(&self) -> usize {
        let state = self.inner.state.lock();
        state.created.len() - state.available.len()
    }

    /// Leases a bundle exclusively, creating one if none is free and capacity allows.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::PoolExhausted`] when every bundle is leased and the pool is
    /// at capacity, [`DataSourceError::HeaderMismatch`] when a newly opened bundle diverges
    /// from the first bundle, or any error raised while opening the files.
    pub fn acquire_exclusive(&self) -> Result<ReaderBundle> {
        let shared = &self.inner;
        let serial = {
            let mut state = shared.state.lock();
            if let Some(bundle) = state.available.pop() {
                debug!("Leased reader bundle {} of pool {}", bundle.serial(), shared.id);
                return Ok(bundle);
            }
            if state.created.len() + state.pending >= shared.capacity {
                return Err(DataSourceError::PoolExhausted { capacity: shared.capacity });
            }
            state.pending += 1;
            state.next_serial += 1;
            state.next_serial - 1
        };

        let opened = ReaderBundle::open(
            shared.id,
            serial,
            &shared.files,
            shared.codec.as_ref(),
            shared.stringency,
        );

        let mut state = shared.state.lock();
        state.pending -= 1;
        let bundle = opened?;
        if let Some(canonical) = state.created.first() {
            bundle.metadata().check_consistent_with(canonical)?;
        }
        state.created.push(Arc::clone(bundle.metadata()));
        debug!("Leased new reader bundle {serial} of pool {}", shared.id);
        Ok(bundle)
    }

    /// Returns a leased bundle to the pool.
    ///
    /// # Errors
    ///
    /// Returns [`DataSourceError::ForeignBundle`] if the bundle was created by another pool.
    pub fn release(&self, bundle: ReaderBundle) -> Result<()> {
        if bundle.pool_id() != self.inner.id {
            return Err(DataSourceError::ForeignBundle {
                bundle_pool: bundle.pool_id(),
                pool: self.inner.id,
            });
        }
        debug!("Released reader bundle {} of pool {}", bundle.serial(), self.inner.id);
        self.inner.state.lock().available.push(bundle);
        Ok(())
    }

    /// Leases a bundle wrapped in a guard that releases it when dropped.
    ///
    /// # Errors
    ///
    /// Same as [`Self::acquire_exclusive`].
    pub fn lease(&self) -> Result<BundleLease> {
        let bundle = self.acquire_exclusive()?;
        Ok(BundleLease { pool: self.clone(), bundle: Some(bundle) })
    }

    /// Metadata of some bundle, without leasing one.
    ///
    /// Only facts fixed at bundle creation are exposed, so reading them races benignly with
    /// concurrent leasing. A bundle is created (and immediately returned) if none exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if no bundle exists and one cannot be created.
    pub fn peek(&self) -> Result<Arc<BundleMetadata>> {
        if let Some(metadata) = self.inner.state.lock().created.first() {
            return Ok(Arc::clone(metadata));
        }
        let lease = self.lease()?;
        let metadata = Arc::clone(lease.metadata());
        lease.release()?;
        Ok(metadata)
    }
}

impl std::fmt::Debug for ReaderLeasePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderLeasePool")
            .field("id", &self.inner.id)
            .field("capacity", &self.inner.capacity)
            .field("files", &self.inner.files)
            .finish_non_exhaustive()
    }
}

/// An exclusively leased bundle that returns itself to its pool when dropped.
///
/// Prefer [`BundleLease::release`] where the caller can act on a release failure; a failure
/// during drop can only be logged.
pub struct BundleLease {
    pool: ReaderLeasePool,
    // Some until released
    bundle: Option<ReaderBundle>,
}

impl BundleLease {
    /// Returns the bundle to its pool.
    ///
    /// # Errors
    ///
    /// Returns an error if the pool refuses the bundle.
    pub fn release(mut self) -> Result<()> {
        match self.bundle.take() {
            Some(bundle) => self.pool.release(bundle),
            None => Ok(()),
        }
    }
}

impl Deref for BundleLease {
    type Target = ReaderBundle;

    fn deref(&self) -> &ReaderBundle {
        self.bundle.as_ref().expect("lease holds its bundle until released")
    }
}

impl DerefMut for BundleLease {
    fn deref_mut(&mut self) -> &mut ReaderBundle {
        self.bundle.as_mut().expect("lease holds its bundle until released")
    }
}

impl Drop for BundleLease {
    fn drop(&mut self) {
        if let Some(bundle) = self.bundle.take() {
            if let Err(e) = self.pool.release(bundle) {
                error!("Failed to return reader bundle to its pool: {e}");
            }
        }
    }
}
