//! Stop-the-world and per-resource mutual exclusion.
//!
//! The "lock everything" gate guards structural garbage collection against
//! foreground writes to the same resources. It is not taken on the hot
//! request path by the tree itself; callers that need per-resource
//! serialization use [`Locker::lock_resource`].

use iotdm_store::ResourceId;
use parking_lot::lock_api::{ArcMutexGuard, ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::{Mutex, RawMutex, RawRwLock, RwLock};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Proof that a lock is held. The lock is released when the token is
/// handed back to its locker or dropped.
///
/// Tokens are bound to the thread that acquired them.
#[must_use = "dropping a lock token releases the lock"]
pub struct LockToken {
    held: Held,
}

enum Held {
    Exclusive {
        everything: bool,
        _gate: ArcRwLockWriteGuard<RawRwLock, ()>,
    },
    // Fields drop in order: the stripe before the shared gate.
    Resource {
        _stripe: ArcMutexGuard<RawMutex, ()>,
        _gate: ArcRwLockReadGuard<RawRwLock, ()>,
    },
}

impl LockToken {
    /// Returns true if this token holds the global gate exclusively.
    #[must_use]
    pub fn is_everything(&self) -> bool {
        matches!(self.held, Held::Exclusive { everything: true, .. })
    }
}

impl fmt::Debug for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockToken")
            .field("everything", &self.is_everything())
            .finish_non_exhaustive()
    }
}

/// Mutual-exclusion coordinator.
///
/// Tokens release their lock on drop; the `unlock_*` methods exist so call
/// sites read symmetrically.
pub trait Locker: Send + Sync {
    /// Blocks until no other lock is held, then holds the global gate.
    fn lock_everything(&self) -> LockToken;

    /// Releases the global gate.
    fn unlock_everything(&self, token: LockToken);

    /// Locks a single resource against other structural writers and
    /// against `lock_everything`.
    fn lock_resource(&self, resource_id: &ResourceId) -> LockToken;

    /// Releases a resource lock.
    fn unlock_resource(&self, token: LockToken);
}

/// Holds the global gate until dropped.
pub struct ExclusiveSection<'a> {
    locker: &'a dyn Locker,
    token: Option<LockToken>,
}

impl<'a> ExclusiveSection<'a> {
    /// Acquires the global gate of `locker`.
    pub fn enter(locker: &'a dyn Locker) -> Self {
        let token = locker.lock_everything();
        Self {
            locker,
            token: Some(token),
        }
    }
}

impl Drop for ExclusiveSection<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.locker.unlock_everything(token);
        }
    }
}

/// Every lock is the single global gate.
#[derive(Debug, Default)]
pub struct GlobalLocker {
    gate: Arc<RwLock<()>>,
}

impl GlobalLocker {
    /// Creates an unlocked locker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn exclusive(&self, everything: bool) -> LockToken {
        LockToken {
            held: Held::Exclusive {
                everything,
                _gate: self.gate.write_arc(),
            },
        }
    }
}

impl Locker for GlobalLocker {
    fn lock_everything(&self) -> LockToken {
        self.exclusive(true)
    }

    fn unlock_everything(&self, token: LockToken) {
        drop(token);
    }

    fn lock_resource(&self, _resource_id: &ResourceId) -> LockToken {
        self.exclusive(false)
    }

    fn unlock_resource(&self, token: LockToken) {
        drop(token);
    }
}

/// Global read-write gate plus striped per-resource locks.
///
/// Resource locks take the gate shared and one stripe exclusively, so
/// unrelated resources proceed in parallel while `lock_everything` waits
/// for all of them. The gate is fair: a waiting `lock_everything` holds
/// back new resource locks.
#[derive(Debug)]
pub struct StripedLocker {
    gate: Arc<RwLock<()>>,
    stripes: Vec<Arc<Mutex<()>>>,
}

impl StripedLocker {
    /// Default stripe count.
    pub const DEFAULT_STRIPES: usize = 64;

    /// Creates a locker with `stripes` stripes (minimum 1).
    #[must_use]
    pub fn new(stripes: usize) -> Self {
        Self {
            gate: Arc::default(),
            stripes: (0..stripes.max(1)).map(|_| Arc::default()).collect(),
        }
    }

    fn stripe_of(&self, resource_id: &ResourceId) -> usize {
        let mut hasher = DefaultHasher::new();
        resource_id.hash(&mut hasher);
        (hasher.finish() % self.stripes.len() as u64) as usize
    }
}

impl Default for StripedLocker {
    fn default() -> Self {
        Self::new(Self::DEFAULT_STRIPES)
    }
}

impl Locker for StripedLocker {
    fn lock_everything(&self) -> LockToken {
        LockToken {
            held: Held::Exclusive {
                everything: true,
                _gate: self.gate.write_arc(),
            },
        }
    }

    fn unlock_everything(&self, token: LockToken) {
        drop(token);
    }

    fn lock_resource(&self, resource_id: &ResourceId) -> LockToken {
        let gate = self.gate.read_arc();
        let stripe = self.stripes[self.stripe_of(resource_id)].lock_arc();
        LockToken {
            held: Held::Resource {
                _stripe: stripe,
                _gate: gate,
            },
        }
    }

    fn unlock_resource(&self, token: LockToken) {
        drop(token);
    }
}
