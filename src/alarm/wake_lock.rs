use std::sync::Arc;

use tracing::{debug, info};

use super::channels::WakeLock;

/// Holds the wake-lock while something needs the display awake. Acquisition is only attempted
/// when the need appears, so a platform without wake-lock support is asked once per need.
pub struct WakeLockGuard {
    lock: Arc<dyn WakeLock>,
    wanted: bool,
    held: bool,
}

impl WakeLockGuard {
    pub fn new(lock: Arc<dyn WakeLock>) -> Self {
        Self {
            lock,
            wanted: false,
            held: false,
        }
    }

    pub fn is_held(&self) -> bool {
        self.held
    }

    pub fn sync(&mut self, needed: bool) {
        if needed == self.wanted {
            return;
        }
        self.wanted = needed;

        if needed {
            match self.lock.acquire() {
                Ok(()) => {
                    info!("Wake lock acquired");
                    self.held = true;
                }
                Err(e) => debug!("Wake lock unavailable {e:?}"),
            }
        } else if self.held {
            if let Err(e) = self.lock.release() {
                debug!("Failed to release wake lock {e:?}");
            }
            info!("Wake lock released");
            self.held = false;
        }
    }

    /// Asks again on the next [WakeLockGuard::sync]. The platform drops the lock when the
    /// application is hidden, so this is called when it becomes visible.
    pub fn invalidate(&mut self) {
        self.wanted = false;
        self.held = false;
    }

    pub fn release(&mut self) {
        self.sync(false);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::anyhow;

    use crate::alarm::channels::MockWakeLock;

    use super::WakeLockGuard;

    #[test]
    fn acquires_once_and_releases_once() {
        let mut lock = MockWakeLock::new();
        lock.expect_acquire().times(1).returning(|| Ok(()));
        lock.expect_release().times(1).returning(|| Ok(()));

        let mut guard = WakeLockGuard::new(Arc::new(lock));
        guard.sync(true);
        guard.sync(true);
        assert!(guard.is_held());
        guard.sync(false);
        guard.sync(false);
        assert!(!guard.is_held());
    }

    #[test]
    fn unsupported_lock_is_not_retried_while_needed() {
        let mut lock = MockWakeLock::new();
        lock.expect_acquire()
            .times(2)
            .returning(|| Err(anyhow!("not supported")));
        lock.expect_release().never();

        let mut guard = WakeLockGuard::new(Arc::new(lock));
        guard.sync(true);
        guard.sync(true);
        assert!(!guard.is_held());
        guard.release();
        guard.sync(true);
    }

    #[test]
    fn invalidated_lock_is_requested_again() {
        let mut lock = MockWakeLock::new();
        lock.expect_acquire().times(2).returning(|| Ok(()));

        let mut guard = WakeLockGuard::new(Arc::new(lock));
        guard.sync(true);
        guard.invalidate();
        guard.sync(true);
        assert!(guard.is_held());
    }
}
