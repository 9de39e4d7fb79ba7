//! Graph-wide ownership lock.
//!
//! The graph lock guards topology (connection sets, reference-count
//! teardown, deletion queue). Unlike a plain mutex its ownership is a
//! queryable property of the calling thread: operations that may be entered
//! both from a control-plane call and from a cascade already holding the lock
//! ask [`GraphLock::acquire`] / [`GraphLock::try_acquire`] whether *they* must
//! release it.
//!
//! # Architecture
//!
//! Ownership is an atomic owner token (one per thread, never reused).
//! Uncontended acquisition is a single compare-exchange, so the render thread
//! can try-acquire without ever touching a kernel primitive. Blocking waiters
//! park on a `parking_lot` condvar that the releasing thread notifies.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

const UNOWNED: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Returns a non-zero token unique to the calling thread.
pub(crate) fn thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

/// Owner-tracking graph lock.
///
/// `acquire`/`try_acquire` return `true` when the caller took the lock and
/// must call [`release`](Self::release), and `false` when the caller already
/// owned it.
pub struct GraphLock {
    owner: AtomicU64,
    gate: Mutex<()>,
    released: Condvar,
}

impl GraphLock {
    /// Create an unowned lock.
    pub fn new() -> Self {
        Self {
            owner: AtomicU64::new(UNOWNED),
            gate: Mutex::new(()),
            released: Condvar::new(),
        }
    }

    /// Attempt to take ownership without blocking.
    ///
    /// Returns `None` if another thread owns the lock.
    pub fn try_acquire(&self) -> Option<bool> {
        let me = thread_token();
        match self
            .owner
            .compare_exchange(UNOWNED, me, Ordering::Acquire, Ordering::Relaxed)
        {
            Ok(_) => Some(true),
            Err(current) if current == me => Some(false),
            Err(_) => None,
        }
    }

    /// Take ownership, blocking while another thread owns the lock.
    pub fn acquire(&self) -> bool {
        if let Some(must_release) = self.try_acquire() {
            return must_release;
        }
        let mut gate = self.gate.lock();
        loop {
            if let Some(must_release) = self.try_acquire() {
                return must_release;
            }
            self.released.wait(&mut gate);
        }
    }

    /// Give up ownership and wake blocked waiters.
    pub fn release(&self) {
        let released = self
            .owner
            .compare_exchange(thread_token(), UNOWNED, Ordering::Release, Ordering::Relaxed)
            .is_ok();
        debug_assert!(
            released,
            "graph lock released by a thread that does not own it"
        );
        if released {
            let _gate = self.gate.lock();
            self.released.notify_all();
        }
    }

    /// Whether the calling thread owns the lock.
    pub fn is_owner(&self) -> bool {
        self.owner.load(Ordering::Acquire) == thread_token()
    }
}

impl Default for GraphLock {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII ownership of a [`GraphLock`].
///
/// Releases the lock on drop only if this guard took it.
pub struct GraphGuard<'a> {
    lock: &'a GraphLock,
    must_release: bool,
}

impl<'a> GraphGuard<'a> {
    /// Block until the calling thread owns `lock`.
    pub fn acquire(lock: &'a GraphLock) -> Self {
        let must_release = lock.acquire();
        Self { lock, must_release }
    }

    /// Take `lock` if it is free or already owned by this thread.
    pub fn try_acquire(lock: &'a GraphLock) -> Option<Self> {
        lock.try_acquire()
            .map(|must_release| Self { lock, must_release })
    }

    /// Whether dropping this guard releases the lock.
    pub fn releases_on_drop(&self) -> bool {
        self.must_release
    }
}

impl Drop for GraphGuard<'_> {
    fn drop(&mut self) {
        if self.must_release {
            self.lock.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicBool;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn reentrant_acquire_reports_no_release() {
        let lock = GraphLock::new();
        assert!(lock.acquire());
        assert!(lock.is_owner());
        assert_eq!(lock.try_acquire(), Some(false));
        assert!(!lock.acquire());
        lock.release();
        assert!(!lock.is_owner());
    }

    #[test]
    fn try_acquire_fails_while_other_thread_owns() {
        let lock = Arc::new(GraphLock::new());
        let (held_tx, held_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let owner = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let _guard = GraphGuard::acquire(&lock);
                held_tx.send(()).unwrap();
                done_rx.recv().unwrap();
            })
        };

        held_rx.recv().unwrap();
        assert_eq!(lock.try_acquire(), None);
        assert!(!lock.is_owner());
        done_tx.send(()).unwrap();
        owner.join().unwrap();

        assert_eq!(lock.try_acquire(), Some(true));
        lock.release();
    }

    #[test]
    fn blocking_acquire_wakes_after_release() {
        let lock = Arc::new(GraphLock::new());
        let acquired = Arc::new(AtomicBool::new(false));
        assert!(lock.acquire());

        let waiter = {
            let lock = Arc::clone(&lock);
            let acquired = Arc::clone(&acquired);
            thread::spawn(move || {
                let guard = GraphGuard::acquire(&lock);
                assert!(guard.releases_on_drop());
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(20));
        assert!(!acquired.load(Ordering::SeqCst));
        lock.release();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }

    #[test]
    fn nested_guard_leaves_outer_ownership() {
        let lock = GraphLock::new();
        let outer = GraphGuard::acquire(&lock);
        {
            let inner = GraphGuard::try_acquire(&lock).unwrap();
            assert!(!inner.releases_on_drop());
        }
        assert!(lock.is_owner());
        drop(outer);
        assert!(!lock.is_owner());
    }
}
