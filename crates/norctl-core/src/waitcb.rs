//! Wait-callback registry
//!
//! Subscribers run on every iteration of the engine's busy-poll loop, so
//! collaborators like a watchdog feeder get serviced during long erases
//! without the engine knowing about them. The pool is a fixed-size array:
//! the engine never allocates or frees slots, only iterates them.

use crate::error::{Error, Result};
use heapless::Vec;

/// A callback invoked while the engine polls the busy bit
///
/// Runs with interrupts enabled (outside the critical region). Must not
/// itself touch the flash.
pub type WaitCallback = fn();

/// Maximum number of registered callbacks
pub const MAX_WAIT_CALLBACKS: usize = 4;

/// Bounded publish/subscribe list for busy-poll callbacks
#[derive(Debug, Default)]
pub struct WaitRegistry {
    slots: Vec<WaitCallback, MAX_WAIT_CALLBACKS>,
}

impl WaitRegistry {
    /// Create an empty registry
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register a callback
    ///
    /// Registering the same function twice is a no-op. Returns
    /// [`Error::WaitCallbackPoolFull`] when all slots are taken.
    pub fn register(&mut self, cb: WaitCallback) -> Result<()> {
        if self.slots.iter().any(|&s| core::ptr::fn_addr_eq(s, cb)) {
            return Ok(());
        }
        self.slots.push(cb).map_err(|_| Error::WaitCallbackPoolFull)
    }

    /// Remove a callback; returns whether it was registered
    pub fn unregister(&mut self, cb: WaitCallback) -> bool {
        match self.slots.iter().position(|&s| core::ptr::fn_addr_eq(s, cb)) {
            Some(idx) => {
                self.slots.swap_remove(idx);
                true
            }
            None => false,
        }
    }

    /// Invoke every registered callback once
    pub fn invoke_all(&self) {
        for cb in &self.slots {
            cb();
        }
    }

    /// Number of registered callbacks
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no callbacks are registered
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    static HITS: AtomicUsize = AtomicUsize::new(0);

    fn bump() {
        HITS.fetch_add(1, Ordering::Relaxed);
    }

    fn noop_a() {}
    fn noop_b() {}
    fn noop_c() {}
    fn noop_d() {}

    #[test]
    fn register_invoke_unregister() {
        let mut reg = WaitRegistry::new();
        reg.register(bump).unwrap();
        // Duplicate registration keeps a single slot
        reg.register(bump).unwrap();
        assert_eq!(reg.len(), 1);

        let before = HITS.load(Ordering::Relaxed);
        reg.invoke_all();
        assert_eq!(HITS.load(Ordering::Relaxed), before + 1);

        assert!(reg.unregister(bump));
        assert!(!reg.unregister(bump));
        assert!(reg.is_empty());
    }

    #[test]
    fn pool_exhaustion() {
        let mut reg = WaitRegistry::new();
        reg.register(noop_a).unwrap();
        reg.register(noop_b).unwrap();
        reg.register(noop_c).unwrap();
        reg.register(noop_d).unwrap();
        assert_eq!(reg.register(bump), Err(Error::WaitCallbackPoolFull));
        // Freeing a slot makes room again
        assert!(reg.unregister(noop_b));
        reg.register(bump).unwrap();
    }
}
