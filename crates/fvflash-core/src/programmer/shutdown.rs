//! Shutdown registry
//!
//! Transports that leave remote state behind (a bridge waiting for more
//! commands, output drivers enabled) register a teardown hook here when they
//! are opened. The host runs the registry exactly once when it is done with
//! the programmer, most recently registered hook first.

use crate::error::Result;
use alloc::boxed::Box;
use alloc::vec::Vec;

/// A teardown action run against the programmer it was registered for
pub type ShutdownHook<M> = Box<dyn FnOnce(&mut M) -> Result<()> + Send>;

/// Ordered collection of shutdown hooks for one programmer of type `M`
pub struct ShutdownRegistry<M: ?Sized> {
    hooks: Vec<(&'static str, ShutdownHook<M>)>,
}

impl<M: ?Sized> ShutdownRegistry<M> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Register a hook under a name used for diagnostics
    pub fn register<F>(&mut self, name: &'static str, hook: F)
    where
        F: FnOnce(&mut M) -> Result<()> + Send + 'static,
    {
        log::debug!("Registered shutdown hook '{}'", name);
        self.hooks.push((name, Box::new(hook)));
    }

    /// Number of hooks still pending
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are pending
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Run and drain every hook, last registered first
    ///
    /// Failures are logged and do not stop the remaining hooks. Returns the
    /// number of hooks that failed.
    pub fn run(&mut self, master: &mut M) -> usize {
        let mut failures = 0;
        while let Some((name, hook)) = self.hooks.pop() {
            log::debug!("Running shutdown hook '{}'", name);
            if let Err(e) = hook(master) {
                log::warn!("Shutdown hook '{}' failed: {}", name, e);
                failures += 1;
            }
        }
        failures
    }
}

impl<M: ?Sized> Default for ShutdownRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}
