//! Programmer traits and abstractions
//!
//! This module defines the trait every SPI transport implements, the
//! capability descriptor it advertises to the host, and the registry the
//! host uses to run transport teardown at shutdown.

mod shutdown;
mod traits;

pub use shutdown::{ShutdownHook, ShutdownRegistry};
pub use traits::*;
