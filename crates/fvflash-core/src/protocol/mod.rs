//! Flash protocol implementations
//!
//! This module contains the generic SPI flash command sequences the host
//! provides to every transport.

pub mod spi25;
