//! fvflash-core - Host-side abstractions for SPI flash programmers
//!
//! This crate is the boundary between a flash programming front end and the
//! transports that actually move SPI transactions to a chip. It provides:
//!
//! - [`spi`]: the SPI command model and standard JEDEC opcodes
//! - [`programmer`]: the [`SpiMaster`](programmer::SpiMaster) trait, the
//!   capability descriptor every transport advertises, and the shutdown
//!   registry transports hook their teardown into
//! - [`protocol`]: generic bulk operations (multi-command batches, chunked
//!   reads, page writes, AAI writes) built purely from single commands
//!
//! # Features
//!
//! - `std` - Implement `std::error::Error` for the core error type
//!
//! # Example
//!
//! ```ignore
//! use fvflash_core::{programmer::SpiMaster, protocol::spi25};
//!
//! fn identify<M: SpiMaster + ?Sized>(master: &mut M) -> fvflash_core::Result<()> {
//!     let (mfr, dev) = spi25::read_jedec_id(master)?;
//!     println!("JEDEC ID: {:02X} {:04X}", mfr, dev);
//!     Ok(())
//! }
//! ```

#![no_std]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

extern crate alloc;

#[cfg(feature = "std")]
extern crate std;

pub mod error;
pub mod programmer;
pub mod protocol;
pub mod spi;

pub use error::{Error, Result};
