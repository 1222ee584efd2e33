//! CLI command implementations
//!
//! Every command works on a `&mut dyn SpiMaster`, so the same code drives
//! the Fernvale bridge and the in-memory dummy.

mod list;
mod probe;
mod raw;
mod read;

pub use list::list_programmers;
pub use probe::run_probe;
pub use raw::run_raw;
pub use read::run_read;
