//! Client Library Shims
//!
//! Capability-table building blocks and the compiled-in client libraries.

mod dhan;
mod signature;
mod table;

pub use signature::{BoundArgs, Parameter, Signature};
pub use table::{EntryTable, HandleTable, LibraryTable, ModuleTable};

use std::sync::Arc;

use crate::application::ports::LibraryRegistry;

/// Registry of every compiled-in client library.
///
/// `ws_url` is the market feed endpoint used by the `dhanhq` shim.
#[must_use]
pub fn builtin_registry(ws_url: impl Into<String>) -> LibraryRegistry {
    LibraryRegistry::new().with(Arc::new(dhan::library(ws_url)))
}
