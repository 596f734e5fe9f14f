//! Integration test suite for the Corten script runtime
//!
//! These tests drive the components together across their boundaries:
//! compiler into VM, VM through the host bridge, and await chains through
//! the scheduler.

/// Re-export components for test convenience
pub mod components {
    pub use async_runtime;
    pub use bridge;
    pub use core_types;
    pub use interpreter;
    pub use parser;
    pub use script_cli;
}
