//! Memory Manager - tracing heap and root management
//!
//! This component provides:
//! - A non-moving mark/sweep heap of typed slots ([`Heap`])
//! - Generation-checked object handles ([`ObjRef`]) that never alias a
//!   reused slot
//! - The [`Trace`] contract objects implement to report outgoing references
//! - Persistent roots ([`RootTable`], [`Root`]) for values held by host code
//!
//! Swept objects are handed back to the caller, which runs any finalization
//! (for example releasing host-side ownership) outside the heap.
//!
//! # Example
//!
//! ```
//! use memory_manager::{Heap, ObjRef, Trace};
//!
//! struct Node(Option<ObjRef>);
//!
//! impl Trace for Node {
//!     fn trace(&self, out: &mut Vec<ObjRef>) {
//!         out.extend(self.0);
//!     }
//! }
//!
//! let mut heap = Heap::new(1024);
//! let leaf = heap.allocate(Node(None));
//! let root = heap.allocate(Node(Some(leaf)));
//! let orphan = heap.allocate(Node(None));
//!
//! let swept = heap.collect([root]);
//! assert_eq!(swept.len(), 1);
//! assert!(heap.contains(leaf));
//! assert!(!heap.contains(orphan));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod heap;
pub mod roots;

pub use heap::{GcStats, Heap, ObjRef, Trace};
pub use roots::{Root, RootTable};
