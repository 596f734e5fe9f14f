//! Persistent roots for handles held outside the heap.
//!
//! Host code that keeps a handle across calls registers it in a
//! [`RootTable`] and holds the returned [`Root`] guard. The handle stays
//! reachable until the guard is dropped.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ObjRef;

#[derive(Default)]
struct RootSlots {
    entries: Vec<Option<ObjRef>>,
    free: Vec<usize>,
}

/// Shared table of persistent roots.
///
/// Cloning the table shares it; all guards created from any clone are
/// visible through [`RootTable::handles`].
#[derive(Clone, Default)]
pub struct RootTable {
    slots: Rc<RefCell<RootSlots>>,
}

impl RootTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Roots `handle` until the returned guard is dropped.
    pub fn root(&self, handle: ObjRef) -> Root {
        let mut slots = self.slots.borrow_mut();
        let slot = match slots.free.pop() {
            Some(slot) => {
                slots.entries[slot] = Some(handle);
                slot
            }
            None => {
                slots.entries.push(Some(handle));
                slots.entries.len() - 1
            }
        };
        Root {
            table: self.clone(),
            slot,
            handle,
        }
    }

    /// Snapshot of every rooted handle.
    pub fn handles(&self) -> Vec<ObjRef> {
        self.slots.borrow().entries.iter().flatten().copied().collect()
    }

    /// Number of live roots.
    pub fn len(&self) -> usize {
        self.slots.borrow().entries.iter().flatten().count()
    }

    /// Returns true if no roots are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn release(&self, slot: usize) {
        let mut slots = self.slots.borrow_mut();
        if let Some(entry) = slots.entries.get_mut(slot) {
            *entry = None;
            slots.free.push(slot);
        }
    }
}

/// RAII guard keeping one handle rooted.
pub struct Root {
    table: RootTable,
    slot: usize,
    handle: ObjRef,
}

impl Root {
    /// The rooted handle.
    pub fn handle(&self) -> ObjRef {
        self.handle
    }
}

impl Clone for Root {
    fn clone(&self) -> Self {
        self.table.root(self.handle)
    }
}

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root").field("handle", &self.handle).finish()
    }
}

impl Drop for Root {
    fn drop(&mut self) {
        self.table.release(self.slot);
    }
}
