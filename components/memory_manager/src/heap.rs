//! Slot heap with mark/sweep collection.
//!
//! Objects live in a vector of slots and never move. A handle records the
//! slot index together with the slot's generation at allocation time; freeing
//! a slot bumps its generation, so a stale handle can be detected instead of
//! silently reading the slot's next occupant.

use std::fmt;

/// Handle to an object stored in a [`Heap`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    index: u32,
    generation: u32,
}

impl ObjRef {
    /// Slot index of this handle.
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this handle was created.
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjRef({}@{})", self.index, self.generation)
    }
}

/// Implemented by heap objects to report the handles they reference.
pub trait Trace {
    /// Pushes every directly referenced handle onto `out`.
    fn trace(&self, out: &mut Vec<ObjRef>);
}

/// Collection statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Number of completed collection cycles
    pub collections: usize,
    /// Total objects reclaimed across all cycles
    pub objects_freed: usize,
    /// Objects reclaimed by the most recent cycle
    pub last_freed: usize,
    /// Objects currently allocated
    pub live_objects: usize,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// A non-moving mark/sweep heap of `T` objects.
pub struct Heap<T> {
    slots: Vec<Slot<T>>,
    free: Vec<u32>,
    marks: Vec<bool>,
    allocated_since_collect: usize,
    threshold: usize,
    stats: GcStats,
}

impl<T: Trace> Heap<T> {
    /// Creates an empty heap that asks for a collection after `threshold`
    /// allocations.
    pub fn new(threshold: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            marks: Vec::new(),
            allocated_since_collect: 0,
            threshold: threshold.max(1),
            stats: GcStats::default(),
        }
    }

    /// Stores `value` and returns its handle.
    pub fn allocate(&mut self, value: T) -> ObjRef {
        self.allocated_since_collect += 1;
        self.stats.live_objects += 1;

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return ObjRef {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        self.marks.push(false);
        ObjRef {
            index,
            generation: 0,
        }
    }

    /// Returns true if `handle` refers to a live object.
    pub fn contains(&self, handle: ObjRef) -> bool {
        self.get(handle).is_some()
    }

    /// Borrows the object behind `handle`, or `None` if it was freed.
    pub fn get(&self, handle: ObjRef) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    /// Mutably borrows the object behind `handle`.
    pub fn get_mut(&mut self, handle: ObjRef) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    /// Returns true once enough allocations happened since the last cycle.
    pub fn should_collect(&self) -> bool {
        self.allocated_since_collect >= self.threshold
    }

    /// Changes the allocation threshold.
    pub fn set_threshold(&mut self, threshold: usize) {
        self.threshold = threshold.max(1);
    }

    /// Number of live objects.
    pub fn live_count(&self) -> usize {
        self.stats.live_objects
    }

    /// Returns collection statistics.
    pub fn stats(&self) -> GcStats {
        self.stats
    }

    /// Marks everything reachable from `roots` and sweeps the rest.
    ///
    /// The swept objects are returned, paired with the handle they had, so
    /// the caller can finalize them. Stale root handles are ignored.
    pub fn collect<I>(&mut self, roots: I) -> Vec<(ObjRef, T)>
    where
        I: IntoIterator<Item = ObjRef>,
    {
        for mark in self.marks.iter_mut() {
            *mark = false;
        }

        let mut pending: Vec<ObjRef> = roots.into_iter().collect();
        let mut children = Vec::new();
        while let Some(handle) = pending.pop() {
            let index = handle.index as usize;
            let Some(slot) = self.slots.get(index) else {
                continue;
            };
            if slot.generation != handle.generation || self.marks[index] {
                continue;
            }
            let Some(value) = slot.value.as_ref() else {
                continue;
            };
            self.marks[index] = true;
            value.trace(&mut children);
            pending.append(&mut children);
        }

        let mut swept = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if self.marks[index] || slot.value.is_none() {
                continue;
            }
            if let Some(value) = slot.value.take() {
                swept.push((
                    ObjRef {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                ));
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }

        self.allocated_since_collect = 0;
        self.stats.collections += 1;
        self.stats.last_freed = swept.len();
        self.stats.objects_freed += swept.len();
        self.stats.live_objects -= swept.len();
        tracing::debug!(
            freed = swept.len(),
            live = self.stats.live_objects,
            "gc cycle finished"
        );
        swept
    }

    /// Iterates over all live objects with their handles.
    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value.as_ref().map(|value| {
                (
                    ObjRef {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    value,
                )
            })
        })
    }
}
