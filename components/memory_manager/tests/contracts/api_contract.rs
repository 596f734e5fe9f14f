//! Contract tests verifying the memory_manager API surface used by the
//! interpreter: allocation, handle validity, collection and persistent roots.

use memory_manager::{GcStats, Heap, ObjRef, RootTable, Trace};

struct Pair {
    left: Option<ObjRef>,
    right: Option<ObjRef>,
}

impl Trace for Pair {
    fn trace(&self, out: &mut Vec<ObjRef>) {
        out.extend(self.left);
        out.extend(self.right);
    }
}

fn leaf() -> Pair {
    Pair {
        left: None,
        right: None,
    }
}

/// Test Heap contract: new(threshold) -> empty heap
#[test]
fn contract_heap_new_is_empty() {
    let heap: Heap<Pair> = Heap::new(16);
    assert_eq!(heap.live_count(), 0);
    assert_eq!(heap.stats(), GcStats::default());
}

/// Test Heap contract: collect() keeps the transitive closure of the roots
#[test]
fn contract_collect_keeps_reachable_graph() {
    let mut heap = Heap::new(16);
    let a = heap.allocate(leaf());
    let b = heap.allocate(leaf());
    let root = heap.allocate(Pair {
        left: Some(a),
        right: Some(b),
    });
    let garbage = heap.allocate(Pair {
        left: Some(a),
        right: None,
    });

    let swept = heap.collect([root]);
    assert_eq!(swept.len(), 1);
    assert_eq!(swept[0].0, garbage);
    assert!(heap.contains(a) && heap.contains(b) && heap.contains(root));
}

/// Test Heap contract: swept objects are returned to the caller for finalization
#[test]
fn contract_collect_returns_swept_values() {
    let mut heap = Heap::new(16);
    let inner = heap.allocate(leaf());
    heap.allocate(Pair {
        left: Some(inner),
        right: None,
    });
    let swept = heap.collect(std::iter::empty());
    let linked = swept.iter().filter(|(_, pair)| pair.left == Some(inner)).count();
    assert_eq!(linked, 1);
}

/// Test Heap contract: stale roots are ignored
#[test]
fn contract_stale_root_is_ignored() {
    let mut heap = Heap::new(16);
    let stale = heap.allocate(leaf());
    heap.collect(std::iter::empty());
    let fresh = heap.allocate(leaf());
    heap.collect([stale]);
    assert!(!heap.contains(fresh));
}

/// Test RootTable contract: guards root until dropped
#[test]
fn contract_root_table_guards() {
    let mut heap = Heap::new(16);
    let table = RootTable::new();
    let handle = heap.allocate(leaf());
    {
        let _guard = table.root(handle);
        heap.collect(table.handles());
        assert!(heap.contains(handle));
    }
    heap.collect(table.handles());
    assert!(!heap.contains(handle));
}

/// Test Heap contract: iter() visits live objects only
#[test]
fn contract_iter_visits_live_objects() {
    let mut heap = Heap::new(16);
    let kept = heap.allocate(leaf());
    heap.allocate(leaf());
    heap.collect([kept]);
    let handles: Vec<ObjRef> = heap.iter().map(|(handle, _)| handle).collect();
    assert_eq!(handles, vec![kept]);
}
