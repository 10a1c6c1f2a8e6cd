use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::types::Rid;
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::executor::{BoxedExecutor, Executor};

use super::sort::{compare_tuples, OrderDirection};

/// Heap entry ordered by the sort spec, tie-broken by arrival order so the
/// result matches a stable sort.
struct HeapEntry {
    tuple: Tuple,
    rid: Rid,
    seq: usize,
    order_by: Arc<Vec<(usize, OrderDirection)>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_tuples(&self.tuple, &other.tuple, &self.order_by)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Sort + limit in one operator: a bounded max-heap of size N keeps the
/// current N best rows, giving O(n log N) instead of a full sort.
pub struct TopNExecutor {
    child: BoxedExecutor,
    order_by: Arc<Vec<(usize, OrderDirection)>>,
    n: usize,
    output: Option<std::vec::IntoIter<(Tuple, Rid)>>,
}

impl TopNExecutor {
    pub fn new(child: BoxedExecutor, order_by: Vec<(usize, OrderDirection)>, n: usize) -> Self {
        Self {
            child,
            order_by: Arc::new(order_by),
            n,
            output: None,
        }
    }
}

impl Executor for TopNExecutor {
    fn init(&mut self) -> QueryResult<()> {
        self.child.init()?;
        self.output = None;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.output.is_none() {
            let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.n + 1);
            let mut seq = 0usize;
            while let Some((tuple, rid)) = self.child.next()? {
                heap.push(HeapEntry {
                    tuple,
                    rid,
                    seq,
                    order_by: self.order_by.clone(),
                });
                seq += 1;
                if heap.len() > self.n {
                    // The max element is the worst under the sort order
                    heap.pop();
                }
            }
            let rows: Vec<(Tuple, Rid)> = heap
                .into_sorted_vec()
                .into_iter()
                .map(|entry| (entry.tuple, entry.rid))
                .collect();
            self.output = Some(rows.into_iter());
        }
        Ok(self.output.as_mut().expect("output built").next())
    }
}
