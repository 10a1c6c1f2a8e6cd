use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use log::warn;

use crate::common::types::TxnId;
use crate::transaction::concurrency::lock_manager::{
    DetectorShutdown, LockRequestQueue, LockTables,
};
use crate::transaction::concurrency::transaction::{Transaction, TransactionState};

/// Start the background detection thread; it wakes every `interval` (or
/// immediately on shutdown) and runs one pass.
pub(crate) fn spawn(
    tables: Arc<LockTables>,
    shutdown: Arc<DetectorShutdown>,
    interval: Duration,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("deadlock-detector".into())
        .spawn(move || loop {
            {
                let mut flag = shutdown.flag.lock();
                if *flag {
                    return;
                }
                let _ = shutdown.cond.wait_for(&mut flag, interval);
                if *flag {
                    return;
                }
            }
            detect(&tables);
        })
        .expect("spawn deadlock detector")
}

/// One detection pass: rebuild the wait-for graph from every queue, then
/// break cycles by aborting the highest-id transaction on each. The
/// detector only flips states and broadcasts; aborted waiters remove
/// their own queue entries when they wake.
pub(crate) fn detect(tables: &LockTables) {
    let _graph_latch = tables.waits_for_latch.lock();

    let mut queues: Vec<Arc<LockRequestQueue>> = Vec::new();
    queues.extend(tables.table_locks.lock().values().cloned());
    queues.extend(tables.row_locks.lock().values().cloned());

    // An edge waiter -> holder exists when their modes are incompatible
    let mut edges: WaitsForGraph = BTreeMap::new();
    let mut txns: HashMap<TxnId, Arc<Transaction>> = HashMap::new();
    for queue in &queues {
        let state = queue.state.lock();
        for waiter in state.requests.iter().filter(|r| !r.granted) {
            for holder in state.requests.iter().filter(|r| r.granted) {
                if waiter.txn.id() != holder.txn.id()
                    && !waiter.mode.compatible_with(holder.mode)
                {
                    edges
                        .entry(waiter.txn.id())
                        .or_default()
                        .insert(holder.txn.id());
                    txns.insert(waiter.txn.id(), waiter.txn.clone());
                    txns.insert(holder.txn.id(), holder.txn.clone());
                }
            }
        }
    }

    while let Some(victim) = find_cycle(&edges) {
        warn!("deadlock detected, aborting transaction {}", victim);
        if let Some(txn) = txns.get(&victim) {
            txn.set_state(TransactionState::Aborted);
        }
        edges.remove(&victim);
        for targets in edges.values_mut() {
            targets.remove(&victim);
        }

        for queue in &queues {
            let state = queue.state.lock();
            if state.requests.iter().any(|r| r.txn.id() == victim) {
                queue.cond.notify_all();
            }
        }
    }
}

/// Ordered adjacency so DFS starts from the lowest transaction id and
/// explores neighbors in ascending order, which makes victim selection
/// deterministic.
pub(crate) type WaitsForGraph = BTreeMap<TxnId, BTreeSet<TxnId>>;

/// Find one cycle and return its highest-id transaction
pub(crate) fn find_cycle(edges: &WaitsForGraph) -> Option<TxnId> {
    let mut visited = HashSet::new();
    for &start in edges.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut path = Vec::new();
        let mut on_path = HashSet::new();
        if let Some(victim) = dfs(start, edges, &mut visited, &mut path, &mut on_path) {
            return Some(victim);
        }
    }
    None
}

fn dfs(
    current: TxnId,
    edges: &WaitsForGraph,
    visited: &mut HashSet<TxnId>,
    path: &mut Vec<TxnId>,
    on_path: &mut HashSet<TxnId>,
) -> Option<TxnId> {
    visited.insert(current);
    path.push(current);
    on_path.insert(current);

    if let Some(neighbors) = edges.get(&current) {
        for &next in neighbors {
            if on_path.contains(&next) {
                // Cycle: everything on the path from `next` onward
                let pos = path
                    .iter()
                    .position(|&t| t == next)
                    .expect("on_path mirrors path");
                return path[pos..].iter().copied().max();
            }
            if !visited.contains(&next) {
                if let Some(victim) = dfs(next, edges, visited, path, on_path) {
                    return Some(victim);
                }
            }
        }
    }

    path.pop();
    on_path.remove(&current);
    None
}
