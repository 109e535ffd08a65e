// Copyright (c) 2025-present, rowstore contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use super::{Shared, State};
use crate::stop_signal::StopSignal;
use rustc_hash::FxHashMap;

type WaitForGraph = FxHashMap<String, Vec<String>>;

/// Detector loop: once per period, build the wait-for graph under the
/// manager mutex and break any cycle by waking one victim with its
/// deadlock flag set.
pub(crate) fn run(shared: &Shared, stop: &StopSignal) {
    loop {
        std::thread::sleep(shared.detector_period);
        if stop.is_stopped() {
            return;
        }

        let state = shared.state.lock().expect("lock is poisoned");
        let graph = build_wait_for_graph(&state);
        if let Some(victim) = find_cycle(&graph) {
            if let Some(request) = state.pending_by_client.get(&victim) {
                log::warn!("wait-for cycle detected; waking {victim:?} as the victim");
                request.mark_deadlocked();
                request.condvar.notify_one();
            }
        }
    }
}

/// Edge from every pending client to every holder of the lock it
/// waits on. Upgrades wait only on the *other* holders, so self-edges
/// are skipped.
fn build_wait_for_graph(state: &State) -> WaitForGraph {
    let mut graph = WaitForGraph::default();
    for lock in state.locks.values() {
        for holder in &lock.holders {
            for queued in &lock.pending {
                // Upgrades wait only on the other holders, and a victim
                // that has not yet woken is no longer really waiting.
                if queued.client_id == holder.client_id || queued.deadlock_detected() {
                    continue;
                }
                graph
                    .entry(queued.client_id.clone())
                    .or_default()
                    .push(holder.client_id.clone());
            }
        }
    }
    graph
}

#[derive(Copy, Clone, Eq, PartialEq)]
enum Color {
    InProgress,
    Done,
}

/// Depth-first search returning some client on a cycle, if any.
///
/// Only a revisit of an in-progress node is a cycle; nodes finished in
/// an earlier traversal are skipped.
fn find_cycle(graph: &WaitForGraph) -> Option<String> {
    let mut colors: FxHashMap<&str, Color> = FxHashMap::default();
    for node in graph.keys() {
        if colors.contains_key(node.as_str()) {
            continue;
        }
        if let Some(victim) = visit(node, graph, &mut colors) {
            return Some(victim);
        }
    }
    None
}

fn visit<'a>(
    node: &'a str,
    graph: &'a WaitForGraph,
    colors: &mut FxHashMap<&'a str, Color>,
) -> Option<String> {
    colors.insert(node, Color::InProgress);
    for neighbour in graph.get(node).into_iter().flatten() {
        match colors.get(neighbour.as_str()) {
            Some(Color::InProgress) => return Some(neighbour.clone()),
            Some(Color::Done) => {}
            None => {
                if let Some(victim) = visit(neighbour, graph, colors) {
                    return Some(victim);
                }
            }
        }
    }
    colors.insert(node, Color::Done);
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn graph(edges: &[(&str, &str)]) -> WaitForGraph {
        let mut graph = WaitForGraph::default();
        for (from, to) in edges {
            graph
                .entry((*from).to_string())
                .or_default()
                .push((*to).to_string());
        }
        graph
    }

    #[test]
    fn no_cycle_in_a_chain() {
        let graph = graph(&[("a", "b"), ("b", "c")]);
        assert_eq!(None, find_cycle(&graph));
    }

    #[test]
    fn diamond_is_not_a_cycle() {
        // a → b → d, a → c → d: d is visited twice but never while
        // in progress.
        let graph = graph(&[("a", "b"), ("a", "c"), ("b", "d"), ("c", "d")]);
        assert_eq!(None, find_cycle(&graph));
    }

    #[test]
    fn three_cycle_is_found() {
        let graph = graph(&[("a", "b"), ("b", "c"), ("c", "a")]);
        let victim = find_cycle(&graph).expect("cycle should be found");
        assert!(["a", "b", "c"].contains(&victim.as_str()));
    }
}
