// Relationship graph reconciliation
//
// Records are nodes of an undirected graph whose edges come from
// `related_entries`. Reconciliation repairs the edges (drops dangling and
// self references, symmetrizes) and stores the graph in closed form: every
// record lists every other member of its connected component.

use crate::types::Collection;
use std::collections::{HashMap, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    /// Connected components among live records (singletons included)
    pub components: usize,
    /// Live records that belong to a component of two or more
    pub linked_records: usize,
    /// Records whose relationship list was rewritten
    pub changed_records: usize,
}

/// Rewrite every record's `related_entries` to its component membership
///
/// Tombstones are not nodes: links to them vanish and their own list is
/// cleared. Idempotent; a second pass changes nothing.
pub fn reconcile_relationships(collection: &mut Collection) -> ReconcileStats {
    // Node index in collection order keeps component ordering deterministic
    let nodes: Vec<Uuid> = collection.live().map(|r| r.id).collect();
    let mut index: HashMap<Uuid, usize> = HashMap::with_capacity(nodes.len());
    for (i, id) in nodes.iter().enumerate() {
        index.entry(*id).or_insert(i);
    }

    // Step 1: symmetric adjacency over valid edges only
    let mut adjacency: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for record in collection.live() {
        let from = index[&record.id];
        for target in &record.related_entries {
            let Some(&to) = index.get(target) else {
                continue;
            };
            if to == from {
                continue;
            }
            adjacency[from].push(to);
            adjacency[to].push(from);
        }
    }

    // Step 2: connected components by BFS
    let mut component_of: Vec<Option<usize>> = vec![None; nodes.len()];
    let mut components: Vec<Vec<usize>> = Vec::new();
    for start in 0..nodes.len() {
        if component_of[start].is_some() {
            continue;
        }
        let component_index = components.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        component_of[start] = Some(component_index);

        while let Some(node) = queue.pop_front() {
            members.push(node);
            for &next in &adjacency[node] {
                if component_of[next].is_none() {
                    component_of[next] = Some(component_index);
                    queue.push_back(next);
                }
            }
        }
        components.push(members);
    }

    // Step 3: closed-form lists from the id -> component map
    let mut stats = ReconcileStats {
        components: components.len(),
        ..Default::default()
    };
    for record in collection.records_mut() {
        let related = match index.get(&record.id) {
            Some(&node) if record.is_live() => {
                let component = component_of[node].map_or(&[][..], |c| &components[c][..]);
                let mut related: Vec<Uuid> = component
                    .iter()
                    .map(|&member| nodes[member])
                    .filter(|id| *id != record.id)
                    .collect();
                related.sort();
                related.dedup();
                if !related.is_empty() {
                    stats.linked_records += 1;
                }
                related
            }
            _ => Vec::new(),
        };

        if record.related_entries != related {
            record.related_entries = related;
            stats.changed_records += 1;
        }
    }

    debug!(
        "Reconciled relationships: {} components, {} linked, {} changed",
        stats.components, stats.linked_records, stats.changed_records
    );
    stats
}
