//! # Path Collection & Bottom-Up Aggregation
//!
//! Works on the resolved edge list a traversal produced, not on the store's
//! links, so both passes see exactly the same graph.
//!
//! - `collect_paths` enumerates every root-to-node path with the running
//!   quantity product, up to a record cap.
//! - `total_quantities` gives each node's total demand, the sum over its
//!   paths, from a memoised pass over incoming edges. It ignores the cap.
//! - `BottomUp` recomputes every aggregate from the leaves up, memoised.
//!   It must agree with the top-down aggregate; `verify_aggregates` checks.
//!
//! Re-entering a node already on the current path is fatal here: the edge
//! list came from an acyclic walk, so a cycle means corrupt input.

use crate::primitives::MAX_PATH_RECORDS;
use crate::{AttributeVector, BomError, BomRead, RevisionId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// One hop of a path: revision name and cumulative quantity at that hop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathStep(pub String, pub f64);

/// Every root-to-node path below one revision.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PathResult {
    pub paths: BTreeMap<RevisionId, Vec<Vec<PathStep>>>,
    /// Σ over all paths of the final cumulative quantity, exact even when
    /// `paths` is truncated.
    pub quantities: BTreeMap<RevisionId, f64>,
    /// Quantity of the link behind each resolved edge.
    #[serde(with = "edge_triples")]
    pub edge_quantities: BTreeMap<(RevisionId, RevisionId), f64>,
    /// Set when path enumeration stopped at `MAX_PATH_RECORDS`.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub truncated: bool,
}

/// JSON objects cannot key on pairs: encode as `[source, target, quantity]`.
mod edge_triples {
    use crate::RevisionId;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::collections::BTreeMap;

    pub fn serialize<S: Serializer>(
        map: &BTreeMap<(RevisionId, RevisionId), f64>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let triples: Vec<(RevisionId, RevisionId, f64)> =
            map.iter().map(|(&(s, t), &q)| (s, t, q)).collect();
        triples.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<(RevisionId, RevisionId), f64>, D::Error> {
        let triples: Vec<(RevisionId, RevisionId, f64)> = Vec::deserialize(deserializer)?;
        Ok(triples.into_iter().map(|(s, t, q)| ((s, t), q)).collect())
    }
}

// =============================================================================
// EDGE QUANTITIES
// =============================================================================

/// Look up the link quantity behind every resolved edge.
///
/// For edge (src, dst) this is the quantity of the link from `src` whose
/// target is `dst`'s component; 1.0 if no such link exists any more.
pub fn edge_quantities<S: BomRead + ?Sized>(
    store: &S,
    edges: &[(RevisionId, RevisionId)],
) -> Result<BTreeMap<(RevisionId, RevisionId), f64>, BomError> {
    let mut quantities = BTreeMap::new();
    for &(source, target) in edges {
        if quantities.contains_key(&(source, target)) {
            continue;
        }
        let component = store
            .get_revision(target)?
            .ok_or(BomError::RevisionNotFound(target))?
            .component;
        let quantity = store
            .get_links(source)?
            .into_iter()
            .find(|link| link.target == component)
            .map_or(crate::primitives::DEFAULT_LINK_QUANTITY, |link| {
                link.quantity.value()
            });
        quantities.insert((source, target), quantity);
    }
    Ok(quantities)
}

// =============================================================================
// PATH COLLECTION
// =============================================================================

struct Collector<'a> {
    children: BTreeMap<RevisionId, Vec<RevisionId>>,
    max_records: usize,
    quantities: &'a BTreeMap<(RevisionId, RevisionId), f64>,
    names: &'a BTreeMap<RevisionId, String>,
    on_path: BTreeSet<RevisionId>,
    path: Vec<(RevisionId, f64)>,
    paths: BTreeMap<RevisionId, Vec<Vec<PathStep>>>,
    records: usize,
    truncated: bool,
}

impl Collector<'_> {
    fn name(&self, id: RevisionId) -> String {
        self.names
            .get(&id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    fn visit(&mut self, node: RevisionId, cumulative: f64) -> Result<(), BomError> {
        if self.on_path.contains(&node) {
            let mut path: Vec<String> = self.path.iter().map(|(id, _)| self.name(*id)).collect();
            path.push(self.name(node));
            return Err(BomError::CycleDetected { path });
        }
        if self.records >= self.max_records {
            self.truncated = true;
            return Ok(());
        }

        self.on_path.insert(node);
        self.path.push((node, cumulative));
        let record = self
            .path
            .iter()
            .map(|(id, q)| PathStep(self.name(*id), *q))
            .collect();
        self.paths.entry(node).or_default().push(record);
        self.records += 1;

        let children = self.children.get(&node).cloned().unwrap_or_default();
        for child in children {
            let quantity = self
                .quantities
                .get(&(node, child))
                .copied()
                .unwrap_or(crate::primitives::DEFAULT_LINK_QUANTITY);
            self.visit(child, cumulative * quantity)?;
        }

        self.path.pop();
        self.on_path.remove(&node);
        Ok(())
    }
}

/// Enumerate every path from `start` over the resolved `edges`.
///
/// Parallel duplicates in `edges` collapse to one adjacency; the root's own
/// path is `[(root, 1.0)]`. Records stop at `MAX_PATH_RECORDS`.
pub fn collect_paths<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
    edges: &[(RevisionId, RevisionId)],
) -> Result<PathResult, BomError> {
    collect_paths_capped(store, start, edges, MAX_PATH_RECORDS)
}

/// `collect_paths` with an explicit record cap.
pub fn collect_paths_capped<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
    edges: &[(RevisionId, RevisionId)],
    max_records: usize,
) -> Result<PathResult, BomError> {
    let quantities = edge_quantities(store, edges)?;

    let mut nodes: BTreeSet<RevisionId> = BTreeSet::from([start]);
    let mut children: BTreeMap<RevisionId, Vec<RevisionId>> = BTreeMap::new();
    for &(source, target) in edges {
        nodes.insert(source);
        nodes.insert(target);
        let list = children.entry(source).or_default();
        if !list.contains(&target) {
            list.push(target);
        }
    }

    let mut names = BTreeMap::new();
    for &id in &nodes {
        names.insert(id, store.revision_name(id)?);
    }

    let (paths, truncated) = {
        let mut collector = Collector {
            children,
            max_records,
            quantities: &quantities,
            names: &names,
            on_path: BTreeSet::new(),
            path: Vec::new(),
            paths: nodes.iter().map(|&id| (id, Vec::new())).collect(),
            records: 0,
            truncated: false,
        };
        collector.visit(start, 1.0)?;
        (collector.paths, collector.truncated)
    };

    let totals = total_quantities(start, &nodes, &quantities)?;

    Ok(PathResult {
        paths,
        quantities: totals,
        edge_quantities: quantities,
        truncated,
    })
}

// =============================================================================
// TOTAL DEMAND
// =============================================================================

/// Total quantity of every node per one `start`.
///
/// `start` is 1.0; any other node is Σ parent total × edge quantity over its
/// incoming edges. Equal to the sum over paths without enumerating them.
pub fn total_quantities(
    start: RevisionId,
    nodes: &BTreeSet<RevisionId>,
    edge_quantities: &BTreeMap<(RevisionId, RevisionId), f64>,
) -> Result<BTreeMap<RevisionId, f64>, BomError> {
    let mut parents: BTreeMap<RevisionId, Vec<(RevisionId, f64)>> = BTreeMap::new();
    for (&(source, target), &quantity) in edge_quantities {
        parents.entry(target).or_default().push((source, quantity));
    }

    let mut demand = Demand {
        start,
        parents,
        memo: BTreeMap::new(),
        in_progress: BTreeSet::new(),
    };
    let mut totals = BTreeMap::new();
    for &node in nodes {
        totals.insert(node, demand.total(node)?);
    }
    Ok(totals)
}

struct Demand {
    start: RevisionId,
    parents: BTreeMap<RevisionId, Vec<(RevisionId, f64)>>,
    memo: BTreeMap<RevisionId, f64>,
    in_progress: BTreeSet<RevisionId>,
}

impl Demand {
    fn total(&mut self, node: RevisionId) -> Result<f64, BomError> {
        if node == self.start {
            return Ok(1.0);
        }
        if let Some(total) = self.memo.get(&node) {
            return Ok(*total);
        }
        if !self.in_progress.insert(node) {
            return Err(BomError::CycleDetected {
                path: vec![node.to_string(), node.to_string()],
            });
        }

        let mut total = 0.0;
        let parents = self.parents.get(&node).cloned().unwrap_or_default();
        for (parent, quantity) in parents {
            total += self.total(parent)? * quantity;
        }

        self.in_progress.remove(&node);
        self.memo.insert(node, total);
        Ok(total)
    }
}

// =============================================================================
// BOTTOM-UP AGGREGATION
// =============================================================================

/// Memoised bottom-up aggregator over a resolved edge list.
pub struct BottomUp {
    own: BTreeMap<RevisionId, AttributeVector>,
    children: BTreeMap<RevisionId, Vec<(RevisionId, f64)>>,
    memo: BTreeMap<RevisionId, AttributeVector>,
    in_progress: BTreeSet<RevisionId>,
}

impl BottomUp {
    /// Build from own vectors and the edge quantities of `collect_paths`.
    #[must_use]
    pub fn new(
        own: BTreeMap<RevisionId, AttributeVector>,
        edge_quantities: &BTreeMap<(RevisionId, RevisionId), f64>,
    ) -> Self {
        let mut children: BTreeMap<RevisionId, Vec<(RevisionId, f64)>> = BTreeMap::new();
        for (&(source, target), &quantity) in edge_quantities {
            children.entry(source).or_default().push((target, quantity));
        }
        Self {
            own,
            children,
            memo: BTreeMap::new(),
            in_progress: BTreeSet::new(),
        }
    }

    /// Own vector + Σ edge quantity × child total. Unknown nodes count as zero.
    pub fn calculate(&mut self, node: RevisionId) -> Result<AttributeVector, BomError> {
        if let Some(total) = self.memo.get(&node) {
            return Ok(*total);
        }
        if !self.in_progress.insert(node) {
            return Err(BomError::CycleDetected {
                path: vec![node.to_string(), node.to_string()],
            });
        }

        let mut total = self.own.get(&node).copied().unwrap_or_default();
        let children = self.children.get(&node).cloned().unwrap_or_default();
        for (child, quantity) in children {
            let child_total = self.calculate(child)?;
            total.add_scaled(&child_total, quantity);
        }

        self.in_progress.remove(&node);
        self.memo.insert(node, total);
        Ok(total)
    }

    /// Totals for every node with an own vector.
    pub fn calculate_all(&mut self) -> Result<BTreeMap<RevisionId, AttributeVector>, BomError> {
        let nodes: Vec<RevisionId> = self.own.keys().copied().collect();
        let mut totals = BTreeMap::new();
        for node in nodes {
            totals.insert(node, self.calculate(node)?);
        }
        Ok(totals)
    }
}

/// Bottom-up totals for every node of a resolved edge list.
pub fn calculate_bottom_up<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
    edge_quantities: &BTreeMap<(RevisionId, RevisionId), f64>,
) -> Result<BTreeMap<RevisionId, AttributeVector>, BomError> {
    let mut nodes = BTreeSet::from([start]);
    for &(source, target) in edge_quantities.keys() {
        nodes.insert(source);
        nodes.insert(target);
    }
    let mut own = BTreeMap::new();
    for id in nodes {
        let revision = store
            .get_revision(id)?
            .ok_or(BomError::RevisionNotFound(id))?;
        own.insert(id, revision.attributes);
    }
    BottomUp::new(own, edge_quantities).calculate_all()
}

// =============================================================================
// CROSS-CHECK
// =============================================================================

/// A node whose top-down and bottom-up aggregates disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateMismatch {
    pub revision: RevisionId,
    pub top_down: AttributeVector,
    pub bottom_up: AttributeVector,
    pub max_abs_diff: f64,
}

/// Compare both aggregates for every node present in both maps.
#[must_use]
pub fn verify_aggregates(
    top_down: &BTreeMap<RevisionId, AttributeVector>,
    bottom_up: &BTreeMap<RevisionId, AttributeVector>,
    tolerance: f64,
) -> Vec<AggregateMismatch> {
    top_down
        .iter()
        .filter_map(|(id, td)| {
            let bu = bottom_up.get(id)?;
            if td.approx_eq(bu, tolerance) {
                None
            } else {
                Some(AggregateMismatch {
                    revision: *id,
                    top_down: *td,
                    bottom_up: *bu,
                    max_abs_diff: td.max_abs_diff(bu),
                })
            }
        })
        .collect()
}

// =============================================================================
// TESTS
// =============================================================================
