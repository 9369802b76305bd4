//! # Analysis
//!
//! Traversal, path collection and bottom-up aggregation in one call, plus
//! the cross-check between the two aggregates and the display labels a
//! reporting collaborator needs to render the result.

use crate::paths::{
    AggregateMismatch, PathResult, calculate_bottom_up, collect_paths, verify_aggregates,
};
use crate::primitives::AGGREGATE_TOLERANCE;
use crate::traversal::{TraversalResult, traverse};
use crate::walk::TraversalOptions;
use crate::{AttributeVector, BomError, BomRead, ComponentId, RevisionId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Display data of one visited revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionLabel {
    pub component: ComponentId,
    /// `"{component}_rev{number:02}"`
    pub name: String,
    pub component_name: String,
    pub unit: String,
}

/// Full analysis of the graph below one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub traversal: TraversalResult,
    pub paths: PathResult,
    pub bottom_up: BTreeMap<RevisionId, AttributeVector>,
    pub labels: BTreeMap<RevisionId, RevisionLabel>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mismatches: Vec<AggregateMismatch>,
}

impl Analysis {
    /// Whether both aggregation passes agree everywhere.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Run every read pass over the graph below `start`.
pub fn analyze<S: BomRead + ?Sized>(
    store: &S,
    start: RevisionId,
    options: &TraversalOptions,
) -> Result<Analysis, BomError> {
    let traversal = traverse(store, start, options)?;
    let paths = collect_paths(store, start, &traversal.edges)?;
    let bottom_up = calculate_bottom_up(store, start, &paths.edge_quantities)?;
    let mismatches = verify_aggregates(&traversal.attributes, &bottom_up, AGGREGATE_TOLERANCE);
    let labels = labels(store, &traversal)?;

    Ok(Analysis {
        traversal,
        paths,
        bottom_up,
        labels,
        mismatches,
    })
}

fn labels<S: BomRead + ?Sized>(
    store: &S,
    traversal: &TraversalResult,
) -> Result<BTreeMap<RevisionId, RevisionLabel>, BomError> {
    let mut labels = BTreeMap::new();
    for &id in &traversal.visited {
        let revision = store
            .get_revision(id)?
            .ok_or(BomError::RevisionNotFound(id))?;
        let component = store
            .get_component(revision.component)?
            .ok_or(BomError::ComponentNotFound(revision.component))?;
        labels.insert(
            id,
            RevisionLabel {
                component: component.id,
                name: store.revision_name(id)?,
                component_name: component.name,
                unit: component.unit,
            },
        );
    }
    Ok(labels)
}
