//! # Tab-Separated BOM Ingestion
//!
//! Builds components, attributes and links from pasted spreadsheet rows.
//!
//! Each non-blank line has at least 11 tab-separated columns, padded to 17:
//!
//! | # | Column | # | Column |
//! |---|---|---|---|
//! | 0 | component name | 9 | cost |
//! | 1 | description | 10 | duration |
//! | 2 | unit | 11 | other |
//! | 3 | classification | 12 | target classification |
//! | 4 | component kind | 13 | target component name |
//! | 5 | mass | 14 | quantity |
//! | 6 | length | 15 | link kind |
//! | 7 | area | 16 | link description |
//! | 8 | volume | | |
//!
//! A line with a name defines a component (and optionally its first link).
//! A line with an empty name and a target adds a link to the component
//! defined above it.
//!
//! Validation runs over every line first; any error rejects the whole
//! import with one message per line. Then the result is written as one
//! batch, checked for cycles before it is applied.

use crate::cycle::ensure_acyclic_batch;
use crate::primitives::{
    MAX_CODE_LENGTH, MAX_DESCRIPTION_LENGTH, MAX_IMPORT_LINES, MAX_NAME_LENGTH,
};
use crate::store::name_key;
use crate::{
    AttributeField, AttributeVector, BomError, BomStore, ClassificationCode, Component,
    ComponentId, ComponentKind, Link, LinkId, LinkKind, Mutation, Quantity, Revision, RevisionId,
    Timestamp,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columns a line must have before padding.
const MIN_COLUMNS: usize = 11;
/// Columns after padding.
const COLUMNS: usize = 17;
/// Attribute values closer than this count as unchanged.
const ATTRIBUTE_EPSILON: f64 = 1e-4;

// =============================================================================
// PARSED LINES
// =============================================================================

/// A component defined by one line, with the links that follow it.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentRow {
    pub line: usize,
    pub name: String,
    pub description: Option<String>,
    pub unit: String,
    pub classification: ClassificationCode,
    pub kind: ComponentKind,
    pub attributes: AttributeVector,
    pub links: Vec<LinkRow>,
}

/// One link of a component row.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkRow {
    pub line: usize,
    /// Falls back to the source component's classification.
    pub target_classification: Option<ClassificationCode>,
    pub target: String,
    pub quantity: Quantity,
    pub kind: LinkKind,
    pub description: Option<String>,
}

/// What an import wrote.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestSummary {
    /// Components defined by a row that did not exist yet.
    pub created: Vec<ComponentId>,
    /// Link targets that did not exist and were created empty.
    pub placeholders: Vec<ComponentId>,
    /// Existing components that got a new revision.
    pub revised: Vec<ComponentId>,
    /// Existing components whose latest revision already matched.
    pub unchanged: Vec<ComponentId>,
    /// The revision each defined component now resolves to, in row order.
    pub revisions: Vec<RevisionId>,
    pub links: usize,
}

fn optional(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn check_length(line: usize, field: &str, value: &str, max: usize) -> Result<(), String> {
    if value.len() > max {
        return Err(format!("Line {line}: {field} exceeds {max} bytes."));
    }
    Ok(())
}

fn parse_link(line: usize, fields: &[&str]) -> Result<LinkRow, String> {
    let quantity = fields[14]
        .parse::<f64>()
        .ok()
        .and_then(|q| Quantity::new(q).ok())
        .ok_or_else(|| format!("Line {line}: Link requires a positive quantity."))?;
    let kind = if fields[15].is_empty() {
        LinkKind::Other
    } else {
        fields[15]
            .parse()
            .map_err(|_| format!("Line {line}: Invalid link kind '{}'.", fields[15]))?
    };
    check_length(line, "target name", fields[13], MAX_NAME_LENGTH)?;
    check_length(line, "target classification", fields[12], MAX_CODE_LENGTH)?;
    check_length(line, "link description", fields[16], MAX_DESCRIPTION_LENGTH)?;

    Ok(LinkRow {
        line,
        target_classification: optional(fields[12]).map(ClassificationCode),
        target: fields[13].to_string(),
        quantity,
        kind,
        description: optional(fields[16]),
    })
}

fn parse_component(line: usize, fields: &[&str]) -> Result<ComponentRow, String> {
    if fields[2].is_empty() || fields[3].is_empty() {
        return Err(format!(
            "Line {line}: Name, unit and classification are required."
        ));
    }
    check_length(line, "name", fields[0], MAX_NAME_LENGTH)?;
    check_length(line, "description", fields[1], MAX_DESCRIPTION_LENGTH)?;
    check_length(line, "unit", fields[2], MAX_CODE_LENGTH)?;
    check_length(line, "classification", fields[3], MAX_CODE_LENGTH)?;

    let kind = if fields[4].is_empty() {
        ComponentKind::Package
    } else {
        fields[4]
            .parse()
            .map_err(|_| format!("Line {line}: Invalid component kind '{}'.", fields[4]))?
    };

    let mut attributes = AttributeVector::ZERO;
    for (offset, field) in AttributeField::ALL.iter().enumerate() {
        let raw = fields[5 + offset];
        if raw.is_empty() {
            continue;
        }
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() && value >= 0.0 => attributes.set(*field, value),
            _ => {
                return Err(format!(
                    "Line {line}: Invalid {} '{raw}'.",
                    field.name()
                ));
            }
        }
    }

    let links = if fields[13].is_empty() {
        Vec::new()
    } else {
        vec![parse_link(line, fields)?]
    };

    Ok(ComponentRow {
        line,
        name: fields[0].to_string(),
        description: optional(fields[1]),
        unit: fields[2].to_string(),
        classification: ClassificationCode::new(fields[3]),
        kind,
        attributes,
        links,
    })
}

/// Parse and validate every line.
///
/// Returns `ImportRejected` listing every bad line, or the rows in order.
pub fn parse_rows(text: &str) -> Result<Vec<ComponentRow>, BomError> {
    let mut rows: Vec<ComponentRow> = Vec::new();
    let mut errors = Vec::new();
    let mut seen: BTreeMap<String, usize> = BTreeMap::new();

    for (index, raw) in text.lines().enumerate() {
        let line = index + 1;
        if raw.trim().is_empty() {
            continue;
        }
        if line > MAX_IMPORT_LINES {
            errors.push(format!("Import exceeds {MAX_IMPORT_LINES} lines."));
            break;
        }

        let mut fields: Vec<&str> = raw
            .trim_end_matches('\r')
            .split('\t')
            .map(str::trim)
            .collect();
        if fields.len() < MIN_COLUMNS {
            errors.push(format!(
                "Line {line}: Expected at least {MIN_COLUMNS} tab-separated columns, found {}.",
                fields.len()
            ));
            continue;
        }
        fields.resize(COLUMNS.max(fields.len()), "");

        if !fields[0].is_empty() {
            match parse_component(line, &fields) {
                Ok(row) => {
                    let key = name_key(&row.name, &row.classification);
                    if let Some(first) = seen.insert(key, line) {
                        errors.push(format!(
                            "Line {line}: Component '{}' already defined on line {first}.",
                            row.name
                        ));
                    }
                    rows.push(row);
                }
                Err(error) => errors.push(error),
            }
        } else if !fields[13].is_empty() {
            match (parse_link(line, &fields), rows.last_mut()) {
                (Ok(link), Some(current)) => current.links.push(link),
                (Ok(_), None) => {
                    errors.push(format!("Line {line}: Link-only line before component."));
                }
                (Err(error), _) => errors.push(error),
            }
        } else {
            errors.push(format!(
                "Line {line}: Invalid line; must define a component or a link."
            ));
        }
    }

    if rows.is_empty() && errors.is_empty() {
        errors.push("No valid components found.".to_string());
    }
    if errors.is_empty() {
        Ok(rows)
    } else {
        Err(BomError::ImportRejected { errors })
    }
}

// =============================================================================
// INGESTION
// =============================================================================

/// Apply parsed rows to a store as one batch.
///
/// - A row naming a new component creates it with the row's attributes.
/// - A row naming an existing component issues a new revision only when
///   the attributes or links differ from its latest revision.
/// - A link target missing from both the rows and the store is created as
///   an empty package in the target classification.
pub fn ingest_rows<S: BomStore + ?Sized>(
    store: &mut S,
    rows: &[ComponentRow],
    at: Timestamp,
) -> Result<IngestSummary, BomError> {
    let mut summary = IngestSummary::default();
    let mut batch = Vec::new();
    let mut known: BTreeMap<String, ComponentId> = BTreeMap::new();

    // Every defined component gets an id first, so links may point forward.
    let mut sources = Vec::with_capacity(rows.len());
    for row in rows {
        let (id, existing) = match store.find_component(&row.name, &row.classification)? {
            Some(component) => (component.id, true),
            None => {
                let id = ComponentId(store.allocate_id());
                batch.push(Mutation::PutComponent(Component {
                    id,
                    name: row.name.clone(),
                    classification: row.classification.clone(),
                    kind: row.kind,
                    unit: row.unit.clone(),
                    description: row.description.clone(),
                }));
                summary.created.push(id);
                (id, false)
            }
        };
        known.insert(name_key(&row.name, &row.classification), id);
        sources.push((id, existing));
    }

    let mut errors = Vec::new();
    let mut targets: Vec<Vec<(ComponentId, ClassificationCode)>> = Vec::with_capacity(rows.len());
    for (row, &(source, _)) in rows.iter().zip(&sources) {
        let mut resolved: Vec<(ComponentId, ClassificationCode)> =
            Vec::with_capacity(row.links.len());
        for link in &row.links {
            let classification = link
                .target_classification
                .clone()
                .unwrap_or_else(|| row.classification.clone());
            let key = name_key(&link.target, &classification);
            let target = match known.get(&key) {
                Some(&id) => id,
                None => {
                    let id = match store.find_component(&link.target, &classification)? {
                        Some(component) => component.id,
                        None => {
                            let id = ComponentId(store.allocate_id());
                            batch.push(Mutation::PutComponent(Component {
                                id,
                                name: link.target.clone(),
                                classification: classification.clone(),
                                kind: ComponentKind::Package,
                                unit: row.unit.clone(),
                                description: None,
                            }));
                            batch.push(Mutation::PutRevision(Revision {
                                id: RevisionId(store.allocate_id()),
                                component: id,
                                attributes: AttributeVector::ZERO,
                                issued_at: at,
                                locked_at: None,
                            }));
                            summary.placeholders.push(id);
                            id
                        }
                    };
                    known.insert(key, id);
                    id
                }
            };

            if target == source {
                errors.push(format!(
                    "Line {}: '{}' cannot link to itself.",
                    link.line, row.name
                ));
            } else if resolved.iter().any(|(t, _)| *t == target) {
                errors.push(format!(
                    "Line {}: '{}' already links '{}'.",
                    link.line, row.name, link.target
                ));
            }
            resolved.push((target, classification));
        }
        targets.push(resolved);
    }
    if !errors.is_empty() {
        return Err(BomError::ImportRejected { errors });
    }

    for ((row, &(component, existing)), row_targets) in rows.iter().zip(&sources).zip(&targets) {
        let latest = if existing {
            store.get_latest_revision(component)?
        } else {
            None
        };
        if let Some(latest) = &latest {
            let current = store.get_links(latest.id)?;
            if !attributes_differ(&latest.attributes, &row.attributes)
                && !links_differ(&current, &row.links, row_targets)
            {
                summary.unchanged.push(component);
                summary.revisions.push(latest.id);
                continue;
            }
            summary.revised.push(component);
        }

        let revision = RevisionId(store.allocate_id());
        batch.push(Mutation::PutRevision(Revision {
            id: revision,
            component,
            attributes: row.attributes,
            issued_at: latest.as_ref().map_or(at, |l| at.max(l.issued_at)),
            locked_at: None,
        }));
        summary.revisions.push(revision);

        for (link, (target, classification)) in row.links.iter().zip(row_targets) {
            batch.push(Mutation::PutLink(Link {
                id: LinkId(store.allocate_id()),
                source: revision,
                target: *target,
                quantity: link.quantity,
                classification: classification.clone(),
                kind: link.kind,
                description: link.description.clone(),
                issued_at: at,
            }));
            summary.links += 1;
        }
    }

    ensure_acyclic_batch(&*store, &batch)?;
    store.apply(batch)?;
    Ok(summary)
}

/// Parse `text` and ingest it in one batch.
pub fn ingest_tsv<S: BomStore + ?Sized>(
    store: &mut S,
    text: &str,
    at: Timestamp,
) -> Result<IngestSummary, BomError> {
    let rows = parse_rows(text)?;
    ingest_rows(store, &rows, at)
}

fn attributes_differ(current: &AttributeVector, imported: &AttributeVector) -> bool {
    current.max_abs_diff(imported) >= ATTRIBUTE_EPSILON
}

fn links_differ(
    current: &[Link],
    imported: &[LinkRow],
    targets: &[(ComponentId, ClassificationCode)],
) -> bool {
    if current.len() != imported.len() {
        return true;
    }
    imported.iter().zip(targets).any(|(row, (target, _))| {
        !current.iter().any(|link| {
            link.target == *target
                && (link.quantity.value() - row.quantity.value()).abs() < ATTRIBUTE_EPSILON
                && link.kind == row.kind
                && link.description == row.description
        })
    })
}

// =============================================================================
// TESTS
// =============================================================================
