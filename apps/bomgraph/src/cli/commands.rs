//! # CLI Command Implementations
//!
//! Every command opens the store, runs one session operation, saves (file
//! backend only) and prints either text or, with `--json-mode`, pretty JSON.

use super::{Backend, ComponentCommand, LinkCommand, RevisionCommand, SetAttributes};
use crate::api::{self, AppState};
use crate::config::AppConfig;
use bomgraph_core::{
    AttributeField, AttributeVector, BomError, CanonicalBom, ClassificationCode,
    ComponentId, LinkId, LinkUpdate, NewComponent, NewLink, RevisionId, Session, humanize,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum snapshot size accepted by `import` (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), BomError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| BomError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(BomError::InvalidInput(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `..` and symlinks and require an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, BomError> {
    let canonical = path.canonicalize().map_err(|e| {
        BomError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(BomError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Require an existing parent directory; returns canonical parent + file name.
fn validate_output_path(path: &Path) -> Result<PathBuf, BomError> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        BomError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(BomError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| BomError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Global options shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub database: PathBuf,
    pub backend: Backend,
    pub json_mode: bool,
    pub config: AppConfig,
}

impl Context {
    /// Open the store with the configured traversal bounds.
    pub fn open(&self) -> Result<Session, BomError> {
        let session = match self.backend {
            Backend::Redb => Session::with_redb(&self.database)?,
            Backend::File => Session::from_snapshot_file(&self.database)?,
        };
        Ok(session.with_options(self.config.traversal.options()))
    }

    /// Persist a file-backed session. Redb commits on every write.
    pub fn save(&self, session: &Session) -> Result<(), BomError> {
        if session.is_persistent() {
            Ok(())
        } else {
            session.save_snapshot_file(&self.database)
        }
    }

    /// Open, mutate, save.
    fn mutate<T>(
        &self,
        op: impl FnOnce(&mut Session) -> Result<T, BomError>,
    ) -> Result<(Session, T), BomError> {
        let mut session = self.open()?;
        let value = op(&mut session)?;
        self.save(&session)?;
        Ok((session, value))
    }

    /// Print `value` as JSON in JSON mode, otherwise run `text`.
    fn emit<T: Serialize>(&self, value: &T, text: impl FnOnce()) {
        if self.json_mode {
            println!(
                "{}",
                serde_json::to_string_pretty(value).unwrap_or_default()
            );
        } else {
            text();
        }
    }
}

/// Non-zero slots of `attributes`, scaled for reading.
pub fn format_attributes(attributes: &AttributeVector) -> String {
    let parts: Vec<String> = AttributeField::ALL
        .iter()
        .filter(|field| attributes.get(**field) != 0.0)
        .map(|field| {
            format!(
                "{} {}",
                field.name(),
                humanize(*field, attributes.get(*field))
            )
        })
        .collect();

    if parts.is_empty() {
        "-".to_string()
    } else {
        parts.join(", ")
    }
}

// =============================================================================
// INIT / STATUS
// =============================================================================

/// Initialize a new empty database.
pub fn cmd_init(ctx: &Context, force: bool) -> Result<(), BomError> {
    if ctx.database.exists() {
        if !force {
            return Err(BomError::InvalidInput(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(&ctx.database)
            .map_err(|e| BomError::IoError(format!("Remove existing database: {}", e)))?;
    }

    let session = match ctx.backend {
        Backend::Redb => Session::with_redb(&ctx.database)?,
        Backend::File => Session::new(),
    };
    ctx.save(&session)?;

    tracing::info!(database = %ctx.database.display(), backend = ctx.backend.as_str(), "Initialized");
    println!(
        "Initialized new {} database at {:?}",
        ctx.backend.as_str(),
        ctx.database
    );
    Ok(())
}

/// Show store counts.
pub fn cmd_status(ctx: &Context) -> Result<(), BomError> {
    let session = ctx.open()?;
    let counts = session.counts()?;
    let options = session.options();

    let output = serde_json::json!({
        "database": ctx.database.to_string_lossy(),
        "backend": ctx.backend.as_str(),
        "components": counts.components,
        "revisions": counts.revisions,
        "links": counts.links,
        "max_depth": options.max_depth,
        "max_nodes": options.max_nodes,
    });

    ctx.emit(&output, || {
        println!("bomgraph Store Status");
        println!("=====================");
        println!("Database:   {:?}", ctx.database);
        println!("Backend:    {}", ctx.backend.as_str());
        println!();
        println!("Components: {}", counts.components);
        println!("Revisions:  {}", counts.revisions);
        println!("Links:      {}", counts.links);
        println!();
        println!("Max Depth:  {}", options.max_depth);
        println!("Max Nodes:  {}", options.max_nodes);
    });
    Ok(())
}

// =============================================================================
// COMPONENTS
// =============================================================================

pub fn cmd_component(ctx: &Context, command: ComponentCommand) -> Result<(), BomError> {
    match command {
        ComponentCommand::Add {
            name,
            classification,
            kind,
            unit,
            description,
        } => {
            let spec = NewComponent {
                name,
                classification: ClassificationCode::new(classification),
                kind,
                unit,
                description,
            };
            let (session, created) = ctx.mutate(|s| s.create_component(spec))?;
            let name = session.reader().revision_name(created.revision)?;
            ctx.emit(&created, || {
                println!(
                    "Created component {} with draft {} ({})",
                    created.component, created.revision, name
                );
            });
        }
        ComponentCommand::Copy { component } => {
            let (session, created) = ctx.mutate(|s| s.copy_component(ComponentId(component)))?;
            let copied = session.component(created.component)?;
            ctx.emit(&created, || {
                println!(
                    "Copied component {} to {} '{}' with draft {}",
                    component, created.component, copied.name, created.revision
                );
            });
        }
        ComponentCommand::List => {
            let session = ctx.open()?;
            let mut rows = Vec::new();
            for component in session.components()? {
                let revisions = session.revisions(component.id)?;
                let latest = revisions
                    .last()
                    .map(|r| (r.id, r.state(true)));
                rows.push(serde_json::json!({
                    "component": component,
                    "revisions": revisions.len(),
                    "latest_revision": latest.map(|(id, _)| id),
                    "latest_state": latest.map(|(_, state)| state),
                }));
                if !ctx.json_mode {
                    let latest = latest
                        .map(|(id, state)| format!("{} {:?}", id, state))
                        .unwrap_or_else(|| "-".to_string());
                    println!(
                        "{:>6}  {:<24} {:<8} {:<18} {:<6} {} rev(s), latest {}",
                        component.id.to_string(),
                        component.name,
                        component.classification.as_str(),
                        component.kind.as_str(),
                        component.unit,
                        revisions.len(),
                        latest
                    );
                }
            }
            ctx.emit(&rows, || {
                if rows.is_empty() {
                    println!("No components");
                }
            });
        }
    }
    Ok(())
}

// =============================================================================
// REVISIONS
// =============================================================================

pub fn cmd_revision(ctx: &Context, command: RevisionCommand) -> Result<(), BomError> {
    match command {
        RevisionCommand::New { component } => {
            let (session, revision) = ctx.mutate(|s| s.create_revision(ComponentId(component)))?;
            let name = session.reader().revision_name(revision)?;
            let output = serde_json::json!({ "revision": revision, "name": name });
            ctx.emit(&output, || println!("Issued draft {} ({})", revision, name));
        }
        RevisionCommand::List { component } => {
            let session = ctx.open()?;
            let revisions = session.revisions(ComponentId(component))?;
            if revisions.is_empty() {
                // Distinguish a missing component from one without revisions.
                session.component(ComponentId(component))?;
            }
            ctx.emit(&revisions, || {
                let last = revisions.len().saturating_sub(1);
                for (index, revision) in revisions.iter().enumerate() {
                    let locked = revision
                        .locked_at
                        .map(|at| format!(" locked at {}", at))
                        .unwrap_or_default();
                    println!(
                        "{:>6}  {:?}  issued at {}{}  [{}]",
                        revision.id.to_string(),
                        revision.state(index == last),
                        revision.issued_at,
                        locked,
                        format_attributes(&revision.attributes)
                    );
                }
            });
        }
        RevisionCommand::Copy(arg) => {
            let (session, outcome) = ctx.mutate(|s| s.copy_revision(RevisionId(arg.revision)))?;
            let name = session.reader().revision_name(outcome.revision)?;
            ctx.emit(&outcome, || {
                println!(
                    "Copied R{} to {} ({}) with {} link(s)",
                    arg.revision,
                    outcome.revision,
                    name,
                    outcome.links.len()
                );
            });
        }
        RevisionCommand::Lock(arg) => {
            let (_, outcome) = ctx.mutate(|s| s.lock(RevisionId(arg.revision)))?;
            ctx.emit(&outcome, || {
                println!(
                    "Locked {} at {} ({} revision(s) newly locked)",
                    outcome.revision,
                    outcome.locked_at,
                    outcome.locked.len()
                );
                for id in &outcome.locked {
                    println!("  {}", id);
                }
            });
        }
        RevisionCommand::Unlock(arg) => {
            ctx.open()?.unlock(RevisionId(arg.revision))?;
        }
        RevisionCommand::Set(args) => {
            let (_, attributes) = ctx.mutate(|s| {
                let revision = RevisionId(args.revision);
                let attributes = merge_attributes(s.revision(revision)?.attributes, &args);
                s.update_attributes(revision, attributes)?;
                Ok(attributes)
            })?;
            ctx.emit(&attributes, || {
                println!("R{}: {}", args.revision, format_attributes(&attributes));
            });
        }
        RevisionCommand::Delete(arg) => {
            let (_, outcome) = ctx.mutate(|s| s.delete_revision(RevisionId(arg.revision)))?;
            ctx.emit(&outcome, || {
                if outcome.component_deleted {
                    println!("Deleted {} and its component", outcome.revision);
                } else {
                    println!("Deleted {}", outcome.revision);
                }
            });
        }
    }
    Ok(())
}

fn merge_attributes(mut attributes: AttributeVector, args: &SetAttributes) -> AttributeVector {
    let updates = [
        (AttributeField::Mass, args.mass),
        (AttributeField::Length, args.length),
        (AttributeField::Area, args.area),
        (AttributeField::Volume, args.volume),
        (AttributeField::Cost, args.cost),
        (AttributeField::Duration, args.duration),
        (AttributeField::Other, args.other),
    ];
    for (field, value) in updates {
        if let Some(value) = value {
            attributes.set(field, value);
        }
    }
    attributes
}

// =============================================================================
// LINKS
// =============================================================================

pub fn cmd_link(ctx: &Context, command: LinkCommand) -> Result<(), BomError> {
    match command {
        LinkCommand::Add {
            source,
            target,
            quantity,
            classification,
            kind,
            description,
        } => {
            let spec = NewLink {
                source: RevisionId(source),
                target: ComponentId(target),
                quantity,
                classification: classification.map(ClassificationCode::new),
                kind,
                description,
            };
            let (_, link) = ctx.mutate(|s| s.create_link(spec))?;
            let output = serde_json::json!({ "link": link });
            ctx.emit(&output, || {
                println!("Created {}: R{} -> C{} x {}", link, source, target, quantity);
            });
        }
        LinkCommand::List { source } => {
            let session = ctx.open()?;
            let links = session.links(RevisionId(source))?;
            ctx.emit(&links, || {
                for link in &links {
                    println!(
                        "{:>6}  -> {:<6} x {:<10} {:<8} {:?}",
                        link.id.to_string(),
                        link.target.to_string(),
                        link.quantity.value(),
                        link.classification.as_str(),
                        link.kind
                    );
                }
            });
        }
        LinkCommand::Set {
            link,
            quantity,
            kind,
            description,
        } => {
            let update = LinkUpdate {
                quantity,
                kind,
                description,
            };
            let (_, updated) = ctx.mutate(|s| s.update_link(LinkId(link), update))?;
            ctx.emit(&updated, || {
                println!(
                    "Updated {}: quantity {}, {:?}",
                    updated.id,
                    updated.quantity.value(),
                    updated.kind
                );
            });
        }
        LinkCommand::Delete { link } => {
            ctx.mutate(|s| s.delete_link(LinkId(link)))?;
            let output = serde_json::json!({ "deleted": LinkId(link) });
            ctx.emit(&output, || println!("Deleted L{}", link));
        }
    }
    Ok(())
}

// =============================================================================
// READ PASSES
// =============================================================================

/// Resolve the graph below a revision.
pub fn cmd_traverse(ctx: &Context, revision: u64) -> Result<(), BomError> {
    let session = ctx.open()?;
    let result = session.traverse(RevisionId(revision))?;
    let reader = session.reader();

    if ctx.json_mode {
        ctx.emit(&result, || {});
        return Ok(());
    }

    println!(
        "Traversal from {} ({} revision(s), {} edge(s))",
        reader.revision_name(result.root)?,
        result.visited.len(),
        result.edges.len()
    );
    for id in &result.visited {
        let attributes = result.attributes.get(id).copied().unwrap_or_default();
        let status = result.lock_status.get(id).copied().unwrap_or_default();
        println!(
            "  {:<24} {:?}  {}",
            reader.revision_name(*id)?,
            status,
            format_attributes(&attributes)
        );
    }
    for unresolved in &result.unresolved {
        println!(
            "  unresolved: {} via {} (no revision of {} under the lock)",
            unresolved.source, unresolved.link, unresolved.component
        );
    }
    if !result.truncated.is_empty() {
        println!("  truncated below: {:?}", result.truncated);
    }
    for warning in &result.warnings {
        println!("  warning: {:?}", warning);
    }
    Ok(())
}

/// Every root-to-node path with cumulative quantities.
pub fn cmd_paths(ctx: &Context, revision: u64) -> Result<(), BomError> {
    let session = ctx.open()?;
    let result = session.paths(RevisionId(revision))?;
    let reader = session.reader();

    ctx.emit(&result, || {
        for (node, paths) in &result.paths {
            let name = reader
                .revision_name(*node)
                .unwrap_or_else(|_| node.to_string());
            let total = result.quantities.get(node).copied().unwrap_or_default();
            println!("{} (total quantity {})", name, total);
            for path in paths {
                let hops: Vec<String> = path
                    .iter()
                    .map(|step| format!("{} [{}]", step.0, step.1))
                    .collect();
                println!("  {}", hops.join(" -> "));
            }
        }
        if result.truncated {
            println!("(path listing truncated)");
        }
    });
    Ok(())
}

/// Aggregates, labels and the consistency check.
pub fn cmd_analyze(ctx: &Context, revision: u64) -> Result<(), BomError> {
    let session = ctx.open()?;
    let analysis = session.analyze(RevisionId(revision))?;
    if !analysis.is_consistent() {
        tracing::warn!(
            revision,
            mismatches = analysis.mismatches.len(),
            "Top-down and bottom-up aggregates disagree"
        );
    }

    ctx.emit(&analysis, || {
        for (id, label) in &analysis.labels {
            let attributes = analysis
                .traversal
                .attributes
                .get(id)
                .copied()
                .unwrap_or_default();
            let quantity = analysis.paths.quantities.get(id).copied().unwrap_or_default();
            println!(
                "{:<24} {:>10} {:<6} {}",
                label.name,
                quantity,
                label.unit,
                format_attributes(&attributes)
            );
        }
        if analysis.is_consistent() {
            println!("Aggregates consistent");
        } else {
            for mismatch in &analysis.mismatches {
                println!(
                    "MISMATCH {}: max difference {}",
                    mismatch.revision, mismatch.max_abs_diff
                );
            }
        }
    });
    Ok(())
}

/// Report the first cycle reachable from a revision.
pub fn cmd_check_cycle(ctx: &Context, revision: u64) -> Result<(), BomError> {
    let session = ctx.open()?;
    let report = session.detect_cycle(RevisionId(revision))?;
    ctx.emit(&report, || {
        if report.has_cycle {
            println!("Cycle: {}", report.path.join(" -> "));
        } else {
            println!("No cycle reachable from R{}", revision);
        }
    });
    Ok(())
}

// =============================================================================
// SNAPSHOTS
// =============================================================================

/// Write the store as a canonical snapshot (or JSON dump).
pub fn cmd_export(ctx: &Context, output: &Path, format: &str) -> Result<(), BomError> {
    let validated_output = validate_output_path(output)?;
    let session = ctx.open()?;

    let data = match format {
        "canonical" => {
            let data = session.export()?;
            println!("Checksum: {}", session.checksum()?);
            data
        }
        "json" => {
            let bom = CanonicalBom::from_store(session.reader())?;
            serde_json::to_vec_pretty(&bom)
                .map_err(|e| BomError::SerializationError(e.to_string()))?
        }
        _ => {
            return Err(BomError::InvalidInput(format!(
                "Unknown format: {}. Use: canonical, json",
                format
            )));
        }
    };

    std::fs::write(&validated_output, &data)
        .map_err(|e| BomError::IoError(format!("Write file: {}", e)))?;

    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Load a canonical snapshot into an empty store.
pub fn cmd_import(ctx: &Context, input: &Path) -> Result<(), BomError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| BomError::IoError(format!("Read file: {}", e)))?;

    let (_, counts) = ctx.mutate(|s| s.import(&data))?;
    ctx.emit(&counts, || {
        println!(
            "Imported {} component(s), {} revision(s), {} link(s)",
            counts.components, counts.revisions, counts.links
        );
    });
    Ok(())
}

/// Create components, attributes and links from a tab-separated file.
pub fn cmd_ingest(ctx: &Context, input: &Path) -> Result<(), BomError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let text = std::fs::read_to_string(&validated_path)
        .map_err(|e| BomError::IoError(format!("Read file: {}", e)))?;

    let (_, summary) = ctx.mutate(|s| s.ingest_tsv(&text))?;
    tracing::info!(
        created = summary.created.len(),
        revised = summary.revised.len(),
        links = summary.links,
        "BOM lines ingested"
    );
    ctx.emit(&summary, || {
        println!(
            "Created {} component(s) and {} placeholder(s), revised {}, unchanged {}, {} link(s)",
            summary.created.len(),
            summary.placeholders.len(),
            summary.revised.len(),
            summary.unchanged.len(),
            summary.links
        );
    });
    Ok(())
}

/// BLAKE3 hash of the canonical snapshot.
pub fn cmd_hash(ctx: &Context) -> Result<(), BomError> {
    let session = ctx.open()?;
    let hash = session.crypto_hash()?;
    let checksum = session.checksum()?;

    let output = serde_json::json!({
        "algorithm": "blake3",
        "hash": hash,
        "checksum": checksum,
    });
    ctx.emit(&output, || {
        println!("BLAKE3:   {}", hash);
        println!("Checksum: {}", checksum);
    });
    Ok(())
}

// =============================================================================
// SERVER
// =============================================================================

/// Start the HTTP server. CLI host and port override the config file.
pub async fn cmd_server(
    ctx: Context,
    host: Option<String>,
    port: Option<u16>,
) -> Result<(), BomError> {
    let mut server = ctx.config.server.clone();
    if let Some(host) = host {
        server.host = host;
    }
    if let Some(port) = port {
        server.port = port;
    }

    let session = ctx.open()?;
    let mut state = AppState::new(session);
    if ctx.backend == Backend::File {
        state = state.with_snapshot_file(ctx.database.clone());
    }

    tracing::info!(
        host = %server.host,
        port = server.port,
        backend = ctx.backend.as_str(),
        database = %ctx.database.display(),
        "Starting bomgraph server"
    );
    api::run_server(state, &server).await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::cli::RevisionArg;
    use bomgraph_core::ComponentKind;

    fn context(dir: &Path, backend: Backend) -> Context {
        Context {
            database: dir.join("bom.db"),
            backend,
            json_mode: true,
            config: AppConfig::default(),
        }
    }

    fn add(ctx: &Context, name: &str) -> RevisionId {
        let (_, created) = ctx
            .mutate(|s| {
                s.create_component(NewComponent {
                    name: name.to_string(),
                    classification: ClassificationCode::new("ASM"),
                    kind: ComponentKind::Article,
                    unit: None,
                    description: None,
                })
            })
            .expect("create");
        created.revision
    }

    #[test]
    fn file_backend_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        add(&ctx, "Frame");
        add(&ctx, "Bolt");

        assert_eq!(ctx.open().expect("open").counts().expect("counts").components, 2);
    }

    #[test]
    fn redb_backend_survives_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::Redb);
        let frame = add(&ctx, "Frame");
        cmd_revision(&ctx, RevisionCommand::Lock(RevisionArg { revision: frame.0 }))
            .expect("lock");

        let session = ctx.open().expect("open");
        assert!(session.revision(frame).expect("revision").is_locked());
    }

    #[test]
    fn init_refuses_existing_database_without_force() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        cmd_init(&ctx, false).expect("init");
        assert!(cmd_init(&ctx, false).is_err());
        cmd_init(&ctx, true).expect("forced init");
    }

    #[test]
    fn set_merges_attributes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        let frame = add(&ctx, "Frame");

        let args = SetAttributes {
            revision: frame.0,
            mass: Some(2.0),
            length: None,
            area: None,
            volume: None,
            cost: Some(5.0),
            duration: None,
            other: None,
        };
        cmd_revision(&ctx, RevisionCommand::Set(args)).expect("set");
        let args = SetAttributes {
            mass: None,
            cost: None,
            length: Some(1.5),
            ..args
        };
        cmd_revision(&ctx, RevisionCommand::Set(args)).expect("set");

        let attributes = ctx.open().expect("open").revision(frame).expect("revision").attributes;
        assert_eq!(attributes.mass, 2.0);
        assert_eq!(attributes.length, 1.5);
        assert_eq!(attributes.cost, 5.0);
    }

    #[test]
    fn export_then_import_into_fresh_database() {
        let dir = tempfile::tempdir().expect("tempdir");
        let source = context(dir.path(), Backend::File);
        add(&source, "Frame");
        let snapshot = dir.path().join("snapshot.bom");
        cmd_export(&source, &snapshot, "canonical").expect("export");

        let target = Context {
            database: dir.path().join("copy.redb"),
            ..context(dir.path(), Backend::Redb)
        };
        cmd_import(&target, &snapshot).expect("import");
        assert_eq!(
            target.open().expect("open").checksum().expect("checksum"),
            source.open().expect("open").checksum().expect("checksum")
        );

        // A second import hits a non-empty store.
        assert!(cmd_import(&target, &snapshot).is_err());
    }

    #[test]
    fn unknown_export_format_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        assert!(cmd_export(&ctx, &dir.path().join("out"), "xml").is_err());
    }

    #[test]
    fn zero_slots_are_omitted_from_text() {
        let mut attributes = AttributeVector::ZERO;
        assert_eq!(format_attributes(&attributes), "-");
        attributes.mass = 1500.0;
        assert_eq!(format_attributes(&attributes), "mass 1.50 t");
    }

    #[test]
    fn ingest_file_then_copy_component() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        let input = dir.path().join("bom.tsv");
        std::fs::write(
            &input,
            "Frame\t\tpcs\tASM\tarticle\t2\t\t\t\t\t\t\t\tBolt\t4\twelded\n",
        )
        .expect("write");

        cmd_ingest(&ctx, &input).expect("ingest");
        let session = ctx.open().expect("open");
        assert_eq!(session.counts().expect("counts").links, 1);
        let frame = session
            .components()
            .expect("components")
            .into_iter()
            .find(|c| c.name == "Frame")
            .expect("frame");

        cmd_component(&ctx, ComponentCommand::Copy { component: frame.id.0 }).expect("copy");
        let names: Vec<String> = ctx
            .open()
            .expect("open")
            .components()
            .expect("components")
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert!(names.contains(&"Frame (1)".to_string()));
    }

    #[test]
    fn ingest_rejects_bad_lines_without_writing() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = context(dir.path(), Backend::File);
        cmd_init(&ctx, false).expect("init");
        let input = dir.path().join("bad.tsv");
        std::fs::write(&input, "Frame\tpcs\n").expect("write");

        assert!(matches!(
            cmd_ingest(&ctx, &input),
            Err(BomError::ImportRejected { .. })
        ));
        assert_eq!(ctx.open().expect("open").counts().expect("counts").components, 0);
    }
}
