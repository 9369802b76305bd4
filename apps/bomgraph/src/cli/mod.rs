//! # bomgraph CLI Module
//!
//! ## Available Commands
//!
//! - `init` - Initialize a new database
//! - `status` - Show store counts
//! - `component add|copy|list` - Create, copy and list components
//! - `revision new|list|copy|lock|unlock|set|delete` - Revision lifecycle
//! - `link add|list|set|delete` - Edit the links of a draft revision
//! - `traverse`, `paths`, `analyze`, `check-cycle` - Read passes below a revision
//! - `export`, `import`, `hash` - Canonical snapshots
//! - `ingest` - Bulk-create components and links from tab-separated lines
//! - `server` - Start the HTTP server

mod commands;

use crate::config::AppConfig;
use bomgraph_core::{BomError, ComponentKind, LinkKind};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// bomgraph - versioned bill-of-materials graph
///
/// Components own revisions; links point from a revision to a component and
/// resolve to a concrete revision according to the locks along the path.
#[derive(Parser, Debug)]
#[command(name = "bomgraph")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to the database
    #[arg(short = 'D', long, global = true, default_value = "bomgraph.db")]
    pub database: PathBuf,

    /// Storage backend
    #[arg(short = 'B', long, global = true, value_enum, default_value_t = Backend::Redb)]
    pub backend: Backend,

    /// Configuration file (default: ./bomgraph.toml when present)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where the store lives between invocations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// ACID redb database
    Redb,
    /// Canonical snapshot file, loaded into memory
    File,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Redb => "redb",
            Self::File => "file",
        }
    }
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new empty database
    Init {
        /// Overwrite an existing database
        #[arg(short, long)]
        force: bool,
    },

    /// Show store counts
    Status,

    /// Component operations
    #[command(subcommand)]
    Component(ComponentCommand),

    /// Revision lifecycle operations
    #[command(subcommand)]
    Revision(RevisionCommand),

    /// Link operations
    #[command(subcommand)]
    Link(LinkCommand),

    /// Resolve the graph below a revision
    Traverse(RevisionArg),

    /// List every path below a revision with cumulative quantities
    Paths(RevisionArg),

    /// Aggregate, label and cross-check the graph below a revision
    Analyze(RevisionArg),

    /// Report the first cycle reachable from a revision
    CheckCycle(RevisionArg),

    /// Write a canonical snapshot
    Export {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Export format (canonical, json)
        #[arg(short = 't', long, default_value = "canonical")]
        format: String,
    },

    /// Load a canonical snapshot into an empty database
    Import {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Create components, attributes and links from a tab-separated file
    Ingest {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Compute the BLAKE3 hash of the canonical snapshot
    Hash,

    /// Start HTTP server
    Server {
        /// Host to bind to (overrides config)
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to (overrides config)
        #[arg(short, long)]
        port: Option<u16>,
    },
}

#[derive(Args, Debug, Clone, Copy)]
pub struct RevisionArg {
    /// Revision id
    #[arg(short, long)]
    pub revision: u64,
}

#[derive(Subcommand, Debug)]
pub enum ComponentCommand {
    /// Create a component and its first draft revision
    Add {
        #[arg(short, long)]
        name: String,

        /// Classification code, e.g. ASM
        #[arg(short, long)]
        classification: String,

        /// article, technical_document, package, process, other
        #[arg(short, long, default_value = "article")]
        kind: ComponentKind,

        /// Unit of measure (default: pcs)
        #[arg(short, long)]
        unit: Option<String>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Copy a component as "<name> (N)" with a fresh draft
    Copy {
        #[arg(short, long)]
        component: u64,
    },

    /// List all components
    List,
}

#[derive(Subcommand, Debug)]
pub enum RevisionCommand {
    /// Issue a new draft revision of a component
    New {
        #[arg(short, long)]
        component: u64,
    },

    /// List the revisions of a component, oldest first
    List {
        #[arg(short, long)]
        component: u64,
    },

    /// Issue a new revision carrying a copy of another's links and attributes
    Copy(RevisionArg),

    /// Lock a revision and everything it resolves to
    Lock(RevisionArg),

    /// Always fails: locks are irreversible
    Unlock(RevisionArg),

    /// Overwrite attributes of a draft revision
    Set(SetAttributes),

    /// Delete the latest revision of a component
    Delete(RevisionArg),
}

/// Fields left out keep their current value.
#[derive(Args, Debug, Clone, Copy)]
pub struct SetAttributes {
    #[arg(short, long)]
    pub revision: u64,
    /// kg
    #[arg(long)]
    pub mass: Option<f64>,
    /// m
    #[arg(long)]
    pub length: Option<f64>,
    /// m²
    #[arg(long)]
    pub area: Option<f64>,
    /// m³
    #[arg(long)]
    pub volume: Option<f64>,
    #[arg(long)]
    pub cost: Option<f64>,
    /// min
    #[arg(long)]
    pub duration: Option<f64>,
    #[arg(long)]
    pub other: Option<f64>,
}

#[derive(Subcommand, Debug)]
pub enum LinkCommand {
    /// Link a draft revision to a component
    Add {
        /// Source revision id
        #[arg(short, long)]
        source: u64,

        /// Target component id
        #[arg(short, long)]
        target: u64,

        #[arg(short, long)]
        quantity: f64,

        /// Defaults to the target's classification
        #[arg(short, long)]
        classification: Option<String>,

        /// welded, assembled, other
        #[arg(short, long, default_value = "other")]
        kind: LinkKind,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// List the links of a revision
    List {
        #[arg(short, long)]
        source: u64,
    },

    /// Change quantity, kind or description of a link
    Set {
        #[arg(short, long)]
        link: u64,

        #[arg(short, long)]
        quantity: Option<f64>,

        #[arg(short, long)]
        kind: Option<LinkKind>,

        #[arg(short, long)]
        description: Option<String>,
    },

    /// Delete a link
    Delete {
        #[arg(short, long)]
        link: u64,
    },
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), BomError> {
    let config = AppConfig::load(cli.config.as_deref())?;
    let ctx = Context {
        database: cli.database,
        backend: cli.backend,
        json_mode: cli.json_mode,
        config,
    };

    match cli.command {
        Some(Commands::Init { force }) => cmd_init(&ctx, force),
        Some(Commands::Status) | None => cmd_status(&ctx),
        Some(Commands::Component(command)) => cmd_component(&ctx, command),
        Some(Commands::Revision(command)) => cmd_revision(&ctx, command),
        Some(Commands::Link(command)) => cmd_link(&ctx, command),
        Some(Commands::Traverse(arg)) => cmd_traverse(&ctx, arg.revision),
        Some(Commands::Paths(arg)) => cmd_paths(&ctx, arg.revision),
        Some(Commands::Analyze(arg)) => cmd_analyze(&ctx, arg.revision),
        Some(Commands::CheckCycle(arg)) => cmd_check_cycle(&ctx, arg.revision),
        Some(Commands::Export { output, format }) => cmd_export(&ctx, &output, &format),
        Some(Commands::Import { input }) => cmd_import(&ctx, &input),
        Some(Commands::Ingest { input }) => cmd_ingest(&ctx, &input),
        Some(Commands::Hash) => cmd_hash(&ctx),
        Some(Commands::Server { host, port }) => cmd_server(ctx, host, port).await,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_subcommands() {
        let cli = Cli::try_parse_from([
            "bomgraph", "-B", "file", "link", "add", "-s", "2", "-t", "3", "-q", "4",
            "-k", "welded",
        ])
        .expect("parse");
        assert_eq!(cli.backend, Backend::File);
        match cli.command {
            Some(Commands::Link(LinkCommand::Add {
                source,
                target,
                quantity,
                kind,
                ..
            })) => {
                assert_eq!((source, target), (2, 3));
                assert_eq!(quantity, 4.0);
                assert_eq!(kind, LinkKind::Welded);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let parsed = Cli::try_parse_from([
            "bomgraph", "component", "add", "-n", "Frame", "-c", "ASM", "-k", "gadget",
        ]);
        assert!(parsed.is_err());
    }
}
