use clap::{Parser, Subcommand, ValueEnum};
use flowdeck_gateway::{SortBy, SortOrder};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "flowdeck")]
#[command(about = "Edit, run, and debug flowdeck workflows", long_about = None)]
pub struct Cli {
    /// Persistence service URL (overrides FLOWDECK_GATEWAY__BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// List stored workflows
    List {
        /// Field to sort by
        #[arg(long, value_enum, default_value = "updated")]
        sort: SortField,

        /// Oldest first
        #[arg(long)]
        asc: bool,
    },

    /// Show the node palette, grouped by category
    Nodes,

    /// Check an export file without contacting the service
    Validate {
        /// Path to the YAML export file
        file: PathBuf,
    },

    /// Download a workflow's export file
    Export {
        /// Workflow ID
        workflow_id: String,

        /// Write to this file instead of stdout
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },

    /// Upload an export file as a new workflow
    Import {
        /// Path to the YAML export file
        file: PathBuf,
    },

    /// Run the saved version of a workflow
    Execute {
        /// Workflow ID
        workflow_id: String,

        /// Trigger type (defaults to FLOWDECK_DEBUG__DEFAULT_TRIGGER)
        #[arg(short = 't', long = "trigger")]
        trigger: Option<String>,

        /// Trigger payload (JSON object)
        #[arg(short = 'd', long = "data", default_value = "{}")]
        data: String,
    },

    /// Debug the saved version of a workflow
    Debug {
        /// Workflow ID
        workflow_id: String,

        /// Pause at this node (repeatable)
        #[arg(short = 'b', long = "breakpoint")]
        breakpoints: Vec<String>,

        /// Stop at breakpoints and wait for Enter
        #[arg(long)]
        step: bool,

        /// Trigger type (defaults to FLOWDECK_DEBUG__DEFAULT_TRIGGER)
        #[arg(short = 't', long = "trigger")]
        trigger: Option<String>,

        /// Trigger payload (JSON object)
        #[arg(short = 'd', long = "data", default_value = "{}")]
        data: String,
    },
}

/// Sort field for `list`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum SortField {
    Created,
    Updated,
}

impl SortField {
    pub fn sort_by(self) -> SortBy {
        match self {
            Self::Created => SortBy::CreatedAt,
            Self::Updated => SortBy::UpdatedAt,
        }
    }
}

pub fn sort_order(asc: bool) -> SortOrder {
    if asc { SortOrder::Asc } else { SortOrder::Desc }
}
