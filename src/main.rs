//! # Work Item Harness CLI (`wit`)
//!
//! The `wit` binary is the primary interface for Work Item Harness. It
//! provides commands for searching, filtering, fetching, and listing work
//! items in an Azure DevOps organization, and for starting the
//! MCP-compatible HTTP server.
//!
//! ## Usage
//!
//! ```bash
//! AZDO_PAT=... wit --config ./config/wit.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wit search "<query>"` | Relevance-ranked search over titles and discussion |
//! | `wit filter "<phrase>"` | Filter by natural-language date/status phrases |
//! | `wit item <id>` | Fetch one work item with its discussion |
//! | `wit list <type>` | List work items of a type, most recent first |
//! | `wit serve mcp` | Start the MCP-compatible HTTP server |
//!
//! ## Examples
//!
//! ```bash
//! # Search bug discussions
//! wit search "login timeout" --type Bug
//!
//! # Everything that slipped past its target date
//! wit filter "overdue tasks"
//!
//! # Completed last month, restricted to known ids
//! wit filter "completed last month" --ids 101,102,315
//!
//! # Start the server for Cursor integration
//! wit serve mcp --config ./config/wit.toml
//! ```
//!
//! Credentials are never stored in the config file: the personal access
//! token is read from the `AZDO_PAT` environment variable on every run.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};

use workitem_harness::config::{self, Config};
use workitem_harness::gateway::Gateway;
use workitem_harness::notify::NotifyMode;
use workitem_harness::server;
use workitem_harness::tools::{ToolContext, ToolRegistry};

/// Work Item Harness CLI — agent-ready query tools over an Azure DevOps
/// work item tracker.
#[derive(Parser)]
#[command(
    name = "wit",
    about = "Work Item Harness — agent-ready query tools over an Azure DevOps work item tracker",
    version,
    long_about = "Work Item Harness resolves work item candidates via WIQL, expands them with \
    details and comment threads, and exposes relevance search and natural-language date/status \
    filtering via a CLI and an MCP-compatible HTTP server."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/wit.toml`. When the file does not exist, the
    /// configuration is built from the `AZDO_ORG_URL` and `AZDO_PROJECT`
    /// environment variables instead.
    #[arg(long, global = true, default_value = "./config/wit.toml")]
    config: PathBuf,

    /// Progress notifications on stderr: `off`, `human`, or `json`.
    ///
    /// Defaults to `human` when stderr is a terminal, `off` otherwise.
    #[arg(long, global = true)]
    notify: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Search work item titles and discussion text.
    ///
    /// Resolves recently-changed candidates, fetches their details and
    /// comment threads, and ranks them against the query. Matches below
    /// the relevance threshold are dropped.
    Search {
        /// The search query string.
        query: String,

        /// Restrict to a declared work item type (e.g., `Bug`, `Task`).
        #[arg(long = "type")]
        work_item_type: Option<String>,
    },

    /// Filter work items by a natural-language date/status phrase.
    ///
    /// Recognizes phrasing like `overdue`, `last month`, `completed in
    /// September`, and `open items`. Explicit flags constrain or override
    /// what the phrase implies.
    Filter {
        /// Natural-language filter phrase.
        phrase: Option<String>,

        /// Explicit window start (YYYY-MM-DD); intersects the phrase window.
        #[arg(long)]
        start: Option<String>,

        /// Explicit window end (YYYY-MM-DD); intersects the phrase window.
        #[arg(long)]
        end: Option<String>,

        /// Exact state to require; replaces any phrase-derived status rule.
        #[arg(long)]
        status: Option<String>,

        /// Comma-separated work item ids to filter instead of discovering
        /// candidates via WIQL.
        #[arg(long, value_delimiter = ',')]
        ids: Option<Vec<i64>>,

        /// Restrict discovered candidates to a declared work item type.
        #[arg(long = "type")]
        work_item_type: Option<String>,
    },

    /// Fetch one work item by id.
    ///
    /// Prints the record's title, state, and discussion text (comments
    /// followed by the description).
    Item {
        /// Work item id.
        id: i64,
    },

    /// List work items of a type, most recently changed first.
    List {
        /// Work item type (e.g., `Bug`, `Task`, `User Story`).
        work_item_type: String,
    },

    /// Start the MCP-compatible HTTP server.
    ///
    /// Exposes the tools via a JSON API and an MCP Streamable HTTP endpoint
    /// for integration with Cursor, Claude, and other MCP clients.
    Serve {
        #[command(subcommand)]
        service: ServeService,
    },
}

/// Server subcommands.
#[derive(Subcommand)]
enum ServeService {
    /// Start the MCP tool server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// tool endpoints plus the `/mcp` JSON-RPC endpoint.
    Mcp,
}

fn notify_mode(flag: Option<&str>) -> Result<NotifyMode> {
    match flag {
        None => Ok(NotifyMode::default_for_tty()),
        Some("off") => Ok(NotifyMode::Off),
        Some("human") => Ok(NotifyMode::Human),
        Some("json") => Ok(NotifyMode::Json),
        Some(other) => bail!("--notify must be off, human, or json (got '{}')", other),
    }
}

/// Load the config file, or fall back to environment variables when the
/// file does not exist. A file that exists but fails to parse is an error.
fn resolve_config(path: &PathBuf) -> Result<Config> {
    if path.exists() {
        config::load_config(path)
    } else {
        Config::from_env()
    }
}

async fn run_tool(
    cfg: Config,
    mode: NotifyMode,
    name: &str,
    params: serde_json::Value,
) -> Result<()> {
    let notifier = mode.notifier();
    let config = Arc::new(cfg);
    let gateway = Arc::new(Gateway::new(&config)?);
    let registry = ToolRegistry::with_builtins();
    let tool = registry
        .find(name)
        .ok_or_else(|| anyhow::anyhow!("no tool registered with name: {}", name))?;

    let ctx = ToolContext::new(config, gateway, notifier);
    let result = tool.execute(params, &ctx).await;
    if result.is_error {
        bail!("{}", result.text);
    }
    println!("{}", result.text);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mode = notify_mode(cli.notify.as_deref())?;
    let cfg = resolve_config(&cli.config)?;

    match cli.command {
        Commands::Search {
            query,
            work_item_type,
        } => {
            let params = serde_json::json!({
                "query": query,
                "work_item_type": work_item_type,
            });
            run_tool(cfg, mode, "search_work_items", params).await
        }

        Commands::Filter {
            phrase,
            start,
            end,
            status,
            ids,
            work_item_type,
        } => {
            let params = serde_json::json!({
                "filter": phrase,
                "start_date": start,
                "end_date": end,
                "status": status,
                "ids": ids,
                "work_item_type": work_item_type,
            });
            run_tool(cfg, mode, "filter_work_items", params).await
        }

        Commands::Item { id } => {
            let params = serde_json::json!({ "id": id });
            run_tool(cfg, mode, "get_work_item", params).await
        }

        Commands::List { work_item_type } => {
            let params = serde_json::json!({ "work_item_type": work_item_type });
            run_tool(cfg, mode, "list_work_items", params).await
        }

        Commands::Serve {
            service: ServeService::Mcp,
        } => server::run_server(&cfg, mode.notifier()).await,
    }
}
