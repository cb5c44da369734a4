//! # Work Item Harness
//!
//! Agent-ready query tools over an Azure DevOps work item tracker.
//!
//! Work Item Harness resolves bounded candidate sets via WIQL, expands them
//! with full details and comment threads, and exposes relevance-ranked
//! search and natural-language date/status filtering through a CLI and an
//! MCP-compatible HTTP server.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌───────────────┐
//! │ WIQL resolve │──▶│   Fetch     │──▶│ Score / Filter │
//! │ (id list)    │   │ details +   │   │  rank, window  │
//! └──────────────┘   │ comments    │   └───────┬───────┘
//!                    └─────────────┘           │
//!                      ┌───────────────────────┤
//!                      ▼                       ▼
//!                 ┌──────────┐           ┌──────────┐
//!                 │   CLI    │           │   HTTP   │
//!                 │  (wit)   │           │  (MCP)   │
//!                 └──────────┘           └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! export AZDO_PAT=...                 # personal access token, env only
//! wit search "login timeout" --type Bug
//! wit filter "completed last month"
//! wit serve mcp                       # start HTTP + MCP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and environment overrides |
//! | [`models`] | Core data types and the tagged call result |
//! | [`notify`] | Best-effort stderr notification channel |
//! | [`gateway`] | Authenticated HTTP gateway to the tracker |
//! | [`wiql`] | WIQL construction and id resolution |
//! | [`fetch`] | Detail and comment expansion |
//! | [`score`] | Relevance scoring and excerpts |
//! | [`filter`] | Natural-language date/status filtering |
//! | [`tools`] | Tool trait, registry, and built-in tools |
//! | [`server`] | JSON HTTP API and MCP mount |
//! | [`mcp`] | MCP JSON-RPC protocol bridge |

pub mod config;
pub mod fetch;
pub mod filter;
pub mod gateway;
pub mod mcp;
pub mod models;
pub mod notify;
pub mod score;
pub mod server;
pub mod tools;
pub mod wiql;

pub use config::Config;
pub use models::{CallResult, ScoredMatch, WorkItem};
