//! # SPARC Search
//!
//! Search backend for the SPARC data portal. Turns facet selections from the
//! portal into index queries, and raw index documents of every published
//! schema version into one flat, versioned record shape.
//!
//! The pure logic lives in [`sparc_search_core`]; this crate adds the
//! configuration file, the HTTP client for the index, the JSON HTTP API and
//! the `sparc` CLI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────┐   ┌───────────────┐
//! │  Portal  │──▶│  HTTP / CLI    │──▶│ Query builder │──┐
//! └──────────┘   └───────┬───────┘   └───────────────┘  │
//!                        ▲                               ▼
//!                ┌───────┴───────┐               ┌──────────────┐
//!                │  Normalizer   │◀──────────────│ SciCrunch ES │
//!                └───────────────┘               └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! sparc query --term organ --facet heart    # print the request body
//! sparc search --text "vagus nerve"         # query the index
//! sparc facets species                      # list facet values
//! sparc normalize response.json             # normalize a saved response
//! sparc serve                               # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`scicrunch`] | HTTP client for the dataset index |
//! | [`search`] | Search operations shared by CLI and server |
//! | [`server`] | JSON HTTP API |

pub mod config;
pub mod scicrunch;
pub mod search;
pub mod server;
