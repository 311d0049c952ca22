//! # memvault
//!
//! A resumable batch pipeline for ingesting text files and chat exports
//! into a structured memory store.
//!
//! Content is cleaned and chunked into token-bounded pieces, embedded
//! through a rate-limited external service, and inserted idempotently.
//! Every completed chunk and unit is recorded in a durable JSON progress
//! file, so a crashed or interrupted run resumes exactly where it left
//! off when rerun with the same command.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │   Sources    │──▶│   Pipeline    │──▶│ Memory Store  │
//! │ files/export │   │ chunk+embed  │   │  (REST API)  │
//! └──────────────┘   └──────┬───────┘   └──────────────┘
//!                           │
//!                           ▼
//!                    ┌──────────────┐
//!                    │   Progress    │
//!                    │ ledger (JSON)│
//!                    └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! memvault ingest ./docs                # ingest a folder of text files
//! memvault ingest ~/exports/chat        # ingest a chat export
//! memvault ingest ./docs --dry-run      # preview chunk counts
//! memvault status                       # where did the last run stop?
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`sources`] | File and folder discovery |
//! | [`export`] | Chat export parsing |
//! | [`chunk`] | Token-bounded text chunking |
//! | [`fingerprint`] | Content fingerprints for idempotence |
//! | [`embedding`] | Embedding service client |
//! | [`summarize`] | Optional chunk summarization |
//! | [`store`] | Memory store REST client |
//! | [`ledger`] | Durable progress ledger |
//! | [`writer`] | Per-chunk store flow with retries |
//! | [`ingest`] | Batch orchestration |
//! | [`report`] | Progress reporting |
//! | [`status`] | Progress overview command |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod error;
pub mod export;
pub mod fingerprint;
pub mod ingest;
pub mod ledger;
pub mod models;
pub mod report;
pub mod sources;
pub mod status;
pub mod store;
pub mod summarize;
pub mod writer;
