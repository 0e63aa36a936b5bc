//! # docsync
//!
//! An incremental ingestion and indexing pipeline for office documents.
//!
//! docsync scans a source tree, works out which files are new, changed, or
//! gone since the last run, extracts and normalizes their text, splits it
//! into overlapping retrieval chunks, and upserts those chunks to an
//! external batch index API — surviving rate limits, oversized payloads,
//! partial failure, and process restarts without losing or repeating work.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────────────────────────┐
//! │ Scanner  │──▶│ Classify │──▶│ per file:                   │
//! │ (walk)   │   │ against  │   │ Extract → Normalize → Chunk │
//! └──────────┘   │ manifest │   │ → Tag → Index writer        │
//!                └────┬─────┘   └──────────────┬──────────────┘
//!                     │                        │
//!                     ▼                        ▼
//!               ┌──────────┐            ┌────────────┐
//!               │ Manifest │◀───────────│  External  │
//!               │  (JSON)  │ checkpoint │ index API  │
//!               └──────────┘            └────────────┘
//! ```
//!
//! The manifest is the only state shared across runs. An entry is written
//! only after every chunk of its file has been acknowledged by the index,
//! so a crash mid-file simply redoes that file on the next run.
//!
//! ## Quick Start
//!
//! ```bash
//! docsync scan                  # classify without processing
//! docsync sync                  # process new and modified files
//! docsync sync --dry-run        # show what a sync would do
//! docsync status                # summarize the manifest
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`scanner`] | Recursive source-tree scan |
//! | [`classify`] | New / modified / deleted change detection |
//! | [`extract`] | Format-specific text extraction |
//! | [`normalize`] | Deterministic text repair |
//! | [`chunker`] | Overlapping chunk splitting |
//! | [`metadata`] | Per-chunk tag derivation |
//! | [`index_writer`] | Batched upserts with retry and splitting |
//! | [`manifest`] | Durable per-file checkpoint store |
//! | [`artifacts`] | Normalized-text artifacts and sidecar records |
//! | [`pipeline`] | Orchestration of a sync run |

pub mod artifacts;
pub mod chunker;
pub mod classify;
pub mod config;
pub mod extract;
pub mod index_writer;
pub mod manifest;
pub mod metadata;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod scanner;
