//! # Course Compass
//!
//! Course search and recommendations over a Postgres + pgvector catalog.
//!
//! A user describes an intent (free text, or a profession and goal) and gets
//! back a short, justified list of courses. Every recommended course comes
//! from a bounded candidate set: the completion model is shown the
//! candidates, and its answer is filtered against them before it reaches
//! the caller.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌────────────┐     ┌────────────┐     ┌─────────────┐
//!  /search ──────▶│ Retriever  │────▶│  Search    │────▶│  results    │
//!                 │ title/fts/ │     │ Responder  │     └─────────────┘
//!                 │  vector    │     └────────────┘
//!  /recommend ───▶│            │────▶ prompt ─▶ model ─▶ parse ─▶ whitelist
//!                 └─────┬──────┘
//!                       │
//!                 ┌─────▼──────┐     ┌────────────┐
//!                 │ Postgres + │◀────│  Ingest    │◀── build_text ◀── courses
//!                 │  pgvector  │     │ + reconcile│
//!                 └────────────┘     └────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! compass init                          # extension, tables, SQL functions
//! compass courses load courses.json     # normalized course records
//! compass ingest                        # embed and reconcile
//! compass search "product management"
//! compass recommend "I want to move into product" --top-k 3
//! compass serve                         # HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |
//! | [`models`] | Core data types |
//! | [`embed_text`] | Course text for embedding |
//! | [`embedding`] | Embedding providers and the batch client |
//! | [`completion`] | Chat-completion providers |
//! | [`store`] | Backing-store trait, Postgres and in-memory implementations |
//! | [`retrieve`] | Candidate retrieval strategies |
//! | [`recommend`] | Prompt, parse and whitelist validation |
//! | [`search`] | Search responder |
//! | [`ingest`] | Embedding ingestion and reconciliation |
//! | [`courses`] | Course loading and store probe |
//! | [`services`] | Shared clients |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema setup |

pub mod completion;
pub mod config;
pub mod courses;
pub mod db;
pub mod embed_text;
pub mod embedding;
pub mod error;
pub mod ingest;
pub mod migrate;
pub mod models;
mod provider_http;
pub mod recommend;
pub mod retrieve;
pub mod search;
pub mod server;
pub mod services;
pub mod store;
