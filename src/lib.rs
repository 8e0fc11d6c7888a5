//! Steel lead discovery pipeline.
//!
//! Turns scraped and AI-researched project announcements into validated,
//! classified, steel-estimated and prioritized leads, then delivers one
//! digest per sales team.
//!
//! # Modules
//!
//! - `models`: Lead, candidate and payload types.
//! - `extractor`: Rule tables for company, value, dates, steel and specs.
//! - `validator`: Candidate gates, normalisation and title de-duplication.
//! - `classifier`: Project type and team routing.
//! - `steel`: Rate-table steel estimation.
//! - `scoring`: Priority scores, tags and ranking.
//! - `enrichment`: The enrich stage (classification, steel, contacts).
//! - `ingest`: Source adapters and the scrape stage.
//! - `contacts`: Contact lookup (directory and HTTP).
//! - `notifier`: Notification transports.
//! - `dispatcher`: Team grouping and per-recipient delivery.
//! - `pipeline`: The orchestrator.
//! - `retry`: Retry with backoff and per-call timeout.
//! - `circuit_breaker`: Breaker for external HTTP dependencies.
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `handlers`: HTTP trigger and status handlers.
//! - `scheduler`: Interval-driven runs in `serve` mode.

pub mod circuit_breaker;
pub mod classifier;
pub mod config;
pub mod contacts;
pub mod dispatcher;
pub mod enrichment;
pub mod errors;
pub mod extractor;
pub mod handlers;
pub mod ingest;
pub mod models;
pub mod notifier;
pub mod pipeline;
pub mod retry;
pub mod scheduler;
pub mod scoring;
pub mod steel;
pub mod validator;
