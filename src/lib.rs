//! CNPJ Lead Enrichment Library
//!
//! Turns bare Brazilian company identifiers into contactable, scored leads:
//! registry lookup, official-website discovery, AI-assisted contact
//! extraction and email guessing, then commercial scoring, one lead at a time.
//!
//! # Modules
//!
//! - `config`: Configuration management.
//! - `errors`: Error handling types.
//! - `models`: Lead, registry record, and batch data models.
//! - `normalizer`: CNPJ checksum, email and phone normalization.
//! - `registry`: Company registry lookup client.
//! - `ai_bridge`: AI bridge client (single `invoke(action, payload)` shape).
//! - `credentials`: Per-organization AI credential resolution.
//! - `backends`: Content fetch/search backends with quota-aware fallback.
//! - `discovery`: Official website discovery.
//! - `contact_extractor`: Contact extraction from page text.
//! - `email_guesser`: AI email guess.
//! - `lead_scorer`: Commercial scoring.
//! - `orchestrator`: Sequential batch pipeline.
//! - `handlers`: HTTP request handlers.

pub mod ai_bridge;
pub mod backends;
pub mod config;
pub mod contact_extractor;
pub mod credentials;
pub mod discovery;
pub mod email_guesser;
pub mod errors;
pub mod handlers;
pub mod lead_scorer;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod registry;
