//! Bidirectional Nextcloud WebDAV sync engine.
//!
//! Modules map directly onto the component breakdown: [`path`] (codec),
//! [`webdav`] (protocol client), [`xml`] (PROPFIND parsing), [`state`]
//! (durable per-pair state), [`snapshot`] (local/remote collectors),
//! [`classifier`] (pure decision function), [`executor`] (bounded-
//! concurrency action runner), [`orchestrator`] (the top-level pass), and
//! [`registry`] (pair CRUD).

pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod orchestrator;
pub mod path;
pub mod registry;
pub mod snapshot;
pub mod state;
pub mod webdav;
pub mod xml;
