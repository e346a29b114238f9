//! taskmine-core: Core library for taskmine
//!
//! This crate captures user interactions on a document, turns them into
//! structured, privacy-filtered event records, and appends them to a
//! durable local log.
//!
//! # Architecture
//!
//! ```text
//! DOM activity → Locator + Normalizer → Debouncer (input, scroll)
//!                                           ↓
//!                                   Delivery Channel
//!                                           ↓
//!                       Relay → Durable Store → change notice
//! ```
//!
//! The observation context ([`agent`]) and the persistence context
//! ([`relay`]) share nothing but the delivery channel.
//!
//! # Modules
//!
//! - `dom`: Element and page capability interface, in-memory document
//! - `locator`: CSS-path and XPath derivation
//! - `element`: Element descriptors and field identity
//! - `record`: Event records, kinds and payloads
//! - `normalize`: Raw interaction to event record
//! - `digest`: One-way value digests
//! - `debounce`: Keyed trailing-edge debounce
//! - `channel`: Best-effort delivery channel
//! - `store`: Schema-versioned SQLite event log
//! - `relay`: Channel-to-store persistence loop
//! - `agent`: Capture handlers and heartbeat
//! - `config`: Configuration management
//! - `logging`: Structured logging setup
//! - `error`: Error types with remediation hints
//!
//! # Safety
//!
//! This crate forbids unsafe code.

#![forbid(unsafe_code)]

pub mod agent;
pub mod channel;
pub mod config;
pub mod debounce;
pub mod digest;
pub mod dom;
pub mod element;
pub mod error;
pub mod locator;
pub mod logging;
pub mod normalize;
pub mod record;
pub mod relay;
pub mod store;

pub use error::{ConfigError, Error, Result, StorageError};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
