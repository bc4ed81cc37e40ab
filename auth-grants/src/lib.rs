//! Wildcard grant store and permission checker
//!
//! A flat relationship-based access-control engine: callers ask whether a
//! subject has a relation on an entity, and the answer comes from stored
//! grants, any field of which may be a wildcard and any of which may expire.
//!
//! # Core Concepts
//!
//! - **Grant**: a stored `(subject, relation, entity)` triple with an optional expiry
//! - **Wildcard**: a grant field that matches any concrete value in its position
//! - **Live grant**: a grant with no expiry or an expiry still in the future
//! - **Pattern**: one of the seven wildcard combinations that could authorize a check
//!
//! # Example
//!
//! ```rust
//! use auth_grants::{GrantEngine, GrantField, NewGrant};
//! use auth_grants::repository::InMemoryGrantStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = GrantEngine::new(Arc::new(InMemoryGrantStore::new()));
//!
//!     // Every subject may edit doc1
//!     engine
//!         .create(NewGrant::new(
//!             GrantField::Wildcard,
//!             GrantField::concrete("editor")?,
//!             GrantField::concrete("doc1")?,
//!         ))
//!         .await?;
//!
//!     assert!(engine.is_allowed("bob", "editor", "doc1").await?);
//!     assert!(!engine.is_allowed("bob", "viewer", "doc1").await?);
//!     Ok(())
//! }
//! ```

pub mod check;
pub mod clock;
pub mod engine;
pub mod error;
pub mod expand;
pub mod models;
pub mod mutate;
pub mod reaper;
pub mod repository;
pub mod schema;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::*;
pub use error::*;
pub use models::*;
pub use reaper::{ExpiryReaper, ReaperFailurePolicy, DEFAULT_REAPER_INTERVAL};
