//! # dockwatch-types
//!
//! Value types published by the dockwatch container monitor. A presentation
//! layer (panel indicator, TUI, web page) depends only on this crate: it
//! receives a [`StatusSnapshot`] per poll cycle and renders it.
//!
//! ## Features
//!
//! - `serde`: serialization of all types via serde
//!
//! ## Example
//!
//! ```rust
//! use dockwatch_types::{ContainerState, StatusSnapshot};
//!
//! let snapshot = StatusSnapshot::builder()
//!     .item("traefik", ContainerState::Running, "running")
//!     .item("grafana", ContainerState::NotFound, "")
//!     .build();
//!
//! for item in snapshot.items() {
//!     println!("{}  -  {}", item.name, item.status_text());
//! }
//! assert!(!snapshot.aggregate_healthy());
//! ```

mod error;
mod snapshot;
mod status;

pub use error::*;
pub use snapshot::*;
pub use status::*;

/// Format version stamped into every [`StatusSnapshot`].
///
/// File and `--json` consumers compare it before reading a snapshot; bump it
/// when a field changes meaning or disappears.
pub const SCHEMA_VERSION: u32 = 1;
