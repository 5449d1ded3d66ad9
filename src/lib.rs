//! # dockwatch
//!
//! A container status monitoring engine.
//!
//! dockwatch periodically lists containers through the docker CLI, reconciles
//! the listing against a user-maintained watch list and publishes an
//! immutable [`StatusSnapshot`] per poll: one [`ContainerStatus`] per watched
//! name plus an aggregate health flag. The watch list and poll interval can
//! be edited at any time, through the API or by editing the settings file,
//! without restarting the engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                          PollScheduler                           │
//! │   tick ──▶ ┌─────────┐    ┌────────┐    ┌───────────┐            │
//! │            │ invoker │───▶│ parser │───▶│ reconcile │──▶ sink ──▶│ consumer
//! │            └─────────┘    └────────┘    └─────▲─────┘            │
//! │                                               │ watch list       │
//! │   ConfigEvent ◀── ┌───────────────┐ ──────────┘                  │
//! │                   │ ConfigManager │ ◀──▶ SettingsStore            │
//! │                   └───────────────┘                              │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - **[`invoker`]**: runs the status command ([`ProcessInvoker`] trait,
//!   [`CommandInvoker`] on `tokio::process`)
//! - **[`parser`]**: tolerant tab-separated listing parser
//! - **[`reconcile`]**: watch list + listing → [`StatusSnapshot`]
//! - **[`config`]**: [`ConfigManager`], the owner of interval and watch list
//! - **[`store`]**: settings persistence ([`MemorySettings`], [`JsonFileSettings`])
//! - **[`scheduler`]**: the poll loop ([`PollScheduler`])
//! - **[`output`]**: where snapshots go ([`SnapshotSink`])
//! - **[`import`]**: add every container the runtime knows to the watch list
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use dockwatch::{ConfigManager, JsonFileSettings, PollScheduler, SnapshotSink};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(JsonFileSettings::open("dockwatch.json").unwrap());
//! let config = Arc::new(ConfigManager::load(store).unwrap());
//! config.add_container("traefik").unwrap();
//!
//! let (sink, mut rx) = SnapshotSink::channel(16);
//! let handle = PollScheduler::builder(config, sink).build().start();
//!
//! while let Some(snapshot) = rx.recv().await {
//!     for item in snapshot.items() {
//!         println!("{} {}", item.state.symbol(), item.name);
//!     }
//! }
//! handle.stop().await;
//! # });
//! ```

pub mod config;
pub mod import;
pub mod invoker;
pub mod output;
pub mod parser;
pub mod reconcile;
pub mod scheduler;
pub mod settings;
pub mod store;

// Re-export main types for convenience
pub use crate::config::{ConfigError, ConfigEvent, ConfigManager, MonitorConfig};
pub use import::{import_from_runtime, ImportError};
pub use invoker::{CommandInvoker, CommandSpec, InvokeError, ProcessInvoker, RawOutput};
pub use output::SnapshotSink;
pub use scheduler::{poll_once, PollScheduler, SchedulerHandle, SchedulerState};
pub use settings::AppSettings;
pub use store::{JsonFileSettings, MemorySettings, SettingsStore, StoreError};

pub use dockwatch_types::{
    ContainerState, ContainerStatus, ErrorInfo, ErrorKind, StatusSnapshot,
};
