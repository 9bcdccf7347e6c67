//! repostat - Git Repository Status Aggregator
//!
//! repostat finds every git repository below a directory, locally or on a remote
//! host over SSH, and reports branch, upstream divergence and working-tree
//! changes in one aligned table. Repositories that are cleanly behind their
//! upstream can be rebase-pulled automatically.
//!
//! ## Core Features
//!
//! - **Pluggable Transport**: Local shell or SSH behind one [`Transport`] trait
//! - **One Round Trip**: Four git queries batched per repository
//! - **Conservative Auto-Sync**: Only clean, strictly-behind repositories are touched
//! - **Bounded Parallelism**: Status and sync work run with a concurrency limit
//!
//! ## Modules
//!
//! - [`config`]: Configuration management and parsing
//! - [`transport`]: Local and SSH command execution
//! - [`discovery`]: Repository enumeration
//! - [`status`]: Batched status collection and parsing
//! - [`sync`]: Auto-sync decision and execution
//! - [`report`]: Table and JSON rendering

pub mod config;
pub mod discovery;
pub mod error;
pub mod report;
pub mod status;
pub mod sync;
pub mod transport;

pub use config::Config;
pub use discovery::Discoverer;
pub use error::TransportError;
pub use report::{render_json, render_table, AnsiPalette, Category, Palette, PlainPalette, ReportContext, Summary};
pub use status::{RepositoryStatus, StatusCollector};
pub use sync::{should_sync, SyncOutcome, SyncSummary, Syncer};
pub use transport::{LocalTransport, SshTransport, Transport, TransportTarget};
