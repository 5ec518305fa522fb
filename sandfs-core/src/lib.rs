//! # sandfs-core - Sandboxed filesystem operations
//!
//! `sandfs-core` is the engine behind the `sandfs` stdio service. It exposes
//! a fixed catalog of structured filesystem operations - listing, tree
//! assembly, glob file search, content search, partial reads, metadata,
//! checksums, atomic writes, and unified-diff patching - every one of them
//! confined to a set of operator-configured allowed roots.
//!
//! ## Highlights
//!
//! - **Path safety**: lexical normalization, manual symlink resolution with a
//!   depth cap, and post-resolution containment checks defeat `..` traversal,
//!   symlink escapes, and create-a-link-then-write attacks.
//! - **Bounded traversal**: a breadth-first walker with glob, gitignore, and
//!   hidden-file filters, scan caps, and per-entry cancellation checks.
//! - **Safe content search**: literal and regex matchers (ReDoS-screened,
//!   compiled onto a linear-time engine), line scanning with context windows,
//!   and a warm pool of scan workers with per-request cancellation.
//! - **Cancellable I/O**: one composed signal (caller abort + deadline) is
//!   threaded through every await point; readers observe it per chunk, the
//!   walker per entry, scanners per line.
//! - **Atomic writes**: sibling temp file, fsync, rename; no truncated target
//!   is ever observable and temp files never outlive a failure.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use sandfs_core::ops::{FsService, ListRequest, SortBy};
//! use sandfs_core::roots::RootSet;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let roots = RootSet::resolve(&["/srv/sandbox".into()], false)?;
//!     let service = FsService::new(roots);
//!
//!     let listing = service
//!         .list(
//!             ListRequest {
//!                 path: "/srv/sandbox".into(),
//!                 include_hidden: false,
//!                 sort_by: SortBy::Name,
//!                 with_stats: false,
//!                 max_entries: None,
//!                 timeout_ms: None,
//!             },
//!             None,
//!         )
//!         .await?;
//!     println!("{} entries", listing.entries.len());
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cancel;
pub mod config;
pub mod error;
pub mod io;
pub mod mime;
pub mod ops;
pub mod patch;
pub mod path;
pub mod roots;
pub mod search;
pub mod walk;

pub use error::{ErrorCode, ErrorEnvelope, ServiceError, ServiceResult};
pub use ops::FsService;
