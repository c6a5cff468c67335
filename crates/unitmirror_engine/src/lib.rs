//! # unitmirror engine
//!
//! Downstream half of the mirror: fetches what an upstream publisher
//! exposes and keeps local mirrors converged with a desired binding set.
//!
//! This crate provides:
//! - [`Transport`] implementations for `file://`, `http://` and `https://`
//! - The manifest differ ([`diff`], [`metadata_drift`])
//! - [`LocalMirrors`], the persisted per-repository state and shared store
//! - [`SyncCoordinator`], which syncs one repository against its manifest
//! - [`BindReconciler`], which creates, refreshes and removes mirrors
//!
//! ## Failure Containment
//!
//! Nothing escapes the coordinator or the reconciler as an error:
//!
//! - A failed content object is recorded in the repository's `SyncResult`
//!   and the sync continues
//! - A failed manifest aborts that repository's sync only
//! - A failed create or delete of local state is recorded in the
//!   `ReconciliationReport` and the pass continues with other repositories
//!
//! ## Key Invariants
//!
//! - Content is only committed after its digest matches the manifest
//! - A shared object is deleted only when no mirror references it
//! - Two syncs of the same repository never run concurrently

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod coordinator;
mod diff;
mod error;
mod http;
mod mirror;
mod pool;
mod reconciler;
mod transport;

pub use config::{EngineConfig, RetryConfig};
pub use coordinator::SyncCoordinator;
pub use diff::{diff, metadata_drift, ManifestDiff};
pub use error::{EngineResult, ErrorKind, SyncError};
pub use http::{HttpClient, HttpError, HttpTransport, ReqwestClient};
pub use mirror::{
    InspectReport, LocalMirrors, MirrorLock, MirrorSummary, MirroredUnit, RepositoryMirror,
    VerifyReport, LOCAL_CONTENT_DIR, LOCKS_DIR, MIRRORS_DIR, MIRROR_STATE_FILE,
};
pub use pool::run_bounded;
pub use reconciler::BindReconciler;
pub use transport::{
    parse_location, repo_base, resolve, FileTransport, MockTransport, SchemeTransport, Transport,
};
