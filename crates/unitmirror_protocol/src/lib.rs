//! # unitmirror protocol
//!
//! Data model shared by the publisher, the sync engine and their callers.
//!
//! This crate provides:
//! - [`ContentUnit`] and [`UnitIdentity`] for published content
//! - [`Fingerprint`], the content digest used as the storage key
//! - [`Manifest`], the `units.json` document a repository is published as
//! - [`Binding`] and [`MirrorSource`], describing what a downstream mirrors
//! - [`SyncResult`] and [`ReconciliationReport`], the serializable reports
//!
//! This is a pure data crate. The only I/O it performs is hashing a reader
//! when computing a fingerprint.
//!
//! ## Wire Compatibility
//!
//! Manifests must stay readable across publisher versions: unknown fields on
//! entries are ignored when parsing, and map keys are always written sorted
//! so that the same unit set always produces the same bytes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod binding;
mod error;
mod fingerprint;
mod manifest;
mod report;
mod unit;

pub use binding::{validate_repo_id, Binding, MirrorSource, Protocol, ReconcileOptions};
pub use error::{ProtocolError, ProtocolResult};
pub use fingerprint::{Fingerprint, FingerprintHasher, FINGERPRINT_HEX_LEN};
pub use manifest::{content_path, Manifest, ManifestEntry, CONTENT_DIR, MANIFEST_FILENAME};
pub use report::{MergeReport, ReconciliationReport, SyncResult, UnitError};
pub use unit::{ContentUnit, KeyScalar, Metadata, UnitIdentity, UnitKey};
