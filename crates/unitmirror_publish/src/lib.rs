//! # unitmirror publish
//!
//! Upstream side of a unitmirror deployment.
//!
//! This crate provides:
//! - [`Publisher`], which writes a repository as a manifest plus a
//!   content-addressable tree
//! - A shared object pool so identical bytes from different repositories
//!   occupy one file
//! - [`Publisher::consumer_payload`], the source description a downstream
//!   binding is created from
//!
//! # Layout
//!
//! The published tree is transport agnostic: serve the destination root
//! over HTTP(S) with any static file server, or point consumers at it with a
//! `file://` URL.
//!
//! ```rust,ignore
//! use unitmirror_publish::{PublishConfig, Publisher};
//!
//! let config = PublishConfig::new("/srv/pub").with_base_url("https://mirror.example.com/pub/");
//! let publisher = Publisher::new(config)?;
//! publisher.publish(&units, "base")?;
//! let source = publisher.consumer_payload("base")?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
// Production code MUST NOT use panic!/unwrap()/expect()
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod config;
mod error;
mod publisher;

pub use config::{LinkMode, PublishConfig};
pub use error::{PublishError, PublishResult};
pub use publisher::{PublishReport, Publisher, POOL_DIR};
