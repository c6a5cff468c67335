//! # unitmirror testkit
//!
//! Test utilities for unitmirror.
//!
//! This crate provides:
//! - [`TestUpstream`], a temporary publisher with helpers to write and
//!   publish units and to bind consumers to them
//! - [`TestDownstream`], a temporary local root for mirrors
//! - Property-based generators for unit keys, identities and unit sets
//!
//! ## Usage
//!
//! ```rust,ignore
//! use unitmirror_testkit::prelude::*;
//!
//! #[test]
//! fn mirrors_published_units() {
//!     let upstream = TestUpstream::new();
//!     upstream.publish_named("base", &["a", "b"]);
//!     let binding = upstream.binding("base");
//!     // ... reconcile against a TestDownstream root
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
