//! # TenantDB Testkit
//!
//! Test utilities for TenantDB.
//!
//! This crate provides:
//! - Entity builders, seeded stores and file-backed registries
//! - Servers on an ephemeral port and loopback clients
//! - Property-based test generators using proptest
//! - A reference model that checks any `EntityDatabase` against a random
//!   operation sequence
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tenantdb_testkit::prelude::*;
//!
//! #[test]
//! fn remote_round_trip() {
//!     let server = TestServer::start();
//!     let mut client = server.client("test");
//!     // ... test operations
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod model;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::model::*;
}

pub use fixtures::*;
pub use generators::*;
pub use model::*;
