//! Common test infrastructure
//!
//! Builds synthetic dump directories and a fully wired job context on top of
//! temporary databases. Tests should only import from this module.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{DumpSet, TestEnv};
//!
//! #[test]
//! fn test_import() {
//!     let env = TestEnv::new();
//!     DumpSet::new("20250101").artist(1, "One").write(env.dump_dir());
//!     let outcome = env.run("2025-01").unwrap();
//! }
//! ```

mod env;
mod fixtures;

pub use env::TestEnv;
pub use fixtures::{CancelOnRead, DumpSet, ReleaseFixture};
