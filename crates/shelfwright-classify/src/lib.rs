//! Category resolution for shelfwright.
//!
//! Two strategies, selected once per run: a deterministic extension matcher
//! against a caller-supplied tree (manual mode), or an external
//! classification oracle consumed over HTTP (automatic mode). Oracle
//! responses are validated and depth-clamped at the boundary, cached per
//! file signature, and never allowed to abort a run.

mod oracle;
mod resolver;

pub use oracle::{HttpOracle, Oracle};
pub use resolver::{Resolution, Resolver};

// Re-export core types
pub use shelfwright_core::{CategoryPath, CategoryTree, FileSignature, OracleError};
