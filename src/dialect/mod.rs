//! Dialect detection and capabilities
//!
//! - [`probe`]: best-effort scalar probes of server variables
//! - [`version`]: version comment parsing
//! - [`identity`]: product variant classification
//! - [`capabilities`]: per-connection capability flags
//! - [`registry`]: priority-ordered dialect candidates
//! - [`database`]: the opened OceanBase dialect

pub mod capabilities;
pub mod database;
pub mod identity;
pub mod probe;
pub mod quoting;
pub mod registry;
pub mod version;

pub use capabilities::DialectCapabilities;
pub use database::OceanBaseDatabase;
pub use identity::{identify_variant, is_target_variant, DialectIdentity, Variant};
pub use registry::{DialectCandidate, DialectRegistry, DEFAULT_REGISTRY};
pub use version::{resolve_version, ResolvedVersion};
