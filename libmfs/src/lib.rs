//! MooseFS volume management for storage drivers.
//!
//! Maps volume ids onto directories of a mounted MooseFS namespace, keeps
//! their size in check through the MooseFS quota tools, takes snapshots,
//! and reconciles the client mount and the bind mounts built on it.

pub mod config;
pub mod error;
pub mod exec;
pub mod handler;
pub mod logging;
pub mod mount;
pub mod paths;
pub mod quota;

pub use config::{MfsConfig, Replica};
pub use error::{MfsError, QuotaParseError, Result};
pub use handler::MfsHandler;
pub use mount::{MountState, Mounter};
pub use paths::MfsPaths;
pub use quota::QuotaLimit;
