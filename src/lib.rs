//! Resock workbench - main library
//!
//! Hosts the `resock` connection library plus what the binaries around it
//! share.
//!
//! ## Architecture
//!
//! - **resock**: resilient WebSocket connection (re-exported from workspace)
//! - **bin_common**: config loading, logging setup and the runner trait
//!
//! ## Usage in Binaries
//!
//! ```rust,ignore
//! use resock_workbench::bin_common::{load_config_from_env, ConfigType, ProbeConfig};
//! use resock_workbench::resock::Connection;
//! ```

// Re-export workspace libraries for convenience
pub use resock;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables
    //!
    //! Provides the shared config, logging and lifecycle plumbing of the
    //! binaries.

    pub mod cli;
    pub mod config;
    pub mod logging;
    pub mod runner;

    pub use cli::{load_config_from_env, parse_args, ConfigType};
    pub use config::{ConfigError, ProbeConfig};
    pub use logging::init_tracing;
    pub use runner::{BinaryRunner, RunConfig};
}
