//! Fleet group controller.
//!
//! Keeps groups of instances at their declared size and configuration by
//! driving external instance and flavor plugins.
//!
//! ## Architecture
//!
//! ```text
//! GroupPlugin (registry)
//! └── GroupContext(id)
//!     ├── Supervisor     (ScalingGroup or Quorum loop task)
//!     ├── Scaled         (plugin binding + current settings)
//!     └── UpdatePlan     (at most one in flight)
//! ```
//!
//! ## Modules
//!
//! - `registry`: watch/unwatch/inspect/update/destroy operations
//! - `settings`: spec parsing, validation, config hash and tags
//! - `scaled`: best-effort create/destroy/health against the plugins
//! - `scaler`, `quorum`: the two supervisor kinds
//! - `rolling`, `plan`: health-gated rolling updates and update plans

pub mod config;
pub mod error;
pub mod plan;
pub mod quorum;
pub mod registry;
pub mod rolling;
pub mod scaled;
pub mod scaler;
pub mod settings;
pub mod supervisor;

pub use error::{GroupError, GroupResult, UpdateError};
pub use plan::UpdatePlan;
pub use registry::GroupPlugin;
pub use settings::{GroupProperties, GroupSettings};
pub use supervisor::{Supervisor, TickStats};
