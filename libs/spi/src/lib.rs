//! # fleet-spi
//!
//! Contracts between the group controller and its collaborators.
//!
//! The controller never provisions machines or judges their health itself.
//! It drives two kinds of plugins, resolved by name:
//!
//! - `InstancePlugin`: provisions, destroys and lists machines by tag
//! - `FlavorPlugin`: shapes the provisioning request for a workload and
//!   reports whether a running machine is healthy
//!
//! Two development plugins are included: `MemoryInstancePlugin`, an
//! in-process instance store, and `VanillaFlavor`, which injects an init
//! script and tags and reports every instance healthy.

mod error;
mod flavor;
mod instance;
mod lookup;
mod memory;
mod types;

pub use error::{AllocationError, PluginError};
pub use flavor::{FlavorPlugin, VanillaFlavor};
pub use instance::InstancePlugin;
pub use lookup::{PluginLookup, StaticPlugins};
pub use memory::MemoryInstancePlugin;
pub use types::*;

/// Result type for plugin calls.
pub type PluginResult<T> = Result<T, PluginError>;
