//! # fleet-id
//!
//! Identifier types used by the group controller.
//!
//! ## Design Principles
//!
//! - IDs are opaque: the controller never interprets their contents
//! - Each kind of ID is its own type so a group ID can't be passed where an
//!   instance ID is expected
//! - Instance IDs are assigned by the instance plugin; logical IDs and group
//!   IDs are chosen by the caller
//!
//! ## ID Kinds
//!
//! - `GroupId`: caller-declared identity of a group (`workers`, `managers`)
//! - `InstanceId`: provisioner-assigned handle of one machine (`i-0abc12`)
//! - `LogicalId`: stable caller-meaningful identity of a quorum member,
//!   typically an IP address (`192.168.0.4`)

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;
