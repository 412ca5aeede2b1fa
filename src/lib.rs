//! reportdb-provision - MongoDB roles and user for the report service
//!
//! Creates two find-only roles over the `FaceID` collections the report
//! service reads, and the `reportuser` account holding them plus
//! `readWrite` on the report database.
//!
//! ## Modules
//!
//! - **catalog**: typed roles, privileges and users
//! - **plan**: the ordered list of roles and users to create
//! - **admin**: the admin command seam (MongoDB driver or in-memory catalog)
//! - **provisioner**: runs a plan, one command at a time
//! - **verify**: checks server state against a plan

pub mod admin;
pub mod catalog;
pub mod config;
pub mod error;
pub mod plan;
pub mod provisioner;
pub mod verify;

pub use config::Args;
pub use error::{ProvisionError, Result};
pub use plan::ProvisionPlan;
pub use provisioner::{ProvisionReport, Provisioner};
