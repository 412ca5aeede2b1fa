//! Typed user-management definitions
//!
//! Roles, privileges and users as the admin commands `createRole` and
//! `createUser` accept them, and as `rolesInfo` / `usersInfo` return them.

mod credential;
mod info;
mod privilege;
mod role;
mod user;

pub use credential::Credential;
pub use info::{RoleInfo, UserInfo};
pub use privilege::{same_grants, Privilege, Resource, ACTION_FIND};
pub use role::{QualifiedRole, RoleRef, RoleSpec};
pub use user::UserSpec;
