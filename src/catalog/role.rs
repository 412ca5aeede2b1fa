//! Role definitions and role references

use bson::{doc, Document};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::Privilege;
use crate::error::Result;

/// A role name qualified by the database it is defined in
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedRole {
    pub role: String,
    pub db: String,
}

impl QualifiedRole {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

impl fmt::Display for QualifiedRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.role, self.db)
    }
}

/// Reference to a role from a user or another role.
///
/// A bare name resolves within the database the command runs against.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(untagged)]
pub enum RoleRef {
    Named(String),
    Scoped(QualifiedRole),
}

impl RoleRef {
    pub fn named(role: impl Into<String>) -> Self {
        RoleRef::Named(role.into())
    }

    pub fn scoped(role: impl Into<String>, db: impl Into<String>) -> Self {
        RoleRef::Scoped(QualifiedRole::new(role, db))
    }

    /// Resolve against the database the command is issued in
    pub fn resolve(&self, current_db: &str) -> QualifiedRole {
        match self {
            RoleRef::Named(role) => QualifiedRole::new(role.clone(), current_db),
            RoleRef::Scoped(q) => q.clone(),
        }
    }
}

/// A custom role to create
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoleSpec {
    pub role: String,
    #[serde(default)]
    pub privileges: Vec<Privilege>,
    /// Inherited roles
    #[serde(default)]
    pub roles: Vec<RoleRef>,
}

impl RoleSpec {
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            privileges: Vec::new(),
            roles: Vec::new(),
        }
    }

    pub fn with_privilege(mut self, privilege: Privilege) -> Self {
        self.privileges.push(privilege);
        self
    }

    pub fn inherits(mut self, role: RoleRef) -> Self {
        self.roles.push(role);
        self
    }

    /// The `createRole` command document
    pub fn to_command(&self) -> Result<Document> {
        Ok(doc! {
            "createRole": self.role.as_str(),
            "privileges": bson::to_bson(&self.privileges)?,
            "roles": bson::to_bson(&self.roles)?,
        })
    }
}
