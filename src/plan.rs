//! Provisioning plan
//!
//! An ordered list of roles followed by users. Roles are always created
//! before users so role references resolve; nothing else is checked before
//! the commands reach the server.

use bson::Document;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::catalog::{Credential, Privilege, RoleRef, RoleSpec, UserSpec};
use crate::error::{ProvisionError, Result};

pub const FACE_DB: &str = "FaceID";
pub const BODY_FACE_NAME_COLLECTION: &str = "BodyFaceName";
pub const STAFFS_COLLECTION: &str = "staffs";
pub const REPORT_DB: &str = "TestReportService";

pub const READ_BODY_FACE_NAME_ROLE: &str = "readBodyFaceName";
pub const READ_STAFFS_ROLE: &str = "readStaffs";
pub const READ_WRITE_ROLE: &str = "readWrite";

pub const REPORT_USER: &str = "reportuser";

/// Password the report service deployment has always shipped with.
/// Override it with `--user-password` or `--user-password-file`.
pub const LEGACY_REPORT_PASSWORD: &str = "reportpassword";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct ProvisionPlan {
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
}

impl ProvisionPlan {
    /// Roles and user for the report service: find-only access to two
    /// `FaceID` collections plus read/write on the report database.
    pub fn report_service() -> Self {
        Self {
            roles: vec![
                RoleSpec::new(READ_BODY_FACE_NAME_ROLE)
                    .with_privilege(Privilege::find_on(FACE_DB, BODY_FACE_NAME_COLLECTION)),
                RoleSpec::new(READ_STAFFS_ROLE)
                    .with_privilege(Privilege::find_on(FACE_DB, STAFFS_COLLECTION)),
            ],
            users: vec![UserSpec::new(REPORT_USER, Credential::new(LEGACY_REPORT_PASSWORD))
                .with_role(RoleRef::named(READ_BODY_FACE_NAME_ROLE))
                .with_role(RoleRef::named(READ_STAFFS_ROLE))
                .with_role(RoleRef::scoped(READ_WRITE_ROLE, REPORT_DB))],
        }
    }

    /// Load a plan from a JSON file shaped like
    /// `{"roles": [{"role", "privileges", "roles"}], "users": [{"user", "pwd", "roles"}]}`.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let plan: ProvisionPlan = serde_json::from_str(&raw)
            .map_err(|e| ProvisionError::Plan(format!("{}: {}", path.display(), e)))?;

        if plan.roles.is_empty() && plan.users.is_empty() {
            return Err(ProvisionError::Plan(format!(
                "{}: no roles or users defined",
                path.display()
            )));
        }

        Ok(plan)
    }

    /// Replace every user's password
    pub fn override_credentials(&mut self, credential: &Credential) {
        for user in &mut self.users {
            user.pwd = credential.clone();
        }
    }

    /// Users still carrying the built-in password
    pub fn users_with_legacy_password(&self) -> Vec<&str> {
        self.users
            .iter()
            .filter(|u| u.pwd.expose() == LEGACY_REPORT_PASSWORD)
            .map(|u| u.user.as_str())
            .collect()
    }

    /// Fail if any user has no password to send
    pub fn ensure_credentials(&self) -> Result<()> {
        match self.users.iter().find(|u| u.pwd.is_empty()) {
            Some(user) => Err(ProvisionError::Credential(format!(
                "no password for user '{}' (set --user-password or --user-password-file)",
                user.user
            ))),
            None => Ok(()),
        }
    }

    /// The command documents in execution order, passwords redacted
    pub fn redacted_commands(&self) -> Result<Vec<Document>> {
        let mut commands = Vec::with_capacity(self.roles.len() + self.users.len());
        for role in &self.roles {
            commands.push(role.to_command()?);
        }
        for user in &self.users {
            let mut cmd = user.to_command()?;
            cmd.insert("pwd", "<redacted>");
            commands.push(cmd);
        }
        Ok(commands)
    }

    pub fn role(&self, name: &str) -> Option<&RoleSpec> {
        self.roles.iter().find(|r| r.role == name)
    }

    pub fn user(&self, name: &str) -> Option<&UserSpec> {
        self.users.iter().find(|u| u.user == name)
    }
}
