//! User definitions

use bson::{doc, Document};
use serde::{Deserialize, Serialize};

use crate::catalog::{Credential, QualifiedRole, RoleRef};
use crate::error::Result;

/// A user to create
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserSpec {
    pub user: String,

    /// Empty when the plan expects the password from configuration
    #[serde(default)]
    pub pwd: Credential,

    pub roles: Vec<RoleRef>,
}

impl UserSpec {
    pub fn new(user: impl Into<String>, pwd: Credential) -> Self {
        Self {
            user: user.into(),
            pwd,
            roles: Vec::new(),
        }
    }

    pub fn with_role(mut self, role: RoleRef) -> Self {
        self.roles.push(role);
        self
    }

    /// Role references resolved against the database the user is created in
    pub fn resolved_roles(&self, current_db: &str) -> Vec<QualifiedRole> {
        let mut roles: Vec<QualifiedRole> =
            self.roles.iter().map(|r| r.resolve(current_db)).collect();
        roles.sort();
        roles.dedup();
        roles
    }

    /// The `createUser` command document. Carries the cleartext password.
    pub fn to_command(&self) -> Result<Document> {
        Ok(doc! {
            "createUser": self.user.as_str(),
            "pwd": self.pwd.expose(),
            "roles": bson::to_bson(&self.roles)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report_user() -> UserSpec {
        UserSpec::new("reportuser", Credential::new("reportpassword"))
            .with_role(RoleRef::named("readBodyFaceName"))
            .with_role(RoleRef::named("readStaffs"))
            .with_role(RoleRef::scoped("readWrite", "TestReportService"))
    }

    #[test]
    fn test_create_user_command() {
        let cmd = report_user().to_command().unwrap();
        assert_eq!(
            cmd,
            doc! {
                "createUser": "reportuser",
                "pwd": "reportpassword",
                "roles": [
                    "readBodyFaceName",
                    "readStaffs",
                    { "role": "readWrite", "db": "TestReportService" },
                ],
            }
        );
    }

    #[test]
    fn test_resolved_roles_are_qualified_and_sorted() {
        let roles = report_user().resolved_roles("admin");
        assert_eq!(
            roles,
            vec![
                QualifiedRole::new("readBodyFaceName", "admin"),
                QualifiedRole::new("readStaffs", "admin"),
                QualifiedRole::new("readWrite", "TestReportService"),
            ]
        );
    }

    #[test]
    fn test_missing_pwd_deserializes_empty() {
        let spec: UserSpec = serde_json::from_str(r#"{"user": "u", "roles": ["read"]}"#).unwrap();
        assert!(spec.pwd.is_empty());
    }
}
