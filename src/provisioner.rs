//! Plan execution
//!
//! Issues the admin commands of a [`ProvisionPlan`] one at a time, roles
//! first, then users, then lists the users for confirmation. The first
//! failure stops the run; commands already applied stay applied.

use bson::{doc, Bson, Document};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use crate::admin::AdminCommands;
use crate::catalog::{Privilege, QualifiedRole, RoleInfo, RoleSpec, UserInfo, UserSpec};
use crate::error::{ProvisionError, Result, Step};
use crate::plan::ProvisionPlan;

/// Outcome of a successful run
#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub database: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub roles_created: Vec<String>,
    pub users_created: Vec<String>,
    /// `usersInfo` output after provisioning, as relaxed extended JSON
    pub users: Vec<serde_json::Value>,
}

pub struct Provisioner<A> {
    admin: A,
}

impl<A: AdminCommands> Provisioner<A> {
    pub fn new(admin: A) -> Self {
        Self { admin }
    }

    pub fn admin(&self) -> &A {
        &self.admin
    }

    /// `createRole`
    pub async fn create_role(&self, spec: &RoleSpec) -> Result<()> {
        let db = self.admin.database();
        let step = Step::CreateRole { role: &spec.role, db };

        match self.admin.run_command(spec.to_command()?).await {
            Ok(_) => {
                info!(
                    role = %spec.role,
                    db = %db,
                    privileges = spec.privileges.len(),
                    "Role created"
                );
                Ok(())
            }
            Err(e) => {
                let e = e.in_step(step);
                error!(role = %spec.role, db = %db, "createRole failed: {}", e);
                Err(e)
            }
        }
    }

    /// `createUser`
    pub async fn create_user(&self, spec: &UserSpec) -> Result<()> {
        let db = self.admin.database();
        let step = Step::CreateUser { user: &spec.user, db };
        let roles: Vec<String> = spec.resolved_roles(db).iter().map(ToString::to_string).collect();

        match self.admin.run_command(spec.to_command()?).await {
            Ok(_) => {
                info!(user = %spec.user, db = %db, roles = ?roles, "User created");
                Ok(())
            }
            Err(e) => {
                let e = e.in_step(step);
                error!(user = %spec.user, db = %db, "createUser failed: {}", e);
                Err(e)
            }
        }
    }

    /// `getUsers`: raw user documents of the admin database
    pub async fn get_users(&self) -> Result<Vec<Document>> {
        let reply = self.query(doc! { "usersInfo": 1 }).await?;
        documents(&reply, "users")
    }

    /// One user, if it exists
    pub async fn user_info(&self, user: &str) -> Result<Option<UserInfo>> {
        let reply = self
            .query(doc! {
                "usersInfo": { "user": user, "db": self.admin.database() },
                "showPrivileges": true,
            })
            .await?;
        first_entry(&reply, "users")
    }

    /// One role with its privileges, if it exists
    pub async fn role_info(&self, role: &QualifiedRole) -> Result<Option<RoleInfo>> {
        let reply = self
            .query(doc! {
                "rolesInfo": { "role": role.role.as_str(), "db": role.db.as_str() },
                "showPrivileges": true,
            })
            .await?;
        first_entry(&reply, "roles")
    }

    /// Everything `user` may do through its roles, merged per resource
    pub async fn effective_privileges(&self, user: &str) -> Result<Vec<Privilege>> {
        match self.user_info(user).await? {
            Some(info) => Ok(info.inherited_privileges),
            None => Err(ProvisionError::UserNotFound(format!(
                "{}@{}",
                user,
                self.admin.database()
            ))),
        }
    }

    /// Run the whole plan in order, stopping at the first failure
    pub async fn apply(&self, plan: &ProvisionPlan) -> Result<ProvisionReport> {
        let started_at = Utc::now();
        info!(
            db = %self.admin.database(),
            roles = plan.roles.len(),
            users = plan.users.len(),
            "Applying provisioning plan"
        );

        let mut roles_created = Vec::with_capacity(plan.roles.len());
        for role in &plan.roles {
            self.create_role(role).await?;
            roles_created.push(role.role.clone());
        }

        let mut users_created = Vec::with_capacity(plan.users.len());
        for user in &plan.users {
            self.create_user(user).await?;
            users_created.push(user.user.clone());
        }

        let users = self
            .get_users()
            .await?
            .into_iter()
            .map(|d| Bson::Document(d).into_relaxed_extjson())
            .collect();

        Ok(ProvisionReport {
            database: self.admin.database().to_string(),
            started_at,
            finished_at: Utc::now(),
            roles_created,
            users_created,
            users,
        })
    }

    async fn query(&self, command: Document) -> Result<Document> {
        self.admin
            .run_command(command)
            .await
            .map_err(|e| e.in_step(Step::Query))
    }
}

fn documents(reply: &Document, field: &str) -> Result<Vec<Document>> {
    reply
        .get_array(field)?
        .iter()
        .map(|entry| match entry {
            Bson::Document(d) => Ok(d.clone()),
            other => Err(ProvisionError::Serialization(format!(
                "expected document in '{}', got {:?}",
                field,
                other.element_type()
            ))),
        })
        .collect()
}

fn first_entry<T: serde::de::DeserializeOwned>(reply: &Document, field: &str) -> Result<Option<T>> {
    match documents(reply, field)?.into_iter().next() {
        Some(d) => Ok(Some(bson::from_document(d)?)),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::InMemoryAdmin;
    use crate::catalog::{Credential, Resource, RoleRef};

    #[tokio::test]
    async fn test_apply_report_service_plan() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let report = provisioner
            .apply(&ProvisionPlan::report_service())
            .await
            .unwrap();

        assert_eq!(report.database, "admin");
        assert_eq!(report.roles_created, vec!["readBodyFaceName", "readStaffs"]);
        assert_eq!(report.users_created, vec!["reportuser"]);
        assert_eq!(report.users.len(), 1);
        assert_eq!(report.users[0]["user"], "reportuser");
        assert!(report.finished_at >= report.started_at);
    }

    #[tokio::test]
    async fn test_commands_issued_in_order() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        provisioner
            .apply(&ProvisionPlan::report_service())
            .await
            .unwrap();

        assert_eq!(
            provisioner.admin().command_history().await,
            vec!["createRole", "createRole", "createUser", "usersInfo"]
        );
    }

    #[tokio::test]
    async fn test_failure_stops_remaining_steps() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let plan = ProvisionPlan {
            roles: vec![],
            users: vec![
                UserSpec::new("first", Credential::new("p")).with_role(RoleRef::named("missing")),
                UserSpec::new("second", Credential::new("p")).with_role(RoleRef::named("read")),
            ],
        };

        let err = provisioner.apply(&plan).await.unwrap_err();
        assert!(matches!(err, ProvisionError::RoleNotFound(_)));
        assert_eq!(provisioner.admin().command_history().await, vec!["createUser"]);
        assert!(provisioner.get_users().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_role_info_missing_role() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let info = provisioner
            .role_info(&QualifiedRole::new("readStaffs", "admin"))
            .await
            .unwrap();
        assert!(info.is_none());
    }

    #[tokio::test]
    async fn test_effective_privileges_of_unknown_user() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let err = provisioner.effective_privileges("ghost").await.unwrap_err();
        assert!(matches!(err, ProvisionError::UserNotFound(ref who) if who == "ghost@admin"));
    }

    #[tokio::test]
    async fn test_effective_privileges_include_cluster_resource() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let monitor = UserSpec::new("monitor", Credential::new("p"))
            .with_role(RoleRef::named("clusterMonitor"))
            .with_role(RoleRef::scoped("read", "FaceID"));
        provisioner.create_user(&monitor).await.unwrap();

        let privileges = provisioner.effective_privileges("monitor").await.unwrap();
        assert_eq!(privileges.len(), 2);
        let cluster = privileges
            .iter()
            .find(|p| p.resource == Resource::cluster())
            .expect("cluster privilege");
        assert!(cluster.action_set().contains("serverStatus"));
        assert!(privileges
            .iter()
            .any(|p| p.resource == Resource::database("FaceID")));
    }
}
