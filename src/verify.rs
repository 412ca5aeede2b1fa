//! Post-provisioning checks
//!
//! Compares what the server reports against a plan: each planned role must
//! grant exactly the planned privileges and each planned user must hold
//! exactly the planned role set.

use serde::Serialize;
use std::fmt;
use tracing::{info, warn};

use crate::admin::AdminCommands;
use crate::catalog::{same_grants, Privilege, QualifiedRole};
use crate::error::Result;
use crate::plan::ProvisionPlan;
use crate::provisioner::Provisioner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    MissingRole {
        role: QualifiedRole,
    },
    PrivilegeMismatch {
        role: QualifiedRole,
        expected: Vec<Privilege>,
        actual: Vec<Privilege>,
    },
    InheritanceMismatch {
        role: QualifiedRole,
        expected: Vec<QualifiedRole>,
        actual: Vec<QualifiedRole>,
    },
    MissingUser {
        user: String,
    },
    RoleSetMismatch {
        user: String,
        expected: Vec<QualifiedRole>,
        actual: Vec<QualifiedRole>,
    },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::MissingRole { role } => write!(f, "role {} does not exist", role),
            Finding::PrivilegeMismatch { role, .. } => {
                write!(f, "role {} grants different privileges than planned", role)
            }
            Finding::InheritanceMismatch { role, .. } => {
                write!(f, "role {} inherits different roles than planned", role)
            }
            Finding::MissingUser { user } => write!(f, "user {} does not exist", user),
            Finding::RoleSetMismatch { user, .. } => {
                write!(f, "user {} holds a different role set than planned", user)
            }
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct VerificationReport {
    pub roles_checked: usize,
    pub users_checked: usize,
    pub findings: Vec<Finding>,
}

impl VerificationReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

pub async fn verify<A: AdminCommands>(
    provisioner: &Provisioner<A>,
    plan: &ProvisionPlan,
) -> Result<VerificationReport> {
    let db = provisioner.admin().database().to_string();
    let mut report = VerificationReport::default();

    for spec in &plan.roles {
        report.roles_checked += 1;
        let key = QualifiedRole::new(spec.role.clone(), db.clone());

        let Some(actual) = provisioner.role_info(&key).await? else {
            report.findings.push(Finding::MissingRole { role: key });
            continue;
        };

        if !same_grants(&spec.privileges, &actual.privileges) {
            report.findings.push(Finding::PrivilegeMismatch {
                role: key.clone(),
                expected: spec.privileges.clone(),
                actual: actual.privileges,
            });
        }

        let mut expected_inherits: Vec<QualifiedRole> =
            spec.roles.iter().map(|r| r.resolve(&db)).collect();
        expected_inherits.sort();
        let mut actual_inherits = actual.roles;
        actual_inherits.sort();
        if expected_inherits != actual_inherits {
            report.findings.push(Finding::InheritanceMismatch {
                role: key,
                expected: expected_inherits,
                actual: actual_inherits,
            });
        }
    }

    for spec in &plan.users {
        report.users_checked += 1;

        let Some(actual) = provisioner.user_info(&spec.user).await? else {
            report.findings.push(Finding::MissingUser {
                user: spec.user.clone(),
            });
            continue;
        };

        let expected = spec.resolved_roles(&db);
        let mut actual_roles = actual.roles;
        actual_roles.sort();
        actual_roles.dedup();
        if expected != actual_roles {
            report.findings.push(Finding::RoleSetMismatch {
                user: spec.user.clone(),
                expected,
                actual: actual_roles,
            });
        }
    }

    for finding in &report.findings {
        warn!("Verification: {}", finding);
    }
    info!(
        roles = report.roles_checked,
        users = report.users_checked,
        findings = report.findings.len(),
        "Verification finished"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admin::InMemoryAdmin;
    use crate::catalog::{Credential, RoleRef, RoleSpec, UserSpec};

    #[tokio::test]
    async fn test_empty_database_reports_everything_missing() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let report = verify(&provisioner, &ProvisionPlan::report_service())
            .await
            .unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.roles_checked, 2);
        assert_eq!(report.users_checked, 1);
        assert_eq!(report.findings.len(), 3);
        assert!(report
            .findings
            .contains(&Finding::MissingUser { user: "reportuser".into() }));
    }

    #[tokio::test]
    async fn test_clean_after_apply() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let plan = ProvisionPlan::report_service();
        provisioner.apply(&plan).await.unwrap();

        let report = verify(&provisioner, &plan).await.unwrap();
        assert!(report.is_clean(), "{:?}", report.findings);
    }

    #[tokio::test]
    async fn test_widened_role_is_flagged() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let wide = RoleSpec::new("readStaffs").with_privilege(Privilege::new(
            crate::catalog::Resource::collection("FaceID", "staffs"),
            ["find", "update"],
        ));
        provisioner.create_role(&wide).await.unwrap();

        let plan = ProvisionPlan {
            roles: vec![
                RoleSpec::new("readStaffs").with_privilege(Privilege::find_on("FaceID", "staffs"))
            ],
            users: vec![],
        };
        let report = verify(&provisioner, &plan).await.unwrap();
        assert!(matches!(
            report.findings.as_slice(),
            [Finding::PrivilegeMismatch { .. }]
        ));
    }

    #[tokio::test]
    async fn test_unplanned_inheritance_is_flagged() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        provisioner.create_role(&RoleSpec::new("base")).await.unwrap();
        let inheriting = RoleSpec::new("readStaffs")
            .with_privilege(Privilege::find_on("FaceID", "staffs"))
            .inherits(RoleRef::named("base"));
        provisioner.create_role(&inheriting).await.unwrap();

        let plan = ProvisionPlan {
            roles: vec![
                RoleSpec::new("readStaffs").with_privilege(Privilege::find_on("FaceID", "staffs"))
            ],
            users: vec![],
        };
        let report = verify(&provisioner, &plan).await.unwrap();
        match report.findings.as_slice() {
            [Finding::InheritanceMismatch {
                role,
                expected,
                actual,
            }] => {
                assert_eq!(role, &QualifiedRole::new("readStaffs", "admin"));
                assert!(expected.is_empty());
                assert_eq!(actual, &vec![QualifiedRole::new("base", "admin")]);
            }
            other => panic!("unexpected findings: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_extra_user_role_is_flagged() {
        let provisioner = Provisioner::new(InMemoryAdmin::new());
        let actual = UserSpec::new("reportuser", Credential::new("p"))
            .with_role(RoleRef::named("read"))
            .with_role(RoleRef::scoped("readWrite", "TestReportService"));
        provisioner.create_user(&actual).await.unwrap();

        let plan = ProvisionPlan {
            roles: vec![],
            users: vec![UserSpec::new("reportuser", Credential::default())
                .with_role(RoleRef::scoped("readWrite", "TestReportService"))],
        };
        let report = verify(&provisioner, &plan).await.unwrap();
        match report.findings.as_slice() {
            [Finding::RoleSetMismatch { actual, .. }] => assert_eq!(actual.len(), 2),
            other => panic!("unexpected findings: {other:?}"),
        }
    }
}
