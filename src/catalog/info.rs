//! `usersInfo` / `rolesInfo` reply entries

use serde::{Deserialize, Serialize};

use crate::catalog::{Privilege, QualifiedRole};

/// A user as reported by `usersInfo`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    pub user: String,
    pub db: String,
    #[serde(default)]
    pub roles: Vec<QualifiedRole>,
    /// Present only when `showPrivileges` was requested
    #[serde(default, rename = "inheritedPrivileges")]
    pub inherited_privileges: Vec<Privilege>,
}

/// A role as reported by `rolesInfo`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoleInfo {
    pub role: String,
    pub db: String,
    #[serde(default, rename = "isBuiltin")]
    pub is_builtin: bool,
    #[serde(default)]
    pub roles: Vec<QualifiedRole>,
    #[serde(default)]
    pub privileges: Vec<Privilege>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Resource;
    use bson::doc;

    #[test]
    fn test_user_info_ignores_server_extras() {
        let info: UserInfo = bson::from_document(doc! {
            "_id": "admin.reportuser",
            "userId": bson::Binary { subtype: bson::spec::BinarySubtype::Uuid, bytes: vec![0; 16] },
            "user": "reportuser",
            "db": "admin",
            "roles": [
                { "role": "readStaffs", "db": "admin" },
                { "role": "readWrite", "db": "TestReportService" },
            ],
            "mechanisms": ["SCRAM-SHA-1", "SCRAM-SHA-256"],
        })
        .unwrap();

        assert_eq!(info.user, "reportuser");
        assert_eq!(info.roles[1], QualifiedRole::new("readWrite", "TestReportService"));
        assert!(info.inherited_privileges.is_empty());
    }

    #[test]
    fn test_user_info_with_cluster_privilege() {
        let info: UserInfo = bson::from_document(doc! {
            "user": "monitor",
            "db": "admin",
            "roles": [{ "role": "clusterMonitor", "db": "admin" }],
            "inheritedPrivileges": [
                { "resource": { "cluster": true }, "actions": ["serverStatus"] },
                { "resource": { "db": "", "collection": "system.profile" }, "actions": ["find"] },
            ],
        })
        .unwrap();

        assert_eq!(info.inherited_privileges.len(), 2);
        assert_eq!(
            info.inherited_privileges[0],
            Privilege::new(Resource::cluster(), ["serverStatus"])
        );
        assert_eq!(info.inherited_privileges[1].resource.collection_name(), Some("system.profile"));
    }

    #[test]
    fn test_role_info_with_privileges() {
        let info: RoleInfo = bson::from_document(doc! {
            "role": "readStaffs",
            "db": "admin",
            "isBuiltin": false,
            "roles": [],
            "inheritedRoles": [],
            "privileges": [
                { "resource": { "db": "FaceID", "collection": "staffs" }, "actions": ["find"] }
            ],
        })
        .unwrap();

        assert!(!info.is_builtin);
        assert_eq!(info.privileges, vec![Privilege::find_on("FaceID", "staffs")]);
    }
}
