//! In-memory user-management catalog
//!
//! Answers `createRole`, `createUser`, `usersInfo`, `rolesInfo` and `ping`
//! with the replies and failure codes a MongoDB server gives. Used for dry
//! runs and tests; it holds no passwords.

use async_trait::async_trait;
use bson::{doc, Bson, Document};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::admin::AdminCommands;
use crate::catalog::{Privilege, QualifiedRole, Resource, RoleRef};
use crate::error::{codes, CommandFailure, ProvisionError, Result};

const ADMIN_DB: &str = "admin";

/// Built-in role names
pub const BUILTIN_ROLES: &[&str] = &[
    "read",
    "readWrite",
    "dbAdmin",
    "dbOwner",
    "userAdmin",
    "clusterAdmin",
    "clusterManager",
    "clusterMonitor",
    "hostManager",
    "backup",
    "restore",
    "readAnyDatabase",
    "readWriteAnyDatabase",
    "userAdminAnyDatabase",
    "dbAdminAnyDatabase",
    "root",
];

/// Built-in roles that exist in every database; the rest exist only in `admin`
const DATABASE_ROLES: &[&str] = &["read", "readWrite", "dbAdmin", "dbOwner", "userAdmin"];

const READ_ACTIONS: &[&str] = &[
    "changeStream",
    "collStats",
    "dbHash",
    "dbStats",
    "find",
    "killCursors",
    "listCollections",
    "listIndexes",
    "listSearchIndexes",
];

const WRITE_ACTIONS: &[&str] = &[
    "convertToCapped",
    "createCollection",
    "createIndex",
    "dropCollection",
    "dropIndex",
    "insert",
    "remove",
    "renameCollectionSameDB",
    "update",
];

const OTHER_ACTIONS: &[&str] = &[
    "bypassDocumentValidation",
    "changeCustomData",
    "changeOwnPassword",
    "changePassword",
    "collMod",
    "compact",
    "createRole",
    "createUser",
    "dropDatabase",
    "dropRole",
    "dropUser",
    "enableProfiler",
    "grantRole",
    "inprog",
    "killop",
    "planCacheRead",
    "planCacheWrite",
    "reIndex",
    "revokeRole",
    "serverStatus",
    "validate",
    "viewRole",
    "viewUser",
];

const MONITOR_ACTIONS: &[&str] = &["inprog", "serverStatus"];

const MECHANISMS: &[&str] = &["SCRAM-SHA-1", "SCRAM-SHA-256"];

type CmdResult<T> = std::result::Result<T, CommandFailure>;

pub fn is_builtin_role(role: &QualifiedRole) -> bool {
    DATABASE_ROLES.contains(&role.role.as_str())
        || (role.db == ADMIN_DB && BUILTIN_ROLES.contains(&role.role.as_str()))
}

fn is_known_action(action: &str) -> bool {
    READ_ACTIONS.contains(&action)
        || WRITE_ACTIONS.contains(&action)
        || OTHER_ACTIONS.contains(&action)
}

fn builtin_privileges(role: &QualifiedRole) -> Vec<Privilege> {
    match role.role.as_str() {
        "read" => vec![Privilege::new(
            Resource::database(&role.db),
            READ_ACTIONS.iter().copied(),
        )],
        "readWrite" => vec![Privilege::new(
            Resource::database(&role.db),
            READ_ACTIONS.iter().chain(WRITE_ACTIONS).copied(),
        )],
        "clusterMonitor" if role.db == ADMIN_DB => vec![Privilege::new(
            Resource::cluster(),
            MONITOR_ACTIONS.iter().copied(),
        )],
        // Other built-in roles resolve but grant nothing here
        _ => Vec::new(),
    }
}

// ============================================================================
// Catalog state
// ============================================================================

#[derive(Debug, Clone)]
struct StoredRole {
    privileges: Vec<Privilege>,
    roles: Vec<QualifiedRole>,
}

#[derive(Debug, Clone)]
struct StoredUser {
    roles: Vec<QualifiedRole>,
}

#[derive(Debug, Default)]
struct Catalog {
    roles: BTreeMap<QualifiedRole, StoredRole>,
    /// Keyed by (db, user)
    users: BTreeMap<(String, String), StoredUser>,
}

impl Catalog {
    fn role_exists(&self, role: &QualifiedRole) -> bool {
        is_builtin_role(role) || self.roles.contains_key(role)
    }

    fn resolve_all(&self, db: &str, refs: &[RoleRef]) -> CmdResult<Vec<QualifiedRole>> {
        refs.iter()
            .map(|r| {
                let role = r.resolve(db);
                if self.role_exists(&role) {
                    Ok(role)
                } else {
                    Err(CommandFailure::new(
                        codes::ROLE_NOT_FOUND,
                        "RoleNotFound",
                        format!("Could not find role: {}", role),
                    ))
                }
            })
            .collect()
    }

    fn create_role(&mut self, db: &str, cmd: &Document) -> CmdResult<()> {
        let name = required_str(cmd, "createRole")?;
        let key = QualifiedRole::new(name, db);

        if is_builtin_role(&key) {
            return Err(CommandFailure::new(
                codes::BAD_VALUE,
                "BadValue",
                format!("Cannot create roles with the same name as a built-in role: {}", key),
            ));
        }
        if self.roles.contains_key(&key) {
            return Err(CommandFailure::new(
                codes::ROLE_ALREADY_EXISTS,
                "RoleAlreadyExists",
                format!("Role \"{}\" already exists", key),
            ));
        }

        let privileges: Vec<Privilege> = required_field(cmd, "createRole", "privileges")?;
        for privilege in &privileges {
            if let Some(action) = privilege.actions.iter().find(|a| !is_known_action(a)) {
                return Err(CommandFailure::new(
                    codes::BAD_VALUE,
                    "BadValue",
                    format!("Unrecognized action privilege string: {}", action),
                ));
            }
        }

        let refs: Vec<RoleRef> = required_field(cmd, "createRole", "roles")?;
        let roles = self.resolve_all(db, &refs)?;

        self.roles.insert(key, StoredRole { privileges, roles });
        Ok(())
    }

    fn create_user(&mut self, db: &str, cmd: &Document) -> CmdResult<()> {
        let name = required_str(cmd, "createUser")?;
        let key = (db.to_string(), name.to_string());

        if self.users.contains_key(&key) {
            return Err(CommandFailure::new(
                codes::USER_ALREADY_EXISTS,
                "UserAlreadyExists",
                format!("User \"{}@{}\" already exists", name, db),
            ));
        }

        match cmd.get("pwd") {
            Some(Bson::String(pwd)) if !pwd.is_empty() => {}
            Some(Bson::String(_)) => {
                return Err(CommandFailure::new(
                    codes::BAD_VALUE,
                    "BadValue",
                    "Password cannot be empty",
                ))
            }
            _ => return Err(missing_field("createUser", "pwd")),
        }

        let refs: Vec<RoleRef> = required_field(cmd, "createUser", "roles")?;
        let roles = self.resolve_all(db, &refs)?;

        self.users.insert(key, StoredUser { roles });
        Ok(())
    }

    fn users_info(&self, db: &str, cmd: &Document) -> CmdResult<Document> {
        let show_privileges = cmd.get_bool("showPrivileges").unwrap_or(false);

        let selected: Vec<(String, String)> = match cmd.get("usersInfo") {
            Some(v) if is_one(v) => self
                .users
                .keys()
                .filter(|(user_db, _)| user_db == db)
                .cloned()
                .collect(),
            Some(Bson::Array(items)) => items
                .iter()
                .map(|item| user_selector(db, item))
                .collect::<CmdResult<_>>()?,
            Some(other) => vec![user_selector(db, other)?],
            None => return Err(missing_field("usersInfo", "usersInfo")),
        };

        let mut users = Vec::new();
        for key in selected {
            let Some(stored) = self.users.get(&key) else {
                continue;
            };
            let (user_db, user) = key;
            let mut entry = doc! {
                "_id": format!("{}.{}", user_db, user),
                "user": user.as_str(),
                "db": user_db.as_str(),
                "roles": to_bson(&stored.roles)?,
                "mechanisms": MECHANISMS.to_vec(),
            };
            if show_privileges {
                entry.insert(
                    "inheritedRoles",
                    to_bson(&self.closure(&stored.roles))?,
                );
                entry.insert(
                    "inheritedPrivileges",
                    to_bson(&self.effective_privileges(&stored.roles))?,
                );
            }
            users.push(Bson::Document(entry));
        }

        Ok(doc! { "users": users })
    }

    fn roles_info(&self, db: &str, cmd: &Document) -> CmdResult<Document> {
        let show_privileges = cmd.get_bool("showPrivileges").unwrap_or(false);
        let show_builtin = cmd.get_bool("showBuiltinRoles").unwrap_or(false);

        let selected: Vec<QualifiedRole> = match cmd.get("rolesInfo") {
            Some(v) if is_one(v) => {
                let mut roles: Vec<QualifiedRole> = self
                    .roles
                    .keys()
                    .filter(|r| r.db == db)
                    .cloned()
                    .collect();
                if show_builtin {
                    roles.extend(
                        BUILTIN_ROLES
                            .iter()
                            .map(|r| QualifiedRole::new(*r, db))
                            .filter(is_builtin_role),
                    );
                }
                roles
            }
            Some(Bson::Array(items)) => items
                .iter()
                .map(|item| role_selector(db, item))
                .collect::<CmdResult<_>>()?,
            Some(other) => vec![role_selector(db, other)?],
            None => return Err(missing_field("rolesInfo", "rolesInfo")),
        };

        let mut roles = Vec::new();
        for key in selected {
            let builtin = is_builtin_role(&key);
            let (privileges, inherits) = if builtin {
                (builtin_privileges(&key), Vec::new())
            } else {
                match self.roles.get(&key) {
                    Some(stored) => (stored.privileges.clone(), stored.roles.clone()),
                    None => continue,
                }
            };

            let mut entry = doc! {
                "_id": format!("{}.{}", key.db, key.role),
                "role": key.role.as_str(),
                "db": key.db.as_str(),
                "isBuiltin": builtin,
                "roles": to_bson(&inherits)?,
                "inheritedRoles": to_bson(&self.closure(&inherits))?,
            };
            if show_privileges {
                entry.insert("privileges", to_bson(&privileges)?);
                entry.insert(
                    "inheritedPrivileges",
                    to_bson(&self.effective_privileges(std::slice::from_ref(&key)))?,
                );
            }
            roles.push(Bson::Document(entry));
        }

        Ok(doc! { "roles": roles })
    }

    /// The given roles plus everything they inherit, transitively
    fn closure(&self, roles: &[QualifiedRole]) -> Vec<QualifiedRole> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<QualifiedRole> = roles.to_vec();
        while let Some(role) = stack.pop() {
            if !seen.insert(role.clone()) {
                continue;
            }
            if let Some(stored) = self.roles.get(&role) {
                stack.extend(stored.roles.iter().cloned());
            }
        }
        seen.into_iter().collect()
    }

    /// Union of privileges over the role closure, merged per resource
    fn effective_privileges(&self, roles: &[QualifiedRole]) -> Vec<Privilege> {
        let mut merged: BTreeMap<Resource, BTreeSet<String>> = BTreeMap::new();
        for role in self.closure(roles) {
            let privileges = if is_builtin_role(&role) {
                builtin_privileges(&role)
            } else {
                self.roles
                    .get(&role)
                    .map(|r| r.privileges.clone())
                    .unwrap_or_default()
            };
            for privilege in privileges {
                merged
                    .entry(privilege.resource)
                    .or_default()
                    .extend(privilege.actions);
            }
        }
        merged
            .into_iter()
            .map(|(resource, actions)| Privilege::new(resource, actions))
            .collect()
    }
}

fn is_one(value: &Bson) -> bool {
    match value {
        Bson::Int32(n) => *n == 1,
        Bson::Int64(n) => *n == 1,
        Bson::Double(n) => *n == 1.0,
        _ => false,
    }
}

fn user_selector(db: &str, value: &Bson) -> CmdResult<(String, String)> {
    match value {
        Bson::String(user) => Ok((db.to_string(), user.clone())),
        Bson::Document(d) => match (d.get_str("user"), d.get_str("db")) {
            (Ok(user), Ok(user_db)) => Ok((user_db.to_string(), user.to_string())),
            _ => Err(bad_selector("usersInfo")),
        },
        _ => Err(bad_selector("usersInfo")),
    }
}

fn role_selector(db: &str, value: &Bson) -> CmdResult<QualifiedRole> {
    match value {
        Bson::String(role) => Ok(QualifiedRole::new(role.clone(), db)),
        Bson::Document(d) => match (d.get_str("role"), d.get_str("db")) {
            (Ok(role), Ok(role_db)) => Ok(QualifiedRole::new(role, role_db)),
            _ => Err(bad_selector("rolesInfo")),
        },
        _ => Err(bad_selector("rolesInfo")),
    }
}

fn bad_selector(command: &str) -> CommandFailure {
    CommandFailure::new(
        codes::BAD_VALUE,
        "BadValue",
        format!(
            "{} argument must be 1, a name, a {{name, db}} document or an array of them",
            command
        ),
    )
}

fn missing_field(command: &str, field: &str) -> CommandFailure {
    CommandFailure::new(
        codes::FAILED_TO_PARSE,
        "FailedToParse",
        format!("BSON field '{}.{}' is missing but a required field", command, field),
    )
}

fn required_str<'a>(cmd: &'a Document, command: &str) -> CmdResult<&'a str> {
    match cmd.get_str(command) {
        Ok(name) if !name.is_empty() => Ok(name),
        _ => Err(CommandFailure::new(
            codes::BAD_VALUE,
            "BadValue",
            format!("{} requires a non-empty name", command),
        )),
    }
}

fn required_field<T: DeserializeOwned>(cmd: &Document, command: &str, field: &str) -> CmdResult<T> {
    let value = cmd.get(field).ok_or_else(|| missing_field(command, field))?;
    bson::from_bson(value.clone()).map_err(|e| {
        CommandFailure::new(
            codes::FAILED_TO_PARSE,
            "FailedToParse",
            format!("BSON field '{}.{}': {}", command, field, e),
        )
    })
}

fn to_bson<T: Serialize + ?Sized>(value: &T) -> CmdResult<Bson> {
    bson::to_bson(value).map_err(|e| CommandFailure::new(1, "InternalError", e.to_string()))
}

// ============================================================================
// Admin implementation
// ============================================================================

/// Simulated admin database
#[derive(Debug)]
pub struct InMemoryAdmin {
    db_name: String,
    authorized: bool,
    catalog: Mutex<Catalog>,
    history: Mutex<Vec<String>>,
}

impl Default for InMemoryAdmin {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAdmin {
    /// Empty catalog on the `admin` database
    pub fn new() -> Self {
        Self::with_database(ADMIN_DB)
    }

    pub fn with_database(db: impl Into<String>) -> Self {
        Self {
            db_name: db.into(),
            authorized: true,
            catalog: Mutex::new(Catalog::default()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// A session without user-management privileges: every command but
    /// `ping` fails with `Unauthorized`.
    pub fn unauthorized() -> Self {
        Self {
            authorized: false,
            ..Self::new()
        }
    }

    /// Names of the commands received so far, in order
    pub async fn command_history(&self) -> Vec<String> {
        self.history.lock().await.clone()
    }
}

#[async_trait]
impl AdminCommands for InMemoryAdmin {
    fn database(&self) -> &str {
        &self.db_name
    }

    async fn run_command(&self, command: Document) -> Result<Document> {
        let name = command.keys().next().cloned().ok_or_else(|| {
            ProvisionError::Command(CommandFailure::new(
                codes::FAILED_TO_PARSE,
                "FailedToParse",
                "empty command document",
            ))
        })?;
        self.history.lock().await.push(name.clone());
        debug!(command = %name, db = %self.db_name, "In-memory admin command");

        if !self.authorized && name != "ping" {
            return Err(ProvisionError::Command(CommandFailure::new(
                codes::UNAUTHORIZED,
                "Unauthorized",
                format!(
                    "not authorized on {} to execute command {{ {}: ... }}",
                    self.db_name, name
                ),
            )));
        }

        let mut catalog = self.catalog.lock().await;
        let reply = match name.as_str() {
            "ping" => Ok(Document::new()),
            "createRole" => catalog.create_role(&self.db_name, &command).map(|_| Document::new()),
            "createUser" => catalog.create_user(&self.db_name, &command).map(|_| Document::new()),
            "usersInfo" => catalog.users_info(&self.db_name, &command),
            "rolesInfo" => catalog.roles_info(&self.db_name, &command),
            other => Err(CommandFailure::new(
                codes::COMMAND_NOT_FOUND,
                "CommandNotFound",
                format!("no such command: '{}'", other),
            )),
        };

        reply
            .map(|mut doc| {
                doc.insert("ok", 1.0);
                doc
            })
            .map_err(ProvisionError::Command)
    }
}
