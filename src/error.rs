//! Error types for provisioning
//!
//! Server-side failures arrive as a [`CommandFailure`] (code, code name,
//! message) and are classified per admin command, so a duplicate name on
//! `createRole` and on `createUser` surface as distinct variants.

use mongodb::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Server error codes the provisioner distinguishes.
pub mod codes {
    pub const BAD_VALUE: i32 = 2;
    pub const FAILED_TO_PARSE: i32 = 9;
    pub const USER_NOT_FOUND: i32 = 11;
    pub const UNAUTHORIZED: i32 = 13;
    pub const AUTHENTICATION_FAILED: i32 = 18;
    pub const ROLE_NOT_FOUND: i32 = 31;
    pub const COMMAND_NOT_FOUND: i32 = 59;
    pub const DUPLICATE_KEY: i32 = 11000;
    pub const ROLE_ALREADY_EXISTS: i32 = 51002;
    pub const USER_ALREADY_EXISTS: i32 = 51003;
}

/// A failed admin command as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandFailure {
    pub code: i32,
    pub code_name: String,
    pub message: String,
}

impl CommandFailure {
    pub fn new(code: i32, code_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code,
            code_name: code_name.into(),
            message: message.into(),
        }
    }

    fn is_duplicate(&self) -> bool {
        matches!(
            self.code,
            codes::DUPLICATE_KEY | codes::ROLE_ALREADY_EXISTS | codes::USER_ALREADY_EXISTS
        ) || self.message.contains("already exists")
    }
}

impl fmt::Display for CommandFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.code_name, self.code, self.message)
    }
}

/// Errors raised while provisioning roles and users
#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Role \"{role}@{db}\" already exists")]
    RoleExists { role: String, db: String },

    #[error("User \"{user}@{db}\" already exists")]
    UserExists { user: String, db: String },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid definition: {0}")]
    InvalidDefinition(String),

    #[error("Command failed: {0}")]
    Command(CommandFailure),

    #[error("Invalid plan: {0}")]
    Plan(String),

    #[error("Credential error: {0}")]
    Credential(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

/// The admin command a failure came from
#[derive(Debug, Clone, Copy)]
pub enum Step<'a> {
    CreateRole { role: &'a str, db: &'a str },
    CreateUser { user: &'a str, db: &'a str },
    Query,
}

impl ProvisionError {
    /// Classify a server command failure in the context of the step that issued it.
    pub fn from_command(failure: CommandFailure, step: Step<'_>) -> Self {
        match failure.code {
            codes::UNAUTHORIZED | codes::AUTHENTICATION_FAILED => {
                return ProvisionError::Unauthorized(failure.message)
            }
            codes::ROLE_NOT_FOUND => return ProvisionError::RoleNotFound(failure.message),
            codes::USER_NOT_FOUND => return ProvisionError::UserNotFound(failure.message),
            codes::BAD_VALUE | codes::FAILED_TO_PARSE => {
                return ProvisionError::InvalidDefinition(failure.message)
            }
            _ => {}
        }

        if failure.is_duplicate() {
            match step {
                Step::CreateRole { role, db } => {
                    return ProvisionError::RoleExists {
                        role: role.to_string(),
                        db: db.to_string(),
                    }
                }
                Step::CreateUser { user, db } => {
                    return ProvisionError::UserExists {
                        user: user.to_string(),
                        db: db.to_string(),
                    }
                }
                Step::Query => {}
            }
        }

        ProvisionError::Command(failure)
    }

    /// Convert a driver error. Command failures are kept raw so the caller
    /// can classify them with [`ProvisionError::from_command`].
    pub fn from_driver(err: mongodb::error::Error) -> Self {
        match err.kind.as_ref() {
            ErrorKind::Command(cmd) => ProvisionError::Command(CommandFailure::new(
                cmd.code,
                cmd.code_name.clone(),
                cmd.message.clone(),
            )),
            ErrorKind::Authentication { message, .. } => {
                ProvisionError::Unauthorized(message.clone())
            }
            ErrorKind::InvalidArgument { message, .. } => {
                ProvisionError::Connection(format!("invalid argument: {}", message))
            }
            _ => ProvisionError::Connection(err.to_string()),
        }
    }

    /// Re-classify a raw command failure for the given step; other errors pass through.
    pub fn in_step(self, step: Step<'_>) -> Self {
        match self {
            ProvisionError::Command(failure) => ProvisionError::from_command(failure, step),
            other => other,
        }
    }
}

impl From<bson::ser::Error> for ProvisionError {
    fn from(err: bson::ser::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<bson::de::Error> for ProvisionError {
    fn from(err: bson::de::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

impl From<bson::document::ValueAccessError> for ProvisionError {
    fn from(err: bson::document::ValueAccessError) -> Self {
        ProvisionError::Serialization(format!("unexpected reply shape: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_role_classified() {
        let failure = CommandFailure::new(
            codes::ROLE_ALREADY_EXISTS,
            "RoleAlreadyExists",
            "Role \"readStaffs@admin\" already exists",
        );
        let err = ProvisionError::from_command(
            failure,
            Step::CreateRole {
                role: "readStaffs",
                db: "admin",
            },
        );
        assert!(matches!(err, ProvisionError::RoleExists { ref role, .. } if role == "readStaffs"));
    }

    #[test]
    fn test_legacy_duplicate_key_on_user() {
        let failure = CommandFailure::new(
            codes::DUPLICATE_KEY,
            "DuplicateKey",
            "User \"reportuser@admin\" already exists",
        );
        let err = ProvisionError::from_command(
            failure,
            Step::CreateUser {
                user: "reportuser",
                db: "admin",
            },
        );
        assert!(matches!(err, ProvisionError::UserExists { ref user, .. } if user == "reportuser"));
    }

    #[test]
    fn test_unauthorized_wins_over_step() {
        let failure =
            CommandFailure::new(codes::UNAUTHORIZED, "Unauthorized", "not authorized on admin");
        let err = ProvisionError::from_command(
            failure,
            Step::CreateRole {
                role: "readStaffs",
                db: "admin",
            },
        );
        assert!(matches!(err, ProvisionError::Unauthorized(_)));
    }

    #[test]
    fn test_user_not_found_classified() {
        let failure = CommandFailure::new(
            codes::USER_NOT_FOUND,
            "UserNotFound",
            "Could not find user \"ghost@admin\"",
        );
        let err = ProvisionError::from_command(failure, Step::Query);
        assert!(matches!(
            err,
            ProvisionError::UserNotFound(ref msg) if msg.contains("ghost@admin")
        ));
    }

    #[test]
    fn test_unknown_code_kept_raw() {
        let failure = CommandFailure::new(8000, "AtlasError", "quota exceeded");
        let err = ProvisionError::from_command(failure.clone(), Step::Query);
        match err {
            ProvisionError::Command(raw) => assert_eq!(raw, failure),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_on_query_is_not_rewritten() {
        let failure = CommandFailure::new(codes::DUPLICATE_KEY, "DuplicateKey", "dup");
        let err = ProvisionError::from_command(failure, Step::Query);
        assert!(matches!(err, ProvisionError::Command(_)));
    }
}
