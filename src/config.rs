//! Configuration for reportdb-provision
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::Credential;
use crate::error::{ProvisionError, Result};
use crate::plan::ProvisionPlan;

/// Provision the report service's MongoDB roles and user
#[derive(Parser, Debug, Clone)]
#[command(name = "reportdb-provision")]
#[command(about = "Creates the report service's read-only roles and user in MongoDB")]
pub struct Args {
    /// MongoDB connection URI (needs user-management privileges)
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017", global = true)]
    pub mongodb_uri: String,

    /// Database user-management commands run against
    #[arg(long, env = "ADMIN_DB", default_value = "admin", global = true)]
    pub admin_db: String,

    /// JSON plan file replacing the built-in report service plan
    #[arg(long, env = "PROVISION_PLAN", global = true)]
    pub plan: Option<PathBuf>,

    /// Password for every planned user (overrides the plan)
    #[arg(long, env = "REPORTUSER_PASSWORD", hide_env_values = true, global = true)]
    pub user_password: Option<String>,

    /// File holding the password for every planned user
    #[arg(long, env = "REPORTUSER_PASSWORD_FILE", global = true)]
    pub user_password_file: Option<PathBuf>,

    /// Server selection and connect timeout in milliseconds
    #[arg(long, env = "CONNECT_TIMEOUT_MS", default_value = "3000", global = true)]
    pub connect_timeout_ms: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false", global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Create the planned roles and users, then list users (default)
    Apply {
        /// Run against an empty in-memory catalog instead of the server
        #[arg(long)]
        dry_run: bool,
    },
    /// List users defined on the admin database
    Users,
    /// Check server state against the plan
    Verify,
    /// Show a user's effective privileges
    Privileges {
        /// User name in the admin database
        user: String,
    },
    /// Print the admin commands the plan would issue (passwords redacted)
    Plan,
}

impl Args {
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or(Command::Apply { dry_run: false })
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if !self.mongodb_uri.starts_with("mongodb://")
            && !self.mongodb_uri.starts_with("mongodb+srv://")
        {
            return Err("MONGODB_URI must start with mongodb:// or mongodb+srv://".to_string());
        }

        if self.admin_db.trim().is_empty() {
            return Err("ADMIN_DB must not be empty".to_string());
        }

        if self.user_password.is_some() && self.user_password_file.is_some() {
            return Err(
                "Set only one of REPORTUSER_PASSWORD and REPORTUSER_PASSWORD_FILE".to_string(),
            );
        }

        if self.connect_timeout_ms == 0 {
            return Err("CONNECT_TIMEOUT_MS must be greater than zero".to_string());
        }

        Ok(())
    }

    /// Password supplied through configuration, if any
    pub fn credential_override(&self) -> Result<Option<Credential>> {
        if let Some(ref pwd) = self.user_password {
            if pwd.is_empty() {
                return Err(ProvisionError::Credential("REPORTUSER_PASSWORD is empty".into()));
            }
            return Ok(Some(Credential::new(pwd.clone())));
        }

        if let Some(ref path) = self.user_password_file {
            let credential = Credential::from_file(path).map_err(|e| {
                ProvisionError::Credential(format!("cannot read {}: {}", path.display(), e))
            })?;
            if credential.is_empty() {
                return Err(ProvisionError::Credential(format!(
                    "{} is empty",
                    path.display()
                )));
            }
            return Ok(Some(credential));
        }

        Ok(None)
    }

    /// The plan to run, with configured credentials applied
    pub fn load_plan(&self) -> Result<ProvisionPlan> {
        let mut plan = match self.plan {
            Some(ref path) => ProvisionPlan::from_file(path)?,
            None => ProvisionPlan::report_service(),
        };

        if let Some(credential) = self.credential_override()? {
            plan.override_credentials(&credential);
        }

        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["reportdb-provision"];
        argv.extend_from_slice(args);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--mongodb-uri", "mongodb://localhost:27017"]);
        assert_eq!(args.admin_db, "admin");
        assert_eq!(args.command(), Command::Apply { dry_run: false });
        assert_eq!(args.connect_timeout(), Duration::from_millis(3000));
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_subcommands() {
        let args = parse(&["--mongodb-uri", "mongodb://h", "apply", "--dry-run"]);
        assert_eq!(args.command(), Command::Apply { dry_run: true });

        let args = parse(&["--mongodb-uri", "mongodb://h", "privileges", "reportuser"]);
        assert_eq!(
            args.command(),
            Command::Privileges {
                user: "reportuser".into()
            }
        );
    }

    #[test]
    fn test_rejects_non_mongo_uri() {
        let args = parse(&["--mongodb-uri", "postgres://localhost"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_rejects_both_password_sources() {
        let args = parse(&[
            "--mongodb-uri",
            "mongodb://h",
            "--user-password",
            "a",
            "--user-password-file",
            "/run/secrets/reportuser",
        ]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_password_file_overrides_builtin_password() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "from-secret-store").unwrap();
        let path = file.path().to_str().unwrap().to_string();

        let args = parse(&["--mongodb-uri", "mongodb://h", "--user-password-file", &path]);
        let plan = args.load_plan().unwrap();
        assert_eq!(plan.users[0].pwd.expose(), "from-secret-store");
    }

    #[test]
    fn test_empty_password_rejected() {
        let args = parse(&["--mongodb-uri", "mongodb://h", "--user-password", ""]);
        assert!(matches!(
            args.credential_override(),
            Err(ProvisionError::Credential(_))
        ));
    }
}
