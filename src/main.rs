//! reportdb-provision - creates the report service's MongoDB roles and user

use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reportdb_provision::{
    admin::{InMemoryAdmin, MongoAdmin},
    config::{Args, Command},
    verify::verify,
    Provisioner,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr, results to stdout
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("reportdb_provision={},info", args.log_level).into());
    tracing_subscriber::registry()
        .with(filter)
        .with(
            args.log_json
                .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)),
        )
        .with(
            (!args.log_json)
                .then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
        )
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(2);
    }

    match args.command() {
        Command::Plan => {
            let plan = args.load_plan()?;
            let commands: Vec<serde_json::Value> = plan
                .redacted_commands()?
                .into_iter()
                .map(|c| bson::Bson::Document(c).into_relaxed_extjson())
                .collect();
            print_json(&commands)?;
        }

        Command::Apply { dry_run: true } => {
            let plan = args.load_plan()?;
            plan.ensure_credentials()?;
            info!("Dry run against an empty in-memory '{}' catalog", args.admin_db);
            let provisioner = Provisioner::new(InMemoryAdmin::with_database(args.admin_db.clone()));
            let report = provisioner.apply(&plan).await?;
            print_json(&report)?;
        }

        Command::Apply { dry_run: false } => {
            let plan = args.load_plan()?;
            plan.ensure_credentials()?;
            for user in plan.users_with_legacy_password() {
                warn!(
                    user = %user,
                    hint = "set REPORTUSER_PASSWORD or REPORTUSER_PASSWORD_FILE",
                    "Using the built-in password"
                );
            }

            let provisioner = Provisioner::new(connect(&args).await?);
            match provisioner.apply(&plan).await {
                Ok(report) => {
                    info!(
                        roles = report.roles_created.len(),
                        users = report.users_created.len(),
                        "Provisioning complete"
                    );
                    print_json(&report)?;
                }
                Err(e) => {
                    error!("Provisioning aborted: {}", e);
                    std::process::exit(1);
                }
            }
        }

        Command::Users => {
            let provisioner = Provisioner::new(connect(&args).await?);
            let users: Vec<serde_json::Value> = provisioner
                .get_users()
                .await?
                .into_iter()
                .map(|d| bson::Bson::Document(d).into_relaxed_extjson())
                .collect();
            print_json(&users)?;
        }

        Command::Verify => {
            let plan = args.load_plan()?;
            let provisioner = Provisioner::new(connect(&args).await?);
            let report = verify(&provisioner, &plan).await?;
            print_json(&report)?;
            if !report.is_clean() {
                std::process::exit(1);
            }
        }

        Command::Privileges { user } => {
            let provisioner = Provisioner::new(connect(&args).await?);
            let privileges = provisioner.effective_privileges(&user).await?;
            print_json(&privileges)?;
        }
    }

    Ok(())
}

async fn connect(args: &Args) -> anyhow::Result<MongoAdmin> {
    let admin =
        MongoAdmin::connect(&args.mongodb_uri, &args.admin_db, args.connect_timeout()).await?;
    Ok(admin)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
