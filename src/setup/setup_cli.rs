use chrono::Utc;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tenantguard_blog::config::Config;
use tenantguard_blog::helper::scheduler_helpers::{self, RunMode};
use tenantguard_blog::jobs::queue::RedbJobQueue;
use tenantguard_blog::models::db_operations::users_db_operations;
use tenantguard_blog::models::UserRole;
use tenantguard_blog::setup::db_setup;

#[derive(Parser, Debug)]
#[command(name = "setup_cli", author, version, about = "A CLI for initial application setup.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the .env configuration file.
    #[arg(long, required = true, value_name = "FILE")]
    env_file: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Commands {
    Db {
        #[command(subcommand)]
        action: DbAction,
    },
    Admin {
        #[command(subcommand)]
        action: AdminAction,
    },
    Scheduler {
        #[command(subcommand)]
        action: SchedulerAction,
    },
}

#[derive(Subcommand, Debug)]
enum DbAction {
    /// Creates the blog database and the job queue file.
    Setup,
}

#[derive(Subcommand, Debug)]
enum AdminAction {
    Create {
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        full_name: Option<String>,
        /// Create an editor instead of an admin.
        #[arg(long)]
        editor: bool,
    },
    List,
    ChangePassword {
        #[arg(long)]
        username: String,
        #[arg(long)]
        new_password: String,
    },
}

#[derive(Subcommand, Debug)]
enum SchedulerAction {
    /// Runs one scheduler pass and exits. Queued jobs run in the server's workers.
    Run {
        /// Generate from the top topic even if no post is due.
        #[arg(long)]
        force: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env(&cli.env_file) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    env_logger::init_from_env(env_logger::Env::new().default_filter_or(&config.log_level));

    let result = match &cli.command {
        Commands::Db { action: DbAction::Setup } => setup_databases(&config),
        Commands::Admin { action } => match action {
            AdminAction::Create { username, password, full_name, editor } => {
                let role = if *editor { UserRole::Editor } else { UserRole::Admin };
                create_user(&config, username, password, full_name.as_deref(), role)
            }
            AdminAction::List => list_users(&config),
            AdminAction::ChangePassword { username, new_password } => change_password(&config, username, new_password),
        },
        Commands::Scheduler { action: SchedulerAction::Run { force } } => run_scheduler(&config, *force),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("❌ {}", message);
            ExitCode::FAILURE
        }
    }
}

fn open_blog_db(config: &Config) -> Result<Connection, String> {
    let db_path = config.blog_db_path();
    if !db_path.exists() {
        return Err(format!(
            "Blog database not found at '{}'. Please run `setup_cli db setup` first.",
            db_path.display()
        ));
    }
    let conn = Connection::open(&db_path).map_err(|e| format!("Could not open blog database: {}", e))?;
    conn.execute_batch("PRAGMA foreign_keys = ON;").map_err(|e| e.to_string())?;
    Ok(conn)
}

fn setup_databases(config: &Config) -> Result<(), String> {
    let blog_path = config.blog_db_path();
    println!("Setting up blog database at '{}'...", blog_path.display());
    if let Some(parent) = blog_path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Could not create database directory: {}", e))?;
    }
    let mut conn = Connection::open(&blog_path).map_err(|e| format!("Could not create blog database file: {}", e))?;
    db_setup::setup_blog_db(&mut conn).map_err(|e| format!("Error setting up blog database: {}", e))?;
    println!("✅ Blog database ready.");

    let jobs_path = config.jobs_db_path();
    println!("Setting up job queue at '{}'...", jobs_path.display());
    if let Some(parent) = jobs_path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("Could not create job queue directory: {}", e))?;
    }
    RedbJobQueue::open(&jobs_path, chrono::Duration::seconds(config.jobs.lease_ttl_secs))
        .map_err(|e| format!("Error setting up job queue: {}", e))?;
    println!("✅ Job queue ready.");
    Ok(())
}

fn create_user(
    config: &Config,
    username: &str,
    password: &str,
    full_name: Option<&str>,
    role: UserRole,
) -> Result<(), String> {
    let conn = open_blog_db(config)?;
    users_db_operations::create_user(&conn, username, full_name, password, role).map_err(|e| {
        format!("Error creating user: {}. It might be because the username already exists.", e)
    })?;
    println!("✅ {} user '{}' created successfully.", role, username);
    Ok(())
}

fn list_users(config: &Config) -> Result<(), String> {
    let conn = open_blog_db(config)?;
    let users = users_db_operations::read_all_users(&conn).map_err(|e| format!("Error fetching users: {}", e))?;
    println!("Listing users:");
    for user in users {
        println!(
            "- {} ({}{})",
            user.username,
            user.role,
            if user.is_active { "" } else { ", inactive" }
        );
    }
    Ok(())
}

fn change_password(config: &Config, username: &str, new_password: &str) -> Result<(), String> {
    let conn = open_blog_db(config)?;
    match users_db_operations::update_password(&conn, username, new_password) {
        Ok(0) => Err(format!("No user named '{}' found.", username)),
        Ok(_) => {
            println!("✅ Password for '{}' changed successfully.", username);
            Ok(())
        }
        Err(e) => Err(format!("Error updating password: {}", e)),
    }
}

fn run_scheduler(config: &Config, force: bool) -> Result<(), String> {
    let mut conn = open_blog_db(config)?;
    conn.busy_timeout(Duration::from_secs(5)).map_err(|e| e.to_string())?;
    let queue = RedbJobQueue::open(config.jobs_db_path(), chrono::Duration::seconds(config.jobs.lease_ttl_secs))
        .map_err(|e| format!("Could not open job queue (is the server holding it?): {}", e))?;
    let mode = if force { RunMode::Forced } else { RunMode::Scheduled };
    let outcome =
        scheduler_helpers::check_and_generate(&mut conn, &queue, &config.scheduler.system_author, mode, Utc::now())
            .map_err(|e| format!("Scheduler pass failed: {}", e))?;
    let rendered = serde_json::to_string_pretty(&outcome).map_err(|e| e.to_string())?;
    println!("{}", rendered);
    Ok(())
}
