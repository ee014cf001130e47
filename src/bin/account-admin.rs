//! Account Administration CLI
//!
//! Maintenance commands that act on the account store directly, without
//! going through the HTTP API. The first administrator is created here.

use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use dotenv::dotenv;
use uuid::Uuid;

use account_service::{
    config::AppConfig,
    database::{AccountStore, PgStore},
    models::Account,
    utils::validation::normalize_email,
};

/// Account administration CLI
#[derive(Parser)]
#[command(name = "account-admin", about = "Account administration CLI", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show an account
    Show(EmailArgs),
    /// Grant administrator rights
    Promote(EmailArgs),
    /// Revoke administrator rights
    Demote(EmailArgs),
    /// Remove an account
    Remove(RemoveArgs),
}

#[derive(Args)]
struct EmailArgs {
    /// Account email address
    email: String,
}

#[derive(Args)]
struct RemoveArgs {
    /// Account ID
    id: Uuid,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let pool = config
        .database
        .create_pool()
        .await
        .context("Failed to connect to the database")?;

    // Run migrations to ensure database is up to date
    sqlx::migrate!("./migrations").run(&pool).await?;

    let store = PgStore::new(pool, config.database.query_timeout);

    match cli.command {
        Commands::Show(args) => show_account(&store, &args.email).await?,
        Commands::Promote(args) => set_admin(&store, &args.email, true).await?,
        Commands::Demote(args) => set_admin(&store, &args.email, false).await?,
        Commands::Remove(args) => remove_account(&store, args.id).await?,
    }

    Ok(())
}

async fn find_account(store: &PgStore, email: &str) -> anyhow::Result<Account> {
    let email = normalize_email(email);
    match store.find_by_email(&email).await? {
        Some(record) => Ok(record.account),
        None => bail!("No account with email {}", email),
    }
}

async fn show_account(store: &PgStore, email: &str) -> anyhow::Result<()> {
    let account = find_account(store, email).await?;

    println!("ID:          {}", account.id);
    println!("Email:       {}", account.email);
    println!("Name:        {}", account.name);
    println!("Role:        {}", account.role);
    println!(
        "Matricule:   {}",
        account.linkage_code.as_deref().unwrap_or("-")
    );
    println!("Admin:       {}", if account.is_admin { "yes" } else { "no" });
    println!("First login: {}", account.is_first_login);

    let providers: Vec<&str> = [
        ("facebook", account.facebook.is_some()),
        ("google", account.google.is_some()),
        ("apple", account.apple.is_some()),
    ]
    .iter()
    .filter(|(_, linked)| *linked)
    .map(|(name, _)| *name)
    .collect();
    if !providers.is_empty() {
        println!("Providers:   {}", providers.join(", "));
    }

    println!("Created:     {}", account.created_at.format("%Y-%m-%d %H:%M"));
    println!("Updated:     {}", account.updated_at.format("%Y-%m-%d %H:%M"));
    Ok(())
}

async fn set_admin(store: &PgStore, email: &str, is_admin: bool) -> anyhow::Result<()> {
    let mut account = find_account(store, email).await?;
    if account.is_admin == is_admin {
        println!("{} is unchanged", account.email);
        return Ok(());
    }

    account.is_admin = is_admin;
    account.updated_at = Utc::now();
    store.update(&account).await?;

    let verb = if is_admin { "promoted" } else { "demoted" };
    println!("{} {}", account.email, verb);
    Ok(())
}

async fn remove_account(store: &PgStore, id: Uuid) -> anyhow::Result<()> {
    if !store.delete(id).await? {
        bail!("No account with id {}", id);
    }
    println!("Removed account {}", id);
    Ok(())
}
