//! Operator commands run against the configured database.

use std::sync::Arc;

use ainstein::{
    ai::AiService,
    auth::hash_password,
    config::{AppConfig, ConfigLoader},
    crypto::CryptoKey,
    db,
    mail::{Notifier, build_mailer},
    models::user::ROLE_ADMIN,
    repositories::{UserRepository, user::NewUser},
    seeds,
    settings::PlatformSettings,
    telemetry::init_tracing,
};
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sea_orm::DatabaseConnection;

#[derive(Debug, Parser)]
#[command(name = "ainstein-admin", version, about = "Ainstein operator tooling")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending migrations
    Migrate,
    /// Create the platform tenant and system prompts when missing
    Seed,
    /// Create a platform super admin
    CreateSuperAdmin {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "Super Admin")]
        name: String,
    },
    /// Inspect or change platform settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Run one completion through the configured AI provider
    TestOpenai {
        #[arg(long, default_value = "Say hello in one short sentence.")]
        prompt: String,
    },
    /// Send a test mail through the configured transport
    TestEmail {
        #[arg(long)]
        to: String,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsAction {
    /// Print every setting, secrets masked
    List,
    /// Print one setting, masked when secret
    Get { key: String },
    /// Set one setting from its string form
    Set { key: String, value: String },
}

struct Admin {
    config: Arc<AppConfig>,
    db: DatabaseConnection,
}

impl Admin {
    fn settings(&self) -> Result<PlatformSettings> {
        let key = self
            .config
            .crypto_key
            .clone()
            .context("AINSTEIN_CRYPTO_KEY is required for settings access")?;
        Ok(PlatformSettings::new(self.db.clone(), CryptoKey::new(key)?))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::new().load().context("loading configuration")?;
    init_tracing(&config)?;

    let db = db::init_pool(&config)
        .await
        .context("initializing database connection pool")?;
    let ctx = Admin {
        config: Arc::new(config),
        db,
    };

    match cli.command {
        Command::Migrate => {
            db::run_migrations(&ctx.db).await?;
            println!("Migrations applied.");
        }
        Command::Seed => {
            seeds::run_seeds(&ctx.db).await?;
            println!("Seed data is in place.");
        }
        Command::CreateSuperAdmin {
            email,
            password,
            name,
        } => create_super_admin(&ctx, &email, &password, &name).await?,
        Command::Settings { action } => settings(&ctx, action).await?,
        Command::TestOpenai { prompt } => {
            let ai = AiService::new(ctx.settings()?, ctx.config.openai.clone())?;
            let content = ai
                .generate_simple_content(&prompt)
                .await
                .context("AI provider call failed")?;
            println!("Model: {}", ai.default_model().await?);
            println!("{content}");
        }
        Command::TestEmail { to } => {
            let mailer = build_mailer(&ctx.config.mail)?;
            let transport = mailer.name();
            let notifier = Notifier::new(
                mailer,
                ctx.db.clone(),
                ctx.settings()?,
                ctx.config.clone(),
            );
            notifier.send_test(&to).await?;
            println!("Test mail sent to {to} via the {transport} transport.");
        }
    }

    Ok(())
}

async fn create_super_admin(ctx: &Admin, email: &str, password: &str, name: &str) -> Result<()> {
    if password.chars().count() < 8 {
        bail!("password must be at least 8 characters");
    }
    if !ainstein::config::is_valid_email(email) {
        bail!("'{email}' is not a valid email address");
    }

    let user = UserRepository::new(&ctx.db)
        .create(NewUser {
            tenant_id: None,
            email: email.to_string(),
            password_hash: hash_password(password)?,
            name: name.to_string(),
            role: Some(ROLE_ADMIN.to_string()),
            is_super_admin: true,
            is_active: true,
            email_verified: true,
            preferences: None,
        })
        .await
        .with_context(|| format!("creating super admin {email}"))?;

    println!("Super admin {} created ({}).", user.email, user.id);
    Ok(())
}

async fn settings(ctx: &Admin, action: SettingsAction) -> Result<()> {
    let settings = ctx.settings()?;
    match action {
        SettingsAction::List => {
            let snapshot = settings.get_all().await?;
            println!("{}", serde_json::to_string_pretty(&snapshot.masked_json())?);
        }
        SettingsAction::Get { key } => {
            let snapshot = settings.get_all().await?;
            match snapshot.masked_value(&key) {
                Some(value) => println!("{value}"),
                None => bail!("unknown setting '{key}'"),
            }
        }
        SettingsAction::Set { key, value } => {
            let snapshot = settings.set(&key, &value).await?;
            let shown = snapshot.masked_value(&key).unwrap_or_default();
            println!("{key} = {shown}");
        }
    }
    Ok(())
}
