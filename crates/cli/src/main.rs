//! Promptly CLI
//!
//! Main entry point for the promptly command-line tool.
//! Manages personas, versioned prompt templates, rendered prompts and profiles.

mod commands;

use clap::{Parser, Subcommand};
use commands::{
    Context, PersonaCommand, ProfileCommand, PromptCommand, RolesCommand, TemplateCommand,
};
use promptly_core::{logging, AppConfig, AppError, AppResult, LogFormat, StorageBackend};
use promptly_store::TenantKey;
use std::path::PathBuf;

/// Promptly - persona-driven prompt templates with versioning
#[derive(Parser, Debug)]
#[command(name = "promptly")]
#[command(about = "Persona-driven prompt templates with versioning", long_about = None)]
#[command(version)]
struct Cli {
    /// Root directory for persisted data
    #[arg(short, long, global = true, env = "PROMPTLY_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Path to config file
    #[arg(short, long, global = true, env = "PROMPTLY_CONFIG")]
    config: Option<PathBuf>,

    /// Storage backend (json, sqlite)
    #[arg(short, long, global = true, env = "PROMPTLY_STORAGE")]
    storage: Option<StorageBackend>,

    /// Tenant user id (requires --email)
    #[arg(long, global = true, env = "PROMPTLY_USER_ID")]
    user: Option<String>,

    /// Tenant email (requires --user)
    #[arg(long, global = true, env = "PROMPTLY_USER_EMAIL")]
    email: Option<String>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "RUST_LOG")]
    log_level: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    no_color: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage personas
    Persona(PersonaCommand),

    /// Manage prompt templates and their versions
    Template(TemplateCommand),

    /// Generate and manage rendered prompts
    Prompt(PromptCommand),

    /// Manage profiles
    Profile(ProfileCommand),

    /// List known user and LLM roles
    Roles(RolesCommand),
}

fn tenant_key(user: Option<&str>, email: Option<&str>) -> AppResult<Option<TenantKey>> {
    match (user, email) {
        (Some(user), Some(email)) => Ok(Some(TenantKey::from_identity(user, email))),
        (None, None) => Ok(None),
        _ => Err(AppError::Config(
            "--user and --email must be given together".to_string(),
        )),
    }
}

fn main() -> AppResult<()> {
    // Parse command-line arguments first (needed for logging config)
    let cli = Cli::parse();

    // Load base configuration from the config file and environment
    let config = AppConfig::load_with(cli.data_dir.clone(), cli.config.clone())?;

    // Apply CLI overrides
    let config = config.with_overrides(
        cli.data_dir,
        cli.storage,
        cli.log_level,
        cli.log_json.then_some(LogFormat::Json),
        cli.verbose,
        cli.no_color,
    );
    config.validate()?;

    // Initialize logging with final configuration
    logging::init_logging(config.log_level.as_deref(), config.log_format, config.no_color)?;

    tracing::info!("Promptly CLI starting");
    tracing::debug!("Data dir: {:?}", config.data_dir);
    tracing::debug!("Storage: {}", config.storage);

    let tenant = tenant_key(cli.user.as_deref(), cli.email.as_deref())?;
    let context = Context::open(&config, tenant)?;

    let command_name = match &cli.command {
        Commands::Persona(_) => "persona",
        Commands::Template(_) => "template",
        Commands::Prompt(_) => "prompt",
        Commands::Profile(_) => "profile",
        Commands::Roles(_) => "roles",
    };
    let span = tracing::info_span!("command", name = command_name).entered();

    // Route to command handlers
    let result = match &cli.command {
        Commands::Persona(cmd) => cmd.execute(&context),
        Commands::Template(cmd) => cmd.execute(&context),
        Commands::Prompt(cmd) => cmd.execute(&context),
        Commands::Profile(cmd) => cmd.execute(&context),
        Commands::Roles(cmd) => cmd.execute(&context),
    };

    match &result {
        Ok(_) => tracing::info!("Command completed successfully"),
        Err(e) => tracing::error!(class = ?e.class(), "Command failed: {}", e),
    }
    drop(span);

    context.close()?;
    result
}
