//! ai4os-secrets - Per-user secrets on the AI4OS Vault
//!
//! Reads the OIDC access token from ACCESS_TOKEN, logs in to the Vault
//! deployment of the selected identity provider and works on the caller's
//! namespace (users/<sub>/).
//!
//! Commands:
//! - demo: Create, list, read and delete a sample secret 'test01'
//! - put <NAME> <KEY=VALUE>...: Create or replace a secret
//! - list [FOLDER]: List secrets in the namespace
//! - get <NAME>: Print a secret as JSON
//! - delete <NAME>: Delete a secret
//! - whoami: Show the subject and namespace from the token (no login)
//! - profiles: Show the identity-provider profiles

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ai4os_core::{ActiveProfile, VaultConfig};
use secrets::{
    open_session_from_env, token_from_env, AccessCredential, CredentialError, KvClient, Namespace,
    SecretRecord, Session, VaultClient, VaultError,
};

#[derive(Parser)]
#[command(name = "ai4os-secrets")]
#[command(about = "Per-user secrets on the AI4OS Vault, authenticated with your access token")]
#[command(version)]
#[command(after_help = r#"AUTHENTICATION:
    export ACCESS_TOKEN=<OIDC access token from your identity provider>
    The token's 'sub' claim selects your namespace: users/<sub>/

PROFILES:
    egi-production    EGI Check-in (production)  vault.services.fedcloud.eu
    egi-development   EGI Check-in (development) secrets.services.ai4os.eu
    egi-demo          EGI Check-in (demo)        secrets.services.ai4os.eu
    ai4eosc-iam       AI4EOSC IAM                secrets.services.ai4os.eu

    Select with --profile, AI4OS_VAULT_PROFILE, or 'profile' in
    ~/.config/ai4os/vault.toml"#)]
struct Cli {
    /// Identity-provider profile to use
    #[arg(long, global = true)]
    profile: Option<String>,

    /// Config file (default: ~/.config/ai4os/vault.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log requests to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create, list, read and delete a sample secret 'test01'
    Demo,

    /// Create or replace a secret (the whole record is replaced)
    Put {
        /// Secret name (e.g., test01, db/prod)
        name: String,
        /// Fields as KEY=VALUE
        #[arg(required = true, value_parser = parse_field)]
        fields: Vec<(String, String)>,
    },

    /// List secrets in your namespace or one of its folders
    List {
        /// Sub-folder to list (e.g., db)
        folder: Option<String>,
        /// Output as JSON for scripting
        #[arg(long)]
        json: bool,
    },

    /// Print a secret as JSON
    Get {
        /// Secret name
        name: String,
        /// Pretty-print the JSON
        #[arg(long)]
        pretty: bool,
    },

    /// Delete a secret
    Delete {
        /// Secret name to delete
        name: String,
    },

    /// Show the token subject and namespace without logging in
    Whoami,

    /// Show identity-provider profiles
    Profiles,
}

/// Parse a KEY=VALUE field
fn parse_field(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", s)),
    }
}

/// Filter used when RUST_LOG is unset
fn default_log_filter(verbose: bool) -> &'static str {
    if verbose {
        "warn,secrets=debug,ai4os_secrets=debug"
    } else {
        "warn,secrets=info,ai4os_secrets=info"
    }
}

/// Configuration resolved at startup
struct App {
    config: VaultConfig,
    active: ActiveProfile,
}

impl App {
    fn load(cli: &Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => VaultConfig::load_from(path),
            None => VaultConfig::load(),
        }
        .context("Failed to load configuration")?;

        let active = config
            .select(cli.profile.as_deref())
            .context("Failed to select profile")?;

        Ok(Self { config, active })
    }

    /// Decode the token, log in and scope to the caller's namespace
    fn session(&self) -> Result<Session<KvClient>> {
        let profile = &self.active.profile;
        tracing::debug!(profile = %self.active.name, address = %profile.address, "Connecting");

        let client = VaultClient::new(&profile.address, self.config.timeout())?;
        let session = open_session_from_env(&client, profile)?;
        Ok(session)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries secret data. RUST_LOG wins over -v.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(cli.verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let app = App::load(&cli)?;

    match cli.command {
        Some(Commands::Demo) | None => cmd_demo(&app.session()?),
        Some(Commands::Put { name, fields }) => cmd_put(&app.session()?, &name, fields),
        Some(Commands::List { folder, json }) => {
            cmd_list(&app.session()?, folder.as_deref(), json)
        }
        Some(Commands::Get { name, pretty }) => cmd_get(&app.session()?, &name, pretty),
        Some(Commands::Delete { name }) => cmd_delete(&app.session()?, &name),
        Some(Commands::Whoami) => cmd_whoami(&app),
        Some(Commands::Profiles) => cmd_profiles(&app),
    }
}

/// Walk through create, list, read and delete on 'test01'
fn cmd_demo(session: &Session<KvClient>) -> Result<()> {
    let record = SecretRecord::from([
        ("username".to_string(), "abcdef".to_string()),
        ("password".to_string(), "123456".to_string()),
    ]);

    println!("Creating/updating a secret 'test01'");
    session.upsert("test01", &record)?;

    println!("Listing secrets");
    let keys = session.list(None)?;
    println!("{}", keys.join("\n"));

    println!("Reading the secret 'test01'");
    let secret = session.read("test01")?;
    println!("{}", serde_json::to_string(&secret)?);

    println!("Deleting the secret 'test01'");
    session.delete("test01")?;

    Ok(())
}

/// Create or replace a secret
fn cmd_put(session: &Session<KvClient>, name: &str, fields: Vec<(String, String)>) -> Result<()> {
    let record: SecretRecord = fields.into_iter().collect();
    session.upsert(name, &record)?;

    println!("success: Secret stored: {}{}", session.namespace(), name);

    Ok(())
}

/// List secrets
fn cmd_list(session: &Session<KvClient>, folder: Option<&str>, json: bool) -> Result<()> {
    let keys = session.list(folder)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&keys)?);
        return Ok(());
    }

    for key in &keys {
        println!("{}", key);
    }

    Ok(())
}

/// Print a secret
fn cmd_get(session: &Session<KvClient>, name: &str, pretty: bool) -> Result<()> {
    let secret = session.read(name)?;

    let json = if pretty {
        serde_json::to_string_pretty(&secret)?
    } else {
        serde_json::to_string(&secret)?
    };
    println!("{}", json);

    Ok(())
}

/// Delete a secret
fn cmd_delete(session: &Session<KvClient>, name: &str) -> Result<()> {
    session.delete(name)?;
    println!("success: Secret deleted: {}{}", session.namespace(), name);
    Ok(())
}

/// Show who the token says we are; nothing is verified or sent
fn cmd_whoami(app: &App) -> Result<()> {
    let token = token_from_env()
        .map_err(VaultError::from)?
        .ok_or(VaultError::InvalidCredential(CredentialError::Missing))?;
    let credential = AccessCredential::decode_unverified(token).map_err(VaultError::from)?;
    let namespace = Namespace::for_subject(credential.subject())?;

    println!("Subject:   {}", credential.subject());
    if let Some(issuer) = &credential.claims().iss {
        println!("Issuer:    {}", issuer);
    }
    if let Some(expires) = credential.claims().expires_at() {
        let state = if credential.is_expired_at(chrono::Utc::now()) {
            " (expired)"
        } else {
            ""
        };
        println!("Expires:   {}{}", expires.to_rfc3339(), state);
    }
    println!("Namespace: {}", namespace);
    println!(
        "Profile:   {} ({})",
        app.active.name, app.active.profile.address
    );
    println!();
    println!("Claims are NOT verified; Vault checks the token at login.");

    Ok(())
}

/// Show the profiles and mark the active one
fn cmd_profiles(app: &App) -> Result<()> {
    for (name, profile) in app.config.profiles() {
        let marker = if name == app.active.name { "*" } else { " " };
        let role = if profile.role.is_empty() {
            "(none)"
        } else {
            profile.role.as_str()
        };
        println!("{} {}", marker, name);
        println!("    address:     {}", profile.address);
        println!("    auth path:   {}", profile.auth_path);
        println!("    role:        {}", role);
        println!("    mount point: {}", profile.mount_point);
    }

    Ok(())
}
