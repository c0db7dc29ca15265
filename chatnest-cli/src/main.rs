use anyhow::{Context, Result};
use chatnest_core::config::{Config, NotificationTransport};
use chatnest_core::core_chat::storage::{migrate, open_pool, ChatPool};
use chatnest_core::core_chat::{
    ChatSqlStore, CollabManagerImpl, CollabService, LogNotifier, Notifier, SmtpNotifier,
    TokenCodec, TokenSecret,
};
use chatnest_core::http::{shutdown_signal, ApiServer, AppState};
use chatnest_core::logging::{init_logging_with_config, LogConfig, LogLevel};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "chatnest")]
#[command(author, version, about = "ChatNest collaboration server", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Override the log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable JSON formatted logging
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API
    Serve {
        /// Address to listen on, overrides server.bind_address
        #[arg(long)]
        bind: Option<SocketAddr>,

        /// SQLite database file, overrides store.database_path
        #[arg(long)]
        database: Option<String>,
    },

    /// Apply pending schema migrations and exit
    Migrate {
        /// SQLite database file, overrides store.database_path
        #[arg(long)]
        database: Option<String>,
    },

    /// Print a fresh hex signing secret for invitations.signing_secret
    GenSecret,

    /// Validate the configuration and print it with secrets redacted
    CheckConfig,

    /// Verify an invitation token against the configured secret
    InspectToken {
        token: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut config = load_config(args.config.as_deref())?;

    if let Some(level) = &args.log_level {
        config.logging.level = level.clone();
    }
    if args.json_logs {
        config.logging.json_format = true;
    }

    // gen-secret output is piped into files; keep stdout clean
    let log_config = match args.command {
        Command::GenSecret => LogConfig::new(LogLevel::Error),
        _ => LogConfig::from_settings(&config.logging)?,
    };
    init_logging_with_config(log_config)?;

    match args.command {
        Command::Serve { bind, database } => {
            if let Some(bind) = bind {
                config.server.bind_address = bind;
            }
            if let Some(database) = database {
                config.store.database_path = expand_path(&database)?;
            }
            serve(config).await
        }
        Command::Migrate { database } => {
            if let Some(database) = database {
                config.store.database_path = expand_path(&database)?;
            }
            let pool = connect(&config)?;
            let applied = migrate(&pool)?;
            info!(
                applied,
                database = %config.store.database_path.display(),
                "Migrations complete"
            );
            Ok(())
        }
        Command::GenSecret => {
            println!("{}", TokenSecret::generate().to_hex());
            Ok(())
        }
        Command::CheckConfig => {
            let mut shown = config.clone();
            for secret in [
                &mut shown.invitations.signing_secret,
                &mut shown.invitations.signing_passphrase,
                &mut shown.notifications.smtp.password,
            ] {
                if secret.is_some() {
                    *secret = Some("<redacted>".to_string());
                }
            }
            println!("{}", serde_json::to_string_pretty(&shown)?);
            if !config.invitations.has_signing_key() {
                warn!("No invitation signing secret configured; serve will use an ephemeral one");
            }
            if config.notifications.transport == NotificationTransport::Log {
                warn!("notifications.transport is \"log\"; invitation tokens will not be delivered");
            }
            Ok(())
        }
        Command::InspectToken { token } => {
            let secret = config
                .invitations
                .token_secret()
                .context("inspect-token needs invitations.signing_secret or signing_passphrase")?;
            let claims = TokenCodec::new(secret)
                .parse(&token)
                .context("token rejected")?;
            let report = serde_json::json!({
                "invitation_id": claims.invitation_id.to_string(),
                "expires_at": claims.expires_at.as_millis(),
            });
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
    }
}

/// File (if given) first, then `CHATNEST_*` environment variables
fn load_config(path: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let path = expand_path(path)?;
            Config::from_file(&path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => Config::default(),
    };
    config.apply_vars(|name| std::env::var(name).ok())?;
    config.validate()?;
    Ok(config)
}

fn expand_path(path: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(path).with_context(|| format!("cannot expand {}", path))?;
    Ok(PathBuf::from(expanded.as_ref()))
}

fn connect(config: &Config) -> Result<ChatPool> {
    let path = &config.store.database_path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let pool = open_pool(path, config.store.pool_size, config.store.busy_timeout)?;
    Ok(pool)
}

fn notifier(config: &Config) -> Result<Arc<dyn Notifier>> {
    match config.notifications.transport {
        NotificationTransport::Smtp => {
            let settings = config.notifications.smtp_settings()?;
            info!(host = %settings.host, port = settings.port, "Invitations are mailed over SMTP");
            let notifier = SmtpNotifier::new(settings).context("failed to set up SMTP delivery")?;
            Ok(Arc::new(notifier))
        }
        NotificationTransport::Log => {
            warn!("==============================================================");
            warn!("notifications.transport is \"log\": invitation tokens are NOT");
            warn!("delivered to anyone. Configure [notifications.smtp] for real use.");
            warn!("==============================================================");
            Ok(Arc::new(LogNotifier))
        }
    }
}

async fn serve(config: Config) -> Result<()> {
    let secret = if config.invitations.has_signing_key() {
        config.invitations.token_secret()?
    } else {
        warn!("No invitation signing secret configured; using an ephemeral one, tokens will not survive a restart");
        TokenSecret::generate()
    };

    let notifier = notifier(&config)?;
    let store = ChatSqlStore::new(connect(&config)?)?;
    let manager = CollabManagerImpl::new(store, TokenCodec::new(secret));
    let service = CollabService::with_policy(manager, notifier, config.invitations.policy());
    let state = AppState::new(service).with_request_timeout(config.server.request_timeout);

    let bound = ApiServer::new(state, config.server.bind_address.to_string())
        .bind()
        .await?;

    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server = tokio::spawn(bound.serve(async {
        let _ = stop_rx.await;
    }));

    shutdown_signal().await;
    let _ = stop_tx.send(());

    match tokio::time::timeout(config.server.shutdown_timeout, server).await {
        Ok(joined) => joined.context("server task panicked")??,
        Err(_) => warn!(
            timeout_secs = config.server.shutdown_timeout.as_secs(),
            "Shutdown timed out with requests still in flight"
        ),
    }

    info!("ChatNest stopped");
    Ok(())
}
