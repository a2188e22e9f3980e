use anyhow::{bail, Context, Result};
use azstack::arm::auth::ServicePrincipal;
use azstack::arm::client::ArmClient;
use azstack::arm::http::format_arm_error;
use azstack::config::Config;
use azstack::registration::{ensure_registered, plan};
use azstack::{AzureResourceId, MalformedResourceId, ReconcileError};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Resource ID parsing and provider registration for Azure Stack
#[derive(Parser, Debug)]
#[command(name = "azstack", version = azstack::VERSION, about, long_about = None)]
struct Args {
    /// Resource manager endpoint (defaults to public Azure)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    /// Subscription to operate on
    #[arg(short, long, global = true)]
    subscription: Option<String>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a resource ID and print its components
    ParseId {
        id: String,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// List resource providers and their registration state
    Providers,
    /// Register the required resource providers
    Register {
        /// Namespace to require (repeatable; replaces the configured set)
        #[arg(short, long = "provider")]
        providers: Vec<String>,
        /// Overall deadline in seconds
        #[arg(long)]
        timeout: Option<u64>,
        /// Register calls issued at once
        #[arg(long)]
        concurrency: Option<usize>,
        /// Only print what would be registered
        #[arg(long)]
        dry_run: bool,
    },
    /// GET a resource by ID
    Show {
        id: String,
        #[arg(long, default_value = "2018-05-01")]
        api_version: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("azstack {} started with log level: {:?}", azstack::VERSION, level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("azstack").join("azstack.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".azstack").join("azstack.log");
    }
    PathBuf::from("azstack.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let _log_guard = match setup_logging(args.log_level) {
        Ok(guard) => guard,
        Err(err) => {
            eprintln!("Warning: {err:#}");
            None
        }
    };

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("{:#}", err);
            eprintln!("Error: {}", describe(&err));
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    let mut config = Config::load();
    config.apply_env();
    if let Some(endpoint) = args.endpoint {
        config.endpoint = Some(endpoint);
    }
    if let Some(subscription) = args.subscription {
        config.subscription_id = Some(subscription);
    }

    match args.command {
        Command::ParseId { id, json } => parse_id(&id, json),
        Command::Providers => list_providers(&connect(&config).await?).await,
        Command::Register {
            providers,
            timeout,
            concurrency,
            dry_run,
        } => {
            if !providers.is_empty() {
                config.required_providers = Some(providers);
            }
            if timeout.is_some() {
                config.registration_timeout_secs = timeout;
            }
            if concurrency.is_some() {
                config.concurrency = concurrency;
            }
            register(&config, dry_run).await
        }
        Command::Show { id, api_version } => {
            let client = connect(&config).await?;
            let resource = client.get_resource(&id, &api_version).await?;
            println!("{}", serde_json::to_string_pretty(&resource)?);
            Ok(())
        }
    }
}

fn parse_id(id: &str, json: bool) -> Result<()> {
    let parsed = AzureResourceId::parse(id)?;

    if json {
        let value = serde_json::json!({
            "id": parsed.to_string(),
            "subscriptionId": parsed.subscription_id,
            "resourceGroup": parsed.resource_group,
            "provider": parsed.provider,
            "resourceType": parsed.resource_type(),
            "name": parsed.name(),
            "path": parsed
                .path
                .iter()
                .map(|(key, value)| serde_json::json!({"type": key, "name": value}))
                .collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("Subscription:   {}", parsed.subscription_id);
    println!("Resource group: {}", parsed.resource_group);
    println!("Provider:       {}", parsed.provider);
    for (key, value) in &parsed.path {
        println!("  {key}: {value}");
    }
    Ok(())
}

/// Build a client from the layered configuration
async fn connect(config: &Config) -> Result<ArmClient> {
    let Some(subscription_id) = config.subscription_id.as_deref() else {
        bail!("No subscription configured. Use --subscription or set ARM_SUBSCRIPTION_ID.");
    };
    let (Some(tenant_id), Some(client_id)) = (config.tenant_id.as_deref(), config.client_id.as_deref()) else {
        bail!("ARM_TENANT_ID and ARM_CLIENT_ID must be set for service principal authentication.");
    };
    let client_secret = std::env::var("ARM_CLIENT_SECRET").context("ARM_CLIENT_SECRET is not set")?;

    let endpoint = config.effective_endpoint();
    tracing::info!("Connecting to {} as {}", endpoint, client_id);

    ArmClient::connect(
        &endpoint,
        subscription_id,
        ServicePrincipal {
            tenant_id: tenant_id.to_string(),
            client_id: client_id.to_string(),
            client_secret,
        },
    )
    .await
}

async fn list_providers(client: &ArmClient) -> Result<()> {
    let mut providers = client.list_providers().await?;
    providers.sort_by_key(|p| p.namespace.to_ascii_lowercase());

    for provider in providers {
        println!("{:<50} {}", provider.namespace, provider.registration_state);
    }
    Ok(())
}

async fn register(config: &Config, dry_run: bool) -> Result<()> {
    let required = config.required_provider_set();
    let client = connect(config).await?;

    if dry_run {
        let pending = plan(&client, &required).await?;
        if pending.is_empty() {
            println!("All required resource providers are registered.");
        } else {
            println!("Would register: {}", pending.join(", "));
        }
        return Ok(());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling registration");
            on_ctrl_c.cancel();
        }
    });

    let report = ensure_registered(
        &client,
        &required,
        &config.reconcile_policy(),
        config.registration_timeout(),
        &cancel,
        config.skip_provider_registration,
    )
    .await?;

    if config.skip_provider_registration {
        println!("Provider registration skipped.");
    } else if report.registered.is_empty() {
        println!("All required resource providers are registered.");
    } else {
        println!(
            "Registered {} after {} status check(s).",
            report.registered.join(", "),
            report.rounds
        );
    }
    Ok(())
}

/// User-facing message for a failed command
fn describe(err: &anyhow::Error) -> String {
    // the reason is the useful part and may be long
    if let Some(malformed) = err.downcast_ref::<MalformedResourceId>() {
        return malformed.to_string();
    }

    match err.downcast_ref::<ReconcileError>() {
        Some(ReconcileError::Api { namespace, source }) => {
            let message = format_arm_error(&anyhow::Error::new(source.clone()));
            match namespace {
                Some(ns) => format!("{ns}: {message}"),
                None => message,
            }
        }
        Some(reconcile) => reconcile.to_string(),
        None => format_arm_error(err),
    }
}
