//! `IBM i Connect` CLI - Command-line host for the connection lifecycle core
//!
//! Provides commands for managing stored IBM i connections and for driving a
//! connection through the orchestrator from a terminal.

mod console;
mod tcp;

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use ibmiconn_core::config::{ConfigStore, TomlConfigStore};
use ibmiconn_core::storage::{JsonFileBackend, Storage, STORAGE_FILE};
use ibmiconn_core::{
    handler, CancelHandle, ConnectOptions, ConnectionOrchestrator, EventKind, HandlerError,
    LifecycleState, StoredConnection,
};
use tracing_subscriber::EnvFilter;

use console::ConsolePrompter;
use tcp::TcpTransport;

/// Owner key of the handlers the CLI subscribes
const SUBSCRIBER: &str = "ibmiconn-cli";

/// `IBM i Connect` command-line interface
#[derive(Parser)]
#[command(name = "ibmiconn-cli")]
#[command(author, version, about = "IBM i Connect command-line interface")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Directory holding connections, configuration and storage files
    #[arg(short, long, global = true)]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// List stored connections
    #[command(about = "List all stored connections")]
    List {
        /// Output format for the connection list
        #[arg(short, long, default_value = "table", value_enum)]
        format: OutputFormat,
    },

    /// Add a connection
    #[command(about = "Add a new connection definition")]
    Add {
        /// Name for the new connection
        #[arg(short, long)]
        name: String,

        /// Host address (hostname or IP)
        #[arg(short = 'H', long)]
        host: String,

        /// SSH port (defaults to 22)
        #[arg(short, long)]
        port: Option<u16>,

        /// User profile to sign on with
        #[arg(short, long)]
        user: String,

        /// Path to SSH private key file
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Delete a connection
    #[command(about = "Delete a connection and everything stored for it")]
    Delete {
        /// Connection name
        name: String,
    },

    /// Show connection details
    #[command(about = "Show a connection, its configuration and cached server settings")]
    Show {
        /// Connection name
        name: String,
    },

    /// Show recently used connections
    #[command(about = "Show recently used connections, most recent first")]
    Last,

    /// Connect to a server
    #[command(about = "Connect and stay connected until interrupted")]
    Connect {
        /// Connection name
        name: String,

        /// Connection timeout in seconds
        #[arg(short, long, default_value = "10")]
        timeout: u64,

        /// Read the password from this environment variable
        #[arg(long)]
        password_env: Option<String>,

        /// Detect server components even if cached
        #[arg(long)]
        reload: bool,

        /// Offer another attempt after a failure
        #[arg(long)]
        retry: bool,

        /// Never prompt; decline every question
        #[arg(long)]
        non_interactive: bool,
    },
}

/// Output format for lists
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// JSON format
    Json,
}

fn main() {
    // Initialize logging with environment filter (RUST_LOG)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = tokio::runtime::Runtime::new()
        .map_err(|e| CliError::Config(format!("Failed to create async runtime: {e}")))
        .and_then(|runtime| runtime.block_on(run(cli)));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let context = Context::load(cli.config_dir).await?;

    match cli.command {
        Commands::List { format } => cmd_list(&context, format),
        Commands::Add {
            name,
            host,
            port,
            user,
            key,
        } => cmd_add(&context, name, host, port, user, key).await,
        Commands::Delete { name } => cmd_delete(&context, &name).await,
        Commands::Show { name } => cmd_show(&context, &name),
        Commands::Last => {
            cmd_last(&context);
            Ok(())
        }
        Commands::Connect {
            name,
            timeout,
            password_env,
            reload,
            retry,
            non_interactive,
        } => {
            let args = ConnectArgs {
                timeout: Duration::from_secs(timeout),
                password_env,
                reload,
                retry,
                non_interactive,
            };
            cmd_connect(&context, &name, args).await
        }
    }
}

/// The loaded façades every command works on
struct Context {
    config_store: Arc<TomlConfigStore>,
    storage: Arc<Storage>,
}

impl Context {
    async fn load(config_dir: Option<PathBuf>) -> Result<Self, CliError> {
        let (config_store, backend) = match config_dir {
            Some(dir) => (
                TomlConfigStore::with_config_dir(dir.clone()),
                JsonFileBackend::new(dir.join(STORAGE_FILE)),
            ),
            None => (
                TomlConfigStore::new()
                    .map_err(|e| CliError::Config(format!("Failed to initialize config: {e}")))?,
                JsonFileBackend::in_data_dir()
                    .map_err(|e| CliError::Config(format!("Failed to initialize storage: {e}")))?,
            ),
        };

        config_store
            .load()
            .await
            .map_err(|e| CliError::Config(format!("Failed to load configuration: {e}")))?;
        let storage = Storage::new(Arc::new(backend));
        storage
            .load()
            .await
            .map_err(|e| CliError::Config(format!("Failed to load storage: {e}")))?;

        Ok(Self {
            config_store: Arc::new(config_store),
            storage: Arc::new(storage),
        })
    }

    fn find(&self, name: &str) -> Result<StoredConnection, CliError> {
        self.config_store
            .find_connection(name)
            .ok_or_else(|| CliError::ConnectionNotFound(name.to_string()))
    }

    async fn save(&self) -> Result<(), CliError> {
        self.config_store
            .save()
            .await
            .map_err(|e| CliError::Config(format!("Failed to save configuration: {e}")))?;
        self.storage
            .save()
            .await
            .map_err(|e| CliError::Config(format!("Failed to save storage: {e}")))
    }
}

/// List connections command handler
fn cmd_list(context: &Context, format: OutputFormat) -> Result<(), CliError> {
    let connections = context.config_store.connections();
    match format {
        OutputFormat::Table => println!("{}", format_table(&connections)),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&connections)
                .map_err(|e| CliError::Config(format!("Failed to serialize to JSON: {e}")))?;
            println!("{json}");
        }
    }
    Ok(())
}

/// Format connections as a table string
#[must_use]
pub fn format_table(connections: &[StoredConnection]) -> String {
    if connections.is_empty() {
        return "No connections found.".to_string();
    }

    let name_width = connections
        .iter()
        .map(|c| c.name.len())
        .max()
        .unwrap_or(4)
        .max(4);
    let host_width = connections
        .iter()
        .map(|c| c.host.len())
        .max()
        .unwrap_or(4)
        .max(4);

    let mut output = String::new();
    let _ = writeln!(
        output,
        "{:<name_width$}  {:<host_width$}  {:>5}  USER",
        "NAME", "HOST", "PORT"
    );
    for conn in connections {
        let _ = writeln!(
            output,
            "{:<name_width$}  {:<host_width$}  {:>5}  {}",
            conn.name, conn.host, conn.port, conn.username
        );
    }
    output.trim_end().to_string()
}

/// Add connection command handler
async fn cmd_add(
    context: &Context,
    name: String,
    host: String,
    port: Option<u16>,
    user: String,
    key: Option<String>,
) -> Result<(), CliError> {
    if context.config_store.find_connection(&name).is_some() {
        return Err(CliError::Config(format!("Connection '{name}' already exists")));
    }

    let mut connection = StoredConnection::new(name, host, user);
    if let Some(port) = port {
        connection.port = port;
    }
    connection.private_key_path = key;

    context
        .config_store
        .upsert_connection(connection.clone())
        .await
        .map_err(|e| CliError::Config(format!("Invalid connection: {e}")))?;
    context.save().await?;

    println!(
        "Added connection '{}' ({}@{}:{})",
        connection.name, connection.username, connection.host, connection.port
    );
    Ok(())
}

/// Delete connection command handler
async fn cmd_delete(context: &Context, name: &str) -> Result<(), CliError> {
    let connection = context.find(name)?;

    context
        .config_store
        .remove_connection(&connection.name)
        .await
        .map_err(|e| CliError::Config(format!("Failed to delete connection: {e}")))?;
    context.storage.delete_connection_state(&connection.name);
    context
        .storage
        .remove_last_connection(&connection.name)
        .map_err(|e| CliError::Config(format!("Failed to update storage: {e}")))?;
    context.save().await?;

    println!("Deleted connection '{}'", connection.name);
    Ok(())
}

/// Show connection details command handler
fn cmd_show(context: &Context, name: &str) -> Result<(), CliError> {
    let connection = context.find(name)?;
    let config = context.config_store.get(&connection.name);

    println!("Connection Details:");
    println!("  Name:            {}", connection.name);
    println!("  Host:            {}", connection.host);
    println!("  Port:            {}", connection.port);
    println!("  User:            {}", connection.username);
    if let Some(ref key) = connection.private_key_path {
        println!("  Key Path:        {key}");
    }
    println!("  Home Directory:  {}", config.home_directory);
    println!("  Current Library: {}", config.current_library);
    println!("  Library List:    {}", config.library_list.join(", "));
    println!("  Temp Library:    {}", config.temp_library);

    if let Some(settings) = context.storage.get_server_settings(&connection.name) {
        println!(
            "  Components (detected {}):",
            settings.detected_at.format("%Y-%m-%d %H:%M")
        );
        for (id, state) in &settings.components {
            println!("    {id:<10} {state:?}");
        }
    }
    Ok(())
}

/// Last connections command handler
fn cmd_last(context: &Context) {
    let last = context.storage.get_last_connections();
    if last.is_empty() {
        println!("No recent connections.");
        return;
    }
    for entry in last {
        println!(
            "{}  {}",
            entry.timestamp.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M"),
            entry.name
        );
    }
}

struct ConnectArgs {
    timeout: Duration,
    password_env: Option<String>,
    reload: bool,
    retry: bool,
    non_interactive: bool,
}

/// Connect command handler
async fn cmd_connect(context: &Context, name: &str, args: ConnectArgs) -> Result<(), CliError> {
    let connection = context.find(name)?;
    let password = args
        .password_env
        .as_deref()
        .map(|var| {
            std::env::var(var)
                .map_err(|_| CliError::Config(format!("Environment variable {var} is not set")))
        })
        .transpose()?;

    let orchestrator = ConnectionOrchestrator::builder()
        .transport(Arc::new(TcpTransport))
        .storage(Arc::clone(&context.storage))
        .config_store(Arc::clone(&context.config_store) as Arc<dyn ConfigStore>)
        .prompter(Arc::new(ConsolePrompter {
            non_interactive: args.non_interactive,
        }))
        .connect_timeout(args.timeout)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;
    subscribe_console(&orchestrator);

    println!(
        "Connecting to '{}' ({}:{})...",
        connection.name, connection.host, connection.port
    );

    let cancel = CancelHandle::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };
    let options = ConnectOptions::new(connection.to_credentials(password))
        .reconnect_on_failure(args.retry)
        .reload_settings(args.reload)
        .with_cancel(cancel);
    let result = orchestrator.connect(options).await;
    interrupt.abort();

    if !result.success() {
        return Err(CliError::ConnectionFailed(
            result.detail().unwrap_or("unknown error").to_string(),
        ));
    }

    println!("Press Ctrl+C to disconnect.");
    let mut state = orchestrator.watch_state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            orchestrator
                .disconnect()
                .await
                .map_err(|e| CliError::Disconnect(e.to_string()))?;
        }
        _ = state.wait_for(|s| *s == LifecycleState::Idle) => {}
    }
    Ok(())
}

/// Subscribes the console notifications and the current-library history
fn subscribe_console(orchestrator: &Arc<ConnectionOrchestrator>) {
    let weak = Arc::downgrade(orchestrator);
    orchestrator.subscribe(
        SUBSCRIBER,
        EventKind::Connected,
        "announce",
        handler(move || {
            let weak = weak.clone();
            async move {
                if let Some(connection) = weak.upgrade().and_then(|o| o.connection()) {
                    println!("Connected to '{}'", connection.name());
                }
                Ok(())
            }
        }),
        false,
    );

    let weak = Arc::downgrade(orchestrator);
    orchestrator.subscribe(
        SUBSCRIBER,
        EventKind::Connected,
        "remember-library",
        handler(move || {
            let weak = weak.clone();
            async move {
                let Some(orchestrator) = weak.upgrade() else {
                    return Ok(());
                };
                if let Some(config) = orchestrator.config() {
                    orchestrator
                        .storage()
                        .add_previous_cur_lib(&config.current_library)?;
                    orchestrator.storage().save().await?;
                }
                Ok::<(), HandlerError>(())
            }
        }),
        false,
    );

    orchestrator.subscribe(
        SUBSCRIBER,
        EventKind::Disconnected,
        "announce",
        handler(|| async {
            println!("Disconnected.");
            Ok(())
        }),
        false,
    );
}

/// Exit codes for CLI operations
pub mod exit_codes {
    /// Success - operation completed successfully
    pub const SUCCESS: i32 = 0;
    /// General error - configuration, validation, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - connection could not be established or was not found
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Connection not found
    #[error("Connection not found: {0}")]
    ConnectionNotFound(String),

    /// Connect attempt failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Disconnect refused
    #[error("Disconnect failed: {0}")]
    Disconnect(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, validation, disconnect, IO)
    /// - 2: Connection failure (connect failed, connection not found)
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed(_) | Self::ConnectionNotFound(_) => {
                exit_codes::CONNECTION_FAILURE
            }
            Self::Config(_) | Self::Disconnect(_) | Self::Io(_) => exit_codes::GENERAL_ERROR,
        }
    }
}
