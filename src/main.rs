//! authswitch -- interactive console over a switchable auth orchestrator.
//!
//! This is the application entry point. It wires together:
//!   - Configuration loading
//!   - Preference storage and provider selection
//!   - The two identity backends and the orchestrator
//!   - A line-oriented command loop
//!   - Graceful shutdown on SIGTERM / SIGINT

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use url::Url;

use authswitch::backend::{
    FirebaseAuth, IdpCredential, NextAuthClient, PopupHandler, UpstreamProvider,
};
use authswitch::config::Config;
use authswitch::{
    AuthContext, AuthOrchestrator, AuthSnapshot, BackendError, BackendFactory, ProviderKind,
    ProviderSelector, store,
};

// ---------------------------------------------------------------------------
// CLI argument parsing (minimal, no clap dependency)
// ---------------------------------------------------------------------------

struct CliArgs {
    config_path: PathBuf,
}

fn parse_args() -> CliArgs {
    let mut args = std::env::args().skip(1);
    let mut config_path = PathBuf::from("authswitch.toml");

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" | "-c" => {
                if let Some(path) = args.next() {
                    config_path = PathBuf::from(path);
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("authswitch {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {other}");
                eprintln!("Run with --help for usage information.");
                std::process::exit(1);
            }
        }
    }

    CliArgs { config_path }
}

fn print_usage() {
    println!(
        "\
authswitch {version} -- Switchable Firebase / NextAuth sign-in

USAGE:
    authswitch [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file [default: authswitch.toml]
    -h, --help             Print this help message
    -V, --version          Print version information

ENVIRONMENT:
    RUST_LOG               Override log level (e.g. RUST_LOG=debug)
    AUTHSWITCH_CONFIG      Alternative to --config flag
",
        version = env!("CARGO_PKG_VERSION")
    );
}

// ---------------------------------------------------------------------------
// Console commands
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    SignIn(String),
    SignOut,
    WhoAmI,
    Provider,
    Switch(ProviderKind),
    Refresh,
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let verb = words.next().unwrap_or_default().to_lowercase();
        let arg = words.next();
        match (verb.as_str(), arg) {
            ("signin", Some(source)) => Ok(Self::SignIn(source.to_string())),
            ("signin", None) => Err("usage: signin <source>".into()),
            ("signout", _) => Ok(Self::SignOut),
            ("whoami", _) => Ok(Self::WhoAmI),
            ("provider", _) => Ok(Self::Provider),
            ("switch", Some(kind)) => kind.parse().map(Self::Switch),
            ("switch", None) => Err("usage: switch <firebase|nextauth>".into()),
            ("refresh", _) => Ok(Self::Refresh),
            ("help" | "?", _) => Ok(Self::Help),
            ("quit" | "exit", _) => Ok(Self::Quit),
            (other, _) => Err(format!("Unknown command: {other} (try 'help')")),
        }
    }
}

const COMMANDS: &str = "\
    signin <source>               Sign in with an upstream source (google, github, ...)
    signout                       End the current session
    whoami                        Read the signed-in user from the active backend
    provider                      Show the active provider and published user
    switch <firebase|nextauth>    Change the active provider
    refresh                       Re-read the session and publish it
    quit                          Exit";

fn describe(snapshot: &AuthSnapshot) -> String {
    match &snapshot.user {
        Some(user) => format!("[{}] signed in as {}", snapshot.provider_label(), user.display_name()),
        None => format!("[{}] signed out", snapshot.provider_label()),
    }
}

/// Run one command. Returns `false` when the loop should stop.
async fn run_command(ctx: &AuthContext, command: Command) -> anyhow::Result<bool> {
    match command {
        Command::SignIn(source) => match ctx.sign_in(&source).await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => println!("Sign-in cancelled"),
            Err(e) => println!("Error: {e}"),
        },
        Command::SignOut => {
            if let Err(e) = ctx.sign_out().await {
                println!("Error: {e}");
            }
        }
        Command::WhoAmI => match ctx.current_user().await {
            Ok(Some(user)) => println!("{}", serde_json::to_string_pretty(&user)?),
            Ok(None) => println!("Not signed in"),
            Err(e) => println!("Error: {e}"),
        },
        Command::Provider => println!("{}", describe(&ctx.snapshot()?)),
        Command::Switch(kind) => match ctx.switch_provider(kind).await {
            Ok(()) => println!("Active provider: {}", ctx.provider_label()?),
            Err(e) => println!("Error: {e}"),
        },
        Command::Refresh => {
            if let Err(e) = ctx.refresh().await {
                println!("Error: {e}");
            }
        }
        Command::Help => println!("{COMMANDS}"),
        Command::Quit => return Ok(false),
    }
    Ok(true)
}

/// Read one line from stdin without blocking the runtime. `None` on EOF.
async fn read_line() -> Option<String> {
    tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        match std::io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    })
    .await
    .ok()
    .flatten()
}

// ---------------------------------------------------------------------------
// Console popup
// ---------------------------------------------------------------------------

/// Stands in for the browser popup: the user completes the upstream consent
/// elsewhere and pastes the issued token.
struct ConsolePopup;

#[async_trait]
impl PopupHandler for ConsolePopup {
    async fn open(&self, provider: &UpstreamProvider) -> Result<IdpCredential, BackendError> {
        let kind = if provider.provider_id == "github.com" {
            "access token"
        } else {
            "ID token"
        };
        println!(
            "Sign in with {} (scopes: {}) and paste the {kind}; empty line cancels:",
            provider.provider_id,
            if provider.scopes.is_empty() {
                "default".to_string()
            } else {
                provider.scopes.join(" ")
            }
        );

        let token = read_line().await.unwrap_or_default();
        if token.is_empty() {
            return Err(BackendError::Cancelled);
        }
        Ok(if provider.provider_id == "github.com" {
            IdpCredential {
                access_token: Some(token),
                id_token: None,
            }
        } else {
            IdpCredential {
                access_token: None,
                id_token: Some(token),
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> anyhow::Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build Tokio runtime");
    let result = runtime.block_on(async_main());
    // A pending stdin read must not hold the process open.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}

async fn async_main() -> anyhow::Result<()> {
    // 1. Parse CLI arguments
    let cli = parse_args();

    // Allow AUTHSWITCH_CONFIG env var as alternative to --config flag
    let config_path = std::env::var("AUTHSWITCH_CONFIG")
        .map(PathBuf::from)
        .unwrap_or(cli.config_path);

    // 2. Load configuration
    let config = Config::load(&config_path)?;

    // 3. Initialize tracing/logging
    init_tracing(&config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        "Starting authswitch"
    );

    // 4. Preference storage
    let selector = ProviderSelector::new(store::open(&config.preferences)?);

    // 5. Backends and orchestrator
    let factory = build_factory(&config)?;
    let orchestrator = AuthOrchestrator::initialize(Arc::new(factory), selector).await?;
    let ctx = AuthContext::new();
    ctx.provide(orchestrator.clone());

    let _changes = orchestrator.on_auth_state_changed(Arc::new(|snapshot: &AuthSnapshot| {
        println!("* {}", describe(snapshot));
    }));

    println!("{}", describe(&orchestrator.snapshot()));
    println!("Type 'help' for commands.");

    // 6. Command loop
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    loop {
        let line = tokio::select! {
            line = read_line() => line,
            () = &mut shutdown => break,
        };
        let Some(line) = line else { break };
        if line.is_empty() {
            continue;
        }

        let keep_going = match line.parse::<Command>() {
            Ok(command) => run_command(&ctx, command).await?,
            Err(e) => {
                println!("{e}");
                true
            }
        };
        if !keep_going {
            break;
        }
    }

    orchestrator.close().await;
    tracing::info!("authswitch stopped");
    Ok(())
}

fn build_factory(config: &Config) -> anyhow::Result<BackendFactory> {
    let mut client = NextAuthClient::new(config.nextauth.auth_url()?)?.with_redirect_handler(
        Arc::new(|url: &Url| {
            println!("Continue sign-in in your browser: {url}");
        }),
    );
    if let Some(callback_url) = &config.nextauth.callback_url {
        client = client.with_callback_url(callback_url.clone());
    }
    let mut factory =
        BackendFactory::new().with_nextauth(Arc::new(client), config.nextauth.session_refresh());

    match &config.firebase {
        Some(firebase) if !firebase.api_key.is_empty() => {
            let endpoint = Url::parse(&firebase.identity_toolkit_url).map_err(|e| {
                anyhow::anyhow!(
                    "Invalid firebase.identity_toolkit_url '{}': {e}",
                    firebase.identity_toolkit_url
                )
            })?;
            let auth = FirebaseAuth::new(firebase.api_key.clone(), Arc::new(ConsolePopup))
                .with_endpoint(endpoint)
                .with_request_uri(firebase.request_uri.clone());
            factory = factory.with_firebase(Arc::new(auth), firebase.upstream_credentials());
        }
        Some(_) => tracing::warn!("firebase.api_key is empty; Firebase disabled"),
        None => tracing::debug!("No [firebase] section; Firebase disabled"),
    }

    Ok(factory)
}

// ---------------------------------------------------------------------------
// Tracing initialization
// ---------------------------------------------------------------------------

/// Set up the tracing subscriber based on configuration.
fn init_tracing(config: &Config) {
    // RUST_LOG env var takes precedence over config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.logging.level;
        EnvFilter::new(format!("authswitch={level},warn"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr);

    if config.logging.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

// ---------------------------------------------------------------------------
// Graceful shutdown
// ---------------------------------------------------------------------------

/// Wait for a shutdown signal (SIGTERM or SIGINT / Ctrl+C).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C)");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
