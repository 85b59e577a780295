//! logwall agent entrypoint: settings, logging, poller, HTTP/WS server.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

use logwall_agent::config::{AgentConfig, CliArgs, Settings, DEFAULT_PASSWORD, DEFAULT_SETTINGS_FILE, USAGE};
use logwall_agent::poll::spawn_poller;
use logwall_agent::server;
use logwall_agent::state::AppState;

type FilterHandle = reload::Handle<EnvFilter, Registry>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = match CliArgs::parse(std::env::args()) {
        Ok(a) => a,
        Err(msg) => {
            eprintln!("{msg}");
            std::process::exit(2);
        }
    };
    if args.help {
        println!("{USAGE}");
        return Ok(());
    }

    let filter = init_logging();

    let settings_path = args
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE));
    let settings = Settings::load_or_create(&settings_path)?;
    if settings.debug {
        raise_to_debug(&filter);
    }

    let mut config = AgentConfig::from_env(settings);
    config.apply_cli(&args);

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("creating log dir {}", config.log_dir.display()))?;

    let s = &config.settings;
    info!(
        port = s.port,
        poll_secs = s.poll_period().as_secs_f64(),
        debug = s.debug,
        log_dir = %config.log_dir.display(),
        prefixes = ?config.prefixes,
        settings = %settings_path.display(),
        "logwall agent starting"
    );
    if s.password == DEFAULT_PASSWORD {
        warn!("using the default password, change it in {}", settings_path.display());
    }

    let period = s.poll_period();
    let port = s.port;
    let state = AppState::new(config);
    let listener = server::bind(port).await?;
    let _poller = spawn_poller(state.clone(), period);
    server::serve(listener, state).await?;
    Ok(())
}

/// `RUST_LOG` wins; otherwise `info` until the settings say debug.
fn init_logging() -> Option<FilterHandle> {
    let from_env = EnvFilter::try_from_default_env().ok();
    let env_set = from_env.is_some();
    let (filter, handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .init();
    (!env_set).then_some(handle)
}

fn raise_to_debug(handle: &Option<FilterHandle>) {
    if let Some(h) = handle {
        if let Err(e) = h.reload(EnvFilter::new("debug")) {
            warn!("cannot raise log level: {e}");
        }
    }
}
