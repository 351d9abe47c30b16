// Beacon - Market Data Stream Server

use anyhow::Context;
use beacon::exchange::{BinanceClient, ExchangeRegistry};
use beacon::logging::init_logging;
use beacon::store::{CandleStore, FetchSetStore, SqliteStore};
use beacon::{api, Config, DataService};
use clap::{Arg, ArgAction, Command};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// CLI arguments structure
#[derive(Debug)]
struct CliArgs {
    config_file: Option<String>,
    host: Option<String>,
    api_port: Option<u16>,
    log_level: Option<String>,
    database_url: Option<String>,
    no_fetch: bool,
}

/// Parse command line arguments
fn parse_cli_args() -> CliArgs {
    let matches = Command::new("beacon")
        .version(VERSION)
        .about("Market data fetch, transform, and subscription server")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Configuration file path"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .help("Bind address override"),
        )
        .arg(
            Arg::new("api-port")
                .short('p')
                .long("api-port")
                .value_name("PORT")
                .value_parser(clap::value_parser!(u16))
                .help("Control API port override"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("Log level override (trace, debug, info, warn, error)"),
        )
        .arg(
            Arg::new("database-url")
                .short('d')
                .long("database-url")
                .value_name("URL")
                .help("Database URL override"),
        )
        .arg(
            Arg::new("no-fetch")
                .long("no-fetch")
                .action(ArgAction::SetTrue)
                .help("Do not start the persisted fetch set on boot"),
        )
        .get_matches();

    CliArgs {
        config_file: matches.get_one::<String>("config").cloned(),
        host: matches.get_one::<String>("host").cloned(),
        api_port: matches.get_one::<u16>("api-port").copied(),
        log_level: matches.get_one::<String>("log-level").cloned(),
        database_url: matches.get_one::<String>("database-url").cloned(),
        no_fetch: matches.get_flag("no-fetch"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = parse_cli_args();

    let mut config = Config::load(args.config_file.as_deref().map(Path::new))
        .context("failed to load configuration")?;
    if let Some(host) = args.host {
        config.server.host = host;
    }
    if let Some(port) = args.api_port {
        config.server.api_port = port;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }
    if let Some(url) = args.database_url {
        config.database.url = url;
    }
    if args.no_fetch {
        config.fetch.autostart = false;
    }

    init_logging(&config.logging).context("failed to initialise logging")?;
    info!(version = VERSION, "beacon starting");

    let store = Arc::new(
        SqliteStore::connect(&config.database.url)
            .await
            .context("failed to open candle store")?,
    );

    let exchanges = Arc::new(ExchangeRegistry::new());
    exchanges.register(Arc::new(BinanceClient::new()));

    let candle_store: Arc<dyn CandleStore> = store.clone();
    let fetch_set_store: Arc<dyn FetchSetStore> = store;
    let service = Arc::new(DataService::new(
        candle_store,
        fetch_set_store,
        exchanges,
        config.fetch.options()?,
        &config.server.host,
        config.server.subscription_port_base,
        config.server.subscription_port_limit,
    ));

    if config.fetch.autostart {
        let fetching = service.start_fetch().await?;
        info!(feeds = fetching.len(), "fetch tasks started");
    }

    let app = api::router(Arc::clone(&service));
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.api_port))
            .await
            .context("failed to bind control API")?;
    info!(
        host = %config.server.host,
        port = config.server.api_port,
        "control API listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("shutdown signal received");
        })
        .await
        .context("control API server failed")?;

    Ok(())
}
