use std::{error::Error, process, time::Duration};

use clap::{command, Parser, ValueHint};
use log::{debug, error, info, warn, LevelFilter};
use tokio_util::sync::CancellationToken;

use daapr::{
    catalog::{EntityKind, SharedCatalog},
    config::Config,
    credential::Credential,
    events::Event,
    session::SessionClient,
    synchronizer::Synchronizer,
};

/// Profile to display when not built in release mode.
#[cfg(debug_assertions)]
const BUILD_PROFILE: &str = "debug";
/// Profile to display when not built release mode.
#[cfg(not(debug_assertions))]
const BUILD_PROFILE: &str = "release";

/// Group name for mutually exclusive logging options.
const ARGS_GROUP_LOGGING: &str = "logging";

/// Command line arguments as parsed by `clap`.
#[derive(Clone, Debug, Default, Hash, PartialEq, Eq, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host name or address of the share
    #[arg(value_hint = ValueHint::Hostname)]
    host: String,

    /// Port of the share
    #[arg(short, long, default_value_t = Config::DEFAULT_PORT)]
    port: u16,

    /// Secrets file
    ///
    /// TOML file with the `password` of a protected share. Keep it private.
    #[arg(short, long, value_name = "FILE", value_hint = ValueHint::FilePath)]
    secrets_file: Option<String>,

    /// Password of a protected share
    ///
    /// Takes precedence over the secrets file.
    #[arg(long, env = "DAAP_PASSWORD", hide_env_values = true)]
    password: Option<Credential>,

    /// Timeout of each request in seconds
    #[arg(long, value_name = "SECS", default_value_t = Config::DEFAULT_TIMEOUT.as_secs())]
    timeout: u64,

    /// Ask the share for its content codes before logging in
    #[arg(long, default_value_t = false)]
    content_codes: bool,

    /// Suppresses all output except warnings and errors.
    #[arg(short, long, default_value_t = false, group = ARGS_GROUP_LOGGING)]
    quiet: bool,

    /// Enable verbose logging
    ///
    /// Specify twice for trace logging.
    #[arg(short, long, action = clap::ArgAction::Count, group = ARGS_GROUP_LOGGING)]
    verbose: u8,
}

/// Initializes the logger facade.
///
/// The logging level is determined as follows, in order of precedence from
/// highest to lowest:
/// 1. Command line arguments
/// 2. `RUST_LOG` environment variable
/// 3. Hard coded default
fn init_logger(config: &Args) {
    let mut logger = env_logger::Builder::from_env(
        // Note: if you change the default logging level here, then you should
        // probably also change the verbosity levels below.
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    if config.quiet || config.verbose > 0 {
        let level = match config.verbose {
            // Quiet and verbose are mutually exclusive.
            0 => LevelFilter::Warn,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Filter log messages of external crates.
        logger.filter_module(module_path!(), level);
    }

    logger.init();
}

/// Picks the password from the command line, environment or secrets file.
fn load_credential(args: &Args) -> daapr::error::Result<Option<Credential>> {
    if let Some(password) = &args.password {
        return Ok(Some(password.clone()));
    }

    let Some(secrets_file) = &args.secrets_file else {
        return Ok(None);
    };

    Credential::from_file(secrets_file).map(Some).inspect_err(|_| {
        info!("put the share password in {secrets_file} as: password = \"...\"");
    })
}

/// Connects to the share and prints a summary of its catalog.
///
/// # Errors
///
/// Returns an error when the handshake fails or is interrupted.
async fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let mut config = Config::new(args.host.clone());
    config.port = args.port;
    config.timeout = Duration::from_secs(args.timeout);
    config.learn_content_codes = args.content_codes;
    config.credential = load_credential(&args)?;

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let catalog = SharedCatalog::default();
    let synchronizer = Synchronizer::new(catalog.clone()).with_events(event_tx.clone());
    let mut client = SessionClient::new(&config)?.with_events(event_tx);

    let cancel = CancellationToken::new();
    let interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutting down gracefully");
            interrupt.cancel();
        }
    });

    let result = client.run(&synchronizer, cancel).await;
    while let Ok(event) = event_rx.try_recv() {
        debug!("event: {event:?}");
        if event == Event::AuthenticationRequired {
            warn!("{} requires a password; pass --password or --secrets-file", config.host);
        }
    }
    let report = result?;

    let catalog = catalog.snapshot();
    for kind in [
        EntityKind::Artist,
        EntityKind::Album,
        EntityKind::Genre,
        EntityKind::Composer,
        EntityKind::Year,
    ] {
        let mut entities: Vec<_> = catalog.entities(kind).values().collect();
        entities.sort_by(|a, b| a.name.cmp(&b.name));
        for entity in entities {
            println!("{kind}\t{}\t{}", entity.name, entity.tracks.len());
        }
    }
    info!(
        "{} tracks ({} skipped), {} artists, {} albums, {} genres, {} composers, {} years",
        report.tracks,
        report.skipped,
        report.artists,
        report.albums,
        report.genres,
        report.composers,
        report.years
    );

    if let Err(e) = client.logout().await {
        warn!("logging out failed: {e}");
    }

    Ok(())
}

/// Main entry point of the application.
///
/// This function initializes the logger facade, parses the command line
/// arguments, and connects to the share.
#[tokio::main]
async fn main() {
    // `clap` handles our command line arguments and help text.
    let args = Args::parse();
    init_logger(&args);

    // Dump command line arguments before we do anything more.
    // This aids in debugging of whatever comes next.
    debug!("Command {:#?}", args);

    let cmd = command!();
    let name = cmd.get_name().to_string();
    let version = cmd.get_version().unwrap_or("UNKNOWN").to_string();

    info!("starting {name}/{version}; {BUILD_PROFILE}");

    if let Err(e) = run(args).await {
        error!("{e}");
        process::exit(1);
    }
}
