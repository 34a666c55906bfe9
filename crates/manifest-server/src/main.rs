use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use manifest_model::RecordName;
use manifest_server::{serve, AppConfig};
use manifest_store::{FsRecordStore, RecordStore};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,manifest_engine=info";

fn config_arg() -> Arg {
    Arg::new("config")
        .long("config")
        .short('c')
        .value_parser(value_parser!(PathBuf))
        .help("TOML configuration file")
}

fn store_root_arg() -> Arg {
    Arg::new("store-root")
        .long("store-root")
        .value_parser(value_parser!(PathBuf))
        .help("Directory holding one manifest per client (overrides the config file)")
}

fn cli() -> Command {
    Command::new("manifest-enroll")
        .version(manifest_server::VERSION)
        .about("Client manifest enrollment service")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Serve the enrollment endpoint")
                .arg(config_arg())
                .arg(store_root_arg())
                .arg(
                    Arg::new("bind")
                        .long("bind")
                        .value_parser(value_parser!(SocketAddr))
                        .help("Listen address (overrides the config file)"),
                )
                .arg(
                    Arg::new("log-json")
                        .long("log-json")
                        .action(ArgAction::SetTrue)
                        .help("Emit logs as JSON lines"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Print a stored manifest without checking it in")
                .arg(
                    Arg::new("recordname")
                        .required(true)
                        .value_name("RECORDNAME")
                        .help("Client identifier"),
                )
                .arg(config_arg())
                .arg(store_root_arg()),
        )
        .subcommand(
            Command::new("list")
                .about("List enrolled clients")
                .arg(config_arg())
                .arg(store_root_arg()),
        )
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Config file plus command-line overrides shared by every subcommand
fn load_config(args: &ArgMatches) -> anyhow::Result<AppConfig> {
    let path = args.get_one::<PathBuf>("config");
    let mut config = AppConfig::load(path.map(PathBuf::as_path))?;
    if let Some(root) = args.get_one::<PathBuf>("store-root") {
        config.engine.store_root = root.clone();
    }
    Ok(config)
}

fn open_store(config: &AppConfig) -> anyhow::Result<FsRecordStore> {
    config.validate()?;
    FsRecordStore::open(&config.engine.store_root, config.engine.store.clone()).with_context(|| {
        format!(
            "cannot open store at {}",
            config.engine.store_root.display()
        )
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    match matches.subcommand() {
        Some(("serve", args)) => {
            init_tracing(args.get_flag("log-json"));
            let mut config = load_config(args)?;
            if let Some(bind) = args.get_one::<SocketAddr>("bind") {
                config.server.bind = *bind;
            }
            serve(config, shutdown_signal()).await?;
        }
        Some(("inspect", args)) => {
            init_tracing(false);
            let config = load_config(args)?;
            let store = open_store(&config)?;

            let raw = args
                .get_one::<String>("recordname")
                .context("RECORDNAME is required")?;
            let name = RecordName::parse(raw)?;
            let record = store.load(&name)?;
            let document = store.format().encode(&record)?;
            print!("{}", String::from_utf8_lossy(&document));
        }
        Some(("list", args)) => {
            init_tracing(false);
            let config = load_config(args)?;
            let store = open_store(&config)?;
            for name in store.list()? {
                println!("{name}");
            }
        }
        _ => unreachable!("subcommand_required is set"),
    }
    Ok(())
}
