#[macro_use]
extern crate log;

use std::collections::HashMap;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

mod chain;
mod config;
mod db;
mod notifier;
mod rest;
mod scanner;

use chain::{Adaptor, Network, SubstrateAdaptor};
use rest::server::run_server;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// path to config file
    #[arg(short, long, default_value_t = String::from("config.toml"))]
    config: String,

    #[command(subcommand)]
    subcommand: Option<Subcommand>,
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.subcommand {
        None => {
            let cfg = config::read_config(&args.config)?;
            run_app(cfg).await
        }
        Some(subcmd) => subcmd.run(&args.config).await,
    }
}

#[derive(Debug, Parser)]
enum Subcommand {
    #[command(about = "Start block scanners only")]
    Scanner {
        /// limit to one network instead of every enabled one
        #[arg(long)]
        network: Option<Network>,
    },

    #[command(about = "Start the subscriber notifiers only")]
    Notifier {
        #[arg(long)]
        network: Option<Network>,
    },

    #[command(about = "Start API server only")]
    ApiServer,

    #[command(about = "Cleans all data from the index db")]
    ResetDB,
}

impl Subcommand {
    async fn run(&self, cfg_path: &str) -> anyhow::Result<()> {
        match self {
            Subcommand::Scanner { network } => run_scanners(cfg_path, *network).await,
            Subcommand::Notifier { network } => run_notifiers(cfg_path, *network).await,
            Subcommand::ApiServer => run_api_server(cfg_path).await,
            Subcommand::ResetDB => reset_db(cfg_path).await,
        }
    }
}

fn build_adaptors(cfg: &config::Config) -> anyhow::Result<HashMap<Network, Arc<dyn Adaptor>>> {
    let mut adaptors: HashMap<Network, Arc<dyn Adaptor>> = HashMap::new();
    for network in cfg.networks.enabled() {
        let net_cfg = cfg
            .networks
            .get(network)
            .ok_or_else(|| anyhow::anyhow!("no config for network {}", network))?;
        let adaptor = SubstrateAdaptor::new(net_cfg, network.native_currency())?;
        adaptors.insert(network, Arc::new(adaptor));
    }

    if adaptors.is_empty() {
        anyhow::bail!("no networks enabled in config");
    }
    Ok(adaptors)
}

fn select_networks(cfg: &config::Config, only: Option<Network>) -> anyhow::Result<Vec<Network>> {
    match only {
        None => Ok(cfg.networks.enabled()),
        Some(network) => {
            if cfg.networks.get(network).is_none() {
                anyhow::bail!("network {} is not enabled in config", network);
            }
            Ok(vec![network])
        }
    }
}

async fn run_app(cfg: config::Config) -> anyhow::Result<()> {
    let repo = db::open_postgres_db(cfg.db.clone()).await?;
    let db = Arc::new(repo);
    let adaptors = build_adaptors(&cfg)?;

    let cancel = CancellationToken::new();
    let mut scanner_handles: Vec<(Network, JoinHandle<anyhow::Result<()>>)> = Vec::new();
    let mut notifier_handles: Vec<JoinHandle<()>> = Vec::new();

    for (network, adaptor) in &adaptors {
        let scanner =
            scanner::Scanner::new(&cfg.scanner, *network, db.clone(), adaptor.clone());
        scanner_handles.push((*network, scanner.start(cancel.clone())));

        let notifier = notifier::Notifier::new(&cfg.notifier, *network, db.clone())?;
        notifier_handles.push(notifier.start(cancel.clone()));
    }

    let api_service = rest::api::Service::new(db.clone(), adaptors);
    match run_server(cfg.api, api_service).await {
        Ok(_) => (),
        Err(err) => {
            error!("HTTP server failed: {:?}", err);
        }
    }
    // signal scanner and notifier tasks to stop running
    cancel.cancel();

    let mut failed = false;
    for (network, handle) in scanner_handles {
        if let Err(err) = handle.await? {
            error!("{} scanner failed: {:?}", network, err);
            failed = true;
        }
    }
    for handle in notifier_handles {
        handle.await?;
    }

    if failed {
        anyhow::bail!("scanner task failed");
    }

    log::info!("Application successfully shut down");

    Ok(())
}

async fn run_scanners(cfg_path: &str, only: Option<Network>) -> anyhow::Result<()> {
    let cfg = config::read_config(cfg_path)?;
    let networks = select_networks(&cfg, only)?;

    let repo = db::open_postgres_db(cfg.db.clone()).await?;
    let db = Arc::new(repo);
    let adaptors = build_adaptors(&cfg)?;

    let cancel = CancellationToken::new();
    let mut handles: Vec<(Network, JoinHandle<anyhow::Result<()>>)> = Vec::new();
    for network in networks {
        let adaptor = adaptors
            .get(&network)
            .ok_or_else(|| anyhow::anyhow!("no adaptor for network {}", network))?;
        let scanner = scanner::Scanner::new(&cfg.scanner, network, db.clone(), adaptor.clone());
        handles.push((network, scanner.start(cancel.clone())));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    let mut failed = false;
    for (network, handle) in handles {
        if let Err(err) = handle.await? {
            error!("{} scanner failed: {:?}", network, err);
            failed = true;
        }
    }

    if failed {
        anyhow::bail!("scanner task failed");
    }
    Ok(())
}

async fn run_notifiers(cfg_path: &str, only: Option<Network>) -> anyhow::Result<()> {
    let cfg = config::read_config(cfg_path)?;
    let networks = select_networks(&cfg, only)?;

    let repo = db::open_postgres_db(cfg.db.clone()).await?;
    let db = Arc::new(repo);

    let cancel = CancellationToken::new();
    let mut handles = Vec::new();
    for network in networks {
        let notifier = notifier::Notifier::new(&cfg.notifier, network, db.clone())?;
        handles.push(notifier.start(cancel.clone()));
    }

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");
    cancel.cancel();

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

async fn run_api_server(cfg_path: &str) -> anyhow::Result<()> {
    let cfg = config::read_config(cfg_path)?;
    let repo = db::open_postgres_db(cfg.db.clone()).await?;
    let db = Arc::new(repo);
    let adaptors = build_adaptors(&cfg)?;

    let api_service = rest::api::Service::new(db.clone(), adaptors);
    match run_server(cfg.api, api_service).await {
        Ok(_) => (),
        Err(err) => {
            error!("HTTP server failed: {:?}", err);
        }
    }

    log::info!("Application successfully shut down");

    Ok(())
}

async fn reset_db(cfg_path: &str) -> anyhow::Result<()> {
    let cfg = config::read_config(cfg_path)?;
    let repo = db::open_postgres_db(cfg.db).await?;
    repo.reset_schema().await?;
    info!("database schema reset");
    Ok(())
}
