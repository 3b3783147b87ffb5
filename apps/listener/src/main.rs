mod config;
mod server;
mod session;

use anyhow::{Context, Result};
use b2listen_common::{
    B2Api, B2Bucket, HttpBroker, RuleManager, SessionLabel, Signer, TunnelConfig, sweep,
};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use config::{Args, Command, Credentials, ListenConfig, ServiceTarget};
use server::EmbeddedServer;
use session::Session;

#[tokio::main]
async fn main() {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(args.loglevel.as_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    if let Err(e) = run(args).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Command::Listen(listen_args) => {
            let config = ListenConfig::from_args(args.cloudflared_command, listen_args)?;
            listen(config).await
        }
        Command::Cleanup(cleanup_args) => {
            cleanup(&cleanup_args.bucket_name, &args.cloudflared_command).await
        }
        Command::Version => {
            println!("b2listen version {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn open_bucket(bucket_name: &str) -> Result<B2Bucket> {
    let credentials = Credentials::from_env()?;
    let api = B2Api::authorize(&credentials.key_id, &credentials.key)
        .await
        .context("B2 authorization failed")?;
    api.check_bucket_allowed(bucket_name)?;
    Ok(api.bucket(bucket_name).await?)
}

async fn listen(config: ListenConfig) -> Result<()> {
    info!("b2listen v{}", env!("CARGO_PKG_VERSION"));

    let bucket = open_bucket(&config.bucket_name).await?;
    debug!("Bucket {} has id {}", bucket.name(), bucket.id());

    let shutdown = CancellationToken::new();

    let (service_url, server) = match &config.service {
        ServiceTarget::Url(url) => (url.clone(), None),
        ServiceTarget::EmbeddedServer => {
            let server = EmbeddedServer::start(shutdown.child_token())
                .await
                .context("Failed to start embedded server")?;
            (server.url(), Some(server))
        }
    };

    let label = SessionLabel::generate();
    let tunnel = TunnelConfig {
        command: config.cloudflared_command.clone(),
        log_level: config.cloudflared_loglevel.clone(),
        service_url,
        label: label.to_string(),
    };

    let session = Session::new(RuleManager::new(bucket), tunnel, config.rule);

    let ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl-C, shutting down");
            ctrl_c.cancel();
        }
    });

    let result = match config.broker {
        Some(broker) => {
            let broker_client = HttpBroker::new(
                &broker.url,
                &config.bucket_name,
                session.rule_name(),
                Signer::new(broker.secret),
            );
            session
                .with_monitor(broker_client, broker.poll_interval)
                .run(shutdown.clone())
                .await
        }
        None => session.run(shutdown.clone()).await,
    };

    shutdown.cancel();
    if let Some(server) = server {
        server.wait().await;
    }

    result?;
    info!("Session ended");
    Ok(())
}

async fn cleanup(bucket_name: &str, cloudflared_command: &str) -> Result<()> {
    let bucket = open_bucket(bucket_name).await?;
    let report = sweep(&RuleManager::new(bucket), cloudflared_command).await?;
    info!(
        rules = report.rules_removed.len(),
        processes = report.processes_killed,
        "Cleanup complete"
    );
    Ok(())
}
