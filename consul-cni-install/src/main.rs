use clap::Parser;
use consul_cni_install::config::{Cli, Commands, LogLevel};
use consul_cni_install::{Result, cni};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Install(args) => {
            setup_subscriber(args.log_level, args.log_json);

            cni::install(&args)?;
            let Some(interval) = args.interval() else {
                return Ok(());
            };

            // keep the node configured, e.g. after the primary CNI rewrites its conflist
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            let shutdown = shutdown_signal();
            tokio::pin!(shutdown);
            loop {
                tokio::select! {
                    _ = ticker.tick() => cni::install(&args)?,
                    _ = &mut shutdown => break,
                }
            }
            info!("Exiting...");
        }
    }
    Ok(())
}

fn setup_subscriber(level: LogLevel, json: bool) {
    let level = level.as_str();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("consul_cni_install={level},consul_cni_config={level}").into()
    });
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };
    tokio::select! {
        _ = ctrl_c => {
          info!("captured ctrl_c signal");
        },
        _ = terminate => {},
    }
}
