use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use shared::domain::{ActorId, RecordId};
use sync_core::{
    session::session_channel, CollectionKind, ConfirmedDelete, EngineEvent, FilterState,
    HttpRemoteStore, MissingRemoteStore, OrderDraft, RemoteStore, SessionState, StatusFilter,
    SyncEngine,
};
use tokio::sync::broadcast;
use tracing::{info, warn};

mod config;
mod render;

use config::{load_settings, DashboardSettings};

#[derive(Parser, Debug)]
#[command(about = "Live order dashboard backed by the document store")]
struct Cli {
    #[arg(long, default_value = "dashboard.toml")]
    config: PathBuf,
    /// Overrides the store url from the config file and environment.
    #[arg(long)]
    store_url: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the order view and re-print it on every change until interrupted.
    Watch {
        #[arg(long)]
        status: Option<String>,
        #[arg(long, default_value = "")]
        search: String,
    },
    Create {
        #[arg(long)]
        customer: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        amount: Option<f64>,
        #[arg(long)]
        order_id: Option<String>,
        #[arg(long)]
        marketplace: Option<String>,
    },
    Advance {
        record_id: String,
        status: String,
    },
    Delete {
        record_id: String,
        /// Required: deletes cannot be undone.
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut settings = load_settings(&cli.config)?;
    if let Some(url) = cli.store_url.clone() {
        settings.engine.store.base_url = Some(url);
    }
    tracing_subscriber::fmt()
        .with_env_filter(settings.log_filter.as_str())
        .init();

    if let Command::Delete { yes: false, record_id } = &cli.command {
        bail!("refusing to delete {record_id} without --yes");
    }

    let engine = SyncEngine::new(settings.engine.clone(), connect_store(&settings)?)?;
    let (gate, gate_rx) = session_channel();
    let gate_task = engine.attach_session_gate(gate_rx);
    gate.send_replace(SessionState::ready(
        settings.actor_id.as_deref().map(ActorId::new),
    ));

    let outcome = run(&engine, &settings, cli.command).await;

    drop(gate);
    let _ = gate_task.await;
    engine.shutdown().await;
    outcome
}

fn connect_store(settings: &DashboardSettings) -> Result<Arc<dyn RemoteStore>> {
    match HttpRemoteStore::from_config(&settings.engine) {
        Ok(store) => Ok(Arc::new(store)),
        Err(err) if !settings.engine.fail_on_missing_config => {
            warn!(%err, "store not configured; running without synchronization");
            Ok(Arc::new(MissingRemoteStore))
        }
        Err(err) => Err(err.into()),
    }
}

async fn run(engine: &Arc<SyncEngine>, settings: &DashboardSettings, command: Command) -> Result<()> {
    let sync_timeout = Duration::from_millis(settings.sync_timeout_ms);
    match command {
        Command::Watch { status, search } => {
            let filter = FilterState::new(
                status.as_deref().map(StatusFilter::parse).unwrap_or_default(),
                search,
            );
            if let Err(err) = engine
                .wait_until_synced(&[CollectionKind::Orders], sync_timeout)
                .await
            {
                warn!(%err, "showing the view before the first snapshot");
            }
            watch(engine, &filter).await
        }
        Command::Create {
            customer,
            item,
            amount,
            order_id,
            marketplace,
        } => {
            engine
                .wait_until_synced(&CollectionKind::ALL, sync_timeout)
                .await?;
            let draft = OrderDraft {
                order_id,
                amount,
                marketplace,
                ..OrderDraft::new(customer, item)
            };
            let id = engine.create_order(draft).await?;
            println!("created {id}");
            Ok(())
        }
        Command::Advance { record_id, status } => {
            engine
                .wait_until_synced(&[CollectionKind::Orders], sync_timeout)
                .await?;
            engine
                .advance_order_status(&RecordId::new(record_id.as_str()), &status)
                .await?;
            println!("{record_id} -> {status}");
            Ok(())
        }
        Command::Delete { record_id, .. } => {
            engine
                .wait_until_synced(&[CollectionKind::Orders], sync_timeout)
                .await?;
            engine
                .delete_order(ConfirmedDelete::new(RecordId::new(record_id.as_str())))
                .await?;
            println!("deleted {record_id}");
            Ok(())
        }
    }
}

async fn watch(engine: &Arc<SyncEngine>, filter: &FilterState) -> Result<()> {
    let mut events = engine.subscribe_events();
    print_view(engine, filter).await;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(EngineEvent::CacheChanged { collection: CollectionKind::Orders, .. })
                | Ok(EngineEvent::SubscriptionChanged { collection: CollectionKind::Orders, .. })
                | Err(broadcast::error::RecvError::Lagged(_)) => print_view(engine, filter).await,
                Ok(EngineEvent::SyncWarning { collection, error }) => {
                    eprintln!("sync warning on {collection}: {error}");
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

async fn print_view(engine: &SyncEngine, filter: &FilterState) {
    let orders = engine.get_view(filter).await;
    let counts = engine.status_counts().await;
    let status = engine.sync_status().await;
    println!("{}", render::render_view(&orders, &counts, status));
}
