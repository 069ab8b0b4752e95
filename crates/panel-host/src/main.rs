//! Panel host: runs the control panel's message bus with the serial
//! AT-command link on stdin/stdout and an obs-websocket client connection.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser as _;
use panel_bus::{Broker, Node};
use panel_protocol::{FsPartition, KeyValueStore, MemoryStore, Partition};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

mod config;
mod pipe;
mod setup;

use config::{HostConfig, ObsSettings};
use pipe::{SerialPipe, WebSocketPipe};

/// Control panel host.
#[derive(clap::Parser, Debug)]
#[command(name = "panel-host", about = "Control panel serial and obs-websocket bridge")]
struct Args {
    /// Directory served to the file-transfer commands (overrides `PANEL_STORAGE_DIR`).
    #[arg(long)]
    storage_dir: Option<PathBuf>,

    /// Key/value store file (overrides `PANEL_NVS_FILE`).
    #[arg(long)]
    nvs_file: Option<PathBuf>,

    /// Serve the serial link only.
    #[arg(long)]
    no_websocket: bool,

    /// obs-websocket URL, instead of the one provisioned in the `websocket` namespace.
    #[arg(long)]
    obs_url: Option<String>,
}

/// What ended the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    SerialClosed,
    Interrupted,
}

async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}

/// Wait until the serial input closes or `interrupt` fires.
///
/// The obs-websocket connection ending, cleanly or not, is only logged. The
/// serial link keeps serving, `AT+SETCONF` included.
async fn wait_for_exit(
    mut serial_closed: oneshot::Receiver<()>,
    connection: Option<JoinHandle<anyhow::Result<()>>>,
    interrupt: impl Future<Output = ()>,
) -> Exit {
    tokio::pin!(interrupt);

    if let Some(connection) = connection {
        tokio::select! {
            _ = &mut serial_closed => return Exit::SerialClosed,
            () = &mut interrupt => return Exit::Interrupted,
            result = connection => match result {
                Ok(Ok(())) => info!("obs-websocket connection ended"),
                Ok(Err(e)) => error!(error = ?e, "obs-websocket connection failed"),
                Err(e) => error!(error = %e, "obs-websocket task aborted"),
            },
        }
        info!("serving the serial link only");
    }

    tokio::select! {
        _ = serial_closed => Exit::SerialClosed,
        () = interrupt => Exit::Interrupted,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries serial replies.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = HostConfig::from_env();
    if let Some(dir) = args.storage_dir {
        config.storage_dir = dir;
    }
    if let Some(file) = args.nvs_file {
        config.nvs_file = file;
    }

    let partition: Arc<dyn Partition> = Arc::new(
        FsPartition::mount(&config.storage_dir)
            .with_context(|| format!("mounting {}", config.storage_dir.display()))?,
    );
    let store: Arc<dyn KeyValueStore> = Arc::new(
        MemoryStore::open(&config.nvs_file)
            .with_context(|| format!("opening {}", config.nvs_file.display()))?,
    );
    info!(storage = %config.storage_dir.display(), nvs = %config.nvs_file.display(), "storage ready");

    let broker = Arc::new(Broker::new());
    let serial = setup::setup_serial(&broker, &partition, &store, &config)?;
    let serial_pipe = SerialPipe::new(Arc::clone(&broker), std::io::stdout());
    let serial_closed = serial_pipe.spawn_reader(std::io::stdin())?;

    let exit = if args.no_websocket {
        wait_for_exit(serial_closed, None, interrupted()).await
    } else {
        let settings = ObsSettings::from_store(store.as_ref());
        let url = args.obs_url.unwrap_or_else(|| settings.url());
        let obs = setup::setup_websocket(&broker, &settings.password)?;
        let ws_pipe = WebSocketPipe::new(Arc::clone(&broker));
        let connection = tokio::spawn(Arc::clone(&ws_pipe).run(url));

        let exit = wait_for_exit(serial_closed, Some(connection), interrupted()).await;
        ws_pipe.stop();
        obs.shutdown();
        exit
    };

    info!(?exit, "panel host stopping");
    serial_pipe.stop();
    serial.shutdown();
    info!("panel host stopped");
    Ok(())
}
