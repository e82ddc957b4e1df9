use std::future::Future;

use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpListener,
};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use crate::{
    application::{
        config::{Args, RuntimeConfig},
        state::BridgeState,
    },
    domain::error::BridgeError,
    interfaces::http,
    peer::channel::{PeerReader, run_dispatcher, spawn_writer},
};

pub async fn run(args: Args) -> Result<(), BridgeError> {
    init_logging(&args.log_filter, args.json_logs)?;
    let config = RuntimeConfig::from_args(args)
        .map_err(|error| BridgeError::InvalidRequest(format!("configuration error: {error}")))?;

    // No fallback port: another bridge may already own this one.
    let listener = TcpListener::bind(config.bind_addr()).await.map_err(|error| {
        BridgeError::Unavailable(format!(
            "failed to bind {}: {error}",
            config.bind_addr()
        ))
    })?;

    run_with_io(
        listener,
        config,
        tokio::io::stdin(),
        tokio::io::stdout(),
        shutdown_signal(),
    )
    .await
}

enum Exit {
    Signal,
    Peer(Result<(), BridgeError>),
    Server(Result<(), BridgeError>),
}

/// Runs the bridge until `shutdown` fires, the peer stream ends, or the
/// HTTP server stops.
pub async fn run_with_io<R, W>(
    listener: TcpListener,
    config: RuntimeConfig,
    reader: R,
    writer: W,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), BridgeError>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    info!(
        "starting tab-bridge host={} port={} auth_mode={}",
        config.host,
        config.port,
        config.auth_mode.label()
    );

    let version = config.runtime_version.clone();
    let (sender, writer_task) = spawn_writer(writer);
    let state = BridgeState::new(config, sender.clone());

    let mut dispatcher = tokio::spawn(run_dispatcher(
        PeerReader::new(reader),
        sender,
        state.correlator().clone(),
        version,
    ));
    let mut server = tokio::spawn(http::serve(
        listener,
        state.clone(),
        state.shutdown_token().cancelled_owned(),
    ));

    let exit = tokio::select! {
        () = shutdown => {
            info!("shutdown signal received");
            Exit::Signal
        }
        joined = &mut dispatcher => Exit::Peer(flatten(joined, "peer dispatcher")),
        joined = &mut server => Exit::Server(flatten(joined, "http server")),
    };

    state.shutdown().await;

    let (peer_result, server_result) = match exit {
        Exit::Signal => (Ok(()), flatten(server.await, "http server")),
        Exit::Peer(result) => (result, flatten(server.await, "http server")),
        Exit::Server(result) => (Ok(()), result),
    };
    dispatcher.abort();
    writer_task.abort();

    if let Err(error) = &server_result {
        warn!("http server stopped with error: {error}");
    }
    peer_result.and(server_result)
}

fn flatten(
    joined: Result<Result<(), BridgeError>, tokio::task::JoinError>,
    task: &str,
) -> Result<(), BridgeError> {
    joined.unwrap_or_else(|error| {
        Err(BridgeError::Unavailable(format!(
            "{task} task failed: {error}"
        )))
    })
}

/// Logs go to stderr; stdout carries the peer protocol.
fn init_logging(filter: &str, json_logs: bool) -> Result<(), BridgeError> {
    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if json_logs {
        builder.json().try_init().map_err(|error| {
            BridgeError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    } else {
        builder.compact().try_init().map_err(|error| {
            BridgeError::Unavailable(format!("failed to initialize logger: {error}"))
        })?;
    }

    Ok(())
}

async fn shutdown_signal() {
    wait_for_signal(tokio::signal::ctrl_c()).await;
}

/// Resolves when `signal` fires. A handler that failed to install never
/// resolves; only the peer or the server can stop the bridge then.
async fn wait_for_signal(signal: impl Future<Output = std::io::Result<()>>) {
    if let Err(error) = signal.await {
        error!("failed to install ctrl-c handler: {error}");
        std::future::pending::<()>().await;
    }
}
