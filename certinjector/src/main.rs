use crate::cluster::KubeClusterApi;
use crate::errors::MutationError;
use crate::files_watcher::{watch_certificates, FilesWatcher};
use crate::injector::{injector_handler, mutate, InjectorContext};
use crate::reconciler::{Reconciler, Schedule};
use crate::tls::{server_config, ReloadableCertResolver};
use certinjector_common::constants::{CERTINJECTOR_LOG_CONFIG_FILE, CERTINJECTOR_LOG_CONFIG_FILE_ENV};
use certinjector_common::kubernetes::get_k8s_client;
use certinjector_common::metrics::PrometheusMetrics;
use certinjector_macros::{ci_log, logger, with_dollar_sign};
use clap::{Args, Parser, Subcommand};
use futures_util::stream::StreamExt;
use hyper::body::Bytes;
use hyper::server::accept;
use hyper::server::conn::AddrIncoming;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::config::{Appender, Config as LogConfig, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::convert::Infallible;
use std::error::Error;
use std::future::{pending, ready};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tls_listener::TlsListener;
use tokio::signal::unix::{signal, Signal, SignalKind};
use tokio::sync::watch;

mod cluster;
mod errors;
mod files_watcher;
mod injector;
mod reconciler;
mod tls;

pub type Acceptor = tokio_rustls::TlsAcceptor;

logger!("Main");

#[derive(Parser, Debug)]
#[command(name = "certinjector", version, about = "Injects a CA bundle into annotated pods")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs the admission webhook and the reconciler
    Run(RunArgs),
    /// Prints the admission response for an AdmissionReview read from a file
    Patch {
        file: PathBuf,
    },
}

#[derive(Args, Debug)]
struct RunArgs {
    #[arg(long, env = "CERTINJECTOR_PORT", default_value_t = 8443)]
    port: u16,
    #[arg(long, env = "CERTINJECTOR_CERT_FILE", default_value = "/cert/tls.crt")]
    cert_file: String,
    #[arg(long, env = "CERTINJECTOR_KEY_FILE", default_value = "/cert/tls.key")]
    key_file: String,
    /// Seconds before the first reconciler pass
    #[arg(long, env = "CERTINJECTOR_INITIAL_DELAY", default_value_t = 5)]
    initial_delay: u64,
    /// Seconds between reconciler passes
    #[arg(long, env = "CERTINJECTOR_INTERVAL", default_value_t = 60)]
    interval: u64,
    /// Seconds between checks for a rotated certificate
    #[arg(long, env = "CERTINJECTOR_CERT_POLL_INTERVAL", default_value_t = 900)]
    cert_poll_interval: u64,
}

fn init_logging() {
    let log_config_file = std::env::var(CERTINJECTOR_LOG_CONFIG_FILE_ENV)
        .unwrap_or(CERTINJECTOR_LOG_CONFIG_FILE.to_string());
    if let Err(file_error) = log4rs::init_file(&log_config_file, Default::default()) {
        let stdout = ConsoleAppender::builder()
            .encoder(Box::new(PatternEncoder::new(
                "{d(%Y-%m-%d %H:%M:%S)} {h({l})} [{t}] {m}{n}",
            )))
            .build();
        let config = LogConfig::builder()
            .appender(Appender::builder().build("stdout", Box::new(stdout)))
            .build(Root::builder().appender("stdout").build(LevelFilter::Info));
        match config.map(log4rs::init_config) {
            Ok(Ok(_)) => warn!(
                "Unable to load logging configuration from {}, logging to console: {}",
                log_config_file, file_error
            ),
            Ok(Err(e)) => eprintln!("Unable to initialize logger: {}", e),
            Err(e) => eprintln!("Unable to configure logger: {}", e),
        }
    }
}

async fn sigterm_received(sigterm: &mut Option<Signal>) {
    match sigterm {
        Some(s) => {
            s.recv().await;
        }
        None => pending().await,
    }
}

async fn ctrl_c_received() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Unable to listen for SIGINT: {}", e);
        pending::<()>().await;
    }
}

/// Notifies `shutdown_tx` on the first SIGTERM or SIGINT and exits right away on
/// the second one.
async fn handle_signals(shutdown_tx: watch::Sender<bool>) {
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => Some(s),
        Err(e) => {
            error!("Unable to install SIGTERM handler, handling SIGINT only: {}", e);
            None
        }
    };
    let mut received = 0;
    loop {
        tokio::select! {
            _ = sigterm_received(&mut sigterm) => {}
            _ = ctrl_c_received() => {}
        }
        received += 1;
        if received > 1 {
            warn!("Got a second signal, exiting now");
            std::process::exit(1);
        }
        info!("Got signal, shutting down");
        let _ = shutdown_tx.send(true);
    }
}

/// Resolves once a shutdown was requested. Never resolves if the sender went
/// away without requesting one.
async fn shutdown_requested(mut shutdown_rx: watch::Receiver<bool>) {
    loop {
        if *shutdown_rx.borrow_and_update() {
            return;
        }
        if shutdown_rx.changed().await.is_err() {
            warn!("Signal handler is gone, graceful shutdown is disabled");
            pending::<()>().await;
        }
    }
}

async fn run(args: RunArgs) -> Result<(), Box<dyn Error>> {
    let k8s_client = get_k8s_client().await?;
    let metrics = Arc::new(PrometheusMetrics::new()?);

    let reconciler = Reconciler::new(
        Arc::new(KubeClusterApi::new(k8s_client)),
        Arc::clone(&metrics),
        Schedule {
            initial_delay: Duration::from_secs(args.initial_delay),
            interval: Duration::from_secs(args.interval),
        },
    );
    tokio::spawn(reconciler.run());

    let resolver = Arc::new(ReloadableCertResolver::new(&args.cert_file, &args.key_file)?);
    let files_watcher = FilesWatcher::new(
        vec![args.cert_file.as_str(), args.key_file.as_str()],
        Duration::from_secs(args.cert_poll_interval),
    )?;
    tokio::spawn(watch_certificates(files_watcher, Arc::clone(&resolver)));

    let injector_context = Arc::new(InjectorContext { metrics });
    let addr = ([0, 0, 0, 0], args.port).into();
    let tls_acceptor: Acceptor = Arc::new(server_config(resolver)).into();
    let make_service = {
        make_service_fn(move |_conn| {
            let injector_context = injector_context.clone();
            async move {
                let injector_context = injector_context.clone();
                Ok::<_, Infallible>(service_fn(move |req| {
                    injector_handler(req, injector_context.clone())
                }))
            }
        })
    };
    let incoming = TlsListener::new(tls_acceptor, AddrIncoming::bind(&addr)?).filter(|c| {
        if let Err(e) = c {
            error!("Error accepting connection: {:?}", e);
            ready(false)
        } else {
            ready(true)
        }
    });

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(handle_signals(shutdown_tx));

    info!("Starting certinjector server on {}", addr);
    Server::builder(accept::from_stream(incoming))
        .serve(make_service)
        .with_graceful_shutdown(shutdown_requested(shutdown_rx))
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn patch(file: PathBuf) -> Result<(), Box<dyn Error>> {
    let body = std::fs::read(&file)?;
    let injector_context = Arc::new(InjectorContext {
        metrics: Arc::new(PrometheusMetrics::new()?),
    });
    match mutate(Bytes::from(body), injector_context).await {
        Ok(response) => {
            println!("{}", serde_json::to_string_pretty(&response.into_review())?);
            Ok(())
        }
        Err(MutationError::WithResponse(_, e)) | Err(MutationError::WithoutResponse(e)) => {
            Err(e.into())
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    init_logging();
    match cli.command {
        Command::Run(args) => {
            debug!("Running with {:?}", args);
            run(args).await
        }
        Command::Patch { file } => patch(file).await,
    }
}
