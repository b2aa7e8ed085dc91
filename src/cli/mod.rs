pub mod gestures;
pub mod terminal;

use std::{io::IsTerminal, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Result;
use clap::{Parser, Subcommand};
use gestures::read_gestures;
use terminal::{Output, TerminalPresenter};
use tokio::{io::BufReader, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter};

use crate::{
    sampling::render_period,
    transport::{TransportConfig, TransportModule, DEFAULT_RECONNECT_MS, DEFAULT_URL},
    utils::{
        clock::{Clock, DefaultClock},
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
        shutdown::detect_shutdown,
    },
    view::{state::ActivityView, ViewModule},
    viewport::Viewport,
};

#[derive(Parser, Debug)]
#[command(name = "Timeviewer", version, long_about = None)]
#[command(about = "Live view of user activity streamed by a tracker", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, global = true, help = "Print logs to stdout")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Show time spent per website and per app, updated every second")]
    Table {
        #[command(flatten)]
        connection: ConnectionArgs,
    },
    #[command(
        about = "Show the timeline of today. Reads `pan <dx>` and `zoom <dy> <cx>` lines from stdin to move it"
    )]
    Graph {
        #[command(flatten)]
        connection: ConnectionArgs,
        #[arg(long, default_value_t = 100, help = "Number of terminal cells the timeline is drawn into")]
        columns: usize,
    },
}

#[derive(clap::Args, Debug, Clone)]
struct ConnectionArgs {
    #[arg(long, default_value = DEFAULT_URL, help = "WebSocket endpoint of the activity producer")]
    url: String,
    #[arg(long = "reconnect-ms", default_value_t = DEFAULT_RECONNECT_MS, help = "Delay before reconnecting after a lost connection")]
    reconnect_ms: u64,
    #[arg(long, default_value_t = 700., help = "Width of the timeline in pixels")]
    width: f64,
    #[arg(long, default_value_t = 40., help = "Initial zoom in pixels per hour. Clamped to 1..=600")]
    zoom: f64,
    #[arg(long, default_value_t = 60, help = "How many times per second the timeline is recomputed")]
    fps: u32,
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    dir: Option<PathBuf>,
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let (connection, output, columns) = match args.commands {
        Commands::Table { connection } => (connection, Output::Table, 0),
        Commands::Graph {
            connection,
            columns,
        } => (connection, Output::Graph, columns),
    };

    let dir = match &connection.dir {
        Some(dir) => dir.clone(),
        None => create_application_default_path()?,
    };
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;

    run_view(connection, output, columns).await
}

async fn run_view(connection: ConnectionArgs, output: Output, columns: usize) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(DefaultClock);
    let shutdown = CancellationToken::new();
    tokio::spawn(detect_shutdown(shutdown.clone()));

    let (transport, handle) = TransportModule::new(
        TransportConfig {
            url: connection.url,
            reconnect_delay: Duration::from_millis(connection.reconnect_ms),
        },
        shutdown.clone(),
        clock.clone(),
    );

    let viewport = Viewport::centered(clock.local_time(), connection.width, connection.zoom);
    let (gestures, gesture_receiver) = mpsc::channel(16);
    let stdout = std::io::stdout();
    let colors = stdout.is_terminal();
    let view = ViewModule::new(
        ActivityView::new(viewport),
        handle,
        gesture_receiver,
        TerminalPresenter::new(stdout, output, columns, colors),
        clock,
        render_period(connection.fps),
        shutdown.clone(),
    );

    info!("Starting view");
    let input = BufReader::new(tokio::io::stdin());
    let (transport_result, view_result, input_result) = tokio::join!(
        transport.run(),
        async {
            let result = view.run().await;
            // Nothing is left to show once the view stops.
            shutdown.cancel();
            result
        },
        async {
            if output == Output::Graph {
                read_gestures(input, gestures, shutdown.clone()).await
            } else {
                Ok(())
            }
        }
    );
    transport_result?;
    view_result?;
    input_result?;
    info!("Stopped");
    Ok(())
}
