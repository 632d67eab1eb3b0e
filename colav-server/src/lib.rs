//! # Colav Server
//!
//! Collision avoidance runtime around [`colav_core`].
//!
//! The server reads own-ship and target kinematics as newline-delimited JSON,
//! runs every target through its own actor task and publishes one
//! [`colav_core::CycleReport`] per cycle with the encounter of every target
//! and the safeguarded heading-rate command.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    colav-server                         │
//! │  ┌─────────────┐   ┌───────────────┐   ┌─────────────┐  │
//! │  │ Intake      │──▶│ IntakeBuffer  │──▶│ Engine      │  │
//! │  │ (NDJSON)    │   │ (latest wins) │   │ (per cycle) │  │
//! │  └──────┬──────┘   └───────────────┘   └──────┬──────┘  │
//! │         │ remove                              │ Job     │
//! │         ▼                                     ▼         │
//! │  ┌─────────────────────────────────────────────────────┐│
//! │  │          TargetRegistry (Arc<Mutex>)                ││
//! │  │  - one actor task per target                        ││
//! │  │  - staleness sweep                                  ││
//! │  └─────────────────────────────────────────────────────┘│
//! │                         │ CycleReport                   │
//! │                         ▼                               │
//! │              broadcast ──▶ Output (stdout)              │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Key Components
//!
//! - [`Session`] - Main application state container
//! - [`engine::TargetRegistry`] - Live targets and their actors
//! - [`engine::Engine`] - Cycle fan-out, aggregation and publishing
//! - [`intake::IntakeBuffer`] - Hand-off between intake and engine
//!
//! ## Example: Starting the Server
//!
//! ```rust,no_run
//! use clap::Parser;
//! use colav_core::ColavConfig;
//! use colav_server::{Cli, Session};
//! use tokio_graceful_shutdown::Toplevel;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() {
//!     let args = Cli::parse_from(["colav-server", "--output"]);
//!
//!     Toplevel::new(|s| async move {
//!         Session::new(&s, args, ColavConfig::default()).unwrap();
//!     })
//!     .catch_signals()
//!     .handle_shutdown_requests(Duration::from_secs(5))
//!     .await
//!     .unwrap();
//! }
//! ```
//!
//! ## Command-Line Interface
//!
//! See [`Cli`] for all available options. Key options:
//!
//! - `-c, --config` - Configuration file (default: `colav.json` in the
//!   project config directory, if present)
//! - `-i, --input` - Read kinematics from a file instead of stdin
//! - `--output` - Write cycle reports to stdout
//! - `--predict` - Attach the predicted own-ship trajectory to every report
//! - `-v` - Increase verbosity (use multiple times)

use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use clap::Parser;
use colav_core::{ColavConfig, ColavContext, ConfigError, CycleReport};
use thiserror::Error;
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::broadcast;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle};

pub mod engine;
pub mod intake;
pub mod output;
pub mod settings;

use engine::{Engine, TargetRegistry};
use intake::IntakeBuffer;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Capacity of the cycle report channel
const REPORT_CHANNEL_SIZE: usize = 16;

#[derive(Parser, Clone, Debug)]
#[command(version, about)]
pub struct Cli {
    #[clap(flatten)]
    pub verbose: clap_verbosity_flag::Verbosity<clap_verbosity_flag::InfoLevel>,

    /// Configuration file (JSON)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Read kinematics from this file instead of stdin
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Write cycle reports to stdout
    #[arg(long, default_value_t = false)]
    pub output: bool,

    /// Predict the own ship trajectory every cycle
    #[arg(long, default_value_t = false)]
    pub predict: bool,

    /// Remove targets not updated for this many seconds
    #[arg(long, default_value_t = 30)]
    pub stale_after: u64,
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("I/O operation failed")]
    Io(#[from] std::io::Error),
    #[error("Cannot read configuration file {}", path.display())]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Cannot open input {}", path.display())]
    InputOpen {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid message: {0}")]
    ParseJson(String),
    #[error("Cannot serialize report")]
    Serialize(#[from] serde_json::Error),
}

pub struct SessionInner {
    pub args: Cli,
    pub context: Arc<ColavContext>,
    pub registry: TargetRegistry,
    pub tx_reports: broadcast::Sender<Arc<CycleReport>>,
}

#[derive(Clone)]
pub struct Session {
    pub inner: Arc<RwLock<SessionInner>>,
}

impl Session {
    pub fn read(
        &self,
    ) -> Result<RwLockReadGuard<'_, SessionInner>, PoisonError<RwLockReadGuard<'_, SessionInner>>>
    {
        self.inner.read()
    }

    pub fn write(
        &self,
    ) -> Result<RwLockWriteGuard<'_, SessionInner>, PoisonError<RwLockWriteGuard<'_, SessionInner>>>
    {
        self.inner.write()
    }

    fn new_base(args: Cli, config: ColavConfig) -> Result<Self, ServerError> {
        let context = Arc::new(ColavContext::new(config)?);
        let (tx_reports, _) = broadcast::channel(REPORT_CHANNEL_SIZE);
        Ok(Session {
            inner: Arc::new(RwLock::new(SessionInner {
                args,
                context,
                registry: TargetRegistry::new(),
                tx_reports,
            })),
        })
    }

    /// Build the session and start the Intake, Engine and (optionally)
    /// Output subsystems
    pub fn new(
        subsystem: &SubsystemHandle,
        args: Cli,
        config: ColavConfig,
    ) -> Result<Self, ServerError> {
        let session = Self::new_base(args, config)?;
        let (args, context, registry, tx_reports) = {
            let inner = session.read().unwrap_or_else(|e| e.into_inner());
            (
                inner.args.clone(),
                inner.context.clone(),
                inner.registry.clone(),
                inner.tx_reports.clone(),
            )
        };
        let buffer = IntakeBuffer::new();

        if args.output {
            let rx_reports = tx_reports.subscribe();
            subsystem.start(SubsystemBuilder::new("Output", |subsys| {
                output::run(subsys, rx_reports)
            }));
        }

        let engine = Engine::new(context, registry.clone(), tx_reports, args.predict);
        let stale_after = Duration::from_secs(args.stale_after);
        let engine_buffer = buffer.clone();
        subsystem.start(SubsystemBuilder::new("Engine", move |subsys| {
            engine.run(subsys, engine_buffer, stale_after)
        }));

        let input = args.input.clone();
        subsystem.start(SubsystemBuilder::new("Intake", move |subsys| async move {
            let reader = match open_input(input).await {
                Ok(reader) => reader,
                Err(e) => {
                    buffer.close();
                    return Err(e);
                }
            };
            intake::run(subsys, reader, buffer, registry).await
        }));

        log::info!("Colav server {} started", VERSION);
        Ok(session)
    }

    pub fn args(&self) -> Cli {
        let args = { self.read().unwrap_or_else(|e| e.into_inner()).args.clone() };
        args
    }

    pub fn registry(&self) -> TargetRegistry {
        self.read()
            .unwrap_or_else(|e| e.into_inner())
            .registry
            .clone()
    }

    /// Receive every cycle report published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<CycleReport>> {
        self.read()
            .unwrap_or_else(|e| e.into_inner())
            .tx_reports
            .subscribe()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Session {{ }}")
    }
}

type Input = Box<dyn AsyncBufRead + Unpin + Send>;

async fn open_input(path: Option<PathBuf>) -> Result<Input, ServerError> {
    match path {
        Some(path) => {
            let file = match tokio::fs::File::open(&path).await {
                Ok(file) => file,
                Err(e) => return Err(ServerError::InputOpen { path, source: e }),
            };
            Ok(Box::new(BufReader::new(file)))
        }
        None => Ok(Box::new(BufReader::new(tokio::io::stdin()))),
    }
}
