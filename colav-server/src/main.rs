use std::time::Duration;

use clap::Parser;
use colav_server::{settings, Cli, Session};
use miette::{IntoDiagnostic, Result};
use tokio_graceful_shutdown::Toplevel;

fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let config = settings::load_config(args.config.as_deref()).into_diagnostic()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .into_diagnostic()?;

    let result = runtime.block_on(async move {
        Toplevel::new(|s| async move {
            if let Err(e) = Session::new(&s, args, config) {
                log::error!("{}", e);
                s.request_shutdown();
            }
        })
        .catch_signals()
        .handle_shutdown_requests(Duration::from_secs(5))
        .await
    });

    // A blocked stdin read must not hold up the exit
    runtime.shutdown_timeout(Duration::from_millis(100));
    result.into_diagnostic()
}
