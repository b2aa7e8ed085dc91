use std::time::Duration;

use anyhow::Result;
use timeviewer::{cli::run_cli, utils::runtime::multi_thread_runtime};
use tracing::error;

fn main() -> Result<()> {
    let runtime = multi_thread_runtime()?;
    let result = runtime.block_on(run_cli()).inspect_err(|e| {
        error!("Error running cli {e:?}");
    });
    // A pending stdin read would otherwise keep the process alive.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
