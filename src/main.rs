use anyhow::Result;
use tracing::error;
use zentasks::{cli::run_cli, utils::runtime::single_thread_runtime};

fn main() -> Result<()> {
    let runtime = single_thread_runtime()?;
    let result = runtime.block_on(run_cli()).inspect_err(|e| {
        error!("Error running cli {e:?}");
    });
    // Reading stdin occupies a blocking thread that never returns on its own.
    runtime.shutdown_background();
    result
}
