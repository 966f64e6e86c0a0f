use anyhow::Result;

/// The engine is single threaded: every timer callback and command is handled on one thread, so
/// task state never needs locking.
pub fn single_thread_runtime() -> Result<tokio::runtime::Runtime> {
    Ok(tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?)
}
