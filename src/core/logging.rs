//! Logging initialization and utilities

/// Initialize the logging system
///
/// Uses env_logger with default filter level of `info`.
/// Override with RUST_LOG environment variable. Does nothing if a logger
/// is already installed.
///
/// # Example
/// ```
/// chunklod::core::logging::init();
/// log::info!("Terrain opened");
/// ```
pub fn init() {
    let _ = env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info")
    ).try_init();
}
