/*!
 * Logging Module
 * Centralized logging configuration and utilities
 */
pub mod config;
pub mod middleware;

use std::io;
use tracing_appender::{non_blocking, non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    Registry,
};

pub use config::LogConfig;

/// Initialize the logging system.
///
/// The returned guards flush the background writers; hold them until shutdown.
pub fn init(config: &LogConfig) -> Vec<WorkerGuard> {
    let mut guards = Vec::new();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let (console_writer, console_guard) = non_blocking(io::stdout());
    guards.push(console_guard);

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if config.files && std::fs::create_dir_all(&config.dir).is_ok() {
        let (file_writer, file_guard) = non_blocking(rolling::daily(&config.dir, "app.log"));
        let (error_writer, error_guard) = non_blocking(rolling::daily(&config.dir, "error.log"));
        guards.push(file_guard);
        guards.push(error_guard);

        if config.json {
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(file_writer)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .boxed(),
            );
            layers.push(
                fmt::layer()
                    .json()
                    .with_writer(error_writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(LevelFilter::ERROR)
                    .boxed(),
            );
        } else {
            layers.push(
                fmt::layer()
                    .with_writer(file_writer)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .boxed(),
            );
            layers.push(
                fmt::layer()
                    .with_writer(error_writer)
                    .with_ansi(false)
                    .with_filter(LevelFilter::ERROR)
                    .boxed(),
            );
        }
    }

    if config.json {
        layers.push(
            fmt::layer()
                .json()
                .with_writer(console_writer)
                .with_target(false)
                .boxed(),
        );
    } else {
        layers.push(
            fmt::layer()
                .with_writer(console_writer)
                .with_target(true)
                .pretty()
                .boxed(),
        );
    }

    if tracing_subscriber::registry()
        .with(layers)
        .with(env_filter)
        .try_init()
        .is_err()
    {
        eprintln!("logging already initialized");
    }

    tracing::info!(level = %config.level, json = config.json, "logging initialized");
    guards
}
