mod apply;
mod audit;
mod cli;
mod config;
mod evaluate;
mod github;
mod identity;
mod model;
mod run;
mod snapshot;
mod storage;
mod store;

use std::{env, io, process};

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

fn main() {
    init_tracing();

    if let Err(e) = cli::run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

/// Logs go to stderr so stdout stays clean for the report.
fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("PRUNER_LOG").unwrap_or_else(|_| EnvFilter::new("pruner=info"));

    let format = env::var("PRUNER_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(io::stderr))
                .init();
        }
    }
}
