//! A walk through memoized data fetching.
//!
//! The demo renders text frames of a user page whose data comes from a mock API with random
//! latency. Every frame shows what is loading, what failed and what is available at that point.

#![warn(missing_debug_implementations, unused_crate_dependencies, clippy::all)]

mod api;
mod cli;
mod config;
mod logging;
mod pages;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
