//! Exposes the command line application.
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_memo::{DataLoader, LoadState, metrics};
use clap::{Parser, Subcommand};
use tokio::runtime::Runtime;
use tokio::sync::watch;

use crate::api::{ApiError, FakeApi, User, next_user};
use crate::config::Config;
use crate::logging;
use crate::pages::{UserPage, render_loader};

/// Demo commands.
#[derive(Subcommand)]
enum Command {
    /// Walk through the user pages, reading users from a memo cache.
    Suspense {
        /// The user to start with.
        #[arg(long, default_value_t = 0)]
        start: u32,
        /// How many times to click "next".
        #[arg(long, default_value_t = 3)]
        steps: usize,
    },

    /// Load a user with a data loader, then reload it with the following users.
    Loader {
        /// How many times to click the loaded user.
        #[arg(long, default_value_t = 2)]
        clicks: usize,
    },
}

/// Command line interface parser.
#[derive(Parser)]
#[command(bin_name = "memo-demo", version)]
struct Cli {
    /// Path to your configuration file.
    #[arg(long, short, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    /// Returns the path to the configuration file.
    fn config(&self) -> Option<&Path> {
        self.config.as_deref()
    }
}

/// Runs the main application.
pub fn execute() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::get(cli.config()).context("failed loading config")?;

    let _sentry = sentry::init(sentry::ClientOptions {
        dsn: config.sentry_dsn.clone(),
        release: sentry::release_name!(),
        ..Default::default()
    });

    // SAFETY: No runtime has been started yet, so we are still single-threaded.
    unsafe { logging::init_logging(&config) };

    if let Some(ref statsd) = config.metrics.statsd {
        metrics::configure_statsd(
            &config.metrics.prefix,
            statsd.as_str(),
            config.metrics.custom_tags.clone(),
        )
        .context("failed to configure statsd")?;
    }

    let runtime = Runtime::new().context("failed to start the runtime")?;
    let api = FakeApi::new(&config.api);

    match cli.command {
        Command::Suspense { start, steps } => {
            runtime.block_on(suspense(&api, &runtime, start, steps))
        }
        Command::Loader { clicks } => runtime.block_on(loader(&api, &runtime, clicks)),
    }

    Ok(())
}

async fn suspense(api: &FakeApi, runtime: &Runtime, start: u32, steps: usize) {
    let page = UserPage::new(api, runtime.handle().clone());
    page.walk(start, steps, |id, frame| println!("== user {id}\n{frame}\n"))
        .await;
}

async fn loader(api: &FakeApi, runtime: &Runtime, clicks: usize) {
    let loader = DataLoader::mount(api.get_user(), (0,), runtime.handle());
    let mut changes = loader.subscribe();
    print_until_settled(&mut changes).await;

    let mut id = 0;
    for _ in 0..clicks {
        id = next_user(id);
        // the update is polled first, so the printer already sees it loading
        futures::join!(
            loader.update(Some((id,))),
            print_until_settled(&mut changes)
        );
    }
}

async fn print_until_settled(changes: &mut watch::Receiver<LoadState<User, ApiError>>) {
    let mut last = None;
    loop {
        let state = changes.borrow_and_update().clone();
        let frame = render_loader(&state);
        if last.as_ref() != Some(&frame) {
            println!("{frame}");
        }
        if !state.is_loading || changes.changed().await.is_err() {
            break;
        }
        last = Some(frame);
    }
}
