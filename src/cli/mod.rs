//! Command-line entry point.
//!
//! Loads settings, wires the registry, gateway and dispatcher together,
//! runs the reconciliation sweep and then the live loop.

pub mod args;

pub use args::Cli;

use std::sync::Arc;

use anyhow::{Context, bail};

use crate::activation::{ActivationGateway, DryRun, ServiceManager, SystemdRun};
use crate::config::Settings;
use crate::extractors::ScriptTranslator;
use crate::watcher::{Dispatcher, EventSource, WatchRegistry};

/// Run the agent with parsed arguments.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut settings = Settings::load(cli.config.as_deref()).context("failed to load settings")?;
    settings.apply_overrides(cli.watch_dir, cli.scripts_dir);

    if cli.print_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    crate::logging::init_with_config(&settings.logging);

    let dispatcher = build_dispatcher(&settings, cli.dry_run)?;
    crate::log_event!(
        "watcher",
        "root",
        "{} ({} files)",
        dispatcher.registry().root().display(),
        dispatcher.registry().len()
    );

    if cli.once {
        let summary = dispatcher.reconcile().await;
        if summary.failed > 0 {
            bail!("{} of {} files failed to apply", summary.failed, summary.attempted);
        }
        return Ok(());
    }

    // Watch before reconciling so writes during the sweep still queue events.
    let mut source = EventSource::new(settings.watch.channel_capacity)?;
    let watched = source.watch_registry(dispatcher.registry());
    crate::log_event!(
        "watcher",
        "monitoring",
        "{watched} of {} directories",
        dispatcher.registry().watch_dirs().len()
    );

    dispatcher.reconcile().await;

    let (_watcher, events) = source.into_parts();
    tokio::select! {
        result = dispatcher.run(events) => result.context("notification source failed"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for shutdown signal")?;
            crate::log_event!("watcher", "shutting down");
            Ok(())
        }
    }
}

/// Build the dispatcher described by the settings.
pub fn build_dispatcher(settings: &Settings, dry_run: bool) -> anyhow::Result<Dispatcher> {
    let root = settings
        .resolved_watch_dir()
        .with_context(|| format!("invalid watch dir {}", settings.watch_dir.display()))?;

    let translator = Arc::new(ScriptTranslator::new(settings.translator_path()));
    let registry = WatchRegistry::standard(root, translator);

    let manager: Arc<dyn ServiceManager> = if dry_run {
        Arc::new(DryRun)
    } else {
        Arc::new(SystemdRun::new(&settings.activation.systemd_run))
    };
    let gateway = ActivationGateway::new(manager, &settings.activation);

    Ok(Dispatcher::new(registry, gateway)
        .with_settle(settings.watch.settle())
        .react_to_modify(settings.watch.react_to_modify))
}
