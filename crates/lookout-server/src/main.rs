mod config;
mod rules;

use anyhow::Context;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use lookout_common::instance::instance_id;
use lookout_engine::{EngineOptions, LevelMatcher, RuleEngine};
use lookout_notify::NotifierSet;
use lookout_search::SearchClient;
use lookout_storage::StateStore;

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  lookout-server [config.toml]    Start the alerting engine");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if matches!(args.get(1).map(String::as_str), Some("--help" | "-h")) {
        print_usage();
        return Ok(());
    }
    let config_path = PathBuf::from(
        args.get(1)
            .map(String::as_str)
            .unwrap_or("config/config.toml"),
    );

    let config = config::load(&config_path)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive(format!("lookout={}", config.logging.level).parse()?),
        )
        .init();

    tracing::info!(config = %config_path.display(), "starting lookout");
    tracing::info!(
        host = %config.search.host,
        port = config.search.port,
        protocol = %config.search.protocol,
        timeout_secs = config.search.timeout_secs,
        "search store target"
    );
    tracing::info!(
        run_interval_secs = config.engine.run_interval_secs,
        buffer_time_secs = config.engine.buffer_time_secs,
        max_running_rules = config.engine.max_running_rules,
        writeback_index = %config.engine.writeback_index,
        alert_time_limit_secs = config.engine.alert_time_limit_secs,
        "engine configuration"
    );

    // unreachable search store is a startup failure, not a degraded start
    let search = Arc::new(SearchClient::new(&config.search)?);
    search
        .test_connection()
        .await
        .context("search store connection test failed")?;
    tracing::info!("search store connection verified");

    let store = Arc::new(
        StateStore::connect(&config.database)
            .await
            .context("state store initialization failed")?,
    );

    let rules_folder = PathBuf::from(&config.rules.folder);
    let loaded = rules::load_rules(
        &rules_folder,
        config.rules.default_timeframe_secs,
        config.rules.default_threshold,
    )
    .context("rule loading failed")?;
    if loaded.is_empty() {
        tracing::warn!(folder = %rules_folder.display(), "no enabled rules found");
    } else {
        for (i, rule) in loaded.iter().enumerate() {
            tracing::info!(
                n = i + 1,
                rule = %rule.name,
                kind = %rule.rule_type,
                index = %rule.index,
                "rule registered"
            );
        }
    }

    let notifiers = Arc::new(
        NotifierSet::from_config(&config.notifications)
            .context("notifier initialization failed")?,
    );
    let enabled = notifiers.enabled_names();
    if enabled.is_empty() {
        tracing::warn!("no notification channels enabled");
    } else {
        tracing::info!(channels = ?enabled, "notification channels enabled");
    }

    let instance = instance_id();
    tracing::info!(instance = %instance, "replica identity");

    let mut engine = RuleEngine::new(
        EngineOptions::from_config(&config, instance),
        LevelMatcher::new(config.engine.level_rules.clone()),
        search.clone(),
        store.clone(),
        notifiers.clone(),
    );
    engine.load_rules(loaded);
    let engine = Arc::new(engine);
    let driver = engine.start();

    if notifiers.has_enabled() {
        match notifiers.send_test().await {
            Ok(()) => tracing::info!("startup test notification delivered"),
            Err(e) => tracing::error!(error = %e, "startup test notification failed"),
        }
    }

    tracing::info!("lookout is running, send SIGINT or SIGTERM to stop");
    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");

    engine.stop();
    let _ = driver.await;
    store.close().await;
    tracing::info!("lookout stopped");
    Ok(())
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(e) => {
                tracing::warn!(error = %e, "cannot install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
