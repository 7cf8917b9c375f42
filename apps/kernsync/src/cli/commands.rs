//! # CLI Command Implementations

use crate::api::{self, AppState};
use crate::config::Config;
use crate::host::{GatewayClient, LocalKernelManager, MemorySessionStore};
use crate::sync::{
    Collaborators, PassReport, RemoteKernelSource, Scheduler, SyncPass, Synchronizer,
};
use kernsync_core::{KernelStore, KernelTable, KernsyncError, Record};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Output flags shared by every command.
#[derive(Debug, Clone, Copy, Default)]
pub struct Output {
    /// Print JSON instead of text.
    pub json_mode: bool,
    /// Print details.
    pub verbose: bool,
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// WIRING
// =============================================================================

/// Open the configured kernel table.
pub fn open_table<R: Record>(config: &Config) -> Result<KernelTable<R>, KernsyncError> {
    KernelTable::new(config.database_location()?)
}

/// Collaborators for a standalone process: in-process kernels and sessions,
/// and the configured gateway if any.
pub fn build_collaborators(config: &Config) -> Result<Collaborators, KernsyncError> {
    let remote: Option<Arc<dyn RemoteKernelSource>> = match &config.gateway {
        Some(gateway) => Some(Arc::new(GatewayClient::new(
            &gateway.url,
            gateway.auth_token.clone(),
            config.call_timeout()?,
        )?)),
        None => None,
    };

    Ok(Collaborators {
        kernels: Arc::new(LocalKernelManager::new()),
        sessions: Arc::new(MemorySessionStore::new()),
        remote,
    })
}

/// Build the serialized sync pass for `config`.
pub fn build_pass<R: Record>(config: &Config) -> Result<Arc<dyn SyncPass>, KernsyncError> {
    config.validate()?;
    let engine = Synchronizer::<R, _>::new(
        open_table::<R>(config)?,
        build_collaborators(config)?,
        config.sync_options()?,
    );
    Ok(Arc::new(Mutex::new(engine)))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Cannot listen for Ctrl+C; stop the process to exit");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Startup pass, scheduler and HTTP trigger.
pub async fn cmd_server<R: Record>(config: &Config) -> Result<(), KernsyncError> {
    let pass = build_pass::<R>(config)?;
    let interval = config.interval()?;

    println!("kernsync Starting...");
    println!();
    println!("Configuration:");
    println!("  Address:  {}", config.bind_addr());
    println!("  Database: {}", config.storage.database);
    println!(
        "  Autosync: {}",
        if config.sync.autosync {
            format!("every {:?}", interval)
        } else {
            "off".to_string()
        }
    );
    println!(
        "  Gateway:  {}",
        config.gateway.as_ref().map_or("none", |g| g.url.as_str())
    );
    println!();
    println!("Endpoints:");
    println!("  POST /api/sync - Run one sync pass");
    println!("  GET  /health   - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let scheduler = Scheduler::new(Arc::clone(&pass), interval, config.sync.autosync)
        .start()
        .await;

    let served = api::run_server(&config.bind_addr(), AppState::new(pass), shutdown_signal()).await;
    scheduler.shutdown().await;
    served
}

// =============================================================================
// SYNC COMMAND
// =============================================================================

/// Run one pass and print its report.
pub async fn cmd_sync<R: Record>(config: &Config, output: Output) -> Result<(), KernsyncError> {
    let pass = build_pass::<R>(config)?;
    let report = pass.sync_managers().await?;
    print_report(&report, output);
    Ok(())
}

fn print_report(report: &PassReport, output: Output) {
    if output.json_mode {
        print_json(&serde_json::to_value(report).unwrap_or_default());
        return;
    }

    println!("Sync pass finished");
    println!("==================");
    println!("Hydrated:         {}", report.hydrated);
    println!("Recorded:         {}", report.recorded);
    println!("Pruned:           {}", report.pruned);
    println!("Sessions deleted: {}", report.sessions_deleted);
    println!("Kernels shut down: {}", report.kernels_shut_down);
    println!("Failures:         {}", report.failures);
    if report.remote_fetch_failed {
        println!("Remote fetch FAILED; the pass ran without remote kernels");
    }
    if output.verbose {
        println!();
        println!("Fetched:");
        println!("  Remote:  {}", report.remote_kernels);
        println!("  Managed: {}", report.managed_kernels);
        println!("  Table:   {}", report.recorded_kernels);
        println!("Rows deleted: {}", report.rows_deleted);
    }
}

// =============================================================================
// LIST COMMAND
// =============================================================================

/// List rows of the kernel table.
pub fn cmd_list<R: Record>(config: &Config, output: Output) -> Result<(), KernsyncError> {
    let table = open_table::<R>(config)?;
    let rows: Vec<_> = table.list()?.iter().map(|r| r.active_fields()).collect();

    if output.json_mode {
        print_json(&serde_json::json!({
            "database": config.storage.database,
            "count": rows.len(),
            "kernels": rows,
        }));
        return Ok(());
    }

    println!("Kernel Table ({})", config.storage.database);
    println!("============");
    if rows.is_empty() {
        println!("(empty)");
    }
    for row in &rows {
        let fields: Vec<String> = row.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
        println!("  {}", fields.join("  "));
    }
    Ok(())
}

// =============================================================================
// FORGET COMMAND
// =============================================================================

/// Delete rows matching `field == value`.
pub fn cmd_forget<R: Record>(
    config: &Config,
    output: Output,
    field: &str,
    value: &str,
) -> Result<(), KernsyncError> {
    let table = open_table::<R>(config)?;
    let existed = table.exists(field, value)?;
    table.delete(field, value)?;

    if output.json_mode {
        print_json(&serde_json::json!({
            "field": field,
            "value": value,
            "deleted": existed,
        }));
    } else if existed {
        println!("Forgot kernel {}={}", field, value);
    } else {
        println!("No kernel with {}={}", field, value);
    }
    Ok(())
}

// =============================================================================
// CHECK COMMAND
// =============================================================================

/// Validate configuration and database location.
pub fn cmd_check<R: Record>(config: &Config, output: Output) -> Result<(), KernsyncError> {
    config.validate()?;
    let location = config.database_location()?;

    if output.json_mode {
        print_json(&serde_json::json!({
            "valid": true,
            "database": location.to_string(),
            "durable": location.is_durable(),
            "identifier_fields": R::identifier_fields(),
            "autosync": config.sync.autosync,
            "interval_secs": config.sync.interval_secs,
            "gateway": config.gateway.as_ref().map(|g| g.url.clone()),
        }));
        return Ok(());
    }

    println!("Configuration OK");
    println!("  Database:    {}{}", location, if location.is_durable() { "" } else { " (not durable)" });
    println!("  Identifiers: {}", R::identifier_fields().join(", "));
    println!("  Autosync:    {}", config.sync.autosync);
    if output.verbose {
        println!("  Interval:    {:?}", config.interval()?);
        println!("  Timeout:     {:?}", config.call_timeout()?);
        println!("  Sessions:    {}", config.sync.sessions);
    }
    Ok(())
}
