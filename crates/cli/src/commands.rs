// FILE: crates/cli/src/commands.rs

use anyhow::{anyhow, bail, Context, Result};
use clap::ArgMatches;
use console::style;
use fieldsync_config::{Config, ConfigManager};
use fieldsync_core::{
    AppError, EntityType, PendingOperation, RemoteAction, SyncLogEntry, SyncStatus,
    SyncableRecord,
};
use fieldsync_database::{DatabaseConfig, LocalStore};
use fieldsync_network::{Client, ClientConfig, ConnectivityChecker};
use fieldsync_sync_engine::{
    ConflictResolution, ConflictStrategy, Connectivity, ConnectivitySignal, EngineStatus,
    HttpTransport, PollingConnectivity, SyncConfig, SyncEngine, SyncError, SyncResult,
};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
mod tests;

/// Resolved configuration shared by every command
pub struct Session {
    pub config: Config,
    pub database_path: PathBuf,
}

/// Write the default config file and create the local database
pub async fn init(session: &Session, manager: &ConfigManager) -> Result<()> {
    let created = manager
        .initialize()
        .context("Failed to write default config")?;

    let store = open_store(&session.database_path).await?;
    store.close().await;

    if created {
        println!(
            "{} Config written to {}",
            style("✓").green().bold(),
            manager.config_path().display()
        );
    } else {
        println!("Config already present at {}", manager.config_path().display());
    }
    println!(
        "{} Database ready at {}",
        style("✓").green().bold(),
        session.database_path.display()
    );

    Ok(())
}

/// Create a record locally and queue it for push
pub async fn create_record(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;
    let data = json_object_arg(matches, "data")?;

    let engine = open_offline(session).await?;
    let record = engine
        .repository(entity_type)
        .create(data)
        .await
        .context("Failed to create record")?;

    println!("{} Created {}/{}", style("✓").green().bold(), entity_type, record.id);
    print_record_summary(&record);
    engine.store().close().await;

    Ok(())
}

/// Merge fields into a record and queue the update
pub async fn update_record(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;
    let id = string_arg(matches, "id")?;
    let changes = json_object_arg(matches, "data")?;

    let engine = open_offline(session).await?;
    let record = engine
        .repository(entity_type)
        .update(id, changes)
        .await
        .with_context(|| format!("Failed to update {}/{}", entity_type, id))?;

    println!("{} Updated {}/{}", style("✓").green().bold(), entity_type, id);
    print_record_summary(&record);
    engine.store().close().await;

    Ok(())
}

/// Delete a record locally and queue the delete
pub async fn remove_record(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;
    let id = string_arg(matches, "id")?;

    let engine = open_offline(session).await?;
    engine
        .repository(entity_type)
        .remove(id)
        .await
        .with_context(|| format!("Failed to remove {}/{}", entity_type, id))?;

    println!("{} Removed {}/{}", style("✓").green().bold(), entity_type, id);
    engine.store().close().await;

    Ok(())
}

/// Show one record with its sync metadata
pub async fn show_record(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;
    let id = string_arg(matches, "id")?;

    let engine = open_offline(session).await?;
    let record = engine
        .repository(entity_type)
        .get_by_id(id)
        .await
        .context("Failed to read record")?;
    engine.store().close().await;

    let record = record.ok_or_else(|| anyhow!("No {} with id '{}'", entity_type, id))?;

    println!("\n{}", style(format!("{}/{}", entity_type, record.id)).bold().cyan());
    println!("{}", "=".repeat(80));
    println!("Status: {}", status_style(&record));
    println!("Local version: {}", record.sync_version);
    if let Some(server_version) = record.server_version {
        println!("Server version: {}", server_version);
    }
    println!("Created: {}", record.created_at);
    println!("Updated: {}", record.updated_at);
    if let Some(last_sync) = record.last_sync_at {
        println!("Last synced: {}", last_sync);
    }
    println!("\nData:\n{}", pretty_json(&record.data));

    Ok(())
}

/// List the live records of one entity type
pub async fn list_records(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;

    let engine = open_offline(session).await?;
    let records = engine
        .repository(entity_type)
        .list()
        .await
        .context("Failed to list records")?;
    engine.store().close().await;

    if records.is_empty() {
        println!("No {} records. Use 'create' to add one.", entity_type);
        return Ok(());
    }

    println!(
        "\n{} {} records",
        style(records.len()).bold().cyan(),
        entity_type
    );
    println!("{}", "=".repeat(80));
    for record in &records {
        print_record_summary(record);
    }

    Ok(())
}

/// List queued operations in push order
pub async fn list_pending(session: &Session) -> Result<()> {
    let store = open_store(&session.database_path).await?;
    let operations = store
        .list_pending()
        .await
        .context("Failed to list pending operations")?;
    store.close().await;

    if operations.is_empty() {
        println!("{} Nothing waiting to be pushed", style("✓").green().bold());
        return Ok(());
    }

    println!(
        "\n{} pending operations",
        style(operations.len()).bold().cyan()
    );
    println!("{}", "=".repeat(80));
    for operation in &operations {
        print_operation(operation);
    }

    Ok(())
}

/// Print the status word
pub async fn show_status(session: &Session) -> Result<()> {
    let engine = open_probed(session).await?;
    let status = engine.status().await.context("Failed to read status")?;
    let pending = engine.count().await.context("Failed to count pending operations")?;
    engine.store().close().await;

    let word = match status {
        EngineStatus::Offline => style(status.as_str()).red().bold(),
        EngineStatus::Pending | EngineStatus::Syncing => style(status.as_str()).yellow().bold(),
        EngineStatus::Synced => style(status.as_str()).green().bold(),
    };
    println!("Status: {}", word);
    println!("Pending operations: {}", pending);
    println!("Remote: {}", session.config.sync.base_url);

    Ok(())
}

/// Print queue, conflict and last-cycle counters
pub async fn show_stats(session: &Session) -> Result<()> {
    let engine = open_offline(session).await?;
    let stats = engine.stats().await.context("Failed to read sync statistics")?;
    engine.store().close().await;

    println!("\n{}", style("Sync Statistics").bold().cyan());
    println!("{}", "=".repeat(80));
    println!("Pending operations: {}", style(stats.pending).bold());
    println!("Failing operations: {}", style(stats.failing).bold());
    println!("Conflicts: {}", style(stats.conflicts).bold());
    match stats.last_sync_at {
        Some(at) => println!("Last sync: {}", at),
        None => println!("Last sync: never"),
    }
    if !stats.last_errors.is_empty() {
        println!("\nErrors of the last cycle:");
        for error in &stats.last_errors {
            println!("  {} {}", style("✗").red(), error);
        }
    }

    Ok(())
}

/// Print the newest sync log entries
pub async fn show_log(session: &Session, matches: &ArgMatches) -> Result<()> {
    let limit = matches.get_one::<i64>("limit").copied().unwrap_or(20);

    let store = open_store(&session.database_path).await?;
    let entries = store
        .recent_logs(limit)
        .await
        .context("Failed to read sync log")?;
    store.close().await;

    if entries.is_empty() {
        println!("No sync cycles recorded yet.");
        return Ok(());
    }

    for entry in &entries {
        print_log_entry(entry);
    }

    Ok(())
}

/// Run one push/pull cycle
pub async fn run_sync(session: &Session) -> Result<()> {
    let engine = open_probed(session).await?;
    let result = engine.sync().await;
    engine.store().close().await;

    print_sync_result(&result);
    if !result.success {
        bail!("Sync finished with {} error(s)", result.errors.len());
    }

    Ok(())
}

/// List records waiting for a resolution
pub async fn list_conflicts(session: &Session) -> Result<()> {
    let engine = open_offline(session).await?;
    let conflicts = engine.conflicts().await.context("Failed to list conflicts")?;
    engine.store().close().await;

    if conflicts.is_empty() {
        println!("{} No conflicts", style("✓").green().bold());
        return Ok(());
    }

    println!("\n{} conflicts", style(conflicts.len()).bold().yellow());
    println!("{}", "=".repeat(80));
    for record in &conflicts {
        println!("\n{}", style(format!("{}/{}", record.entity_type, record.id)).bold());
        println!("  Local:\n{}", indent(&pretty_json(&record.data), 4));
        match &record.conflict_remote {
            Some(remote) if remote.action == RemoteAction::Delete => {
                println!("  Remote: deleted");
            }
            Some(remote) => {
                let data = remote.data.clone().unwrap_or(Value::Null);
                println!("  Remote:\n{}", indent(&pretty_json(&data), 4));
            }
            None => println!("  Remote: unavailable"),
        }
    }
    println!(
        "\nResolve with: fieldsync resolve <type> <id> <server-wins|client-wins|merge>"
    );

    Ok(())
}

/// Settle one conflicted record
pub async fn resolve_conflict(session: &Session, matches: &ArgMatches) -> Result<()> {
    let entity_type = entity_type_arg(matches)?;
    let id = string_arg(matches, "id")?;
    let resolution: ConflictResolution = string_arg(matches, "resolution")?
        .parse()
        .map_err(anyhow::Error::msg)?;

    let engine = open_offline(session).await?;
    let outcome = engine
        .resolve_conflict(entity_type, id, resolution)
        .await
        .with_context(|| format!("Failed to resolve {}/{}", entity_type, id))?;
    engine.store().close().await;

    println!(
        "{} Resolved {}/{} with {}",
        style("✓").green().bold(),
        entity_type,
        id,
        resolution
    );
    match outcome {
        Some(record) => print_record_summary(&record),
        None => println!("  Record deleted"),
    }

    Ok(())
}

/// Probe connectivity and sync on every reconnect until Ctrl-C
pub async fn watch(session: &Session) -> Result<()> {
    let sync = &session.config.sync;
    let checker = ConnectivityChecker::new(http_client(&session.config)?, sync.probe_url());
    let interval = Duration::from_secs(sync.connectivity_probe_interval_secs);
    let connectivity = PollingConnectivity::spawn(checker, interval, false)
        .context("Failed to start connectivity probe")?;

    let engine = open_engine(session, Arc::new(connectivity)).await?;
    engine.start().context("Failed to start sync engine")?;

    println!(
        "Watching {} every {}s, press Ctrl-C to stop",
        sync.probe_url(),
        interval.as_secs()
    );
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    engine.stop().context("Failed to stop sync engine")?;
    engine.store().close().await;
    println!("Stopped.");

    Ok(())
}

// ===== Engine assembly =====

fn http_client(config: &Config) -> Result<Client> {
    let client_config =
        ClientConfig::default().with_timeout(Duration::from_secs(config.sync.request_timeout_secs));
    Client::with_config(client_config).context("Failed to build HTTP client")
}

fn sync_config(config: &Config) -> Result<SyncConfig> {
    let conflict_strategy: ConflictStrategy = config
        .sync
        .conflict_strategy
        .parse()
        .map_err(anyhow::Error::msg)
        .context("Invalid sync.conflict_strategy")?;

    Ok(SyncConfig {
        conflict_strategy,
        entity_types: config.sync.entity_types.clone(),
        auto_sync_on_reconnect: config.sync.auto_sync_on_reconnect,
    })
}

async fn open_store(path: &Path) -> Result<LocalStore> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    LocalStore::open(DatabaseConfig::new(path.to_string_lossy()))
        .await
        .context("Failed to open local database")
}

async fn open_engine(
    session: &Session,
    connectivity: Arc<dyn Connectivity>,
) -> Result<SyncEngine> {
    let store = open_store(&session.database_path).await?;
    let client = http_client(&session.config)?;
    let transport = HttpTransport::new(client, &session.config.sync.base_url);

    Ok(SyncEngine::new(
        store,
        Arc::new(transport),
        connectivity,
        sync_config(&session.config)?,
    ))
}

/// Engine for local-only commands; never touches the network
async fn open_offline(session: &Session) -> Result<SyncEngine> {
    open_engine(session, Arc::new(ConnectivitySignal::new(false))).await
}

/// Engine whose connectivity comes from one probe of the remote store
async fn open_probed(session: &Session) -> Result<SyncEngine> {
    let checker = ConnectivityChecker::new(
        http_client(&session.config)?,
        session.config.sync.probe_url(),
    );
    let online = checker.is_online().await;
    log::debug!("Probe of {} says online = {}", session.config.sync.probe_url(), online);

    open_engine(session, Arc::new(ConnectivitySignal::new(online))).await
}

// ===== Argument helpers =====

fn string_arg<'a>(matches: &'a ArgMatches, name: &str) -> Result<&'a str> {
    matches
        .get_one::<String>(name)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("Argument <{}> is required", name))
}

fn entity_type_arg(matches: &ArgMatches) -> Result<EntityType> {
    string_arg(matches, "type")?
        .parse()
        .context("Invalid entity type")
}

fn json_object_arg(matches: &ArgMatches, name: &str) -> Result<Value> {
    parse_json_object(string_arg(matches, name)?)
}

fn parse_json_object(raw: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(raw).context("Record data is not valid JSON")?;
    if !value.is_object() {
        bail!("Record data must be a JSON object, got: {}", raw);
    }
    Ok(value)
}

// ===== Errors =====

/// Store error behind a command failure, if any
fn app_error(err: &anyhow::Error) -> Option<&AppError> {
    err.chain().find_map(|cause| {
        cause
            .downcast_ref::<AppError>()
            .or_else(|| match cause.downcast_ref::<SyncError>() {
                Some(SyncError::Store(e)) => Some(e),
                _ => None,
            })
    })
}

/// Text printed when a command fails
pub fn describe_error(err: &anyhow::Error) -> String {
    let mut text = format!("{} {:#}", style("Error:").red().bold(), err);
    if let Some(app) = app_error(err) {
        text.push('\n');
        text.push_str(&app.user_message());
    }
    text
}

/// Returns true if the failure left local data unusable
pub fn is_critical(err: &anyhow::Error) -> bool {
    app_error(err).is_some_and(AppError::is_critical)
}

// ===== Output =====

fn print_record_summary(record: &SyncableRecord) {
    println!(
        "  {} | {} | v{}",
        truncate(&record.id, 36),
        status_style(record),
        record.sync_version
    );
    if let Some(name) = record.field("name").and_then(Value::as_str) {
        println!("  {}", style(name).bold());
    }
}

fn status_style(record: &SyncableRecord) -> console::StyledObject<&'static str> {
    let word = record.sync_status.as_str();
    match record.sync_status {
        SyncStatus::Synced => style(word).green(),
        SyncStatus::Pending => style(word).yellow(),
        SyncStatus::Conflict | SyncStatus::Error => style(word).red(),
    }
}

fn print_operation(operation: &PendingOperation) {
    println!(
        "#{:<5} {:<7} {}/{} (queued {})",
        operation.id,
        operation.operation.as_str(),
        operation.entity_type,
        operation.entity_id,
        operation.created_at
    );
    if operation.has_failed() {
        println!(
            "       {} {} attempt(s) failed: {}",
            style("!").red().bold(),
            operation.retry_count,
            operation.last_error.as_deref().unwrap_or("unknown error")
        );
    }
}

fn print_log_entry(entry: &SyncLogEntry) {
    let marker = if entry.is_clean() {
        style("✓").green()
    } else {
        style("✗").red()
    };
    println!(
        "{} {} {:<4} {:<12} processed {} failed {} in {}ms",
        marker,
        entry.timestamp,
        entry.direction.as_str(),
        entry.entity_type.as_str(),
        entry.records_processed,
        entry.records_failed,
        entry.duration_ms
    );
    for error in &entry.errors {
        println!("    {}", error);
    }
}

fn print_sync_result(result: &SyncResult) {
    let headline = if result.success {
        style("Sync complete").green().bold()
    } else {
        style("Sync finished with errors").red().bold()
    };
    println!("{} in {}ms", headline, result.duration_ms);
    println!("  Pushed: {}", result.pushed);
    println!("  Pulled: {}", result.pulled);
    println!("  Conflicts: {}", result.conflicts);
    for error in &result.errors {
        println!("  {} {}", style("✗").red(), error);
    }
}

fn pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    text.lines()
        .map(|line| format!("{}{}", pad, line))
        .collect::<Vec<_>>()
        .join("\n")
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len).collect();
        format!("{}...", cut)
    }
}
