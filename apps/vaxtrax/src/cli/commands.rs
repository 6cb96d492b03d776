//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use crate::api::{self, CreateBatchRequest, OverrideSubmission, ScanSubmission};
use crate::config::{AppConfig, Backend};
use std::path::{Path, PathBuf};
use vaxtrax_core::{
    Batch, BatchId, BatchProjection, CustodyDesk, RedbRegistry, RequestContext, Role,
    StorageBackend, VaxtraxError, batch_checksum, compute_blake3_hash, export_batch,
    import_batch, verify_batch,
};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of an exported batch file accepted by `verify` (64 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 64 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), VaxtraxError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| VaxtraxError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(VaxtraxError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Canonicalize an input path and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, VaxtraxError> {
    let canonical = path.canonicalize().map_err(|e| {
        VaxtraxError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(VaxtraxError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Canonicalize the parent of an output path; the file itself may not exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, VaxtraxError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        VaxtraxError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(VaxtraxError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| VaxtraxError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// OUTPUT HELPERS
// =============================================================================

fn print_json(value: &impl serde::Serialize) -> Result<(), VaxtraxError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| VaxtraxError::SerializationError(e.to_string()))?;
    println!("{}", text);
    Ok(())
}

fn print_batch(projection: &BatchProjection) {
    println!("Batch {}", projection.id);
    println!("==================");
    println!("Status:       {}", projection.status);
    println!("Stage:        {}", projection.stage);
    match projection.temperature {
        Some(t) => println!("Temperature:  {:.1} °C", t),
        None => println!("Temperature:  (no reading)"),
    }
    println!("Location:     {}", projection.location);
    println!("Last updated: {}", projection.last_updated.to_rfc3339());
    if let Some(limits) = projection.temp_limits {
        println!("Limits:       {:.1} .. {:.1} °C", limits.min, limits.max);
    }
    if let Some(recommendation) = projection.recommendation {
        println!("Gate:         {}", recommendation);
    }
}

fn print_history(projection: &BatchProjection) {
    println!("History of {} ({} entries, newest first)", projection.id, projection.history.len());
    for event in &projection.history {
        let reading = event
            .temperature
            .map(|t| format!("{:.1} °C", t))
            .unwrap_or_else(|| "-".to_string());
        let action = event
            .action
            .map(|a| format!(" [{}]", a.as_str()))
            .unwrap_or_default();
        let by = event
            .scanned_by
            .as_deref()
            .map(|who| format!(" by {}", who))
            .unwrap_or_default();
        println!(
            "  {}  {:<9} {:<8} {:>9}  {}{}{}",
            event.timestamp.to_rfc3339(),
            event.stage.name(),
            event.status.name(),
            reading,
            event.location,
            by,
            action
        );
    }
}

/// Print the operator view of a batch after a mutation.
fn report(batch: &Batch, json_mode: bool) -> Result<(), VaxtraxError> {
    let projection = Role::Operator.project(batch);
    if json_mode {
        print_json(&projection)
    } else {
        print_batch(&projection);
        Ok(())
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP server.
pub async fn cmd_server(config: &AppConfig) -> Result<(), VaxtraxError> {
    let desk = open_desk(config)?;

    println!("VaxTrax Custody Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", config.server.host);
    println!("  Port:     {}", config.server.port);
    println!("  Backend:  {}", config.storage.backend);
    println!("  Database: {:?}", config.storage.database);
    println!(
        "  Thresholds: unsafe > {} °C, at risk > {} °C, band {} °C",
        config.thresholds.unsafe_above,
        config.thresholds.at_risk_above,
        config.thresholds.risk_band
    );
    println!();
    println!("Endpoints:");
    println!("  GET  /batches               - List batches");
    println!("  POST /batches               - Register a batch");
    println!("  GET  /batches/{{id}}          - Show a batch");
    println!("  POST /batches/{{id}}/scans    - Record a scan");
    println!("  POST /batches/{{id}}/proceed  - Accept proceed");
    println!("  POST /batches/{{id}}/halt     - Halt a batch");
    println!("  GET  /health                - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", config.server.host, config.server.port);
    api::run_server(&addr, desk).await
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize new database.
pub fn cmd_init(config: &AppConfig, force: bool) -> Result<(), VaxtraxError> {
    let db_path = &config.storage.database;

    if config.storage.backend == Backend::Memory {
        println!("Memory backend selected; nothing to initialize");
        return Ok(());
    }

    if db_path.exists() {
        if !force {
            return Err(VaxtraxError::Validation(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| VaxtraxError::IoError(format!("Remove database: {}", e)))?;
    }

    let registry = RedbRegistry::open(db_path)?;
    println!(
        "Initialized new redb database at {:?} ({} batches)",
        db_path,
        registry.batch_count()?
    );
    Ok(())
}

// =============================================================================
// CUSTODY COMMANDS
// =============================================================================

/// Register a batch.
pub fn cmd_create(
    config: &AppConfig,
    ctx: &RequestContext,
    json_mode: bool,
    request: &CreateBatchRequest,
) -> Result<(), VaxtraxError> {
    let desk = open_desk(config)?;
    let batch = desk.create_batch(ctx, request.to_new_batch()?)?;
    tracing::info!(event = "create", batch_id = %batch.id(), "Batch registered");
    report(&batch, json_mode)
}

/// Record a checkpoint scan.
pub fn cmd_scan(
    config: &AppConfig,
    ctx: &RequestContext,
    json_mode: bool,
    id: &str,
    submission: ScanSubmission,
) -> Result<(), VaxtraxError> {
    let desk = open_desk(config)?;
    let outcome = desk.submit_scan(ctx, &BatchId::new(id), submission.to_scan_request()?)?;
    tracing::info!(
        event = "scan",
        batch_id = %id,
        status = %outcome.batch.status(),
        recommendation = %outcome.recommendation,
        "Scan recorded"
    );

    if json_mode {
        return print_json(&serde_json::json!({
            "batch": Role::Operator.project(&outcome.batch),
            "recommendation": outcome.recommendation,
        }));
    }
    print_batch(&Role::Operator.project(&outcome.batch));
    println!();
    println!("Recommendation: {}", outcome.recommendation);
    Ok(())
}

/// Manually override status and/or stage.
pub fn cmd_override(
    config: &AppConfig,
    ctx: &RequestContext,
    json_mode: bool,
    id: &str,
    submission: &OverrideSubmission,
) -> Result<(), VaxtraxError> {
    let desk = open_desk(config)?;
    let batch = desk.override_batch(ctx, &BatchId::new(id), submission.to_override_request()?)?;
    tracing::info!(
        event = "override",
        batch_id = %id,
        status = %batch.status(),
        stage = %batch.stage(),
        "Batch overridden"
    );
    report(&batch, json_mode)
}

/// Accept a proceed recommendation.
pub fn cmd_proceed(
    config: &AppConfig,
    ctx: &RequestContext,
    json_mode: bool,
    id: &str,
) -> Result<(), VaxtraxError> {
    let batch = open_desk(config)?.proceed(ctx, &BatchId::new(id))?;
    tracing::info!(event = "proceed", batch_id = %id, "Custody proceeds");
    report(&batch, json_mode)
}

/// Halt a batch.
pub fn cmd_halt(
    config: &AppConfig,
    ctx: &RequestContext,
    json_mode: bool,
    id: &str,
) -> Result<(), VaxtraxError> {
    let batch = open_desk(config)?.halt(ctx, &BatchId::new(id))?;
    tracing::warn!(event = "halt", batch_id = %id, status = %batch.status(), "Batch halted");
    report(&batch, json_mode)
}

// =============================================================================
// READ COMMANDS
// =============================================================================

/// Show one batch.
pub fn cmd_show(
    config: &AppConfig,
    json_mode: bool,
    id: &str,
    view: &str,
) -> Result<(), VaxtraxError> {
    let role: Role = view.parse()?;
    let projection = role.project(&open_desk(config)?.find(&BatchId::new(id))?);

    if json_mode {
        return print_json(&projection);
    }
    print_batch(&projection);
    Ok(())
}

/// Show a batch's ledger, newest first.
pub fn cmd_history(
    config: &AppConfig,
    json_mode: bool,
    id: &str,
    view: &str,
) -> Result<(), VaxtraxError> {
    let role: Role = view.parse()?;
    let projection = role.project(&open_desk(config)?.find(&BatchId::new(id))?);

    if json_mode {
        return print_json(&projection.history);
    }
    print_history(&projection);
    Ok(())
}

/// List batches.
pub fn cmd_list(config: &AppConfig, json_mode: bool, view: &str) -> Result<(), VaxtraxError> {
    let role: Role = view.parse()?;
    let projections: Vec<BatchProjection> = open_desk(config)?
        .list()?
        .iter()
        .map(|b| role.project(b))
        .collect();

    if json_mode {
        return print_json(&projections);
    }

    if projections.is_empty() {
        println!("No batches registered");
        return Ok(());
    }
    println!("{:<14} {:<9} {:<8} {:>9}  Location", "Batch", "Stage", "Status", "Temp");
    for p in &projections {
        let reading = p
            .temperature
            .map(|t| format!("{:.1} °C", t))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<14} {:<9} {:<8} {:>9}  {}",
            p.id,
            p.stage.name(),
            p.status.name(),
            reading,
            p.location
        );
    }
    Ok(())
}

// =============================================================================
// EXPORT / VERIFY COMMANDS
// =============================================================================

/// Export one batch in canonical format.
pub fn cmd_export(config: &AppConfig, id: &str, output: &Path) -> Result<(), VaxtraxError> {
    let validated_output = validate_output_path(output)?;

    let batch = open_desk(config)?.find(&BatchId::new(id))?;
    let data = export_batch(&batch)?;

    std::fs::write(&validated_output, &data)
        .map_err(|e| VaxtraxError::IoError(format!("Write file: {}", e)))?;

    println!("Checksum: {}", batch_checksum(&batch)?);
    println!("BLAKE3:   {}", compute_blake3_hash(&data));
    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

/// Validate an exported file; with `against`, also compare it to the stored
/// batch.
pub fn cmd_verify(
    config: &AppConfig,
    json_mode: bool,
    input: &Path,
    against: Option<&str>,
) -> Result<(), VaxtraxError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;

    let data = std::fs::read(&validated_path)
        .map_err(|e| VaxtraxError::IoError(format!("Read file: {}", e)))?;

    let imported = import_batch(&data)?;
    let matches = match against {
        Some(id) => Some(verify_batch(&open_desk(config)?.find(&BatchId::new(id))?, &data)?),
        None => None,
    };

    if json_mode {
        print_json(&serde_json::json!({
            "valid": true,
            "batch_id": imported.id().as_str(),
            "entries": imported.scan_history().len(),
            "checksum": batch_checksum(&imported)?,
            "blake3": compute_blake3_hash(&data),
            "matches_stored": matches,
        }))?;
    } else {
        println!(
            "Valid export of {} ({} ledger entries)",
            imported.id(),
            imported.scan_history().len()
        );
        println!("BLAKE3: {}", compute_blake3_hash(&data));
        if let Some(matches) = matches {
            println!(
                "Stored batch: {}",
                if matches { "identical" } else { "DIFFERS" }
            );
        }
    }

    if matches == Some(false) {
        return Err(VaxtraxError::Validation(format!(
            "export does not match stored batch {}",
            imported.id()
        )));
    }
    Ok(())
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Open the configured storage and wrap it in a desk with the configured
/// thresholds.
pub fn open_desk(config: &AppConfig) -> Result<CustodyDesk<StorageBackend>, VaxtraxError> {
    let storage = match config.storage.backend {
        Backend::Memory => StorageBackend::default(),
        Backend::Redb => StorageBackend::persistent(&config.storage.database)?,
    };
    CustodyDesk::with_thresholds(storage, config.thresholds)
}

// =============================================================================
// TESTS
// =============================================================================
