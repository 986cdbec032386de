//! # CLI Command Implementations
//!
//! Each `cmd_*` prints its result; the `run_*` functions behind them return
//! the data so it can be checked without capturing stdout.

use super::changes::{ChangeRecord, parse_changes};
use relcount_core::{
    CacheMetrics, CountCache, Descriptor, Direction, EdgeId, Query, RedbGraph, RelcountError,
    TagValue, VertexId, VertexSnapshot, canonical_checksum, export::canonical_crypto_hash,
    export_canonical, import_canonical, restore_canonical, verify_canonical,
};
use serde::Serialize;
use std::path::{Path, PathBuf};

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum size of a change file (100 MB).
const MAX_CHANGE_FILE_SIZE: u64 = 100 * 1024 * 1024;

/// Maximum size of a canonical export (500 MB).
const MAX_IMPORT_FILE_SIZE: u64 = 500 * 1024 * 1024;

fn validate_file_size(path: &Path, max_size: u64) -> Result<(), RelcountError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RelcountError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(RelcountError::IoError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Resolve `..` and symlinks and require an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, RelcountError> {
    let canonical = path.canonicalize().map_err(|e| {
        RelcountError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(RelcountError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Resolve the parent directory of an output path, which must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, RelcountError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        RelcountError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(RelcountError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| RelcountError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &impl Serialize) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_default()
    );
}

// =============================================================================
// CONTEXT
// =============================================================================

/// What every command except `init` works with.
#[derive(Debug)]
pub struct Context {
    pub db_path: PathBuf,
    pub cache: CountCache,
    pub json_mode: bool,
}

impl Context {
    /// Open the database; it is created if missing.
    pub fn open(&self) -> Result<RedbGraph, RelcountError> {
        RedbGraph::open(&self.db_path)
    }
}

// =============================================================================
// INIT COMMAND
// =============================================================================

/// Initialize a new database.
pub fn cmd_init(db_path: &Path, force: bool) -> Result<(), RelcountError> {
    if db_path.exists() {
        if !force {
            return Err(RelcountError::IoError(
                "Database already exists. Use --force to overwrite.".to_string(),
            ));
        }
        std::fs::remove_file(db_path)
            .map_err(|e| RelcountError::IoError(format!("Remove database: {}", e)))?;
    }

    RedbGraph::open(db_path)?;
    println!("Initialized new database at {:?}", db_path);
    Ok(())
}

// =============================================================================
// APPLY COMMAND
// =============================================================================

/// Result of applying a change file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ApplySummary {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Compaction merges performed while applying.
    pub merges: usize,
    /// Changes after which some group stayed over the threshold.
    pub unsettled: usize,
}

/// Apply a change file to the graph and its caches.
///
/// Changes are applied in file order. The first failing change stops the
/// run; changes before it stay applied.
pub fn run_apply(ctx: &Context, file: &Path) -> Result<ApplySummary, RelcountError> {
    let validated_path = validate_file_path(file)?;
    validate_file_size(&validated_path, MAX_CHANGE_FILE_SIZE)?;
    let contents = std::fs::read(&validated_path)
        .map_err(|e| RelcountError::IoError(format!("Read file: {}", e)))?;
    let changes = parse_changes(&contents)?;

    let mut graph = ctx.open()?;
    let mut summary = ApplySummary::default();

    for change in &changes {
        let properties = change.properties();
        let edge_change = match change {
            ChangeRecord::Create {
                label, start, end, ..
            } => {
                summary.created += 1;
                graph.add_edge(label.as_str(), VertexId(*start), VertexId(*end), properties)?
            }
            ChangeRecord::Update { edge, .. } => {
                summary.updated += 1;
                graph.update_edge(EdgeId(*edge), properties)?
            }
            ChangeRecord::Delete { edge } => {
                summary.deleted += 1;
                graph.remove_edge(EdgeId(*edge))?
            }
        };

        let report = ctx.cache.handle(&mut graph, &edge_change)?;
        summary.merges += report.merges;
        if !report.settled {
            summary.unsettled += 1;
        }
    }

    tracing::info!(
        created = summary.created,
        updated = summary.updated,
        deleted = summary.deleted,
        merges = summary.merges,
        "change file applied"
    );
    Ok(summary)
}

pub fn cmd_apply(ctx: &Context, file: &Path) -> Result<(), RelcountError> {
    let summary = run_apply(ctx, file)?;

    if ctx.json_mode {
        print_json(&summary);
        return Ok(());
    }

    println!(
        "Applied {} changes ({} created, {} updated, {} deleted)",
        summary.created + summary.updated + summary.deleted,
        summary.created,
        summary.updated,
        summary.deleted
    );
    println!("Compaction merges: {}", summary.merges);
    if summary.unsettled > 0 {
        println!(
            "Warning: {} changes left a group above the compaction threshold",
            summary.unsettled
        );
    }
    Ok(())
}

// =============================================================================
// COUNT COMMAND
// =============================================================================

/// A parsed `count` invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountRequest {
    pub vertex: VertexId,
    pub query: Query,
}

impl CountRequest {
    /// Build from CLI arguments: `tags` as `key=value`, `any` as keys.
    pub fn parse(
        vertex: u64,
        label: &str,
        direction: &str,
        tags: &[String],
        any: &[String],
        literal: bool,
    ) -> Result<Self, RelcountError> {
        let direction: Direction = direction.parse()?;
        let mut descriptor = Descriptor::new(label, direction);
        for tag in tags {
            let (key, value) = tag.split_once('=').ok_or_else(|| {
                RelcountError::InvalidDescriptor(format!("tag '{}' is not key=value", tag))
            })?;
            descriptor = descriptor.with(key, TagValue::from(value));
        }
        for key in any {
            descriptor = descriptor.with_any(key.as_str());
        }

        let query = if literal {
            Query::literal(descriptor)
        } else {
            Query::aggregate(descriptor)
        };
        Ok(Self {
            vertex: VertexId(vertex),
            query,
        })
    }
}

/// Answer a count from the cache.
///
/// `AmbiguousCount` is returned as is; scanning the edges is left to the
/// caller.
pub fn run_count(ctx: &Context, request: &CountRequest) -> Result<u64, RelcountError> {
    let graph = ctx.open()?;
    ctx.cache.query(&graph, request.vertex, &request.query)
}

pub fn cmd_count(ctx: &Context, request: &CountRequest) -> Result<(), RelcountError> {
    let count = run_count(ctx, request)?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "vertex": request.vertex.0,
            "query": request.query.descriptor.to_string(),
            "mode": format!("{:?}", request.query.mode),
            "count": count,
        });
        print_json(&output);
        return Ok(());
    }

    println!(
        "{} at vertex {}: {}",
        request.query.descriptor, request.vertex.0, count
    );
    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// The cached state of one vertex.
pub fn run_inspect(ctx: &Context, vertex: u64) -> Result<VertexSnapshot, RelcountError> {
    let graph = ctx.open()?;
    let cache = ctx.cache.load(&graph, VertexId(vertex))?;
    Ok(VertexSnapshot::capture(&cache))
}

pub fn cmd_inspect(ctx: &Context, vertex: u64) -> Result<(), RelcountError> {
    let snapshot = run_inspect(ctx, vertex)?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "vertex": vertex,
            "entries": snapshot.entries,
            "aggregates": snapshot.aggregates,
            "saturated": snapshot
                .saturated
                .iter()
                .map(|(label, direction)| format!("{}#{}", label, direction))
                .collect::<Vec<_>>(),
        });
        print_json(&output);
        return Ok(());
    }

    if snapshot.is_empty() {
        println!("Vertex {} has no cached counts", vertex);
        return Ok(());
    }

    println!("Cached counts for vertex {}:", vertex);
    for (descriptor, count) in &snapshot.entries {
        println!("  {:>8}  {}", count, descriptor);
    }
    if !snapshot.aggregates.is_empty() {
        println!();
        println!("Aggregates:");
        for (descriptor, count) in &snapshot.aggregates {
            println!("  {:>8}  {}", count, descriptor);
        }
    }
    if !snapshot.saturated.is_empty() {
        println!();
        println!("Saturated groups:");
        for (label, direction) in &snapshot.saturated {
            println!("  {}#{}", label, direction);
        }
    }
    Ok(())
}

// =============================================================================
// REBUILD / EVICT COMMANDS
// =============================================================================

pub fn cmd_rebuild(ctx: &Context) -> Result<(), RelcountError> {
    let mut graph = ctx.open()?;
    let rebuilt = ctx.cache.rebuild(&mut graph)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "rebuilt_vertices": rebuilt }));
        return Ok(());
    }
    println!("Rebuilt caches of {} vertices", rebuilt);
    Ok(())
}

pub fn cmd_evict(ctx: &Context, vertex: u64) -> Result<(), RelcountError> {
    let mut graph = ctx.open()?;
    ctx.cache.evict(&mut graph, VertexId(vertex))?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "evicted": vertex }));
        return Ok(());
    }
    println!("Evicted cache of vertex {}", vertex);
    Ok(())
}

// =============================================================================
// STATUS COMMAND
// =============================================================================

/// Edge count and cache metrics.
pub fn run_status(ctx: &Context) -> Result<(usize, CacheMetrics), RelcountError> {
    let graph = ctx.open()?;
    let metrics = CacheMetrics::collect(&ctx.cache, &graph)?;
    Ok((graph.edge_count()?, metrics))
}

pub fn cmd_status(ctx: &Context) -> Result<(), RelcountError> {
    let (edge_count, metrics) = run_status(ctx)?;
    let config = ctx.cache.config();

    if ctx.json_mode {
        let output = serde_json::json!({
            "database": ctx.db_path.to_string_lossy(),
            "edge_count": edge_count,
            "compaction_threshold": config.compaction_threshold,
            "metrics": metrics,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Relationship Count Cache Status");
    println!("===============================");
    println!("Database:  {:?}", ctx.db_path);
    println!("Threshold: {}", config.compaction_threshold);
    println!();
    println!("Edges:              {}", edge_count);
    println!("Vertices:           {}", metrics.vertex_count);
    println!("Cached vertices:    {}", metrics.cached_vertex_count);
    println!("Entries:            {}", metrics.entry_count);
    println!("General entries:    {}", metrics.general_entry_count);
    println!("Aggregates:         {}", metrics.aggregate_count);
    println!("Saturated groups:   {}", metrics.saturated_group_count);
    println!("Largest group:      {}", metrics.largest_group);
    println!(
        "Threshold pressure: {} per thousand",
        metrics.threshold_pressure_permille
    );
    Ok(())
}

// =============================================================================
// EXPORT / IMPORT / VERIFY COMMANDS
// =============================================================================

pub fn cmd_export(ctx: &Context, output: &Path) -> Result<(), RelcountError> {
    let validated_output = validate_output_path(output)?;
    let graph = ctx.open()?;

    let data = export_canonical(&ctx.cache, &graph)?;
    let checksum = canonical_checksum(&ctx.cache, &graph)?;
    std::fs::write(&validated_output, &data)
        .map_err(|e| RelcountError::IoError(format!("Write file: {}", e)))?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "bytes": data.len(),
            "checksum": checksum,
            "path": validated_output.to_string_lossy(),
        });
        print_json(&output);
        return Ok(());
    }
    println!("Checksum: {}", checksum);
    println!("Exported {} bytes to {:?}", data.len(), validated_output);
    Ok(())
}

fn read_export(input: &Path) -> Result<Vec<u8>, RelcountError> {
    let validated_path = validate_file_path(input)?;
    validate_file_size(&validated_path, MAX_IMPORT_FILE_SIZE)?;
    std::fs::read(&validated_path).map_err(|e| RelcountError::IoError(format!("Read file: {}", e)))
}

/// Write the caches of a canonical export into the database. Returns the
/// number of vertices restored.
pub fn run_import(ctx: &Context, input: &Path) -> Result<usize, RelcountError> {
    let canonical = import_canonical(&read_export(input)?)?;
    let mut graph = ctx.open()?;
    restore_canonical(&ctx.cache, &mut graph, &canonical)?;
    tracing::info!(vertices = canonical.vertices.len(), "canonical export restored");
    Ok(canonical.vertices.len())
}

pub fn cmd_import(ctx: &Context, input: &Path) -> Result<(), RelcountError> {
    let restored = run_import(ctx, input)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "restored_vertices": restored }));
        return Ok(());
    }
    println!("Restored caches of {} vertices", restored);
    Ok(())
}

/// True if the stored caches equal the export.
pub fn run_verify(ctx: &Context, input: &Path) -> Result<bool, RelcountError> {
    let data = read_export(input)?;
    let graph = ctx.open()?;
    verify_canonical(&ctx.cache, &graph, &data)
}

pub fn cmd_verify(ctx: &Context, input: &Path) -> Result<(), RelcountError> {
    let matches = run_verify(ctx, input)?;

    if ctx.json_mode {
        print_json(&serde_json::json!({ "matches": matches }));
    } else if matches {
        println!("Caches match {:?}", input);
    } else {
        println!("Caches differ from {:?}", input);
    }

    if matches {
        Ok(())
    } else {
        Err(RelcountError::DeserializationError(
            "Caches differ from export".to_string(),
        ))
    }
}

// =============================================================================
// HASH COMMAND
// =============================================================================

pub fn cmd_hash(ctx: &Context) -> Result<(), RelcountError> {
    let graph = ctx.open()?;
    let checksum = canonical_checksum(&ctx.cache, &graph)?;
    let hash = canonical_crypto_hash(&ctx.cache, &graph)?;

    if ctx.json_mode {
        let output = serde_json::json!({
            "checksum": checksum,
            "blake3": hash,
        });
        print_json(&output);
        return Ok(());
    }
    println!("Checksum: {}", checksum);
    println!("BLAKE3:   {}", hash);
    Ok(())
}
