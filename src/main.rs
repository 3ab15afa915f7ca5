//! Tilestore CLI - inspect and maintain a SQLite tile cache

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;
use crossbeam::channel::Sender;
use tilestore::config::{self, TileStoreConfig};
use tilestore::ui::{self, Icons, SeedMessage, SeedProgress};
use tilestore::{BlobStore, SqliteBlobStore, TileCoordinate, TileKey};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Highest zoom level `seed` accepts; level z has 4^z tiles
const MAX_SEED_ZOOM: i64 = 12;

#[derive(Parser)]
#[command(name = "tilestore")]
#[command(version)]
#[command(about = "SQLite tile cache - one database file per map layer")]
#[command(long_about = r#"
Tilestore keeps rendered map tiles in one SQLite database per layer.

Tile keys are written as <layer>/<grid_set>/<z>/<x>/<y>.<format>

Example usage:
  tilestore init --root /var/cache/tiles
  tilestore put "topp:states/EPSG:4326/3/4/2.png" ./tile.png
  tilestore get "topp:states/EPSG:4326/3/4/2.png" --output out.png
  tilestore meta set topp:states bbox "-10,-10,10,10"
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON instead of human-readable output
    #[arg(long, global = true)]
    json: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Storage root directory (overrides the config file)
    #[arg(short, long, global = true)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a config file pointing at a storage root
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    #[command(flatten)]
    Store(StoreCommands),
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Store a tile from a file
    Put {
        /// Tile key
        key: String,

        /// File holding the tile bytes
        file: PathBuf,
    },

    /// Fetch a tile
    Get {
        /// Tile key
        key: String,

        /// Write the tile bytes to this file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Delete a single tile
    Delete {
        /// Tile key
        key: String,
    },

    /// Delete every tile of a grid set in a layer
    DeleteGridset {
        #[arg(short, long)]
        layer: String,

        #[arg(short, long)]
        gridset: String,
    },

    /// Delete a whole layer store
    DeleteLayer {
        layer: String,
    },

    /// Rename a layer store
    Rename {
        old: String,
        new: String,
    },

    /// Read or write layer metadata
    Meta {
        #[command(subcommand)]
        command: MetaCommands,
    },

    /// Show statistics for one layer, or for every layer
    Stats {
        layer: Option<String>,
    },

    /// Fill a zoom range of a layer with the same tile
    Seed {
        #[arg(short, long)]
        layer: String,

        #[arg(short, long)]
        gridset: String,

        #[arg(short, long, default_value = "png")]
        format: String,

        #[arg(long, default_value = "0")]
        zoom_start: i64,

        #[arg(long)]
        zoom_stop: i64,

        /// File holding the tile bytes
        #[arg(long)]
        file: PathBuf,

        /// Number of writer threads
        #[arg(short, long, default_value = "4")]
        threads: usize,
    },
}

#[derive(Subcommand)]
enum MetaCommands {
    /// Print one metadata value
    Get { layer: String, key: String },

    /// Set one metadata value
    Set { layer: String, key: String, value: String },

    /// List every metadata entry of a layer
    List { layer: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Err(e) = run(cli) {
        ui::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let json = cli.json;

    match cli.command {
        Commands::Init { force } => {
            let root = cli
                .root
                .ok_or_else(|| anyhow::anyhow!("init needs --root"))?;
            let path = cli.config.unwrap_or_else(config::default_config_path);
            run_init(&path, &root, force, json)
        }
        Commands::Store(command) => {
            let store = open_store(cli.config.as_deref(), cli.root)?;
            let result = run_store_command(&store, command, json);
            store.destroy();
            result
        }
    }
}

fn run_init(path: &Path, root: &Path, force: bool, json: bool) -> anyhow::Result<()> {
    config::write_config(path, &TileStoreConfig::new(root), force)?;
    config::ensure_root_dir(root)?;
    if json {
        emit_json(serde_json::json!({ "config": path, "root": root }))?;
    } else {
        ui::success(&format!("Wrote {}", path.display()));
        ui::info("Storage root", &root.display().to_string());
    }
    Ok(())
}

fn run_store_command(store: &SqliteBlobStore, command: StoreCommands, json: bool) -> anyhow::Result<()> {
    match command {
        StoreCommands::Put { key, file } => {
            let key = TileKey::parse(&key)?;
            let blob = std::fs::read(&file)?;
            store.put(&key, &blob)?;
            if json {
                emit_json(serde_json::json!({ "key": key.to_key_string(), "size": blob.len() }))?;
            } else {
                ui::success(&format!("Stored {} ({})", key, ui::human_bytes(blob.len() as u64)));
            }
        }

        StoreCommands::Get { key, output } => {
            let key = TileKey::parse(&key)?;
            match store.get(&key)? {
                Some(record) => {
                    if let Some(path) = &output {
                        std::fs::write(path, record.data())?;
                    }
                    if json {
                        emit_json(serde_json::json!({
                            "key": key.to_key_string(),
                            "found": true,
                            "size": record.size(),
                            "output": output,
                        }))?;
                    } else {
                        ui::tile_line(Icons::TILE, &key.to_key_string());
                        ui::summary_row("Size:", &ui::human_bytes(record.size() as u64));
                        if let Some(path) = &output {
                            ui::summary_row("Written to:", &path.display().to_string());
                        }
                    }
                }
                None => {
                    if json {
                        emit_json(serde_json::json!({ "key": key.to_key_string(), "found": false }))?;
                    } else {
                        ui::warn(&format!("No tile stored for {}", key));
                    }
                }
            }
        }

        StoreCommands::Delete { key } => {
            let key = TileKey::parse(&key)?;
            let deleted = store.delete(&key)?;
            report_bool(json, "deleted", deleted, &format!("Deleted {}", key), &format!("No tile stored for {}", key))?;
        }

        StoreCommands::DeleteGridset { layer, gridset } => {
            let removed = store.delete_by_grid_set(&layer, &gridset)?;
            if json {
                emit_json(serde_json::json!({ "layer": layer, "gridset": gridset, "removed": removed }))?;
            } else {
                println!("{} Removed {} tile(s) of {} from {}", Icons::DEL, removed, gridset, layer);
            }
        }

        StoreCommands::DeleteLayer { layer } => {
            let deleted = store.delete_layer(&layer)?;
            report_bool(json, "deleted", deleted, &format!("Deleted layer {}", layer), &format!("No store for layer {}", layer))?;
        }

        StoreCommands::Rename { old, new } => {
            let renamed = store.rename_layer(&old, &new)?;
            report_bool(
                json,
                "renamed",
                renamed,
                &format!("Renamed {} {} {}", old, Icons::RIGHT, new),
                &format!("No store for layer {}", old),
            )?;
        }

        StoreCommands::Meta { command } => run_meta(store, command, json)?,

        StoreCommands::Stats { layer } => {
            let layers = match layer {
                Some(layer) => vec![layer],
                None => store.layers()?,
            };
            let mut all = Vec::new();
            for layer in &layers {
                all.push(store.stats(layer)?);
            }

            if json {
                emit_json(serde_json::to_value(&all)?)?;
            } else if all.is_empty() {
                ui::warn("No layer stores found.");
            } else {
                for stats in all {
                    println!("{} {}", Icons::STATS, stats.layer);
                    let tile_count = stats.tile_count.to_string();
                    let tile_bytes = ui::human_bytes(stats.tile_bytes);
                    let file_bytes = ui::human_bytes(stats.file_bytes);
                    let entries = stats.metadata_entries.to_string();
                    println!(
                        "{}",
                        ui::stats_table(&[
                            ("File", stats.path.as_str()),
                            ("Tiles", &tile_count),
                            ("Tile bytes", &tile_bytes),
                            ("File size", &file_bytes),
                            ("Metadata entries", &entries),
                        ])
                    );
                }
            }
        }

        StoreCommands::Seed { layer, gridset, format, zoom_start, zoom_stop, file, threads } => {
            if zoom_start < 0 || zoom_stop < zoom_start || zoom_stop > MAX_SEED_ZOOM {
                anyhow::bail!("zoom range must satisfy 0 <= start <= stop <= {}", MAX_SEED_ZOOM);
            }
            let blob = std::fs::read(&file)?;
            run_seed(store, &layer, &gridset, &format, zoom_start..=zoom_stop, &blob, threads.max(1), json)?;
        }
    }

    Ok(())
}

fn run_meta(store: &SqliteBlobStore, command: MetaCommands, json: bool) -> anyhow::Result<()> {
    match command {
        MetaCommands::Get { layer, key } => {
            let value = store.get_layer_metadata(&layer, &key)?;
            if json {
                emit_json(serde_json::json!({ "layer": layer, "key": key, "value": value }))?;
            } else {
                match value {
                    Some(value) => println!("{}", value),
                    None => ui::warn(&format!("No metadata '{}' for layer {}", key, layer)),
                }
            }
        }
        MetaCommands::Set { layer, key, value } => {
            store.put_layer_metadata(&layer, &key, &value)?;
            if json {
                emit_json(serde_json::json!({ "layer": layer, "key": key, "value": value }))?;
            } else {
                println!("{} {} {} = {}", Icons::TAG, layer, key, value);
            }
        }
        MetaCommands::List { layer } => {
            let entries = store.layer_metadata(&layer)?;
            if json {
                emit_json(serde_json::to_value(&entries)?)?;
            } else if entries.is_empty() {
                ui::warn(&format!("No metadata for layer {}", layer));
            } else {
                println!("{}", ui::metadata_table(&entries));
            }
        }
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn run_seed(
    store: &SqliteBlobStore,
    layer: &str,
    gridset: &str,
    format: &str,
    zooms: std::ops::RangeInclusive<i64>,
    blob: &[u8],
    threads: usize,
    json: bool,
) -> anyhow::Result<()> {
    let total: u64 = zooms.clone().map(|z| 1u64 << (2 * z)).sum();
    if !json {
        ui::header(&format!("Seeding {} tile(s) into {}", total, layer));
    }

    let started = Instant::now();
    let (progress, progress_tx) = SeedProgress::new(total);
    seed_tiles(store, layer, gridset, format, zooms, blob, threads, progress_tx);

    let totals = progress.finish(started.elapsed());
    if json {
        emit_json(serde_json::json!({
            "layer": layer,
            "stored": totals.stored,
            "failed": totals.failed,
            "bytes": totals.bytes,
        }))?;
    }
    if totals.failed > 0 {
        anyhow::bail!("{} tile(s) failed to seed", totals.failed);
    }
    Ok(())
}

/// Write `blob` to every tile of `zooms` from `threads` workers, reporting one
/// message per tile. Returns early once nobody listens for progress.
#[allow(clippy::too_many_arguments)]
fn seed_tiles(
    store: &SqliteBlobStore,
    layer: &str,
    gridset: &str,
    format: &str,
    zooms: std::ops::RangeInclusive<i64>,
    blob: &[u8],
    threads: usize,
    progress_tx: Sender<SeedMessage>,
) {
    let (work_tx, work_rx) = crossbeam::channel::bounded::<TileCoordinate>(1024);

    std::thread::scope(|s| {
        for _ in 0..threads {
            let work_rx = work_rx.clone();
            let progress_tx = progress_tx.clone();
            s.spawn(move || {
                for coordinate in work_rx {
                    let key = TileKey::new(layer, gridset, format, coordinate);
                    let msg = match store.put(&key, blob) {
                        Ok(()) => SeedMessage::Stored { bytes: blob.len() },
                        Err(e) => SeedMessage::Failed {
                            tile: key.to_key_string(),
                            error: e.to_string(),
                        },
                    };
                    if progress_tx.send(msg).is_err() {
                        break;
                    }
                }
            });
        }
        // Once every worker has quit, sends fail instead of blocking
        drop(work_rx);
        drop(progress_tx);

        for z in zooms {
            let side = 1i64 << z;
            for x in 0..side {
                for y in 0..side {
                    if work_tx.send(TileCoordinate::new(x, y, z)).is_err() {
                        return;
                    }
                }
            }
        }
    });
}

fn open_store(config_path: Option<&Path>, root: Option<PathBuf>) -> anyhow::Result<SqliteBlobStore> {
    let loaded = config::load_config(config_path)?;
    let config = match (root, loaded) {
        (Some(root), Some(mut config)) => {
            config.root = root;
            config
        }
        (Some(root), None) => TileStoreConfig::new(root),
        (None, Some(config)) => config,
        (None, None) => anyhow::bail!(
            "no storage root configured (pass --root or run `tilestore init --root <dir>`)"
        ),
    };
    tracing::debug!("Opening tile store at {}", config.root.display());
    Ok(SqliteBlobStore::open(config)?)
}

fn report_bool(json: bool, field: &str, value: bool, yes: &str, no: &str) -> anyhow::Result<()> {
    if json {
        let mut object = serde_json::Map::new();
        object.insert(field.to_string(), serde_json::Value::Bool(value));
        emit_json(serde_json::Value::Object(object))?;
    } else if value {
        ui::success(yes);
    } else {
        ui::warn(no);
    }
    Ok(())
}

fn emit_json(value: serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
