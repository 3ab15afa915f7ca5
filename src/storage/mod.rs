//! Storage Layer - one SQLite database per layer
//!
//! Each layer store file holds two tables:
//! - tiles(grid_set_id, x, y, z, type, data)
//! - meta(key, value)

pub mod layout;
pub mod schema;
pub mod registry;
pub mod tiles;
pub mod metadata;
pub mod lifecycle;

pub use layout::{sanitize_layer_name, StorageLayout};
pub use registry::ConnectionRegistry;
pub use tiles::TileRepository;
pub use metadata::LayerMetadataStore;
pub use lifecycle::LayerLifecycle;
