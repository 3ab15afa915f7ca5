pub mod icons;
pub mod output;
pub mod progress;
pub mod table;
pub mod theme;

pub use icons::Icons;
pub use output::{error, header, human_bytes, info, success, summary_row, tile_line, warn};
pub use progress::{SeedMessage, SeedProgress, SeedTotals};
pub use table::{metadata_table, stats_table, TableBuilder};
pub use theme::{theme, Theme};
