/// Glyphs prefixed to CLI output lines
pub struct Icons;

impl Icons {
    pub const ROCKET: &str = "🚀";
    pub const CHECK: &str = "✅";
    pub const CROSS: &str = "❌";
    pub const WARN: &str = "⚠️";
    pub const INFO: &str = "ℹ️";
    pub const STATS: &str = "📊";
    pub const TILE: &str = "🧱";
    pub const DEL: &str = "🗑️";
    pub const RIGHT: &str = "➡️";
    pub const TAG: &str = "🏷️";
}
