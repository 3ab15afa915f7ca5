use crate::ui::{theme, Icons};
use owo_colors::OwoColorize;

pub fn header(text: &str) {
    println!("{} {}", Icons::ROCKET, text.style(theme().heading));
}

pub fn success(label: &str) {
    println!("{} {}", Icons::CHECK, label.style(theme().ok));
}

pub fn error(label: &str) {
    eprintln!("{} {}", Icons::CROSS, label.style(theme().failure));
}

pub fn warn(label: &str) {
    eprintln!("{} {}", Icons::WARN, label.style(theme().caution));
}

pub fn info(label: &str, value: &str) {
    println!("{} {}: {}", Icons::INFO, label.style(theme().label), value);
}

/// Print a tile key with its layer highlighted
pub fn tile_line(icon: &str, key: &str) {
    match key.split_once('/') {
        Some((layer, rest)) => println!("{} {}/{}", icon, layer.style(theme().key), rest),
        None => println!("{} {}", icon, key.style(theme().key)),
    }
}

pub fn summary_row(label: &str, value: &str) {
    println!("  {} {}", label.style(theme().label), value);
}

/// Byte count in binary units, one decimal above 1 KiB
pub fn human_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_human_bytes() {
        assert_eq!(human_bytes(0), "0 B");
        assert_eq!(human_bytes(1023), "1023 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
        assert_eq!(human_bytes(3 * 1024 * 1024), "3.0 MiB");
    }
}
