use std::collections::HashMap;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct MetadataRow {
    #[tabled(rename = "Key")]
    key: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Default)]
pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

pub fn stats_table(stats: &[(&str, &str)]) -> String {
    let mut builder = TableBuilder::new();
    for (label, value) in stats {
        builder.add_row(label, value);
    }
    builder.build()
}

/// Metadata entries sorted by key
pub fn metadata_table(entries: &HashMap<String, String>) -> String {
    let mut rows: Vec<MetadataRow> = entries
        .iter()
        .map(|(key, value)| MetadataRow {
            key: key.clone(),
            value: value.clone(),
        })
        .collect();
    rows.sort_by(|a, b| a.key.cmp(&b.key));
    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_table_contains_rows() {
        let table = stats_table(&[("Tiles", "3"), ("Layer", "roads")]);
        assert!(table.contains("Metric"));
        assert!(table.contains("roads"));
        assert!(stats_table(&[]).is_empty());
    }

    #[test]
    fn test_metadata_table_sorted() {
        let mut entries = HashMap::new();
        entries.insert("zoom".to_string(), "18".to_string());
        entries.insert("bbox".to_string(), "-10,-10,10,10".to_string());
        let table = metadata_table(&entries);
        let bbox = table.find("bbox").unwrap();
        let zoom = table.find("zoom").unwrap();
        assert!(bbox < zoom);
    }
}
