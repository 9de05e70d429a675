//! Binds raw source rows to declared column ids

use tracing::debug;

use crate::types::{CellValue, Row, Schema};

/// Bind every `data` column declared for `source` onto the rows from that
/// source.
///
/// A row that already carries the declared id keeps its value. Otherwise the
/// first existing key equal to the id ignoring case is copied under the id,
/// and failing that the id is set to null. Rows are never dropped.
pub fn map_columns(rows: &mut [Row], schema: &Schema, source: &str) {
    let declared: Vec<&str> = schema
        .data_columns_for(source)
        .map(|col| col.id.as_str())
        .collect();
    if declared.is_empty() {
        return;
    }

    let mut mapped = 0usize;
    for row in rows.iter_mut().filter(|row| row.is_from(source)) {
        for id in &declared {
            if row.contains_key(id) {
                continue;
            }
            let wanted = id.to_lowercase();
            let value = row
                .iter()
                .find(|(key, _)| key.to_lowercase() == wanted)
                .map(|(_, value)| value.clone())
                .unwrap_or(CellValue::Null);
            row.set(*id, value);
        }
        mapped += 1;
    }

    debug!(source, rows = mapped, columns = declared.len(), "mapped source columns");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnSpec, ColumnType, DataType};

    fn schema() -> Schema {
        Schema::new(vec![
            ColumnSpec::new("Portfolio", "portfolio", ColumnType::Data, DataType::Unique),
            ColumnSpec::new("Principal", "principal", ColumnType::Data, DataType::Currency)
                .with_source("loan"),
            ColumnSpec::new("Rate", "Rate", ColumnType::Data, DataType::Rate).with_source("loan"),
            ColumnSpec::new("Balance", "balance", ColumnType::Data, DataType::Currency)
                .with_source("checking"),
        ])
    }

    #[test]
    fn test_case_insensitive_copy_and_null_fill() {
        let mut rows = vec![Row::from_pairs(
            Some("loan"),
            [("PRINCIPAL", "150"), ("rate", "0.05")],
        )];
        map_columns(&mut rows, &schema(), "loan");

        let row = &rows[0];
        assert_eq!(row.value("principal"), &CellValue::text("150"));
        assert_eq!(row.value("Rate"), &CellValue::text("0.05"));
        assert!(!row.contains_key("balance"));
        // Raw headers stay alongside the declared ids
        assert_eq!(row.value("PRINCIPAL"), &CellValue::text("150"));
    }

    #[test]
    fn test_existing_id_wins_and_other_sources_untouched() {
        let mut rows = vec![
            Row::from_pairs(Some("loan"), [("principal", "1"), ("Principal", "2")]),
            Row::from_pairs(Some("checking"), [("Principal", "9")]),
        ];
        map_columns(&mut rows, &schema(), "loan");

        assert_eq!(rows[0].value("principal"), &CellValue::text("1"));
        assert_eq!(rows[0].get("Rate"), Some(&CellValue::Null));
        assert!(!rows[1].contains_key("principal"));
    }
}
