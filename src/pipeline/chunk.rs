//! Record chunks and the per-row output buffer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value as Cell;

use crate::error::{GeoError, Result};
use crate::models::Value;
use crate::pipeline::ColumnLayout;

// == Chunk ==
/// One slice of the record stream.
///
/// `row_index` is a row's position in `rows`. Cells are JSON values; null
/// means absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Cell>>,
}

impl Chunk {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Returns the cell at `row_index` in the named column.
    pub fn cell(&self, row_index: usize, column: &str) -> Option<&Cell> {
        let col = self.column_index(column)?;
        self.rows.get(row_index)?.get(col)
    }

    /// Rejects duplicate column names and rows of the wrong width.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for name in &self.columns {
            if !seen.insert(name.as_str()) {
                return Err(GeoError::InvalidRequest(format!(
                    "duplicate column '{}'",
                    name
                )));
            }
        }

        let width = self.columns.len();
        if let Some((index, row)) = self.rows.iter().enumerate().find(|(_, r)| r.len() != width) {
            return Err(GeoError::InvalidRequest(format!(
                "row {} has {} cells, expected {}",
                index,
                row.len(),
                width
            )));
        }
        Ok(())
    }

    // == Ensure Columns ==
    /// Inserts the missing `names` right after column `after`, in order,
    /// filled with nulls. Existing columns keep their order and values.
    pub fn ensure_columns(&mut self, after: usize, names: &[String]) {
        let missing: Vec<&String> = names
            .iter()
            .filter(|name| self.column_index(name).is_none())
            .collect();
        if missing.is_empty() {
            return;
        }

        let at = (after + 1).min(self.columns.len());
        for (offset, name) in missing.into_iter().enumerate() {
            self.columns.insert(at + offset, name.clone());
            for row in &mut self.rows {
                row.insert(at + offset, Cell::Null);
            }
        }
    }
}

// == Cell Helpers ==
/// Null, blank text and non-finite numbers count as empty.
pub fn is_empty_cell(cell: &Cell) -> bool {
    match cell {
        Cell::Null => true,
        Cell::String(s) => s.trim().is_empty(),
        Cell::Number(n) => n.as_f64().map_or(true, |f| !f.is_finite()),
        _ => false,
    }
}

/// Numeric view of a cell; numeric text is accepted.
pub fn cell_as_f64(cell: &Cell) -> Option<f64> {
    match cell {
        Cell::Number(n) => n.as_f64(),
        Cell::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Text view of a non-empty cell.
pub fn cell_as_text(cell: &Cell) -> Option<String> {
    if is_empty_cell(cell) {
        return None;
    }
    match cell {
        Cell::String(s) => Some(s.clone()),
        Cell::Number(n) => Some(n.to_string()),
        Cell::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

// == Output Buffer ==
/// Resolved values indexed by `row_index`, merged into the chunk once.
#[derive(Debug, Clone, Default)]
pub struct OutputBuffer {
    values: Vec<Option<Value>>,
}

impl OutputBuffer {
    pub fn new(rows: usize) -> Self {
        Self {
            values: vec![None; rows],
        }
    }

    pub fn set(&mut self, row_index: usize, value: Value) {
        if let Some(slot) = self.values.get_mut(row_index) {
            *slot = Some(value);
        }
    }

    pub fn get(&self, row_index: usize) -> Option<&Value> {
        self.values.get(row_index).and_then(Option::as_ref)
    }

    pub fn resolved_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Writes every resolved value into its row; unresolved rows are left
    /// untouched.
    pub fn merge_into(self, chunk: &mut Chunk, layout: &ColumnLayout) {
        for (row, value) in chunk.rows.iter_mut().zip(self.values) {
            if let Some(value) = value {
                layout.write(row, &value);
            }
        }
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk() -> Chunk {
        Chunk::new(
            vec!["id".into(), "address".into(), "note".into()],
            vec![
                vec![json!(1), json!("a"), json!("x")],
                vec![json!(2), json!("b"), json!("y")],
            ],
        )
    }

    #[test]
    fn test_ensure_columns_inserts_after_anchor() {
        let mut chunk = chunk();

        chunk.ensure_columns(1, &["lat".to_string(), "lng".to_string()]);

        assert_eq!(chunk.columns, vec!["id", "address", "lat", "lng", "note"]);
        assert_eq!(chunk.rows[0], vec![json!(1), json!("a"), Cell::Null, Cell::Null, json!("x")]);
    }

    #[test]
    fn test_ensure_columns_keeps_existing() {
        let mut chunk = chunk();
        chunk.columns[2] = "lng".to_string();

        chunk.ensure_columns(1, &["lat".to_string(), "lng".to_string()]);

        assert_eq!(chunk.columns, vec!["id", "address", "lat", "lng"]);
        assert_eq!(chunk.cell(1, "lng"), Some(&json!("y")));
    }

    #[test]
    fn test_ensure_columns_at_end() {
        let mut chunk = chunk();
        chunk.ensure_columns(2, &["city".to_string()]);
        assert_eq!(chunk.columns.last().unwrap(), "city");
    }

    #[test]
    fn test_validate_row_width() {
        let mut chunk = chunk();
        assert!(chunk.validate().is_ok());

        chunk.rows[1].pop();
        assert!(matches!(chunk.validate(), Err(GeoError::InvalidRequest(_))));
    }

    #[test]
    fn test_validate_duplicate_columns() {
        let mut chunk = chunk();
        chunk.columns[2] = "id".to_string();
        assert!(matches!(chunk.validate(), Err(GeoError::InvalidRequest(_))));
    }

    #[test]
    fn test_cell_helpers() {
        assert!(is_empty_cell(&Cell::Null));
        assert!(is_empty_cell(&json!("  ")));
        assert!(!is_empty_cell(&json!(0)));

        assert_eq!(cell_as_f64(&json!(" 48.5 ")), Some(48.5));
        assert_eq!(cell_as_f64(&json!(true)), None);

        assert_eq!(cell_as_text(&json!(75012)), Some("75012".to_string()));
        assert_eq!(cell_as_text(&json!("")), None);
    }

    #[test]
    fn test_output_buffer_ignores_out_of_range() {
        let mut out = OutputBuffer::new(1);
        out.set(5, Value::Features(Default::default()));
        assert_eq!(out.resolved_count(), 0);
    }
}
