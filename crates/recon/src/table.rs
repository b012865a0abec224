/// A record set with named columns and string cells, as handed over by ingestion.
///
/// Rows may be shorter than the header; missing cells read as empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            rows: Vec::new(),
        }
    }

    /// Build a table from string slices. Mostly useful in tests and fixtures.
    pub fn from_rows(name: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: rows
                .iter()
                .map(|r| r.iter().map(|c| c.to_string()).collect())
                .collect(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(col))
            .map(|s| s.as_str())
            .unwrap_or("")
    }

    /// Cell lookup with an optional column; absent columns read as empty.
    pub fn cell_opt(&self, row: usize, col: Option<usize>) -> &str {
        col.map(|c| self.cell(row, c)).unwrap_or("")
    }

    /// All cells of a row padded to the header width.
    pub fn row_fields(&self, row: usize) -> Vec<String> {
        (0..self.columns.len())
            .map(|c| self.cell(row, c).to_string())
            .collect()
    }

    /// New table with the same header holding only rows where `keep` is true.
    pub fn filter_rows(&self, name: &str, keep: impl Fn(&[String]) -> bool) -> Table {
        Table {
            name: name.to_string(),
            columns: self.columns.clone(),
            rows: self.rows.iter().filter(|r| keep(r)).cloned().collect(),
        }
    }
}
