use std::fs;

use camino::Utf8Path;

use crate::error::TabmetaError;

/// An in-memory delimited dataset: one header row plus data rows, all cells
/// kept as raw strings until the driver coerces them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Loads a delimited text file. `first_row` is the 1-based line number of
    /// the header; everything above it is skipped.
    pub fn load(path: &Utf8Path, first_row: usize, delimiter: char) -> Result<Self, TabmetaError> {
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|_| TabmetaError::TableRead(path.as_std_path().to_path_buf()))?;
        Self::parse(&content, first_row, delimiter)
    }

    pub fn parse(content: &str, first_row: usize, delimiter: char) -> Result<Self, TabmetaError> {
        let mut lines = content.lines().skip(first_row.saturating_sub(1));
        let header_line = lines.next().ok_or_else(|| {
            TabmetaError::TableParse(format!("header row {first_row} is past the end of the file"))
        })?;
        let header = split_fields(header_line, delimiter);
        if header.iter().all(|name| name.trim().is_empty()) {
            return Err(TabmetaError::TableParse(format!(
                "header row {first_row} is blank"
            )));
        }

        let mut rows = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                continue;
            }
            let mut fields = split_fields(line, delimiter);
            // Ragged rows are padded or truncated to the header width.
            fields.resize(header.len(), String::new());
            rows.push(fields);
        }

        Ok(Self { header, rows })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.header.iter().position(|column| column == name)
    }

    /// Appends a column filled with `default`, returning its index.
    pub fn push_column(&mut self, name: &str, default: &str) -> usize {
        self.header.push(name.to_string());
        for row in &mut self.rows {
            row.push(default.to_string());
        }
        self.header.len() - 1
    }

    pub fn set(&mut self, row: usize, column: usize, value: &str) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|row| row.get_mut(column)) {
            *cell = value.to_string();
        }
    }

    pub fn write(&self, path: &Utf8Path, delimiter: char) -> Result<(), TabmetaError> {
        fs::write(path.as_std_path(), self.to_delimited(delimiter))
            .map_err(|err| TabmetaError::Filesystem(err.to_string()))
    }

    pub fn to_delimited(&self, delimiter: char) -> String {
        let mut out = String::new();
        out.push_str(&join_fields(&self.header, delimiter));
        out.push('\n');
        for row in &self.rows {
            out.push_str(&join_fields(row, delimiter));
            out.push('\n');
        }
        out
    }
}

/// Splits one line on `delimiter`, honoring double-quoted fields with `""`
/// escapes.
fn split_fields(line: &str, delimiter: char) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        if in_quotes {
            if ch == '"' {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    current.push('"');
                } else {
                    in_quotes = false;
                }
            } else {
                current.push(ch);
            }
        } else if ch == '"' && current.is_empty() {
            in_quotes = true;
        } else if ch == delimiter {
            fields.push(std::mem::take(&mut current));
        } else {
            current.push(ch);
        }
    }
    fields.push(current);
    fields
}

fn join_fields(fields: &[String], delimiter: char) -> String {
    fields
        .iter()
        .map(|field| quote_field(field, delimiter))
        .collect::<Vec<_>>()
        .join(&delimiter.to_string())
}

fn quote_field(field: &str, delimiter: char) -> String {
    if field.contains(delimiter) || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
