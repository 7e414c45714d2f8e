//! Flattening of JSON responses into tables.
//!
//! Every read endpoint returns a list of records whose fields may themselves be
//! records (`{"id": 1, "folder": {"id": 5, "name": "Sales"}}`). The
//! [`Flattener`] promotes nested fields to top-level columns until no cell
//! holds an object, producing a [`Table`] whose columns keep first-seen order.
//!
//! Column names are derived from the nesting path according to
//! [`ColumnNaming`]. With the default [`ColumnNaming::Leaf`] only the last
//! path segment survives, so two different nested fields may end up in the
//! same column. Such collisions are kept (the later field in document order
//! wins inside a row) and reported through [`Table::collisions`].

use std::collections::HashMap;

use serde_json::{Map, Value};

/// Separator used to render source paths.
const PATH_SEPARATOR: &str = ".";

/// How a nested field path becomes a column name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ColumnNaming {
    /// Keep only the innermost field name (`b.c` -> `c`).
    #[default]
    Leaf,
    /// Join the whole path with `separator` (`b.c` -> `b_c` with `"_"`).
    Path { separator: String },
}

impl ColumnNaming {
    fn column_name(&self, path: &[&str]) -> String {
        match self {
            ColumnNaming::Leaf => path.last().copied().unwrap_or_default().to_string(),
            ColumnNaming::Path { separator } => path.join(separator),
        }
    }
}

/// An output column and the field paths that were flattened into it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    name: String,
    sources: Vec<String>,
}

impl Column {
    /// Output name: the leaf key, or the joined path under [`ColumnNaming::Path`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Dotted source paths, in first-seen order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Whether more than one distinct field path feeds this column.
    pub fn is_collision(&self) -> bool {
        self.sources.len() > 1
    }
}

/// Column-aligned rows. A `None` cell means the record had no such field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
    rows: Vec<Vec<Option<Value>>>,
}

impl Table {
    /// Columns in the order their field was first seen across all records.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Names of [`Table::columns`], same order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// One entry per record, each as long as [`Table::columns`] and indexed the
    /// same way. `None` marks a field the record lacks; a JSON `null` field is
    /// `Some(Value::Null)`.
    pub fn rows(&self) -> &[Vec<Option<Value>>] {
        &self.rows
    }

    /// Number of rows (records), not columns.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Cell at `row` in the column called `column`.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let index = self.columns.iter().position(|c| c.name == column)?;
        self.rows.get(row)?.get(index)?.as_ref()
    }

    /// Columns fed by more than one source path.
    pub fn collisions(&self) -> Vec<&Column> {
        self.columns.iter().filter(|c| c.is_collision()).collect()
    }

    /// Rows as JSON objects, skipping missing cells.
    pub fn to_records(&self) -> Vec<Map<String, Value>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter_map(|(column, cell)| {
                        cell.as_ref().map(|v| (column.name.clone(), v.clone()))
                    })
                    .collect()
            })
            .collect()
    }
}

/// Recursive JSON-to-table flattener.
#[derive(Debug, Clone, Default)]
pub struct Flattener {
    naming: ColumnNaming,
}

impl Flattener {
    pub fn new(naming: ColumnNaming) -> Self {
        Self { naming }
    }

    /// Flattens a list of records (or a single record) into a [`Table`].
    ///
    /// `null` yields an empty table. Non-object list items become a record
    /// with a single `value` field. Arrays inside records are kept as cells.
    pub fn flatten(&self, value: &Value) -> Table {
        let records: Vec<&Value> = match value {
            Value::Null => vec![],
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };

        let mut columns: Vec<Column> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut placed: Vec<Vec<(usize, &Value)>> = Vec::with_capacity(records.len());

        // Schema pass: columns in first-seen order, each leaf mapped to one.
        for record in records {
            let mut leaves = Vec::new();
            match record {
                Value::Object(fields) => collect_leaves(fields, &mut Vec::new(), &mut leaves),
                scalar => leaves.push((vec!["value"], scalar)),
            }

            let mut cells = Vec::with_capacity(leaves.len());
            for (path, value) in leaves {
                let name = self.naming.column_name(&path);
                let source = path.join(PATH_SEPARATOR);
                let position = *index.entry(name.clone()).or_insert_with(|| {
                    columns.push(Column {
                        name,
                        sources: Vec::new(),
                    });
                    columns.len() - 1
                });
                let column = &mut columns[position];
                if !column.sources.contains(&source) {
                    column.sources.push(source);
                }
                cells.push((position, value));
            }
            placed.push(cells);
        }

        for column in columns.iter().filter(|c| c.is_collision()) {
            tracing::warn!(
                "Column '{}' merges fields {:?}; later fields overwrite earlier ones",
                column.name,
                column.sources
            );
        }

        let rows = placed
            .into_iter()
            .map(|cells| {
                let mut row = vec![None; columns.len()];
                for (position, value) in cells {
                    row[position] = Some(value.clone());
                }
                row
            })
            .collect();

        Table { columns, rows }
    }
}

/// Flattens `value` with [`ColumnNaming::Leaf`].
pub fn flatten(value: &Value) -> Table {
    Flattener::default().flatten(value)
}

fn collect_leaves<'a>(
    fields: &'a Map<String, Value>,
    prefix: &mut Vec<&'a str>,
    out: &mut Vec<(Vec<&'a str>, &'a Value)>,
) {
    for (key, value) in fields {
        prefix.push(key.as_str());
        match value {
            Value::Object(children) => collect_leaves(children, prefix, out),
            leaf => out.push((prefix.clone(), leaf)),
        }
        prefix.pop();
    }
}
