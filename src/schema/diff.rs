//! Drift detection between the registry and a live database.
//!
//! The expected layout is obtained by pushing the registry into a scratch
//! in-memory database and introspecting it, so both sides of the comparison
//! come out of SQLite in the same normalised form.
use super::ddl;
use crate::core::db::schema::{Column, DbSchema, ForeignKey, Index, Table};
use crate::core::Result;
use rusqlite::Connection;
use std::collections::HashMap;

/// Represents the type of schema difference
#[derive(Debug, Clone, PartialEq)]
pub enum DiffType {
    TableMissing,
    TableExtra,
    ColumnMissing,
    ColumnExtra,
    ColumnChanged,
    IndexMissing,
    IndexExtra,
    ForeignKeyMissing,
    ForeignKeyExtra,
}

/// Represents a single diff item
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaDiff {
    pub diff_type: DiffType,
    pub table_name: String,
    pub field_name: Option<String>,
    pub description: String,
}

/// Result of comparing the expected layout with the live one
#[derive(Debug, Default)]
pub struct SchemaComparison {
    pub missing_tables: Vec<String>,
    pub extra_tables: Vec<String>,
    pub changed_tables: Vec<String>,
    pub detailed_diffs: Vec<SchemaDiff>,
}

impl SchemaComparison {
    pub fn is_in_sync(&self) -> bool {
        self.detailed_diffs.is_empty()
    }
}

/// The table layout `push` would create.
pub fn expected_schema() -> Result<DbSchema> {
    let scratch = Connection::open_in_memory()?;
    ddl::push(&scratch)?;
    DbSchema::from_connection(&scratch)
}

/// Compares the live database against the registry.
pub fn verify(conn: &Connection) -> Result<SchemaComparison> {
    let expected = expected_schema()?;
    let actual = DbSchema::from_connection(conn)?;
    Ok(compare_schemas(&expected, &actual))
}

/// Compares two introspected layouts. `expected` is what the registry wants.
pub fn compare_schemas(expected: &DbSchema, actual: &DbSchema) -> SchemaComparison {
    let mut comparison = SchemaComparison::default();

    for name in expected.tables.keys() {
        if !actual.tables.contains_key(name) {
            comparison.missing_tables.push(name.clone());
            comparison.detailed_diffs.push(SchemaDiff {
                diff_type: DiffType::TableMissing,
                table_name: name.clone(),
                field_name: None,
                description: format!("Table '{}' is missing", name),
            });
        }
    }

    for name in actual.tables.keys() {
        if !expected.tables.contains_key(name) {
            comparison.extra_tables.push(name.clone());
            comparison.detailed_diffs.push(SchemaDiff {
                diff_type: DiffType::TableExtra,
                table_name: name.clone(),
                field_name: None,
                description: format!("Table '{}' is not part of the schema", name),
            });
        }
    }

    for (name, want) in &expected.tables {
        if let Some(have) = actual.tables.get(name) {
            let diffs = compare_tables(want, have);
            if !diffs.is_empty() {
                comparison.changed_tables.push(name.clone());
                comparison.detailed_diffs.extend(diffs);
            }
        }
    }

    comparison
}

fn compare_tables(want: &Table, have: &Table) -> Vec<SchemaDiff> {
    let mut diffs = compare_columns(&want.name, &want.columns, &have.columns);
    diffs.extend(compare_indexes(&want.name, &want.indexes, &have.indexes));
    diffs.extend(compare_foreign_keys(&want.name, &want.foreign_keys, &have.foreign_keys));
    diffs
}

fn compare_columns(table_name: &str, want: &[Column], have: &[Column]) -> Vec<SchemaDiff> {
    let mut diffs = Vec::new();
    let have_map: HashMap<&str, &Column> = have.iter().map(|c| (c.name.as_str(), c)).collect();
    let want_map: HashMap<&str, &Column> = want.iter().map(|c| (c.name.as_str(), c)).collect();

    for col in want {
        match have_map.get(col.name.as_str()) {
            None => diffs.push(SchemaDiff {
                diff_type: DiffType::ColumnMissing,
                table_name: table_name.to_string(),
                field_name: Some(col.name.clone()),
                description: format!("Column '{}.{}' ({}) is missing", table_name, col.name, col.type_name),
            }),
            Some(found) => {
                if let Some(change) = compare_column(col, found) {
                    diffs.push(SchemaDiff {
                        diff_type: DiffType::ColumnChanged,
                        table_name: table_name.to_string(),
                        field_name: Some(col.name.clone()),
                        description: format!("Column '{}.{}': {}", table_name, col.name, change),
                    });
                }
            }
        }
    }

    for col in have {
        if !want_map.contains_key(col.name.as_str()) {
            diffs.push(SchemaDiff {
                diff_type: DiffType::ColumnExtra,
                table_name: table_name.to_string(),
                field_name: Some(col.name.clone()),
                description: format!("Column '{}.{}' is not part of the schema", table_name, col.name),
            });
        }
    }

    diffs
}

/// Describes how `have` differs from `want`, if at all.
fn compare_column(want: &Column, have: &Column) -> Option<String> {
    let mut differences = Vec::new();

    if !want.type_name.eq_ignore_ascii_case(&have.type_name) {
        differences.push(format!("type {} -> {}", want.type_name, have.type_name));
    }
    if want.notnull != have.notnull {
        let label = |notnull: bool| if notnull { "required" } else { "optional" };
        differences.push(format!("{} -> {}", label(want.notnull), label(have.notnull)));
    }
    if want.pk != have.pk {
        differences.push(format!("primary key {} -> {}", want.pk, have.pk));
    }

    if differences.is_empty() {
        None
    } else {
        Some(differences.join(", "))
    }
}

/// Unique indexes are matched by their columns so a renamed index with the
/// same shape still counts.
fn compare_indexes(table_name: &str, want: &[Index], have: &[Index]) -> Vec<SchemaDiff> {
    let mut diffs = Vec::new();
    let covers = |list: &[Index], idx: &Index| {
        list.iter().any(|i| i.unique == idx.unique && i.columns == idx.columns)
    };

    for idx in want.iter().filter(|i| i.unique) {
        if !covers(have, idx) {
            diffs.push(SchemaDiff {
                diff_type: DiffType::IndexMissing,
                table_name: table_name.to_string(),
                field_name: Some(idx.name.clone()),
                description: format!(
                    "Unique index '{}' on ({}) is missing",
                    idx.name,
                    idx.columns.join(", ")
                ),
            });
        }
    }

    for idx in have.iter().filter(|i| i.unique) {
        if !covers(want, idx) {
            diffs.push(SchemaDiff {
                diff_type: DiffType::IndexExtra,
                table_name: table_name.to_string(),
                field_name: Some(idx.name.clone()),
                description: format!("Unique index '{}' is not part of the schema", idx.name),
            });
        }
    }

    diffs
}

fn compare_foreign_keys(table_name: &str, want: &[ForeignKey], have: &[ForeignKey]) -> Vec<SchemaDiff> {
    let mut diffs = Vec::new();

    for fk in want {
        if !have.contains(fk) {
            diffs.push(SchemaDiff {
                diff_type: DiffType::ForeignKeyMissing,
                table_name: table_name.to_string(),
                field_name: Some(fk.from_column.clone()),
                description: format!(
                    "Foreign key {}.{} -> {}.{} (ON DELETE {}) is missing",
                    table_name, fk.from_column, fk.referenced_table, fk.to_column, fk.on_delete
                ),
            });
        }
    }
    for fk in have {
        if !want.contains(fk) {
            diffs.push(SchemaDiff {
                diff_type: DiffType::ForeignKeyExtra,
                table_name: table_name.to_string(),
                field_name: Some(fk.from_column.clone()),
                description: format!(
                    "Foreign key {}.{} -> {}.{} is not part of the schema",
                    table_name, fk.from_column, fk.referenced_table, fk.to_column
                ),
            });
        }
    }

    diffs
}

/// Generates a human-readable summary from a SchemaComparison
pub fn format_comparison(comparison: &SchemaComparison) -> String {
    let mut output = String::from("Schema drift report\n");
    output.push_str(&"=".repeat(40));
    output.push('\n');

    if comparison.is_in_sync() {
        output.push_str("Database is in sync with the schema.\n");
        return output;
    }

    if !comparison.missing_tables.is_empty() {
        output.push_str(&format!("\nTables missing ({}):\n", comparison.missing_tables.len()));
        for table in &comparison.missing_tables {
            output.push_str(&format!("  - {}\n", table));
        }
    }

    if !comparison.extra_tables.is_empty() {
        output.push_str(&format!("\nExtra tables ({}):\n", comparison.extra_tables.len()));
        for table in &comparison.extra_tables {
            output.push_str(&format!("  + {}\n", table));
        }
    }

    if !comparison.changed_tables.is_empty() {
        output.push_str(&format!("\nTables changed ({}):\n", comparison.changed_tables.len()));
        for table in &comparison.changed_tables {
            output.push_str(&format!("  ~ {}\n", table));
        }
    }

    output.push_str(&format!("\nDetailed changes ({}):\n", comparison.detailed_diffs.len()));
    for diff in &comparison.detailed_diffs {
        output.push_str(&format!("  {} {}\n", diff_symbol(&diff.diff_type), diff.description));
    }

    output
}

fn diff_symbol(diff_type: &DiffType) -> &'static str {
    match diff_type {
        DiffType::TableMissing => "-",
        DiffType::TableExtra => "+",
        DiffType::ColumnMissing => "--",
        DiffType::ColumnExtra => "++",
        DiffType::ColumnChanged => "~~",
        DiffType::IndexMissing => "-i",
        DiffType::IndexExtra => "+i",
        DiffType::ForeignKeyMissing => "-f",
        DiffType::ForeignKeyExtra => "+f",
    }
}
