/// Schema Introspection Module
///
/// Reads the live table layout out of SQLite (`pragma_table_info`,
/// `pragma_index_list`, `pragma_foreign_key_list`). Drift detection compares
/// this against the layout the registry would create.

use crate::core::Result;
use rusqlite::{Connection, Row};
use std::collections::BTreeMap;

/// Represents a foreign key relationship
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ForeignKey {
    /// The table this foreign key references
    pub referenced_table: String,
    /// The column in this table that is the foreign key
    pub from_column: String,
    /// The referenced column in the foreign table
    pub to_column: String,
    pub on_delete: String,
}

/// Represents a database column with its metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    /// Declared type (e.g. "INTEGER", "TEXT", "REAL")
    pub type_name: String,
    /// Whether the column rejects NULL values
    pub notnull: bool,
    /// Whether this column is part of the primary key
    pub pk: bool,
    /// Default value expression (if any)
    pub dflt_value: Option<String>,
}

impl Column {
    fn from_pragma_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Column {
            name: row.get(0)?,
            type_name: row.get(1)?,
            notnull: row.get(2)?,
            dflt_value: row.get(3)?,
            pk: row.get::<_, i64>(4)? > 0,
        })
    }
}

/// Represents a database index
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub name: String,
    /// Whether this is a UNIQUE index
    pub unique: bool,
    /// Column names that make up this index, in index order
    pub columns: Vec<String>,
}

/// Represents a database table with its structure and metadata
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
    /// Explicit indexes; SQLite's automatic indexes are left out
    pub indexes: Vec<Index>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    fn from_database(conn: &Connection, table_name: &str) -> Result<Self> {
        Ok(Table {
            name: table_name.to_string(),
            columns: get_table_columns(conn, table_name)?,
            indexes: get_table_indexes(conn, table_name)?,
            foreign_keys: get_table_foreign_keys(conn, table_name)?,
        })
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Table layout of a live database, keyed and ordered by table name.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DbSchema {
    pub tables: BTreeMap<String, Table>,
}

impl DbSchema {
    /// Introspects all user tables in the database
    pub fn from_connection(conn: &Connection) -> Result<Self> {
        let mut tables = BTreeMap::new();

        let mut stmt = conn.prepare(
            "SELECT name FROM sqlite_master
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for name in names {
            let table = Table::from_database(conn, &name)?;
            tables.insert(name, table);
        }
        Ok(DbSchema { tables })
    }
}

fn get_table_columns(conn: &Connection, table_name: &str) -> Result<Vec<Column>> {
    let mut stmt = conn.prepare(
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?1) ORDER BY cid",
    )?;
    let columns = stmt
        .query_map([table_name], |row| Column::from_pragma_row(row))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(columns)
}

fn get_table_indexes(conn: &Connection, table_name: &str) -> Result<Vec<Index>> {
    let mut stmt = conn.prepare(
        "SELECT name, \"unique\" FROM pragma_index_list(?1)
         WHERE name NOT LIKE 'sqlite_autoindex_%' ORDER BY name",
    )?;
    let entries = stmt
        .query_map([table_name], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, bool>(1)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut info = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(entries.len());
    for (name, unique) in entries {
        let columns = info
            .query_map([&name], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        indexes.push(Index {
            name,
            unique,
            columns,
        });
    }
    Ok(indexes)
}

fn get_table_foreign_keys(conn: &Connection, table_name: &str) -> Result<Vec<ForeignKey>> {
    let mut stmt = conn.prepare(
        "SELECT \"table\", \"from\", \"to\", on_delete FROM pragma_foreign_key_list(?1)
         ORDER BY id, seq",
    )?;
    let mut foreign_keys = stmt
        .query_map([table_name], |row| {
            Ok(ForeignKey {
                referenced_table: row.get(0)?,
                from_column: row.get(1)?,
                to_column: row.get(2)?,
                on_delete: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    foreign_keys.sort();
    Ok(foreign_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn setup_test_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE users (
                id TEXT NOT NULL PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                age INTEGER DEFAULT 0
            );
            CREATE UNIQUE INDEX users_email_key ON users(email);
            CREATE TABLE posts (
                id TEXT NOT NULL PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
        ",
        )
    }

    #[test]
    fn test_schema_introspection() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();

        let schema = DbSchema::from_connection(&conn).unwrap();
        assert_eq!(schema.tables.keys().collect::<Vec<_>>(), vec!["posts", "users"]);

        let users = &schema.tables["users"];
        assert_eq!(users.columns.len(), 4);
        assert!(users.columns[0].pk);
        assert!(users.column("name").unwrap().notnull);
        assert!(!users.column("email").unwrap().notnull);
        assert_eq!(users.column("age").unwrap().dflt_value.as_deref(), Some("0"));

        // the TEXT primary key's automatic index is not reported
        assert_eq!(users.indexes.len(), 1);
        assert_eq!(users.indexes[0].name, "users_email_key");
        assert!(users.indexes[0].unique);
        assert_eq!(users.indexes[0].columns, vec!["email"]);
    }

    #[test]
    fn test_foreign_key_metadata() {
        let conn = Connection::open_in_memory().unwrap();
        setup_test_schema(&conn).unwrap();

        let schema = DbSchema::from_connection(&conn).unwrap();
        let posts = &schema.tables["posts"];
        assert_eq!(
            posts.foreign_keys,
            vec![ForeignKey {
                referenced_table: "users".to_string(),
                from_column: "user_id".to_string(),
                to_column: "id".to_string(),
                on_delete: "CASCADE".to_string(),
            }]
        );
    }
}
