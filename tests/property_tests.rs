//! Property-based tests for schema comparison, LIKE escaping, id generation
//! and SQL rendering
//!
//! These tests check invariants that should hold for any input:
//! - Comparing a layout with itself reports nothing
//! - Missing and extra tables mirror each other when the sides swap
//! - Escaped LIKE patterns match only the literal text
//! - Generated ids are well-formed and unique
//! - Stored timestamps sort lexically in time order

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};
    use feedbase::core::db::schema::{Column, DbSchema, Table};
    use feedbase::ids::cuid;
    use feedbase::query::compile::escape_like;
    use feedbase::raw::Sql;
    use feedbase::schema::diff::{compare_schemas, format_comparison};
    use feedbase::value::format_datetime;
    use proptest::prelude::*;
    use rusqlite::Connection;
    use std::collections::HashSet;

    fn arb_column_name() -> impl Strategy<Value = String> {
        "[a-zA-Z][a-zA-Z0-9_]{0,19}".prop_map(|s: String| s)
    }

    fn arb_column_type() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("INTEGER".to_string()),
            Just("TEXT".to_string()),
            Just("REAL".to_string()),
        ]
    }

    fn arb_column() -> impl Strategy<Value = Column> {
        (
            arb_column_name(),
            arb_column_type(),
            any::<bool>(),
            prop_oneof![Just(None), Just(Some("0".to_string())), Just(Some("'OPEN'".to_string()))],
        )
            .prop_map(|(name, type_name, notnull, dflt_value)| Column {
                name,
                type_name,
                notnull,
                pk: false,
                dflt_value,
            })
    }

    fn arb_table() -> impl Strategy<Value = Table> {
        ("[A-Z][a-zA-Z]{0,15}", prop::collection::vec(arb_column(), 1..=8)).prop_map(
            |(name, columns)| {
                // introspection never reports a column twice
                let mut seen = HashSet::new();
                let columns = columns
                    .into_iter()
                    .filter(|c| seen.insert(c.name.clone()))
                    .collect();
                Table {
                    name,
                    columns,
                    indexes: Vec::new(),
                    foreign_keys: Vec::new(),
                }
            },
        )
    }

    fn arb_schema() -> impl Strategy<Value = DbSchema> {
        prop::collection::vec(arb_table(), 0..=5).prop_map(|tables| DbSchema {
            tables: tables.into_iter().map(|t| (t.name.clone(), t)).collect(),
        })
    }

    fn like_matches(conn: &Connection, text: &str, pattern: &str) -> bool {
        conn.query_row(
            r"SELECT ?1 LIKE ?2 ESCAPE '\'",
            [text, pattern],
            |row| row.get::<_, bool>(0),
        )
        .unwrap()
    }

    proptest! {
        /// Comparing a layout with itself never reports drift
        #[test]
        fn prop_identical_schemas_have_no_diffs(schema in arb_schema()) {
            let result = compare_schemas(&schema, &schema);
            prop_assert!(result.is_in_sync());
            prop_assert!(result.missing_tables.is_empty());
            prop_assert!(result.extra_tables.is_empty());
            prop_assert!(result.changed_tables.is_empty());
        }

        /// Tables missing from one side are extra from the other
        #[test]
        fn prop_missing_and_extra_mirror(a in arb_schema(), b in arb_schema()) {
            let ab = compare_schemas(&a, &b);
            let ba = compare_schemas(&b, &a);
            prop_assert_eq!(&ab.missing_tables, &ba.extra_tables);
            prop_assert_eq!(&ab.extra_tables, &ba.missing_tables);
            prop_assert_eq!(ab.changed_tables.len(), ba.changed_tables.len());
        }

        /// Every changed table contributes at least one detailed diff
        #[test]
        fn prop_changed_tables_have_detailed_diffs(a in arb_schema(), b in arb_schema()) {
            let result = compare_schemas(&a, &b);
            for table in &result.changed_tables {
                prop_assert!(result.detailed_diffs.iter().any(|d| &d.table_name == table));
            }
            let report = format_comparison(&result);
            prop_assert_eq!(result.is_in_sync(), report.contains("in sync"));
        }

        /// An escaped pattern matches its own text and nothing longer
        #[test]
        fn prop_escaped_like_matches_only_literal(text in "[a-z%_\\\\ ]{0,12}") {
            let conn = Connection::open_in_memory().unwrap();
            let pattern = escape_like(&text);
            prop_assert!(like_matches(&conn, &text, &pattern));
            let longer = format!("{}x", text);
            prop_assert!(!like_matches(&conn, &longer, &pattern));
        }

        /// Placeholders are numbered in bind order
        #[test]
        fn prop_sql_placeholders_follow_binds(values in prop::collection::vec(any::<i64>(), 0..20)) {
            let parts = values.iter().map(|v| Sql::empty().bind(*v));
            let stmt = Sql::new("SELECT ").append(Sql::join(parts, ", ")).render();
            prop_assert_eq!(stmt.params.len(), values.len());
            for i in 1..=values.len() {
                let placeholder = format!("?{}", i);
                prop_assert!(stmt.sql.contains(&placeholder));
            }
            let next = format!("?{}", values.len() + 1);
            prop_assert!(!stmt.sql.contains(&next));
        }

        /// Stored timestamps order lexically the same way they order in time
        #[test]
        fn prop_datetime_text_sorts_chronologically(
            a in 0i64..4_102_444_800_000,
            b in 0i64..4_102_444_800_000,
        ) {
            let (Some(da), Some(db)) = (
                DateTime::<Utc>::from_timestamp_millis(a),
                DateTime::<Utc>::from_timestamp_millis(b),
            ) else {
                return Ok(());
            };
            let (ta, tb) = (format_datetime(&da), format_datetime(&db));
            prop_assert_eq!(ta.len(), 24);
            prop_assert_eq!(a.cmp(&b), ta.cmp(&tb));
        }
    }

    #[test]
    fn test_cuids_are_well_formed_and_unique() {
        let ids: Vec<String> = (0..2_000).map(|_| cuid()).collect();
        for id in &ids {
            assert_eq!(id.len(), 25);
            assert!(id.starts_with('c'));
            assert!(id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()));
        }
        let unique: HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
    }

    #[test]
    fn test_minimal_schema_comparison() {
        let table = Table {
            name: "Feedback".to_string(),
            columns: vec![Column {
                name: "id".to_string(),
                type_name: "TEXT".to_string(),
                notnull: true,
                pk: true,
                dflt_value: None,
            }],
            indexes: Vec::new(),
            foreign_keys: Vec::new(),
        };
        let mut expected = DbSchema::default();
        expected.tables.insert(table.name.clone(), table);
        let result = compare_schemas(&expected, &DbSchema::default());
        assert_eq!(result.missing_tables, vec!["Feedback"]);
        assert!(!result.is_in_sync());
    }
}
