//! DDL generation for the registry and `push`.
use super::{schema, DefaultValue, ModelDef, RelationKind, ScalarType};
use crate::core::Result;
use crate::query::compile::quote_ident;
use rusqlite::Connection;
use tracing::info;

/// Default expression for timestamps, matching the stored text format.
const NOW_DEFAULT: &str = "(strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))";

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Renders `CREATE TABLE IF NOT EXISTS` for a model.
pub fn create_table_sql(model: &ModelDef) -> Result<String> {
    let mut lines = Vec::with_capacity(model.fields.len() + model.relations.len());

    for field in &model.fields {
        let mut line = format!("    {} {}", quote_ident(field.name), field.ty.sql_type());
        if !field.nullable {
            line.push_str(" NOT NULL");
        }
        if field.is_id {
            line.push_str(" PRIMARY KEY");
        }
        match field.default {
            Some(DefaultValue::Now) => line.push_str(&format!(" DEFAULT {}", NOW_DEFAULT)),
            Some(DefaultValue::Bool(b)) => line.push_str(&format!(" DEFAULT {}", i64::from(b))),
            Some(DefaultValue::Int(i)) => line.push_str(&format!(" DEFAULT {}", i)),
            Some(DefaultValue::Enum(v)) => line.push_str(&format!(" DEFAULT {}", quote_literal(v))),
            Some(DefaultValue::Id) | None => {}
        }
        if let ScalarType::Enum(name) = field.ty {
            if let Some(def) = schema().enum_def(name) {
                let values: Vec<String> = def.values.iter().map(|v| quote_literal(v)).collect();
                line.push_str(&format!(
                    " CHECK ({} IN ({}))",
                    quote_ident(field.name),
                    values.join(", ")
                ));
            }
        }
        lines.push(line);
    }

    for relation in &model.relations {
        if let RelationKind::ToOne { fields, references } = relation.kind {
            let local: Vec<String> = fields.iter().map(|f| quote_ident(f)).collect();
            let remote: Vec<String> = references.iter().map(|f| quote_ident(f)).collect();
            lines.push(format!(
                "    CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE CASCADE ON UPDATE CASCADE",
                quote_ident(&format!("{}_{}_fkey", model.name, fields.join("_"))),
                local.join(", "),
                quote_ident(relation.target),
                remote.join(", ")
            ));
        }
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        quote_ident(model.name),
        lines.join(",\n")
    ))
}

/// Index name for a unique key, e.g. `User_email_key`.
pub fn unique_index_name(model: &ModelDef, fields: &[&str]) -> String {
    format!("{}_{}_key", model.name, fields.join("_"))
}

/// Unique indexes for every non-id unique key of a model.
pub fn index_sql(model: &ModelDef) -> Vec<String> {
    model
        .unique_keys()
        .into_iter()
        .filter(|key| !(key.fields.len() == 1 && model.id_field().name == key.fields[0]))
        .map(|key| {
            let cols: Vec<String> = key.fields.iter().map(|f| quote_ident(f)).collect();
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON {}({});",
                quote_ident(&unique_index_name(model, &key.fields)),
                quote_ident(model.name),
                cols.join(", ")
            )
        })
        .collect()
}

/// The complete DDL script for the registry.
pub fn schema_sql() -> Result<String> {
    let mut statements = Vec::new();
    for model in &schema().models {
        statements.push(create_table_sql(model)?);
    }
    for model in &schema().models {
        statements.extend(index_sql(model));
    }
    Ok(statements.join("\n\n"))
}

/// Creates every table and index that does not exist yet, in one
/// transaction. Running it twice is a no-op.
pub fn push(conn: &Connection) -> Result<()> {
    schema().validate()?;
    let script = schema_sql()?;
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(&script)?;
    tx.commit()?;
    info!(models = schema().models.len(), "Schema pushed");
    Ok(())
}
