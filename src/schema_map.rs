use crate::schema::{schema, FieldDef, ModelDef, RelationKind, ScalarType, Schema};
use std::collections::BTreeMap;

/*
 * Schema Map Module for ER-like Diagram Visualization
 *
 * Builds an ER-style view of the schema registry (models, columns, keys and
 * the foreign keys between them) and renders it as text for `feedbase erd`
 * and the REPL's `:erd`.
 */

#[derive(Debug, Clone)]
pub struct SchemaMap {
    pub tables: Vec<TableNode>,
    pub relationships: Vec<Relationship>,
}

#[derive(Debug, Clone)]
pub struct TableNode {
    pub name: String,
    pub columns: Vec<String>,
    pub primary_keys: Vec<String>,
    pub unique_keys: Vec<String>,
    pub outgoing_references: Vec<String>, // Tables this table references
}

#[derive(Debug, Clone)]
pub struct Relationship {
    pub name: String,
    pub from_table: String,
    pub from_column: String,
    pub to_table: String,
    pub to_column: String,
}

fn type_name(ty: ScalarType) -> &'static str {
    match ty {
        ScalarType::String => "String",
        ScalarType::Boolean => "Boolean",
        ScalarType::Int => "Int",
        ScalarType::Float => "Float",
        ScalarType::DateTime => "DateTime",
        ScalarType::Json => "Json",
        ScalarType::Enum(name) => name,
    }
}

fn column_label(field: &FieldDef) -> String {
    format!(
        "{} {}{}",
        field.name,
        type_name(field.ty),
        if field.nullable { "?" } else { "" }
    )
}

fn table_node(model: &ModelDef) -> TableNode {
    let mut outgoing_references = Vec::new();
    for relation in &model.relations {
        if matches!(relation.kind, RelationKind::ToOne { .. })
            && !outgoing_references.iter().any(|t| t == relation.target)
        {
            outgoing_references.push(relation.target.to_string());
        }
    }

    TableNode {
        name: model.name.to_string(),
        columns: model.fields.iter().map(column_label).collect(),
        primary_keys: model
            .fields
            .iter()
            .filter(|f| f.is_id)
            .map(|f| f.name.to_string())
            .collect(),
        unique_keys: model
            .unique_keys()
            .into_iter()
            .filter(|k| !k.fields.iter().any(|f| model.field(f).map_or(false, |f| f.is_id)))
            .map(|k| format!("({})", k.fields.join(", ")))
            .collect(),
        outgoing_references,
    }
}

/// Builds the map for an arbitrary registry.
pub fn build_schema_map(schema: &Schema) -> SchemaMap {
    let tables = schema.models.iter().map(table_node).collect();
    let relationships = schema
        .models
        .iter()
        .flat_map(|model| {
            model.relations.iter().filter_map(move |relation| match relation.kind {
                RelationKind::ToOne { fields, references } => Some(Relationship {
                    name: relation.name.to_string(),
                    from_table: model.name.to_string(),
                    from_column: fields.join(", "),
                    to_table: relation.target.to_string(),
                    to_column: references.join(", "),
                }),
                RelationKind::ToMany { .. } => None,
            })
        })
        .collect();
    SchemaMap { tables, relationships }
}

/// Generates a schema map from the client's registry.
pub fn generate_schema_map() -> SchemaMap {
    build_schema_map(schema())
}

/// Renders the schema map as an ER-like ASCII diagram.
pub fn render_schema_map(map: &SchemaMap) -> String {
    let mut diagram = String::new();

    diagram.push_str("=== Schema Map (ER Diagram) ===\n\n");

    if map.tables.is_empty() {
        diagram.push_str("No models defined.\n");
        return diagram;
    }

    let mut sorted_tables = map.tables.clone();
    sorted_tables.sort_by(|a, b| a.name.cmp(&b.name));

    for table in &sorted_tables {
        diagram.push_str(&format!("📋 Model: {}\n", table.name));

        if !table.primary_keys.is_empty() {
            diagram.push_str(&format!("  🔑 Primary Key: {}\n", table.primary_keys.join(", ")));
        }
        if !table.unique_keys.is_empty() {
            diagram.push_str(&format!("  ✳ Unique: {}\n", table.unique_keys.join(", ")));
        }

        diagram.push_str("  📝 Columns:\n");
        for col in &table.columns {
            diagram.push_str(&format!("    - {}\n", col));
        }

        if !table.outgoing_references.is_empty() {
            diagram.push_str("  🔗 References:\n");
            for rel in map.relationships.iter().filter(|r| r.from_table == table.name) {
                diagram.push_str(&format!(
                    "    → {} ({} → {})\n",
                    rel.to_table, rel.from_column, rel.to_column
                ));
            }
        }

        let incoming_count = map
            .relationships
            .iter()
            .filter(|r| r.to_table == table.name)
            .count();
        if incoming_count > 0 {
            diagram.push_str(&format!("  ↙ Referenced by {} relation(s)\n", incoming_count));
        }

        diagram.push('\n');
    }

    if map.relationships.is_empty() {
        diagram.push_str("No relationships between models.\n");
    } else {
        diagram.push_str("=== Relationship Overview ===\n");

        let mut by_from: BTreeMap<&str, Vec<&Relationship>> = BTreeMap::new();
        for rel in &map.relationships {
            by_from.entry(rel.from_table.as_str()).or_default().push(rel);
        }
        for (from_table, relationships) in by_from {
            for rel in relationships {
                diagram.push_str(&format!(
                    "{}.{} → {} ({} → {})\n",
                    from_table, rel.name, rel.to_table, rel.from_column, rel.to_column
                ));
            }
        }
    }

    diagram.push_str("\n=== End Schema Map ===\n");
    diagram
}
