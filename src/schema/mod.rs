/// Schema Registry Module
///
/// The registry is the static description of every model, field, relation,
/// enum and unique constraint the client knows about. Query parsing, SQL
/// compilation, DDL generation and drift detection all read from it; nothing
/// is discovered from the database at runtime.
pub mod ddl;
pub mod diff;
mod models;

use crate::core::{FeedbaseError, Result};
use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Scalar storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Boolean,
    Int,
    Float,
    DateTime,
    Json,
    Enum(&'static str),
}

impl ScalarType {
    /// SQLite column affinity used when rendering DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            ScalarType::Boolean | ScalarType::Int => "INTEGER",
            ScalarType::Float => "REAL",
            ScalarType::String | ScalarType::DateTime | ScalarType::Json | ScalarType::Enum(_) => {
                "TEXT"
            }
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, ScalarType::Int | ScalarType::Float)
    }

    pub fn is_textual(&self) -> bool {
        matches!(self, ScalarType::String | ScalarType::Enum(_))
    }
}

/// Value applied when a create omits the field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    /// Client-generated identifier
    Id,
    /// Current timestamp
    Now,
    Bool(bool),
    Int(i64),
    Enum(&'static str),
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: &'static str,
    pub ty: ScalarType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub is_id: bool,
    pub unique: bool,
    /// Refreshed with the current time on every update
    pub updated_at: bool,
}

impl FieldDef {
    pub fn new(name: &'static str, ty: ScalarType) -> Self {
        FieldDef {
            name,
            ty,
            nullable: false,
            default: None,
            is_id: false,
            unique: false,
            updated_at: false,
        }
    }

    pub fn id() -> Self {
        FieldDef {
            is_id: true,
            default: Some(DefaultValue::Id),
            ..FieldDef::new("id", ScalarType::String)
        }
    }

    pub fn created_at() -> Self {
        FieldDef::new("createdAt", ScalarType::DateTime).default_to(DefaultValue::Now)
    }

    pub fn updated_at() -> Self {
        FieldDef {
            updated_at: true,
            ..FieldDef::new("updatedAt", ScalarType::DateTime).default_to(DefaultValue::Now)
        }
    }

    pub fn optional(mut self) -> Self {
        self.nullable = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn default_to(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// Whether a create must provide this field explicitly.
    pub fn is_required_on_create(&self) -> bool {
        !self.nullable && self.default.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelationKind {
    /// The owning side: this model stores `fields`, which point at
    /// `references` on the target.
    ToOne {
        fields: &'static [&'static str],
        references: &'static [&'static str],
    },
    /// The list side; `back` names the `ToOne` relation on the target.
    ToMany { back: &'static str },
}

#[derive(Debug, Clone)]
pub struct RelationDef {
    pub name: &'static str,
    pub target: &'static str,
    pub kind: RelationKind,
}

impl RelationDef {
    pub fn to_one(
        name: &'static str,
        target: &'static str,
        fields: &'static [&'static str],
        references: &'static [&'static str],
    ) -> Self {
        RelationDef {
            name,
            target,
            kind: RelationKind::ToOne { fields, references },
        }
    }

    pub fn to_many(name: &'static str, target: &'static str, back: &'static str) -> Self {
        RelationDef {
            name,
            target,
            kind: RelationKind::ToMany { back },
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self.kind, RelationKind::ToMany { .. })
    }
}

/// Resolved join columns for a relation: `local` columns live on the model
/// the relation is declared on, `remote` columns on the target.
#[derive(Debug, Clone, Copy)]
pub struct JoinColumns {
    pub local: &'static [&'static str],
    pub remote: &'static [&'static str],
}

/// A named unique key. Single-field keys are named after the field,
/// compound keys join their fields with `_`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub name: String,
    pub fields: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ModelDef {
    pub name: &'static str,
    pub fields: Vec<FieldDef>,
    pub relations: Vec<RelationDef>,
    pub compound_uniques: Vec<&'static [&'static str]>,
}

impl ModelDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDef> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Looks up a scalar field, failing with a validation error naming the
    /// model when it does not exist.
    pub fn require_field(&self, name: &str) -> Result<&FieldDef> {
        self.field(name).ok_or_else(|| {
            FeedbaseError::Validation(format!(
                "Unknown field `{}` for model `{}`. Available fields: {}",
                name,
                self.name,
                self.fields.iter().map(|f| f.name).collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn require_relation(&self, name: &str) -> Result<&RelationDef> {
        self.relation(name).ok_or_else(|| {
            FeedbaseError::Validation(format!(
                "Unknown relation `{}` for model `{}`",
                name, self.name
            ))
        })
    }

    pub fn id_field(&self) -> &FieldDef {
        // every model in the registry declares an id; `Schema::validate` checks it
        self.fields.iter().find(|f| f.is_id).unwrap_or(&self.fields[0])
    }

    pub fn unique_keys(&self) -> Vec<UniqueKey> {
        let mut keys: Vec<UniqueKey> = self
            .fields
            .iter()
            .filter(|f| f.is_id || f.unique)
            .map(|f| UniqueKey {
                name: f.name.to_string(),
                fields: vec![f.name],
            })
            .collect();
        keys.extend(self.compound_uniques.iter().map(|fields| UniqueKey {
            name: fields.join("_"),
            fields: fields.to_vec(),
        }));
        keys
    }

    pub fn compound_key(&self, name: &str) -> Option<UniqueKey> {
        self.unique_keys()
            .into_iter()
            .find(|k| k.fields.len() > 1 && k.name == name)
    }

    /// Resolves the columns joining this model to the relation's target.
    pub fn join_columns(&self, relation: &RelationDef) -> Result<JoinColumns> {
        match relation.kind {
            RelationKind::ToOne { fields, references } => Ok(JoinColumns {
                local: fields,
                remote: references,
            }),
            RelationKind::ToMany { back } => {
                let target = schema().model(relation.target)?;
                match target.require_relation(back)?.kind {
                    RelationKind::ToOne { fields, references } => Ok(JoinColumns {
                        local: references,
                        remote: fields,
                    }),
                    RelationKind::ToMany { .. } => Err(FeedbaseError::Schema(format!(
                        "Relation `{}.{}` points back at a list relation",
                        self.name, relation.name
                    ))),
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnumDef {
    pub name: &'static str,
    pub values: &'static [&'static str],
}

impl EnumDef {
    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(&value)
    }
}

/// The complete registry of models and enums.
#[derive(Debug)]
pub struct Schema {
    pub models: Vec<ModelDef>,
    pub enums: Vec<EnumDef>,
}

static SCHEMA: Lazy<Schema> = Lazy::new(models::build);

/// Returns the global schema registry.
pub fn schema() -> &'static Schema {
    &SCHEMA
}

impl Schema {
    pub fn model(&self, name: &str) -> Result<&ModelDef> {
        self.models.iter().find(|m| m.name == name).ok_or_else(|| {
            FeedbaseError::Validation(format!("Unknown model `{}`", name))
        })
    }

    /// Finds a model by its delegate name, ignoring case
    /// (`feedback`, `organizationMember`).
    pub fn model_by_delegate(&self, name: &str) -> Result<&ModelDef> {
        self.models
            .iter()
            .find(|m| m.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| FeedbaseError::Validation(format!("Unknown model `{}`", name)))
    }

    pub fn enum_def(&self, name: &str) -> Option<&EnumDef> {
        self.enums.iter().find(|e| e.name == name)
    }

    /// Checks the registry's internal consistency.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for model in &self.models {
            if !seen.insert(model.name) {
                return Err(FeedbaseError::Schema(format!("Duplicate model `{}`", model.name)));
            }
            if model.fields.iter().filter(|f| f.is_id).count() != 1 {
                return Err(FeedbaseError::Schema(format!(
                    "Model `{}` must declare exactly one id field",
                    model.name
                )));
            }
            for field in &model.fields {
                if let ScalarType::Enum(name) = field.ty {
                    let def = self.enum_def(name).ok_or_else(|| {
                        FeedbaseError::Schema(format!(
                            "Field `{}.{}` uses unknown enum `{}`",
                            model.name, field.name, name
                        ))
                    })?;
                    if let Some(DefaultValue::Enum(value)) = field.default {
                        if !def.contains(value) {
                            return Err(FeedbaseError::Schema(format!(
                                "Default `{}` is not a value of enum `{}`",
                                value, name
                            )));
                        }
                    }
                }
            }
            for fields in &model.compound_uniques {
                for name in fields.iter() {
                    model.field(name).ok_or_else(|| {
                        FeedbaseError::Schema(format!(
                            "Unique key on `{}` names unknown field `{}`",
                            model.name, name
                        ))
                    })?;
                }
            }
            for relation in &model.relations {
                let target = self.model(relation.target).map_err(|_| {
                    FeedbaseError::Schema(format!(
                        "Relation `{}.{}` targets unknown model `{}`",
                        model.name, relation.name, relation.target
                    ))
                })?;
                match relation.kind {
                    RelationKind::ToOne { fields, references } => {
                        if fields.len() != references.len() {
                            return Err(FeedbaseError::Schema(format!(
                                "Relation `{}.{}` has mismatched key arity",
                                model.name, relation.name
                            )));
                        }
                        for f in fields {
                            model.require_field(f).map_err(|e| FeedbaseError::Schema(e.to_string()))?;
                        }
                        for r in references {
                            target.require_field(r).map_err(|e| FeedbaseError::Schema(e.to_string()))?;
                        }
                    }
                    RelationKind::ToMany { back } => match target.relation(back) {
                        Some(RelationDef {
                            target: back_target,
                            kind: RelationKind::ToOne { .. },
                            ..
                        }) if *back_target == model.name => {}
                        _ => {
                            return Err(FeedbaseError::Schema(format!(
                                "Relation `{}.{}` has no matching `{}` on `{}`",
                                model.name, relation.name, back, target.name
                            )))
                        }
                    },
                }
            }
        }
        Ok(())
    }
}
