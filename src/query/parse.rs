/// JSON Argument Parser
///
/// Builds typed arguments from the JSON argument shape used by the request
/// protocol, the CLI and the REPL:
///
/// ```json
/// {"where": {"status": "OPEN", "project": {"is": {"slug": "web"}}},
///  "orderBy": [{"votes": "desc"}], "take": 10, "include": {"project": true}}
/// ```
///
/// Unknown keys, unknown fields and values of the wrong type are rejected
/// with a validation error naming the offending argument.
use crate::core::{FeedbaseError, Result};
use crate::query::args::*;
use crate::query::ensure_unique_filter;
use crate::schema::{schema, FieldDef, ModelDef, RelationDef, ScalarType};
use crate::value::{coerce, Value};
use serde_json::{Map, Value as JsonValue};
use std::borrow::Cow;

type Object = Map<String, JsonValue>;

fn invalid(msg: String) -> FeedbaseError {
    FeedbaseError::Validation(msg)
}

/// Top-level argument object; `null` counts as `{}`.
fn top_level<'a>(json: &'a JsonValue, operation: &str, allowed: &[&str]) -> Result<Cow<'a, Object>> {
    let obj = match json {
        JsonValue::Null => return Ok(Cow::Owned(Map::new())),
        JsonValue::Object(obj) => obj,
        other => {
            return Err(invalid(format!(
                "Arguments to `{}` must be an object, got {}",
                operation, other
            )))
        }
    };
    for key in obj.keys() {
        if !allowed.contains(&key.as_str()) {
            return Err(invalid(format!(
                "Unknown argument `{}` for `{}`. Available options: {}",
                key,
                operation,
                allowed.join(", ")
            )));
        }
    }
    Ok(Cow::Borrowed(obj))
}

fn as_object<'a>(json: &'a JsonValue, what: &str) -> Result<&'a Object> {
    json.as_object()
        .ok_or_else(|| invalid(format!("`{}` must be an object, got {}", what, json)))
}

fn present<'a>(obj: &'a Object, key: &str) -> Option<&'a JsonValue> {
    obj.get(key).filter(|v| !v.is_null())
}

fn required<'a>(obj: &'a Object, key: &str, operation: &str) -> Result<&'a JsonValue> {
    present(obj, key).ok_or_else(|| invalid(format!("Argument `{}` is missing for `{}`", key, operation)))
}

fn skip_arg(obj: &Object) -> Result<Option<usize>> {
    match present(obj, "skip") {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| invalid(format!("`skip` must be a non-negative integer, got {}", v))),
    }
}

fn take_arg(obj: &Object) -> Result<Option<i64>> {
    match present(obj, "take") {
        None => Ok(None),
        Some(v) => v
            .as_i64()
            .map(Some)
            .ok_or_else(|| invalid(format!("`take` must be an integer, got {}", v))),
    }
}

fn field_names(model: &ModelDef, json: &JsonValue, what: &str) -> Result<Vec<String>> {
    let names: Vec<&str> = match json {
        JsonValue::String(s) => vec![s.as_str()],
        JsonValue::Array(items) => items
            .iter()
            .map(|i| i.as_str().ok_or_else(|| invalid(format!("`{}` expects field names", what))))
            .collect::<Result<_>>()?,
        other => return Err(invalid(format!("`{}` expects field names, got {}", what, other))),
    };
    names
        .into_iter()
        .map(|n| model.require_field(n).map(|f| f.name.to_string()))
        .collect()
}

// ---------------------------------------------------------------------------
// where

/// Parses a `where` object.
pub fn filter(model: &ModelDef, json: &JsonValue) -> Result<Filter> {
    let obj = as_object(json, "where")?;
    let mut parts = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        match key.as_str() {
            "AND" => parts.push(Filter::And(filter_list(model, value)?)),
            "OR" => parts.push(Filter::Or(filter_list(model, value)?)),
            "NOT" => parts.push(match value {
                JsonValue::Array(_) => {
                    Filter::And(filter_list(model, value)?.into_iter().map(Filter::not).collect())
                }
                _ => Filter::not(filter(model, value)?),
            }),
            name => {
                if let Some(field) = model.field(name) {
                    parts.push(field_filter(model, field, value)?);
                } else if let Some(relation) = model.relation(name) {
                    parts.push(relation_filter(relation, value)?);
                } else if let Some(key) = model.compound_key(name) {
                    let inner = as_object(value, name)?;
                    let mut equalities = Vec::with_capacity(key.fields.len());
                    for f in &key.fields {
                        let def = model.require_field(f)?;
                        let v = inner
                            .get(*f)
                            .ok_or_else(|| invalid(format!("`{}` requires `{}`", name, f)))?;
                        equalities.push(Filter::field(f).equals(coerce(model.name, def, v)?));
                    }
                    if inner.len() != key.fields.len() {
                        return Err(invalid(format!(
                            "`{}` takes exactly the fields {}",
                            name,
                            key.fields.join(", ")
                        )));
                    }
                    parts.push(Filter::And(equalities));
                } else {
                    return Err(invalid(format!(
                        "Unknown argument `{}` in where for model `{}`",
                        name, model.name
                    )));
                }
            }
        }
    }
    Ok(if parts.len() == 1 {
        parts.remove(0)
    } else {
        Filter::And(parts)
    })
}

fn filter_list(model: &ModelDef, json: &JsonValue) -> Result<Vec<Filter>> {
    match json {
        JsonValue::Array(items) => items.iter().map(|i| filter(model, i)).collect(),
        JsonValue::Object(_) => Ok(vec![filter(model, json)?]),
        other => Err(invalid(format!("Expected a filter or a list of filters, got {}", other))),
    }
}

fn field_filter(model: &ModelDef, field: &FieldDef, json: &JsonValue) -> Result<Filter> {
    let wrap = |condition: Condition| Filter::Field {
        field: field.name.to_string(),
        condition,
    };
    match json {
        JsonValue::Object(ops) => {
            let coerce_value = |v: &JsonValue| coerce(model.name, field, v);
            let filters = conditions(model, field, ops, &coerce_value, &wrap)?;
            Ok(collapse(filters))
        }
        JsonValue::Null => Ok(wrap(Condition::Equals(Value::Null))),
        value => Ok(wrap(Condition::Equals(coerce(model.name, field, value)?))),
    }
}

fn collapse(mut filters: Vec<Filter>) -> Filter {
    if filters.len() == 1 {
        filters.remove(0)
    } else {
        Filter::And(filters)
    }
}

/// Parses an operator object (`{"gt": 1, "lt": 5}`) into filters built by
/// `wrap`. `coerce_value` validates each operand.
fn conditions(
    model: &ModelDef,
    field: &FieldDef,
    ops: &Object,
    coerce_value: &dyn Fn(&JsonValue) -> Result<Value>,
    wrap: &dyn Fn(Condition) -> Filter,
) -> Result<Vec<Filter>> {
    let insensitive = match ops.get("mode").and_then(|m| m.as_str()) {
        None | Some("default") => false,
        Some("insensitive") => true,
        Some(other) => return Err(invalid(format!("Unknown `mode` `{}`", other))),
    };

    let string_operand = |op: &str, v: &JsonValue| -> Result<String> {
        if field.ty != ScalarType::String {
            return Err(invalid(format!(
                "`{}` requires a String field, `{}.{}` is {:?}",
                op, model.name, field.name, field.ty
            )));
        }
        v.as_str()
            .map(str::to_string)
            .ok_or_else(|| invalid(format!("`{}` on `{}` expects a string", op, field.name)))
    };

    let list_operand = |op: &str, v: &JsonValue| -> Result<Vec<Value>> {
        v.as_array()
            .ok_or_else(|| invalid(format!("`{}` on `{}` expects a list", op, field.name)))?
            .iter()
            .map(|item| coerce_value(item))
            .collect()
    };

    let mut out = Vec::with_capacity(ops.len());
    for (op, v) in ops {
        let condition = match op.as_str() {
            "mode" => continue,
            "equals" if v.is_null() => Condition::Equals(Value::Null),
            "equals" => Condition::Equals(coerce_value(v)?),
            "not" => match v {
                JsonValue::Null => Condition::NotEquals(Value::Null),
                JsonValue::Object(inner) => {
                    let nested = conditions(model, field, inner, coerce_value, wrap)?;
                    out.push(Filter::not(collapse(nested)));
                    continue;
                }
                other => Condition::NotEquals(coerce_value(other)?),
            },
            "in" => Condition::In(list_operand(op, v)?),
            "notIn" => Condition::NotIn(list_operand(op, v)?),
            "lt" => Condition::Lt(coerce_value(v)?),
            "lte" => Condition::Lte(coerce_value(v)?),
            "gt" => Condition::Gt(coerce_value(v)?),
            "gte" => Condition::Gte(coerce_value(v)?),
            "contains" => Condition::Contains {
                value: string_operand(op, v)?,
                insensitive,
            },
            "startsWith" => Condition::StartsWith {
                value: string_operand(op, v)?,
                insensitive,
            },
            "endsWith" => Condition::EndsWith {
                value: string_operand(op, v)?,
                insensitive,
            },
            other => {
                return Err(invalid(format!(
                    "Unknown filter `{}` on field `{}.{}`",
                    other, model.name, field.name
                )))
            }
        };
        out.push(wrap(condition));
    }
    if out.is_empty() {
        return Err(invalid(format!("Empty filter on field `{}.{}`", model.name, field.name)));
    }
    Ok(out)
}

fn relation_filter(relation: &RelationDef, json: &JsonValue) -> Result<Filter> {
    let target = schema().model(relation.target)?;
    if relation.is_list() {
        let obj = as_object(json, relation.name)?;
        let mut parts = Vec::with_capacity(obj.len());
        for (op, value) in obj {
            let inner = filter(target, value)?;
            parts.push(match op.as_str() {
                "some" => Filter::some(relation.name, inner),
                "every" => Filter::every(relation.name, inner),
                "none" => Filter::none(relation.name, inner),
                other => {
                    return Err(invalid(format!(
                        "Unknown list relation filter `{}` on `{}`; use some, every or none",
                        other, relation.name
                    )))
                }
            });
        }
        return Ok(collapse(parts));
    }

    match json {
        // a to-one relation matches `null` when no related row exists
        JsonValue::Null => Ok(Filter::is_not(relation.name, Filter::all())),
        JsonValue::Object(obj) if obj.keys().all(|k| k == "is" || k == "isNot") && !obj.is_empty() => {
            let mut parts = Vec::with_capacity(obj.len());
            for (op, value) in obj {
                let positive = op == "is";
                parts.push(match (positive, value.is_null()) {
                    (true, true) => Filter::is_not(relation.name, Filter::all()),
                    (false, true) => Filter::is(relation.name, Filter::all()),
                    (true, false) => Filter::is(relation.name, filter(target, value)?),
                    (false, false) => Filter::is_not(relation.name, filter(target, value)?),
                });
            }
            Ok(collapse(parts))
        }
        value => Ok(Filter::is(relation.name, filter(target, value)?)),
    }
}

/// Parses a `where` that must identify a single row.
pub fn unique_filter(model: &ModelDef, json: &JsonValue) -> Result<Filter> {
    let parsed = filter(model, json)?;
    ensure_unique_filter(model, &parsed)?;
    Ok(parsed)
}

// ---------------------------------------------------------------------------
// orderBy

fn direction(json: &JsonValue) -> Result<Direction> {
    match json.as_str() {
        Some("asc") => Ok(Direction::Asc),
        Some("desc") => Ok(Direction::Desc),
        _ => Err(invalid(format!("Sort order must be \"asc\" or \"desc\", got {}", json))),
    }
}

/// Parses `orderBy` (an object or a list of single-key objects).
pub fn order_by(model: &ModelDef, json: &JsonValue, grouped: bool) -> Result<Vec<OrderBy>> {
    let items: Vec<&JsonValue> = match json {
        JsonValue::Array(items) => items.iter().collect(),
        other => vec![other],
    };
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        let obj = as_object(item, "orderBy")?;
        if obj.len() != 1 {
            return Err(invalid(
                "Each orderBy object takes exactly one field; use a list to sort by several".to_string(),
            ));
        }
        for (key, value) in obj {
            out.push(order_term(model, key, value, grouped)?);
        }
    }
    Ok(out)
}

fn order_term(model: &ModelDef, key: &str, value: &JsonValue, grouped: bool) -> Result<OrderBy> {
    if let Some(field) = model.field(key) {
        let (dir, nulls) = match value {
            JsonValue::Object(obj) => {
                let dir = direction(obj.get("sort").unwrap_or(&JsonValue::Null))?;
                let nulls = match obj.get("nulls").and_then(|n| n.as_str()) {
                    None => None,
                    Some("first") => Some(NullsOrder::First),
                    Some("last") => Some(NullsOrder::Last),
                    Some(other) => return Err(invalid(format!("Unknown nulls order `{}`", other))),
                };
                (dir, nulls)
            }
            other => (direction(other)?, None),
        };
        return Ok(OrderBy {
            target: OrderTarget::Field(field.name.to_string()),
            direction: dir,
            nulls,
        });
    }

    if let Some(relation) = model.relation(key) {
        let obj = as_object(value, key)?;
        return match (obj.len(), obj.get("_count")) {
            (1, Some(dir)) => Ok(OrderBy::relation_count(relation.name, direction(dir)?)),
            _ => Err(invalid(format!(
                "Relation `{}` can only be ordered by `_count`",
                relation.name
            ))),
        };
    }

    if let (true, Some(func)) = (grouped, AggregateFn::from_key(key)) {
        let obj = as_object(value, key)?;
        let (field, dir) = obj
            .iter()
            .next()
            .filter(|_| obj.len() == 1)
            .ok_or_else(|| invalid(format!("`{}` ordering takes exactly one field", key)))?;
        if !(func == AggregateFn::Count && field == "_all") {
            model.require_field(field)?;
        }
        return Ok(OrderBy {
            target: OrderTarget::Aggregate(func, field.clone()),
            direction: direction(dir)?,
            nulls: None,
        });
    }

    Err(invalid(format!("Unknown orderBy field `{}` for model `{}`", key, model.name)))
}

// ---------------------------------------------------------------------------
// select / include

/// Parses the `select`/`include` pair of an argument object.
pub fn selection(model: &ModelDef, obj: &Object) -> Result<Selection> {
    match (present(obj, "select"), present(obj, "include")) {
        (Some(_), Some(_)) => Err(invalid(
            "Please either use `include` or `select`, but not both at the same time.".to_string(),
        )),
        (Some(select), None) => parse_select(model, select),
        (None, Some(include)) => parse_include(model, include),
        (None, None) => Ok(Selection::default()),
    }
}

fn parse_select(model: &ModelDef, json: &JsonValue) -> Result<Selection> {
    let obj = as_object(json, "select")?;
    let mut sel = Selection {
        fields: Some(Vec::new()),
        ..Selection::default()
    };
    for (key, value) in obj {
        if key == "_count" {
            sel.counts = count_selection(model, value)?;
        } else if let Some(field) = model.field(key) {
            match value.as_bool() {
                Some(true) => sel.fields.get_or_insert_with(Vec::new).push(field.name.to_string()),
                Some(false) => {}
                None => return Err(invalid(format!("`select.{}` expects a boolean", key))),
            }
        } else if let Some(relation) = model.relation(key) {
            if let Some(args) = nested_args(relation, value)? {
                sel.relations.insert(relation.name.to_string(), args);
            }
        } else {
            return Err(invalid(format!(
                "Unknown field `{}` in select for model `{}`",
                key, model.name
            )));
        }
    }
    Ok(sel)
}

fn parse_include(model: &ModelDef, json: &JsonValue) -> Result<Selection> {
    let obj = as_object(json, "include")?;
    let mut sel = Selection::default();
    for (key, value) in obj {
        if key == "_count" {
            sel.counts = count_selection(model, value)?;
        } else if let Some(relation) = model.relation(key) {
            if let Some(args) = nested_args(relation, value)? {
                sel.relations.insert(relation.name.to_string(), args);
            }
        } else {
            return Err(invalid(format!(
                "Unknown relation `{}` in include for model `{}`",
                key, model.name
            )));
        }
    }
    Ok(sel)
}

/// `true`, `false` or nested arguments for an included relation.
fn nested_args(relation: &RelationDef, json: &JsonValue) -> Result<Option<FindManyArgs>> {
    let target = schema().model(relation.target)?;
    match json {
        JsonValue::Bool(true) => Ok(Some(FindManyArgs::default())),
        JsonValue::Bool(false) => Ok(None),
        JsonValue::Object(obj) if !relation.is_list() => {
            top_level(json, relation.name, &["select", "include"])?;
            Ok(Some(FindManyArgs {
                selection: selection(target, obj)?,
                ..FindManyArgs::default()
            }))
        }
        JsonValue::Object(_) => {
            let args = find_many(target, json)?;
            if args.cursor.is_some() {
                return Err(invalid(format!(
                    "`cursor` is not supported on included relation `{}`",
                    relation.name
                )));
            }
            Ok(Some(args))
        }
        other => Err(invalid(format!(
            "Relation `{}` expects a boolean or an object, got {}",
            relation.name, other
        ))),
    }
}

fn count_selection(model: &ModelDef, json: &JsonValue) -> Result<Vec<String>> {
    let list_relations = || {
        model
            .relations
            .iter()
            .filter(|r| r.is_list())
            .map(|r| r.name.to_string())
            .collect::<Vec<_>>()
    };
    match json {
        JsonValue::Bool(true) => Ok(list_relations()),
        JsonValue::Bool(false) => Ok(Vec::new()),
        JsonValue::Object(obj) => {
            let inner = as_object(required(obj, "select", "_count")?, "_count.select")?;
            let mut out = Vec::new();
            for (name, enabled) in inner {
                let relation = model.require_relation(name)?;
                if !relation.is_list() {
                    return Err(invalid(format!("`_count` needs a list relation, `{}` is not one", name)));
                }
                if enabled.as_bool() == Some(true) {
                    out.push(relation.name.to_string());
                }
            }
            Ok(out)
        }
        other => Err(invalid(format!("`_count` expects a boolean or an object, got {}", other))),
    }
}

// ---------------------------------------------------------------------------
// data

/// Parses create data. Relation fields are rejected: foreign keys are set
/// directly.
pub fn data(model: &ModelDef, json: &JsonValue) -> Result<Data> {
    let obj = as_object(json, "data")?;
    let mut out = Data::new();
    for (key, value) in obj {
        let field = writable_field(model, key)?;
        out.0.insert(field.name.to_string(), coerce(model.name, field, value)?);
    }
    Ok(out)
}

fn writable_field<'m>(model: &'m ModelDef, key: &str) -> Result<&'m FieldDef> {
    if let Some(relation) = model.relation(key) {
        let hint = match relation.kind {
            crate::schema::RelationKind::ToOne { fields, .. } => {
                format!("; set `{}` directly", fields.join("`, `"))
            }
            crate::schema::RelationKind::ToMany { .. } => String::new(),
        };
        return Err(invalid(format!(
            "Nested writes through relation `{}.{}` are not supported{}",
            model.name, key, hint
        )));
    }
    model.require_field(key)
}

/// Parses update data: plain values, or `{set|increment|decrement|multiply|divide: v}`.
pub fn update_data(model: &ModelDef, json: &JsonValue) -> Result<UpdateData> {
    let obj = as_object(json, "data")?;
    let mut out = UpdateData::new();
    for (key, value) in obj {
        let field = writable_field(model, key)?;
        let update = match value {
            JsonValue::Object(ops) if field.ty != ScalarType::Json || is_set_object(ops) => {
                let (op, operand) = ops
                    .iter()
                    .next()
                    .filter(|_| ops.len() == 1)
                    .ok_or_else(|| invalid(format!("Update of `{}` takes exactly one operation", key)))?;
                let operand = coerce(model.name, field, operand)?;
                match op.as_str() {
                    "set" => FieldUpdate::Set(operand),
                    arith if !field.ty.is_numeric() => {
                        return Err(invalid(format!(
                            "`{}` requires a numeric field, `{}.{}` is {:?}",
                            arith, model.name, key, field.ty
                        )))
                    }
                    "increment" => FieldUpdate::Increment(operand),
                    "decrement" => FieldUpdate::Decrement(operand),
                    "multiply" => FieldUpdate::Multiply(operand),
                    "divide" => FieldUpdate::Divide(operand),
                    other => return Err(invalid(format!("Unknown update operation `{}`", other))),
                }
            }
            plain => FieldUpdate::Set(coerce(model.name, field, plain)?),
        };
        out.0.insert(field.name.to_string(), update);
    }
    Ok(out)
}

fn is_set_object(ops: &Object) -> bool {
    ops.len() == 1 && ops.contains_key("set")
}

// ---------------------------------------------------------------------------
// aggregates

fn aggregates(model: &ModelDef, obj: &Object) -> Result<Aggregates> {
    let mut out = Aggregates::default();
    for func in [
        AggregateFn::Count,
        AggregateFn::Avg,
        AggregateFn::Sum,
        AggregateFn::Min,
        AggregateFn::Max,
    ] {
        let Some(value) = present(obj, func.key()) else {
            continue;
        };
        let fields = match value {
            JsonValue::Bool(true) if func == AggregateFn::Count => vec!["_all".to_string()],
            JsonValue::Object(fields) => {
                let mut names = Vec::new();
                for (name, enabled) in fields {
                    if !(func == AggregateFn::Count && name == "_all") {
                        let field = model.require_field(name)?;
                        if matches!(func, AggregateFn::Avg | AggregateFn::Sum) && !field.ty.is_numeric() {
                            return Err(invalid(format!(
                                "`{}` requires numeric fields, `{}.{}` is {:?}",
                                func.key(),
                                model.name,
                                name,
                                field.ty
                            )));
                        }
                    }
                    if enabled.as_bool() == Some(true) {
                        names.push(name.clone());
                    }
                }
                names
            }
            other => {
                return Err(invalid(format!(
                    "`{}` expects an object of fields, got {}",
                    func.key(),
                    other
                )))
            }
        };
        match func {
            AggregateFn::Count => out.count = fields,
            AggregateFn::Avg => out.avg = fields,
            AggregateFn::Sum => out.sum = fields,
            AggregateFn::Min => out.min = fields,
            AggregateFn::Max => out.max = fields,
        }
    }
    Ok(out)
}

/// Parses a `having` object, which mixes plain field conditions on grouped
/// fields with aggregate conditions (`{"votes": {"_avg": {"gt": 2}}}`).
pub fn having(model: &ModelDef, json: &JsonValue) -> Result<Filter> {
    let obj = as_object(json, "having")?;
    let mut parts = Vec::with_capacity(obj.len());
    for (key, value) in obj {
        match key.as_str() {
            "AND" | "OR" | "NOT" => {
                let list = match value {
                    JsonValue::Array(items) => items.iter().map(|i| having(model, i)).collect::<Result<Vec<_>>>()?,
                    other => vec![having(model, other)?],
                };
                parts.push(match key.as_str() {
                    "AND" => Filter::And(list),
                    "OR" => Filter::Or(list),
                    _ => Filter::And(list.into_iter().map(Filter::not).collect()),
                });
            }
            name => {
                let field = model.require_field(name)?;
                let ops = match value {
                    JsonValue::Object(ops) => ops,
                    other => {
                        parts.push(field_filter(model, field, other)?);
                        continue;
                    }
                };
                let mut plain = Map::new();
                for (op, operand) in ops {
                    let Some(func) = AggregateFn::from_key(op) else {
                        plain.insert(op.clone(), operand.clone());
                        continue;
                    };
                    let inner = as_object(operand, op)?;
                    let wrap = |condition: Condition| Filter::Aggregate {
                        func,
                        field: field.name.to_string(),
                        condition,
                    };
                    let numeric = |v: &JsonValue| -> Result<Value> {
                        match v {
                            JsonValue::Number(_) => Ok(Value::from_json(v)),
                            other => Err(invalid(format!("`{}` comparisons expect a number, got {}", op, other))),
                        }
                    };
                    let typed = |v: &JsonValue| coerce(model.name, field, v);
                    let coerce_value: &dyn Fn(&JsonValue) -> Result<Value> = match func {
                        AggregateFn::Min | AggregateFn::Max => &typed,
                        _ => &numeric,
                    };
                    parts.extend(conditions(model, field, inner, coerce_value, &wrap)?);
                }
                if !plain.is_empty() {
                    parts.push(field_filter(model, field, &JsonValue::Object(plain))?);
                }
            }
        }
    }
    Ok(collapse(parts))
}

// ---------------------------------------------------------------------------
// operations

pub fn find_many(model: &ModelDef, json: &JsonValue) -> Result<FindManyArgs> {
    let obj = top_level(
        json,
        "findMany",
        &["where", "orderBy", "cursor", "skip", "take", "distinct", "select", "include"],
    )?;
    Ok(FindManyArgs {
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
        order_by: present(&obj, "orderBy")
            .map(|o| order_by(model, o, false))
            .transpose()?
            .unwrap_or_default(),
        cursor: present(&obj, "cursor").map(|c| unique_filter(model, c)).transpose()?,
        skip: skip_arg(&obj)?,
        take: take_arg(&obj)?,
        distinct: present(&obj, "distinct")
            .map(|d| field_names(model, d, "distinct"))
            .transpose()?
            .unwrap_or_default(),
        selection: selection(model, &obj)?,
    })
}

pub fn find_unique(model: &ModelDef, json: &JsonValue) -> Result<FindUniqueArgs> {
    let obj = top_level(json, "findUnique", &["where", "select", "include"])?;
    Ok(FindUniqueArgs {
        filter: unique_filter(model, required(&obj, "where", "findUnique")?)?,
        selection: selection(model, &obj)?,
    })
}

pub fn create(model: &ModelDef, json: &JsonValue) -> Result<CreateArgs> {
    let obj = top_level(json, "create", &["data", "select", "include"])?;
    Ok(CreateArgs {
        data: data(model, required(&obj, "data", "create")?)?,
        selection: selection(model, &obj)?,
    })
}

pub fn create_many(model: &ModelDef, json: &JsonValue) -> Result<CreateManyArgs> {
    let obj = top_level(json, "createMany", &["data", "skipDuplicates"])?;
    let rows = match required(&obj, "data", "createMany")? {
        JsonValue::Array(items) => items.iter().map(|i| data(model, i)).collect::<Result<Vec<_>>>()?,
        single => vec![data(model, single)?],
    };
    let skip_duplicates = match present(&obj, "skipDuplicates") {
        None => false,
        Some(v) => v
            .as_bool()
            .ok_or_else(|| invalid("`skipDuplicates` must be a boolean".to_string()))?,
    };
    Ok(CreateManyArgs {
        data: rows,
        skip_duplicates,
    })
}

pub fn update(model: &ModelDef, json: &JsonValue) -> Result<UpdateArgs> {
    let obj = top_level(json, "update", &["where", "data", "select", "include"])?;
    Ok(UpdateArgs {
        filter: unique_filter(model, required(&obj, "where", "update")?)?,
        data: update_data(model, required(&obj, "data", "update")?)?,
        selection: selection(model, &obj)?,
    })
}

pub fn update_many(model: &ModelDef, json: &JsonValue) -> Result<UpdateManyArgs> {
    let obj = top_level(json, "updateMany", &["where", "data"])?;
    Ok(UpdateManyArgs {
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
        data: update_data(model, required(&obj, "data", "updateMany")?)?,
    })
}

pub fn upsert(model: &ModelDef, json: &JsonValue) -> Result<UpsertArgs> {
    let obj = top_level(json, "upsert", &["where", "create", "update", "select", "include"])?;
    Ok(UpsertArgs {
        filter: unique_filter(model, required(&obj, "where", "upsert")?)?,
        create: data(model, required(&obj, "create", "upsert")?)?,
        update: update_data(model, required(&obj, "update", "upsert")?)?,
        selection: selection(model, &obj)?,
    })
}

pub fn delete(model: &ModelDef, json: &JsonValue) -> Result<FindUniqueArgs> {
    let obj = top_level(json, "delete", &["where", "select", "include"])?;
    Ok(FindUniqueArgs {
        filter: unique_filter(model, required(&obj, "where", "delete")?)?,
        selection: selection(model, &obj)?,
    })
}

pub fn delete_many(model: &ModelDef, json: &JsonValue) -> Result<DeleteManyArgs> {
    let obj = top_level(json, "deleteMany", &["where"])?;
    Ok(DeleteManyArgs {
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
    })
}

pub fn count(model: &ModelDef, json: &JsonValue) -> Result<CountArgs> {
    let obj = top_level(
        json,
        "count",
        &["where", "orderBy", "cursor", "skip", "take", "select"],
    )?;
    let select = match present(&obj, "select") {
        None => None,
        Some(sel) => {
            let mut names = Vec::new();
            for (name, enabled) in as_object(sel, "select")? {
                if name != "_all" {
                    model.require_field(name)?;
                }
                if enabled.as_bool() == Some(true) {
                    names.push(name.clone());
                }
            }
            Some(names)
        }
    };
    Ok(CountArgs {
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
        order_by: present(&obj, "orderBy")
            .map(|o| order_by(model, o, false))
            .transpose()?
            .unwrap_or_default(),
        cursor: present(&obj, "cursor").map(|c| unique_filter(model, c)).transpose()?,
        skip: skip_arg(&obj)?,
        take: take_arg(&obj)?,
        select,
    })
}

pub fn aggregate(model: &ModelDef, json: &JsonValue) -> Result<AggregateArgs> {
    let obj = top_level(
        json,
        "aggregate",
        &["where", "orderBy", "cursor", "skip", "take", "_count", "_avg", "_sum", "_min", "_max"],
    )?;
    Ok(AggregateArgs {
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
        order_by: present(&obj, "orderBy")
            .map(|o| order_by(model, o, false))
            .transpose()?
            .unwrap_or_default(),
        cursor: present(&obj, "cursor").map(|c| unique_filter(model, c)).transpose()?,
        skip: skip_arg(&obj)?,
        take: take_arg(&obj)?,
        aggregates: aggregates(model, &obj)?,
    })
}

pub fn group_by(model: &ModelDef, json: &JsonValue) -> Result<GroupByArgs> {
    let obj = top_level(
        json,
        "groupBy",
        &[
            "by", "where", "having", "orderBy", "skip", "take", "_count", "_avg", "_sum", "_min",
            "_max",
        ],
    )?;
    Ok(GroupByArgs {
        by: field_names(model, required(&obj, "by", "groupBy")?, "by")?,
        filter: present(&obj, "where").map(|w| filter(model, w)).transpose()?,
        having: present(&obj, "having").map(|h| having(model, h)).transpose()?,
        order_by: present(&obj, "orderBy")
            .map(|o| order_by(model, o, true))
            .transpose()?
            .unwrap_or_default(),
        skip: skip_arg(&obj)?,
        take: take_arg(&obj)?,
        aggregates: aggregates(model, &obj)?,
    })
}
