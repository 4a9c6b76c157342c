/// Query Compiler Module
///
/// Turns typed arguments into parameterised SQLite statements. Every table is
/// aliased (`t0` for the root, `t1`.. for correlated subqueries) so relation
/// filters can refer back to their parent row. Parameters are numbered
/// (`?1`, `?2`, ..) which lets a single bound value be referenced twice.
use crate::core::{FeedbaseError, Result};
use crate::query::args::{
    AggregateFn, Condition, Direction, FieldUpdate, Filter, NullsOrder, OrderBy, OrderTarget,
    RelationOp, UpdateData,
};
use crate::schema::{schema, ModelDef, RelationKind, ScalarType};
use crate::value::Value;
use std::fmt::Write;

/// A SQL statement with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub(crate) fn column(alias: &str, field: &str) -> String {
    format!("{}.{}", quote_ident(alias), quote_ident(field))
}

/// Whether filters are compiled for a `WHERE` or a `HAVING` clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterContext {
    Where,
    Having,
}

/// Incrementally builds SQL text and its parameter list.
#[derive(Debug, Default)]
pub struct SqlWriter {
    pub sql: String,
    pub params: Vec<Value>,
    aliases: usize,
}

impl SqlWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    /// Binds a value and returns its placeholder.
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        format!("?{}", self.params.len())
    }

    /// Allocates a fresh table alias.
    pub fn alias(&mut self) -> String {
        let alias = format!("t{}", self.aliases);
        self.aliases += 1;
        alias
    }

    pub fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

/// Column list of every scalar field, qualified by `alias`.
pub fn scalar_columns(model: &ModelDef, alias: &str) -> String {
    model
        .fields
        .iter()
        .map(|f| column(alias, f.name))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Escapes `%`, `_` and `\` for use in a `LIKE ... ESCAPE '\'` pattern.
pub fn escape_like(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

/// Compiles a filter into `w`.
pub fn compile_filter(
    w: &mut SqlWriter,
    model: &ModelDef,
    alias: &str,
    filter: &Filter,
    ctx: FilterContext,
) -> Result<()> {
    match filter {
        Filter::And(list) if list.is_empty() => w.push("1=1"),
        Filter::Or(list) if list.is_empty() => w.push("1=0"),
        Filter::And(list) | Filter::Or(list) => {
            let joiner = if matches!(filter, Filter::And(_)) { " AND " } else { " OR " };
            w.push("(");
            for (i, f) in list.iter().enumerate() {
                if i > 0 {
                    w.push(joiner);
                }
                compile_filter(w, model, alias, f, ctx)?;
            }
            w.push(")");
        }
        Filter::Not(inner) => {
            w.push("NOT (");
            compile_filter(w, model, alias, inner, ctx)?;
            w.push(")");
        }
        Filter::Field { field, condition } => {
            let def = model.require_field(field)?;
            if def.ty == ScalarType::Json && !matches!(condition, Condition::Equals(_) | Condition::NotEquals(_)) {
                return Err(FeedbaseError::Validation(format!(
                    "Json field `{}.{}` only supports equals and not",
                    model.name, field
                )));
            }
            let col = column(alias, field);
            compile_condition(w, &col, condition)?;
        }
        Filter::Relation {
            relation,
            op,
            filter,
        } => {
            if ctx == FilterContext::Having {
                return Err(FeedbaseError::Validation(
                    "Relation filters are not allowed in `having`".to_string(),
                ));
            }
            compile_relation_filter(w, model, alias, relation, *op, filter)?;
        }
        Filter::Aggregate {
            func,
            field,
            condition,
        } => {
            if ctx == FilterContext::Where {
                return Err(FeedbaseError::Validation(format!(
                    "Aggregate `{}` is only allowed in `having`",
                    func.key()
                )));
            }
            let expr = aggregate_expr(model, *func, field, alias)?;
            compile_condition(w, &expr, condition)?;
        }
    }
    Ok(())
}

fn compile_condition(w: &mut SqlWriter, col: &str, condition: &Condition) -> Result<()> {
    match condition {
        Condition::Equals(Value::Null) => w.push(&format!("{} IS NULL", col)),
        Condition::NotEquals(Value::Null) => w.push(&format!("{} IS NOT NULL", col)),
        Condition::Equals(v) => compare(w, col, "=", v),
        Condition::NotEquals(v) => compare(w, col, "<>", v),
        Condition::Lt(v) => compare(w, col, "<", v),
        Condition::Lte(v) => compare(w, col, "<=", v),
        Condition::Gt(v) => compare(w, col, ">", v),
        Condition::Gte(v) => compare(w, col, ">=", v),
        Condition::In(values) | Condition::NotIn(values) => {
            let negated = matches!(condition, Condition::NotIn(_));
            if values.is_empty() {
                w.push(if negated { "1=1" } else { "1=0" });
                return Ok(());
            }
            let placeholders: Vec<String> = values.iter().map(|v| w.bind(v.clone())).collect();
            let op = if negated { "NOT IN" } else { "IN" };
            w.push(&format!("{} {} ({})", col, op, placeholders.join(", ")));
        }
        Condition::Contains { value, insensitive }
        | Condition::StartsWith { value, insensitive }
        | Condition::EndsWith { value, insensitive } => {
            if value.is_empty() {
                w.push(&format!("{} IS NOT NULL", col));
                return Ok(());
            }
            if *insensitive {
                let pattern = match condition {
                    Condition::Contains { .. } => format!("%{}%", escape_like(value)),
                    Condition::StartsWith { .. } => format!("{}%", escape_like(value)),
                    _ => format!("%{}", escape_like(value)),
                };
                let p = w.bind(Value::Text(pattern));
                w.push(&format!("{} LIKE {} ESCAPE '\\'", col, p));
            } else {
                let p = w.bind(Value::Text(value.clone()));
                match condition {
                    Condition::Contains { .. } => w.push(&format!("instr({}, {}) > 0", col, p)),
                    Condition::StartsWith { .. } => {
                        w.push(&format!("substr({}, 1, length({})) = {}", col, p, p))
                    }
                    _ => w.push(&format!("substr({}, -length({})) = {}", col, p, p)),
                }
            }
        }
    }
    Ok(())
}

fn compare(w: &mut SqlWriter, col: &str, op: &str, value: &Value) {
    let p = w.bind(value.clone());
    w.push(&format!("{} {} {}", col, op, p));
}

/// `t1.remote = t0.local AND ...` for a relation between two aliases.
fn join_predicate(local_alias: &str, local: &[&str], remote_alias: &str, remote: &[&str]) -> String {
    local
        .iter()
        .zip(remote.iter())
        .map(|(l, r)| format!("{} = {}", column(remote_alias, r), column(local_alias, l)))
        .collect::<Vec<_>>()
        .join(" AND ")
}

fn compile_relation_filter(
    w: &mut SqlWriter,
    model: &ModelDef,
    alias: &str,
    relation: &str,
    op: RelationOp,
    filter: &Filter,
) -> Result<()> {
    let rel = model.require_relation(relation)?;
    let allowed = match rel.kind {
        RelationKind::ToMany { .. } => matches!(op, RelationOp::Some | RelationOp::Every | RelationOp::None),
        RelationKind::ToOne { .. } => matches!(op, RelationOp::Is | RelationOp::IsNot),
    };
    if !allowed {
        return Err(FeedbaseError::Validation(format!(
            "Filter {:?} is not valid on relation `{}.{}`",
            op, model.name, relation
        )));
    }

    let target = schema().model(rel.target)?;
    let join = model.join_columns(rel)?;
    let sub = w.alias();
    let prefix = match op {
        RelationOp::Some | RelationOp::Is => "EXISTS",
        RelationOp::None | RelationOp::Every | RelationOp::IsNot => "NOT EXISTS",
    };
    w.push(&format!(
        "{} (SELECT 1 FROM {} AS {} WHERE {} AND ",
        prefix,
        quote_ident(target.name),
        quote_ident(&sub),
        join_predicate(alias, join.local, &sub, join.remote)
    ));
    if op == RelationOp::Every {
        // a NULL condition result counts as a non-match
        w.push("(");
        compile_filter(w, target, &sub, filter, FilterContext::Where)?;
        w.push(") IS NOT 1");
    } else {
        w.push("(");
        compile_filter(w, target, &sub, filter, FilterContext::Where)?;
        w.push(")");
    }
    w.push(")");
    Ok(())
}

/// SQL expression for an aggregate over `field` (`_all` counts rows).
pub fn aggregate_expr(model: &ModelDef, func: AggregateFn, field: &str, alias: &str) -> Result<String> {
    if func == AggregateFn::Count && field == "_all" {
        return Ok("COUNT(*)".to_string());
    }
    let def = model.require_field(field)?;
    match func {
        AggregateFn::Avg | AggregateFn::Sum if !def.ty.is_numeric() => {
            return Err(FeedbaseError::Validation(format!(
                "`{}` requires a numeric field, `{}.{}` is {:?}",
                func.key(),
                model.name,
                field,
                def.ty
            )))
        }
        AggregateFn::Min | AggregateFn::Max if def.ty == ScalarType::Json => {
            return Err(FeedbaseError::Validation(format!(
                "`{}` is not supported on Json field `{}.{}`",
                func.key(),
                model.name,
                field
            )))
        }
        _ => {}
    }
    Ok(format!("{}({})", func.sql_name(), column(alias, field)))
}

/// SQL for one ordering term, without direction.
pub fn order_expr(model: &ModelDef, alias: &str, target: &OrderTarget, grouped: bool) -> Result<String> {
    match target {
        OrderTarget::Field(field) => {
            model.require_field(field)?;
            Ok(column(alias, field))
        }
        OrderTarget::RelationCount(relation) => {
            let rel = model.require_relation(relation)?;
            if !rel.is_list() {
                return Err(FeedbaseError::Validation(format!(
                    "`_count` ordering requires a list relation, `{}.{}` is not one",
                    model.name, relation
                )));
            }
            let target = schema().model(rel.target)?;
            let join = model.join_columns(rel)?;
            let sub = format!("{}_c", alias);
            Ok(format!(
                "(SELECT COUNT(*) FROM {} AS {} WHERE {})",
                quote_ident(target.name),
                quote_ident(&sub),
                join_predicate(alias, join.local, &sub, join.remote)
            ))
        }
        OrderTarget::Aggregate(func, field) => {
            if !grouped {
                return Err(FeedbaseError::Validation(format!(
                    "Ordering by `{}` is only allowed in groupBy",
                    func.key()
                )));
            }
            aggregate_expr(model, *func, field, alias)
        }
    }
}

/// Renders an `ORDER BY` clause (empty string when there is nothing to order).
pub fn compile_order_by(
    model: &ModelDef,
    alias: &str,
    order_by: &[OrderBy],
    grouped: bool,
) -> Result<String> {
    if order_by.is_empty() {
        return Ok(String::new());
    }
    let mut terms = Vec::with_capacity(order_by.len());
    for order in order_by {
        let mut term = format!(
            "{} {}",
            order_expr(model, alias, &order.target, grouped)?,
            order.direction.sql()
        );
        match order.nulls {
            Some(NullsOrder::First) => term.push_str(" NULLS FIRST"),
            Some(NullsOrder::Last) => term.push_str(" NULLS LAST"),
            None => {}
        }
        terms.push(term);
    }
    Ok(format!(" ORDER BY {}", terms.join(", ")))
}

/// Renders `LIMIT`/`OFFSET`. `take` must already be non-negative.
pub fn limit_clause(w: &mut SqlWriter, take: Option<usize>, skip: Option<usize>) {
    match (take, skip) {
        (None, None) | (None, Some(0)) => {}
        (Some(t), s) => {
            let _ = write!(w.sql, " LIMIT {}", t);
            if let Some(s) = s.filter(|s| *s > 0) {
                let _ = write!(w.sql, " OFFSET {}", s);
            }
        }
        (None, Some(s)) => {
            let _ = write!(w.sql, " LIMIT -1 OFFSET {}", s);
        }
    }
}

/// Whether NULLs sort before other values for an ordering term. Without an
/// explicit `nulls` SQLite puts them first ascending and last descending.
pub fn nulls_first(order: &OrderBy) -> bool {
    match order.nulls {
        Some(NullsOrder::First) => true,
        Some(NullsOrder::Last) => false,
        None => order.direction == Direction::Asc,
    }
}

/// Keyset predicate selecting rows at or after the cursor position for the
/// given ordering. `values` holds the cursor row's value for each term.
pub fn cursor_predicate(
    w: &mut SqlWriter,
    model: &ModelDef,
    alias: &str,
    order_by: &[OrderBy],
    values: &[Value],
) -> Result<()> {
    let mut branches = Vec::with_capacity(order_by.len() + 1);
    for i in 0..=order_by.len() {
        let mut parts = Vec::new();
        for (order, value) in order_by.iter().zip(values.iter()).take(i) {
            let col = order_expr(model, alias, &order.target, false)?;
            let p = w.bind(value.clone());
            parts.push(format!("{} IS {}", col, p));
        }
        if i < order_by.len() {
            let order = &order_by[i];
            let col = order_expr(model, alias, &order.target, false)?;
            let value = values.get(i).ok_or_else(|| {
                FeedbaseError::Query("Cursor row is missing an ordering value".to_string())
            })?;
            let cmp = match order.direction {
                Direction::Asc => ">",
                Direction::Desc => "<",
            };
            let after = match (value.is_null(), nulls_first(order)) {
                (true, true) => format!("{} IS NOT NULL", col),
                (true, false) => "1=0".to_string(),
                (false, true) => {
                    let p = w.bind(value.clone());
                    format!("{} {} {}", col, cmp, p)
                }
                (false, false) => {
                    let p = w.bind(value.clone());
                    format!("({} {} {} OR {} IS NULL)", col, cmp, p, col)
                }
            };
            parts.push(after);
        }
        branches.push(format!("({})", parts.join(" AND ")));
    }
    w.push(&format!("({})", branches.join(" OR ")));
    Ok(())
}

/// `SET` clause for an update, in field order.
pub fn compile_set(w: &mut SqlWriter, model: &ModelDef, data: &UpdateData) -> Result<()> {
    let mut assignments = Vec::with_capacity(data.0.len());
    for (field, update) in &data.0 {
        let def = model.require_field(field)?;
        let col = quote_ident(field);
        let assignment = match update {
            FieldUpdate::Set(v) => format!("{} = {}", col, w.bind(v.clone())),
            FieldUpdate::Increment(v)
            | FieldUpdate::Decrement(v)
            | FieldUpdate::Multiply(v)
            | FieldUpdate::Divide(v) => {
                if !def.ty.is_numeric() {
                    return Err(FeedbaseError::Validation(format!(
                        "Atomic number operations require a numeric field, `{}.{}` is {:?}",
                        model.name, field, def.ty
                    )));
                }
                let op = match update {
                    FieldUpdate::Increment(_) => "+",
                    FieldUpdate::Decrement(_) => "-",
                    FieldUpdate::Multiply(_) => "*",
                    _ => "/",
                };
                format!("{} = {} {} {}", col, col, op, w.bind(v.clone()))
            }
        };
        assignments.push(assignment);
    }
    w.push(&assignments.join(", "));
    Ok(())
}

/// Maximum bound parameters per statement.
pub const MAX_PARAMS: usize = 999;

/// Rows an `UPDATE` or `DELETE` applies to.
#[derive(Debug, Clone, Copy)]
pub enum RowTarget<'f> {
    /// The row with this primary key
    Id(&'f Value),
    /// Every row matching the filter (all rows for `None`)
    Matching(Option<&'f Filter>),
}

fn target_clause(w: &mut SqlWriter, model: &ModelDef, target: RowTarget<'_>) -> Result<()> {
    let id = model.id_field().name;
    match target {
        RowTarget::Id(value) => {
            let p = w.bind(value.clone());
            w.push(&format!(" WHERE {} = {}", quote_ident(id), p));
        }
        RowTarget::Matching(None) => {}
        RowTarget::Matching(Some(filter)) => {
            let alias = w.alias();
            w.push(&format!(
                " WHERE {} IN (SELECT {} FROM {} AS {} WHERE ",
                quote_ident(id),
                column(&alias, id),
                quote_ident(model.name),
                quote_ident(&alias)
            ));
            compile_filter(w, model, &alias, filter, FilterContext::Where)?;
            w.push(")");
        }
    }
    Ok(())
}

/// Multi-row `INSERT` of complete rows in field order. Duplicates are
/// silently skipped with `skip_duplicates`.
pub fn compile_insert(model: &ModelDef, rows: &[Vec<Value>], skip_duplicates: bool) -> Statement {
    let mut w = SqlWriter::new();
    let columns: Vec<String> = model.fields.iter().map(|f| quote_ident(f.name)).collect();
    w.push(&format!(
        "INSERT {}INTO {} ({}) VALUES ",
        if skip_duplicates { "OR IGNORE " } else { "" },
        quote_ident(model.name),
        columns.join(", ")
    ));
    for (i, row) in rows.iter().enumerate() {
        if i > 0 {
            w.push(", ");
        }
        let placeholders: Vec<String> = row.iter().map(|v| w.bind(v.clone())).collect();
        w.push(&format!("({})", placeholders.join(", ")));
    }
    w.finish()
}

pub fn compile_update(model: &ModelDef, data: &UpdateData, target: RowTarget<'_>) -> Result<Statement> {
    let mut w = SqlWriter::new();
    w.push(&format!("UPDATE {} SET ", quote_ident(model.name)));
    compile_set(&mut w, model, data)?;
    target_clause(&mut w, model, target)?;
    Ok(w.finish())
}

pub fn compile_delete(model: &ModelDef, target: RowTarget<'_>) -> Result<Statement> {
    let mut w = SqlWriter::new();
    w.push(&format!("DELETE FROM {}", quote_ident(model.name)));
    target_clause(&mut w, model, target)?;
    Ok(w.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::args::Filter;

    fn model(name: &str) -> &'static ModelDef {
        schema().model(name).unwrap()
    }

    fn where_sql(model_name: &str, filter: &Filter) -> Statement {
        let mut w = SqlWriter::new();
        let alias = w.alias();
        compile_filter(&mut w, model(model_name), &alias, filter, FilterContext::Where).unwrap();
        w.finish()
    }

    #[test]
    fn test_equality_and_null_checks() {
        let stmt = where_sql(
            "User",
            &Filter::and(vec![
                Filter::field("email").equals("a@example.com"),
                Filter::field("image").is_null(),
            ]),
        );
        assert_eq!(stmt.sql, r#"("t0"."email" = ?1 AND "t0"."image" IS NULL)"#);
        assert_eq!(stmt.params, vec![Value::from("a@example.com")]);
    }

    #[test]
    fn test_empty_combinators() {
        assert_eq!(where_sql("User", &Filter::and(vec![])).sql, "1=1");
        assert_eq!(where_sql("User", &Filter::or(vec![])).sql, "1=0");
        let empty_in = Filter::field("email").in_list(Vec::<String>::new());
        assert_eq!(where_sql("User", &empty_in).sql, "1=0");
    }

    #[test]
    fn test_insensitive_contains_escapes_wildcards() {
        let stmt = where_sql("Feedback", &Filter::field("message").insensitive().contains("100%_sure"));
        insta::assert_snapshot!(stmt.sql, @r#""t0"."message" LIKE ?1 ESCAPE '\'"#);
        assert_eq!(stmt.params, vec![Value::from("%100\\%\\_sure%")]);
    }

    #[test]
    fn test_ends_with_reuses_placeholder() {
        let stmt = where_sql("User", &Filter::field("email").ends_with("@example.com"));
        assert_eq!(stmt.sql, r#"substr("t0"."email", -length(?1)) = ?1"#);
        assert_eq!(stmt.params.len(), 1);
    }

    #[test]
    fn test_some_relation_filter_is_correlated() {
        let stmt = where_sql(
            "Project",
            &Filter::some("feedback", Filter::field("status").equals("OPEN")),
        );
        assert_eq!(
            stmt.sql,
            r#"EXISTS (SELECT 1 FROM "Feedback" AS "t1" WHERE "t1"."projectId" = "t0"."id" AND ("t1"."status" = ?1))"#
        );
    }

    #[test]
    fn test_every_relation_filter_treats_null_as_mismatch() {
        let stmt = where_sql(
            "Project",
            &Filter::every("feedback", Filter::field("votes").gt(0)),
        );
        assert!(stmt.sql.starts_with("NOT EXISTS"));
        assert!(stmt.sql.ends_with(r#"("t1"."votes" > ?1) IS NOT 1)"#));
    }

    #[test]
    fn test_wrong_relation_operator_is_rejected() {
        let mut w = SqlWriter::new();
        let err = compile_filter(
            &mut w,
            model("Session"),
            "t0",
            &Filter::some("user", Filter::all()),
            FilterContext::Where,
        )
        .unwrap_err();
        assert!(matches!(err, FeedbaseError::Validation(_)));
    }

    #[test]
    fn test_aggregate_filter_only_in_having() {
        let filter = Filter::Aggregate {
            func: AggregateFn::Avg,
            field: "votes".to_string(),
            condition: Condition::Gt(Value::Int(2)),
        };
        let mut w = SqlWriter::new();
        assert!(compile_filter(&mut w, model("Feedback"), "t0", &filter, FilterContext::Where).is_err());

        let mut w = SqlWriter::new();
        compile_filter(&mut w, model("Feedback"), "t0", &filter, FilterContext::Having).unwrap();
        assert_eq!(w.sql, r#"AVG("t0"."votes") > ?1"#);
    }

    #[test]
    fn test_avg_on_text_field_is_rejected() {
        assert!(aggregate_expr(model("Feedback"), AggregateFn::Avg, "title", "t0").is_err());
        assert_eq!(
            aggregate_expr(model("Feedback"), AggregateFn::Count, "_all", "t0").unwrap(),
            "COUNT(*)"
        );
    }

    #[test]
    fn test_order_by_relation_count() {
        let clause = compile_order_by(
            model("Project"),
            "t0",
            &[OrderBy::relation_count("feedback", Direction::Desc)],
            false,
        )
        .unwrap();
        assert_eq!(
            clause,
            r#" ORDER BY (SELECT COUNT(*) FROM "Feedback" AS "t0_c" WHERE "t0_c"."projectId" = "t0"."id") DESC"#
        );
    }

    #[test]
    fn test_limit_clause_variants() {
        let mut w = SqlWriter::new();
        limit_clause(&mut w, Some(10), Some(5));
        assert_eq!(w.sql, " LIMIT 10 OFFSET 5");

        let mut w = SqlWriter::new();
        limit_clause(&mut w, None, Some(3));
        assert_eq!(w.sql, " LIMIT -1 OFFSET 3");
    }

    #[test]
    fn test_increment_requires_numeric_field() {
        let mut w = SqlWriter::new();
        compile_set(&mut w, model("Feedback"), &UpdateData::new().increment("votes", 1)).unwrap();
        assert_eq!(w.sql, r#""votes" = "votes" + ?1"#);

        let mut w = SqlWriter::new();
        assert!(compile_set(&mut w, model("Feedback"), &UpdateData::new().increment("title", 1)).is_err());
    }

    #[test]
    fn test_update_many_targets_matching_ids() {
        let filter = Filter::field("status").equals("OPEN");
        let stmt = compile_update(
            model("Feedback"),
            &UpdateData::new().set("status", "CLOSED"),
            RowTarget::Matching(Some(&filter)),
        )
        .unwrap();
        assert_eq!(
            stmt.sql,
            r#"UPDATE "Feedback" SET "status" = ?1 WHERE "id" IN (SELECT "t0"."id" FROM "Feedback" AS "t0" WHERE "t0"."status" = ?2)"#
        );
        assert_eq!(stmt.params, vec![Value::from("CLOSED"), Value::from("OPEN")]);
    }

    #[test]
    fn test_insert_or_ignore() {
        let verification = model("Verification");
        let row: Vec<Value> = verification.fields.iter().map(|_| Value::from("x")).collect();
        let stmt = compile_insert(verification, &[row.clone(), row], true);
        assert!(stmt.sql.starts_with(r#"INSERT OR IGNORE INTO "Verification" ("id", "identifier""#));
        assert_eq!(stmt.params.len(), verification.fields.len() * 2);
    }

    #[test]
    fn test_cursor_predicate_desc_with_nulls_last() {
        let mut w = SqlWriter::new();
        let order = vec![OrderBy::desc("title"), OrderBy::asc("id")];
        cursor_predicate(
            &mut w,
            model("Feedback"),
            "t0",
            &order,
            &[Value::from("m"), Value::from("c1")],
        )
        .unwrap();
        assert_eq!(
            w.sql,
            r#"((("t0"."title" < ?1 OR "t0"."title" IS NULL)) OR ("t0"."title" IS ?2 AND "t0"."id" > ?3) OR ("t0"."title" IS ?4 AND "t0"."id" IS ?5))"#
        );
    }
}
