/// count, aggregate and groupBy.
///
/// `count` and `aggregate` wrap the paginated page statement in a subquery
/// aliased `agg`, so `orderBy`/`cursor`/`skip`/`take` restrict the set being
/// aggregated exactly as they would restrict a findMany.
use super::{Engine, Record, Window};
use crate::core::{FeedbaseError, Result};
use crate::query::compile::{
    aggregate_expr, column, compile_filter, compile_order_by, limit_clause, quote_ident,
    scalar_columns, FilterContext, SqlWriter, Statement,
};
use crate::query::{AggregateArgs, AggregateFn, CountArgs, Filter, GroupByArgs, OrderBy, OrderTarget};
use crate::schema::ModelDef;
use crate::value::{decode, decode_any};
use rusqlite::Row;
use serde_json::{Map, Value as JsonValue};

const SUBQUERY: &str = "agg";

impl<'a> Engine<'a> {
    /// Number of matching rows. With a field selection, returns an object
    /// of non-null counts per field (`_all` counts rows).
    pub fn count(&self, model: &ModelDef, args: &CountArgs) -> Result<JsonValue> {
        let exprs = match &args.select {
            None => vec!["COUNT(*)".to_string()],
            Some(fields) => fields
                .iter()
                .map(|f| aggregate_expr(model, AggregateFn::Count, f, SUBQUERY))
                .collect::<Result<Vec<_>>>()?,
        };
        let window = Window {
            filter: args.filter.as_ref(),
            order_by: &args.order_by,
            cursor: args.cursor.as_ref(),
            skip: args.skip,
            take: args.take,
        };
        let counts = match self.wrapped(model, &window, &exprs)? {
            Some(stmt) => {
                let n = exprs.len();
                self.exec
                    .query_opt(&stmt, |row| {
                        (0..n).map(|i| row.get::<_, i64>(i)).collect::<rusqlite::Result<Vec<_>>>()
                    })?
                    .unwrap_or_else(|| vec![0; n])
            }
            None => vec![0; exprs.len()],
        };
        Ok(match &args.select {
            None => JsonValue::from(counts.first().copied().unwrap_or(0)),
            Some(fields) => JsonValue::Object(
                fields
                    .iter()
                    .zip(counts)
                    .map(|(f, n)| (f.clone(), JsonValue::from(n)))
                    .collect(),
            ),
        })
    }

    /// Rows matching `filter`, ignoring pagination.
    pub(crate) fn count_matching(&self, model: &ModelDef, filter: Option<&Filter>) -> Result<u64> {
        let mut w = SqlWriter::new();
        let root = w.alias();
        w.push(&format!(
            "SELECT COUNT(*) FROM {} AS {}",
            quote_ident(model.name),
            quote_ident(&root)
        ));
        if let Some(filter) = filter {
            w.push(" WHERE ");
            compile_filter(&mut w, model, &root, filter, FilterContext::Where)?;
        }
        let count = self
            .exec
            .query_opt(&w.finish(), |row| row.get::<_, i64>(0))?
            .unwrap_or(0);
        Ok(count.max(0) as u64)
    }

    /// `_count`/`_avg`/`_sum`/`_min`/`_max` over the selected page, as an
    /// object of objects keyed by field.
    pub fn aggregate(&self, model: &ModelDef, args: &AggregateArgs) -> Result<JsonValue> {
        let pairs = args.aggregates.pairs();
        let exprs = pairs
            .iter()
            .map(|(func, field)| aggregate_expr(model, *func, field, SUBQUERY))
            .collect::<Result<Vec<_>>>()?;
        if exprs.is_empty() {
            return Ok(JsonValue::Object(Map::new()));
        }
        let window = Window {
            filter: args.filter.as_ref(),
            order_by: &args.order_by,
            cursor: args.cursor.as_ref(),
            skip: args.skip,
            take: args.take,
        };
        let result = match self.wrapped(model, &window, &exprs)? {
            Some(stmt) => self
                .exec
                .query_opt(&stmt, |row| aggregate_output(model, &pairs, row, 0))?,
            None => None,
        };
        Ok(JsonValue::Object(result.unwrap_or_else(|| empty_output(&pairs))))
    }

    /// Groups matching rows by `by` and computes aggregates per group.
    pub fn group_by(&self, model: &ModelDef, args: &GroupByArgs) -> Result<Vec<Record>> {
        validate_group_by(model, args)?;
        let pairs = args.aggregates.pairs();

        let mut w = SqlWriter::new();
        let root = w.alias();
        let by_columns: Vec<String> = args.by.iter().map(|f| column(&root, f)).collect();
        let mut select = by_columns.clone();
        for (func, field) in &pairs {
            select.push(aggregate_expr(model, *func, field, &root)?);
        }
        w.push(&format!(
            "SELECT {} FROM {} AS {}",
            select.join(", "),
            quote_ident(model.name),
            quote_ident(&root)
        ));
        if let Some(filter) = &args.filter {
            w.push(" WHERE ");
            compile_filter(&mut w, model, &root, filter, FilterContext::Where)?;
        }
        w.push(&format!(" GROUP BY {}", by_columns.join(", ")));
        if let Some(having) = &args.having {
            w.push(" HAVING ");
            compile_filter(&mut w, model, &root, having, FilterContext::Having)?;
        }

        // the `by` fields make group order deterministic
        let mut order = args.order_by.clone();
        for field in &args.by {
            if !order.iter().any(|o| matches!(&o.target, OrderTarget::Field(f) if f == field)) {
                order.push(OrderBy::asc(field));
            }
        }
        let order_sql = compile_order_by(model, &root, &order, true)?;
        w.push(&order_sql);
        limit_clause(&mut w, args.take.map(|t| t as usize), args.skip);

        let by_defs = args
            .by
            .iter()
            .map(|f| model.require_field(f))
            .collect::<Result<Vec<_>>>()?;
        self.exec.query_map(&w.finish(), |row| {
            let mut record = Map::new();
            for (i, field) in by_defs.iter().enumerate() {
                record.insert(field.name.to_string(), decode(field, row.get_ref(i)?));
            }
            record.extend(aggregate_output(model, &pairs, row, by_defs.len())?);
            Ok(record)
        })
    }

    /// `SELECT exprs FROM (page) AS agg`, or `None` when the cursor row is
    /// missing.
    fn wrapped(&self, model: &ModelDef, window: &Window<'_>, exprs: &[String]) -> Result<Option<Statement>> {
        let page = self.page_statement(model, window, true, |root| scalar_columns(model, root))?;
        Ok(page.map(|page| Statement {
            sql: format!(
                "SELECT {} FROM ({}) AS {}",
                exprs.join(", "),
                page.statement.sql,
                quote_ident(SUBQUERY)
            ),
            params: page.statement.params,
        }))
    }
}

/// Nests aggregate columns starting at `offset` as `{"_sum": {"votes": 18}}`.
fn aggregate_output(
    model: &ModelDef,
    pairs: &[(AggregateFn, &str)],
    row: &Row<'_>,
    offset: usize,
) -> rusqlite::Result<Record> {
    let mut out = Map::new();
    for (i, (func, field)) in pairs.iter().enumerate() {
        let raw = row.get_ref(offset + i)?;
        let value = match (func, model.field(field)) {
            (AggregateFn::Count | AggregateFn::Avg, _) | (_, None) => decode_any(raw),
            (_, Some(def)) => decode(def, raw),
        };
        nest(&mut out, *func, field, value);
    }
    Ok(out)
}

/// Output for an empty set: counts are zero, everything else null.
fn empty_output(pairs: &[(AggregateFn, &str)]) -> Record {
    let mut out = Map::new();
    for (func, field) in pairs {
        let value = if *func == AggregateFn::Count {
            JsonValue::from(0)
        } else {
            JsonValue::Null
        };
        nest(&mut out, *func, field, value);
    }
    out
}

fn nest(out: &mut Record, func: AggregateFn, field: &str, value: JsonValue) {
    if let JsonValue::Object(group) = out
        .entry(func.key().to_string())
        .or_insert_with(|| JsonValue::Object(Map::new()))
    {
        group.insert(field.to_string(), value);
    }
}

fn validate_group_by(model: &ModelDef, args: &GroupByArgs) -> Result<()> {
    if args.by.is_empty() {
        return Err(FeedbaseError::Validation(
            "`by` in groupBy must name at least one field".to_string(),
        ));
    }
    for field in &args.by {
        model.require_field(field)?;
    }
    if matches!(args.take, Some(t) if t < 0) {
        return Err(FeedbaseError::Validation(
            "`take` in groupBy must not be negative".to_string(),
        ));
    }
    if (args.skip.is_some() || args.take.is_some()) && args.order_by.is_empty() {
        return Err(FeedbaseError::Validation(
            "`skip` and `take` in groupBy require an `orderBy`".to_string(),
        ));
    }
    for order in &args.order_by {
        match &order.target {
            OrderTarget::Field(f) if !args.by.contains(f) => {
                return Err(FeedbaseError::Validation(format!(
                    "Every field used for orderBy must be included in the by-arguments of the query, `{}` is not",
                    f
                )))
            }
            OrderTarget::RelationCount(r) => {
                return Err(FeedbaseError::Validation(format!(
                    "Relation `_count` ordering on `{}` is not supported in groupBy",
                    r
                )))
            }
            _ => {}
        }
    }
    if let Some(having) = &args.having {
        check_having_fields(having, &args.by)?;
    }
    Ok(())
}

/// Plain field conditions in `having` may only reference grouped fields.
fn check_having_fields(filter: &Filter, by: &[String]) -> Result<()> {
    match filter {
        Filter::And(list) | Filter::Or(list) => {
            for f in list {
                check_having_fields(f, by)?;
            }
            Ok(())
        }
        Filter::Not(inner) => check_having_fields(inner, by),
        Filter::Field { field, .. } if !by.contains(field) => Err(FeedbaseError::Validation(format!(
            "Field `{}` used in `having` must be included in `by`",
            field
        ))),
        _ => Ok(()),
    }
}
