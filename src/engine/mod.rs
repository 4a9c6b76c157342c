/// Query Engine Module
///
/// Executes typed arguments against a borrowed connection and returns
/// records as JSON objects keyed by field name. The engine holds no state
/// of its own, so the same code serves plain client calls, interactive
/// transactions and batches.
///
/// - `read`: findUnique/findFirst/findMany, relation loading, `_count`
/// - `write`: create, createMany, update, updateMany, upsert, delete, deleteMany
/// - `aggregate`: count, aggregate, groupBy
mod aggregate;
mod read;
mod write;

use crate::config::IdStrategy;
use crate::core::db::QueryExecutor;
use crate::core::{FeedbaseError, Result};
use crate::query::compile::{
    compile_filter, compile_order_by, cursor_predicate, limit_clause, order_expr, quote_ident,
    FilterContext, SqlWriter, Statement,
};
use crate::query::{Filter, NullsOrder, OrderBy, OrderTarget};
use crate::schema::ModelDef;
use crate::value::{decode, Value};
use rusqlite::types::Value as SqlValue;
use rusqlite::Row;
use serde_json::{Map, Value as JsonValue};

/// A record as returned by the engine: field name to JSON value, plus any
/// loaded relations and `_count`.
pub type Record = Map<String, JsonValue>;

#[derive(Clone, Copy)]
pub struct Engine<'a> {
    exec: QueryExecutor<'a>,
    id_strategy: IdStrategy,
}

impl<'a> Engine<'a> {
    pub fn new(exec: QueryExecutor<'a>, id_strategy: IdStrategy) -> Self {
        Engine { exec, id_strategy }
    }

    pub fn executor(&self) -> QueryExecutor<'a> {
        self.exec
    }

    /// Builds and runs the page statement for `window`, selecting the
    /// columns produced by `columns` for the root alias. Returns `None` when
    /// a cursor was given but matches no row.
    ///
    /// With `paginate == false` only filtering, cursor and ordering are
    /// applied; the caller windows the rows itself.
    fn page_statement<F>(
        &self,
        model: &ModelDef,
        window: &Window<'_>,
        paginate: bool,
        columns: F,
    ) -> Result<Option<Page>>
    where
        F: FnOnce(&str) -> String,
    {
        let reversed = window.take.map(|t| t < 0).unwrap_or(false);
        let mut order = effective_order(model, window.order_by);
        if reversed {
            order = order.iter().map(reverse).collect();
        }

        let cursor_values = match window.cursor {
            Some(cursor) => match self.cursor_values(model, cursor, &order)? {
                Some(values) => Some(values),
                None => return Ok(None),
            },
            None => None,
        };

        let mut w = SqlWriter::new();
        let root = w.alias();
        w.push(&format!(
            "SELECT {} FROM {} AS {}",
            columns(&root),
            quote_ident(model.name),
            quote_ident(&root)
        ));
        let mut conditions = 0;
        if let Some(filter) = window.filter {
            w.push(" WHERE ");
            compile_filter(&mut w, model, &root, filter, FilterContext::Where)?;
            conditions += 1;
        }
        if let Some(values) = &cursor_values {
            w.push(if conditions > 0 { " AND " } else { " WHERE " });
            cursor_predicate(&mut w, model, &root, &order, values)?;
        }
        let order_sql = compile_order_by(model, &root, &order, false)?;
        w.push(&order_sql);
        if paginate {
            let take = window.take.map(|t| t.unsigned_abs() as usize);
            limit_clause(&mut w, take, window.skip);
        }
        Ok(Some(Page {
            statement: w.finish(),
            reversed,
        }))
    }

    /// Values of the ordering terms for the row pinned by `cursor`.
    fn cursor_values(
        &self,
        model: &ModelDef,
        cursor: &Filter,
        order: &[OrderBy],
    ) -> Result<Option<Vec<Value>>> {
        let mut w = SqlWriter::new();
        let root = w.alias();
        let exprs = order
            .iter()
            .map(|o| order_expr(model, &root, &o.target, false))
            .collect::<Result<Vec<_>>>()?;
        w.push(&format!(
            "SELECT {} FROM {} AS {} WHERE ",
            exprs.join(", "),
            quote_ident(model.name),
            quote_ident(&root)
        ));
        compile_filter(&mut w, model, &root, cursor, FilterContext::Where)?;
        w.push(" LIMIT 1");
        let n = exprs.len();
        self.exec.query_opt(&w.finish(), |row| {
            (0..n)
                .map(|i| row.get::<_, SqlValue>(i).map(Value::from))
                .collect::<rusqlite::Result<Vec<_>>>()
        })
    }

    /// Primary key of the first row matching `filter`.
    fn find_id(&self, model: &ModelDef, filter: &Filter) -> Result<Option<Value>> {
        let id = model.id_field().name;
        let mut w = SqlWriter::new();
        let root = w.alias();
        w.push(&format!(
            "SELECT {}.{} FROM {} AS {} WHERE ",
            quote_ident(&root),
            quote_ident(id),
            quote_ident(model.name),
            quote_ident(&root)
        ));
        compile_filter(&mut w, model, &root, filter, FilterContext::Where)?;
        w.push(" LIMIT 1");
        self.exec
            .query_opt(&w.finish(), |row| row.get::<_, SqlValue>(0).map(Value::from))
    }
}

/// Filtering, ordering and pagination shared by reads and aggregates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Window<'w> {
    pub filter: Option<&'w Filter>,
    pub order_by: &'w [OrderBy],
    pub cursor: Option<&'w Filter>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
}

pub(crate) struct Page {
    pub statement: Statement,
    /// Rows come back in reverse order and must be flipped
    pub reversed: bool,
}

/// The requested ordering with the primary key appended as a tiebreaker so
/// pagination is deterministic.
pub(crate) fn effective_order(model: &ModelDef, order_by: &[OrderBy]) -> Vec<OrderBy> {
    let id = model.id_field().name;
    let mut order = order_by.to_vec();
    let has_id = order
        .iter()
        .any(|o| matches!(&o.target, OrderTarget::Field(f) if f == id));
    if !has_id {
        order.push(OrderBy::asc(id));
    }
    order
}

fn reverse(order: &OrderBy) -> OrderBy {
    OrderBy {
        target: order.target.clone(),
        direction: order.direction.reversed(),
        nulls: order.nulls.map(|n| match n {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        }),
    }
}

/// Decodes the scalar columns of `model`, selected in field order.
pub(crate) fn read_record(model: &ModelDef, row: &Row<'_>) -> rusqlite::Result<Record> {
    let mut record = Map::with_capacity(model.fields.len());
    for (i, field) in model.fields.iter().enumerate() {
        record.insert(field.name.to_string(), decode(field, row.get_ref(i)?));
    }
    Ok(record)
}

/// Applies skip/take to rows already in order. A negative `take` counts
/// from the end.
pub(crate) fn window_in_memory<T>(mut rows: Vec<T>, skip: Option<usize>, take: Option<i64>) -> Vec<T> {
    let skip = skip.unwrap_or(0);
    match take {
        Some(t) if t < 0 => {
            rows.reverse();
            let mut out: Vec<T> = rows.into_iter().skip(skip).take(t.unsigned_abs() as usize).collect();
            out.reverse();
            out
        }
        Some(t) => rows.into_iter().skip(skip).take(t as usize).collect(),
        None => rows.into_iter().skip(skip).collect(),
    }
}

/// Keeps the first record for every distinct combination of `fields`.
pub(crate) fn distinct_records(rows: Vec<Record>, fields: &[String]) -> Vec<Record> {
    if fields.is_empty() {
        return rows;
    }
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|r| {
            let key: Vec<String> = fields
                .iter()
                .map(|f| r.get(f).map(|v| v.to_string()).unwrap_or_default())
                .collect();
            seen.insert(key)
        })
        .collect()
}

pub(crate) fn record_id(model: &ModelDef, record: &Record) -> Result<Value> {
    let id = model.id_field().name;
    record
        .get(id)
        .map(Value::from_json)
        .ok_or_else(|| FeedbaseError::Query(format!("`{}` record is missing its id", model.name)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Direction;
    use crate::schema::schema;

    #[test]
    fn test_effective_order_appends_id_once() {
        let feedback = schema().model("Feedback").unwrap();
        let order = effective_order(feedback, &[OrderBy::desc("votes")]);
        assert_eq!(order, vec![OrderBy::desc("votes"), OrderBy::asc("id")]);

        let explicit = effective_order(feedback, &[OrderBy::desc("id")]);
        assert_eq!(explicit, vec![OrderBy::desc("id")]);
    }

    #[test]
    fn test_reverse_flips_nulls() {
        let order = OrderBy::asc("title").nulls(NullsOrder::First);
        let reversed = reverse(&order);
        assert_eq!(reversed.direction, Direction::Desc);
        assert_eq!(reversed.nulls, Some(NullsOrder::Last));
    }

    #[test]
    fn test_window_in_memory_negative_take() {
        let rows = vec![1, 2, 3, 4, 5];
        assert_eq!(window_in_memory(rows.clone(), Some(1), Some(2)), vec![2, 3]);
        assert_eq!(window_in_memory(rows.clone(), None, Some(-2)), vec![4, 5]);
        assert_eq!(window_in_memory(rows, Some(1), Some(-2)), vec![3, 4]);
    }

    #[test]
    fn test_distinct_keeps_first() {
        let rows: Vec<Record> = [("a", "x"), ("b", "x"), ("c", "y")]
            .iter()
            .map(|(id, k)| {
                let mut r = Map::new();
                r.insert("id".into(), JsonValue::from(*id));
                r.insert("k".into(), JsonValue::from(*k));
                r
            })
            .collect();
        let out = distinct_records(rows, &["k".to_string()]);
        assert_eq!(crate::test_utils::ids(&out), vec!["a", "c"]);
    }
}
