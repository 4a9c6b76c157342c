/// Read operations and relation loading.
///
/// Rows are fetched with every scalar column so relation keys are always
/// available, relations and `_count` are attached, and only then is the
/// record projected down to the requested selection.
use super::{distinct_records, read_record, window_in_memory, Engine, Record, Window};
use crate::core::{FeedbaseError, Result};
use crate::query::compile::{column, quote_ident, scalar_columns, SqlWriter};
use crate::query::{ensure_unique_filter, Filter, FindManyArgs, FindUniqueArgs, Selection};
use crate::schema::{schema, ModelDef, RelationDef};
use crate::value::Value;
use serde_json::{Map, Value as JsonValue};
use std::collections::HashMap;
use tracing::debug;

/// Keys per `IN (...)` list when loading relations.
const IN_CHUNK: usize = 900;

impl<'a> Engine<'a> {
    pub fn find_unique(&self, model: &ModelDef, args: &FindUniqueArgs) -> Result<Option<Record>> {
        ensure_unique_filter(model, &args.filter)?;
        validate_selection(model, &args.selection)?;
        let window = Window {
            filter: Some(&args.filter),
            order_by: &[],
            cursor: None,
            skip: None,
            take: Some(1),
        };
        Ok(self.fetch(model, &window, &[], &args.selection)?.into_iter().next())
    }

    pub fn find_unique_or_throw(&self, model: &ModelDef, args: &FindUniqueArgs) -> Result<Record> {
        self.find_unique(model, args)?
            .ok_or_else(|| FeedbaseError::not_found(model.name, "Expected a record, found none."))
    }

    pub fn find_first(&self, model: &ModelDef, args: &FindManyArgs) -> Result<Option<Record>> {
        let take = match args.take {
            Some(t) if t < 0 => -1,
            _ => 1,
        };
        let first = FindManyArgs {
            take: Some(take),
            ..args.clone()
        };
        Ok(self.find_many(model, &first)?.into_iter().next())
    }

    pub fn find_first_or_throw(&self, model: &ModelDef, args: &FindManyArgs) -> Result<Record> {
        self.find_first(model, args)?
            .ok_or_else(|| FeedbaseError::not_found(model.name, "Expected a record, found none."))
    }

    pub fn find_many(&self, model: &ModelDef, args: &FindManyArgs) -> Result<Vec<Record>> {
        validate_selection(model, &args.selection)?;
        for field in &args.distinct {
            model.require_field(field)?;
        }
        let window = Window {
            filter: args.filter.as_ref(),
            order_by: &args.order_by,
            cursor: args.cursor.as_ref(),
            skip: args.skip,
            take: args.take,
        };
        self.fetch(model, &window, &args.distinct, &args.selection)
    }

    /// Loads one page of records with their relations, projected to
    /// `selection`.
    pub(crate) fn fetch(
        &self,
        model: &ModelDef,
        window: &Window<'_>,
        distinct: &[String],
        selection: &Selection,
    ) -> Result<Vec<Record>> {
        // distinct windows in memory after de-duplication
        let paginate = distinct.is_empty();
        let page = match self.page_statement(model, window, paginate, |root| scalar_columns(model, root))? {
            Some(page) => page,
            None => {
                debug!(model = model.name, "Cursor matched no row");
                return Ok(Vec::new());
            }
        };
        let mut rows = self
            .exec
            .query_map(&page.statement, |row| read_record(model, row))?;
        if !paginate {
            rows = distinct_records(rows, distinct);
            rows = window_in_memory(rows, window.skip, window.take.map(i64::abs));
        }
        if page.reversed {
            rows.reverse();
        }
        self.attach(model, &mut rows, selection)?;
        Ok(rows
            .into_iter()
            .map(|r| project(r, selection))
            .collect())
    }

    /// Loads every relation and `_count` named in `selection` onto `rows`.
    fn attach(&self, model: &ModelDef, rows: &mut [Record], selection: &Selection) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        for (name, nested) in &selection.relations {
            let relation = model.require_relation(name)?;
            self.load_relation(model, relation, nested, rows)?;
        }
        if !selection.counts.is_empty() {
            self.load_counts(model, rows, &selection.counts)?;
        }
        Ok(())
    }

    fn load_relation(
        &self,
        model: &ModelDef,
        relation: &RelationDef,
        nested: &FindManyArgs,
        rows: &mut [Record],
    ) -> Result<()> {
        let target = schema().model(relation.target)?;
        let (local, remote) = single_join(model, relation)?;

        let keys = distinct_keys(rows, local);
        let mut related: Vec<Record> = Vec::new();
        for chunk in keys.chunks(IN_CHUNK) {
            let membership = Filter::field(remote).in_list(chunk.iter().map(Value::from_json));
            let filter = match &nested.filter {
                Some(f) => membership.and_also(f.clone()),
                None => membership,
            };
            let window = Window {
                filter: Some(&filter),
                order_by: &nested.order_by,
                cursor: None,
                skip: None,
                take: None,
            };
            if let Some(page) = self.page_statement(target, &window, false, |root| scalar_columns(target, root))? {
                related.extend(self.exec.query_map(&page.statement, |row| read_record(target, row))?);
            }
        }
        debug!(
            model = model.name,
            relation = relation.name,
            parents = rows.len(),
            rows = related.len(),
            "Loaded relation"
        );
        // one query per relation per level, shared by every parent
        self.attach(target, &mut related, &nested.selection)?;

        let mut groups: HashMap<String, Vec<Record>> = HashMap::new();
        for record in related {
            let key = record.get(remote).map(|v| v.to_string()).unwrap_or_default();
            groups.entry(key).or_default().push(record);
        }

        for row in rows.iter_mut() {
            let key = row.get(local).filter(|v| !v.is_null()).map(|v| v.to_string());
            let mut children = key.and_then(|k| groups.get(&k).cloned()).unwrap_or_default();
            if relation.is_list() {
                children = distinct_records(children, &nested.distinct);
                children = window_in_memory(children, nested.skip, nested.take);
            }
            let projected: Vec<JsonValue> = children
                .into_iter()
                .map(|c| JsonValue::Object(project(c, &nested.selection)))
                .collect();
            let value = if relation.is_list() {
                JsonValue::Array(projected)
            } else {
                projected.into_iter().next().unwrap_or(JsonValue::Null)
            };
            row.insert(relation.name.to_string(), value);
        }
        Ok(())
    }

    fn load_counts(&self, model: &ModelDef, rows: &mut [Record], relations: &[String]) -> Result<()> {
        let mut counts: Vec<Map<String, JsonValue>> = vec![Map::new(); rows.len()];
        for name in relations {
            let relation = model.require_relation(name)?;
            let target = schema().model(relation.target)?;
            let (local, remote) = single_join(model, relation)?;

            let mut totals: HashMap<String, i64> = HashMap::new();
            for chunk in distinct_keys(rows, local).chunks(IN_CHUNK) {
                let mut w = SqlWriter::new();
                let root = w.alias();
                let placeholders: Vec<String> =
                    chunk.iter().map(|k| w.bind(Value::from_json(k))).collect();
                let col = column(&root, remote);
                w.push(&format!(
                    "SELECT {}, COUNT(*) FROM {} AS {} WHERE {} IN ({}) GROUP BY {}",
                    col,
                    quote_ident(target.name),
                    quote_ident(&root),
                    col,
                    placeholders.join(", "),
                    col
                ));
                let pairs = self.exec.query_map(&w.finish(), |row| {
                    Ok((crate::value::decode_any(row.get_ref(0)?).to_string(), row.get::<_, i64>(1)?))
                })?;
                totals.extend(pairs);
            }

            for (row, count) in rows.iter().zip(counts.iter_mut()) {
                let n = row
                    .get(local)
                    .and_then(|k| totals.get(&k.to_string()))
                    .copied()
                    .unwrap_or(0);
                count.insert(name.clone(), JsonValue::from(n));
            }
        }
        for (row, count) in rows.iter_mut().zip(counts) {
            row.insert("_count".to_string(), JsonValue::Object(count));
        }
        Ok(())
    }

    /// Re-reads a single record by primary key with the given selection.
    pub(crate) fn reload(&self, model: &ModelDef, id: &Value, selection: &Selection) -> Result<Record> {
        let filter = Filter::field(model.id_field().name).equals(id.clone());
        let window = Window {
            filter: Some(&filter),
            order_by: &[],
            cursor: None,
            skip: None,
            take: Some(1),
        };
        self.fetch(model, &window, &[], selection)?
            .into_iter()
            .next()
            .ok_or_else(|| FeedbaseError::not_found(model.name, "Expected a record, found none."))
    }
}

/// Join columns of a relation; every relation in the registry joins on a
/// single column.
fn single_join(model: &ModelDef, relation: &RelationDef) -> Result<(&'static str, &'static str)> {
    let join = model.join_columns(relation)?;
    match (join.local, join.remote) {
        ([local], [remote]) => Ok((*local, *remote)),
        _ => Err(FeedbaseError::Schema(format!(
            "Relation `{}.{}` joins on more than one column",
            model.name, relation.name
        ))),
    }
}

/// Distinct non-null values of `field` across `rows`, in first-seen order.
fn distinct_keys(rows: &[Record], field: &str) -> Vec<JsonValue> {
    let mut seen = std::collections::HashSet::new();
    rows.iter()
        .filter_map(|r| r.get(field))
        .filter(|v| !v.is_null())
        .filter(|v| seen.insert(v.to_string()))
        .cloned()
        .collect()
}

/// Drops scalar fields that `selection` does not ask for.
pub(crate) fn project(mut record: Record, selection: &Selection) -> Record {
    if let Some(fields) = &selection.fields {
        record.retain(|key, _| {
            key == "_count" || selection.relations.contains_key(key) || fields.iter().any(|f| f == key)
        });
    }
    record
}

/// Checks that every field and relation in a selection exists, recursively.
pub(crate) fn validate_selection(model: &ModelDef, selection: &Selection) -> Result<()> {
    if let Some(fields) = &selection.fields {
        for field in fields {
            model.require_field(field)?;
        }
    }
    for (name, nested) in &selection.relations {
        let relation = model.require_relation(name)?;
        let target = schema().model(relation.target)?;
        if nested.cursor.is_some() {
            return Err(FeedbaseError::Validation(format!(
                "`cursor` is not supported on nested relation `{}.{}`",
                model.name, name
            )));
        }
        if !relation.is_list() && (nested.skip.is_some() || nested.take.is_some() || !nested.order_by.is_empty()) {
            return Err(FeedbaseError::Validation(format!(
                "Relation `{}.{}` is a single record and takes no pagination or ordering",
                model.name, name
            )));
        }
        for field in &nested.distinct {
            target.require_field(field)?;
        }
        validate_selection(target, &nested.selection)?;
    }
    for name in &selection.counts {
        let relation = model.require_relation(name)?;
        if !relation.is_list() {
            return Err(FeedbaseError::Validation(format!(
                "`_count` requires a list relation, `{}.{}` is not one",
                model.name, name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Selection};
    use crate::test_utils::{ids, DatabaseFixture};
    use serde_json::json;

    fn feedback() -> &'static ModelDef {
        schema().model("Feedback").unwrap()
    }

    #[test]
    fn test_find_many_filters_and_orders() {
        let fixture = DatabaseFixture::with_sample_data("read_order").unwrap();
        let args = FindManyArgs::new()
            .filter(Filter::field("status").equals("OPEN"))
            .order_by(OrderBy::desc("votes"));
        let rows = fixture.engine().find_many(feedback(), &args).unwrap();
        assert_eq!(ids(&rows), vec!["f2", "f1", "f6"]);
        assert_eq!(rows[1]["metadata"], json!({"browser": "firefox"}));
    }

    #[test]
    fn test_skip_and_negative_take() {
        let fixture = DatabaseFixture::with_sample_data("read_take").unwrap();
        let engine = fixture.engine();
        let order = OrderBy::asc("createdAt");

        let page = FindManyArgs::new().order_by(order.clone()).skip(1).take(2);
        assert_eq!(ids(&engine.find_many(feedback(), &page).unwrap()), vec!["f2", "f3"]);

        let tail = FindManyArgs::new().order_by(order).take(-2);
        assert_eq!(ids(&engine.find_many(feedback(), &tail).unwrap()), vec!["f5", "f6"]);
    }

    #[test]
    fn test_cursor_includes_cursor_row() {
        let fixture = DatabaseFixture::with_sample_data("read_cursor").unwrap();
        let engine = fixture.engine();
        let args = FindManyArgs::new()
            .order_by(OrderBy::asc("createdAt"))
            .cursor(Filter::field("id").equals("f3"))
            .take(2);
        assert_eq!(ids(&engine.find_many(feedback(), &args).unwrap()), vec!["f3", "f4"]);

        let backwards = FindManyArgs::new()
            .order_by(OrderBy::asc("createdAt"))
            .cursor(Filter::field("id").equals("f3"))
            .skip(1)
            .take(-2);
        assert_eq!(ids(&engine.find_many(feedback(), &backwards).unwrap()), vec!["f1", "f2"]);

        let missing = FindManyArgs::new().cursor(Filter::field("id").equals("nope"));
        assert!(engine.find_many(feedback(), &missing).unwrap().is_empty());
    }

    #[test]
    fn test_cursor_over_nullable_column() {
        let fixture = DatabaseFixture::with_sample_data("read_cursor_null").unwrap();
        let args = FindManyArgs::new()
            .order_by(OrderBy::asc("title"))
            .cursor(Filter::field("id").equals("f3"));
        // f3 has no title and sorts first
        let rows = fixture.engine().find_many(feedback(), &args).unwrap();
        assert_eq!(rows.len(), 6);
        assert_eq!(ids(&rows)[0], "f3");
    }

    #[test]
    fn test_distinct_keeps_first_per_key() {
        let fixture = DatabaseFixture::with_sample_data("read_distinct").unwrap();
        let args = FindManyArgs::new()
            .order_by(OrderBy::desc("votes"))
            .distinct(&["projectId"]);
        let rows = fixture.engine().find_many(feedback(), &args).unwrap();
        assert_eq!(ids(&rows), vec!["f2", "f4", "f6"]);
    }

    #[test]
    fn test_find_unique_requires_unique_key() {
        let fixture = DatabaseFixture::with_sample_data("read_unique").unwrap();
        let engine = fixture.engine();
        let project = schema().model("Project").unwrap();

        let compound = FindUniqueArgs::new(Filter::and(vec![
            Filter::field("organizationId").equals("o1"),
            Filter::field("slug").equals("mobile"),
        ]));
        let found = engine.find_unique(project, &compound).unwrap().unwrap();
        assert_eq!(found["id"], json!("p2"));

        let partial = FindUniqueArgs::new(Filter::field("slug").equals("mobile"));
        assert!(matches!(
            engine.find_unique(project, &partial),
            Err(FeedbaseError::Validation(_))
        ));
    }

    #[test]
    fn test_or_throw_variants_use_not_found_code() {
        let fixture = DatabaseFixture::with_sample_data("read_throw").unwrap();
        let engine = fixture.engine();
        let err = engine
            .find_unique_or_throw(feedback(), &FindUniqueArgs::new(Filter::field("id").equals("zzz")))
            .unwrap_err();
        assert_eq!(err.code(), Some("P2025"));

        let err = engine
            .find_first_or_throw(feedback(), &FindManyArgs::new().filter(Filter::field("votes").gt(100)))
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_include_nested_relations_with_pagination() {
        let fixture = DatabaseFixture::with_sample_data("read_include").unwrap();
        let organization = schema().model("Organization").unwrap();
        let projects = FindManyArgs::new()
            .order_by(OrderBy::asc("slug"))
            .include_with(
                "feedback",
                FindManyArgs::new().order_by(OrderBy::desc("votes")).take(1),
            );
        let args = FindManyArgs::new()
            .order_by(OrderBy::asc("slug"))
            .include_with("projects", projects);
        let rows = fixture.engine().find_many(organization, &args).unwrap();

        assert_eq!(ids(&rows), vec!["o1", "o2"]);
        let acme_projects = rows[0]["projects"].as_array().unwrap();
        assert_eq!(acme_projects.len(), 2);
        assert_eq!(acme_projects[0]["slug"], json!("mobile"));
        assert_eq!(acme_projects[0]["feedback"][0]["id"], json!("f4"));
        assert_eq!(acme_projects[1]["feedback"][0]["id"], json!("f2"));
        assert_eq!(rows[1]["projects"][0]["feedback"][0]["id"], json!("f6"));
    }

    #[test]
    fn test_to_one_include_and_select_projection() {
        let fixture = DatabaseFixture::with_sample_data("read_select").unwrap();
        let args = FindManyArgs::new()
            .filter(Filter::field("id").equals("f4"))
            .select(&["title"])
            .include("project");
        let rows = fixture.engine().find_many(feedback(), &args).unwrap();
        let record = &rows[0];
        assert_eq!(record.len(), 2);
        assert_eq!(record["title"], json!("Faster sync"));
        assert_eq!(record["project"]["slug"], json!("mobile"));
    }

    #[test]
    fn test_relation_counts() {
        let fixture = DatabaseFixture::with_sample_data("read_counts").unwrap();
        let organization = schema().model("Organization").unwrap();
        let args = FindManyArgs::new()
            .order_by(OrderBy::asc("slug"))
            .count("projects")
            .count("webhooks");
        let rows = fixture.engine().find_many(organization, &args).unwrap();
        assert_eq!(rows[0]["_count"], json!({"projects": 2, "webhooks": 2}));
        assert_eq!(rows[1]["_count"], json!({"projects": 1, "webhooks": 0}));
    }

    #[test]
    fn test_order_by_relation_count() {
        let fixture = DatabaseFixture::with_sample_data("read_order_count").unwrap();
        let project = schema().model("Project").unwrap();
        let args = FindManyArgs::new().order_by(OrderBy::relation_count(
            "feedback",
            crate::query::Direction::Desc,
        ));
        let rows = fixture.engine().find_many(project, &args).unwrap();
        assert_eq!(ids(&rows), vec!["p1", "p2", "p3"]);
    }

    #[test]
    fn test_relation_filters() {
        let fixture = DatabaseFixture::with_sample_data("read_relation_filter").unwrap();
        let engine = fixture.engine();
        let project = schema().model("Project").unwrap();

        let every_open = FindManyArgs::new().filter(Filter::every(
            "feedback",
            Filter::field("status").equals("OPEN"),
        ));
        assert_eq!(ids(&engine.find_many(project, &every_open).unwrap()), vec!["p3"]);

        let no_bugs = FindManyArgs::new()
            .filter(Filter::none("feedback", Filter::field("type").equals("BUG")))
            .order_by(OrderBy::asc("id"));
        assert_eq!(ids(&engine.find_many(project, &no_bugs).unwrap()), vec!["p2"]);

        let in_globex = FindManyArgs::new().filter(Filter::is(
            "project",
            Filter::is("organization", Filter::field("slug").equals("globex")),
        ));
        assert_eq!(ids(&engine.find_many(feedback(), &in_globex).unwrap()), vec!["f6"]);
    }

    #[test]
    fn test_insensitive_contains_escapes_wildcards() {
        let fixture = DatabaseFixture::with_sample_data("read_like").unwrap();
        let engine = fixture.engine();
        let literal = FindManyArgs::new().filter(Filter::field("message").insensitive().contains("50%_OFF"));
        assert_eq!(ids(&engine.find_many(feedback(), &literal).unwrap()), vec!["f3"]);

        let wildcard = FindManyArgs::new().filter(Filter::field("message").insensitive().contains("%"));
        assert_eq!(ids(&engine.find_many(feedback(), &wildcard).unwrap()), vec!["f3"]);

        let sensitive = FindManyArgs::new().filter(Filter::field("title").contains("dark"));
        assert!(engine.find_many(feedback(), &sensitive).unwrap().is_empty());
    }

    #[test]
    fn test_validate_selection_rejects_nested_cursor() {
        let mut selection = Selection::default();
        selection.relations.insert(
            "feedback".to_string(),
            FindManyArgs::new().cursor(Filter::field("id").equals("f1")),
        );
        let project = schema().model("Project").unwrap();
        assert!(matches!(
            validate_selection(project, &selection),
            Err(FeedbaseError::Validation(_))
        ));
    }
}
