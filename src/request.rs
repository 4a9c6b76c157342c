/// JSON Request Protocol Module
///
/// A request names a model, an action and its JSON arguments:
///
/// ```json
/// {"model": "Feedback", "action": "findMany", "args": {"where": {"status": "OPEN"}}}
/// {"action": "queryRaw", "args": {"query": "SELECT 1 AS one", "parameters": []}}
/// ```
///
/// `dispatch` parses the arguments against the schema registry, runs the
/// action on an engine and renders the result as JSON. The CLI, the REPL
/// and `Client::batch` all go through here.
use crate::core::{FeedbaseError, Result};
use crate::engine::{Engine, Record};
use crate::query::{parse, Statement};
use crate::raw;
use crate::schema::{schema, ModelDef};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    FindUnique,
    FindUniqueOrThrow,
    FindFirst,
    FindFirstOrThrow,
    FindMany,
    Create,
    CreateMany,
    Update,
    UpdateMany,
    Upsert,
    Delete,
    DeleteMany,
    Count,
    Aggregate,
    GroupBy,
    QueryRaw,
    ExecuteRaw,
}

impl Action {
    pub const ALL: [Action; 17] = [
        Action::FindUnique,
        Action::FindUniqueOrThrow,
        Action::FindFirst,
        Action::FindFirstOrThrow,
        Action::FindMany,
        Action::Create,
        Action::CreateMany,
        Action::Update,
        Action::UpdateMany,
        Action::Upsert,
        Action::Delete,
        Action::DeleteMany,
        Action::Count,
        Action::Aggregate,
        Action::GroupBy,
        Action::QueryRaw,
        Action::ExecuteRaw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::FindUnique => "findUnique",
            Action::FindUniqueOrThrow => "findUniqueOrThrow",
            Action::FindFirst => "findFirst",
            Action::FindFirstOrThrow => "findFirstOrThrow",
            Action::FindMany => "findMany",
            Action::Create => "create",
            Action::CreateMany => "createMany",
            Action::Update => "update",
            Action::UpdateMany => "updateMany",
            Action::Upsert => "upsert",
            Action::Delete => "delete",
            Action::DeleteMany => "deleteMany",
            Action::Count => "count",
            Action::Aggregate => "aggregate",
            Action::GroupBy => "groupBy",
            Action::QueryRaw => "queryRaw",
            Action::ExecuteRaw => "executeRaw",
        }
    }

    /// Raw actions run without a model.
    pub fn is_raw(&self) -> bool {
        matches!(self, Action::QueryRaw | Action::ExecuteRaw)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = FeedbaseError;

    fn from_str(s: &str) -> Result<Self> {
        Action::ALL
            .iter()
            .find(|a| a.as_str() == s)
            .copied()
            .ok_or_else(|| {
                FeedbaseError::Validation(format!(
                    "Unknown action `{}`. Expected one of: {}",
                    s,
                    Action::ALL.iter().map(|a| a.as_str()).collect::<Vec<_>>().join(", ")
                ))
            })
    }
}

/// One request of the JSON protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub action: Action,
    #[serde(default)]
    pub args: JsonValue,
}

impl JsonRequest {
    pub fn new(model: Option<&str>, action: Action, args: JsonValue) -> Self {
        JsonRequest {
            model: model.map(String::from),
            action,
            args,
        }
    }

    fn model(&self) -> Result<&'static ModelDef> {
        match &self.model {
            Some(name) => schema().model_by_delegate(name),
            None => Err(FeedbaseError::Validation(format!(
                "Action `{}` requires a model",
                self.action
            ))),
        }
    }
}

/// `{"query": "...", "parameters": [...]}` as a statement.
fn raw_statement(args: &JsonValue) -> Result<Statement> {
    let sql = args
        .get("query")
        .and_then(JsonValue::as_str)
        .ok_or_else(|| FeedbaseError::Validation("Raw actions require a `query` string".to_string()))?;
    let params = match args.get("parameters") {
        None | Some(JsonValue::Null) => Vec::new(),
        Some(JsonValue::Array(items)) => items.iter().map(Value::from_json).collect(),
        Some(other) => {
            return Err(FeedbaseError::Validation(format!(
                "`parameters` must be an array, got {}",
                other
            )))
        }
    };
    Ok(Statement {
        sql: sql.to_string(),
        params,
    })
}

fn records(rows: Vec<Record>) -> JsonValue {
    JsonValue::Array(rows.into_iter().map(JsonValue::Object).collect())
}

fn optional(record: Option<Record>) -> JsonValue {
    record.map(JsonValue::Object).unwrap_or(JsonValue::Null)
}

fn dispatch_raw(engine: &Engine<'_>, request: &JsonRequest) -> Result<JsonValue> {
    if request.model.is_some() {
        return Err(FeedbaseError::Validation(format!(
            "Action `{}` does not take a model",
            request.action
        )));
    }
    let stmt = raw_statement(&request.args)?;
    let exec = engine.executor();
    if request.action == Action::QueryRaw {
        let result = raw::query_raw(&exec, &stmt)?;
        Ok(JsonValue::Array(result.rows.into_iter().map(JsonValue::Object).collect()))
    } else {
        Ok(JsonValue::from(raw::execute_raw(&exec, &stmt)?))
    }
}

/// Runs one request and renders its result.
pub fn dispatch(engine: &Engine<'_>, request: &JsonRequest) -> Result<JsonValue> {
    debug!(model = ?request.model, action = %request.action, "Dispatching request");
    if request.action.is_raw() {
        return dispatch_raw(engine, request);
    }
    let args = &request.args;
    let model = request.model()?;
    Ok(match request.action {
        Action::FindUnique => optional(engine.find_unique(model, &parse::find_unique(model, args)?)?),
        Action::FindUniqueOrThrow => {
            JsonValue::Object(engine.find_unique_or_throw(model, &parse::find_unique(model, args)?)?)
        }
        Action::FindFirst => optional(engine.find_first(model, &parse::find_many(model, args)?)?),
        Action::FindFirstOrThrow => {
            JsonValue::Object(engine.find_first_or_throw(model, &parse::find_many(model, args)?)?)
        }
        Action::FindMany => records(engine.find_many(model, &parse::find_many(model, args)?)?),
        Action::Create => JsonValue::Object(engine.create(model, &parse::create(model, args)?)?),
        Action::CreateMany => json!({ "count": engine.create_many(model, &parse::create_many(model, args)?)? }),
        Action::Update => JsonValue::Object(engine.update(model, &parse::update(model, args)?)?),
        Action::UpdateMany => json!({ "count": engine.update_many(model, &parse::update_many(model, args)?)? }),
        Action::Upsert => JsonValue::Object(engine.upsert(model, &parse::upsert(model, args)?)?),
        Action::Delete => JsonValue::Object(engine.delete(model, &parse::delete(model, args)?)?),
        Action::DeleteMany => json!({ "count": engine.delete_many(model, &parse::delete_many(model, args)?)? }),
        Action::Count => engine.count(model, &parse::count(model, args)?)?,
        Action::Aggregate => engine.aggregate(model, &parse::aggregate(model, args)?)?,
        Action::GroupBy => records(engine.group_by(model, &parse::group_by(model, args)?)?),
        Action::QueryRaw | Action::ExecuteRaw => dispatch_raw(engine, request)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::DatabaseFixture;

    fn run(fixture: &DatabaseFixture, request: JsonValue) -> Result<JsonValue> {
        let request: JsonRequest = serde_json::from_value(request)?;
        dispatch(&fixture.engine(), &request)
    }

    #[test]
    fn test_action_names_round_trip() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>().unwrap(), action);
            assert_eq!(
                serde_json::to_value(action).unwrap(),
                JsonValue::String(action.as_str().to_string())
            );
        }
        assert!("findAll".parse::<Action>().is_err());
    }

    #[test]
    fn test_find_many_request() {
        let fixture = DatabaseFixture::with_sample_data("request_find").unwrap();
        let result = run(
            &fixture,
            json!({
                "model": "feedback",
                "action": "findMany",
                "args": {
                    "where": {"project": {"is": {"slug": "mobile"}}},
                    "orderBy": {"votes": "desc"},
                    "select": {"id": true, "votes": true}
                }
            }),
        )
        .unwrap();
        assert_eq!(result, json!([{"id": "f4", "votes": 7}, {"id": "f5", "votes": 0}]));
    }

    #[test]
    fn test_write_requests_return_counts() {
        let fixture = DatabaseFixture::with_sample_data("request_write").unwrap();
        let result = run(
            &fixture,
            json!({
                "model": "Webhook",
                "action": "updateMany",
                "args": {"where": {"enabled": false}, "data": {"enabled": true}}
            }),
        )
        .unwrap();
        assert_eq!(result, json!({"count": 1}));
    }

    #[test]
    fn test_group_by_request() {
        let fixture = DatabaseFixture::with_sample_data("request_group").unwrap();
        let result = run(
            &fixture,
            json!({
                "model": "Feedback",
                "action": "groupBy",
                "args": {"by": ["type"], "_count": {"_all": true}, "where": {"type": "BUG"}}
            }),
        )
        .unwrap();
        assert_eq!(result, json!([{"type": "BUG", "_count": {"_all": 3}}]));
    }

    #[test]
    fn test_raw_requests() {
        let fixture = DatabaseFixture::with_sample_data("request_raw").unwrap();
        let rows = run(
            &fixture,
            json!({
                "action": "queryRaw",
                "args": {"query": "SELECT \"email\" FROM \"User\" WHERE \"locale\" = ?1", "parameters": ["ES"]}
            }),
        )
        .unwrap();
        assert_eq!(rows, json!([{"email": "bob@example.com"}]));

        let affected = run(
            &fixture,
            json!({
                "action": "executeRaw",
                "args": {"query": "DELETE FROM \"Session\""}
            }),
        )
        .unwrap();
        assert_eq!(affected, json!(1));
    }

    #[test]
    fn test_model_required_for_model_actions() {
        let fixture = DatabaseFixture::new("request_no_model").unwrap();
        let err = run(&fixture, json!({"action": "count"})).unwrap_err();
        assert!(matches!(err, FeedbaseError::Validation(_)));

        let err = run(&fixture, json!({"model": "Post", "action": "count"})).unwrap_err();
        assert!(err.to_string().contains("Unknown model"));
    }
}
