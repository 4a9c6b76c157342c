/// Per-model delegate: the typed face of the engine.
///
/// Results are deserialized into the model struct `M`. A `select` that drops
/// required fields will not fit `M`; use the `*_as` variants with a
/// projection type for those.
use super::models::Model;
use super::{Client, Queryable};
use crate::core::{FeedbaseError, Result};
use crate::engine::{Engine, Record};
use crate::query::{
    AggregateArgs, CountArgs, CreateArgs, CreateManyArgs, DeleteManyArgs, FindManyArgs,
    FindUniqueArgs, GroupByArgs, UpdateArgs, UpdateManyArgs, UpsertArgs,
};
use crate::schema::{schema, ModelDef};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::marker::PhantomData;

pub struct Delegate<'q, M, Q = Client> {
    client: &'q Q,
    model: PhantomData<fn() -> M>,
}

fn decode<T: DeserializeOwned>(record: Record) -> Result<T> {
    Ok(serde_json::from_value(JsonValue::Object(record))?)
}

fn decode_all<T: DeserializeOwned>(records: Vec<Record>) -> Result<Vec<T>> {
    records.into_iter().map(decode).collect()
}

impl<'q, M: Model, Q: Queryable> Delegate<'q, M, Q> {
    pub(crate) fn new(client: &'q Q) -> Self {
        Delegate {
            client,
            model: PhantomData,
        }
    }

    /// Registry definition of the delegate's model.
    pub fn model(&self) -> Result<&'static ModelDef> {
        schema().model(M::NAME)
    }

    fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Engine<'_>, &ModelDef) -> Result<T>,
    {
        let model = self.model()?;
        self.client.with_engine(|engine| f(engine, model))
    }

    pub fn find_unique(&self, args: impl Into<FindUniqueArgs>) -> Result<Option<M>> {
        self.find_unique_as(args)
    }

    pub fn find_unique_as<T: DeserializeOwned>(&self, args: impl Into<FindUniqueArgs>) -> Result<Option<T>> {
        let args = args.into();
        self.run(|engine, model| engine.find_unique(model, &args))?
            .map(decode)
            .transpose()
    }

    /// Like `find_unique`, but a missing record is a `P2025` error.
    pub fn find_unique_or_throw(&self, args: impl Into<FindUniqueArgs>) -> Result<M> {
        let args = args.into();
        decode(self.run(|engine, model| engine.find_unique_or_throw(model, &args))?)
    }

    pub fn find_first(&self, args: FindManyArgs) -> Result<Option<M>> {
        self.find_first_as(args)
    }

    pub fn find_first_as<T: DeserializeOwned>(&self, args: FindManyArgs) -> Result<Option<T>> {
        self.run(|engine, model| engine.find_first(model, &args))?
            .map(decode)
            .transpose()
    }

    pub fn find_first_or_throw(&self, args: FindManyArgs) -> Result<M> {
        decode(self.run(|engine, model| engine.find_first_or_throw(model, &args))?)
    }

    pub fn find_many(&self, args: FindManyArgs) -> Result<Vec<M>> {
        self.find_many_as(args)
    }

    pub fn find_many_as<T: DeserializeOwned>(&self, args: FindManyArgs) -> Result<Vec<T>> {
        decode_all(self.run(|engine, model| engine.find_many(model, &args))?)
    }

    pub fn create(&self, args: impl Into<CreateArgs>) -> Result<M> {
        self.create_as(args)
    }

    pub fn create_as<T: DeserializeOwned>(&self, args: impl Into<CreateArgs>) -> Result<T> {
        let args = args.into();
        decode(self.run(|engine, model| engine.create(model, &args))?)
    }

    /// Inserts every row and returns how many were written.
    pub fn create_many(&self, args: impl Into<CreateManyArgs>) -> Result<u64> {
        let args = args.into();
        self.run(|engine, model| engine.create_many(model, &args))
    }

    pub fn update(&self, args: UpdateArgs) -> Result<M> {
        self.update_as(args)
    }

    pub fn update_as<T: DeserializeOwned>(&self, args: UpdateArgs) -> Result<T> {
        decode(self.run(|engine, model| engine.update(model, &args))?)
    }

    pub fn update_many(&self, args: UpdateManyArgs) -> Result<u64> {
        self.run(|engine, model| engine.update_many(model, &args))
    }

    pub fn upsert(&self, args: UpsertArgs) -> Result<M> {
        self.upsert_as(args)
    }

    pub fn upsert_as<T: DeserializeOwned>(&self, args: UpsertArgs) -> Result<T> {
        decode(self.run(|engine, model| engine.upsert(model, &args))?)
    }

    /// Deletes one record and returns it as it was.
    pub fn delete(&self, args: impl Into<FindUniqueArgs>) -> Result<M> {
        let args = args.into();
        decode(self.run(|engine, model| engine.delete(model, &args))?)
    }

    pub fn delete_many(&self, args: DeleteManyArgs) -> Result<u64> {
        self.run(|engine, model| engine.delete_many(model, &args))
    }

    /// Number of matching rows. Any `select` on `args` is ignored; see
    /// `count_fields`.
    pub fn count(&self, mut args: CountArgs) -> Result<u64> {
        args.select = None;
        let value = self.run(|engine, model| engine.count(model, &args))?;
        value
            .as_u64()
            .ok_or_else(|| FeedbaseError::Query(format!("Expected a row count, got {}", value)))
    }

    /// Non-null counts of the given fields (`_all` counts rows).
    pub fn count_fields(&self, args: CountArgs, fields: &[&str]) -> Result<BTreeMap<String, u64>> {
        let args = CountArgs {
            select: Some(fields.iter().map(|f| f.to_string()).collect()),
            ..args
        };
        let value = self.run(|engine, model| engine.count(model, &args))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Aggregates shaped as `{"_count": {...}, "_avg": {...}, ...}`.
    pub fn aggregate(&self, args: AggregateArgs) -> Result<JsonValue> {
        self.run(|engine, model| engine.aggregate(model, &args))
    }

    pub fn aggregate_as<T: DeserializeOwned>(&self, args: AggregateArgs) -> Result<T> {
        Ok(serde_json::from_value(self.aggregate(args)?)?)
    }

    /// One record per group: the `by` fields plus requested aggregates.
    pub fn group_by(&self, args: GroupByArgs) -> Result<Vec<Record>> {
        self.run(|engine, model| engine.group_by(model, &args))
    }

    pub fn group_by_as<T: DeserializeOwned>(&self, args: GroupByArgs) -> Result<Vec<T>> {
        decode_all(self.group_by(args)?)
    }
}
