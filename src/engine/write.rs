/// Write operations.
///
/// Single-record writes locate their row by unique filter first, so a
/// missing row is reported as `P2025` rather than as zero affected rows,
/// and return the record re-read with the requested selection.
use super::read::validate_selection;
use super::{Engine, Record};
use crate::core::{FeedbaseError, Result};
use crate::ids;
use crate::query::compile::{compile_delete, compile_insert, compile_update, RowTarget, MAX_PARAMS};
use crate::query::{
    ensure_unique_filter, CreateArgs, CreateManyArgs, Data, DeleteManyArgs, FieldUpdate,
    FindUniqueArgs, Selection, UpdateArgs, UpdateData, UpdateManyArgs, UpsertArgs,
};
use crate::schema::{DefaultValue, FieldDef, ModelDef, ScalarType};
use crate::value::{self, Value};
use chrono::{DateTime, Utc};
use tracing::{debug, warn};

impl<'a> Engine<'a> {
    pub fn create(&self, model: &ModelDef, args: &CreateArgs) -> Result<Record> {
        self.create_record(model, &args.data, &args.selection)
    }

    fn create_record(&self, model: &ModelDef, data: &Data, selection: &Selection) -> Result<Record> {
        validate_selection(model, selection)?;
        let row = self.build_row(model, data)?;
        let id_index = model.fields.iter().position(|f| f.is_id).unwrap_or(0);
        let id = row[id_index].clone();
        self.exec.execute(&compile_insert(model, &[row], false))?;
        self.reload(model, &id, selection)
    }

    /// Inserts every row and returns how many were written. With
    /// `skip_duplicates`, rows violating a unique key are skipped.
    pub fn create_many(&self, model: &ModelDef, args: &CreateManyArgs) -> Result<u64> {
        let rows = args
            .data
            .iter()
            .map(|d| self.build_row(model, d))
            .collect::<Result<Vec<_>>>()?;
        if rows.is_empty() {
            return Ok(0);
        }
        let per_statement = (MAX_PARAMS / model.fields.len()).max(1);
        if rows.len() <= per_statement {
            let count = self.exec.execute(&compile_insert(model, &rows, args.skip_duplicates))?;
            return Ok(count as u64);
        }

        // several statements must still succeed or fail together
        let conn = self.exec.connection();
        conn.execute_batch("SAVEPOINT feedbase_create_many")?;
        let mut count = 0u64;
        for chunk in rows.chunks(per_statement) {
            match self.exec.execute(&compile_insert(model, chunk, args.skip_duplicates)) {
                Ok(n) => count += n as u64,
                Err(e) => {
                    if let Err(rollback) = conn.execute_batch(
                        "ROLLBACK TO feedbase_create_many; RELEASE feedbase_create_many",
                    ) {
                        warn!(model = model.name, error = %rollback, "Rolling back chunked insert failed");
                    }
                    return Err(e);
                }
            }
        }
        conn.execute_batch("RELEASE feedbase_create_many")?;
        debug!(model = model.name, rows = count, "Inserted in chunks");
        Ok(count)
    }

    pub fn update(&self, model: &ModelDef, args: &UpdateArgs) -> Result<Record> {
        ensure_unique_filter(model, &args.filter)?;
        validate_selection(model, &args.selection)?;
        let id = self
            .find_id(model, &args.filter)?
            .ok_or_else(|| FeedbaseError::not_found(model.name, "Record to update not found."))?;
        self.update_by_id(model, &id, &args.data, &args.selection)
    }

    fn update_by_id(
        &self,
        model: &ModelDef,
        id: &Value,
        data: &UpdateData,
        selection: &Selection,
    ) -> Result<Record> {
        let prepared = prepare_update(model, data, value::now())?;
        if !prepared.0.is_empty() {
            self.exec
                .execute(&compile_update(model, &prepared, RowTarget::Id(id))?)?;
        }
        let current = prepared
            .assigned(model.id_field().name)
            .cloned()
            .unwrap_or_else(|| id.clone());
        self.reload(model, &current, selection)
    }

    /// Applies `data` to every matching row and returns how many changed.
    pub fn update_many(&self, model: &ModelDef, args: &UpdateManyArgs) -> Result<u64> {
        let prepared = prepare_update(model, &args.data, value::now())?;
        if prepared.0.is_empty() {
            return self.count_matching(model, args.filter.as_ref());
        }
        let stmt = compile_update(model, &prepared, RowTarget::Matching(args.filter.as_ref()))?;
        Ok(self.exec.execute(&stmt)? as u64)
    }

    pub fn upsert(&self, model: &ModelDef, args: &UpsertArgs) -> Result<Record> {
        ensure_unique_filter(model, &args.filter)?;
        validate_selection(model, &args.selection)?;
        match self.find_id(model, &args.filter)? {
            Some(id) => self.update_by_id(model, &id, &args.update, &args.selection),
            None => self.create_record(model, &args.create, &args.selection),
        }
    }

    /// Deletes one row and returns it as it was before deletion.
    pub fn delete(&self, model: &ModelDef, args: &FindUniqueArgs) -> Result<Record> {
        ensure_unique_filter(model, &args.filter)?;
        validate_selection(model, &args.selection)?;
        let id = self
            .find_id(model, &args.filter)?
            .ok_or_else(|| FeedbaseError::not_found(model.name, "Record to delete does not exist."))?;
        let record = self.reload(model, &id, &args.selection)?;
        self.exec.execute(&compile_delete(model, RowTarget::Id(&id))?)?;
        Ok(record)
    }

    pub fn delete_many(&self, model: &ModelDef, args: &DeleteManyArgs) -> Result<u64> {
        let stmt = compile_delete(model, RowTarget::Matching(args.filter.as_ref()))?;
        Ok(self.exec.execute(&stmt)? as u64)
    }

    /// A complete row in field order: provided values checked against their
    /// fields, defaults filled in for the rest.
    fn build_row(&self, model: &ModelDef, data: &Data) -> Result<Vec<Value>> {
        for key in data.0.keys() {
            model.require_field(key)?;
        }
        let now = value::now();
        model
            .fields
            .iter()
            .map(|field| match data.get(field.name) {
                Some(v) => checked(model, field, v.clone()),
                None => self.default_value(model, field, now),
            })
            .collect()
    }

    fn default_value(&self, model: &ModelDef, field: &FieldDef, now: DateTime<Utc>) -> Result<Value> {
        Ok(match field.default {
            Some(DefaultValue::Id) => Value::Text(ids::generate(self.id_strategy)),
            Some(DefaultValue::Now) => Value::DateTime(now),
            Some(DefaultValue::Bool(b)) => Value::Bool(b),
            Some(DefaultValue::Int(i)) => Value::Int(i),
            Some(DefaultValue::Enum(e)) => Value::Text(e.to_string()),
            None if field.nullable => Value::Null,
            None => {
                return Err(FeedbaseError::Validation(format!(
                    "Argument `{}` is missing in `{}` create data",
                    field.name, model.name
                )))
            }
        })
    }
}

fn checked(model: &ModelDef, field: &FieldDef, value: Value) -> Result<Value> {
    if value.conforms_to(field) {
        Ok(value.normalize(field))
    } else {
        Err(FeedbaseError::Validation(format!(
            "Invalid value for argument `{}` on model `{}`: {:?} does not fit {:?}{}",
            field.name,
            model.name,
            value,
            field.ty,
            if field.nullable { "?" } else { "" }
        )))
    }
}

/// Atomic number operations need a numeric field and an operand of the
/// field's type, so `Int` columns never receive a float.
fn number_operand(model: &ModelDef, field: &FieldDef, value: &Value) -> Result<Value> {
    let numeric_field = matches!(field.ty, ScalarType::Int | ScalarType::Float);
    if !numeric_field || !matches!(value, Value::Int(_) | Value::Float(_)) {
        return Err(FeedbaseError::Validation(format!(
            "Atomic number operations on `{}.{}` take a number of the field's type, got {:?}",
            model.name, field.name, value
        )));
    }
    checked(model, field, value.clone())
}

/// Checks every assignment and adds the `updatedAt` refresh. An update
/// without any assignment stays empty.
fn prepare_update(model: &ModelDef, data: &UpdateData, now: DateTime<Utc>) -> Result<UpdateData> {
    let mut prepared = UpdateData::new();
    for (name, update) in &data.0 {
        let field = model.require_field(name)?;
        let update = match update {
            FieldUpdate::Set(v) => FieldUpdate::Set(checked(model, field, v.clone())?),
            FieldUpdate::Increment(v) => FieldUpdate::Increment(number_operand(model, field, v)?),
            FieldUpdate::Decrement(v) => FieldUpdate::Decrement(number_operand(model, field, v)?),
            FieldUpdate::Multiply(v) => FieldUpdate::Multiply(number_operand(model, field, v)?),
            FieldUpdate::Divide(v) => FieldUpdate::Divide(number_operand(model, field, v)?),
        };
        prepared.0.insert(name.clone(), update);
    }
    if !prepared.0.is_empty() {
        for field in model.fields.iter().filter(|f| f.updated_at) {
            prepared
                .0
                .entry(field.name.to_string())
                .or_insert(FieldUpdate::Set(Value::DateTime(now)));
        }
    }
    Ok(prepared)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{Filter, FindManyArgs};
    use crate::schema::schema;
    use crate::test_utils::DatabaseFixture;
    use serde_json::json;

    fn model(name: &str) -> &'static ModelDef {
        schema().model(name).unwrap()
    }

    #[test]
    fn test_create_fills_defaults() {
        let fixture = DatabaseFixture::with_sample_data("write_create").unwrap();
        let data = Data::new()
            .set("projectId", "p1")
            .set("type", "BUG")
            .set("message", "Broken button");
        let record = fixture.engine().create(model("Feedback"), &CreateArgs::new(data)).unwrap();

        assert_eq!(record["id"].as_str().unwrap().len(), 25);
        assert_eq!(record["status"], json!("OPEN"));
        assert_eq!(record["priority"], json!("MEDIUM"));
        assert_eq!(record["votes"], json!(0));
        assert_eq!(record["title"], json!(null));
        assert_eq!(record["createdAt"], record["updatedAt"]);
    }

    #[test]
    fn test_create_rejects_missing_and_invalid_values() {
        let fixture = DatabaseFixture::new("write_invalid").unwrap();
        let engine = fixture.engine();
        let missing = Data::new().set("name", "Acme");
        let err = engine.create(model("Organization"), &CreateArgs::new(missing)).unwrap_err();
        assert!(err.to_string().contains("slug"));

        let bad_enum = Data::new()
            .set("name", "Acme")
            .set("slug", "acme")
            .set("apiKey", "k")
            .set("plan", "GOLD");
        assert!(matches!(
            engine.create(model("Organization"), &CreateArgs::new(bad_enum)),
            Err(FeedbaseError::Validation(_))
        ));
    }

    #[test]
    fn test_constraint_violations_are_classified() {
        let fixture = DatabaseFixture::with_sample_data("write_constraints").unwrap();
        let engine = fixture.engine();

        let duplicate = Data::new().set("name", "Alice 2").set("email", "alice@example.com");
        let err = engine.create(model("User"), &CreateArgs::new(duplicate)).unwrap_err();
        assert_eq!(err.code(), Some("P2002"));
        match err {
            FeedbaseError::KnownRequest { meta, .. } => assert_eq!(meta["target"], json!(["email"])),
            other => panic!("Expected KnownRequest, got {:?}", other),
        }

        let orphan = Data::new()
            .set("projectId", "missing")
            .set("type", "BUG")
            .set("message", "x");
        let err = engine.create(model("Feedback"), &CreateArgs::new(orphan)).unwrap_err();
        assert_eq!(err.code(), Some("P2003"));
    }

    #[test]
    fn test_create_many_skips_duplicates() {
        let fixture = DatabaseFixture::with_sample_data("write_create_many").unwrap();
        let args = CreateManyArgs {
            data: vec![
                Data::new().set("identifier", "a@b.c").set("token", "t1").set("expiresAt", value::now()),
                Data::new().set("identifier", "a@b.c").set("token", "t1").set("expiresAt", value::now()),
                Data::new().set("identifier", "a@b.c").set("token", "t2").set("expiresAt", value::now()),
            ],
            skip_duplicates: true,
        };
        let count = fixture.engine().create_many(model("Verification"), &args).unwrap();
        assert_eq!(count, 2);
        assert_eq!(fixture.count_rows("Verification"), 2);
    }

    #[test]
    fn test_create_many_chunks_large_inputs() {
        let fixture = DatabaseFixture::with_sample_data("write_chunks").unwrap();
        let data = (0..250)
            .map(|i| {
                Data::new()
                    .set("projectId", "p3")
                    .set("type", "OTHER")
                    .set("message", format!("bulk {}", i))
            })
            .collect();
        let args = CreateManyArgs {
            data,
            skip_duplicates: false,
        };
        assert_eq!(fixture.engine().create_many(model("Feedback"), &args).unwrap(), 250);
        assert_eq!(fixture.count_rows("Feedback"), 256);
    }

    #[test]
    fn test_chunked_create_many_failure_keeps_insert_error() {
        let fixture = DatabaseFixture::with_sample_data("write_chunks_fail").unwrap();
        let mut data: Vec<Data> = (0..250)
            .map(|i| {
                Data::new()
                    .set("projectId", "p3")
                    .set("type", "OTHER")
                    .set("message", format!("bulk {}", i))
            })
            .collect();
        // collides with a sample row in the last chunk
        data.push(
            Data::new()
                .set("id", "f1")
                .set("projectId", "p3")
                .set("type", "OTHER")
                .set("message", "dup"),
        );
        let args = CreateManyArgs {
            data,
            skip_duplicates: false,
        };

        let err = fixture.engine().create_many(model("Feedback"), &args).unwrap_err();
        assert_eq!(err.code(), Some("P2002"));
        assert_eq!(fixture.count_rows("Feedback"), 6);
        assert!(fixture.connection.is_autocommit());
    }

    #[test]
    fn test_update_applies_arithmetic_and_refreshes_updated_at() {
        let fixture = DatabaseFixture::with_sample_data("write_update").unwrap();
        let args = UpdateArgs::new(
            Filter::field("id").equals("f1"),
            UpdateData::new().increment("votes", 2).set("status", "IN_PROGRESS"),
        );
        let record = fixture.engine().update(model("Feedback"), &args).unwrap();
        assert_eq!(record["votes"], json!(7));
        assert_eq!(record["status"], json!("IN_PROGRESS"));
        assert_ne!(record["updatedAt"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(record["createdAt"], json!("2024-01-01T00:00:00.000Z"));
    }

    #[test]
    fn test_atomic_operand_must_match_field_type() {
        let fixture = DatabaseFixture::with_sample_data("write_operand").unwrap();
        let engine = fixture.engine();
        let update = |data: UpdateData| {
            engine.update(model("Feedback"), &UpdateArgs::new(Filter::field("id").equals("f1"), data))
        };

        let float = update(UpdateData::new().increment("votes", 1.5)).unwrap_err();
        assert!(matches!(float, FeedbaseError::Validation(_)));
        assert!(matches!(
            update(UpdateData::new().multiply("votes", Value::Null)),
            Err(FeedbaseError::Validation(_))
        ));
        assert!(matches!(
            update(UpdateData::new().increment("message", 1)),
            Err(FeedbaseError::Validation(_))
        ));

        let kind: String = fixture
            .connection
            .query_row(r#"SELECT typeof("votes") FROM "Feedback" WHERE "id" = 'f1'"#, [], |row| row.get(0))
            .unwrap();
        assert_eq!(kind, "integer");
        assert_eq!(update(UpdateData::new().decrement("votes", 1)).unwrap()["votes"], json!(4));
    }

    #[test]
    fn test_update_missing_record() {
        let fixture = DatabaseFixture::with_sample_data("write_update_missing").unwrap();
        let args = UpdateArgs::new(
            Filter::field("id").equals("nope"),
            UpdateData::new().set("votes", 1),
        );
        let err = fixture.engine().update(model("Feedback"), &args).unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Record to update not found."));
    }

    #[test]
    fn test_update_many_and_delete_many_return_counts() {
        let fixture = DatabaseFixture::with_sample_data("write_many").unwrap();
        let engine = fixture.engine();
        let feedback = model("Feedback");

        let closed = engine
            .update_many(
                feedback,
                &UpdateManyArgs {
                    filter: Some(Filter::field("status").equals("OPEN")),
                    data: UpdateData::new().set("status", "CLOSED"),
                },
            )
            .unwrap();
        assert_eq!(closed, 3);

        let deleted = engine
            .delete_many(
                feedback,
                &DeleteManyArgs {
                    filter: Some(Filter::field("status").equals("CLOSED")),
                },
            )
            .unwrap();
        assert_eq!(deleted, 4);
        assert_eq!(fixture.count_rows("Feedback"), 2);
    }

    #[test]
    fn test_upsert_creates_then_updates() {
        let fixture = DatabaseFixture::with_sample_data("write_upsert").unwrap();
        let engine = fixture.engine();
        let member = model("OrganizationMember");
        let key = Filter::and(vec![
            Filter::field("userId").equals("u3"),
            Filter::field("organizationId").equals("o1"),
        ]);
        let args = UpsertArgs::new(
            key.clone(),
            Data::new().set("userId", "u3").set("organizationId", "o1"),
            UpdateData::new().set("role", "ADMIN"),
        );

        let created = engine.upsert(member, &args).unwrap();
        assert_eq!(created["role"], json!("MEMBER"));
        let updated = engine.upsert(member, &args).unwrap();
        assert_eq!(updated["role"], json!("ADMIN"));
        assert_eq!(updated["id"], created["id"]);
    }

    #[test]
    fn test_delete_returns_record_and_cascades() {
        let fixture = DatabaseFixture::with_sample_data("write_delete").unwrap();
        let engine = fixture.engine();
        let args = FindUniqueArgs::new(Filter::field("slug").equals("acme")).include("projects");
        let deleted = engine.delete(model("Organization"), &args).unwrap();

        assert_eq!(deleted["id"], json!("o1"));
        assert_eq!(deleted["projects"].as_array().unwrap().len(), 2);
        assert_eq!(fixture.count_rows("Project"), 1);
        assert_eq!(fixture.count_rows("Feedback"), 1);
        let remaining = engine.find_many(model("Webhook"), &FindManyArgs::new()).unwrap();
        assert!(remaining.is_empty());

        let err = engine.delete(model("Organization"), &args).unwrap_err();
        assert!(err.to_string().contains("Record to delete does not exist."));
    }
}
