/// Query Argument Types
///
/// Typed argument shapes for every delegate operation. They can be built
/// fluently in Rust or parsed from the JSON argument shape by
/// [`crate::query::parse`]; the compiler and engine only ever see these.
use crate::value::Value;
use std::collections::BTreeMap;

/// Comparison applied to a single scalar field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    NotEquals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains { value: String, insensitive: bool },
    StartsWith { value: String, insensitive: bool },
    EndsWith { value: String, insensitive: bool },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationOp {
    /// At least one related row matches (list relations)
    Some,
    /// Every related row matches (list relations)
    Every,
    /// No related row matches (list relations)
    None,
    /// The related row matches (single relations)
    Is,
    /// The related row does not match (single relations)
    IsNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    pub fn sql_name(&self) -> &'static str {
        match self {
            AggregateFn::Count => "COUNT",
            AggregateFn::Avg => "AVG",
            AggregateFn::Sum => "SUM",
            AggregateFn::Min => "MIN",
            AggregateFn::Max => "MAX",
        }
    }

    /// Output key, e.g. `_avg`.
    pub fn key(&self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Avg => "_avg",
            AggregateFn::Sum => "_sum",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "_count" => Some(AggregateFn::Count),
            "_avg" => Some(AggregateFn::Avg),
            "_sum" => Some(AggregateFn::Sum),
            "_min" => Some(AggregateFn::Min),
            "_max" => Some(AggregateFn::Max),
            _ => None,
        }
    }
}

/// A `where` tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// All must hold; empty is always true
    And(Vec<Filter>),
    /// One must hold; empty is always false
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field {
        field: String,
        condition: Condition,
    },
    Relation {
        relation: String,
        op: RelationOp,
        filter: Box<Filter>,
    },
    /// Only valid in `having`
    Aggregate {
        func: AggregateFn,
        field: String,
        condition: Condition,
    },
}

impl Filter {
    pub fn field(name: &str) -> FieldFilter {
        FieldFilter {
            field: name.to_string(),
            insensitive: false,
        }
    }

    pub fn all() -> Filter {
        Filter::And(Vec::new())
    }

    pub fn and(filters: Vec<Filter>) -> Filter {
        Filter::And(filters)
    }

    pub fn or(filters: Vec<Filter>) -> Filter {
        Filter::Or(filters)
    }

    pub fn not(filter: Filter) -> Filter {
        Filter::Not(Box::new(filter))
    }

    pub fn some(relation: &str, filter: Filter) -> Filter {
        Filter::relation(relation, RelationOp::Some, filter)
    }

    pub fn every(relation: &str, filter: Filter) -> Filter {
        Filter::relation(relation, RelationOp::Every, filter)
    }

    pub fn none(relation: &str, filter: Filter) -> Filter {
        Filter::relation(relation, RelationOp::None, filter)
    }

    pub fn is(relation: &str, filter: Filter) -> Filter {
        Filter::relation(relation, RelationOp::Is, filter)
    }

    pub fn is_not(relation: &str, filter: Filter) -> Filter {
        Filter::relation(relation, RelationOp::IsNot, filter)
    }

    fn relation(relation: &str, op: RelationOp, filter: Filter) -> Filter {
        Filter::Relation {
            relation: relation.to_string(),
            op,
            filter: Box::new(filter),
        }
    }

    /// Conjunction with another filter, flattening nested `And`s.
    pub fn and_also(self, other: Filter) -> Filter {
        match self {
            Filter::And(mut list) => {
                list.push(other);
                Filter::And(list)
            }
            single => Filter::And(vec![single, other]),
        }
    }

    /// Field names constrained by top-level equality, used to check that a
    /// unique `where` pins a single row.
    pub fn equality_fields(&self) -> Vec<&str> {
        match self {
            Filter::Field {
                field,
                condition: Condition::Equals(v),
            } if !v.is_null() => vec![field.as_str()],
            Filter::And(list) => list.iter().flat_map(|f| f.equality_fields()).collect(),
            _ => Vec::new(),
        }
    }

    /// Value pinned by top-level equality on `field`, if any.
    pub fn equality_value(&self, field: &str) -> Option<&Value> {
        match self {
            Filter::Field {
                field: name,
                condition: Condition::Equals(v),
            } if name == field => Some(v),
            Filter::And(list) => list.iter().find_map(|f| f.equality_value(field)),
            _ => None,
        }
    }
}

/// Builder for conditions on one field.
#[derive(Debug, Clone)]
pub struct FieldFilter {
    field: String,
    insensitive: bool,
}

impl FieldFilter {
    fn build(self, condition: Condition) -> Filter {
        Filter::Field {
            field: self.field,
            condition,
        }
    }

    /// Makes the string conditions that follow case-insensitive.
    pub fn insensitive(mut self) -> Self {
        self.insensitive = true;
        self
    }

    pub fn equals(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Equals(value.into()))
    }

    pub fn not(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::NotEquals(value.into()))
    }

    pub fn is_null(self) -> Filter {
        self.build(Condition::Equals(Value::Null))
    }

    pub fn is_not_null(self) -> Filter {
        self.build(Condition::NotEquals(Value::Null))
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.build(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.build(Condition::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Lt(value.into()))
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Lte(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Gt(value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Gte(value.into()))
    }

    pub fn contains(self, value: &str) -> Filter {
        let insensitive = self.insensitive;
        self.build(Condition::Contains {
            value: value.to_string(),
            insensitive,
        })
    }

    pub fn starts_with(self, value: &str) -> Filter {
        let insensitive = self.insensitive;
        self.build(Condition::StartsWith {
            value: value.to_string(),
            insensitive,
        })
    }

    pub fn ends_with(self, value: &str) -> Filter {
        let insensitive = self.insensitive;
        self.build(Condition::EndsWith {
            value: value.to_string(),
            insensitive,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    pub fn reversed(&self) -> Direction {
        match self {
            Direction::Asc => Direction::Desc,
            Direction::Desc => Direction::Asc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullsOrder {
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderTarget {
    Field(String),
    /// Number of related rows in a list relation
    RelationCount(String),
    /// Aggregate of a field, only valid in `groupBy`
    Aggregate(AggregateFn, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub target: OrderTarget,
    pub direction: Direction,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: &str) -> Self {
        OrderBy {
            target: OrderTarget::Field(field.to_string()),
            direction: Direction::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: &str) -> Self {
        OrderBy {
            target: OrderTarget::Field(field.to_string()),
            direction: Direction::Desc,
            nulls: None,
        }
    }

    pub fn relation_count(relation: &str, direction: Direction) -> Self {
        OrderBy {
            target: OrderTarget::RelationCount(relation.to_string()),
            direction,
            nulls: None,
        }
    }

    pub fn nulls(mut self, nulls: NullsOrder) -> Self {
        self.nulls = Some(nulls);
        self
    }
}

/// Which fields and relations a read returns.
///
/// `fields == None` returns every scalar field (the `include` form);
/// `Some(list)` returns only the listed scalars (the `select` form).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    pub fields: Option<Vec<String>>,
    pub relations: BTreeMap<String, FindManyArgs>,
    pub counts: Vec<String>,
}

impl Selection {
    pub fn is_default(&self) -> bool {
        self.fields.is_none() && self.relations.is_empty() && self.counts.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindManyArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Filter>,
    pub skip: Option<usize>,
    /// Negative values take from the end of the ordered set
    pub take: Option<i64>,
    pub distinct: Vec<String>,
    pub selection: Selection,
}

impl FindManyArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    pub fn cursor(mut self, cursor: Filter) -> Self {
        self.cursor = Some(cursor);
        self
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = Some(skip);
        self
    }

    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    pub fn distinct(mut self, fields: &[&str]) -> Self {
        self.distinct = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Restricts the returned scalars to `fields`.
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.selection.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn include(mut self, relation: &str) -> Self {
        self.selection
            .relations
            .insert(relation.to_string(), FindManyArgs::default());
        self
    }

    pub fn include_with(mut self, relation: &str, args: FindManyArgs) -> Self {
        self.selection.relations.insert(relation.to_string(), args);
        self
    }

    /// Adds `_count` of the given list relation to every record.
    pub fn count(mut self, relation: &str) -> Self {
        self.selection.counts.push(relation.to_string());
        self
    }
}

/// Arguments for operations addressing exactly one row by a unique key.
#[derive(Debug, Clone, PartialEq)]
pub struct FindUniqueArgs {
    pub filter: Filter,
    pub selection: Selection,
}

impl FindUniqueArgs {
    pub fn new(filter: Filter) -> Self {
        FindUniqueArgs {
            filter,
            selection: Selection::default(),
        }
    }

    pub fn select(mut self, fields: &[&str]) -> Self {
        self.selection.fields = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn include(mut self, relation: &str) -> Self {
        self.selection
            .relations
            .insert(relation.to_string(), FindManyArgs::default());
        self
    }

    pub fn include_with(mut self, relation: &str, args: FindManyArgs) -> Self {
        self.selection.relations.insert(relation.to_string(), args);
        self
    }

    pub fn count(mut self, relation: &str) -> Self {
        self.selection.counts.push(relation.to_string());
        self
    }
}

impl From<Filter> for FindUniqueArgs {
    fn from(filter: Filter) -> Self {
        FindUniqueArgs::new(filter)
    }
}

/// Scalar values for a create.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(pub BTreeMap<String, Value>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    Increment(Value),
    Decrement(Value),
    Multiply(Value),
    Divide(Value),
}

/// Per-field changes for an update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateData(pub BTreeMap<String, FieldUpdate>);

impl UpdateData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Set(value.into()));
        self
    }

    pub fn increment(mut self, field: &str, by: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Increment(by.into()));
        self
    }

    pub fn decrement(mut self, field: &str, by: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Decrement(by.into()));
        self
    }

    pub fn multiply(mut self, field: &str, by: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Multiply(by.into()));
        self
    }

    pub fn divide(mut self, field: &str, by: impl Into<Value>) -> Self {
        self.0.insert(field.to_string(), FieldUpdate::Divide(by.into()));
        self
    }

    /// The value this update assigns outright to `field`, if any.
    pub fn assigned(&self, field: &str) -> Option<&Value> {
        match self.0.get(field) {
            Some(FieldUpdate::Set(v)) => Some(v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateArgs {
    pub data: Data,
    pub selection: Selection,
}

impl CreateArgs {
    pub fn new(data: Data) -> Self {
        CreateArgs {
            data,
            selection: Selection::default(),
        }
    }

    pub fn include(mut self, relation: &str) -> Self {
        self.selection
            .relations
            .insert(relation.to_string(), FindManyArgs::default());
        self
    }
}

impl From<Data> for CreateArgs {
    fn from(data: Data) -> Self {
        CreateArgs::new(data)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateManyArgs {
    pub data: Vec<Data>,
    pub skip_duplicates: bool,
}

impl From<Vec<Data>> for CreateManyArgs {
    fn from(data: Vec<Data>) -> Self {
        CreateManyArgs {
            data,
            skip_duplicates: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdateArgs {
    pub filter: Filter,
    pub data: UpdateData,
    pub selection: Selection,
}

impl UpdateArgs {
    pub fn new(filter: Filter, data: UpdateData) -> Self {
        UpdateArgs {
            filter,
            data,
            selection: Selection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateManyArgs {
    pub filter: Option<Filter>,
    pub data: UpdateData,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpsertArgs {
    pub filter: Filter,
    pub create: Data,
    pub update: UpdateData,
    pub selection: Selection,
}

impl UpsertArgs {
    pub fn new(filter: Filter, create: Data, update: UpdateData) -> Self {
        UpsertArgs {
            filter,
            create,
            update,
            selection: Selection::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeleteManyArgs {
    pub filter: Option<Filter>,
}

/// Which aggregates to compute and over which fields. `_count` may name
/// `_all` to count rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregates {
    pub count: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

impl Aggregates {
    /// `_count` of all rows.
    pub fn count_all() -> Self {
        Aggregates {
            count: vec!["_all".to_string()],
            ..Aggregates::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.count.is_empty()
            && self.avg.is_empty()
            && self.sum.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }

    /// Flattened `(function, field)` pairs in output order.
    pub fn pairs(&self) -> Vec<(AggregateFn, &str)> {
        let mut out = Vec::new();
        for (func, fields) in [
            (AggregateFn::Count, &self.count),
            (AggregateFn::Avg, &self.avg),
            (AggregateFn::Sum, &self.sum),
            (AggregateFn::Min, &self.min),
            (AggregateFn::Max, &self.max),
        ] {
            out.extend(fields.iter().map(|f| (func, f.as_str())));
        }
        out
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Filter>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
    /// Fields to count non-null values of; `None` counts rows
    pub select: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateArgs {
    pub filter: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<Filter>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
    pub aggregates: Aggregates,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Option<Filter>,
    pub having: Option<Filter>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<usize>,
    pub take: Option<i64>,
    pub aggregates: Aggregates,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_fields_walk_conjunctions() {
        let filter = Filter::and(vec![
            Filter::field("identifier").equals("a@b.c"),
            Filter::field("token").equals("t1"),
            Filter::field("expiresAt").gt("2024-01-01T00:00:00Z"),
        ]);
        assert_eq!(filter.equality_fields(), vec!["identifier", "token"]);
        assert_eq!(filter.equality_value("token"), Some(&Value::from("t1")));
    }

    #[test]
    fn test_null_equality_does_not_pin_a_row() {
        let filter = Filter::field("email").is_null();
        assert!(filter.equality_fields().is_empty());
    }

    #[test]
    fn test_insensitive_builder_carries_mode() {
        let filter = Filter::field("title").insensitive().contains("Crash");
        assert_eq!(
            filter,
            Filter::Field {
                field: "title".to_string(),
                condition: Condition::Contains {
                    value: "Crash".to_string(),
                    insensitive: true
                }
            }
        );
    }

    #[test]
    fn test_and_also_flattens() {
        let f = Filter::all().and_also(Filter::field("a").equals(1)).and_also(Filter::field("b").equals(2));
        match f {
            Filter::And(list) => assert_eq!(list.len(), 2),
            other => panic!("unexpected {:?}", other),
        }
    }
}
