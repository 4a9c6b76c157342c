/// Query Module
///
/// Argument types for every delegate operation (`args`), the JSON argument
/// parser (`parse`) and the SQL compiler (`compile`).
pub mod args;
pub mod compile;
pub mod parse;

pub use args::*;
pub use compile::Statement;

use crate::core::{FeedbaseError, Result};
use crate::schema::ModelDef;

/// Checks that a `where` pins exactly one row: its top-level equalities
/// must cover every field of at least one unique key.
pub fn ensure_unique_filter(model: &ModelDef, filter: &Filter) -> Result<()> {
    let pinned = filter.equality_fields();
    let keys = model.unique_keys();
    if keys
        .iter()
        .any(|key| key.fields.iter().all(|f| pinned.contains(f)))
    {
        return Ok(());
    }
    let names: Vec<String> = keys.into_iter().map(|k| k.name).collect();
    Err(FeedbaseError::Validation(format!(
        "Argument `where` of type {}WhereUniqueInput needs at least one of {}",
        model.name,
        names.join(", ")
    )))
}
