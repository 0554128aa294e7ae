use crate::core::{FieldUpdate, Person, PersonPatch};

/// Combine a stored record with a partial update.
///
/// `id` always comes from `existing`. Pure and total: shape validation
/// (date parsing, id presence) happens before a patch gets here.
pub fn merge(existing: &Person, patch: &PersonPatch) -> Person {
    Person {
        id: existing.id.clone(),
        name: merge_text(&existing.name, &patch.name),
        address: merge_text(&existing.address, &patch.address),
        date_of_birth: match &patch.date_of_birth {
            FieldUpdate::Unchanged => existing.date_of_birth,
            FieldUpdate::Cleared => None,
            FieldUpdate::Set(date) => Some(*date),
        },
    }
}

fn merge_text(current: &str, update: &FieldUpdate<String>) -> String {
    match update {
        FieldUpdate::Unchanged => current.to_string(),
        FieldUpdate::Cleared => String::new(),
        FieldUpdate::Set(value) => value.clone(),
    }
}
