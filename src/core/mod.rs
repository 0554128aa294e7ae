pub mod error;
pub mod person;

pub use error::{EngineError, Result};
pub use person::{DOB_FORMAT, DOB_UNSET_SENTINEL, DateOfBirth, FieldUpdate, Person, PersonPatch};
