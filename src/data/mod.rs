/// Data layer - entities, their factories and the sources they persist to

pub mod entity;
pub mod factory;
pub mod sources;
pub mod validators;

pub use entity::{Entity, EntitySchema, FieldValidators, FieldValue, FieldsData, Subentity, ID_FIELD};
pub use factory::{Factory, FactoryRegistry};
pub use sources::{ImmutableSource, MemorySource};
pub use validators::{validator_by_name, Validator};
