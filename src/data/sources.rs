//! In-process data sources

use crate::data::entity::ID_FIELD;
use crate::domain::errors::DataError;
use crate::domain::repositories::{DataSource, Record};
use parking_lot::RwLock;
use serde_json::Value;

fn matches_filter(record: &Record, filter: Option<&Record>) -> bool {
    filter.map_or(true, |filter| {
        filter
            .iter()
            .all(|(field, expected)| record.get(field) == Some(expected))
    })
}

fn record_id(record: &Record) -> Option<String> {
    match record.get(ID_FIELD)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

/// Records kept in memory, in insertion order. New records get a UUID
/// unless they bring their own id.
#[derive(Debug, Default)]
pub struct MemorySource {
    records: RwLock<Vec<Record>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(records: Vec<Record>) -> Result<Self, DataError> {
        let source = Self::new();
        for record in records {
            source.create(&record)?;
        }
        Ok(source)
    }
}

impl DataSource for MemorySource {
    fn create(&self, data: &Record) -> Result<String, DataError> {
        let mut records = self.records.write();
        let id = record_id(data).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        if records.iter().any(|record| record_id(record).as_deref() == Some(id.as_str())) {
            return Err(DataError::Source(format!("a record with ID {} already exists", id)));
        }

        let mut record = data.clone();
        record.insert(ID_FIELD.to_string(), Value::String(id.clone()));
        records.push(record);
        Ok(id)
    }

    fn retrieve(&self, id: &str) -> Result<Record, DataError> {
        self.records
            .read()
            .iter()
            .find(|record| record_id(record).as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| DataError::NotFound(id.to_string()))
    }

    fn retrieve_all(&self, filter: Option<&Record>) -> Result<Vec<Record>, DataError> {
        Ok(self
            .records
            .read()
            .iter()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect())
    }

    fn update(&self, id: &str, data: &Record) -> Result<(), DataError> {
        let mut records = self.records.write();
        let record = records
            .iter_mut()
            .find(|record| record_id(record).as_deref() == Some(id))
            .ok_or_else(|| DataError::NotFound(id.to_string()))?;

        *record = data.clone();
        record.insert(ID_FIELD.to_string(), Value::String(id.to_string()));
        Ok(())
    }

    fn destroy(&self, id: &str) -> Result<(), DataError> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| record_id(record).as_deref() != Some(id));
        if records.len() == before {
            return Err(DataError::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// A fixed list of records, defined at build time. Every mutation fails.
#[derive(Debug, Clone, Default)]
pub struct ImmutableSource {
    records: Vec<Record>,
}

impl ImmutableSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    fn refuse(&self, operation: &str) -> DataError {
        DataError::Immutable(format!("cannot {} records", operation))
    }
}

impl DataSource for ImmutableSource {
    fn create(&self, _data: &Record) -> Result<String, DataError> {
        Err(self.refuse("create"))
    }

    fn retrieve(&self, id: &str) -> Result<Record, DataError> {
        self.records
            .iter()
            .find(|record| record_id(record).as_deref() == Some(id))
            .cloned()
            .ok_or_else(|| DataError::NotFound(id.to_string()))
    }

    fn retrieve_all(&self, filter: Option<&Record>) -> Result<Vec<Record>, DataError> {
        Ok(self
            .records
            .iter()
            .filter(|record| matches_filter(record, filter))
            .cloned()
            .collect())
    }

    fn update(&self, _id: &str, _data: &Record) -> Result<(), DataError> {
        Err(self.refuse("update"))
    }

    fn destroy(&self, _id: &str) -> Result<(), DataError> {
        Err(self.refuse("destroy"))
    }
}
