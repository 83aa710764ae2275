//! Record translation between entity instances and external-shape records.
//!
//! `to_external` renders a full external record from one instance by applying
//! the rename table and then the conversion rules over every declared field;
//! `from_external` inverts both and silently drops external columns that have
//! no declared counterpart (the hand-managed schema carries legacy columns).

use serde_json::{Map, Value};

use super::convert::{ConversionError, FieldMapper};
use super::schema::{descriptor, EntityDescriptor, SyncEntity};

/// A record in the external store's shape: plain JSON-compatible columns.
pub type ExternalRecord = Map<String, Value>;

/// An internal-shape record: declared field names with native-typed values.
pub type InternalRecord = Map<String, Value>;

/// Translation failure for a single record.
#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("entity shape error: {0}")]
    Shape(String),
}

/// Translates whole records using the [`FieldMapper`] rules.
#[derive(Debug, Clone, Default)]
pub struct RecordTranslator {
    mapper: FieldMapper,
}

impl RecordTranslator {
    pub fn new(mapper: FieldMapper) -> Self {
        Self { mapper }
    }

    /// Translator configured with the standard Mobilize conversion registry.
    pub fn standard() -> Self {
        Self::new(FieldMapper::standard())
    }

    /// Render one instance as a complete external-shape record.
    ///
    /// The output carries one entry per declared field, in declaration order,
    /// and contains only JSON primitives.
    pub fn to_external<T: SyncEntity>(&self, instance: &T) -> Result<ExternalRecord, TranslateError> {
        let desc = descriptor(T::KIND);
        let value = serde_json::to_value(instance)
            .map_err(|e| TranslateError::Shape(e.to_string()))?;
        let Value::Object(internal) = value else {
            return Err(TranslateError::Shape(format!(
                "{} did not serialize to an object",
                desc.name
            )));
        };
        self.record_to_external(desc, &internal)
    }

    /// Render an internal-shape record as an external-shape record.
    pub fn record_to_external(
        &self,
        desc: &EntityDescriptor,
        internal: &InternalRecord,
    ) -> Result<ExternalRecord, TranslateError> {
        let mut out = ExternalRecord::new();
        for field in desc.fields {
            let value = internal.get(*field).cloned().unwrap_or(Value::Null);
            let converted = self.mapper.to_external(desc.kind, field, &value)?;
            out.insert(desc.external_name(field).to_string(), converted);
        }
        Ok(out)
    }

    /// Translate an external record to the internal shape.
    ///
    /// External columns with no declared counterpart are dropped, not
    /// errored; the descriptor is required, so the field-existence check is
    /// never skipped.
    pub fn from_external(
        &self,
        desc: &EntityDescriptor,
        record: &ExternalRecord,
    ) -> Result<InternalRecord, TranslateError> {
        let mut out = InternalRecord::new();
        for (key, value) in record {
            let field = desc.internal_name(key);
            if !desc.has_field(field) {
                tracing::debug!(entity = desc.name, column = %key, "dropping undeclared external column");
                continue;
            }
            let converted = self.mapper.from_external(desc.kind, field, value)?;
            out.insert(field.to_string(), converted);
        }
        Ok(out)
    }

    /// Rebuild a typed instance from an external record.
    pub fn instance_from_external<T: SyncEntity>(
        &self,
        record: &ExternalRecord,
    ) -> Result<T, TranslateError> {
        let internal = self.from_external(descriptor(T::KIND), record)?;
        serde_json::from_value(Value::Object(internal))
            .map_err(|e| TranslateError::Shape(e.to_string()))
    }

    /// Element-wise batch translation, order-preserving.
    ///
    /// Failures are isolated per element: each input produces its own result
    /// and a failed element never aborts its siblings.
    pub fn bulk_to_external<T: SyncEntity>(
        &self,
        instances: &[T],
    ) -> Vec<Result<ExternalRecord, TranslateError>> {
        instances.iter().map(|i| self.to_external(i)).collect()
    }

    /// Element-wise inverse batch translation, order-preserving.
    pub fn bulk_from_external(
        &self,
        desc: &EntityDescriptor,
        records: &[ExternalRecord],
    ) -> Vec<Result<InternalRecord, TranslateError>> {
        records.iter().map(|r| self.from_external(desc, r)).collect()
    }
}
