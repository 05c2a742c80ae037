//! Typed view over an untyped preprocessor
//!
//! Each typed record is projected to a [`RawRecord`] through its declared
//! schema, handed to the untyped preprocessor, and every writable field whose
//! value changed is written back.

use super::{Disposition, RecordFailures, TypedPreprocessor, TypedStream, UntypedPreprocessor};
use crate::error::RecordError;
use metricflow_types::{FieldSchema, RawRecord, SchemaRecord};
use std::marker::PhantomData;
use tracing::warn;

/// Exposes an [`UntypedPreprocessor`] as a [`TypedPreprocessor<T>`]
pub struct UntypedAdapter<T> {
    inner: Box<dyn UntypedPreprocessor>,
    _record: PhantomData<fn() -> T>,
}

impl<T: SchemaRecord> UntypedAdapter<T> {
    pub fn new(inner: Box<dyn UntypedPreprocessor>) -> Self {
        Self {
            inner,
            _record: PhantomData,
        }
    }

    pub fn into_inner(self) -> Box<dyn UntypedPreprocessor> {
        self.inner
    }
}

impl<T: SchemaRecord> TypedPreprocessor<T> for UntypedAdapter<T> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn process(
        self: Box<Self>,
        records: TypedStream<T>,
        failures: RecordFailures,
    ) -> TypedStream<T> {
        let mut inner = self.inner;
        let schema = T::schema();

        Box::new(records.filter_map(move |mut typed| {
            let mut raw = typed.to_raw();
            let disposition = match inner.process(&mut raw) {
                Ok(disposition) => disposition,
                Err(err) => {
                    warn!(preprocessor = %inner.name(), error = %err, "Preprocessor failed");
                    failures.push(err);
                    return Some(typed);
                }
            };

            if disposition == Disposition::Drop {
                return None;
            }

            write_back(&schema, &raw, &mut typed, inner.name(), &failures);
            Some(typed)
        }))
    }
}

fn write_back<T: SchemaRecord>(
    schema: &FieldSchema,
    raw: &RawRecord,
    typed: &mut T,
    preprocessor: &str,
    failures: &RecordFailures,
) {
    for def in schema.fields().iter().filter(|def| def.writable) {
        let Some(updated) = raw.get(&def.name) else {
            continue;
        };
        if typed.field(&def.name).as_ref() == Some(updated) {
            continue;
        }
        if let Err(err) = typed.set_field(&def.name, updated.clone()) {
            let err = RecordError::Preprocessor {
                preprocessor: preprocessor.to_string(),
                reason: err.to_string(),
            };
            warn!(field = %def.name, error = %err, "Cannot write preprocessed field back");
            failures.push(err);
        }
    }
}
