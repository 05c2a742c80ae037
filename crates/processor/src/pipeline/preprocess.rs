//! Lazy record preprocessing
//!
//! Stages are resolved once when the pipeline is built and then chained over
//! the loader's record stream:
//!
//! ```text
//! loader -> coercion -> preprocessor 1 -> ... -> preprocessor n -> grouping
//! ```
//!
//! Nothing runs until the output is pulled. Record-local failures are logged,
//! collected in a [`RecordFailures`] sink, and the record continues.

use crate::error::{RecordError, Result};
use crate::plugin::{
    Converter, Disposition, PluginRegistry, RecordFailures, RecordStream, TypedPreprocessor,
    TypedStream, UntypedPreprocessor,
};
use metricflow_types::{MetricConfig, RawRecord, SchemaRecord};
use std::sync::Arc;
use tracing::{debug, warn};

/// A property coercion resolved from the metric's converter table
#[derive(Clone)]
struct Coercion {
    property: String,
    token: String,
    convert: Arc<Converter>,
}

impl Coercion {
    fn apply(&self, record: &mut RawRecord, failures: &RecordFailures) {
        let Some(current) = record.get(&self.property) else {
            return;
        };

        match (self.convert)(current) {
            Ok(converted) => {
                record.set(&self.property, converted);
            }
            Err(reason) => {
                let err = RecordError::Conversion {
                    field: self.property.clone(),
                    token: self.token.clone(),
                    reason,
                };
                warn!(error = %err, "Conversion failed, keeping original value");
                failures.push(err);
            }
        }
    }

    /// Coerce through the declared schema; the caller checked writability
    fn apply_typed<T: SchemaRecord>(&self, record: &mut T, failures: &RecordFailures) {
        let Some(current) = record.field(&self.property) else {
            return;
        };

        let outcome = (self.convert)(&current).and_then(|converted| {
            record
                .set_field(&self.property, converted)
                .map_err(|e| e.to_string())
        });
        if let Err(reason) = outcome {
            let err = RecordError::Conversion {
                field: self.property.clone(),
                token: self.token.clone(),
                reason,
            };
            warn!(error = %err, "Conversion failed, keeping original value");
            failures.push(err);
        }
    }
}

fn resolve_coercions(registry: &PluginRegistry, config: &MetricConfig) -> Result<Vec<Coercion>> {
    let mut coercions = Vec::with_capacity(config.converters.len());
    for (property, token) in &config.converters {
        coercions.push(Coercion {
            property: property.clone(),
            token: token.clone(),
            convert: registry.converter(property, token)?,
        });
    }
    Ok(coercions)
}

/// Preprocessing over untyped records
pub struct PreprocessingPipeline {
    coercions: Vec<Coercion>,
    stages: Vec<Box<dyn UntypedPreprocessor>>,
    failures: RecordFailures,
}

impl Default for PreprocessingPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl PreprocessingPipeline {
    /// An empty pipeline that passes records through unchanged
    pub fn new() -> Self {
        Self {
            coercions: Vec::new(),
            stages: Vec::new(),
            failures: RecordFailures::new(),
        }
    }

    /// Resolve converters and preprocessors declared by `config`
    ///
    /// An unknown converter token or preprocessor name fails here, before
    /// any record is read.
    pub fn build(registry: &PluginRegistry, config: &MetricConfig) -> Result<Self> {
        let mut pipeline = Self::new();
        pipeline.coercions = resolve_coercions(registry, config)?;

        for name in &config.preprocessors {
            pipeline.stages.push(registry.create_untyped(name, config)?);
        }

        debug!(
            metric = %config.name,
            coercions = pipeline.coercions.len(),
            stages = pipeline.stages.len(),
            "Built preprocessing pipeline"
        );

        Ok(pipeline)
    }

    /// Append a coercion stage
    pub fn with_coercion(
        mut self,
        property: impl Into<String>,
        token: impl Into<String>,
        convert: Arc<Converter>,
    ) -> Self {
        self.coercions.push(Coercion {
            property: property.into(),
            token: token.into(),
            convert,
        });
        self
    }

    /// Append a preprocessor stage
    pub fn with_stage(mut self, stage: Box<dyn UntypedPreprocessor>) -> Self {
        self.stages.push(stage);
        self
    }

    /// Handle on the failure sink shared by every stage
    pub fn failures(&self) -> RecordFailures {
        self.failures.clone()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// Chain all stages over `records`
    pub fn process(self, records: RecordStream) -> RecordStream {
        let Self {
            coercions,
            stages,
            failures,
        } = self;

        let mut stream: RecordStream = if coercions.is_empty() {
            records
        } else {
            let failures = failures.clone();
            Box::new(records.map(move |mut record| {
                for coercion in &coercions {
                    coercion.apply(&mut record, &failures);
                }
                record
            }))
        };

        for mut stage in stages {
            let failures = failures.clone();
            stream = Box::new(stream.filter_map(move |mut record| {
                match stage.process(&mut record) {
                    Ok(Disposition::Keep) => Some(record),
                    Ok(Disposition::Drop) => None,
                    Err(err) => {
                        warn!(preprocessor = %stage.name(), error = %err, "Preprocessor failed");
                        failures.push(err);
                        Some(record)
                    }
                }
            }));
        }

        stream
    }
}

/// Preprocessing over typed records
///
/// Each stage is resolved with [`PluginRegistry::create_typed`], so untyped
/// registrations run through their adapter. Coercions go through the
/// record's declared schema and only touch writable fields.
pub struct TypedPreprocessingPipeline<T: SchemaRecord> {
    coercions: Vec<Coercion>,
    stages: Vec<Box<dyn TypedPreprocessor<T>>>,
    failures: RecordFailures,
}

impl<T: SchemaRecord> Default for TypedPreprocessingPipeline<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: SchemaRecord> TypedPreprocessingPipeline<T> {
    pub fn new() -> Self {
        Self {
            coercions: Vec::new(),
            stages: Vec::new(),
            failures: RecordFailures::new(),
        }
    }

    /// Every converter token is resolved, but only properties declared
    /// writable by `T` are coerced
    pub fn build(registry: &PluginRegistry, config: &MetricConfig) -> Result<Self> {
        let schema = T::schema();
        let coercions: Vec<Coercion> = resolve_coercions(registry, config)?
            .into_iter()
            .filter(|coercion| {
                let writable = schema.is_writable(&coercion.property);
                if !writable {
                    debug!(field = %coercion.property, "Skipping coercion of non-writable field");
                }
                writable
            })
            .collect();

        let stages = config
            .preprocessors
            .iter()
            .map(|name| registry.create_typed::<T>(name, config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            coercions,
            stages,
            failures: RecordFailures::new(),
        })
    }

    pub fn with_stage(mut self, stage: Box<dyn TypedPreprocessor<T>>) -> Self {
        self.stages.push(stage);
        self
    }

    pub fn failures(&self) -> RecordFailures {
        self.failures.clone()
    }

    pub fn process(self, records: TypedStream<T>) -> TypedStream<T> {
        let Self {
            coercions,
            stages,
            failures,
        } = self;

        let stream: TypedStream<T> = if coercions.is_empty() {
            records
        } else {
            let failures = failures.clone();
            Box::new(records.map(move |mut record| {
                for coercion in &coercions {
                    coercion.apply_typed(&mut record, &failures);
                }
                record
            }))
        };

        stages
            .into_iter()
            .fold(stream, |stream, stage| stage.process(stream, failures.clone()))
    }
}
