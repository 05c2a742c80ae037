//! Plugin registry
//!
//! Name-keyed factories, one concurrent map per category. Registration
//! replaces any previous factory under the same name and never blocks
//! lookups in other shards.

use super::adapter::UntypedAdapter;
use super::builtin;
use super::convert::Converter;
use super::{Calculator, Exporter, Loader, PluginCategory, TypedPreprocessor, UntypedPreprocessor};
use crate::error::{ConfigurationError, PluginError, Result};
use dashmap::DashMap;
use metricflow_types::{FieldValue, MetricConfig, SchemaRecord};
use std::any::{type_name, Any};
use std::sync::Arc;
use tracing::debug;

pub type LoaderFactory = dyn Fn(&MetricConfig) -> Result<Box<dyn Loader>> + Send + Sync;
pub type CalculatorFactory = dyn Fn(&MetricConfig) -> Result<Box<dyn Calculator>> + Send + Sync;
pub type ExporterFactory = dyn Fn(&MetricConfig) -> Result<Box<dyn Exporter>> + Send + Sync;
type PreprocessorFactory = dyn Fn(&MetricConfig) -> Result<PreprocessorInstance> + Send + Sync;

/// What a preprocessor factory produced
enum PreprocessorInstance {
    Untyped(Box<dyn UntypedPreprocessor>),
    /// A `Box<dyn TypedPreprocessor<T>>` for the record type named alongside
    Typed {
        instance: Box<dyn Any + Send>,
        record_type: &'static str,
    },
}

/// Factories of one category
struct FactoryMap<F: ?Sized> {
    category: PluginCategory,
    factories: DashMap<String, Arc<F>>,
}

impl<F: ?Sized> FactoryMap<F> {
    fn new(category: PluginCategory) -> Self {
        Self {
            category,
            factories: DashMap::new(),
        }
    }

    fn insert(&self, name: String, factory: Arc<F>) {
        if self.factories.insert(name.clone(), factory).is_some() {
            debug!(category = %self.category, name = %name, "Replaced plugin factory");
        } else {
            debug!(category = %self.category, name = %name, "Registered plugin factory");
        }
    }

    /// Clone the factory out so no shard lock is held while it runs
    fn get(&self, name: &str) -> std::result::Result<Arc<F>, PluginError> {
        self.factories
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| PluginError::NotFound {
                category: self.category,
                name: name.to_string(),
            })
    }

    fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }
}

/// Registry of plugin factories
///
/// Constructed explicitly and shared by `Arc`; tests build isolated
/// instances with their own plugin sets.
pub struct PluginRegistry {
    loaders: FactoryMap<LoaderFactory>,
    preprocessors: FactoryMap<PreprocessorFactory>,
    calculators: FactoryMap<CalculatorFactory>,
    exporters: FactoryMap<ExporterFactory>,
    converters: FactoryMap<Converter>,
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            loaders: FactoryMap::new(PluginCategory::Loader),
            preprocessors: FactoryMap::new(PluginCategory::Preprocessor),
            calculators: FactoryMap::new(PluginCategory::Calculator),
            exporters: FactoryMap::new(PluginCategory::Exporter),
            converters: FactoryMap::new(PluginCategory::Converter),
        }
    }

    /// Create a registry preloaded with the built-in plugins
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    pub fn register_loader<F>(&self, source_type: impl Into<String>, factory: F)
    where
        F: Fn(&MetricConfig) -> Result<Box<dyn Loader>> + Send + Sync + 'static,
    {
        self.loaders.insert(source_type.into(), Arc::new(factory));
    }

    /// Register an untyped preprocessor, usable from typed pipelines through
    /// [`UntypedAdapter`]
    pub fn register_preprocessor<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&MetricConfig) -> Result<Box<dyn UntypedPreprocessor>> + Send + Sync + 'static,
    {
        self.preprocessors.insert(
            name.into(),
            Arc::new(move |config: &MetricConfig| {
                factory(config).map(PreprocessorInstance::Untyped)
            }),
        );
    }

    /// Register a preprocessor for records of type `T` only
    pub fn register_typed_preprocessor<T, F>(&self, name: impl Into<String>, factory: F)
    where
        T: SchemaRecord,
        F: Fn(&MetricConfig) -> Result<Box<dyn TypedPreprocessor<T>>> + Send + Sync + 'static,
    {
        self.preprocessors.insert(
            name.into(),
            Arc::new(move |config: &MetricConfig| -> Result<PreprocessorInstance> {
                let instance: Box<dyn TypedPreprocessor<T>> = factory(config)?;
                Ok(PreprocessorInstance::Typed {
                    instance: Box::new(instance),
                    record_type: type_name::<T>(),
                })
            }),
        );
    }

    pub fn register_calculator<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn(&MetricConfig) -> Result<Box<dyn Calculator>> + Send + Sync + 'static,
    {
        self.calculators.insert(name.into(), Arc::new(factory));
    }

    pub fn register_exporter<F>(&self, target_type: impl Into<String>, factory: F)
    where
        F: Fn(&MetricConfig) -> Result<Box<dyn Exporter>> + Send + Sync + 'static,
    {
        self.exporters.insert(target_type.into(), Arc::new(factory));
    }

    pub fn register_converter<F>(&self, token: impl Into<String>, converter: F)
    where
        F: Fn(&FieldValue) -> std::result::Result<FieldValue, String> + Send + Sync + 'static,
    {
        self.converters.insert(token.into(), Arc::new(converter));
    }

    pub fn create_loader(
        &self,
        source_type: &str,
        config: &MetricConfig,
    ) -> Result<Box<dyn Loader>> {
        let factory = self.loaders.get(source_type)?;
        factory(config)
    }

    /// Create a preprocessor through its untyped surface
    ///
    /// Fails with a type mismatch when the name is registered as typed.
    pub fn create_untyped(
        &self,
        name: &str,
        config: &MetricConfig,
    ) -> Result<Box<dyn UntypedPreprocessor>> {
        let factory = self.preprocessors.get(name)?;
        match factory(config)? {
            PreprocessorInstance::Untyped(instance) => Ok(instance),
            PreprocessorInstance::Typed { record_type, .. } => Err(PluginError::TypeMismatch {
                category: PluginCategory::Preprocessor,
                name: name.to_string(),
                expected: format!("untyped preprocessor (registered for {})", record_type),
            }
            .into()),
        }
    }

    /// Create a preprocessor over records of type `T`
    ///
    /// Untyped registrations are wrapped in an [`UntypedAdapter`]. Typed
    /// registrations for another record type fail with a type mismatch.
    pub fn create_typed<T: SchemaRecord>(
        &self,
        name: &str,
        config: &MetricConfig,
    ) -> Result<Box<dyn TypedPreprocessor<T>>> {
        let factory = self.preprocessors.get(name)?;
        match factory(config)? {
            PreprocessorInstance::Untyped(instance) => {
                Ok(Box::new(UntypedAdapter::<T>::new(instance)))
            }
            PreprocessorInstance::Typed { instance, record_type } => instance
                .downcast::<Box<dyn TypedPreprocessor<T>>>()
                .map(|typed| *typed)
                .map_err(|_| {
                    PluginError::TypeMismatch {
                        category: PluginCategory::Preprocessor,
                        name: name.to_string(),
                        expected: format!(
                            "preprocessor for {} (registered for {})",
                            type_name::<T>(),
                            record_type
                        ),
                    }
                    .into()
                }),
        }
    }

    pub fn create_calculator(
        &self,
        name: &str,
        config: &MetricConfig,
    ) -> Result<Box<dyn Calculator>> {
        let factory = self.calculators.get(name)?;
        factory(config)
    }

    pub fn create_exporter(
        &self,
        target_type: &str,
        config: &MetricConfig,
    ) -> Result<Box<dyn Exporter>> {
        let factory = self.exporters.get(target_type)?;
        factory(config)
    }

    /// Resolve the converter for `property`'s declared token
    pub fn converter(
        &self,
        property: &str,
        token: &str,
    ) -> std::result::Result<Arc<Converter>, ConfigurationError> {
        self.converters
            .get(token)
            .map_err(|_| ConfigurationError::UnsupportedConverter {
                property: property.to_string(),
                token: token.to_string(),
            })
    }

    pub fn contains(&self, category: PluginCategory, name: &str) -> bool {
        match category {
            PluginCategory::Loader => self.loaders.contains(name),
            PluginCategory::Preprocessor => self.preprocessors.contains(name),
            PluginCategory::Calculator => self.calculators.contains(name),
            PluginCategory::Exporter => self.exporters.contains(name),
            PluginCategory::Converter => self.converters.contains(name),
        }
    }

    /// Registered names of one category, sorted
    pub fn names(&self, category: PluginCategory) -> Vec<String> {
        match category {
            PluginCategory::Loader => self.loaders.names(),
            PluginCategory::Preprocessor => self.preprocessors.names(),
            PluginCategory::Calculator => self.calculators.names(),
            PluginCategory::Exporter => self.exporters.names(),
            PluginCategory::Converter => self.converters.names(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CalculationResult, ProcessorError, RecordResult};
    use crate::plugin::{convert, Disposition, RecordFailures, TypedStream};
    use indexmap::IndexMap;
    use metricflow_types::RawRecord;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    struct Fixed(&'static str, i64);

    impl Calculator for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn calculate(
            &self,
            _records: &[RawRecord],
        ) -> CalculationResult<IndexMap<String, FieldValue>> {
            let mut out = IndexMap::new();
            out.insert("value".to_string(), FieldValue::Int(self.1));
            Ok(out)
        }
    }

    fn fixed(name: &'static str, value: i64) -> Result<Box<dyn Calculator>> {
        Ok(Box::new(Fixed(name, value)))
    }

    struct Noop;

    impl UntypedPreprocessor for Noop {
        fn name(&self) -> &str {
            "noop"
        }

        fn process(&mut self, _record: &mut RawRecord) -> RecordResult<Disposition> {
            Ok(Disposition::Keep)
        }
    }

    struct PassThrough;

    impl TypedPreprocessor<RawRecord> for PassThrough {
        fn name(&self) -> &str {
            "pass"
        }

        fn process(
            self: Box<Self>,
            records: TypedStream<RawRecord>,
            _failures: RecordFailures,
        ) -> TypedStream<RawRecord> {
            records
        }
    }

    #[test]
    fn test_register_and_create() {
        let registry = PluginRegistry::new();
        registry.register_calculator("x", |_config| fixed("x", 1));

        let config = MetricConfig::new("m", "day");
        let calculator = registry.create_calculator("x", &config).unwrap();
        assert_eq!(calculator.name(), "x");
        assert!(registry.contains(PluginCategory::Calculator, "x"));
    }

    #[test]
    fn test_create_missing_is_not_found() {
        let registry = PluginRegistry::new();
        let config = MetricConfig::new("m", "day");

        let err = registry.create_calculator("missing", &config).err().unwrap();
        assert!(matches!(
            err,
            ProcessorError::Plugin(PluginError::NotFound {
                category: PluginCategory::Calculator,
                ref name,
            }) if name == "missing"
        ));
        assert!(registry.create_loader("missing", &config).is_err());
        assert!(registry.create_exporter("missing", &config).is_err());
        assert!(registry.create_untyped("missing", &config).is_err());
    }

    #[test]
    fn test_last_registration_wins() {
        let registry = PluginRegistry::new();
        registry.register_calculator("x", |_| fixed("first", 1));
        registry.register_calculator("x", |_| fixed("second", 2));

        let config = MetricConfig::new("m", "day");
        let calculator = registry.create_calculator("x", &config).unwrap();
        assert_eq!(calculator.name(), "second");
        assert_eq!(registry.names(PluginCategory::Calculator), vec!["x".to_string()]);
    }

    #[test]
    fn test_factory_errors_propagate() {
        let registry = PluginRegistry::new();
        registry.register_calculator("strict", |config| {
            config.require_str("value_field")?;
            Ok(Box::new(Fixed("strict", 0)) as Box<dyn Calculator>)
        });

        let config = MetricConfig::new("m", "day");
        let err = registry.create_calculator("strict", &config).err().unwrap();
        assert!(matches!(
            err,
            ProcessorError::Configuration(ConfigurationError::InvalidSetting(_))
        ));
    }

    #[test]
    fn test_untyped_preprocessor_has_both_surfaces() {
        let registry = PluginRegistry::new();
        registry
            .register_preprocessor("noop", |_| Ok(Box::new(Noop) as Box<dyn UntypedPreprocessor>));

        let config = MetricConfig::new("m", "day");
        assert!(registry.create_untyped("noop", &config).is_ok());
        let typed = registry.create_typed::<RawRecord>("noop", &config).unwrap();
        assert_eq!(typed.name(), "noop");
    }

    #[test]
    fn test_typed_preprocessor_rejects_untyped_request() {
        let registry = PluginRegistry::new();
        registry.register_typed_preprocessor::<RawRecord, _>("pass", |_| {
            Ok(Box::new(PassThrough) as Box<dyn TypedPreprocessor<RawRecord>>)
        });

        let config = MetricConfig::new("m", "day");
        assert!(registry.create_typed::<RawRecord>("pass", &config).is_ok());

        let err = registry.create_untyped("pass", &config).err().unwrap();
        assert!(matches!(
            err,
            ProcessorError::Plugin(PluginError::TypeMismatch {
                category: PluginCategory::Preprocessor,
                ..
            })
        ));
    }

    #[test]
    fn test_typed_preprocessor_rejects_other_record_type() {
        #[derive(Debug)]
        struct Other;

        impl SchemaRecord for Other {
            fn schema() -> metricflow_types::FieldSchema {
                metricflow_types::FieldSchema::new()
            }

            fn field(&self, _name: &str) -> Option<FieldValue> {
                None
            }

            fn set_field(
                &mut self,
                name: &str,
                _value: FieldValue,
            ) -> metricflow_types::Result<()> {
                Err(metricflow_types::TypesError::UnknownField(name.to_string()))
            }
        }

        let registry = PluginRegistry::new();
        registry.register_typed_preprocessor::<RawRecord, _>("pass", |_| {
            Ok(Box::new(PassThrough) as Box<dyn TypedPreprocessor<RawRecord>>)
        });

        let config = MetricConfig::new("m", "day");
        let err = registry.create_typed::<Other>("pass", &config).err().unwrap();
        assert!(matches!(err, ProcessorError::Plugin(PluginError::TypeMismatch { .. })));
    }

    #[test]
    fn test_converter_lookup() {
        let registry = PluginRegistry::with_builtins();
        let to_int = registry.converter("quantity", "int").unwrap();
        assert_eq!(to_int(&FieldValue::from("12")), Ok(FieldValue::Int(12)));

        let err = registry.converter("price", "money").err().unwrap();
        assert_eq!(
            err,
            ConfigurationError::UnsupportedConverter {
                property: "price".to_string(),
                token: "money".to_string(),
            }
        );

        registry.register_converter("money", |v: &FieldValue| convert::to_decimal(v));
        assert!(registry.converter("price", "money").is_ok());
    }

    #[test]
    fn test_concurrent_registration_and_lookup() {
        let registry = Arc::new(PluginRegistry::new());
        registry.register_calculator("shared", |_| fixed("shared", 0));
        let created = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let registry = Arc::clone(&registry);
                let created = Arc::clone(&created);
                thread::spawn(move || {
                    let config = MetricConfig::new("m", "day");
                    for j in 0..100 {
                        registry.register_calculator(format!("calc-{}-{}", i, j), |_| {
                            Ok(Box::new(Fixed("dyn", 0)) as Box<dyn Calculator>)
                        });
                        if registry.create_calculator("shared", &config).is_ok() {
                            created.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(created.load(Ordering::SeqCst), 800);
        assert_eq!(registry.names(PluginCategory::Calculator).len(), 801);
    }
}
