//! Plugin registry tests through the public API
//!
//! Covers registration round-trips, replacement of built-ins and the bridge
//! between typed records and untyped preprocessors.

mod common;

use common::*;
use metricflow_processor::error::{PluginError, ProcessorError};
use metricflow_processor::pipeline::{MetricPipeline, TypedPreprocessingPipeline};
use metricflow_processor::plugin::{
    Calculator, PluginCategory, PluginRegistry, RecordFailures, TypedPreprocessor, TypedStream,
};
use metricflow_types::{
    FieldSchema, FieldType, FieldValue, MetricConfig, MetricValue, SchemaRecord, TypesError,
};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq)]
struct LineItem {
    id: i64,
    price: Decimal,
    quantity: i64,
    total: Decimal,
    status: String,
}

impl LineItem {
    fn new(id: i64, price: Decimal, quantity: i64, status: &str) -> Self {
        Self {
            id,
            price,
            quantity,
            total: Decimal::ZERO,
            status: status.to_string(),
        }
    }
}

impl SchemaRecord for LineItem {
    fn schema() -> FieldSchema {
        FieldSchema::new()
            .read_only("id", FieldType::Int)
            .field("price", FieldType::Decimal)
            .field("quantity", FieldType::Int)
            .field("total", FieldType::Decimal)
            .field("status", FieldType::Text)
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(FieldValue::Int(self.id)),
            "price" => Some(FieldValue::Decimal(self.price)),
            "quantity" => Some(FieldValue::Int(self.quantity)),
            "total" => Some(FieldValue::Decimal(self.total)),
            "status" => Some(FieldValue::Text(self.status.clone())),
            _ => None,
        }
    }

    fn set_field(&mut self, name: &str, value: FieldValue) -> metricflow_types::Result<()> {
        let mismatch = |expected: &str| TypesError::FieldTypeMismatch {
            field: name.to_string(),
            expected: expected.to_string(),
            actual: value.field_type().to_string(),
        };
        match name {
            "price" => self.price = value.as_decimal().ok_or_else(|| mismatch("decimal"))?,
            "quantity" => self.quantity = value.as_i64().ok_or_else(|| mismatch("int"))?,
            "total" => self.total = value.as_decimal().ok_or_else(|| mismatch("decimal"))?,
            "status" => self.status = value.as_str().ok_or_else(|| mismatch("text"))?.to_string(),
            "id" => return Err(TypesError::ReadOnlyField { field: name.to_string() }),
            other => return Err(TypesError::UnknownField(other.to_string())),
        }
        Ok(())
    }
}

/// Typed stage tagging every item as reviewed
struct MarkReviewed;

impl TypedPreprocessor<LineItem> for MarkReviewed {
    fn name(&self) -> &str {
        "MarkReviewed"
    }

    fn process(
        self: Box<Self>,
        records: TypedStream<LineItem>,
        _failures: RecordFailures,
    ) -> TypedStream<LineItem> {
        Box::new(records.map(|mut item| {
            item.status = format!("{}:reviewed", item.status);
            item
        }))
    }
}

fn items() -> Vec<LineItem> {
    vec![
        LineItem::new(1, Decimal::new(250, 2), 4, "paid"),
        LineItem::new(2, Decimal::new(100, 2), 1, "open"),
        LineItem::new(3, Decimal::new(1999, 2), 2, "paid"),
    ]
}

#[test]
fn test_untyped_builtins_run_on_typed_records() {
    let registry = PluginRegistry::with_builtins();
    let config = MetricConfig::new("line_items", "day")
        .with_preprocessor("FieldFilter")
        .with_preprocessor("PriceTotal")
        .with_setting("filter_field", "status")
        .with_setting("filter_values", "paid");

    let pipeline = TypedPreprocessingPipeline::<LineItem>::build(&registry, &config).unwrap();
    let failures = pipeline.failures();
    let output: Vec<_> = pipeline.process(Box::new(items().into_iter())).collect();

    assert!(failures.is_empty());
    assert_eq!(output.len(), 2);
    assert_eq!(output[0].id, 1);
    assert_eq!(output[0].total, Decimal::new(1000, 2));
    assert_eq!(output[1].total, Decimal::new(3998, 2));
}

#[test]
fn test_typed_stage_mixes_with_untyped_stages() {
    let registry = PluginRegistry::with_builtins();
    registry.register_typed_preprocessor::<LineItem, _>("MarkReviewed", |_| {
        Ok(Box::new(MarkReviewed) as Box<dyn TypedPreprocessor<LineItem>>)
    });
    let config = MetricConfig::new("line_items", "day")
        .with_preprocessor("PriceTotal")
        .with_preprocessor("MarkReviewed");

    let pipeline = TypedPreprocessingPipeline::<LineItem>::build(&registry, &config).unwrap();
    let output: Vec<_> = pipeline.process(Box::new(items().into_iter())).collect();

    assert_eq!(output.len(), 3);
    assert!(output.iter().all(|item| item.status.ends_with(":reviewed")));
    assert_eq!(output[1].total, Decimal::new(100, 2));
}

#[test]
fn test_typed_stage_is_unavailable_to_untyped_pipelines() {
    let registry = PluginRegistry::with_builtins();
    registry.register_typed_preprocessor::<LineItem, _>("MarkReviewed", |_| {
        Ok(Box::new(MarkReviewed) as Box<dyn TypedPreprocessor<LineItem>>)
    });
    let config = MetricConfig::new("line_items", "day");

    assert!(matches!(
        registry.create_untyped("MarkReviewed", &config).err(),
        Some(ProcessorError::Plugin(PluginError::TypeMismatch { .. }))
    ));
    assert!(matches!(
        registry.create_typed::<metricflow_types::RawRecord>("MarkReviewed", &config).err(),
        Some(ProcessorError::Plugin(PluginError::TypeMismatch { .. }))
    ));
    assert!(registry.create_typed::<LineItem>("MarkReviewed", &config).is_ok());
}

#[test]
fn test_missing_plugins_are_not_found() {
    let registry = PluginRegistry::new();
    let config = MetricConfig::new("m", "day");

    for category in [PluginCategory::Loader, PluginCategory::Calculator, PluginCategory::Exporter] {
        assert!(!registry.contains(category, "missing"));
    }
    assert!(matches!(
        registry.create_calculator("missing", &config).err(),
        Some(ProcessorError::Plugin(PluginError::NotFound {
            category: PluginCategory::Calculator,
            ..
        }))
    ));
    assert!(matches!(
        registry.create_exporter("missing", &config).err(),
        Some(ProcessorError::Plugin(PluginError::NotFound {
            category: PluginCategory::Exporter,
            ..
        }))
    ));
}

#[tokio::test]
async fn test_replacing_a_builtin_calculator() {
    let (registry, _) = registry(MemoryLoader::new(vec![order(utc(2024, 1, 1), "1", "1", "paid")]));
    registry.register_calculator("count", |_| {
        Ok(Box::new(FailingCalculator { bad_count: usize::MAX }) as Box<dyn Calculator>)
    });

    let pipeline = MetricPipeline::new(registry, engine()).unwrap();
    let config = metric("orders", "day").with_calculator("count");
    let summary = pipeline
        .run(&config, utc(2024, 1, 1), utc(2024, 1, 2), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].calculator(), "failing");
    assert_eq!(summary.results[0].value(), &MetricValue::Scalar(FieldValue::Int(1)));
}
