//! Feature Vector Builder: maps extracted signals onto a schema's named slots.
//!
//! Every position is filled by looking up the slot's own declaration, in
//! schema order. Nothing here slices, pads or reorders a vector built for a
//! different schema.

use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, SchemaMismatch};
use crate::features::extractor::{signal_default, SignalValue, Signals};
use crate::schema::{DefaultPolicy, FeatureSlot, ModelSchema, SlotSource};

/// Ordered values plus the slot names they were built for.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureVector {
    pub schema_version: String,
    pub names: Vec<String>,
    pub values: Vec<f64>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value bound to `name`, found through the name list.
    pub fn value_of(&self, name: &str) -> Option<f64> {
        let index = self.names.iter().position(|n| n == name)?;
        self.values.get(index).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DefaultedSlot {
    pub name: String,
    pub required: bool,
}

#[derive(Debug, Clone)]
pub struct BuiltVector {
    pub vector: FeatureVector,
    pub defaulted: Vec<DefaultedSlot>,
}

impl BuiltVector {
    pub fn defaulted_names(&self) -> Vec<String> {
        self.defaulted.iter().map(|d| d.name.clone()).collect()
    }

    pub fn required_defaulted(&self) -> Vec<String> {
        self.defaulted
            .iter()
            .filter(|d| d.required)
            .map(|d| d.name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureVectorBuilder;

impl FeatureVectorBuilder {
    pub fn build(&self, signals: &Signals, schema: &ModelSchema) -> Result<BuiltVector, AppError> {
        let mut names = Vec::with_capacity(schema.slot_count());
        let mut values = Vec::with_capacity(schema.slot_count());
        let mut defaulted = Vec::new();

        for slot in &schema.slots {
            let value = match slot_value(slot, signals, schema)? {
                Some(value) => value,
                None => {
                    defaulted.push(DefaultedSlot {
                        name: slot.name.clone(),
                        required: slot.required,
                    });
                    resolve_default(slot, &schema.version)?
                }
            };
            names.push(slot.name.clone());
            values.push(value);
        }

        if !defaulted.is_empty() {
            debug!(
                "Schema {}: {} of {} slots defaulted: {:?}",
                schema.version,
                defaulted.len(),
                schema.slot_count(),
                defaulted.iter().map(|d| d.name.as_str()).collect::<Vec<_>>()
            );
        }

        Ok(BuiltVector {
            vector: FeatureVector {
                schema_version: schema.version.clone(),
                names,
                values,
            },
            defaulted,
        })
    }
}

/// `None` when the slot's signal is absent.
fn slot_value(
    slot: &FeatureSlot,
    signals: &Signals,
    schema: &ModelSchema,
) -> Result<Option<f64>, AppError> {
    match (&slot.source, signals.get(slot.source.signal())) {
        (_, None) => Ok(None),
        (SlotSource::Signal { scale, .. }, Some(SignalValue::Numeric(v))) => Ok(Some(v * scale)),
        (SlotSource::Indicator { category, .. }, Some(SignalValue::Categorical(c))) => {
            Ok(Some(if c.eq_ignore_ascii_case(category.trim()) {
                1.0
            } else {
                0.0
            }))
        }
        (source, Some(_)) => Err(kind_mismatch(slot, source, schema)),
    }
}

fn kind_mismatch(slot: &FeatureSlot, source: &SlotSource, schema: &ModelSchema) -> AppError {
    let expected = match source {
        SlotSource::Signal { .. } => "numeric",
        SlotSource::Indicator { .. } => "categorical",
    };
    let names = schema.slot_names();
    AppError::SchemaMismatch(SchemaMismatch {
        schema_version: schema.version.clone(),
        expected_len: schema.slot_count(),
        actual_len: schema.slot_count(),
        expected_names: names.clone(),
        actual_names: names,
        problems: vec![format!(
            "slot '{}' expects a {expected} signal '{}'",
            slot.name,
            source.signal()
        )],
    })
}

fn resolve_default(slot: &FeatureSlot, version: &str) -> Result<f64, AppError> {
    match (&slot.default, &slot.source) {
        (DefaultPolicy::Constant { value }, _) => Ok(*value),
        (DefaultPolicy::SignalTable, SlotSource::Indicator { .. }) => Ok(0.0),
        (DefaultPolicy::SignalTable, SlotSource::Signal { signal, scale }) => {
            signal_default(signal).map(|v| v * scale).ok_or_else(|| {
                AppError::Configuration(format!(
                    "schema '{version}', slot '{}': no table default for signal '{signal}'",
                    slot.name
                ))
            })
        }
    }
}
