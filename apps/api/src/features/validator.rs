//! Schema Validator: the last gate before a vector leaves the process.
//!
//! Checks shape, name binding and ranges, and reports every problem found.
//! Values are never clamped or trimmed here.

use std::collections::HashSet;

use crate::errors::SchemaMismatch;
use crate::features::builder::FeatureVector;
use crate::schema::ModelSchema;

#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn validate(&self, vector: &FeatureVector, schema: &ModelSchema) -> Result<(), SchemaMismatch> {
        let mut problems = Vec::new();

        if vector.schema_version != schema.version {
            problems.push(format!(
                "vector was built for schema '{}'",
                vector.schema_version
            ));
        }

        if vector.values.len() != schema.slot_count() {
            problems.push(format!(
                "length {} != slot count {}",
                vector.values.len(),
                schema.slot_count()
            ));
        }

        if vector.names.len() != vector.values.len() {
            problems.push(format!(
                "{} names bound to {} values",
                vector.names.len(),
                vector.values.len()
            ));
        }

        let mut seen = HashSet::new();
        for name in &vector.names {
            if !seen.insert(name.as_str()) {
                problems.push(format!("slot '{name}' appears more than once"));
            }
        }
        for slot in &schema.slots {
            if !seen.contains(slot.name.as_str()) {
                problems.push(format!("slot '{}' is missing", slot.name));
            }
        }

        for (i, slot) in schema.slots.iter().enumerate() {
            match vector.names.get(i) {
                Some(name) if *name != slot.name => problems.push(format!(
                    "position {i} holds '{name}', expected '{}'",
                    slot.name
                )),
                _ => {}
            }

            // Range checks only make sense once the name binding holds.
            if vector.names.get(i) != Some(&slot.name) {
                continue;
            }
            if let Some(&value) = vector.values.get(i) {
                if !value.is_finite() {
                    problems.push(format!("slot '{}' is not finite ({value})", slot.name));
                } else if !slot.range.contains(value) {
                    problems.push(format!(
                        "slot '{}' = {value} outside [{}, {}]",
                        slot.name, slot.range.min, slot.range.max
                    ));
                }
            }
        }

        if problems.is_empty() {
            return Ok(());
        }

        Err(SchemaMismatch {
            schema_version: schema.version.clone(),
            expected_len: schema.slot_count(),
            actual_len: vector.values.len(),
            expected_names: schema.slot_names(),
            actual_names: vector.names.clone(),
            problems,
        })
    }
}
