//! Model schemas: the ordered, named feature slots a model version expects.
//!
//! A schema is published next to its model artifact as a JSON manifest
//! (`ModelManifest`) and is immutable once loaded.

pub mod registry;

use serde::{Deserialize, Serialize};

/// Where a slot's value comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotSource {
    /// A numeric signal, multiplied by `scale` (e.g. a 0–1 score sent as 0–10).
    Signal {
        signal: String,
        #[serde(default = "unit_scale")]
        scale: f64,
    },
    /// 1.0 when the categorical signal equals `category`, else 0.0.
    Indicator { signal: String, category: String },
}

impl SlotSource {
    pub fn signal(&self) -> &str {
        match self {
            SlotSource::Signal { signal, .. } | SlotSource::Indicator { signal, .. } => signal,
        }
    }
}

fn unit_scale() -> f64 {
    1.0
}

/// What a slot falls back to when its signal is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DefaultPolicy {
    Constant { value: f64 },
    /// The extractor's documented default for the signal, scaled like the signal.
    /// Indicator slots resolve to 0.
    SignalTable,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SlotRange {
    pub min: f64,
    pub max: f64,
}

impl SlotRange {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSlot {
    pub name: String,
    pub source: SlotSource,
    pub range: SlotRange,
    pub default: DefaultPolicy,
    /// A defaulted required slot marks the prediction degraded.
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSchema {
    pub version: String,
    pub description: String,
    pub slots: Vec<FeatureSlot>,
}

impl ModelSchema {
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub fn slot_names(&self) -> Vec<String> {
        self.slots.iter().map(|s| s.name.clone()).collect()
    }
}

/// On-disk manifest. `n_features_in` and `feature_names` are what the model
/// artifact reports about itself; `slots` must line up with them exactly.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelManifest {
    pub model_version: String,
    #[serde(default)]
    pub description: String,
    pub n_features_in: usize,
    pub feature_names: Vec<String>,
    pub slots: Vec<FeatureSlot>,
}
