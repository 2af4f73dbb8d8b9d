//! Model Schema Registry: process-wide, read-only map of model version → schema.
//!
//! Loaded once at startup from the manifests published with each model artifact.
//! Anything inconsistent is a `Configuration` error and stops the process from
//! serving; it is never patched up per request.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::errors::AppError;
use crate::features::extractor::{is_categorical_signal, signal_default};
use crate::schema::{DefaultPolicy, FeatureSlot, ModelManifest, ModelSchema, SlotSource};

#[derive(Debug, Clone)]
pub struct ModelSchemaRegistry {
    schemas: BTreeMap<String, Arc<ModelSchema>>,
    current: Arc<ModelSchema>,
}

impl ModelSchemaRegistry {
    /// Loads every `*.json` manifest in `dir`. `current` must name one of them.
    pub fn load_dir(dir: &Path, current: &str) -> Result<Self, AppError> {
        let entries = fs::read_dir(dir).map_err(|e| {
            AppError::Configuration(format!(
                "cannot read schema directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| {
                    AppError::Configuration(format!("cannot list {}: {e}", dir.display()))
                })?
                .path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut schemas = Vec::with_capacity(paths.len());
        for path in &paths {
            let raw = fs::read_to_string(path).map_err(|e| {
                AppError::Configuration(format!("cannot read manifest {}: {e}", path.display()))
            })?;
            let manifest: ModelManifest = serde_json::from_str(&raw).map_err(|e| {
                AppError::Configuration(format!("invalid manifest {}: {e}", path.display()))
            })?;
            let schema = schema_from_manifest(manifest)?;
            info!(
                "Loaded schema '{}' ({} slots) from {}",
                schema.version,
                schema.slot_count(),
                path.display()
            );
            schemas.push(schema);
        }

        Self::from_schemas(schemas, current)
    }

    /// Builds a registry from already-parsed schemas, applying the same checks
    /// as manifest loading.
    pub fn from_schemas(schemas: Vec<ModelSchema>, current: &str) -> Result<Self, AppError> {
        if schemas.is_empty() {
            return Err(AppError::Configuration(
                "no model schemas were found".to_string(),
            ));
        }

        let mut map = BTreeMap::new();
        for schema in schemas {
            check_slots(&schema.version, &schema.slots)?;
            let version = schema.version.clone();
            if map.insert(version.clone(), Arc::new(schema)).is_some() {
                return Err(AppError::Configuration(format!(
                    "model version '{version}' is declared more than once"
                )));
            }
        }

        let current = map.get(current).cloned().ok_or_else(|| {
            AppError::Configuration(format!(
                "configured model version '{current}' is not in the registry (known: {})",
                map.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })?;
        debug!("Current model schema: {}", current.version);

        Ok(Self {
            schemas: map,
            current,
        })
    }

    /// Per-request lookup. Unknown versions are the caller's problem.
    pub fn get(&self, version: &str) -> Result<Arc<ModelSchema>, AppError> {
        self.schemas
            .get(version)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("unknown model version '{version}'")))
    }

    pub fn current(&self) -> Arc<ModelSchema> {
        Arc::clone(&self.current)
    }

    /// `get(version)` when a version is given, `current()` otherwise.
    pub fn resolve(&self, version: Option<&str>) -> Result<Arc<ModelSchema>, AppError> {
        match version {
            Some(v) => self.get(v),
            None => Ok(self.current()),
        }
    }

    pub fn versions(&self) -> Vec<&str> {
        self.schemas.keys().map(String::as_str).collect()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<ModelSchema>> {
        self.schemas.values()
    }
}

/// Cross-checks a manifest's slots against what the artifact reports about itself.
pub fn schema_from_manifest(manifest: ModelManifest) -> Result<ModelSchema, AppError> {
    let version = &manifest.model_version;
    if version.trim().is_empty() {
        return Err(AppError::Configuration(
            "manifest has an empty model_version".to_string(),
        ));
    }

    if manifest.n_features_in != manifest.feature_names.len()
        || manifest.n_features_in != manifest.slots.len()
    {
        return Err(AppError::Configuration(format!(
            "schema '{version}': model reports {} input features but lists {} feature names and declares {} slots",
            manifest.n_features_in,
            manifest.feature_names.len(),
            manifest.slots.len()
        )));
    }

    for (i, (slot, reported)) in manifest
        .slots
        .iter()
        .zip(&manifest.feature_names)
        .enumerate()
    {
        if slot.name != *reported {
            return Err(AppError::Configuration(format!(
                "schema '{version}': slot {i} is '{}' but the model expects '{reported}' at that position",
                slot.name
            )));
        }
    }

    Ok(ModelSchema {
        version: manifest.model_version,
        description: manifest.description,
        slots: manifest.slots,
    })
}

fn check_slots(version: &str, slots: &[FeatureSlot]) -> Result<(), AppError> {
    if slots.is_empty() {
        return Err(AppError::Configuration(format!(
            "schema '{version}' declares no slots"
        )));
    }

    let mut seen = HashSet::new();
    for slot in slots {
        let fail = |msg: String| {
            Err(AppError::Configuration(format!(
                "schema '{version}', slot '{}': {msg}",
                slot.name
            )))
        };

        if !seen.insert(slot.name.as_str()) {
            return fail("duplicate slot name".to_string());
        }

        let range = slot.range;
        if !range.min.is_finite() || !range.max.is_finite() || range.min > range.max {
            return fail(format!("invalid range [{}, {}]", range.min, range.max));
        }

        match &slot.source {
            SlotSource::Signal { signal, scale } => {
                if !scale.is_finite() {
                    return fail(format!("non-finite scale {scale}"));
                }
                if is_categorical_signal(signal) {
                    return fail(format!("'{signal}' is categorical; use an indicator slot"));
                }
            }
            SlotSource::Indicator { signal, category } => {
                if !is_categorical_signal(signal) {
                    return fail(format!("'{signal}' is not a categorical signal"));
                }
                if category.trim().is_empty() {
                    return fail("indicator with an empty category".to_string());
                }
            }
        }

        let default = match (&slot.default, &slot.source) {
            (DefaultPolicy::Constant { value }, _) => *value,
            (DefaultPolicy::SignalTable, SlotSource::Indicator { .. }) => 0.0,
            (DefaultPolicy::SignalTable, SlotSource::Signal { signal, scale }) => {
                match signal_default(signal) {
                    Some(value) => value * scale,
                    None => {
                        return fail(format!("no table default exists for signal '{signal}'"))
                    }
                }
            }
        };
        if !default.is_finite() || !range.contains(default) {
            return fail(format!(
                "default {default} lies outside [{}, {}]",
                range.min, range.max
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SlotRange;
    use crate::test_support::{candidate_strength_schema, numeric_slot};
    use std::path::PathBuf;

    fn shipped_schemas() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("schemas")
    }

    fn manifest_json(version: &str, names: &[&str], slots: &[&str]) -> String {
        let slots: Vec<String> = slots
            .iter()
            .map(|name| {
                format!(
                    r#"{{ "name": "{name}", "source": {{ "kind": "signal", "signal": "skill_count" }},
                         "range": {{ "min": 0, "max": 100 }}, "default": {{ "policy": "signal_table" }} }}"#
                )
            })
            .collect();
        format!(
            r#"{{ "model_version": "{version}", "n_features_in": {}, "feature_names": {:?}, "slots": [{}] }}"#,
            names.len(),
            names,
            slots.join(",")
        )
    }

    #[test]
    fn test_shipped_manifests_load() {
        let registry =
            ModelSchemaRegistry::load_dir(&shipped_schemas(), "candidate-strength-v2").unwrap();
        assert_eq!(
            registry.versions(),
            vec!["candidate-strength-v2", "placement-rf-v1"]
        );
        assert_eq!(registry.current().slot_count(), 18);
        assert_eq!(registry.get("placement-rf-v1").unwrap().slot_count(), 18);
    }

    #[test]
    fn test_shipped_placement_schema_has_neutral_gender_default() {
        let registry =
            ModelSchemaRegistry::load_dir(&shipped_schemas(), "placement-rf-v1").unwrap();
        let schema = registry.current();
        let slot = schema
            .slots
            .iter()
            .find(|s| s.name == "Gender_Male")
            .unwrap();
        assert_eq!(slot.default, DefaultPolicy::Constant { value: 0.5 });
        assert!(!slot.required);
    }

    #[test]
    fn test_load_dir_ignores_non_json_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            manifest_json("a", &["x", "y"], &["x", "y"]),
        )
        .unwrap();
        fs::write(dir.path().join("README.md"), "not a manifest").unwrap();

        let registry = ModelSchemaRegistry::load_dir(dir.path(), "a").unwrap();
        assert_eq!(registry.versions(), vec!["a"]);
        assert_eq!(registry.current().slot_names(), vec!["x", "y"]);
    }

    #[test]
    fn test_load_dir_rejects_count_disagreement() {
        let dir = tempfile::tempdir().unwrap();
        let mut raw = manifest_json("a", &["x", "y"], &["x", "y"]);
        raw = raw.replace(r#""n_features_in": 2"#, r#""n_features_in": 13"#);
        fs::write(dir.path().join("a.json"), raw).unwrap();

        let err = ModelSchemaRegistry::load_dir(dir.path(), "a").unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("13 input features")));
    }

    #[test]
    fn test_load_dir_rejects_reordered_slots() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.json"),
            manifest_json("a", &["x", "y"], &["y", "x"]),
        )
        .unwrap();

        let err = ModelSchemaRegistry::load_dir(dir.path(), "a").unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("slot 0 is 'y'")));
    }

    #[test]
    fn test_load_dir_rejects_invalid_json() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), "{ not json").unwrap();
        let err = ModelSchemaRegistry::load_dir(dir.path(), "a").unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("invalid manifest")));
    }

    #[test]
    fn test_load_dir_missing_directory() {
        let err = ModelSchemaRegistry::load_dir(Path::new("/nonexistent/schemas"), "a").unwrap_err();
        assert!(matches!(err, AppError::Configuration(_)));
    }

    #[test]
    fn test_empty_directory_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = ModelSchemaRegistry::load_dir(dir.path(), "a").unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("no model schemas")));
    }

    #[test]
    fn test_unknown_current_version_fails_fast() {
        let err =
            ModelSchemaRegistry::from_schemas(vec![candidate_strength_schema()], "v-missing")
                .unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("v-missing")));
    }

    #[test]
    fn test_duplicate_versions_rejected() {
        let err = ModelSchemaRegistry::from_schemas(
            vec![candidate_strength_schema(), candidate_strength_schema()],
            "candidate-strength-v2",
        )
        .unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("more than once")));
    }

    #[test]
    fn test_get_unknown_version_is_not_found() {
        let registry = ModelSchemaRegistry::from_schemas(
            vec![candidate_strength_schema()],
            "candidate-strength-v2",
        )
        .unwrap();
        assert!(matches!(registry.get("nope"), Err(AppError::NotFound(_))));
        assert_eq!(
            registry.resolve(None).unwrap().version,
            "candidate-strength-v2"
        );
        assert!(registry.resolve(Some("candidate-strength-v2")).is_ok());
    }

    fn schema_with(slot: FeatureSlot) -> ModelSchema {
        ModelSchema {
            version: "t".to_string(),
            description: String::new(),
            slots: vec![slot],
        }
    }

    fn check(slot: FeatureSlot) -> Result<ModelSchemaRegistry, AppError> {
        ModelSchemaRegistry::from_schemas(vec![schema_with(slot)], "t")
    }

    #[test]
    fn test_duplicate_slot_names_rejected() {
        let mut schema = schema_with(numeric_slot("skill_count", 0.0, 10.0, true));
        schema.slots.push(numeric_slot("skill_count", 0.0, 10.0, true));
        let err = ModelSchemaRegistry::from_schemas(vec![schema], "t").unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn test_inverted_range_rejected() {
        let slot = numeric_slot("skill_count", 10.0, 0.0, true);
        assert!(matches!(check(slot), Err(AppError::Configuration(_))));
    }

    #[test]
    fn test_default_outside_range_rejected() {
        let mut slot = numeric_slot("cgpa", 0.0, 1.0, true);
        slot.default = DefaultPolicy::Constant { value: 7.5 };
        let err = check(slot).unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("outside")));
    }

    #[test]
    fn test_scaled_table_default_must_fit_range() {
        // cgpa table default 0.5 × 10 = 5.0 fits [0, 10] but not [0, 1] at scale 10.
        let mut slot = numeric_slot("cgpa", 0.0, 10.0, true);
        slot.source = SlotSource::Signal {
            signal: "cgpa".to_string(),
            scale: 10.0,
        };
        assert!(check(slot.clone()).is_ok());

        slot.range = SlotRange { min: 0.0, max: 1.0 };
        assert!(check(slot).is_err());
    }

    #[test]
    fn test_table_default_requires_known_signal() {
        let slot = numeric_slot("age", 0.0, 100.0, false);
        let err = check(slot).unwrap_err();
        assert!(matches!(err, AppError::Configuration(ref m) if m.contains("no table default")));
    }

    #[test]
    fn test_indicator_must_use_categorical_signal() {
        let mut slot = numeric_slot("Degree_BCA", 0.0, 1.0, false);
        slot.source = SlotSource::Indicator {
            signal: "skill_count".to_string(),
            category: "bca".to_string(),
        };
        assert!(check(slot).is_err());

        let mut slot = numeric_slot("degree", 0.0, 1.0, false);
        slot.source = SlotSource::Signal {
            signal: "degree_type".to_string(),
            scale: 1.0,
        };
        assert!(check(slot).is_err());
    }
}
