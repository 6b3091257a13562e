//! YAML manifest of declared resources.
//!
//! ```yaml
//! - namespace: monitoring
//!   name: checkout-errors
//!   kind: logs_metric
//!   jsonSpec: |
//!     {"data": {"id": "checkout.errors", "attributes": {"compute": {"aggregation_type": "count"}}}}
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use serde::Deserialize;
use syncer_core::{Error, Result};
use syncer_reconciler::{DeclaredSpec, ResourceKey, ResourceKind};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ManifestEntry {
    namespace: String,
    name: String,
    kind: String,
    json_spec: String,
}

impl ManifestEntry {
    fn into_spec(self, index: usize) -> Result<DeclaredSpec> {
        for (field, value) in [
            ("namespace", &self.namespace),
            ("name", &self.name),
            ("kind", &self.kind),
        ] {
            if value.trim().is_empty() {
                return Err(Error::invalid_config(format!(
                    "manifest entry {index}: {field} must not be empty"
                )));
            }
        }
        Ok(DeclaredSpec::new(
            ResourceKey::new(self.namespace, self.name),
            ResourceKind::new(self.kind),
            self.json_spec,
        ))
    }
}

/// Parse manifest text. An empty document declares nothing.
///
/// # Errors
///
/// Returns `YamlParseFailed` for malformed YAML and `InvalidConfig` for
/// empty identifiers or a key declared twice.
pub fn parse_manifest(text: &str) -> Result<Vec<DeclaredSpec>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let entries: Vec<ManifestEntry> =
        serde_yaml::from_str(text).map_err(|e| Error::yaml_parse_failed(e.to_string()))?;

    let mut seen = BTreeSet::new();
    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            let spec = entry.into_spec(index)?;
            if seen.insert(spec.key.clone()) {
                Ok(spec)
            } else {
                Err(Error::invalid_config(format!(
                    "resource {} is declared more than once",
                    spec.key
                )))
            }
        })
        .collect()
}

/// Load a manifest file.
///
/// # Errors
///
/// Returns `FileReadFailed` if the file cannot be read, otherwise the errors
/// of [`parse_manifest`].
pub fn load_manifest(path: &Path) -> Result<Vec<DeclaredSpec>> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
    let specs = parse_manifest(&text)?;
    tracing::debug!(path = %path.display(), resources = specs.len(), "Loaded manifest");
    Ok(specs)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::expect_used)]

    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"
- namespace: monitoring
  name: checkout-errors
  kind: logs_metric
  jsonSpec: |
    {"data": {"id": "checkout.errors", "attributes": {"compute": {"aggregation_type": "count"}}}}
- namespace: monitoring
  name: api-latency
  kind: logs_metric
  jsonSpec: '{"data": {"id": "api.latency"}}'
"#;

    #[test]
    fn test_parse_manifest() {
        let specs = parse_manifest(MANIFEST).unwrap();
        assert_eq!(specs.len(), 2);
        assert_eq!(specs[0].key, ResourceKey::new("monitoring", "checkout-errors"));
        assert_eq!(specs[0].kind.as_str(), "logs_metric");
        assert!(specs[0].json_spec.contains("checkout.errors"));
        assert_eq!(specs[1].json_spec, r#"{"data": {"id": "api.latency"}}"#);
    }

    #[test]
    fn test_empty_manifest() {
        assert!(parse_manifest("  \n").unwrap().is_empty());
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let text = r#"
- { namespace: a, name: b, kind: logs_metric, jsonSpec: "{}" }
- { namespace: a, name: b, kind: logs_metric, jsonSpec: "{}" }
"#;
        let err = parse_manifest(text).unwrap_err();
        assert!(err.to_string().contains("a/b"));
    }

    #[test]
    fn test_blank_kind_rejected() {
        let text = r#"- { namespace: a, name: b, kind: " ", jsonSpec: "{}" }"#;
        assert!(matches!(
            parse_manifest(text),
            Err(Error::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let text = r#"- { namespace: a, name: b, kind: k, jsonSpec: "{}", spec: {} }"#;
        assert!(matches!(
            parse_manifest(text),
            Err(Error::YamlParseFailed { .. })
        ));
    }

    #[test]
    fn test_load_manifest_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        assert_eq!(load_manifest(file.path()).unwrap().len(), 2);
    }
}
