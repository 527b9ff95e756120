use crate::config::DetectorExportConfig;
use crate::detector::DetectionHead;
use crate::error::ExportError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Descriptor written next to an exported detector so consumers know the
/// input size and class table without opening the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorMetadata {
    pub description: String,
    pub version: String,
    pub created: String,
    pub source: String,
    pub task: String,
    pub batch: i64,
    pub imgsz: [i64; 2],
    pub stride: i64,
    pub num_classes: usize,
    pub names: BTreeMap<usize, String>,
}

impl DetectorMetadata {
    pub fn new(config: &DetectorExportConfig, head: &DetectionHead) -> Self {
        let source = config
            .model_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            description: format!("TorchScript export of {source}"),
            version: env!("CARGO_PKG_VERSION").to_string(),
            created: chrono::Utc::now().to_rfc3339(),
            source,
            task: "detect".to_string(),
            batch: config.batch,
            imgsz: [config.imgsz, config.imgsz],
            stride: config.stride,
            num_classes: head.num_classes,
            names: resolve_names(config.class_names.as_deref(), head.num_classes),
        }
    }

    pub fn write(&self, path: &Path) -> Result<(), ExportError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn read(path: &Path) -> Result<Self, ExportError> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}

/// `<output>.json`, e.g. `320n_ts.pt` → `320n_ts.pt.json`.
pub fn sidecar_path(output: &Path) -> PathBuf {
    let mut path = output.as_os_str().to_owned();
    path.push(".json");
    PathBuf::from(path)
}

/// Configured names when they cover every class, `class0..classN` otherwise.
pub fn resolve_names(configured: Option<&[String]>, num_classes: usize) -> BTreeMap<usize, String> {
    match configured {
        Some(names) if names.len() == num_classes => {
            names.iter().cloned().enumerate().collect()
        }
        Some(names) => {
            tracing::warn!(
                configured = names.len(),
                num_classes,
                "CLASS_NAMES does not match the detection head, using generic names"
            );
            generic_names(num_classes)
        }
        None => generic_names(num_classes),
    }
}

fn generic_names(num_classes: usize) -> BTreeMap<usize, String> {
    (0..num_classes).map(|i| (i, format!("class{i}"))).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_sidecar_path_appends_extension() {
        assert_eq!(
            sidecar_path(Path::new("models/320n_ts.pt")),
            PathBuf::from("models/320n_ts.pt.json")
        );
    }

    #[test]
    fn test_resolve_names() {
        let names = vec!["drawing".to_string(), "hentai".to_string()];
        let resolved = resolve_names(Some(&names), 2);
        assert_eq!(resolved[&0], "drawing");
        assert_eq!(resolved[&1], "hentai");

        let fallback = resolve_names(Some(&names), 3);
        assert_eq!(fallback.len(), 3);
        assert_eq!(fallback[&2], "class2");

        assert_eq!(resolve_names(None, 1)[&0], "class0");
    }

    #[test]
    fn test_metadata_survives_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.pt.json");

        let mut config = DetectorExportConfig::with_paths("models/320n.pt", "out.pt");
        config.class_names = Some(vec!["a".into(), "b".into(), "c".into()]);
        let head = DetectionHead {
            num_classes: 3,
            anchors: 2100,
        };

        let metadata = DetectorMetadata::new(&config, &head);
        metadata.write(&path).unwrap();
        let loaded = DetectorMetadata::read(&path).unwrap();

        assert_eq!(loaded, metadata);
        assert_eq!(loaded.source, "320n.pt");
        assert_eq!(loaded.imgsz, [320, 320]);
        assert_eq!(loaded.names[&2], "c");

        // Class table keys are written as JSON object keys
        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["names"]["1"], "b");
        assert_eq!(raw["task"], "detect");
    }
}
