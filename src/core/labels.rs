//! 分类标签本地化

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use log::info;

use super::error::DetectError;

/// Class-id → human label mapping.
pub trait LabelLookup: Send + Sync {
    fn lookup(&self, key: &str) -> Option<String>;
}

/// Static lookup table loaded from a JSON object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabelTable {
    entries: HashMap<String, String>,
}

impl LabelTable {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, DetectError> {
        let entries: HashMap<String, String> = serde_json::from_str(json).map_err(|e| {
            DetectError::InvalidArgument(format!("label table is not a JSON string map: {}", e))
        })?;
        Ok(Self::new(entries))
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, DetectError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            DetectError::InvalidArgument(format!(
                "failed to read label table {}: {}",
                path.display(),
                e
            ))
        })?;
        let table = Self::from_json_str(&json)?;
        info!("🏷️ Loaded {} labels from {}", table.len(), path.display());
        Ok(table)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Localized label for a raw model class name.
    pub fn localize(&self, class_name: &str) -> Option<String> {
        self.lookup(&label_key(class_name))
    }
}

impl LabelLookup for LabelTable {
    fn lookup(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }
}

/// Lookup key for a class name: the text before the first comma, with
/// whitespace runs collapsed to `_`.
///
/// `"tabby cat, Felis domesticus"` → `"tabby_cat"`.
pub fn label_key(class_name: &str) -> String {
    let first = class_name.split(',').next().unwrap_or_default();
    first.split_whitespace().collect::<Vec<_>>().join("_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_label_key() {
        assert_eq!(label_key("tabby cat, Felis domesticus"), "tabby_cat");
        assert_eq!(label_key("great  white\tshark,white shark"), "great_white_shark");
        assert_eq!(label_key("goldfish"), "goldfish");
        assert_eq!(label_key(""), "");
    }

    #[test]
    fn test_localize_hit_and_miss() {
        let table = LabelTable::from_json_str(r#"{"tabby_cat": "虎斑猫"}"#).unwrap();

        assert_eq!(
            table.localize("tabby cat, Felis domesticus").as_deref(),
            Some("虎斑猫")
        );
        assert_eq!(table.localize("Egyptian cat"), None);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = LabelTable::from_json_str("[1, 2]").unwrap_err();
        assert!(matches!(err, DetectError::InvalidArgument(_)));
    }

    #[test]
    fn test_from_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"goldfish": "金鱼", "tench": "丁鲷"}}"#).unwrap();

        let table = LabelTable::from_path(file.path()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.localize("goldfish, Carassius auratus").as_deref(), Some("金鱼"));
    }

    #[test]
    fn test_missing_file() {
        assert!(LabelTable::from_path("/definitely/not/here.json").is_err());
    }
}
