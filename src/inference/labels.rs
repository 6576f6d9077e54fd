//! Class label vocabulary
//!
//! An ordered list of disease labels, index-aligned with the classifier's
//! output vector, loaded from a JSON array (`class_names.json`).

use std::path::Path;

use crate::utils::error::{AgroDetectError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vocabulary {
    labels: Vec<String>,
}

impl Vocabulary {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(AgroDetectError::VocabularyLoad(
                "vocabulary is empty".to_string(),
            ));
        }
        Ok(Self { labels })
    }

    /// Load a JSON array of label strings
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            AgroDetectError::VocabularyLoad(format!("failed to read {:?}: {}", path, e))
        })?;
        let labels: Vec<String> = serde_json::from_str(&json).map_err(|e| {
            AgroDetectError::VocabularyLoad(format!("failed to parse {:?}: {}", path, e))
        })?;
        Self::new(labels)
    }

    /// Save as a JSON array
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.labels)
            .map_err(|e| AgroDetectError::VocabularyLoad(e.to_string()))?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Check the vocabulary is index-aligned with a model's output
    pub fn check_num_classes(&self, num_classes: usize) -> Result<()> {
        if self.labels.len() != num_classes {
            return Err(AgroDetectError::VocabularyLoad(format!(
                "vocabulary has {} labels but the model outputs {} classes",
                self.labels.len(),
                num_classes
            )));
        }
        Ok(())
    }
}

impl<S: Into<String>> FromIterator<S> for Vocabulary {
    /// Builds a vocabulary without the empty check; use [`Vocabulary::new`]
    /// for untrusted input.
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            labels: iter.into_iter().map(Into::into).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("class_names.json");
        std::fs::write(&path, r#"["Apple___Apple_scab", "Apple___healthy"]"#).unwrap();

        let vocab = Vocabulary::load(&path).unwrap();
        assert_eq!(vocab.len(), 2);
        assert_eq!(vocab.get(0), Some("Apple___Apple_scab"));
        assert_eq!(vocab.get(2), None);
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("labels.json");
        let vocab: Vocabulary = ["a", "b", "c"].into_iter().collect();

        vocab.save(&path).unwrap();
        assert_eq!(Vocabulary::load(&path).unwrap(), vocab);
    }

    #[test]
    fn test_load_failures() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"not": "a list"}"#).unwrap();
        let empty = dir.path().join("empty.json");
        std::fs::write(&empty, "[]").unwrap();

        for path in [bad, empty, dir.path().join("missing.json")] {
            assert!(matches!(
                Vocabulary::load(&path),
                Err(AgroDetectError::VocabularyLoad(_))
            ));
        }
    }

    #[test]
    fn test_class_count_check() {
        let vocab: Vocabulary = ["a", "b"].into_iter().collect();
        assert!(vocab.check_num_classes(2).is_ok());
        assert!(vocab.check_num_classes(38).is_err());
    }
}
