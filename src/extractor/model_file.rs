//! Loader for pre-extracted model documents (`.json`, `.yaml`, `.yml`).

use std::path::Path;
use tracing::info;

use super::EntityExtractor;
use crate::error::{DecompositionError, DecompositionResult};
use crate::model::ExtractedModel;

/// Reads an [`ExtractedModel`] serialized by another front-end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelFileExtractor;

impl ModelFileExtractor {
    pub fn supports(path: &Path) -> bool {
        matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("json") | Some("yaml") | Some("yml")
        )
    }

    pub fn parse(path: &Path, content: &str) -> DecompositionResult<ExtractedModel> {
        let unparsable = |reason: String| DecompositionError::UnparsableSource {
            path: path.display().to_string(),
            reason,
        };
        let raw: ExtractedModel = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(content).map_err(|e| unparsable(e.to_string()))?,
            _ => serde_yaml::from_str(content).map_err(|e| unparsable(e.to_string()))?,
        };
        Ok(ExtractedModel::new(raw.entities, raw.relationships))
    }
}

impl EntityExtractor for ModelFileExtractor {
    fn name(&self) -> &'static str {
        "model_file"
    }

    fn extract(&self, source: &Path) -> DecompositionResult<ExtractedModel> {
        let content =
            std::fs::read_to_string(source).map_err(|e| DecompositionError::io(source, e))?;
        let model = Self::parse(source, &content)?;
        info!(
            path = %source.display(),
            entities = model.entities.len(),
            relationships = model.relationships.len(),
            "Model file loaded"
        );
        Ok(model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityId;
    use std::io::Write;

    const YAML: &str = r#"
entities:
  - id: 2
    name: Order
    attributes:
      - name: Id
        semantic_type: integer
        constraints: [primary_key]
  - id: 1
    name: User
relationships:
  - from_entity: 2
    to_entity: 1
    kind: one_to_many
    required: true
"#;

    #[test]
    fn test_yaml_model_is_normalized() {
        let model = ModelFileExtractor::parse(Path::new("model.yaml"), YAML).unwrap();
        assert_eq!(model.entities[0].name, "User");
        assert_eq!(model.entity(EntityId(2)).unwrap().relationships.len(), 1);
        assert!(model.entity(EntityId(2)).unwrap().attributes[0].is_primary_key());
    }

    #[test]
    fn test_json_file_round_trip() {
        let model = ModelFileExtractor::parse(Path::new("model.yaml"), YAML).unwrap();
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(serde_json::to_string(&model).unwrap().as_bytes())
            .unwrap();

        let loaded = ModelFileExtractor.extract(file.path()).unwrap();
        assert_eq!(loaded, model);
    }

    #[test]
    fn test_malformed_document() {
        let err = ModelFileExtractor::parse(Path::new("model.json"), "{ not json").unwrap_err();
        assert!(matches!(
            err,
            DecompositionError::UnparsableSource { ref path, .. } if path == "model.json"
        ));
    }
}
