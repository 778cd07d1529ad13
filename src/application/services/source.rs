//! Entity source: reads flat entity documents.
//!
//! Accepted shapes:
//! - JSON object with an `entities` array, or a bare JSON array
//! - TOML with `[[entities]]` tables

use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::Entity;
use crate::infrastructure::traits::FileSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Toml,
}

impl SourceFormat {
    /// Pick the format from the file extension, falling back to the content.
    pub fn detect(path: &Path, content: &str) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => SourceFormat::Toml,
            Some(ext) if ext.eq_ignore_ascii_case("json") => SourceFormat::Json,
            _ => match content.trim_start().chars().next() {
                Some('{') | Some('[') if !content.trim_start().starts_with("[[") => SourceFormat::Json,
                _ => SourceFormat::Toml,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    Wrapped { entities: Vec<Entity> },
    Bare(Vec<Entity>),
}

#[derive(Deserialize)]
struct TomlDocument {
    #[serde(default)]
    entities: Vec<Entity>,
}

/// Loads entity collections through the `FileSystem` boundary.
pub struct EntitySource {
    fs: Arc<dyn FileSystem>,
}

impl EntitySource {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Read and parse the entities stored at `path`, in document order.
    pub fn load(&self, path: &Path) -> ApplicationResult<Vec<Entity>> {
        if !self.fs.is_file(path) {
            return Err(ApplicationError::SourceNotFound(path.to_path_buf()));
        }
        let content = self
            .fs
            .read_to_string(path)
            .with_path_context("read entity source", path)?;
        let format = SourceFormat::detect(path, &content);
        debug!("load: {} as {:?}", path.display(), format);

        Self::parse(&content, format).map_err(|message| ApplicationError::Source {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Parse a document; the error is a human readable message.
    pub fn parse(content: &str, format: SourceFormat) -> Result<Vec<Entity>, String> {
        match format {
            SourceFormat::Json => serde_json::from_str::<JsonDocument>(content)
                .map(|doc| match doc {
                    JsonDocument::Wrapped { entities } => entities,
                    JsonDocument::Bare(entities) => entities,
                })
                .map_err(|e| e.to_string()),
            SourceFormat::Toml => toml::from_str::<TomlDocument>(content)
                .map(|doc| doc.entities)
                .map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("people.json", "", SourceFormat::Json)]
    #[case("people.TOML", "", SourceFormat::Toml)]
    #[case("people", "  [{\"id\":\"a\"}]", SourceFormat::Json)]
    #[case("people", "[[entities]]\nid = \"a\"", SourceFormat::Toml)]
    fn given_path_and_content_when_detecting_then_format(
        #[case] path: &str,
        #[case] content: &str,
        #[case] expected: SourceFormat,
    ) {
        assert_eq!(SourceFormat::detect(Path::new(path), content), expected);
    }

    #[test]
    fn given_wrapped_json_when_parsing_then_entities_in_order() {
        let entities = EntitySource::parse(
            r#"{"entities":[{"id":"a"},{"id":"b","parent_id":"a"}]}"#,
            SourceFormat::Json,
        )
        .unwrap();

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[1].parent_id.as_deref(), Some("a"));
    }

    #[test]
    fn given_bare_json_array_when_parsing_then_accepted() {
        let entities =
            EntitySource::parse(r#"[{"id":"a","parentId":null}]"#, SourceFormat::Json).unwrap();
        assert_eq!(entities[0].parent_id, None);
    }

    #[test]
    fn given_toml_when_parsing_then_payload_kept() {
        let entities = EntitySource::parse(
            "[[entities]]\nid = \"a\"\nposition = \"CEO\"\nemail = \"a@corp\"\n",
            SourceFormat::Toml,
        )
        .unwrap();

        assert_eq!(entities[0].rank_hint, "CEO");
        assert_eq!(entities[0].payload["email"], "a@corp");
    }

    #[test]
    fn given_entity_without_id_when_parsing_then_error() {
        assert!(EntitySource::parse(r#"[{"name":"x"}]"#, SourceFormat::Json).is_err());
    }
}
