//! Hierarchy service
//!
//! Loads an entity source, builds the forest with the configured classifier
//! and applies edits to it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use crate::application::services::EntitySource;
use crate::application::{ApplicationError, ApplicationResult};
use crate::config::Settings;
use crate::domain::{
    BuildMode, BuildOutput, Entity, Forest, MutationOutcome, OrphanPolicy, RankClassifier, TreeBuilder,
};
use crate::infrastructure::traits::FileSystem;

/// A forest after an accepted edit.
#[derive(Debug, Clone)]
pub struct EditResult {
    pub forest: Forest,
    pub outcome: MutationOutcome,
}

/// Service for building and editing organization hierarchies.
pub struct HierarchyService {
    source: EntitySource,
    settings: Arc<Settings>,
    classifier: RankClassifier,
}

impl HierarchyService {
    pub fn new(fs: Arc<dyn FileSystem>, settings: Arc<Settings>) -> Self {
        let classifier = RankClassifier::new(&settings.rank);
        Self {
            source: EntitySource::new(fs),
            settings,
            classifier,
        }
    }

    pub fn classifier(&self) -> &RankClassifier {
        &self.classifier
    }

    pub fn builder(&self) -> TreeBuilder {
        TreeBuilder::new()
            .with_classifier(self.classifier.clone())
            .with_expand_depth(self.settings.expand_depth)
    }

    /// The file to read: explicit argument first, then the configured `source`.
    pub fn resolve_source(&self, path: Option<&Path>) -> ApplicationResult<PathBuf> {
        path.map(Path::to_path_buf)
            .or_else(|| self.settings.source.clone())
            .ok_or(ApplicationError::NoSource)
    }

    pub fn load(&self, path: Option<&Path>) -> ApplicationResult<Vec<Entity>> {
        let path = self.resolve_source(path)?;
        let entities = self.source.load(&path)?;
        info!("loaded {} entities from {}", entities.len(), path.display());
        Ok(entities)
    }

    /// Build a forest; `mode` falls back to the configured one.
    #[instrument(level = "debug", skip(self))]
    pub fn build(&self, path: Option<&Path>, mode: Option<BuildMode>) -> ApplicationResult<BuildOutput> {
        let entities = self.load(path)?;
        let output = self
            .builder()
            .build(&entities, mode.unwrap_or(self.settings.mode));
        if !output.diagnostics.is_empty() {
            warn!("{} diagnostics while building", output.diagnostics.len());
        }
        Ok(output)
    }

    /// Build, then expand the given entities (their ancestors included).
    pub fn build_revealed(
        &self,
        path: Option<&Path>,
        mode: Option<BuildMode>,
        reveal: &[String],
    ) -> ApplicationResult<BuildOutput> {
        let mut output = self.build(path, mode)?;
        for id in reveal {
            let node = output.forest.reveal(id)?;
            output.forest.expand(node)?;
        }
        Ok(output)
    }

    /// Move `entity_id` under `new_parent_id` (root when `None`).
    #[instrument(level = "debug", skip(self))]
    pub fn reparent(
        &self,
        path: Option<&Path>,
        entity_id: &str,
        new_parent_id: Option<&str>,
    ) -> ApplicationResult<EditResult> {
        let mut forest = self.build(path, Some(BuildMode::Eager))?.forest;
        let outcome = forest.reparent(entity_id, new_parent_id)?;
        debug!("reparent {}: {:?}", entity_id, outcome);
        Ok(EditResult { forest, outcome })
    }

    /// Remove `entity_id`; `policy` falls back to the configured one.
    #[instrument(level = "debug", skip(self))]
    pub fn remove(
        &self,
        path: Option<&Path>,
        entity_id: &str,
        policy: Option<OrphanPolicy>,
    ) -> ApplicationResult<EditResult> {
        let mut forest = self.build(path, Some(BuildMode::Eager))?.forest;
        let outcome = forest.remove_entity(entity_id, policy.unwrap_or(self.settings.orphan_policy))?;
        debug!("remove {}: {:?}", entity_id, outcome);
        Ok(EditResult { forest, outcome })
    }

    /// Group name and ordinal for a free-text title.
    pub fn classify(&self, title: &str) -> (usize, &str) {
        let ordinal = self.classifier.classify(title);
        (ordinal, self.classifier.group_name(ordinal))
    }
}
