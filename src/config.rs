//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/orgtree/orgtree.toml`
//! 3. Local config: `<dir>/.orgtree.toml`
//! 4. Environment variables: `ORGTREE_*` prefix

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::{default_rank_groups, BuildMode, OrphanPolicy, RankGroup, DEFAULT_EXPAND_DEPTH};

/// Raw settings for intermediate parsing (Option to detect "not specified").
///
/// Used during layered config merging to distinguish between:
/// - `None` → field not specified, inherit from base
/// - `Some([])` → explicit empty table
/// - `Some([...])` → explicit values to merge
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub mode: Option<BuildMode>,
    pub expand_depth: Option<usize>,
    pub orphan_policy: Option<OrphanPolicy>,
    pub source: Option<PathBuf>,
    pub rank: Option<Vec<RankGroup>>,
}

/// Unified configuration for orgtree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Materialization mode for `tree` and `show`
    pub mode: BuildMode,
    /// Nodes shallower than this start expanded in eager mode
    pub expand_depth: usize,
    /// Default for `remove` when no `--policy` is given
    pub orphan_policy: OrphanPolicy,
    /// Input document used when a command gets no FILE
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<PathBuf>,
    /// Rank groups, most senior first
    pub rank: Vec<RankGroup>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mode: BuildMode::default(),
            expand_depth: DEFAULT_EXPAND_DEPTH,
            orphan_policy: OrphanPolicy::default(),
            source: None,
            rank: default_rank_groups(),
        }
    }
}

/// Merge arrays with union semantics and negation support.
///
/// - Items from overlay are added to base
/// - Items prefixed with `!` remove the corresponding item from the result
/// - Items prefixed with `!!` are kept verbatim as `!`-exclusions
/// - Duplicates are de-duplicated, base order is kept
///
/// # Examples
/// ```ignore
/// merge_array(&["a", "b"], &["c"])       // → ["a", "b", "c"]
/// merge_array(&["a", "b"], &["!a", "c"]) // → ["b", "c"]
/// ```
pub fn merge_array(base: &[String], overlay: &[String]) -> Vec<String> {
    let mut removed: HashSet<&str> = HashSet::new();
    let mut added: Vec<String> = Vec::new();

    for pattern in overlay {
        if let Some(exclusion) = pattern.strip_prefix("!!") {
            added.push(format!("!{exclusion}"));
        } else if let Some(negated) = pattern.strip_prefix('!') {
            removed.insert(negated);
        } else {
            added.push(pattern.clone());
        }
    }

    let mut seen = HashSet::new();
    base.iter()
        .chain(added.iter())
        .filter(|item| !removed.contains(item.as_str()))
        .filter(|item| seen.insert(item.as_str()))
        .cloned()
        .collect()
}

/// Merge rank groups by name: keywords of a known group are unioned, unknown
/// groups are appended at the lowest seniority.
pub fn merge_rank_groups(base: &[RankGroup], overlay: &[RankGroup]) -> Vec<RankGroup> {
    let mut result = base.to_vec();
    for group in overlay {
        match result.iter_mut().find(|g| g.name == group.name) {
            Some(existing) => existing.keywords = merge_array(&existing.keywords, &group.keywords),
            None => result.push(RankGroup {
                name: group.name.clone(),
                keywords: merge_array(&[], &group.keywords),
            }),
        }
    }
    result
}

/// Get the XDG config directory for orgtree.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "orgtree").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("orgtree.toml"))
}

/// Get the path to the local config file in a directory.
pub fn local_config_path(dir: &Path) -> PathBuf {
    dir.join(".orgtree.toml")
}

/// Expand `~`, `$VAR` and `${VAR}`; unknown variables leave the input as is.
pub fn expand_env_vars(path: &str) -> String {
    shellexpand::full(path)
        .map(|s| s.into_owned())
        .unwrap_or_else(|_| path.to_string())
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        if let Some(source) = &self.source {
            self.source = Some(PathBuf::from(expand_env_vars(&source.to_string_lossy())));
        }
    }

    /// Merge overlay config onto self (base) with union semantics for rank keywords.
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            mode: overlay.mode.unwrap_or(self.mode),
            expand_depth: overlay.expand_depth.unwrap_or(self.expand_depth),
            orphan_policy: overlay.orphan_policy.unwrap_or(self.orphan_policy),
            source: overlay.source.clone().or_else(|| self.source.clone()),
            rank: overlay
                .rank
                .as_ref()
                .map(|o| merge_rank_groups(&self.rank, o))
                .unwrap_or_else(|| self.rank.clone()),
        }
    }

    /// Apply global config onto defaults with REPLACE semantics for rank groups.
    ///
    /// A global `[[rank]]` table defines the whole classification baseline.
    fn apply_global(&self, global: &RawSettings) -> Self {
        Self {
            mode: global.mode.unwrap_or(self.mode),
            expand_depth: global.expand_depth.unwrap_or(self.expand_depth),
            orphan_policy: global.orphan_policy.unwrap_or(self.orphan_policy),
            source: global.source.clone().or_else(|| self.source.clone()),
            rank: global.rank.clone().unwrap_or_else(|| self.rank.clone()),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `local_dir` - Optional directory holding a `.orgtree.toml`
    ///
    /// # Merge Semantics
    /// - Defaults → Global: REPLACE
    /// - Global → Local: rank keywords UNION with negation support
    /// - Any → Env vars: REPLACE (explicit user override)
    pub fn load(local_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        if let Some(global_path) = global_config_path() {
            if global_path.exists() {
                let raw = load_raw_settings(&global_path)?;
                current = current.apply_global(&raw);
            }
        }

        if let Some(dir) = local_dir {
            let local_path = local_config_path(dir);
            if local_path.exists() {
                let raw = load_raw_settings(&local_path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply ORGTREE_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(
                Environment::with_prefix("ORGTREE")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .map_err(config_err)?;

        if let Ok(val) = config.get_string("mode") {
            settings.mode = parse_value("ORGTREE_MODE", &val)?;
        }
        if let Ok(val) = config.get_string("expand_depth") {
            settings.expand_depth = val.trim().parse().map_err(|e| ApplicationError::Config {
                message: format!("ORGTREE_EXPAND_DEPTH={val}: {e}"),
            })?;
        }
        if let Ok(val) = config.get_string("orphan_policy") {
            settings.orphan_policy = parse_value("ORGTREE_ORPHAN_POLICY", &val)?;
        }
        if let Ok(val) = config.get_string("source") {
            settings.source = Some(PathBuf::from(val));
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# orgtree configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/orgtree/orgtree.toml  (defines your baseline)
#   Local:  ./.orgtree.toml                 (project-specific additions)
#   Env:    ORGTREE_* environment variables (explicit overrides)
#
# Rank groups:
#   Global [[rank]] tables REPLACE the compiled defaults.
#   Local [[rank]] tables are merged by name; keywords UNION with global.
#   Use "!keyword" in local config to REMOVE an inherited keyword,
#   "!!keyword" to add an exclusion ("!vice president").

# eager | lazy
# mode = "eager"

# Nodes shallower than this start expanded (eager mode)
# expand_depth = 2

# Children of a removed entity: promote | reattach
# orphan_policy = "promote"

# Default input document
# source = "~/org/people.json"

# [[rank]]
# name = "executive"
# keywords = ["chief", "ceo", "founder", "president", "!vice president"]
#
# [[rank]]
# name = "director"
# keywords = ["director", "head"]
"#
        .to_string()
    }
}

fn parse_value<T: serde::de::DeserializeOwned>(name: &str, value: &str) -> Result<T, ApplicationError> {
    T::deserialize(serde::de::value::StrDeserializer::<serde::de::value::Error>::new(
        &value.trim().to_lowercase(),
    ))
    .map_err(|e| ApplicationError::Config {
        message: format!("{name}={value}: {e}"),
    })
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(items: &[&str]) -> Vec<String> {
        items.iter().map(|i| i.to_string()).collect()
    }

    #[test]
    fn given_defaults_when_created_then_eager_with_default_ranks() {
        let settings = Settings::default();
        assert_eq!(settings.mode, BuildMode::Eager);
        assert_eq!(settings.expand_depth, 2);
        assert_eq!(settings.orphan_policy, OrphanPolicy::PromoteToRoot);
        assert_eq!(settings.rank[0].name, "executive");
    }

    #[test]
    fn given_tilde_in_source_when_expand_paths_then_expands_to_home() {
        let mut settings = Settings {
            source: Some(PathBuf::from("~/org.json")),
            ..Settings::default()
        };

        settings.expand_paths();

        let home = std::env::var("HOME").expect("HOME should be set");
        let source = settings.source.unwrap();
        assert!(source.to_string_lossy().starts_with(&home));
    }

    #[test]
    fn test_merge_array_union() {
        assert_eq!(merge_array(&s(&["a", "b"]), &s(&["c"])), s(&["a", "b", "c"]));
    }

    #[test]
    fn test_merge_array_negation() {
        assert_eq!(merge_array(&s(&["a", "b"]), &s(&["!a", "c"])), s(&["b", "c"]));
    }

    #[test]
    fn test_merge_array_negation_nonexistent() {
        assert_eq!(merge_array(&s(&["a", "b"]), &s(&["!x"])), s(&["a", "b"]));
    }

    #[test]
    fn test_merge_array_exclusion_keyword() {
        assert_eq!(
            merge_array(&s(&["president"]), &s(&["!!vice president"])),
            s(&["president", "!vice president"])
        );
    }

    #[test]
    fn test_merge_array_duplicates() {
        assert_eq!(merge_array(&s(&["a", "b"]), &s(&["a", "c"])), s(&["a", "b", "c"]));
    }

    #[test]
    fn test_merge_rank_groups_by_name() {
        let base = vec![RankGroup::new("director", &["director", "head"])];
        let overlay = vec![
            RankGroup::new("director", &["!head", "dean"]),
            RankGroup::new("intern", &["intern"]),
        ];

        let result = merge_rank_groups(&base, &overlay);

        assert_eq!(result[0].keywords, s(&["director", "dean"]));
        assert_eq!(result[1].name, "intern");
    }

    #[test]
    fn test_apply_global_replaces_rank_groups() {
        let global = RawSettings {
            mode: Some(BuildMode::Lazy),
            rank: Some(vec![RankGroup::new("boss", &["boss"])]),
            ..RawSettings::default()
        };

        let result = Settings::default().apply_global(&global);

        assert_eq!(result.mode, BuildMode::Lazy);
        assert_eq!(result.expand_depth, 2);
        assert_eq!(result.rank, vec![RankGroup::new("boss", &["boss"])]);
    }

    #[test]
    fn test_merge_with_keeps_base_when_not_specified() {
        let base = Settings {
            orphan_policy: OrphanPolicy::ReattachToGrandparent,
            ..Settings::default()
        };

        let result = base.merge_with(&RawSettings::default());

        assert_eq!(result, base);
    }

    #[test]
    fn given_template_when_parsed_then_valid_toml() {
        let raw: RawSettings = toml::from_str(&Settings::template()).unwrap();
        assert!(raw.mode.is_none());
    }

    #[test]
    fn given_policy_name_when_parsing_env_value_then_deserialized() {
        let policy: OrphanPolicy = parse_value("ORGTREE_ORPHAN_POLICY", " Reattach ").unwrap();
        assert_eq!(policy, OrphanPolicy::ReattachToGrandparent);
    }
}
