//! Rank classifier: maps a free-text title to an ordinal used for sibling ordering.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::domain::entities::{Entity, EntityKey};

/// Name reported for titles no group matches.
pub const UNCLASSIFIED: &str = "unclassified";

/// One row of the classification table.
///
/// Keywords match case-insensitively as substrings of the title, except
/// short acronyms which must be a whole word. A keyword prefixed with `!`
/// excludes: the group matches when any plain keyword matches and no
/// excluded keyword does.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RankGroup {
    pub name: String,
    pub keywords: Vec<String>,
}

impl RankGroup {
    pub fn new(name: &str, keywords: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }
}

/// Built-in table, most senior first.
pub fn default_rank_groups() -> Vec<RankGroup> {
    vec![
        RankGroup::new(
            "executive",
            &[
                "chief",
                "ceo",
                "cto",
                "cfo",
                "coo",
                "cio",
                "ciso",
                "founder",
                "president",
                "managing director",
                "!vice president",
            ],
        ),
        RankGroup::new("vice_president", &["vice president", "vp", "svp", "evp", "avp"]),
        RankGroup::new("director", &["director", "head"]),
        RankGroup::new("manager", &["manager", "lead", "leader", "supervisor"]),
        RankGroup::new("senior", &["senior", "sr", "principal", "staff", "architect"]),
    ]
}

/// Keywords this short are acronyms (`cto`, `vp`, `sr`) and only match a
/// whole word, optionally pluralized; longer ones match anywhere.
const ACRONYM_MAX_LEN: usize = 3;

#[derive(Debug, Clone)]
enum Keyword {
    Acronym(String),
    Substring(String),
}

impl Keyword {
    fn compile(keyword: &str) -> Option<Self> {
        let normalized = normalize(keyword);
        if normalized.is_empty() {
            return None;
        }
        if !normalized.contains(' ') && normalized.chars().count() <= ACRONYM_MAX_LEN {
            Some(Keyword::Acronym(normalized))
        } else {
            Some(Keyword::Substring(normalized))
        }
    }

    fn matches(&self, title: &str) -> bool {
        match self {
            Keyword::Acronym(acronym) => {
                let acronym = acronym.as_str();
                title
                    .split(' ')
                    .any(|word| word == acronym || word.strip_suffix('s') == Some(acronym))
            }
            Keyword::Substring(text) => title.contains(text.as_str()),
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledGroup {
    name: String,
    include: Vec<Keyword>,
    exclude: Vec<Keyword>,
}

impl CompiledGroup {
    fn compile(group: &RankGroup) -> Self {
        let mut include = Vec::new();
        let mut exclude = Vec::new();
        for keyword in &group.keywords {
            match keyword.strip_prefix('!') {
                Some(negated) => exclude.extend(Keyword::compile(negated)),
                None => include.extend(Keyword::compile(keyword)),
            }
        }
        Self {
            name: group.name.clone(),
            include,
            exclude,
        }
    }

    fn matches(&self, title: &str) -> bool {
        self.include.iter().any(|k| k.matches(title))
            && !self.exclude.iter().any(|k| k.matches(title))
    }
}

/// Lowercase, split on anything not alphanumeric and re-join with single
/// spaces, so "Vice-President" and "vice  president" compare equal.
fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic, pure title classifier.
#[derive(Debug, Clone)]
pub struct RankClassifier {
    groups: Vec<CompiledGroup>,
}

impl Default for RankClassifier {
    fn default() -> Self {
        Self::new(&default_rank_groups())
    }
}

impl RankClassifier {
    pub fn new(groups: &[RankGroup]) -> Self {
        Self {
            groups: groups.iter().map(CompiledGroup::compile).collect(),
        }
    }

    /// Ordinal of the first matching group; `unclassified()` when none match.
    pub fn classify(&self, rank_hint: &str) -> usize {
        let title = normalize(rank_hint);
        self.groups
            .iter()
            .position(|g| g.matches(&title))
            .unwrap_or_else(|| self.unclassified())
    }

    /// Lowest priority ordinal, sorted last.
    pub fn unclassified(&self) -> usize {
        self.groups.len()
    }

    pub fn group_name(&self, ordinal: usize) -> &str {
        self.groups
            .get(ordinal)
            .map(|g| g.name.as_str())
            .unwrap_or(UNCLASSIFIED)
    }

    pub fn sibling_key(&self, key: EntityKey, entity: &Entity) -> SiblingKey {
        SiblingKey {
            ordinal: self.classify(&entity.rank_hint),
            name: entity.display_name().to_lowercase(),
            display_name: entity.display_name().to_string(),
            id: entity.id.clone(),
            key,
        }
    }
}

/// Total order among siblings: rank ordinal, case-folded display name,
/// the display name as written, id, then input position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingKey {
    pub ordinal: usize,
    /// Case-folded, so "adam" sorts before "Bob"
    pub name: String,
    pub display_name: String,
    pub id: String,
    pub key: EntityKey,
}

impl Ord for SiblingKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordinal
            .cmp(&other.ordinal)
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.display_name.cmp(&other.display_name))
            .then_with(|| self.id.cmp(&other.id))
            .then_with(|| self.key.cmp(&other.key))
    }
}

impl PartialOrd for SiblingKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Chief Executive Officer", "executive")]
    #[case("CEO", "executive")]
    #[case("President", "executive")]
    #[case("Vice President, Sales", "vice_president")]
    #[case("VP Engineering", "vice_president")]
    #[case("Director of Engineering", "director")]
    #[case("Head of People", "director")]
    #[case("Engineering Manager", "manager")]
    #[case("Team Lead", "manager")]
    #[case("Senior Software Engineer", "senior")]
    #[case("Sr. Analyst", "senior")]
    #[case("Engineering Managers", "manager")]
    #[case("Supervisors", "manager")]
    #[case("Managing Directors", "executive")]
    #[case("Cofounder", "executive")]
    #[case("SeniorEngineer", "senior")]
    #[case("Regional VPs", "vice_president")]
    #[case("Vice-President", "vice_president")]
    #[case("Software Engineer", UNCLASSIFIED)]
    #[case("", UNCLASSIFIED)]
    fn given_title_when_classifying_then_matches_group(#[case] title: &str, #[case] group: &str) {
        let classifier = RankClassifier::default();
        assert_eq!(classifier.group_name(classifier.classify(title)), group);
    }

    #[test]
    fn given_acronym_inside_word_when_classifying_then_does_not_match() {
        let classifier = RankClassifier::default();
        // "cto" inside "director", "coo" inside "coordinator"
        assert_eq!(classifier.group_name(classifier.classify("Director")), "director");
        assert_eq!(classifier.classify("Coordinator"), classifier.unclassified());
    }

    #[test]
    fn given_mixed_case_when_classifying_then_case_insensitive() {
        let classifier = RankClassifier::default();
        assert_eq!(classifier.classify("eNgInEeRiNg MaNaGeR"), 3);
    }

    #[test]
    fn given_equal_rank_when_ordering_then_name_decides() {
        let classifier = RankClassifier::default();
        let a = classifier.sibling_key(EntityKey(1), &Entity::new("x").with_name("alice"));
        let b = classifier.sibling_key(EntityKey(0), &Entity::new("y").with_name("Bob"));
        assert!(a < b);
    }

    #[test]
    fn given_names_differing_only_in_case_when_ordering_then_display_name_decides() {
        let classifier = RankClassifier::default();
        let lower = classifier.sibling_key(EntityKey(0), &Entity::new("a").with_name("bob"));
        let upper = classifier.sibling_key(EntityKey(1), &Entity::new("b").with_name("Bob"));
        assert!(upper < lower);
    }
}
