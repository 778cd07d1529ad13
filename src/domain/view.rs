//! Read-only projections of a forest for presentation.

use serde::Serialize;
use termtree::Tree;
use tracing::instrument;

use crate::domain::arena::{Forest, MaterializationState, NodeId};

/// Serializable snapshot of one node and its materialized children.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeView {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub rank_hint: String,
    pub rank: String,
    pub depth: usize,
    pub total_descendant_count: usize,
    pub direct_reports: usize,
    pub state: MaterializationState,
    pub expanded: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub flagged: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView>,
}

/// One line of a flattened, pre-order listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineEntry {
    pub id: String,
    pub depth: usize,
    pub total_descendant_count: usize,
}

pub trait TreeNodeConvert {
    /// One `termtree` per root, labelled for terminal output.
    fn to_tree_strings(&self) -> Vec<Tree<String>>;
}

impl Forest {
    /// Nested view of every materialized node, roots in order.
    #[instrument(level = "debug", skip(self))]
    pub fn to_view(&self) -> Vec<NodeView> {
        self.roots.iter().filter_map(|&r| self.node_view(r)).collect()
    }

    pub fn node_view(&self, node: NodeId) -> Option<NodeView> {
        let n = self.node(node)?;
        let entity = self.collection.get(n.entity)?;
        Some(NodeView {
            id: entity.id.clone(),
            name: entity.display_name().to_string(),
            rank_hint: entity.rank_hint.clone(),
            rank: self
                .classifier
                .group_name(self.classifier.classify(&entity.rank_hint))
                .to_string(),
            depth: n.depth,
            total_descendant_count: n.total_descendant_count,
            direct_reports: n.direct_reports,
            state: n.state,
            expanded: n.expanded,
            flagged: n.flagged,
            children: n.children.iter().filter_map(|&c| self.node_view(c)).collect(),
        })
    }

    /// Pre-order listing of materialized nodes.
    pub fn outline(&self) -> Vec<OutlineEntry> {
        self.iter()
            .filter_map(|(id, node)| {
                self.entity(id).map(|e| OutlineEntry {
                    id: e.id.clone(),
                    depth: node.depth,
                    total_descendant_count: node.total_descendant_count,
                })
            })
            .collect()
    }

    fn label(&self, node: NodeId) -> String {
        let Some((n, entity)) = self.node(node).zip(self.entity(node)) else {
            return String::new();
        };
        let mut label = entity.display_name().to_string();
        if !entity.rank_hint.is_empty() {
            label.push_str(&format!(" ({})", entity.rank_hint));
        }
        if n.total_descendant_count > 0 {
            label.push_str(&format!(" [{}]", n.total_descendant_count));
        }
        if n.flagged {
            label.push_str(" !");
        }
        label
    }
}

impl TreeNodeConvert for Forest {
    fn to_tree_strings(&self) -> Vec<Tree<String>> {
        fn build_tree(forest: &Forest, node: NodeId) -> Tree<String> {
            let mut tree = Tree::new(forest.label(node));
            if let Some(n) = forest.node(node) {
                if n.expanded {
                    for &child in &n.children {
                        tree.push(build_tree(forest, child));
                    }
                }
            }
            tree
        }

        self.roots.iter().map(|&r| build_tree(self, r)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::builder::{BuildMode, TreeBuilder};
    use crate::domain::entities::Entity;

    fn forest() -> Forest {
        TreeBuilder::new()
            .build(
                &[
                    Entity::new("a").with_name("Ann").with_rank_hint("CEO"),
                    Entity::new("b").with_name("Ben").with_parent("a"),
                    Entity::new("x").with_parent("ghost"),
                ],
                BuildMode::Eager,
            )
            .forest
    }

    #[test]
    fn given_forest_when_viewing_then_nested_with_rank_group() {
        let view = forest().to_view();

        assert_eq!(view.len(), 2);
        assert_eq!(view[0].id, "a");
        assert_eq!(view[0].rank, "executive");
        assert_eq!(view[0].children[0].id, "b");
        assert_eq!(view[0].children[0].rank, "unclassified");
        assert!(view[1].flagged);
    }

    #[test]
    fn given_forest_when_rendering_then_labels_carry_counts_and_flags() {
        let trees = forest().to_tree_strings();
        let rendered: Vec<String> = trees.iter().map(|t| t.to_string()).collect();

        assert!(rendered[0].starts_with("Ann (CEO) [1]"));
        assert!(rendered[0].contains("Ben"));
        assert_eq!(rendered[1].trim_end(), "x !");
    }

    #[test]
    fn given_forest_when_outlining_then_pre_order() {
        let ids: Vec<String> = forest().outline().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["a", "b", "x"]);
    }
}
