//! Tests for TreeBuilder: construction properties over whole forests

use std::collections::HashMap;

use rstest::{fixture, rstest};

use orgtree::application::services::{EntitySource, SourceFormat};
use orgtree::domain::{
    BuildMode, DiagnosticKind, DomainError, Entity, Forest, MaterializationState, TreeBuilder,
};
use orgtree::util::testing;

#[fixture]
fn org() -> Vec<Entity> {
    testing::init_test_setup();
    EntitySource::parse(include_str!("resources/org.json"), SourceFormat::Json).expect("org.json")
}

#[fixture]
fn broken() -> Vec<Entity> {
    testing::init_test_setup();
    EntitySource::parse(include_str!("resources/broken.json"), SourceFormat::Json).expect("broken.json")
}

fn root_ids(forest: &Forest) -> Vec<String> {
    forest
        .roots()
        .iter()
        .map(|&r| forest.entity(r).unwrap().id.clone())
        .collect()
}

fn child_ids(forest: &Forest, id: &str) -> Vec<String> {
    let node = forest.node(forest.find(id).unwrap()).unwrap();
    node.children
        .iter()
        .map(|&c| forest.entity(c).unwrap().id.clone())
        .collect()
}

fn count_of(forest: &Forest, id: &str) -> usize {
    forest
        .node(forest.find(id).unwrap())
        .unwrap()
        .total_descendant_count
}

fn abcd() -> Vec<Entity> {
    testing::init_test_setup();
    vec![
        Entity::new("A"),
        Entity::new("B").with_parent("A"),
        Entity::new("C").with_parent("B"),
        Entity::new("D").with_parent("Z"),
    ]
}

#[test]
fn given_dangling_parent_when_building_then_root_with_one_diagnostic() {
    let output = TreeBuilder::new().build(&abcd(), BuildMode::Eager);

    assert_eq!(root_ids(&output.forest), vec!["A", "D"]);
    assert_eq!(count_of(&output.forest, "A"), 2);
    assert_eq!(count_of(&output.forest, "D"), 0);
    assert_eq!(output.diagnostics.len(), 1);
    assert_eq!(output.diagnostics[0].entity_id, "D");
    assert_eq!(output.diagnostics[0].kind, DiagnosticKind::DanglingReference);
}

#[test]
fn given_two_entity_cycle_when_building_then_both_roots_without_descendants() {
    let entities = vec![Entity::new("A").with_parent("B"), Entity::new("B").with_parent("A")];

    let output = TreeBuilder::new().build(&entities, BuildMode::Eager);

    assert_eq!(root_ids(&output.forest), vec!["A", "B"]);
    assert_eq!(count_of(&output.forest, "A"), 0);
    assert_eq!(count_of(&output.forest, "B"), 0);
    assert!(output
        .diagnostics
        .iter()
        .any(|d| d.kind == DiagnosticKind::CycleDetected));
    assert!(output.forest.iter().all(|(_, n)| n.flagged));
}

#[rstest]
fn given_descendant_as_new_parent_when_reparenting_then_rejected_and_unchanged() {
    let mut forest = TreeBuilder::new().build(&abcd(), BuildMode::Eager).forest;
    let view_before = forest.to_view();
    let entities_before = forest.collection().entities();
    let diagnostics_before = forest.diagnostics().to_vec();

    let result = forest.reparent("A", Some("C"));

    assert!(matches!(result, Err(DomainError::RejectedReparent { .. })));
    assert_eq!(forest.to_view(), view_before);
    assert_eq!(forest.collection().entities(), entities_before);
    assert_eq!(forest.diagnostics(), diagnostics_before.as_slice());
}

#[rstest]
fn given_self_as_new_parent_when_reparenting_then_rejected(org: Vec<Entity>) {
    let mut forest = TreeBuilder::new().build(&org, BuildMode::Eager).forest;

    let result = forest.reparent("e2", Some("e2"));

    assert!(matches!(result, Err(DomainError::RejectedReparent { .. })));
}

#[rstest]
#[case(BuildMode::Eager)]
#[case(BuildMode::Lazy)]
fn given_same_input_when_building_twice_then_identical(
    org: Vec<Entity>,
    broken: Vec<Entity>,
    #[case] mode: BuildMode,
) {
    for entities in [org, broken] {
        let first = TreeBuilder::new().build(&entities, mode);
        let second = TreeBuilder::new().build(&entities, mode);

        assert_eq!(first.forest.to_view(), second.forest.to_view());
        assert_eq!(first.diagnostics, second.diagnostics);
    }
}

#[rstest]
fn given_lazy_forest_when_fully_expanded_then_matches_eager(org: Vec<Entity>, broken: Vec<Entity>) {
    for entities in [org, broken] {
        let eager = TreeBuilder::new().build(&entities, BuildMode::Eager).forest;
        let mut lazy = TreeBuilder::new().build(&entities, BuildMode::Lazy).forest;

        lazy.expand_all();

        assert_eq!(lazy.outline(), eager.outline());
        assert!(lazy.iter().all(|(_, n)| n.state == MaterializationState::Loaded));
    }
}

#[rstest]
#[case(BuildMode::Eager)]
#[case(BuildMode::Lazy)]
fn given_anomalous_input_when_building_then_every_entity_appears_once(
    broken: Vec<Entity>,
    #[case] mode: BuildMode,
) {
    let mut forest = TreeBuilder::new().build(&broken, mode).forest;
    forest.expand_all();

    let mut seen: Vec<String> = forest.outline().into_iter().map(|e| e.id).collect();
    let mut expected: Vec<String> = broken.iter().map(|e| e.id.clone()).collect();
    seen.sort();
    expected.sort();
    assert_eq!(seen, expected);
    assert_eq!(forest.len(), broken.len());
}

#[rstest]
fn given_anomalous_input_when_building_then_each_kind_is_reported(broken: Vec<Entity>) {
    let output = TreeBuilder::new().build(&broken, BuildMode::Eager);
    let kinds: Vec<(String, DiagnosticKind)> = output
        .diagnostics
        .iter()
        .map(|d| (d.entity_id.clone(), d.kind))
        .collect();

    assert!(kinds.contains(&("a".into(), DiagnosticKind::CycleDetected)));
    assert!(kinds.contains(&("b".into(), DiagnosticKind::CycleDetected)));
    assert!(kinds.contains(&("s".into(), DiagnosticKind::SelfReference)));
    assert!(kinds.contains(&("d".into(), DiagnosticKind::DanglingReference)));
    assert!(kinds.contains(&("c".into(), DiagnosticKind::DuplicateId)));
    assert_eq!(kinds.len(), 5);
    // the entity hanging off the loop keeps its parent
    assert_eq!(child_ids(&output.forest, "a"), vec!["c"]);
}

#[rstest]
fn given_acyclic_input_when_building_then_counts_match_transitive_reports(org: Vec<Entity>) {
    let forest = TreeBuilder::new().build(&org, BuildMode::Eager).forest;
    let parent: HashMap<&str, &str> = org
        .iter()
        .filter_map(|e| e.parent_id.as_deref().map(|p| (e.id.as_str(), p)))
        .collect();

    for entity in &org {
        let expected = org
            .iter()
            .filter(|other| {
                let mut current = other.id.as_str();
                while let Some(&p) = parent.get(current) {
                    if p == entity.id {
                        return true;
                    }
                    current = p;
                }
                false
            })
            .count();
        assert_eq!(count_of(&forest, &entity.id), expected, "count of {}", entity.id);
    }
}

#[rstest]
fn given_org_chart_when_building_then_siblings_ordered_by_rank(org: Vec<Entity>) {
    let output = TreeBuilder::new().build(&org, BuildMode::Eager);
    let forest = &output.forest;

    assert_eq!(root_ids(forest), vec!["e1", "e8", "e9"]);
    assert_eq!(child_ids(forest, "e1"), vec!["e2", "e3"]);
    assert_eq!(child_ids(forest, "e2"), vec!["e5", "e4"]);
    assert_eq!(count_of(forest, "e1"), 6);
    let e1 = forest.node(forest.find("e1").unwrap()).unwrap();
    assert_eq!(e1.direct_reports, 2);
    assert_eq!(output.diagnostics.len(), 1);
}

#[test]
fn given_equal_rank_when_building_then_siblings_ordered_by_name() {
    let entities = vec![
        Entity::new("p"),
        Entity::new("z").with_parent("p").with_name("Zoe").with_rank_hint("Engineer"),
        Entity::new("a").with_parent("p").with_name("adam").with_rank_hint("Analyst"),
        Entity::new("m").with_parent("p").with_name("Mia"),
    ];

    let forest = TreeBuilder::new().build(&entities, BuildMode::Eager).forest;

    assert_eq!(child_ids(&forest, "p"), vec!["a", "m", "z"]);
}

#[rstest]
fn given_expand_depth_when_building_eagerly_then_only_shallow_nodes_expanded(org: Vec<Entity>) {
    let forest = TreeBuilder::new()
        .with_expand_depth(1)
        .build(&org, BuildMode::Eager)
        .forest;

    assert!(forest.iter().all(|(_, n)| n.expanded == (n.depth < 1)));
}

#[rstest]
fn given_forest_when_iterating_post_order_then_children_before_parents(org: Vec<Entity>) {
    let forest = TreeBuilder::new().build(&org, BuildMode::Eager).forest;
    let order: Vec<String> = forest
        .iter_postorder()
        .map(|(id, _)| forest.entity(id).unwrap().id.clone())
        .collect();

    let position = |id: &str| order.iter().position(|o| o == id).unwrap();
    assert!(position("e6") < position("e5"));
    assert!(position("e5") < position("e2"));
    assert!(position("e2") < position("e1"));
    assert_eq!(forest.depth(), 4);
    assert_eq!(forest.leaf_ids(), vec!["e6", "e4", "e7", "e8", "e9"]);
}
