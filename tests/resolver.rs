use std::sync::Mutex;

use serde_json::{Map, Value};

use tabmeta::error::TabmetaError;
use tabmeta::hierarchy::Level;
use tabmeta::platform::{ContainerQuery, ContainerRef, PlatformClient};
use tabmeta::resolver::{ResolutionRequest, Resolver};

struct Node {
    level: Level,
    id: &'static str,
    label: &'static str,
    parent: Option<&'static str>,
}

const fn node(
    level: Level,
    id: &'static str,
    label: &'static str,
    parent: Option<&'static str>,
) -> Node {
    Node {
        level,
        id,
        label,
        parent,
    }
}

#[derive(Default)]
struct MockPlatform {
    nodes: Vec<Node>,
    fail_levels: Vec<Level>,
    fail_id_lookups: bool,
    writes: Mutex<Vec<(String, Map<String, Value>)>>,
}

impl MockPlatform {
    fn with_nodes(nodes: Vec<Node>) -> Self {
        Self {
            nodes,
            ..Self::default()
        }
    }

    fn node_ref(&self, node: &Node) -> ContainerRef {
        ContainerRef {
            container_type: node.level,
            native_id: node.id.to_string(),
            label: node.label.to_string(),
            metadata: Map::new(),
        }
    }

    fn is_descendant_of(&self, node: &Node, ancestor_id: &str) -> bool {
        let mut parent = node.parent;
        while let Some(id) = parent {
            if id == ancestor_id {
                return true;
            }
            parent = self
                .nodes
                .iter()
                .find(|candidate| candidate.id == id)
                .and_then(|candidate| candidate.parent);
        }
        false
    }
}

impl PlatformClient for MockPlatform {
    fn find(
        &self,
        parent: Option<&ContainerRef>,
        level: Level,
        query: &ContainerQuery,
    ) -> Result<Vec<ContainerRef>, TabmetaError> {
        if self.fail_levels.contains(&level) {
            return Err(TabmetaError::PlatformHttp("mock outage".to_string()));
        }
        if self.fail_id_lookups && matches!(query, ContainerQuery::Id(_)) {
            return Err(TabmetaError::PlatformHttp("id index down".to_string()));
        }

        Ok(self
            .nodes
            .iter()
            .filter(|node| node.level == level)
            .filter(|node| match parent {
                Some(parent) => self.is_descendant_of(node, &parent.native_id),
                None => true,
            })
            .filter(|node| match query {
                ContainerQuery::Id(id) => node.id == id,
                ContainerQuery::Label(label) => node.label == label,
                ContainerQuery::All => true,
            })
            .map(|node| self.node_ref(node))
            .collect())
    }

    fn get_ancestor(
        &self,
        container: &ContainerRef,
        level: Level,
    ) -> Result<Option<ContainerRef>, TabmetaError> {
        Ok(self
            .nodes
            .iter()
            .filter(|node| node.level == level)
            .find(|node| {
                self.nodes
                    .iter()
                    .find(|child| child.id == container.native_id)
                    .is_some_and(|child| self.is_descendant_of(child, node.id))
            })
            .map(|node| self.node_ref(node)))
    }

    fn label_path(&self, container: &ContainerRef) -> Result<Vec<String>, TabmetaError> {
        let mut labels = vec![container.label.clone()];
        let mut parent = self
            .nodes
            .iter()
            .find(|node| node.id == container.native_id)
            .and_then(|node| node.parent);
        while let Some(id) = parent {
            let node = self
                .nodes
                .iter()
                .find(|node| node.id == id)
                .ok_or_else(|| TabmetaError::ContainerNotFound(id.to_string()))?;
            labels.push(node.label.to_string());
            parent = node.parent;
        }
        labels.reverse();
        Ok(labels)
    }

    fn write_metadata(
        &self,
        container: &ContainerRef,
        metadata: &Map<String, Value>,
    ) -> Result<(), TabmetaError> {
        let mut guard = self.writes.lock().unwrap();
        guard.push((container.native_id.clone(), metadata.clone()));
        Ok(())
    }
}

fn study_tree() -> Vec<Node> {
    vec![
        node(Level::Group, "g1", "neuro-lab", None),
        node(Level::Project, "p1", "Proj1", Some("g1")),
        node(Level::Subject, "s1", "sub-01", Some("p1")),
        node(Level::Subject, "s2", "sub-02", Some("p1")),
        node(Level::Session, "ses1", "baseline", Some("s1")),
        node(Level::Session, "ses2", "baseline", Some("s2")),
        node(Level::Acquisition, "a1", "Acq_01", Some("ses1")),
        node(Level::Acquisition, "a2", "Acq_02", Some("ses1")),
        node(Level::Acquisition, "a3", "Acq_01", Some("ses2")),
        node(Level::File, "f1", "scan.dcm", Some("a1")),
        node(Level::File, "f2", "notes.txt", Some("a1")),
    ]
}

#[test]
fn resolves_single_project_by_label() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new().with(Level::Project, "Proj1");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].native_id, "p1");
}

#[test]
fn target_level_fans_out_to_all_subjects() {
    let platform = MockPlatform::with_nodes(study_tree());
    let mut request = ResolutionRequest::new().with(Level::Project, "Proj1");
    request.target_level = Some(Level::Subject);
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    let mut labels: Vec<&str> = found.iter().map(|c| c.label.as_str()).collect();
    labels.sort();
    assert_eq!(labels, vec!["sub-01", "sub-02"]);
}

#[test]
fn skipped_levels_expand_through_descendants() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Acquisition, "Acq_01");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    let mut ids: Vec<&str> = found.iter().map(|c| c.native_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["a1", "a3"]);
}

#[test]
fn unknown_label_short_circuits_to_empty() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new()
        .with(Level::Project, "NoSuchProject")
        .with(Level::Acquisition, "Acq_01");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert!(found.is_empty());
}

#[test]
fn id_shaped_identifier_tries_id_lookup_first() {
    let mut nodes = study_tree();
    nodes.push(node(
        Level::Project,
        "6053d2f50858d11c7782d35e",
        "ById",
        Some("g1"),
    ));
    let platform = MockPlatform::with_nodes(nodes);
    let request = ResolutionRequest::new().with(Level::Project, "6053d2f50858d11c7782d35e");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].label, "ById");
}

#[test]
fn id_lookup_failure_falls_back_to_label() {
    let mut nodes = study_tree();
    // A label that happens to look like a native ID.
    nodes.push(node(
        Level::Project,
        "p2",
        "aaaaaaaaaaaaaaaaaaaaaaaa",
        Some("g1"),
    ));
    let mut platform = MockPlatform::with_nodes(nodes);
    platform.fail_id_lookups = true;
    let request = ResolutionRequest::new().with(Level::Project, "aaaaaaaaaaaaaaaaaaaaaaaa");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].native_id, "p2");
}

#[test]
fn adapter_outage_resolves_to_empty_not_error() {
    let mut platform = MockPlatform::with_nodes(study_tree());
    platform.fail_levels = vec![Level::Subject];
    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Subject, "sub-01");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert!(found.is_empty());
    assert!(platform.writes.lock().unwrap().is_empty());
}

#[test]
fn file_leaf_filters_by_exact_name() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Acquisition, "Acq_01")
        .with(Level::File, "scan.dcm");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].native_id, "f1");
    assert_eq!(found[0].container_type, Level::File);
}

#[test]
fn file_leaf_with_no_parent_match_is_empty() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Acquisition, "Acq_02")
        .with(Level::File, "scan.dcm");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert!(found.is_empty());
}

#[test]
fn file_leaf_chains_through_matched_analyses() {
    let mut nodes = study_tree();
    nodes.push(node(Level::Analysis, "an1", "seg-run", Some("ses1")));
    nodes.push(node(Level::Analysis, "an2", "seg-run", Some("ses2")));
    nodes.push(node(Level::File, "af1", "mask.nii", Some("an1")));
    nodes.push(node(Level::File, "af2", "labels.nii", Some("an2")));
    let platform = MockPlatform::with_nodes(nodes);

    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Session, "baseline")
        .with(Level::Analysis, "seg-run")
        .with(Level::File, "mask.nii");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].native_id, "af1");
    assert_eq!(found[0].container_type, Level::File);
}

#[test]
fn analysis_leaf_resolves_without_a_file() {
    let mut nodes = study_tree();
    nodes.push(node(Level::Analysis, "an1", "seg-run", Some("ses1")));
    nodes.push(node(Level::Analysis, "an2", "seg-run", Some("ses2")));
    let platform = MockPlatform::with_nodes(nodes);

    let request = ResolutionRequest::new()
        .with(Level::Project, "Proj1")
        .with(Level::Analysis, "seg-run");
    let found = Resolver::new(&platform).resolve(&request).unwrap();
    let mut ids: Vec<&str> = found.iter().map(|c| c.native_id.as_str()).collect();
    ids.sort();
    assert_eq!(ids, vec!["an1", "an2"]);
}

#[test]
fn leaf_without_any_container_level_is_rejected() {
    let platform = MockPlatform::with_nodes(study_tree());
    let request = ResolutionRequest::new().with(Level::File, "scan.dcm");
    let err = Resolver::new(&platform).resolve(&request).unwrap_err();
    assert!(matches!(err, TabmetaError::StructuralMismatch(_)));
}
