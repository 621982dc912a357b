//! Gloss graph resolution: wave loading, cycle-safe hydration, and
//! language projection of resolved glosses.
//!
//! A resolution produces a [`GlossGraph`], an identity map from gloss ID to
//! [`HydratedGloss`]. Nodes refer to each other by [`GlossRef`]; a reference
//! is fully built exactly when the graph holds its ID, so containment cycles
//! are just two entries pointing at each other.

mod filter;
mod resolver;

pub use filter::{filter_challenge_glosses, select_prompts};
pub use resolver::GlossResolver;

use std::borrow::Cow;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::model::{GlossDto, GlossId, GlossRef, HydratedGloss, RelationKind};

/// Identity map of every node a resolution loaded.
#[derive(Debug, Default, Clone)]
pub struct GlossGraph {
    nodes: HashMap<GlossId, HydratedGloss>,
}

impl GlossGraph {
    pub(crate) fn from_nodes(nodes: HashMap<GlossId, HydratedGloss>) -> Self {
        Self { nodes }
    }

    pub fn get(&self, id: &str) -> Option<&HydratedGloss> {
        self.nodes.get(id)
    }

    pub fn is_hydrated(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Target of a reference: the shared node if loaded, else a stub.
    pub fn follow<'a>(&'a self, reference: &GlossRef) -> Cow<'a, HydratedGloss> {
        match self.nodes.get(&reference.id) {
            Some(node) => Cow::Borrowed(node),
            None => Cow::Owned(HydratedGloss::stub(reference)),
        }
    }

    /// Targets of `kind` from node `id`, each followed.
    pub fn related(&self, id: &str, kind: RelationKind) -> Vec<Cow<'_, HydratedGloss>> {
        self.nodes
            .get(id)
            .map(|node| {
                node.relations
                    .get(kind)
                    .iter()
                    .map(|target| self.follow(target))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Render a node to its wire form.
    ///
    /// Containment is expanded depth-first, each node at most once per
    /// render: a child already expanded earlier in the same DTO (an ancestor
    /// or a shared sub-phrase) is emitted with scalars only.
    pub fn to_dto(&self, id: &str) -> Option<GlossDto> {
        let node = self.nodes.get(id)?;
        let mut rendered = HashSet::new();
        Some(self.render(node, &mut rendered))
    }

    fn render<'a>(
        &'a self,
        node: &'a HydratedGloss,
        rendered: &mut HashSet<&'a str>,
    ) -> GlossDto {
        let mut dto = GlossDto::from_scalars(node);
        rendered.insert(node.id.as_str());

        for child_ref in &node.relations.contains {
            let child = match self.nodes.get(&child_ref.id) {
                Some(child) if !rendered.contains(child.id.as_str()) => {
                    self.render(child, rendered)
                }
                Some(child) => GlossDto::from_scalars(child),
                None => GlossDto::stub(child_ref),
            };
            dto.contains.push(child);
        }
        for kind in RelationKind::LATERAL {
            if let Some(list) = dto.lateral_mut(kind) {
                *list = node.relations.get(kind).to_vec();
            }
        }
        dto
    }
}

/// Result of [`GlossResolver::resolve_by_ids`]: the seed entries of a
/// shared graph.
#[derive(Debug, Clone)]
pub struct Resolved {
    graph: Arc<GlossGraph>,
    seeds: Vec<GlossId>,
    seed_set: HashSet<GlossId>,
}

impl Resolved {
    pub(crate) fn new(graph: Arc<GlossGraph>, seeds: Vec<GlossId>) -> Self {
        let seed_set = seeds.iter().cloned().collect();
        Self { graph, seeds, seed_set }
    }

    /// Seed entry `id`; non-seed nodes are reachable through [`Self::graph`].
    pub fn get(&self, id: &str) -> Option<&HydratedGloss> {
        if self.contains_key(id) {
            self.graph.get(id)
        } else {
            None
        }
    }

    pub fn contains_key(&self, id: &str) -> bool {
        self.seed_set.contains(id)
    }

    /// Seeds that exist, in request order.
    pub fn ids(&self) -> &[GlossId] {
        &self.seeds
    }

    pub fn len(&self) -> usize {
        self.seeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seeds.is_empty()
    }

    pub fn graph(&self) -> &Arc<GlossGraph> {
        &self.graph
    }

    pub fn dto(&self, id: &str) -> Option<GlossDto> {
        self.get(id)?;
        self.graph.to_dto(id)
    }

    /// Wire form of every seed.
    pub fn dto_map(&self) -> HashMap<GlossId, GlossDto> {
        self.seeds
            .iter()
            .filter_map(|id| self.graph.to_dto(id).map(|dto| (id.clone(), dto)))
            .collect()
    }
}

/// Result of [`GlossResolver::resolve_single`].
#[derive(Debug, Clone)]
pub struct ResolvedGloss {
    graph: Arc<GlossGraph>,
    node: HydratedGloss,
}

impl ResolvedGloss {
    pub(crate) fn new(graph: Arc<GlossGraph>, node: HydratedGloss) -> Self {
        Self { graph, node }
    }

    pub fn node(&self) -> &HydratedGloss {
        &self.node
    }

    pub fn graph(&self) -> &Arc<GlossGraph> {
        &self.graph
    }

    pub fn to_dto(&self) -> GlossDto {
        let mut rendered = HashSet::new();
        self.graph.render(&self.node, &mut rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::LanguageCode::{self, Eng, Spa};

    fn reference(id: &str, language: LanguageCode, content: &str) -> GlossRef {
        GlossRef { id: id.to_string(), language, content: content.to_string() }
    }

    fn node(r: &GlossRef) -> HydratedGloss {
        HydratedGloss::stub(r)
    }

    /// a contains b, b contains a; a translates to an unloaded "t".
    fn cyclic_graph() -> GlossGraph {
        let a_ref = reference("a", Spa, "a");
        let b_ref = reference("b", Spa, "b");
        let mut a = node(&a_ref);
        let mut b = node(&b_ref);
        a.relations.contains.push(b_ref.clone());
        a.relations.translations.push(reference("t", Eng, "to"));
        b.relations.contains.push(a_ref.clone());

        let mut nodes = HashMap::new();
        nodes.insert("a".to_string(), a);
        nodes.insert("b".to_string(), b);
        GlossGraph::from_nodes(nodes)
    }

    #[test]
    fn test_follow_borrows_loaded_and_stubs_unloaded() {
        let graph = cyclic_graph();
        assert!(matches!(graph.follow(&reference("b", Spa, "b")), Cow::Borrowed(_)));

        let stub = graph.follow(&reference("t", Eng, "to"));
        assert!(matches!(stub, Cow::Owned(_)));
        assert_eq!(stub.content, "to");
        assert!(stub.relations.is_empty());
    }

    #[test]
    fn test_related_follows_each_target() {
        let graph = cyclic_graph();
        let contained = graph.related("a", RelationKind::Contains);
        assert_eq!(contained.len(), 1);
        // Shared node: b's own containment of a is visible through it.
        assert_eq!(contained[0].relations.contains[0].id, "a");
        assert!(graph.related("missing", RelationKind::Contains).is_empty());
    }

    #[test]
    fn test_to_dto_cuts_cycles_at_the_ancestor() {
        let graph = cyclic_graph();
        let dto = graph.to_dto("a").unwrap();

        assert_eq!(dto.contains.len(), 1);
        let b = &dto.contains[0];
        assert_eq!(b.id, "b");
        assert_eq!(b.contains.len(), 1);
        assert_eq!(b.contains[0].id, "a");
        assert!(b.contains[0].contains.is_empty());
        assert!(b.contains[0].translations.is_empty());
        assert_eq!(dto.translations, vec![reference("t", Eng, "to")]);
        assert!(graph.to_dto("t").is_none());
    }

    fn count(dto: &GlossDto) -> usize {
        1 + dto.contains.iter().map(count).sum::<usize>()
    }

    /// c0 contains l0 and r0, both of which contain c1, and so on up to cN.
    fn diamond_chain(n: usize) -> GlossGraph {
        let mut nodes = HashMap::new();
        for i in 0..=n {
            let c_ref = reference(&format!("c{i}"), Spa, &format!("c{i}"));
            let mut c = node(&c_ref);
            if i < n {
                let next = reference(&format!("c{}", i + 1), Spa, &format!("c{}", i + 1));
                for side in ["l", "r"] {
                    let side_ref = reference(&format!("{side}{i}"), Spa, &format!("{side}{i}"));
                    let mut side_node = node(&side_ref);
                    side_node.relations.contains.push(next.clone());
                    c.relations.contains.push(side_ref.clone());
                    nodes.insert(side_ref.id.clone(), side_node);
                }
            }
            nodes.insert(c_ref.id.clone(), c);
        }
        GlossGraph::from_nodes(nodes)
    }

    #[test]
    fn test_to_dto_expands_shared_children_once() {
        let n = 20;
        let graph = diamond_chain(n);
        let dto = graph.to_dto("c0").unwrap();

        // Every node expanded once, plus one scalar-only repeat per diamond.
        assert_eq!(count(&dto), 3 * n + 1 + n);

        let left = &dto.contains[0];
        let right = &dto.contains[1];
        assert_eq!(left.contains[0].id, "c1");
        assert_eq!(left.contains[0].contains.len(), 2);
        assert_eq!(right.contains[0].id, "c1");
        assert!(right.contains[0].contains.is_empty());
    }

    #[test]
    fn test_resolved_seed_lookup() {
        let graph = Arc::new(cyclic_graph());
        let resolved = Resolved::new(graph, vec!["b".to_string(), "a".to_string()]);

        assert!(resolved.contains_key("a"));
        assert!(!resolved.contains_key("t"));
        assert_eq!(resolved.ids(), ["b".to_string(), "a".to_string()]);
        assert_eq!(resolved.get("b").map(|n| n.id.as_str()), Some("b"));
        assert_eq!(resolved.dto_map().len(), 2);
        assert!(resolved.dto("t").is_none());
    }
}
