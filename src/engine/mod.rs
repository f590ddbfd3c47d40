mod frame_loop;
mod physics;
mod reconcile;
mod reveal;
mod scale;
mod scene;

use std::cell::{Ref, RefCell};
use std::collections::HashSet;
use std::rc::Rc;

use eframe::egui::Vec2;

use crate::snapshot::Snapshot;

pub use physics::{SimLink, Simulation, SimulationConfig, SimulationState};
pub use reconcile::{NodeKey, NodeTable, PersistentNode};
pub use reveal::{RevealPlan, VisibilityScheduler};
pub use scale::ScaleSet;
pub use scene::{Scene, SceneTimings};

use scene::{LinkTarget, NodeTarget};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct EngineConfig {
    pub reveal_ms: f64,
    pub label_threshold: usize,
    pub jitter_radius: f32,
    pub timings: SceneTimings,
    pub simulation: SimulationConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            reveal_ms: 1000.0,
            label_threshold: 80,
            jitter_radius: 40.0,
            timings: SceneTimings::default(),
            simulation: SimulationConfig::default(),
        }
    }
}

/// Incremental layout engine: diffs snapshots into persistent nodes, paces
/// arrivals into the visible set, and keeps the simulation and scene fed.
pub struct GraphEngine {
    config: EngineConfig,
    snapshot: Snapshot,
    table: NodeTable,
    ordered: Vec<NodeKey>,
    scheduler: VisibilityScheduler,
    simulation: Simulation,
    scene: Rc<RefCell<Scene>>,
    scales: ScaleSet,
    visible_link_count: usize,
    dragging: Option<String>,
}

impl GraphEngine {
    pub fn new(config: EngineConfig) -> Self {
        let table = NodeTable::new(config.simulation.center, config.jitter_radius);
        Self::with_table(config, table)
    }

    pub fn with_table(config: EngineConfig, table: NodeTable) -> Self {
        Self {
            config,
            snapshot: Snapshot::default(),
            table,
            ordered: Vec::new(),
            scheduler: VisibilityScheduler::new(config.reveal_ms),
            simulation: Simulation::new(config.simulation),
            scene: Rc::new(RefCell::new(Scene::new(config.timings))),
            scales: ScaleSet::from_visible(std::iter::empty(), std::iter::empty()),
            visible_link_count: 0,
            dragging: None,
        }
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn table(&self) -> &NodeTable {
        &self.table
    }

    pub fn scene(&self) -> Ref<'_, Scene> {
        self.scene.borrow()
    }

    pub fn scales(&self) -> &ScaleSet {
        &self.scales
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }

    pub fn simulation_state(&self) -> SimulationState {
        self.simulation.state()
    }

    pub fn visible_node_count(&self) -> usize {
        self.scheduler.visible_len()
    }

    pub fn visible_link_count(&self) -> usize {
        self.visible_link_count
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.table
            .key_of(id)
            .is_some_and(|key| self.scheduler.is_visible(key))
    }

    pub fn is_revealing(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn dragging(&self) -> Option<&str> {
        self.dragging.as_deref()
    }

    pub fn apply_snapshot(&mut self, snapshot: Snapshot, now_ms: f64) -> RevealPlan {
        let reconciliation = self.table.reconcile(&snapshot);
        log::info!(
            "snapshot with {} nodes and {} edges: {} new, {} removed",
            snapshot.nodes.len(),
            snapshot.edges.len(),
            reconciliation.created.len(),
            reconciliation.removed.len()
        );

        if let Some(id) = &self.dragging
            && reconciliation.removed.contains(id)
        {
            self.dragging = None;
            self.simulation.reheat(0.0, now_ms);
        }

        self.snapshot = snapshot;
        self.ordered = reconciliation.ordered;
        let plan = self.scheduler.on_new_reconciled_set(&self.ordered, now_ms);
        if let RevealPlan::Started { arrivals } = plan {
            log::debug!("revealing {arrivals} new nodes over {} ms", self.config.reveal_ms);
        }
        self.refresh(now_ms);
        plan
    }

    /// Advances one host frame. Returns whether another frame is wanted.
    pub fn frame(&mut self, now_ms: f64) -> bool {
        let visible_before = self.scheduler.visible_len();
        if let Some(step) = self.scheduler.step(now_ms) {
            log::trace!(
                "reveal {:.2}: {}/{} admitted",
                step.progress,
                step.admitted,
                step.arrivals
            );
            // Steps that admit nobody skip the pass so alpha is not reset
            // every frame; the last step always gets one.
            if step.finished || self.scheduler.visible_len() != visible_before {
                self.refresh(now_ms);
            }
        }

        let ticked = self.simulation.tick(&mut self.table);
        let animating = self.scene.borrow_mut().advance(now_ms);
        ticked || animating || self.scheduler.is_running()
    }

    /// Recomputes the visible subset, its scales, the scene join, and
    /// reseeds the simulation with live keys.
    fn refresh(&mut self, now_ms: f64) {
        let visible_keys = self
            .ordered
            .iter()
            .copied()
            .filter(|key| self.scheduler.is_visible(*key))
            .collect::<Vec<_>>();

        let mut seen_links = HashSet::new();
        let visible_edges = self
            .snapshot
            .edges
            .iter()
            .filter_map(|edge| {
                let source = self.table.key_of(&edge.source_id)?;
                let target = self.table.key_of(&edge.target_id)?;
                let both_visible =
                    self.scheduler.is_visible(source) && self.scheduler.is_visible(target);
                (both_visible && seen_links.insert((source, target)))
                    .then_some((edge, source, target))
            })
            .collect::<Vec<_>>();

        let scales = ScaleSet::from_visible(
            visible_keys
                .iter()
                .filter_map(|key| self.table.get(*key))
                .map(PersistentNode::similarity_or_zero),
            visible_edges.iter().map(|(edge, _, _)| edge.weight),
        );

        let node_targets = visible_keys
            .iter()
            .filter_map(|key| {
                let node = self.table.get(*key)?;
                let similarity = node.similarity_or_zero();
                Some(NodeTarget {
                    id: node.id.clone(),
                    key: *key,
                    position: node.position,
                    group_index: node.group_index,
                    radius: scales.radius_of(similarity),
                    fill_opacity: scales.fill_opacity_of(similarity),
                })
            })
            .collect::<Vec<_>>();

        let position_of = |key: NodeKey| {
            self.table
                .get(key)
                .map(|node| node.position)
                .unwrap_or(Vec2::ZERO)
        };
        let link_targets = visible_edges
            .iter()
            .map(|(edge, source, target)| LinkTarget {
                source_id: edge.source_id.clone(),
                target_id: edge.target_id.clone(),
                source: *source,
                target: *target,
                from: position_of(*source),
                to: position_of(*target),
                stroke_opacity: scales.edge_opacity_of(edge.weight),
                width: scales.edge_width_of(edge.weight),
            })
            .collect::<Vec<_>>();

        let sim_links = visible_edges
            .iter()
            .map(|(edge, source, target)| SimLink {
                source: *source,
                target: *target,
                strength: scales.link_strength_of(edge.weight),
                distance: scales.link_distance_of(edge.weight),
            })
            .collect::<Vec<_>>();

        let show_labels = node_targets.len() <= self.config.label_threshold;
        self.scene
            .borrow_mut()
            .join(&node_targets, &link_targets, show_labels, now_ms);

        self.scales = scales;
        self.visible_link_count = sim_links.len();
        self.simulation.seed(visible_keys, sim_links, now_ms);

        let scene = Rc::clone(&self.scene);
        self.simulation
            .on_tick(move |table| scene.borrow_mut().sync_positions(table));
    }

    /// Pins `id` under the pointer and raises the energy floor so its
    /// neighbours react.
    pub fn begin_drag(&mut self, id: &str, pointer: Vec2, now_ms: f64) -> bool {
        if !self.is_visible(id) || !self.simulation.pin(&mut self.table, id, pointer) {
            return false;
        }
        self.dragging = Some(id.to_owned());
        self.simulation
            .reheat(self.config.simulation.drag_alpha_target, now_ms);
        true
    }

    pub fn drag_to(&mut self, pointer: Vec2) {
        if let Some(id) = &self.dragging {
            self.simulation.pin(&mut self.table, id, pointer);
        }
    }

    pub fn end_drag(&mut self, now_ms: f64) {
        if let Some(id) = self.dragging.take() {
            self.simulation.unpin(&mut self.table, &id);
            self.simulation.reheat(0.0, now_ms);
        }
    }

    pub fn reheat(&mut self, now_ms: f64) {
        self.simulation.restart(now_ms);
    }

    /// Cancels both frame loops. The visible set and scene stay readable.
    pub fn teardown(&mut self) {
        self.scheduler.cancel();
        self.simulation.stop();
        self.dragging = None;
    }
}

#[cfg(test)]
mod tests {
    use eframe::egui::vec2;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::snapshot::{SnapshotEdge, SnapshotNode};

    fn node(id: &str, group_index: i64, similarity: Option<f32>) -> SnapshotNode {
        SnapshotNode {
            id: id.to_owned(),
            group_index,
            similarity,
            image_path: format!("{id}.jpg"),
        }
    }

    fn edge(source_id: &str, target_id: &str, weight: f32) -> SnapshotEdge {
        SnapshotEdge {
            source_id: source_id.to_owned(),
            target_id: target_id.to_owned(),
            weight,
        }
    }

    fn abc() -> Snapshot {
        Snapshot {
            queries: vec!["a bird".to_owned(), "a boat".to_owned()],
            nodes: vec![
                node("A", 0, Some(0.3)),
                node("B", 0, Some(0.25)),
                node("C", 1, Some(0.28)),
            ],
            edges: vec![edge("A", "B", 1.0), edge("B", "C", 0.5)],
        }
    }

    fn engine() -> GraphEngine {
        let config = EngineConfig::default();
        let table = NodeTable::with_rng(
            config.simulation.center,
            config.jitter_radius,
            StdRng::seed_from_u64(42),
        );
        GraphEngine::with_table(config, table)
    }

    fn assert_visible_subset(engine: &GraphEngine) {
        let snapshot_ids = engine
            .snapshot()
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<HashSet<_>>();
        for key in engine.simulation().nodes() {
            let id = &engine.table().get(*key).unwrap().id;
            assert!(snapshot_ids.contains(id.as_str()));
            assert!(engine.is_visible(id));
        }
        for link in engine.simulation().links() {
            let source = &engine.table().get(link.source).unwrap().id;
            let target = &engine.table().get(link.target).unwrap().id;
            assert!(engine.is_visible(source) && engine.is_visible(target));
        }
    }

    fn run_frames(engine: &mut GraphEngine, from_ms: f64, to_ms: f64) {
        let mut now = from_ms;
        while now <= to_ms {
            engine.frame(now);
            assert_visible_subset(engine);
            now += 16.0;
        }
    }

    #[test]
    fn first_snapshot_is_revealed_in_full_with_both_links() {
        let mut engine = engine();
        assert_eq!(engine.simulation_state(), SimulationState::Cold);

        let plan = engine.apply_snapshot(abc(), 0.0);
        assert_eq!(plan, RevealPlan::Started { arrivals: 3 });
        assert_eq!(engine.table().len(), 3);
        assert_eq!(engine.visible_node_count(), 0);

        run_frames(&mut engine, 0.0, 1_008.0);

        assert!(!engine.is_revealing());
        assert_eq!(engine.visible_node_count(), 3);
        assert_eq!(engine.simulation().nodes().len(), 3);
        assert_eq!(engine.simulation().links().len(), 2);
        assert_eq!(engine.visible_link_count(), 2);
        assert_eq!(engine.scene().nodes().len(), 3);
        assert_eq!(engine.scene().links().len(), 2);
        assert_eq!(engine.simulation_state(), SimulationState::Active);
    }

    #[test]
    fn second_snapshot_keeps_survivors_and_reveals_only_the_newcomer() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 1_200.0);

        let a_key = engine.table().key_of("A").unwrap();
        let a_position = engine.table().by_id("A").unwrap().position;
        let b_position = engine.table().by_id("B").unwrap().position;

        let mut next = abc();
        next.nodes[2] = node("D", 1, Some(0.26));
        next.edges = vec![edge("A", "B", 1.0), edge("B", "D", 0.7)];
        let plan = engine.apply_snapshot(next, 2_000.0);

        assert_eq!(plan, RevealPlan::Started { arrivals: 1 });
        assert_eq!(engine.table().len(), 3);
        assert!(engine.table().by_id("C").is_none());
        assert_eq!(engine.table().key_of("A"), Some(a_key));
        assert_eq!(engine.table().by_id("A").unwrap().position, a_position);
        assert_eq!(engine.table().by_id("B").unwrap().position, b_position);
        assert!(engine.table().by_id("D").unwrap().position.length() <= 40.0 * 2.0_f32.sqrt());

        assert!(!engine.is_visible("C"));
        assert!(!engine.is_visible("D"));
        assert!(!engine.scene().node("C").unwrap().phase.is_live());
        assert_visible_subset(&engine);

        run_frames(&mut engine, 2_000.0, 3_100.0);
        assert!(engine.is_visible("D"));
        assert!(engine.scene().node("C").is_none());
        assert_eq!(engine.simulation().links().len(), 2);
    }

    #[test]
    fn finishing_a_reveal_reseeds_the_simulation() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 992.0);
        assert!(engine.is_revealing());
        let cooled = engine.simulation().alpha();
        assert!(cooled < 0.6);

        engine.frame(1_000.0);
        assert!(!engine.is_revealing());
        assert!(engine.simulation().alpha() > cooled);
        assert_eq!(engine.scene().nodes().len(), 3);
    }

    #[test]
    fn unchanged_membership_redraws_immediately() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 1_100.0);

        let mut reweighted = abc();
        reweighted.edges[1].weight = 0.9;
        reweighted.nodes[0].group_index = 1;
        assert_eq!(
            engine.apply_snapshot(reweighted, 2_000.0),
            RevealPlan::Immediate
        );
        assert_eq!(engine.scene().node("A").unwrap().group_index, 1);
        assert_eq!(engine.simulation().alpha(), 0.6);
    }

    #[test]
    fn identical_similarities_render_at_the_midpoint_radius() {
        let mut engine = engine();
        let mut snapshot = abc();
        for item in &mut snapshot.nodes {
            item.similarity = Some(0.7);
        }
        engine.apply_snapshot(snapshot, 0.0);
        run_frames(&mut engine, 0.0, 1_100.0);

        for element in engine.scene().nodes() {
            let radius = element.radius.value(1.0e9);
            assert!(radius.is_finite());
            assert!((radius - 9.0).abs() < 1e-4);
        }
    }

    #[test]
    fn dangling_edges_never_become_links() {
        let mut engine = engine();
        let mut snapshot = abc();
        snapshot.edges.push(edge("A", "ghost", 1.0));
        snapshot.edges.push(edge("A", "B", 1.0));
        engine.apply_snapshot(snapshot, 0.0);
        run_frames(&mut engine, 0.0, 1_100.0);

        assert_eq!(engine.simulation().links().len(), 2);
        assert_eq!(engine.scene().links().len(), 2);
    }

    #[test]
    fn drag_pins_until_release() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 1_100.0);

        assert!(engine.begin_drag("A", vec2(100.0, 200.0), 1_200.0));
        assert_eq!(engine.simulation_state(), SimulationState::Reheated);
        for frame in 0..30 {
            engine.frame(1_200.0 + frame as f64 * 16.0);
            assert_eq!(engine.table().by_id("A").unwrap().position, vec2(100.0, 200.0));
            assert_eq!(engine.scene().node("A").unwrap().position, vec2(100.0, 200.0));
        }

        engine.drag_to(vec2(120.0, 180.0));
        engine.frame(1_700.0);
        assert_eq!(engine.table().by_id("A").unwrap().position, vec2(120.0, 180.0));

        engine.end_drag(1_800.0);
        assert!(!engine.table().by_id("A").unwrap().is_pinned());
        assert_eq!(engine.simulation_state(), SimulationState::Active);
        for frame in 0..30 {
            engine.frame(1_800.0 + frame as f64 * 16.0);
        }
        assert_ne!(engine.table().by_id("A").unwrap().position, vec2(120.0, 180.0));
    }

    #[test]
    fn hidden_nodes_cannot_be_dragged() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        assert!(!engine.begin_drag("A", vec2(0.0, 0.0), 0.0));
        assert!(!engine.begin_drag("missing", vec2(0.0, 0.0), 0.0));
    }

    #[test]
    fn labels_disappear_above_the_threshold() {
        let config = EngineConfig {
            label_threshold: 2,
            ..EngineConfig::default()
        };
        let mut engine = GraphEngine::with_table(
            config,
            NodeTable::with_rng(Vec2::ZERO, 40.0, StdRng::seed_from_u64(1)),
        );
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 700.0);
        assert!(engine.scene().labels_visible());

        run_frames(&mut engine, 716.0, 1_100.0);
        assert!(!engine.scene().labels_visible());
    }

    #[test]
    fn teardown_stops_both_loops() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        engine.frame(400.0);
        let visible = engine.visible_node_count();

        engine.teardown();
        assert!(!engine.is_revealing());
        assert_eq!(engine.simulation_state(), SimulationState::Idle);

        let before = engine.table().by_id("A").unwrap().position;
        engine.frame(2_000.0);
        assert_eq!(engine.table().by_id("A").unwrap().position, before);
        assert_eq!(engine.visible_node_count(), visible);
    }

    #[test]
    fn empty_snapshot_clears_the_graph() {
        let mut engine = engine();
        engine.apply_snapshot(abc(), 0.0);
        run_frames(&mut engine, 0.0, 1_100.0);

        assert_eq!(
            engine.apply_snapshot(Snapshot::default(), 2_000.0),
            RevealPlan::Immediate
        );
        assert_eq!(engine.table().len(), 0);
        assert_eq!(engine.visible_node_count(), 0);
        assert!(engine.simulation().nodes().is_empty());
        run_frames(&mut engine, 2_000.0, 3_000.0);
        assert!(engine.scene().nodes().is_empty());
    }
}
