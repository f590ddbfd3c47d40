mod forces;
mod quadtree;

use std::collections::HashMap;

use eframe::egui::{Vec2, vec2};

use super::frame_loop::FrameLoop;
use super::reconcile::{NodeKey, NodeTable};
use forces::{
    ChargeParams, CollisionParams, LinkSpring, accumulate_charge, accumulate_collisions,
    apply_centering, apply_links, apply_recentering,
};
use quadtree::QuadNode;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimulationConfig {
    pub center: Vec2,
    pub charge_base: f32,
    pub charge_density_coefficient: f32,
    pub charge_density_cap: f32,
    pub charge_theta: f32,
    pub collision_radius: f32,
    pub centering_strength: f32,
    pub velocity_decay: f32,
    pub alpha_decay: f32,
    pub alpha_min: f32,
    pub reseed_alpha: f32,
    pub drag_alpha_target: f32,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            center: Vec2::ZERO,
            charge_base: -520.0,
            charge_density_coefficient: 80.0,
            charge_density_cap: 6.0,
            charge_theta: 0.9,
            collision_radius: 10.0,
            centering_strength: 0.05,
            velocity_decay: 0.55,
            alpha_decay: 0.001,
            alpha_min: 0.001,
            reseed_alpha: 0.6,
            drag_alpha_target: 0.25,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SimulationState {
    Cold,
    Active,
    Reheated,
    Idle,
}

impl SimulationState {
    pub fn label(self) -> &'static str {
        match self {
            Self::Cold => "cold",
            Self::Active => "active",
            Self::Reheated => "reheated",
            Self::Idle => "idle",
        }
    }
}

/// Link between two visible nodes with its scale-derived spring parameters.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimLink {
    pub source: NodeKey,
    pub target: NodeKey,
    pub strength: f32,
    pub distance: f32,
}

type TickListener = Box<dyn FnMut(&NodeTable)>;

#[derive(Default)]
struct Scratch {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    springs: Vec<LinkSpring>,
}

pub struct Simulation {
    config: SimulationConfig,
    nodes: Vec<NodeKey>,
    links: Vec<SimLink>,
    alpha: f32,
    alpha_target: f32,
    charge_strength: f32,
    seeded: bool,
    frame_loop: FrameLoop,
    listener: Option<TickListener>,
    scratch: Scratch,
}

impl Simulation {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            links: Vec::new(),
            alpha: 1.0,
            alpha_target: 0.0,
            charge_strength: config.charge_base,
            seeded: false,
            frame_loop: FrameLoop::default(),
            listener: None,
            scratch: Scratch::default(),
        }
    }

    pub fn state(&self) -> SimulationState {
        if !self.seeded {
            SimulationState::Cold
        } else if !self.frame_loop.is_active() {
            SimulationState::Idle
        } else if self.alpha_target > 0.0 {
            SimulationState::Reheated
        } else {
            SimulationState::Active
        }
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn charge_strength(&self) -> f32 {
        self.charge_strength
    }

    pub fn nodes(&self) -> &[NodeKey] {
        &self.nodes
    }

    pub fn links(&self) -> &[SimLink] {
        &self.links
    }

    /// Replaces the slot the tick handler lives in.
    pub fn on_tick(&mut self, listener: impl FnMut(&NodeTable) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Swaps in the visible nodes and links and restarts with fresh energy.
    /// Denser link sets get a stronger repulsion.
    pub fn seed(&mut self, nodes: Vec<NodeKey>, links: Vec<SimLink>, now_ms: f64) {
        let density = links.len() as f32 / nodes.len().max(1) as f32;
        self.charge_strength = self.config.charge_base
            - self.config.charge_density_coefficient
                * density.min(self.config.charge_density_cap);

        self.nodes = nodes;
        self.links = links;
        self.rebuild_springs();

        let was_idle = !self.seeded || !self.frame_loop.is_active();
        self.seeded = true;
        self.alpha = self.config.reseed_alpha;
        self.frame_loop.start(now_ms);
        if was_idle {
            log::debug!(
                "simulation active with {} nodes and {} links",
                self.nodes.len(),
                self.links.len()
            );
        }
    }

    /// Sets the energy floor the simulation settles toward; zero lets it cool.
    pub fn reheat(&mut self, alpha_target: f32, now_ms: f64) {
        self.alpha_target = alpha_target.max(0.0);
        if self.seeded && alpha_target > 0.0 && !self.frame_loop.is_active() {
            self.frame_loop.start(now_ms);
        }
    }

    /// Restarts at the reseed energy without touching the data.
    pub fn restart(&mut self, now_ms: f64) {
        if !self.seeded {
            return;
        }
        self.alpha = self.alpha.max(self.config.reseed_alpha);
        self.frame_loop.start(now_ms);
    }

    pub fn stop(&mut self) {
        self.frame_loop.cancel();
    }

    pub fn pin(&self, table: &mut NodeTable, id: &str, position: Vec2) -> bool {
        let Some(node) = table.by_id_mut(id) else {
            return false;
        };
        node.fixed_x = Some(position.x);
        node.fixed_y = Some(position.y);
        true
    }

    pub fn unpin(&self, table: &mut NodeTable, id: &str) -> bool {
        let Some(node) = table.by_id_mut(id) else {
            return false;
        };
        node.fixed_x = None;
        node.fixed_y = None;
        true
    }

    /// Runs one tick if the loop is live, then notifies the listener.
    /// Returns whether a tick happened.
    pub fn tick(&mut self, table: &mut NodeTable) -> bool {
        if !self.frame_loop.is_active() {
            return false;
        }

        self.step(table);

        if let Some(listener) = self.listener.as_mut() {
            listener(table);
        }

        if self.alpha < self.config.alpha_min {
            self.frame_loop.cancel();
            log::debug!("simulation idle at alpha {:.4}", self.alpha);
        }
        true
    }

    fn rebuild_springs(&mut self) {
        let index_by_key = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, key)| (*key, index))
            .collect::<HashMap<_, _>>();

        let mut degree = vec![0usize; self.nodes.len()];
        let mut resolved = Vec::with_capacity(self.links.len());
        for link in &self.links {
            if let (Some(&source), Some(&target)) =
                (index_by_key.get(&link.source), index_by_key.get(&link.target))
            {
                degree[source] += 1;
                degree[target] += 1;
                resolved.push((source, target, link.strength, link.distance));
            }
        }

        self.scratch.springs = resolved
            .into_iter()
            .map(|(source, target, strength, distance)| LinkSpring {
                source,
                target,
                strength: if strength.is_finite() { strength } else { 0.0 },
                distance: if distance.is_finite() { distance } else { 0.0 },
                bias: degree[source] as f32 / (degree[source] + degree[target]) as f32,
            })
            .collect();
    }

    /// Drops nodes pruned from the table since the last seed.
    fn drop_stale(&mut self, table: &NodeTable) {
        if self.nodes.iter().all(|key| table.get(*key).is_some()) {
            return;
        }

        self.nodes.retain(|key| table.get(*key).is_some());
        self.links
            .retain(|link| table.get(link.source).is_some() && table.get(link.target).is_some());
        self.rebuild_springs();
    }

    fn step(&mut self, table: &mut NodeTable) {
        self.drop_stale(table);
        self.alpha += (self.alpha_target - self.alpha) * self.config.alpha_decay;

        let scratch = &mut self.scratch;
        scratch.positions.clear();
        scratch.velocities.clear();
        for key in &self.nodes {
            if let Some(node) = table.get(*key) {
                scratch.positions.push(node.position);
                scratch.velocities.push(node.velocity);
            }
        }

        let positions = &mut scratch.positions;
        let velocities = &mut scratch.velocities;
        let alpha = self.alpha;

        if let Some(tree) = QuadNode::build(positions) {
            let charge = ChargeParams {
                strength: self.charge_strength * alpha,
                theta: self.config.charge_theta,
                min_distance_sq: 1.0,
            };
            for (index, velocity) in velocities.iter_mut().enumerate() {
                accumulate_charge(&tree, index, positions, charge, velocity);
            }

            let min_distance = self.config.collision_radius * 2.0;
            if min_distance > 0.0 {
                accumulate_collisions(
                    &tree,
                    &tree,
                    true,
                    positions,
                    CollisionParams {
                        min_distance,
                        strength: 1.0,
                    },
                    velocities,
                );
            }
        }

        apply_centering(
            positions,
            self.config.center,
            self.config.centering_strength * alpha,
            velocities,
        );
        apply_recentering(positions, self.config.center);
        apply_links(&scratch.springs, positions, alpha, velocities);

        let retain = 1.0 - self.config.velocity_decay;
        for (index, key) in self.nodes.iter().enumerate() {
            let Some(node) = table.get_mut(*key) else {
                continue;
            };
            let mut position = positions[index];
            let mut velocity = velocities[index];

            match node.fixed_x {
                Some(x) => {
                    position.x = x;
                    velocity.x = 0.0;
                }
                None => {
                    velocity.x *= retain;
                    position.x += velocity.x;
                }
            }
            match node.fixed_y {
                Some(y) => {
                    position.y = y;
                    velocity.y = 0.0;
                }
                None => {
                    velocity.y *= retain;
                    position.y += velocity.y;
                }
            }

            if !(position.x.is_finite() && position.y.is_finite()) {
                position = self.config.center + vec2(index as f32 * 0.01, 0.0);
                velocity = Vec2::ZERO;
            }

            node.position = position;
            node.velocity = velocity;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    use super::*;
    use crate::snapshot::{Snapshot, SnapshotNode};

    fn table_with(ids: &[&str]) -> (NodeTable, Vec<NodeKey>) {
        let mut table = NodeTable::with_rng(Vec2::ZERO, 40.0, StdRng::seed_from_u64(11));
        let snapshot = Snapshot {
            queries: vec!["q".to_owned()],
            nodes: ids
                .iter()
                .map(|id| SnapshotNode {
                    id: (*id).to_owned(),
                    group_index: 0,
                    similarity: Some(0.5),
                    image_path: String::new(),
                })
                .collect(),
            edges: Vec::new(),
        };
        let keys = table.reconcile(&snapshot).ordered;
        (table, keys)
    }

    fn link(source: NodeKey, target: NodeKey) -> SimLink {
        SimLink {
            source,
            target,
            strength: 0.4,
            distance: 120.0,
        }
    }

    #[test]
    fn lifecycle_moves_from_cold_to_active_to_idle() {
        let (mut table, keys) = table_with(&["A", "B"]);
        let mut simulation = Simulation::new(SimulationConfig {
            alpha_decay: 0.2,
            ..SimulationConfig::default()
        });
        assert_eq!(simulation.state(), SimulationState::Cold);
        assert!(!simulation.tick(&mut table));

        simulation.seed(keys, Vec::new(), 0.0);
        assert_eq!(simulation.state(), SimulationState::Active);

        let mut ticks = 0;
        while simulation.tick(&mut table) {
            ticks += 1;
            assert!(ticks < 1_000);
        }
        assert_eq!(simulation.state(), SimulationState::Idle);
        assert!(simulation.alpha() < SimulationConfig::default().alpha_min);
    }

    #[test]
    fn reheating_holds_energy_until_released() {
        let (mut table, keys) = table_with(&["A", "B"]);
        let mut simulation = Simulation::new(SimulationConfig {
            alpha_decay: 0.2,
            ..SimulationConfig::default()
        });
        simulation.seed(keys, Vec::new(), 0.0);
        simulation.reheat(0.25, 0.0);
        assert_eq!(simulation.state(), SimulationState::Reheated);

        for _ in 0..200 {
            assert!(simulation.tick(&mut table));
        }
        assert!((simulation.alpha() - 0.25).abs() < 1e-3);

        simulation.reheat(0.0, 0.0);
        assert_eq!(simulation.state(), SimulationState::Active);
        while simulation.tick(&mut table) {}
        assert_eq!(simulation.state(), SimulationState::Idle);
    }

    #[test]
    fn reseeding_an_idle_simulation_restarts_it() {
        let (mut table, keys) = table_with(&["A", "B"]);
        let mut simulation = Simulation::new(SimulationConfig {
            alpha_decay: 0.5,
            ..SimulationConfig::default()
        });
        simulation.seed(keys.clone(), Vec::new(), 0.0);
        while simulation.tick(&mut table) {}
        assert_eq!(simulation.state(), SimulationState::Idle);

        simulation.seed(keys, Vec::new(), 10.0);
        assert_eq!(simulation.state(), SimulationState::Active);
        assert_eq!(simulation.alpha(), SimulationConfig::default().reseed_alpha);
        assert!(simulation.tick(&mut table));
    }

    #[test]
    fn charge_grows_with_link_density() {
        let (_table, keys) = table_with(&["A", "B", "C", "D"]);
        let mut simulation = Simulation::new(SimulationConfig::default());

        simulation.seed(keys.clone(), Vec::new(), 0.0);
        assert_eq!(simulation.charge_strength(), -520.0);

        let links = vec![
            link(keys[0], keys[1]),
            link(keys[1], keys[2]),
            link(keys[2], keys[3]),
            link(keys[3], keys[0]),
        ];
        simulation.seed(keys.clone(), links, 0.0);
        assert_eq!(simulation.charge_strength(), -600.0);

        let dense = (0..40).map(|_| link(keys[0], keys[1])).collect();
        simulation.seed(keys, dense, 0.0);
        assert_eq!(simulation.charge_strength(), -1000.0);
    }

    #[test]
    fn repulsion_spreads_jittered_nodes() {
        let (mut table, keys) = table_with(&["A", "B", "C", "D", "E", "F"]);
        let spread = |table: &NodeTable, keys: &[NodeKey]| {
            keys.iter()
                .map(|key| table.get(*key).unwrap().position.length())
                .sum::<f32>()
        };
        let before = spread(&table, &keys);

        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.seed(keys.clone(), Vec::new(), 0.0);
        for _ in 0..120 {
            simulation.tick(&mut table);
        }

        assert!(spread(&table, &keys) > before);
        for key in &keys {
            let node = table.get(*key).unwrap();
            assert!(node.position.x.is_finite() && node.position.y.is_finite());
        }
    }

    #[test]
    fn pinned_node_holds_its_position_every_tick() {
        let (mut table, keys) = table_with(&["A", "B", "C"]);
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.seed(keys.clone(), vec![link(keys[0], keys[1])], 0.0);
        simulation.reheat(0.25, 0.0);

        assert!(simulation.pin(&mut table, "A", vec2(100.0, 200.0)));
        for _ in 0..50 {
            simulation.tick(&mut table);
            assert_eq!(table.by_id("A").unwrap().position, vec2(100.0, 200.0));
        }

        assert!(simulation.unpin(&mut table, "A"));
        simulation.reheat(0.0, 0.0);
        assert!(!table.by_id("A").unwrap().is_pinned());
        for _ in 0..50 {
            simulation.tick(&mut table);
        }
        assert_ne!(table.by_id("A").unwrap().position, vec2(100.0, 200.0));
    }

    #[test]
    fn pinning_unknown_ids_is_a_no_op() {
        let (mut table, _keys) = table_with(&["A"]);
        let simulation = Simulation::new(SimulationConfig::default());
        assert!(!simulation.pin(&mut table, "missing", vec2(1.0, 1.0)));
        assert!(!simulation.unpin(&mut table, "missing"));
    }

    #[test]
    fn listener_sees_every_tick() {
        let (mut table, keys) = table_with(&["A", "B"]);
        let mut simulation = Simulation::new(SimulationConfig::default());
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        simulation.on_tick(move |_table| counter.set(counter.get() + 1));
        simulation.seed(keys, Vec::new(), 0.0);

        for _ in 0..5 {
            simulation.tick(&mut table);
        }
        assert_eq!(seen.get(), 5);
    }

    #[test]
    fn stale_keys_are_dropped_before_stepping() {
        let (mut table, keys) = table_with(&["A", "B", "C"]);
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.seed(keys.clone(), vec![link(keys[0], keys[2])], 0.0);

        let snapshot = Snapshot {
            queries: vec!["q".to_owned()],
            nodes: ["A", "B"]
                .iter()
                .map(|id| SnapshotNode {
                    id: (*id).to_owned(),
                    group_index: 0,
                    similarity: None,
                    image_path: String::new(),
                })
                .collect(),
            edges: Vec::new(),
        };
        table.reconcile(&snapshot);

        assert!(simulation.tick(&mut table));
        assert_eq!(simulation.nodes().len(), 2);
        assert!(simulation.links().is_empty());
    }

    #[test]
    fn stop_prevents_further_ticks() {
        let (mut table, keys) = table_with(&["A", "B"]);
        let mut simulation = Simulation::new(SimulationConfig::default());
        simulation.seed(keys, Vec::new(), 0.0);
        simulation.stop();
        assert!(!simulation.tick(&mut table));
        assert_eq!(simulation.state(), SimulationState::Idle);
    }
}
