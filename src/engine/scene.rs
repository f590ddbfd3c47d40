//! Retained scene of drawable elements keyed by node id or link endpoints.
//!
//! Joining a new visible set enters, updates or exits elements with short
//! presentational transitions; positions are written separately on every
//! simulation tick.

use std::collections::{HashMap, HashSet};

use eframe::egui::Vec2;

use super::reconcile::{NodeKey, NodeTable};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneTimings {
    pub node_enter_ms: f64,
    pub link_enter_ms: f64,
    pub label_enter_ms: f64,
    pub update_ms: f64,
    pub exit_ms: f64,
}

impl Default for SceneTimings {
    fn default() -> Self {
        Self {
            node_enter_ms: 300.0,
            link_enter_ms: 350.0,
            label_enter_ms: 250.0,
            update_ms: 350.0,
            exit_ms: 800.0,
        }
    }
}

fn ease_cubic_in_out(t: f64) -> f64 {
    if t < 0.5 {
        4.0 * t * t * t
    } else {
        1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tween {
    from: f32,
    to: f32,
    start_ms: f64,
    duration_ms: f64,
}

impl Tween {
    pub fn settled(value: f32) -> Self {
        Self {
            from: value,
            to: value,
            start_ms: 0.0,
            duration_ms: 0.0,
        }
    }

    pub fn new(from: f32, to: f32, start_ms: f64, duration_ms: f64) -> Self {
        Self {
            from,
            to,
            start_ms,
            duration_ms: duration_ms.max(0.0),
        }
    }

    pub fn value(&self, now_ms: f64) -> f32 {
        if self.duration_ms <= 0.0 || now_ms >= self.start_ms + self.duration_ms {
            return self.to;
        }
        let t = ((now_ms - self.start_ms) / self.duration_ms).clamp(0.0, 1.0);
        self.from + (self.to - self.from) * ease_cubic_in_out(t) as f32
    }

    pub fn is_running(&self, now_ms: f64) -> bool {
        self.from != self.to && now_ms < self.start_ms + self.duration_ms
    }

    /// Starts a new transition from wherever the current one is.
    pub fn retarget(&mut self, to: f32, now_ms: f64, duration_ms: f64) {
        if self.to == to {
            return;
        }
        *self = Self::new(self.value(now_ms), to, now_ms, duration_ms);
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Phase {
    Live,
    Exiting { remove_at_ms: f64 },
}

impl Phase {
    pub fn is_live(self) -> bool {
        self == Self::Live
    }
}

#[derive(Clone, Debug)]
pub struct NodeElement {
    pub id: String,
    pub key: NodeKey,
    pub position: Vec2,
    pub group_index: i64,
    pub fill_opacity: Tween,
    pub radius: Tween,
    pub opacity: Tween,
    pub phase: Phase,
}

#[derive(Clone, Debug)]
pub struct LinkElement {
    pub source_id: String,
    pub target_id: String,
    pub source: NodeKey,
    pub target: NodeKey,
    pub from: Vec2,
    pub to: Vec2,
    pub stroke_opacity: Tween,
    pub width: Tween,
    pub opacity: Tween,
    pub phase: Phase,
}

impl LinkElement {
    pub fn join_key(&self) -> (String, String) {
        (self.source_id.clone(), self.target_id.clone())
    }
}

#[derive(Clone, Debug)]
pub struct LabelElement {
    pub id: String,
    pub key: NodeKey,
    pub position: Vec2,
    pub opacity: Tween,
    pub phase: Phase,
}

/// Target state for one visible node, as computed by the engine.
#[derive(Clone, Debug)]
pub struct NodeTarget {
    pub id: String,
    pub key: NodeKey,
    pub position: Vec2,
    pub group_index: i64,
    pub radius: f32,
    pub fill_opacity: f32,
}

#[derive(Clone, Debug)]
pub struct LinkTarget {
    pub source_id: String,
    pub target_id: String,
    pub source: NodeKey,
    pub target: NodeKey,
    pub from: Vec2,
    pub to: Vec2,
    pub stroke_opacity: f32,
    pub width: f32,
}

#[derive(Default)]
pub struct Scene {
    nodes: Vec<NodeElement>,
    links: Vec<LinkElement>,
    labels: Vec<LabelElement>,
    labels_visible: bool,
    timings: SceneTimings,
}

impl Scene {
    pub fn new(timings: SceneTimings) -> Self {
        Self {
            timings,
            ..Self::default()
        }
    }

    pub fn nodes(&self) -> &[NodeElement] {
        &self.nodes
    }

    pub fn links(&self) -> &[LinkElement] {
        &self.links
    }

    pub fn labels(&self) -> &[LabelElement] {
        &self.labels
    }

    pub fn labels_visible(&self) -> bool {
        self.labels_visible
    }

    pub fn node(&self, id: &str) -> Option<&NodeElement> {
        self.nodes.iter().find(|element| element.id == id)
    }

    pub fn join(
        &mut self,
        nodes: &[NodeTarget],
        links: &[LinkTarget],
        show_labels: bool,
        now_ms: f64,
    ) {
        self.join_links(links, now_ms);
        self.join_nodes(nodes, now_ms);

        self.labels_visible = show_labels;
        if show_labels {
            self.join_labels(nodes, now_ms);
        }
    }

    fn join_nodes(&mut self, targets: &[NodeTarget], now_ms: f64) {
        let timings = self.timings;
        let index_by_id = self
            .nodes
            .iter()
            .enumerate()
            .map(|(index, element)| (element.id.clone(), index))
            .collect::<HashMap<_, _>>();
        let mut joined = HashSet::with_capacity(targets.len());

        for target in targets {
            joined.insert(target.id.as_str());
            match index_by_id.get(&target.id) {
                Some(&index) => {
                    let element = &mut self.nodes[index];
                    element.key = target.key;
                    element.group_index = target.group_index;
                    if !element.phase.is_live() {
                        element.phase = Phase::Live;
                        element.position = target.position;
                        element.opacity.retarget(1.0, now_ms, timings.node_enter_ms);
                    }
                    element.radius.retarget(target.radius, now_ms, timings.update_ms);
                    element
                        .fill_opacity
                        .retarget(target.fill_opacity, now_ms, timings.update_ms);
                }
                None => self.nodes.push(NodeElement {
                    id: target.id.clone(),
                    key: target.key,
                    position: target.position,
                    group_index: target.group_index,
                    fill_opacity: Tween::new(
                        0.0,
                        target.fill_opacity,
                        now_ms,
                        timings.node_enter_ms,
                    ),
                    radius: Tween::new(0.0, target.radius, now_ms, timings.node_enter_ms),
                    opacity: Tween::settled(1.0),
                    phase: Phase::Live,
                }),
            }
        }

        for element in &mut self.nodes {
            if element.phase.is_live() && !joined.contains(element.id.as_str()) {
                element.radius.retarget(0.0, now_ms, timings.exit_ms);
                element.opacity.retarget(0.0, now_ms, timings.exit_ms);
                element.phase = Phase::Exiting {
                    remove_at_ms: now_ms + timings.exit_ms,
                };
            }
        }
    }

    fn join_links(&mut self, targets: &[LinkTarget], now_ms: f64) {
        let timings = self.timings;
        let index_by_key = self
            .links
            .iter()
            .enumerate()
            .map(|(index, element)| (element.join_key(), index))
            .collect::<HashMap<_, _>>();
        let mut joined = HashSet::with_capacity(targets.len());

        for target in targets {
            let key = (target.source_id.clone(), target.target_id.clone());
            match index_by_key.get(&key) {
                Some(&index) => {
                    let element = &mut self.links[index];
                    element.source = target.source;
                    element.target = target.target;
                    if !element.phase.is_live() {
                        element.phase = Phase::Live;
                        element.from = target.from;
                        element.to = target.to;
                        element.opacity.retarget(1.0, now_ms, timings.link_enter_ms);
                    }
                    element
                        .stroke_opacity
                        .retarget(target.stroke_opacity, now_ms, timings.update_ms);
                    element.width.retarget(target.width, now_ms, timings.update_ms);
                }
                None => self.links.push(LinkElement {
                    source_id: target.source_id.clone(),
                    target_id: target.target_id.clone(),
                    source: target.source,
                    target: target.target,
                    from: target.from,
                    to: target.to,
                    stroke_opacity: Tween::new(
                        0.0,
                        target.stroke_opacity,
                        now_ms,
                        timings.link_enter_ms,
                    ),
                    width: Tween::new(0.0, target.width, now_ms, timings.link_enter_ms),
                    opacity: Tween::settled(1.0),
                    phase: Phase::Live,
                }),
            }
            joined.insert(key);
        }

        for element in &mut self.links {
            if element.phase.is_live() && !joined.contains(&element.join_key()) {
                element.opacity.retarget(0.0, now_ms, timings.exit_ms);
                element.phase = Phase::Exiting {
                    remove_at_ms: now_ms + timings.exit_ms,
                };
            }
        }
    }

    fn join_labels(&mut self, targets: &[NodeTarget], now_ms: f64) {
        let timings = self.timings;
        let index_by_id = self
            .labels
            .iter()
            .enumerate()
            .map(|(index, element)| (element.id.clone(), index))
            .collect::<HashMap<_, _>>();
        let mut joined = HashSet::with_capacity(targets.len());

        for target in targets {
            joined.insert(target.id.as_str());
            match index_by_id.get(&target.id) {
                Some(&index) => {
                    let element = &mut self.labels[index];
                    element.key = target.key;
                    if !element.phase.is_live() {
                        element.phase = Phase::Live;
                        element.position = target.position;
                        element.opacity.retarget(1.0, now_ms, timings.label_enter_ms);
                    }
                }
                None => self.labels.push(LabelElement {
                    id: target.id.clone(),
                    key: target.key,
                    position: target.position,
                    opacity: Tween::new(0.0, 1.0, now_ms, timings.label_enter_ms),
                    phase: Phase::Live,
                }),
            }
        }

        for element in &mut self.labels {
            if element.phase.is_live() && !joined.contains(element.id.as_str()) {
                element.opacity.retarget(0.0, now_ms, timings.exit_ms);
                element.phase = Phase::Exiting {
                    remove_at_ms: now_ms + timings.exit_ms,
                };
            }
        }
    }

    /// Writes current physical positions into every element whose node
    /// still exists. Exiting elements of pruned nodes keep their last spot.
    pub fn sync_positions(&mut self, table: &NodeTable) {
        for element in &mut self.nodes {
            if let Some(node) = table.get(element.key) {
                element.position = node.position;
            }
        }

        for element in &mut self.links {
            if let Some(node) = table.get(element.source) {
                element.from = node.position;
            }
            if let Some(node) = table.get(element.target) {
                element.to = node.position;
            }
        }

        if self.labels_visible {
            for element in &mut self.labels {
                if let Some(node) = table.get(element.key) {
                    element.position = node.position;
                }
            }
        }
    }

    /// Removes finished exits. Returns whether anything is still animating.
    pub fn advance(&mut self, now_ms: f64) -> bool {
        let finished = |phase: Phase| {
            matches!(phase, Phase::Exiting { remove_at_ms } if remove_at_ms <= now_ms)
        };
        self.nodes.retain(|element| !finished(element.phase));
        self.links.retain(|element| !finished(element.phase));
        self.labels.retain(|element| !finished(element.phase));

        self.nodes.iter().any(|element| {
            !element.phase.is_live()
                || element.radius.is_running(now_ms)
                || element.fill_opacity.is_running(now_ms)
                || element.opacity.is_running(now_ms)
        }) || self.links.iter().any(|element| {
            !element.phase.is_live()
                || element.stroke_opacity.is_running(now_ms)
                || element.width.is_running(now_ms)
                || element.opacity.is_running(now_ms)
        })
            || (self.labels_visible
                && self
                    .labels
                    .iter()
                    .any(|element| !element.phase.is_live() || element.opacity.is_running(now_ms)))
    }
}
