use std::collections::{HashMap, HashSet};

use eframe::egui::{Vec2, vec2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::snapshot::Snapshot;

/// Stable handle to a persistent node. A key whose node was pruned never
/// resolves again, even if its slot is reused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

#[derive(Clone, Debug)]
pub struct PersistentNode {
    pub id: String,
    pub position: Vec2,
    pub velocity: Vec2,
    pub fixed_x: Option<f32>,
    pub fixed_y: Option<f32>,
    pub group_index: i64,
    pub similarity: Option<f32>,
}

impl PersistentNode {
    pub fn similarity_or_zero(&self) -> f32 {
        self.similarity.filter(|value| value.is_finite()).unwrap_or(0.0)
    }

    pub fn is_pinned(&self) -> bool {
        self.fixed_x.is_some() || self.fixed_y.is_some()
    }
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    node: Option<PersistentNode>,
}

#[derive(Debug, Default)]
pub struct Reconciliation {
    /// Keys in snapshot node order, duplicates dropped.
    pub ordered: Vec<NodeKey>,
    pub created: Vec<String>,
    pub removed: Vec<String>,
}

/// Arena of persistent nodes keyed by snapshot id.
pub struct NodeTable {
    slots: Vec<Slot>,
    free: Vec<u32>,
    by_id: HashMap<String, NodeKey>,
    rng: StdRng,
    center: Vec2,
    jitter_radius: f32,
}

impl NodeTable {
    pub fn new(center: Vec2, jitter_radius: f32) -> Self {
        Self::with_rng(center, jitter_radius, StdRng::from_entropy())
    }

    pub fn with_rng(center: Vec2, jitter_radius: f32, rng: StdRng) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            by_id: HashMap::new(),
            rng,
            center,
            jitter_radius: jitter_radius.max(0.0),
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn key_of(&self, id: &str) -> Option<NodeKey> {
        self.by_id.get(id).copied()
    }

    pub fn get(&self, key: NodeKey) -> Option<&PersistentNode> {
        let slot = self.slots.get(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_ref()
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut PersistentNode> {
        let slot = self.slots.get_mut(key.index as usize)?;
        if slot.generation != key.generation {
            return None;
        }
        slot.node.as_mut()
    }

    pub fn by_id(&self, id: &str) -> Option<&PersistentNode> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    pub fn by_id_mut(&mut self, id: &str) -> Option<&mut PersistentNode> {
        let key = self.key_of(id)?;
        self.get_mut(key)
    }

    pub fn reconcile(&mut self, snapshot: &Snapshot) -> Reconciliation {
        let incoming = snapshot
            .nodes
            .iter()
            .map(|node| node.id.as_str())
            .collect::<HashSet<_>>();

        let mut removed = self
            .by_id
            .keys()
            .filter(|id| !incoming.contains(id.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        removed.sort();
        for id in &removed {
            if let Some(key) = self.by_id.remove(id) {
                self.release(key);
            }
        }

        let mut seen = HashSet::with_capacity(snapshot.nodes.len());
        let mut ordered = Vec::with_capacity(snapshot.nodes.len());
        let mut created = Vec::new();

        for incoming_node in &snapshot.nodes {
            if !seen.insert(incoming_node.id.as_str()) {
                continue;
            }

            if let Some(existing) = self.by_id_mut(&incoming_node.id) {
                existing.group_index = incoming_node.group_index;
                existing.similarity = incoming_node.similarity;
            } else {
                let position = self.jittered_position();
                let key = self.insert(PersistentNode {
                    id: incoming_node.id.clone(),
                    position,
                    velocity: Vec2::ZERO,
                    fixed_x: None,
                    fixed_y: None,
                    group_index: incoming_node.group_index,
                    similarity: incoming_node.similarity,
                });
                self.by_id.insert(incoming_node.id.clone(), key);
                created.push(incoming_node.id.clone());
            }

            if let Some(key) = self.key_of(&incoming_node.id) {
                ordered.push(key);
            }
        }

        Reconciliation {
            ordered,
            created,
            removed,
        }
    }

    fn jittered_position(&mut self) -> Vec2 {
        let radius = self.jitter_radius;
        self.center
            + vec2(
                self.rng.gen_range(-radius..=radius),
                self.rng.gen_range(-radius..=radius),
            )
    }

    fn insert(&mut self, node: PersistentNode) -> NodeKey {
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.node = Some(node);
            return NodeKey {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            node: Some(node),
        });
        NodeKey {
            index,
            generation: 0,
        }
    }

    fn release(&mut self, key: NodeKey) {
        if let Some(slot) = self.slots.get_mut(key.index as usize)
            && slot.generation == key.generation
        {
            slot.node = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(key.index);
        }
    }
}
