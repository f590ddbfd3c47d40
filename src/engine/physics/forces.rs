use eframe::egui::{Vec2, vec2};

use super::quadtree::QuadNode;

/// Deterministic direction for coincident bodies so they separate instead of
/// producing a zero-length normal.
fn jiggle(from: usize, to: usize) -> Vec2 {
    let angle = ((from as f32) * 0.618_034 + (to as f32) * 0.414_214) * std::f32::consts::TAU;
    vec2(angle.cos(), angle.sin())
}

#[derive(Clone, Copy)]
pub(super) struct ChargeParams {
    /// Signed strength already scaled by alpha; negative repels.
    pub(super) strength: f32,
    pub(super) theta: f32,
    pub(super) min_distance_sq: f32,
}

fn charge_between(delta: Vec2, weight: f32, params: ChargeParams) -> Vec2 {
    let distance_sq = delta.length_sq().max(params.min_distance_sq);
    delta * (params.strength * weight / distance_sq)
}

/// Many-body charge for one body: velocity change of `strength / distance`
/// along the line to each other body, with distant cells approximated by
/// their centroid.
pub(super) fn accumulate_charge(
    node: &QuadNode,
    index: usize,
    positions: &[Vec2],
    params: ChargeParams,
    velocity: &mut Vec2,
) {
    if node.count == 0 {
        return;
    }

    let point = positions[index];

    if node.is_leaf() {
        for &other in &node.bodies {
            if other == index {
                continue;
            }
            let mut delta = positions[other] - point;
            if delta.length_sq() <= f32::EPSILON {
                delta = jiggle(index, other) * 1e-3;
            }
            *velocity += charge_between(delta, 1.0, params);
        }
        return;
    }

    let delta = node.centroid - point;
    let distance_sq = delta.length_sq().max(f32::EPSILON);
    let far_enough = !node.bounds.contains(point)
        && node.bounds.width() * node.bounds.width() < params.theta * params.theta * distance_sq;

    if far_enough {
        *velocity += charge_between(delta, node.count as f32, params);
        return;
    }

    for child in node.children() {
        accumulate_charge(child, index, positions, params, velocity);
    }
}

#[derive(Clone, Copy)]
pub(super) struct CollisionParams {
    pub(super) min_distance: f32,
    pub(super) strength: f32,
}

fn separate_pair(
    from: usize,
    to: usize,
    positions: &[Vec2],
    params: CollisionParams,
    velocities: &mut [Vec2],
) {
    let delta = positions[from] - positions[to];
    let distance = delta.length();
    if distance >= params.min_distance {
        return;
    }

    let direction = if distance > 1e-4 {
        delta / distance
    } else {
        jiggle(from, to)
    };

    // Equal radii: each body takes half of the overlap.
    let push = (params.min_distance - distance) * 0.5 * params.strength;
    velocities[from] += direction * push;
    velocities[to] -= direction * push;
}

/// Pairwise overlap resolution, pruning cell pairs farther apart than the
/// minimum separation.
pub(super) fn accumulate_collisions(
    node_a: &QuadNode,
    node_b: &QuadNode,
    same_node: bool,
    positions: &[Vec2],
    params: CollisionParams,
    velocities: &mut [Vec2],
) {
    if node_a.bounds.gap_sq(node_b.bounds) > params.min_distance * params.min_distance {
        return;
    }

    if node_a.is_leaf() && node_b.is_leaf() {
        if same_node {
            for (offset, &from) in node_a.bodies.iter().enumerate() {
                for &to in &node_a.bodies[offset + 1..] {
                    separate_pair(from, to, positions, params, velocities);
                }
            }
        } else {
            for &from in &node_a.bodies {
                for &to in &node_b.bodies {
                    separate_pair(from, to, positions, params, velocities);
                }
            }
        }
        return;
    }

    if same_node {
        let children = node_a.children().collect::<Vec<_>>();
        for (offset, child_a) in children.iter().enumerate() {
            accumulate_collisions(child_a, child_a, true, positions, params, velocities);
            for child_b in &children[offset + 1..] {
                accumulate_collisions(child_a, child_b, false, positions, params, velocities);
            }
        }
        return;
    }

    let split_a = !node_a.is_leaf()
        && (node_b.is_leaf() || node_a.bounds.half_extent >= node_b.bounds.half_extent);

    if split_a {
        for child in node_a.children() {
            accumulate_collisions(child, node_b, false, positions, params, velocities);
        }
    } else {
        for child in node_b.children() {
            accumulate_collisions(node_a, child, false, positions, params, velocities);
        }
    }
}

/// Per-axis pull toward `target`, scaled by alpha.
pub(super) fn apply_centering(
    positions: &[Vec2],
    target: Vec2,
    strength: f32,
    velocities: &mut [Vec2],
) {
    for (position, velocity) in positions.iter().zip(velocities.iter_mut()) {
        *velocity += (target - *position) * strength;
    }
}

/// Rigid shift so the centroid sits on `target`.
pub(super) fn apply_recentering(positions: &mut [Vec2], target: Vec2) {
    if positions.is_empty() {
        return;
    }

    let centroid =
        positions.iter().fold(Vec2::ZERO, |sum, position| sum + *position) / positions.len() as f32;
    let shift = centroid - target;
    for position in positions.iter_mut() {
        *position -= shift;
    }
}

#[derive(Clone, Copy, Debug)]
pub(super) struct LinkSpring {
    pub(super) source: usize,
    pub(super) target: usize,
    pub(super) strength: f32,
    pub(super) distance: f32,
    /// Share of the correction taken by the target, by relative degree.
    pub(super) bias: f32,
}

/// Springs toward each link's rest distance, read on predicted positions.
pub(super) fn apply_links(
    springs: &[LinkSpring],
    positions: &[Vec2],
    alpha: f32,
    velocities: &mut [Vec2],
) {
    for spring in springs {
        if spring.source == spring.target {
            continue;
        }

        let source = positions[spring.source] + velocities[spring.source];
        let target = positions[spring.target] + velocities[spring.target];
        let mut delta = target - source;
        let mut distance = delta.length();
        if distance <= 1e-4 {
            delta = jiggle(spring.source, spring.target) * 1e-3;
            distance = delta.length();
        }

        let correction = delta * ((distance - spring.distance) / distance * alpha * spring.strength);
        velocities[spring.target] -= correction * spring.bias;
        velocities[spring.source] += correction * (1.0 - spring.bias);
    }
}
