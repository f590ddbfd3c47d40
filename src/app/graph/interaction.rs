use eframe::egui::{self, Pos2, Rect, Ui};

use super::super::render_utils::{screen_to_world, world_to_screen};
use super::super::{PointerDrag, ViewModel};

/// Smallest on-screen radius that still catches the pointer.
const MIN_HIT_RADIUS: f32 = 4.0;

impl ViewModel {
    pub(in crate::app) fn handle_graph_zoom(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
    ) {
        if !response.hovered() {
            return;
        }

        let scroll = ui.input(|input| input.raw_scroll_delta.y);
        if scroll.abs() <= f32::EPSILON {
            return;
        }

        let pointer = ui
            .input(|input| input.pointer.hover_pos())
            .unwrap_or_else(|| rect.center());
        let world_before = screen_to_world(rect, self.pan, self.zoom, pointer);

        let zoom_factor = (1.0 + (scroll * 0.0018)).clamp(0.85, 1.15);
        self.zoom = (self.zoom * zoom_factor).clamp(0.05, 6.0);
        self.pan = pointer - rect.center() - (world_before * self.zoom);
    }

    /// Primary drag on a node moves the node; anywhere else, or with the
    /// secondary/middle button, it pans the view.
    pub(in crate::app) fn handle_graph_drag(
        &mut self,
        ui: &Ui,
        rect: Rect,
        response: &egui::Response,
        now_ms: f64,
    ) {
        if response.dragged_by(egui::PointerButton::Secondary)
            || response.dragged_by(egui::PointerButton::Middle)
        {
            self.pan += response.drag_delta();
        }

        if response.drag_started_by(egui::PointerButton::Primary) {
            let origin = ui
                .input(|input| input.pointer.press_origin())
                .or_else(|| response.interact_pointer_pos());
            let hit = origin.and_then(|pointer| self.node_at(rect, pointer, now_ms));

            self.pointer_drag = match (hit, origin) {
                (Some(id), Some(pointer)) => {
                    let world = screen_to_world(rect, self.pan, self.zoom, pointer);
                    if self.engine.begin_drag(&id, world, now_ms) {
                        Some(PointerDrag::Node)
                    } else {
                        Some(PointerDrag::Canvas)
                    }
                }
                _ => Some(PointerDrag::Canvas),
            };
        }

        if response.dragged_by(egui::PointerButton::Primary) {
            match self.pointer_drag {
                Some(PointerDrag::Node) => {
                    if let Some(pointer) = response.interact_pointer_pos() {
                        let world = screen_to_world(rect, self.pan, self.zoom, pointer);
                        self.engine.drag_to(world);
                    }
                }
                Some(PointerDrag::Canvas) => self.pan += response.drag_delta(),
                None => {}
            }
        }

        if response.drag_stopped() {
            if self.pointer_drag == Some(PointerDrag::Node) {
                self.engine.end_drag(now_ms);
            }
            self.pointer_drag = None;
        }
    }

    /// Closest live node whose disc contains `pointer`.
    pub(in crate::app) fn node_at(&self, rect: Rect, pointer: Pos2, now_ms: f64) -> Option<String> {
        let scene = self.engine.scene();
        scene
            .nodes()
            .iter()
            .filter(|element| element.phase.is_live())
            .filter_map(|element| {
                let center = world_to_screen(rect, self.pan, self.zoom, element.position);
                let radius = (element.radius.value(now_ms) * self.zoom).max(MIN_HIT_RADIUS);
                let distance = center.distance(pointer);
                (distance <= radius).then_some((element, distance))
            })
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(element, _)| element.id.clone())
    }
}
