use std::collections::HashSet;
use std::sync::Arc;

use eframe::egui::{self, Align2, Color32, FontId, Sense, Stroke, Ui, vec2};
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

use crate::engine::PersistentNode;

use super::super::render_utils::{
    blend_color, circle_visible, dim_color, draw_background, group_color, segment_visible,
    with_opacity, world_to_screen,
};
use super::super::{SearchMatchCache, ViewModel};

const LINK_COLOR: Color32 = Color32::from_rgb(168, 180, 198);
const MATCH_RING: Color32 = Color32::from_rgb(245, 206, 93);

fn fuzzy_match_score(matcher: &SkimMatcherV2, text: &str, query: &str) -> Option<i64> {
    matcher
        .fuzzy_match(text, query)
        .or_else(|| matcher.fuzzy_match(&text.to_ascii_lowercase(), &query.to_ascii_lowercase()))
}

impl ViewModel {
    /// Ids of snapshot nodes whose id or image path fuzzy-matches the search.
    fn search_matches(&mut self) -> Option<Arc<HashSet<String>>> {
        let search_query = self.search.trim();
        if search_query.is_empty() {
            return None;
        }

        if let Some(cached) = &self.search_match_cache
            && cached.snapshot_revision == self.snapshot_revision
            && cached.query == search_query
        {
            return Some(Arc::clone(&cached.matches));
        }

        let matcher = SkimMatcherV2::default();
        let matches = self
            .engine
            .snapshot()
            .nodes
            .iter()
            .filter(|node| {
                fuzzy_match_score(&matcher, &node.id, search_query).is_some()
                    || fuzzy_match_score(&matcher, &node.image_path, search_query).is_some()
            })
            .map(|node| node.id.clone())
            .collect::<HashSet<_>>();
        let matches = Arc::new(matches);

        self.search_match_cache = Some(SearchMatchCache {
            query: search_query.to_owned(),
            snapshot_revision: self.snapshot_revision,
            matches: Arc::clone(&matches),
        });

        Some(matches)
    }

    pub(in crate::app) fn draw_graph(&mut self, ui: &mut Ui, now_ms: f64) {
        let (rect, response) = ui.allocate_exact_size(ui.available_size(), Sense::click_and_drag());
        let painter = ui.painter_at(rect);

        draw_background(&painter, rect, self.pan, self.zoom);

        self.handle_graph_zoom(ui, rect, &response);
        self.handle_graph_drag(ui, rect, &response, now_ms);

        let matches = self.search_matches();
        let hovered = ui
            .input(|input| input.pointer.hover_pos())
            .filter(|pointer| rect.contains(*pointer))
            .and_then(|pointer| self.node_at(rect, pointer, now_ms));

        if self.engine.dragging().is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::Grabbing);
        } else if hovered.is_some() {
            ui.output_mut(|output| output.cursor_icon = egui::CursorIcon::Grab);
        }

        let pan = self.pan;
        let zoom = self.zoom;
        let scene = self.engine.scene();
        let table = self.engine.table();

        if scene.nodes().is_empty() && self.engine.snapshot().is_empty() {
            painter.text(
                rect.center(),
                Align2::CENTER_CENTER,
                "No images matched the current queries.",
                FontId::proportional(14.0),
                Color32::from_gray(170),
            );
            return;
        }

        let line_scale = zoom.sqrt();
        for link in scene.links() {
            let start = world_to_screen(rect, pan, zoom, link.from);
            let end = world_to_screen(rect, pan, zoom, link.to);
            if !segment_visible(rect, start, end, 2.0) {
                continue;
            }

            let mut opacity = link.stroke_opacity.value(now_ms) * link.opacity.value(now_ms);
            let both_match = matches.as_ref().is_none_or(|matches| {
                matches.contains(&link.source_id) && matches.contains(&link.target_id)
            });
            if !both_match {
                opacity *= 0.35;
            }

            painter.line_segment(
                [start, end],
                Stroke::new(
                    (link.width.value(now_ms) * line_scale).clamp(0.3, 4.0),
                    with_opacity(LINK_COLOR, opacity),
                ),
            );
        }

        for node in scene.nodes() {
            let center = world_to_screen(rect, pan, zoom, node.position);
            let radius = node.radius.value(now_ms) * zoom;
            if radius <= 0.05 || !circle_visible(rect, center, radius) {
                continue;
            }

            let is_hovered = hovered.as_deref() == Some(node.id.as_str());
            let is_match = matches
                .as_ref()
                .is_some_and(|matches| matches.contains(&node.id));
            let dimmed = matches.is_some() && !is_match;

            let base = group_color(node.group_index);
            let color = if is_hovered {
                blend_color(base, Color32::WHITE, 0.35)
            } else if dimmed {
                dim_color(base, 0.45)
            } else {
                base
            };
            let dim_factor = if dimmed { 0.5 } else { 1.0 };
            let opacity =
                node.fill_opacity.value(now_ms) * node.opacity.value(now_ms) * dim_factor;

            painter.circle_filled(center, radius, with_opacity(color, opacity));
            painter.circle_stroke(
                center,
                radius,
                Stroke::new(1.0, with_opacity(Color32::from_rgb(10, 12, 16), opacity * 0.8)),
            );
            let pinned = table
                .get(node.key)
                .is_some_and(PersistentNode::is_pinned);
            if pinned {
                painter.circle_stroke(
                    center,
                    radius + 1.5,
                    Stroke::new(1.4, with_opacity(Color32::WHITE, 0.85)),
                );
            }
            if is_match {
                painter.circle_stroke(
                    center,
                    radius + 3.0,
                    Stroke::new(1.6, with_opacity(MATCH_RING, node.opacity.value(now_ms))),
                );
            }
        }

        if scene.labels_visible() {
            for label in scene.labels() {
                let opacity = label.opacity.value(now_ms);
                let position = world_to_screen(rect, pan, zoom, label.position);
                if opacity <= 0.01 || !rect.contains(position) {
                    continue;
                }

                let offset = scene
                    .node(&label.id)
                    .map(|node| node.radius.value(now_ms) * zoom)
                    .unwrap_or(0.0)
                    + 4.0;
                painter.text(
                    position + vec2(offset, 0.0),
                    Align2::LEFT_CENTER,
                    &label.id,
                    FontId::proportional(11.0),
                    with_opacity(Color32::from_gray(226), opacity),
                );
            }
        }

        if let Some(id) = &hovered
            && let Some(node) = scene.node(id)
        {
            let similarity = table
                .by_id(id)
                .and_then(|node| node.similarity)
                .map(|value| format!("{value:.3}"))
                .unwrap_or_else(|| "-".to_owned());
            let panel_text = format!(
                "{id}  |  {}  |  similarity {similarity}",
                self.engine.snapshot().query_label(node.group_index)
            );
            painter.text(
                rect.left_top() + vec2(10.0, 10.0),
                Align2::LEFT_TOP,
                panel_text,
                FontId::proportional(13.0),
                Color32::from_gray(240),
            );
        }
    }
}
