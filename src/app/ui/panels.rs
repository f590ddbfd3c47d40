use eframe::egui::{self, Align, Context, Layout, RichText, Ui};

use super::super::render_utils::group_color;
use super::super::{ViewModel, ViewRequests};

impl ViewModel {
    pub(in crate::app) fn show(
        &mut self,
        ctx: &Context,
        now_ms: f64,
        is_loading: bool,
    ) -> ViewRequests {
        let mut requests = ViewRequests::default();

        egui::TopBottomPanel::top("top_bar")
            .resizable(false)
            .show(ctx, |ui| {
                ui.horizontal(|ui| {
                    ui.heading("query-scatter");
                    ui.separator();
                    ui.label(self.queries_text());
                    ui.separator();
                    let snapshot = self.engine.snapshot();
                    ui.label(format!("nodes: {}", snapshot.nodes.len()));
                    ui.label(format!("edges: {}", snapshot.edges.len()));
                    if ui.button("Reset view").clicked() {
                        self.reset_view();
                    }
                    if ui.button("Reheat").clicked() {
                        self.engine.reheat(now_ms);
                    }
                    if is_loading {
                        ui.spinner();
                    }
                    if let Some(error) = &self.last_error {
                        ui.colored_label(egui::Color32::from_rgb(240, 110, 100), error.as_str());
                    }
                    ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                        ui.label(self.simulation_text());
                        ui.label(self.visibility_text());
                    });
                });
            });

        egui::SidePanel::left("results")
            .resizable(true)
            .default_width(340.0)
            .show(ctx, |ui| {
                self.draw_query_editor(ui, is_loading, &mut requests);
                ui.separator();
                self.draw_search(ui);
                ui.small(self.scale_text());
                ui.separator();
                self.draw_groups(ui);
            });

        egui::CentralPanel::default().show(ctx, |ui| {
            self.draw_graph(ui, now_ms);
        });

        requests
    }

    fn queries_text(&self) -> String {
        let queries = &self.engine.snapshot().queries;
        if queries.is_empty() {
            "no queries".to_owned()
        } else {
            queries.join(" · ")
        }
    }

    fn visibility_text(&self) -> String {
        let revealing = if self.engine.is_revealing() {
            ", revealing"
        } else {
            ""
        };
        format!(
            "visible: {}/{} nodes, {} links{revealing}",
            self.engine.visible_node_count(),
            self.engine.table().len(),
            self.engine.visible_link_count()
        )
    }

    fn simulation_text(&self) -> String {
        let simulation = self.engine.simulation();
        format!(
            "sim: {} | alpha {:.3} | charge {:.0} | {} bodies, {} springs",
            self.engine.simulation_state().label(),
            simulation.alpha(),
            simulation.charge_strength(),
            simulation.nodes().len(),
            simulation.links().len()
        )
    }

    fn scale_text(&self) -> String {
        let (low, high) = self.engine.scales().similarity.domain();
        format!("similarity domain {low:.3} to {high:.3}")
    }

    fn draw_query_editor(&mut self, ui: &mut Ui, is_loading: bool, requests: &mut ViewRequests) {
        ui.label(RichText::new("Queries").strong());
        ui.add(
            egui::TextEdit::multiline(&mut self.query_text)
                .desired_rows(3)
                .desired_width(f32::INFINITY)
                .hint_text("one query per line"),
        );

        let queries = self.edited_queries();
        ui.horizontal(|ui| {
            let run = ui
                .add_enabled(
                    !is_loading && !queries.is_empty(),
                    egui::Button::new("Run query"),
                )
                .on_hover_text("Fetch a new snapshot; nodes already on screen keep their place.");
            if run.clicked() {
                requests.run_queries = Some(queries);
            }
        });
    }

    fn draw_search(&mut self, ui: &mut Ui) {
        ui.horizontal(|ui| {
            ui.label("Search");
            ui.add(
                egui::TextEdit::singleline(&mut self.search)
                    .desired_width(f32::INFINITY)
                    .hint_text("id or image path"),
            );
        });
    }

    fn draw_groups(&mut self, ui: &mut Ui) {
        let mut picked = None;

        egui::ScrollArea::vertical()
            .id_salt("query_groups")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                let snapshot = self.engine.snapshot();
                if snapshot.is_empty() {
                    ui.label("The last query returned no images.");
                    return;
                }

                for group in snapshot.groups() {
                    let color = match group.query_index {
                        Some(index) => group_color(index as i64),
                        None => ui.visuals().weak_text_color(),
                    };
                    let heading = RichText::new(format!("{} ({})", group.query, group.nodes.len()))
                        .color(color)
                        .strong();

                    egui::CollapsingHeader::new(heading)
                        .id_salt(("group", group.query_index))
                        .default_open(true)
                        .show(ui, |ui| {
                            for node in &group.nodes {
                                let similarity = node
                                    .similarity
                                    .map(|value| format!("{value:.3}"))
                                    .unwrap_or_else(|| "-".to_owned());
                                let visible = self.engine.is_visible(&node.id);
                                let image_url = self.source.image_url(&node.image_path);

                                let clicked = ui
                                    .horizontal(|ui| {
                                        let label = if visible {
                                            RichText::new(node.id.as_str())
                                        } else {
                                            RichText::new(node.id.as_str()).weak()
                                        };
                                        let clicked = ui
                                            .selectable_label(self.search == node.id, label)
                                            .on_hover_text(node.image_path.as_str())
                                            .clicked();
                                        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
                                            ui.label(similarity);
                                            if let Some(url) = &image_url {
                                                ui.hyperlink_to("image", url)
                                                    .on_hover_text(url.as_str());
                                            }
                                        });
                                        clicked
                                    })
                                    .inner;

                                if clicked {
                                    picked = Some(node.id.clone());
                                }
                            }
                        });
                }
            });

        if let Some(id) = picked {
            if self.search == id {
                self.search.clear();
            } else {
                self.search = id;
            }
        }
    }
}
