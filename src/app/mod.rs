use std::collections::HashSet;
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, TryRecvError};
use std::thread;

use eframe::egui::{self, Context, Vec2};

use crate::engine::{EngineConfig, GraphEngine};
use crate::snapshot::{Snapshot, SnapshotSource};

mod graph;
mod render_utils;
mod ui;

type LoadResult = Result<Snapshot, String>;

pub struct QueryScatterApp {
    source: SnapshotSource,
    config: EngineConfig,
    state: AppState,
    reload_rx: Option<Receiver<LoadResult>>,
}

enum AppState {
    Loading { rx: Receiver<LoadResult> },
    Ready(Box<ViewModel>),
    Error(String),
}

struct ViewModel {
    engine: GraphEngine,
    source: SnapshotSource,
    snapshot_revision: u64,
    query_text: String,
    search: String,
    search_match_cache: Option<SearchMatchCache>,
    last_error: Option<String>,
    pan: Vec2,
    zoom: f32,
    pointer_drag: Option<PointerDrag>,
}

struct SearchMatchCache {
    query: String,
    snapshot_revision: u64,
    matches: Arc<HashSet<String>>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PointerDrag {
    Node,
    Canvas,
}

/// What the panels asked for during one frame.
#[derive(Default)]
struct ViewRequests {
    run_queries: Option<Vec<String>>,
}

impl QueryScatterApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, source: SnapshotSource, config: EngineConfig) -> Self {
        let state = Self::start_load(source.clone());
        Self {
            source,
            config,
            state,
            reload_rx: None,
        }
    }

    fn spawn_load(source: SnapshotSource) -> Receiver<LoadResult> {
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let result = source.load().map_err(|error| format!("{error:#}"));
            if let Err(error) = &result {
                log::warn!("snapshot load from {} failed: {error}", source.describe());
            }
            let _ = tx.send(result);
        });

        rx
    }

    fn start_load(source: SnapshotSource) -> AppState {
        AppState::Loading {
            rx: Self::spawn_load(source),
        }
    }

    fn now_ms(ctx: &Context) -> f64 {
        ctx.input(|input| input.time) * 1000.0
    }
}

impl eframe::App for QueryScatterApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        let now_ms = Self::now_ms(ctx);
        let mut transition = None;

        match &mut self.state {
            AppState::Loading { rx } => {
                match rx.try_recv() {
                    Ok(Ok(snapshot)) => {
                        let mut model = ViewModel::new(self.config, &self.source);
                        model.apply_snapshot(snapshot, now_ms);
                        transition = Some(AppState::Ready(Box::new(model)));
                    }
                    Ok(Err(error)) => transition = Some(AppState::Error(error)),
                    Err(TryRecvError::Empty) => ctx.request_repaint(),
                    Err(TryRecvError::Disconnected) => {
                        transition = Some(AppState::Error(
                            "Background load worker disconnected".to_owned(),
                        ));
                    }
                }

                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(120.0);
                        ui.heading(format!("Loading snapshot from {}...", self.source.describe()));
                        ui.add_space(8.0);
                        ui.spinner();
                    });
                });
            }
            AppState::Error(error) => {
                egui::CentralPanel::default().show(ctx, |ui| {
                    ui.heading("Failed to load snapshot");
                    ui.add_space(6.0);
                    ui.label(error.as_str());
                    ui.add_space(10.0);
                    if ui.button("Retry").clicked() {
                        transition = Some(Self::start_load(self.source.clone()));
                    }
                });
            }
            AppState::Ready(model) => {
                let is_reloading = self.reload_rx.is_some();
                let requests = model.show(ctx, now_ms, is_reloading);

                if let Some(queries) = requests.run_queries
                    && self.reload_rx.is_none()
                {
                    self.source = self.source.with_queries(queries);
                    model.source = self.source.clone();
                    model.last_error = None;
                    self.reload_rx = Some(Self::spawn_load(self.source.clone()));
                }

                if let Some(rx) = self.reload_rx.take() {
                    match rx.try_recv() {
                        Ok(Ok(snapshot)) => model.apply_snapshot(snapshot, now_ms),
                        Ok(Err(error)) => model.last_error = Some(error),
                        Err(TryRecvError::Empty) => {
                            self.reload_rx = Some(rx);
                            ctx.request_repaint();
                        }
                        Err(TryRecvError::Disconnected) => {
                            model.last_error = Some("Background load worker disconnected".to_owned());
                        }
                    }
                }

                if model.engine.frame(now_ms) || model.pointer_drag.is_some() {
                    ctx.request_repaint();
                }
            }
        }

        if let Some(next_state) = transition {
            self.reload_rx = None;
            self.state = next_state;
        }
    }
}

impl Drop for QueryScatterApp {
    fn drop(&mut self) {
        if let AppState::Ready(model) = &mut self.state {
            model.engine.teardown();
            log::debug!("engine torn down");
        }
    }
}

impl ViewModel {
    fn new(config: EngineConfig, source: &SnapshotSource) -> Self {
        Self {
            engine: GraphEngine::new(config),
            source: source.clone(),
            snapshot_revision: 0,
            query_text: source.queries().join("\n"),
            search: String::new(),
            search_match_cache: None,
            last_error: None,
            pan: Vec2::ZERO,
            zoom: 1.0,
            pointer_drag: None,
        }
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot, now_ms: f64) {
        if self.pointer_drag == Some(PointerDrag::Node) {
            self.engine.end_drag(now_ms);
            self.pointer_drag = None;
        }
        self.engine.apply_snapshot(snapshot, now_ms);
        self.snapshot_revision += 1;
    }

    fn reset_view(&mut self) {
        self.pan = Vec2::ZERO;
        self.zoom = 1.0;
    }

    /// One query per non-blank line of the editor.
    fn edited_queries(&self) -> Vec<String> {
        self.query_text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_owned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::snapshot::{SearchRequest, SnapshotNode};

    pub(super) fn file_source() -> SnapshotSource {
        SnapshotSource::File(PathBuf::from("/data/runs/snapshot.json"))
    }

    fn snapshot(ids: &[&str]) -> Snapshot {
        Snapshot {
            queries: vec!["a bird".to_owned()],
            nodes: ids
                .iter()
                .map(|id| SnapshotNode {
                    id: (*id).to_owned(),
                    group_index: 0,
                    similarity: Some(0.3),
                    image_path: format!("{id}.jpg"),
                })
                .collect(),
            edges: Vec::new(),
        }
    }

    #[test]
    fn query_editor_yields_trimmed_lines() {
        let source = SnapshotSource::Backend {
            endpoint: "http://127.0.0.1:5000/graph".to_owned(),
            request: SearchRequest {
                queries: vec!["a bird".to_owned()],
                top_n: 300,
                min_img_sim: 0.2,
                per_query_n: 12,
                k_neighbors: 8,
            },
        };
        let mut model = ViewModel::new(EngineConfig::default(), &source);
        assert_eq!(model.query_text, "a bird");

        model.query_text = "  a bird \n\n a boat\n   ".to_owned();
        assert_eq!(model.edited_queries(), ["a bird", "a boat"]);
    }

    #[test]
    fn snapshots_bump_the_revision_and_release_drags() {
        let mut model = ViewModel::new(EngineConfig::default(), &file_source());
        model.apply_snapshot(snapshot(&["A", "B"]), 0.0);
        assert_eq!(model.snapshot_revision, 1);

        model.pointer_drag = Some(PointerDrag::Node);
        model.apply_snapshot(snapshot(&["A"]), 100.0);
        assert_eq!(model.snapshot_revision, 2);
        assert_eq!(model.pointer_drag, None);
        assert_eq!(model.engine.table().len(), 1);
    }

    #[test]
    fn reset_view_restores_identity_transform() {
        let mut model = ViewModel::new(EngineConfig::default(), &file_source());
        model.pan = Vec2::new(40.0, -3.0);
        model.zoom = 3.5;
        model.reset_view();
        assert_eq!(model.pan, Vec2::ZERO);
        assert_eq!(model.zoom, 1.0);
    }
}
