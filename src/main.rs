mod app;
mod engine;
mod snapshot;

use std::path::PathBuf;

use clap::Parser;

use engine::EngineConfig;
use snapshot::{SearchRequest, SnapshotSource};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Read a snapshot JSON file instead of querying the backend.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    #[arg(long, default_value = "http://127.0.0.1:5000/graph")]
    endpoint: String,

    /// Text query; repeat for several.
    #[arg(long = "query", default_value = "a bird")]
    queries: Vec<String>,

    #[arg(long, default_value_t = 300)]
    top_n: u32,

    #[arg(long, default_value_t = 0.2)]
    min_img_sim: f32,

    #[arg(long, default_value_t = 12)]
    per_query_n: u32,

    #[arg(long, default_value_t = 8)]
    k_neighbors: u32,

    /// Hide labels when more nodes than this are visible.
    #[arg(long, default_value_t = 80)]
    label_threshold: usize,

    /// Window over which newly arrived nodes are revealed.
    #[arg(long, default_value_t = 1000.0)]
    reveal_ms: f64,
}

impl Args {
    fn source(&self) -> SnapshotSource {
        match &self.snapshot {
            Some(path) => SnapshotSource::File(path.clone()),
            None => SnapshotSource::Backend {
                endpoint: self.endpoint.clone(),
                request: SearchRequest {
                    queries: self.queries.clone(),
                    top_n: self.top_n,
                    min_img_sim: self.min_img_sim,
                    per_query_n: self.per_query_n,
                    k_neighbors: self.k_neighbors,
                },
            },
        }
    }

    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            reveal_ms: self.reveal_ms.max(0.0),
            label_threshold: self.label_threshold,
            ..EngineConfig::default()
        }
    }
}

fn main() -> eframe::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let source = args.source();
    let config = args.engine_config();
    log::info!("loading snapshots from {}", source.describe());

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "query-scatter",
        options,
        Box::new(move |cc| Ok(Box::new(app::QueryScatterApp::new(cc, source, config)))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_query_the_local_backend() {
        let args = Args::try_parse_from(["query-scatter"]).unwrap();
        let SnapshotSource::Backend { endpoint, request } = args.source() else {
            panic!("expected a backend source");
        };
        assert_eq!(endpoint, "http://127.0.0.1:5000/graph");
        assert_eq!(request.queries, ["a bird"]);
        assert_eq!(request.top_n, 300);
        assert_eq!(request.per_query_n, 12);
        assert_eq!(request.k_neighbors, 8);
        assert_eq!(args.engine_config(), EngineConfig::default());
    }

    #[test]
    fn repeated_queries_and_snapshot_file() {
        let args = Args::try_parse_from([
            "query-scatter",
            "--query",
            "a bird",
            "--query",
            "a boat",
            "--label-threshold",
            "20",
        ])
        .unwrap();
        assert_eq!(args.source().queries(), ["a bird", "a boat"]);
        assert_eq!(args.engine_config().label_threshold, 20);

        let args =
            Args::try_parse_from(["query-scatter", "--snapshot", "graph.json"]).unwrap();
        assert!(matches!(args.source(), SnapshotSource::File(path) if path == PathBuf::from("graph.json")));
    }
}
