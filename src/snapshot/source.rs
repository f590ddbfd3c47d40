use std::fs;
use std::path::{self, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use reqwest::Url;
use serde::Serialize;

use super::model::Snapshot;
use super::parse::parse_snapshot;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SearchRequest {
    pub queries: Vec<String>,
    pub top_n: u32,
    pub min_img_sim: f32,
    pub per_query_n: u32,
    pub k_neighbors: u32,
}

impl SearchRequest {
    /// Trimmed, non-empty queries in their original order.
    pub fn cleaned(&self) -> Self {
        Self {
            queries: self
                .queries
                .iter()
                .map(|query| query.trim())
                .filter(|query| !query.is_empty())
                .map(str::to_owned)
                .collect(),
            ..self.clone()
        }
    }
}

#[derive(Clone, Debug)]
pub enum SnapshotSource {
    File(PathBuf),
    Backend {
        endpoint: String,
        request: SearchRequest,
    },
}

impl SnapshotSource {
    pub fn describe(&self) -> String {
        match self {
            Self::File(path) => format!("file {}", path.display()),
            Self::Backend { endpoint, .. } => format!("backend {endpoint}"),
        }
    }

    /// Queries sent to the backend; empty for file sources.
    pub fn queries(&self) -> &[String] {
        match self {
            Self::File(_) => &[],
            Self::Backend { request, .. } => &request.queries,
        }
    }

    /// Same source with a new query list. File sources are unchanged.
    pub fn with_queries(&self, queries: Vec<String>) -> Self {
        match self {
            Self::File(path) => Self::File(path.clone()),
            Self::Backend { endpoint, request } => Self::Backend {
                endpoint: endpoint.clone(),
                request: SearchRequest {
                    queries,
                    ..request.clone()
                },
            },
        }
    }

    /// Resolves a node's `image_path` to an openable URL. Backend paths are
    /// rooted at the endpoint's origin; file snapshots resolve them against
    /// the snapshot's directory.
    pub fn image_url(&self, image_path: &str) -> Option<String> {
        let image_path = image_path.trim();
        if image_path.is_empty() {
            return None;
        }

        let url = match self {
            Self::Backend { endpoint, .. } => Url::parse(endpoint).ok()?.join(image_path).ok()?,
            Self::File(snapshot) => {
                let dir = snapshot.parent().unwrap_or(Path::new(""));
                let resolved = path::absolute(dir.join(image_path.trim_start_matches('/'))).ok()?;
                Url::from_file_path(resolved).ok()?
            }
        };
        Some(url.to_string())
    }

    pub fn load(&self) -> Result<Snapshot> {
        match self {
            Self::File(path) => {
                let raw = fs::read_to_string(path)
                    .with_context(|| format!("failed to read snapshot file {}", path.display()))?;
                parse_snapshot(&raw)
                    .with_context(|| format!("failed to parse snapshot file {}", path.display()))
            }
            Self::Backend { endpoint, request } => fetch_snapshot(endpoint, request),
        }
    }
}

fn fetch_snapshot(endpoint: &str, request: &SearchRequest) -> Result<Snapshot> {
    let request = request.cleaned();
    if request.queries.is_empty() {
        return Err(anyhow!("no non-empty queries to submit"));
    }

    let response = reqwest::blocking::Client::new()
        .post(endpoint)
        .json(&request)
        .send()
        .with_context(|| format!("failed to reach search backend at {endpoint}"))?;

    let status = response.status();
    let body = response
        .text()
        .with_context(|| format!("failed to read response body from {endpoint}"))?;

    if !status.is_success() {
        return Err(anyhow!("search backend returned {status}: {body}"));
    }

    parse_snapshot(&body).with_context(|| format!("failed to parse response from {endpoint}"))
}
