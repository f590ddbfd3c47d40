use anyhow::{Context, Result, anyhow};
use serde_json::Value;

use super::model::{Snapshot, SnapshotEdge, SnapshotNode};

pub fn parse_snapshot(raw: &str) -> Result<Snapshot> {
    let parsed: Value = serde_json::from_str(raw).context("invalid JSON in snapshot")?;
    let object = parsed
        .as_object()
        .ok_or_else(|| anyhow!("unexpected JSON type for snapshot; expected an object"))?;

    if let Some(error) = object.get("error").and_then(Value::as_str) {
        return Err(anyhow!("search backend reported an error: {error}"));
    }

    let queries = object
        .get("queries")
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .map(|value| value.as_str().unwrap_or_default().to_owned())
                .collect()
        })
        .unwrap_or_default();

    let nodes = object
        .get("nodes")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(parse_node).collect())
        .unwrap_or_default();

    let edges = object
        .get("edges")
        .and_then(Value::as_array)
        .map(|values| values.iter().filter_map(parse_edge).collect())
        .unwrap_or_default();

    Ok(Snapshot {
        queries,
        nodes,
        edges,
    })
}

fn finite_f32(value: Option<&Value>) -> Option<f32> {
    value
        .and_then(Value::as_f64)
        .map(|value| value as f32)
        .filter(|value| value.is_finite())
}

fn parse_node(value: &Value) -> Option<SnapshotNode> {
    let object = value.as_object()?;
    let id = object.get("id")?.as_str()?.to_owned();

    let group_index = object
        .get("winner")
        .and_then(|winner| {
            winner
                .as_i64()
                .or_else(|| winner.as_f64().map(|value| value as i64))
        })
        .unwrap_or(0);

    Some(SnapshotNode {
        id,
        group_index,
        similarity: finite_f32(object.get("max_similarity")),
        image_path: object
            .get("path")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
    })
}

fn parse_edge(value: &Value) -> Option<SnapshotEdge> {
    let object = value.as_object()?;

    Some(SnapshotEdge {
        source_id: object.get("source")?.as_str()?.to_owned(),
        target_id: object.get("target")?.as_str()?.to_owned(),
        weight: finite_f32(object.get("weight")).unwrap_or(0.0),
    })
}
