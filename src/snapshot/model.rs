/// One complete result payload. Replaced wholesale on every successful run.
#[derive(Clone, Debug, Default)]
pub struct Snapshot {
    pub queries: Vec<String>,
    pub nodes: Vec<SnapshotNode>,
    pub edges: Vec<SnapshotEdge>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotNode {
    pub id: String,
    /// Index into `queries` of the query that scored this item highest.
    pub group_index: i64,
    pub similarity: Option<f32>,
    pub image_path: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SnapshotEdge {
    pub source_id: String,
    pub target_id: String,
    pub weight: f32,
}

pub struct QueryGroup<'a> {
    /// `None` for the trailing group of nodes whose index matches no query.
    pub query_index: Option<usize>,
    pub query: &'a str,
    pub nodes: Vec<&'a SnapshotNode>,
}

/// Slot in a fixed-size palette for a group index; negative indices wrap.
pub fn palette_slot(group_index: i64, palette_len: usize) -> usize {
    if palette_len == 0 {
        return 0;
    }
    group_index.rem_euclid(palette_len as i64) as usize
}

impl Snapshot {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn query_label(&self, group_index: i64) -> &str {
        usize::try_from(group_index)
            .ok()
            .and_then(|index| self.queries.get(index))
            .map(String::as_str)
            .unwrap_or("?")
    }

    pub fn groups(&self) -> Vec<QueryGroup<'_>> {
        let mut groups = self
            .queries
            .iter()
            .enumerate()
            .map(|(index, query)| QueryGroup {
                query_index: Some(index),
                query: query.as_str(),
                nodes: Vec::new(),
            })
            .collect::<Vec<_>>();
        let mut unassigned = Vec::new();

        for node in &self.nodes {
            match usize::try_from(node.group_index)
                .ok()
                .and_then(|index| groups.get_mut(index))
            {
                Some(group) => group.nodes.push(node),
                None => unassigned.push(node),
            }
        }

        if !unassigned.is_empty() {
            groups.push(QueryGroup {
                query_index: None,
                query: "unassigned",
                nodes: unassigned,
            });
        }

        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, group_index: i64) -> SnapshotNode {
        SnapshotNode {
            id: id.to_owned(),
            group_index,
            similarity: None,
            image_path: format!("images/{id}.jpg"),
        }
    }

    #[test]
    fn groups_follow_query_order_and_keep_snapshot_order() {
        let snapshot = Snapshot {
            queries: vec!["a bird".to_owned(), "a boat".to_owned()],
            nodes: vec![node("a", 1), node("b", 0), node("c", 1), node("d", 7)],
            edges: Vec::new(),
        };

        let groups = snapshot.groups();
        assert_eq!(groups.len(), 3);
        assert_eq!(groups[0].query, "a bird");
        assert_eq!(
            groups[1].nodes.iter().map(|n| n.id.as_str()).collect::<Vec<_>>(),
            ["a", "c"]
        );
        assert_eq!(groups[2].query_index, None);
        assert_eq!(groups[2].nodes[0].id, "d");
    }

    #[test]
    fn out_of_range_groups_have_a_placeholder_label() {
        let snapshot = Snapshot {
            queries: vec!["a bird".to_owned()],
            nodes: Vec::new(),
            edges: Vec::new(),
        };
        assert_eq!(snapshot.query_label(0), "a bird");
        assert_eq!(snapshot.query_label(1), "?");
        assert_eq!(snapshot.query_label(-1), "?");
        assert!(snapshot.is_empty());
    }

    #[test]
    fn palette_slots_wrap_in_both_directions() {
        assert_eq!(palette_slot(0, 6), 0);
        assert_eq!(palette_slot(7, 6), 1);
        assert_eq!(palette_slot(-1, 6), 5);
        assert_eq!(palette_slot(-13, 6), 5);
        assert_eq!(palette_slot(3, 0), 0);
    }
}
