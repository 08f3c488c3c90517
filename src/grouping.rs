//! Threshold grouping over the similarity matrix.
//!
//! Deterministic single pass in corpus order: the first unvisited index
//! seeds a group, and every later unvisited index whose similarity to that
//! anchor strictly exceeds the threshold joins it. Membership is decided
//! against the anchor alone, never between members: two members of one group
//! may themselves sit below the threshold, and an image similar only to a
//! non-anchor member is not pulled in — it seeds its own group later or
//! stays unique. This is the observable contract, not an approximation of
//! transitive clustering.

use std::path::PathBuf;

use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub path: PathBuf,
    /// Similarity to the group anchor, in percent. The anchor itself is
    /// always exactly 100.0.
    pub similarity: f64,
}

/// One duplicate group: the anchor first, then every absorbed member.
/// Never holds fewer than two members; a seed that absorbs nothing stays in
/// the unique list instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    pub fn anchor(&self) -> &GroupMember {
        &self.members[0]
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// Partition `paths` into duplicate groups and a unique remainder.
///
/// `similarity` must be the square matrix over `paths` in the same order;
/// `threshold` is compared exclusively (`>`). Uniques come back in corpus
/// order.
pub fn group_duplicates(
    paths: &[PathBuf],
    similarity: ArrayView2<'_, f64>,
    threshold: f64,
) -> (Vec<DuplicateGroup>, Vec<PathBuf>) {
    let n = paths.len();
    debug_assert_eq!(similarity.nrows(), n);
    debug_assert_eq!(similarity.ncols(), n);

    let mut visited = vec![false; n];
    let mut grouped = vec![false; n];
    let mut groups = Vec::new();

    for i in 0..n {
        if visited[i] {
            continue;
        }
        visited[i] = true;

        // Self-similarity is 100 by construction; the diagonal is never read.
        let mut members = vec![GroupMember {
            path: paths[i].clone(),
            similarity: 100.0,
        }];
        let mut indices = vec![i];

        for j in (i + 1)..n {
            if visited[j] {
                continue;
            }
            if similarity[[i, j]] > threshold {
                visited[j] = true;
                indices.push(j);
                members.push(GroupMember {
                    path: paths[j].clone(),
                    similarity: similarity[[i, j]] * 100.0,
                });
            }
        }

        if members.len() > 1 {
            for &idx in &indices {
                grouped[idx] = true;
            }
            groups.push(DuplicateGroup { members });
        }
    }

    let unique = paths
        .iter()
        .enumerate()
        .filter(|&(i, _)| !grouped[i])
        .map(|(_, path)| path.clone())
        .collect();

    (groups, unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array2, array};

    fn paths(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    /// (anchor, member) index pairs grouped at `threshold`.
    fn grouped_pairs(
        paths: &[PathBuf],
        similarity: &Array2<f64>,
        threshold: f64,
    ) -> Vec<(PathBuf, PathBuf)> {
        let (groups, _) = group_duplicates(paths, similarity.view(), threshold);
        groups
            .iter()
            .flat_map(|g| {
                let anchor = g.anchor().path.clone();
                g.members[1..]
                    .iter()
                    .map(move |m| (anchor.clone(), m.path.clone()))
            })
            .collect()
    }

    #[test]
    fn test_membership_is_anchor_only_not_transitive() {
        let paths = paths(&["a.png", "b.png", "c.png"]);
        let similarity = array![
            [1.0, 0.90, 0.30],
            [0.90, 1.0, 0.90],
            [0.30, 0.90, 1.0],
        ];

        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);

        // B joins A's group; C is similar to B but not to the anchor A, so it
        // stays out and ends up unique.
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].anchor().path, PathBuf::from("a.png"));
        assert_eq!(groups[0].members.len(), 2);
        assert_eq!(groups[0].members[1].path, PathBuf::from("b.png"));
        assert!((groups[0].members[1].similarity - 90.0).abs() < 1e-9);
        assert_eq!(unique, vec![PathBuf::from("c.png")]);
    }

    #[test]
    fn test_anchor_reports_exactly_one_hundred() {
        let paths = paths(&["a.png", "b.png"]);
        let similarity = array![[1.0, 0.95], [0.95, 1.0]];
        let (groups, _) = group_duplicates(&paths, similarity.view(), 0.85);
        assert_eq!(groups[0].anchor().similarity, 100.0);
    }

    #[test]
    fn test_threshold_comparison_is_exclusive() {
        let paths = paths(&["a.png", "b.png"]);
        let similarity = array![[1.0, 0.85], [0.85, 1.0]];

        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);

        // Exactly at the threshold does not group.
        assert!(groups.is_empty());
        assert_eq!(unique.len(), 2);
    }

    #[test]
    fn test_singleton_seed_stays_unique() {
        let paths = paths(&["a.png", "b.png", "c.png"]);
        let similarity = array![
            [1.0, 0.10, 0.20],
            [0.10, 1.0, 0.95],
            [0.20, 0.95, 1.0],
        ];

        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].anchor().path, PathBuf::from("b.png"));
        assert_eq!(unique, vec![PathBuf::from("a.png")]);
    }

    #[test]
    fn test_visited_members_do_not_join_later_groups() {
        // b is over-threshold with both a and c; a's group claims it first.
        let paths = paths(&["a.png", "b.png", "c.png"]);
        let similarity = array![
            [1.0, 0.95, 0.10],
            [0.95, 1.0, 0.95],
            [0.10, 0.95, 1.0],
        ];

        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);

        assert_eq!(groups.len(), 1);
        assert_eq!(
            groups[0]
                .members
                .iter()
                .map(|m| m.path.clone())
                .collect::<Vec<_>>(),
            vec![PathBuf::from("a.png"), PathBuf::from("b.png")]
        );
        assert_eq!(unique, vec![PathBuf::from("c.png")]);
    }

    #[test]
    fn test_raising_threshold_only_removes_pairs() {
        let paths = paths(&["a.png", "b.png", "c.png", "d.png"]);
        let similarity = array![
            [1.0, 0.99, 0.88, 0.40],
            [0.99, 1.0, 0.70, 0.30],
            [0.88, 0.70, 1.0, 0.20],
            [0.40, 0.30, 0.20, 1.0],
        ];

        let loose = grouped_pairs(&paths, &similarity, 0.85);
        let strict = grouped_pairs(&paths, &similarity, 0.95);

        for pair in &strict {
            assert!(loose.contains(pair), "{pair:?} grouped only at the stricter threshold");
        }
        assert!(strict.len() < loose.len());
    }

    #[test]
    fn test_empty_input() {
        let (groups, unique) =
            group_duplicates(&[], Array2::<f64>::zeros((0, 0)).view(), 0.85);
        assert!(groups.is_empty());
        assert!(unique.is_empty());
    }

    #[test]
    fn test_single_path_is_unique() {
        let paths = paths(&["only.png"]);
        let similarity = array![[1.0]];
        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);
        assert!(groups.is_empty());
        assert_eq!(unique, vec![PathBuf::from("only.png")]);
    }

    #[test]
    fn test_group_members_share_anchor_not_each_other() {
        // b and c both clear the threshold against anchor a while being
        // dissimilar to each other; both land in a's group.
        let paths = paths(&["a.png", "b.png", "c.png"]);
        let similarity = array![
            [1.0, 0.90, 0.90],
            [0.90, 1.0, 0.10],
            [0.90, 0.10, 1.0],
        ];

        let (groups, unique) = group_duplicates(&paths, similarity.view(), 0.85);

        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].members.len(), 3);
        assert!(unique.is_empty());
    }
}
