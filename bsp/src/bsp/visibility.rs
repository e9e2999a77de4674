use bitvec::prelude::*;
use glam::Vec3;
use serde::Serialize;

use crate::{
    binaries::BinaryReader,
    error::{BSPError, Result},
};

use super::{
    consts::MAX_MAP_CLUSTERS,
    plane::BSPPlane,
    tree::{Child, Leaf, Node},
};

pub type ClusterRow = BitVec<u8, Lsb0>;

/// Where a cluster's compressed row starts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RowOffset {
    /// The map was compiled without vis; everything is potentially visible.
    AllVisible,
    Compressed(usize),
}

impl RowOffset {
    /// Source stores byte offsets from the lump start, where 0 is never a real row.
    pub fn source(offset: i32) -> Self {
        if offset <= 0 {
            RowOffset::AllVisible
        } else {
            RowOffset::Compressed(offset as usize)
        }
    }

    /// GoldSrc leaves use -1 for "no visibility info".
    pub fn goldsrc(visofs: i32) -> Self {
        if visofs < 0 {
            RowOffset::AllVisible
        } else {
            RowOffset::Compressed(visofs as usize)
        }
    }
}

/// Expand one run-length encoded PVS row of `num_clusters` bits.
///
/// A zero byte is followed by a count of zero bytes to skip, any other byte is
/// eight literal bits, lowest bit first.
pub fn decode_pvs_row(data: &[u8], offset: usize, num_clusters: usize) -> Result<ClusterRow> {
    let mut row = bitvec![u8, Lsb0; 0; num_clusters];
    let mut reader = BinaryReader::at(data, offset, "Visibility");
    let mut cursor = 0;

    while cursor < num_clusters {
        let byte: u8 = reader.read()?;
        if byte == 0 {
            let run: u8 = reader.read()?;
            cursor += 8 * run as usize;
            continue;
        }
        for k in 0..8 {
            if byte & (1 << k) != 0 && cursor + k < num_clusters {
                row.set(cursor + k, true);
            }
        }
        cursor += 8;
    }
    Ok(row)
}

/// Decode every row, failing open on broken rows.
///
/// Returns the rows and the errors of rows that had to be replaced.
pub fn decode_rows(
    data: &[u8],
    offsets: &[RowOffset],
    num_clusters: usize,
) -> (Vec<ClusterRow>, Vec<BSPError>) {
    let mut errors = Vec::new();
    let rows = offsets
        .iter()
        .map(|offset| match *offset {
            RowOffset::AllVisible => BitVec::repeat(true, num_clusters),
            RowOffset::Compressed(ofs) => {
                decode_pvs_row(data, ofs, num_clusters).unwrap_or_else(|e| {
                    errors.push(e);
                    BitVec::repeat(true, num_clusters)
                })
            }
        })
        .collect();
    (rows, errors)
}

/// The Source visibility lump header: cluster count, then a PVS and PAS offset per cluster.
pub fn source_row_offsets(data: &[u8]) -> Result<Vec<RowOffset>> {
    if data.is_empty() {
        return Ok(Vec::new());
    }
    let mut reader = BinaryReader::new(data, "Visibility");
    let num_clusters: i32 = reader.read()?;
    if num_clusters < 0 || num_clusters as usize > MAX_MAP_CLUSTERS {
        return Err(BSPError::corrupt(
            "Visibility",
            0,
            MAX_MAP_CLUSTERS,
            num_clusters.unsigned_abs() as usize,
            "cluster count out of range",
        ));
    }
    (0..num_clusters)
        .map(|_| {
            let [pvs, _pas]: [i32; 2] = reader.read()?;
            Ok(RowOffset::source(pvs))
        })
        .collect()
}

/// Counts of the decoded visibility data, for summaries.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct VisibilitySummary {
    pub nodes: usize,
    pub leaves: usize,
    pub clusters: usize,
    pub visible_pairs: usize,
}

/// The BSP tree plus decoded PVS rows.
#[derive(Clone, Debug, Default)]
pub struct VisibilitySystem {
    planes: Vec<BSPPlane>,
    nodes: Vec<Node>,
    leaves: Vec<Leaf>,
    rows: Vec<ClusterRow>,
}

impl VisibilitySystem {
    /// Every child, plane and cluster index is checked here so the queries can index freely.
    pub fn new(
        planes: Vec<BSPPlane>,
        nodes: Vec<Node>,
        leaves: Vec<Leaf>,
        rows: Vec<ClusterRow>,
    ) -> Result<Self> {
        for (i, node) in nodes.iter().enumerate() {
            if node.plane as usize >= planes.len() {
                return Err(BSPError::corrupt(
                    "Nodes",
                    i,
                    planes.len(),
                    node.plane as usize,
                    "node references missing plane",
                ));
            }
            for child in node.children {
                let (index, len) = match child {
                    Child::Node(n) => (n as usize, nodes.len()),
                    Child::Leaf(l) => (l as usize, leaves.len()),
                };
                if index >= len {
                    return Err(BSPError::corrupt(
                        "Nodes",
                        i,
                        len,
                        index,
                        "node child out of range",
                    ));
                }
            }
        }
        for row in &rows {
            if row.len() != rows.len() {
                return Err(BSPError::corrupt(
                    "Visibility",
                    0,
                    rows.len(),
                    row.len(),
                    "visibility row length does not match cluster count",
                ));
            }
        }

        Ok(Self {
            planes,
            nodes,
            leaves,
            rows,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn num_clusters(&self) -> usize {
        self.rows.len()
    }

    /// Leaf containing `point`, descending from the world root.
    pub fn point_leaf(&self, point: Vec3) -> Option<usize> {
        if self.nodes.is_empty() {
            return None;
        }
        self.point_leaf_from(Child::Node(0), point)
    }

    /// Leaf containing `point` below `head` (a brush model's head node, say).
    pub fn point_leaf_from(&self, head: Child, point: Vec3) -> Option<usize> {
        let mut child = head;
        // a well formed tree never revisits a node
        for _ in 0..=self.nodes.len() {
            match child {
                Child::Leaf(l) => return Some(l as usize),
                Child::Node(n) => {
                    let node = self.nodes.get(n as usize)?;
                    let d = self.planes[node.plane as usize].distance(point);
                    child = node.children[if d >= 0.0 { 0 } else { 1 }];
                }
            }
        }
        log::warn!("BSP tree descent did not terminate at {}", point);
        None
    }

    pub fn leaf_cluster(&self, leaf: usize) -> Option<usize> {
        let cluster = self.leaves.get(leaf)?.cluster;
        usize::try_from(cluster)
            .ok()
            .filter(|&c| c < self.rows.len())
    }

    /// Whether `to` is in the PVS of `from`. Maps without vis see everything.
    pub fn cluster_visible(&self, from: usize, to: usize) -> bool {
        match self.rows.get(from) {
            Some(row) => row.get(to).map_or(false, |bit| *bit),
            None => self.rows.is_empty(),
        }
    }

    /// Leaf to leaf visibility through their clusters.
    ///
    /// A viewer outside every cluster sees everything; a leaf outside every
    /// cluster is never seen.
    pub fn leaf_visible(&self, from: usize, to: usize) -> bool {
        let Some(target) = self.leaf_cluster(to) else {
            return self.rows.is_empty() && to < self.leaves.len();
        };
        match self.leaf_cluster(from) {
            Some(source) => self.cluster_visible(source, target),
            None => true,
        }
    }

    pub fn visible_clusters(&self, cluster: usize) -> Vec<usize> {
        match self.rows.get(cluster) {
            Some(row) => row.iter_ones().collect(),
            None => Vec::new(),
        }
    }

    /// Leaves whose cluster is visible from `leaf`.
    pub fn visible_leaves(&self, leaf: usize) -> Vec<usize> {
        (0..self.leaves.len())
            .filter(|&to| self.leaf_visible(leaf, to))
            .collect()
    }

    /// Every leaf the box touches, in ascending order.
    ///
    /// All eight corners are classified against each node plane and both sides are
    /// walked whenever the corners straddle it.
    pub fn leaves_in_box(&self, mins: Vec3, maxs: Vec3) -> Vec<usize> {
        let mut out = Vec::new();
        if self.nodes.is_empty() {
            return out;
        }
        let corners = common::bounds::BoundingBox::new(mins, maxs).corners();
        let mut visited = bitvec![u8, Lsb0; 0; self.nodes.len()];
        let mut stack = vec![Child::Node(0)];

        while let Some(child) = stack.pop() {
            match child {
                Child::Leaf(l) => out.push(l as usize),
                Child::Node(n) => {
                    let n = n as usize;
                    if visited[n] {
                        continue;
                    }
                    visited.set(n, true);
                    let node = &self.nodes[n];
                    let plane = &self.planes[node.plane as usize];
                    let (mut front, mut back) = (false, false);
                    for corner in corners {
                        if plane.distance(corner) >= 0.0 {
                            front = true;
                        } else {
                            back = true;
                        }
                    }
                    if back {
                        stack.push(node.children[1]);
                    }
                    if front {
                        stack.push(node.children[0]);
                    }
                }
            }
        }
        out.sort_unstable();
        out.dedup();
        out
    }

    pub fn summary(&self) -> VisibilitySummary {
        VisibilitySummary {
            nodes: self.nodes.len(),
            leaves: self.leaves.len(),
            clusters: self.rows.len(),
            visible_pairs: self.rows.iter().map(|r| r.count_ones()).sum(),
        }
    }
}

#[cfg(test)]
pub(crate) mod visibility_tests {
    use super::*;

    fn leaf(cluster: i32) -> Leaf {
        Leaf {
            contents: 0,
            cluster,
            area: 0,
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            first_leaf_face: 0,
            num_leaf_faces: 0,
            water_data: -1,
            ambient_level: None,
        }
    }

    fn node(plane: u32, front: Child, back: Child) -> Node {
        Node {
            plane,
            children: [front, back],
            mins: Vec3::ZERO,
            maxs: Vec3::ZERO,
            first_face: 0,
            num_faces: 0,
        }
    }

    /// x = 0 splits the world, then y = 0 splits the +x half.
    ///
    /// leaf 0 is the solid leaf, leaf 1 is -x, leaf 2 is +x+y, leaf 3 is +x-y.
    pub fn quadrant_tree(rows: Vec<ClusterRow>) -> VisibilitySystem {
        let planes = vec![BSPPlane::new(Vec3::X, 0.0), BSPPlane::new(Vec3::Y, 0.0)];
        let nodes = vec![
            node(0, Child::Node(1), Child::Leaf(1)),
            node(1, Child::Leaf(2), Child::Leaf(3)),
        ];
        let leaves = vec![leaf(-1), leaf(0), leaf(1), leaf(2)];
        VisibilitySystem::new(planes, nodes, leaves, rows).unwrap()
    }

    #[test]
    fn literal_bytes_are_lsb_first() {
        let row = decode_pvs_row(&[0b0000_0101, 0b1000_0000], 0, 16).unwrap();
        assert_eq!(row.iter_ones().collect::<Vec<_>>(), vec![0, 2, 15]);
    }

    #[test]
    fn zero_run_skips_bits() {
        // 3 zero bytes then a literal: bits 24 and 25
        let row = decode_pvs_row(&[9, 9, 0, 3, 0b11], 2, 32).unwrap();
        assert_eq!(row.iter_ones().collect::<Vec<_>>(), vec![24, 25]);

        let row = decode_pvs_row(&[0, 4], 0, 32).unwrap();
        assert_eq!(row.count_ones(), 0);
    }

    #[test]
    fn bits_past_cluster_count_are_dropped() {
        let row = decode_pvs_row(&[0xff], 0, 3).unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row.count_ones(), 3);
    }

    #[test]
    fn truncated_row_is_corrupt() {
        assert!(matches!(
            decode_pvs_row(&[0xff], 0, 16),
            Err(BSPError::CorruptData { .. })
        ));
        assert!(decode_pvs_row(&[0], 0, 16).is_err());
    }

    #[test]
    fn offset_zero_is_all_visible() {
        let mut data = Vec::new();
        data.extend_from_slice(&2i32.to_le_bytes());
        data.extend_from_slice(&[0; 8]);
        data.extend_from_slice(&20i32.to_le_bytes());
        data.extend_from_slice(&0i32.to_le_bytes());
        data.extend_from_slice(&[0b10]);

        let offsets = source_row_offsets(&data).unwrap();
        assert_eq!(offsets, vec![RowOffset::AllVisible, RowOffset::Compressed(20)]);

        let (rows, errors) = decode_rows(&data, &offsets, 2);
        assert!(errors.is_empty());
        assert!(rows[0].all());
        assert_eq!(rows[1].iter_ones().collect::<Vec<_>>(), vec![1]);
    }

    #[test]
    fn broken_row_fails_open() {
        let (rows, errors) = decode_rows(&[0xff], &[RowOffset::Compressed(4)], 9);
        assert_eq!(errors.len(), 1);
        assert!(rows[0].all());
    }

    #[test]
    fn point_descends_to_leaf() {
        let vis = quadrant_tree(Vec::new());
        assert_eq!(vis.point_leaf(Vec3::new(-5.0, 3.0, 0.0)), Some(1));
        assert_eq!(vis.point_leaf(Vec3::new(5.0, 3.0, 0.0)), Some(2));
        assert_eq!(vis.point_leaf(Vec3::new(5.0, -3.0, 0.0)), Some(3));
        // on the plane counts as front
        assert_eq!(vis.point_leaf(Vec3::new(0.0, 0.0, 0.0)), Some(2));
    }

    #[test]
    fn leaf_visibility_goes_through_clusters() {
        let rows = vec![
            bitvec![u8, Lsb0; 1, 1, 0],
            bitvec![u8, Lsb0; 1, 1, 1],
            bitvec![u8, Lsb0; 0, 1, 1],
        ];
        let vis = quadrant_tree(rows);
        assert_eq!(vis.leaf_cluster(0), None);
        assert_eq!(vis.leaf_cluster(3), Some(2));
        assert!(vis.leaf_visible(1, 2));
        assert!(!vis.leaf_visible(1, 3));
        assert!(!vis.leaf_visible(3, 0));
        // a viewer in solid sees everything
        assert!(vis.leaf_visible(0, 3));
        assert_eq!(vis.visible_clusters(2), vec![1, 2]);
        assert_eq!(vis.visible_leaves(1), vec![1, 2]);
        assert_eq!(vis.summary().visible_pairs, 7);
    }

    #[test]
    fn no_vis_means_everything_visible() {
        let vis = quadrant_tree(Vec::new());
        assert!(vis.cluster_visible(0, 5));
        assert!(vis.leaf_visible(1, 3));
    }

    #[test]
    fn box_marks_every_touched_leaf() {
        let vis = quadrant_tree(Vec::new());
        let leaves = vis.leaves_in_box(Vec3::new(1.0, -1.0, 0.0), Vec3::new(2.0, 1.0, 0.0));
        assert_eq!(leaves, vec![2, 3]);

        let all = vis.leaves_in_box(Vec3::splat(-1.0), Vec3::splat(1.0));
        assert_eq!(all, vec![1, 2, 3]);

        let one = vis.leaves_in_box(Vec3::new(-3.0, -3.0, 0.0), Vec3::new(-1.0, 3.0, 0.0));
        assert_eq!(one, vec![1]);
    }

    #[test]
    fn bad_child_is_rejected() {
        let planes = vec![BSPPlane::new(Vec3::X, 0.0)];
        let nodes = vec![node(0, Child::Leaf(5), Child::Leaf(0))];
        assert!(VisibilitySystem::new(planes.clone(), nodes, vec![leaf(0)], Vec::new()).is_err());

        let nodes = vec![node(3, Child::Leaf(0), Child::Leaf(0))];
        assert!(VisibilitySystem::new(planes, nodes, vec![leaf(0)], Vec::new()).is_err());
    }
}
