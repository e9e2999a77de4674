use crate::error::{BSPError, Result};

use super::{
    consts::{MAX_MAP_EDGES, MAX_MAP_SURFEDGES},
    Lump,
};

/// Edge
///
/// Each edge is simply a pair of vertex indices (which index into the vertex lump array).
/// The edge is defined as the straight line between the two vertices. Usually, the edge array
/// is referenced through the Surfedge array.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPEdge {
    pub v: [u16; 2], // vertex indices
}

impl Lump for BSPEdge {
    fn max() -> usize {
        MAX_MAP_EDGES
    }
}

/// Surfedge
///
/// The absolute value is an index into the edge array. If positive, the edge is walked from the
/// first to the second vertex; if negative, from the second to the first.
#[repr(C, packed)]
#[derive(Copy, Clone, Debug, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BSPSurfEdge {
    pub index: i32,
}

impl Lump for BSPSurfEdge {
    fn max() -> usize {
        MAX_MAP_SURFEDGES
    }
}

impl BSPSurfEdge {
    /// The vertex this surfedge starts at.
    pub fn vertex(&self, edges: &[BSPEdge]) -> Result<u16> {
        let index = self.index;
        let edge = edges
            .get(index.unsigned_abs() as usize)
            .ok_or_else(|| {
                BSPError::corrupt(
                    "SurfEdges",
                    index.unsigned_abs() as usize,
                    edges.len(),
                    index.unsigned_abs() as usize,
                    "surfedge references missing edge",
                )
            })?;
        let v = edge.v;
        Ok(if index >= 0 { v[0] } else { v[1] })
    }
}

/// Walk `num_edges` surfedges from `first_edge` and return the vertex index each one starts at.
///
/// Every index is validated against the edge and vertex arrays.
pub fn resolve_face_vertices(
    first_edge: i32,
    num_edges: i32,
    surfedges: &[BSPSurfEdge],
    edges: &[BSPEdge],
    vertex_count: usize,
) -> Result<Vec<u32>> {
    if first_edge < 0 || num_edges < 0 {
        return Err(BSPError::corrupt(
            "Faces",
            first_edge.max(0) as usize,
            0,
            num_edges.unsigned_abs() as usize,
            "negative surfedge range",
        ));
    }
    let start = first_edge as usize;
    let range = surfedges
        .get(start..start + num_edges as usize)
        .ok_or_else(|| {
            BSPError::corrupt(
                "SurfEdges",
                start,
                num_edges as usize,
                surfedges.len().saturating_sub(start),
                "face surfedges out of range",
            )
        })?;

    range
        .iter()
        .map(|surfedge| {
            let v = surfedge.vertex(edges)? as usize;
            if v >= vertex_count {
                return Err(BSPError::corrupt(
                    "Edges",
                    v,
                    vertex_count,
                    v,
                    "edge references missing vertex",
                ));
            }
            Ok(v as u32)
        })
        .collect()
}

#[cfg(test)]
mod edges_tests {
    use super::*;

    fn edges() -> Vec<BSPEdge> {
        vec![
            BSPEdge { v: [0, 0] },
            BSPEdge { v: [0, 1] },
            BSPEdge { v: [1, 2] },
            BSPEdge { v: [2, 3] },
            BSPEdge { v: [3, 0] },
        ]
    }

    #[test]
    fn sign_selects_endpoint() {
        let edges = edges();
        for (i, edge) in edges.iter().enumerate().skip(1) {
            let v = edge.v;
            let fwd = BSPSurfEdge { index: i as i32 };
            let back = BSPSurfEdge { index: -(i as i32) };
            assert_eq!(fwd.vertex(&edges).unwrap(), v[0]);
            assert_eq!(back.vertex(&edges).unwrap(), v[1]);
        }
    }

    #[test]
    fn resolves_quad() {
        let edges = edges();
        let surfedges: Vec<BSPSurfEdge> = [1, 2, 3, 4]
            .into_iter()
            .map(|index| BSPSurfEdge { index })
            .collect();
        assert_eq!(
            resolve_face_vertices(0, 4, &surfedges, &edges, 4).unwrap(),
            vec![0, 1, 2, 3]
        );

        // reversed winding walks the other endpoints
        let reversed: Vec<BSPSurfEdge> = [-4, -3, -2, -1]
            .into_iter()
            .map(|index| BSPSurfEdge { index })
            .collect();
        assert_eq!(
            resolve_face_vertices(0, 4, &reversed, &edges, 4).unwrap(),
            vec![0, 3, 2, 1]
        );
    }

    #[test]
    fn out_of_range_is_corrupt() {
        let edges = edges();
        let surfedges = vec![BSPSurfEdge { index: 9 }];
        assert!(resolve_face_vertices(0, 1, &surfedges, &edges, 4).is_err());
        assert!(resolve_face_vertices(0, 2, &surfedges, &edges, 4).is_err());
        assert!(resolve_face_vertices(-1, 1, &surfedges, &edges, 4).is_err());

        let surfedges = vec![BSPSurfEdge { index: 3 }];
        assert!(resolve_face_vertices(0, 1, &surfedges, &edges, 2).is_err());
    }
}
