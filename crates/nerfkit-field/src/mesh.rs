use std::collections::HashMap;

/// Axis permutation applied to mesh vertices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AxisOrder {
    /// Keep `(x, y, z)`.
    #[default]
    Xyz,
    /// Reorder to `(z, x, y)`, i.e. align the grid axes with the camera convention.
    Zxy,
}

/// An indexed triangle mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriangleMesh {
    /// The vertex positions.
    pub vertices: Vec<[f64; 3]>,
    /// The triangles as indices into `vertices`.
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create an empty mesh.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mesh from vertices and triangles.
    pub fn from_parts(vertices: Vec<[f64; 3]>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// Get the number of vertices.
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Check if the mesh has no vertices.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    /// Get the number of triangles.
    #[inline]
    pub fn num_triangles(&self) -> usize {
        self.triangles.len()
    }

    fn edge_counts(&self) -> HashMap<[usize; 2], usize> {
        let mut counts = HashMap::with_capacity(self.triangles.len() * 3 / 2);
        for t in &self.triangles {
            for (a, b) in [(t[0], t[1]), (t[1], t[2]), (t[2], t[0])] {
                *counts.entry([a.min(b), a.max(b)]).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Undirected edges used by exactly one triangle, sorted.
    pub fn boundary_edges(&self) -> Vec<[usize; 2]> {
        let mut edges = self
            .edge_counts()
            .into_iter()
            .filter(|&(_, count)| count == 1)
            .map(|(edge, _)| edge)
            .collect::<Vec<_>>();
        edges.sort_unstable();
        edges
    }

    /// Check if the mesh is a non-empty closed 2-manifold: every edge is shared by exactly two
    /// triangles.
    pub fn is_closed(&self) -> bool {
        !self.triangles.is_empty() && self.edge_counts().values().all(|&count| count == 2)
    }

    /// Permute the coordinates of every vertex.
    pub fn swizzle_axes(&mut self, order: AxisOrder) {
        match order {
            AxisOrder::Xyz => {}
            AxisOrder::Zxy => {
                for v in self.vertices.iter_mut() {
                    *v = [v[2], v[0], v[1]];
                }
            }
        }
    }

    /// Apply a function to every vertex.
    pub fn map_vertices<F>(&mut self, f: F)
    where
        F: Fn([f64; 3]) -> [f64; 3],
    {
        for v in self.vertices.iter_mut() {
            *v = f(*v);
        }
    }
}
