use std::collections::HashMap;

use crate::field::ScalarField;
use crate::mesh::TriangleMesh;
use crate::tables::{CORNER_OFFSETS, EDGE_CORNERS, EDGE_TABLE, TRIANGLE_TABLE};

/// Extract the iso-surface `value == threshold` from a scalar field.
///
/// Vertices are returned in grid-index space, i.e. a vertex on the edge between samples
/// `[x, y, z]` and `[x + 1, y, z]` has coordinates `[x + t, y, z]` with `t` in `[0, 1]`.
/// Vertices are shared between the cells adjacent to a grid edge, so a surface that does
/// not touch the grid boundary yields a closed mesh.
///
/// # Arguments
///
/// * `field` - The sampled scalar field.
/// * `threshold` - The iso value.
///
/// # Returns
///
/// The extracted mesh, empty if the field never crosses `threshold`.
pub fn marching_cubes(field: &ScalarField, threshold: f32) -> TriangleMesh {
    let r = field.resolution();
    let mut mesh = TriangleMesh::new();
    // grid edge key -> vertex index
    let mut edge_vertices: HashMap<usize, usize> = HashMap::new();

    for x in 0..r - 1 {
        for y in 0..r - 1 {
            for z in 0..r - 1 {
                let mut corner_values = [0f32; 8];
                for (value, offset) in corner_values.iter_mut().zip(CORNER_OFFSETS.iter()) {
                    *value = field.get(x + offset[0], y + offset[1], z + offset[2]);
                }

                let cube_index = cube_index(&corner_values, threshold);
                let edges = EDGE_TABLE[cube_index];
                if edges == 0 {
                    continue;
                }

                let mut cell_vertices = [usize::MAX; 12];
                for (edge, vertex) in cell_vertices.iter_mut().enumerate() {
                    if edges & (1 << edge) == 0 {
                        continue;
                    }
                    let [a, b] = EDGE_CORNERS[edge];
                    let pa = corner_position([x, y, z], a);
                    let pb = corner_position([x, y, z], b);
                    let key = edge_key(pa, pb, r);
                    *vertex = *edge_vertices.entry(key).or_insert_with(|| {
                        let p = interpolate_vertex(
                            pa,
                            pb,
                            corner_values[a],
                            corner_values[b],
                            threshold,
                        );
                        mesh.vertices.push(p);
                        mesh.vertices.len() - 1
                    });
                }

                for triangle in TRIANGLE_TABLE[cube_index].chunks_exact(3) {
                    if triangle[0] < 0 {
                        break;
                    }
                    mesh.triangles.push([
                        cell_vertices[triangle[0] as usize],
                        cell_vertices[triangle[1] as usize],
                        cell_vertices[triangle[2] as usize],
                    ]);
                }
            }
        }
    }

    mesh
}

/// Case index: bit `i` is set when corner `i` is below the threshold.
#[inline]
fn cube_index(corner_values: &[f32; 8], threshold: f32) -> usize {
    corner_values
        .iter()
        .enumerate()
        .filter(|&(_, &v)| v < threshold)
        .fold(0, |index, (i, _)| index | (1 << i))
}

#[inline]
fn corner_position(cell: [usize; 3], corner: usize) -> [usize; 3] {
    let offset = CORNER_OFFSETS[corner];
    [cell[0] + offset[0], cell[1] + offset[1], cell[2] + offset[2]]
}

/// Unique id of the grid edge between two adjacent samples.
#[inline]
fn edge_key(a: [usize; 3], b: [usize; 3], resolution: usize) -> usize {
    let base = [a[0].min(b[0]), a[1].min(b[1]), a[2].min(b[2])];
    let axis = (0..3).find(|&i| a[i] != b[i]).unwrap_or(0);
    ((base[0] * resolution + base[1]) * resolution + base[2]) * 3 + axis
}

/// Linear interpolation of the crossing point between two samples.
///
/// Non-finite samples put the vertex at the edge midpoint, so it stays on the edge.
#[inline]
fn interpolate_vertex(a: [usize; 3], b: [usize; 3], va: f32, vb: f32, threshold: f32) -> [f64; 3] {
    let denom = (vb - va) as f64;
    let t = (threshold - va) as f64 / denom;
    let t = if denom.abs() < 1e-12 || !t.is_finite() {
        0.5
    } else {
        t.clamp(0.0, 1.0)
    };
    [
        a[0] as f64 + t * (b[0] as f64 - a[0] as f64),
        a[1] as f64 + t * (b[1] as f64 - a[1] as f64),
        a[2] as f64 + t * (b[2] as f64 - a[2] as f64),
    ]
}
