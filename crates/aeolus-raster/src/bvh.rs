//! Median-split BVH over a mesh's triangles, queried for nearest ray hits.

use aeolus_geom::{Aabb, Ray, Vec3, intersect_triangle};
use aeolus_mesh::Mesh;

use crate::RasterizeError;

const MAX_LEAF_SIZE: usize = 4;
const MAX_DEPTH: u32 = 64;

#[derive(Clone, Copy, Debug)]
enum NodeKind {
    Leaf { first: u32, count: u32 },
    Internal { left: u32, right: u32 },
}

#[derive(Clone, Copy, Debug)]
struct Node {
    bounds: Aabb,
    kind: NodeKind,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BuildStats {
    pub triangle_count: u32,
    pub node_count: u32,
    pub leaf_count: u32,
    pub max_depth: u32,
}

pub struct Bvh {
    nodes: Vec<Node>,
    // triangle corners, reordered so each leaf is a contiguous range
    tris: Vec<[Vec3; 3]>,
    root: Option<u32>,
    stats: BuildStats,
}

struct BuildItem {
    bounds: Aabb,
    centroid: Vec3,
    tri: [Vec3; 3],
}

impl Bvh {
    /// Build over every face of `mesh`. Fails on non-finite vertex data, which
    /// would otherwise poison every bounds test below it.
    pub fn build(mesh: &Mesh) -> Result<Self, RasterizeError> {
        let mut items = Vec::with_capacity(mesh.face_count());
        for face in 0..mesh.face_count() {
            let tri = mesh.triangle(face);
            if !tri.iter().all(|v| v.is_finite()) {
                return Err(RasterizeError::Backend(format!(
                    "face {face} has a non-finite vertex"
                )));
            }
            let mut bounds = Aabb::empty();
            for v in tri {
                bounds.expand(v);
            }
            items.push(BuildItem {
                bounds,
                centroid: (tri[0] + tri[1] + tri[2]) / 3.0,
                tri,
            });
        }

        let mut stats = BuildStats {
            triangle_count: items.len() as u32,
            ..Default::default()
        };
        let mut nodes = Vec::new();
        let root = if items.is_empty() {
            None
        } else {
            Some(build_recursive(&mut items, 0, &mut nodes, 0, &mut stats))
        };
        stats.node_count = nodes.len() as u32;
        let tris = items.into_iter().map(|it| it.tri).collect();
        Ok(Self {
            nodes,
            tris,
            root,
            stats,
        })
    }

    pub fn stats(&self) -> BuildStats {
        self.stats
    }

    /// Distance to the nearest triangle along `ray`, if any.
    pub fn first_hit(&self, ray: &Ray) -> Option<f32> {
        let root = self.root?;
        let mut best: Option<f32> = None;
        let mut stack: Vec<u32> = Vec::with_capacity(64);
        stack.push(root);
        while let Some(idx) = stack.pop() {
            let node = &self.nodes[idx as usize];
            let limit = best.unwrap_or(f32::INFINITY);
            if node.bounds.intersect_ray(ray, limit).is_none() {
                continue;
            }
            match node.kind {
                NodeKind::Leaf { first, count } => {
                    for tri in &self.tris[first as usize..(first + count) as usize] {
                        if let Some(t) = intersect_triangle(ray, tri[0], tri[1], tri[2]) {
                            if best.is_none_or(|b| t < b) {
                                best = Some(t);
                            }
                        }
                    }
                }
                NodeKind::Internal { left, right } => {
                    stack.push(right);
                    stack.push(left);
                }
            }
        }
        best
    }
}

fn build_recursive(
    items: &mut [BuildItem],
    first: u32,
    nodes: &mut Vec<Node>,
    depth: u32,
    stats: &mut BuildStats,
) -> u32 {
    stats.max_depth = stats.max_depth.max(depth);
    let bounds = items
        .iter()
        .fold(Aabb::empty(), |acc, it| acc.union(&it.bounds));

    if items.len() <= MAX_LEAF_SIZE || depth >= MAX_DEPTH {
        return push_leaf(nodes, bounds, first, items.len(), stats);
    }

    let centroids = Aabb::from_points(items.iter().map(|it| it.centroid)).unwrap_or(bounds);
    let e = centroids.extent();
    let axis = if e.x >= e.y && e.x >= e.z {
        0
    } else if e.y >= e.z {
        1
    } else {
        2
    };
    if e.axis(axis) <= 0.0 {
        // every centroid coincides; no split separates them
        return push_leaf(nodes, bounds, first, items.len(), stats);
    }

    let mid = items.len() / 2;
    items.select_nth_unstable_by(mid, |a, b| {
        a.centroid.axis(axis).total_cmp(&b.centroid.axis(axis))
    });
    let (lo, hi) = items.split_at_mut(mid);
    let left = build_recursive(lo, first, nodes, depth + 1, stats);
    let right = build_recursive(hi, first + mid as u32, nodes, depth + 1, stats);

    let idx = nodes.len() as u32;
    nodes.push(Node {
        bounds,
        kind: NodeKind::Internal { left, right },
    });
    idx
}

fn push_leaf(nodes: &mut Vec<Node>, bounds: Aabb, first: u32, count: usize, stats: &mut BuildStats) -> u32 {
    stats.leaf_count += 1;
    let idx = nodes.len() as u32;
    nodes.push(Node {
        bounds,
        kind: NodeKind::Leaf {
            first,
            count: count as u32,
        },
    });
    idx
}
