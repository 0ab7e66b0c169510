use std::time::Instant;

use bytemuck::Zeroable;
use glam::Vec3A;

use super::{Bvh, BvhNode, BINS};
use crate::{Axis, BoundingBox, Triangle};

/// Builds a BVH using binned SAH.
///
/// Special thanks to:
/// - https://jacco.ompf2.com/2022/04/13/how-to-build-a-bvh-part-1-basics/.
pub(super) fn build(triangles: &[Triangle]) -> Bvh {
    log::trace!("Building ({} triangles)", triangles.len());

    let tt = Instant::now();

    if triangles.is_empty() {
        return Bvh::default();
    }

    let mut builder = Builder {
        centers: triangles.iter().map(Triangle::center).collect(),
        bounds: triangles.iter().map(Triangle::bounding_box).collect(),
        // worst case for a build that refuses empty leaves
        nodes: vec![BvhNode::zeroed(); 2 * triangles.len()],
        indices: (0..triangles.len() as u32).collect(),
        // slot 1 stays reserved so sibling pairs share a cache line
        nodes_used: 2,
    };

    builder.nodes[0].left_first = 0;
    builder.nodes[0].count = triangles.len() as u32;
    builder.update_node_bounds(0);
    builder.subdivide(0);

    let Builder {
        mut nodes,
        indices,
        nodes_used,
        ..
    } = builder;

    nodes.truncate(nodes_used as usize);

    let bvh = Bvh {
        nodes,
        indices,
        nodes_used,
    };

    if cfg!(debug_assertions) {
        bvh.validate(triangles);
    }

    log::trace!("Building completed (in {:?})", tt.elapsed());

    bvh
}

#[derive(Clone, Copy, Debug)]
struct SplittingPlane {
    split_by: Axis,
    split_at: f32,
    split_cost: f32,
}

#[derive(Clone, Copy, Default)]
struct Bin {
    bounds: BoundingBox,
    count: u32,
}

struct Builder {
    centers: Vec<Vec3A>,
    bounds: Vec<BoundingBox>,
    nodes: Vec<BvhNode>,
    indices: Vec<u32>,
    nodes_used: u32,
}

impl Builder {
    fn update_node_bounds(&mut self, node_id: usize) {
        let node = self.nodes[node_id];
        let mut bounds = BoundingBox::default();

        for &idx in &self.indices[node.first()..node.first() + node.count()] {
            bounds = bounds + self.bounds[idx as usize];
        }

        self.nodes[node_id].set_bounds(bounds);
    }

    fn subdivide(&mut self, node_id: usize) {
        let node = self.nodes[node_id];

        let Some(plane) = self.find_splitting_plane(&node) else {
            return;
        };

        if plane.split_cost >= node.cost() {
            return;
        }

        // partition the triangle-index range in place
        let mut i = node.first();
        let mut j = i + node.count() - 1;

        while i <= j {
            let center = self.centers[self.indices[i] as usize];

            if center[plane.split_by] < plane.split_at {
                i += 1;
            } else {
                self.indices.swap(i, j);

                if j == 0 {
                    break;
                }

                j -= 1;
            }
        }

        let left_count = i - node.first();

        if left_count == 0 || left_count == node.count() {
            // the plane left one side empty; stay a leaf
            return;
        }

        let left_id = self.nodes_used as usize;

        self.nodes_used += 2;

        self.nodes[left_id] = BvhNode {
            left_first: node.first() as u32,
            count: left_count as u32,
            ..BvhNode::zeroed()
        };

        self.nodes[left_id + 1] = BvhNode {
            left_first: i as u32,
            count: (node.count() - left_count) as u32,
            ..BvhNode::zeroed()
        };

        self.nodes[node_id].left_first = left_id as u32;
        self.nodes[node_id].count = 0;

        self.update_node_bounds(left_id);
        self.update_node_bounds(left_id + 1);
        self.subdivide(left_id);
        self.subdivide(left_id + 1);
    }

    fn find_splitting_plane(&self, node: &BvhNode) -> Option<SplittingPlane> {
        if node.count() < 2 {
            return None;
        }

        let indices = &self.indices[node.first()..node.first() + node.count()];
        let mut best: Option<SplittingPlane> = None;

        for split_by in Axis::all() {
            let mut c_min = f32::INFINITY;
            let mut c_max = f32::NEG_INFINITY;

            for &idx in indices {
                let c = self.centers[idx as usize][split_by];

                c_min = c_min.min(c);
                c_max = c_max.max(c);
            }

            if c_min == c_max {
                // all centroids project onto one point; nothing to split
                continue;
            }

            // ---

            let mut bins = [Bin::default(); BINS];
            let scale = (BINS as f32) / (c_max - c_min);

            for &idx in indices {
                let c = self.centers[idx as usize][split_by];
                let bin_id = (((c - c_min) * scale) as usize).min(BINS - 1);

                bins[bin_id].count += 1;
                bins[bin_id].bounds =
                    bins[bin_id].bounds + self.bounds[idx as usize];
            }

            // ---

            let mut left_areas = [0.0; BINS - 1];
            let mut right_areas = [0.0; BINS - 1];
            let mut left_counts = [0; BINS - 1];
            let mut right_counts = [0; BINS - 1];
            let mut left_bounds = BoundingBox::default();
            let mut right_bounds = BoundingBox::default();
            let mut left_count = 0;
            let mut right_count = 0;

            for i in 0..(BINS - 1) {
                left_count += bins[i].count;
                left_counts[i] = left_count;

                left_bounds = left_bounds + bins[i].bounds;
                left_areas[i] = left_bounds.area();

                right_count += bins[BINS - 1 - i].count;
                right_counts[BINS - 2 - i] = right_count;

                right_bounds = right_bounds + bins[BINS - 1 - i].bounds;
                right_areas[BINS - 2 - i] = right_bounds.area();
            }

            // ---

            let scale = (c_max - c_min) / (BINS as f32);

            for i in 0..(BINS - 1) {
                let split_cost = (left_counts[i] as f32) * left_areas[i]
                    + (right_counts[i] as f32) * right_areas[i];

                if split_cost == 0.0 {
                    continue;
                }

                let is_current_plane_better = best
                    .map_or(true, |best| split_cost < best.split_cost);

                if is_current_plane_better {
                    best = Some(SplittingPlane {
                        split_by,
                        split_at: c_min + scale * ((i + 1) as f32),
                        split_cost,
                    });
                }
            }
        }

        best
    }
}
