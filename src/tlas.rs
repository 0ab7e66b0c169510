mod node;

use std::time::Instant;

pub use self::node::*;
use crate::{BoundingBox, Instance, KdTree, Mesh, Ray};

/// Top-level acceleration structure: a binary tree over the world bounds of
/// BLAS instances, rebuilt (or reclustered) every frame.
///
/// Instances and meshes stay with the caller and are borrowed per call;
/// the structure owns its node array and the kd-tree that accelerates
/// reclustering.
#[derive(Clone, Debug, Default)]
pub struct Tlas {
    nodes: Vec<TlasNode>,
    nodes_used: u32,
    kd_tree: KdTree,
}

impl Tlas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &[TlasNode] {
        &self.nodes
    }

    pub fn root_bounds(&self) -> BoundingBox {
        self.nodes
            .first()
            .map(TlasNode::bounds)
            .unwrap_or_default()
    }

    /// Full agglomerative SAH build: repeatedly merges the mutually best
    /// matched pair of clusters until one remains, walking the best-match
    /// chain in between.
    pub fn rebuild(&mut self, instances: &[Instance]) {
        log::trace!("Rebuilding ({} instances)", instances.len());

        let tt = Instant::now();

        if !self.init_leaves(instances) {
            return;
        }

        let mut active: Vec<u32> = (1..=instances.len() as u32).collect();
        let mut a = 0;
        let mut b = self.find_best_match(&active, a);

        while active.len() > 1 {
            let c = self.find_best_match(&active, b);

            if a == c {
                let merged = self.merge(active[a], active[b]);

                active[a] = merged;
                active.swap_remove(b);

                if a == active.len() {
                    // the merged cluster got swapped into b's slot
                    a = b;
                }

                b = self.find_best_match(&active, a);
            } else {
                (a, b) = (b, c);
            }
        }

        self.nodes[0] = self.nodes[active[a] as usize];

        log::trace!("Rebuilding completed (in {:?})", tt.elapsed());
    }

    /// Same clustering as [`rebuild`](Self::rebuild), but best matches come
    /// from the kd-tree instead of linear scans, which also gets maintained
    /// as clusters merge.
    pub fn rebuild_quick(&mut self, instances: &[Instance]) {
        log::trace!("Reclustering ({} instances)", instances.len());

        let tt = Instant::now();

        if !self.init_leaves(instances) {
            return;
        }

        let count = instances.len() as u32;

        let Self {
            nodes,
            nodes_used,
            kd_tree,
        } = self;

        kd_tree.rebuild(nodes, count);

        let mut active = count;
        let mut a = 1;
        let (mut b, _) = kd_tree.find_nearest(a, u32::MAX, f32::INFINITY);

        while active > 1 {
            let (c, _) = kd_tree.find_nearest(b, u32::MAX, f32::INFINITY);

            if a == c {
                debug_assert!(a <= 0xffff && b <= 0xffff);

                let bounds = nodes[a as usize].bounds()
                    + nodes[b as usize].bounds();

                let id = *nodes_used;

                *nodes_used += 1;

                nodes[id as usize] = TlasNode {
                    bounds_min: bounds.min().into(),
                    left_right: (a << 16) | b,
                    bounds_max: bounds.max().into(),
                    instance: 0,
                };

                active -= 1;

                // the kd-tree only matters while there is something left to
                // cluster
                if active > 1 {
                    kd_tree.remove_leaf(a);
                    kd_tree.remove_leaf(b);
                    kd_tree.add(id, nodes);
                }

                a = id;

                if active > 1 {
                    (b, _) = kd_tree.find_nearest(a, u32::MAX, f32::INFINITY);
                }
            } else {
                (a, b) = (b, c);
            }
        }

        nodes[0] = nodes[a as usize];

        log::trace!("Reclustering completed (in {:?})", tt.elapsed());
    }

    /// Re-tightens node bounds after instance transforms changed, without
    /// touching the topology.
    pub fn refit(&mut self, instances: &[Instance]) {
        for node_id in (0..self.nodes.len()).rev() {
            let node = self.nodes[node_id];

            let bounds = if node.is_leaf() {
                instances[node.instance_id() as usize].bounds()
            } else {
                self.nodes[node.left()].bounds()
                    + self.nodes[node.right()].bounds()
            };

            self.nodes[node_id].set_bounds(bounds);
        }
    }

    /// Finds the closest hit across all instances.
    pub fn intersect(
        &self,
        ray: &mut Ray,
        instances: &[Instance],
        meshes: &[Mesh],
    ) {
        if self.nodes.is_empty() {
            return;
        }

        let mut node_id = 0;
        let mut stack = [0u32; 64];
        let mut stack_ptr = 0;

        loop {
            let node = &self.nodes[node_id];

            if node.is_leaf() {
                let instance = &instances[node.instance_id() as usize];

                instance
                    .intersect(ray, &meshes[instance.mesh_id() as usize]);
            } else {
                let mut near = node.left();
                let mut far = node.right();

                let mut near_distance =
                    ray.distance_to_box(self.nodes[near].bounds());
                let mut far_distance =
                    ray.distance_to_box(self.nodes[far].bounds());

                if near_distance > far_distance {
                    (near, far) = (far, near);
                    (near_distance, far_distance) =
                        (far_distance, near_distance);
                }

                if near_distance < f32::INFINITY {
                    if far_distance < f32::INFINITY {
                        stack[stack_ptr] = far as u32;
                        stack_ptr += 1;
                    }

                    node_id = near;
                    continue;
                }
            }

            if stack_ptr == 0 {
                break;
            }

            stack_ptr -= 1;
            node_id = stack[stack_ptr] as usize;
        }
    }

    /// Lays out one leaf per instance at indices `1..=n`; returns whether
    /// there is any clustering left to do.
    fn init_leaves(&mut self, instances: &[Instance]) -> bool {
        let n = instances.len();

        debug_assert!(
            n < (1 << 12),
            "instance count exceeds the hit-record capacity"
        );

        self.nodes.clear();

        if n == 0 {
            self.nodes_used = 0;
            return false;
        }

        self.nodes.resize(2 * n, TlasNode::default());

        for (i, instance) in instances.iter().enumerate() {
            self.nodes[i + 1] = TlasNode::leaf(i as u32, instance.bounds());
        }

        self.nodes_used = (n + 1) as u32;

        if n == 1 {
            // a single instance: the root is a copy of its leaf
            self.nodes[0] = self.nodes[1];
            return false;
        }

        true
    }

    fn find_best_match(&self, active: &[u32], a: usize) -> usize {
        let bounds_a = self.nodes[active[a] as usize].bounds();
        let mut smallest_sa = f32::INFINITY;
        let mut best = a;

        for (i, &id) in active.iter().enumerate() {
            if i == a {
                continue;
            }

            let sa = (bounds_a + self.nodes[id as usize].bounds()).area();

            if sa < smallest_sa || (sa == smallest_sa && id < active[best]) {
                smallest_sa = sa;
                best = i;
            }
        }

        best
    }

    fn merge(&mut self, a: u32, b: u32) -> u32 {
        debug_assert!(a <= 0xffff && b <= 0xffff);

        let bounds =
            self.nodes[a as usize].bounds() + self.nodes[b as usize].bounds();

        let id = self.nodes_used;

        self.nodes_used += 1;

        self.nodes[id as usize] = TlasNode {
            bounds_min: bounds.min().into(),
            left_right: (a << 16) | b,
            bounds_max: bounds.max().into(),
            instance: 0,
        };

        id
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::{vec3, vec3a, Affine3A, Quat, Vec3A};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::Triangle;

    fn cube() -> Mesh {
        let corner = |i: usize| {
            vec3a(
                (i & 1) as f32,
                ((i >> 1) & 1) as f32,
                ((i >> 2) & 1) as f32,
            )
        };

        let faces = [
            [0, 2, 6, 4],
            [1, 3, 7, 5],
            [0, 1, 5, 4],
            [2, 3, 7, 6],
            [0, 1, 3, 2],
            [4, 5, 7, 6],
        ];

        let triangles = faces
            .into_iter()
            .flat_map(|[a, b, c, d]| {
                [
                    Triangle::new([corner(a), corner(b), corner(c)]),
                    Triangle::new([corner(a), corner(c), corner(d)]),
                ]
            })
            .collect();

        Mesh::new(triangles)
    }

    fn random_instances(
        rng: &mut StdRng,
        mesh: &Mesh,
        count: usize,
    ) -> Vec<Instance> {
        (0..count)
            .map(|i| {
                let transform = Affine3A::from_rotation_translation(
                    Quat::from_rotation_y(rng.gen::<f32>() * 6.28),
                    vec3(rng.gen(), rng.gen(), rng.gen()) * 50.0,
                );

                Instance::new(i as u32, 0, mesh, transform)
            })
            .collect()
    }

    fn sah_cost(tlas: &Tlas, node_id: usize) -> f32 {
        let node = &tlas.nodes()[node_id];
        let area = node.bounds().area();

        if node.is_leaf() {
            area
        } else {
            area + sah_cost(tlas, node.left()) + sah_cost(tlas, node.right())
        }
    }

    #[test]
    fn two_meshes_two_instances() {
        let meshes = vec![cube(), cube()];

        let instances = vec![
            Instance::new(0, 0, &meshes[0], Affine3A::IDENTITY),
            Instance::new(
                1,
                1,
                &meshes[1],
                Affine3A::from_translation(vec3(3.0, 0.0, 0.0)),
            ),
        ];

        let mut target = Tlas::new();

        target.rebuild(&instances);

        let mut ray =
            Ray::new(vec3a(5.0, 0.5, 0.5), vec3a(-1.0, 0.0, 0.0));

        target.intersect(&mut ray, &instances, &meshes);

        assert_relative_eq!(1.0, ray.hit.t);
        assert_eq!(1, ray.hit.inst_prim.instance_id());
    }

    #[test]
    fn root_contains_every_instance() {
        let mut rng = StdRng::seed_from_u64(55);
        let meshes = vec![cube()];
        let instances = random_instances(&mut rng, &meshes[0], 32);

        for quick in [false, true] {
            let mut target = Tlas::new();

            if quick {
                target.rebuild_quick(&instances);
            } else {
                target.rebuild(&instances);
            }

            for instance in &instances {
                assert!(target
                    .root_bounds()
                    .contains(&instance.bounds()));
            }
        }
    }

    #[test]
    fn quick_build_matches_quality_build() {
        let mut rng = StdRng::seed_from_u64(66);
        let meshes = vec![cube()];
        let instances = random_instances(&mut rng, &meshes[0], 64);

        let mut quality = Tlas::new();
        let mut quick = Tlas::new();

        quality.rebuild(&instances);
        quick.rebuild_quick(&instances);

        let quality_cost = sah_cost(&quality, 0);
        let quick_cost = sah_cost(&quick, 0);

        assert!(
            quick_cost <= quality_cost * 1.15
                && quality_cost <= quick_cost * 1.15,
            "tree costs diverge: quality={quality_cost}, quick={quick_cost}"
        );

        for _ in 0..64 {
            let origin = vec3a(rng.gen(), rng.gen(), rng.gen()) * 120.0
                - Vec3A::splat(35.0);

            let at = vec3a(rng.gen(), rng.gen(), rng.gen()) * 50.0;
            let ray = Ray::new(origin, (at - origin).normalize());

            let mut quality_ray = ray;
            let mut quick_ray = ray;

            quality.intersect(&mut quality_ray, &instances, &meshes);
            quick.intersect(&mut quick_ray, &instances, &meshes);

            assert_eq!(quality_ray.hit, quick_ray.hit);
        }
    }

    #[test]
    fn refit_follows_moved_instances() {
        let mut rng = StdRng::seed_from_u64(77);
        let meshes = vec![cube()];
        let mut instances = random_instances(&mut rng, &meshes[0], 16);
        let mut target = Tlas::new();

        target.rebuild(&instances);

        instances[3].set_transform(
            &meshes[0],
            Affine3A::from_translation(vec3(200.0, 0.0, 0.0)),
        );

        target.refit(&instances);

        for instance in &instances {
            assert!(target.root_bounds().contains(&instance.bounds()));
        }

        let mut ray =
            Ray::new(vec3a(200.5, 0.5, 5.0), vec3a(0.0, 0.0, -1.0));

        target.intersect(&mut ray, &instances, &meshes);

        assert!(ray.hit.is_some());
        assert_eq!(3, ray.hit.inst_prim.instance_id());
    }

    #[test]
    fn single_instance() {
        let meshes = vec![cube()];

        let instances =
            vec![Instance::new(0, 0, &meshes[0], Affine3A::IDENTITY)];

        let mut target = Tlas::new();

        target.rebuild(&instances);

        let mut ray =
            Ray::new(vec3a(0.5, 0.5, 2.0), vec3a(0.0, 0.0, -1.0));

        target.intersect(&mut ray, &instances, &meshes);

        assert_relative_eq!(1.0, ray.hit.t);
        assert_eq!(0, ray.hit.inst_prim.instance_id());
    }

    #[test]
    fn empty_scene() {
        let mut target = Tlas::new();

        target.rebuild(&[]);

        let mut ray =
            Ray::new(vec3a(0.0, 0.0, 0.0), vec3a(0.0, 0.0, -1.0));

        target.intersect(&mut ray, &[], &[]);

        assert!(ray.hit.is_none());
    }
}
