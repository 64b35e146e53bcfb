use rstar::{primitives::GeomWithData, Point, RTree};
use serde::{Deserialize, Serialize};

use crate::{concurrency::par_iter_mut1, floating_type_mod::FT, sph_kernels::iterate_grid_neighbors, V, V3, VI};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NeighborhoodSearchAlgorithm {
    Grid,
    RStar,
}

pub struct NeighborhoodCache {
    neighs: Vec<Vec<u32>>,
}

impl NeighborhoodCache {
    pub fn new(num_particles: usize) -> Self {
        NeighborhoodCache {
            neighs: (0..num_particles).map(|_| Vec::new()).collect(),
        }
    }

    pub fn neighbors(&self, i: usize) -> &[u32] {
        &self.neighs[i]
    }

    pub fn iter<'a>(&'a self, i: usize) -> impl Iterator<Item = usize> + 'a {
        self.neighs[i].iter().map(|&x| x as usize)
    }

    pub fn neighbor_count(&self, i: usize) -> usize {
        self.neighs[i].len()
    }

    pub fn len(&self) -> usize {
        self.neighs.len()
    }

    pub fn truncate(&mut self, len: usize) {
        self.neighs.truncate(len);
    }

    pub fn extend(&mut self, num_elements: usize) {
        self.neighs.extend((0..num_elements).map(|_| Vec::new()));
    }

    /**
     * Only the first `query_positions.len()` lists are rebuilt, all remaining lists are cleared
     * (these belong to inactive particles).
     *
     * If `exclude_self` is set, `neighbor_positions` and `query_positions` are the same point set
     * and particle `i` is not listed as its own neighbor.
     */
    pub fn build(
        &mut self,
        algorithm: NeighborhoodSearchAlgorithm,
        neighbor_positions: &[V3],
        query_positions: &[V3],
        support_radius: FT,
        exclude_self: bool,
    ) {
        assert!(query_positions.len() <= self.neighs.len());
        match algorithm {
            NeighborhoodSearchAlgorithm::Grid => {
                self.build_neighborhood_list_grid(neighbor_positions, query_positions, support_radius, exclude_self)
            }
            NeighborhoodSearchAlgorithm::RStar => {
                self.build_neighborhood_list_rstar(neighbor_positions, query_positions, support_radius, exclude_self)
            }
        }
    }

    fn build_neighborhood_list_rstar(
        &mut self,
        neighbor_positions: &[V3],
        query_positions: &[V3],
        support_radius: FT,
        exclude_self: bool,
    ) {
        #[derive(Debug, PartialEq, Clone, Copy)]
        struct CustomRTreePoint {
            p: V3,
        }
        impl Point for CustomRTreePoint {
            type Scalar = FT;

            const DIMENSIONS: usize = 3;

            fn generate(mut generator: impl FnMut(usize) -> Self::Scalar) -> Self {
                CustomRTreePoint {
                    p: V3::from_iterator((0..3).map(|d| generator(d))),
                }
            }

            fn nth(&self, index: usize) -> Self::Scalar {
                self.p[index]
            }

            fn nth_mut(&mut self, index: usize) -> &mut Self::Scalar {
                &mut self.p[index]
            }
        }
        impl From<V3> for CustomRTreePoint {
            fn from(p: V3) -> Self {
                CustomRTreePoint { p }
            }
        }

        type CustomRTreeElem = GeomWithData<CustomRTreePoint, usize>;

        let rtree_elems: Vec<_> = neighbor_positions
            .iter()
            .enumerate()
            .map(|(idx, neigh_pos)| CustomRTreeElem::new(CustomRTreePoint::from(*neigh_pos), idx))
            .collect();

        let rtree = RTree::<CustomRTreeElem>::bulk_load(rtree_elems);

        let num_query_particles = query_positions.len();
        let max_dist_sq = support_radius * support_radius;

        par_iter_mut1(&mut self.neighs, |i, p_neighs| {
            p_neighs.clear();
            if i >= num_query_particles {
                return;
            }

            let this_particle_position = query_positions[i];
            for neigh_point in rtree.locate_within_distance(CustomRTreePoint::from(this_particle_position), max_dist_sq)
            {
                let j = neigh_point.data;
                if exclude_self && j == i {
                    continue;
                }

                // `locate_within_distance` also returns points exactly on the sphere
                if (neighbor_positions[j] - this_particle_position).norm_squared() >= max_dist_sq {
                    continue;
                }

                p_neighs.push(j as u32);
            }
        });
    }

    fn build_neighborhood_list_grid(
        &mut self,
        neighbor_positions: &[V3],
        query_positions: &[V3],
        support_radius: FT,
        exclude_self: bool,
    ) {
        fn particle_to_cell_pos(particle_pos: V3, kernel_support_radius: FT) -> VI<3> {
            (particle_pos / kernel_support_radius).map(|x| x.floor() as i32)
        }

        if neighbor_positions.len() == 0 {
            for p_neighborhood_list_indices in &mut self.neighs {
                p_neighborhood_list_indices.clear();
            }
            return;
        }

        let mut domain_min = neighbor_positions[0];
        let mut domain_max = neighbor_positions[0];
        for position in neighbor_positions {
            for d in 0..3 {
                domain_min[d] = FT::min(domain_min[d], position[d]);
                domain_max[d] = FT::max(domain_max[d], position[d]);
            }
        }

        let cells_min = domain_min.map(|x| (x / support_radius).floor() as i32 - 1);
        let cells_max = domain_max.map(|x| (x / support_radius).floor() as i32 + 2);
        let grid_size: V<usize, 3> = (cells_max - cells_min).map(|x| x as usize);

        let mut grid = CellGrid::new(cells_min, grid_size);

        for (particle_id, position) in neighbor_positions.iter().enumerate() {
            let cell_pos = particle_to_cell_pos(*position, support_radius);
            grid.get_mut(cell_pos).particle_ids.push(particle_id);
        }

        let num_query_particles = query_positions.len();

        par_iter_mut1(&mut self.neighs, |particle_id, p_neighs| {
            p_neighs.clear();
            if particle_id >= num_query_particles {
                return;
            }

            let this_particle_position = query_positions[particle_id];
            let particle_cell_pos = particle_to_cell_pos(this_particle_position, support_radius);

            iterate_grid_neighbors(1, |offset| {
                let cell_pos = particle_cell_pos + offset;

                for d in 0..3 {
                    if cell_pos[d] < cells_min[d] || cell_pos[d] >= cells_max[d] {
                        return;
                    }
                }

                for &neigh_particle_id in &grid.get(cell_pos).particle_ids {
                    if exclude_self && neigh_particle_id == particle_id {
                        continue;
                    }

                    let neigh_particle_position = neighbor_positions[neigh_particle_id];

                    if (neigh_particle_position - this_particle_position).norm_squared()
                        >= support_radius * support_radius
                    {
                        continue;
                    }

                    p_neighs.push(neigh_particle_id as u32);
                }
            });
        });
    }
}

struct Cell {
    particle_ids: Vec<usize>,
}

impl Cell {
    fn new() -> Cell {
        Cell {
            particle_ids: Vec::new(),
        }
    }
}

struct CellGrid {
    grid_min: VI<3>,
    size: V<usize, 3>,
    cells: Vec<Cell>,
}

impl CellGrid {
    fn new(grid_min: VI<3>, grid_size: V<usize, 3>) -> CellGrid {
        let num_elements = grid_size.fold(1, |acc, x| acc * x);
        CellGrid {
            grid_min,
            size: grid_size,
            cells: (0..num_elements).map(|_| Cell::new()).collect(),
        }
    }

    fn pos_to_idx(&self, mut cell_pos: VI<3>) -> usize {
        cell_pos = cell_pos - self.grid_min;

        let mut multiplier = 1;
        let mut idx: usize = 0;
        for d in 0..3 {
            assert!(0 <= cell_pos[d]);
            assert!((cell_pos[d] as usize) < self.size[d]);
            idx += multiplier * cell_pos[d] as usize;
            multiplier *= self.size[d];
        }
        idx
    }

    fn get(&self, cell_pos: VI<3>) -> &Cell {
        &self.cells[self.pos_to_idx(cell_pos)]
    }

    fn get_mut(&mut self, cell_pos: VI<3>) -> &mut Cell {
        let idx = self.pos_to_idx(cell_pos);
        &mut self.cells[idx]
    }
}

#[cfg(test)]
fn jittered_block(n: usize, spacing: FT) -> Vec<V3> {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    let mut rng = StdRng::seed_from_u64(7);
    let mut positions = Vec::new();
    for z in 0..n {
        for y in 0..n {
            for x in 0..n {
                let jitter = V3::from_fn(|_, _| rng.gen_range(-0.2..0.2) * spacing);
                positions.push(crate::vec3f(x as FT, y as FT, z as FT) * spacing + jitter);
            }
        }
    }
    positions
}

#[cfg(test)]
fn sorted_lists(cache: &NeighborhoodCache) -> Vec<Vec<u32>> {
    (0..cache.len())
        .map(|i| {
            let mut v = cache.neighbors(i).to_vec();
            v.sort();
            v
        })
        .collect()
}

#[test]
fn grid_search_matches_brute_force() {
    let positions = jittered_block(6, 0.05);
    let support_radius = 0.1;

    let mut neighs = NeighborhoodCache::new(positions.len());
    neighs.build(NeighborhoodSearchAlgorithm::Grid, &positions, &positions, support_radius, true);

    for i in 0..positions.len() {
        let mut expected: Vec<u32> = (0..positions.len())
            .filter(|&j| j != i && (positions[i] - positions[j]).norm_squared() < support_radius * support_radius)
            .map(|j| j as u32)
            .collect();
        expected.sort();
        let mut found = neighs.neighbors(i).to_vec();
        found.sort();
        assert_eq!(found, expected, "neighbors of particle {}", i);
    }
}

#[test]
fn rstar_search_matches_grid_search() {
    let fluid = jittered_block(5, 0.05);
    let boundary: Vec<V3> = jittered_block(4, 0.06).into_iter().map(|p| p + crate::vec3f(0.1, 0., 0.)).collect();
    let support_radius = 0.1;

    let mut grid = NeighborhoodCache::new(fluid.len());
    let mut rstar = NeighborhoodCache::new(fluid.len());
    grid.build(NeighborhoodSearchAlgorithm::Grid, &boundary, &fluid, support_radius, false);
    rstar.build(NeighborhoodSearchAlgorithm::RStar, &boundary, &fluid, support_radius, false);

    assert_eq!(sorted_lists(&grid), sorted_lists(&rstar));
}

#[test]
fn inactive_particles_have_empty_lists() {
    let positions = jittered_block(3, 0.05);
    let mut neighs = NeighborhoodCache::new(positions.len());
    neighs.build(NeighborhoodSearchAlgorithm::Grid, &positions[..10], &positions[..10], 0.1, true);
    for i in 10..positions.len() {
        assert_eq!(neighs.neighbor_count(i), 0);
    }
    assert!(neighs.neighbor_count(0) > 0);
}
