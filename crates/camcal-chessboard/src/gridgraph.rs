use crate::params::GridGraphParams;
use camcal_core::{Corner, GridCoords};
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::{HashMap, VecDeque};

/// Step along one of the two global grid axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    PosU,
    NegU,
    PosV,
    NegV,
}

impl NeighborDirection {
    pub fn offset(self) -> (i32, i32) {
        match self {
            NeighborDirection::PosU => (1, 0),
            NeighborDirection::NegU => (-1, 0),
            NeighborDirection::PosV => (0, 1),
            NeighborDirection::NegV => (0, -1),
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::PosU => NeighborDirection::NegU,
            NeighborDirection::NegU => NeighborDirection::PosU,
            NeighborDirection::PosV => NeighborDirection::NegV,
            NeighborDirection::NegV => NeighborDirection::PosV,
        }
    }

    fn slot(self) -> usize {
        match self {
            NeighborDirection::PosU => 0,
            NeighborDirection::NegU => 1,
            NeighborDirection::PosV => 2,
            NeighborDirection::NegV => 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

fn classify_edge(
    corner: &Corner,
    neighbor: &Corner,
    neighbor_index: usize,
    params: &GridGraphParams,
    axes: &[Vector2<f32>; 2],
) -> Option<NodeNeighbor> {
    // Adjacent inner corners belong to opposite diagonal families.
    let (Some(ci), Some(cj)) = (corner.orientation_cluster, neighbor.orientation_cluster) else {
        return None;
    };
    if ci == cj {
        return None;
    }

    let vec_to_neighbor = neighbor.position - corner.position;
    let distance = vec_to_neighbor.norm();
    if distance < params.min_spacing_pix || distance > params.max_spacing_pix {
        return None;
    }

    let e = vec_to_neighbor / distance;
    let du = e.dot(&axes[0]);
    let dv = e.dot(&axes[1]);
    let (alignment, direction) = if du.abs() >= dv.abs() {
        let dir = if du >= 0.0 {
            NeighborDirection::PosU
        } else {
            NeighborDirection::NegU
        };
        (du.abs(), dir)
    } else {
        let dir = if dv >= 0.0 {
            NeighborDirection::PosV
        } else {
            NeighborDirection::NegV
        };
        (dv.abs(), dir)
    };

    if alignment < params.orientation_tolerance_deg.to_radians().cos() {
        return None;
    }

    // Prefer the closest well-aligned corner in each direction.
    let score = distance * (2.0 - alignment);
    Some(NodeNeighbor {
        direction,
        index: neighbor_index,
        distance,
        score,
    })
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates {
        let slot = &mut best[candidate.direction.slot()];
        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };
        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbor graph over corners.
///
/// Edges are kept only when both endpoints select each other in opposite
/// directions, so the graph is symmetric.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams, axes: [Vector2<f32>; 2]) -> Self {
        let coords = corners
            .iter()
            .map(|c| [c.position.x, c.position.y])
            .collect::<Vec<_>>();
        let tree: KdTree<f32, 2> = (&coords).into();

        let mut directed = Vec::with_capacity(corners.len());
        for (i, corner) in corners.iter().enumerate() {
            let query_point = [corner.position.x, corner.position.y];
            let results = tree.nearest_n::<SquaredEuclidean>(&query_point, params.k_neighbors + 1);

            let candidates = results
                .into_iter()
                .map(|nn| nn.item as usize)
                .filter(|&j| j != i)
                .filter_map(|j| classify_edge(corner, &corners[j], j, params, &axes))
                .collect();
            directed.push(select_neighbors(candidates));
        }

        let neighbors = directed
            .iter()
            .enumerate()
            .map(|(i, list)| {
                list.iter()
                    .filter(|n| {
                        directed[n.index]
                            .iter()
                            .any(|back| back.index == i && back.direction == n.direction.opposite())
                    })
                    .cloned()
                    .collect()
            })
            .collect();

        Self { neighbors }
    }

    pub fn connected_components(&self) -> Vec<Vec<usize>> {
        let mut visited = vec![false; self.neighbors.len()];
        let mut components = Vec::new();

        for start in 0..self.neighbors.len() {
            if visited[start] {
                continue;
            }

            let mut component = Vec::new();
            let mut stack = vec![start];
            while let Some(node) = stack.pop() {
                if visited[node] {
                    continue;
                }
                visited[node] = true;
                component.push(node);
                for neighbor in &self.neighbors[node] {
                    if !visited[neighbor.index] {
                        stack.push(neighbor.index);
                    }
                }
            }
            components.push(component);
        }

        components
    }

    /// BFS integer coordinates for one component, shifted so the minimum is
    /// `(0, 0)`.
    ///
    /// Returns `None` when two corners land on the same cell or one corner is
    /// reached with two different coordinates.
    pub fn assign_grid_coordinates(&self, component: &[usize]) -> Option<Vec<(usize, GridCoords)>> {
        let start = *component.first()?;
        let mut coords_of: HashMap<usize, GridCoords> = HashMap::new();
        let mut node_at: HashMap<GridCoords, usize> = HashMap::new();
        let mut queue = VecDeque::new();

        coords_of.insert(start, GridCoords::new(0, 0));
        node_at.insert(GridCoords::new(0, 0), start);
        queue.push_back(start);

        while let Some(node) = queue.pop_front() {
            let here = coords_of[&node];
            for neighbor in &self.neighbors[node] {
                let (di, dj) = neighbor.direction.offset();
                let there = here.offset(di, dj);
                match coords_of.get(&neighbor.index) {
                    Some(&known) if known != there => return None,
                    Some(_) => {}
                    None => {
                        if node_at.insert(there, neighbor.index).is_some() {
                            return None;
                        }
                        coords_of.insert(neighbor.index, there);
                        queue.push_back(neighbor.index);
                    }
                }
            }
        }

        let min_i = coords_of.values().map(|g| g.i).min()?;
        let min_j = coords_of.values().map(|g| g.j).min()?;
        let mut out: Vec<_> = coords_of
            .into_iter()
            .map(|(idx, g)| (idx, g.offset(-min_i, -min_j)))
            .collect();
        out.sort_by_key(|(idx, _)| *idx);
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;
    use std::f32::consts::FRAC_PI_4;

    fn make_corner(x: f32, y: f32, cluster: usize) -> Corner {
        let orientation = if cluster == 0 {
            FRAC_PI_4
        } else {
            3.0 * FRAC_PI_4
        };
        let mut c = Corner::new(Point2::new(x, y), orientation, 1.0);
        c.orientation_cluster = Some(cluster);
        c
    }

    fn axes() -> [Vector2<f32>; 2] {
        [Vector2::new(1.0, 0.0), Vector2::new(0.0, 1.0)]
    }

    fn params() -> GridGraphParams {
        GridGraphParams {
            min_spacing_pix: 5.0,
            max_spacing_pix: 15.0,
            ..Default::default()
        }
    }

    fn grid(cols: usize, rows: usize, spacing: f32) -> Vec<Corner> {
        let mut corners = Vec::new();
        for j in 0..rows {
            for i in 0..cols {
                corners.push(make_corner(
                    i as f32 * spacing,
                    j as f32 * spacing,
                    (i + j) % 2,
                ));
            }
        }
        corners
    }

    fn neighbor_map(neighbors: &[NodeNeighbor]) -> HashMap<NeighborDirection, &NodeNeighbor> {
        neighbors.iter().map(|n| (n.direction, n)).collect()
    }

    #[test]
    fn finds_axis_neighbors_in_regular_grid() {
        let corners = grid(3, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), axes());
        let idx = |i: usize, j: usize| j * 3 + i;

        let center = neighbor_map(&graph.neighbors[idx(1, 1)]);
        assert_eq!(4, center.len());
        assert_eq!(idx(0, 1), center[&NeighborDirection::NegU].index);
        assert_eq!(idx(2, 1), center[&NeighborDirection::PosU].index);
        assert_eq!(idx(1, 0), center[&NeighborDirection::NegV].index);
        assert_eq!(idx(1, 2), center[&NeighborDirection::PosV].index);

        let top_left = neighbor_map(&graph.neighbors[idx(0, 0)]);
        assert_eq!(2, top_left.len());
        assert!(top_left.contains_key(&NeighborDirection::PosU));
        assert!(top_left.contains_key(&NeighborDirection::PosV));
    }

    #[test]
    fn rejects_same_family_and_far_neighbors() {
        let same_family = vec![make_corner(0.0, 0.0, 0), make_corner(10.0, 0.0, 0)];
        let graph = GridGraph::new(&same_family, &params(), axes());
        assert!(graph.neighbors.iter().all(Vec::is_empty));

        let far = vec![make_corner(0.0, 0.0, 0), make_corner(30.0, 0.0, 1)];
        let graph = GridGraph::new(&far, &params(), axes());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn rejects_edges_off_axis() {
        let corners = vec![make_corner(0.0, 0.0, 0), make_corner(7.0, 7.0, 1)];
        let graph = GridGraph::new(&corners, &params(), axes());
        assert!(graph.neighbors.iter().all(Vec::is_empty));
    }

    #[test]
    fn keeps_closest_candidate_per_direction() {
        let corners = vec![
            make_corner(0.0, 0.0, 0),
            make_corner(10.0, 0.0, 1),
            make_corner(13.0, 0.5, 1),
            make_corner(-10.0, 0.0, 1),
        ];
        let p = GridGraphParams {
            k_neighbors: 4,
            ..params()
        };
        let graph = GridGraph::new(&corners, &p, axes());
        let map = neighbor_map(&graph.neighbors[0]);
        assert_eq!(2, map.len());
        assert_eq!(1, map[&NeighborDirection::PosU].index);
        assert_eq!(3, map[&NeighborDirection::NegU].index);
    }

    #[test]
    fn assigns_dense_coordinates() {
        let corners = grid(4, 3, 10.0);
        let graph = GridGraph::new(&corners, &params(), axes());
        let components = graph.connected_components();
        assert_eq!(components.len(), 1);

        let coords = graph.assign_grid_coordinates(&components[0]).unwrap();
        assert_eq!(coords.len(), 12);
        for (idx, g) in coords {
            assert_eq!(g, GridCoords::new((idx % 4) as i32, (idx / 4) as i32));
        }
    }

    #[test]
    fn separate_boards_form_separate_components() {
        let mut corners = grid(2, 2, 10.0);
        corners.extend(
            grid(2, 2, 10.0)
                .into_iter()
                .map(|c| make_corner(c.position.x + 100.0, c.position.y, c.orientation_cluster.unwrap())),
        );
        let graph = GridGraph::new(&corners, &params(), axes());
        assert_eq!(graph.connected_components().len(), 2);
    }
}
