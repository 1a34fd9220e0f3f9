//! Ring assembly for boundary relations.

use geo::{Contains, Coord, LineString, MultiPolygon, Point, Polygon};

use super::Entity;

/// Coordinates of a way's resolved nodes.
pub fn way_coords(way: &Entity) -> Vec<Coord<f64>> {
    way.way_nodes()
        .iter()
        .filter_map(Entity::location)
        .map(|p| Coord { x: p.lon, y: p.lat })
        .collect()
}

/// Build a multipolygon from outer and inner way fragments.
///
/// Fragments are chained end to end into closed rings; each inner ring becomes
/// a hole of the first outer polygon containing its first vertex.
pub fn assemble_multipolygon(
    outer: Vec<Vec<Coord<f64>>>,
    inner: Vec<Vec<Coord<f64>>>,
) -> MultiPolygon<f64> {
    let mut polygons = merge_rings_to_polygons(outer);
    for hole in merge_rings_to_polygons(inner) {
        let ring = hole.exterior().clone();
        let Some(first) = ring.0.first().copied() else {
            continue;
        };
        if let Some(owner) = polygons
            .iter_mut()
            .find(|p| p.contains(&Point::from(first)))
        {
            owner.interiors_push(ring);
        }
    }
    MultiPolygon::new(polygons)
}

/// Merge disconnected rings into closed polygons
pub fn merge_rings_to_polygons(rings: Vec<Vec<Coord<f64>>>) -> Vec<Polygon<f64>> {
    let mut result = Vec::new();
    let mut remaining: Vec<Vec<Coord<f64>>> = rings.into_iter().filter(|r| r.len() >= 2).collect();

    while !remaining.is_empty() {
        let mut current = remaining.remove(0);

        if current.first() == current.last() && current.len() >= 4 {
            result.push(Polygon::new(LineString::new(current), vec![]));
            continue;
        }

        let mut merged = true;
        while merged && !remaining.is_empty() {
            merged = false;
            let start = current.first().copied();
            let end = current.last().copied();
            if start == end {
                break;
            }

            for i in 0..remaining.len() {
                let ring_start = remaining[i].first().copied();
                let ring_end = remaining[i].last().copied();

                if end == ring_start {
                    let mut ring = remaining.remove(i);
                    ring.remove(0);
                    current.extend(ring);
                } else if end == ring_end {
                    let mut ring = remaining.remove(i);
                    ring.reverse();
                    ring.remove(0);
                    current.extend(ring);
                } else if start == ring_end {
                    let mut ring = remaining.remove(i);
                    ring.pop();
                    ring.extend(current);
                    current = ring;
                } else if start == ring_start {
                    let mut ring = remaining.remove(i);
                    ring.reverse();
                    ring.pop();
                    ring.extend(current);
                    current = ring;
                } else {
                    continue;
                }
                merged = true;
                break;
            }
        }

        if current.len() >= 3 {
            if current.first() != current.last() {
                current.push(current[0]);
            }
            if current.len() >= 4 {
                result.push(Polygon::new(LineString::new(current), vec![]));
            }
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GeoPoint;

    fn c(x: f64, y: f64) -> Coord<f64> {
        Coord { x, y }
    }

    #[test]
    fn test_merge_simple_ring() {
        let ring = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        assert_eq!(merge_rings_to_polygons(vec![ring]).len(), 1);
    }

    #[test]
    fn test_merge_split_ring_any_order() {
        let s1 = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        let s2 = vec![c(1.0, 1.0), c(0.0, 1.0), c(0.0, 0.0)];
        assert_eq!(merge_rings_to_polygons(vec![s1.clone(), s2.clone()]).len(), 1);
        assert_eq!(merge_rings_to_polygons(vec![s2, s1]).len(), 1);
    }

    #[test]
    fn test_merge_reversed_fragment() {
        let s1 = vec![c(0.0, 0.0), c(1.0, 0.0), c(1.0, 1.0)];
        // Drawn in the opposite direction
        let s2 = vec![c(0.0, 0.0), c(0.0, 1.0), c(1.0, 1.0)];
        assert_eq!(merge_rings_to_polygons(vec![s1, s2]).len(), 1);
    }

    #[test]
    fn test_inner_ring_becomes_hole() {
        let outer = vec![c(0.0, 0.0), c(4.0, 0.0), c(4.0, 4.0), c(0.0, 4.0), c(0.0, 0.0)];
        let inner = vec![c(1.0, 1.0), c(2.0, 1.0), c(2.0, 2.0), c(1.0, 2.0), c(1.0, 1.0)];
        let mp = assemble_multipolygon(vec![outer], vec![inner]);
        assert_eq!(mp.0.len(), 1);
        assert_eq!(mp.0[0].interiors().len(), 1);
        assert!(!mp.contains(&Point::new(1.5, 1.5)));
        assert!(mp.contains(&Point::new(3.0, 3.0)));
    }

    #[test]
    fn test_way_coords_use_lon_as_x() {
        let way = Entity::way(
            1,
            vec![
                Entity::node(1, GeoPoint::new(10.0, 20.0)),
                Entity::node(2, GeoPoint::new(11.0, 21.0)),
            ],
        );
        assert_eq!(way_coords(&way), vec![c(20.0, 10.0), c(21.0, 11.0)]);
    }
}
