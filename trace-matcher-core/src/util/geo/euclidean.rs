use geo::Coord;

/// Planar distance between two points. The road network this engine
/// consumes is already projected (see the end-to-end scenarios, which use
/// a literal unit-square network with distances in meters) so matching
/// never needs a geographic (haversine) distance.
pub fn distance(a: Coord<f64>, b: Coord<f64>) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_four_five_triangle() {
        let a = Coord { x: 0.0, y: 0.0 };
        let b = Coord { x: 3.0, y: 4.0 };
        assert_eq!(distance(a, b), 5.0);
    }
}
