use crate::Point;

/// Signed volume, positive when `pt1 - pt0`, `pt2 - pt0`, `pt3 - pt0` form a
/// right-handed frame.
pub fn tetrahedron_signed_volume(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> f64 {
    let e1 = pt1 - pt0;
    let e2 = pt2 - pt0;
    let e3 = pt3 - pt0;
    e1.dot(e2.cross(e3)) / 6.
}

pub fn tetrahedron_volume(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> f64 {
    tetrahedron_signed_volume(pt0, pt1, pt2, pt3).abs()
}

/// Returns tetrahedron centroid (i.e. average of each vertices)
pub fn tetrahedron_centroid(pt0: Point, pt1: Point, pt2: Point, pt3: Point) -> Point {
    let x = (pt0.x + pt1.x + pt2.x + pt3.x) / 4.;
    let y = (pt0.y + pt1.y + pt2.y + pt3.y) / 4.;
    let z = (pt0.z + pt1.z + pt2.z + pt3.z) / 4.;
    Point::new(x, y, z)
}
