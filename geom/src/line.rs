use std::fmt;

use crate::{Angle, Pt2D};

/// A straight segment between two points.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Line(Pt2D, Pt2D);

impl Line {
    pub fn new(pt1: Pt2D, pt2: Pt2D) -> Line {
        Line(pt1, pt2)
    }

    pub fn pt1(&self) -> Pt2D {
        self.0
    }

    pub fn pt2(&self) -> Pt2D {
        self.1
    }

    pub fn length(&self) -> f64 {
        self.0.dist_to(self.1)
    }

    pub fn reversed(&self) -> Line {
        Line(self.1, self.0)
    }

    pub fn angle(&self) -> Angle {
        self.pt1().angle_to(self.pt2())
    }

    /// Where the two segments cross, strictly inside both. Touching at an endpoint, or lying on
    /// top of each other, does not count.
    pub fn crossing(&self, other: &Line) -> Option<Pt2D> {
        let (n1, n2) = (self.0, self.1);
        let (p1, p2) = (other.0, other.1);
        let denom = (p2.y() - p1.y()) * (n2.x() - n1.x()) - (p2.x() - p1.x()) * (n2.y() - n1.y());
        if denom == 0.0 {
            return None;
        }
        let a = n1.y() - p1.y();
        let b = n1.x() - p1.x();
        let ua = ((p2.x() - p1.x()) * a - (p2.y() - p1.y()) * b) / denom;
        let ub = ((n2.x() - n1.x()) * a - (n2.y() - n1.y()) * b) / denom;
        if ua > 0.0 && ua < 1.0 && ub > 0.0 && ub < 1.0 {
            Some(Pt2D::new(
                n1.x() + ua * (n2.x() - n1.x()),
                n1.y() + ua * (n2.y() - n1.y()),
            ))
        } else {
            None
        }
    }

    /// True if the segments share any point at all, including endpoints and collinear overlap.
    pub fn touches(&self, other: &Line) -> bool {
        let (a, b, c, d) = (self.0, self.1, other.0, other.1);
        let o1 = orientation(a, b, c);
        let o2 = orientation(a, b, d);
        let o3 = orientation(c, d, a);
        let o4 = orientation(c, d, b);
        if o1 != o2 && o3 != o4 {
            return true;
        }
        (o1 == 0 && within_box(c, a, b))
            || (o2 == 0 && within_box(d, a, b))
            || (o3 == 0 && within_box(a, c, d))
            || (o4 == 0 && within_box(b, c, d))
    }

    /// The perpendicular foot of `pt` on this segment, if it falls within the segment.
    pub fn project_pt(&self, pt: Pt2D) -> Option<Pt2D> {
        let dx = self.1.x() - self.0.x();
        let dy = self.1.y() - self.0.y();
        let l2 = dx * dx + dy * dy;
        if l2 == 0.0 {
            return None;
        }
        let t = ((pt.x() - self.0.x()) * dx + (pt.y() - self.0.y()) * dy) / l2;
        if !(0.0..=1.0).contains(&t) {
            return None;
        }
        Some(Pt2D::new(self.0.x() + t * dx, self.0.y() + t * dy))
    }

    /// Is `pt` on this segment, endpoints included? `tolerance` bounds the cross product, so
    /// it's an area, not a distance.
    pub fn contains_pt(&self, pt: Pt2D, tolerance: f64) -> bool {
        let (p1, p2) = (self.0, self.1);
        let dxc = pt.x() - p1.x();
        let dyc = pt.y() - p1.y();
        let dxl = p2.x() - p1.x();
        let dyl = p2.y() - p1.y();
        if (dxc * dyl - dyc * dxl).abs() > tolerance {
            return false;
        }
        if dxl.abs() >= dyl.abs() {
            if dxl > 0.0 {
                p1.x() <= pt.x() && pt.x() <= p2.x()
            } else {
                p2.x() <= pt.x() && pt.x() <= p1.x()
            }
        } else if dyl > 0.0 {
            p1.y() <= pt.y() && pt.y() <= p2.y()
        } else {
            p2.y() <= pt.y() && pt.y() <= p1.y()
        }
    }

    /// Extrapolate past `pt2`, keeping the direction.
    pub fn extend_past_end(&self, dist: f64) -> Pt2D {
        let len = self.length();
        let dx = (self.1.x() - self.0.x()) / len;
        let dy = (self.1.y() - self.0.y()) / len;
        Pt2D::new(self.1.x() + dx * dist, self.1.y() + dy * dist)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Line({} -> {})", self.0, self.1)
    }
}

// 0 is collinear, 1 is clockwise, -1 is counter-clockwise
fn orientation(p: Pt2D, q: Pt2D, r: Pt2D) -> i8 {
    let val = (q.y() - p.y()) * (r.x() - q.x()) - (q.x() - p.x()) * (r.y() - q.y());
    if val == 0.0 {
        0
    } else if val > 0.0 {
        1
    } else {
        -1
    }
}

fn within_box(pt: Pt2D, a: Pt2D, b: Pt2D) -> bool {
    pt.x() <= a.x().max(b.x())
        && pt.x() >= a.x().min(b.x())
        && pt.y() <= a.y().max(b.y())
        && pt.y() >= a.y().min(b.y())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(x1: f64, y1: f64, x2: f64, y2: f64) -> Line {
        Line::new(Pt2D::new(x1, y1), Pt2D::new(x2, y2))
    }

    #[test]
    fn crossing_is_strict() {
        let h = line(0.0, 0.0, 10.0, 0.0);
        assert_eq!(
            h.crossing(&line(5.0, -5.0, 5.0, 5.0)),
            Some(Pt2D::new(5.0, 0.0))
        );
        // T-junction: touching at an endpoint isn't a crossing
        assert_eq!(h.crossing(&line(5.0, 0.0, 5.0, 5.0)), None);
        // Collinear overlap isn't either
        assert_eq!(h.crossing(&line(2.0, 0.0, 12.0, 0.0)), None);
    }

    #[test]
    fn touches() {
        let h = line(0.0, 0.0, 10.0, 0.0);
        assert!(h.touches(&line(5.0, 0.0, 5.0, 5.0)));
        assert!(h.touches(&line(10.0, 0.0, 20.0, 0.0)));
        assert!(h.touches(&line(2.0, 0.0, 12.0, 0.0)));
        assert!(!h.touches(&line(0.0, 1.0, 10.0, 1.0)));
    }

    #[test]
    fn projection() {
        let h = line(0.0, 0.0, 10.0, 0.0);
        assert_eq!(h.project_pt(Pt2D::new(5.0, 0.05)), Some(Pt2D::new(5.0, 0.0)));
        assert_eq!(h.project_pt(Pt2D::new(-1.0, 0.0)), None);
        assert_eq!(line(1.0, 1.0, 1.0, 1.0).project_pt(Pt2D::new(1.0, 1.0)), None);
    }

    #[test]
    fn contains_includes_endpoints() {
        let d = line(0.0, 0.0, 0.0, -10.0);
        assert!(d.contains_pt(Pt2D::new(0.0, 0.0), 1e-5));
        assert!(d.contains_pt(Pt2D::new(0.0, -10.0), 1e-5));
        assert!(d.contains_pt(Pt2D::new(0.0, -3.0), 1e-5));
        assert!(!d.contains_pt(Pt2D::new(0.0, 1.0), 1e-5));
        assert!(!d.contains_pt(Pt2D::new(0.1, -3.0), 1e-5));
    }

    #[test]
    fn extrapolate() {
        let h = line(0.0, 0.0, 10.0, 0.0);
        assert_eq!(h.extend_past_end(2.0), Pt2D::new(12.0, 0.0));
    }
}
