use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign, Mul, Neg, Sub};

pub const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub const fn new(x: f64, y: f64) -> Self {
        Vec2 { x, y }
    }

    pub fn len(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn dist(self, other: Vec2) -> f64 {
        (self - other).len()
    }

    pub fn dot(self, other: Vec2) -> f64 {
        self.x * other.x + self.y * other.y
    }

    pub fn cross(self, other: Vec2) -> f64 {
        self.x * other.y - self.y * other.x
    }

    /// Unit vector, or zero for a zero-length vector.
    pub fn unit(self) -> Vec2 {
        let len = self.len();
        if len < EPSILON {
            Vec2::ZERO
        } else {
            Vec2::new(self.x / len, self.y / len)
        }
    }

    /// Perpendicular, rotated a quarter turn clockwise in screen space.
    pub fn per(self) -> Vec2 {
        Vec2::new(self.y, -self.x)
    }

    pub fn med(self, other: Vec2) -> Vec2 {
        self.lerp(other, 0.5)
    }

    pub fn lerp(self, other: Vec2, t: f64) -> Vec2 {
        Vec2::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }

    pub fn angle_to(self, other: Vec2) -> f64 {
        (other.y - self.y).atan2(other.x - self.x)
    }

    pub fn rot_around(self, center: Vec2, radians: f64) -> Vec2 {
        let (s, c) = radians.sin_cos();
        let d = self - center;
        Vec2::new(center.x + d.x * c - d.y * s, center.y + d.x * s + d.y * c)
    }

    pub fn from_angle(center: Vec2, radius: f64, radians: f64) -> Vec2 {
        Vec2::new(
            center.x + radius * radians.cos(),
            center.y + radius * radians.sin(),
        )
    }

    pub fn approx_eq(self, other: Vec2, epsilon: f64) -> bool {
        (self.x - other.x).abs() <= epsilon && (self.y - other.y).abs() <= epsilon
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }

    /// Whether the turn a → b → c is clockwise in screen space (y down).
    pub fn clockwise(a: Vec2, b: Vec2, c: Vec2) -> bool {
        (c.x - a.x) * (b.y - a.y) - (b.x - a.x) * (c.y - a.y) < 0.0
    }

    /// The point on the infinite line through `a` and `b` nearest to `p`.
    pub fn nearest_point_on_line(a: Vec2, b: Vec2, p: Vec2) -> Vec2 {
        let u = (b - a).unit();
        a + u * (p - a).dot(u)
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 {
        Vec2::new(-self.x, -self.y)
    }
}

/// Axis-aligned box in page space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Box2 {
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
}

impl Box2 {
    pub const fn new(x: f64, y: f64, w: f64, h: f64) -> Self {
        Box2 { x, y, w, h }
    }

    pub fn from_center(center: Vec2, w: f64, h: f64) -> Self {
        Box2::new(center.x - w / 2.0, center.y - h / 2.0, w, h)
    }

    pub fn from_points(a: Vec2, b: Vec2) -> Self {
        Box2::new(
            a.x.min(b.x),
            a.y.min(b.y),
            (a.x - b.x).abs(),
            (a.y - b.y).abs(),
        )
    }

    pub fn max_x(&self) -> f64 {
        self.x + self.w
    }

    pub fn max_y(&self) -> f64 {
        self.y + self.h
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(self.x + self.w / 2.0, self.y + self.h / 2.0)
    }

    /// Never narrower than one unit on either axis, so normalizing against it cannot divide by 0.
    pub fn zero_fix(self) -> Box2 {
        Box2::new(self.x, self.y, self.w.max(1.0), self.h.max(1.0))
    }

    pub fn contains(&self, p: Vec2) -> bool {
        p.x >= self.x && p.x <= self.max_x() && p.y >= self.y && p.y <= self.max_y()
    }

    pub fn expand_by(&self, margin: f64) -> Box2 {
        Box2::new(
            self.x - margin,
            self.y - margin,
            self.w + margin * 2.0,
            self.h + margin * 2.0,
        )
    }

    pub fn translate(&self, delta: Vec2) -> Box2 {
        Box2::new(self.x + delta.x, self.y + delta.y, self.w, self.h)
    }

    pub fn corners(&self) -> [Vec2; 4] {
        [
            Vec2::new(self.x, self.y),
            Vec2::new(self.max_x(), self.y),
            Vec2::new(self.max_x(), self.max_y()),
            Vec2::new(self.x, self.max_y()),
        ]
    }

    pub fn edges(&self) -> [(Vec2, Vec2); 4] {
        let [a, b, c, d] = self.corners();
        [(a, b), (b, c), (c, d), (d, a)]
    }

    /// Point at a normalized position inside the box.
    pub fn point_at(&self, normalized: Vec2) -> Vec2 {
        Vec2::new(self.x + normalized.x * self.w, self.y + normalized.y * self.h)
    }
}

pub fn dist_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.dot(ab);
    if len_sq < EPSILON {
        return p.dist(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.dist(a + ab * t)
}

/// Intersection of segments `a0-a1` and `b0-b1`, if they cross.
pub fn intersect_segments(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> Option<Vec2> {
    let r = a1 - a0;
    let s = b1 - b0;
    let denom = r.cross(s);
    if denom.abs() < EPSILON {
        return None;
    }
    let t = (b0 - a0).cross(s) / denom;
    let u = (b0 - a0).cross(r) / denom;
    if (-EPSILON..=1.0 + EPSILON).contains(&t) && (-EPSILON..=1.0 + EPSILON).contains(&u) {
        Some(a0 + r * t)
    } else {
        None
    }
}

/// Every point where segment `a-b` crosses the outline of `bounds`.
pub fn intersect_segment_box(a: Vec2, b: Vec2, bounds: &Box2) -> Vec<Vec2> {
    let mut hits: Vec<Vec2> = Vec::new();
    for (e0, e1) in bounds.edges() {
        if let Some(p) = intersect_segments(a, b, e0, e1) {
            if !hits.iter().any(|h| h.approx_eq(p, 1e-6)) {
                hits.push(p);
            }
        }
    }
    hits
}

/// Points where the circle crosses segment `a-b`.
pub fn intersect_circle_segment(center: Vec2, radius: f64, a: Vec2, b: Vec2) -> Vec<Vec2> {
    let d = b - a;
    let f = a - center;
    let qa = d.dot(d);
    if qa < EPSILON {
        return vec![];
    }
    let qb = 2.0 * f.dot(d);
    let qc = f.dot(f) - radius * radius;
    let disc = qb * qb - 4.0 * qa * qc;
    if disc < 0.0 {
        return vec![];
    }
    let root = disc.sqrt();
    let mut hits = Vec::new();
    for t in [(-qb - root) / (2.0 * qa), (-qb + root) / (2.0 * qa)] {
        if (-EPSILON..=1.0 + EPSILON).contains(&t) {
            let p = a + d * t;
            if !hits.iter().any(|h: &Vec2| h.approx_eq(p, 1e-6)) {
                hits.push(p);
            }
        }
    }
    hits
}

pub fn intersect_circle_box(center: Vec2, radius: f64, bounds: &Box2) -> Vec<Vec2> {
    let mut hits: Vec<Vec2> = Vec::new();
    for (e0, e1) in bounds.edges() {
        for p in intersect_circle_segment(center, radius, e0, e1) {
            if !hits.iter().any(|h| h.approx_eq(p, 1e-6)) {
                hits.push(p);
            }
        }
    }
    hits
}

/// Centre of the circle through three points, or None when they are collinear.
pub fn circle_center_from_points(a: Vec2, b: Vec2, c: Vec2) -> Option<Vec2> {
    let d = 2.0 * (a.x * (b.y - c.y) + b.x * (c.y - a.y) + c.x * (a.y - b.y));
    if d.abs() < EPSILON {
        return None;
    }
    let a2 = a.dot(a);
    let b2 = b.dot(b);
    let c2 = c.dot(c);
    let center = Vec2::new(
        (a2 * (b.y - c.y) + b2 * (c.y - a.y) + c2 * (a.y - b.y)) / d,
        (a2 * (c.x - b.x) + b2 * (a.x - c.x) + c2 * (b.x - a.x)) / d,
    );
    center.is_finite().then_some(center)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clockwise_matches_screen_space() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(10.0, 0.0);
        assert!(Vec2::clockwise(a, b, Vec2::new(10.0, 10.0)));
        assert!(!Vec2::clockwise(a, b, Vec2::new(10.0, -10.0)));
    }

    #[test]
    fn segment_crossing_box_hits_both_sides() {
        let bounds = Box2::new(0.0, 0.0, 10.0, 10.0);
        let hits = intersect_segment_box(Vec2::new(-5.0, 5.0), Vec2::new(15.0, 5.0), &bounds);
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().any(|p| p.approx_eq(Vec2::new(0.0, 5.0), 1e-9)));
        assert!(hits.iter().any(|p| p.approx_eq(Vec2::new(10.0, 5.0), 1e-9)));
    }

    #[test]
    fn circle_through_three_points() {
        let center = circle_center_from_points(
            Vec2::new(-1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
        )
        .unwrap();
        assert!(center.approx_eq(Vec2::ZERO, 1e-9));
        assert!(circle_center_from_points(
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(2.0, 2.0)
        )
        .is_none());
    }

    #[test]
    fn unit_of_zero_is_zero() {
        assert_eq!(Vec2::ZERO.unit(), Vec2::ZERO);
    }
}
