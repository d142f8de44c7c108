//! Relation body geometry: straight or circular-arc paths between two terminals, label placement,
//! label masks and arrowheads. Everything here is pure; callers resolve bindings to points first.

use std::f64::consts::{PI, TAU};

use super::vec::{
    circle_center_from_points, intersect_circle_box, intersect_segment_box, Box2, Vec2, EPSILON,
};
use crate::shapes::{Arrowhead, Terminal};

/// Bends smaller than this draw as a straight line.
const MIN_BEND: f64 = 1e-3;
const LABEL_FONT_SIZE: f64 = 18.0;
const LABEL_PADDING: f64 = 8.0;
const ARROWHEAD_SIZE: f64 = 16.0;
const ARROWHEAD_ANGLE: f64 = PI / 6.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetInput {
    pub bounds: Box2,
    pub is_exact: bool,
}

/// A terminal's aim point in page space and, when bound, the node it attaches to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminalInput {
    pub point: Vec2,
    pub target: Option<TargetInput>,
}

impl TerminalInput {
    pub fn free(point: Vec2) -> Self {
        TerminalInput {
            point,
            target: None,
        }
    }

    fn clips(&self) -> Option<&Box2> {
        self.target
            .as_ref()
            .filter(|t| !t.is_exact)
            .map(|t| &t.bounds)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArrowInput {
    pub start: TerminalInput,
    pub end: TerminalInput,
    pub bend: f64,
    pub scale: f64,
    pub label_position: f64,
    /// Gap left between a clipped terminal and its node outline.
    pub bound_offset: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Body {
    Straight,
    /// Arc around `center`, starting at `start_angle` and sweeping by `sweep` radians (positive
    /// sweeps run clockwise on screen).
    Arc {
        center: Vec2,
        radius: f64,
        start_angle: f64,
        sweep: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArrowheadPath {
    Open(Vec<Vec2>),
    Closed(Vec<Vec2>),
    Dot { center: Vec2, radius: f64 },
}

impl ArrowheadPath {
    pub fn to_svg_path(&self) -> String {
        match self {
            ArrowheadPath::Open(points) | ArrowheadPath::Closed(points) => {
                let mut d = String::new();
                for (i, p) in points.iter().enumerate() {
                    let cmd = if i == 0 { 'M' } else { 'L' };
                    d.push_str(&format!("{cmd}{} {} ", fmt_num(p.x), fmt_num(p.y)));
                }
                if matches!(self, ArrowheadPath::Closed(_)) {
                    d.push('Z');
                }
                d.trim_end().to_string()
            }
            ArrowheadPath::Dot { center, radius } => format!(
                "M{} {} a{r} {r} 0 1 0 {} 0 a{r} {r} 0 1 0 {} 0",
                fmt_num(center.x - radius),
                fmt_num(center.y),
                fmt_num(radius * 2.0),
                fmt_num(-radius * 2.0),
                r = fmt_num(*radius),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationGeometry {
    pub start: Vec2,
    pub end: Vec2,
    pub body: Body,
    pub label_point: Vec2,
    pub length: f64,
    pub scale: f64,
}

impl RelationGeometry {
    /// Resolve the body for `input`. Coincident terminals have no geometry.
    pub fn compute(input: &ArrowInput) -> Option<RelationGeometry> {
        let a = input.start.point;
        let b = input.end.point;
        if !a.is_finite() || !b.is_finite() || a.dist(b) < EPSILON {
            return None;
        }
        let scale = if input.scale > 0.0 { input.scale } else { 1.0 };
        let offset = input.bound_offset.max(0.0) * scale;
        let label_t = input.label_position.clamp(0.0, 1.0);

        if input.bend.abs() > MIN_BEND {
            let middle = a.med(b) + (b - a).unit().per() * -input.bend;
            if let Some(center) = circle_center_from_points(a, middle, b) {
                return arc_geometry(input, center, middle, offset, label_t, scale);
            }
        }
        straight_geometry(input, offset, label_t, scale)
    }

    /// Point at fraction `t` along the body.
    pub fn point_at(&self, t: f64) -> Vec2 {
        match self.body {
            Body::Straight => self.start.lerp(self.end, t),
            Body::Arc {
                center,
                radius,
                start_angle,
                sweep,
            } => Vec2::from_angle(center, radius, start_angle + sweep * t),
        }
    }

    /// The point the bend handle sits on.
    pub fn middle(&self) -> Vec2 {
        self.point_at(0.5)
    }

    /// Box the label occupies, centred on the label point, or None for an empty label.
    pub fn label_mask(&self, text: &str) -> Option<Box2> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let font = LABEL_FONT_SIZE * self.scale;
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0) as f64;
        let lines = text.lines().count().max(1) as f64;
        let w = longest * font * 0.6 + LABEL_PADDING * 2.0 * self.scale;
        let h = lines * font * 1.35 + LABEL_PADDING * self.scale;
        Some(Box2::from_center(self.label_point, w, h))
    }

    /// Parameter ranges of the body left visible once `mask` is carved out.
    pub fn stroke_ranges(&self, mask: Option<&Box2>) -> Vec<(f64, f64)> {
        let Some(mask) = mask else {
            return vec![(0.0, 1.0)];
        };
        let mut cuts: Vec<f64> = match self.body {
            Body::Straight => intersect_segment_box(self.start, self.end, mask)
                .into_iter()
                .map(|p| self.straight_param(p))
                .collect(),
            Body::Arc { center, radius, .. } => intersect_circle_box(center, radius, mask)
                .into_iter()
                .filter_map(|p| self.arc_param(p))
                .collect(),
        };
        cuts.retain(|t| (0.0..=1.0).contains(t));
        cuts.push(0.0);
        cuts.push(1.0);
        cuts.sort_by(|x, y| x.total_cmp(y));
        cuts.dedup_by(|x, y| (*x - *y).abs() < EPSILON);

        cuts.windows(2)
            .filter(|w| !mask.contains(self.point_at((w[0] + w[1]) / 2.0)))
            .map(|w| (w[0], w[1]))
            .collect()
    }

    /// SVG path data for the body, with the label cut out when `label` is non-empty.
    pub fn to_svg_path(&self, label: &str) -> String {
        let mask = self.label_mask(label);
        let mut parts = Vec::new();
        for (t0, t1) in self.stroke_ranges(mask.as_ref()) {
            let p0 = self.point_at(t0);
            let p1 = self.point_at(t1);
            let segment = match self.body {
                Body::Straight => format!(
                    "M{} {} L{} {}",
                    fmt_num(p0.x),
                    fmt_num(p0.y),
                    fmt_num(p1.x),
                    fmt_num(p1.y)
                ),
                Body::Arc { radius, sweep, .. } => {
                    let span = sweep * (t1 - t0);
                    format!(
                        "M{} {} A{r} {r} 0 {} {} {} {}",
                        fmt_num(p0.x),
                        fmt_num(p0.y),
                        u8::from(span.abs() > PI),
                        u8::from(span > 0.0),
                        fmt_num(p1.x),
                        fmt_num(p1.y),
                        r = fmt_num(radius),
                    )
                }
            };
            parts.push(segment);
        }
        parts.join(" ")
    }

    /// Unit direction of travel arriving at `terminal`.
    fn direction_into(&self, terminal: Terminal) -> Vec2 {
        match self.body {
            Body::Straight => match terminal {
                Terminal::End => (self.end - self.start).unit(),
                Terminal::Start => (self.start - self.end).unit(),
            },
            Body::Arc {
                start_angle, sweep, ..
            } => {
                let (angle, travel) = match terminal {
                    Terminal::End => (start_angle + sweep, sweep.signum()),
                    Terminal::Start => (start_angle, -sweep.signum()),
                };
                Vec2::new(-angle.sin(), angle.cos()) * travel
            }
        }
    }

    pub fn arrowhead(&self, terminal: Terminal, kind: Arrowhead) -> Option<ArrowheadPath> {
        let tip = match terminal {
            Terminal::Start => self.start,
            Terminal::End => self.end,
        };
        let dir = self.direction_into(terminal);
        let size = (ARROWHEAD_SIZE * self.scale).min(self.length / 3.0);
        if size < EPSILON || dir.len() < EPSILON {
            return None;
        }
        let back = -dir * size;
        let left = tip + back.rot_around(Vec2::ZERO, ARROWHEAD_ANGLE);
        let right = tip + back.rot_around(Vec2::ZERO, -ARROWHEAD_ANGLE);
        match kind {
            Arrowhead::None => None,
            Arrowhead::Arrow => Some(ArrowheadPath::Open(vec![left, tip, right])),
            Arrowhead::Triangle => Some(ArrowheadPath::Closed(vec![left, tip, right])),
            Arrowhead::Bar => {
                let half = dir.per() * (size / 2.0);
                Some(ArrowheadPath::Open(vec![tip + half, tip - half]))
            }
            Arrowhead::Dot => Some(ArrowheadPath::Dot {
                center: tip,
                radius: size / 4.0,
            }),
        }
    }

    fn straight_param(&self, p: Vec2) -> f64 {
        let d = self.end - self.start;
        (p - self.start).dot(d) / d.dot(d)
    }

    fn arc_param(&self, p: Vec2) -> Option<f64> {
        let Body::Arc {
            center,
            start_angle,
            sweep,
            ..
        } = self.body
        else {
            return None;
        };
        Some(arc_param(center, start_angle, sweep, p))
    }
}

fn arc_param(center: Vec2, start_angle: f64, sweep: f64, p: Vec2) -> f64 {
    let delta = (center.angle_to(p) - start_angle) * sweep.signum();
    delta.rem_euclid(TAU) / sweep.abs()
}

fn straight_geometry(
    input: &ArrowInput,
    offset: f64,
    label_t: f64,
    scale: f64,
) -> Option<RelationGeometry> {
    let a = input.start.point;
    let b = input.end.point;
    let mut start = a;
    let mut end = b;
    if let Some(bounds) = input.start.clips() {
        if let Some(hit) = nearest_to(intersect_segment_box(a, b, bounds), b) {
            start = hit;
        }
    }
    if let Some(bounds) = input.end.clips() {
        if let Some(hit) = nearest_to(intersect_segment_box(a, b, bounds), a) {
            end = hit;
        }
    }
    // Overlapping nodes can clip past each other; draw centre to centre instead.
    if (end - start).dot(b - a) <= EPSILON {
        start = a;
        end = b;
    }

    let len = start.dist(end);
    let pull = offset.min(len / 4.0);
    let u = (end - start).unit();
    if input.start.clips().is_some() {
        start = start + u * pull;
    }
    if input.end.clips().is_some() {
        end = end - u * pull;
    }
    if start.dist(end) < EPSILON {
        return None;
    }
    Some(RelationGeometry {
        start,
        end,
        body: Body::Straight,
        label_point: start.lerp(end, label_t),
        length: start.dist(end),
        scale,
    })
}

fn arc_geometry(
    input: &ArrowInput,
    center: Vec2,
    middle: Vec2,
    offset: f64,
    label_t: f64,
    scale: f64,
) -> Option<RelationGeometry> {
    let a = input.start.point;
    let b = input.end.point;
    let radius = center.dist(a);
    let a0 = center.angle_to(a);
    let full = (center.angle_to(b) - a0).rem_euclid(TAU);
    let to_middle = (center.angle_to(middle) - a0).rem_euclid(TAU);
    let sweep = if to_middle < full { full } else { full - TAU };

    let mut t0 = 0.0;
    let mut t1 = 1.0;
    if let Some(bounds) = input.start.clips() {
        let ts = arc_hits(center, radius, a0, sweep, bounds);
        if let Some(t) = ts
            .iter()
            .copied()
            .filter(|t| *t <= 0.5)
            .reduce(f64::max)
            .or_else(|| ts.iter().copied().reduce(f64::min))
        {
            t0 = t;
        }
    }
    if let Some(bounds) = input.end.clips() {
        let ts = arc_hits(center, radius, a0, sweep, bounds);
        if let Some(t) = ts
            .iter()
            .copied()
            .filter(|t| *t >= 0.5)
            .reduce(f64::min)
            .or_else(|| ts.iter().copied().reduce(f64::max))
        {
            t1 = t;
        }
    }
    if t1 <= t0 {
        t0 = 0.0;
        t1 = 1.0;
    }

    let arc_len = radius * sweep.abs() * (t1 - t0);
    let pull = offset.min(arc_len / 4.0) / (radius * sweep.abs());
    if input.start.clips().is_some() {
        t0 += pull;
    }
    if input.end.clips().is_some() {
        t1 -= pull;
    }
    let start_angle = a0 + sweep * t0;
    let span = sweep * (t1 - t0);
    if span.abs() < EPSILON {
        return None;
    }
    let body = Body::Arc {
        center,
        radius,
        start_angle,
        sweep: span,
    };
    let start = Vec2::from_angle(center, radius, start_angle);
    let end = Vec2::from_angle(center, radius, start_angle + span);
    Some(RelationGeometry {
        start,
        end,
        body,
        label_point: Vec2::from_angle(center, radius, start_angle + span * label_t),
        length: radius * span.abs(),
        scale,
    })
}

fn arc_hits(center: Vec2, radius: f64, start_angle: f64, sweep: f64, bounds: &Box2) -> Vec<f64> {
    intersect_circle_box(center, radius, bounds)
        .into_iter()
        .map(|p| arc_param(center, start_angle, sweep, p))
        .filter(|t| (0.0..=1.0).contains(t))
        .collect()
}

fn nearest_to(points: Vec<Vec2>, to: Vec2) -> Option<Vec2> {
    points
        .into_iter()
        .min_by(|p, q| p.dist(to).total_cmp(&q.dist(to)))
}

fn fmt_num(n: f64) -> String {
    let rounded = (n * 100.0).round() / 100.0;
    if rounded == 0.0 {
        "0".to_string()
    } else {
        format!("{rounded}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(a: Vec2, b: Vec2, bend: f64) -> ArrowInput {
        ArrowInput {
            start: TerminalInput::free(a),
            end: TerminalInput::free(b),
            bend,
            scale: 1.0,
            label_position: 0.5,
            bound_offset: 10.0,
        }
    }

    #[test]
    fn coincident_terminals_have_no_geometry() {
        let p = Vec2::new(42.0, 7.0);
        assert!(RelationGeometry::compute(&input(p, p, 0.0)).is_none());
        assert!(RelationGeometry::compute(&input(p, p, 30.0)).is_none());
    }

    #[test]
    fn bound_start_is_clipped_and_offset() {
        let mut arrow = input(Vec2::new(50.0, 50.0), Vec2::new(300.0, 50.0), 0.0);
        arrow.start.target = Some(TargetInput {
            bounds: Box2::new(0.0, 0.0, 100.0, 100.0),
            is_exact: false,
        });
        let geometry = RelationGeometry::compute(&arrow).unwrap();
        assert!(geometry.start.approx_eq(Vec2::new(110.0, 50.0), 1e-9));
        assert!(geometry.end.approx_eq(Vec2::new(300.0, 50.0), 1e-9));
        assert_eq!(geometry.body, Body::Straight);
    }

    #[test]
    fn exact_terminals_are_not_clipped() {
        let mut arrow = input(Vec2::new(50.0, 50.0), Vec2::new(300.0, 50.0), 0.0);
        arrow.start.target = Some(TargetInput {
            bounds: Box2::new(0.0, 0.0, 100.0, 100.0),
            is_exact: true,
        });
        let geometry = RelationGeometry::compute(&arrow).unwrap();
        assert!(geometry.start.approx_eq(Vec2::new(50.0, 50.0), 1e-9));
    }

    #[test]
    fn bend_moves_the_middle_off_the_chord() {
        let geometry =
            RelationGeometry::compute(&input(Vec2::ZERO, Vec2::new(100.0, 0.0), 20.0)).unwrap();
        assert!(matches!(geometry.body, Body::Arc { .. }));
        assert!(geometry.middle().approx_eq(Vec2::new(50.0, 20.0), 1e-6));
        assert!(geometry.start.approx_eq(Vec2::ZERO, 1e-6));
        assert!(geometry.end.approx_eq(Vec2::new(100.0, 0.0), 1e-6));

        let flipped =
            RelationGeometry::compute(&input(Vec2::ZERO, Vec2::new(100.0, 0.0), -20.0)).unwrap();
        assert!(flipped.middle().approx_eq(Vec2::new(50.0, -20.0), 1e-6));
    }

    #[test]
    fn label_sits_at_its_position() {
        let mut arrow = input(Vec2::ZERO, Vec2::new(200.0, 0.0), 0.0);
        arrow.label_position = 0.25;
        let geometry = RelationGeometry::compute(&arrow).unwrap();
        assert!(geometry.label_point.approx_eq(Vec2::new(50.0, 0.0), 1e-9));
    }

    #[test]
    fn label_mask_splits_the_stroke() {
        let geometry =
            RelationGeometry::compute(&input(Vec2::ZERO, Vec2::new(400.0, 0.0), 0.0)).unwrap();
        let mask = geometry.label_mask("supports").unwrap();
        let ranges = geometry.stroke_ranges(Some(&mask));
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].0, 0.0);
        assert_eq!(ranges[1].1, 1.0);
        assert!(ranges[0].1 < 0.5 && ranges[1].0 > 0.5);

        let path = geometry.to_svg_path("supports");
        assert_eq!(path.matches('M').count(), 2);
        assert_eq!(geometry.to_svg_path("").matches('M').count(), 1);
    }

    #[test]
    fn arc_path_uses_arc_commands() {
        let geometry =
            RelationGeometry::compute(&input(Vec2::ZERO, Vec2::new(100.0, 0.0), 20.0)).unwrap();
        let path = geometry.to_svg_path("");
        assert!(path.starts_with("M0 0 A"));
        assert!(!path.contains("NaN"));
    }

    #[test]
    fn arrowhead_points_at_the_end() {
        let geometry =
            RelationGeometry::compute(&input(Vec2::ZERO, Vec2::new(100.0, 0.0), 0.0)).unwrap();
        let Some(ArrowheadPath::Open(points)) = geometry.arrowhead(Terminal::End, Arrowhead::Arrow)
        else {
            panic!("expected an open arrowhead");
        };
        assert!(points[1].approx_eq(Vec2::new(100.0, 0.0), 1e-9));
        assert!(points[0].x < 100.0 && points[2].x < 100.0);
        assert!(geometry
            .arrowhead(Terminal::Start, Arrowhead::None)
            .is_none());
    }
}
