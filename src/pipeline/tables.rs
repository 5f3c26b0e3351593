//! Table detection from ruling lines.
//!
//! Parsers reduce each page's vector graphics to straight [`Segment`]s. A
//! table is a connected group of horizontal and vertical rules that crosses
//! itself often enough to form at least two cells. Text-only "tables"
//! (columns aligned with spaces) are not detected; counts are best-effort
//! and may differ between parser backends.
//!
//! ```text
//!   ┌────┬────┐      2 distinct rows of rules  ─┐
//!   │    │    │      3 distinct columns        ─┴─▶ (2-1)·(3-1) = 2 cells → table
//!   └────┴────┘
//! ```

use tracing::debug;

/// Coordinates closer than this (in PDF points) are treated as equal.
const SNAP_TOLERANCE: f32 = 3.0;

/// Rules shorter than this are ignored (bullets, tick marks, glyph parts).
const MIN_RULE_LENGTH: f32 = 6.0;

/// Upper bound on rules examined per page; the grouping step is quadratic.
const MAX_RULES_PER_PAGE: usize = 4_000;

/// A straight line segment in page space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Segment {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    /// Edges of a rectangle. A rectangle thinner than the snap tolerance is a
    /// single rule, which is how many generators draw table borders.
    pub fn from_rect(x: f32, y: f32, width: f32, height: f32) -> Vec<Segment> {
        let (left, right) = ordered(x, x + width);
        let (bottom, top) = ordered(y, y + height);
        let (w, h) = (right - left, top - bottom);

        if h <= SNAP_TOLERANCE && w <= SNAP_TOLERANCE {
            Vec::new()
        } else if h <= SNAP_TOLERANCE {
            let mid = (bottom + top) / 2.0;
            vec![Segment::new(left, mid, right, mid)]
        } else if w <= SNAP_TOLERANCE {
            let mid = (left + right) / 2.0;
            vec![Segment::new(mid, bottom, mid, top)]
        } else {
            vec![
                Segment::new(left, bottom, right, bottom),
                Segment::new(left, top, right, top),
                Segment::new(left, bottom, left, top),
                Segment::new(right, bottom, right, top),
            ]
        }
    }

    fn is_horizontal(&self) -> bool {
        (self.y1 - self.y0).abs() <= SNAP_TOLERANCE
            && (self.x1 - self.x0).abs() >= MIN_RULE_LENGTH
    }

    fn is_vertical(&self) -> bool {
        (self.x1 - self.x0).abs() <= SNAP_TOLERANCE
            && (self.y1 - self.y0).abs() >= MIN_RULE_LENGTH
    }
}

fn ordered(a: f32, b: f32) -> (f32, f32) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Horizontal rule: constant `at` (y), spanning `from..=to` in x.
/// Vertical rule: constant `at` (x), spanning `from..=to` in y.
#[derive(Debug, Clone, Copy)]
struct Rule {
    at: f32,
    from: f32,
    to: f32,
}

impl Rule {
    fn horizontal(s: &Segment) -> Self {
        let (from, to) = ordered(s.x0, s.x1);
        Self {
            at: (s.y0 + s.y1) / 2.0,
            from,
            to,
        }
    }

    fn vertical(s: &Segment) -> Self {
        let (from, to) = ordered(s.y0, s.y1);
        Self {
            at: (s.x0 + s.x1) / 2.0,
            from,
            to,
        }
    }
}

fn crosses(h: &Rule, v: &Rule) -> bool {
    v.at >= h.from - SNAP_TOLERANCE
        && v.at <= h.to + SNAP_TOLERANCE
        && h.at >= v.from - SNAP_TOLERANCE
        && h.at <= v.to + SNAP_TOLERANCE
}

/// Count grid-like regions among a page's segments.
pub fn count_tables(segments: &[Segment]) -> usize {
    let mut horizontal: Vec<Rule> = Vec::new();
    let mut vertical: Vec<Rule> = Vec::new();

    for s in segments {
        if s.is_horizontal() {
            horizontal.push(Rule::horizontal(s));
        } else if s.is_vertical() {
            vertical.push(Rule::vertical(s));
        }
    }

    if horizontal.len() < 2 || vertical.len() < 2 {
        return 0;
    }
    if horizontal.len() + vertical.len() > MAX_RULES_PER_PAGE {
        debug!(
            "Page has {} rules; examining the first {}",
            horizontal.len() + vertical.len(),
            MAX_RULES_PER_PAGE
        );
        horizontal.truncate(MAX_RULES_PER_PAGE / 2);
        vertical.truncate(MAX_RULES_PER_PAGE / 2);
    }

    let offset = horizontal.len();
    let mut groups = DisjointSet::new(offset + vertical.len());
    for (i, h) in horizontal.iter().enumerate() {
        for (j, v) in vertical.iter().enumerate() {
            if crosses(h, v) {
                groups.union(i, offset + j);
            }
        }
    }

    let mut members: std::collections::HashMap<usize, (Vec<f32>, Vec<f32>)> =
        std::collections::HashMap::new();
    for (i, h) in horizontal.iter().enumerate() {
        members.entry(groups.find(i)).or_default().0.push(h.at);
    }
    for (j, v) in vertical.iter().enumerate() {
        members.entry(groups.find(offset + j)).or_default().1.push(v.at);
    }

    members
        .into_values()
        .filter(|(rows, cols)| {
            let rows = distinct(rows.clone());
            let cols = distinct(cols.clone());
            rows >= 2 && cols >= 2 && (rows - 1) * (cols - 1) >= 2
        })
        .count()
}

/// Number of distinct coordinates after snapping.
fn distinct(mut values: Vec<f32>) -> usize {
    values.sort_by(|a, b| a.total_cmp(b));
    let mut count = 0;
    let mut last: Option<f32> = None;
    for v in values {
        if last.is_none_or(|l| v - l > SNAP_TOLERANCE) {
            count += 1;
            last = Some(v);
        }
    }
    count
}

struct DisjointSet {
    parent: Vec<usize>,
}

impl DisjointSet {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}
