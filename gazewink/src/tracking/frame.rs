//! Frame model — one eye-tracker sample: the combined gaze point plus the
//! per-eye positions.
//!
//! A position of exactly (0, 0) is the "no data" sentinel (eye closed or not
//! tracked), never a real screen coordinate.

// ── Point ───────────────────────────────────────────────────

/// Screen-space coordinate pair in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    /// The "no data" sentinel.
    pub const ZERO: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Build a point from raw tracker output.  Non-finite coordinates are
    /// treated as missing data and collapse to the sentinel.
    pub fn sanitized(x: f64, y: f64) -> Self {
        if x.is_finite() && y.is_finite() {
            Self { x, y }
        } else {
            Self::ZERO
        }
    }

    /// Whether this point carries no data.
    pub fn is_zero(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Offset by polar coordinates (`radius` in pixels, `angle` in radians).
    pub fn offset_polar(&self, radius: f64, angle: f64) -> Self {
        Self {
            x: self.x + radius * angle.cos(),
            y: self.y + radius * angle.sin(),
        }
    }
}

// ── Eye sample ──────────────────────────────────────────────

/// Position reported for a single eye.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EyeSample {
    pub avg: Point,
}

impl EyeSample {
    pub fn new(avg: Point) -> Self {
        Self { avg }
    }

    pub fn is_closed(&self) -> bool {
        self.avg.is_zero()
    }
}

// ── Frame ───────────────────────────────────────────────────

/// One measurement sample.  Frames carry no timestamp; arrival time is the
/// timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Frame {
    /// Combined gaze point.
    pub avg: Point,
    pub left_eye: EyeSample,
    pub right_eye: EyeSample,
}

impl Frame {
    pub fn new(avg: Point, left: Point, right: Point) -> Self {
        Self {
            avg,
            left_eye: EyeSample::new(left),
            right_eye: EyeSample::new(right),
        }
    }

    /// A frame with no data at all (both eyes closed).
    pub fn closed() -> Self {
        Self::default()
    }

    /// Both eyes open, each reporting the gaze point itself.
    pub fn open_at(x: f64, y: f64) -> Self {
        let p = Point::new(x, y);
        Self::new(p, p, p)
    }

    /// Left eye closed, right eye tracking at (x, y).
    pub fn left_closed_at(x: f64, y: f64) -> Self {
        let p = Point::new(x, y);
        Self::new(p, Point::ZERO, p)
    }

    /// Right eye closed, left eye tracking at (x, y).
    pub fn right_closed_at(x: f64, y: f64) -> Self {
        let p = Point::new(x, y);
        Self::new(p, p, Point::ZERO)
    }

    /// Derived open/closed flags for this frame.
    pub fn openness(&self) -> EyeOpenness {
        EyeOpenness {
            closed: self.avg.is_zero(),
            left_closed: self.left_eye.is_closed(),
            right_closed: self.right_eye.is_closed(),
        }
    }
}

// ── Openness ────────────────────────────────────────────────

/// Per-frame closed flags for the combined signal and each eye.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EyeOpenness {
    /// Combined gaze signal missing (eye pair closed).
    pub closed: bool,
    pub left_closed: bool,
    pub right_closed: bool,
}

impl EyeOpenness {
    /// Everything open; the assumed state before the first frame.
    pub const OPEN: EyeOpenness = EyeOpenness {
        closed: false,
        left_closed: false,
        right_closed: false,
    };
}

/// A raw change of a closed flag between two consecutive frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Opened,
    Closed,
}

impl Transition {
    /// Compare the previous and current closed flag.
    pub fn between(was_closed: bool, is_closed: bool) -> Option<Self> {
        match (was_closed, is_closed) {
            (false, true) => Some(Self::Closed),
            (true, false) => Some(Self::Opened),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Opened => "opened",
            Self::Closed => "closed",
        }
    }
}
