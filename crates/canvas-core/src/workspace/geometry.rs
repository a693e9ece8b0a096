use serde::{Deserialize, Serialize};
use std::fmt;

/// Committed widget position. Always a multiple of the grid unit once stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn snapped(self, unit: u32) -> Position {
        Point::from(self).snapped(unit)
    }

    pub fn is_aligned(self, unit: u32) -> bool {
        unit != 0 && self.x.rem_euclid(unit as i32) == 0 && self.y.rem_euclid(unit as i32) == 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// Free-form pointer or preview coordinate, before snapping.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Round each axis to the nearest multiple of `unit`.
    pub fn snapped(self, unit: u32) -> Position {
        Position {
            x: snap(self.x, unit),
            y: snap(self.y, unit),
        }
    }
}

impl From<Position> for Point {
    fn from(p: Position) -> Self {
        Point {
            x: f64::from(p.x),
            y: f64::from(p.y),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(origin: impl Into<Point>, size: Size) -> Self {
        let origin = origin.into();
        Rect {
            x: origin.x,
            y: origin.y,
            width: f64::from(size.width),
            height: f64::from(size.height),
        }
    }

    /// Strict overlap: rectangles that only share an edge do not overlap.
    pub fn overlaps(&self, other: &Rect) -> bool {
        self.x < other.x + other.width
            && self.x + self.width > other.x
            && self.y < other.y + other.height
            && self.y + self.height > other.y
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// Nearest multiple of `unit`, halves rounding away from zero. A zero unit
/// only rounds to the nearest integer.
pub fn snap(value: f64, unit: u32) -> i32 {
    if unit == 0 {
        return value.round() as i32;
    }
    let unit = f64::from(unit);
    ((value / unit).round() * unit) as i32
}
