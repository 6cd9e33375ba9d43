//! Bresenham ray casting over grid cells.
//!
//! When a scan reports an obstacle at some distance, every cell between
//! the sensor and that endpoint is evidence of free space. This module
//! enumerates those cells with integer-only arithmetic so long rays
//! accumulate no floating-point drift.

/// Iterator over the grid cells along a ray, endpoints inclusive.
///
/// Enumeration is purely geometric: cells outside any particular grid are
/// still yielded, and bounds checking is the caller's responsibility.
///
/// # Example
///
/// ```
/// use drishti_map::mapping::RayCells;
///
/// let cells: Vec<_> = RayCells::new(0, 0, 3, 0).collect();
/// assert_eq!(cells, vec![(0, 0), (1, 0), (2, 0), (3, 0)]);
/// ```
#[derive(Debug, Clone)]
pub struct RayCells {
    x: i32,
    y: i32,
    x1: i32,
    y1: i32,
    dx: i32,
    dy: i32,
    sx: i32,
    sy: i32,
    err: i32,
    finished: bool,
}

impl RayCells {
    /// Create an iterator from the start cell to the end cell.
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        let dx = (x1 - x0).abs();
        let dy = (y1 - y0).abs();
        let sx = if x0 < x1 { 1 } else { -1 };
        let sy = if y0 < y1 { 1 } else { -1 };

        Self {
            x: x0,
            y: y0,
            x1,
            y1,
            dx,
            dy,
            sx,
            sy,
            err: dx - dy,
            finished: false,
        }
    }
}

impl Iterator for RayCells {
    type Item = (i32, i32);

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = (self.x, self.y);

        if self.x == self.x1 && self.y == self.y1 {
            self.finished = true;
            return Some(result);
        }

        let e2 = 2 * self.err;

        if e2 > -self.dy {
            self.err -= self.dy;
            self.x += self.sx;
        }

        if e2 < self.dx {
            self.err += self.dx;
            self.y += self.sy;
        }

        Some(result)
    }
}
