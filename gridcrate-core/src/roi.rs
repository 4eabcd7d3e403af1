//! Rectangular regions of interest on the pixel grid

use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle `[x, x + width) x [y, y + height)`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Roi<T> {
    x: T,
    y: T,
    width: T,
    height: T,
}

pub type Roi2i = Roi<i32>;
pub type Roi2ui = Roi<u32>;
pub type Roi2f = Roi<f32>;
pub type Roi2d = Roi<f64>;

impl<T: Copy + ToPrimitive> Roi<T> {
    pub const fn new(x: T, y: T, width: T, height: T) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Compared in `f64`, so `x + width` may exceed the range of `T`
    pub fn contains(&self, x: T, y: T) -> bool {
        within(self.x, self.width, x) && within(self.y, self.height, y)
    }

    pub fn x(&self) -> T {
        self.x
    }

    pub fn y(&self) -> T {
        self.y
    }

    pub fn width(&self) -> T {
        self.width
    }

    pub fn height(&self) -> T {
        self.height
    }
}

fn within<T: ToPrimitive>(start: T, len: T, v: T) -> bool {
    match (start.to_f64(), len.to_f64(), v.to_f64()) {
        (Some(start), Some(len), Some(v)) => start <= v && v - start < len,
        _ => false,
    }
}
