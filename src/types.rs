use fixed::types::I32F32;

/// Thousandths of a point per point. Every `Pt` sits on this grid.
const MILLI_PER_PT: i128 = 1000;
/// Raw `I32F32` bits per point.
const BITS_PER_PT: i128 = 1 << 32;

/// A length in PDF points, stored as fixed point and snapped to whole
/// milli-points, so layout arithmetic repeats exactly on every platform.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Pt(I32F32);

impl Pt {
    pub const ZERO: Pt = Pt(I32F32::ZERO);

    pub fn from_f32(value: f32) -> Pt {
        if !value.is_finite() {
            return Pt::ZERO;
        }
        // f64 keeps every representable f32 exact before rounding.
        let milli = (f64::from(value) * 1000.0).round();
        Pt::from_milli_wide(milli.clamp(i64::MIN as f64, i64::MAX as f64) as i128)
    }

    pub fn from_i32(points: i32) -> Pt {
        Pt::from_milli_wide(i128::from(points) * MILLI_PER_PT)
    }

    pub fn from_mm(mm: f32) -> Pt {
        Pt::from_f32(mm * 72.0 / 25.4)
    }

    pub fn from_milli(milli: i64) -> Pt {
        Pt::from_milli_wide(i128::from(milli))
    }

    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    /// The length in thousandths of a point.
    pub fn milli(self) -> i64 {
        let milli = round_div(i128::from(self.0.to_bits()) * MILLI_PER_PT, BITS_PER_PT);
        saturate_i64(milli)
    }

    pub fn max(self, other: Pt) -> Pt {
        if other > self { other } else { self }
    }

    pub fn min(self, other: Pt) -> Pt {
        if other < self { other } else { self }
    }

    /// `self * num / den` on the milli-point grid. Wide intermediates keep
    /// large glyph-unit sums from overflowing.
    pub fn scale(self, num: i64, den: i64) -> Pt {
        if den == 0 {
            return Pt::ZERO;
        }
        let product = i128::from(self.milli()).saturating_mul(i128::from(num));
        Pt::from_milli_wide(round_div(product, i128::from(den)))
    }

    fn from_milli_wide(milli: i128) -> Pt {
        let bits = round_div(milli.saturating_mul(BITS_PER_PT), MILLI_PER_PT);
        Pt(I32F32::from_bits(saturate_i64(bits)))
    }
}

impl std::ops::Add for Pt {
    type Output = Pt;
    fn add(self, rhs: Pt) -> Pt {
        Pt::from_milli_wide(i128::from(self.milli()) + i128::from(rhs.milli()))
    }
}

impl std::ops::AddAssign for Pt {
    fn add_assign(&mut self, rhs: Pt) {
        *self = *self + rhs;
    }
}

impl std::ops::Sub for Pt {
    type Output = Pt;
    fn sub(self, rhs: Pt) -> Pt {
        Pt::from_milli_wide(i128::from(self.milli()) - i128::from(rhs.milli()))
    }
}

impl std::ops::Mul<i32> for Pt {
    type Output = Pt;
    fn mul(self, rhs: i32) -> Pt {
        self.scale(i64::from(rhs), 1)
    }
}

impl std::ops::Div<i32> for Pt {
    type Output = Pt;
    fn div(self, rhs: i32) -> Pt {
        self.scale(1, i64::from(rhs))
    }
}

impl std::iter::Sum for Pt {
    fn sum<I: Iterator<Item = Pt>>(iter: I) -> Pt {
        iter.fold(Pt::ZERO, std::ops::Add::add)
    }
}

/// Integer division rounding halves away from zero.
fn round_div(num: i128, den: i128) -> i128 {
    if den == 0 {
        return 0;
    }
    let (num, den) = if den < 0 { (-num, -den) } else { (num, den) };
    let half = den / 2;
    if num >= 0 {
        (num + half) / den
    } else {
        (num - half) / den
    }
}

fn saturate_i64(value: i128) -> i64 {
    i64::try_from(value).unwrap_or(if value < 0 { i64::MIN } else { i64::MAX })
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Size {
    pub width: Pt,
    pub height: Pt,
}

impl Size {
    pub fn a4() -> Self {
        Self {
            width: Pt::from_f32(595.28),
            height: Pt::from_f32(841.89),
        }
    }

    pub fn letter() -> Self {
        // 8.5in x 11in at 72pt/in.
        Self {
            width: Pt::from_f32(612.0),
            height: Pt::from_f32(792.0),
        }
    }

    pub fn new(width: f32, height: f32) -> Self {
        Self {
            width: Pt::from_f32(width),
            height: Pt::from_f32(height),
        }
    }
}

/// Rectangle in top-down page space: `y` is the distance from the page top.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: Pt,
    pub y: Pt,
    pub width: Pt,
    pub height: Pt,
}

impl Rect {
    pub fn bottom(&self) -> Pt {
        self.y + self.height
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Margins {
    pub top: Pt,
    pub right: Pt,
    pub bottom: Pt,
    pub left: Pt,
}

impl Margins {
    pub fn all(value: f32) -> Self {
        let v = Pt::from_f32(value);
        Self {
            top: v,
            right: v,
            bottom: v,
            left: v,
        }
    }

    pub fn new(top: f32, right: f32, bottom: f32, left: f32) -> Self {
        Self {
            top: Pt::from_f32(top),
            right: Pt::from_f32(right),
            bottom: Pt::from_f32(bottom),
            left: Pt::from_f32(left),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Color {
    pub const BLACK: Color = Color {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };

    pub fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b }
    }

    pub fn gray(level: f32) -> Self {
        Self::rgb(level, level, level)
    }
}
