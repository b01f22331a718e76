use serde::{Deserialize, Serialize};

/// Where a template was found on screen: top-left corner plus the template's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchLocation {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl MatchLocation {
    /// Centre of the matched region in screen pixels.
    pub fn center(&self) -> (i32, i32) {
        (
            (self.x + self.width / 2) as i32,
            (self.y + self.height / 2) as i32,
        )
    }

    /// Top-left corner shifted by `(dx, dy)`.
    pub fn offset(&self, dx: i32, dy: i32) -> (i32, i32) {
        (self.x as i32 + dx, self.y as i32 + dy)
    }
}

/// `None` means "not found", which is an ordinary outcome and never an error.
pub type MatchResult = Option<MatchLocation>;

/// Per-channel absolute difference threshold on the 8-bit scale. Alpha is ignored.
///
/// Symmetric but not transitive; only ever used for direct screen-vs-template checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorTolerance(u8);

impl ColorTolerance {
    pub const fn new(threshold: u8) -> Self {
        Self(threshold)
    }

    pub fn threshold(&self) -> u8 {
        self.0
    }

    /// True iff every RGB channel differs by strictly less than the threshold.
    #[inline]
    pub fn accepts(&self, a: [u8; 3], b: [u8; 3]) -> bool {
        a.iter()
            .zip(b.iter())
            .all(|(&ca, &cb)| ca.abs_diff(cb) < self.0)
    }
}

impl Default for ColorTolerance {
    fn default() -> Self {
        Self(30)
    }
}
