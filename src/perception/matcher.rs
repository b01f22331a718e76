/// Template matching: find the first place (row-major scan order) where a
/// small reference image appears inside a screen capture, under per-channel
/// colour tolerance.
///
/// Candidates are rejected cheaply on the template's top-left pixel, then on
/// its centre pixel, before a full comparison. When both images expose packed
/// buffers the scan indexes raw bytes; otherwise it goes through per-pixel
/// reads, which is much slower and logged every time.
use crate::perception::traits::{PackedPixels, RasterImage};
use crate::perception::types::{ColorTolerance, MatchLocation, MatchResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateMatcher {
    tolerance: ColorTolerance,
}

impl TemplateMatcher {
    pub fn new(tolerance: ColorTolerance) -> Self {
        Self { tolerance }
    }

    pub fn tolerance(&self) -> ColorTolerance {
        self.tolerance
    }

    /// Pure function over its inputs. A template larger than the screen on
    /// either axis, or an empty template, is simply "not found".
    pub fn locate<S, T>(&self, screen: &S, template: &T) -> MatchResult
    where
        S: RasterImage + ?Sized,
        T: RasterImage + ?Sized,
    {
        let (sw, sh) = screen.dimensions();
        let (tw, th) = template.dimensions();
        if tw == 0 || th == 0 || tw > sw || th > sh {
            return None;
        }

        match (screen.packed(), template.packed()) {
            (Some(s), Some(t)) => scan(&s, sw, sh, &t, tw, th, self.tolerance),
            _ => {
                tracing::warn!(
                    screen = %format!("{sw}x{sh}"),
                    template = %format!("{tw}x{th}"),
                    "slow path used for template search (no packed buffer)"
                );
                scan(&Opaque(screen), sw, sh, &Opaque(template), tw, th, self.tolerance)
            }
        }
    }
}

/// Pixel access used by the scan loop; monomorphized per representation.
trait PixelAccess {
    fn at(&self, x: u32, y: u32) -> [u8; 3];
}

impl PixelAccess for PackedPixels<'_> {
    #[inline]
    fn at(&self, x: u32, y: u32) -> [u8; 3] {
        self.rgb_at(x, y)
    }
}

struct Opaque<'a, I: ?Sized>(&'a I);

impl<I: RasterImage + ?Sized> PixelAccess for Opaque<'_, I> {
    #[inline]
    fn at(&self, x: u32, y: u32) -> [u8; 3] {
        self.0.rgb(x, y)
    }
}

fn scan<S: PixelAccess, T: PixelAccess>(
    screen: &S,
    sw: u32,
    sh: u32,
    template: &T,
    tw: u32,
    th: u32,
    tol: ColorTolerance,
) -> MatchResult {
    let first = template.at(0, 0);
    let (cx, cy) = (tw / 2, th / 2);
    let centre = template.at(cx, cy);

    // Inclusive: the template may sit flush against the right/bottom edge.
    for y in 0..=(sh - th) {
        for x in 0..=(sw - tw) {
            if !tol.accepts(screen.at(x, y), first) {
                continue;
            }
            if !tol.accepts(screen.at(x + cx, y + cy), centre) {
                continue;
            }
            if full_match(screen, x, y, template, tw, th, tol) {
                return Some(MatchLocation {
                    x,
                    y,
                    width: tw,
                    height: th,
                });
            }
        }
    }
    None
}

fn full_match<S: PixelAccess, T: PixelAccess>(
    screen: &S,
    sx: u32,
    sy: u32,
    template: &T,
    tw: u32,
    th: u32,
    tol: ColorTolerance,
) -> bool {
    (0..th).all(|ty| (0..tw).all(|tx| tol.accepts(screen.at(sx + tx, sy + ty), template.at(tx, ty))))
}
