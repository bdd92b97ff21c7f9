/// Axis-aligned rectangle in frame pixel units.
///
/// Used both for raw detector output and for the stabilized display box
/// handed to the compositor. Coordinates stay fractional until the
/// compositor snaps them to whole pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BoundingBox {
    pub origin_x: f64,
    pub origin_y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    pub const fn new(origin_x: f64, origin_y: f64, width: f64, height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.origin_x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.origin_y + self.height
    }

    /// A box with a non-positive (or NaN) side cannot be cropped.
    pub fn is_degenerate(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Grows the box by `margin` on every side.
    pub fn expand(&self, margin: f64) -> Self {
        Self {
            origin_x: self.origin_x - margin,
            origin_y: self.origin_y - margin,
            width: self.width + 2.0 * margin,
            height: self.height + 2.0 * margin,
        }
    }

    /// Per-field absolute difference: `[x, y, width, height]`.
    pub fn abs_deltas(&self, other: &BoundingBox) -> [f64; 4] {
        [
            (self.origin_x - other.origin_x).abs(),
            (self.origin_y - other.origin_y).abs(),
            (self.width - other.width).abs(),
            (self.height - other.height).abs(),
        ]
    }

    /// Moves every field a fraction `t` of the way towards `target`.
    pub fn lerp(&self, target: &BoundingBox, t: f64) -> Self {
        Self {
            origin_x: self.origin_x + t * (target.origin_x - self.origin_x),
            origin_y: self.origin_y + t * (target.origin_y - self.origin_y),
            width: self.width + t * (target.width - self.width),
            height: self.height + t * (target.height - self.height),
        }
    }

    /// Fits the box inside `[0, frame_width] × [0, frame_height]`.
    ///
    /// A side longer than the frame is capped to the frame first, so the
    /// origin bound `frame - size` can never go negative.
    pub fn clamp_to_frame(&self, frame_width: f64, frame_height: f64) -> Self {
        let width = self.width.min(frame_width);
        let height = self.height.min(frame_height);
        Self {
            origin_x: self.origin_x.min(frame_width - width).max(0.0),
            origin_y: self.origin_y.min(frame_height - height).max(0.0),
            width,
            height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_expand_grows_every_side() {
        let b = BoundingBox::new(200.0, 150.0, 80.0, 100.0).expand(120.0);
        assert_eq!(b, BoundingBox::new(80.0, 30.0, 320.0, 340.0));
    }

    #[test]
    fn test_right_and_bottom() {
        let b = BoundingBox::new(10.0, 20.0, 30.0, 40.0);
        assert_relative_eq!(b.right(), 40.0);
        assert_relative_eq!(b.bottom(), 60.0);
    }

    #[test]
    fn test_abs_deltas_are_symmetric() {
        let a = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let b = BoundingBox::new(103.0, 96.0, 210.0, 200.0);
        assert_eq!(a.abs_deltas(&b), [3.0, 4.0, 10.0, 0.0]);
        assert_eq!(b.abs_deltas(&a), a.abs_deltas(&b));
    }

    #[test]
    fn test_lerp_halfway() {
        let a = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        let b = BoundingBox::new(120.0, 80.0, 240.0, 200.0);
        assert_eq!(a.lerp(&b, 0.5), BoundingBox::new(110.0, 90.0, 220.0, 200.0));
    }

    #[rstest]
    #[case::zero_width(BoundingBox::new(0.0, 0.0, 0.0, 10.0), true)]
    #[case::negative_height(BoundingBox::new(0.0, 0.0, 10.0, -1.0), true)]
    #[case::nan(BoundingBox::new(0.0, 0.0, f64::NAN, 10.0), true)]
    #[case::positive(BoundingBox::new(0.0, 0.0, 1.0, 1.0), false)]
    fn test_is_degenerate(#[case] b: BoundingBox, #[case] expected: bool) {
        assert_eq!(b.is_degenerate(), expected);
    }

    // ── Clamping ─────────────────────────────────────────────────────

    #[test]
    fn test_clamp_negative_origin_to_zero() {
        let b = BoundingBox::new(-50.0, -10.0, 200.0, 200.0).clamp_to_frame(640.0, 480.0);
        assert_relative_eq!(b.origin_x, 0.0);
        assert_relative_eq!(b.origin_y, 0.0);
        assert_relative_eq!(b.width, 200.0);
    }

    #[test]
    fn test_clamp_pulls_back_right_edge() {
        let b = BoundingBox::new(500.0, 100.0, 200.0, 200.0).clamp_to_frame(640.0, 480.0);
        assert_relative_eq!(b.origin_x, 440.0);
        assert_relative_eq!(b.right(), 640.0);
    }

    #[test]
    fn test_clamp_pulls_back_bottom_edge() {
        let b = BoundingBox::new(100.0, 400.0, 200.0, 200.0).clamp_to_frame(640.0, 480.0);
        assert_relative_eq!(b.bottom(), 480.0);
    }

    #[test]
    fn test_clamp_inside_frame_is_identity() {
        let b = BoundingBox::new(100.0, 100.0, 200.0, 200.0);
        assert_eq!(b.clamp_to_frame(640.0, 480.0), b);
    }

    #[test]
    fn test_clamp_caps_box_larger_than_frame() {
        let b = BoundingBox::new(-100.0, -60.0, 900.0, 700.0).clamp_to_frame(640.0, 480.0);
        assert_eq!(b, BoundingBox::new(0.0, 0.0, 640.0, 480.0));
    }

    #[test]
    fn test_clamp_caps_only_the_oversized_side() {
        let b = BoundingBox::new(300.0, 100.0, 900.0, 200.0).clamp_to_frame(640.0, 480.0);
        assert_relative_eq!(b.origin_x, 0.0);
        assert_relative_eq!(b.width, 640.0);
        assert_relative_eq!(b.origin_y, 100.0);
        assert_relative_eq!(b.height, 200.0);
    }
}
