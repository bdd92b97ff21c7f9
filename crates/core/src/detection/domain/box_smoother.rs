use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::{DEFAULT_ALPHA, DEFAULT_MARGIN, DEFAULT_THRESHOLD};

/// Tuning for [`smooth`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmoothingParams {
    /// Pixels added on every side of the raw detection.
    pub margin: f64,
    /// Dead zone: the box only moves when some field changes by at least this much.
    pub threshold: f64,
    /// Exponential smoothing factor in `[0, 1]`.
    pub alpha: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            margin: DEFAULT_MARGIN,
            threshold: DEFAULT_THRESHOLD,
            alpha: DEFAULT_ALPHA,
        }
    }
}

/// Smoothing history for the single spotlight slot.
///
/// `last` is always replaced as a whole. It holds the committed box before
/// frame clamping, so a box that was capped for display keeps its true size
/// as the baseline for the next frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SmootherState {
    pub last: BoundingBox,
    pub is_first_frame: bool,
}

impl Default for SmootherState {
    fn default() -> Self {
        Self {
            last: BoundingBox::default(),
            is_first_frame: true,
        }
    }
}

/// Turns one raw detection into a stable display box.
///
/// The first call of a run takes the margin-expanded detection as-is. Later
/// calls freeze the box unless at least one of x, y, width or height moved
/// by `threshold` or more, in which case all four fields move `alpha` of the
/// way towards the detection. The result is committed as the new baseline
/// and then fitted inside the frame.
pub fn smooth(
    params: &SmoothingParams,
    raw: &BoundingBox,
    frame_width: f64,
    frame_height: f64,
    state: SmootherState,
) -> (BoundingBox, SmootherState) {
    let expanded = raw.expand(params.margin);

    let committed = if state.is_first_frame {
        expanded
    } else if exceeds_threshold(&expanded, &state.last, params.threshold) {
        state.last.lerp(&expanded, params.alpha)
    } else {
        state.last
    };

    let next = SmootherState {
        last: committed,
        is_first_frame: false,
    };
    (committed.clamp_to_frame(frame_width, frame_height), next)
}

fn exceeds_threshold(candidate: &BoundingBox, last: &BoundingBox, threshold: f64) -> bool {
    candidate
        .abs_deltas(last)
        .iter()
        .any(|&delta| delta >= threshold)
}

/// Domain interface for the stateful smoother driven by the frame loop.
pub trait BoxSmootherInterface: Send {
    fn smooth(&mut self, raw: &BoundingBox, frame_width: f64, frame_height: f64) -> BoundingBox;

    /// Forgets all history; the next call is treated as a first frame.
    fn reset(&mut self);

    fn state(&self) -> SmootherState;
}

/// Owns a [`SmootherState`] and threads it through [`smooth`].
///
/// Every detection passed in updates the one shared state. Feeding several
/// detections per frame therefore leaves the state on whichever came last.
pub struct BoxSmoother {
    params: SmoothingParams,
    state: SmootherState,
}

impl BoxSmoother {
    pub fn new(params: SmoothingParams) -> Self {
        Self {
            params,
            state: SmootherState::default(),
        }
    }
}

impl Default for BoxSmoother {
    fn default() -> Self {
        Self::new(SmoothingParams::default())
    }
}

impl BoxSmootherInterface for BoxSmoother {
    fn smooth(&mut self, raw: &BoundingBox, frame_width: f64, frame_height: f64) -> BoundingBox {
        let (display, next) = smooth(&self.params, raw, frame_width, frame_height, self.state);
        self.state = next;
        display
    }

    fn reset(&mut self) {
        self.state = SmootherState::default();
    }

    fn state(&self) -> SmootherState {
        self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    const FW: f64 = 640.0;
    const FH: f64 = 480.0;

    fn params() -> SmoothingParams {
        SmoothingParams::default()
    }

    fn state_at(x: f64, y: f64, w: f64, h: f64) -> SmootherState {
        SmootherState {
            last: BoundingBox::new(x, y, w, h),
            is_first_frame: false,
        }
    }

    /// Raw detection whose margin-expanded form is `(x, y, w, h)`.
    fn raw_expanding_to(x: f64, y: f64, w: f64, h: f64) -> BoundingBox {
        let m = DEFAULT_MARGIN;
        BoundingBox::new(x + m, y + m, w - 2.0 * m, h - 2.0 * m)
    }

    #[test]
    fn test_defaults() {
        let p = SmoothingParams::default();
        assert_relative_eq!(p.margin, 120.0);
        assert_relative_eq!(p.threshold, 5.0);
        assert_relative_eq!(p.alpha, 0.5);
        assert!(SmootherState::default().is_first_frame);
    }

    // ── First frame ──────────────────────────────────────────────────

    #[test]
    fn test_first_frame_returns_expanded_box() {
        let raw = BoundingBox::new(200.0, 150.0, 100.0, 120.0);
        let (display, next) = smooth(&params(), &raw, FW, FH, SmootherState::default());

        assert_eq!(display, BoundingBox::new(80.0, 30.0, 340.0, 360.0));
        assert_eq!(next.last, display);
        assert!(!next.is_first_frame);
    }

    #[test]
    fn test_first_frame_is_clamped_but_commits_unclamped() {
        let raw = BoundingBox::new(50.0, 60.0, 100.0, 100.0);
        let (display, next) = smooth(&params(), &raw, FW, FH, SmootherState::default());

        assert_relative_eq!(display.origin_x, 0.0);
        assert_relative_eq!(display.origin_y, 0.0);
        assert_relative_eq!(next.last.origin_x, -70.0);
        assert_relative_eq!(next.last.origin_y, -60.0);
    }

    // ── Dead zone ────────────────────────────────────────────────────

    #[test]
    fn test_sub_threshold_change_freezes() {
        let state = state_at(100.0, 100.0, 200.0, 200.0);
        let raw = raw_expanding_to(103.0, 103.0, 203.0, 203.0);
        let (display, next) = smooth(&params(), &raw, FW, FH, state);

        assert_eq!(display, BoundingBox::new(100.0, 100.0, 200.0, 200.0));
        assert_eq!(next, state);
    }

    #[rstest]
    #[case::x(105.0, 100.0, 200.0, 200.0)]
    #[case::y(100.0, 95.0, 200.0, 200.0)]
    #[case::width(100.0, 100.0, 205.0, 200.0)]
    #[case::height(100.0, 100.0, 200.0, 195.0)]
    fn test_change_equal_to_threshold_moves(
        #[case] x: f64,
        #[case] y: f64,
        #[case] w: f64,
        #[case] h: f64,
    ) {
        let state = state_at(100.0, 100.0, 200.0, 200.0);
        let (_, next) = smooth(&params(), &raw_expanding_to(x, y, w, h), FW, FH, state);
        assert_ne!(next.last, state.last);
    }

    // ── Smoothing ────────────────────────────────────────────────────

    #[test]
    fn test_over_threshold_moves_halfway() {
        let state = state_at(100.0, 100.0, 200.0, 200.0);
        let raw = raw_expanding_to(120.0, 100.0, 200.0, 200.0);
        let (display, next) = smooth(&params(), &raw, FW, FH, state);

        assert_relative_eq!(display.origin_x, 110.0);
        assert_relative_eq!(display.origin_y, 100.0);
        assert_relative_eq!(display.width, 200.0);
        assert_relative_eq!(display.height, 200.0);
        assert_eq!(next.last, display);
    }

    #[test]
    fn test_one_field_over_threshold_smooths_all_fields() {
        let state = state_at(100.0, 100.0, 200.0, 200.0);
        // x moves 20, the rest stay under the dead zone
        let raw = raw_expanding_to(120.0, 103.0, 202.0, 196.0);
        let (display, _) = smooth(&params(), &raw, FW, FH, state);

        assert_relative_eq!(display.origin_x, 110.0);
        assert_relative_eq!(display.origin_y, 101.5);
        assert_relative_eq!(display.width, 201.0);
        assert_relative_eq!(display.height, 198.0);
    }

    #[test]
    fn test_custom_alpha() {
        let p = SmoothingParams {
            alpha: 0.25,
            ..SmoothingParams::default()
        };
        let state = state_at(100.0, 100.0, 200.0, 200.0);
        let raw = raw_expanding_to(140.0, 100.0, 200.0, 200.0);
        let (display, _) = smooth(&p, &raw, FW, FH, state);
        assert_relative_eq!(display.origin_x, 110.0);
    }

    #[test]
    fn test_repeated_input_settles_then_freezes() {
        let raw = BoundingBox::new(250.0, 200.0, 80.0, 80.0);
        let mut state = state_at(100.0, 100.0, 200.0, 200.0);
        let mut outputs = Vec::new();
        for _ in 0..20 {
            let (display, next) = smooth(&params(), &raw, FW, FH, state);
            outputs.push(display);
            state = next;
        }
        let last = outputs[outputs.len() - 1];
        assert_eq!(outputs[outputs.len() - 2], last);
        let residual = last.abs_deltas(&raw.expand(DEFAULT_MARGIN));
        assert!(residual.iter().all(|&d| d < DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_same_raw_after_first_frame_is_fixed_point() {
        let raw = BoundingBox::new(200.0, 150.0, 100.0, 100.0);
        let (first, mut state) = smooth(&params(), &raw, FW, FH, SmootherState::default());
        for _ in 0..5 {
            let (display, next) = smooth(&params(), &raw, FW, FH, state);
            assert_eq!(display, first);
            state = next;
        }
    }

    // ── Clamping ─────────────────────────────────────────────────────

    #[test]
    fn test_negative_x_clamped_to_zero() {
        let raw = raw_expanding_to(-50.0, 100.0, 200.0, 200.0);
        let (display, _) = smooth(&params(), &raw, FW, FH, SmootherState::default());
        assert_relative_eq!(display.origin_x, 0.0);
    }

    #[test]
    fn test_right_edge_clamped_to_frame() {
        let raw = raw_expanding_to(500.0, 100.0, 200.0, 200.0);
        let (display, _) = smooth(&params(), &raw, FW, FH, SmootherState::default());
        assert_relative_eq!(display.origin_x + display.width, 640.0);
    }

    #[test]
    fn test_box_larger_than_frame_is_capped() {
        let raw = BoundingBox::new(100.0, 50.0, 600.0, 500.0);
        let (display, next) = smooth(&params(), &raw, FW, FH, SmootherState::default());

        assert_eq!(display, BoundingBox::new(0.0, 0.0, 640.0, 480.0));
        assert_relative_eq!(next.last.width, 840.0);
        assert_relative_eq!(next.last.height, 740.0);
    }

    // ── Stateful wrapper ─────────────────────────────────────────────

    #[test]
    fn test_box_smoother_tracks_state() {
        let mut smoother = BoxSmoother::default();
        smoother.smooth(&BoundingBox::new(220.0, 220.0, 80.0, 80.0), FW, FH);
        assert!(!smoother.state().is_first_frame);

        let display = smoother.smooth(&BoundingBox::new(240.0, 220.0, 80.0, 80.0), FW, FH);
        assert_relative_eq!(display.origin_x, 110.0);
    }

    #[test]
    fn test_box_smoother_reset_restores_first_frame() {
        let mut smoother = BoxSmoother::default();
        smoother.smooth(&BoundingBox::new(220.0, 220.0, 80.0, 80.0), FW, FH);
        smoother.reset();
        assert_eq!(smoother.state(), SmootherState::default());

        let raw = BoundingBox::new(300.0, 200.0, 80.0, 80.0);
        let display = smoother.smooth(&raw, FW, FH);
        assert_eq!(display, raw.expand(DEFAULT_MARGIN));
    }

    #[test]
    fn test_last_detection_wins_shared_state() {
        let mut smoother = BoxSmoother::default();
        smoother.smooth(&BoundingBox::new(150.0, 150.0, 80.0, 80.0), FW, FH);
        smoother.smooth(&BoundingBox::new(350.0, 150.0, 80.0, 80.0), FW, FH);
        // 30 + 0.5 * (230 - 30)
        assert_relative_eq!(smoother.state().last.origin_x, 130.0);
    }
}
