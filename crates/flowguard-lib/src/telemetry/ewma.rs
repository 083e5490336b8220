//! Exponentially weighted moving average

/// Smoothing constant used by every deployment of the pipeline
pub const DEFAULT_ALPHA: f64 = 0.6;

/// `ewma_t = α·u_t + (1-α)·ewma_{t-1}`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ewma {
    alpha: f64,
}

impl Ewma {
    /// Create a smoother; α outside (0, 1] is clamped, NaN falls back to the default
    pub fn new(alpha: f64) -> Self {
        let alpha = if alpha.is_nan() {
            DEFAULT_ALPHA
        } else {
            alpha.clamp(f64::MIN_POSITIVE, 1.0)
        };
        Self { alpha }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Next smoothed value; the first observation seeds the series unbiased
    pub fn next(&self, previous: Option<f64>, value: f64) -> f64 {
        match previous {
            None => value,
            Some(prev) => self.alpha * value + (1.0 - self.alpha) * prev,
        }
    }
}

impl Default for Ewma {
    fn default() -> Self {
        Self::new(DEFAULT_ALPHA)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_seeds_series() {
        let ewma = Ewma::default();
        assert_eq!(ewma.next(None, 0.42), 0.42);
    }

    #[test]
    fn test_recurrence() {
        let ewma = Ewma::new(0.6);
        let v = ewma.next(Some(0.5), 1.0);
        assert!((v - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_one_tracks_input() {
        let ewma = Ewma::new(1.0);
        assert_eq!(ewma.next(Some(0.1), 0.9), 0.9);
    }

    #[test]
    fn test_small_alpha_holds_previous() {
        let ewma = Ewma::new(1e-9);
        let v = ewma.next(Some(0.3), 1.0);
        assert!((v - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_convex_bounds() {
        let ewma = Ewma::new(0.35);
        let upper = 1.2;
        let inputs = [0.0, 1.2, 0.4, 0.9, 0.0, 1.1, 0.05, 1.2, 0.7];
        let mut state = None;
        for u in inputs {
            let v = ewma.next(state, u);
            assert!((0.0..=upper).contains(&v), "ewma {} escaped [0, {}]", v, upper);
            state = Some(v);
        }
    }

    #[test]
    fn test_alpha_clamped() {
        assert_eq!(Ewma::new(3.0).alpha(), 1.0);
        assert!(Ewma::new(-1.0).alpha() > 0.0);
        assert_eq!(Ewma::new(f64::NAN).alpha(), DEFAULT_ALPHA);
    }
}
