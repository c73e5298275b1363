// =============================================================================
// Position Sizer — volatility targeting with a velocity conviction multiplier
// =============================================================================
//
//   1. volatility == 0           -> 0.01 floor
//   2. velocity > 0              -> target risk ×1.5
//      velocity < 0              -> target risk ×0.5
//   3. position value            =  budget × (adjusted risk / volatility)
//   4. cap                       =  budget × (0.15 if velocity > 2 else 0.10)
//   5. shares                    =  floor(min(value, cap) / price)
//
// The cap is applied after the velocity multiplier, so high-conviction trades
// are still bounded by the ceiling.
// =============================================================================

use tracing::debug;

const VOLATILITY_FLOOR: f64 = 0.01;
const ACCELERATING_MULTIPLIER: f64 = 1.5;
const DECELERATING_MULTIPLIER: f64 = 0.5;
const BASE_MAX_FRACTION: f64 = 0.10;
const HIGH_CONVICTION_MAX_FRACTION: f64 = 0.15;
const HIGH_CONVICTION_VELOCITY: i64 = 2;

/// Sizes positions out of a fixed risk bucket.
#[derive(Debug, Clone, Copy)]
pub struct PositionSizer {
    /// Capital bucket, e.g. 10 000.
    pub risk_budget: f64,
    /// Fraction of the bucket at risk per trade, e.g. 0.02.
    pub target_risk_fraction: f64,
}

impl PositionSizer {
    pub fn new(risk_budget: f64, target_risk_fraction: f64) -> Self {
        Self {
            risk_budget,
            target_risk_fraction,
        }
    }

    /// Target risk after the velocity multiplier.
    pub fn adjusted_risk(&self, velocity: i64) -> f64 {
        match velocity.signum() {
            1 => self.target_risk_fraction * ACCELERATING_MULTIPLIER,
            -1 => self.target_risk_fraction * DECELERATING_MULTIPLIER,
            _ => self.target_risk_fraction,
        }
    }

    /// Position value before the ceiling is applied.
    pub fn uncapped_value(&self, volatility: f64, velocity: i64) -> f64 {
        let vol = if volatility == 0.0 {
            VOLATILITY_FLOOR
        } else {
            volatility
        };
        self.risk_budget * (self.adjusted_risk(velocity) / vol)
    }

    pub fn max_fraction(velocity: i64) -> f64 {
        if velocity > HIGH_CONVICTION_VELOCITY {
            HIGH_CONVICTION_MAX_FRACTION
        } else {
            BASE_MAX_FRACTION
        }
    }

    /// Whole shares to buy at `price`. A non-positive price sizes to zero.
    pub fn size(&self, volatility: f64, velocity: i64, price: f64) -> u64 {
        if price <= 0.0 || !price.is_finite() {
            return 0;
        }

        let uncapped = self.uncapped_value(volatility, velocity);
        let cap = self.risk_budget * Self::max_fraction(velocity);
        let position_value = if uncapped > cap { cap } else { uncapped };

        let shares = (position_value / price).floor();
        let shares = if shares.is_finite() && shares > 0.0 {
            shares as u64
        } else {
            0
        };

        debug!(
            volatility,
            velocity,
            price,
            uncapped,
            cap,
            shares,
            "position sized"
        );
        shares
    }
}

/// Standard deviation of close-to-close returns over the window (sample
/// estimator). `None` when fewer than two returns are available.
pub fn daily_return_volatility(closes: &[f64]) -> Option<f64> {
    let returns: Vec<f64> = closes
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[0].is_finite() && w[1].is_finite())
        .map(|w| w[1] / w[0] - 1.0)
        .collect();

    if returns.len() < 2 {
        return None;
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let std = var.sqrt();
    std.is_finite().then_some(std)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_flat_velocity_hits_base_cap() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        assert!((sizer.adjusted_risk(0) - 0.02).abs() < 1e-12);
        assert!((sizer.uncapped_value(0.04, 0) - 5000.0).abs() < 1e-9);
        assert_eq!(sizer.size(0.04, 0, 100.0), 10);
    }

    #[test]
    fn scenario_high_velocity_hits_raised_cap() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        assert!((sizer.adjusted_risk(3) - 0.03).abs() < 1e-12);
        assert!((sizer.uncapped_value(0.04, 3) - 7500.0).abs() < 1e-9);
        assert_eq!(sizer.size(0.04, 3, 100.0), 15);
    }

    #[test]
    fn zero_volatility_uses_floor() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        assert!((sizer.uncapped_value(0.0, 0) - 20_000.0).abs() < 1e-9);
        assert_eq!(sizer.size(0.0, 0, 100.0), 10);
    }

    #[test]
    fn higher_volatility_means_fewer_shares() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        let a = sizer.size(0.25, 0, 1.0);
        let b = sizer.size(0.5, 0, 1.0);
        let c = sizer.size(1.0, 0, 1.0);
        assert!(a > b && b > c, "{a} {b} {c}");
    }

    #[test]
    fn positive_velocity_raises_precap_value() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        assert!(sizer.uncapped_value(0.5, 1) > sizer.uncapped_value(0.5, 0));
        assert!(sizer.uncapped_value(0.5, -1) < sizer.uncapped_value(0.5, 0));
    }

    #[test]
    fn capped_output_is_exactly_the_ceiling() {
        let cases = [
            (10_000.0, 0.02, 0.01, 0, 37.5),
            (25_000.0, 0.05, 0.02, 5, 3.0),
            (12_345.0, 0.02, 0.001, 1, 250.0),
            (5_000.0, 0.02, 0.04, 3, 100.0),
        ];
        for (budget, risk, vol, velocity, price) in cases {
            let sizer = PositionSizer::new(budget, risk);
            let fraction = PositionSizer::max_fraction(velocity);
            assert!(sizer.uncapped_value(vol, velocity) > budget * fraction);
            let expected = (budget * fraction / price).floor() as u64;
            assert_eq!(sizer.size(vol, velocity, price), expected);
        }
    }

    #[test]
    fn velocity_of_exactly_two_keeps_base_cap() {
        assert!((PositionSizer::max_fraction(2) - 0.10).abs() < f64::EPSILON);
        assert!((PositionSizer::max_fraction(3) - 0.15).abs() < f64::EPSILON);
    }

    #[test]
    fn invalid_price_sizes_to_zero() {
        let sizer = PositionSizer::new(10_000.0, 0.02);
        assert_eq!(sizer.size(0.04, 0, 0.0), 0);
        assert_eq!(sizer.size(0.04, 0, -5.0), 0);
    }

    #[test]
    fn volatility_of_constant_series_is_zero() {
        let vol = daily_return_volatility(&[10.0, 10.0, 10.0, 10.0]).unwrap();
        assert_eq!(vol, 0.0);
    }

    #[test]
    fn volatility_matches_sample_std_dev() {
        // returns: +10%, -10%  -> mean 0, sample var = (0.01 + 0.01) / 1
        let vol = daily_return_volatility(&[100.0, 110.0, 99.0]).unwrap();
        assert!((vol - 0.02_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn volatility_needs_two_returns() {
        assert_eq!(daily_return_volatility(&[100.0, 101.0]), None);
        assert_eq!(daily_return_volatility(&[]), None);
    }
}
