use crate::error::{FarmSmartError, Result};
use crate::schema::AnalyticsBundle;
use crate::utils::linear_series;
use log::debug;

/// Lowest profit (and projected profit) a chart will show.
pub const PROFIT_FLOOR: f64 = 50.0;
/// Lowest break-even point a chart will show.
pub const BREAK_EVEN_FLOOR: f64 = 500.0;
/// Number of weekly points in the projected-profit series.
pub const PROJECTION_WEEKS: usize = 6;
/// Final projected profit must reach this multiple of the break-even point.
pub const BREAK_EVEN_TARGET: f64 = 1.2;
/// Synthesized projections start no lower than this multiple of break-even.
pub const PROJECTION_START_SHARE: f64 = 0.5;
pub const REVENUE_MULTIPLIER: f64 = 1.5;
pub const REVENUE_MIN_MARGIN: f64 = 100.0;

#[derive(Debug, Clone, Default)]
pub struct NormalizationReport {
    pub adjustments: Vec<String>,
}

impl NormalizationReport {
    pub fn is_clean(&self) -> bool {
        self.adjustments.is_empty()
    }
}

fn floor_value(value: f64, floor: f64) -> f64 {
    if value.is_finite() {
        value.max(floor)
    } else {
        floor
    }
}

/// Repairs chart data so every invariant the charts rely on holds:
/// positive profits above the floor, revenue strictly above profit, a
/// six-point non-decreasing projection that ends at least 20% above the
/// floored break-even point. Applying it twice changes nothing.
pub struct ChartNormalizer;

impl ChartNormalizer {
    pub fn normalize(bundle: AnalyticsBundle) -> AnalyticsBundle {
        Self::normalize_with_report(bundle).0
    }

    pub fn normalize_with_report(bundle: AnalyticsBundle) -> (AnalyticsBundle, NormalizationReport) {
        let mut report = NormalizationReport::default();
        let AnalyticsBundle {
            mut tillage_names,
            mut profits,
            projected_profits,
            break_even_point,
            ..
        } = bundle;

        if tillage_names.len() != profits.len() {
            let len = tillage_names.len().min(profits.len());
            report.adjustments.push(format!(
                "Trimmed {} names / {} profits to {} parallel entries",
                tillage_names.len(),
                profits.len(),
                len
            ));
            tillage_names.truncate(len);
            profits.truncate(len);
        }

        for (name, profit) in tillage_names.iter().zip(profits.iter_mut()) {
            let floored = floor_value(*profit, PROFIT_FLOOR);
            if floored != *profit {
                report
                    .adjustments
                    .push(format!("Raised profit for '{}' from {} to {}", name, profit, floored));
                *profit = floored;
            }
        }

        let revenue: Vec<f64> = profits.iter().map(|p| revenue_for(*p)).collect();

        let floored_break_even = floor_value(break_even_point, BREAK_EVEN_FLOOR);
        if floored_break_even != break_even_point {
            report.adjustments.push(format!(
                "Raised break-even point from {} to {}",
                break_even_point, floored_break_even
            ));
        }

        let projected_profits =
            Self::repair_projection(projected_profits, floored_break_even, &mut report);

        for adjustment in &report.adjustments {
            debug!("Chart normalization: {}", adjustment);
        }

        (
            AnalyticsBundle {
                tillage_names,
                profits,
                revenue,
                projected_profits,
                break_even_point: floored_break_even,
            },
            report,
        )
    }

    fn repair_projection(
        projected: Vec<f64>,
        break_even_point: f64,
        report: &mut NormalizationReport,
    ) -> Vec<f64> {
        let target = break_even_point * BREAK_EVEN_TARGET;
        let reaches_target = projected.len() == PROJECTION_WEEKS
            && projected
                .last()
                .is_some_and(|last| last.is_finite() && *last >= target);

        if reaches_target {
            let mut running = PROFIT_FLOOR;
            let repaired: Vec<f64> = projected
                .iter()
                .map(|value| {
                    running = running.max(floor_value(*value, PROFIT_FLOOR));
                    running
                })
                .collect();
            if repaired != projected {
                report
                    .adjustments
                    .push("Raised projected profits to a non-decreasing series above the floor".to_string());
            }
            return repaired;
        }

        let first = projected
            .first()
            .copied()
            .filter(|value| value.is_finite())
            .unwrap_or(PROFIT_FLOOR);
        let start = first
            .max(break_even_point * PROJECTION_START_SHARE)
            .max(PROFIT_FLOOR)
            .min(target);

        report.adjustments.push(format!(
            "Replaced projected profits ({} points) with a linear ramp from {} to {}",
            projected.len(),
            start,
            target
        ));
        linear_series(start, target, PROJECTION_WEEKS)
    }

    /// Checks the invariants without changing anything.
    pub fn verify(bundle: &AnalyticsBundle) -> Result<()> {
        let violation = |details: String| Err(FarmSmartError::InvariantViolation(details));

        if bundle.tillage_names.len() != bundle.profits.len()
            || bundle.profits.len() != bundle.revenue.len()
        {
            return violation(format!(
                "Parallel series differ in length: {} names, {} profits, {} revenue",
                bundle.tillage_names.len(),
                bundle.profits.len(),
                bundle.revenue.len()
            ));
        }

        for (i, (profit, revenue)) in bundle.profits.iter().zip(&bundle.revenue).enumerate() {
            if !(*profit >= PROFIT_FLOOR) {
                return violation(format!("Profit #{} ({}) is below {}", i, profit, PROFIT_FLOOR));
            }
            if !(revenue > profit) {
                return violation(format!(
                    "Revenue #{} ({}) does not exceed profit ({})",
                    i, revenue, profit
                ));
            }
        }

        if !(bundle.break_even_point >= BREAK_EVEN_FLOOR) {
            return violation(format!(
                "Break-even point {} is below {}",
                bundle.break_even_point, BREAK_EVEN_FLOOR
            ));
        }

        if bundle.projected_profits.len() != PROJECTION_WEEKS {
            return violation(format!(
                "Expected {} projected profits, got {}",
                PROJECTION_WEEKS,
                bundle.projected_profits.len()
            ));
        }

        if bundle.projected_profits.windows(2).any(|w| w[1] < w[0]) {
            return violation("Projected profits decrease".to_string());
        }

        let target = bundle.break_even_point * BREAK_EVEN_TARGET;
        match bundle.projected_profits.last() {
            Some(last) if *last >= target => Ok(()),
            Some(last) => violation(format!(
                "Final projected profit {} is below {} (break-even x {})",
                last, target, BREAK_EVEN_TARGET
            )),
            None => violation("Projected profits are empty".to_string()),
        }
    }
}

fn revenue_for(profit: f64) -> f64 {
    (profit * REVENUE_MULTIPLIER).max(profit + REVENUE_MIN_MARGIN)
}

pub fn normalize_analytics(bundle: AnalyticsBundle) -> AnalyticsBundle {
    ChartNormalizer::normalize(bundle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(profits: Vec<f64>, projected: Vec<f64>, break_even_point: f64) -> AnalyticsBundle {
        AnalyticsBundle {
            tillage_names: (0..profits.len()).map(|i| format!("Tool {}", i)).collect(),
            revenue: profits.clone(),
            profits,
            projected_profits: projected,
            break_even_point,
        }
    }

    #[test]
    fn test_floors_and_revenue_margin() {
        let raw = bundle(vec![10.0, -5.0, 400.0], vec![], 100.0);
        let normalized = ChartNormalizer::normalize(raw);

        assert_eq!(normalized.profits, vec![50.0, 50.0, 400.0]);
        assert_eq!(normalized.revenue, vec![150.0, 150.0, 600.0]);
        assert_eq!(normalized.break_even_point, 500.0);
        assert!(ChartNormalizer::verify(&normalized).is_ok());
    }

    #[test]
    fn test_short_projection_is_synthesized() {
        let raw = bundle(vec![120.0], vec![100.0, 200.0], 2500.0);
        let normalized = ChartNormalizer::normalize(raw);

        assert_eq!(normalized.projected_profits.len(), PROJECTION_WEEKS);
        // starts at max(100, 2500 * 0.5, 50)
        assert_eq!(normalized.projected_profits[0], 1250.0);
        assert_eq!(normalized.projected_profits[5], 3000.0);
        assert!(ChartNormalizer::verify(&normalized).is_ok());
    }

    #[test]
    fn test_projection_below_target_is_replaced() {
        let raw = bundle(
            vec![120.0],
            vec![200.0, 280.0, 360.0, 440.0, 520.0, 600.0],
            2500.0,
        );
        let normalized = ChartNormalizer::normalize(raw);
        assert_eq!(normalized.projected_profits[0], 1250.0);
        assert_eq!(normalized.projected_profits[5], 3000.0);
    }

    #[test]
    fn test_valid_projection_is_kept() {
        let projected = vec![700.0, 800.0, 900.0, 1000.0, 1100.0, 1200.0];
        let raw = bundle(vec![120.0], projected.clone(), 900.0);
        let (normalized, report) = ChartNormalizer::normalize_with_report(raw);
        assert_eq!(normalized.projected_profits, projected);
        assert_eq!(normalized.break_even_point, 900.0);
        assert!(report.adjustments.is_empty());
    }

    #[test]
    fn test_dips_are_flattened() {
        let raw = bundle(
            vec![120.0],
            vec![30.0, 900.0, 800.0, 1000.0, 1100.0, 1300.0],
            1000.0,
        );
        let normalized = ChartNormalizer::normalize(raw);
        assert_eq!(
            normalized.projected_profits,
            vec![50.0, 900.0, 900.0, 1000.0, 1100.0, 1300.0]
        );
    }

    #[test]
    fn test_decreasing_start_above_target() {
        let raw = bundle(
            vec![120.0],
            vec![5000.0, 4000.0, 3000.0, 2000.0, 1000.0, 500.0],
            1000.0,
        );
        let normalized = ChartNormalizer::normalize(raw);
        assert!(normalized
            .projected_profits
            .iter()
            .all(|value| (*value - 1200.0).abs() < 1e-9));
        assert!(ChartNormalizer::verify(&normalized).is_ok());
    }

    #[test]
    fn test_idempotent() {
        let inputs = vec![
            bundle(vec![10.0, 95.0, 1e6], vec![1.0, 2.0], 42.0),
            bundle(vec![120.0, 95.0], vec![200.0, 280.0, 360.0, 440.0, 520.0, 600.0], 2500.0),
            bundle(vec![300.0], vec![f64::NAN; 6], f64::INFINITY),
            bundle(vec![60.0], vec![700.0, 650.0, 900.0, 1000.0, 1100.0, 1300.0], 1000.0),
        ];

        for input in inputs {
            let once = ChartNormalizer::normalize(input);
            let twice = ChartNormalizer::normalize(once.clone());
            assert_eq!(once, twice);
            assert!(ChartNormalizer::verify(&once).is_ok());
        }
    }

    #[test]
    fn test_mismatched_lengths_are_trimmed() {
        let mut raw = bundle(vec![120.0, 130.0], vec![], 600.0);
        raw.tillage_names.push("Extra".to_string());
        let normalized = ChartNormalizer::normalize(raw);
        assert_eq!(normalized.tillage_names.len(), 2);
        assert_eq!(normalized.revenue.len(), 2);
    }

    #[test]
    fn test_verify_rejects_raw_model_output() {
        let raw = bundle(vec![120.0], vec![1.0; 6], 600.0);
        assert!(ChartNormalizer::verify(&raw).is_err());
    }
}
