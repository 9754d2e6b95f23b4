use crate::domain::company::{Benchmark, Fundamentals};
use crate::domain::ratio::{PerRatio, Ratio};
use crate::numeric::round_to;
use crate::valuation::config::ScoringConfig;
use crate::valuation::indicator::Indicator;
use crate::valuation::signal::Signal;
use serde::Serialize;

/// Indicators, score and signal for one (fundamentals, benchmark) pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValuationReport {
    pub indicators: PerRatio<Indicator>,
    pub contributions: PerRatio<i8>,
    pub score: f64,
    pub final_signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricExplanation {
    pub company_value: Option<f64>,
    pub benchmark_value: Option<f64>,
    /// `(company - benchmark) / benchmark` in percent, two decimals.
    pub deviation_percent: Option<f64>,
    pub contribution: i8,
    pub indicator: Indicator,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub details: PerRatio<MetricExplanation>,
    pub config: ScoringConfig,
    pub report: ValuationReport,
}

impl ScoringConfig {
    pub fn indicators(&self, fundamentals: &Fundamentals, benchmark: &Benchmark) -> PerRatio<Indicator> {
        PerRatio::from_fn(|ratio| {
            self.indicator_for(
                ratio,
                fundamentals.values().get(ratio),
                benchmark.values().get(ratio),
            )
        })
    }

    pub fn score(&self, fundamentals: &Fundamentals, benchmark: &Benchmark) -> f64 {
        self.weighted_score(&self.indicators(fundamentals, benchmark))
    }

    pub fn analyze(&self, fundamentals: &Fundamentals, benchmark: &Benchmark) -> ValuationReport {
        let indicators = self.indicators(fundamentals, benchmark);
        let score = self.weighted_score(&indicators);
        let final_signal = self.classify(score);

        tracing::debug!(
            ticker = fundamentals.ticker(),
            sector = benchmark.sector(),
            score,
            %final_signal,
            "valuation scored"
        );

        ValuationReport {
            indicators,
            contributions: PerRatio::from_fn(|r| indicators.get(r).contribution()),
            score,
            final_signal,
        }
    }

    pub fn explain(&self, fundamentals: &Fundamentals, benchmark: &Benchmark) -> ScoreExplanation {
        let report = self.analyze(fundamentals, benchmark);
        let details = PerRatio::from_fn(|ratio| {
            let company_value = fundamentals.values().get(ratio);
            let benchmark_value = benchmark.values().get(ratio);
            let deviation_percent = match (company_value, benchmark_value) {
                (Some(c), Some(b)) if b != 0.0 => Some(round_to(((c - b) / b) * 100.0, 2)),
                _ => None,
            };
            let indicator = report.indicators.get(ratio);

            MetricExplanation {
                company_value,
                benchmark_value,
                deviation_percent,
                contribution: indicator.contribution(),
                indicator,
                weight: self.weights.get(ratio),
            }
        });

        ScoreExplanation {
            details,
            config: *self,
            report,
        }
    }

    fn weighted_score(&self, indicators: &PerRatio<Indicator>) -> f64 {
        let raw: f64 = Ratio::ALL
            .iter()
            .map(|r| self.weights.get(*r) * f64::from(indicators.get(*r).contribution()))
            .sum();
        // Three decimals is enough to keep every weight combination exact and removes float
        // noise right at the signal threshold.
        round_to(raw, 3)
    }
}

/// Composite score with the default weights.
pub fn score(fundamentals: &Fundamentals, benchmark: &Benchmark) -> f64 {
    ScoringConfig::default().score(fundamentals, benchmark)
}

pub fn analyze(fundamentals: &Fundamentals, benchmark: &Benchmark) -> ValuationReport {
    ScoringConfig::default().analyze(fundamentals, benchmark)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ratio::RatioValues;
    use crate::valuation::config::Weights;

    /// Every score the default weights can produce: all 27 mixes of -1/0/+1 per metric.
    fn reachable_scores() -> Vec<f64> {
        let w = Weights::default();
        let mut scores = Vec::new();
        for pe in [-1.0, 0.0, 1.0] {
            for pb in [-1.0, 0.0, 1.0] {
                for roe in [-1.0, 0.0, 1.0] {
                    let s = round_to(w.pe * pe + w.pb * pb + w.roe * roe, 3);
                    if !scores.contains(&s) {
                        scores.push(s);
                    }
                }
            }
        }
        scores.sort_by(f64::total_cmp);
        scores
    }

    fn fundamentals(pe: Option<f64>, pb: Option<f64>, roe: Option<f64>) -> Fundamentals {
        Fundamentals::try_new("TEST", "Technology", RatioValues::new(pe, pb, roe)).unwrap()
    }

    fn benchmark(pe: Option<f64>, pb: Option<f64>, roe: Option<f64>) -> Benchmark {
        Benchmark::try_new("Technology", vec![], RatioValues::new(pe, pb, roe)).unwrap()
    }

    #[test]
    fn end_to_end_example() {
        let f = fundamentals(Some(28.5), Some(12.3), Some(18.7));
        let b = benchmark(Some(25.2), Some(10.1), Some(16.5));
        let report = analyze(&f, &b);

        assert_eq!(report.indicators.pe, Indicator::FairlyValued);
        assert_eq!(report.indicators.pb, Indicator::Overvalued);
        assert_eq!(report.indicators.roe, Indicator::FairlyValued);
        assert_eq!(report.contributions.pb, -1);
        assert_eq!(report.score, -0.3);
        assert_eq!(report.final_signal, Signal::Overvalued);
    }

    #[test]
    fn roe_direction_is_flipped() {
        let b = benchmark(Some(20.0), Some(5.0), Some(10.0));
        assert_eq!(score(&fundamentals(None, None, Some(15.0)), &b), 0.2);
        assert_eq!(score(&fundamentals(None, None, Some(5.0)), &b), -0.2);
        assert_eq!(score(&fundamentals(Some(10.0), None, None), &b), 0.5);
        assert_eq!(score(&fundamentals(None, Some(10.0), None), &b), -0.3);
    }

    #[test]
    fn missing_data_is_neutral() {
        let b = benchmark(Some(20.0), Some(5.0), Some(10.0));
        let report = analyze(&fundamentals(None, None, None), &b);
        assert_eq!(report.score, 0.0);
        assert_eq!(report.final_signal, Signal::FairlyValued);
        assert_eq!(report.indicators.pe, Indicator::NotAvailable);

        let empty_benchmark = benchmark(None, Some(0.0), None);
        let report = analyze(&fundamentals(Some(5.0), Some(1.0), Some(30.0)), &empty_benchmark);
        assert_eq!(report.score, 0.0);
    }

    #[test]
    fn reachable_scores_are_the_nineteen_tenths() {
        let scores = reachable_scores();
        assert_eq!(scores.len(), 19);
        for s in [-0.6, -0.4, -0.1, 0.1, 0.4, 0.6] {
            assert!(scores.contains(&s), "{s} missing from {scores:?}");
        }
        assert!(!scores.contains(&0.9));
        assert!(!scores.contains(&-0.9));
    }

    #[test]
    fn score_is_closed_over_all_combinations() {
        let reachable = reachable_scores();
        let mut seen = Vec::new();
        // Company values that land a metric in each of the three bands against 100.
        let bands = [Some(50.0), Some(100.0), Some(150.0), None];
        let b = benchmark(Some(100.0), Some(100.0), Some(100.0));

        for pe in bands {
            for pb in bands {
                for roe in bands {
                    let s = score(&fundamentals(pe, pb, roe), &b);
                    assert!(
                        reachable.contains(&s),
                        "score {s} outside the closed set for {pe:?}/{pb:?}/{roe:?}"
                    );
                    if !seen.contains(&s) {
                        seen.push(s);
                    }
                }
            }
        }
        assert_eq!(seen.len(), reachable.len());
    }

    #[test]
    fn strongest_cases_hit_the_extremes() {
        let b = benchmark(Some(100.0), Some(100.0), Some(100.0));
        assert_eq!(score(&fundamentals(Some(50.0), Some(50.0), Some(150.0)), &b), 1.0);
        assert_eq!(score(&fundamentals(Some(150.0), Some(150.0), Some(50.0)), &b), -1.0);
        assert_eq!(score(&fundamentals(Some(50.0), Some(150.0), Some(100.0)), &b), 0.2);
        assert_eq!(
            analyze(&fundamentals(Some(50.0), Some(150.0), Some(100.0)), &b).final_signal,
            Signal::Undervalued
        );
    }

    #[test]
    fn explanation_reports_deviation_and_weights() {
        let f = fundamentals(Some(28.5), Some(12.3), None);
        let b = benchmark(Some(25.2), Some(10.1), Some(16.5));
        let e = ScoringConfig::default().explain(&f, &b);

        assert_eq!(e.details.pe.deviation_percent, Some(13.1));
        assert_eq!(e.details.pb.deviation_percent, Some(21.78));
        assert_eq!(e.details.roe.deviation_percent, None);
        assert_eq!(e.details.roe.indicator, Indicator::NotAvailable);
        assert_eq!(e.details.pe.weight, 0.5);
        assert_eq!(e.report.score, -0.3);
    }
}
