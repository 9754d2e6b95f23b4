use crate::domain::ratio::{Polarity, Ratio};
use crate::valuation::config::ScoringConfig;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-metric valuation label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Indicator {
    Undervalued,
    #[serde(rename = "Fairly valued")]
    FairlyValued,
    Overvalued,
    #[serde(rename = "N/A")]
    NotAvailable,
}

impl Indicator {
    /// Signed contribution to the composite score. Missing data is neutral.
    pub fn contribution(self) -> i8 {
        match self {
            Indicator::Undervalued => 1,
            Indicator::Overvalued => -1,
            Indicator::FairlyValued | Indicator::NotAvailable => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Indicator::Undervalued => "Undervalued",
            Indicator::FairlyValued => "Fairly valued",
            Indicator::Overvalued => "Overvalued",
            Indicator::NotAvailable => "N/A",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl ScoringConfig {
    pub fn compare(
        &self,
        company: Option<f64>,
        benchmark: Option<f64>,
        polarity: Polarity,
    ) -> Indicator {
        let (Some(company), Some(benchmark)) = (company, benchmark) else {
            return Indicator::NotAvailable;
        };
        if benchmark == 0.0 {
            return Indicator::NotAvailable;
        }

        let relative = company / benchmark;
        if !relative.is_finite() {
            return Indicator::NotAvailable;
        }

        let (high, low) = match polarity {
            Polarity::LowerIsBetter => (Indicator::Overvalued, Indicator::Undervalued),
            Polarity::HigherIsBetter => (Indicator::Undervalued, Indicator::Overvalued),
        };

        if relative >= self.overvalued_ratio {
            high
        } else if relative <= self.undervalued_ratio {
            low
        } else {
            Indicator::FairlyValued
        }
    }

    pub fn indicator_for(
        &self,
        ratio: Ratio,
        company: Option<f64>,
        benchmark: Option<f64>,
    ) -> Indicator {
        self.compare(company, benchmark, ratio.polarity())
    }
}

/// Classifies one company ratio against its benchmark with the default thresholds.
pub fn compare(company: Option<f64>, benchmark: Option<f64>, polarity: Polarity) -> Indicator {
    ScoringConfig::default().compare(company, benchmark, polarity)
}

pub fn indicator_for(ratio: Ratio, company: Option<f64>, benchmark: Option<f64>) -> Indicator {
    ScoringConfig::default().indicator_for(ratio, company, benchmark)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLES: [f64; 6] = [-15.0, 0.0, 0.5, 12.3, 100.0, 1e9];

    #[test]
    fn missing_operand_is_not_available() {
        for ratio in Ratio::ALL {
            for x in SAMPLES {
                assert_eq!(indicator_for(ratio, None, Some(x)), Indicator::NotAvailable);
                assert_eq!(indicator_for(ratio, Some(x), None), Indicator::NotAvailable);
            }
            assert_eq!(indicator_for(ratio, None, None), Indicator::NotAvailable);
        }
    }

    #[test]
    fn zero_benchmark_is_not_available() {
        for ratio in Ratio::ALL {
            for x in SAMPLES {
                assert_eq!(indicator_for(ratio, Some(x), Some(0.0)), Indicator::NotAvailable);
            }
        }
    }

    #[test]
    fn lower_is_better_boundaries() {
        let p = Polarity::LowerIsBetter;
        assert_eq!(compare(Some(120.0), Some(100.0), p), Indicator::Overvalued);
        assert_eq!(compare(Some(119.0), Some(100.0), p), Indicator::FairlyValued);
        assert_eq!(compare(Some(80.0), Some(100.0), p), Indicator::Undervalued);
        assert_eq!(compare(Some(81.0), Some(100.0), p), Indicator::FairlyValued);
        assert_eq!(compare(Some(100.0), Some(100.0), p), Indicator::FairlyValued);
    }

    #[test]
    fn higher_is_better_boundaries() {
        assert_eq!(indicator_for(Ratio::Roe, Some(120.0), Some(100.0)), Indicator::Undervalued);
        assert_eq!(indicator_for(Ratio::Roe, Some(80.0), Some(100.0)), Indicator::Overvalued);
        assert_eq!(indicator_for(Ratio::Roe, Some(110.0), Some(100.0)), Indicator::FairlyValued);
    }

    #[test]
    fn pe_and_pb_share_the_same_rule() {
        for (c, b) in [(30.0, 20.0), (10.0, 20.0), (21.0, 20.0)] {
            assert_eq!(
                indicator_for(Ratio::Pe, Some(c), Some(b)),
                indicator_for(Ratio::Pb, Some(c), Some(b))
            );
        }
    }

    #[test]
    fn thresholds_come_from_config() {
        let loose = ScoringConfig {
            overvalued_ratio: 1.5,
            undervalued_ratio: 0.5,
            ..ScoringConfig::default()
        };
        assert_eq!(
            loose.compare(Some(130.0), Some(100.0), Polarity::LowerIsBetter),
            Indicator::FairlyValued
        );
        assert_eq!(
            loose.compare(Some(150.0), Some(100.0), Polarity::LowerIsBetter),
            Indicator::Overvalued
        );
    }

    #[test]
    fn contribution_signs() {
        assert_eq!(Indicator::Undervalued.contribution(), 1);
        assert_eq!(Indicator::Overvalued.contribution(), -1);
        assert_eq!(Indicator::FairlyValued.contribution(), 0);
        assert_eq!(Indicator::NotAvailable.contribution(), 0);
        assert_eq!(
            serde_json::to_value(Indicator::FairlyValued).unwrap(),
            serde_json::json!("Fairly valued")
        );
    }
}
