use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three tracked fundamental ratios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Ratio {
    #[serde(rename = "PE")]
    Pe,
    #[serde(rename = "PB")]
    Pb,
    #[serde(rename = "ROE")]
    Roe,
}

/// Which direction of a ratio is favourable for the company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    LowerIsBetter,
    HigherIsBetter,
}

impl Ratio {
    pub const ALL: [Ratio; 3] = [Ratio::Pe, Ratio::Pb, Ratio::Roe];

    pub fn polarity(self) -> Polarity {
        match self {
            Ratio::Pe | Ratio::Pb => Polarity::LowerIsBetter,
            Ratio::Roe => Polarity::HigherIsBetter,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Ratio::Pe => "PE",
            Ratio::Pb => "PB",
            Ratio::Roe => "ROE",
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Nullable value per ratio. `None` means the ratio could not be computed from source data
/// (e.g. negative earnings leave P/E undefined).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RatioValues {
    #[serde(rename = "PE")]
    pub pe: Option<f64>,
    #[serde(rename = "PB")]
    pub pb: Option<f64>,
    #[serde(rename = "ROE")]
    pub roe: Option<f64>,
}

impl RatioValues {
    pub fn new(pe: Option<f64>, pb: Option<f64>, roe: Option<f64>) -> Self {
        Self { pe, pb, roe }
    }

    pub fn get(&self, ratio: Ratio) -> Option<f64> {
        match ratio {
            Ratio::Pe => self.pe,
            Ratio::Pb => self.pb,
            Ratio::Roe => self.roe,
        }
    }

    pub fn is_empty(&self) -> bool {
        Ratio::ALL.iter().all(|r| self.get(*r).is_none())
    }

    pub(crate) fn ensure_finite(&self) -> anyhow::Result<()> {
        for ratio in Ratio::ALL {
            if let Some(v) = self.get(ratio) {
                anyhow::ensure!(v.is_finite(), "{ratio} must be finite (got {v})");
            }
        }
        Ok(())
    }
}

/// Per-ratio container for derived values (indicators, contributions, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerRatio<T> {
    #[serde(rename = "PE")]
    pub pe: T,
    #[serde(rename = "PB")]
    pub pb: T,
    #[serde(rename = "ROE")]
    pub roe: T,
}

impl<T: Copy> PerRatio<T> {
    pub fn from_fn(mut f: impl FnMut(Ratio) -> T) -> Self {
        Self {
            pe: f(Ratio::Pe),
            pb: f(Ratio::Pb),
            roe: f(Ratio::Roe),
        }
    }

    pub fn get(&self, ratio: Ratio) -> T {
        match ratio {
            Ratio::Pe => self.pe,
            Ratio::Pb => self.pb,
            Ratio::Roe => self.roe,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn roe_is_the_only_higher_is_better_ratio() {
        assert_eq!(Ratio::Pe.polarity(), Polarity::LowerIsBetter);
        assert_eq!(Ratio::Pb.polarity(), Polarity::LowerIsBetter);
        assert_eq!(Ratio::Roe.polarity(), Polarity::HigherIsBetter);
    }

    #[test]
    fn ratio_values_use_uppercase_keys() {
        let v = RatioValues::new(Some(28.5), None, Some(-3.0));
        assert_eq!(
            serde_json::to_value(v).unwrap(),
            json!({"PE": 28.5, "PB": null, "ROE": -3.0})
        );
    }

    #[test]
    fn rejects_non_finite_values() {
        assert!(RatioValues::new(Some(f64::NAN), None, None)
            .ensure_finite()
            .is_err());
        assert!(RatioValues::new(None, None, None).ensure_finite().is_ok());
        assert!(RatioValues::default().is_empty());
    }
}
