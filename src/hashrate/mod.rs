pub mod grammar;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::upstream::RawField;

pub use grammar::{parse_exact, parse_number, parse_quantity};

/// Hashrate scale, each step a factor of 1000 over the previous one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HashUnit {
    #[serde(rename = "H/s")]
    H,
    #[serde(rename = "kH/s")]
    KH,
    #[serde(rename = "MH/s")]
    MH,
    #[serde(rename = "GH/s")]
    GH,
    #[serde(rename = "TH/s")]
    TH,
    #[serde(rename = "PH/s")]
    PH,
    #[serde(rename = "EH/s")]
    EH,
    #[serde(rename = "ZH/s")]
    ZH,
    #[serde(rename = "YH/s")]
    YH,
}

impl HashUnit {
    /// All units, finest first.
    pub const ALL: [HashUnit; 9] = [
        HashUnit::H,
        HashUnit::KH,
        HashUnit::MH,
        HashUnit::GH,
        HashUnit::TH,
        HashUnit::PH,
        HashUnit::EH,
        HashUnit::ZH,
        HashUnit::YH,
    ];

    /// Power of 1000 this unit represents.
    pub fn exponent(self) -> i32 {
        self as i32
    }

    /// Hashes per second in one of this unit.
    pub fn multiplier(self) -> f64 {
        1000f64.powi(self.exponent())
    }

    pub fn label(self) -> &'static str {
        match self {
            HashUnit::H => "H/s",
            HashUnit::KH => "kH/s",
            HashUnit::MH => "MH/s",
            HashUnit::GH => "GH/s",
            HashUnit::TH => "TH/s",
            HashUnit::PH => "PH/s",
            HashUnit::EH => "EH/s",
            HashUnit::ZH => "ZH/s",
            HashUnit::YH => "YH/s",
        }
    }

    /// Decimal places in the human label. Coarser tiers get fewer.
    pub fn decimals(self) -> usize {
        match self {
            HashUnit::H | HashUnit::KH | HashUnit::MH | HashUnit::GH => 3,
            HashUnit::TH | HashUnit::PH => 2,
            HashUnit::EH | HashUnit::ZH | HashUnit::YH => 1,
        }
    }

    /// Match an upstream suffix such as `"TH/s"`, `"th"` or `"kH/s"`.
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        let s = suffix.trim();
        let s = s
            .strip_suffix("/s")
            .or_else(|| s.strip_suffix("/S"))
            .unwrap_or(s);
        match s.to_ascii_uppercase().as_str() {
            "H" => Some(HashUnit::H),
            "KH" => Some(HashUnit::KH),
            "MH" => Some(HashUnit::MH),
            "GH" => Some(HashUnit::GH),
            "TH" => Some(HashUnit::TH),
            "PH" => Some(HashUnit::PH),
            "EH" => Some(HashUnit::EH),
            "ZH" => Some(HashUnit::ZH),
            "YH" => Some(HashUnit::YH),
            _ => None,
        }
    }
}

impl fmt::Display for HashUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for HashUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HashUnit::from_suffix(s).ok_or_else(|| format!("unknown hashrate unit: {s}"))
    }
}

/// Hashrate expressed in a readable tier: `value * unit.multiplier()` is H/s.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalHashrate {
    pub value: f64,
    pub unit: HashUnit,
    pub human: String,
}

impl CanonicalHashrate {
    pub fn zero() -> Self {
        Self {
            value: 0.0,
            unit: HashUnit::H,
            human: "0 H/s".to_string(),
        }
    }

    /// Pick the largest unit that keeps the displayed value in `[1, 1000)`.
    pub fn from_hashes_per_sec(hps: f64) -> Self {
        if !hps.is_finite() || hps <= 0.0 {
            return Self::zero();
        }

        let top = HashUnit::ALL.len() - 1;
        let mut idx = 0;
        let mut value = hps;
        while value >= 1000.0 && idx < top {
            value /= 1000.0;
            idx += 1;
        }

        // 999.9996 GH/s would print as "1000.000 GH/s"; promote instead.
        let scale = 10f64.powi(HashUnit::ALL[idx].decimals() as i32);
        if (value * scale).round() / scale >= 1000.0 && idx < top {
            value /= 1000.0;
            idx += 1;
        }

        let unit = HashUnit::ALL[idx];
        Self {
            value,
            unit,
            human: format!("{:.*} {}", unit.decimals(), value, unit.label()),
        }
    }
}

/// Normalize whatever the explorer reported as hashrate.
///
/// Bare numbers (and unit-less strings) are read in `base`, the unit the
/// upstream is known to report in. Unknown suffixes fall back to H/s. Nothing
/// here fails: unparseable input becomes `0 H/s`.
pub fn normalize(raw: Option<&RawField>, base: HashUnit) -> CanonicalHashrate {
    let hps = match raw {
        None => return CanonicalHashrate::zero(),
        Some(RawField::Number(n)) => n * base.multiplier(),
        Some(RawField::Text(text)) => match parse_quantity(text) {
            None => return CanonicalHashrate::zero(),
            Some(q) if q.suffix.is_empty() => q.value * base.multiplier(),
            Some(q) => {
                let unit = HashUnit::from_suffix(&q.suffix).unwrap_or(HashUnit::H);
                q.value * unit.multiplier()
            }
        },
    };
    CanonicalHashrate::from_hashes_per_sec(hps)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> RawField {
        RawField::Text(s.to_string())
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() <= 1e-9 * b.abs().max(1.0)
    }

    #[test]
    fn suffixed_string_keeps_its_unit() {
        let hr = normalize(Some(&text("769.0 TH/s")), HashUnit::H);
        assert!(close(hr.value, 769.0));
        assert_eq!(hr.unit, HashUnit::TH);
        assert_eq!(hr.human, "769.00 TH/s");
    }

    #[test]
    fn bare_petahash_decimal_is_rescaled() {
        let hr = normalize(Some(&RawField::Number(0.2786)), HashUnit::PH);
        assert!(close(hr.value, 278.6), "got {}", hr.value);
        assert_eq!(hr.unit, HashUnit::TH);
        assert_eq!(hr.human, "278.60 TH/s");
    }

    #[test]
    fn unitless_string_uses_base_unit() {
        let hr = normalize(Some(&text("1500")), HashUnit::GH);
        assert!(close(hr.value, 1.5));
        assert_eq!(hr.unit, HashUnit::TH);
    }

    #[test]
    fn suffix_is_case_insensitive() {
        let table = [
            ("12 kh/s", HashUnit::KH),
            ("12 MH", HashUnit::MH),
            ("12 gh/S", HashUnit::GH),
            ("12 Ph/s", HashUnit::PH),
            ("12 eh", HashUnit::EH),
        ];
        for (input, unit) in table {
            let hr = normalize(Some(&text(input)), HashUnit::H);
            assert_eq!(hr.unit, unit, "{input}");
            assert!(close(hr.value, 12.0), "{input}");
        }
    }

    #[test]
    fn unknown_suffix_defaults_to_hashes() {
        let hr = normalize(Some(&text("250 QH/s")), HashUnit::PH);
        assert_eq!(hr.unit, HashUnit::H);
        assert!(close(hr.value, 250.0));
        assert_eq!(hr.human, "250.000 H/s");
    }

    #[test]
    fn garbage_and_missing_become_zero() {
        assert_eq!(normalize(None, HashUnit::H), CanonicalHashrate::zero());
        assert_eq!(
            normalize(Some(&text("unavailable")), HashUnit::H),
            CanonicalHashrate::zero()
        );
        assert_eq!(
            normalize(Some(&RawField::Number(-5.0)), HashUnit::H),
            CanonicalHashrate::zero()
        );
        assert_eq!(CanonicalHashrate::zero().human, "0 H/s");
    }

    #[test]
    fn tiers_keep_value_below_one_thousand() {
        for hps in [1.0, 999.0, 1000.0, 7.69e14, 3.2e21, 5.5e24, 9.99e26] {
            let hr = CanonicalHashrate::from_hashes_per_sec(hps);
            assert!(hr.value >= 1.0, "{hps} -> {}", hr.value);
            assert!(hr.value < 1000.0 || hr.unit == HashUnit::YH, "{hps}");
            assert!(close(hr.value * hr.unit.multiplier(), hps));
        }
    }

    #[test]
    fn rounding_up_to_a_thousand_promotes_unit() {
        let hr = CanonicalHashrate::from_hashes_per_sec(999.9996e9);
        assert_eq!(hr.unit, HashUnit::TH);
        assert_eq!(hr.human, "1.00 TH/s");
    }

    #[test]
    fn decimals_shrink_for_coarser_units() {
        assert_eq!(CanonicalHashrate::from_hashes_per_sec(12.5).human, "12.500 H/s");
        assert_eq!(CanonicalHashrate::from_hashes_per_sec(12.5e15).human, "12.50 PH/s");
        assert_eq!(CanonicalHashrate::from_hashes_per_sec(12.5e18).human, "12.5 EH/s");
    }

    #[test]
    fn unit_from_str_accepts_config_spellings() {
        assert_eq!("PH".parse::<HashUnit>(), Ok(HashUnit::PH));
        assert_eq!("h/s".parse::<HashUnit>(), Ok(HashUnit::H));
        assert!("lightyears".parse::<HashUnit>().is_err());
    }
}
