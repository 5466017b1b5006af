//! Human-readable bandwidth rate formatting.
//!
//! Tor reports bytes read and written once per second in `BW` events. This
//! module turns those counts into short display strings such as
//! `976.5kbps` or `1.24mbps`, and combines a read/write pair into the
//! `↓ / ↑` string shown in status notifications.
//!
//! # Thresholds
//!
//! | Bytes in window | Unit | Value | Decimals |
//! |-----------------|------|-------|----------|
//! | `< 1_000_000` | `kbps` | `floor(bytes * 10 / 1024) / 10` | 1 |
//! | `>= 1_000_000` | `mbps` | `floor(bytes * 100 / 1024 / 1024) / 100` | 2 |
//!
//! The threshold is decimal while the scaling is binary, so the switch to
//! `mbps` happens at roughly 976.6 KiB.
//!
//! # Locale
//!
//! Digits are rendered by `icu_decimal` for the locale held in a
//! [`NumberFormat`], so separators and grouping follow CLDR. A
//! [`RateFormatter`] without one formats everything as the empty string;
//! callers treat that as "nothing to display".
//!
//! # Example
//!
//! ```rust
//! use circmon_rs::rate::{NumberFormat, RateFormatter};
//!
//! let formatter = RateFormatter::new(Some(NumberFormat::from_locale("de").unwrap()));
//! assert_eq!(formatter.format_count(999_999), "976,5kbps");
//! assert_eq!(formatter.format_count(1_000_000), "0,95mbps");
//! assert_eq!(formatter.format_pair(2048, 0), "2,0kbps ↓ / 0,0kbps ↑");
//! ```

use icu_decimal::input::Decimal;
use icu_decimal::options::DecimalFormatterOptions;
use icu_decimal::DecimalFormatter;
use icu_locale_core::{locale, Locale};

use crate::error::{Error, Result};

/// Byte count at which formatting switches from kilobytes to megabytes.
pub const MEGA_THRESHOLD: u64 = 1_000_000;

/// A locale whose decimal symbols are used when rendering numbers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    locale: Locale,
}

impl NumberFormat {
    /// Parses a BCP 47 tag such as `en`, `de-CH` or `fr_FR`.
    ///
    /// Languages without CLDR data fall back to root symbols.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the tag is not a well-formed locale.
    pub fn from_locale(tag: &str) -> Result<Self> {
        let locale: Locale = tag
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("invalid number locale {:?}: {}", tag, e)))?;
        DecimalFormatter::try_new(locale.clone().into(), DecimalFormatterOptions::default())
            .map_err(|e| Error::Config(format!("no number format for locale {}: {}", locale, e)))?;
        Ok(Self { locale })
    }

    /// Uses the operating system locale, or `en-US` if it is missing or
    /// cannot be parsed.
    pub fn host() -> Self {
        sys_locale::get_locale()
            .and_then(|tag| Self::from_locale(&tag).ok())
            .unwrap_or_else(|| Self {
                locale: locale!("en-US"),
            })
    }

    /// Returns the locale digits are rendered for.
    pub fn locale(&self) -> &Locale {
        &self.locale
    }

    /// Renders `value / 10^decimals` with exactly `decimals` fraction digits.
    ///
    /// `value` is already scaled, so `format_fixed(9765, 1)` is `976.5`
    /// in English.
    pub fn format_fixed(&self, value: u64, decimals: u32) -> String {
        let scale = -(decimals as i16);
        let mut dec = Decimal::from(value);
        dec.multiply_pow10(scale);
        dec.pad_end(scale);

        match DecimalFormatter::try_new(self.locale.clone().into(), DecimalFormatterOptions::default())
        {
            Ok(formatter) => formatter.format(&dec).to_string(),
            Err(_) => format!(
                "{:.*}",
                decimals as usize,
                value as f64 / 10f64.powi(decimals as i32)
            ),
        }
    }
}

/// Formats per-second byte counts as rate strings.
#[derive(Debug, Clone, Default)]
pub struct RateFormatter {
    number_format: Option<NumberFormat>,
}

impl RateFormatter {
    /// Creates a formatter; `None` disables formatting entirely.
    pub fn new(number_format: Option<NumberFormat>) -> Self {
        Self { number_format }
    }

    /// Builds a formatter from the `number_locale` setting.
    ///
    /// `None` uses the host locale and an empty tag disables formatting.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the tag is malformed.
    pub fn from_locale(locale: Option<&str>) -> Result<Self> {
        match locale {
            None => Ok(Self::new(Some(NumberFormat::host()))),
            Some(tag) if tag.trim().is_empty() => Ok(Self::new(None)),
            Some(tag) => Ok(Self::new(Some(NumberFormat::from_locale(tag)?))),
        }
    }

    /// Returns whether a number format is configured.
    pub fn is_enabled(&self) -> bool {
        self.number_format.is_some()
    }

    /// Formats a single byte count for a one-second window.
    ///
    /// Returns an empty string when no number format is configured.
    pub fn format_count(&self, bytes: u64) -> String {
        let Some(ref nf) = self.number_format else {
            return String::new();
        };

        if bytes < MEGA_THRESHOLD {
            let tenths = bytes.saturating_mul(10) / 1024;
            format!("{}kbps", nf.format_fixed(tenths, 1))
        } else {
            let hundredths = bytes.saturating_mul(100) / 1024 / 1024;
            format!("{}mbps", nf.format_fixed(hundredths, 2))
        }
    }

    /// Formats a read/written pair as `<read> ↓ / <written> ↑`.
    ///
    /// Returns an empty string when no number format is configured.
    pub fn format_pair(&self, read: u64, written: u64) -> String {
        if !self.is_enabled() {
            return String::new();
        }
        format!(
            "{} \u{2193} / {} \u{2191}",
            self.format_count(read),
            self.format_count(written)
        )
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn unit_follows_threshold(bytes in 0u64..10_000_000_000) {
            let nf = NumberFormat::from_locale("en").unwrap();
            let s = RateFormatter::new(Some(nf)).format_count(bytes);
            if bytes < MEGA_THRESHOLD {
                prop_assert!(s.ends_with("kbps"));
            } else {
                prop_assert!(s.ends_with("mbps"));
            }
        }
    }
}
