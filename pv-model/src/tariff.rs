use chrono::{Datelike, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// Represents different types of electricity rate structures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export, export_to = "./tariff.ts")]
pub enum ElectricityRate {
    /// Fixed rate for all hours
    Fixed {
        /// The price per kWh
        rate: f64,
    },
    /// Tiered rate structure with different rates for different time periods
    Tiered {
        /// List of rate tiers
        tiers: Vec<RateTier>,
    },
}

/// Represents a single tier in a tiered rate structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./tariff.ts")]
pub struct RateTier {
    /// Name of the tier (e.g., "Peak", "Off-Peak")
    pub name: String,
    /// Price per kWh for this tier
    pub rate: f64,
    /// List of hour ranges when this tier applies
    pub hour_ranges: Vec<HourRange>,
}

/// Represents a time range when a rate tier applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./tariff.ts")]
pub struct HourRange {
    /// Starting hour (0-23)
    pub from: u8,
    /// Ending hour (1-24, exclusive)
    pub till: u8,
    /// Type of day this range applies to
    pub weekday_type: WeekdayType,
}

/// Represents the type of day for rate application
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "./tariff.ts")]
pub enum WeekdayType {
    /// Monday through Friday
    Weekday,
    /// Saturday and Sunday
    Weekend,
}

impl WeekdayType {
    pub fn of(timestamp: &NaiveDateTime) -> Self {
        match timestamp.weekday() {
            Weekday::Sat | Weekday::Sun => WeekdayType::Weekend,
            _ => WeekdayType::Weekday,
        }
    }
}

impl ElectricityRate {
    /// Creates a new fixed electricity rate
    pub fn fixed(rate: f64) -> Self {
        Self::Fixed { rate }
    }

    /// Creates a new tiered electricity rate
    pub fn tiered(tiers: Vec<RateTier>) -> Self {
        Self::Tiered { tiers }
    }

    /// Price for the hour starting at `timestamp`
    pub fn rate_at(&self, timestamp: &NaiveDateTime) -> f64 {
        self.get_rate_for_hour(timestamp.hour() as u8, WeekdayType::of(timestamp))
    }

    /// Gets the rate for a specific hour and day type
    fn get_rate_for_hour(&self, hour: u8, weekday_type: WeekdayType) -> f64 {
        match self {
            ElectricityRate::Fixed { rate } => *rate,
            ElectricityRate::Tiered { tiers } => tiers
                .iter()
                .find(|tier| tier.matches_hour(hour, weekday_type))
                .map_or(0.0, |tier| tier.rate),
        }
    }

    /// All prices appearing in the structure
    pub fn rates(&self) -> Vec<f64> {
        match self {
            ElectricityRate::Fixed { rate } => vec![*rate],
            ElectricityRate::Tiered { tiers } => tiers.iter().map(|tier| tier.rate).collect(),
        }
    }

    /// Validates that all weekend and weekday hours are covered exactly once
    /// Returns true if the rate structure is valid, false otherwise
    pub fn is_valid(&self) -> bool {
        match self {
            ElectricityRate::Fixed { .. } => true,
            ElectricityRate::Tiered { tiers } => {
                self.validate_coverage(tiers, WeekdayType::Weekday)
                    && self.validate_coverage(tiers, WeekdayType::Weekend)
            }
        }
    }

    /// Validates that all hours (0-23) of one day type are covered exactly once
    fn validate_coverage(&self, tiers: &[RateTier], weekday_type: WeekdayType) -> bool {
        let mut covered_hours = [false; 24];

        for tier in tiers {
            for hour_range in &tier.hour_ranges {
                if hour_range.weekday_type == weekday_type
                    && !self.mark_hours_covered(&mut covered_hours, hour_range)
                {
                    return false;
                }
            }
        }

        covered_hours.iter().all(|&covered| covered)
    }

    /// Marks hours as covered in the given array and returns false if any overlap is detected
    fn mark_hours_covered(&self, covered_hours: &mut [bool; 24], hour_range: &HourRange) -> bool {
        if hour_range.from > 23 || hour_range.till > 24 {
            return false;
        }
        let hours: Vec<u8> = if hour_range.from > hour_range.till {
            // Wrapping range (e.g., 22:00 to 06:00)
            (hour_range.from..24).chain(0..hour_range.till).collect()
        } else {
            (hour_range.from..hour_range.till).collect()
        };

        for hour in hours {
            if covered_hours[hour as usize] {
                return false;
            }
            covered_hours[hour as usize] = true;
        }
        true
    }
}

impl RateTier {
    /// Creates a new rate tier
    pub fn new(name: String, rate: f64, hour_ranges: Vec<HourRange>) -> Self {
        Self {
            name,
            rate,
            hour_ranges,
        }
    }

    /// Checks if this tier applies to the given hour and day type
    pub fn matches_hour(&self, hour: u8, weekday_type: WeekdayType) -> bool {
        self.hour_ranges
            .iter()
            .any(|range| range.matches_hour(hour, weekday_type))
    }
}

impl HourRange {
    /// Creates a new hour range
    pub fn new(from: u8, till: u8, weekday_type: WeekdayType) -> Self {
        Self {
            from,
            till,
            weekday_type,
        }
    }

    /// Checks if this hour range matches the given hour and day type
    pub fn matches_hour(&self, hour: u8, weekday_type: WeekdayType) -> bool {
        if self.weekday_type != weekday_type {
            return false;
        }

        if self.from > self.till {
            // Wrapping range: from > till (e.g., 22:00 to 06:00)
            hour >= self.from || hour < self.till
        } else {
            hour >= self.from && hour < self.till
        }
    }
}

/// Prices for energy taken from and fed into the grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./tariff.ts")]
pub struct Tariff {
    /// Price paid per imported kWh
    pub import: ElectricityRate,
    /// Price received per exported kWh
    pub feed_in: ElectricityRate,
}

impl Tariff {
    pub fn fixed(import: f64, feed_in: f64) -> Self {
        Self {
            import: ElectricityRate::fixed(import),
            feed_in: ElectricityRate::fixed(feed_in),
        }
    }

    /// Checks that no price is negative or non-finite and tiered structures cover every hour
    pub fn validate(&self) -> Result<(), String> {
        for (label, rate) in [("import", &self.import), ("feed-in", &self.feed_in)] {
            if let Some(price) = rate
                .rates()
                .into_iter()
                .find(|price| !price.is_finite() || *price < 0.0)
            {
                return Err(format!("Negative or invalid {} price: {}", label, price));
            }
            if !rate.is_valid() {
                return Err(format!(
                    "The {} rate tiers must cover every hour exactly once",
                    label
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn peak_off_peak() -> ElectricityRate {
        let peak_tier = RateTier::new(
            "Peak".to_string(),
            0.25,
            vec![HourRange::new(9, 17, WeekdayType::Weekday)],
        );

        let off_peak_tier = RateTier::new(
            "Off-Peak".to_string(),
            0.08,
            vec![
                HourRange::new(17, 9, WeekdayType::Weekday),
                HourRange::new(0, 24, WeekdayType::Weekend),
            ],
        );

        ElectricityRate::tiered(vec![peak_tier, off_peak_tier])
    }

    #[test]
    fn test_fixed_rate() {
        let rate = ElectricityRate::fixed(0.12);
        let timestamp = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(13, 0, 0)
            .unwrap();
        assert_eq!(rate.rate_at(&timestamp), 0.12);
        assert!(rate.is_valid());
    }

    #[test]
    fn test_tiered_rate_uses_calendar_weekday() {
        let rate = peak_off_peak();
        // 2023-01-02 is a Monday, 2023-01-07 a Saturday
        let monday_noon = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let monday_night = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(23, 0, 0)
            .unwrap();
        let saturday_noon = NaiveDate::from_ymd_opt(2023, 1, 7)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();

        assert_eq!(rate.rate_at(&monday_noon), 0.25);
        assert_eq!(rate.rate_at(&monday_night), 0.08);
        assert_eq!(rate.rate_at(&saturday_noon), 0.08);
    }

    #[test]
    fn test_rate_validation_valid_tiered() {
        assert!(peak_off_peak().is_valid());
    }

    #[test]
    fn test_rate_validation_overlapping_hours() {
        let peak_tier = RateTier::new(
            "Peak".to_string(),
            0.25,
            vec![
                HourRange::new(9, 17, WeekdayType::Weekday),
                HourRange::new(0, 24, WeekdayType::Weekend),
            ],
        );
        let overlapping_tier = RateTier::new(
            "Overlap".to_string(),
            0.15,
            vec![HourRange::new(15, 9, WeekdayType::Weekday)],
        );

        let rate = ElectricityRate::tiered(vec![peak_tier, overlapping_tier]);
        assert!(!rate.is_valid());
    }

    #[test]
    fn test_rate_validation_missing_weekend() {
        let tier = RateTier::new(
            "All day".to_string(),
            0.2,
            vec![HourRange::new(0, 24, WeekdayType::Weekday)],
        );
        assert!(!ElectricityRate::tiered(vec![tier]).is_valid());
    }

    #[test]
    fn test_tariff_rejects_negative_price() {
        assert!(Tariff::fixed(0.25, 0.1).validate().is_ok());
        assert!(Tariff::fixed(-0.25, 0.1).validate().is_err());
        assert!(Tariff::fixed(0.25, -0.1).validate().is_err());

        let negative_tier = RateTier::new(
            "Negative".to_string(),
            -0.01,
            vec![
                HourRange::new(0, 24, WeekdayType::Weekday),
                HourRange::new(0, 24, WeekdayType::Weekend),
            ],
        );
        let tariff = Tariff {
            import: ElectricityRate::fixed(0.25),
            feed_in: ElectricityRate::tiered(vec![negative_tier]),
        };
        assert!(tariff.validate().is_err());
    }
}
