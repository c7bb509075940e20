use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, Timelike};
use pv_model::series::HourlySeries;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::sizing::production::check_alignment;

/// Energy flows of one hour in kWh
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HourBalance {
    pub consumption: f64,
    pub production: f64,
    /// Production used on site
    pub self_consumed: f64,
    /// Consumption drawn from the grid
    pub import: f64,
    /// Production fed into the grid
    pub export: f64,
}

impl HourBalance {
    pub fn new(consumption: f64, production: f64) -> Self {
        Self {
            consumption,
            production,
            self_consumed: consumption.min(production),
            import: (consumption - production).max(0.0),
            export: (production - consumption).max(0.0),
        }
    }
}

/// Summed flows over any number of hours
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BalanceTotals {
    pub consumption: f64,
    pub production: f64,
    pub self_consumed: f64,
    pub import: f64,
    pub export: f64,
}

impl BalanceTotals {
    pub fn add(&mut self, hour: &HourBalance) {
        self.consumption += hour.consumption;
        self.production += hour.production;
        self.self_consumed += hour.self_consumed;
        self.import += hour.import;
        self.export += hour.export;
    }

    pub fn merge(&mut self, other: &BalanceTotals) {
        self.consumption += other.consumption;
        self.production += other.production;
        self.self_consumed += other.self_consumed;
        self.import += other.import;
        self.export += other.export;
    }

    /// Import minus export, negative for a net exporter
    pub fn net_exchange(&self) -> f64 {
        self.import - self.export
    }

    /// Import plus export, the energy that crosses the grid connection in either direction
    pub fn gross_exchange(&self) -> f64 {
        self.import + self.export
    }
}

impl<'a> FromIterator<&'a HourBalance> for BalanceTotals {
    fn from_iter<I: IntoIterator<Item = &'a HourBalance>>(iter: I) -> Self {
        let mut totals = BalanceTotals::default();
        for hour in iter {
            totals.add(hour);
        }
        totals
    }
}

/// Calendar bucket used for aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Window {
    Hour,
    Day,
    /// ISO week, starting on Monday
    Week,
    Month,
    Year,
}

impl Window {
    pub const ALL: [Window; 5] = [
        Window::Hour,
        Window::Day,
        Window::Week,
        Window::Month,
        Window::Year,
    ];

    /// Start of the bucket that contains `timestamp`
    pub fn bucket_start(&self, timestamp: NaiveDateTime) -> NaiveDateTime {
        let date = timestamp.date();
        match self {
            Window::Hour => midnight(date) + Duration::hours(timestamp.hour() as i64),
            Window::Day => midnight(date),
            Window::Week => {
                midnight(date - Duration::days(date.weekday().num_days_from_monday() as i64))
            }
            Window::Month => midnight(date.with_day(1).unwrap_or(date)),
            Window::Year => midnight(date.with_ordinal(1).unwrap_or(date)),
        }
    }
}

fn midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(chrono::NaiveTime::MIN)
}

/// Totals of one calendar bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BalancePeriod {
    pub start: NaiveDateTime,
    pub totals: BalanceTotals,
}

/// Hour by hour split of consumption and production into self-consumption, import and export
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyBalance {
    start: NaiveDateTime,
    hours: Vec<HourBalance>,
}

impl EnergyBalance {
    pub fn compute(consumption: &HourlySeries, production: &HourlySeries) -> Result<Self> {
        check_alignment(consumption, production)?;

        let hours = consumption
            .values
            .iter()
            .zip(&production.values)
            .map(|(&consumption, &production)| HourBalance::new(consumption, production))
            .collect();

        Ok(Self {
            start: consumption.start,
            hours,
        })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn hours(&self) -> &[HourBalance] {
        &self.hours
    }

    pub fn len(&self) -> usize {
        self.hours.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hours.is_empty()
    }

    pub fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.start + Duration::hours(index as i64)
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, &HourBalance)> + '_ {
        self.hours
            .iter()
            .enumerate()
            .map(|(index, hour)| (self.timestamp(index), hour))
    }

    pub fn totals(&self) -> BalanceTotals {
        self.hours.iter().collect()
    }

    /// Sums consecutive hours that fall into the same calendar bucket
    pub fn aggregate(&self, window: Window) -> Vec<BalancePeriod> {
        let mut periods: Vec<BalancePeriod> = Vec::new();

        for (timestamp, hour) in self.iter() {
            let bucket = window.bucket_start(timestamp);
            match periods.last_mut() {
                Some(period) if period.start == bucket => period.totals.add(hour),
                _ => {
                    let mut totals = BalanceTotals::default();
                    totals.add(hour);
                    periods.push(BalancePeriod {
                        start: bucket,
                        totals,
                    });
                }
            }
        }

        periods
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start() -> NaiveDateTime {
        // a Wednesday
        NaiveDate::from_ymd_opt(2023, 3, 29)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn balance(consumption: Vec<f64>, production: Vec<f64>) -> EnergyBalance {
        EnergyBalance::compute(
            &HourlySeries::new(start(), consumption).unwrap(),
            &HourlySeries::new(start(), production).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_hour_balance_split() {
        let deficit = HourBalance::new(1.0, 0.25);
        assert_eq!(deficit.self_consumed, 0.25);
        assert_eq!(deficit.import, 0.75);
        assert_eq!(deficit.export, 0.0);

        let surplus = HourBalance::new(0.5, 2.0);
        assert_eq!(surplus.self_consumed, 0.5);
        assert_eq!(surplus.import, 0.0);
        assert_eq!(surplus.export, 1.5);
    }

    #[test]
    fn test_conservation_every_hour() {
        let consumption: Vec<f64> = (0..200).map(|i| 0.3 + (i % 7) as f64 * 0.11).collect();
        let production: Vec<f64> = (0..200).map(|i| ((i % 24) as f64 - 8.0).max(0.0) * 0.07).collect();
        let balance = balance(consumption, production);

        for hour in balance.hours() {
            assert!((hour.consumption - (hour.self_consumed + hour.import)).abs() < 1e-12);
            assert!((hour.production - (hour.self_consumed + hour.export)).abs() < 1e-12);
            assert!(hour.import >= 0.0 && hour.export >= 0.0);
        }
    }

    #[test]
    fn test_aggregation_is_consistent_with_totals() {
        let hours = 24 * 40;
        let consumption: Vec<f64> = (0..hours).map(|i| 0.2 + (i % 5) as f64 * 0.1).collect();
        let production: Vec<f64> = (0..hours).map(|i| ((i % 24) as f64 - 10.0).max(0.0) * 0.1).collect();
        let balance = balance(consumption, production);
        let totals = balance.totals();

        for window in Window::ALL {
            let periods = balance.aggregate(window);
            let mut summed = BalanceTotals::default();
            for period in &periods {
                summed.merge(&period.totals);
                let t = period.totals;
                assert!((t.consumption - (t.self_consumed + t.import)).abs() < 1e-9);
                assert!((t.production - (t.self_consumed + t.export)).abs() < 1e-9);
            }
            assert!((summed.consumption - totals.consumption).abs() < 1e-9);
            assert!((summed.export - totals.export).abs() < 1e-9);
        }

        assert_eq!(balance.aggregate(Window::Hour).len(), hours);
        assert_eq!(balance.aggregate(Window::Day).len(), 40);
        // 29 March to 7 May: March, April, May
        assert_eq!(balance.aggregate(Window::Month).len(), 3);
        assert_eq!(balance.aggregate(Window::Year).len(), 1);
    }

    #[test]
    fn test_week_buckets_start_on_monday() {
        let balance = balance(vec![1.0; 24 * 7], vec![0.0; 24 * 7]);
        let weeks = balance.aggregate(Window::Week);

        // Wednesday to Sunday, then Monday and Tuesday of the next week
        assert_eq!(weeks.len(), 2);
        assert_eq!(weeks[0].start.date(), NaiveDate::from_ymd_opt(2023, 3, 27).unwrap());
        assert_eq!(weeks[0].totals.consumption, 24.0 * 5.0);
        assert_eq!(weeks[1].start.date(), NaiveDate::from_ymd_opt(2023, 4, 3).unwrap());
    }

    #[test]
    fn test_exchange_totals() {
        let balance = balance(vec![1.0, 1.0, 0.0], vec![0.0, 3.0, 1.0]);
        let totals = balance.totals();
        assert_eq!(totals.import, 1.0);
        assert_eq!(totals.export, 3.0);
        assert_eq!(totals.net_exchange(), -2.0);
        assert_eq!(totals.gross_exchange(), 4.0);
    }

    #[test]
    fn test_misaligned_production_is_rejected() {
        let consumption = HourlySeries::new(start(), vec![1.0; 3]).unwrap();
        let production = HourlySeries::new(start(), vec![1.0; 2]).unwrap();
        assert!(EnergyBalance::compute(&consumption, &production).is_err());
    }
}
