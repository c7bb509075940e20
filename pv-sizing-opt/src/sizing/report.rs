use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Context;
use chrono::{Datelike, NaiveDateTime, Timelike};
use pv_model::series::HourlySeries;
use pv_model::sizing::{
    CandidateSummary, Fraction, Indicators, NpvPoint, OptimizationOutcome, PvConfiguration,
    YearSummary,
};
use serde::Serialize;
use tracing::info;

use crate::error::{Result, SizingError};
use crate::sizing::balance::{BalancePeriod, EnergyBalance, Window};
use crate::sizing::indicators::{
    WindowIndicators, indicators_by_window, indicators_from_totals, mean_of_applicable,
};
use crate::sizing::optimizer::rank_candidates;

/// Aggregated flows of the first simulated year for every window
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedFlows {
    pub hour: Vec<BalancePeriod>,
    pub day: Vec<BalancePeriod>,
    pub week: Vec<BalancePeriod>,
    pub month: Vec<BalancePeriod>,
    pub year: Vec<BalancePeriod>,
}

impl AggregatedFlows {
    fn build(balance: &EnergyBalance) -> Self {
        Self {
            hour: balance.aggregate(Window::Hour),
            day: balance.aggregate(Window::Day),
            week: balance.aggregate(Window::Week),
            month: balance.aggregate(Window::Month),
            year: balance.aggregate(Window::Year),
        }
    }
}

/// Mean flows per profile slot in kWh
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileSet {
    pub consumption: Vec<f64>,
    pub production: Vec<f64>,
    pub import: Vec<f64>,
    pub export: Vec<f64>,
}

impl ProfileSet {
    /// Averages every hour of `balance` into the slot `slot_of` assigns it. Slots without
    /// data stay at zero.
    pub fn average(
        balance: &EnergyBalance,
        slots: usize,
        slot_of: impl Fn(NaiveDateTime) -> usize,
    ) -> Self {
        let mut profile = Self {
            consumption: vec![0.0; slots],
            production: vec![0.0; slots],
            import: vec![0.0; slots],
            export: vec![0.0; slots],
        };
        let mut counts = vec![0usize; slots];

        for (timestamp, hour) in balance.iter() {
            let slot = slot_of(timestamp);
            if slot >= slots {
                continue;
            }
            profile.consumption[slot] += hour.consumption;
            profile.production[slot] += hour.production;
            profile.import[slot] += hour.import;
            profile.export[slot] += hour.export;
            counts[slot] += 1;
        }

        for (slot, &count) in counts.iter().enumerate() {
            if count > 0 {
                let count = count as f64;
                profile.consumption[slot] /= count;
                profile.production[slot] /= count;
                profile.import[slot] /= count;
                profile.export[slot] /= count;
            }
        }

        profile
    }

    /// Import minus export per slot
    pub fn net_exchange(&self) -> Vec<f64> {
        self.import
            .iter()
            .zip(&self.export)
            .map(|(import, export)| import - export)
            .collect()
    }
}

pub const HOURS_PER_DAY: usize = 24;
pub const HOURS_PER_WEEK: usize = 7 * 24;
pub const MONTH_PROFILE_SLOTS: usize = 31 * 24;

/// Average day, week and month of the first simulated year
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageProfiles {
    /// 24 hourly slots
    pub day: ProfileSet,
    /// 168 slots starting Monday 00:00
    pub week: ProfileSet,
    /// 31 × 24 slots, slot `(day_of_month - 1) * 24 + hour`
    pub month: ProfileSet,
}

impl AverageProfiles {
    pub fn build(balance: &EnergyBalance) -> Self {
        Self {
            day: ProfileSet::average(balance, HOURS_PER_DAY, |timestamp| {
                timestamp.hour() as usize
            }),
            week: ProfileSet::average(balance, HOURS_PER_WEEK, |timestamp| {
                timestamp.weekday().num_days_from_monday() as usize * HOURS_PER_DAY
                    + timestamp.hour() as usize
            }),
            month: ProfileSet::average(balance, MONTH_PROFILE_SLOTS, |timestamp| {
                (timestamp.day0() as usize) * HOURS_PER_DAY + timestamp.hour() as usize
            }),
        }
    }
}

/// Everything the chart layer shows for the chosen installation
#[derive(Debug, Clone, Serialize)]
pub struct SizingReport {
    pub configuration: PvConfiguration,
    pub installed_capacity_kw: f64,
    pub installed_area_m2: f64,
    pub investment_cost: f64,
    pub npv: f64,
    pub payback_year: Option<f64>,
    pub internal_rate_of_return: Option<f64>,
    /// Energy weighted indicators of the first simulated year
    pub indicators: Indicators,
    /// Self-sufficiency over the window the minimum is checked against
    pub constraint_self_sufficiency: Fraction,
    /// Mean of the daily ratios of the first simulated year
    pub mean_daily_self_sufficiency: Fraction,
    pub mean_daily_self_consumption: Fraction,
    pub yearly: Vec<YearSummary>,
    pub npv_trajectory: Vec<NpvPoint>,
    pub flows: AggregatedFlows,
    pub profiles: AverageProfiles,
    pub daily_indicators: Vec<WindowIndicators>,
    /// Evaluated candidates, highest NPV first
    pub ranking: Vec<CandidateSummary>,
    pub total_candidates: usize,
    pub evaluated: usize,
    pub budget_exhausted: bool,
}

impl SizingReport {
    /// `consumption` is the series the outcome was computed from
    pub fn build(outcome: &OptimizationOutcome, consumption: &HourlySeries) -> Result<Self> {
        let best = &outcome.best;
        let production = &best.production;
        let offset = (production.start - consumption.start).num_hours();
        if offset != 0 || production.len() > consumption.len() {
            return Err(SizingError::SeriesMismatch(format!(
                "production of {} hours from {} is not covered by consumption of {} hours from {}",
                production.len(),
                production.start,
                consumption.len(),
                consumption.start
            )));
        }
        let first_year_consumption = consumption.slice(0, production.len());
        let balance = EnergyBalance::compute(&first_year_consumption, production)?;

        let daily_indicators = indicators_by_window(&balance, Window::Day);
        let mean_daily_self_sufficiency = mean_of_applicable(
            daily_indicators
                .iter()
                .map(|entry| entry.indicators.self_sufficiency),
        );
        let mean_daily_self_consumption = mean_of_applicable(
            daily_indicators
                .iter()
                .map(|entry| entry.indicators.self_consumption),
        );

        let configuration = &best.configuration;
        Ok(Self {
            configuration: configuration.clone(),
            installed_capacity_kw: configuration.installed_capacity_kw(),
            installed_area_m2: configuration.installed_area_m2(),
            investment_cost: configuration.investment_cost(),
            npv: best.npv(),
            payback_year: best.payback_year,
            internal_rate_of_return: best.internal_rate_of_return,
            indicators: indicators_from_totals(&balance.totals()),
            constraint_self_sufficiency: best.constraint_self_sufficiency,
            mean_daily_self_sufficiency,
            mean_daily_self_consumption,
            yearly: best.yearly.clone(),
            npv_trajectory: best.npv_trajectory.clone(),
            flows: AggregatedFlows::build(&balance),
            profiles: AverageProfiles::build(&balance),
            daily_indicators,
            ranking: rank_candidates(&outcome.candidates),
            total_candidates: outcome.total_candidates,
            evaluated: outcome.evaluated,
            budget_exhausted: outcome.budget_exhausted,
        })
    }

    pub fn write_json(&self, path: &Path) -> anyhow::Result<()> {
        let file =
            File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;
        info!("Report written to {}", path.display());
        Ok(())
    }

    /// Summary lines for the terminal
    pub fn summary_lines(&self) -> Vec<String> {
        let percent = |fraction: Fraction| match fraction.value() {
            Some(value) => format!("{:.1} %", value * 100.0),
            None => "n/a".to_string(),
        };

        let mut lines = vec![
            format!(
                "Panels: {} x {} ({:.2} kWp, {:.1} m²)",
                self.configuration.panel_count,
                self.configuration.panel_type.name,
                self.installed_capacity_kw,
                self.installed_area_m2
            ),
            format!("Investment: {:.2}", self.investment_cost),
            format!(
                "NPV after {} years: {:.2}",
                self.yearly.len(),
                self.npv
            ),
        ];
        lines.push(match self.payback_year {
            Some(year) => format!("Payback: {:.1} years", year),
            None => "Payback: not within the horizon".to_string(),
        });
        if let Some(rate) = self.internal_rate_of_return {
            lines.push(format!("Internal rate of return: {:.2} %", rate * 100.0));
        }
        lines.push(format!(
            "Self-sufficiency: {} (daily mean {}, constraint window {})",
            percent(self.indicators.self_sufficiency),
            percent(self.mean_daily_self_sufficiency),
            percent(self.constraint_self_sufficiency)
        ));
        lines.push(format!(
            "Self-consumption: {} (daily mean {})",
            percent(self.indicators.self_consumption),
            percent(self.mean_daily_self_consumption)
        ));
        lines.push(format!(
            "Grid exchange in year 1: net {:.1} kWh, gross {:.1} kWh",
            self.indicators.net_exchange_kwh,
            self.indicators.gross_exchange_kwh
        ));
        lines.push(format!(
            "Candidates evaluated: {} of {}{}",
            self.evaluated,
            self.total_candidates,
            if self.budget_exhausted {
                " (budget exhausted)"
            } else {
                ""
            }
        ));
        lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sizing::config::{PanelSpec, SearchBounds, SearchParams, SizingConfig};
    use crate::sizing::optimizer::size_installation;
    use chrono::NaiveDate;
    use pv_model::panel::PanelType;

    fn flat_year() -> (HourlySeries, HourlySeries) {
        // 2023-01-02 is a Monday
        let start = NaiveDate::from_ymd_opt(2023, 1, 2)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let consumption: Vec<f64> = (0..8760).map(|i| if i % 24 < 12 { 0.5 } else { 1.5 }).collect();
        let irradiance: Vec<f64> = (0..8760)
            .map(|i| if (8..16).contains(&(i % 24)) { 0.5 } else { 0.0 })
            .collect();
        (
            HourlySeries::new(start, consumption).unwrap(),
            HourlySeries::new(start, irradiance).unwrap(),
        )
    }

    fn config() -> SizingConfig {
        SizingConfig {
            panels: vec![PanelSpec::new(
                PanelType::new("Flat", 100.0, 100.0, 1.0, 0.0),
                SearchBounds::new(1, 4, 1),
            )],
            search: SearchParams {
                parallel: false,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_average_profiles() {
        let (consumption, irradiance) = flat_year();
        let outcome = size_installation(&consumption, &irradiance, &config()).unwrap();
        let report = SizingReport::build(&outcome, &consumption).unwrap();

        let day = &report.profiles.day;
        assert_eq!(day.consumption.len(), 24);
        assert!((day.consumption[3] - 0.5).abs() < 1e-12);
        assert!((day.consumption[20] - 1.5).abs() < 1e-12);
        assert_eq!(day.production[2], 0.0);
        assert!(day.production[10] > 0.0);

        assert_eq!(report.profiles.week.consumption.len(), 168);
        assert!((report.profiles.week.consumption[24 + 13] - 1.5).abs() < 1e-12);
        assert_eq!(report.profiles.month.consumption.len(), 31 * 24);
        assert!((report.profiles.month.consumption[30 * 24] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_report_contents() {
        let (consumption, irradiance) = flat_year();
        let outcome = size_installation(&consumption, &irradiance, &config()).unwrap();
        let report = SizingReport::build(&outcome, &consumption).unwrap();

        assert_eq!(report.daily_indicators.len(), 365);
        assert_eq!(report.flows.hour.len(), 8760);
        // 2 January 2023 up to and including 1 January 2024
        assert_eq!(report.flows.month.len(), 13);
        assert_eq!(report.flows.year.len(), 2);
        assert_eq!(report.ranking.len(), 4);
        assert_eq!(report.npv_trajectory.len(), 6);
        assert!(
            report
                .ranking
                .windows(2)
                .all(|pair| pair[0].npv.unwrap() >= pair[1].npv.unwrap())
        );

        // identical days make the daily mean equal the yearly ratio
        let yearly = report.indicators.self_sufficiency.value().unwrap();
        let daily = report.mean_daily_self_sufficiency.value().unwrap();
        assert!((yearly - daily).abs() < 1e-9);
        assert_eq!(report.indicators, outcome.best.indicators);
        // no degradation, so every simulated year looks like the first
        let horizon = report.constraint_self_sufficiency.value().unwrap();
        assert!((horizon - yearly).abs() < 1e-9);
        assert!(!report.summary_lines().is_empty());
    }

    #[test]
    fn test_write_json() {
        let (consumption, irradiance) = flat_year();
        let outcome = size_installation(&consumption, &irradiance, &config()).unwrap();
        let report = SizingReport::build(&outcome, &consumption).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        report.write_json(&path).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["configuration"]["panel_type"]["name"], "Flat");
        assert_eq!(value["profiles"]["day"]["consumption"].as_array().unwrap().len(), 24);
    }

    #[test]
    fn test_mismatched_consumption_is_rejected() {
        let (consumption, irradiance) = flat_year();
        let outcome = size_installation(&consumption, &irradiance, &config()).unwrap();
        let shifted = consumption.slice(1, consumption.len());
        assert!(SizingReport::build(&outcome, &shifted).is_err());
    }
}
