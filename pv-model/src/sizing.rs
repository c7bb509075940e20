use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

use crate::panel::PanelType;
use crate::series::HourlySeries;

/// Mounting parameters of the array.
///
/// Irradiance series are expected in the plane of the array, so these are carried along
/// for reporting and do not change the simulated production.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct Orientation {
    /// Tilt from horizontal in degrees
    pub tilt_deg: f64,
    /// Azimuth in degrees, 180 = south
    pub azimuth_deg: f64,
}

impl Default for Orientation {
    fn default() -> Self {
        Self {
            tilt_deg: 30.0,
            azimuth_deg: 180.0,
        }
    }
}

/// One candidate installation: a panel type and how many of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct PvConfiguration {
    pub panel_type: PanelType,
    pub panel_count: u32,
    pub orientation: Orientation,
}

impl PvConfiguration {
    pub fn new(panel_type: PanelType, panel_count: u32, orientation: Orientation) -> Self {
        Self {
            panel_type,
            panel_count,
            orientation,
        }
    }

    /// Installed peak capacity in kW
    pub fn installed_capacity_kw(&self) -> f64 {
        self.panel_count as f64 * self.panel_type.rated_power_w() / 1000.0
    }

    /// Roof area taken by the panels in m²
    pub fn installed_area_m2(&self) -> f64 {
        self.panel_count as f64 * self.panel_type.unit_area_m2
    }

    pub fn investment_cost(&self) -> f64 {
        self.panel_count as f64 * self.panel_type.unit_cost
    }
}

/// Operational limits for a search. An empty set means unconstrained search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(default)]
#[ts(export, export_to = "./sizing.ts")]
pub struct ConstraintSet {
    /// Lowest acceptable self-sufficiency, a fraction in [0, 1]
    pub min_self_sufficiency: Option<f64>,
    /// Largest usable roof area in m²
    pub max_area_m2: Option<f64>,
}

impl ConstraintSet {
    pub fn unconstrained() -> Self {
        Self::default()
    }

    pub fn is_unconstrained(&self) -> bool {
        self.min_self_sufficiency.is_none() && self.max_area_m2.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        if let Some(minimum) = self.min_self_sufficiency {
            if !(0.0..=1.0).contains(&minimum) {
                return Err(format!(
                    "Minimum self-sufficiency must be in [0, 1], got {}",
                    minimum
                ));
            }
        }
        if let Some(area) = self.max_area_m2 {
            if !(area.is_finite() && area > 0.0) {
                return Err(format!("Maximum area must be positive, got {}", area));
            }
        }
        Ok(())
    }
}

/// A ratio that is undefined when its denominator is zero
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "./sizing.ts")]
pub enum Fraction {
    Value(f64),
    NotApplicable,
}

impl Fraction {
    /// `numerator / denominator`, clamped to [0, 1]
    pub fn ratio(numerator: f64, denominator: f64) -> Self {
        if denominator <= 0.0 {
            Fraction::NotApplicable
        } else {
            Fraction::Value((numerator / denominator).clamp(0.0, 1.0))
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            Fraction::Value(value) => Some(*value),
            Fraction::NotApplicable => None,
        }
    }

    pub fn is_applicable(&self) -> bool {
        matches!(self, Fraction::Value(_))
    }
}

/// Technical indicators over one window. The window is fixed by whoever computes them:
/// a simulated year for [`EvaluationResult::indicators`], a calendar bucket for the
/// per-window series of a report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct Indicators {
    /// Share of the window's consumption covered by own production
    pub self_sufficiency: Fraction,
    /// Share of the window's production used on site
    pub self_consumption: Fraction,
    /// Import minus export over the window in kWh, negative for a net exporter
    pub net_exchange_kwh: f64,
    /// Import plus export over the window in kWh
    pub gross_exchange_kwh: f64,
}

/// Energy and money flows of one simulated year
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct YearSummary {
    /// Simulated year, starting at 1
    pub year: u32,
    pub consumption_kwh: f64,
    pub production_kwh: f64,
    pub self_consumed_kwh: f64,
    pub import_kwh: f64,
    pub export_kwh: f64,
    /// Imported energy priced hour by hour
    pub import_cost: f64,
    /// Exported energy priced hour by hour
    pub export_revenue: f64,
    /// What the whole consumption would cost without the installation
    pub baseline_cost: f64,
}

/// One year of the NPV trajectory
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct NpvPoint {
    pub year: u32,
    pub cash_flow: f64,
    pub discounted_cash_flow: f64,
    /// Sum of discounted cash flows from year 0 up to and including this year
    pub cumulative_npv: f64,
}

/// Which constraints a candidate satisfies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct Feasibility {
    pub meets_self_sufficiency: bool,
    pub meets_area: bool,
    /// False when the evaluation itself failed
    pub evaluated: bool,
}

impl Feasibility {
    pub fn is_feasible(&self) -> bool {
        self.evaluated && self.meets_self_sufficiency && self.meets_area
    }

    pub fn failed() -> Self {
        Self {
            meets_self_sufficiency: false,
            meets_area: false,
            evaluated: false,
        }
    }
}

/// Full evaluation of one configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct EvaluationResult {
    pub configuration: PvConfiguration,
    /// Hourly production of the first simulated year in kWh
    pub production: HourlySeries,
    /// Annual indicators of the first simulated year
    pub indicators: Indicators,
    /// Self-sufficiency over the window the minimum is checked against (first year or
    /// whole horizon)
    pub constraint_self_sufficiency: Fraction,
    pub yearly: Vec<YearSummary>,
    /// Year 0 up to the horizon
    pub npv_trajectory: Vec<NpvPoint>,
    /// Fractional year in which the cumulative NPV turns non-negative
    pub payback_year: Option<f64>,
    pub internal_rate_of_return: Option<f64>,
    pub feasibility: Feasibility,
}

impl EvaluationResult {
    /// NPV at the horizon
    pub fn npv(&self) -> f64 {
        self.npv_trajectory
            .last()
            .map_or(0.0, |point| point.cumulative_npv)
    }
}

/// Light record kept for every evaluated candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct CandidateSummary {
    /// Name of the panel type
    pub panel_type: String,
    pub panel_count: u32,
    pub installed_area_m2: f64,
    pub investment_cost: f64,
    /// NPV at the horizon, `None` when the evaluation failed
    pub npv: Option<f64>,
    /// Self-sufficiency over the constraint window
    pub self_sufficiency: Fraction,
    pub feasibility: Feasibility,
}

/// Why no candidate could be accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "./sizing.ts")]
pub enum InfeasibilityReason {
    /// No candidate fits on the usable area
    Area,
    /// No candidate reaches the minimum self-sufficiency
    SelfSufficiency,
    /// Neither constraint can be met by any candidate
    AreaAndSelfSufficiency,
    /// Each constraint alone can be met, but never by the same candidate
    Combination,
    /// Nothing was evaluated successfully
    NoCandidates,
}

impl InfeasibilityReason {
    pub fn label(&self) -> &'static str {
        match self {
            InfeasibilityReason::Area => "area",
            InfeasibilityReason::SelfSufficiency => "self-sufficiency",
            InfeasibilityReason::AreaAndSelfSufficiency => "area and self-sufficiency",
            InfeasibilityReason::Combination => "combination",
            InfeasibilityReason::NoCandidates => "no candidates",
        }
    }
}

/// Details returned instead of a result when the search finds no feasible candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct InfeasibilityReport {
    pub reason: InfeasibilityReason,
    pub evaluated: usize,
    /// Candidates that exceed the maximum area
    pub violating_area: usize,
    /// Candidates below the minimum self-sufficiency
    pub violating_self_sufficiency: usize,
    /// Candidates whose evaluation failed
    pub failed: usize,
    pub budget_exhausted: bool,
}

/// Result of a successful search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./sizing.ts")]
pub struct OptimizationOutcome {
    pub best: EvaluationResult,
    /// Every evaluated candidate in enumeration order
    pub candidates: Vec<CandidateSummary>,
    pub total_candidates: usize,
    pub evaluated: usize,
    /// Set when the evaluation budget stopped the search before the space was exhausted
    pub budget_exhausted: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_derived_values() {
        let panel = PanelType::new("Test", 100.0, 120.0, 2.0, 0.0);
        let configuration = PvConfiguration::new(panel, 5, Orientation::default());

        assert!((configuration.installed_capacity_kw() - 1.0).abs() < 1e-12);
        assert_eq!(configuration.installed_area_m2(), 10.0);
        assert_eq!(configuration.investment_cost(), 600.0);
    }

    #[test]
    fn test_fraction_ratio() {
        assert_eq!(Fraction::ratio(1.0, 0.0), Fraction::NotApplicable);
        assert_eq!(Fraction::ratio(0.0, 0.0), Fraction::NotApplicable);
        assert_eq!(Fraction::ratio(1.0, 4.0), Fraction::Value(0.25));
        assert_eq!(Fraction::ratio(1.0 + 1e-15, 1.0).value(), Some(1.0));
    }

    #[test]
    fn test_constraint_validation() {
        assert!(ConstraintSet::unconstrained().validate().is_ok());
        assert!(ConstraintSet::unconstrained().is_unconstrained());

        let too_high = ConstraintSet {
            min_self_sufficiency: Some(1.2),
            max_area_m2: None,
        };
        assert!(too_high.validate().is_err());

        let no_area = ConstraintSet {
            min_self_sufficiency: None,
            max_area_m2: Some(0.0),
        };
        assert!(no_area.validate().is_err());
    }

    #[test]
    fn test_feasibility() {
        let ok = Feasibility {
            meets_self_sufficiency: true,
            meets_area: true,
            evaluated: true,
        };
        assert!(ok.is_feasible());
        assert!(!Feasibility::failed().is_feasible());
        assert_eq!(InfeasibilityReason::Area.label(), "area");
    }
}
