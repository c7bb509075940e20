use std::path::Path;

use anyhow::Context;
use indexmap::IndexMap;
use pv_model::panel::PanelType;
use pv_model::sizing::{ConstraintSet, Orientation, PvConfiguration};
use pv_model::tariff::Tariff;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Result, SizingError};
use crate::general::finance::FinanceParams;

/// Range of panel counts searched for one panel type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchBounds {
    pub min_count: u32,
    pub max_count: u32,
    pub step: u32,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            min_count: 1,
            max_count: 20,
            step: 1,
        }
    }
}

impl SearchBounds {
    pub fn new(min_count: u32, max_count: u32, step: u32) -> Self {
        Self {
            min_count,
            max_count,
            step,
        }
    }

    /// Panel counts in ascending order
    pub fn counts(self) -> impl Iterator<Item = u32> {
        (self.min_count..=self.max_count).step_by(self.step.max(1) as usize)
    }

    pub fn len(&self) -> usize {
        if self.min_count > self.max_count {
            0
        } else {
            ((self.max_count - self.min_count) / self.step.max(1)) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.step == 0 {
            return Err("search step must be at least 1".to_string());
        }
        if self.min_count > self.max_count {
            return Err(format!(
                "minimum count {} exceeds maximum count {}",
                self.min_count, self.max_count
            ));
        }
        Ok(())
    }
}

/// A catalog entry together with the counts to try
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PanelSpec {
    #[serde(flatten)]
    pub panel: PanelType,
    #[serde(default)]
    pub bounds: SearchBounds,
}

impl PanelSpec {
    pub fn new(panel: PanelType, bounds: SearchBounds) -> Self {
        Self { panel, bounds }
    }
}

/// Parameters shared by every candidate installation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemParams {
    /// Overall system efficiency (inverter, wiring, soiling) in (0, 1]
    pub efficiency: f64,
    pub orientation: Orientation,
}

impl Default for SystemParams {
    fn default() -> Self {
        Self {
            efficiency: 0.8,
            orientation: Orientation::default(),
        }
    }
}

/// Period over which self-sufficiency is checked against the minimum
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelfSufficiencyWindow {
    /// First simulated year only
    FirstYear,
    /// All simulated years, degradation included
    #[default]
    Horizon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Evaluate at most this many candidates, in enumeration order
    pub max_candidates: Option<usize>,
    /// NPVs closer than this to the best one count as equal
    pub npv_tolerance: f64,
    /// Evaluate candidates on the rayon thread pool
    pub parallel: bool,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_candidates: None,
            npv_tolerance: 1e-6,
            parallel: true,
        }
    }
}

/// Everything a sizing run needs apart from the time series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SizingConfig {
    pub panels: Vec<PanelSpec>,
    pub tariff: Tariff,
    pub finance: FinanceParams,
    pub system: SystemParams,
    pub constraints: ConstraintSet,
    pub self_sufficiency_window: SelfSufficiencyWindow,
    pub search: SearchParams,
}

impl Default for SizingConfig {
    fn default() -> Self {
        let bounds = SearchBounds::default();
        Self {
            panels: vec![
                PanelSpec::new(
                    PanelType::from_nominal_power("Low-cost", 200.0, 0.16, 1.6, 0.0),
                    bounds,
                ),
                PanelSpec::new(
                    PanelType::from_nominal_power("Standard", 300.0, 0.22, 1.6, 0.0),
                    bounds,
                ),
                PanelSpec::new(
                    PanelType::from_nominal_power("High Efficiency", 415.0, 0.31, 1.6, 0.0),
                    bounds,
                ),
            ],
            tariff: Tariff::fixed(0.25, 0.10),
            finance: FinanceParams::default(),
            system: SystemParams::default(),
            constraints: ConstraintSet::unconstrained(),
            self_sufficiency_window: SelfSufficiencyWindow::Horizon,
            search: SearchParams::default(),
        }
    }
}

impl SizingConfig {
    /// Rejects inconsistent input before anything is simulated
    pub fn validate(&self) -> Result<()> {
        self.constraints
            .validate()
            .map_err(SizingError::InvalidConstraint)?;
        self.tariff.validate().map_err(SizingError::InvalidTariff)?;
        self.finance.validate()?;

        if self.panels.is_empty() {
            return Err(SizingError::InvalidConfig(
                "the panel catalog is empty".to_string(),
            ));
        }
        for spec in &self.panels {
            spec.panel.validate().map_err(SizingError::InvalidConfig)?;
            spec.bounds
                .validate()
                .map_err(|e| SizingError::InvalidConfig(format!("{}: {}", spec.panel.name, e)))?;
        }
        if let Some(duplicate) = self.duplicate_panel_name() {
            return Err(SizingError::InvalidConfig(format!(
                "duplicate panel name '{}'",
                duplicate
            )));
        }

        let efficiency = self.system.efficiency;
        if !(efficiency > 0.0 && efficiency <= 1.0) {
            return Err(SizingError::InvalidConfig(format!(
                "system efficiency must be in (0, 1], got {}",
                efficiency
            )));
        }
        if !(self.search.npv_tolerance.is_finite() && self.search.npv_tolerance >= 0.0) {
            return Err(SizingError::InvalidConfig(format!(
                "NPV tolerance must not be negative, got {}",
                self.search.npv_tolerance
            )));
        }
        if self.search.max_candidates == Some(0) {
            return Err(SizingError::InvalidConfig(
                "the evaluation budget must allow at least one candidate".to_string(),
            ));
        }
        Ok(())
    }

    /// Catalog keyed by panel name, in catalog order. A later entry with a name already
    /// seen replaces the earlier one; `validate` rejects such catalogs.
    pub fn catalog(&self) -> IndexMap<&str, &PanelSpec> {
        self.panels
            .iter()
            .map(|spec| (spec.panel.name.as_str(), spec))
            .collect()
    }

    fn duplicate_panel_name(&self) -> Option<&str> {
        let mut catalog = IndexMap::with_capacity(self.panels.len());
        self.panels
            .iter()
            .map(|spec| spec.panel.name.as_str())
            .find(|&name| catalog.insert(name, ()).is_some())
    }

    /// Installation of `panel_count` panels of the named catalog type
    pub fn configuration(&self, panel_name: &str, panel_count: u32) -> Option<PvConfiguration> {
        self.catalog().get(panel_name).map(|spec| {
            PvConfiguration::new(spec.panel.clone(), panel_count, self.system.orientation)
        })
    }

    /// Size of the full search space
    pub fn candidate_count(&self) -> usize {
        self.panels.iter().map(|spec| spec.bounds.len()).sum()
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let config: SizingConfig =
            toml::from_str(contents).context("Failed to parse sizing configuration")?;
        Ok(config)
    }

    /// Reads and validates a TOML configuration file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.validate()?;
        info!("Loaded sizing configuration from {}", path.display());
        Ok(config)
    }

    /// The default configuration rendered as TOML, a starting point for own files
    pub fn default_file_contents() -> anyhow::Result<String> {
        toml::to_string_pretty(&Self::default()).context("Failed to render default configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::general::finance::CashFlowBasis;

    #[test]
    fn test_default_config_matches_reference_application() {
        let config = SizingConfig::default();
        assert!(config.validate().is_ok());

        let names: Vec<&str> = config.panels.iter().map(|spec| spec.panel.name.as_str()).collect();
        assert_eq!(names, vec!["Low-cost", "Standard", "High Efficiency"]);

        let high = &config.panels[2].panel;
        assert!((high.rated_power_w() - 415.0).abs() < 1e-9);
        assert!((high.unit_cost - 128.65).abs() < 1e-9);
        assert_eq!(config.finance.horizon_years, 5);
        assert_eq!(config.finance.discount_rate, 0.05);
        assert_eq!(config.system.efficiency, 0.8);
        assert_eq!(config.candidate_count(), 60);
    }

    #[test]
    fn test_search_bounds_counts() {
        let bounds = SearchBounds::new(2, 9, 3);
        assert_eq!(bounds.counts().collect::<Vec<_>>(), vec![2, 5, 8]);
        assert_eq!(bounds.len(), 3);
        assert_eq!(SearchBounds::new(1, 3_000_000, 1).len(), 3_000_000);
        assert_eq!(SearchBounds::new(1, 10, 4).len(), 3);
        assert!(SearchBounds::new(5, 1, 1).validate().is_err());
        assert!(SearchBounds::new(1, 5, 0).validate().is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate_names() {
        let mut config = SizingConfig::default();
        config.panels[1].panel.name = "Low-cost".to_string();
        assert!(matches!(
            config.validate(),
            Err(SizingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_error_kinds() {
        let mut config = SizingConfig::default();
        config.constraints.min_self_sufficiency = Some(1.5);
        assert!(matches!(
            config.validate(),
            Err(SizingError::InvalidConstraint(_))
        ));

        let mut config = SizingConfig::default();
        config.tariff = Tariff::fixed(0.25, -0.1);
        assert!(matches!(
            config.validate(),
            Err(SizingError::InvalidTariff(_))
        ));

        let mut config = SizingConfig::default();
        config.panels.clear();
        assert!(matches!(
            config.validate(),
            Err(SizingError::InvalidConfig(_))
        ));

        let mut config = SizingConfig::default();
        config.system.efficiency = 1.2;
        assert!(matches!(
            config.validate(),
            Err(SizingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_catalog_keeps_order() {
        let config = SizingConfig::default();
        let catalog = config.catalog();
        assert_eq!(catalog.get_index(0).map(|(name, _)| *name), Some("Low-cost"));
        assert!(catalog.contains_key("Standard"));

        let configuration = config.configuration("High Efficiency", 7).unwrap();
        assert_eq!(configuration.panel_count, 7);
        assert_eq!(configuration.panel_type.name, "High Efficiency");
        assert!(config.configuration("Unknown", 1).is_none());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let contents = r#"
            [finance]
            horizon_years = 10
            cash_flow_basis = "avoided_cost"

            [constraints]
            max_area_m2 = 12.0

            [[panels]]
            name = "Roof"
            rated_power_w_per_m2 = 200.0
            unit_cost = 150.0
            unit_area_m2 = 1.7
            degradation_rate = 0.005

            [panels.bounds]
            min_count = 2
            max_count = 8
            step = 2

            [tariff.import]
            type = "fixed"
            rate = 0.3

            [tariff.feed_in]
            type = "fixed"
            rate = 0.07
        "#;

        let config = SizingConfig::from_toml(contents).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.finance.horizon_years, 10);
        assert_eq!(config.finance.discount_rate, 0.05);
        assert_eq!(config.finance.cash_flow_basis, CashFlowBasis::AvoidedCost);
        assert_eq!(config.constraints.max_area_m2, Some(12.0));
        assert_eq!(config.panels.len(), 1);
        assert_eq!(config.panels[0].bounds.counts().collect::<Vec<_>>(), vec![2, 4, 6, 8]);
        assert_eq!(config.tariff, Tariff::fixed(0.3, 0.07));
        assert_eq!(config.self_sufficiency_window, SelfSufficiencyWindow::Horizon);
    }

    #[test]
    fn test_load_from_file() {
        let temp_file = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp_file.path(), "[system]\nefficiency = 0.9\n").unwrap();

        let config = SizingConfig::load(temp_file.path()).unwrap();
        assert_eq!(config.system.efficiency, 0.9);
        assert_eq!(config.panels.len(), 3);

        std::fs::write(temp_file.path(), "[system]\nefficiency = 0.0\n").unwrap();
        assert!(SizingConfig::load(temp_file.path()).is_err());
    }

    #[test]
    fn test_default_file_contents_parse_back() {
        let contents = SizingConfig::default_file_contents().unwrap();
        let parsed = SizingConfig::from_toml(&contents).unwrap();
        assert_eq!(parsed, SizingConfig::default());
    }
}
