use serde::{Deserialize, Serialize};
use ts_rs::TS;
use utoipa::ToSchema;

/// One support point of a derating curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./panel.ts")]
pub struct DeratingPoint {
    /// Irradiance in kW/m²
    pub irradiance_kw_m2: f64,
    /// Efficiency multiplier at this irradiance
    pub factor: f64,
}

/// Efficiency multiplier as a piecewise-linear function of irradiance.
///
/// Values outside the first/last support point are clamped to the end factors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./panel.ts")]
pub struct DeratingCurve {
    /// Support points ordered by strictly increasing irradiance.
    pub points: Vec<DeratingPoint>,
}

impl DeratingCurve {
    pub fn new(points: Vec<DeratingPoint>) -> Result<Self, String> {
        let curve = Self { points };
        curve.validate()?;
        Ok(curve)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.points.is_empty() {
            return Err("Derating curve needs at least one point".to_string());
        }
        for point in &self.points {
            if !point.factor.is_finite() || point.factor < 0.0 {
                return Err(format!("Invalid derating factor: {}", point.factor));
            }
            if !point.irradiance_kw_m2.is_finite() {
                return Err("Derating irradiance must be finite".to_string());
            }
        }
        if self
            .points
            .windows(2)
            .any(|pair| pair[1].irradiance_kw_m2 <= pair[0].irradiance_kw_m2)
        {
            return Err("Derating points must have strictly increasing irradiance".to_string());
        }
        Ok(())
    }

    pub fn factor_at(&self, irradiance_kw_m2: f64) -> f64 {
        let (Some(first), Some(last)) = (self.points.first(), self.points.last()) else {
            return 1.0;
        };
        if irradiance_kw_m2 <= first.irradiance_kw_m2 {
            return first.factor;
        }
        if irradiance_kw_m2 >= last.irradiance_kw_m2 {
            return last.factor;
        }

        self.points
            .windows(2)
            .find(|pair| irradiance_kw_m2 <= pair[1].irradiance_kw_m2)
            .map(|pair| {
                let (low, high) = (pair[0], pair[1]);
                let share = (irradiance_kw_m2 - low.irradiance_kw_m2)
                    / (high.irradiance_kw_m2 - low.irradiance_kw_m2);
                low.factor + share * (high.factor - low.factor)
            })
            .unwrap_or(last.factor)
    }
}

/// A panel model from the catalog. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema, TS)]
#[ts(export, export_to = "./panel.ts")]
pub struct PanelType {
    /// Catalog name, unique within a catalog.
    pub name: String,
    /// Rated power per square metre at 1 kW/m² (W/m²).
    pub rated_power_w_per_m2: f64,
    /// Cost of one panel including installation.
    pub unit_cost: f64,
    /// Area of one panel (m²).
    pub unit_area_m2: f64,
    /// Annual fractional decline in output (0.005 = 0.5 % per year).
    pub degradation_rate: f64,
    /// Optional irradiance dependent derating on top of the system efficiency.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derating: Option<DeratingCurve>,
}

impl PanelType {
    pub fn new(
        name: impl Into<String>,
        rated_power_w_per_m2: f64,
        unit_cost: f64,
        unit_area_m2: f64,
        degradation_rate: f64,
    ) -> Self {
        Self {
            name: name.into(),
            rated_power_w_per_m2,
            unit_cost,
            unit_area_m2,
            degradation_rate,
            derating: None,
        }
    }

    /// Builds a panel from its datasheet power and a price per watt, the way panels
    /// are usually quoted by installers.
    pub fn from_nominal_power(
        name: impl Into<String>,
        nominal_power_w: f64,
        cost_per_watt: f64,
        unit_area_m2: f64,
        degradation_rate: f64,
    ) -> Self {
        Self::new(
            name,
            nominal_power_w / unit_area_m2,
            nominal_power_w * cost_per_watt,
            unit_area_m2,
            degradation_rate,
        )
    }

    pub fn with_derating(mut self, derating: DeratingCurve) -> Self {
        self.derating = Some(derating);
        self
    }

    /// Rated power of a single panel in W
    pub fn rated_power_w(&self) -> f64 {
        self.rated_power_w_per_m2 * self.unit_area_m2
    }

    /// Irradiance dependent efficiency multiplier, 1.0 without a curve
    pub fn derating_factor(&self, irradiance_kw_m2: f64) -> f64 {
        self.derating
            .as_ref()
            .map_or(1.0, |curve| curve.factor_at(irradiance_kw_m2))
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Panel name must not be empty".to_string());
        }
        if !(self.rated_power_w_per_m2.is_finite() && self.rated_power_w_per_m2 > 0.0) {
            return Err(format!(
                "Panel '{}': rated power must be positive, got {}",
                self.name, self.rated_power_w_per_m2
            ));
        }
        if !(self.unit_area_m2.is_finite() && self.unit_area_m2 > 0.0) {
            return Err(format!(
                "Panel '{}': unit area must be positive, got {}",
                self.name, self.unit_area_m2
            ));
        }
        if !(self.unit_cost.is_finite() && self.unit_cost >= 0.0) {
            return Err(format!(
                "Panel '{}': unit cost must not be negative, got {}",
                self.name, self.unit_cost
            ));
        }
        if !(0.0..1.0).contains(&self.degradation_rate) {
            return Err(format!(
                "Panel '{}': degradation rate must be in [0, 1), got {}",
                self.name, self.degradation_rate
            ));
        }
        if let Some(curve) = &self.derating {
            curve
                .validate()
                .map_err(|e| format!("Panel '{}': {}", self.name, e))?;
        }
        Ok(())
    }
}
