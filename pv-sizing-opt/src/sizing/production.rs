use pv_model::series::HourlySeries;
use pv_model::sizing::PvConfiguration;

use crate::error::{Result, SizingError};
use crate::sizing::config::SystemParams;

/// Checks that consumption and irradiance cover the same hours
pub fn check_alignment(consumption: &HourlySeries, irradiance: &HourlySeries) -> Result<()> {
    if consumption.start != irradiance.start {
        return Err(SizingError::SeriesMismatch(format!(
            "consumption starts at {} but irradiance at {}",
            consumption.start, irradiance.start
        )));
    }
    if consumption.len() != irradiance.len() {
        return Err(SizingError::SeriesMismatch(format!(
            "consumption has {} hours but irradiance {}",
            consumption.len(),
            irradiance.len()
        )));
    }
    Ok(())
}

/// Every value must be finite and, unless `allow_negative`, non-negative
pub fn check_values(series: &HourlySeries, label: &str, allow_negative: bool) -> Result<()> {
    if let Some((index, value)) = series
        .values
        .iter()
        .enumerate()
        .find(|(_, value)| !value.is_finite() || (!allow_negative && **value < 0.0))
    {
        return Err(SizingError::SeriesMismatch(format!(
            "{} value {} at {} is invalid",
            label,
            value,
            series.timestamp(index)
        )));
    }
    Ok(())
}

/// Hourly production in kWh of a new installation.
///
/// `kWh = max(irradiance, 0) * kWp * efficiency * derating(irradiance)`; negative irradiance
/// readings are sensor noise and count as darkness.
pub fn simulate_production(
    irradiance: &HourlySeries,
    configuration: &PvConfiguration,
    system: &SystemParams,
) -> Result<HourlySeries> {
    check_values(irradiance, "irradiance", true)?;

    let capacity_kw = configuration.installed_capacity_kw();
    let panel = &configuration.panel_type;
    let values = irradiance
        .values
        .iter()
        .map(|&irradiance_kw_m2| {
            let irradiance_kw_m2 = irradiance_kw_m2.max(0.0);
            irradiance_kw_m2 * capacity_kw * system.efficiency * panel.derating_factor(irradiance_kw_m2)
        })
        .collect();

    Ok(HourlySeries {
        start: irradiance.start,
        values,
    })
}

/// Output multiplier in simulated year `year` (1-based)
pub fn degradation_factor(configuration: &PvConfiguration, year: u32) -> f64 {
    (1.0 - configuration.panel_type.degradation_rate).powi(year.saturating_sub(1) as i32)
}

/// Production in simulated year `year`, degradation included
pub fn simulate_year(
    irradiance: &HourlySeries,
    configuration: &PvConfiguration,
    system: &SystemParams,
    year: u32,
) -> Result<HourlySeries> {
    let production = simulate_production(irradiance, configuration, system)?;
    let factor = degradation_factor(configuration, year);
    if factor == 1.0 {
        Ok(production)
    } else {
        Ok(production.scaled(factor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pv_model::panel::{DeratingCurve, DeratingPoint, PanelType};
    use pv_model::sizing::Orientation;

    fn irradiance(values: Vec<f64>) -> HourlySeries {
        let start = NaiveDate::from_ymd_opt(2023, 6, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        HourlySeries::new(start, values).unwrap()
    }

    fn ten_square_metres(degradation_rate: f64) -> PvConfiguration {
        let panel = PanelType::new("Test", 100.0, 100.0, 1.0, degradation_rate);
        PvConfiguration::new(panel, 10, Orientation::default())
    }

    #[test]
    fn test_production_formula() {
        // 10 m² at 100 W/m² is 1 kWp
        let production = simulate_production(
            &irradiance(vec![0.2, 0.0, 1.0]),
            &ten_square_metres(0.0),
            &SystemParams::default(),
        )
        .unwrap();

        assert!((production.values[0] - 0.16).abs() < 1e-12);
        assert_eq!(production.values[1], 0.0);
        assert!((production.values[2] - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_negative_irradiance_clamps_to_zero() {
        let production = simulate_production(
            &irradiance(vec![-0.01]),
            &ten_square_metres(0.0),
            &SystemParams::default(),
        )
        .unwrap();
        assert_eq!(production.values, vec![0.0]);
    }

    #[test]
    fn test_non_finite_irradiance_is_rejected() {
        let result = simulate_production(
            &irradiance(vec![0.2, f64::NAN]),
            &ten_square_metres(0.0),
            &SystemParams::default(),
        );
        assert!(matches!(result, Err(SizingError::SeriesMismatch(_))));
    }

    #[test]
    fn test_derating_curve_applies() {
        let curve = DeratingCurve::new(vec![
            DeratingPoint {
                irradiance_kw_m2: 0.0,
                factor: 0.5,
            },
            DeratingPoint {
                irradiance_kw_m2: 0.4,
                factor: 1.0,
            },
        ])
        .unwrap();
        let mut configuration = ten_square_metres(0.0);
        configuration.panel_type = configuration.panel_type.with_derating(curve);

        let production =
            simulate_production(&irradiance(vec![0.2]), &configuration, &SystemParams::default())
                .unwrap();
        assert!((production.values[0] - 0.16 * 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_degradation_by_year() {
        let configuration = ten_square_metres(0.1);
        assert_eq!(degradation_factor(&configuration, 1), 1.0);
        assert!((degradation_factor(&configuration, 3) - 0.81).abs() < 1e-12);

        let third = simulate_year(
            &irradiance(vec![0.2]),
            &configuration,
            &SystemParams::default(),
            3,
        )
        .unwrap();
        assert!((third.values[0] - 0.16 * 0.81).abs() < 1e-12);
    }

    #[test]
    fn test_alignment() {
        let a = irradiance(vec![0.0; 3]);
        assert!(check_alignment(&a, &a).is_ok());
        assert!(check_alignment(&a, &a.slice(1, 3)).is_err());
        assert!(check_alignment(&a, &a.slice(0, 2)).is_err());
    }

    #[test]
    fn test_negative_consumption_is_rejected() {
        let consumption = irradiance(vec![1.0, -0.5]);
        assert!(check_values(&consumption, "consumption", false).is_err());
        assert!(check_values(&consumption, "irradiance", true).is_ok());
    }
}
