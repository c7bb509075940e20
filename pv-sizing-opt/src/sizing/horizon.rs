use chrono::Months;
use pv_model::series::HourlySeries;
use tracing::warn;

use crate::error::{Result, SizingError};

/// One calendar year of aligned input data
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceYear {
    pub consumption: HourlySeries,
    pub irradiance: HourlySeries,
}

/// The input series cut into whole years.
///
/// Simulated year `t` (1-based) reuses reference year `(t - 1) mod n`, so a single year of
/// history is repeated over the whole horizon.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationHorizon {
    years: Vec<ReferenceYear>,
}

impl SimulationHorizon {
    /// Splits aligned series at each anniversary of the first timestamp. A trailing partial
    /// year is dropped.
    pub fn split(consumption: &HourlySeries, irradiance: &HourlySeries) -> Result<Self> {
        if !consumption.is_aligned_with(irradiance) {
            return Err(SizingError::SeriesMismatch(format!(
                "consumption ({} hours from {}) and irradiance ({} hours from {}) are not aligned",
                consumption.len(),
                consumption.start,
                irradiance.len(),
                irradiance.start
            )));
        }

        let mut years = Vec::new();
        let mut from = 0;
        for k in 1u32.. {
            let Some(anniversary) = consumption.start.checked_add_months(Months::new(12 * k))
            else {
                break;
            };
            let till = (anniversary - consumption.start).num_hours() as usize;
            if till > consumption.len() {
                break;
            }
            years.push(ReferenceYear {
                consumption: consumption.slice(from, till),
                irradiance: irradiance.slice(from, till),
            });
            from = till;
        }

        if years.is_empty() {
            return Err(SizingError::SeriesMismatch(format!(
                "at least one full year of hourly data is needed, got {} hours from {}",
                consumption.len(),
                consumption.start
            )));
        }
        if from < consumption.len() {
            warn!(
                "Dropping {} trailing hours that do not form a full year",
                consumption.len() - from
            );
        }

        Ok(Self { years })
    }

    pub fn reference_years(&self) -> &[ReferenceYear] {
        &self.years
    }

    /// Reference data for simulated year `year` (1-based)
    pub fn for_year(&self, year: u32) -> &ReferenceYear {
        let index = (year.max(1) as usize - 1) % self.years.len();
        &self.years[index]
    }

    pub fn first_year(&self) -> &ReferenceYear {
        &self.years[0]
    }
}
