use std::cmp::Ordering;
use std::time::Instant;

use pv_model::series::HourlySeries;
use pv_model::sizing::{
    CandidateSummary, ConstraintSet, EvaluationResult, Feasibility, Fraction, InfeasibilityReason,
    InfeasibilityReport, OptimizationOutcome, PvConfiguration,
};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::error::{Result, SizingError};
use crate::general::finance::{
    internal_rate_of_return, npv_trajectory, payback_year, savings_trajectory, summarize_year,
};
use crate::general::series_store::TimeSeriesStore;
use crate::sizing::balance::{BalanceTotals, EnergyBalance};
use crate::sizing::config::{SelfSufficiencyWindow, SizingConfig};
use crate::sizing::horizon::SimulationHorizon;
use crate::sizing::indicators::indicators_from_totals;
use crate::sizing::production::{check_alignment, check_values, simulate_year};

// Slack for area comparisons, panel areas are rarely exact in binary
const AREA_EPSILON: f64 = 1e-9;

/// Evaluates single configurations against validated input series
#[derive(Debug)]
pub struct Evaluator<'a> {
    config: &'a SizingConfig,
    horizon: SimulationHorizon,
}

impl<'a> Evaluator<'a> {
    /// Validates the series and cuts them into reference years
    pub fn new(
        consumption: &HourlySeries,
        irradiance: &HourlySeries,
        config: &'a SizingConfig,
    ) -> Result<Self> {
        check_alignment(consumption, irradiance)?;
        check_values(consumption, "consumption", false)?;
        check_values(irradiance, "irradiance", true)?;
        let horizon = SimulationHorizon::split(consumption, irradiance)?;

        Ok(Self { config, horizon })
    }

    pub fn horizon(&self) -> &SimulationHorizon {
        &self.horizon
    }

    /// Simulates the whole horizon for one configuration
    pub fn evaluate(&self, configuration: &PvConfiguration) -> Result<EvaluationResult> {
        let finance = &self.config.finance;
        let mut yearly = Vec::with_capacity(finance.horizon_years as usize);
        let mut first_year_production = None;
        let mut first_year_totals = BalanceTotals::default();
        let mut horizon_totals = BalanceTotals::default();

        for year in 1..=finance.horizon_years {
            let reference = self.horizon.for_year(year);
            let production =
                simulate_year(&reference.irradiance, configuration, &self.config.system, year)?;
            let balance = EnergyBalance::compute(&reference.consumption, &production)?;
            let totals = balance.totals();

            if year == 1 {
                first_year_totals = totals;
                first_year_production = Some(production);
            }
            horizon_totals.merge(&totals);
            yearly.push(summarize_year(&balance, &self.config.tariff, year));
        }

        let production = first_year_production.ok_or_else(|| {
            SizingError::InvalidTariff("horizon must be at least one year".to_string())
        })?;
        let indicators = indicators_from_totals(&first_year_totals);
        let constraint_self_sufficiency = match self.config.self_sufficiency_window {
            SelfSufficiencyWindow::FirstYear => indicators.self_sufficiency,
            SelfSufficiencyWindow::Horizon => {
                indicators_from_totals(&horizon_totals).self_sufficiency
            }
        };

        let investment_cost = configuration.investment_cost();
        let npv_trajectory = npv_trajectory(&yearly, investment_cost, finance)?;
        let savings = savings_trajectory(&yearly, investment_cost, finance)?;
        let savings_flows: Vec<f64> = savings.iter().map(|point| point.cash_flow).collect();
        let feasibility = check_constraints(
            &self.config.constraints,
            configuration,
            constraint_self_sufficiency,
        );

        Ok(EvaluationResult {
            configuration: configuration.clone(),
            production,
            indicators,
            constraint_self_sufficiency,
            yearly,
            payback_year: payback_year(&savings),
            internal_rate_of_return: internal_rate_of_return(&savings_flows),
            npv_trajectory,
            feasibility,
        })
    }

    /// Evaluates a candidate into its light summary; a failed evaluation marks it failed
    pub fn summarize(&self, configuration: &PvConfiguration) -> CandidateSummary {
        let (npv, self_sufficiency, feasibility) = match self.evaluate(configuration) {
            Ok(result) => {
                debug!(
                    "{} x {}: NPV {:.2}, self-sufficiency {:?}",
                    configuration.panel_count,
                    configuration.panel_type.name,
                    result.npv(),
                    result.constraint_self_sufficiency
                );
                (
                    Some(result.npv()),
                    result.constraint_self_sufficiency,
                    result.feasibility,
                )
            }
            Err(e) => {
                warn!(
                    "Evaluation failed for {} x {}: {}",
                    configuration.panel_count, configuration.panel_type.name, e
                );
                (None, Fraction::NotApplicable, Feasibility::failed())
            }
        };

        CandidateSummary {
            panel_type: configuration.panel_type.name.clone(),
            panel_count: configuration.panel_count,
            installed_area_m2: configuration.installed_area_m2(),
            investment_cost: configuration.investment_cost(),
            npv,
            self_sufficiency,
            feasibility,
        }
    }
}

/// Which constraints a configuration with the given self-sufficiency satisfies
pub fn check_constraints(
    constraints: &ConstraintSet,
    configuration: &PvConfiguration,
    self_sufficiency: Fraction,
) -> Feasibility {
    let meets_area = constraints
        .max_area_m2
        .is_none_or(|max_area| configuration.installed_area_m2() <= max_area + AREA_EPSILON);
    let meets_self_sufficiency = constraints
        .min_self_sufficiency
        .is_none_or(|minimum| self_sufficiency.value().is_some_and(|value| value >= minimum));

    Feasibility {
        meets_self_sufficiency,
        meets_area,
        evaluated: true,
    }
}

/// Every candidate in search order: catalog order, then ascending panel count.
/// Candidates are built lazily, so a budget can stop before the space is materialised.
pub fn enumerate_candidates(
    config: &SizingConfig,
) -> impl Iterator<Item = PvConfiguration> + '_ {
    let orientation = config.system.orientation;
    config.panels.iter().flat_map(move |spec| {
        spec.bounds
            .counts()
            .map(move |count| PvConfiguration::new(spec.panel.clone(), count, orientation))
    })
}

/// Index of the winning candidate.
///
/// Feasible candidates whose NPV lies within `npv_tolerance` of the best NPV are equivalent;
/// among those the smallest area wins, then the lowest investment, then the earliest position.
pub fn select_best(candidates: &[CandidateSummary], npv_tolerance: f64) -> Option<usize> {
    let feasible: Vec<(usize, &CandidateSummary, f64)> = candidates
        .iter()
        .enumerate()
        .filter(|(_, candidate)| candidate.feasibility.is_feasible())
        .filter_map(|(index, candidate)| candidate.npv.map(|npv| (index, candidate, npv)))
        .collect();

    let best_npv = feasible
        .iter()
        .map(|&(_, _, npv)| npv)
        .max_by(|a, b| a.total_cmp(b))?;

    feasible
        .into_iter()
        .filter(|&(_, _, npv)| npv >= best_npv - npv_tolerance)
        .min_by(|(index_a, a, _), (index_b, b, _)| {
            a.installed_area_m2
                .total_cmp(&b.installed_area_m2)
                .then_with(|| a.investment_cost.total_cmp(&b.investment_cost))
                .then_with(|| index_a.cmp(index_b))
        })
        .map(|(index, _, _)| index)
}

/// Explains why none of `candidates` is feasible
pub fn infeasibility_report(
    candidates: &[CandidateSummary],
    budget_exhausted: bool,
) -> InfeasibilityReport {
    let evaluated: Vec<&CandidateSummary> = candidates
        .iter()
        .filter(|candidate| candidate.feasibility.evaluated)
        .collect();
    let violating_area = evaluated
        .iter()
        .filter(|candidate| !candidate.feasibility.meets_area)
        .count();
    let violating_self_sufficiency = evaluated
        .iter()
        .filter(|candidate| !candidate.feasibility.meets_self_sufficiency)
        .count();

    let reason = if evaluated.is_empty() {
        InfeasibilityReason::NoCandidates
    } else {
        let any_area_ok = violating_area < evaluated.len();
        let any_self_sufficiency_ok = violating_self_sufficiency < evaluated.len();
        match (any_area_ok, any_self_sufficiency_ok) {
            (false, false) => InfeasibilityReason::AreaAndSelfSufficiency,
            (false, true) => InfeasibilityReason::Area,
            (true, false) => InfeasibilityReason::SelfSufficiency,
            (true, true) => InfeasibilityReason::Combination,
        }
    };

    InfeasibilityReport {
        reason,
        evaluated: candidates.len(),
        violating_area,
        violating_self_sufficiency,
        failed: candidates.len() - evaluated.len(),
        budget_exhausted,
    }
}

/// Exhaustive search for the configuration with the highest NPV
pub struct ConfigurationOptimizer<'a> {
    config: &'a SizingConfig,
}

impl<'a> ConfigurationOptimizer<'a> {
    pub fn new(config: &'a SizingConfig) -> Self {
        Self { config }
    }

    pub fn optimize(
        &self,
        consumption: &HourlySeries,
        irradiance: &HourlySeries,
    ) -> Result<OptimizationOutcome> {
        self.config.validate()?;
        let evaluator = Evaluator::new(consumption, irradiance, self.config)?;

        let total_candidates = self.config.candidate_count();
        let budget = self.config.search.max_candidates.unwrap_or(total_candidates);
        let budget_exhausted = total_candidates > budget;
        if budget_exhausted {
            warn!(
                "Evaluation budget of {} covers only part of the {} candidates",
                budget, total_candidates
            );
        }

        let started = Instant::now();
        // only the light summaries outlive this block
        let summaries: Vec<CandidateSummary> = {
            let candidates: Vec<PvConfiguration> =
                enumerate_candidates(self.config).take(budget).collect();
            info!(
                "Evaluating {} candidates over {} years ({} reference years)",
                candidates.len(),
                self.config.finance.horizon_years,
                evaluator.horizon().reference_years().len()
            );
            if self.config.search.parallel {
                candidates
                    .par_iter()
                    .map(|candidate| evaluator.summarize(candidate))
                    .collect()
            } else {
                candidates
                    .iter()
                    .map(|candidate| evaluator.summarize(candidate))
                    .collect()
            }
        };
        info!(
            "Evaluated {} candidates in {} ms",
            summaries.len(),
            started.elapsed().as_millis()
        );

        let Some(best_index) = select_best(&summaries, self.config.search.npv_tolerance) else {
            let report = infeasibility_report(&summaries, budget_exhausted);
            warn!("No feasible configuration: {}", report.reason.label());
            return Err(SizingError::Infeasible(report));
        };

        let winner = &summaries[best_index];
        let configuration = self
            .config
            .configuration(&winner.panel_type, winner.panel_count)
            .ok_or_else(|| {
                SizingError::InvalidConfig(format!(
                    "panel type '{}' is missing from the catalog",
                    winner.panel_type
                ))
            })?;
        let best = evaluator.evaluate(&configuration)?;
        info!(
            "Best configuration: {} x {} ({:.2} kWp, {:.1} m²), NPV {:.2}",
            best.configuration.panel_count,
            best.configuration.panel_type.name,
            best.configuration.installed_capacity_kw(),
            best.configuration.installed_area_m2(),
            best.npv()
        );

        Ok(OptimizationOutcome {
            best,
            evaluated: summaries.len(),
            candidates: summaries,
            total_candidates,
            budget_exhausted,
        })
    }
}

/// Sizes an installation for the given history and configuration
pub fn size_installation(
    consumption: &HourlySeries,
    irradiance: &HourlySeries,
    config: &SizingConfig,
) -> Result<OptimizationOutcome> {
    ConfigurationOptimizer::new(config).optimize(consumption, irradiance)
}

/// Like [`size_installation`], reading the series from a store
pub fn size_from_store(
    store: &dyn TimeSeriesStore,
    config: &SizingConfig,
) -> Result<OptimizationOutcome> {
    config.validate()?;
    let consumption = store.consumption()?;
    let irradiance = store.irradiance()?;
    size_installation(&consumption, &irradiance, config)
}

/// Candidates ordered by NPV, best first; failed ones last
pub fn rank_candidates(candidates: &[CandidateSummary]) -> Vec<CandidateSummary> {
    let mut ranked = candidates.to_vec();
    ranked.sort_by(|a, b| match (a.npv, b.npv) {
        (Some(a), Some(b)) => b.total_cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
    ranked
}
