use pv_model::sizing::{NpvPoint, YearSummary};
use pv_model::tariff::Tariff;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SizingError};
use crate::sizing::balance::EnergyBalance;

/// What the yearly cash flow measures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CashFlowBasis {
    /// Feed-in revenue minus import cost minus O&M
    #[default]
    GridBalance,
    /// Like `GridBalance`, plus the bill the household would pay without panels,
    /// i.e. the savings the installation brings
    AvoidedCost,
}

/// Parameters of the multi-year investment appraisal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FinanceParams {
    /// Annual discount rate (0.05 = 5 %)
    pub discount_rate: f64,
    /// Number of simulated years after the investment
    pub horizon_years: u32,
    /// Yearly operation and maintenance cost as a share of the investment
    pub om_cost_fraction: f64,
    /// Yearly fixed operation and maintenance cost
    pub om_fixed_cost: f64,
    /// Yearly increase of all energy prices (0.02 = 2 %)
    pub price_escalation: f64,
    pub cash_flow_basis: CashFlowBasis,
}

impl Default for FinanceParams {
    fn default() -> Self {
        Self {
            discount_rate: 0.05,
            horizon_years: 5,
            om_cost_fraction: 0.03,
            om_fixed_cost: 0.0,
            price_escalation: 0.0,
            cash_flow_basis: CashFlowBasis::GridBalance,
        }
    }
}

impl FinanceParams {
    pub fn validate(&self) -> Result<()> {
        if self.horizon_years == 0 {
            return Err(SizingError::InvalidTariff(
                "horizon must be at least one year".to_string(),
            ));
        }
        if !self.discount_rate.is_finite() || self.discount_rate <= -1.0 {
            return Err(SizingError::InvalidConfig(format!(
                "discount rate must be greater than -1, got {}",
                self.discount_rate
            )));
        }
        if !self.price_escalation.is_finite() || self.price_escalation <= -1.0 {
            return Err(SizingError::InvalidConfig(format!(
                "price escalation must be greater than -1, got {}",
                self.price_escalation
            )));
        }
        if !(self.om_cost_fraction >= 0.0 && self.om_fixed_cost >= 0.0) {
            return Err(SizingError::InvalidConfig(
                "operation and maintenance costs must not be negative".to_string(),
            ));
        }
        Ok(())
    }

    /// Yearly O&M cost of an installation
    pub fn om_cost(&self, investment_cost: f64) -> f64 {
        self.om_cost_fraction * investment_cost + self.om_fixed_cost
    }
}

/// Prices one simulated year of energy flows hour by hour, so tiered tariffs apply to
/// the hours in which energy is actually imported or exported.
pub fn summarize_year(balance: &EnergyBalance, tariff: &Tariff, year: u32) -> YearSummary {
    let mut summary = YearSummary {
        year,
        ..Default::default()
    };

    for (index, hour) in balance.hours().iter().enumerate() {
        let timestamp = balance.timestamp(index);
        let import_price = tariff.import.rate_at(&timestamp);
        let feed_in_price = tariff.feed_in.rate_at(&timestamp);

        summary.consumption_kwh += hour.consumption;
        summary.production_kwh += hour.production;
        summary.self_consumed_kwh += hour.self_consumed;
        summary.import_kwh += hour.import;
        summary.export_kwh += hour.export;
        summary.import_cost += hour.import * import_price;
        summary.export_revenue += hour.export * feed_in_price;
        summary.baseline_cost += hour.consumption * import_price;
    }

    summary
}

/// Cash flow of a simulated year (year >= 1)
pub fn annual_cash_flow(summary: &YearSummary, investment_cost: f64, params: &FinanceParams) -> f64 {
    let escalation = (1.0 + params.price_escalation).powi(summary.year as i32 - 1);
    let grid_balance = summary.export_revenue - summary.import_cost;
    let energy_value = match params.cash_flow_basis {
        CashFlowBasis::GridBalance => grid_balance,
        CashFlowBasis::AvoidedCost => grid_balance + summary.baseline_cost,
    };

    escalation * energy_value - params.om_cost(investment_cost)
}

/// Builds the NPV trajectory from year 0 (the investment) up to the horizon.
///
/// `yearly` must hold one summary per simulated year, in order. Entry `t` of the result
/// carries the cumulative NPV `sum_{k=0..t} CF_k / (1 + r)^k`.
pub fn npv_trajectory(
    yearly: &[YearSummary],
    investment_cost: f64,
    params: &FinanceParams,
) -> Result<Vec<NpvPoint>> {
    params.validate()?;
    if !(investment_cost.is_finite() && investment_cost >= 0.0) {
        return Err(SizingError::InvalidConfig(format!(
            "investment cost must not be negative, got {}",
            investment_cost
        )));
    }
    if yearly.len() != params.horizon_years as usize {
        return Err(SizingError::SeriesMismatch(format!(
            "expected {} yearly summaries, got {}",
            params.horizon_years,
            yearly.len()
        )));
    }

    let mut trajectory = Vec::with_capacity(yearly.len() + 1);
    trajectory.push(NpvPoint {
        year: 0,
        cash_flow: -investment_cost,
        discounted_cash_flow: -investment_cost,
        cumulative_npv: -investment_cost,
    });

    let mut cumulative_npv = -investment_cost;
    for (index, summary) in yearly.iter().enumerate() {
        let year = index as u32 + 1;
        if summary.year != year {
            return Err(SizingError::SeriesMismatch(format!(
                "yearly summary {} is labelled year {}",
                year, summary.year
            )));
        }

        let cash_flow = annual_cash_flow(summary, investment_cost, params);
        let discounted_cash_flow = cash_flow / (1.0 + params.discount_rate).powi(year as i32);
        cumulative_npv += discounted_cash_flow;

        trajectory.push(NpvPoint {
            year,
            cash_flow,
            discounted_cash_flow,
            cumulative_npv,
        });
    }

    Ok(trajectory)
}

/// Trajectory of the savings against the bill without panels, whatever basis the NPV
/// objective uses. Payback and internal rate of return are read from it.
pub fn savings_trajectory(
    yearly: &[YearSummary],
    investment_cost: f64,
    params: &FinanceParams,
) -> Result<Vec<NpvPoint>> {
    let savings = FinanceParams {
        cash_flow_basis: CashFlowBasis::AvoidedCost,
        ..params.clone()
    };
    npv_trajectory(yearly, investment_cost, &savings)
}

/// Year in which the cumulative NPV turns non-negative, interpolated within the year
pub fn payback_year(trajectory: &[NpvPoint]) -> Option<f64> {
    let first = trajectory.first()?;
    if first.cumulative_npv >= 0.0 {
        return Some(first.year as f64);
    }

    trajectory.windows(2).find_map(|pair| {
        let (previous, current) = (pair[0], pair[1]);
        if current.cumulative_npv >= 0.0 && current.discounted_cash_flow > 0.0 {
            Some(previous.year as f64 + -previous.cumulative_npv / current.discounted_cash_flow)
        } else {
            None
        }
    })
}

/// Present value of `cash_flows` (index = year) at `rate`
pub fn net_present_value(cash_flows: &[f64], rate: f64) -> f64 {
    cash_flows
        .iter()
        .enumerate()
        .map(|(year, cash_flow)| cash_flow / (1.0 + rate).powi(year as i32))
        .sum()
}

/// Discount rate at which the cash flows have zero NPV.
///
/// Bisection is tried first and Newton's method is used as a fallback. Returns `None`
/// when the cash flows never change sign or no root is found.
pub fn internal_rate_of_return(cash_flows: &[f64]) -> Option<f64> {
    let has_inflow = cash_flows.iter().any(|&cash_flow| cash_flow > 0.0);
    let has_outflow = cash_flows.iter().any(|&cash_flow| cash_flow < 0.0);
    if !(has_inflow && has_outflow) {
        return None;
    }

    let equation_function = |rate: f64| net_present_value(cash_flows, rate);
    let tolerance = 1e-9;
    let max_iterations = 200;

    let mut low = -0.99;
    let mut high = 10.0;
    let mut f_low = equation_function(low);
    if f_low * equation_function(high) < 0.0 {
        for _ in 0..max_iterations {
            let mid = (low + high) / 2.0;
            let f_mid = equation_function(mid);

            if f_mid.abs() < tolerance || (high - low).abs() < tolerance {
                return Some(mid);
            }

            if f_low * f_mid < 0.0 {
                high = mid;
            } else {
                low = mid;
                f_low = f_mid;
            }
        }
        return Some((low + high) / 2.0);
    }

    let rate = newton_method_root_finding(equation_function, 0.1, tolerance, max_iterations);
    (rate.is_finite() && rate > -1.0 && equation_function(rate).abs() < 1e-6).then_some(rate)
}

/// Newton's method for root finding
fn newton_method_root_finding<F>(
    f: F,
    initial_guess: f64,
    tolerance: f64,
    max_iterations: usize,
) -> f64
where
    F: Fn(f64) -> f64,
{
    let mut x = initial_guess;
    let h = 1e-8; // step for the numerical derivative

    for _ in 0..max_iterations {
        let fx = f(x);
        if fx.abs() < tolerance {
            return x;
        }

        let derivative = (f(x + h) - f(x - h)) / (2.0 * h);
        if derivative.abs() < 1e-12 {
            break;
        }

        x -= fx / derivative;
    }

    x
}
