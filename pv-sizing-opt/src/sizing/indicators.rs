use chrono::NaiveDateTime;
use pv_model::sizing::{Fraction, Indicators};
use serde::Serialize;

use crate::sizing::balance::{BalanceTotals, EnergyBalance, Window};

/// Self-sufficiency, self-consumption and grid exchange of summed flows
pub fn indicators_from_totals(totals: &BalanceTotals) -> Indicators {
    Indicators {
        self_sufficiency: Fraction::ratio(totals.self_consumed, totals.consumption),
        self_consumption: Fraction::ratio(totals.self_consumed, totals.production),
        net_exchange_kwh: totals.net_exchange(),
        gross_exchange_kwh: totals.gross_exchange(),
    }
}

/// Indicators of one calendar bucket
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowIndicators {
    pub start: NaiveDateTime,
    pub indicators: Indicators,
}

pub fn indicators_by_window(balance: &EnergyBalance, window: Window) -> Vec<WindowIndicators> {
    balance
        .aggregate(window)
        .iter()
        .map(|period| WindowIndicators {
            start: period.start,
            indicators: indicators_from_totals(&period.totals),
        })
        .collect()
}

/// Unweighted mean of the applicable values; `NotApplicable` if there are none
pub fn mean_of_applicable(values: impl IntoIterator<Item = Fraction>) -> Fraction {
    let (sum, count) = values
        .into_iter()
        .filter_map(|fraction| fraction.value())
        .fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));

    if count == 0 {
        Fraction::NotApplicable
    } else {
        Fraction::Value(sum / count as f64)
    }
}
