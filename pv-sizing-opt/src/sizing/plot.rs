use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::prelude::*;
use pv_model::sizing::{Fraction, NpvPoint};
use tracing::info;

use crate::sizing::balance::{BalancePeriod, BalanceTotals};
use crate::sizing::indicators::WindowIndicators;
use crate::sizing::report::{ProfileSet, SizingReport};

type PlotResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Y range covering all values with some headroom; never empty
pub fn value_range<'a>(values: impl IntoIterator<Item = &'a f64>) -> (f64, f64) {
    let (min_val, max_val) = values
        .into_iter()
        .filter(|value| value.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(low, high), &value| {
            (low.min(value), high.max(value))
        });
    if !min_val.is_finite() {
        return (0.0, 1.0);
    }

    let low = min_val.min(0.0);
    let high = max_val.max(0.0);
    let padding = ((high - low) * 0.1).max(1e-6);
    (
        if low < 0.0 { low - padding } else { low },
        high + padding,
    )
}

/// Averaged consumption, production and grid exchange over the slots of a profile
pub fn plot_profile(
    profile: &ProfileSet,
    title: &str,
    x_desc: &str,
    filename: &Path,
) -> PlotResult {
    let net_exchange = profile.net_exchange();
    let slots = profile.consumption.len();
    let (min_val, max_val) = value_range(
        profile
            .consumption
            .iter()
            .chain(profile.production.iter())
            .chain(net_exchange.iter()),
    );

    let root = BitMapBackend::new(filename, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..(slots.max(2) - 1) as f64, min_val..max_val)?;

    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Energy (kWh)")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    let lines: [(&[f64], &str, RGBColor); 3] = [
        (profile.consumption.as_slice(), "Consumption", RED),
        (profile.production.as_slice(), "PV Production", BLUE),
        (net_exchange.as_slice(), "Grid Import (+) / Feed-in (-)", GREEN),
    ];
    for (values, label, color) in lines {
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, &y)| (i as f64, y)),
                color.stroke_width(3),
            ))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], color.stroke_width(3)));
    }

    // markers only where they stay readable
    if slots <= 48 {
        for (values, _, color) in lines {
            chart.draw_series(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, &y)| Circle::new((i as f64, y), 3, color.filled())),
            )?;
        }
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Profile plot saved as {}", filename.display());
    Ok(())
}

/// Cumulative NPV per year with the yearly discounted cash flows as bars
pub fn plot_npv_trajectory(trajectory: &[NpvPoint], filename: &Path) -> PlotResult {
    let last_year = trajectory.last().map_or(1, |point| point.year.max(1));
    let (min_val, max_val) = value_range(
        trajectory
            .iter()
            .flat_map(|point| [&point.cumulative_npv, &point.discounted_cash_flow]),
    );

    let root = BitMapBackend::new(filename, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Net Present Value", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(-0.5f64..last_year as f64 + 0.5, min_val..max_val)?;

    chart
        .configure_mesh()
        .x_desc("Year")
        .y_desc("EUR")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    chart
        .draw_series(trajectory.iter().map(|point| {
            let x = point.year as f64;
            Rectangle::new(
                [(x - 0.3, 0.0), (x + 0.3, point.discounted_cash_flow)],
                BLUE.mix(0.5).filled(),
            )
        }))?
        .label("Discounted cash flow")
        .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], BLUE.mix(0.5).filled()));

    chart
        .draw_series(LineSeries::new(
            trajectory
                .iter()
                .map(|point| (point.year as f64, point.cumulative_npv)),
            RED.stroke_width(3),
        ))?
        .label("Cumulative NPV")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], RED.stroke_width(3)));

    chart.draw_series(
        trajectory
            .iter()
            .map(|point| Circle::new((point.year as f64, point.cumulative_npv), 4, RED.filled())),
    )?;

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("NPV plot saved as {}", filename.display());
    Ok(())
}

/// Points of a daily fraction series in percent; days without a value are left out
pub fn percent_points(
    daily: &[WindowIndicators],
    pick: impl Fn(&WindowIndicators) -> Fraction,
) -> Vec<(f64, f64)> {
    daily
        .iter()
        .enumerate()
        .filter_map(|(day, entry)| pick(entry).value().map(|value| (day as f64, value * 100.0)))
        .collect()
}

/// Daily self-sufficiency and self-consumption
pub fn plot_daily_ratios(daily: &[WindowIndicators], filename: &Path) -> PlotResult {
    let days = daily.len().max(2) as f64;
    let self_sufficiency = percent_points(daily, |entry| entry.indicators.self_sufficiency);
    let self_consumption = percent_points(daily, |entry| entry.indicators.self_consumption);

    let root = BitMapBackend::new(filename, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Daily Self-Sufficiency and Self-Consumption", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..days - 1.0, 0f64..105f64)?;

    chart
        .configure_mesh()
        .x_desc("Day")
        .y_desc("%")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    chart
        .draw_series(LineSeries::new(self_sufficiency, BLUE.stroke_width(2)))?
        .label("Self-sufficiency")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], BLUE.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(self_consumption, MAGENTA.stroke_width(2)))?
        .label("Self-consumption")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], MAGENTA.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Daily ratio plot saved as {}", filename.display());
    Ok(())
}

/// One point per period, x is the period's position
pub fn period_points(
    periods: &[BalancePeriod],
    pick: impl Fn(&BalanceTotals) -> f64,
) -> Vec<(f64, f64)> {
    periods
        .iter()
        .enumerate()
        .map(|(index, period)| (index as f64, pick(&period.totals)))
        .collect()
}

/// Daily consumption against daily production over the first simulated year
pub fn plot_daily_flows(days: &[BalancePeriod], filename: &Path) -> PlotResult {
    let consumption = period_points(days, |totals| totals.consumption);
    let production = period_points(days, |totals| totals.production);
    let self_consumed = period_points(days, |totals| totals.self_consumed);
    let (min_val, max_val) = value_range(
        consumption
            .iter()
            .chain(production.iter())
            .map(|(_, value)| value),
    );

    let root = BitMapBackend::new(filename, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Consumption and Production per Day", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..(days.len().max(2) - 1) as f64, min_val..max_val)?;

    chart
        .configure_mesh()
        .x_desc("Day")
        .y_desc("Energy (kWh)")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    let lines = [
        (consumption, "Consumption", RED),
        (production, "PV Production", BLUE),
        (self_consumed, "Self-consumed", GREEN),
    ];
    for (points, label, color) in lines {
        chart
            .draw_series(LineSeries::new(points, color.stroke_width(2)))?
            .label(label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], color.stroke_width(2)));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Daily flow plot saved as {}", filename.display());
    Ok(())
}

/// Daily gross energy exchange with the grid
pub fn plot_daily_exchange(daily: &[WindowIndicators], filename: &Path) -> PlotResult {
    let values: Vec<f64> = daily
        .iter()
        .map(|entry| entry.indicators.gross_exchange_kwh)
        .collect();
    let (min_val, max_val) = value_range(values.iter());

    let root = BitMapBackend::new(filename, (1200, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Daily Gross Grid Exchange", ("sans-serif", 40))
        .margin(20)
        .x_label_area_size(50)
        .y_label_area_size(80)
        .build_cartesian_2d(0f64..(values.len().max(2) - 1) as f64, min_val..max_val)?;

    chart
        .configure_mesh()
        .x_desc("Day")
        .y_desc("Energy (kWh)")
        .x_label_formatter(&|x| format!("{:.0}", x))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            values.iter().enumerate().map(|(i, &y)| (i as f64, y)),
            GREEN.stroke_width(2),
        ))?
        .label("Import + export")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 15, y)], GREEN.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Daily exchange plot saved as {}", filename.display());
    Ok(())
}

/// Writes every chart of the report into `dir` and returns the created files
pub fn render_report(report: &SizingReport, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let file = |name: &str| dir.join(name);
    let plot_error = |name: &str, e: Box<dyn std::error::Error>| {
        anyhow::anyhow!("Failed to render {}: {}", name, e)
    };

    let day_profile = file("average_day.png");
    plot_profile(
        &report.profiles.day,
        "Average Day",
        "Hour of Day",
        &day_profile,
    )
    .map_err(|e| plot_error("average day profile", e))?;

    let month_profile = file("average_month.png");
    plot_profile(
        &report.profiles.month,
        "Average Month",
        "Hour of Month (day 1 00:00 = 0)",
        &month_profile,
    )
    .map_err(|e| plot_error("average month profile", e))?;

    let week_profile = file("average_week.png");
    plot_profile(
        &report.profiles.week,
        "Average Week",
        "Hour of Week (Monday 00:00 = 0)",
        &week_profile,
    )
    .map_err(|e| plot_error("average week profile", e))?;

    let daily_flows = file("daily_flows.png");
    plot_daily_flows(&report.flows.day, &daily_flows)
        .map_err(|e| plot_error("daily flows", e))?;

    let npv = file("npv_trajectory.png");
    plot_npv_trajectory(&report.npv_trajectory, &npv)
        .map_err(|e| plot_error("NPV trajectory", e))?;

    let ratios = file("daily_ratios.png");
    plot_daily_ratios(&report.daily_indicators, &ratios)
        .map_err(|e| plot_error("daily ratios", e))?;

    let exchange = file("daily_exchange.png");
    plot_daily_exchange(&report.daily_indicators, &exchange)
        .map_err(|e| plot_error("daily exchange", e))?;

    Ok(vec![
        day_profile,
        month_profile,
        week_profile,
        daily_flows,
        npv,
        ratios,
        exchange,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use pv_model::sizing::Indicators;

    #[test]
    fn test_value_range() {
        assert_eq!(value_range(&[] as &[f64]), (0.0, 1.0));

        let (low, high) = value_range(&[1.0, 3.0]);
        assert_eq!(low, 0.0);
        assert!((high - 3.3).abs() < 1e-12);

        let (low, high) = value_range(&[-2.0, 2.0, f64::NAN]);
        assert!((low - -2.4).abs() < 1e-12);
        assert!((high - 2.4).abs() < 1e-12);
    }

    #[test]
    fn test_period_points_follow_the_year() {
        use crate::sizing::balance::{EnergyBalance, Window};
        use pv_model::series::HourlySeries;

        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let consumption = HourlySeries::new(start, vec![1.0; 72]).unwrap();
        let production = HourlySeries::new(
            start,
            (0..72).map(|hour| if hour < 24 { 0.5 } else { 2.0 }).collect(),
        )
        .unwrap();
        let balance = EnergyBalance::compute(&consumption, &production).unwrap();
        let days = balance.aggregate(Window::Day);

        assert_eq!(
            period_points(&days, |totals| totals.production),
            vec![(0.0, 12.0), (1.0, 48.0), (2.0, 48.0)]
        );
        assert_eq!(
            period_points(&days, |totals| totals.self_consumed),
            vec![(0.0, 12.0), (1.0, 24.0), (2.0, 24.0)]
        );
    }

    #[test]
    fn test_percent_points_skip_not_applicable() {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let day = |self_sufficiency| WindowIndicators {
            start,
            indicators: Indicators {
                self_sufficiency,
                self_consumption: Fraction::NotApplicable,
                net_exchange_kwh: 0.0,
                gross_exchange_kwh: 0.0,
            },
        };
        let daily = vec![
            day(Fraction::Value(0.5)),
            day(Fraction::NotApplicable),
            day(Fraction::Value(0.25)),
        ];

        let points = percent_points(&daily, |entry| entry.indicators.self_sufficiency);
        assert_eq!(points, vec![(0.0, 50.0), (2.0, 25.0)]);
        assert!(percent_points(&daily, |entry| entry.indicators.self_consumption).is_empty());
    }
}
