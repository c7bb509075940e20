pub mod finance;
pub mod series_store;

pub use finance::{CashFlowBasis, FinanceParams, npv_trajectory};
pub use series_store::{FileSeriesStore, InMemorySeriesStore, SeriesSource, TimeSeriesStore};
