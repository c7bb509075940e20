pub mod panel;
pub mod series;
pub mod sizing;
pub mod tariff;
