use std::path::{Path, PathBuf};

use calamine::{Data, DataType, Reader, open_workbook_auto};
use chrono::{DateTime, NaiveDateTime};
use pv_model::series::{HourlySeries, Resample};
use tracing::{debug, info};

use crate::error::{Result, SizingError};

/// Source of the historical series a sizing run is based on
pub trait TimeSeriesStore {
    /// Hourly consumption in kWh
    fn consumption(&self) -> Result<HourlySeries>;
    /// Hourly irradiance in the plane of the array in kW/m²
    fn irradiance(&self) -> Result<HourlySeries>;
}

/// Store over series that are already in memory
#[derive(Debug, Clone, Default)]
pub struct InMemorySeriesStore {
    pub consumption: Option<HourlySeries>,
    pub irradiance: Option<HourlySeries>,
}

impl InMemorySeriesStore {
    pub fn new(consumption: HourlySeries, irradiance: HourlySeries) -> Self {
        Self {
            consumption: Some(consumption),
            irradiance: Some(irradiance),
        }
    }
}

impl TimeSeriesStore for InMemorySeriesStore {
    fn consumption(&self) -> Result<HourlySeries> {
        self.consumption
            .clone()
            .ok_or_else(|| SizingError::DataUnavailable("no consumption series loaded".to_string()))
    }

    fn irradiance(&self) -> Result<HourlySeries> {
        self.irradiance
            .clone()
            .ok_or_else(|| SizingError::DataUnavailable("no irradiance series loaded".to_string()))
    }
}

/// One series stored in a file.
///
/// CSV files hold `timestamp,value` rows after a header line. Spreadsheets (xlsx, xls, ods)
/// hold the same two columns on `sheet`, or on the first sheet when unset.
#[derive(Debug, Clone)]
pub struct SeriesSource {
    pub path: PathBuf,
    pub sheet: Option<String>,
    /// Factor applied to every value, e.g. 0.001 for Wh to kWh or W/m² to kW/m²
    pub unit_scale: f64,
    /// How readings finer than one hour are folded
    pub resample: Resample,
}

impl SeriesSource {
    pub fn new(path: impl Into<PathBuf>, resample: Resample) -> Self {
        Self {
            path: path.into(),
            sheet: None,
            unit_scale: 1.0,
            resample,
        }
    }

    pub fn with_unit_scale(mut self, unit_scale: f64) -> Self {
        self.unit_scale = unit_scale;
        self
    }

    pub fn with_sheet(mut self, sheet: impl Into<String>) -> Self {
        self.sheet = Some(sheet.into());
        self
    }

    pub fn load(&self) -> Result<HourlySeries> {
        let records = if is_spreadsheet(&self.path) {
            load_workbook_records(&self.path, self.sheet.as_deref())?
        } else {
            load_csv_records(&self.path)?
        };
        info!(
            "Loaded {} records from {}",
            records.len(),
            self.path.display()
        );

        let series = HourlySeries::resample_hourly(&records, self.resample)
            .map_err(|e| SizingError::SeriesMismatch(format!("{}: {}", self.path.display(), e)))?;
        Ok(series.scaled(self.unit_scale))
    }
}

/// Store reading consumption and irradiance from files
#[derive(Debug, Clone)]
pub struct FileSeriesStore {
    pub consumption: SeriesSource,
    pub irradiance: SeriesSource,
}

impl FileSeriesStore {
    pub fn new(consumption: SeriesSource, irradiance: SeriesSource) -> Self {
        Self {
            consumption,
            irradiance,
        }
    }
}

impl TimeSeriesStore for FileSeriesStore {
    fn consumption(&self) -> Result<HourlySeries> {
        self.consumption.load()
    }

    fn irradiance(&self) -> Result<HourlySeries> {
        self.irradiance.load()
    }
}

fn is_spreadsheet(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(|extension| extension.to_ascii_lowercase())
        .is_some_and(|extension| matches!(extension.as_str(), "xlsx" | "xlsm" | "xls" | "ods"))
}

/// Parses the timestamp formats found in meter exports, including unix epoch seconds
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim().trim_matches('"');
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| {
            trimmed
                .parse::<i64>()
                .ok()
                .and_then(|epoch| DateTime::from_timestamp(epoch, 0))
                .map(|timestamp| timestamp.naive_utc())
        })
}

/// Parses a number, accepting a decimal comma ("3,67") and a typographic minus.
/// Anything else that is not part of a plain number makes the value unreadable.
pub fn parse_value(raw: &str) -> Option<f64> {
    let trimmed = raw.trim().trim_matches('"').replace('\u{2212}', "-");
    let normalized = if trimmed.contains('.') {
        trimmed
    } else {
        trimmed.replacen(',', ".", 1)
    };
    normalized.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// `;` when the header line uses it, `,` otherwise
fn sniff_delimiter(contents: &str) -> u8 {
    let header = contents.lines().next().unwrap_or_default();
    if header.contains(';') { b';' } else { b',' }
}

fn is_fraction_digits(raw: &str) -> bool {
    !raw.is_empty() && raw.bytes().all(|byte| byte.is_ascii_digit())
}

/// Reads `timestamp,value` records from a CSV file with a header line.
///
/// Columns after the value are ignored when the header names them. A `;` separated file
/// may use decimal commas; in a two column `,` file an unquoted decimal comma shows up as
/// a third, all-digit field and is joined back. Any other extra field is an error.
pub fn load_csv_records(path: &Path) -> Result<Vec<(NaiveDateTime, f64)>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        SizingError::DataUnavailable(format!("failed to open {}: {}", path.display(), e))
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .delimiter(sniff_delimiter(&contents))
        .from_reader(contents.as_bytes());
    let header_columns = reader
        .headers()
        .map_err(|e| SizingError::SeriesMismatch(format!("{} header: {}", path.display(), e)))?
        .len();

    let mut records = Vec::new();
    for (row, result) in reader.records().enumerate() {
        // header is line 1
        let line = row + 2;
        let record = result.map_err(|e| {
            SizingError::SeriesMismatch(format!("{} line {}: {}", path.display(), line, e))
        })?;
        if record.len() < 2 {
            return Err(SizingError::SeriesMismatch(format!(
                "{} line {}: expected timestamp and value columns",
                path.display(),
                line
            )));
        }
        let timestamp = parse_timestamp(&record[0]).ok_or_else(|| {
            SizingError::SeriesMismatch(format!(
                "{} line {}: could not parse timestamp '{}'",
                path.display(),
                line,
                &record[0]
            ))
        })?;
        let raw_value = if header_columns > 2 || record.len() == 2 {
            record[1].to_string()
        } else if record.len() == 3 && is_fraction_digits(&record[2]) {
            format!("{},{}", &record[1], &record[2])
        } else {
            return Err(SizingError::SeriesMismatch(format!(
                "{} line {}: {} fields under a two column header",
                path.display(),
                line,
                record.len()
            )));
        };
        let value = parse_value(&raw_value).ok_or_else(|| {
            SizingError::SeriesMismatch(format!(
                "{} line {}: could not parse value '{}'",
                path.display(),
                line,
                raw_value
            ))
        })?;
        records.push((timestamp, value));
    }
    debug!("Parsed {} rows from {}", records.len(), path.display());

    Ok(records)
}

/// Reads `timestamp,value` records from a spreadsheet; the first row is a header
pub fn load_workbook_records(
    path: &Path,
    sheet: Option<&str>,
) -> Result<Vec<(NaiveDateTime, f64)>> {
    let mut workbook = open_workbook_auto(path).map_err(|e| {
        SizingError::DataUnavailable(format!("failed to open {}: {}", path.display(), e))
    })?;

    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook.sheet_names().first().cloned().ok_or_else(|| {
            SizingError::DataUnavailable(format!("{} contains no sheets", path.display()))
        })?,
    };
    let range = workbook.worksheet_range(&sheet_name).map_err(|e| {
        SizingError::DataUnavailable(format!(
            "failed to read sheet '{}' of {}: {}",
            sheet_name,
            path.display(),
            e
        ))
    })?;

    let mut records = Vec::new();
    for (row, cells) in range.rows().enumerate().skip(1) {
        let (Some(time_cell), Some(value_cell)) = (cells.first(), cells.get(1)) else {
            continue;
        };
        if matches!(time_cell, Data::Empty) && matches!(value_cell, Data::Empty) {
            continue;
        }

        let timestamp = cell_timestamp(time_cell).ok_or_else(|| {
            SizingError::SeriesMismatch(format!(
                "sheet '{}' row {}: could not read timestamp",
                sheet_name,
                row + 1
            ))
        })?;
        let value = cell_value(value_cell).ok_or_else(|| {
            SizingError::SeriesMismatch(format!(
                "sheet '{}' row {}: could not read value",
                sheet_name,
                row + 1
            ))
        })?;
        records.push((timestamp, value));
    }

    Ok(records)
}

fn cell_timestamp(cell: &Data) -> Option<NaiveDateTime> {
    match cell {
        Data::String(raw) | Data::DateTimeIso(raw) => parse_timestamp(raw),
        _ => cell.as_datetime(),
    }
}

fn cell_value(cell: &Data) -> Option<f64> {
    match cell {
        Data::Float(value) => Some(*value),
        Data::Int(value) => Some(*value as f64),
        Data::String(raw) => parse_value(raw),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn write_temp(contents: &str) -> tempfile::NamedTempFile {
        let temp_file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        std::fs::write(temp_file.path(), contents).unwrap();
        temp_file
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = NaiveDate::from_ymd_opt(1998, 2, 5)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        assert_eq!(parse_timestamp("1998-02-05 10:00:00"), Some(expected));
        assert_eq!(parse_timestamp("1998-02-05T10:00"), Some(expected));
        assert_eq!(parse_timestamp("886672800"), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_parse_value_decimal_comma() {
        assert_eq!(parse_value("3,67"), Some(3.67));
        assert_eq!(parse_value(" 1500 "), Some(1500.0));
        assert_eq!(parse_value("\"-2.5\""), Some(-2.5));
        assert_eq!(parse_value("n/a"), None);
    }

    #[test]
    fn test_parse_value_rejects_stray_characters() {
        assert_eq!(parse_value("12abc34"), None);
        assert_eq!(parse_value("1,2,3"), None);
        assert_eq!(parse_value("1,234.5"), None);
        assert_eq!(parse_value("inf"), None);
        assert_eq!(parse_value("\u{2212}0.5"), Some(-0.5));
    }

    #[test]
    fn test_extra_columns_are_ignored() {
        let temp_file = write_temp(
            "time,value,quality\n2023-01-01 00:00:00,1000,1\n2023-01-01 01:00:00,2000,1\n",
        );
        let records = load_csv_records(temp_file.path()).unwrap();
        let values: Vec<f64> = records.iter().map(|(_, value)| *value).collect();
        assert_eq!(values, vec![1000.0, 2000.0]);
    }

    #[test]
    fn test_decimal_comma_files() {
        let unquoted = write_temp("time,value\n2023-01-01 00:00:00,3,67\n");
        let records = load_csv_records(unquoted.path()).unwrap();
        assert_eq!(records[0].1, 3.67);

        let semicolon = write_temp("time;value;quality\n2023-01-01 00:00:00;3,5;ok\n");
        let records = load_csv_records(semicolon.path()).unwrap();
        assert_eq!(records[0].1, 3.5);

        let garbage = write_temp("time,value\n2023-01-01 00:00:00,3,x7\n");
        assert!(matches!(
            load_csv_records(garbage.path()),
            Err(SizingError::SeriesMismatch(_))
        ));
    }

    #[test]
    fn test_load_csv_source_scales_units() {
        let temp_file = write_temp(
            "time,value\n2023-01-01 00:00:00,1000\n2023-01-01 01:00:00,2000\n2023-01-01 02:00:00,1500\n",
        );

        let series = SeriesSource::new(temp_file.path(), Resample::Sum)
            .with_unit_scale(0.001)
            .load()
            .unwrap();
        assert_eq!(series.values, vec![1.0, 2.0, 1.5]); // Wh to kWh
    }

    #[test]
    fn test_load_csv_source_resamples_ten_minute_data() {
        let mut contents = String::from("time,value\n");
        for minute in (0..60).step_by(10) {
            contents.push_str(&format!("2023-01-01 00:{:02}:00,0.1\n", minute));
        }
        let temp_file = write_temp(&contents);

        let series = SeriesSource::new(temp_file.path(), Resample::Sum)
            .load()
            .unwrap();
        assert_eq!(series.len(), 1);
        assert!((series.values[0] - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_missing_file_is_data_unavailable() {
        let store = FileSeriesStore::new(
            SeriesSource::new("does/not/exist.csv", Resample::Sum),
            SeriesSource::new("does/not/exist.csv", Resample::Mean),
        );
        assert!(matches!(
            store.consumption(),
            Err(SizingError::DataUnavailable(_))
        ));
    }

    #[test]
    fn test_gap_in_file_is_series_mismatch() {
        let temp_file =
            write_temp("time,value\n2023-01-01 00:00:00,1\n2023-01-01 05:00:00,1\n");
        let result = SeriesSource::new(temp_file.path(), Resample::Sum).load();
        assert!(matches!(result, Err(SizingError::SeriesMismatch(_))));
    }

    #[test]
    fn test_in_memory_store_without_data() {
        let store = InMemorySeriesStore::default();
        assert!(matches!(
            store.irradiance(),
            Err(SizingError::DataUnavailable(_))
        ));
    }
}
