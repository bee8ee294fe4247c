use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::Context as _;
use async_graphql::SimpleObject;
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use serde::Deserialize;
use thiserror::Error;

use crate::api::Date;

pub(crate) const PATIENT_ID: &str = "patient_id";
pub(crate) const NAME: &str = "name";
pub(crate) const AGE: &str = "age";
pub(crate) const ARRIVAL_DATE: &str = "arrival_date";
pub(crate) const DEPARTURE_DATE: &str = "departure_date";
pub(crate) const SERVICE: &str = "service";
pub(crate) const SATISFACTION: &str = "satisfaction";
const LENGTH_OF_STAY: &str = "length_of_stay";

const REQUIRED_COLUMNS: [&str; 7] = [
    PATIENT_ID,
    NAME,
    AGE,
    ARRIVAL_DATE,
    DEPARTURE_DATE,
    SERVICE,
    SATISFACTION,
];

#[derive(Debug, Error)]
pub(crate) enum DataLoadError {
    #[error("failed to read dataset {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("malformed dataset: {0}")]
    Csv(#[from] csv::Error),
    #[error("missing required column `{0}`")]
    MissingColumn(&'static str),
    #[error("line {line}: invalid {column} value {value:?}")]
    InvalidValue {
        line: u64,
        column: &'static str,
        value: String,
    },
    #[error("line {line}: satisfaction {score} is outside {min}..={max}")]
    ScoreOutOfRange {
        line: u64,
        score: f64,
        min: f64,
        max: f64,
    },
    #[error("line {line}: departure date precedes arrival date")]
    NegativeStay { line: u64 },
    #[error("dataset contains no records")]
    Empty,
}

/// The valid satisfaction scale. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, SimpleObject)]
pub(crate) struct ScoreRange {
    pub(crate) min: f64,
    pub(crate) max: f64,
}

impl Default for ScoreRange {
    fn default() -> Self {
        Self { min: 0.0, max: 100.0 }
    }
}

impl ScoreRange {
    pub(crate) fn contains(&self, score: f64) -> bool {
        (self.min..=self.max).contains(&score)
    }
}

/// A column outside the required schema, carried through untouched.
#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub(crate) struct Attribute {
    pub(crate) column: String,
    pub(crate) value: String,
}

#[derive(Debug, Clone, PartialEq, SimpleObject)]
pub(crate) struct PatientRecord {
    pub(crate) patient_id: String,
    pub(crate) name: String,
    pub(crate) age: u32,
    pub(crate) arrival_date: Date,
    pub(crate) departure_date: Date,
    /// Whole days between arrival and departure.
    pub(crate) length_of_stay: i64,
    pub(crate) service: String,
    pub(crate) satisfaction: f64,
    pub(crate) attributes: Vec<Attribute>,
}

impl PatientRecord {
    pub(crate) fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.column == column)
            .map(|a| a.value.as_str())
    }
}

/// The immutable patient table. Cloning shares the rows.
#[derive(Debug, Clone)]
pub(crate) struct Dataset {
    records: Arc<Vec<PatientRecord>>,
    columns: Arc<Vec<String>>,
    score_range: ScoreRange,
}

impl Dataset {
    pub(crate) fn load(path: &Path, score_range: ScoreRange) -> Result<Self, DataLoadError> {
        let file = File::open(path).map_err(|source| DataLoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, score_range)
    }

    pub(crate) fn from_reader<R: io::Read>(
        reader: R,
        score_range: ScoreRange,
    ) -> Result<Self, DataLoadError> {
        let mut reader = ReaderBuilder::new().trim(Trim::All).from_reader(reader);
        let headers = reader.headers()?.clone();
        let layout = Layout::new(&headers)?;

        let mut records = Vec::new();
        for row in reader.records() {
            records.push(layout.parse(&row?, score_range)?);
        }
        if records.is_empty() {
            return Err(DataLoadError::Empty);
        }

        Ok(Self {
            records: Arc::new(records),
            columns: Arc::new(headers.iter().map(str::to_string).collect()),
            score_range,
        })
    }

    pub(crate) fn records(&self) -> &[PatientRecord] {
        &self.records
    }

    pub(crate) fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn score_range(&self) -> ScoreRange {
        self.score_range
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// Writes `records` as CSV: the required columns, the derived length of
    /// stay, then the pass-through columns of this dataset.
    pub(crate) fn export(&self, records: &[&PatientRecord]) -> anyhow::Result<String> {
        let extra: Vec<&str> = self
            .columns
            .iter()
            .map(String::as_str)
            .filter(|c| is_pass_through(c))
            .collect();

        let mut writer = WriterBuilder::new().from_writer(Vec::new());
        writer.write_record(
            REQUIRED_COLUMNS
                .iter()
                .copied()
                .chain([LENGTH_OF_STAY])
                .chain(extra.iter().copied()),
        )?;
        for record in records {
            let mut row = vec![
                record.patient_id.clone(),
                record.name.clone(),
                record.age.to_string(),
                record.arrival_date.to_string(),
                record.departure_date.to_string(),
                record.service.clone(),
                record.satisfaction.to_string(),
                record.length_of_stay.to_string(),
            ];
            row.extend(
                extra
                    .iter()
                    .map(|c| record.attribute(c).unwrap_or_default().to_string()),
            );
            writer.write_record(&row)?;
        }
        let bytes = writer.into_inner().context("failed to flush CSV export")?;
        Ok(String::from_utf8(bytes)?)
    }
}

/// The derived `length_of_stay` is recomputed from the dates, so a source
/// column of that name is not carried as an attribute.
pub(crate) fn is_pass_through(column: &str) -> bool {
    !REQUIRED_COLUMNS.contains(&column) && column != LENGTH_OF_STAY
}

/// Column positions resolved from the header row.
struct Layout {
    required: [usize; 7],
    extra: Vec<(usize, String)>,
}

impl Layout {
    fn new(headers: &StringRecord) -> Result<Self, DataLoadError> {
        let mut required = [0; 7];
        for (slot, name) in required.iter_mut().zip(REQUIRED_COLUMNS) {
            *slot = headers
                .iter()
                .position(|h| h == name)
                .ok_or(DataLoadError::MissingColumn(name))?;
        }
        let extra = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| !required.contains(i) && is_pass_through(h))
            .map(|(i, h)| (i, h.to_string()))
            .collect();
        Ok(Self { required, extra })
    }

    fn parse(&self, row: &StringRecord, score_range: ScoreRange) -> Result<PatientRecord, DataLoadError> {
        let line = row.position().map_or(0, csv::Position::line);
        let field = |column: usize| row.get(self.required[column]).unwrap_or_default();
        let invalid = |column: &'static str, value: &str| DataLoadError::InvalidValue {
            line,
            column,
            value: value.to_string(),
        };

        let age = field(2);
        let age: u32 = age.parse().map_err(|_| invalid(AGE, age))?;
        let arrival = field(3);
        let arrival = parse_date(arrival).ok_or_else(|| invalid(ARRIVAL_DATE, arrival))?;
        let departure = field(4);
        let departure = parse_date(departure).ok_or_else(|| invalid(DEPARTURE_DATE, departure))?;
        let service = field(5);
        if service.is_empty() {
            return Err(invalid(SERVICE, service));
        }
        let score = field(6);
        let satisfaction: f64 = score
            .parse()
            .ok()
            .filter(|s: &f64| s.is_finite())
            .ok_or_else(|| invalid(SATISFACTION, score))?;
        if !score_range.contains(satisfaction) {
            return Err(DataLoadError::ScoreOutOfRange {
                line,
                score: satisfaction,
                min: score_range.min,
                max: score_range.max,
            });
        }
        let length_of_stay = (departure - arrival).num_days();
        if length_of_stay < 0 {
            return Err(DataLoadError::NegativeStay { line });
        }

        Ok(PatientRecord {
            patient_id: field(0).to_string(),
            name: field(1).to_string(),
            age,
            arrival_date: Date(arrival),
            departure_date: Date(departure),
            length_of_stay,
            service: service.to_string(),
            satisfaction,
            attributes: self
                .extra
                .iter()
                .map(|(i, column)| Attribute {
                    column: column.clone(),
                    value: row.get(*i).unwrap_or_default().to_string(),
                })
                .collect(),
        })
    }
}

/// Parses a calendar date, dropping any time of day.
pub(crate) fn parse_date(s: &str) -> Option<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Some(date);
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .map(|dt| dt.date())
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str = "patient_id,name,age,arrival_date,departure_date,service,satisfaction";

    fn load(body: &str) -> Result<Dataset, DataLoadError> {
        Dataset::from_reader(body.as_bytes(), ScoreRange::default())
    }

    #[test]
    fn loads_records_with_length_of_stay() {
        let csv = format!(
            "{HEADER},ward\n\
             P1, Alice ,34,2025-01-01,2025-01-04,emergency,80,north\n\
             P2,Bob,61,2025-01-02 08:30:00,2025-01-02,surgery,65.5,south\n"
        );
        let dataset = load(&csv).unwrap();
        assert_eq!(dataset.len(), 2);

        let first = &dataset.records()[0];
        assert_eq!(first.name, "Alice");
        assert_eq!(first.length_of_stay, 3);
        assert_eq!(first.attribute("ward"), Some("north"));

        let second = &dataset.records()[1];
        assert_eq!(second.length_of_stay, 0);
        assert!((second.satisfaction - 65.5).abs() < f64::EPSILON);
        assert_eq!(dataset.columns().last().map(String::as_str), Some("ward"));
    }

    #[test]
    fn columns_may_come_in_any_order() {
        let csv = "service,satisfaction,age,name,patient_id,departure_date,arrival_date\n\
                   icu,90,40,Carol,P9,2025-03-10,2025-03-01\n";
        let dataset = load(csv).unwrap();
        assert_eq!(dataset.records()[0].service, "icu");
        assert_eq!(dataset.records()[0].length_of_stay, 9);
    }

    #[test]
    fn missing_column() {
        let csv = "patient_id,name,age,arrival_date,departure_date,service\n\
                   P1,A,1,2025-01-01,2025-01-01,icu\n";
        assert!(matches!(
            load(csv),
            Err(DataLoadError::MissingColumn(SATISFACTION))
        ));
    }

    #[test]
    fn invalid_age_reports_line() {
        let csv = format!("{HEADER}\nP1,A,old,2025-01-01,2025-01-01,icu,50\n");
        match load(&csv) {
            Err(DataLoadError::InvalidValue { line, column, value }) => {
                assert_eq!(line, 2);
                assert_eq!(column, AGE);
                assert_eq!(value, "old");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn score_outside_range() {
        let csv = format!("{HEADER}\nP1,A,1,2025-01-01,2025-01-01,icu,101\n");
        assert!(matches!(
            load(&csv),
            Err(DataLoadError::ScoreOutOfRange { line: 2, .. })
        ));

        let narrow = ScoreRange { min: 1.0, max: 5.0 };
        let csv = format!("{HEADER}\nP1,A,1,2025-01-01,2025-01-01,icu,0\n");
        assert!(Dataset::from_reader(csv.as_bytes(), narrow).is_err());
    }

    #[test]
    fn departure_before_arrival() {
        let csv = format!("{HEADER}\nP1,A,1,2025-01-05,2025-01-01,icu,50\n");
        assert!(matches!(
            load(&csv),
            Err(DataLoadError::NegativeStay { line: 2 })
        ));
    }

    #[test]
    fn malformed_rows_expose_nothing() {
        let csv = format!(
            "{HEADER}\nP1,A,1,2025-01-01,2025-01-01,icu,50\nP2,B,2,2025-01-01\n"
        );
        assert!(matches!(load(&csv), Err(DataLoadError::Csv(_))));
    }

    #[test]
    fn header_only_is_empty() {
        assert!(matches!(load(HEADER), Err(DataLoadError::Empty)));
    }

    #[test]
    fn missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.csv");
        let err = Dataset::load(&path, ScoreRange::default()).unwrap_err();
        assert!(matches!(err, DataLoadError::Io { .. }));
        assert!(err.to_string().contains("absent.csv"));
    }

    #[test]
    fn export_selected_rows() {
        let csv = format!(
            "{HEADER},ward\n\
             P1,\"Smith, Alice\",34,2025-01-01,2025-01-04,emergency,80,north\n\
             P2,Bob,61,2025-01-02,2025-01-02,surgery,65.5,south\n"
        );
        let dataset = load(&csv).unwrap();
        let selected: Vec<_> = dataset.records().iter().take(1).collect();
        let exported = dataset.export(&selected).unwrap();
        assert_eq!(
            exported,
            "patient_id,name,age,arrival_date,departure_date,service,satisfaction,length_of_stay,ward\n\
             P1,\"Smith, Alice\",34,2025-01-01,2025-01-04,emergency,80,3,north\n"
        );

        let reloaded = load(&exported).unwrap();
        assert_eq!(reloaded.records()[0].name, "Smith, Alice");
        assert_eq!(reloaded.records()[0].length_of_stay, 3);
        assert_eq!(reloaded.records()[0].attribute("length_of_stay"), None);
    }

    #[test]
    fn export_of_export_keeps_header() {
        let csv = format!(
            "{HEADER},length_of_stay,ward\n\
             P1,A,1,2025-01-01,2025-01-03,ER,50,2,north\n"
        );
        let dataset = load(&csv).unwrap();
        let selected: Vec<_> = dataset.records().iter().collect();
        let first = dataset.export(&selected).unwrap();
        assert_eq!(first.matches(LENGTH_OF_STAY).count(), 1);
        assert_eq!(
            first,
            "patient_id,name,age,arrival_date,departure_date,service,satisfaction,length_of_stay,ward\n\
             P1,A,1,2025-01-01,2025-01-03,ER,50,2,north\n"
        );

        let reloaded = load(&first).unwrap();
        let selected: Vec<_> = reloaded.records().iter().collect();
        assert_eq!(reloaded.export(&selected).unwrap(), first);
    }

    #[test]
    fn date_formats() {
        let expected = NaiveDate::from_ymd_opt(2025, 2, 3);
        assert_eq!(parse_date("2025-02-03"), expected);
        assert_eq!(parse_date("2025-02-03 10:11:12"), expected);
        assert_eq!(parse_date("2025-02-03T10:11:12"), expected);
        assert_eq!(parse_date("03/02/2025"), None);
    }
}
