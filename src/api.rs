mod dashboard;
mod patient;
mod patient_stat;

use std::fmt;

use async_graphql::{
    types::connection::{Connection, Edge, EmptyFields},
    Context, EmptyMutation, EmptySubscription, InputValueError, InputValueResult, MergedObject,
    Result, Scalar, ScalarType, Value,
};
use base64::{engine::general_purpose, Engine as _};
use chrono::NaiveDate;

use crate::{
    aggregate::AggregateOptions,
    dashboard::DatasetState,
    dataset::{Dataset, PatientRecord},
};

/// The default page size for connections when neither `first` nor `last` is provided.
const DEFAULT_PAGE_SIZE: usize = 100;

/// A set of queries defined in the schema.
///
/// This is exposed only for [`Schema`], and not used directly.
#[derive(Default, MergedObject)]
pub(crate) struct Query(
    dashboard::DashboardQuery,
    patient::PatientQuery,
    patient_stat::PatientStatQuery,
);

pub(crate) type Schema = async_graphql::Schema<Query, EmptyMutation, EmptySubscription>;

/// A calendar date, formatted as "yyyy-MM-dd".
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
pub(crate) struct Date(pub(crate) NaiveDate);

#[Scalar]
impl ScalarType for Date {
    fn parse(value: Value) -> InputValueResult<Self> {
        match &value {
            Value::String(s) => Ok(Date(s.parse()?)),
            _ => Err(InputValueError::expected_type(value)),
        }
    }

    fn to_value(&self) -> Value {
        Value::String(self.to_string())
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

pub(crate) fn schema(state: DatasetState, options: AggregateOptions) -> Schema {
    Schema::build(Query::default(), EmptyMutation, EmptySubscription)
        .data(state)
        .data(options)
        .finish()
}

fn dataset<'a>(ctx: &Context<'a>) -> Result<&'a Dataset> {
    Ok(ctx.data::<DatasetState>()?.dataset()?)
}

fn encode_cursor(row: usize) -> String {
    general_purpose::STANDARD.encode(row.to_string())
}

fn decode_cursor(cursor: &str) -> Result<usize> {
    let bytes = general_purpose::STANDARD.decode(cursor)?;
    Ok(String::from_utf8(bytes)?.parse()?)
}

fn connect_cursor(
    rows: Vec<(usize, PatientRecord)>,
    prev: bool,
    next: bool,
) -> Connection<String, PatientRecord, EmptyFields, EmptyFields> {
    let mut connection: Connection<String, PatientRecord, EmptyFields, EmptyFields> =
        Connection::new(prev, next);
    for (row, record) in rows {
        connection.edges.push(Edge::new(encode_cursor(row), record));
    }
    connection
}

/// Pages through `rows`, which must be ordered by row position.
fn load_connection<'a, I>(
    rows: I,
    after: Option<String>,
    before: Option<String>,
    first: Option<usize>,
    last: Option<usize>,
) -> Result<Connection<String, PatientRecord, EmptyFields, EmptyFields>>
where
    I: DoubleEndedIterator<Item = (usize, &'a PatientRecord)>,
{
    let (nodes, has_previous, has_next) = if let Some(before) = before {
        if after.is_some() {
            return Err("cannot use both `after` and `before`".into());
        }
        if first.is_some() {
            return Err("'before' and 'first' cannot be specified simultaneously".into());
        }
        let last = last.unwrap_or(DEFAULT_PAGE_SIZE);
        let before = decode_cursor(&before)?;
        let iter = rows.filter(|(row, _)| *row < before).rev();
        let (mut nodes, has_previous) = collect_nodes(iter, last);
        nodes.reverse();
        (nodes, has_previous, false)
    } else if let Some(after) = after {
        if last.is_some() {
            return Err("'after' and 'last' cannot be specified simultaneously".into());
        }
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let after = decode_cursor(&after)?;
        let iter = rows.filter(|(row, _)| *row > after);
        let (nodes, has_next) = collect_nodes(iter, first);
        (nodes, false, has_next)
    } else if let Some(last) = last {
        if first.is_some() {
            return Err("first and last cannot be used together".into());
        }
        let (mut nodes, has_previous) = collect_nodes(rows.rev(), last);
        nodes.reverse();
        (nodes, has_previous, false)
    } else {
        let first = first.unwrap_or(DEFAULT_PAGE_SIZE);
        let (nodes, has_next) = collect_nodes(rows, first);
        (nodes, false, has_next)
    };
    Ok(connect_cursor(nodes, has_previous, has_next))
}

fn collect_nodes<'a, I>(mut iter: I, size: usize) -> (Vec<(usize, PatientRecord)>, bool)
where
    I: Iterator<Item = (usize, &'a PatientRecord)>,
{
    let mut nodes = Vec::with_capacity(size);
    let mut has_more = false;
    if size == 0 {
        return (nodes, iter.next().is_some());
    }
    while let Some((row, record)) = iter.next() {
        nodes.push((row, record.clone()));
        if nodes.len() == size {
            has_more = iter.next().is_some();
            break;
        }
    }
    (nodes, has_more)
}

#[cfg(test)]
const TEST_CSV: &str = "\
patient_id,name,age,arrival_date,departure_date,service,satisfaction,ward
P1,Alice Smith,34,2025-01-03,2025-01-06,ER,40,north
P2,Bob Jones,71,2025-01-20,2025-01-21,ER,20,south
P3,Carol White,12,2025-02-02,2025-02-09,ICU,50,north
P4,Dan Brown,45,2025-03-15,2025-03-17,surgery,90,east
P5,Eve Black,58,2025-03-28,2025-04-01,surgery,70,south
";

#[cfg(test)]
struct TestSchema {
    _dir: tempfile::TempDir, // to keep the dataset file alive while the test is running
    schema: Schema,
}

#[cfg(test)]
impl TestSchema {
    fn new() -> Self {
        Self::with_csv(TEST_CSV)
    }

    fn with_csv(csv: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("patients.csv");
        std::fs::write(&path, csv).unwrap();
        let state = Dataset::load(&path, crate::dataset::ScoreRange::default()).into();
        Self {
            _dir: dir,
            schema: schema(state, AggregateOptions::default()),
        }
    }

    /// A schema whose dataset file does not exist.
    fn unavailable() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let state = Dataset::load(
            &dir.path().join("missing.csv"),
            crate::dataset::ScoreRange::default(),
        )
        .into();
        Self {
            _dir: dir,
            schema: schema(state, AggregateOptions::default()),
        }
    }

    async fn execute(&self, query: &str) -> async_graphql::Response {
        let request: async_graphql::Request = query.into();
        self.schema.execute(request).await
    }
}
