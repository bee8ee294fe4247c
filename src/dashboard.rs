use async_graphql::{Enum, SimpleObject};
use tracing::{error, warn};

use crate::{
    aggregate::{aggregate, AggregateOptions, AggregateResult},
    api::Date,
    chart::{chart_spec, ChartAxis, ChartConfig, ChartError, ChartKind, ChartMetric, ChartSpec},
    dataset::{is_pass_through, DataLoadError, Dataset, ScoreRange},
    filter::FilterSelection,
};

const NO_MATCHING_RECORDS: &str = "No matching records for the selected filters.";

/// The panels of the dashboard page, in display order.
const PANELS: [(&str, ChartConfig); 4] = [
    (
        "service-satisfaction",
        ChartConfig {
            kind: ChartKind::Bar,
            axis: ChartAxis::Service,
            metric: ChartMetric::MeanSatisfaction,
        },
    ),
    (
        "service-distribution",
        ChartConfig {
            kind: ChartKind::Pie,
            axis: ChartAxis::Service,
            metric: ChartMetric::PatientCount,
        },
    ),
    (
        "age-group-satisfaction",
        ChartConfig {
            kind: ChartKind::Line,
            axis: ChartAxis::AgeGroup,
            metric: ChartMetric::MeanSatisfaction,
        },
    ),
    (
        "satisfaction-trend",
        ChartConfig {
            kind: ChartKind::Line,
            axis: ChartAxis::ArrivalPeriod,
            metric: ChartMetric::MeanSatisfaction,
        },
    ),
];

/// The outcome of loading the dataset at startup.
///
/// A failed load is kept so that the page can show why there is nothing to
/// display.
#[derive(Debug, Clone)]
pub(crate) enum DatasetState {
    Loaded(Dataset),
    Failed(String),
}

impl From<Result<Dataset, DataLoadError>> for DatasetState {
    fn from(result: Result<Dataset, DataLoadError>) -> Self {
        match result {
            Ok(dataset) => Self::Loaded(dataset),
            Err(e) => Self::Failed(e.to_string()),
        }
    }
}

impl DatasetState {
    pub(crate) fn dataset(&self) -> Result<&Dataset, RenderError> {
        match self {
            Self::Loaded(dataset) => Ok(dataset),
            Self::Failed(reason) => Err(RenderError::Unavailable(reason.clone())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum RenderError {
    #[error("dataset unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Chart(#[from] ChartError),
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum RenderStatus {
    Ok,
    NoData,
    Error,
}

/// The options offered by the filter widgets, derived from the full dataset.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct FilterWidgets {
    /// Service types in order of first appearance.
    pub(crate) services: Vec<String>,
    pub(crate) age_min: u32,
    pub(crate) age_max: u32,
    pub(crate) score_range: ScoreRange,
    pub(crate) arrival_min: Date,
    pub(crate) arrival_max: Date,
    /// Pass-through columns that can be used in attribute filters.
    pub(crate) attribute_columns: Vec<String>,
}

impl FilterWidgets {
    pub(crate) fn new(dataset: &Dataset) -> Option<Self> {
        let records = dataset.records();
        let mut services: Vec<String> = Vec::new();
        for record in records {
            if !services.contains(&record.service) {
                services.push(record.service.clone());
            }
        }
        Some(Self {
            services,
            age_min: records.iter().map(|r| r.age).min()?,
            age_max: records.iter().map(|r| r.age).max()?,
            score_range: dataset.score_range(),
            arrival_min: records.iter().map(|r| r.arrival_date).min()?,
            arrival_max: records.iter().map(|r| r.arrival_date).max()?,
            attribute_columns: dataset
                .columns()
                .iter()
                .filter(|c| is_pass_through(c))
                .cloned()
                .collect(),
        })
    }
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct Panel {
    pub(crate) id: String,
    pub(crate) chart: ChartSpec,
}

/// The page model produced for one filter selection.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct Dashboard {
    pub(crate) status: RenderStatus,
    /// A message to show instead of, or above, the panels.
    pub(crate) message: Option<String>,
    pub(crate) filtered_count: usize,
    pub(crate) total_count: usize,
    pub(crate) aggregate: Option<AggregateResult>,
    pub(crate) panels: Vec<Panel>,
    pub(crate) widgets: Option<FilterWidgets>,
}

impl Dashboard {
    fn failed(error: &RenderError) -> Self {
        Self {
            status: RenderStatus::Error,
            message: Some(error.to_string()),
            filtered_count: 0,
            total_count: 0,
            aggregate: None,
            panels: Vec::new(),
            widgets: None,
        }
    }
}

/// Computes the aggregate of the rows selected by `filter`.
pub(crate) fn summarize(
    dataset: &Dataset,
    filter: &FilterSelection,
    options: &AggregateOptions,
) -> AggregateResult {
    aggregate(&filter.apply(dataset.records()), options)
}

/// Renders the whole page for one filter selection.
///
/// Failures are logged and reported through [`RenderStatus::Error`].
pub(crate) fn render(
    state: &DatasetState,
    filter: &FilterSelection,
    options: &AggregateOptions,
) -> Dashboard {
    match try_render(state, filter, options) {
        Ok(dashboard) => dashboard,
        Err(e) => {
            error!("Problem while rendering dashboard. {e}");
            Dashboard::failed(&e)
        }
    }
}

fn try_render(
    state: &DatasetState,
    filter: &FilterSelection,
    options: &AggregateOptions,
) -> Result<Dashboard, RenderError> {
    let dataset = state.dataset()?;
    let aggregate = summarize(dataset, filter, options);
    let panels = PANELS
        .iter()
        .map(|(id, config)| {
            Ok(Panel {
                id: (*id).to_string(),
                chart: chart_spec(&aggregate, config)?,
            })
        })
        .collect::<Result<Vec<_>, ChartError>>()?;

    let (status, message) = if aggregate.no_data {
        warn!("No records match filter {filter:?}");
        (RenderStatus::NoData, Some(NO_MATCHING_RECORDS.to_string()))
    } else {
        (RenderStatus::Ok, None)
    };

    Ok(Dashboard {
        status,
        message,
        filtered_count: aggregate.total_count,
        total_count: dataset.len(),
        aggregate: Some(aggregate),
        panels,
        widgets: FilterWidgets::new(dataset),
    })
}
