use async_graphql::{Enum, InputObject, SimpleObject};
use num_traits::ToPrimitive;
use thiserror::Error;

use crate::aggregate::AggregateResult;

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ChartKind {
    Bar,
    Line,
    Pie,
}

/// The field plotted along the category axis.
#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum ChartAxis {
    Service,
    AgeGroup,
    ArrivalPeriod,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug, Default)]
pub(crate) enum ChartMetric {
    PatientCount,
    #[default]
    MeanSatisfaction,
}

#[derive(InputObject, Copy, Clone, Debug, PartialEq)]
pub(crate) struct ChartConfig {
    pub(crate) kind: ChartKind,
    pub(crate) axis: ChartAxis,
    #[graphql(default)]
    pub(crate) metric: ChartMetric,
}

#[derive(Debug, Error, PartialEq)]
pub(crate) enum ChartError {
    #[error("a pie chart cannot show {0:?}; use PATIENT_COUNT")]
    UnsupportedMetric(ChartMetric),
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct ChartPoint {
    pub(crate) label: String,
    pub(crate) value: f64,
}

/// Everything the page needs to draw one chart.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct ChartSpec {
    pub(crate) kind: ChartKind,
    pub(crate) title: String,
    pub(crate) x_label: String,
    pub(crate) y_label: String,
    pub(crate) points: Vec<ChartPoint>,
    /// Set when there are no points to draw.
    pub(crate) no_data: bool,
}

pub(crate) fn chart_spec(
    aggregate: &AggregateResult,
    config: &ChartConfig,
) -> Result<ChartSpec, ChartError> {
    if config.kind == ChartKind::Pie && config.metric != ChartMetric::PatientCount {
        return Err(ChartError::UnsupportedMetric(config.metric));
    }

    let (x_label, subject) = match config.axis {
        ChartAxis::Service => ("Service Type", "Service Type"),
        ChartAxis::AgeGroup => ("Age Group", "Age Group"),
        ChartAxis::ArrivalPeriod => ("Arrival Period", "Arrival Period"),
    };
    let (y_label, title) = match config.metric {
        ChartMetric::PatientCount => (
            "Number of Patients",
            format!("Patients by {subject}"),
        ),
        ChartMetric::MeanSatisfaction => (
            "Average Satisfaction Score",
            format!("Average Patient Satisfaction by {subject}"),
        ),
    };

    let points = points(aggregate, config);
    Ok(ChartSpec {
        kind: config.kind,
        title,
        x_label: x_label.to_string(),
        y_label: y_label.to_string(),
        no_data: points.is_empty(),
        points,
    })
}

fn points(aggregate: &AggregateResult, config: &ChartConfig) -> Vec<ChartPoint> {
    let count = |n: usize| n.to_f64().unwrap_or_default();
    let point = |label: &str, count_value: usize, mean: f64| ChartPoint {
        label: label.to_string(),
        value: match config.metric {
            ChartMetric::PatientCount => count(count_value),
            ChartMetric::MeanSatisfaction => mean,
        },
    };

    match (config.axis, config.metric) {
        (ChartAxis::Service, ChartMetric::PatientCount) => aggregate
            .service_counts
            .iter()
            .map(|c| point(&c.category, c.count, 0.0))
            .collect(),
        (ChartAxis::Service, ChartMetric::MeanSatisfaction) => aggregate
            .service_satisfaction
            .iter()
            .map(|m| point(&m.category, m.count, m.mean_satisfaction))
            .collect(),
        (ChartAxis::AgeGroup, _) => aggregate
            .age_group_satisfaction
            .iter()
            .map(|m| point(&m.category, m.count, m.mean_satisfaction))
            .collect(),
        (ChartAxis::ArrivalPeriod, _) => aggregate
            .satisfaction_trend
            .iter()
            .map(|p| point(&p.period, p.count, p.mean_satisfaction))
            .collect(),
    }
}
