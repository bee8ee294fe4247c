use std::collections::{BTreeMap, HashMap};

use async_graphql::{Enum, SimpleObject};
use chrono::{Datelike, Days, NaiveDate};
use num_traits::ToPrimitive;
use serde::Deserialize;

use crate::{api::Date, dataset::PatientRecord};

const DEFAULT_HISTOGRAM_BINS: usize = 20;

/// Upper age of each group (inclusive) and its label. Ages beyond the last
/// bound fall into the last group.
const AGE_GROUPS: [(u32, &str); 5] = [
    (18, "0-18"),
    (35, "19-35"),
    (50, "36-50"),
    (65, "51-65"),
    (u32::MAX, "65+"),
];

/// The granularity of the satisfaction trend.
#[derive(Enum, Deserialize, Copy, Clone, Eq, PartialEq, Debug, Default)]
#[serde(rename_all = "lowercase")]
pub(crate) enum TrendPeriod {
    Day,
    Week,
    #[default]
    Month,
}

impl TrendPeriod {
    fn start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Self::Day => date,
            Self::Week => date - Days::new(u64::from(date.weekday().num_days_from_monday())),
            Self::Month => date.with_day(1).unwrap_or(date),
        }
    }

    fn label(self, start: NaiveDate) -> String {
        match self {
            Self::Day => start.format("%Y-%m-%d").to_string(),
            Self::Week => start.format("%G-W%V").to_string(),
            Self::Month => start.format("%Y-%m").to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct AggregateOptions {
    pub(crate) trend_period: TrendPeriod,
    pub(crate) histogram_bins: usize,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            trend_period: TrendPeriod::default(),
            histogram_bins: DEFAULT_HISTOGRAM_BINS,
        }
    }
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct CategoryCount {
    pub(crate) category: String,
    pub(crate) count: usize,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct CategoryMean {
    pub(crate) category: String,
    pub(crate) count: usize,
    pub(crate) mean_satisfaction: f64,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct TrendPoint {
    /// The period label, e.g. "2025-01" for monthly trends.
    pub(crate) period: String,
    /// The first day of the period.
    pub(crate) start: Date,
    pub(crate) count: usize,
    pub(crate) mean_satisfaction: f64,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct HistogramBin {
    pub(crate) lower: f64,
    pub(crate) upper: f64,
    pub(crate) count: usize,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct Overview {
    pub(crate) average_satisfaction: f64,
    pub(crate) average_stay_days: f64,
    pub(crate) most_common_service: String,
}

#[derive(Enum, Copy, Clone, Eq, PartialEq, Debug)]
pub(crate) enum CorrelationDirection {
    Positive,
    Negative,
    Neutral,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct Correlation {
    /// Pearson correlation coefficient between length of stay and satisfaction.
    pub(crate) coefficient: f64,
    pub(crate) direction: CorrelationDirection,
}

#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct Summary {
    pub(crate) count: usize,
    pub(crate) mean: f64,
    /// Sample standard deviation. Absent for a single value.
    pub(crate) std: Option<f64>,
    pub(crate) min: f64,
    pub(crate) q1: f64,
    pub(crate) median: f64,
    pub(crate) q3: f64,
    pub(crate) max: f64,
}

/// Summary statistics of one filtered subset.
#[derive(SimpleObject, Debug, Clone, PartialEq)]
pub(crate) struct AggregateResult {
    /// The number of records in the subset.
    pub(crate) total_count: usize,
    /// Whether the subset is empty.
    pub(crate) no_data: bool,
    pub(crate) overview: Option<Overview>,
    /// Records per service, most frequent first.
    pub(crate) service_counts: Vec<CategoryCount>,
    /// Mean satisfaction per service, highest first.
    pub(crate) service_satisfaction: Vec<CategoryMean>,
    /// Mean satisfaction per age group, youngest first.
    pub(crate) age_group_satisfaction: Vec<CategoryMean>,
    /// Mean satisfaction per arrival period, oldest first.
    pub(crate) satisfaction_trend: Vec<TrendPoint>,
    pub(crate) age_histogram: Vec<HistogramBin>,
    pub(crate) stay_satisfaction_correlation: Option<Correlation>,
    pub(crate) satisfaction_summary: Option<Summary>,
}

#[derive(Default)]
struct Accumulator {
    count: usize,
    sum: f64,
    bounds: Option<(f64, f64)>,
}

impl Accumulator {
    fn add(&mut self, value: f64) {
        self.count += 1;
        self.sum += value;
        self.bounds = Some(self.bounds.map_or((value, value), |(lo, hi)| {
            (lo.min(value), hi.max(value))
        }));
    }

    /// The arithmetic mean, kept within the observed values so that rounding
    /// in the sum never pushes it past the smallest or largest input.
    fn mean(&self) -> Option<f64> {
        let (lo, hi) = self.bounds?;
        Some(mean_of(self.sum, self.count)?.clamp(lo, hi))
    }
}

impl FromIterator<f64> for Accumulator {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        iter.into_iter().fold(Self::default(), |mut acc, value| {
            acc.add(value);
            acc
        })
    }
}

fn mean_of(sum: f64, count: usize) -> Option<f64> {
    if count == 0 {
        return None;
    }
    Some(sum / count.to_f64()?)
}

pub(crate) fn aggregate(records: &[&PatientRecord], options: &AggregateOptions) -> AggregateResult {
    let service_counts = service_counts(records);
    let scores: Vec<f64> = records.iter().map(|r| r.satisfaction).collect();

    AggregateResult {
        total_count: records.len(),
        no_data: records.is_empty(),
        overview: overview(records, &service_counts),
        service_satisfaction: service_satisfaction(records),
        age_group_satisfaction: age_group_satisfaction(records),
        satisfaction_trend: satisfaction_trend(records, options.trend_period),
        age_histogram: age_histogram(records, options.histogram_bins),
        stay_satisfaction_correlation: stay_satisfaction_correlation(records),
        satisfaction_summary: summary(&scores),
        service_counts,
    }
}

fn service_counts(records: &[&PatientRecord]) -> Vec<CategoryCount> {
    let mut counts: Vec<_> = records
        .iter()
        .fold(HashMap::new(), |mut acc, record| {
            *acc.entry(record.service.as_str()).or_insert(0) += 1;
            acc
        })
        .into_iter()
        .map(|(category, count)| CategoryCount {
            category: category.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.category.cmp(&b.category)));
    counts
}

fn overview(records: &[&PatientRecord], service_counts: &[CategoryCount]) -> Option<Overview> {
    let satisfaction: Accumulator = records.iter().map(|r| r.satisfaction).collect();
    let stay: Accumulator = records
        .iter()
        .filter_map(|r| r.length_of_stay.to_f64())
        .collect();
    Some(Overview {
        average_satisfaction: satisfaction.mean()?,
        average_stay_days: stay.mean()?,
        most_common_service: service_counts.first()?.category.clone(),
    })
}

fn service_satisfaction(records: &[&PatientRecord]) -> Vec<CategoryMean> {
    let mut means = group_means(records, |r| r.service.clone())
        .into_iter()
        .map(|(category, (count, mean_satisfaction))| CategoryMean {
            category,
            count,
            mean_satisfaction,
        })
        .collect::<Vec<_>>();
    means.sort_by(|a, b| {
        b.mean_satisfaction
            .total_cmp(&a.mean_satisfaction)
            .then_with(|| a.category.cmp(&b.category))
    });
    means
}

pub(crate) fn age_group(age: u32) -> (usize, &'static str) {
    AGE_GROUPS
        .iter()
        .enumerate()
        .find(|(_, (upper, _))| age <= *upper)
        .map_or((AGE_GROUPS.len() - 1, "65+"), |(i, (_, label))| (i, *label))
}

fn age_group_satisfaction(records: &[&PatientRecord]) -> Vec<CategoryMean> {
    group_means(records, |r| age_group(r.age))
        .into_iter()
        .map(|((_, label), (count, mean_satisfaction))| CategoryMean {
            category: label.to_string(),
            count,
            mean_satisfaction,
        })
        .collect()
}

fn satisfaction_trend(records: &[&PatientRecord], period: TrendPeriod) -> Vec<TrendPoint> {
    group_means(records, |r| period.start(r.arrival_date.0))
        .into_iter()
        .map(|(start, (count, mean_satisfaction))| TrendPoint {
            period: period.label(start),
            start: Date(start),
            count,
            mean_satisfaction,
        })
        .collect()
}

/// Groups records by key, in key order, with the row count and mean score of each group.
fn group_means<K, F>(records: &[&PatientRecord], key: F) -> BTreeMap<K, (usize, f64)>
where
    K: Ord,
    F: Fn(&PatientRecord) -> K,
{
    records
        .iter()
        .fold(BTreeMap::<K, Accumulator>::new(), |mut acc, record| {
            acc.entry(key(*record)).or_default().add(record.satisfaction);
            acc
        })
        .into_iter()
        .filter_map(|(k, acc)| Some((k, (acc.count, acc.mean()?))))
        .collect()
}

fn age_histogram(records: &[&PatientRecord], bins: usize) -> Vec<HistogramBin> {
    let ages: Vec<f64> = records.iter().filter_map(|r| r.age.to_f64()).collect();
    let (Some(min), Some(max)) = (
        ages.iter().copied().reduce(f64::min),
        ages.iter().copied().reduce(f64::max),
    ) else {
        return Vec::new();
    };
    let Some(width_bins) = bins.to_f64().filter(|b| *b > 0.0) else {
        return Vec::new();
    };
    let (lower, upper) = if (max - min).abs() < f64::EPSILON {
        (min - 0.5, max + 0.5)
    } else {
        (min, max)
    };
    let width = (upper - lower) / width_bins;

    let mut counts = vec![0; bins];
    for age in ages {
        let index = ((age - lower) / width).floor().to_usize().unwrap_or(0);
        counts[index.min(bins - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| {
            let i = i.to_f64().unwrap_or_default();
            HistogramBin {
                lower: lower + width * i,
                upper: lower + width * (i + 1.0),
                count,
            }
        })
        .collect()
}

fn stay_satisfaction_correlation(records: &[&PatientRecord]) -> Option<Correlation> {
    let pairs: Vec<(f64, f64)> = records
        .iter()
        .filter_map(|r| Some((r.length_of_stay.to_f64()?, r.satisfaction)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }
    let n = pairs.len().to_f64()?;
    let mean_x = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;
    let (cov, var_x, var_y) = pairs.iter().fold((0.0, 0.0, 0.0), |(c, vx, vy), (x, y)| {
        let dx = x - mean_x;
        let dy = y - mean_y;
        (c + dx * dy, vx + dx * dx, vy + dy * dy)
    });
    let denominator = (var_x * var_y).sqrt();
    if denominator == 0.0 || !denominator.is_finite() {
        return None;
    }
    let coefficient = (cov / denominator).clamp(-1.0, 1.0);
    let direction = if coefficient > 0.0 {
        CorrelationDirection::Positive
    } else if coefficient < 0.0 {
        CorrelationDirection::Negative
    } else {
        CorrelationDirection::Neutral
    };
    Some(Correlation {
        coefficient,
        direction,
    })
}

fn summary(values: &[f64]) -> Option<Summary> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let count = sorted.len();
    let n = count.to_f64()?;
    let mean = sorted.iter().copied().collect::<Accumulator>().mean()?;
    let std = (count > 1).then(|| {
        let squares: f64 = sorted.iter().map(|v| (v - mean).powi(2)).sum();
        (squares / (n - 1.0)).sqrt()
    });
    Some(Summary {
        count,
        mean,
        std,
        min: *sorted.first()?,
        q1: quantile(&sorted, 0.25)?,
        median: quantile(&sorted, 0.5)?,
        q3: quantile(&sorted, 0.75)?,
        max: *sorted.last()?,
    })
}

/// Linear interpolation between the closest ranks of a sorted slice.
fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q * last.to_f64()?;
    let lower = pos.floor();
    let lo = *sorted.get(lower.to_usize()?)?;
    let hi = *sorted.get(pos.ceil().to_usize()?)?;
    Some(lo + (hi - lo) * (pos - lower))
}
