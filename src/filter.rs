use async_graphql::InputObject;

use crate::{api::Date, dataset::PatientRecord};

/// Equality constraint on a pass-through column.
#[derive(InputObject, Debug, Clone, PartialEq)]
pub(crate) struct AttributeFilter {
    pub(crate) column: String,
    pub(crate) value: String,
}

/// The constraints chosen through the filter widgets.
///
/// Every field is optional; an absent field imposes no constraint and the
/// present ones are combined with logical AND.
#[derive(InputObject, Debug, Clone, Default, PartialEq)]
pub(crate) struct FilterSelection {
    /// Allowed service types. An empty list matches nothing.
    pub(crate) services: Option<Vec<String>>,
    /// Lowest age to include. (inclusive)
    pub(crate) age_min: Option<u32>,
    /// Highest age to include. (inclusive)
    pub(crate) age_max: Option<u32>,
    /// Lowest satisfaction score to include. (inclusive)
    pub(crate) min_satisfaction: Option<f64>,
    /// Highest satisfaction score to include. (inclusive)
    pub(crate) max_satisfaction: Option<f64>,
    /// Start of the arrival date range. (inclusive)
    /// Example format: "yyyy-MM-dd"
    pub(crate) begin: Option<Date>,
    /// End of the arrival date range. (exclusive)
    /// Example format: "yyyy-MM-dd"
    pub(crate) end: Option<Date>,
    /// Case-insensitive substring of the patient name.
    pub(crate) name: Option<String>,
    /// Equality constraints on pass-through columns.
    pub(crate) attributes: Option<Vec<AttributeFilter>>,
}

impl FilterSelection {
    pub(crate) fn matches(&self, record: &PatientRecord) -> bool {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_lowercase);

        self.services
            .as_ref()
            .is_none_or(|services| services.iter().any(|s| *s == record.service))
            && self.age_min.is_none_or(|min| record.age >= min)
            && self.age_max.is_none_or(|max| record.age <= max)
            && self
                .min_satisfaction
                .is_none_or(|min| record.satisfaction >= min)
            && self
                .max_satisfaction
                .is_none_or(|max| record.satisfaction <= max)
            && self
                .begin
                .as_ref()
                .is_none_or(|begin| record.arrival_date >= *begin)
            && self
                .end
                .as_ref()
                .is_none_or(|end| record.arrival_date < *end)
            && name.is_none_or(|name| record.name.to_lowercase().contains(&name))
            && self.attributes.as_ref().is_none_or(|attributes| {
                attributes
                    .iter()
                    .all(|f| record.attribute(&f.column) == Some(f.value.as_str()))
            })
    }

    /// Yields the matching rows along with their position in the table.
    pub(crate) fn select<'a>(
        &'a self,
        records: &'a [PatientRecord],
    ) -> impl DoubleEndedIterator<Item = (usize, &'a PatientRecord)> + 'a {
        records
            .iter()
            .enumerate()
            .filter(move |(_, record)| self.matches(record))
    }

    pub(crate) fn apply<'a>(&self, records: &'a [PatientRecord]) -> Vec<&'a PatientRecord> {
        records.iter().filter(|record| self.matches(record)).collect()
    }
}
