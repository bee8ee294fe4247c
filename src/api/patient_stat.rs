use async_graphql::{Context, Object, Result};

use crate::{
    aggregate::{AggregateOptions, AggregateResult},
    api,
    dashboard::summarize,
    filter::FilterSelection,
};

#[derive(Default)]
pub(super) struct PatientStatQuery {}

#[Object]
impl PatientStatQuery {
    /// Summary statistics of the patients matching `filter`.
    #[allow(clippy::unused_async)]
    async fn patient_stat(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: FilterSelection,
    ) -> Result<AggregateResult> {
        let dataset = api::dataset(ctx)?;
        let options = ctx.data::<AggregateOptions>()?;
        Ok(summarize(dataset, &filter, options))
    }
}

#[cfg(test)]
mod tests {
    use crate::api::TestSchema;

    #[tokio::test]
    async fn mean_satisfaction_by_service() {
        let schema = TestSchema::new();
        let query = r#"
        {
            patientStat(filter: {services: ["ER"]}) {
                totalCount
                noData
                serviceSatisfaction {
                    category
                    meanSatisfaction
                }
            }
        }"#;
        let data = schema.execute(query).await.data.into_json().unwrap();
        let stat = &data["patientStat"];
        assert_eq!(stat["totalCount"], 2);
        assert_eq!(stat["noData"], false);
        assert_eq!(stat["serviceSatisfaction"][0]["category"], "ER");
        assert_eq!(stat["serviceSatisfaction"][0]["meanSatisfaction"], 30.0);
    }

    #[tokio::test]
    async fn unknown_service_has_no_data() {
        let schema = TestSchema::new();
        let query = r#"
        {
            patientStat(filter: {services: ["Unknown"]}) {
                totalCount
                noData
                overview {
                    averageSatisfaction
                }
                satisfactionTrend {
                    period
                }
                satisfactionSummary {
                    mean
                }
            }
        }"#;
        let res = schema.execute(query).await;
        assert!(res.errors.is_empty());
        assert_eq!(
            res.data.to_string(),
            "{patientStat: {totalCount: 0, noData: true, overview: null, satisfactionTrend: [], satisfactionSummary: null}}"
        );
    }

    #[tokio::test]
    async fn without_filter_covers_everything() {
        let schema = TestSchema::new();
        let query = r"
        {
            patientStat {
                totalCount
                overview {
                    mostCommonService
                    averageStayDays
                }
                serviceCounts {
                    category
                    count
                }
                satisfactionTrend {
                    period
                    count
                }
            }
        }";
        let data = schema.execute(query).await.data.into_json().unwrap();
        let stat = &data["patientStat"];
        assert_eq!(stat["totalCount"], 5);
        assert_eq!(stat["overview"]["mostCommonService"], "ER");
        assert_eq!(stat["overview"]["averageStayDays"], 3.4);
        assert_eq!(stat["serviceCounts"][2]["category"], "ICU");
        let periods: Vec<_> = stat["satisfactionTrend"]
            .as_array()
            .unwrap()
            .iter()
            .map(|p| (p["period"].as_str().unwrap(), p["count"].as_u64().unwrap()))
            .collect();
        assert_eq!(periods, [("2025-01", 2), ("2025-02", 1), ("2025-03", 2)]);
    }

    #[tokio::test]
    async fn by_age_and_arrival_range() {
        let schema = TestSchema::new();
        let query = r#"
        {
            patientStat(filter: {ageMin: 30, ageMax: 60, begin: "2025-01-01", end: "2025-03-20"}) {
                totalCount
                ageGroupSatisfaction {
                    category
                    meanSatisfaction
                }
            }
        }"#;
        let data = schema.execute(query).await.data.into_json().unwrap();
        let stat = &data["patientStat"];
        assert_eq!(stat["totalCount"], 2);
        assert_eq!(stat["ageGroupSatisfaction"][0]["category"], "19-35");
        assert_eq!(stat["ageGroupSatisfaction"][1]["category"], "36-50");
        assert_eq!(stat["ageGroupSatisfaction"][1]["meanSatisfaction"], 90.0);
    }

    #[tokio::test]
    async fn by_min_satisfaction() {
        let schema = TestSchema::new();
        let query = r"
        {
            patientStat(filter: {minSatisfaction: 50}) {
                totalCount
                satisfactionSummary {
                    min
                    max
                }
            }
        }";
        let data = schema.execute(query).await.data.into_json().unwrap();
        let stat = &data["patientStat"];
        assert_eq!(stat["totalCount"], 3);
        assert_eq!(stat["satisfactionSummary"]["min"], 50.0);
        assert_eq!(stat["satisfactionSummary"]["max"], 90.0);
    }

    #[tokio::test]
    async fn invalid_date_is_rejected() {
        let schema = TestSchema::new();
        let query = r#"
        {
            patientStat(filter: {begin: "01/02/2025"}) {
                totalCount
            }
        }"#;
        let res = schema.execute(query).await;
        assert_eq!(res.errors.len(), 1);
    }
}
