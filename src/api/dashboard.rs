use async_graphql::{Context, Object, Result, SimpleObject};
use tracing::error;

use crate::{
    aggregate::AggregateOptions,
    api,
    chart::{chart_spec, ChartConfig, ChartSpec},
    dashboard::{render, summarize, Dashboard, DatasetState, FilterWidgets},
    filter::FilterSelection,
};

#[derive(SimpleObject)]
struct DatasetStatus {
    /// Whether the dataset was loaded.
    loaded: bool,
    /// Why the dataset could not be loaded.
    error: Option<String>,
    total_records: usize,
    columns: Vec<String>,
}

#[derive(Default)]
pub(super) struct DashboardQuery;

#[Object]
impl DashboardQuery {
    #[allow(clippy::unused_async)]
    async fn dataset_status(&self, ctx: &Context<'_>) -> Result<DatasetStatus> {
        let status = match ctx.data::<DatasetState>()? {
            DatasetState::Loaded(dataset) => DatasetStatus {
                loaded: true,
                error: None,
                total_records: dataset.len(),
                columns: dataset.columns().to_vec(),
            },
            DatasetState::Failed(reason) => DatasetStatus {
                loaded: false,
                error: Some(reason.clone()),
                total_records: 0,
                columns: Vec::new(),
            },
        };
        Ok(status)
    }

    #[allow(clippy::unused_async)]
    async fn filter_widgets(&self, ctx: &Context<'_>) -> Result<FilterWidgets> {
        let dataset = api::dataset(ctx)?;
        FilterWidgets::new(dataset).ok_or_else(|| "the dataset has no records".into())
    }

    /// A single chart of the patients matching `filter`.
    #[allow(clippy::unused_async)]
    async fn chart(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: FilterSelection,
        config: ChartConfig,
    ) -> Result<ChartSpec> {
        let dataset = api::dataset(ctx)?;
        let options = ctx.data::<AggregateOptions>()?;
        let aggregate = summarize(dataset, &filter, options);
        chart_spec(&aggregate, &config).map_err(|e| {
            error!("Problem while building chart. {e}");
            e.into()
        })
    }

    /// The whole dashboard page for `filter`.
    ///
    /// Never fails; problems are reported through its `status` and `message`.
    #[allow(clippy::unused_async)]
    async fn dashboard(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: FilterSelection,
    ) -> Result<Dashboard> {
        let state = ctx.data::<DatasetState>()?;
        let options = ctx.data::<AggregateOptions>()?;
        Ok(render(state, &filter, options))
    }
}
