use async_graphql::{
    connection::{query, Connection, EmptyFields},
    Context, Object, Result,
};

use crate::{api, dataset::PatientRecord, filter::FilterSelection};

#[derive(Default)]
pub(super) struct PatientQuery;

#[Object]
impl PatientQuery {
    /// The filtered patient rows, in dataset order.
    async fn patients(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: FilterSelection,
        after: Option<String>,
        before: Option<String>,
        first: Option<i32>,
        last: Option<i32>,
    ) -> Result<Connection<String, PatientRecord, EmptyFields, EmptyFields>> {
        let dataset = api::dataset(ctx)?;
        query(
            after,
            before,
            first,
            last,
            |after, before, first, last| async move {
                api::load_connection(
                    filter.select(dataset.records()),
                    after,
                    before,
                    first,
                    last,
                )
            },
        )
        .await
    }

    /// The filtered patient rows as CSV text.
    #[allow(clippy::unused_async)]
    async fn filtered_csv(
        &self,
        ctx: &Context<'_>,
        #[graphql(default)] filter: FilterSelection,
    ) -> Result<String> {
        let dataset = api::dataset(ctx)?;
        let rows = filter.apply(dataset.records());
        Ok(dataset.export(&rows)?)
    }
}
