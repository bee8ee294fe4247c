use std::{convert::Infallible, net::SocketAddr, path::PathBuf};

use async_graphql::http::GraphiQLSource;
use async_graphql_warp::{GraphQLBadRequest, GraphQLResponse};
use tracing::info;
use warp::{
    http::{Response as HttpResponse, StatusCode},
    Filter, Rejection, Reply,
};

use crate::api::Schema;

const INDEX_HTML: &str = include_str!("../assets/index.html");

pub(crate) fn routes(
    schema: Schema,
) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_HTML));

    let graphiql = warp::path!("graphql").and(warp::get()).map(|| {
        HttpResponse::builder()
            .header("content-type", "text/html")
            .body(GraphiQLSource::build().endpoint("/graphql").finish())
    });

    let graphql = warp::path!("graphql")
        .and(warp::post())
        .and(async_graphql_warp::graphql(schema))
        .and_then(
            |(schema, request): (Schema, async_graphql::Request)| async move {
                Ok::<_, Infallible>(GraphQLResponse::from(schema.execute(request).await))
            },
        );

    index
        .or(graphiql)
        .or(graphql)
        .recover(|err: Rejection| async move {
            if let Some(GraphQLBadRequest(err)) = err.find() {
                return Ok::<_, Infallible>(warp::reply::with_status(
                    err.to_string(),
                    StatusCode::BAD_REQUEST,
                ));
            }
            if err.is_not_found() {
                return Ok(warp::reply::with_status(
                    "NOT_FOUND".to_string(),
                    StatusCode::NOT_FOUND,
                ));
            }
            Ok(warp::reply::with_status(
                "INTERNAL_SERVER_ERROR".to_string(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ))
        })
}

pub(crate) async fn serve(schema: Schema, addr: SocketAddr, tls: Option<(PathBuf, PathBuf)>) {
    let routes = routes(schema);
    if let Some((cert, key)) = tls {
        info!("Serving the dashboard on https://{addr}");
        warp::serve(routes)
            .tls()
            .cert_path(cert)
            .key_path(key)
            .run(addr)
            .await;
    } else {
        info!("Serving the dashboard on http://{addr}");
        warp::serve(routes).run(addr).await;
    }
}
