use std::collections::HashMap;
use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;

use tracing::{error, info, warn};
use warp::hyper::body::Bytes;
use warp::Filter;

use crate::error::FeedError;
use crate::model::FeedKind;
use crate::request::{is_health_check, ClientParams};
use crate::FeedService;

/// POST bodies above this size are rejected before parsing.
const MAX_BODY_BYTES: u64 = 64 * 1024;

pub struct FeedServer {
    service: FeedService,
}

impl FeedServer {
    pub fn new(service: FeedService) -> Self {
        Self { service }
    }

    /// Serves until `shutdown` resolves.
    pub async fn run(&self, addr: &str, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<(), FeedError> {
        let addr: SocketAddr = addr
            .parse()
            .map_err(|e| FeedError::Internal(format!("bad listen address [{}]: {}", addr, e)))?;

        let (bound, server) = warp::serve(routes(self.service.clone()))
            .try_bind_with_graceful_shutdown(addr, shutdown)
            .map_err(|e| FeedError::Internal(format!("could not bind [{}]: {}", addr, e)))?;
        info!("feedgate listening on {}", bound);

        server.await;
        Ok(())
    }
}

/// Every client-facing route. Always answers HTTP 200 with a JSON body, except
/// 404 for unknown paths.
pub fn routes(service: FeedService) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    // 1. GET /health
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .map(|| warp::reply::json(&serde_json::json!({})));

    // 2. GET feeds (query string)
    let new_faces = get_feed("new_faces", FeedKind::NewFaces, service.clone());
    let lmm = get_feed("lmm", FeedKind::Lmm, service.clone());
    let lmhis = get_feed("lmhis", FeedKind::Lmhis, service.clone());
    let chat = get_feed("chat", FeedKind::Chat, service.clone());

    // 3. POST feeds (JSON body)
    let discover = post_feed("discover", FeedKind::Discover, service.clone());
    let lc = post_feed("lc", FeedKind::Lc, service);

    health
        .or(new_faces)
        .unify()
        .or(lmm)
        .unify()
        .or(lmhis)
        .unify()
        .or(chat)
        .unify()
        .or(discover)
        .unify()
        .or(lc)
        .unify()
        .recover(handle_rejection)
}

/// Body, length and method rejections become a wrong-params body.
async fn handle_rejection(rejection: warp::Rejection) -> Result<warp::reply::Json, warp::Rejection> {
    if rejection.is_not_found() {
        return Err(rejection);
    }
    let err = FeedError::WrongParams(format!("{:?}", rejection));
    warn!("rejected request: {}", err);
    Ok(warp::reply::json(&err.body()))
}

fn get_feed(
    name: &'static str,
    kind: FeedKind,
    service: FeedService,
) -> impl Filter<Extract = (warp::reply::Json,), Error = warp::Rejection> + Clone {
    warp::path(name)
        .and(warp::path::end())
        .and(warp::get())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::query::<HashMap<String, String>>())
        .and(with_service(service))
        .and_then(move |agent: Option<String>, forwarded: Option<String>, query: HashMap<String, String>, service: FeedService| async move {
            if is_health_check(agent.as_deref()) {
                return Ok::<_, warp::Rejection>(warp::reply::json(&serde_json::json!({})));
            }
            let params = ClientParams::from_query(&query);
            Ok(respond(kind, params, forwarded, service).await)
        })
}

fn post_feed(
    name: &'static str,
    kind: FeedKind,
    service: FeedService,
) -> impl Filter<Extract = (warp::reply::Json,), Error = warp::Rejection> + Clone {
    warp::path(name)
        .and(warp::path::end())
        .and(warp::post())
        .and(warp::header::optional::<String>("user-agent"))
        .and(warp::header::optional::<String>("x-forwarded-for"))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::bytes())
        .and(with_service(service))
        .and_then(move |agent: Option<String>, forwarded: Option<String>, body: Bytes, service: FeedService| async move {
            if is_health_check(agent.as_deref()) {
                return Ok::<_, warp::Rejection>(warp::reply::json(&serde_json::json!({})));
            }
            let params = ClientParams::from_json(&body);
            Ok(respond(kind, params, forwarded, service).await)
        })
}

async fn respond(
    kind: FeedKind,
    params: Result<ClientParams, FeedError>,
    forwarded: Option<String>,
    service: FeedService,
) -> warp::reply::Json {
    let source_ip = forwarded
        .as_deref()
        .and_then(|header| header.split(',').next())
        .map(|ip| ip.trim().to_string())
        .filter(|ip| !ip.is_empty());

    let result = match params {
        Ok(params) => service.serve(kind, params, source_ip).await,
        Err(err) => Err(err),
    };

    match result {
        Ok(response) => warp::reply::json(&response),
        Err(err) => {
            if err.is_client_error() {
                warn!("({}) rejected request: {}", kind, err);
            } else {
                error!("({}) request failed: {}", kind, err);
            }
            warp::reply::json(&err.body())
        }
    }
}

fn with_service(service: FeedService) -> impl Filter<Extract = (FeedService,), Error = Infallible> + Clone {
    warp::any().map(move || service.clone())
}
