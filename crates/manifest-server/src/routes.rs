//! Warp filters for the enrollment endpoint
//!
//! ```text
//! GET  /<endpoint>?function=..&recordname=..   ─┐
//! POST /<endpoint>  (x-www-form-urlencoded)    ─┴─▶ spawn_blocking(engine.handle) ─▶ Reply
//! ```

use crate::config::ServerConfig;
use manifest_engine::{
    CallerInfo, EnrollError, Params, ProtocolEngine, Reply, RequestContext, INTERNAL_ERROR_MESSAGE,
    REQUEST_ID_HEADER,
};
use manifest_store::RecordStore;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use warp::http::header::{HeaderName, HeaderValue, CONTENT_TYPE, USER_AGENT};
use warp::http::{HeaderMap, StatusCode};
use warp::path::FullPath;
use warp::reply::Response;
use warp::{Filter, Rejection};

const FORWARDED_FOR: &str = "x-forwarded-for";

/// Complete filter: endpoint, methods, caller extraction and rejection handling
pub fn routes<S>(
    engine: Arc<ProtocolEngine<S>>,
    config: &ServerConfig,
) -> impl Filter<Extract = (Response,), Error = Infallible> + Clone
where
    S: RecordStore + 'static,
{
    endpoint(config.route())
        .and(params(config.max_body_bytes))
        .and(caller(config.user_header.clone()))
        .and(with_engine(engine))
        .and_then(dispatch::<S>)
        .recover(handle_rejection)
        .unify()
}

fn endpoint(route: String) -> impl Filter<Extract = (), Error = Rejection> + Clone {
    warp::path::full()
        .and_then(move |full: FullPath| {
            let matched = full.as_str().trim_end_matches('/') == route;
            async move {
                if matched {
                    Ok(())
                } else {
                    Err(warp::reject::not_found())
                }
            }
        })
        .untuple_one()
}

/// Query parameters on GET, form body on POST
fn params(max_body_bytes: u64) -> impl Filter<Extract = (Params,), Error = Rejection> + Clone {
    let get = warp::get().and(warp::query::<Params>());
    let post = warp::post()
        .and(warp::body::content_length_limit(max_body_bytes))
        .and(warp::body::form::<Params>());
    get.or(post).unify()
}

fn caller(user_header: String) -> impl Filter<Extract = (CallerInfo,), Error = Infallible> + Clone {
    warp::addr::remote()
        .and(warp::header::headers_cloned())
        .map(move |addr: Option<SocketAddr>, headers: HeaderMap| {
            let mut caller = CallerInfo::new();
            if let Some(addr) = addr {
                caller = caller.with_remote_addr(addr.ip().to_string());
            }
            if let Some(xff) = header_str(&headers, FORWARDED_FOR) {
                caller = caller.with_forwarded_for(xff);
            }
            if let Some(user) = header_str(&headers, &user_header) {
                caller = caller.with_user(user);
            }
            if let Some(agent) = header_str(&headers, USER_AGENT.as_str()) {
                caller = caller.with_agent(agent);
            }
            caller
        })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn with_engine<S>(
    engine: Arc<ProtocolEngine<S>>,
) -> impl Filter<Extract = (Arc<ProtocolEngine<S>>,), Error = Infallible> + Clone
where
    S: RecordStore + 'static,
{
    warp::any().map(move || Arc::clone(&engine))
}

async fn dispatch<S>(
    params: Params,
    caller: CallerInfo,
    engine: Arc<ProtocolEngine<S>>,
) -> Result<Response, Rejection>
where
    S: RecordStore + 'static,
{
    let ctx = RequestContext::new(caller);
    let request_id = ctx.request_id;

    let reply = match tokio::task::spawn_blocking(move || engine.handle(&params, &ctx)).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::error!(%request_id, "Request handler did not complete: {}", e);
            Reply::from_result(&Err(EnrollError::Server(e.to_string())))
                .with_header(REQUEST_ID_HEADER, request_id.to_string())
        }
    };
    Ok(into_response(reply))
}

async fn handle_rejection(err: Rejection) -> Result<Response, Infallible> {
    let (status, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "not found")
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "request body too large")
    } else if err.find::<warp::reject::LengthRequired>().is_some() {
        (StatusCode::LENGTH_REQUIRED, "content length required")
    } else if err.find::<warp::reject::UnsupportedMediaType>().is_some() {
        (StatusCode::UNSUPPORTED_MEDIA_TYPE, "expected a form body")
    } else if err.find::<warp::body::BodyDeserializeError>().is_some()
        || err.find::<warp::reject::InvalidQuery>().is_some()
    {
        (StatusCode::BAD_REQUEST, "malformed parameters")
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
    } else {
        tracing::error!("Unhandled rejection: {:?}", err);
        (StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    };
    Ok(into_response(Reply::error(status.as_u16(), message)))
}

/// Write a [`Reply`] onto a hyper response
pub fn into_response(reply: Reply) -> Response {
    let mut response = Response::new(reply.body.into());
    *response.status_mut() =
        StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(reply.content_type));
    for (name, value) in reply.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!("Dropping unrepresentable header {}", name),
        }
    }
    response
}
