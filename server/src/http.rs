//! HTTP/1.1 JSON surface.

use std::convert::Infallible;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use fxgate_common::ConversionError;
use fxgate_fx::{ConversionRequest, ConversionResult};
use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Body, Bytes, Frame, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use tokio::net::TcpListener;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::service::CurrencyService;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

/// Header carrying the per-request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Routes served, with their methods.
pub const ROUTES: &[(&str, &str)] = &[
    ("POST", "/convert"),
    ("POST", "/batch-convert"),
    ("GET", "/currencies"),
    ("GET", "/rate"),
    ("GET", "/health"),
    ("GET", "/cache/stats"),
    ("DELETE", "/cache"),
    ("GET", "/config"),
    ("GET", "/metrics"),
    ("GET", "/endpoints"),
];

/// Error payload.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    pub field: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

impl From<&ConversionError> for ErrorEnvelope {
    fn from(err: &ConversionError) -> Self {
        ErrorEnvelope {
            error: ErrorBody {
                code: err.error_code().to_string(),
                message: err.to_string(),
                field: err.field().map(str::to_string),
            },
        }
    }
}

/// One element of a batch response.
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum BatchItem {
    Converted(ConversionResult),
    Failed(ErrorEnvelope),
}

#[derive(Debug, Serialize)]
struct RouteInfo {
    method: &'static str,
    path: &'static str,
}

type HttpResponse = Response<Full<Bytes>>;

/// Accept connections until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, service: Arc<CurrencyService>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        continue;
                    }
                };

                let service = service.clone();
                tokio::spawn(async move {
                    let handler = service_fn(move |req| {
                        let service = service.clone();
                        async move { Ok::<_, Infallible>(dispatch(&service, req).await) }
                    });

                    if let Err(e) = http1::Builder::new()
                        .serve_connection(TokioIo::new(stream), handler)
                        .await
                    {
                        debug!(peer = %peer, error = %e, "Connection closed with error");
                    }
                });
            }
            _ = &mut shutdown => {
                info!("HTTP server stopped accepting connections");
                break;
            }
        }
    }
}

async fn dispatch(service: &CurrencyService, req: Request<Incoming>) -> HttpResponse {
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let span = info_span!("request", %request_id, %method, %path);

    async move {
        let body = match read_body(req.into_body(), MAX_BODY_BYTES).await {
            Ok(body) => body,
            Err(resp) => return resp,
        };

        let mut response = handle(service, &method, &path, query.as_deref(), &body).await;
        if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        info!(status = response.status().as_u16(), "Request completed");
        response
    }
    .instrument(span)
    .await
}

/// Collect a request body of at most `limit` bytes.
async fn read_body<B>(body: B, limit: usize) -> Result<Bytes, HttpResponse>
where
    B: Body,
    B::Error: Into<Box<dyn StdError + Send + Sync>>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.downcast_ref::<LengthLimitError>().is_some() => {
            warn!(limit, "Request body too large");
            Err(error_response(
                StatusCode::PAYLOAD_TOO_LARGE,
                "PAYLOAD_TOO_LARGE",
                &format!("Request body exceeds {} bytes", limit),
                Some("body"),
            ))
        }
        Err(e) => {
            warn!(error = %e, "Failed to read request body");
            Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_BODY",
                "Request body could not be read",
                Some("body"),
            ))
        }
    }
}

/// Route one request.
pub async fn handle(
    service: &CurrencyService,
    method: &Method,
    path: &str,
    query: Option<&str>,
    body: &[u8],
) -> HttpResponse {
    match (method, path) {
        (&Method::POST, "/convert") => {
            if let Some(resp) = reject_if_stopped(service) {
                return resp;
            }
            let request: ConversionRequest = match parse_json(body) {
                Ok(request) => request,
                Err(resp) => return resp,
            };
            match service.convert(&request).await {
                Ok(result) => json_response(StatusCode::OK, &result),
                Err(e) => conversion_error(&e),
            }
        }
        (&Method::POST, "/batch-convert") => {
            if let Some(resp) = reject_if_stopped(service) {
                return resp;
            }
            let requests: Vec<ConversionRequest> = match parse_json(body) {
                Ok(requests) => requests,
                Err(resp) => return resp,
            };
            match service.convert_batch(requests).await {
                Ok(outcomes) => {
                    let items: Vec<BatchItem> = outcomes
                        .into_iter()
                        .map(|outcome| match outcome {
                            Ok(result) => BatchItem::Converted(result),
                            Err(e) => BatchItem::Failed(ErrorEnvelope::from(&e)),
                        })
                        .collect();
                    json_response(StatusCode::OK, &items)
                }
                Err(e) => conversion_error(&e),
            }
        }
        (&Method::GET, "/currencies") => json_response(
            StatusCode::OK,
            &serde_json::json!({ "currencies": service.currencies() }),
        ),
        (&Method::GET, "/rate") => {
            if let Some(resp) = reject_if_stopped(service) {
                return resp;
            }
            let params = match RateParams::parse(query) {
                Ok(params) => params,
                Err(e) => return conversion_error(&e),
            };
            match service.rate(&params.from, &params.to, params.use_cache).await {
                Ok(quote) => json_response(StatusCode::OK, &quote),
                Err(e) => conversion_error(&e),
            }
        }
        (&Method::GET, "/health") => json_response(StatusCode::OK, &service.health_check().await),
        (&Method::GET, "/cache/stats") => json_response(StatusCode::OK, &service.cache_stats().await),
        (&Method::DELETE, "/cache") => match service.clear_cache().await {
            Ok(()) => json_response(
                StatusCode::OK,
                &serde_json::json!({ "message": "Cache cleared" }),
            ),
            Err(e) => {
                warn!(error = %e, "Cache clear failed");
                error_response(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "CACHE_UNAVAILABLE",
                    "Failed to clear cache",
                    None,
                )
            }
        },
        (&Method::GET, "/config") => json_response(StatusCode::OK, &service.effective_config()),
        (&Method::GET, "/metrics") => json_response(StatusCode::OK, &service.metrics()),
        (&Method::GET, "/endpoints") => {
            let routes: Vec<RouteInfo> = ROUTES
                .iter()
                .map(|&(method, path)| RouteInfo { method, path })
                .collect();
            json_response(StatusCode::OK, &routes)
        }
        _ if ROUTES.iter().any(|&(_, known)| known == path) => error_response(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            &format!("{} not allowed on {}", method, path),
            None,
        ),
        _ => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            &format!("No route for {}", path),
            None,
        ),
    }
}

/// Query parameters of `GET /rate`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RateParams {
    from: String,
    to: String,
    use_cache: bool,
}

impl RateParams {
    fn parse(query: Option<&str>) -> Result<Self, ConversionError> {
        let mut from = None;
        let mut to = None;
        let mut use_cache = true;

        for (key, value) in url::form_urlencoded::parse(query.unwrap_or("").as_bytes()) {
            match key.as_ref() {
                "from" => from = Some(value.into_owned()),
                "to" => to = Some(value.into_owned()),
                "use_cache" => {
                    use_cache = match value.as_ref() {
                        "true" | "1" => true,
                        "false" | "0" => false,
                        _ => {
                            return Err(ConversionError::validation(
                                "use_cache",
                                "must be true or false",
                            ))
                        }
                    }
                }
                _ => {}
            }
        }

        Ok(Self {
            from: from.ok_or_else(|| ConversionError::validation("from", "is required"))?,
            to: to.ok_or_else(|| ConversionError::validation("to", "is required"))?,
            use_cache,
        })
    }
}

fn reject_if_stopped(service: &CurrencyService) -> Option<HttpResponse> {
    if service.is_accepting_requests() {
        return None;
    }
    Some(error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        "SERVICE_UNAVAILABLE",
        "Service is not accepting requests",
        None,
    ))
}

fn parse_json<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T, HttpResponse> {
    serde_json::from_slice(body).map_err(|e| {
        debug!(error = %e, "Malformed request body");
        error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_BODY",
            &format!("Malformed request body: {}", e),
            Some("body"),
        )
    })
}

fn conversion_error(err: &ConversionError) -> HttpResponse {
    json_response(StatusCode::BAD_REQUEST, &ErrorEnvelope::from(err))
}

fn error_response(status: StatusCode, code: &str, message: &str, field: Option<&str>) -> HttpResponse {
    let envelope = ErrorEnvelope {
        error: ErrorBody {
            code: code.to_string(),
            message: message.to_string(),
            field: field.map(str::to_string),
        },
    };
    json_response(status, &envelope)
}

fn json_response<T: Serialize>(status: StatusCode, value: &T) -> HttpResponse {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(e) => {
            warn!(error = %e, "Failed to encode response");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                br#"{"error":{"code":"INTERNAL","message":"encoding failed","field":null}}"#.to_vec(),
            )
        }
    };

    let mut response = Response::new(Full::new(Bytes::from(body)));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}
