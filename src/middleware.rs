use poem::{
    Endpoint, IntoResponse, Middleware, Request, Response, Result,
    error::ReadBodyError,
    http::{HeaderValue, Method, StatusCode, header},
    web::Json,
};

use crate::schemas::common::ErrorResponse;

const ALLOW_METHODS: &str = "GET,OPTIONS,PATCH,DELETE,POST,PUT";
const ALLOW_HEADERS: &str = "X-CSRF-Token, X-Requested-With, Accept, Accept-Version, \
Content-Length, Content-MD5, Content-Type, Date, X-Api-Version";

/// Permissive CORS: fixed headers on every response, and `OPTIONS` answered
/// with an empty 200 before routing.
#[derive(Clone, Debug)]
pub struct CorsHeaders {
    allow_origin: HeaderValue,
}

impl CorsHeaders {
    pub fn new(allow_origin: &str) -> anyhow::Result<Self> {
        let allow_origin = HeaderValue::from_str(allow_origin)
            .map_err(|e| anyhow::anyhow!("invalid CORS origin {:?}: {}", allow_origin, e))?;
        Ok(Self { allow_origin })
    }
}

impl<E: Endpoint> Middleware<E> for CorsHeaders {
    type Output = CorsHeadersEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        CorsHeadersEndpoint {
            inner: ep,
            allow_origin: self.allow_origin.clone(),
        }
    }
}

pub struct CorsHeadersEndpoint<E> {
    inner: E,
    allow_origin: HeaderValue,
}

impl<E: Endpoint> Endpoint for CorsHeadersEndpoint<E> {
    type Output = Response;

    async fn call(&self, req: Request) -> Result<Self::Output> {
        let mut resp = if req.method() == Method::OPTIONS {
            StatusCode::OK.into_response()
        } else {
            match self.inner.call(req).await {
                Ok(resp) => resp.into_response(),
                Err(err) => err.into_response(),
            }
        };

        let headers = resp.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, self.allow_origin.clone());
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOW_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOW_HEADERS),
        );
        Ok(resp)
    }
}

/// Caps the request body at `max_bytes`, answering 413 when it is larger.
/// The body is read up front, so requests without a `Content-Length`
/// (plain GETs, chunked uploads) still go through.
#[derive(Clone, Copy, Debug)]
pub struct BodyLimit {
    max_bytes: usize,
}

impl BodyLimit {
    pub fn new(max_bytes: usize) -> Self {
        Self { max_bytes }
    }
}

impl<E: Endpoint> Middleware<E> for BodyLimit {
    type Output = BodyLimitEndpoint<E>;

    fn transform(&self, ep: E) -> Self::Output {
        BodyLimitEndpoint {
            inner: ep,
            max_bytes: self.max_bytes,
        }
    }
}

pub struct BodyLimitEndpoint<E> {
    inner: E,
    max_bytes: usize,
}

impl<E: Endpoint> Endpoint for BodyLimitEndpoint<E> {
    type Output = Response;

    async fn call(&self, mut req: Request) -> Result<Self::Output> {
        match req.take_body().into_bytes_limit(self.max_bytes).await {
            Ok(bytes) => req.set_body(bytes),
            Err(ReadBodyError::PayloadTooLarge) => {
                tracing::warn!("Rejected request body over {} bytes", self.max_bytes);
                return Ok(Json(ErrorResponse::new("Request body too large"))
                    .with_status(StatusCode::PAYLOAD_TOO_LARGE)
                    .into_response());
            }
            Err(err) => return Err(err.into()),
        }

        self.inner.call(req).await.map(IntoResponse::into_response)
    }
}

#[cfg(test)]
mod tests {
    use poem::{EndpointExt, Route, get, handler, post, test::TestClient};

    use super::*;

    #[handler]
    fn echo() -> &'static str {
        "ok"
    }

    fn app() -> impl Endpoint {
        Route::new()
            .at("/echo", post(echo))
            .with(CorsHeaders::new("*").unwrap())
    }

    #[tokio::test]
    async fn test_options_short_circuits() {
        let cli = TestClient::new(app());
        let resp = cli.options("/anything").send().await;
        resp.assert_status_is_ok();
        resp.assert_header("access-control-allow-origin", "*");
        resp.assert_header("access-control-allow-methods", ALLOW_METHODS);
        resp.assert_text("").await;
    }

    #[tokio::test]
    async fn test_headers_on_errors() {
        let cli = TestClient::new(app());
        let resp = cli.get("/missing").send().await;
        resp.assert_status(StatusCode::NOT_FOUND);
        resp.assert_header("access-control-allow-origin", "*");
    }

    #[tokio::test]
    async fn test_configured_origin() {
        let ep = Route::new()
            .at("/echo", post(echo))
            .with(CorsHeaders::new("https://photos.example").unwrap());
        let cli = TestClient::new(ep);
        let resp = cli.post("/echo").send().await;
        resp.assert_status_is_ok();
        resp.assert_header("access-control-allow-origin", "https://photos.example");
        resp.assert_text("ok").await;
    }

    #[handler]
    fn body_len(body: String) -> String {
        body.len().to_string()
    }

    fn limited() -> impl Endpoint {
        Route::new()
            .at("/len", get(body_len).post(body_len))
            .with(BodyLimit::new(16))
    }

    #[tokio::test]
    async fn test_body_limit_allows_requests_without_length() {
        let cli = TestClient::new(limited());
        let resp = cli.get("/len").send().await;
        resp.assert_status_is_ok();
        resp.assert_text("0").await;

        let resp = cli.post("/len").body("0123456789abcdef").send().await;
        resp.assert_status_is_ok();
        resp.assert_text("16").await;
    }

    #[tokio::test]
    async fn test_body_limit_rejects_large_bodies() {
        let cli = TestClient::new(limited());
        let resp = cli.post("/len").body("0123456789abcdefg").send().await;
        resp.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
        resp.assert_text(r#"{"error":"Request body too large"}"#).await;
    }

    #[test]
    fn test_rejects_bad_origin() {
        assert!(CorsHeaders::new("bad\norigin").is_err());
    }
}
