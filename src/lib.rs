use std::sync::Arc;

use poem::{
    Endpoint, EndpointExt, IntoResponse, Response, Route,
    error::MethodNotAllowedError,
    http::StatusCode,
    middleware::{AddData, Tracing},
    web::Json,
};
use poem_openapi::OpenApiService;

use crate::core::resizer::ResizeEngine;
use crate::middleware::{BodyLimit, CorsHeaders};
use crate::schemas::common::ErrorResponse;
use crate::settings::Config;

use crate::routes::process::ApiProcess;

pub mod core;
pub mod middleware;
pub mod routes;
pub mod schemas;
pub mod settings;

pub struct AppState {
    pub engine: ResizeEngine,
    pub batch_concurrency: usize,
    pub max_upload_dimension: u32,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let engine = ResizeEngine::with_config(
            config.pipeline_options(),
            config.max_concurrent_jobs,
            config.request_timeout(),
        );
        Self {
            engine,
            batch_concurrency: config.batch_concurrency,
            max_upload_dimension: config.max_upload_dimension,
        }
    }
}

pub fn init_openapi_route(
    app_state: Arc<AppState>,
    config: &Config,
) -> anyhow::Result<impl Endpoint<Output = Response> + use<>> {
    let prefix = config.prefix.clone().unwrap_or("/".to_string());
    let openapi_route =
        OpenApiService::new(ApiProcess, "Resize Engine API", "1.0").server(prefix.clone());

    let openapi_json_endpoint = openapi_route.spec_endpoint();
    let ui = openapi_route.swagger_ui();
    let cors = CorsHeaders::new(&config.cors_allow_origin)?;

    Ok(Route::new()
        .nest(prefix, openapi_route)
        .nest("/docs", ui)
        .at("openapi.json", openapi_json_endpoint)
        .catch_error(|_: MethodNotAllowedError| async move {
            Json(ErrorResponse::new("Method not allowed"))
                .with_status(StatusCode::METHOD_NOT_ALLOWED)
                .into_response()
        })
        .with(AddData::new(app_state))
        .with(BodyLimit::new(config.max_body_bytes))
        .with(Tracing)
        .with(cors))
}
