use std::env;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use tracing::info;

use crate::core::fit::FitPolicy;
use crate::core::job::{
    DEFAULT_MAX_OUTPUT_DIMENSION, DEFAULT_MAX_OUTPUT_PIXELS, JPEG_MAX_DIMENSION, PipelineOptions,
};

#[derive(Clone, Deserialize, Debug)]
pub struct Config {
    #[serde(default = "default_env")]
    pub env: String, // file / server
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub prefix: Option<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write logs to a daily rolling file in this directory instead of stdout
    pub log_dir: Option<String>,

    #[serde(default)]
    pub default_fit: FitPolicy,
    #[serde(default = "enabled")]
    pub auto_rotate: bool,
    #[serde(default = "enabled")]
    pub use_actual_size: bool,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,
    #[serde(default = "default_batch_concurrency")]
    pub batch_concurrency: usize,
    #[serde(default = "default_max_upload_dimension")]
    pub max_upload_dimension: u32,
    #[serde(default = "default_max_output_dimension")]
    pub max_output_dimension: u32,
    #[serde(default = "default_max_output_pixels")]
    pub max_output_pixels: u64,

    #[serde(default = "default_cors_allow_origin")]
    pub cors_allow_origin: String,
}

fn default_env() -> String {
    "file".to_string()
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn enabled() -> bool {
    true
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_concurrent_jobs() -> usize {
    4
}

fn default_batch_concurrency() -> usize {
    1
}

fn default_max_upload_dimension() -> u32 {
    2048
}

fn default_max_output_dimension() -> u32 {
    DEFAULT_MAX_OUTPUT_DIMENSION
}

fn default_max_output_pixels() -> u64 {
    DEFAULT_MAX_OUTPUT_PIXELS
}

fn default_cors_allow_origin() -> String {
    "*".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: default_env(),
            host: default_host(),
            port: default_port(),
            prefix: None,
            log_level: default_log_level(),
            log_dir: None,
            default_fit: FitPolicy::default(),
            auto_rotate: true,
            use_actual_size: true,
            max_body_bytes: default_max_body_bytes(),
            request_timeout_secs: default_request_timeout_secs(),
            max_concurrent_jobs: default_max_concurrent_jobs(),
            batch_concurrency: default_batch_concurrency(),
            max_upload_dimension: default_max_upload_dimension(),
            max_output_dimension: default_max_output_dimension(),
            max_output_pixels: default_max_output_pixels(),
            cors_allow_origin: default_cors_allow_origin(),
        }
    }
}

impl Config {
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            fit: self.default_fit,
            auto_rotate: self.auto_rotate,
            use_actual_size: self.use_actual_size,
            max_output_dimension: self.max_output_dimension.min(JPEG_MAX_DIMENSION),
            max_output_pixels: self.max_output_pixels,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn tracing_level(&self) -> tracing::Level {
        self.log_level.parse().unwrap_or(tracing::Level::INFO)
    }
}

pub fn get_config() -> anyhow::Result<Config> {
    let env_var = env::var("env").unwrap_or("file".to_string());
    if env_var == "file" {
        info!("using .env file as environtment variable");
        let _ = dotenvy::dotenv();
    } else {
        info!("using server environtment as environtment variable");
    }
    envy::from_env::<Config>().context("invalid configuration in environment")
}
