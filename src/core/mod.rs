pub mod batch;
pub mod encoder;
pub mod error;
pub mod fit;
pub mod job;
pub mod metrics;
pub mod orientation;
pub mod payload;
pub mod pipeline;
pub mod registry;
pub mod resizer;
