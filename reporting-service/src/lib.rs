pub mod cache;
pub mod config;
pub mod error;
pub mod filters;
pub mod http;
pub mod metrics_server;
pub mod microgrids;
pub mod observability;
pub mod pages;
pub mod pipeline;
pub mod service;
pub mod session;
pub mod summary;
pub mod transform;

pub use pipeline::{Envelope, ReportPipeline};
pub use service::ReportService;
pub use session::SessionContext;
