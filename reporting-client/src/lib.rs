pub mod api;
pub mod domain;
pub mod error;

pub use api::{ClientSettings, Credentials, HttpTransport, ReportingClient};
pub use error::ClientError;
