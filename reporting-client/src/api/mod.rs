pub mod client;
pub mod http;
pub mod transport;

pub use client::{split_windows, ClientSettings, ReportingClient};
pub use http::{Credentials, HttpTransport};
pub use transport::{Page, PageRequest, PageTransport, TransportError};
