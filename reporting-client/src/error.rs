#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    #[error("invalid range: {0}")]
    InvalidRange(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("upstream error after {attempts} attempt(s): {detail}")]
    Upstream { attempts: u32, detail: String },
    #[error("client setup failed: {0}")]
    Setup(String),
}
