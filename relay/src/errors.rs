use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Hyper error: {0}")]
    Hyper(#[from] hyper::Error),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Settings store error: {0}")]
    Store(#[from] crate::store::StoreError),

    #[error("Invalid configuration: {0}")]
    Config(#[from] crate::config::ValidationError),
}
