use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("cannot open camera: {0}")]
    CameraOpen(String),

    #[error("camera capture failed {failures} times in a row, giving up")]
    CaptureFailed { failures: u32 },

    #[error("detector error: {0}")]
    Detector(#[source] anyhow::Error),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("wire encoding error: {0}")]
    Wire(#[from] WireError),

    #[error("preview window error: {0}")]
    Preview(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    ReadFile { path: String, message: String },

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum WireError {
    #[error("payload of {size} bytes exceeds the {limit} byte datagram limit")]
    Oversize { size: usize, limit: usize },

    #[error("failed to serialize landmarks: {0}")]
    Serialize(#[from] serde_json::Error),
}
