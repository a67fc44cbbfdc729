use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum BridgeError {
    #[error("No module of type {module_type} found in station data")]
    DeviceNotFound { module_type: String },

    #[error("Netatmo authentication failed: {0}")]
    Auth(String),

    #[error("Netatmo API error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid Netatmo response: {0}")]
    InvalidResponse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Mqtt(#[from] rumqttc::ClientError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
