use std::path::PathBuf;
use thiserror::Error;

/// The main error type for autolabel operations.
#[derive(Debug, Error)]
pub enum AutolabelError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Model initialization failed: {message}")]
    ModelInit {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Prediction failed: {message}")]
    Prediction {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("File operation failed on {path}: {source}")]
    FileOperation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl AutolabelError {
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter(message.into())
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn model_init(message: impl Into<String>) -> Self {
        Self::ModelInit {
            message: message.into(),
            source: None,
        }
    }

    pub fn model_init_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::ModelInit {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn prediction(message: impl Into<String>) -> Self {
        Self::Prediction {
            message: message.into(),
            source: None,
        }
    }

    pub fn prediction_with(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Prediction {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn file_operation(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOperation {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error kind, used by the CLI binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 2,
            Self::InvalidParameter(_) => 3,
            Self::ModelInit { .. } => 4,
            Self::Prediction { .. } => 5,
            Self::FileOperation { .. } => 6,
        }
    }
}
