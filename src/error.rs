use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that prevent the server from starting.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("model file {} does not exist", .0.display())]
    ModelMissing(PathBuf),
    #[error("failed to load model {}: {reason}", .path.display())]
    ModelLoad { path: PathBuf, reason: String },
    #[error("failed to read disease table {}: {source}", .path.display())]
    TableRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed disease table: {0}")]
    TableParse(#[from] serde_json::Error),
}

/// Where a request was when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Upload,
    Decode,
    Preprocess,
    Inference,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Upload => "upload",
            Stage::Decode => "decode",
            Stage::Preprocess => "preprocess",
            Stage::Inference => "inference",
        };
        f.write_str(name)
    }
}

/// Per-request failures. These are rendered to the user and never touch shared state.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no image was uploaded")]
    MissingUpload,
    #[error("unsupported file type {0:?}, expected jpg, jpeg or png")]
    UnsupportedType(String),
    #[error("upload is larger than the {limit} byte limit")]
    TooLarge { limit: usize },
    #[error("failed to receive upload: {0}")]
    Upload(String),
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("could not build input tensor: {0}")]
    Preprocess(String),
    #[error("model inference failed: {0}")]
    Inference(String),
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            Self::MissingUpload | Self::UnsupportedType(_) | Self::TooLarge { .. } | Self::Upload(_) => {
                Stage::Upload
            }
            Self::Decode(_) => Stage::Decode,
            Self::Preprocess(_) => Stage::Preprocess,
            Self::Inference(_) => Stage::Inference,
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    stage: Stage,
}

impl ResponseError for PipelineError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::UnsupportedType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::MissingUpload | Self::Upload(_) | Self::Decode(_) => StatusCode::BAD_REQUEST,
            Self::Preprocess(_) | Self::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorBody {
            error: self.to_string(),
            stage: self.stage(),
        })
    }
}
