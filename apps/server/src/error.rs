use std::io::Error as IoError;

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use hostwatch_service::config::ConfigError;
use hostwatch_service::database::StoreError;
use hostwatch_service::monitoring::SchedulerError;
use hostwatch_service::validation::InvalidSegmentFilter;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
    #[error(transparent)]
    SegmentFilter(#[from] InvalidSegmentFilter),
    #[error("host not found")]
    NotFound,
    #[error("{0:#}")]
    Internal(#[from] anyhow::Error),
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::Store(StoreError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Store(StoreError::InvalidAddress(_) | StoreError::InvalidHostType(_))
            | AppError::SegmentFilter(_) => StatusCode::BAD_REQUEST,
            AppError::Store(StoreError::Duplicate(_)) => StatusCode::CONFLICT,
            AppError::Scheduler(SchedulerError::Stopped) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}
