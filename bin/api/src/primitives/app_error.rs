use super::AppJson;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// Handler failures mapped onto HTTP statuses. Storage and internal errors are
/// logged server-side and answered with an opaque 500; client mistakes carry
/// their reason through.
pub enum AppError {
    Db(rusqlite::Error),
    Pool(r2d2::Error),
    Internal(eyre::Report),
    NotFound,
    Invalid(String),
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error)
    }
}

impl From<r2d2::Error> for AppError {
    fn from(error: r2d2::Error) -> Self {
        Self::Pool(error)
    }
}

impl From<eyre::Report> for AppError {
    fn from(error: eyre::Report) -> Self {
        Self::Internal(error)
    }
}

impl AppError {
    fn status_and_message(self) -> (StatusCode, String) {
        const OPAQUE: &str = "Something went wrong";

        match self {
            AppError::Db(err) => {
                tracing::error!(%err, "database error");
                (StatusCode::INTERNAL_SERVER_ERROR, OPAQUE.to_owned())
            }
            AppError::Pool(err) => {
                tracing::error!(%err, "connection pool error");
                (StatusCode::INTERNAL_SERVER_ERROR, OPAQUE.to_owned())
            }
            AppError::Internal(err) => {
                tracing::error!(%err, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, OPAQUE.to_owned())
            }
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_owned()),
            AppError::Invalid(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody {
            message: String,
        }

        let (status, message) = self.status_and_message();
        (status, AppJson(ErrorBody { message })).into_response()
    }
}
