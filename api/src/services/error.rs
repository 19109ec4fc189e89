//! Mapping handler-side failures to status codes, with a log event on the way

use axum::http::StatusCode;

/// Converts an error result into a bare status code after logging it.
/// 5xx outcomes log at `error`, everything else at `info`.
pub trait LogErr<T> {
    fn log_500(self, context: &str) -> Result<T, StatusCode>;

    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode>;
}

impl<T, E: std::fmt::Display> LogErr<T> for Result<T, E> {
    fn log_500(self, context: &str) -> Result<T, StatusCode> {
        self.log_status(context, StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn log_status(self, context: &str, status: StatusCode) -> Result<T, StatusCode> {
        self.map_err(|e| {
            if status.is_server_error() {
                tracing::error!(status = status.as_u16(), error = %e, "{context}");
            } else {
                tracing::info!(status = status.as_u16(), error = %e, "{context}");
            }
            status
        })
    }
}
