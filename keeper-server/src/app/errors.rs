use std::sync::{Arc, OnceLock};

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Request,
    },
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value};
use tower_sessions::session;

use crate::{db, error_responses, mailer::MailError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("not_found")]
    NotFound(String),

    // auth
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid_credentials")]
    InvalidCredentials,
    #[error("csrf_validation_failed")]
    CsrfValidationFailed,
    #[error("oauth")]
    OAuth(String),

    // validation
    #[error("bad_request")]
    BadRequest(String),
    #[error("conflict")]
    Conflict { field: &'static str, message: String },
    #[error("validation")]
    JsonValidation(#[from] JsonRejection),
    #[error("validation")]
    QueryValidation(#[from] QueryRejection),
    #[error("validation")]
    PathValidation(#[from] PathRejection),

    #[error("service_unavailable")]
    ServiceUnavailable(String),

    #[error(transparent)]
    DB(db::Error),
    #[error(transparent)]
    Session(#[from] session::Error),
    #[error(transparent)]
    Mail(#[from] MailError),
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl Error {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn conflict(field: &'static str, message: impl Into<String>) -> Self {
        Self::Conflict {
            field,
            message: message.into(),
        }
    }

    pub fn username_taken() -> Self {
        Self::conflict("username", "This username is already taken. Please choose a different one.")
    }

    pub fn email_taken() -> Self {
        Self::conflict("email", "An account with this email already exists.")
    }
}

impl From<db::Error> for Error {
    fn from(error: db::Error) -> Self {
        match error {
            db::Error::NotFound(msg) => Self::NotFound(msg),
            db::Error::UniqueViolation(column) if column == "username" => Self::username_taken(),
            db::Error::UniqueViolation(column) if column == "email" => Self::email_taken(),
            error => Self::DB(error),
        }
    }
}

impl<Backend> From<axum_login::Error<Backend>> for Error
where
    Backend: axum_login::AuthnBackend<Error = Error>,
{
    fn from(error: axum_login::Error<Backend>) -> Self {
        match error {
            axum_login::Error::Session(err) => Error::Session(err),
            axum_login::Error::Backend(err) => err,
        }
    }
}

// Response

error_responses! {
    not_found: 404,
    bad_request: 400,
    path_validation: 400,
    query_validation: 400,
    json_validation: 400,
    unauthorized: 401,
    invalid_credentials: 401,
    forbidden: 403,
    conflict: 409,
    service_unavailable: 503,
    unexpected: 500
}

impl From<&Error> for ErrorResponse {
    fn from(error: &Error) -> Self {
        let errors = errors();
        match error {
            Error::NotFound(message) => errors.not_found.with_message(message),
            Error::Unauthorized => errors.unauthorized.with_message("Not authenticated"),
            Error::InvalidCredentials => errors
                .invalid_credentials
                .with_message("Incorrect username/email or password."),
            Error::CsrfValidationFailed => errors.forbidden.with_message("OAuth state mismatch"),
            Error::OAuth(message) => errors.unauthorized.with_message(message),
            Error::BadRequest(message) => errors.bad_request.with_message(message),
            Error::Conflict { field, message } => {
                let mut details = Map::new();
                details.insert("field".into(), Value::from(*field));
                errors
                    .conflict
                    .with_message(message)
                    .with_field(*field)
                    .with_details(details)
            }
            Error::JsonValidation(error) => errors.json_validation.with_message(error.body_text()),
            Error::QueryValidation(error) => errors.query_validation.with_message(error.body_text()),
            Error::PathValidation(error) => errors.path_validation.with_message(error.body_text()),
            Error::ServiceUnavailable(message) => errors.service_unavailable.with_message(message),
            Error::Mail(_) => errors
                .unexpected
                .with_message("An error occurred. Please try again later."),
            _ => errors.unexpected.with_message("Server error"),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let error = Arc::new(self);

        let error_res = ErrorResponse::from(error.as_ref());
        let status = error_res.status;

        let mut res = axum::Json(error_res).into_response();
        res.extensions_mut().insert(error);

        *res.status_mut() = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        res
    }
}

pub async fn on_error(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let error = response.extensions().get::<Arc<Error>>().map(Arc::as_ref);
    match error {
        Some(error) if response.status().is_server_error() => tracing::error!("{:?}", error),
        Some(error) => tracing::warn!("{}: {}", response.status(), error),
        None => {}
    }

    response
}

pub use response::ErrorResponse;

mod response {
    use super::*;

    #[derive(Debug, Serialize, Clone, Default)]
    pub struct ErrorResponse {
        pub error: String,
        pub message: Option<String>,
        pub status: u16,
        /// Offending input, read by the register form.
        #[serde(skip_serializing_if = "Option::is_none")]
        pub field: Option<String>,
        pub details: Option<Map<String, Value>>,
    }

    impl ErrorResponse {
        pub fn new(error: impl Into<String>, status: u16) -> Self {
            Self {
                error: error.into(),
                status,
                ..Default::default()
            }
        }

        pub fn with_message(&self, message: impl Into<String>) -> Self {
            let mut res = self.clone();
            res.message = Some(message.into());
            res
        }

        pub fn with_field(mut self, field: impl Into<String>) -> Self {
            self.field = Some(field.into());
            self
        }

        pub fn with_details(mut self, details: Map<String, Value>) -> Self {
            self.details = Some(details);
            self
        }
    }

    /// Named error responses with fixed status codes
    /// ```rust
    /// error_responses! {
    ///     not_found: 404,
    ///     unexpected: 500
    /// }
    ///
    /// let errors = errors(); // <- from macro
    /// errors.not_found.with_message("Note not found");
    /// ```
    #[macro_export]
    macro_rules! error_responses {
        (
            $($name:ident: $code:expr),* $(,)?
        ) => {
            #[derive(Debug, Clone, Serialize)]
            struct Responses {
                $(
                    $name: ErrorResponse,
                )*
            }

            static ERRORS: OnceLock<Responses> = OnceLock::new();

            fn errors() -> &'static Responses {
                ERRORS.get_or_init(|| Responses {
                    $(
                        $name: ErrorResponse::new(stringify!($name), $code),
                    )*
                })
            }
        };
    }
}
