//! Converts handler failures into the HTTP responses the client sees.

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("not logged in")]
    Unauthorized,
    #[error("user {0} is not authorized")]
    Forbidden(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        match self {
            // a convenience login link; the client opens /login in a new tab
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Html(
                    "<html>\n<title>Not logged in</title>\n<h3>Not logged in</h3>\n\
                     Click here to log in: <a href='/login'>Log in</a>."
                        .to_string(),
                ),
            )
                .into_response(),
            Self::Forbidden(user) => (
                StatusCode::FORBIDDEN,
                Html(format!(
                    "<title>Forbidden</title>User {user} is not authorized.<br>\
                     Try a different account. <a href='/logout'>Log out</a>."
                )),
            )
                .into_response(),
            Self::Internal(err) => {
                log::error!("{err:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, format!("{err:#}")).into_response()
            }
        }
    }
}
