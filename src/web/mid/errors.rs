use axum::extract::Request;
use axum::http::header;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{Error, ErrorKind};

/// Logs failed requests and makes sure the client only sees `{code, message}`.
///
/// InternalOnly errors are replaced by a generic Internal error; failure
/// responses produced outside our handlers are re-encoded as structured errors.
pub async fn errors(request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }

    let (err, structured) = match response.extensions().get::<Error>() {
        Some(err) => (err.clone(), true),
        None => (
            Error::new(
                ErrorKind::from_status(status),
                status.canonical_reason().unwrap_or("request failed"),
            ),
            false,
        ),
    };

    tracing::error!(
        code = %err.kind(),
        message = err.message(),
        source = %err.source_location(),
        "error handling request"
    );

    if err.kind() == ErrorKind::InternalOnly {
        return rewrite(response, Error::internal("internal server error"));
    }

    if structured {
        response
    } else {
        rewrite(response, err)
    }
}

/// Replaces the body of `response` with `err`, keeping headers set further in
/// (CORS, trace id).
fn rewrite(response: Response, err: Error) -> Response {
    let (parts, _) = response.into_parts();
    let mut headers = parts.headers;
    headers.remove(header::CONTENT_TYPE);
    headers.remove(header::CONTENT_LENGTH);

    let mut rewritten = err.into_response();
    rewritten.headers_mut().extend(headers);
    rewritten
}
