//! HTTP pieces both services' routers share: the `{"error": ...}` body, the
//! status mapping of service errors and extractors that report their own
//! rejections in that body.

use axum::async_trait;
use axum::extract::{FromRequest, FromRequestParts, Path, Request};
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::Json;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AccountError, OrderError};

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn error_response(status: StatusCode, error: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
}

pub fn order_error(err: OrderError) -> ApiError {
    let status = match &err {
        OrderError::Validation(_) => StatusCode::BAD_REQUEST,
        OrderError::NotFound(_) => StatusCode::NOT_FOUND,
        OrderError::Encode(_) | OrderError::Store(_) => {
            tracing::error!("order request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err)
}

pub fn account_error(err: AccountError) -> ApiError {
    let status = match &err {
        AccountError::Validation(_) => StatusCode::BAD_REQUEST,
        AccountError::NotFound => StatusCode::NOT_FOUND,
        AccountError::AlreadyExists => StatusCode::CONFLICT,
        AccountError::Store(_) => {
            tracing::error!("account request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    error_response(status, err)
}

pub async fn health_check() -> &'static str {
    "OK"
}

/// [`Json`] whose rejection keeps axum's status but answers with an
/// [`ErrorResponse`].
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(JsonBody(value)),
            Err(rejection) => Err(error_response(rejection.status(), rejection.body_text())),
        }
    }
}

/// [`Path`] with the same treatment as [`JsonBody`].
pub struct PathParam<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for PathParam<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(PathParam(value)),
            Err(rejection) => Err(error_response(rejection.status(), rejection.body_text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use axum::body::{to_bytes, Body};
    use axum::routing::post;
    use axum::Router;
    use tower::ServiceExt;
    use uuid::Uuid;

    #[test]
    fn error_status_mapping() {
        assert_eq!(
            order_error(OrderError::Validation("amount must be positive".into())).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(order_error(OrderError::NotFound(Uuid::nil())).0, StatusCode::NOT_FOUND);
        assert_eq!(
            order_error(OrderError::Store(StoreError::backend("pool timed out"))).0,
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(account_error(AccountError::AlreadyExists).0, StatusCode::CONFLICT);

        let (_, Json(body)) = account_error(AccountError::NotFound);
        assert_eq!(body.error, "account not found");
    }

    #[derive(Deserialize)]
    struct Note {
        text: String,
    }

    async fn annotate(PathParam(id): PathParam<Uuid>, JsonBody(note): JsonBody<Note>) -> String {
        format!("{}: {}", id, note.text)
    }

    fn app() -> Router {
        Router::new().route("/notes/:id", post(annotate))
    }

    async fn post_note(uri: &str, body: &str) -> (StatusCode, Vec<u8>) {
        let request = axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn error_of(body: &[u8]) -> String {
        serde_json::from_slice::<ErrorResponse>(body).unwrap().error
    }

    #[tokio::test]
    async fn extractors_pass_values_through() {
        let id = Uuid::new_v4();
        let (status, body) = post_note(&format!("/notes/{}", id), r#"{"text":"hi"}"#).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, format!("{}: hi", id).into_bytes());
    }

    #[tokio::test]
    async fn malformed_json_is_reported_as_error_body() {
        let uri = format!("/notes/{}", Uuid::new_v4());

        let (status, body) = post_note(&uri, "{not json").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error_of(&body).is_empty());

        let (status, body) = post_note(&uri, r#"{"title":"hi"}"#).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(error_of(&body).contains("text"));
    }

    #[tokio::test]
    async fn bad_path_parameter_is_reported_as_error_body() {
        let (status, body) = post_note("/notes/not-a-uuid", r#"{"text":"hi"}"#).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!error_of(&body).is_empty());
    }
}
