use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde::Deserialize;
use shared::api::{health_check, order_error, ApiError, JsonBody, PathParam};
use shared::{CreateOrder, Order, OrderError, OrderStateMachine, OrderStore};
use std::sync::Arc;
use uuid::Uuid;

type AppState<S> = Arc<OrderStateMachine<S>>;

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    pub user_id: Option<String>,
}

pub fn create_router<S>(orders: Arc<OrderStateMachine<S>>) -> Router
where
    S: OrderStore + 'static,
{
    Router::new()
        .route("/orders", get(list_orders::<S>).post(create_order::<S>))
        .route("/orders/:id", get(get_order::<S>))
        .route("/health", get(health_check))
        .with_state(orders)
}

async fn create_order<S: OrderStore + 'static>(
    State(orders): State<AppState<S>>,
    JsonBody(request): JsonBody<CreateOrder>,
) -> Result<(StatusCode, Json<Order>), ApiError> {
    let order = orders.create(request).await.map_err(order_error)?;
    Ok((StatusCode::CREATED, Json(order)))
}

async fn get_order<S: OrderStore + 'static>(
    State(orders): State<AppState<S>>,
    PathParam(id): PathParam<Uuid>,
) -> Result<Json<Order>, ApiError> {
    orders.get(id).await.map(Json).map_err(order_error)
}

async fn list_orders<S: OrderStore + 'static>(
    State(orders): State<AppState<S>>,
    Query(query): Query<ListOrdersQuery>,
) -> Result<Json<Vec<Order>>, ApiError> {
    let user_id = query.user_id.unwrap_or_default();
    match orders.list(&user_id).await {
        Ok(list) => Ok(Json(list)),
        Err(OrderError::Validation(_)) => Err(order_error(OrderError::Validation(
            "user_id query parameter is required".to_string(),
        ))),
        Err(e) => Err(order_error(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde::de::DeserializeOwned;
    use shared::api::ErrorResponse;
    use shared::memory::{InMemoryMessageLog, InMemoryOrderStore};
    use shared::{OrderStatus, PaymentResult};
    use tower::ServiceExt;

    fn app() -> (Router, Arc<OrderStateMachine<InMemoryOrderStore>>) {
        let orders = Arc::new(OrderStateMachine::new(InMemoryOrderStore::new(
            InMemoryMessageLog::new(),
        )));
        (create_router(orders.clone()), orders)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    fn json<T: DeserializeOwned>(body: &[u8]) -> T {
        serde_json::from_slice(body).unwrap()
    }

    fn post_order(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/orders")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn create_then_fetch_order() {
        let (app, orders) = app();
        let (status, body) = send(
            &app,
            post_order(r#"{"user_id":"u1","amount":"50.00","description":"book"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let created: Order = json(&body);
        assert_eq!(created.status, OrderStatus::New);
        assert_eq!(orders.store().outbox().unprocessed_count().await, 1);

        orders
            .resolve(&PaymentResult::succeeded(created.id, created.amount.clone()))
            .await
            .unwrap();

        let (status, body) = send(&app, get(&format!("/orders/{}", created.id))).await;
        assert_eq!(status, StatusCode::OK);
        let fetched: Order = json(&body);
        assert_eq!(fetched.status, OrderStatus::Paid);
    }

    #[tokio::test]
    async fn invalid_amount_is_bad_request() {
        let (app, orders) = app();
        let (status, body) = send(&app, post_order(r#"{"user_id":"u1","amount":"-1"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json::<ErrorResponse>(&body).error, "amount must be positive");

        let (status, body) = send(&app, post_order(r#"{"user_id":"u1","amount":"1e100000000"}"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json::<ErrorResponse>(&body).error, "amount out of range");
        assert_eq!(orders.store().outbox().unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn unreadable_bodies_answer_with_error_json() {
        let (app, orders) = app();

        let (status, body) = send(&app, post_order(r#"{"user_id":"u1","amount":"#)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!json::<ErrorResponse>(&body).error.is_empty());

        let (status, body) = send(&app, post_order(r#"{"user_id":"u1"}"#)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(json::<ErrorResponse>(&body).error.contains("amount"));

        assert_eq!(orders.store().outbox().unprocessed_count().await, 0);
    }

    #[tokio::test]
    async fn malformed_order_id_answers_with_error_json() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/orders/12345")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!json::<ErrorResponse>(&body).error.is_empty());
    }

    #[tokio::test]
    async fn unknown_order_is_not_found() {
        let (app, _) = app();
        let (status, body) = send(&app, get(&format!("/orders/{}", Uuid::new_v4()))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json::<ErrorResponse>(&body).error.starts_with("order not found"));
    }

    #[tokio::test]
    async fn list_by_user() {
        let (app, _) = app();
        send(&app, post_order(r#"{"user_id":"u1","amount":"1"}"#)).await;
        send(&app, post_order(r#"{"user_id":"u2","amount":"2"}"#)).await;

        let (status, body) = send(&app, get("/orders?user_id=u1")).await;
        assert_eq!(status, StatusCode::OK);
        let listed: Vec<Order> = json(&body);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].user_id, "u1");

        let (status, _) = send(&app, get("/orders")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn health() {
        let (app, _) = app();
        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }
}
