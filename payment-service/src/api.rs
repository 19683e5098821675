use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use bigdecimal::BigDecimal;
use serde::Deserialize;
use shared::api::{account_error, health_check, ApiError, JsonBody, PathParam};
use shared::{Account, AccountService, LedgerStore};
use std::sync::Arc;

type AppState<L> = Arc<AccountService<L>>;

#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DepositRequest {
    pub amount: BigDecimal,
}

pub fn create_router<L>(accounts: Arc<AccountService<L>>) -> Router
where
    L: LedgerStore + 'static,
{
    Router::new()
        .route("/accounts", post(create_account::<L>))
        .route("/accounts/:user_id", get(get_account::<L>))
        .route("/accounts/:user_id/deposit", post(deposit::<L>))
        .route("/health", get(health_check))
        .with_state(accounts)
}

async fn create_account<L: LedgerStore + 'static>(
    State(accounts): State<AppState<L>>,
    JsonBody(request): JsonBody<CreateAccountRequest>,
) -> Result<(StatusCode, Json<Account>), ApiError> {
    let account = accounts
        .create(&request.user_id)
        .await
        .map_err(account_error)?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account<L: LedgerStore + 'static>(
    State(accounts): State<AppState<L>>,
    PathParam(user_id): PathParam<String>,
) -> Result<Json<Account>, ApiError> {
    accounts.get(&user_id).await.map(Json).map_err(account_error)
}

async fn deposit<L: LedgerStore + 'static>(
    State(accounts): State<AppState<L>>,
    PathParam(user_id): PathParam<String>,
    JsonBody(request): JsonBody<DepositRequest>,
) -> Result<Json<Account>, ApiError> {
    accounts
        .deposit(&user_id, &request.amount)
        .await
        .map(Json)
        .map_err(account_error)
}
