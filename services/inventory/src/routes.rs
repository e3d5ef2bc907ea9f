//! Inventory routes: storefront, admin reports and the scanner API

use axum::{
    Form, Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use axum_extra::extract::WithRejection;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use auth::{AdminUser, AuthenticatedUser};
use common::database::health_check;

use crate::error::{ApiError, ApiResult};
use crate::ledger::{Actor, DEFAULT_EXTENSION_DAYS, DEFAULT_STATS_DAYS, NfcOperation};
use crate::models::{ItemQuery, NewItem, RentalStatus, TransactionFilter, TransactionKind};
use crate::repositories::DEFAULT_PAGE_SIZE;
use crate::state::AppState;

// Extractors whose rejections render as `ApiError` JSON
type JsonBody<T> = WithRejection<Json<T>, ApiError>;
type FormBody<T> = WithRejection<Form<T>, ApiError>;
type QueryParams<T> = WithRejection<Query<T>, ApiError>;
type PathParam<T> = WithRejection<Path<T>, ApiError>;

fn default_one() -> i32 {
    1
}

fn default_extension_days() -> i32 {
    DEFAULT_EXTENSION_DAYS
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemAction {
    Buy,
    Rent,
}

/// Form posted from an item page
#[derive(Debug, Deserialize)]
pub struct ItemActionForm {
    pub action: ItemAction,
    #[serde(default = "default_one")]
    pub qty: i32,
    #[serde(default = "default_one")]
    pub days: i32,
    /// `YYYY-MM-DD`; empty or missing means today
    pub start_date: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtensionForm {
    #[serde(default = "default_extension_days")]
    pub days: i32,
}

#[derive(Debug, Deserialize)]
pub struct RestockForm {
    #[serde(default = "default_one")]
    pub qty: i32,
}

/// Catalog listing query; `page` starts at 1
#[derive(Debug, Default, Deserialize)]
pub struct ItemsParams {
    pub page: Option<i64>,
    pub category: Option<String>,
    pub rentable: Option<bool>,
    pub search: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TransactionsParams {
    pub page: Option<i64>,
    pub kind: Option<TransactionKind>,
}

/// Admin ledger report; both bounds are inclusive days
#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub kind: Option<TransactionKind>,
    pub page: Option<i64>,
}

/// Own rentals listing; `status` defaults to active
#[derive(Debug, Default, Deserialize)]
pub struct RentalsParams {
    #[serde(default)]
    pub status: RentalStatus,
    pub page: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StatsParams {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct NfcBatchRequest {
    pub operations: Vec<NfcOperation>,
}

fn offset_for(page: Option<i64>) -> Option<i64> {
    page.map(|page| (page.max(1) - 1) * DEFAULT_PAGE_SIZE)
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Last instant of `date`; `None` on the last representable day
fn end_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.succ_opt()
        .map(|next| start_of_day(next) - Duration::microseconds(1))
}

fn parse_start_date(raw: Option<&str>) -> ApiResult<Option<NaiveDate>> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| ApiError::BadRequest("Invalid start date, expected YYYY-MM-DD".to_string())),
    }
}

/// Browser-facing routes; expects the session middleware around it
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/item/:id", post(item_action))
        .route("/rentals", get(my_rentals))
        .route("/rentals/:id/return", post(return_rental))
        .route("/rentals/:id/request-extension", post(request_extension))
        .route("/admin/items", post(create_item))
        .route("/admin/items/:id/restock", post(restock_item))
        .route("/admin/low-stock", get(low_stock))
        .route("/admin/overdue", get(overdue))
        .route("/admin/transactions", get(transactions_report))
        .route("/admin/rental-extensions", get(rental_extensions))
        .route("/admin/rental-extensions/:id/extend", post(extend_rental))
        .with_state(state)
}

/// Scanner and integration routes, nested under `/api` behind API-key auth
pub fn create_api_router(state: AppState) -> Router {
    Router::new()
        .route("/items", get(list_items))
        .route("/items/:id", get(get_item))
        .route("/transactions", get(my_transactions))
        .route("/rental-info/:item_id", get(rental_info))
        .route("/nfc/scan", post(nfc_scan))
        .route("/nfc/batch", post(nfc_batch))
        .route("/nfc/stats", get(nfc_stats))
        .with_state(state)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let Some(pool) = state.db_pool.as_ref() else {
        return (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "memory" })),
        );
    };

    match health_check(pool).await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "database": "connected" })),
        ),
        Ok(false) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "database": "disconnected" })),
        ),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy", "database": "disconnected" })),
            )
        }
    }
}

async fn list_items(
    State(state): State<AppState>,
    WithRejection(Query(params), _): QueryParams<ItemsParams>,
) -> ApiResult<impl IntoResponse> {
    let query = ItemQuery {
        category: params.category,
        rentable: params.rentable,
        search: params.search,
        limit: Some(DEFAULT_PAGE_SIZE),
        offset: offset_for(params.page),
    };
    let items = state.ledger.items(&query).await?;
    Ok(Json(json!({
        "items": items,
        "page": params.page.unwrap_or(1).max(1),
    })))
}

async fn get_item(
    State(state): State<AppState>,
    WithRejection(Path(id), _): PathParam<i64>,
) -> ApiResult<impl IntoResponse> {
    let item = state.ledger.item(id).await?;
    Ok(Json(item))
}

async fn item_action(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Path(id), _): PathParam<i64>,
    WithRejection(Form(form), _): FormBody<ItemActionForm>,
) -> ApiResult<impl IntoResponse> {
    let recorded = match form.action {
        ItemAction::Buy => state.ledger.buy(id, user.id, form.qty).await?,
        ItemAction::Rent => {
            let start_date = parse_start_date(form.start_date.as_deref())?;
            state
                .ledger
                .rent(id, user.id, form.days, start_date)
                .await?
        }
    };
    Ok(Json(recorded))
}

async fn my_rentals(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Query(params), _): QueryParams<RentalsParams>,
) -> ApiResult<impl IntoResponse> {
    let today = Utc::now().date_naive();
    let rentals = state
        .ledger
        .rentals_of(user.id, params.status, today, offset_for(params.page))
        .await?;
    Ok(Json(json!({
        "status": params.status,
        "as_of": today,
        "rentals": rentals,
    })))
}

async fn return_rental(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Path(id), _): PathParam<i64>,
) -> ApiResult<impl IntoResponse> {
    let closed = state
        .ledger
        .return_rental(id, Actor::from(&user))
        .await?;
    Ok(Json(closed))
}

async fn request_extension(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Path(id), _): PathParam<i64>,
    WithRejection(Form(form), _): FormBody<ExtensionForm>,
) -> ApiResult<impl IntoResponse> {
    let rental = state
        .ledger
        .request_extension(id, Actor::from(&user), form.days)
        .await?;
    Ok(Json(rental))
}

async fn create_item(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    WithRejection(Json(payload), _): JsonBody<NewItem>,
) -> ApiResult<impl IntoResponse> {
    let item = state.ledger.create_item(payload).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

async fn restock_item(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(id), _): PathParam<i64>,
    WithRejection(Form(form), _): FormBody<RestockForm>,
) -> ApiResult<impl IntoResponse> {
    let recorded = state.ledger.restock(id, form.qty, Some(admin.id)).await?;
    Ok(Json(recorded))
}

async fn low_stock(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<impl IntoResponse> {
    let items = state.ledger.low_stock().await?;
    Ok(Json(json!({
        "threshold": state.ledger.policy().low_stock_threshold,
        "items": items,
    })))
}

async fn overdue(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<impl IntoResponse> {
    let today = Utc::now().date_naive();
    let rentals = state.ledger.overdue(today).await?;
    let rentals: Vec<_> = rentals
        .into_iter()
        .map(|rental| {
            let days_overdue = rental.days_overdue(today);
            json!({ "rental": rental, "days_overdue": days_overdue })
        })
        .collect();
    Ok(Json(json!({ "as_of": today, "rentals": rentals })))
}

async fn transactions_report(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    WithRejection(Query(params), _): QueryParams<ReportParams>,
) -> ApiResult<impl IntoResponse> {
    let to = params
        .to
        .map(|to| {
            end_of_day(to)
                .ok_or_else(|| ApiError::BadRequest(format!("Date {to} is out of range")))
        })
        .transpose()?;
    let filter = TransactionFilter {
        from: params.from.map(start_of_day),
        to,
        kind: params.kind,
        limit: Some(DEFAULT_PAGE_SIZE),
        offset: offset_for(params.page),
        ..Default::default()
    };
    let transactions = state.ledger.transactions(&filter).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

async fn rental_extensions(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> ApiResult<impl IntoResponse> {
    let queue = state
        .ledger
        .extension_queue(Utc::now().date_naive())
        .await?;
    Ok(Json(queue))
}

async fn extend_rental(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    WithRejection(Path(id), _): PathParam<i64>,
    WithRejection(Form(form), _): FormBody<ExtensionForm>,
) -> ApiResult<impl IntoResponse> {
    let rental = state.ledger.approve_extension(id, form.days).await?;
    info!("Admin {} approved extension of rental {}", admin.username, id);
    Ok(Json(rental))
}

async fn my_transactions(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Query(params), _): QueryParams<TransactionsParams>,
) -> ApiResult<impl IntoResponse> {
    let filter = TransactionFilter {
        kind: params.kind,
        user_id: Some(user.id),
        limit: Some(DEFAULT_PAGE_SIZE),
        offset: offset_for(params.page),
        ..Default::default()
    };
    let transactions = state.ledger.transactions(&filter).await?;
    Ok(Json(json!({ "transactions": transactions })))
}

async fn rental_info(
    State(state): State<AppState>,
    WithRejection(Path(item_id), _): PathParam<i64>,
) -> ApiResult<impl IntoResponse> {
    let info = state.ledger.rental_info(item_id).await?;
    Ok(Json(info))
}

async fn nfc_scan(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Json(operation), _): JsonBody<NfcOperation>,
) -> ApiResult<impl IntoResponse> {
    let receipt = state
        .ledger
        .apply_nfc(&operation, Some(user.id))
        .await
        .map_err(|e| {
            warn!("NFC {:?} on item {} failed: {}", operation.action, operation.item_id, e);
            e
        })?;
    Ok(Json(json!({ "success": true, "result": receipt })))
}

async fn nfc_batch(
    State(state): State<AppState>,
    AuthenticatedUser(user): AuthenticatedUser,
    WithRejection(Json(request), _): JsonBody<NfcBatchRequest>,
) -> ApiResult<impl IntoResponse> {
    if request.operations.is_empty() {
        return Err(ApiError::BadRequest("No operations supplied".to_string()));
    }
    let results = state
        .ledger
        .apply_nfc_batch(&request.operations, Some(user.id))
        .await;
    Ok(Json(json!({ "results": results })))
}

async fn nfc_stats(
    State(state): State<AppState>,
    WithRejection(Query(params), _): QueryParams<StatsParams>,
) -> ApiResult<impl IntoResponse> {
    let days = params.days.unwrap_or(DEFAULT_STATS_DAYS);
    let stats = state.ledger.nfc_stats(days, Utc::now()).await?;
    Ok(Json(stats))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn end_of_day_is_last_microsecond() {
        let day = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        let end = end_of_day(day).unwrap();
        assert_eq!(end.date_naive(), day);
        assert_eq!(end + Duration::microseconds(1), start_of_day(day.succ_opt().unwrap()));
    }

    #[test]
    fn end_of_day_has_no_successor_on_last_date() {
        assert_eq!(end_of_day(NaiveDate::MAX), None);
    }
}
