use std::sync::Arc;

use auth::{
    AuthConfig, AuthRepositories, AuthService, AuthState, models::User,
    session_store::MemoryClientSessionStore,
};
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use chrono::{Duration, Utc};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use inventory::{
    AppState, InventoryLedger, InventoryRepositories, app::create_app, ledger::LedgerPolicy,
    models::{Item, NewItem},
};

const ADMIN: &str = "storeadmin";
const ADMIN_PASSWORD: &str = "secret1";

struct TestApp {
    router: Router,
    ledger: InventoryLedger,
    auth: AuthService,
    admin: User,
}

async fn spawn_app() -> TestApp {
    let config = AuthConfig {
        trust_forwarded_for: true,
        ..AuthConfig::default()
    };
    let auth = AuthService::new(AuthRepositories::in_memory(), config);
    let admin = auth
        .bootstrap_admin(ADMIN, ADMIN_PASSWORD)
        .await
        .expect("Failed to bootstrap admin")
        .expect("Admin already existed");
    let ledger = InventoryLedger::new(InventoryRepositories::in_memory(), LedgerPolicy::default());

    let state = AppState {
        db_pool: None,
        ledger: ledger.clone(),
        auth: AuthState::new(auth.clone(), Arc::new(MemoryClientSessionStore::new())),
    };

    TestApp {
        router: create_app(state),
        ledger,
        auth,
        admin,
    }
}

impl TestApp {
    async fn add_item(&self, name: &str, stock: i32, rentable: bool) -> Item {
        self.ledger
            .create_item(NewItem {
                name: name.to_string(),
                description: None,
                category: Some("Supplies".to_string()),
                price: 1.25,
                stock,
                rentable,
                image_filename: None,
            })
            .await
            .expect("Failed to add item")
    }

    async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router.clone().oneshot(request).await.unwrap()
    }

    async fn login_admin(&self) -> String {
        let response = self
            .send(form_post(
                "/login",
                None,
                &format!("username={ADMIN}&password={ADMIN_PASSWORD}"),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        sid_cookie(&response)
    }

    async fn register_student(&self, local_part: &str) -> String {
        let response = self
            .send(form_post(
                "/register_student",
                None,
                &format!(
                    "email={local_part}%40uni.edu&password=secret1&password_confirm=secret1"
                ),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::FOUND);
        sid_cookie(&response)
    }

    async fn api_key(&self) -> String {
        self.auth
            .create_api_key(&self.admin, "scanner", None)
            .await
            .expect("Failed to create API key")
            .key
    }
}

const IP: &str = "10.1.1.1";

fn form_post(uri: &str, cookie: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header("x-forwarded-for", IP);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().uri(uri).header("x-forwarded-for", IP);
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

fn api_request(method: &str, uri: &str, key: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", IP);
    if let Some(key) = key {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {key}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn sid_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find(|value| value.starts_with("sid="))
        .and_then(|value| value.split(';').next())
        .expect("no sid cookie set")
        .to_string()
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health_and_security_headers() {
    let app = spawn_app().await;

    let response = app.send(get("/health", None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(response.headers()[header::X_FRAME_OPTIONS], "DENY");
    assert_eq!(json_body(response).await["status"], "healthy");
}

#[tokio::test]
async fn test_anonymous_purchase_redirects_to_login() {
    let app = spawn_app().await;
    let item = app.add_item("Pencil", 3, false).await;

    let response = app
        .send(form_post(&format!("/item/{}", item.id), None, "action=buy&qty=1"))
        .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(response.headers()[header::LOCATION], "/login");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 3);
}

#[tokio::test]
async fn test_student_buys_until_out_of_stock() {
    let app = spawn_app().await;
    let item = app.add_item("Notebook", 2, false).await;
    let cookie = app.register_student("ana").await;
    let uri = format!("/item/{}", item.id);

    let response = app
        .send(form_post(&uri, Some(cookie.as_str()), "action=buy&qty=2"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["item"]["stock"], 0);
    assert_eq!(body["transaction"]["kind"], "buy");

    let response = app
        .send(form_post(&uri, Some(cookie.as_str()), "action=buy&qty=1"))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "insufficient_stock");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 0);
}

#[tokio::test]
async fn test_rent_and_return_through_forms() {
    let app = spawn_app().await;
    let item = app.add_item("Graphing calculator", 5, true).await;
    let cookie = app.register_student("ben").await;

    let response = app
        .send(form_post(
            &format!("/item/{}", item.id),
            Some(cookie.as_str()),
            "action=rent&days=7&start_date=2025-03-01",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["item"]["stock"], 4);
    assert_eq!(body["transaction"]["rent_start_date"], "2025-03-01");
    assert_eq!(body["transaction"]["rent_due_date"], "2025-03-08");
    assert_eq!(body["transaction"]["returned"], false);
    let rental_id = body["transaction"]["id"].as_i64().unwrap();

    let return_uri = format!("/rentals/{rental_id}/return");
    let response = app.send(form_post(&return_uri, Some(cookie.as_str()), "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["item"]["stock"], 5);
    assert_eq!(body["rental"]["returned"], true);

    let response = app.send(form_post(&return_uri, Some(cookie.as_str()), "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "already_returned");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 5);
}

#[tokio::test]
async fn test_rent_rejections() {
    let app = spawn_app().await;
    let plain = app.add_item("Stapler", 10, false).await;
    let rentable = app.add_item("Drawing board", 1, true).await;
    let cookie = app.register_student("cai").await;

    let response = app
        .send(form_post(
            &format!("/item/{}", plain.id),
            Some(cookie.as_str()),
            "action=rent&days=5",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "not_rentable");
    assert_eq!(app.ledger.item(plain.id).await.unwrap().stock, 10);

    let response = app
        .send(form_post(
            &format!("/item/{}", rentable.id),
            Some(cookie.as_str()),
            "action=rent&days=45",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");

    let response = app
        .send(form_post(
            &format!("/item/{}", rentable.id),
            Some(cookie.as_str()),
            "action=rent&days=5&start_date=03/01/2025",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.ledger.item(rentable.id).await.unwrap().stock, 1);
}

#[tokio::test]
async fn test_only_owner_may_return_or_extend() {
    let app = spawn_app().await;
    let item = app.add_item("Lab goggles", 2, true).await;
    let owner = app.register_student("dee").await;
    let stranger = app.register_student("eli").await;

    let response = app
        .send(form_post(
            &format!("/item/{}", item.id),
            Some(owner.as_str()),
            "action=rent&days=3",
        ))
        .await;
    let rental_id = json_body(response).await["transaction"]["id"]
        .as_i64()
        .unwrap();

    let response = app
        .send(form_post(
            &format!("/rentals/{rental_id}/return"),
            Some(stranger.as_str()),
            "",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .send(form_post(
            &format!("/rentals/{rental_id}/request-extension"),
            Some(stranger.as_str()),
            "days=3",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.login_admin().await;
    let response = app
        .send(form_post(
            &format!("/rentals/{rental_id}/return"),
            Some(admin.as_str()),
            "",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_extension_request_and_approval() {
    let app = spawn_app().await;
    let item = app.add_item("Tripod", 1, true).await;
    let student = app.register_student("fay").await;

    let response = app
        .send(form_post(
            &format!("/item/{}", item.id),
            Some(student.as_str()),
            "action=rent&days=7&start_date=2025-05-01",
        ))
        .await;
    let rental_id = json_body(response).await["transaction"]["id"]
        .as_i64()
        .unwrap();

    let response = app
        .send(form_post(
            &format!("/rentals/{rental_id}/request-extension"),
            Some(student.as_str()),
            "days=5",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["extension_requested"], true);
    assert_eq!(body["rent_due_date"], "2025-05-08");

    let admin = app.login_admin().await;
    let response = app.send(get("/admin/rental-extensions", Some(admin.as_str()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["pending"][0]["id"], rental_id);
    // due in the past, so also overdue
    assert_eq!(body["overdue"][0]["id"], rental_id);

    let response = app
        .send(form_post(
            &format!("/admin/rental-extensions/{rental_id}/extend"),
            Some(admin.as_str()),
            "days=5",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["extension_approved"], true);
    assert_eq!(body["extension_days"], 5);
    assert_eq!(body["rent_due_date"], "2025-05-13");

    // students cannot approve
    let response = app
        .send(form_post(
            &format!("/admin/rental-extensions/{rental_id}/extend"),
            Some(student.as_str()),
            "days=5",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_extend_defaults_to_seven_days() {
    let app = spawn_app().await;
    let item = app.add_item("Easel", 1, true).await;
    let today = Utc::now().date_naive();
    let rental = app
        .ledger
        .rent(item.id, app.admin.id, 2, Some(today))
        .await
        .unwrap()
        .transaction;

    let admin = app.login_admin().await;
    let response = app
        .send(form_post(
            &format!("/admin/rental-extensions/{}/extend", rental.id),
            Some(admin.as_str()),
            "",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let expected = (today + Duration::days(9)).format("%Y-%m-%d").to_string();
    assert_eq!(body["rent_due_date"], expected.as_str());
}

#[tokio::test]
async fn test_admin_reports() {
    let app = spawn_app().await;
    let low = app.add_item("Glue stick", 1, false).await;
    app.add_item("Paper ream", 40, false).await;
    let student = app.register_student("gus").await;
    app.send(form_post(
        &format!("/item/{}", low.id),
        Some(student.as_str()),
        "action=buy&qty=1",
    ))
    .await;

    let response = app.send(get("/admin/low-stock", Some(student.as_str()))).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let admin = app.login_admin().await;
    let response = app.send(get("/admin/low-stock", Some(admin.as_str()))).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let names: Vec<&str> = body["items"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|item| item["name"].as_str())
        .collect();
    assert_eq!(names, vec!["Glue stick"]);

    let today = Utc::now().date_naive();
    let response = app
        .send(get(
            &format!("/admin/transactions?from={today}&to={today}&kind=buy"),
            Some(admin.as_str()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["transactions"].as_array().unwrap().len(), 1);

    let response = app
        .send(get("/admin/transactions?kind=restock", Some(admin.as_str())))
        .await;
    let body = json_body(response).await;
    assert!(body["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_creates_and_restocks_items() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;

    let response = app
        .send(
            Request::builder()
                .method("POST")
                .uri("/admin/items")
                .header(header::CONTENT_TYPE, "application/json")
                .header(header::COOKIE, &admin)
                .header("x-forwarded-for", IP)
                .body(Body::from(
                    json!({ "name": "Highlighter", "price": 0.8, "stock": 4 }).to_string(),
                ))
                .unwrap(),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let item_id = json_body(response).await["id"].as_i64().unwrap();

    let response = app
        .send(form_post(
            &format!("/admin/items/{item_id}/restock"),
            Some(admin.as_str()),
            "qty=6",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["item"]["stock"], 10);

    let response = app.send(get(&format!("/items/{item_id}"), None)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["name"], "Highlighter");
}

#[tokio::test]
async fn test_api_requires_a_valid_key() {
    let app = spawn_app().await;

    let response = app.send(api_request("GET", "/api/items", None, None)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .send(api_request("GET", "/api/items", Some("not-a-key"), None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let key = app.api_key().await;
    let response = app
        .send(api_request("GET", "/api/items", Some(key.as_str()), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_api_catalog_and_rental_info() {
    let app = spawn_app().await;
    let calculator = app.add_item("Calculator", 3, true).await;
    app.add_item("Compass", 8, false).await;
    app.ledger
        .rent(calculator.id, app.admin.id, 4, None)
        .await
        .unwrap();
    let key = app.api_key().await;

    let response = app
        .send(api_request("GET", "/api/items?rentable=true", Some(key.as_str()), None))
        .await;
    let body = json_body(response).await;
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["name"], "Calculator");

    let response = app
        .send(api_request(
            "GET",
            &format!("/api/rental-info/{}", calculator.id),
            Some(key.as_str()),
            None,
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["stock"], 2);
    assert_eq!(body["active_rentals"], 1);
    assert_eq!(body["available_to_rent"], 1);

    let response = app
        .send(api_request("GET", "/api/items/999", Some(key.as_str()), None))
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_nfc_scan_and_batch() {
    let app = spawn_app().await;
    let item = app.add_item("Microscope", 1, true).await;
    app.ledger
        .rent(item.id, app.admin.id, 2, None)
        .await
        .unwrap();
    let key = app.api_key().await;

    let response = app
        .send(api_request(
            "POST",
            "/api/nfc/scan",
            Some(key.as_str()),
            Some(json!({ "item_id": item.id, "action": "return" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["result"]["new_stock"], 1);

    let response = app
        .send(api_request(
            "POST",
            "/api/nfc/batch",
            Some(key.as_str()),
            Some(json!({
                "operations": [
                    { "item_id": item.id, "action": "restock", "quantity": 4 },
                    { "item_id": item.id, "action": "return" },
                    { "item_id": 999, "action": "restock", "quantity": 1 },
                    { "item_id": item.id, "action": "restock" }
                ]
            })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let statuses: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|result| result["status"].as_str())
        .collect();
    assert_eq!(statuses, vec!["success", "failed", "failed", "success"]);
    assert_eq!(body["results"][1]["kind"], "no_open_rental");
    assert_eq!(body["results"][2]["kind"], "not_found");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 6);
}

#[tokio::test]
async fn test_api_transactions_are_scoped_to_key_owner() {
    let app = spawn_app().await;
    let item = app.add_item("Folder", 5, false).await;
    let student = app.register_student("hal").await;
    app.send(form_post(
        &format!("/item/{}", item.id),
        Some(student.as_str()),
        "action=buy&qty=2",
    ))
    .await;
    app.ledger.buy(item.id, app.admin.id, 1).await.unwrap();
    let key = app.api_key().await;

    let response = app
        .send(api_request("GET", "/api/transactions", Some(key.as_str()), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 1);
    assert_eq!(transactions[0]["qty"], 1);
    assert_eq!(transactions[0]["user_id"], app.admin.id.to_string());
}

#[tokio::test]
async fn test_unknown_nfc_action_fails_only_its_operation() {
    let app = spawn_app().await;
    let item = app.add_item("Label printer", 2, false).await;
    let key = app.api_key().await;

    let response = app
        .send(api_request(
            "POST",
            "/api/nfc/batch",
            Some(key.as_str()),
            Some(json!({
                "operations": [
                    { "item_id": item.id, "action": "restock", "quantity": 4 },
                    { "item_id": item.id, "action": "sell", "quantity": 2 },
                    { "item_id": item.id, "action": "restock" }
                ]
            })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let statuses: Vec<&str> = body["results"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|result| result["status"].as_str())
        .collect();
    assert_eq!(statuses, vec!["success", "failed", "success"]);
    assert_eq!(body["results"][1]["kind"], "validation");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 7);
}

#[tokio::test]
async fn test_report_rejects_unrepresentable_end_date() {
    let app = spawn_app().await;
    let admin = app.login_admin().await;
    let last_day = chrono::NaiveDate::MAX.to_string().replace('+', "%2B");

    let response = app
        .send(get(
            &format!("/admin/transactions?to={last_day}"),
            Some(admin.as_str()),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");
}

async fn rent_by_form(app: &TestApp, cookie: &str, item_id: i64, body: &str) -> i64 {
    let response = app
        .send(form_post(&format!("/item/{item_id}"), Some(cookie), body))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["transaction"]["id"].as_i64().unwrap()
}

async fn listed_rentals(app: &TestApp, cookie: &str, query: &str) -> Vec<i64> {
    let response = app.send(get(&format!("/rentals{query}"), Some(cookie))).await;
    assert_eq!(response.status(), StatusCode::OK);
    json_body(response).await["rentals"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|rental| rental["id"].as_i64())
        .collect()
}

#[tokio::test]
async fn test_student_lists_own_rentals_by_status() {
    let app = spawn_app().await;
    let item = app.add_item("Lab goggles", 5, true).await;
    let student = app.register_student("ivy").await;

    let current = rent_by_form(&app, &student, item.id, "action=rent&days=7").await;
    let late = rent_by_form(
        &app,
        &student,
        item.id,
        "action=rent&days=3&start_date=2025-03-01",
    )
    .await;
    let done = rent_by_form(&app, &student, item.id, "action=rent&days=7").await;
    let response = app
        .send(form_post(&format!("/rentals/{done}/return"), Some(student.as_str()), ""))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    app.ledger
        .rent(item.id, app.admin.id, 7, None)
        .await
        .unwrap();

    assert_eq!(listed_rentals(&app, &student, "").await, vec![current]);
    assert_eq!(listed_rentals(&app, &student, "?status=overdue").await, vec![late]);
    assert_eq!(listed_rentals(&app, &student, "?status=returned").await, vec![done]);

    let response = app
        .send(get("/rentals?status=lost", Some(student.as_str())))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");

    let response = app.send(get("/rentals", None)).await;
    assert_eq!(response.status(), StatusCode::FOUND);
}

#[tokio::test]
async fn test_nfc_stats_over_api() {
    let app = spawn_app().await;
    let item = app.add_item("Soldering iron", 1, true).await;
    app.ledger
        .rent(item.id, app.admin.id, 2, None)
        .await
        .unwrap();
    let key = app.api_key().await;
    for action in ["return", "restock"] {
        let response = app
            .send(api_request(
                "POST",
                "/api/nfc/scan",
                Some(key.as_str()),
                Some(json!({ "item_id": item.id, "action": action })),
            ))
            .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .send(api_request("GET", "/api/nfc/stats", Some(key.as_str()), None))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["period_days"], 30);
    assert_eq!(body["total_operations"], 2);
    assert_eq!(body["returns"], 1);
    assert_eq!(body["restocks"], 1);
    assert!(body["last_scan"].is_string());

    let response = app
        .send(api_request("GET", "/api/nfc/stats?days=0", Some(key.as_str()), None))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");

    let response = app
        .send(api_request("GET", "/api/nfc/stats", None, None))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_requests_get_json_errors() {
    let app = spawn_app().await;
    let item = app.add_item("Ruler", 3, false).await;
    let student = app.register_student("jo").await;
    let key = app.api_key().await;

    let response = app
        .send(form_post(
            &format!("/item/{}", item.id),
            Some(student.as_str()),
            "qty=1",
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let body = json_body(response).await;
    assert_eq!(body["kind"], "validation");
    assert!(body["error"].as_str().unwrap().contains("action"));

    let response = app
        .send(api_request(
            "POST",
            "/api/nfc/scan",
            Some(key.as_str()),
            Some(json!({ "action": "restock" })),
        ))
        .await;
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(json_body(response).await["kind"], "validation");

    let response = app.send(get("/items/not-a-number", None)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["kind"], "validation");
    assert_eq!(app.ledger.item(item.id).await.unwrap().stock, 3);
}
