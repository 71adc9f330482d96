//! End-to-end tests over the full router and an in-memory database

use axum::http::{header, HeaderValue, StatusCode};
use axum_test::TestServer;
use data_encoding::BASE64;
use serde_json::{json, Value};
use tempfile::TempDir;

use jerseynexus::api::{build_router, AppState};
use jerseynexus::config::Config;
use jerseynexus::db::{create_test_pool, migrations::run_migrations};
use jerseynexus::services::payment::esewa::{sign_message, signing_message};

const PASSWORD: &str = "correct-horse-9";

struct Harness {
    server: TestServer,
    secret: String,
    _uploads: TempDir,
}

async fn harness() -> Harness {
    let uploads = TempDir::new().unwrap();
    let mut config = Config::default();
    config.upload.path = uploads.path().to_path_buf();
    config.payment.esewa.verify_status = false;
    let secret = config.payment.esewa.secret_key.clone();

    let pool = create_test_pool().await.unwrap();
    run_migrations(&pool).await.unwrap();
    let state = AppState::new(pool, config).unwrap();

    Harness {
        server: TestServer::new(build_router(state)).unwrap(),
        secret,
        _uploads: uploads,
    }
}

/// Register an account and return its token
async fn register(server: &TestServer, name: &str, email: &str) -> String {
    let response = server
        .post("/api/auth/register")
        .json(&json!({ "name": name, "email": email, "password": PASSWORD }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["token"].as_str().unwrap().to_string()
}

async fn create_product(server: &TestServer, admin: &str, name: &str, price: i64, stock: i64) -> i64 {
    let response = server
        .post("/api/products")
        .authorization_bearer(admin)
        .json(&json!({
            "name": name,
            "price": price,
            "stock": stock,
            "sizes": ["S", "M", "L"],
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["id"].as_i64().unwrap()
}

fn shipping() -> Value {
    json!({
        "full_name": "Sita Sharma",
        "phone": "9800000000",
        "address": "Lazimpat",
        "city": "Kathmandu",
    })
}

#[tokio::test]
async fn test_register_login_and_me() {
    let h = harness().await;
    let token = register(&h.server, "Owner", "owner@example.com").await;

    let me = h.server.get("/api/auth/me").authorization_bearer(&token).await;
    me.assert_status_ok();
    let body = me.json::<Value>();
    assert_eq!(body["email"], "owner@example.com");
    assert_eq!(body["role"], "admin");
    assert!(body.get("password_hash").is_none());

    let login = h
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "OWNER@example.com", "password": PASSWORD }))
        .await;
    login.assert_status_ok();
    let cookie = login.header(header::SET_COOKIE);
    let cookie = cookie.to_str().unwrap();
    assert!(cookie.starts_with("session="));
    assert!(cookie.contains("HttpOnly"));

    let session = cookie.split(';').next().unwrap().to_string();
    let via_cookie = h
        .server
        .get("/api/auth/me")
        .add_header(header::COOKIE, HeaderValue::from_str(&session).unwrap())
        .await;
    via_cookie.assert_status_ok();
}

#[tokio::test]
async fn test_wrong_password_and_logout() {
    let h = harness().await;
    let token = register(&h.server, "Owner", "owner@example.com").await;

    let bad = h
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "owner@example.com", "password": "nope-nope-nope" }))
        .await;
    bad.assert_status(StatusCode::UNAUTHORIZED);
    assert_eq!(bad.json::<Value>()["error"]["code"], "UNAUTHORIZED");

    h.server
        .post("/api/auth/logout")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    h.server
        .get("/api/auth/me")
        .authorization_bearer(&token)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_guards() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    let customer = register(&h.server, "Ram", "ram@example.com").await;

    h.server.get("/api/cart").await.assert_status(StatusCode::UNAUTHORIZED);
    h.server
        .get("/api/users")
        .authorization_bearer(&customer)
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .post("/api/products")
        .authorization_bearer(&customer)
        .json(&json!({ "name": "Sneaky", "price": 100 }))
        .await
        .assert_status(StatusCode::FORBIDDEN);
    h.server
        .get("/api/users")
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_admin_list_headers() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    register(&h.server, "Ram", "ram@example.com").await;
    register(&h.server, "Hari", "hari@example.com").await;

    let response = h
        .server
        .get("/api/users")
        .add_query_param("range", "[0,1]")
        .authorization_bearer(&admin)
        .await;
    response.assert_status_ok();
    assert_eq!(response.header(header::CONTENT_RANGE), "users 0-1/3");
    assert_eq!(response.header("x-total-count"), "3");
    assert_eq!(response.json::<Vec<Value>>().len(), 2);
}

#[tokio::test]
async fn test_catalogue_visibility() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    let id = create_product(&h.server, &admin, "Nepal Home Jersey", 250_000, 5).await;

    h.server
        .put(&format!("/api/products/{}", id))
        .authorization_bearer(&admin)
        .json(&json!({ "is_active": false }))
        .await
        .assert_status_ok();

    h.server
        .get(&format!("/api/products/{}", id))
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get(&format!("/api/products/{}", id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();

    let public = h.server.get("/api/products").await;
    assert_eq!(public.json::<Vec<Value>>().len(), 0);
}

#[tokio::test]
async fn test_cart_flow() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    let customer = register(&h.server, "Ram", "ram@example.com").await;
    let id = create_product(&h.server, &admin, "Barcelona Away", 300_000, 3).await;

    let added = h
        .server
        .post("/api/cart/items")
        .authorization_bearer(&customer)
        .json(&json!({ "productId": id, "size": "m", "quantity": 2 }))
        .await;
    added.assert_status(StatusCode::CREATED);
    let cart = added.json::<Value>();
    assert_eq!(cart["totalItems"], 2);
    assert_eq!(cart["totalPrice"], 600_000);

    let too_many = h
        .server
        .post("/api/cart/items")
        .authorization_bearer(&customer)
        .json(&json!({ "productId": id, "size": "M", "quantity": 2 }))
        .await;
    too_many.assert_status(StatusCode::BAD_REQUEST);

    h.server
        .delete("/api/cart")
        .authorization_bearer(&customer)
        .await
        .assert_status(StatusCode::NO_CONTENT);
    let empty = h.server.get("/api/cart").authorization_bearer(&customer).await;
    assert_eq!(empty.json::<Value>()["totalItems"], 0);
}

#[tokio::test]
async fn test_checkout_and_esewa_payment() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    let customer = register(&h.server, "Ram", "ram@example.com").await;
    let id = create_product(&h.server, &admin, "Real Madrid Home", 1_000_000, 4).await;

    h.server
        .post("/api/cart/items")
        .authorization_bearer(&customer)
        .json(&json!({ "productId": id, "size": "L", "quantity": 1 }))
        .await
        .assert_status(StatusCode::CREATED);

    let placed = h
        .server
        .post("/api/orders")
        .authorization_bearer(&customer)
        .json(&json!({ "shipping": shipping(), "paymentMethod": "esewa" }))
        .await;
    placed.assert_status(StatusCode::CREATED);
    let order = placed.json::<Value>();
    let order_id = order["id"].as_i64().unwrap();
    let total = order["total_amount"].as_i64().unwrap();
    assert_eq!(order["status"], "pending");
    assert_eq!(order["payment_status"], "unpaid");

    let cart = h.server.get("/api/cart").authorization_bearer(&customer).await;
    assert_eq!(cart.json::<Value>()["totalItems"], 0);

    let init = h
        .server
        .post("/api/payments/esewa/initiate")
        .authorization_bearer(&customer)
        .json(&json!({ "order_id": order_id }))
        .await;
    init.assert_status_ok();
    let fields = init.json::<Value>()["fields"].clone();
    let uuid = fields["transaction_uuid"].as_str().unwrap().to_string();
    let amount = fields["total_amount"].as_str().unwrap().to_string();

    let names = "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
    let message = signing_message(&[
        ("transaction_code", "000AWEO"),
        ("status", "COMPLETE"),
        ("total_amount", amount.as_str()),
        ("transaction_uuid", uuid.as_str()),
        ("product_code", "EPAYTEST"),
        ("signed_field_names", names),
    ]);
    let callback = json!({
        "transaction_code": "000AWEO",
        "status": "COMPLETE",
        "total_amount": amount,
        "transaction_uuid": uuid,
        "product_code": "EPAYTEST",
        "signed_field_names": names,
        "signature": sign_message(&h.secret, &message).unwrap(),
    });
    let data = BASE64.encode(callback.to_string().as_bytes());

    let verified = h
        .server
        .post("/api/payments/esewa/verify")
        .authorization_bearer(&customer)
        .json(&json!({ "data": data }))
        .await;
    verified.assert_status_ok();
    let paid = verified.json::<Value>();
    assert_eq!(paid["payment_status"], "paid");
    assert_eq!(paid["total_amount"].as_i64(), Some(total));

    let dashboard = h
        .server
        .get("/api/admin/dashboard")
        .authorization_bearer(&admin)
        .await;
    dashboard.assert_status_ok();
    let stats = dashboard.json::<Value>();
    assert_eq!(stats["total_orders"], 1);
    assert_eq!(stats["orders_by_status"]["pending"], 1);
    assert_eq!(stats["revenue"].as_i64(), Some(total));
}

#[tokio::test]
async fn test_orders_are_private() {
    let h = harness().await;
    let admin = register(&h.server, "Owner", "owner@example.com").await;
    let ram = register(&h.server, "Ram", "ram@example.com").await;
    let hari = register(&h.server, "Hari", "hari@example.com").await;
    let id = create_product(&h.server, &admin, "Arsenal Third", 200_000, 10).await;

    let placed = h
        .server
        .post("/api/orders")
        .authorization_bearer(&ram)
        .json(&json!({
            "items": [{ "productId": id, "size": "S", "quantity": 1 }],
            "shipping": shipping(),
        }))
        .await;
    placed.assert_status(StatusCode::CREATED);
    let order_id = placed.json::<Value>()["id"].as_i64().unwrap();

    h.server
        .get(&format!("/api/orders/{}", order_id))
        .authorization_bearer(&hari)
        .await
        .assert_status(StatusCode::NOT_FOUND);
    h.server
        .get(&format!("/api/orders/{}", order_id))
        .authorization_bearer(&admin)
        .await
        .assert_status_ok();

    let mine = h.server.get("/api/orders/mine").authorization_bearer(&hari).await;
    assert!(mine.json::<Vec<Value>>().is_empty());

    let cancelled = h
        .server
        .post(&format!("/api/orders/{}/cancel", order_id))
        .authorization_bearer(&ram)
        .await;
    cancelled.assert_status_ok();
    assert_eq!(cancelled.json::<Value>()["status"], "cancelled");

    let product = h.server.get(&format!("/api/products/{}", id)).await;
    assert_eq!(product.json::<Value>()["stock"], 10);
}

#[tokio::test]
async fn test_health() {
    let h = harness().await;
    let response = h.server.get("/api/health").await;
    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["database"], "up");
}
