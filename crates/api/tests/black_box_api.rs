use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};

use ainventory_api::app::{build_router, services::build_services, services::AppServices};
use ainventory_auth::{JwtClaims, TokenType};
use ainventory_core::UserId;
use ainventory_infra::AppConfig;

const SECRET: &str = "black-box-secret";
const PASSWORD: &str = "correct horse";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let services = Arc::new(
            build_services(&AppConfig::in_memory(SECRET))
                .await
                .expect("in-memory services"),
        );
        let app = build_router(services.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api/v1"),
            services,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn sign_up(&self, email: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/signup/"))
            .json(&json!({
                "first_name": "Grace",
                "last_name": "Hopper",
                "email": email,
                "password": PASSWORD,
                "gender": "Female",
            }))
            .send()
            .await
            .unwrap()
    }

    async fn sign_in(&self, email: &str) -> String {
        let res = self
            .client
            .post(self.url("/auth/signin/"))
            .json(&json!({ "email": email, "password": PASSWORD }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let body: Value = res.json().await.unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    /// Sign up with the default role and return a bearer token.
    async fn manager(&self, email: &str) -> String {
        assert_eq!(self.sign_up(email).await.status(), StatusCode::CREATED);
        self.sign_in(email).await
    }

    async fn super_admin(&self, email: &str) -> String {
        let token = self.manager(email).await;
        let user = self
            .services
            .store
            .find_user_by_email(email)
            .await
            .unwrap()
            .unwrap();
        let role = self
            .services
            .store
            .find_role_by_name("super_admin")
            .await
            .unwrap()
            .unwrap();
        self.services
            .store
            .assign_role(user.id, Some(role.id))
            .await
            .unwrap();
        token
    }

    async fn sign_in_with(&self, email: &str, password: &str) -> reqwest::Response {
        self.client
            .post(self.url("/auth/signin/"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
    }

    async fn user_id(&self, email: &str) -> UserId {
        self.services
            .store
            .find_user_by_email(email)
            .await
            .unwrap()
            .unwrap()
            .id
    }

    async fn get(&self, token: &str, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .unwrap()
    }

    async fn post(&self, token: &str, path: &str, body: Value) -> reqwest::Response {
        self.send(reqwest::Method::POST, token, path, body).await
    }

    async fn send(
        &self,
        method: reqwest::Method,
        token: &str,
        path: &str,
        body: Value,
    ) -> reqwest::Response {
        self.client
            .request(method, self.url(path))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn error_of(res: reqwest::Response) -> String {
    let body: Value = res.json().await.unwrap();
    body["error"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn health_and_ping_are_public() {
    let server = TestServer::spawn().await;
    let root = server.base_url.trim_end_matches("/api/v1").to_string();

    let res = server.client.get(format!("{root}/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.client.get(format!("{root}/ping")).send().await.unwrap();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "pong");
}

#[tokio::test]
async fn sign_up_sign_in_and_profile() {
    let server = TestServer::spawn().await;

    let res = server.sign_up("grace@navy.mil").await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["is_success"], true);
    assert_eq!(body["message"], "User created successfully");

    let res = server.sign_up("GRACE@navy.mil").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "email already exists");

    let token = server.sign_in("grace@navy.mil").await;
    let res = server.get(&token, "/user/me/").await;
    assert_eq!(res.status(), StatusCode::OK);
    let me: Value = res.json().await.unwrap();
    assert_eq!(me["email"], "grace@navy.mil");
    assert_eq!(me["first_name"], "Grace");
    assert_eq!(me["organizations"], json!([]));
}

#[tokio::test]
async fn bad_credentials_share_one_message() {
    let server = TestServer::spawn().await;
    server.sign_up("grace@navy.mil").await;

    for (email, password) in [("grace@navy.mil", "wrong horse"), ("ada@navy.mil", PASSWORD)] {
        let res = server
            .client
            .post(server.url("/auth/signin/"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        assert_eq!(error_of(res).await, "invalid email or password");
    }
}

#[tokio::test]
async fn malformed_body_is_invalid_input() {
    let server = TestServer::spawn().await;
    let res = server
        .client
        .post(server.url("/auth/signup/"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "Invalid input");
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let server = TestServer::spawn().await;

    let res = server.client.get(server.url("/user/me/")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    let res = server.get("not-a-jwt", "/user/me/").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);

    // Right secret, wrong algorithm.
    server.sign_up("grace@navy.mil").await;
    let now = Utc::now();
    let claims = JwtClaims {
        user_id: UserId::new(1),
        email: "grace@navy.mil".into(),
        token_type: TokenType::Access,
        token_version: 0,
        jti: uuid::Uuid::new_v4(),
        iat: now.timestamp(),
        exp: (now + ChronoDuration::minutes(10)).timestamp(),
    };
    let forged = jsonwebtoken::encode(
        &Header::new(Algorithm::HS512),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap();
    let res = server.get(&forged, "/user/me/").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn onboarding_creates_an_owned_organization() {
    let server = TestServer::spawn().await;
    let token = server.manager("grace@navy.mil").await;

    let res = server
        .send(
            reqwest::Method::POST,
            &token,
            "/user/onboard/",
            json!({ "first_name": "Amazing", "last_name": "Grace", "organization": "  COBOL Ltd " }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["organization"], "COBOL Ltd");

    let me: Value = server.get(&token, "/user/me/").await.json().await.unwrap();
    assert_eq!(me["first_name"], "Amazing");
    assert_eq!(me["organizations"][0]["name"], "COBOL Ltd");

    let res = server
        .send(reqwest::Method::POST, &token, "/user/onboard/", json!({ "organization": " " }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn category_tree_guards() {
    let server = TestServer::spawn().await;
    let token = server.manager("grace@navy.mil").await;

    let res = server.post(&token, "/product/categories/", json!({ "name": "Loop", "code": "loop", "parent_id": 1 })).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "category cannot be its own parent");

    let parent: Value = server.post(&token, "/product/categories/", json!({ "name": "Office", "code": "off" })).await.json().await.unwrap();
    assert_eq!(parent["code"], "OFF");
    let res = server.post(&token, "/product/categories/", json!({ "name": "Paper", "code": "PAP", "parent_id": parent["id"] })).await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let child: Value = res.json().await.unwrap();

    let res = server
        .send(
            reqwest::Method::PATCH,
            &token,
            &format!("/product/categories/{}/", parent["id"]),
            json!({ "name": "Office", "code": "OFF", "parent_id": child["id"] }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "category cannot be a descendant of itself");

    let res = server
        .send(
            reqwest::Method::DELETE,
            &token,
            &format!("/product/categories/{}/", parent["id"]),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "cannot delete category with child categories");

    let res = server.get(&token, "/product/categories/999/").await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let res = server.get(&token, "/product/categories/abc/").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let page: Value = server
        .get(&token, "/product/categories/?page=1&pageSize=1")
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn supplier_listing_rejects_unknown_sort_keys() {
    let server = TestServer::spawn().await;
    let token = server.manager("grace@navy.mil").await;

    let res = server.get(&token, "/product/suppliers/?sortBy=password").await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server.get(&token, "/product/suppliers/?sortBy=name&sortDir=desc").await;
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn inventory_movements_update_stock() {
    let server = TestServer::spawn().await;
    let token = server.manager("grace@navy.mil").await;

    let res = server
        .send(
            reqwest::Method::POST,
            &token,
            "/product/products/",
            json!({
                "name": "Mechanical Keyboard",
                "sku": "kb-1",
                "cost": "45.00",
                "price": "89.99",
                "quantity": 5,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let product: Value = res.json().await.unwrap();
    assert_eq!(product["sku"], "KB-1");
    assert_eq!(product["stock_status"], "low_stock");

    let path = format!("/product/products/{}/inventory/", product["id"]);
    let res = server
        .send(
            reqwest::Method::POST,
            &token,
            &path,
            json!({ "type": "purchase", "quantity": 20 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["product"]["quantity"], 25);
    assert_eq!(body["product"]["stock_status"], "in_stock");

    let res = server
        .send(
            reqwest::Method::POST,
            &token,
            &path,
            json!({ "type": "sale", "quantity": -1 }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn permissions_gate_department_routes() {
    let server = TestServer::spawn().await;
    let manager = server.manager("grace@navy.mil").await;

    let res = server.get(&manager, "/departments/").await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.get(&manager, "/rbac/check?permission=users.view").await;
    assert_eq!(res.status(), StatusCode::OK);
    let explanation: Value = res.json().await.unwrap();
    assert_eq!(explanation["granted"], false);
    assert_eq!(explanation["denial"], "missing_permission");

    let res = server.get(&manager, "/rbac/check?permission=products.view").await;
    let explanation: Value = res.json().await.unwrap();
    assert_eq!(explanation["granted"], true);
    assert_eq!(explanation["source"], "role");
}

#[tokio::test]
async fn department_closure_follows_the_tree() {
    let server = TestServer::spawn().await;
    let admin = server.super_admin("grace@navy.mil").await;

    let departments: Value = server.get(&admin, "/departments/").await.json().await.unwrap();
    assert_eq!(departments.as_array().unwrap().len(), 6);
    let root = departments[0]["id"].clone();

    let res = server
        .send(
            reqwest::Method::POST,
            &admin,
            "/departments/",
            json!({ "name": "Night Shift", "parent_id": root }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::CREATED);
    let child: Value = res.json().await.unwrap();

    let edges: Value = server
        .get(&admin, &format!("/departments/{}/closure/", child["id"]))
        .await
        .json()
        .await
        .unwrap();
    let depths: Vec<i64> = edges
        .as_array()
        .unwrap()
        .iter()
        .filter(|edge| edge["descendant_id"] == child["id"])
        .map(|edge| edge["depth"].as_i64().unwrap())
        .collect();
    assert!(depths.contains(&0) && depths.contains(&1));

    let res: Value = server
        .get(&admin, &format!("/departments/{}/is-ancestor-of/{}/", root, child["id"]))
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(res["is_ancestor"], true);

    let res = server
        .send(
            reqwest::Method::DELETE,
            &admin,
            &format!("/departments/{root}/"),
            json!({}),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logout_is_acknowledged() {
    let server = TestServer::spawn().await;
    let token = server.manager("grace@navy.mil").await;

    let res = server
        .send(reqwest::Method::POST, &token, "/auth/logout/", json!({}))
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    // Revocation is not enforced by default.
    let res = server.get(&token, "/user/me/").await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server
        .send(reqwest::Method::POST, &token, "/auth/logout-all/", json!({}))
        .await;
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["token_version"], 1);
}

#[tokio::test]
async fn locked_account_is_unlocked_by_an_admin() {
    let server = TestServer::spawn().await;
    let admin = server.super_admin("admin@navy.mil").await;
    let manager = server.manager("ada@navy.mil").await;
    server.sign_up("grace@navy.mil").await;
    let grace = server.user_id("grace@navy.mil").await;

    for _ in 0..5 {
        let res = server.sign_in_with("grace@navy.mil", "wrong horse").await;
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    let res = server.sign_in_with("grace@navy.mil", PASSWORD).await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_of(res).await, "account is not allowed to login");

    let path = format!("/users/{grace}/unlock/");
    let res = server.post(&manager, &path, json!({})).await;
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let res = server.post(&admin, &path, json!({})).await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["account_locked"], false);
    assert_eq!(body["failed_login_attempts"], 0);

    let res = server.sign_in_with("grace@navy.mil", PASSWORD).await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = server.post(&admin, "/users/999/unlock/", json!({})).await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deactivated_account_loses_access() {
    let server = TestServer::spawn().await;
    let admin = server.super_admin("admin@navy.mil").await;
    let token = server.manager("grace@navy.mil").await;
    let grace = server.user_id("grace@navy.mil").await;
    let path = format!("/users/{grace}/status/");

    let res = server
        .send(reqwest::Method::PATCH, &admin, &path, json!({ "status": "retired" }))
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = server
        .send(reqwest::Method::PATCH, &admin, &path, json!({ "status": "inactive" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "inactive");

    let res = server.get(&token, "/user/me/").await;
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(error_of(res).await, "account is not active");

    let res = server
        .send(reqwest::Method::PATCH, &admin, &path, json!({ "status": "active" }))
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let res = server.get(&token, "/user/me/").await;
    assert_eq!(res.status(), StatusCode::OK);
}
