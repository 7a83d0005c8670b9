use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use natours_api::app::build_app;
use natours_api::app::services::AppServices;
use natours_api::config::AppConfig;
use natours_auth::{NewUser, Role, TokenClaims, User};
use natours_core::{DocumentId, Resource};
use natours_infra::OutboxMailer;
use reqwest::StatusCode;
use serde_json::{Value, json};

const JWT_SECRET: &str = "test-secret";
const PASSWORD: &str = "pass1234";

struct TestServer {
    base_url: String,
    services: Arc<AppServices>,
    outbox: Arc<OutboxMailer>,
    client: reqwest::Client,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        let outbox = Arc::new(OutboxMailer::new());
        let config = AppConfig {
            jwt_secret: JWT_SECRET.to_string(),
            ..AppConfig::default()
        };
        let services = Arc::new(AppServices::in_memory(config, outbox.clone()));

        // Same router as prod, bound to an ephemeral port.
        let app = build_app(Arc::clone(&services));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url,
            services,
            outbox,
            client: reqwest::Client::new(),
            handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Store a user directly and mint a token for it.
    async fn seed_user(&self, name: &str, email: &str, role: Role) -> (User, String) {
        let draft = NewUser {
            name: Some(name.into()),
            email: Some(email.into()),
            role: Some(role),
            password: Some(PASSWORD.into()),
            confirm_password: Some(PASSWORD.into()),
            ..NewUser::default()
        };
        let user = User::create(draft, DocumentId::new(), Utc::now()).unwrap();
        self.services.users.create(&user).await.unwrap();
        let token = self.services.tokens.issue(user.id, Utc::now()).unwrap();
        (user, token)
    }

    async fn create_tour(&self, token: &str, body: Value) -> Value {
        let res = self
            .client
            .post(self.url("/api/v1/tours"))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = res.status();
        let body: Value = res.json().await.unwrap();
        assert_eq!(status, StatusCode::CREATED, "create tour failed: {body}");
        body["data"]["data"].clone()
    }

    async fn get(&self, path: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut req = self.client.get(self.url(path));
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let res = req.send().await.unwrap();
        let status = res.status();
        (status, res.json().await.unwrap_or(Value::Null))
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn tour_body(name: &str, price: f64, difficulty: &str) -> Value {
    json!({
        "name": name,
        "duration": 7,
        "maxGroupSize": 15,
        "difficulty": difficulty,
        "price": price,
        "summary": "Breathtaking hike through the Canadian Banff National Park",
        "imageCover": "tour-1-cover.jpg",
        "startDates": ["2021-04-25T09:00:00Z", "2021-07-20T09:00:00Z"]
    })
}

fn forged_token(user_id: DocumentId) -> String {
    let claims = TokenClaims::new(user_id, Utc::now(), Duration::minutes(10));
    jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(b"not-the-server-secret"),
    )
    .expect("failed to encode jwt")
}

fn names(list: &Value) -> Vec<String> {
    list["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn health_is_public_and_unknown_routes_are_404() {
    let srv = TestServer::spawn().await;

    let res = srv.client.get(srv.url("/health")).send().await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let (status, body) = srv.get("/api/v1/bookings", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["status"], "fail");
    assert_eq!(body["message"], "Can't find /api/v1/bookings on this server.");
}

#[tokio::test]
async fn signup_issues_cookie_and_forces_user_role() {
    let srv = TestServer::spawn().await;

    let res = srv
        .client
        .post(srv.url("/api/v1/users/signup"))
        .json(&json!({
            "name": "Laura Wilson",
            "email": "Laura@Example.io",
            "password": PASSWORD,
            "confirmPassword": PASSWORD,
            "role": "admin"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);

    let cookie = res
        .headers()
        .get(reqwest::header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("jwt="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "success");
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));
    let user = &body["data"]["user"];
    assert_eq!(user["email"], "laura@example.io");
    assert_eq!(user["role"], "user");
    assert!(user.get("password").is_none());
    assert!(user.get("active").is_none());
}

#[tokio::test]
async fn signup_rejects_invalid_and_duplicate_input() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let res = srv
        .client
        .post(srv.url("/api/v1/users/signup"))
        .json(&json!({
            "name": "Jonas Again",
            "email": "jonas@example.io",
            "password": PASSWORD,
            "confirmPassword": PASSWORD
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Duplicate field value: \"jonas@example.io\". Please use another value."
    );

    let res = srv
        .client
        .post(srv.url("/api/v1/users/signup"))
        .json(&json!({
            "name": "Mismatch",
            "email": "mismatch@example.io",
            "password": PASSWORD,
            "confirmPassword": "different1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
    let message = body["message"].as_str().unwrap();
    assert!(message.starts_with("Invalid input data."), "{message}");
    assert!(message.contains("Passwords are not the same."), "{message}");
}

#[tokio::test]
async fn login_checks_credentials() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;
    let login = |body: Value| {
        srv.client
            .post(srv.url("/api/v1/users/login"))
            .json(&body)
            .send()
    };

    let res = login(json!({ "email": "jonas@example.io" })).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Please provide email and password");

    let res = login(json!({ "email": "jonas@example.io", "password": "wrong-pass" }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Incorrect email or password");

    let res = login(json!({ "email": "JONAS@example.io", "password": PASSWORD }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let token = body["token"].as_str().unwrap();

    let (status, me) = srv.get("/api/v1/users/me", Some(token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["data"]["data"]["name"], "Jonas");
}

#[tokio::test]
async fn operator_keys_in_body_are_stripped() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let res = srv
        .client
        .post(srv.url("/api/v1/users/login"))
        .json(&json!({ "email": { "$gt": "" }, "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = srv
        .client
        .post(srv.url("/api/v1/users/login"))
        .header(reqwest::header::CONTENT_TYPE, "application/json")
        .body("{\"email\": ")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "fail");
}

#[tokio::test]
async fn protect_rejects_missing_forged_expired_and_orphaned_tokens() {
    let srv = TestServer::spawn().await;
    let (user, _) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let (status, body) = srv.get("/api/v1/reviews", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "You are not logged in! Please log in to get access.");

    let (status, body) = srv.get("/api/v1/reviews", Some(&forged_token(user.id))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Invalid token. Please log in again");

    let expired = srv
        .services
        .tokens
        .issue(user.id, Utc::now() - Duration::days(91))
        .unwrap();
    let (status, body) = srv.get("/api/v1/reviews", Some(&expired)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "Your token has expired. Please log in again");

    let ghost = srv.services.tokens.issue(DocumentId::new(), Utc::now()).unwrap();
    let (status, body) = srv.get("/api/v1/reviews", Some(&ghost)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["message"],
        "The user belonging to this token does no longer exist."
    );
}

#[tokio::test]
async fn jwt_cookie_authenticates() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let res = srv
        .client
        .get(srv.url("/api/v1/users/me"))
        .header(reqwest::header::COOKIE, format!("jwt={token}"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn roles_are_enforced_per_route() {
    let srv = TestServer::spawn().await;
    let (_, user) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;
    let (_, guide) = srv.seed_user("Steve", "steve@example.io", Role::GUIDE).await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;

    let res = srv
        .client
        .post(srv.url("/api/v1/tours"))
        .bearer_auth(&user)
        .json(&tour_body("The Forest Hiker", 397.0, "easy"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "You do not have permission to perform this action");

    let (status, _) = srv.get("/api/v1/tours/monthly-plan/2021", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = srv.get("/api/v1/tours/monthly-plan/2021", Some(&guide)).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = srv.get("/api/v1/users", Some(&user)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, body) = srv.get("/api/v1/users", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 3);
    assert!(
        body["data"]["data"]
            .as_array()
            .unwrap()
            .iter()
            .all(|u| u.get("password").is_none())
    );
}

#[tokio::test]
async fn tour_crud_and_not_found_handling() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;

    let created = srv
        .create_tour(&admin, tour_body("The Forest Hiker", 397.0, "easy"))
        .await;
    let id = created["id"].as_str().unwrap().to_string();
    assert_eq!(created["slug"], "the-forest-hiker");
    assert_eq!(created["ratingsAverage"], 4.5);
    assert_eq!(created["durationWeeks"], 1.0);
    assert!(created.get("createdAt").is_none());

    let (status, body) = srv.get(&format!("/api/v1/tours/{id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["data"]["name"], "The Forest Hiker");
    assert_eq!(body["data"]["data"]["reviews"], json!([]));

    let res = srv
        .client
        .patch(srv.url(&format!("/api/v1/tours/{id}")))
        .bearer_auth(&admin)
        .json(&json!({ "name": "The Forest Explorer", "price": 497 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["data"]["slug"], "the-forest-explorer");
    assert_eq!(body["data"]["data"]["price"], 497.0);

    let res = srv
        .client
        .patch(srv.url(&format!("/api/v1/tours/{id}")))
        .bearer_auth(&admin)
        .json(&json!({ "difficulty": "extreme" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "Invalid input data. Difficulty is either: easy, medium, difficult"
    );

    let (status, body) = srv.get("/api/v1/tours/not-an-id", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid id: not-an-id.");

    let missing = DocumentId::new();
    let (status, body) = srv.get(&format!("/api/v1/tours/{missing}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "No tour found with that ID");

    let res = srv
        .client
        .delete(srv.url(&format!("/api/v1/tours/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = srv
        .client
        .delete(srv.url(&format!("/api/v1/tours/{id}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn tour_queries_filter_sort_project_and_paginate() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;

    srv.create_tour(&admin, tour_body("The Forest Hiker", 397.0, "easy")).await;
    srv.create_tour(&admin, tour_body("The Sea Explorer", 497.0, "medium")).await;
    srv.create_tour(&admin, tour_body("The Snow Adventurer", 997.0, "difficult")).await;
    srv.create_tour(&admin, tour_body("The City Wanderer", 1197.0, "easy")).await;
    let mut secret = tour_body("The Secret Garden Tour", 10.0, "easy");
    secret["secretTour"] = json!(true);
    srv.create_tour(&admin, secret).await;

    let (_, body) = srv.get("/api/v1/tours", None).await;
    assert_eq!(body["results"], 4);

    let (_, body) = srv.get("/api/v1/tours?sort=price", None).await;
    assert_eq!(
        names(&body),
        ["The Forest Hiker", "The Sea Explorer", "The Snow Adventurer", "The City Wanderer"]
    );

    let (_, body) = srv.get("/api/v1/tours?sort=-price", None).await;
    assert_eq!(names(&body)[0], "The City Wanderer");

    let (_, body) = srv
        .get("/api/v1/tours?price[gte]=400&price[lte]=1000&sort=price", None)
        .await;
    assert_eq!(names(&body), ["The Sea Explorer", "The Snow Adventurer"]);

    let (_, body) = srv.get("/api/v1/tours?difficulty=easy&sort=price", None).await;
    assert_eq!(names(&body), ["The Forest Hiker", "The City Wanderer"]);

    let (_, body) = srv.get("/api/v1/tours?fields=name,price", None).await;
    for tour in body["data"]["data"].as_array().unwrap() {
        let mut keys: Vec<&str> = tour.as_object().unwrap().keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["id", "name", "price"]);
    }

    let (_, body) = srv.get("/api/v1/tours?sort=price&limit=3&page=2", None).await;
    assert_eq!(names(&body), ["The City Wanderer"]);

    let (status, body) = srv.get("/api/v1/tours?sort=price&limit=3&page=9", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 0);

    let (_, body) = srv
        .get("/api/v1/tours?name=The%20Sea%20Explorer&name=The%20Forest%20Hiker", None)
        .await;
    assert_eq!(names(&body), ["The Forest Hiker"]);

    let (_, body) = srv.get("/api/v1/tours?difficulty=easy&difficulty=medium", None).await;
    assert_eq!(body["results"], 0);

    let (status, body) = srv.get("/api/v1/tours?price[gte]=abc", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid price: abc.");

    let (_, body) = srv.get("/api/v1/tours?limit=abc", None).await;
    assert_eq!(body["results"], 4);
}

#[tokio::test]
async fn tour_aliases_and_aggregations() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;

    for (i, (name, price, difficulty)) in [
        ("The Forest Hiker", 397.0, "easy"),
        ("The Sea Explorer", 497.0, "medium"),
        ("The Snow Adventurer", 997.0, "difficult"),
        ("The City Wanderer", 1197.0, "easy"),
        ("The Park Camper", 1497.0, "medium"),
        ("The Sports Lover", 2997.0, "difficult"),
    ]
    .into_iter()
    .enumerate()
    {
        let mut body = tour_body(name, price, difficulty);
        body["ratingsAverage"] = json!(if i % 2 == 0 { 4.8 } else { 4.6 });
        srv.create_tour(&admin, body).await;
    }

    let (status, body) = srv.get("/api/v1/tours/top-5-cheap?limit=50", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 5);
    let first = body["data"]["data"][0].as_object().unwrap();
    assert_eq!(first["name"], "The Forest Hiker");
    assert!(first.contains_key("summary") && !first.contains_key("imageCover"));

    let (status, body) = srv.get("/api/v1/tours/tour-stats", None).await;
    assert_eq!(status, StatusCode::OK);
    let stats = body["data"]["stats"].as_array().unwrap();
    assert_eq!(stats.len(), 3);
    assert_eq!(stats[0]["difficulty"], "EASY");
    assert_eq!(stats[0]["numTours"], 2);

    let (status, body) = srv.get("/api/v1/tours/monthly-plan/2021", Some(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    let plan = body["data"]["plan"].as_array().unwrap();
    assert_eq!(plan.len(), 2);
    assert_eq!(plan[0]["numTourStarts"], 6);

    let (status, body) = srv.get("/api/v1/tours/monthly-plan/next", Some(&admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid year: next.");
}

#[tokio::test]
async fn reviews_update_tour_ratings_and_embed_authors() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;
    let (jonas, jonas_token) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;
    let (_, laura_token) = srv.seed_user("Laura", "laura@example.io", Role::USER).await;

    let tour = srv
        .create_tour(&admin, tour_body("The Forest Hiker", 397.0, "easy"))
        .await;
    let tour_id = tour["id"].as_str().unwrap().to_string();
    let nested = format!("/api/v1/tours/{tour_id}/reviews");

    let post_review = |token: &str, body: Value| {
        srv.client
            .post(srv.url(&nested))
            .bearer_auth(token)
            .json(&body)
            .send()
    };

    let res = post_review(&jonas_token, json!({ "review": "Loved it", "rating": 5 }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["data"]["tour"], tour_id.as_str());
    assert_eq!(body["data"]["data"]["user"]["name"], "Jonas");

    let res = post_review(&laura_token, json!({ "review": "Pretty good", "rating": 4 }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::CREATED);
    let laura_review = res.json::<Value>().await.unwrap()["data"]["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let res = post_review(&jonas_token, json!({ "review": "Again!", "rating": 1 }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = post_review(&admin, json!({ "review": "Admins cannot", "rating": 3 }))
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::FORBIDDEN);

    let (_, body) = srv.get(&format!("/api/v1/tours/{tour_id}"), None).await;
    let tour = &body["data"]["data"];
    assert_eq!(tour["ratingsQuantity"], 2);
    assert_eq!(tour["ratingsAverage"], 4.5);
    assert_eq!(tour["reviews"].as_array().unwrap().len(), 2);

    let (status, body) = srv.get(&nested, Some(&jonas_token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["results"], 2);
    let authors: Vec<&str> = body["data"]["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["user"]["name"].as_str().unwrap())
        .collect();
    assert!(authors.contains(&"Jonas") && authors.contains(&"Laura"));

    let (_, body) = srv
        .get(&format!("/api/v1/reviews?user={}", jonas.id), Some(&jonas_token))
        .await;
    assert_eq!(body["results"], 1);

    let res = srv
        .client
        .delete(srv.url(&format!("/api/v1/reviews/{laura_review}")))
        .bearer_auth(&admin)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (_, body) = srv.get(&format!("/api/v1/tours/{tour_id}"), None).await;
    assert_eq!(body["data"]["data"]["ratingsQuantity"], 1);
    assert_eq!(body["data"]["data"]["ratingsAverage"], 5.0);

    let missing = DocumentId::new();
    let res = srv
        .client
        .post(srv.url(&format!("/api/v1/tours/{missing}/reviews")))
        .bearer_auth(&laura_token)
        .json(&json!({ "review": "Nowhere", "rating": 3 }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn password_change_invalidates_older_tokens() {
    let srv = TestServer::spawn().await;
    let (user, _) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;
    let old_token = srv
        .services
        .tokens
        .issue(user.id, Utc::now() - Duration::seconds(30))
        .unwrap();

    let res = srv
        .client
        .patch(srv.url("/api/v1/users/updatePassword"))
        .bearer_auth(&old_token)
        .json(&json!({
            "passwordCurrent": "not-my-password",
            "password": "newpass123",
            "confirmPassword": "newpass123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Your current password is wrong.");

    let res = srv
        .client
        .patch(srv.url("/api/v1/users/updatePassword"))
        .bearer_auth(&old_token)
        .json(&json!({
            "passwordCurrent": PASSWORD,
            "password": "newpass123",
            "confirmPassword": "newpass123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    let new_token = body["token"].as_str().unwrap().to_string();

    let (status, body) = srv.get("/api/v1/users/me", Some(&old_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User recently changed password! Please log in again.");

    let (status, _) = srv.get("/api/v1/users/me", Some(&new_token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn login_token_is_stale_right_after_a_password_change() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let res = srv
        .client
        .post(srv.url("/api/v1/users/login"))
        .json(&json!({ "email": "jonas@example.io", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let login_token = res.json::<Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let res = srv
        .client
        .patch(srv.url("/api/v1/users/updatePassword"))
        .bearer_auth(&login_token)
        .json(&json!({
            "passwordCurrent": PASSWORD,
            "password": "newpass123",
            "confirmPassword": "newpass123"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let new_token = res.json::<Value>().await.unwrap()["token"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, body) = srv.get("/api/v1/users/me", Some(&login_token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["message"], "User recently changed password! Please log in again.");

    let (status, _) = srv.get("/api/v1/users/me", Some(&new_token)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn forgot_and_reset_password_round_trip() {
    let srv = TestServer::spawn().await;
    srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;
    let forgot = |email: &str| {
        srv.client
            .post(srv.url("/api/v1/users/forgotPassword"))
            .json(&json!({ "email": email }))
            .send()
    };

    let res = forgot("nobody@example.io").await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "There is no user with that email address");

    srv.outbox.set_failing(true);
    let res = forgot("jonas@example.io").await.unwrap();
    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(
        body["message"],
        "There was an error sending the email. Try again later."
    );
    srv.outbox.set_failing(false);

    let res = forgot("jonas@example.io").await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Token sent to email!");

    let mail = srv.outbox.last_to("jonas@example.io").unwrap();
    let token = mail
        .body
        .split("resetPassword/")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .unwrap()
        .to_string();

    let reset = |token: &str| {
        srv.client
            .patch(srv.url(&format!("/api/v1/users/resetPassword/{token}")))
            .json(&json!({ "password": "brandnew99", "confirmPassword": "brandnew99" }))
            .send()
    };

    let res = reset(&token).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert!(body["token"].is_string());

    let res = reset(&token).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "Token is invalid or has expired.");

    let res = srv
        .client
        .post(srv.url("/api/v1/users/login"))
        .json(&json!({ "email": "jonas@example.io", "password": "brandnew99" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn update_me_and_delete_me() {
    let srv = TestServer::spawn().await;
    let (_, token) = srv.seed_user("Jonas", "jonas@example.io", Role::USER).await;

    let res = srv
        .client
        .patch(srv.url("/api/v1/users/updateMe"))
        .bearer_auth(&token)
        .json(&json!({ "password": "sneaky123" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let body: Value = res.json().await.unwrap();
    assert_eq!(
        body["message"],
        "This route is not for password updates. Please use /updatePassword."
    );

    let res = srv
        .client
        .patch(srv.url("/api/v1/users/updateMe"))
        .bearer_auth(&token)
        .json(&json!({ "name": "Jonas Schmedtmann", "role": "admin" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["data"]["user"]["name"], "Jonas Schmedtmann");
    assert_eq!(body["data"]["user"]["role"], "user");

    let res = srv
        .client
        .delete(srv.url("/api/v1/users/deleteMe"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let (status, body) = srv.get("/api/v1/users/me", Some(&token)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        body["message"],
        "The user belonging to this token does no longer exist."
    );

    let res = srv
        .client
        .post(srv.url("/api/v1/users/login"))
        .json(&json!({ "email": "jonas@example.io", "password": PASSWORD }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn html_in_bodies_is_sanitized() {
    let srv = TestServer::spawn().await;
    let (_, admin) = srv.seed_user("Admin", "admin@example.io", Role::ADMIN).await;

    let mut body = tour_body("The Forest Hiker", 397.0, "easy");
    body["description"] = json!("<p>Great views</p><script>alert('x')</script>");
    let tour = srv.create_tour(&admin, body).await;
    assert_eq!(tour["description"], "<p>Great views</p>");

    let (_, body) = srv.get(&format!("/api/v1/tours/{}", tour["id"].as_str().unwrap()), None).await;
    assert_eq!(body["data"]["data"]["description"], "<p>Great views</p>");
    assert_eq!(body["data"]["data"]["name"], "The Forest Hiker");
}
