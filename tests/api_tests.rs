// tests/api_tests.rs

use exam_backend::{config::Config, routes, services::cache::CacheService, state::AppState};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::collections::HashMap;

/// Helper function to spawn the app on a random port for testing.
/// Returns the base URL (e.g., "http://127.0.0.1:12345").
async fn spawn_app() -> String {
    // Note: For Postgres, you must have a running database.
    // We'll read from DATABASE_URL environment variable.
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    // 1. Create a pool
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await
        .expect("Failed to connect to Postgres for testing. Make sure DATABASE_URL is set.");

    // 2. Run migrations
    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to migrate database");

    // 3. Create test configuration and state
    let config = Config {
        database_url: database_url.clone(),
        jwt_secret: "test_secret_for_integration_tests".to_string(),
        jwt_refresh_secret: "test_refresh_secret_for_integration_tests".to_string(),
        jwt_expiration: 600, // 10 minutes for tests
        jwt_refresh_expiration: 3600,
        cors_origin: "http://localhost:3000".to_string(),
        redis_host: "localhost".to_string(),
        redis_port: 6379,
        redis_password: None,
        support_contact: "support@example.com".to_string(),
        rust_log: "error".to_string(),
        admin_email: None,
        admin_password: None,
    };

    // Cache stays disconnected: every lookup is a miss, which is fine here.
    let cache = CacheService::new("redis://127.0.0.1:1".to_string());

    let state = AppState::new(pool, config, cache);

    // 4. Create the router with the app state
    let app = routes::create_router(state);

    // 5. Bind to port 0 to get a random available port
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");

    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    // 6. Spawn the server in the background
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    address
}

async fn test_pool() -> PgPool {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    PgPoolOptions::new()
        .max_connections(1)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test DB")
}

/// Seeds a user directly and returns its id.
async fn seed_user(pool: &PgPool, email: &str, password: &str, role: &str) -> i64 {
    let hashed = exam_backend::utils::hash::hash_password(password).unwrap();
    sqlx::query_scalar(
        "INSERT INTO users (name, email, password, role) VALUES ('Test User', $1, $2, $3) RETURNING id",
    )
    .bind(email)
    .bind(hashed)
    .bind(role)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn login(client: &reqwest::Client, address: &str, email: &str, password: &str) -> serde_json::Value {
    client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await
        .expect("Login request failed")
        .json::<serde_json::Value>()
        .await
        .expect("Failed to parse login json")
}

fn unique_email(prefix: &str) -> String {
    format!("{}_{}@example.com", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

#[tokio::test]
async fn unknown_route_404() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();

    // Act
    let response = client
        .get(format!("{}/random_path_that_does_not_exist", address))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
async fn login_rejects_bad_credentials() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let email = unique_email("login");
    seed_user(&pool, &email, "correct-horse-9", "teacher").await;

    // Act
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": "wrong-password" }))
        .send()
        .await
        .expect("Failed to execute request");

    // Assert
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn login_locks_after_repeated_failures() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let email = unique_email("lockout");
    seed_user(&pool, &email, "correct-horse-9", "teacher").await;

    // Act: burn through the allowed attempts
    for _ in 0..5 {
        let response = client
            .post(format!("{}/api/auth/login", address))
            .json(&serde_json::json!({ "email": email, "password": "nope" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 401);
    }

    // Assert: even the right password is refused while locked
    let response = client
        .post(format!("{}/api/auth/login", address))
        .json(&serde_json::json!({ "email": email, "password": "correct-horse-9" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 429);
}

#[tokio::test]
async fn refresh_returns_new_token_pair() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let email = unique_email("refresh");
    seed_user(&pool, &email, "password123", "admin").await;

    let login_resp = login(&client, &address, &email, "password123").await;
    let refresh_token = login_resp["refreshToken"].as_str().expect("No refresh token");

    // Act
    let response = client
        .post(format!("{}/api/auth/refresh", address))
        .json(&serde_json::json!({ "refreshToken": refresh_token }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert!(body["accessToken"].as_str().is_some());
    assert!(body["refreshToken"].as_str().is_some());
}

#[tokio::test]
async fn student_cannot_manage_questions() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let email = unique_email("student_perm");
    seed_user(&pool, &email, "password123", "student").await;

    let login_resp = login(&client, &address, &email, "password123").await;
    let token = login_resp["accessToken"].as_str().expect("No token");

    // Act
    let response = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", token))
        .json(&serde_json::json!({
            "subjectId": "math",
            "subcategoryId": "algebra",
            "type": "multiple_choice",
            "content": "1 + 1 = ?",
            "options": ["1", "2"],
            "correctAnswer": "2",
            "points": 1.0
        }))
        .send()
        .await
        .unwrap();

    // Assert
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
async fn logout_blocks_the_token() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;
    let email = unique_email("logout");
    seed_user(&pool, &email, "password123", "admin").await;

    let login_resp = login(&client, &address, &email, "password123").await;
    let token = login_resp["accessToken"].as_str().expect("No token").to_string();

    // Act
    let response = client
        .post(format!("{}/api/auth/logout", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    // Assert: the same token no longer authenticates
    let response = client
        .get(format!("{}/api/education/subjects", address))
        .header("Authorization", format!("Bearer {}", token))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
async fn test_exam_flow() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let admin_email = unique_email("flow_admin");
    seed_user(&pool, &admin_email, "password123", "admin").await;
    let admin_login = login(&client, &address, &admin_email, "password123").await;
    let admin_token = admin_login["accessToken"].as_str().unwrap().to_string();

    // 1. Admin creates questions
    let mut question_ids = Vec::new();
    for i in 0..3 {
        let resp = client
            .post(format!("{}/api/questions", address))
            .header("Authorization", format!("Bearer {}", admin_token))
            .json(&serde_json::json!({
                "subjectId": "math",
                "subcategoryId": "algebra",
                "type": "multiple_choice",
                "content": format!("Question {}", i),
                "options": ["A", "B", "C", "D"],
                "correctAnswer": "A",
                "points": 2.0,
                "difficulty": 2
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 201);
        let body: serde_json::Value = resp.json().await.unwrap();
        question_ids.push(body["data"]["id"].as_i64().unwrap());
    }

    // 2. Admin creates an exam over those questions
    let resp = client
        .post(format!("{}/api/education/exams", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "title": "Algebra check",
            "subjectId": "math",
            "subcategoryId": "algebra",
            "duration": 30,
            "questions": question_ids
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let exam: serde_json::Value = resp.json().await.unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    // 3. Admin enrolls a student (account gets the default credential)
    let student_email = unique_email("flow_student");
    let resp = client
        .post(format!("{}/api/students", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "name": "Ana",
            "lastName": "Prueba",
            "email": student_email,
            "dateOfBirth": "2008-04-01"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    // 4. Student logs in with the default password but is fenced off until
    // the credential is changed
    let student_login = login(&client, &address, &student_email, "Student123!").await;
    assert_eq!(student_login["user"]["mustChangePassword"], true);
    let provisional_token = student_login["accessToken"].as_str().unwrap().to_string();

    let resp = client
        .get(format!("{}/api/education/subjects", address))
        .header("Authorization", format!("Bearer {}", provisional_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // 5. Changing the password lifts the fence
    let resp = client
        .post(format!("{}/api/auth/change-password", address))
        .header("Authorization", format!("Bearer {}", provisional_token))
        .json(&serde_json::json!({
            "currentPassword": "Student123!",
            "newPassword": "fresh-password-1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let student_login = login(&client, &address, &student_email, "fresh-password-1").await;
    let student_token = student_login["accessToken"].as_str().unwrap().to_string();

    // 6. Student starts the exam
    let resp = client
        .post(format!("{}/api/education/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let session: serde_json::Value = resp.json().await.unwrap();
    let session_id = session["data"]["id"].as_i64().unwrap();
    assert_eq!(session["data"]["status"], "in_progress");

    // A second start while this one is live must be refused
    let resp = client
        .post(format!("{}/api/education/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_ne!(resp.status().as_u16(), 201);

    // 7. Pause and resume
    let resp = client
        .post(format!("{}/api/education/sessions/{}/pause", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Pausing a paused session is an invalid transition
    let resp = client
        .post(format!("{}/api/education/sessions/{}/pause", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    let resp = client
        .post(format!("{}/api/education/sessions/{}/resume", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // 8. Submit with every answer correct
    let mut answers = HashMap::new();
    for id in &question_ids {
        answers.insert(id.to_string(), "A".to_string());
    }
    let resp = client
        .post(format!("{}/api/education/sessions/{}/submit", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let result: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(result["totalScore"].as_f64().unwrap(), 100.0);
    assert_eq!(result["grade"], "A");

    // 9. The stored score agrees
    let resp = client
        .get(format!("{}/api/education/sessions/{}/score", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let score: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(score["grade"], "A");
    assert_eq!(score["status"], "graded");

    // 10. Submitting again is an invalid transition
    let resp = client
        .post(format!("{}/api/education/sessions/{}/submit", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn essay_review_recomputes_the_score() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let admin_email = unique_email("review_admin");
    seed_user(&pool, &admin_email, "password123", "admin").await;
    let admin_login = login(&client, &address, &admin_email, "password123").await;
    let admin_token = admin_login["accessToken"].as_str().unwrap().to_string();

    // One auto-gradable question and one essay, worth 2 points each
    let resp = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "subjectId": "math",
            "subcategoryId": "algebra",
            "type": "multiple_choice",
            "content": "3 * 3 = ?",
            "options": ["6", "9"],
            "correctAnswer": "9",
            "points": 2.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let objective_id = body["data"]["id"].as_i64().unwrap();

    let resp = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "subjectId": "math",
            "subcategoryId": "algebra",
            "type": "essay",
            "content": "Explain why 3 * 3 = 9.",
            "correctAnswer": "",
            "points": 2.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let essay_id = body["data"]["id"].as_i64().unwrap();

    let resp = client
        .post(format!("{}/api/education/exams", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "title": "Mixed exam",
            "subjectId": "math",
            "subcategoryId": "algebra",
            "duration": 30,
            "questions": [objective_id, essay_id]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let exam: serde_json::Value = resp.json().await.unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    let student_email = unique_email("review_student");
    seed_user(&pool, &student_email, "password123", "student").await;
    let student_login = login(&client, &address, &student_email, "password123").await;
    let student_token = student_login["accessToken"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/education/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let session: serde_json::Value = resp.json().await.unwrap();
    let session_id = session["data"]["id"].as_i64().unwrap();

    // Act: submit with the objective answered correctly. The essay is stored
    // ungraded, so the initial total covers the objective points only.
    let mut answers = HashMap::new();
    answers.insert(objective_id.to_string(), "9".to_string());
    answers.insert(
        essay_id.to_string(),
        "Because three groups of three make nine.".to_string(),
    );
    let resp = client
        .post(format!("{}/api/education/sessions/{}/submit", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .json(&serde_json::json!({ "answers": answers }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let result: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(result["totalScore"].as_f64().unwrap(), 100.0);
    assert_eq!(result["grade"], "A");
    assert_eq!(result["pendingReview"].as_i64().unwrap(), 1);

    // The essay row is visible to the grader and still awaiting points
    let resp = client
        .get(format!("{}/api/education/sessions/{}/answers", address, session_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let answers: serde_json::Value = resp.json().await.unwrap();
    let essay_row = answers["data"]
        .as_array()
        .unwrap()
        .iter()
        .find(|a| a["question_id"].as_i64() == Some(essay_id))
        .expect("essay answer not stored");
    assert!(essay_row["points_awarded"].is_null());

    // Awarding 1 of 2 essay points folds the essay into both sides of the
    // normalization: (2 + 1) / (2 + 2) = 75%.
    let resp = client
        .post(format!("{}/api/education/sessions/{}/review", address, session_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "questionId": essay_id,
            "pointsAwarded": 1.0,
            "comment": "Half credit for the reasoning"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let reviewed: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(reviewed["totalScore"].as_f64().unwrap(), 75.0);
    assert_eq!(reviewed["grade"], "C");

    // The stored score agrees
    let resp = client
        .get(format!("{}/api/education/sessions/{}/score", address, session_id))
        .header("Authorization", format!("Bearer {}", student_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let score: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(score["totalScore"].as_f64().unwrap(), 75.0);
    assert_eq!(score["grade"], "C");

    // Reviewing a question the session holds no answer for is a 404
    let resp = client
        .post(format!("{}/api/education/sessions/{}/review", address, session_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "questionId": 999_999_999,
            "pointsAwarded": 1.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
}

#[tokio::test]
async fn session_score_and_events_are_private_to_the_owner() {
    // Arrange
    let address = spawn_app().await;
    let client = reqwest::Client::new();
    let pool = test_pool().await;

    let admin_email = unique_email("privacy_admin");
    seed_user(&pool, &admin_email, "password123", "admin").await;
    let admin_login = login(&client, &address, &admin_email, "password123").await;
    let admin_token = admin_login["accessToken"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/questions", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "subjectId": "math",
            "subcategoryId": "algebra",
            "type": "true_false",
            "content": "7 is prime.",
            "options": ["true", "false"],
            "correctAnswer": "true",
            "points": 1.0
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    let question_id = body["data"]["id"].as_i64().unwrap();

    let resp = client
        .post(format!("{}/api/education/exams", address))
        .header("Authorization", format!("Bearer {}", admin_token))
        .json(&serde_json::json!({
            "title": "Privacy check",
            "subjectId": "math",
            "subcategoryId": "algebra",
            "duration": 10,
            "questions": [question_id]
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let exam: serde_json::Value = resp.json().await.unwrap();
    let exam_id = exam["data"]["id"].as_i64().unwrap();

    let owner_email = unique_email("privacy_owner");
    seed_user(&pool, &owner_email, "password123", "student").await;
    let owner_login = login(&client, &address, &owner_email, "password123").await;
    let owner_token = owner_login["accessToken"].as_str().unwrap().to_string();

    let other_email = unique_email("privacy_other");
    seed_user(&pool, &other_email, "password123", "student").await;
    let other_login = login(&client, &address, &other_email, "password123").await;
    let other_token = other_login["accessToken"].as_str().unwrap().to_string();

    let resp = client
        .post(format!("{}/api/education/exams/{}/start", address, exam_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);
    let session: serde_json::Value = resp.json().await.unwrap();
    let session_id = session["data"]["id"].as_i64().unwrap();

    // The owner can record proctoring events into the live session
    let resp = client
        .post(format!("{}/api/education/sessions/{}/events", address, session_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .json(&serde_json::json!({ "eventType": "screenshot", "activeWindow": "exam" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    // Another student cannot feed events into someone else's session
    let resp = client
        .post(format!("{}/api/education/sessions/{}/events", address, session_id))
        .header("Authorization", format!("Bearer {}", other_token))
        .json(&serde_json::json!({ "eventType": "window_change", "activeWindow": "browser" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);

    // Nor read its score; staff can
    let resp = client
        .get(format!("{}/api/education/sessions/{}/score", address, session_id))
        .header("Authorization", format!("Bearer {}", other_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = client
        .get(format!("{}/api/education/sessions/{}/score", address, session_id))
        .header("Authorization", format!("Bearer {}", admin_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = client
        .get(format!("{}/api/education/sessions/{}/score", address, session_id))
        .header("Authorization", format!("Bearer {}", owner_token))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);
}
