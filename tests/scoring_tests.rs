// tests/scoring_tests.rs

use std::sync::Arc;

use arena_backend::{
    config::Config,
    db, routes,
    state::AppState,
    utils::clock::{Clock, ManualClock},
};
use chrono::{Duration, Utc};
use serde_json::{Map, Value, json};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;

struct TestApp {
    address: String,
    pool: SqlitePool,
    clock: Arc<ManualClock>,
}

async fn spawn_app() -> TestApp {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("Failed to open in-memory SQLite");

    db::init_schema(&pool)
        .await
        .expect("Failed to apply schema");

    let config = Config {
        database_url: "sqlite::memory:".to_string(),
        jwt_secret: "scoring_test_secret".to_string(),
        jwt_expiration: 600,
        rust_log: "error".to_string(),
        admin_username: None,
        admin_password: None,
        violation_threshold: 3,
        submission_grace_seconds: 30,
        stats_cache_ttl_seconds: 0,
        join_code_length: 6,
    };

    let clock = Arc::new(ManualClock::new(Utc::now()));
    let state = AppState::with_clock(pool.clone(), config, clock.clone());
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let address = format!("http://127.0.0.1:{}", port);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestApp {
        address,
        pool,
        clock,
    }
}

fn unique_name(prefix: &str) -> String {
    format!("{}_{}", prefix, &uuid::Uuid::new_v4().to_string()[..8])
}

async fn register_and_login(
    client: &reqwest::Client,
    address: &str,
    username: &str,
) -> (String, i64) {
    let resp = client
        .post(format!("{}/api/auth/register", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .expect("Register failed");
    assert_eq!(resp.status().as_u16(), 201);

    let login: Value = client
        .post(format!("{}/api/auth/login", address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .expect("Login failed")
        .json()
        .await
        .unwrap();

    (
        login["token"].as_str().unwrap().to_string(),
        login["user_id"].as_i64().unwrap(),
    )
}

async fn admin_token(app: &TestApp, client: &reqwest::Client) -> String {
    let username = unique_name("admin");
    let (_token, user_id) = register_and_login(client, &app.address, &username).await;

    sqlx::query("UPDATE users SET role = 'admin' WHERE id = ?")
        .bind(user_id)
        .execute(&app.pool)
        .await
        .unwrap();

    let login: Value = client
        .post(format!("{}/api/auth/login", app.address))
        .json(&json!({ "username": username, "password": "password123" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    login["token"].as_str().unwrap().to_string()
}

async fn seed_question(pool: &SqlitePool, content: &str, answer: &str) -> i64 {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO questions (content, options, answer, created_at)
        VALUES (?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(content)
    .bind(r#"["Option A","Option B","Option C","Option D"]"#)
    .bind(answer)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap();
    id
}

/// An active contest over the given questions, ending in one hour.
async fn active_contest(app: &TestApp, client: &reqwest::Client, question_ids: &[i64]) -> i64 {
    let token = admin_token(app, client).await;
    let now = app.clock.now();
    let contest: Value = client
        .post(format!("{}/api/admin/contests", app.address))
        .bearer_auth(&token)
        .json(&json!({
            "title": "Scoring contest",
            "start_time": now.to_rfc3339(),
            "end_time": (now + Duration::seconds(3600)).to_rfc3339(),
            "question_ids": question_ids,
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    contest["id"].as_i64().unwrap()
}

async fn join(client: &reqwest::Client, app: &TestApp, contest_id: i64, token: &str) -> i64 {
    let body: Value = client
        .post(format!("{}/api/contests/{}/join", app.address, contest_id))
        .bearer_auth(token)
        .json(&json!({}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["participation"]["id"].as_i64().unwrap()
}

fn answers_payload(entries: &[(i64, Option<&str>)]) -> Value {
    let mut map = Map::new();
    for (id, selected) in entries {
        map.insert(
            id.to_string(),
            match selected {
                Some(s) => json!(s),
                None => Value::Null,
            },
        );
    }
    json!({ "answers": map })
}

async fn submit(
    client: &reqwest::Client,
    app: &TestApp,
    participation_id: i64,
    token: &str,
    entries: &[(i64, Option<&str>)],
) -> reqwest::Response {
    client
        .post(format!(
            "{}/api/participations/{}/submit",
            app.address, participation_id
        ))
        .bearer_auth(token)
        .json(&answers_payload(entries))
        .send()
        .await
        .unwrap()
}

#[tokio::test]
async fn scoring_matches_reference_scenario() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token_a, _) = register_and_login(&client, &app.address, &unique_name("alice")).await;
    let (token_b, _) = register_and_login(&client, &app.address, &unique_name("bob")).await;
    let pid_a = join(&client, &app, contest_id, &token_a).await;
    let pid_b = join(&client, &app, contest_id, &token_b).await;

    let result_a: Value = submit(&client, &app, pid_a, &token_a, &[(q1, Some("b")), (q2, Some("c"))])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result_a["correct"], 1);
    assert_eq!(result_a["attempted"], 2);
    assert_eq!(result_a["total"], 2);
    assert_eq!(result_a["auto_submitted"], false);

    let result_b: Value = submit(&client, &app, pid_b, &token_b, &[(q1, Some("b")), (q2, Some("a"))])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(result_b["correct"], 2);

    app.clock.advance(Duration::seconds(3601));

    let stats: Value = client
        .get(format!(
            "{}/api/contests/{}/stats?score=2",
            app.address, contest_id
        ))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["total_participants"], 2);
    assert_eq!(stats["scores"], json!([1, 2]));
    assert_eq!(stats["average"], 1.5);
    assert_eq!(stats["completion_rate"], 1.0);
    assert_eq!(stats["percentile_of"], 50.0);

    let stats: Value = client
        .get(format!(
            "{}/api/contests/{}/stats?score=1",
            app.address, contest_id
        ))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["percentile_of"], 0.0);

    // Per-question counts always sum to the participant total.
    let per_question = stats["per_question"].as_array().unwrap();
    assert_eq!(per_question.len(), 2);
    for tally in per_question {
        let sum = tally["correct_count"].as_i64().unwrap()
            + tally["incorrect_count"].as_i64().unwrap()
            + tally["unanswered_count"].as_i64().unwrap();
        assert_eq!(sum, 2);
    }
    assert_eq!(per_question[0]["question_id"].as_i64().unwrap(), q1);
    assert_eq!(per_question[0]["correct_count"], 2);
    assert_eq!(per_question[1]["correct_count"], 1);
    assert_eq!(per_question[1]["incorrect_count"], 1);
}

#[tokio::test]
async fn submit_is_idempotent() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    let first: Value = submit(&client, &app, pid, &token, &[(q1, Some("b"))])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(first["correct"], 1);
    assert_eq!(first["already_submitted"], false);

    // A second call with a better answer sheet changes nothing.
    let second = submit(&client, &app, pid, &token, &[(q1, Some("b")), (q2, Some("a"))]).await;
    assert_eq!(second.status().as_u16(), 200);
    let second: Value = second.json().await.unwrap();
    assert_eq!(second["correct"], 1);
    assert_eq!(second["attempted"], 1);
    assert_eq!(second["already_submitted"], true);

    let (records,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM answer_records WHERE participation_id = ?")
            .bind(pid)
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(records, 2, "re-submission must not write more records");
}

#[tokio::test]
async fn submission_window_is_enforced() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let admin = admin_token(&app, &client).await;
    let q = seed_question(&app.pool, "Q1", "a").await;

    let now = app.clock.now();
    let contest: Value = client
        .post(format!("{}/api/admin/contests", app.address))
        .bearer_auth(&admin)
        .json(&json!({
            "title": "Windowed",
            "start_time": (now + Duration::seconds(600)).to_rfc3339(),
            "end_time": (now + Duration::seconds(4200)).to_rfc3339(),
            "question_ids": [q],
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let contest_id = contest["id"].as_i64().unwrap();

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    // Joined before start: submitting is rejected until the window opens.
    let resp = submit(&client, &app, pid, &token, &[(q, Some("a"))]).await;
    assert_eq!(resp.status().as_u16(), 400);

    // Within the grace period after end, a straggler may still submit.
    app.clock.set(now + Duration::seconds(4200) + Duration::seconds(10));
    let resp = submit(&client, &app, pid, &token, &[(q, Some("a"))]).await;
    assert_eq!(resp.status().as_u16(), 200);
}

#[tokio::test]
async fn submission_past_grace_is_gone() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q = seed_question(&app.pool, "Q1", "a").await;
    let contest_id = active_contest(&app, &client, &[q]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    app.clock.advance(Duration::seconds(3600 + 31));
    let resp = submit(&client, &app, pid, &token, &[(q, Some("a"))]).await;
    assert_eq!(resp.status().as_u16(), 410);
}

#[tokio::test]
async fn submission_rejects_foreign_questions_and_bad_labels() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q = seed_question(&app.pool, "Q1", "a").await;
    let foreign = seed_question(&app.pool, "Other", "b").await;
    let contest_id = active_contest(&app, &client, &[q]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    let resp = submit(&client, &app, pid, &token, &[(foreign, Some("b"))]).await;
    assert_eq!(resp.status().as_u16(), 400);

    let resp = submit(&client, &app, pid, &token, &[(q, Some("x"))]).await;
    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn violations_force_submission_from_draft() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    // Buffer a partial answer sheet.
    let resp = client
        .put(format!("{}/api/participations/{}/answers", app.address, pid))
        .bearer_auth(&token)
        .json(&answers_payload(&[(q1, Some("b"))]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let violation_url = format!("{}/api/participations/{}/violations", app.address, pid);
    for expected_count in 1..=2 {
        let body: Value = client
            .post(&violation_url)
            .bearer_auth(&token)
            .json(&json!({ "kind": "tab-blur" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["count"], expected_count);
        assert_eq!(body["auto_submitted"], false);
    }

    let third: Value = client
        .post(&violation_url)
        .bearer_auth(&token)
        .json(&json!({ "kind": "devtools" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(third["count"], 3);
    assert_eq!(third["auto_submitted"], true);
    assert_eq!(third["result"]["correct"], 1);
    assert_eq!(third["result"]["attempted"], 1);

    // A later manual submit returns the forced result unchanged.
    let manual: Value = submit(&client, &app, pid, &token, &[(q1, Some("b")), (q2, Some("a"))])
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(manual["already_submitted"], true);
    assert_eq!(manual["correct"], 1);
    assert_eq!(manual["auto_submitted"], true);
    assert_eq!(manual["submitted_by"], "violation");

    // Further violations are no-ops.
    let after: Value = client
        .post(&violation_url)
        .bearer_auth(&token)
        .json(&json!({ "kind": "tab-blur" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(after["count"], 3);
    assert_eq!(after["already_submitted"], true);
}

#[tokio::test]
async fn sweep_scores_unsubmitted_participations() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    // The participant never submits; the contest closes.
    app.clock.advance(Duration::seconds(3601));

    // First stats read runs the sweep.
    let stats: Value = client
        .get(format!("{}/api/contests/{}/stats", app.address, contest_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["total_participants"], 1);
    assert_eq!(stats["completion_rate"], 1.0);
    assert_eq!(stats["scores"], json!([0]));

    let result: Value = client
        .get(format!("{}/api/participations/{}/result", app.address, pid))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(result["result"]["correct"], 0);
    assert_eq!(result["result"]["attempted"], 0);
    assert_eq!(result["result"]["total"], 2);
    assert_eq!(result["result"]["auto_submitted"], true);
    assert_eq!(result["result"]["submitted_by"], "timeout");
}

#[tokio::test]
async fn result_breakdown_is_gated_until_close() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token, _) = register_and_login(&client, &app.address, &unique_name("u")).await;
    let (other_token, _) = register_and_login(&client, &app.address, &unique_name("v")).await;
    let pid = join(&client, &app, contest_id, &token).await;

    submit(&client, &app, pid, &token, &[(q1, Some("b")), (q2, Some("c"))]).await;

    let result_url = format!("{}/api/participations/{}/result", app.address, pid);

    // Own raw score is visible immediately, breakdown is not.
    let own: Value = client
        .get(&result_url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(own["result"]["score"], 1);
    assert!(own["breakdown"].is_null());
    assert!(own["percentile"].is_null());

    // Someone else's result is off limits.
    let resp = client
        .get(&result_url)
        .bearer_auth(&other_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    // Participants cannot read aggregates mid-contest.
    let resp = client
        .get(format!("{}/api/contests/{}/stats", app.address, contest_id))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    app.clock.advance(Duration::seconds(3601));

    let own: Value = client
        .get(&result_url)
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let breakdown = own["breakdown"].as_array().unwrap();
    assert_eq!(breakdown.len(), 2);
    assert_eq!(breakdown[0]["answer"], "b");
    assert_eq!(breakdown[0]["is_correct"], true);
    assert_eq!(breakdown[1]["is_correct"], false);
    assert!(own["percentile"].is_number());
}

#[tokio::test]
async fn per_question_tallies_count_partial_and_swept_sheets() {
    let app = spawn_app().await;
    let client = reqwest::Client::new();
    let q1 = seed_question(&app.pool, "Q1", "b").await;
    let q2 = seed_question(&app.pool, "Q2", "a").await;
    let contest_id = active_contest(&app, &client, &[q1, q2]).await;

    let (token_a, _) = register_and_login(&client, &app.address, &unique_name("a")).await;
    let (token_b, _) = register_and_login(&client, &app.address, &unique_name("b")).await;
    let pid_a = join(&client, &app, contest_id, &token_a).await;
    let _pid_b = join(&client, &app, contest_id, &token_b).await;

    // A answers only the first question; B never submits at all.
    submit(&client, &app, pid_a, &token_a, &[(q1, Some("b"))]).await;
    app.clock.advance(Duration::seconds(3601));

    let stats: Value = client
        .get(format!("{}/api/contests/{}/stats", app.address, contest_id))
        .bearer_auth(&token_a)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(stats["total_participants"], 2);
    let per_question = stats["per_question"].as_array().unwrap();
    assert_eq!(per_question[0]["correct_count"], 1);
    assert_eq!(per_question[0]["unanswered_count"], 1);
    assert_eq!(per_question[1]["unanswered_count"], 2);
    for tally in per_question {
        let sum = tally["correct_count"].as_i64().unwrap()
            + tally["incorrect_count"].as_i64().unwrap()
            + tally["unanswered_count"].as_i64().unwrap();
        assert_eq!(sum, 2);
    }
}
