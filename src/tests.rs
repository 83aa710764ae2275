//! Integration tests for the Mobilize backend.

use std::sync::Arc;

use once_cell::sync::Lazy;
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::config::Config;
use crate::db::{init_database, Repository};
use crate::external::MemoryStore;
use crate::sync::SyncEngine;
use crate::{create_router, AppState};

static TRACING: Lazy<()> = Lazy::new(|| {
    tracing_subscriber::fmt()
        .with_env_filter("warn")
        .try_init()
        .ok();
});

/// Test fixture for integration tests.
struct TestFixture {
    client: Client,
    base_url: String,
    store: Arc<MemoryStore>,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_psk(Some("test-api-key".to_string())).await
    }

    async fn with_psk(psk: Option<String>) -> Self {
        Lazy::force(&TRACING);

        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        // Initialize database
        let pool = init_database(&db_path).await.expect("Failed to init DB");
        let repo = Repository::new(pool);

        // In-memory external store, kept for direct inspection
        let store = Arc::new(MemoryStore::new());
        let engine = SyncEngine::new(repo.clone(), store.clone());

        // Create config
        let config = Config {
            api_psk: psk.clone(),
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            supabase_url: None,
            supabase_key: None,
        };

        let state = AppState {
            repo: Arc::new(repo),
            sync: Arc::new(engine),
            config: Arc::new(config),
        };

        let app = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        let mut client_builder = Client::builder();
        if let Some(key) = psk {
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert("x-api-key", key.parse().unwrap());
            client_builder = client_builder.default_headers(headers);
        }

        TestFixture {
            client: client_builder.build().unwrap(),
            base_url,
            store,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json(&self, path: &str, body: Value) -> Value {
        let resp = self
            .client
            .post(self.url(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        assert!(
            resp.status().is_success(),
            "POST {} failed: {}",
            path,
            resp.status()
        );
        resp.json().await.unwrap()
    }

    async fn get_json(&self, path: &str) -> Value {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        assert!(
            resp.status().is_success(),
            "GET {} failed: {}",
            path,
            resp.status()
        );
        resp.json().await.unwrap()
    }

    async fn create_user(&self, username: &str, role: &str, office_id: Option<i64>) -> i64 {
        let body = self
            .post_json(
                "/api/users",
                json!({ "username": username, "role": role, "office_id": office_id }),
            )
            .await;
        body["data"]["id"].as_i64().unwrap()
    }

    async fn create_office(&self, name: &str) -> i64 {
        let body = self.post_json("/api/offices", json!({ "name": name })).await;
        body["data"]["id"].as_i64().unwrap()
    }

    async fn add_member(&self, office_id: i64, user_id: i64) {
        self.post_json(
            &format!("/api/offices/{office_id}/members"),
            json!({ "user_id": user_id }),
        )
        .await;
    }

    async fn create_person(&self, first_name: &str, user_id: Option<i64>, office_id: Option<i64>) -> i64 {
        let body = self
            .post_json(
                "/api/people",
                json!({ "first_name": first_name, "user_id": user_id, "office_id": office_id }),
            )
            .await;
        body["data"]["id"].as_i64().unwrap()
    }

    async fn create_church(&self, name: &str, office_id: Option<i64>) -> i64 {
        let body = self
            .post_json(
                "/api/churches",
                json!({ "name": name, "office_id": office_id }),
            )
            .await;
        body["data"]["id"].as_i64().unwrap()
    }

    async fn list_count(&self, collection: &str, user_id: i64, view_mode: &str) -> usize {
        let body = self
            .get_json(&format!(
                "/api/{collection}?user_id={user_id}&view_mode={view_mode}"
            ))
            .await;
        body["data"].as_array().unwrap().len()
    }
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_auth_rejects_missing_and_wrong_psk() {
    let fixture = TestFixture::new().await;

    // Client without default headers
    let bare = Client::new();
    let resp = bare
        .get(fixture.url("/api/people?user_id=1"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    let resp = bare
        .get(fixture.url("/api/people?user_id=1"))
        .header("x-api-key", "wrong-key")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);

    // Bearer token form is accepted too
    let user_resp = bare
        .post(fixture.url("/api/users"))
        .header("Authorization", "Bearer test-api-key")
        .json(&json!({ "username": "bearer-user" }))
        .send()
        .await
        .unwrap();
    assert_eq!(user_resp.status(), 200);
}

#[tokio::test]
async fn test_auth_disabled_without_psk() {
    let fixture = TestFixture::with_psk(None).await;

    let resp = fixture
        .client
        .post(fixture.url("/api/users"))
        .json(&json!({ "username": "open-door" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_create_person_validation_and_fetch() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/people"))
        .json(&json!({ "first_name": "   " }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("VALIDATION_ERROR"));

    let id = fixture.create_person("Timothy", None, None).await;
    let body = fixture.get_json(&format!("/api/people/{id}")).await;
    assert_eq!(body["data"]["first_name"], json!("Timothy"));
    assert_eq!(body["data"]["status"], json!("active"));
}

#[tokio::test]
async fn test_people_visibility_by_role_and_view_mode() {
    let fixture = TestFixture::new().await;

    let office_a = fixture.create_office("Office A").await;
    let office_b = fixture.create_office("Office B").await;

    let admin = fixture.create_user("admin", "super_admin", None).await;
    let office_admin = fixture
        .create_user("office-admin", "office_admin", None)
        .await;
    let standard = fixture.create_user("standard", "standard_user", None).await;
    fixture.add_member(office_a, office_admin).await;
    fixture.add_member(office_a, standard).await;

    // Two people in office A (one owned by the office admin), one in office B.
    fixture.create_person("InA", Some(standard), Some(office_a)).await;
    fixture
        .create_person("AlsoInA", Some(office_admin), Some(office_a))
        .await;
    fixture.create_person("InB", Some(admin), Some(office_b)).await;
    // Owned by the office admin but outside their office.
    fixture
        .create_person("OwnedElsewhere", Some(office_admin), Some(office_b))
        .await;

    // Super admin: everything by default, narrowed by office view mode.
    assert_eq!(fixture.list_count("people", admin, "default").await, 4);
    assert_eq!(
        fixture
            .list_count("people", admin, &format!("office_{office_a}"))
            .await,
        2
    );
    assert_eq!(fixture.list_count("people", admin, "my_only").await, 1);

    // Office admin: office members plus owned records, deduplicated.
    assert_eq!(fixture.list_count("people", office_admin, "default").await, 3);
    assert_eq!(fixture.list_count("people", office_admin, "my_only").await, 2);

    // Standard user: owned records only, whatever the view mode says.
    for mode in ["default", "my_only", &format!("office_{office_b}")] {
        assert_eq!(fixture.list_count("people", standard, mode).await, 1);
    }
}

#[tokio::test]
async fn test_churches_fail_closed_without_office() {
    let fixture = TestFixture::new().await;

    let office = fixture.create_office("Office A").await;
    let homeless = fixture.create_user("no-office", "standard_user", None).await;
    let member = fixture.create_user("member", "standard_user", None).await;
    fixture.add_member(office, member).await;

    fixture.create_church("First Church", Some(office)).await;

    // No membership resolves: the collection is empty, not unfiltered.
    assert_eq!(fixture.list_count("churches", homeless, "default").await, 0);
    assert_eq!(fixture.list_count("churches", member, "default").await, 1);
}

#[tokio::test]
async fn test_user_scope_summary() {
    let fixture = TestFixture::new().await;

    let admin = fixture.create_user("admin", "super_admin", None).await;
    let limited = fixture.create_user("limited", "limited_user", None).await;

    let body = fixture.get_json(&format!("/api/users/{admin}/scope")).await;
    assert_eq!(body["data"]["can_view_all_data"], json!(true));
    assert_eq!(body["data"]["view_mode_display"], json!("All offices"));

    let body = fixture
        .get_json(&format!("/api/users/{admin}/scope?view_mode=office_3"))
        .await;
    assert_eq!(body["data"]["view_mode_display"], json!("Office #3"));

    let body = fixture
        .get_json(&format!("/api/users/{limited}/scope?view_mode=office_3"))
        .await;
    assert_eq!(body["data"]["can_view_all_data"], json!(false));
    assert_eq!(body["data"]["view_mode_display"], json!("My records"));
}

#[tokio::test]
async fn test_push_then_pull_round_trips_reference_types() {
    let fixture = TestFixture::new().await;

    let person_id = fixture.create_person("John", Some(7), None).await;

    // Push: the external payload carries the reference as a decimal string.
    let body = fixture.post_json("/api/sync/people/push", json!({})).await;
    assert_eq!(body["data"]["total"], json!(1));
    assert_eq!(body["data"]["created"], json!(1));
    assert_eq!(body["data"]["failed"], json!(0));

    let record = fixture.store.get("people", person_id).unwrap();
    assert_eq!(record.get("user_id"), Some(&json!("7")));

    // Pull the same record back: the reference is an integer again.
    let body = fixture.post_json("/api/sync/people/pull", json!({})).await;
    assert_eq!(body["data"]["updated"], json!(1));

    let body = fixture.get_json(&format!("/api/people/{person_id}")).await;
    assert_eq!(body["data"]["user_id"], json!(7));
    assert!(body["data"]["last_synced_at"].is_string());
}

#[tokio::test]
async fn test_pull_creates_local_records_from_seeded_store() {
    let fixture = TestFixture::new().await;

    fixture.store.put(
        "people",
        901,
        [
            ("first_name".to_string(), json!("Phoebe")),
            ("user_id".to_string(), json!("3")),
            ("people_pipeline".to_string(), json!("committed")),
        ]
        .into_iter()
        .collect(),
    );

    let body = fixture.post_json("/api/sync/people/pull", json!({})).await;
    assert_eq!(body["data"]["created"], json!(1));

    let body = fixture.get_json("/api/people/901").await;
    assert_eq!(body["data"]["first_name"], json!("Phoebe"));
    assert_eq!(body["data"]["user_id"], json!(3));
    assert_eq!(body["data"]["pipeline_stage"], json!("committed"));
}

#[tokio::test]
async fn test_conflict_detection_and_resolution_flow() {
    let fixture = TestFixture::new().await;

    let person_id = fixture.create_person("John", Some(7), None).await;
    fixture.post_json("/api/sync/people/push", json!({})).await;

    // The external side diverges.
    let mut record = fixture.store.get("people", person_id).unwrap();
    record.insert("first_name".to_string(), json!("Jane"));
    fixture.store.put("people", person_id, record);

    let body = fixture
        .get_json(&format!("/api/people/{person_id}/conflicts"))
        .await;
    assert_eq!(body["data"]["first_name"]["local_value"], json!("John"));
    assert_eq!(body["data"]["first_name"]["external_value"], json!("Jane"));

    // Local strategy: the local value stands and the conflict is cleared.
    let body = fixture
        .post_json(
            &format!("/api/people/{person_id}/conflicts/resolve"),
            json!({ "strategy": "local" }),
        )
        .await;
    assert_eq!(body["data"]["first_name"], json!("John"));

    // Resolving again without a recorded conflict is a validation error.
    let resp = fixture
        .client
        .post(fixture.url(&format!("/api/people/{person_id}/conflicts/resolve")))
        .json(&json!({ "strategy": "local" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Re-detect and take the external side this time.
    fixture
        .get_json(&format!("/api/people/{person_id}/conflicts"))
        .await;
    let body = fixture
        .post_json(
            &format!("/api/people/{person_id}/conflicts/resolve"),
            json!({ "strategy": "external" }),
        )
        .await;
    assert_eq!(body["data"]["first_name"], json!("Jane"));

    let body = fixture.get_json(&format!("/api/people/{person_id}")).await;
    assert_eq!(body["data"]["first_name"], json!("Jane"));
}

#[tokio::test]
async fn test_sync_unknown_entity_rejected() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client
        .post(fixture.url("/api/sync/widgets/push"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"]["code"], json!("BAD_REQUEST"));
}

#[tokio::test]
async fn test_tasks_and_communications_scoping() {
    let fixture = TestFixture::new().await;

    let admin = fixture.create_user("admin", "super_admin", None).await;
    let worker = fixture.create_user("worker", "standard_user", None).await;

    fixture
        .post_json(
            "/api/tasks",
            json!({ "title": "Call Lydia", "assigned_to_id": worker }),
        )
        .await;
    fixture
        .post_json(
            "/api/tasks",
            json!({ "title": "Plan visit", "created_by_id": admin }),
        )
        .await;
    fixture
        .post_json(
            "/api/communications",
            json!({ "comm_type": "email", "subject": "Hello", "user_id": worker }),
        )
        .await;

    // Super admin sees everything; the worker only their own work items.
    assert_eq!(fixture.list_count("tasks", admin, "default").await, 2);
    assert_eq!(fixture.list_count("tasks", worker, "default").await, 1);
    assert_eq!(
        fixture.list_count("communications", admin, "default").await,
        1
    );
    assert_eq!(
        fixture.list_count("communications", worker, "default").await,
        1
    );
    assert_eq!(
        fixture.list_count("communications", worker, "my_only").await,
        1
    );
}
