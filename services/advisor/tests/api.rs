//! End-to-end tests against the HTTP surface.
//!
//! Each test writes a fleet file, runs a real pass, serves the router on an
//! ephemeral port, and talks to it with reqwest.

use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rebal_advisor::{
    advisor::Advisor,
    api::create_router,
    approval::{ApprovalGate, QueuedApprover},
    distance::{DistanceError, DistanceSource},
    loader::FileFleetLoader,
    notify::{Notifier, NotifyError},
    state::AppState,
};
use rebal_fleet::{DriverNotice, GeoPoint};
use serde_json::{json, Value};

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<DriverNotice>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    fn channel(&self) -> &'static str {
        "recording"
    }

    async fn notify(&self, notice: &DriverNotice) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

struct NoDistanceService;

#[async_trait]
impl DistanceSource for NoDistanceService {
    async fn distances_km(
        &self,
        _origin: GeoPoint,
        _destinations: &[GeoPoint],
    ) -> Result<Vec<f64>, DistanceError> {
        Err(DistanceError::MissingCredential)
    }
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    notifier: Arc<RecordingNotifier>,
    _fleet: tempfile::NamedTempFile,
}

const FLEET: &str = r#"[
    {"id": 1, "driver": "Driver 1", "phone": "+15550001", "seatingCapacity": 50,
     "currentAttendance": 50, "latitude": 13.00, "longitude": 80.00},
    {"id": 2, "driver": "Driver 2", "phone": "+15550002", "seatingCapacity": 40,
     "currentAttendance": 25, "latitude": 13.01, "longitude": 80.01},
    {"id": 3, "driver": "Driver 3", "seatingCapacity": 30,
     "currentAttendance": 20, "latitude": 13.10, "longitude": 80.10}
]"#;

async fn start() -> TestServer {
    let mut fleet = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
    fleet.write_all(FLEET.as_bytes()).unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let advisor = Arc::new(Advisor::new(
        Arc::new(FileFleetLoader::new(fleet.path())),
        Arc::new(NoDistanceService),
        Arc::new(ApprovalGate::new(Duration::from_secs(60))),
        notifier.clone(),
        Duration::from_secs(1),
    ));
    advisor.run_pass().await.unwrap();

    let state = AppState::new(
        advisor,
        Arc::new(QueuedApprover::new(Duration::from_millis(20))),
        Some("maps-key".to_string()),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, create_router(state)).await.unwrap();
    });

    TestServer {
        base: format!("http://{addr}"),
        client: reqwest::Client::new(),
        notifier,
        _fleet: fleet,
    }
}

impl TestServer {
    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self
            .client
            .get(format!("{}{path}", self.base))
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{path}", self.base))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    fn notices(&self) -> Vec<DriverNotice> {
        self.notifier.sent.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_fleet_views() {
    let server = start().await;

    let (status, body) = server.get("/healthz").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");

    let (status, body) = server.get("/readyz").await;
    assert_eq!(status, 200);
    assert_eq!(body["buses"], 3);
    assert_eq!(body["pending_actions"], 1);

    let (status, body) = server.get("/api/bus-locations").await;
    assert_eq!(status, 200);
    assert_eq!(body[0], json!({"id": 1, "latitude": 13.0, "longitude": 80.0}));

    let (_, body) = server.get("/api/bus-details").await;
    assert_eq!(body.as_array().unwrap().len(), 3);
    assert_eq!(body[1]["seatingCapacity"], 40);

    let (_, body) = server.get("/api/google-maps-key").await;
    assert_eq!(body, json!({"apiKey": "maps-key"}));
}

#[tokio::test]
async fn test_pending_actions_listed() {
    let server = start().await;

    let (status, body) = server.get("/api/pending-actions").await;
    assert_eq!(status, 200);
    let pending = body.as_array().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0]["current_bus_id"], 1);
    assert_eq!(pending[0]["nearby_bus_id"], 2);
    assert_eq!(pending[0]["action"], "Reallocation");
    assert_eq!(pending[0]["distance_basis"], "estimated");
    assert_eq!(pending[0]["current_bus_details"]["driver"], "Driver 1");

    let id = pending[0]["action_id"].as_str().unwrap();
    let (status, body) = server.get(&format!("/api/actions/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn test_unknown_bus_is_not_found_and_notifies_nobody() {
    let server = start().await;

    let (status, body) = server
        .post(
            "/api/admin-action",
            json!({"current_bus_id": 99, "nearby_bus_id": 2, "action": "Reallocation", "approved": true}),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Current bus with ID 99 not found.");

    let (status, body) = server
        .post(
            "/api/admin-action",
            json!({"current_bus_id": "1", "nearby_bus_id": "42", "action": "Reallocation", "approved": true}),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["message"], "Nearby bus with ID 42 not found.");

    assert!(server.notices().is_empty());
    let (_, pending) = server.get("/api/pending-actions").await;
    assert_eq!(pending.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_approval_notifies_both_drivers() {
    let server = start().await;

    let (status, body) = server
        .post(
            "/api/admin-action",
            json!({"current_bus_id": 1, "nearby_bus_id": 2, "action": "Reallocation", "approved": true}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Action approved and notifications sent.");
    assert_eq!(body["status"], "approved");

    let notices = server.notices();
    assert_eq!(notices.len(), 2);
    assert_eq!(notices[0].driver, "Driver 1");
    assert_eq!(
        notices[0].message,
        "Your bus is full. Students will be allocated to Bus 2."
    );
    assert_eq!(notices[1].driver, "Driver 2");
    assert_eq!(notices[1].message, "Please pick up additional students from Bus 1.");

    // A second decision on the same pair conflicts.
    let (status, _) = server
        .post(
            "/api/admin-action",
            json!({"current_bus_id": 1, "nearby_bus_id": 2, "action": "Reallocation", "approved": false}),
        )
        .await;
    assert_eq!(status, 409);
    assert_eq!(server.notices().len(), 2);
}

#[tokio::test]
async fn test_denial_by_action_id() {
    let server = start().await;
    let (_, pending) = server.get("/api/pending-actions").await;
    let id = pending[0]["action_id"].as_str().unwrap().to_string();

    let (status, body) = server
        .post(&format!("/api/actions/{id}/decision"), json!({"approved": false}))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Action denied by admin.");
    assert_eq!(body["status"], "denied");
    assert!(server.notices().is_empty());

    let (_, pending) = server.get("/api/pending-actions").await;
    assert!(pending.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_malformed_requests() {
    let server = start().await;

    let (status, body) = server
        .post("/api/admin-action", json!({"current_bus_id": 1}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["success"], false);

    let (status, body) = server.get("/api/actions/not-an-id").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], "invalid_action_id");

    let (status, _) = server
        .post(
            "/api/admin-action",
            json!({"current_bus_id": 1, "nearby_bus_id": 3, "action": "Combination", "approved": true}),
        )
        .await;
    assert_eq!(status, 404);
}

#[tokio::test]
async fn test_pass_endpoint_reuses_pending_actions() {
    let server = start().await;

    let (status, body) = server.post("/api/passes", json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(body["fleet_size"], 3);
    assert_eq!(body["full"], 1);
    assert!(body["proposals"].as_array().unwrap().is_empty());
    assert_eq!(body["already_pending"].as_array().unwrap().len(), 1);
}
