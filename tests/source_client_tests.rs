use async_trait::async_trait;
use donorsync::source::Pause;
use donorsync::{
    DonationQuery, OrganizationCredentials, SourceSystem, SourceSystemClient, SyncConfig, SyncError,
};
use serde_json::{Value as JsonValue, json};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Records requested waits instead of sleeping.
#[derive(Default)]
struct RecordingPause {
    waits: Mutex<Vec<Duration>>,
}

#[async_trait]
impl Pause for RecordingPause {
    async fn pause(&self, duration: Duration) {
        self.waits.lock().unwrap().push(duration);
    }
}

fn organization() -> OrganizationCredentials {
    serde_json::from_value(json!({"label": "main", "key": "org-key", "license": "lic"})).unwrap()
}

fn client(server: &MockServer, config: SyncConfig) -> (SourceSystemClient, Arc<RecordingPause>) {
    let config = config.source_base_url(&format!("{}/", server.uri()));
    let pause = Arc::new(RecordingPause::default());
    let client = SourceSystemClient::new(&organization(), &config)
        .unwrap()
        .with_pause(pause.clone());
    (client, pause)
}

fn donation(id: u64, status: u32) -> JsonValue {
    json!({
        "id": id,
        "amountInCents": 1000,
        "dateCreated": "2024-03-05T10:00:00",
        "paymentTenderType": {"id": 1},
        "status": {"id": status}
    })
}

fn page(items: Vec<JsonValue>, total_pages: u32) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("x-pagination", json!({"totalPages": total_pages}).to_string().as_str())
        .set_body_json(JsonValue::Array(items))
}

fn throttled(seconds: u64) -> ResponseTemplate {
    ResponseTemplate::new(429).set_body_json(json!({
        "message": "Rate limit exceeded quota.",
        "details": format!("Quota will be replenished in {} second(s).", seconds)
    }))
}

#[tokio::test]
async fn test_pages_are_merged_in_order() {
    let server = MockServer::start().await;
    for (number, items) in [
        (1, vec![donation(1, 1), donation(2, 1)]),
        (2, vec![donation(3, 4), donation(4, 1)]),
        (3, vec![donation(5, 1)]),
    ] {
        Mock::given(method("GET"))
            .and(path("/donors/20/donations"))
            .and(query_param("page", number.to_string()))
            .and(query_param("pageSize", "200"))
            .respond_with(page(items, 3))
            .expect(1)
            .mount(&server)
            .await;
    }

    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&server, SyncConfig::new(dir.path()));

    let approved = client
        .fetch_donations(&DonationQuery::for_donor(20))
        .await
        .unwrap();
    let ids: Vec<u64> = approved.iter().map(|d| d.id).collect();
    assert_eq!(ids, vec![1, 2, 4, 5]);

    server.verify().await;
}

#[tokio::test]
async fn test_all_statuses_when_not_filtering() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/donations"))
        .and(query_param("createdAfter", "03/01/2024 00:00:00"))
        .and(query_param("createdBefore", "03/08/2024 00:00:00"))
        .respond_with(page(vec![donation(1, 1), donation(2, 4)], 1))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&server, SyncConfig::new(dir.path()));

    let query = DonationQuery::window("03/01/2024 00:00:00", "03/08/2024 00:00:00").approved_only(false);
    let all = client.fetch_donations(&query).await.unwrap();
    assert_eq!(all.len(), 2);
}

#[tokio::test]
async fn test_rate_limit_waits_and_resends() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/donors"))
        .respond_with(throttled(7))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/donors"))
        .and(query_param("crmKeySecond", "1001"))
        .and(header("x-organizationkey", "org-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 20, "crmSecondKey": "1001"}])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, pause) = client(&server, SyncConfig::new(dir.path()));

    let donor = client.fetch_donor("1001").await.unwrap();
    assert_eq!(donor.id, 20);
    assert_eq!(donor.crm_second_key.as_deref(), Some("1001"));

    let waits = pause.waits.lock().unwrap().clone();
    assert_eq!(waits, vec![Duration::from_secs(12), Duration::from_secs(12)]);

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 3);
    assert!(requests.iter().all(|r| r.url == requests[0].url));
}

#[tokio::test]
async fn test_rate_limit_retries_are_bounded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(throttled(1))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, pause) = client(&server, SyncConfig::new(dir.path()).max_rate_limit_retries(2));

    let err = client.fetch_donor("1001").await.unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus { status: 429, .. }));
    assert_eq!(pause.waits.lock().unwrap().len(), 2);
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_unknown_throttle_is_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, pause) = client(&server, SyncConfig::new(dir.path()));

    let err = client
        .fetch_donations(&DonationQuery::for_donor(1))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::UnexpectedStatus { status: 429, ref body } if body == "slow down"));
    assert!(!err.is_fatal());
    assert!(pause.waits.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_donor_lookup_failures_keep_response() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/donors"))
        .and(query_param("crmKeySecond", "404"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/donors"))
        .and(query_param("crmKeySecond", "dup"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": 1, "crmSecondKey": "dup"},
            {"id": 2, "crmSecondKey": "dup"}
        ])))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&server, SyncConfig::new(dir.path()));

    match client.fetch_donor("404").await {
        Err(SyncError::DonorNotFound { key, body }) => {
            assert_eq!(key, "404");
            assert_eq!(body, "[]");
        }
        other => panic!("expected not found, got {:?}", other),
    }

    match client.fetch_donor("dup").await {
        Err(SyncError::MultipleDonors { donors, .. }) => {
            assert_eq!(donors.len(), 2);
            assert_eq!(donors[1]["id"], json!(2));
        }
        other => panic!("expected multiple donors, got {:?}", other),
    }
}

#[tokio::test]
async fn test_malformed_body_is_a_row_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>maintenance</html>"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let (client, _) = client(&server, SyncConfig::new(dir.path()));

    let err = client.fetch_donor("1001").await.unwrap_err();
    assert!(matches!(err, SyncError::Transport(_)));
    assert!(!err.is_fatal());
}
