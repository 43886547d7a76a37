//! HTTP-level tests for the MISP client and the retrying destination
//!
//! Every test runs against a local mock server; no real MISP instance is used.

use intelbridge_common::IntelError;
use intelbridge_ingest::misp::{Destination, EventFilter, MispClient, RetryingDestination};
use intelbridge_ingest::model::{ContainerEvent, Sighting, ThreatLevel};
use intelbridge_ingest::transport::{RetryPolicy, RetryingTransport};
use serde_json::json;
use std::sync::Arc;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

const AUTH_KEY: &str = "test-auth-key";

fn client(server: &MockServer) -> MispClient {
    MispClient::new(format!("{}/", server.uri()), AUTH_KEY, true).expect("client builds")
}

fn retrying(server: &MockServer) -> RetryingDestination {
    RetryingDestination::new(
        Arc::new(client(server)),
        RetryingTransport::new(RetryPolicy::without_backoff(3)),
    )
}

#[tokio::test]
async fn test_attribute_search_sends_type_and_auth() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/attributes/restSearch"))
        .and(header("Authorization", AUTH_KEY))
        .and(body_partial_json(json!({"type": "domain", "includeEventUuid": true})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": {
                "Attribute": [
                    {"uuid": "a1", "type": "domain", "value": "evil.example",
                     "event_uuid": "e1", "timestamp": "1690000000"}
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let found = client(&server).search_attributes("domain").await.unwrap();

    assert_eq!(found.len(), 1);
    assert_eq!(found[0].value, "evil.example");
    assert_eq!(found[0].event_uuid.as_deref(), Some("e1"));
    assert_eq!(found[0].timestamp, Some(1_690_000_000));
}

#[tokio::test]
async fn test_event_search_unwraps_events() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events/restSearch"))
        .and(body_partial_json(json!({"eventinfo": "Indicator Type:%", "org": "org-uuid"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": [
                {"Event": {"id": "7", "uuid": "e7", "info": "Indicator Type: Domain",
                           "threat_level_id": "4", "Tag": [{"name": "CrowdStrike:indicator:feed:type: DOMAIN"}]}}
            ]
        })))
        .mount(&server)
        .await;

    let filter = EventFilter::info("Indicator Type:%").with_org("org-uuid");
    let events = client(&server).search_events(&filter).await.unwrap();

    assert_eq!(events.len(), 1);
    assert!(events[0].is_persisted());
    assert!(events[0].has_tag("CrowdStrike:indicator:feed:type: DOMAIN"));
}

#[tokio::test]
async fn test_add_then_update_event() {
    let server = MockServer::start().await;
    let mut event = ContainerEvent::new("Malware Family: LockBit");
    event.threat_level_id = ThreatLevel::High;

    Mock::given(method("POST"))
        .and(path("/events/add"))
        .and(body_partial_json(json!({"Event": {"info": "Malware Family: LockBit", "threat_level_id": "1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Event": {"id": "42", "uuid": event.uuid, "info": event.info, "threat_level_id": "1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path(format!("/events/edit/{}", event.uuid)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Event": {"id": "42", "uuid": event.uuid, "info": event.info, "threat_level_id": "1"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let destination = retrying(&server);
    let saved = destination
        .save_event(&event, RetryPolicy::without_backoff(3))
        .await
        .unwrap();
    assert_eq!(saved.id.as_deref(), Some("42"));

    let updated = destination
        .save_event(&saved, RetryPolicy::without_backoff(3))
        .await
        .unwrap();
    assert_eq!(updated.uuid, event.uuid);
}

#[tokio::test]
async fn test_missing_event_is_none() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/events/view/gone"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Invalid event"})))
        .expect(1)
        .mount(&server)
        .await;

    let found = retrying(&server).get_event("gone").await.unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_error_payload_with_success_status_is_an_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events/add"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"name": "Could not add Event", "errors": {"Event": ["info is required"]}})),
        )
        .mount(&server)
        .await;

    let err = client(&server)
        .add_event(&ContainerEvent::new("Indicator Type: Url"))
        .await
        .unwrap_err();

    assert!(matches!(err, IntelError::Api { code: 500, .. }));
    assert!(err.to_string().contains("info is required"));
}

#[tokio::test]
async fn test_transient_failure_is_retried() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/organisations/view/org-uuid"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/organisations/view/org-uuid"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Organisation": {"id": "3", "uuid": "org-uuid", "name": "CrowdStrike"}
        })))
        .mount(&server)
        .await;

    let org = retrying(&server).get_organisation("org-uuid").await.unwrap().unwrap();
    assert_eq!(org.name, "CrowdStrike");
}

#[tokio::test]
async fn test_retries_exhausted() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/events/restSearch"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({"message": "Internal error"})))
        .expect(3)
        .mount(&server)
        .await;

    let err = retrying(&server)
        .search_events(&EventFilter::info("Malware Family:%"))
        .await
        .unwrap_err();

    assert!(matches!(err, IntelError::RetriesExhausted { attempts: 3, .. }));
}

#[tokio::test]
async fn test_sighting_and_tag_writes_report_success() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/sightings/add"))
        .and(body_partial_json(json!({"uuid": "a1", "source": "CrowdStrike", "timestamp": 1200})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Sighting": {"id": "9"}})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tags/attachTagToObject"))
        .and(body_partial_json(json!({"uuid": "e1", "tag": "CrowdStrike:indicator:feed:type: URL"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"saved": true})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/tags/removeTagFromObject"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"message": "Forbidden"})))
        .mount(&server)
        .await;

    let destination = retrying(&server);
    let sighting = Sighting {
        value: "evil.example".to_string(),
        uuid: "a1".to_string(),
        source: "CrowdStrike".to_string(),
        timestamp: 1200,
    };

    assert!(destination.add_sighting(&sighting).await);
    assert!(destination.add_tag("e1", "CrowdStrike:indicator:feed:type: URL").await);

    let denied = client(&server).remove_tag("e1", "stale").await.unwrap_err();
    assert!(matches!(denied, IntelError::Api { code: 403, .. }));
}
