//! Integration tests for event delivery resend, batch retry and force resend.

mod common;

use axum::http::{Method, StatusCode};
use common::{json_request, parse_response_body, put_request, TestApp};
use domain::models::task::{DELIVERY_PROCESSOR, EVENT_QUEUE};
use domain::models::{DeliveryStatus, EndpointStatus};
use domain::repositories::{EndpointRepository, EventDeliveryRepository};
use serde_json::json;
use tower::ServiceExt;
use uuid::Uuid;

// ============================================================================
// Single resend
// ============================================================================

#[tokio::test]
async fn test_resend_failed_delivery() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let delivery = app.add_delivery(&endpoint, DeliveryStatus::Failure).await;

    let response = app
        .router()
        .oneshot(put_request(&app.project_path(&format!(
            "/eventdeliveries/{}/resend",
            delivery.id
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body["id"], delivery.id.to_string());
    assert_eq!(body["status"], "scheduled");

    let jobs = app.stores.queue.jobs_on(EVENT_QUEUE);
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].task_name, DELIVERY_PROCESSOR);
    assert_eq!(jobs[0].job.id, delivery.id.to_string());
}

#[tokio::test]
async fn test_resend_successful_delivery_conflicts() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let delivery = app.add_delivery(&endpoint, DeliveryStatus::Success).await;

    let response = app
        .router()
        .oneshot(put_request(&app.project_path(&format!(
            "/eventdeliveries/{}/resend",
            delivery.id
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = parse_response_body(response).await;
    assert_eq!(body["error"], "state_conflict");
    assert_eq!(body["message"], "event already sent");
    assert!(app.stores.queue.is_empty());
}

#[tokio::test]
async fn test_resend_to_paused_endpoint_conflicts() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Paused, None, &[]).await;
    let delivery = app.add_delivery(&endpoint, DeliveryStatus::Failure).await;

    let response = app
        .router()
        .oneshot(put_request(&app.project_path(&format!(
            "/eventdeliveries/{}/resend",
            delivery.id
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let stored = app
        .stores
        .deliveries
        .find_by_id(app.project.id, delivery.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, DeliveryStatus::Failure);
}

#[tokio::test]
async fn test_resend_to_inactive_endpoint_rearms_it() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Inactive, None, &[]).await;
    let delivery = app.add_delivery(&endpoint, DeliveryStatus::Failure).await;

    let response = app
        .router()
        .oneshot(put_request(&app.project_path(&format!(
            "/eventdeliveries/{}/resend",
            delivery.id
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let stored = app
        .stores
        .endpoints
        .find_by_id(app.project.id, endpoint.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, EndpointStatus::Pending);
}

#[tokio::test]
async fn test_resend_unknown_delivery() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(put_request(&app.project_path(&format!(
            "/eventdeliveries/{}/resend",
            Uuid::new_v4()
        ))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// ============================================================================
// Batch retry
// ============================================================================

#[tokio::test]
async fn test_batch_retry_counts_successes_and_failures() {
    let app = TestApp::new().await;
    let active = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let paused = app.add_endpoint(EndpointStatus::Paused, None, &[]).await;
    app.add_delivery(&active, DeliveryStatus::Failure).await;
    app.add_delivery(&active, DeliveryStatus::Failure).await;
    app.add_delivery(&paused, DeliveryStatus::Failure).await;
    app.add_delivery(&active, DeliveryStatus::Success).await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/batchretry"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body, json!({ "successes": 2, "failures": 1 }));
    assert_eq!(app.stores.queue.jobs_on(EVENT_QUEUE).len(), 2);
}

#[tokio::test]
async fn test_batch_retry_filters_by_endpoint() {
    let app = TestApp::new().await;
    let first = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let second = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    app.add_delivery(&first, DeliveryStatus::Failure).await;
    let target = app.add_delivery(&second, DeliveryStatus::Failure).await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/batchretry"),
            json!({ "endpoint_ids": [second.id] }),
        ))
        .await
        .unwrap();

    let body = parse_response_body(response).await;
    assert_eq!(body["successes"], 1);

    let jobs = app.stores.queue.jobs();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].job.id, target.id.to_string());
}

// ============================================================================
// Force resend
// ============================================================================

#[tokio::test]
async fn test_force_resend_successful_deliveries() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let first = app.add_delivery(&endpoint, DeliveryStatus::Success).await;
    let second = app.add_delivery(&endpoint, DeliveryStatus::Success).await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/forceresend"),
            json!({ "ids": [first.id, second.id, first.id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = parse_response_body(response).await;
    assert_eq!(body, json!({ "successes": 2, "failures": 0 }));
    assert_eq!(app.stores.queue.len(), 2);
}

#[tokio::test]
async fn test_force_resend_rejects_unsuccessful_delivery() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let sent = app.add_delivery(&endpoint, DeliveryStatus::Success).await;
    let failed = app.add_delivery(&endpoint, DeliveryStatus::Failure).await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/forceresend"),
            json!({ "ids": [sent.id, failed.id] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.stores.queue.is_empty());
}

#[tokio::test]
async fn test_force_resend_unknown_id() {
    let app = TestApp::new().await;
    let endpoint = app.add_endpoint(EndpointStatus::Active, None, &[]).await;
    let sent = app.add_delivery(&endpoint, DeliveryStatus::Success).await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/forceresend"),
            json!({ "ids": [sent.id, Uuid::new_v4()] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(app.stores.queue.is_empty());
}

#[tokio::test]
async fn test_force_resend_empty_ids() {
    let app = TestApp::new().await;

    let response = app
        .router()
        .oneshot(json_request(
            Method::POST,
            &app.project_path("/eventdeliveries/forceresend"),
            json!({ "ids": [] }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
