use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use sms_gateway::auth::Authenticator;
use sms_gateway::clients::{ClientAdmin, CreateClient, IssuedCredentials, UpdateClient};
use sms_gateway::config::{AdminCredentials, ClientDefaults};
use sms_gateway::delivery::testing::ScriptedDeliveryClient;
use sms_gateway::delivery::TransportError;
use sms_gateway::phone::PhoneNormalizer;
use sms_gateway::rate_limit::RateLimiter;
use sms_gateway::sms::{Cadence, DeliveryStatus, RequestMetadata, SmsRequest, SmsService};
use sms_gateway::store::testing::InMemoryStore;
use sms_gateway::{build_app, Gateway};
use tower::ServiceExt;

// key: sms-api-tests -> send, bulk, quota and audit flows through the router
struct TestGateway {
    app: Router,
    store: Arc<InMemoryStore>,
    delivery: Arc<ScriptedDeliveryClient>,
    gateway: Gateway,
}

fn gateway() -> TestGateway {
    let store = Arc::new(InMemoryStore::new());
    let delivery = Arc::new(ScriptedDeliveryClient::new());
    let admin = AdminCredentials {
        username: "admin".into(),
        password: "admin-pass".into(),
    };
    let gateway = Gateway {
        sms: Arc::new(SmsService::new(
            store.clone(),
            store.clone(),
            delivery.clone(),
            PhoneNormalizer::default(),
            None,
        )),
        admin: Arc::new(ClientAdmin::new(store.clone(), ClientDefaults::default())),
        authenticator: Arc::new(Authenticator::new(store.clone(), &admin)),
        rate_limiter: Arc::new(RateLimiter::new()),
    };
    TestGateway {
        app: build_app(gateway.clone()),
        store,
        delivery,
        gateway,
    }
}

async fn register(gw: &TestGateway, daily_limit: i32) -> IssuedCredentials {
    gw.gateway
        .admin
        .create(CreateClient {
            name: "Acme".into(),
            email: format!("{}@acme.test", uuid::Uuid::new_v4()),
            daily_limit: Some(daily_limit),
            ..CreateClient::default()
        })
        .await
        .unwrap()
}

fn post(uri: &str, creds: &IssuedCredentials, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("X-API-Key", &creds.api_key)
        .header("X-API-Secret", &creds.api_secret)
        .header("User-Agent", "integration-tests")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, creds: &IssuedCredentials) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("X-API-Key", &creds.api_key)
        .header("X-API-Secret", &creds.api_secret)
        .body(Body::empty())
        .unwrap()
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

#[tokio::test]
async fn health_reports_service_name() {
    let gw = gateway();
    let (status, body) = send(
        &gw.app,
        Request::builder().uri("/health").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "healthy", "service": "SMS Gateway API"}));
}

#[tokio::test]
async fn single_send_success_counts_once_and_logs() {
    let gw = gateway();
    let creds = register(&gw, 10).await;

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send",
            &creds,
            json!({"number": "0700 123 456", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["recipient"], "+256700123456");
    assert_eq!(body["data"]["status"], "sent");
    assert_eq!(body["data"]["provider_response"]["status"], "Success");

    let client = gw.store.client(creds.client_id).await.unwrap();
    assert_eq!((client.daily_usage, client.monthly_usage), (1, 1));
    let logs = gw.store.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].user_agent, "integration-tests");
    assert_eq!(logs[0].sender_id, "Acme");
}

#[tokio::test]
async fn provider_failure_is_a_business_outcome() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    gw.delivery.push_statuses(&["Failed"]).await;

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send",
            &creds,
            json!({"number": "+256700123456", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "SMS failed to send");
    assert_eq!(body["error"], "Failed from provider");
    assert_eq!(body["data"]["status"], "failed");
    assert_eq!(gw.store.client(creds.client_id).await.unwrap().daily_usage, 0);
}

#[tokio::test]
async fn transport_failure_returns_500_and_keeps_counters() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    gw.delivery.push_reply(Err(TransportError::Timeout)).await;

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send",
            &creds,
            json!({"number": "+256700123456", "message": "hello"}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Failed to send SMS");
    assert_eq!(gw.store.client(creds.client_id).await.unwrap().daily_usage, 0);
    let logs = gw.store.logs().await;
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].provider_status, "error");
}

#[tokio::test]
async fn malformed_payload_and_bad_number_are_400() {
    let gw = gateway();
    let creds = register(&gw, 10).await;

    let (status, body) = send(
        &gw.app,
        post("/api/v1/sms/send", &creds, json!({"message": "no number"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid request payload");

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send",
            &creds,
            json!({"number": "123", "message": "hi"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Invalid phone number");
    assert!(gw.delivery.batches().await.is_empty());
}

#[tokio::test]
async fn wrong_secret_and_unknown_key_look_identical() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    let payload = json!({"number": "+256700123456", "message": "hi"});

    let mut wrong_secret = creds.clone();
    wrong_secret.api_secret = "not-the-secret".into();
    let mut unknown_key = creds.clone();
    unknown_key.api_key = "unknown-key".into();

    let first = send(&gw.app, post("/api/v1/sms/send", &wrong_secret, payload.clone())).await;
    let second = send(&gw.app, post("/api/v1/sms/send", &unknown_key, payload)).await;
    assert_eq!(first.0, StatusCode::UNAUTHORIZED);
    assert_eq!(first, second);
}

#[tokio::test]
async fn missing_headers_inactive_and_exhausted_clients_are_rejected() {
    let gw = gateway();
    let creds = register(&gw, 1).await;
    let payload = json!({"number": "+256700123456", "message": "hi"});

    let anonymous = Request::builder()
        .method("POST")
        .uri("/api/v1/sms/send")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();
    assert_eq!(send(&gw.app, anonymous).await.0, StatusCode::UNAUTHORIZED);

    assert_eq!(
        send(&gw.app, post("/api/v1/sms/send", &creds, payload.clone())).await.0,
        StatusCode::OK
    );
    let (status, body) = send(&gw.app, post("/api/v1/sms/send", &creds, payload.clone())).await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Daily limit exceeded");

    gw.gateway
        .admin
        .update(
            creds.client_id,
            UpdateClient {
                is_active: Some(false),
                ..UpdateClient::default()
            },
        )
        .await
        .unwrap();
    let (status, _) = send(&gw.app, post("/api/v1/sms/send", &creds, payload)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn bulk_over_quota_is_rejected_without_side_effects() {
    let gw = gateway();
    let creds = register(&gw, 2).await;

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send/bulk",
            &creds,
            json!({"messages": [
                {"number": "+256700000001", "message": "a"},
                {"number": "+256700000002", "message": "b"},
                {"number": "+256700000003", "message": "c"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Bulk request would exceed daily limit");
    assert!(gw.delivery.batches().await.is_empty());
    assert!(gw.store.logs().await.is_empty());
    assert_eq!(gw.store.client(creds.client_id).await.unwrap().daily_usage, 0);
}

#[tokio::test]
async fn bulk_send_reports_partial_results() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    gw.delivery.push_statuses(&["Success", "Failed"]).await;

    let (status, body) = send(
        &gw.app,
        post(
            "/api/v1/sms/send/bulk",
            &creds,
            json!({"messages": [
                {"number": "0700000001", "message": "a", "senderid": "ACME"},
                {"number": "0700000002", "message": "b", "priority": "0"},
                {"number": "0700000003", "message": "c"}
            ]}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["total"], 3);
    // The third message falls back to the first outcome.
    assert_eq!(body["data"]["successful"], 2);
    assert_eq!(body["data"]["failed"], 1);
    assert_eq!(body["data"]["results"][1]["status"], "failed");
    assert_eq!(body["data"]["results"][2]["recipient"], "+256700000003");

    let batches = gw.delivery.batches().await;
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 3);

    let client = gw.store.client(creds.client_id).await.unwrap();
    assert_eq!((client.daily_usage, client.monthly_usage), (2, 2));
    let logs = gw.store.logs().await;
    assert_eq!(logs[0].sender_id, "ACME");
    assert_eq!(logs[1].priority, "0");
}

#[tokio::test]
async fn empty_bulk_request_is_400() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    let (status, _) = send(
        &gw.app,
        post("/api/v1/sms/send/bulk", &creds, json!({"messages": []})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_and_stats_remain_readable_over_quota() {
    let gw = gateway();
    let creds = register(&gw, 1).await;
    send(
        &gw.app,
        post(
            "/api/v1/sms/send",
            &creds,
            json!({"number": "+256700123456", "message": "hi"}),
        ),
    )
    .await;

    let (status, body) = send(&gw.app, get("/api/v1/sms/stats", &creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["daily_usage"], 1);
    assert_eq!(body["data"]["daily_limit"], 1);
    assert_eq!(body["data"]["is_active"], true);

    let (status, body) = send(&gw.app, get("/api/v1/sms/logs?status=sent&limit=5", &creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&gw.app, get("/api/v1/sms/logs?status=bogus", &creds)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_log_query_values_mean_no_filter() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    gw.delivery.push_statuses(&["Failed"]).await;
    for number in ["+256700000001", "+256700000002"] {
        send(
            &gw.app,
            post(
                "/api/v1/sms/send",
                &creds,
                json!({"number": number, "message": "hi"}),
            ),
        )
        .await;
    }

    for uri in [
        "/api/v1/sms/logs?limit=&offset=&status=",
        "/api/v1/sms/logs?status=",
        "/api/v1/sms/logs",
    ] {
        let (status, body) = send(&gw.app, get(uri, &creds)).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["data"].as_array().unwrap().len(), 2, "{uri}");
    }

    let (status, body) = send(&gw.app, get("/api/v1/sms/logs?limit=&status=failed", &creds)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(&gw.app, get("/api/v1/sms/logs?limit=abc", &creds)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn logs_are_newest_first_and_paged() {
    let gw = gateway();
    let creds = register(&gw, 10).await;
    for n in 1..=3 {
        send(
            &gw.app,
            post(
                "/api/v1/sms/send",
                &creds,
                json!({"number": format!("+25670000000{n}"), "message": "hi"}),
            ),
        )
        .await;
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }

    let (_, body) = send(&gw.app, get("/api/v1/sms/logs?limit=2", &creds)).await;
    let page = body["data"].as_array().unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["recipient"], "+256700000003");
    assert_eq!(page[1]["recipient"], "+256700000002");

    let (_, body) = send(&gw.app, get("/api/v1/sms/logs?limit=2&offset=2", &creds)).await;
    let page = body["data"].as_array().unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0]["recipient"], "+256700000001");
}

#[tokio::test]
async fn per_second_rate_limit_applies() {
    let gw = gateway();
    let creds = register(&gw, 100).await;
    gw.gateway
        .admin
        .update(
            creds.client_id,
            UpdateClient {
                rate_limit: Some(1),
                ..UpdateClient::default()
            },
        )
        .await
        .unwrap();

    let (first, _) = send(&gw.app, get("/api/v1/sms/stats", &creds)).await;
    let (second, body) = send(&gw.app, get("/api/v1/sms/stats", &creds)).await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["message"], "Rate limit exceeded");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sends_interleaved_with_reset_stay_bounded() {
    const LIMIT: i32 = 10;
    const SENDERS: usize = 24;

    let gw = gateway();
    let creds = register(&gw, LIMIT).await;
    let metadata = RequestMetadata::default();

    let mut tasks = Vec::with_capacity(SENDERS);
    for n in 0..SENDERS {
        let gateway = gw.gateway.clone();
        let creds = creds.clone();
        let metadata = metadata.clone();
        tasks.push(tokio::spawn(async move {
            let client = gateway
                .authenticator
                .authenticate(&creds.api_key, &creds.api_secret)
                .await
                .ok()?;
            let request = SmsRequest {
                number: format!("+2567000{n:05}"),
                message: "burst".into(),
                senderid: None,
                priority: None,
            };
            gateway.sms.send_single(&client, request, &metadata).await.ok()
        }));
        if n == SENDERS / 2 {
            let far_future = chrono::Local::now() + chrono::Duration::days(2);
            sms_gateway::sms::run_usage_reset(gw.store.as_ref(), Cadence::Daily, far_future)
                .await
                .unwrap();
        }
    }

    let mut sent = 0;
    for task in tasks {
        if let Some(result) = task.await.unwrap() {
            if result.status == DeliveryStatus::Sent {
                sent += 1;
            }
        }
    }

    let client = gw.store.client(creds.client_id).await.unwrap();
    assert!(client.daily_usage >= 0);
    // Overshoot is bounded by the number of requests in flight.
    assert!(client.daily_usage <= LIMIT + SENDERS as i32);
    assert!(client.monthly_usage >= client.daily_usage);
    assert_eq!(client.monthly_usage, sent);
    assert_eq!(gw.store.logs().await.len(), sent as usize);
}
