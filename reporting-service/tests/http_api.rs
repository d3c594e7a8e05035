use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use reporting_client::{
    domain::{ComponentKind, ComponentRef, Metric, MicrogridDescriptor, QueryKey, RawSample},
    ClientError,
};
use reporting_service::{
    http::{router, AppState},
    microgrids::MicrogridRegistry,
    pipeline::SampleSource,
    ReportPipeline, ReportService,
};
use serde_json::Value;
use tower::util::ServiceExt;

/// PV 4 kW and a grid import of 1 kW in every bucket.
struct StubSource {
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl SampleSource for StubSource {
    async fn fetch(&self, key: &QueryKey) -> Result<Vec<RawSample>, ClientError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut samples = Vec::new();
        for i in 0..key.bucket_count() {
            for (component_id, value) in [(1, 4000.0), (2, 1000.0)] {
                samples.push(RawSample {
                    component_id,
                    timestamp: key.bucket_start(i),
                    metric: "AC_ACTIVE_POWER".to_string(),
                    value,
                    unit: "W".to_string(),
                });
            }
        }
        Ok(samples)
    }
}

fn app() -> (Router, Arc<StubSource>) {
    let source = Arc::new(StubSource {
        calls: AtomicUsize::new(0),
    });
    let registry = MicrogridRegistry::from_descriptors([MicrogridDescriptor {
        id: 241,
        name: "Depot North".to_string(),
        timezone: chrono_tz::Europe::Berlin,
        components: vec![
            ComponentRef {
                id: 1,
                kind: ComponentKind::Pv,
                label: "Roof PV".to_string(),
                metrics: vec![Metric::AcActivePower],
            },
            ComponentRef {
                id: 2,
                kind: ComponentKind::Grid,
                label: "Grid meter".to_string(),
                metrics: vec![Metric::AcActivePower],
            },
        ],
    }]);
    let service = ReportService::new(Arc::new(registry), ReportPipeline::new(source.clone()));
    let app = router(Arc::new(AppState {
        service: Arc::new(service),
    }));
    (app, source)
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&body).unwrap_or(Value::Null);
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

const DAY_QUERY: &str = "/pages/reporting_dashboard?microgrid_id=241&start_date=2024-01-15&end_date=2024-01-15&resolution=15min";

#[tokio::test]
async fn healthz_answers_ok() {
    let (app, _) = app();
    let resp = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&body[..], b"ok");
}

#[tokio::test]
async fn microgrids_and_navigation_are_listed() {
    let (app, _) = app();

    let (status, json) = send(&app, get("/microgrids")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["id"], 241);
    assert_eq!(json[0]["timezone"], "Europe/Berlin");
    assert_eq!(json[0]["component_kinds"], serde_json::json!(["pv", "grid"]));

    let (status, json) = send(&app, get("/pages")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json[0]["key"], "home");
    assert_eq!(json[1]["key"], "reporting_dashboard");
}

#[tokio::test]
async fn reporting_page_returns_a_day_of_quarter_hours() {
    let (app, source) = app();

    let (status, json) = send(&app, get(DAY_QUERY)).await;
    assert_eq!(status, StatusCode::OK, "{json}");
    assert_eq!(json["page"], "reporting");
    assert_eq!(json["status"], "ok");
    assert_eq!(json["stale"], false);

    let rows = json["table"]["rows"].as_array().unwrap();
    assert_eq!(rows.len(), 96);
    assert_eq!(rows[0]["timestamp"], "2024-01-15T00:00:00+01:00");
    assert_eq!(rows[0]["values"], serde_json::json!([4.0, 1.0]));
    assert_eq!(rows[0]["derived"]["total_consumption"], 5.0);
    assert_eq!(rows[0]["derived"]["mix_pct"]["pv"], 100.0);

    assert_eq!(json["summary"]["total_production_kwh"], 96.0);
    assert_eq!(json["summary"]["grid_import_kwh"], 24.0);

    // Same session, same filters: served from the session cache.
    let (status, _) = send(&app, get(DAY_QUERY)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(source.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn sessions_are_isolated_and_can_be_ended() {
    let (app, source) = app();
    let with_session = |id: &str| {
        Request::builder()
            .uri(DAY_QUERY)
            .header("x-session-id", id)
            .body(Body::empty())
            .unwrap()
    };

    send(&app, with_session("alice")).await;
    send(&app, with_session("bob")).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 2);

    let end = Request::builder()
        .method("DELETE")
        .uri("/sessions/alice")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, end).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    send(&app, with_session("alice")).await;
    assert_eq!(source.calls.load(Ordering::SeqCst), 3);

    let again = Request::builder()
        .method("DELETE")
        .uri("/sessions/nobody")
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, again).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_page_key_falls_back_to_home() {
    let (app, _) = app();
    let (status, json) = send(&app, get("/pages/solar")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], "home");

    let (status, json) = send(&app, get("/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["page"], "home");
}

#[tokio::test]
async fn bad_filters_map_to_client_errors() {
    let (app, source) = app();

    let (status, json) = send(
        &app,
        get("/pages/reporting_dashboard?microgrid_id=241&resolution=15s"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_filter");

    let (status, json) = send(
        &app,
        get("/pages/reporting_dashboard?start_date=2024-01-02&end_date=2024-01-01"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_filter");

    let (status, json) = send(&app, get("/pages/reporting_dashboard?microgrid_id=7")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "unknown_microgrid");

    let (status, json) = send(
        &app,
        get("/pages/reporting_dashboard?start_date=yesterday"),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "invalid_filter");

    assert_eq!(source.calls.load(Ordering::SeqCst), 0);
}
