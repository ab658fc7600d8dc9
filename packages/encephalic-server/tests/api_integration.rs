use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use encephalic_dsp::{demo_recording, write_recording, Recording, SyntheticConfig};
use encephalic_server::{
    create_router, AppState, EdfSource, InMemorySource, RecordingSource, ServerConfig,
    ServiceError,
};
use http_body_util::BodyExt;
use std::sync::Arc;
use tower::ServiceExt;

fn demo() -> Recording {
    demo_recording(&SyntheticConfig {
        duration: 10.0,
        sfreq: 128.0,
        seed: 1,
    })
    .expect("demo recording")
}

fn state_with(source: Arc<dyn RecordingSource>) -> Arc<AppState> {
    Arc::new(AppState::new(ServerConfig::default(), source))
}

fn loaded_state() -> Arc<AppState> {
    let state = state_with(Arc::new(InMemorySource::new(demo())));
    state.loader.load().expect("load");
    state
}

async fn send(router: axum::Router, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
    let response = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .expect("Failed to send request");
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.into_body().collect().await.unwrap().to_bytes().to_vec();
    (status, headers, body)
}

async fn send_json(router: axum::Router, uri: &str) -> (StatusCode, serde_json::Value) {
    let (status, _, body) = send(router, uri).await;
    let json = serde_json::from_slice(&body).unwrap_or(serde_json::json!({}));
    (status, json)
}

#[tokio::test]
async fn test_health_before_and_after_load() {
    let state = state_with(Arc::new(InMemorySource::new(demo())));
    let router = create_router(state.clone());

    let (status, json) = send_json(router.clone(), "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["data_loaded"], false);
    assert_eq!(json["loader_state"], "not_started");

    state.loader.load().unwrap();
    let (_, json) = send_json(router, "/api/health").await;
    assert_eq!(json["data_loaded"], true);
    assert_eq!(json["loader_state"], "ready");
}

#[tokio::test]
async fn test_data_endpoints_unavailable_while_initializing() {
    let router = create_router(state_with(Arc::new(InMemorySource::new(demo()))));
    for uri in [
        "/api/eeg-info",
        "/api/eeg-data",
        "/api/eeg-psd",
        "/api/eeg-bands",
        "/api/eeg-topomap/1.0",
    ] {
        let (status, json) = send_json(router.clone(), uri).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{}", uri);
        assert!(json["error"].is_string(), "{}", uri);
    }
}

struct EmptySource;

impl RecordingSource for EmptySource {
    fn load(&self) -> Result<Recording, ServiceError> {
        Err(ServiceError::NoChannels {
            sensor: "EEG".to_string(),
        })
    }

    fn describe(&self) -> String {
        "empty".to_string()
    }
}

#[tokio::test]
async fn test_failed_load_reports_503() {
    let state = state_with(Arc::new(EmptySource));
    assert!(state.loader.load().is_err());
    let router = create_router(state);

    let (status, json) = send_json(router.clone(), "/api/eeg-psd").await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("EEG"));

    let (status, json) = send_json(router, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["loader_state"], "failed");
}

#[tokio::test]
async fn test_eeg_info() {
    let router = create_router(loaded_state());
    let (status, json) = send_json(router, "/api/eeg-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["n_channels"], 20);
    assert_eq!(json["n_samples"], 1280);
    assert_eq!(json["sampling_freq"], 128.0);
    assert_eq!(json["channel_names"][0], "Fp1");
}

#[tokio::test]
async fn test_eeg_data_window() {
    let router = create_router(loaded_state());

    let (status, json) = send_json(router.clone(), "/api/eeg-data?tmin=1&tmax=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["times"].as_array().unwrap().len(), 128);
    assert_eq!(json["labels"].as_array().unwrap().len(), 20);
    assert_eq!(json["data"][0].as_array().unwrap().len(), 128);
    assert_eq!(json["sfreq"], 128.0);

    // Defaults to [0, 10], clamped to the recording's 9.99 s
    let (status, json) = send_json(router, "/api/eeg-data").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["times"].as_array().unwrap().len(), 1280);
}

#[tokio::test]
async fn test_eeg_data_rejects_bad_ranges() {
    let router = create_router(loaded_state());
    for uri in [
        "/api/eeg-data?tmin=abc",
        "/api/eeg-data?tmin=5&tmax=2",
        "/api/eeg-data?tmin=50&tmax=60",
        "/api/eeg-data?tmin=NaN",
        "/api/eeg-data?tmin=1.001&tmax=1.002",
    ] {
        let (status, json) = send_json(router.clone(), uri).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", uri);
        assert!(json["error"].is_string());
    }
}

#[tokio::test]
async fn test_topomap_png_and_cache_headers() {
    let state = loaded_state();
    let router = create_router(state.clone());

    let (status, headers, body) = send(router.clone(), "/api/eeg-topomap/1.5").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers[header::CONTENT_TYPE], "image/png");
    assert_eq!(headers[header::CACHE_CONTROL], "public, max-age=300");
    assert_eq!(&body[1..4], b"PNG");

    let (_, _, again) = send(router, "/api/eeg-topomap/1.501").await;
    assert_eq!(again, body);
    let stats = state.caches.stats().topomaps;
    assert_eq!((stats.hits, stats.entries), (1, 1));
}

#[tokio::test]
async fn test_topomap_rejects_non_numeric_time() {
    let router = create_router(loaded_state());
    let (status, json) = send_json(router, "/api/eeg-topomap/soon").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn test_psd_and_bands() {
    let router = create_router(loaded_state());

    let (status, psd) = send_json(router.clone(), "/api/eeg-psd").await;
    assert_eq!(status, StatusCode::OK);
    let frequencies = psd["frequencies"].as_array().unwrap();
    assert!(frequencies.iter().all(|f| f.as_f64().unwrap() <= 50.0));
    assert_eq!(psd["psd"].as_array().unwrap().len(), frequencies.len());
    assert_eq!(psd["channel_psds"].as_array().unwrap().len(), 20);
    assert_eq!(psd["channel_names"].as_array().unwrap().len(), 20);

    let (status, bands) = send_json(router, "/api/eeg-bands").await;
    assert_eq!(status, StatusCode::OK);
    let keys: Vec<&String> = bands.as_object().unwrap().keys().collect();
    assert_eq!(keys.len(), 5);
    for band in ["delta", "theta", "alpha", "beta", "gamma"] {
        assert!(bands[band].as_f64().unwrap() >= 0.0, "{}", band);
    }
}

#[tokio::test]
async fn test_cache_stats_and_unknown_route() {
    let router = create_router(loaded_state());
    send(router.clone(), "/api/eeg-data?tmin=0&tmax=1").await;
    send(router.clone(), "/api/eeg-data?tmin=0&tmax=1").await;

    let (status, stats) = send_json(router.clone(), "/api/cache/stats").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["windows"]["hits"], 1);
    assert_eq!(stats["windows"]["entries"], 1);
    assert_eq!(stats["windows"]["capacity"], 1000);

    let (status, json) = send_json(router, "/api/does-not-exist").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "Endpoint not found");
}

#[tokio::test]
async fn test_edf_source_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sample_eeg.edf");
    write_recording(&path, &demo()).unwrap();

    let config = ServerConfig {
        data_file: path.clone(),
        ..ServerConfig::default()
    };
    let source = Arc::new(EdfSource::new(path, config.sensor_selection));
    let state = Arc::new(AppState::new(config, source));
    let loader = state.loader.clone();
    tokio::task::spawn_blocking(move || loader.load())
        .await
        .unwrap()
        .unwrap();

    let (status, json) = send_json(create_router(state), "/api/eeg-info").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["n_channels"], 19);
}
