//! Integration tests for the job API

mod common;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use base64::Engine;
use serde_json::json;
use std::sync::atomic::Ordering;

use common::*;

#[tokio::test]
async fn test_health_check() {
    let app = create_test_app(None);
    for uri in ["/health", "/healthz", "/api/health"] {
        let (status, body) = app.get(uri).await;
        assert_eq!(status, StatusCode::OK, "{uri}");
        assert_eq!(body["status"], "ok");
        assert_eq!(body["model"]["state"], "unloaded");
        assert_eq!(body["model"]["loaded"], false);
        assert_eq!(body["queue_depth"], 0);
    }
}

#[tokio::test]
async fn test_request_id_header() {
    let app = create_test_app(None);
    let (_, headers, _) = app
        .send(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await;
    let id = headers.get("x-request-id").unwrap().to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_languages_and_presets() {
    let app = create_test_app(None);

    let (status, languages) = app.get("/languages").await;
    assert_eq!(status, StatusCode::OK);
    let codes: Vec<&str> = languages
        .as_array()
        .unwrap()
        .iter()
        .map(|l| l["code"].as_str().unwrap())
        .collect();
    assert!(codes.contains(&"tr"));
    assert!(codes.contains(&"en"));

    let (status, presets) = app.get("/api/presets").await;
    assert_eq!(status, StatusCode::OK);
    let presets = presets.as_array().unwrap();
    assert_eq!(presets.len(), 18);
    assert!(presets.iter().any(|p| p["key"] == "news_anchor"));
}

#[tokio::test]
async fn test_submit_poll_and_download() {
    let app = create_test_app(None);
    let (status, body) = app
        .post_json(
            "/jobs",
            json!({
                "text": "The first sentence is here. And a second one follows it.",
                "language": "en",
                "seed": 11
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "queued");
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = app.wait_for_job(&job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["progress"], 100);
    assert_eq!(job["settings"]["seed"], 11);
    assert_eq!(job["result"]["chunk_count"], 2);
    assert_eq!(job["result"]["sample_rate"], 16_000);
    assert!(job["error"].is_null());

    let (status, headers, bytes) = app
        .send(
            Request::builder()
                .uri(format!("/api/jobs/{}/audio", job_id))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get("content-type").unwrap(), "audio/wav");
    assert_eq!(&bytes[0..4], b"RIFF");
    assert_eq!(app.loader.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_job_reports_error_and_has_no_audio() {
    let app = create_test_app(Some("poison"));
    let (status, body) = app
        .post_json(
            "/jobs",
            json!({ "text": "This part is fine. This part is poison. Never reached.", "language": "en" }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let job_id = body["job_id"].as_str().unwrap().to_string();

    let job = app.wait_for_job(&job_id).await;
    assert_eq!(job["status"], "failed");
    assert!(job["result"].is_null());
    assert!(job["error"].as_str().unwrap().contains("engine rejected chunk"));

    let (status, body) = app.get(&format!("/jobs/{}/audio", job_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_submit_validation_errors() {
    let app = create_test_app(None);
    let cases = vec![
        json!({ "text": "" }),
        json!({ "text": "   " }),
        json!({ "text": "hello", "language": "klingon" }),
        json!({ "text": "hello", "preset": "nope" }),
        json!({ "text": "hello", "exaggeration": 5.0 }),
        json!({ "text": "hello", "reference_audio_base64": "%%%" }),
        json!({
            "text": "hello",
            "reference_audio_base64": base64::engine::general_purpose::STANDARD.encode(b"not a wav file")
        }),
    ];
    for case in cases {
        let (status, body) = app.post_json("/jobs", case.clone()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{case}");
        assert_eq!(body["code"], 400);
        assert!(body["error"].is_string());
    }

    let (_, history) = app.get("/jobs").await;
    assert!(history.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_reference_audio_upload() {
    let app = create_test_app(None);
    let clip = tts_core::wav::encode_wav(&vec![0.1; 16_000], 16_000).unwrap();
    let encoded = base64::engine::general_purpose::STANDARD.encode(clip);
    let (status, body) = app
        .post_json(
            "/jobs",
            json!({ "text": "Speak like me.", "language": "en", "reference_audio_base64": encoded }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["has_reference_audio"], true);
}

#[tokio::test]
async fn test_non_wav_reference_audio_upload() {
    let app = create_test_app(None);
    // FLAC stream header only: 16 kHz mono, 16-bit, one second
    let mut clip = b"fLaC".to_vec();
    clip.extend_from_slice(&[0x80, 0x00, 0x00, 0x22, 0x10, 0x00, 0x10, 0x00]);
    clip.extend_from_slice(&[0; 6]);
    clip.extend_from_slice(&((16_000u64 << 44) | (15u64 << 36) | 16_000).to_be_bytes());
    clip.extend_from_slice(&[0; 16]);
    let encoded = base64::engine::general_purpose::STANDARD.encode(clip);

    let (status, body) = app
        .post_json(
            "/jobs",
            json!({ "text": "Speak like me.", "language": "en", "reference_audio_base64": encoded }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{body}");

    let job = app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["has_reference_audio"], true);
}

#[tokio::test]
async fn test_unknown_and_malformed_job_ids() {
    let app = create_test_app(None);

    let (status, body) = app.get("/jobs/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, body) = app.get(&format!("/jobs/{}", uuid::Uuid::new_v4())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_history_is_newest_first_and_limited() {
    let app = create_test_app(None);
    let mut ids = Vec::new();
    for text in ["One.", "Two.", "Three."] {
        let (_, body) = app.post_json("/jobs", json!({ "text": text, "language": "en" })).await;
        let id = body["job_id"].as_str().unwrap().to_string();
        app.wait_for_job(&id).await;
        ids.push(id);
    }

    let (status, history) = app.get("/jobs?limit=2").await;
    assert_eq!(status, StatusCode::OK);
    let listed: Vec<&str> = history
        .as_array()
        .unwrap()
        .iter()
        .map(|j| j["job_id"].as_str().unwrap())
        .collect();
    assert_eq!(listed, vec![ids[2].as_str(), ids[1].as_str()]);

    let (_, all) = app.get("/api/jobs").await;
    assert_eq!(all.as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_unload_endpoint() {
    let app = create_test_app(None);

    let (status, body) = app.post_json("/unload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unloaded"], false);

    let (_, body) = app.post_json("/jobs", json!({ "text": "Warm up.", "language": "en" })).await;
    app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    assert!(app.scheduler.model_status().loaded);

    let (status, body) = app.post_json("/api/unload", json!({})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["unloaded"], true);
    assert_eq!(body["model"]["state"], "unloaded");
    assert_eq!(body["model"]["unload_count"], 1);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let app = create_test_app(None);
    let (_, body) = app.post_json("/jobs", json!({ "text": "Count me.", "language": "en" })).await;
    app.wait_for_job(body["job_id"].as_str().unwrap()).await;
    app.post_json("/jobs", json!({ "text": "" })).await;

    let (status, metrics) = app.get("/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(metrics["jobs"]["submitted"], 1);
    assert_eq!(metrics["jobs"]["completed"], 1);
    assert_eq!(metrics["endpoints"]["submit"]["request_count"], 2);
    assert_eq!(metrics["endpoints"]["submit"]["error_count"], 1);
    assert_eq!(metrics["model"]["load_count"], 1);
    assert!(metrics["system"]["memory_total_mb"].as_u64().is_some());
}
