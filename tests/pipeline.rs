//! End-to-end runs of the pipeline against a mock job API.

use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Match, Mock, MockServer, Request, ResponseTemplate};

use genjob::kie::{ClientConfig, GenerationRequest, JobClient};
use genjob::pipeline::{ImageSource, Pipeline, UnitOutcome, UnitSource, WorkUnit};
use genjob::poller::Silent;
use genjob::state_machine::{JobState, PollPolicy};
use genjob::upload::{UploadConfig, Uploader};

fn fast_policy() -> PollPolicy {
    PollPolicy::fixed(Duration::from_secs(5), Duration::from_millis(10))
}

fn pipeline_for(server: &MockServer) -> Pipeline {
    let config = ClientConfig::new("test-key").with_api_base(server.uri());
    let client = JobClient::new(config).unwrap();
    Pipeline::new(client, fast_policy())
}

fn image_unit(id: &str, dir: &Path) -> WorkUnit {
    WorkUnit {
        id: id.into(),
        label: id.into(),
        target: dir.join(format!("{id}.png")),
        source: UnitSource::Ready(
            GenerationRequest::new("nano-banana-pro").with_input("prompt", format!("portrait {id}")),
        ),
    }
}

fn created(task_id: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "msg": "success",
        "data": {"taskId": task_id}
    }))
}

fn record(state: &str, result_json: Option<String>) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": 200,
        "msg": "success",
        "data": {"taskId": "t", "state": state, "resultJson": result_json}
    }))
}

fn result_json(url: &str) -> Option<String> {
    Some(json!({"resultUrls": [url]}).to_string())
}

/// Raw-bytes body matcher; multipart uploads are not valid UTF-8.
struct BodyBytesContain(&'static [u8]);

impl Match for BodyBytesContain {
    fn matches(&self, request: &Request) -> bool {
        request.body.windows(self.0.len()).any(|window| window == self.0)
    }
}

fn tiny_png() -> Vec<u8> {
    let img = image::RgbImage::from_pixel(40, 60, image::Rgb([200, 120, 40]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[tokio::test]
async fn existing_target_is_skipped_without_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(created("never"))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(record("success", None))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let unit = image_unit("01_a", dir.path());
    std::fs::write(&unit.target, b"old").unwrap();

    let summary = pipeline_for(&server).run(&[unit.clone()], &Silent).await;

    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.skipped, 1);
    assert!(summary.all_succeeded());
    assert_eq!(summary.records[0].outcome, UnitOutcome::Skipped);
    assert_eq!(std::fs::read(&unit.target).unwrap(), b"old");
}

#[tokio::test]
async fn submit_poll_fetch_persist() {
    let server = MockServer::start().await;
    let artifact = b"\x89PNG fake portrait bytes".to_vec();

    Mock::given(method("POST"))
        .and(path("/createTask"))
        .and(header("authorization", "Bearer test-key"))
        .and(body_partial_json(json!({
            "model": "nano-banana-pro",
            "input": {"prompt": "portrait 01_a"}
        })))
        .respond_with(created("task-1"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "task-1"))
        .respond_with(record("processing", None))
        .up_to_n_times(3)
        .expect(3)
        .mount(&server)
        .await;
    let file_url = format!("{}/files/01_a.png", server.uri());
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "task-1"))
        .respond_with(record("success", result_json(&file_url)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/01_a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(artifact.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let unit = image_unit("01_a", &dir.path().join("2025-03-09/artifacts/personas"));

    let summary = pipeline_for(&server).run(&[unit.clone()], &Silent).await;

    assert!(summary.all_succeeded(), "{:?}", summary.failed);
    let rec = &summary.records[0];
    assert_eq!(rec.task_id.as_deref(), Some("task-1"));
    assert_eq!(rec.outcome, UnitOutcome::Completed { bytes: artifact.len() });
    assert_eq!(rec.states, vec![JobState::Processing, JobState::Success]);
    assert_eq!(std::fs::read(&unit.target).unwrap(), artifact);
}

#[tokio::test]
async fn rejected_submission_never_polls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 402,
            "msg": "Insufficient credits"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(record("success", None))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let unit = image_unit("01_a", dir.path());
    let summary = pipeline_for(&server).run(&[unit.clone()], &Silent).await;

    assert!(!summary.all_succeeded());
    assert!(summary.aborted.is_none());
    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].reason.contains("Insufficient credits"));
    assert!(summary.records[0].task_id.is_none());
    assert!(!unit.target.exists());
}

#[tokio::test]
async fn failed_unit_does_not_stop_the_run() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": {"prompt": "portrait 01_a"}})))
        .respond_with(created("task-a"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({"input": {"prompt": "portrait 02_b"}})))
        .respond_with(created("task-b"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "task-a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 200,
            "data": {"taskId": "task-a", "state": "fail", "failMsg": "content policy"}
        })))
        .mount(&server)
        .await;
    let file_url = format!("{}/files/02_b.png", server.uri());
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .and(query_param("taskId", "task-b"))
        .respond_with(record("success", result_json(&file_url)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/02_b.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-b".to_vec()))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let units = [image_unit("01_a", dir.path()), image_unit("02_b", dir.path())];
    let summary = pipeline_for(&server).run(&units, &Silent).await;

    assert_eq!(summary.total, 2);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].unit_id, "01_a");
    assert!(summary.failed[0].reason.contains("content policy"));
    assert!(!units[0].target.exists());
    assert_eq!(std::fs::read(&units[1].target).unwrap(), b"png-b");
}

#[tokio::test]
async fn success_without_result_url_fails_the_unit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(created("task-1"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(record("success", Some(r#"{"resultUrls": []}"#.into())))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let unit = image_unit("01_a", dir.path());
    let summary = pipeline_for(&server).run(&[unit.clone()], &Silent).await;

    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].reason.contains("task-1"));
    assert!(!unit.target.exists());
}

#[tokio::test]
async fn video_unit_uploads_local_image_first() {
    let server = MockServer::start().await;
    let hosted = format!("{}/hosted/01_a.jpg", server.uri());

    Mock::given(method("POST"))
        .and(path("/upload"))
        .and(BodyBytesContain(b"fileupload"))
        .and(BodyBytesContain(b"filename=\"01_a.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_string(format!("{hosted}\n")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .and(body_partial_json(json!({
            "model": "grok-imagine/image-to-video",
            "input": {"image_urls": [hosted.clone()], "prompt": "nod"}
        })))
        .respond_with(created("task-v"))
        .expect(1)
        .mount(&server)
        .await;
    let video_url = format!("{}/files/01_a.mp4", server.uri());
    Mock::given(method("GET"))
        .and(path("/recordInfo"))
        .respond_with(record("success", result_json(&video_url)))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files/01_a.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("01_a.png");
    std::fs::write(&image_path, tiny_png()).unwrap();

    let unit = WorkUnit {
        id: "01_a".into(),
        label: "A".into(),
        target: dir.path().join("videos/01_a.mp4"),
        source: UnitSource::ImageToVideo {
            image: ImageSource::File(image_path),
            request: GenerationRequest::new("grok-imagine/image-to-video").with_input("prompt", "nod"),
        },
    };
    let uploader = Uploader::new(UploadConfig {
        endpoint: format!("{}/upload", server.uri()),
        ..Default::default()
    })
    .unwrap();

    let summary = pipeline_for(&server)
        .with_uploader(uploader)
        .run(&[unit.clone()], &Silent)
        .await;

    assert!(summary.all_succeeded(), "{:?}", summary.failed);
    assert_eq!(std::fs::read(&unit.target).unwrap(), b"mp4");
}

#[tokio::test]
async fn upload_failure_skips_submission() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(412).set_body_string("file too large"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/createTask"))
        .respond_with(created("never"))
        .expect(0)
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    let image_path = dir.path().join("01_a.png");
    std::fs::write(&image_path, tiny_png()).unwrap();
    let unit = WorkUnit {
        id: "01_a".into(),
        label: "A".into(),
        target: dir.path().join("01_a.mp4"),
        source: UnitSource::ImageToVideo {
            image: ImageSource::File(image_path),
            request: GenerationRequest::new("grok-imagine/image-to-video"),
        },
    };
    let uploader = Uploader::new(UploadConfig {
        endpoint: format!("{}/upload", server.uri()),
        ..Default::default()
    })
    .unwrap();

    let summary = pipeline_for(&server)
        .with_uploader(uploader)
        .run(&[unit], &Silent)
        .await;

    assert_eq!(summary.failed.len(), 1);
    assert!(summary.failed[0].reason.contains("412"));
}

#[tokio::test]
async fn cancelled_run_stops_before_first_unit() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(created("never"))
        .expect(0)
        .mount(&server)
        .await;

    let cancel = tokio_util::sync::CancellationToken::new();
    cancel.cancel();
    let dir = TempDir::new().unwrap();
    let summary = pipeline_for(&server)
        .with_cancellation(cancel)
        .run(&[image_unit("01_a", dir.path())], &Silent)
        .await;

    assert!(summary.records.is_empty());
    assert!(summary.aborted.is_some());
    assert!(!summary.all_succeeded());
}
