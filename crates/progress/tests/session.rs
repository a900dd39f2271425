mod common;

use std::time::Duration;

use assert_matches::assert_matches;

use cvflow_core::presentation::{BarColor, ResultAction};
use cvflow_core::stage::Stage;
use cvflow_core::upload::UploadConstraints;
use cvflow_progress::api::CvApiError;
use cvflow_progress::connector::ConnectorConfig;
use cvflow_progress::events::JobOutcome;
use cvflow_progress::session::CvSession;

use common::{drain, send_text, spawn_backend, HttpReply, COMPLETED, EXTRACTING};

#[tokio::test]
async fn upload_flow_ends_with_a_download_action() {
    let (base_url, recorded) = spawn_backend(
        Some(HttpReply::json(200, r#"{"job_id":"abc123"}"#)),
        |_, mut ws| async move {
            send_text(&mut ws, EXTRACTING).await;
            tokio::time::sleep(Duration::from_millis(50)).await;
            send_text(&mut ws, COMPLETED).await;
            drain(&mut ws).await;
        },
    )
    .await;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("resume.pdf");
    std::fs::write(&path, vec![b'x'; 2 * 1024 * 1024]).unwrap();

    let mut session = CvSession::new(&base_url, UploadConstraints::default());
    let subscription = session.start_upload(&path).await.unwrap();
    assert_eq!(subscription.job_id(), "abc123");

    let mut state = subscription.watch_state();
    let saw_extracting = tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| s.stage == Stage::Extracting),
    )
    .await
    .map(|waited| waited.is_ok())
    .unwrap_or(false);
    assert!(saw_extracting);
    assert_eq!(subscription.view().label, "Extracting CV data...");
    assert_eq!(subscription.view().color, BarColor::Blue);

    let outcome = tokio::time::timeout(Duration::from_secs(5), subscription.outcome())
        .await
        .unwrap();
    assert_matches!(outcome, JobOutcome::Completed(_));

    let view = subscription.view();
    assert_eq!(view.color, BarColor::Green);
    assert_eq!(
        view.actions,
        vec![ResultAction::Download {
            path: "/x.pdf".to_string()
        }]
    );

    assert_eq!(recorded.http_count(), 1);
    assert_eq!(recorded.ws_paths(), vec!["/ws/progress/abc123".to_string()]);

    session.reset().await;
    assert!(session.active().is_none());
}

#[tokio::test]
async fn generation_subscribes_to_the_session_channel() {
    let (base_url, recorded) = spawn_backend(
        Some(HttpReply::json(
            200,
            r#"{"status":"success","pdf_url":"/files/cv.pdf","pdf_filename":"cv.pdf"}"#,
        )),
        |_, mut ws| async move { drain(&mut ws).await },
    )
    .await;

    let config = ConnectorConfig::chat();
    let mut session = CvSession::new(&base_url, UploadConstraints::default()).with_chat_config(config);
    let session_id = session.session_id().to_string();

    let response = session.start_generation("Data engineer CV", None).await.unwrap();
    assert_eq!(response.pdf_filename.as_deref(), Some("cv.pdf"));

    let subscription = session.active().expect("generation keeps its subscription");
    assert_eq!(subscription.job_id(), session_id);

    let mut connection = subscription.watch_connection();
    let connected = tokio::time::timeout(Duration::from_secs(5), connection.wait_for(|c| c.connected))
        .await
        .map(|waited| waited.is_ok())
        .unwrap_or(false);
    assert!(connected);
    assert_eq!(recorded.ws_paths(), vec![format!("/ws/progress/{session_id}")]);

    let request = &recorded.http_raw()[0];
    assert!(request.contains("template=default"));
    assert!(request.contains(&format!("session_id={session_id}")));

    session.reset().await;
}

#[tokio::test]
async fn failed_generation_tears_down_the_session_channel() {
    let (base_url, recorded) = spawn_backend(
        Some(HttpReply::json(500, r#"{"detail":"Model unavailable"}"#)),
        |_, mut ws| async move { drain(&mut ws).await },
    )
    .await;

    let mut session = CvSession::new(&base_url, UploadConstraints::default())
        .with_chat_config(ConnectorConfig::chat());

    let err = session
        .start_generation("Data engineer CV", None)
        .await
        .unwrap_err();
    assert_matches!(err, CvApiError::Server { status: 500, .. });
    assert!(session.active().is_none());
    assert_eq!(recorded.http_count(), 1);
}
