//! Upload queue driven end to end through the HTTP uploader

use mavlog_core::config::{KEY_EMAIL, KEY_UPLOAD_URL};
use mavlog_core::{
    AppEvent, AppEventReceiver, CaptureConfig, ChannelConfig, Command, DirectoryStorage,
    LogCoordinator, MemorySettingsStore, SettingsStore, UploadError,
};
use mavlog_runtime::{HttpUploader, RuntimeBuilder, RuntimeHandle};
use mockito::{Matcher, Server};
use std::path::Path;
use tokio::time::{timeout, Duration};

const EMAIL: &str = "pilot@example.com";

fn seed(dir: &Path, name: &str, contents: &str) {
    std::fs::write(dir.join(format!("{}.ulg", name)), contents).unwrap();
}

fn coordinator(dir: &Path, url: &str) -> LogCoordinator {
    let mut store = MemorySettingsStore::new();
    store.set_string(KEY_EMAIL, EMAIL).unwrap();
    store.set_string(KEY_UPLOAD_URL, url).unwrap();
    LogCoordinator::new(
        CaptureConfig::with_log_dir(dir),
        Box::new(store),
        Box::new(DirectoryStorage::new(dir)),
    )
}

async fn start(coordinator: LogCoordinator, select: &[&str]) -> (RuntimeHandle, AppEventReceiver) {
    let mut runtime = RuntimeBuilder::new(coordinator, HttpUploader::new().unwrap())
        .channel_config(ChannelConfig::testing())
        .build_and_start();
    let app_events = runtime.take_app_event_receiver().unwrap();
    for name in select {
        runtime
            .send_command(Command::SetSelected {
                name: name.to_string(),
                selected: true,
            })
            .await
            .unwrap();
    }
    (runtime, app_events)
}

/// Collect app events until `count` upload outcomes have been seen
async fn outcomes(app_events: &mut AppEventReceiver, count: usize) -> Vec<AppEvent> {
    timeout(Duration::from_secs(10), async {
        let mut seen = Vec::new();
        while seen.len() < count {
            match app_events.recv().await {
                Some(event @ AppEvent::UploadSucceeded { .. })
                | Some(event @ AppEvent::UploadFailed { .. }) => seen.push(event),
                Some(_) => {}
                None => panic!("app event channel closed"),
            }
        }
        seen
    })
    .await
    .expect("uploads did not finish")
}

#[tokio::test]
async fn test_selected_logs_uploaded_in_order() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "007-a", "ULG-A");
    seed(dir.path(), "007-b", "ULG-B");

    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .match_header("content-type", Matcher::Regex("multipart/form-data".into()))
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#"name="filearg""#.into()),
            Matcher::Regex(EMAIL.into()),
            Matcher::Regex("mavlog".into()),
        ]))
        .with_status(200)
        .with_body(r#"{"url": "https://logs.example.com/plot_app?log=1"}"#)
        .expect(2)
        .create_async()
        .await;

    let url = format!("{}/upload", server.url());
    let (mut runtime, mut app_events) =
        start(coordinator(dir.path(), &url), &["007-a", "007-b"]).await;
    runtime.send_command(Command::UploadLogs).await.unwrap();

    let seen = outcomes(&mut app_events, 2).await;
    assert_eq!(
        seen,
        vec![
            AppEvent::UploadSucceeded {
                name: "007-a".into()
            },
            AppEvent::UploadSucceeded {
                name: "007-b".into()
            },
        ]
    );
    mock.assert_async().await;

    let coordinator = runtime.shutdown().await.unwrap();
    assert!(!coordinator.uploading());
    for name in ["007-a", "007-b"] {
        let record = coordinator.records().get(name).unwrap();
        assert!(record.uploaded());
        assert!(!record.selected());
        assert_eq!(record.upload_progress(), 1.0);
        assert!(dir.path().join(format!("{}.uploaded", name)).exists());
    }
}

#[tokio::test]
async fn test_rejected_upload_moves_on() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "007-a", "ULG-A");
    seed(dir.path(), "007-b", "ULG-B");

    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .with_status(500)
        .with_body("Internal Server Error")
        .expect(2)
        .create_async()
        .await;

    let url = format!("{}/upload", server.url());
    let (mut runtime, mut app_events) =
        start(coordinator(dir.path(), &url), &["007-a", "007-b"]).await;
    runtime.send_command(Command::UploadLogs).await.unwrap();

    let reason = UploadError::Status { code: 500 }.to_string();
    let seen = outcomes(&mut app_events, 2).await;
    assert_eq!(
        seen,
        vec![
            AppEvent::UploadFailed {
                name: "007-a".into(),
                reason: reason.clone(),
            },
            AppEvent::UploadFailed {
                name: "007-b".into(),
                reason,
            },
        ]
    );
    mock.assert_async().await;

    let coordinator = runtime.shutdown().await.unwrap();
    for name in ["007-a", "007-b"] {
        assert!(!coordinator.records().get(name).unwrap().uploaded());
        assert!(!dir.path().join(format!("{}.uploaded", name)).exists());
    }
}

#[tokio::test]
async fn test_missing_file_fails_without_request() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "007-gone", "ULG");

    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/upload")
        .with_status(200)
        .expect(0)
        .create_async()
        .await;

    let url = format!("{}/upload", server.url());
    let coordinator = coordinator(dir.path(), &url);
    std::fs::remove_file(dir.path().join("007-gone.ulg")).unwrap();

    let (mut runtime, mut app_events) = start(coordinator, &["007-gone"]).await;
    runtime.send_command(Command::UploadLogs).await.unwrap();

    let seen = outcomes(&mut app_events, 1).await;
    let AppEvent::UploadFailed { name, reason } = &seen[0] else {
        panic!("expected a failed upload, got {:?}", seen[0]);
    };
    assert_eq!(name, "007-gone");
    assert!(reason.starts_with("Log file missing"));
    mock.assert_async().await;

    let coordinator = runtime.shutdown().await.unwrap();
    assert!(!coordinator.uploading());
}

#[tokio::test]
async fn test_cancel_aborts_in_flight_upload() {
    let dir = tempfile::tempdir().unwrap();
    seed(dir.path(), "007-a", "ULG-A");
    seed(dir.path(), "007-b", "ULG-B");

    // Accepts connections and never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let url = format!("http://{}/upload", addr);
    let (mut runtime, mut app_events) =
        start(coordinator(dir.path(), &url), &["007-a", "007-b"]).await;
    runtime.send_command(Command::UploadLogs).await.unwrap();

    timeout(Duration::from_secs(10), async {
        while let Some(event) = app_events.recv().await {
            if event == (AppEvent::UploadingChanged { uploading: true }) {
                break;
            }
        }
    })
    .await
    .unwrap();
    runtime.send_command(Command::CancelUpload).await.unwrap();

    let seen = outcomes(&mut app_events, 1).await;
    assert_eq!(
        seen,
        vec![AppEvent::UploadFailed {
            name: "007-a".into(),
            reason: UploadError::Aborted.to_string(),
        }]
    );

    let coordinator = runtime.shutdown().await.unwrap();
    assert!(!coordinator.uploading());
    assert_eq!(coordinator.selected_count(), 0);
    assert!(!coordinator.records().get("007-b").unwrap().uploaded());
}
