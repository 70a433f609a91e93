//! App event delivery when observers fall behind

use mavlog_core::config::KEY_EMAIL;
use mavlog_core::{
    AppEvent, CaptureConfig, ChannelConfig, Command, DirectoryStorage, Event, EventSender,
    LogCoordinator, MemorySettingsStore, SettingsStore, UploadOutcome, UploadRequest,
};
use mavlog_runtime::{LogUploader, RuntimeBuilder};
use tokio::time::{timeout, Duration};

/// Reports a burst of progress, then success, without touching the network
struct BurstUploader {
    reports: u64,
}

impl LogUploader for BurstUploader {
    fn begin(&mut self, request: UploadRequest, events: EventSender) {
        let reports = self.reports;
        tokio::spawn(async move {
            for sent in 1..=reports {
                let progress = Event::UploadProgress {
                    name: request.name.clone(),
                    bytes_sent: sent,
                    bytes_total: reports,
                };
                if events.send(progress).await.is_err() {
                    return;
                }
            }
            let _ = events
                .send(Event::UploadFinished {
                    name: request.name,
                    outcome: UploadOutcome::Response {
                        status: 200,
                        body: String::new(),
                    },
                })
                .await;
        });
    }

    fn abort(&mut self) {}
}

#[tokio::test]
async fn test_full_app_channel_keeps_lifecycle_events() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("001-a.ulg"), b"ULog").unwrap();
    let mut store = MemorySettingsStore::new();
    store.set_string(KEY_EMAIL, "pilot@example.com").unwrap();
    let coordinator = LogCoordinator::new(
        CaptureConfig::with_log_dir(dir.path()),
        Box::new(store),
        Box::new(DirectoryStorage::new(dir.path())),
    );

    let reports = 200;
    let mut runtime = RuntimeBuilder::new(coordinator, BurstUploader { reports })
        .channel_config(ChannelConfig {
            command_buffer_size: 16,
            event_buffer_size: 16,
            app_event_buffer_size: 2,
        })
        .build_and_start();
    let mut app_events = runtime.take_app_event_receiver().unwrap();

    runtime
        .send_command(Command::SetSelected {
            name: "001-a".into(),
            selected: true,
        })
        .await
        .unwrap();
    runtime.send_command(Command::UploadLogs).await.unwrap();
    // Nobody reads while the burst is processed
    tokio::time::sleep(Duration::from_millis(200)).await;

    let received = timeout(Duration::from_secs(10), async {
        let mut received = Vec::new();
        while let Some(event) = app_events.recv().await {
            let done = event == AppEvent::UploadingChanged { uploading: false };
            received.push(event);
            if done {
                break;
            }
        }
        received
    })
    .await
    .expect("upload lifecycle never completed");

    let lifecycle: Vec<&AppEvent> = received
        .iter()
        .filter(|e| {
            matches!(
                e,
                AppEvent::UploadingChanged { .. } | AppEvent::UploadSucceeded { .. }
            )
        })
        .collect();
    assert_eq!(
        lifecycle,
        vec![
            &AppEvent::UploadingChanged { uploading: true },
            &AppEvent::UploadSucceeded {
                name: "001-a".into()
            },
            &AppEvent::UploadingChanged { uploading: false },
        ]
    );
    assert!(received.iter().filter(|e| e.is_progress()).count() < reports as usize);

    let coordinator = runtime.shutdown().await.unwrap();
    assert!(coordinator.records().get("001-a").unwrap().uploaded());
}
