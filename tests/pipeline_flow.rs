// End-to-end flows through the coordinator against a scripted engine
//
// Run with: cargo test --test pipeline_flow

#![cfg(unix)]

#[path = "common/mod.rs"]
mod common;

use common::assertions::{assert_delete_counts, assert_failed_with_zero_counts};
use common::fake_engine::{EngineResponse, FakeEngine};
use seve_clear::report::ClearanceExport;
use seve_clear::{
    Confirmation, FailureKind, OperationCoordinator, OperationOutcome, PipelineError, ReportKind,
    WipeLevel, WipePattern,
};
use serde_json::json;

fn drive_info(removable: bool, os: bool, media: &str, bus: &str) -> EngineResponse {
    EngineResponse::json(json!({
        "success": true,
        "data": {
            "IsRemovable": removable,
            "IsOS": os,
            "MediaType": media,
            "BusType": bus
        }
    }))
}

#[tokio::test]
async fn test_delete_batch_continues_past_missing_file() {
    let engine = FakeEngine::new();
    let coordinator = OperationCoordinator::new(engine.install());

    let first = engine.file("first.txt", "alpha");
    let missing = engine.dir().join("gone.txt").to_string_lossy().into_owned();
    let third = engine.file("third.txt", "gamma");
    for path in [&first, &missing, &third] {
        assert!(coordinator.select(path));
    }

    let report = coordinator.delete_selected(Confirmation::assumed()).await.unwrap();

    assert_eq!(report.operation, ReportKind::DeleteSelected);
    assert_delete_counts(&report, 3, 2, 1);
    let failed: Vec<_> = report.failed_items().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].path, missing);
    assert_eq!(failed[0].error.as_deref(), Some("Not found"));
    assert!(!std::path::Path::new(&first).exists());
    assert!(!std::path::Path::new(&third).exists());

    // Only the survivor stays selected
    assert_eq!(coordinator.selection(), vec![missing]);
}

#[tokio::test]
async fn test_failed_wipe_still_produces_report() {
    let engine = FakeEngine::new()
        .respond("--get-drive-info", drive_info(false, false, "HDD", "SATA"))
        .respond(
            "--wipe",
            EngineResponse::failure("Access denied", 5).with_progress(&[(10, "Starting")]),
        );
    let coordinator = OperationCoordinator::new(engine.install());

    let report = coordinator
        .wipe_drive("/dev/sdb", WipePattern::Random, Confirmation::assumed())
        .await
        .unwrap();

    assert_failed_with_zero_counts(&report, FailureKind::NonZeroExit);
    assert_eq!(report.operation, ReportKind::Wipe(WipeLevel::Purge));
    assert!(report.error.as_deref().unwrap_or("").contains("Access denied"));
    assert!(coordinator.current_report().is_some());
}

#[tokio::test]
async fn test_internal_data_drives_get_purge_level() {
    let cases = [
        ("SSD", "NVMe"),
        ("HDD", "SATA"),
        ("Unspecified", "SAS"),
        ("SSD", "RAID"),
    ];

    for (media, bus) in cases {
        let engine = FakeEngine::new()
            .respond("--get-drive-info", drive_info(false, false, media, bus))
            .respond(
                "--wipe",
                EngineResponse::json(json!({"success": true, "bytes_written": 512, "files_created": 1})),
            );
        let coordinator = OperationCoordinator::new(engine.install());

        let report = coordinator
            .wipe_drive("/dev/sdc", WipePattern::Zeros, Confirmation::assumed())
            .await
            .unwrap();

        assert!(report.success, "{}/{} wipe failed: {:?}", media, bus, report.error);
        let wipe_call = engine
            .calls()
            .into_iter()
            .find(|c| c.starts_with("--wipe"))
            .expect("wipe was invoked");
        assert_eq!(
            wipe_call, "--wipe --level 2 --drive /dev/sdc --pattern zeros",
            "unexpected level for {}/{}",
            media, bus
        );
    }
}

#[tokio::test]
async fn test_os_volume_overrides_removable() {
    let engine = FakeEngine::new()
        .respond("--get-drive-info", drive_info(true, true, "SSD", "USB"))
        .respond(
            "--wipe",
            EngineResponse::json(json!({"success": true, "bytes_written": 0})),
        );
    let coordinator = OperationCoordinator::new(engine.install());

    let report = coordinator
        .wipe_drive("/", WipePattern::Zeros, Confirmation::assumed())
        .await
        .unwrap();

    assert_eq!(report.operation, ReportKind::Wipe(WipeLevel::OsVolumeClear));
    assert!(engine.calls().iter().any(|c| c.contains("--level 3")));
}

#[tokio::test]
async fn test_wipe_without_bytes_written_is_rejected() {
    let engine = FakeEngine::new()
        .respond("--get-drive-info", drive_info(true, false, "Unspecified", "USB"))
        .respond("--wipe", EngineResponse::json(json!({"success": true, "files_created": 4})));
    let coordinator = OperationCoordinator::new(engine.install());

    let report = coordinator
        .wipe_drive("/dev/sdd", WipePattern::Zeros, Confirmation::assumed())
        .await
        .unwrap();

    assert_failed_with_zero_counts(&report, FailureKind::EngineRejected);
    assert_eq!(report.operation, ReportKind::Wipe(WipeLevel::Removable));
}

#[tokio::test]
async fn test_exported_report_reloads_identically() {
    let engine = FakeEngine::new()
        .respond("--get-drive-info", drive_info(true, false, "Unspecified", "USB"))
        .respond(
            "--wipe",
            EngineResponse::json(json!({
                "success": true,
                "bytes_written": 1048576,
                "files_created": 3,
                "files": [
                    {"path": "/mnt/usb/a/f1.bin", "size": 1024},
                    {"path": "/mnt/usb/a/f2.bin", "size": 2048},
                    {"path": "/mnt/usb/b/f3.bin", "size": 4096}
                ]
            }))
            .with_progress(&[(40, "Wrote 524288 bytes (1 files)"), (100, "Done")]),
        );
    let coordinator = OperationCoordinator::new(engine.install());
    let report = coordinator
        .wipe_drive("/mnt/usb", WipePattern::Zeros, Confirmation::assumed())
        .await
        .unwrap();
    assert!(report.success);
    assert_eq!(report.folders.len(), 2);

    let out = engine.dir().join("report.json");
    let exported = coordinator.export_report(&out).unwrap();
    let loaded = ClearanceExport::load(&out).unwrap();

    assert_eq!(loaded.kind, ClearanceExport::TYPE);
    assert_eq!(loaded.report, report);
    assert_eq!(loaded.report, exported.report);
}

#[tokio::test]
async fn test_free_space_wipe_follows_delete() {
    let probe = FakeEngine::new();
    let root = probe.dir().to_string_lossy().into_owned();
    let engine = FakeEngine::new()
        .respond("--list-drives", EngineResponse::json(json!({ "drives": [root] })))
        .respond(
            "--wipe",
            EngineResponse::json(json!({"success": true, "bytes_written": 8192, "files_created": 2})),
        );
    let coordinator = OperationCoordinator::new(engine.install());

    let drives = coordinator.list_drives().await;
    assert!(drives.is_success());

    let file = probe.file("secret.txt", "shh");
    coordinator.select(&file);
    let delete = coordinator.delete_selected(Confirmation::assumed()).await.unwrap();
    assert_delete_counts(&delete, 1, 1, 0);

    let offer = coordinator.free_space_wipe_offer().expect("offer after delete");
    assert_eq!(offer.drive(), root);
    assert_eq!(offer.level(), WipeLevel::FreeSpace);

    let wipe = coordinator
        .free_space_wipe(&offer, Confirmation::assumed())
        .await
        .unwrap();
    assert!(wipe.success);
    assert_eq!(wipe.supersedes, Some(delete.id));
    assert_eq!(coordinator.current_report().map(|r| r.id), Some(wipe.id));

    let expected = format!("--wipe --level 5 --drive {} --pattern zeros", root);
    assert!(
        engine.calls().contains(&expected),
        "calls were {:?}",
        engine.calls()
    );
}

#[tokio::test]
async fn test_pending_report_blocks_next_wipe() {
    let engine = FakeEngine::new()
        .respond("--get-drive-info", drive_info(true, false, "Unspecified", "USB"))
        .respond("--wipe", EngineResponse::json(json!({"success": true, "bytes_written": 1})));
    let coordinator = OperationCoordinator::new(engine.install());

    coordinator
        .wipe_drive("/dev/sde", WipePattern::Zeros, Confirmation::assumed())
        .await
        .unwrap();
    let err = coordinator
        .wipe_drive("/dev/sde", WipePattern::Zeros, Confirmation::assumed())
        .await
        .unwrap_err();
    assert!(matches!(err, PipelineError::ReportPending));

    coordinator.discard_report().unwrap();
    assert!(coordinator
        .wipe_drive("/dev/sde", WipePattern::Zeros, Confirmation::assumed())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_missing_engine_script_is_not_found() {
    let engine = FakeEngine::new();
    let mut config = engine.install();
    config.engine.scanner_script = Some(engine.dir().join("absent.py"));
    let coordinator = OperationCoordinator::new(config);

    match coordinator.list_drives().await {
        OperationOutcome::Failure(failure) => {
            assert_eq!(failure.kind, FailureKind::NotFound);
            assert!(failure.message.contains("absent.py"));
        }
        other => panic!("expected NotFound, got {:?}", other),
    }
}
