//! Partial-read reconstruction and write/patch round trips.

use sandfs_core::cancel::OperationSignal;
use sandfs_core::io::{read_head, read_tail};
use sandfs_core::ops::{ChecksumRequest, FsService, PatchRequest, WriteRequest};
use sandfs_core::roots::RootSet;

fn service_at(root: &std::path::Path) -> FsService {
    FsService::new(RootSet::resolve(&[root.to_path_buf()], false).unwrap())
}

/// head(f, N) + tail(f, lineCount - N) rebuilds the file for every split.
#[tokio::test]
async fn head_plus_tail_reconstructs_at_every_split() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mixed.txt");
    let content = "first line\nsecond ünïcode line\nthird\n\nfifth after blank\nlast ünë\n";
    let line_count = 6usize;
    std::fs::write(&path, content).unwrap();

    let signal = OperationSignal::never();
    for split in 0..=line_count {
        let head = read_head(&path, split, u64::MAX, &signal).await.unwrap();
        let tail = read_tail(&path, line_count - split, u64::MAX, &signal)
            .await
            .unwrap();

        let mut lines = head.lines;
        lines.extend(tail.lines);
        let rebuilt: String = lines.iter().map(|l| format!("{l}\n")).collect();
        assert_eq!(rebuilt, content, "split at {split}");
    }
}

#[tokio::test]
async fn checksums_are_stable_across_write_paths() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_at(dir.path());

    // Write the same content twice through the atomic writer.
    for name in ["one.bin", "two.bin"] {
        service
            .write(
                WriteRequest {
                    path: format!("{}/{name}", dir.path().display()),
                    content: "Hello World".into(),
                    timeout_ms: None,
                },
                None,
            )
            .await
            .unwrap();
    }

    let response = service
        .checksum(
            serde_json::from_value::<ChecksumRequest>(serde_json::json!({
                "paths": [
                    format!("{}/one.bin", dir.path().display()),
                    format!("{}/two.bin", dir.path().display()),
                ],
                "algorithm": "md5",
            }))
            .unwrap(),
            None,
        )
        .await
        .unwrap();

    let a = response.entries[0].digest.as_ref().unwrap();
    let b = response.entries[1].digest.as_ref().unwrap();
    assert_eq!(a, "b10a8db164e0754105b7a99be72e3fe5");
    assert_eq!(a, b);
}

#[tokio::test]
async fn write_patch_read_cycle_is_consistent() {
    let dir = tempfile::tempdir().unwrap();
    let service = service_at(dir.path());
    let path = format!("{}/cycle.txt", dir.path().display());

    service
        .write(
            WriteRequest {
                path: path.clone(),
                content: "alpha\nbeta\ngamma\n".into(),
                timeout_ms: None,
            },
            None,
        )
        .await
        .unwrap();

    let patched = service
        .patch(
            PatchRequest {
                path: path.clone(),
                diff: "@@ -1,3 +1,3 @@\n alpha\n-beta\n+BETA\n gamma\n".into(),
                fuzz: None,
                dry_run: false,
                timeout_ms: None,
            },
            None,
        )
        .await
        .unwrap();
    assert!(patched.applied);

    let read = service
        .read(
            serde_json::from_value(serde_json::json!({ "path": path })).unwrap(),
            None,
        )
        .await
        .unwrap();
    assert_eq!(read.content, "alpha\nBETA\ngamma\n");

    // No temp droppings from the two atomic writes.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}
