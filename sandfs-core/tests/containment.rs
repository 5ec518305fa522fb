//! End-to-end containment checks across the operation facades.

use sandfs_core::error::ErrorCode;
use sandfs_core::ops::{FsService, ListRequest, ReadRequest, SortBy, WriteRequest};
use sandfs_core::roots::RootSet;

fn service_at(root: &std::path::Path) -> FsService {
    FsService::new(RootSet::resolve(&[root.to_path_buf()], false).unwrap())
}

fn read_request(path: String) -> ReadRequest {
    serde_json::from_value(serde_json::json!({ "path": path })).unwrap()
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_into_the_outside_world_is_denied() {
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("passwd"), "root:x:0:0").unwrap();

    let sandbox = tempfile::tempdir().unwrap();
    std::os::unix::fs::symlink(outside.path(), sandbox.path().join("link")).unwrap();

    let service = service_at(sandbox.path());
    let err = service
        .read(
            read_request(format!("{}/link/passwd", sandbox.path().display())),
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[cfg(unix)]
#[tokio::test]
async fn every_listed_entry_stays_inside_the_roots() {
    let sandbox = tempfile::tempdir().unwrap();
    std::fs::create_dir_all(sandbox.path().join("a/b")).unwrap();
    std::fs::write(sandbox.path().join("a/file.txt"), "x").unwrap();
    std::fs::write(sandbox.path().join("a/b/deep.txt"), "y").unwrap();

    let service = service_at(sandbox.path());
    let response = service
        .list(
            ListRequest {
                path: sandbox.path().join("a").to_str().unwrap().to_string(),
                include_hidden: false,
                sort_by: SortBy::Name,
                with_stats: false,
                max_entries: None,
                timeout_ms: None,
            },
            None,
        )
        .await
        .unwrap();

    for entry in &response.entries {
        assert!(service.roots().contains(&entry.absolute_path));
        assert!(entry.absolute_path.is_absolute());
    }
}

#[tokio::test]
async fn dotdot_traversal_is_denied_for_writes() {
    let sandbox = tempfile::tempdir().unwrap();
    let service = service_at(sandbox.path());

    let err = service
        .write(
            WriteRequest {
                path: format!("{}/sub/../../escape.txt", sandbox.path().display()),
                content: "nope".into(),
                timeout_ms: None,
            },
            None,
        )
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::AccessDenied);
}

#[tokio::test]
async fn relative_paths_with_two_roots_are_ambiguous() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    let service = FsService::new(
        RootSet::resolve(&[a.path().to_path_buf(), b.path().to_path_buf()], false).unwrap(),
    );

    let err = service
        .read(read_request("notes.txt".to_string()), None)
        .await
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidInput);
}

#[tokio::test]
async fn either_of_two_roots_is_reachable_absolutely() {
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    std::fs::write(a.path().join("in_a.txt"), "A").unwrap();
    std::fs::write(b.path().join("in_b.txt"), "B").unwrap();

    let service = FsService::new(
        RootSet::resolve(&[a.path().to_path_buf(), b.path().to_path_buf()], false).unwrap(),
    );

    let from_a = service
        .read(read_request(format!("{}/in_a.txt", a.path().display())), None)
        .await
        .unwrap();
    assert_eq!(from_a.content, "A");

    let from_b = service
        .read(read_request(format!("{}/in_b.txt", b.path().display())), None)
        .await
        .unwrap();
    assert_eq!(from_b.content, "B");
}
