//! End-to-end install flows against a mock GitHub.

mod common;

use common::{REPO, api, asset, latest_release, tar_gz_archive, zip_archive};
use relfetch::install::{read_record, record_path, write_record};
use relfetch::{FetchError, InstallOutcome};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn fresh_install_extracts_zip_and_records_tag() {
    let server = MockServer::start().await;
    latest_release("v2.0.0", &[]).expect(1).mount(&server).await;
    asset(
        "v2.0.0",
        "asset-v2.0.0.zip",
        zip_archive(&[("bin/tool", b"#!/bin/sh\n"), ("README", b"hello")]),
    )
    .expect(1)
    .mount(&server)
    .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    let outcome = api(&server, &target)
        .repo(REPO)
        .latest()
        .install(|tag| format!("asset-{tag}.zip"))
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::Installed { tag: "v2.0.0".into() });
    assert_eq!(std::fs::read(target.join("bin/tool")).unwrap(), b"#!/bin/sh\n");
    assert_eq!(std::fs::read(target.join("README")).unwrap(), b"hello");
    assert!(!target.join("asset-v2.0.0.zip").exists());

    let raw: serde_json::Value =
        serde_json::from_slice(&std::fs::read(record_path(&target)).unwrap()).unwrap();
    assert_eq!(raw, serde_json::json!({"tag_name": "v2.0.0", "repo": REPO}));
}

#[tokio::test]
async fn current_install_resolves_once_and_downloads_nothing() {
    let server = MockServer::start().await;
    latest_release("v1.0.0", &[]).expect(1).mount(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/{REPO}/releases/download/v1.0.0/asset-v1.0.0.zip")))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "v1.0.0", REPO).unwrap();
    std::fs::write(dir.path().join("payload"), b"unchanged").unwrap();

    let outcome = api(&server, dir.path())
        .repo(REPO)
        .latest()
        .install(|tag| format!("asset-{tag}.zip"))
        .await
        .unwrap();

    assert_eq!(outcome, InstallOutcome::Current { tag: "v1.0.0".into() });
    assert_eq!(std::fs::read(dir.path().join("payload")).unwrap(), b"unchanged");
}

#[tokio::test]
async fn upgrade_replaces_directory_with_stripped_tarball() {
    let server = MockServer::start().await;
    latest_release("v1.1.0", &[]).mount(&server).await;
    asset(
        "v1.1.0",
        "tool-v1.1.0.tar.gz",
        tar_gz_archive("tool-v1.1.0", &[("bin/tool", b"new"), ("LICENSE", b"MIT")]),
    )
    .expect(1)
    .mount(&server)
    .await;

    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("tool");
    write_record(&target, "v1.0.0", REPO).unwrap();
    std::fs::write(target.join("old-only"), b"stale").unwrap();

    let outcome = api(&server, &target)
        .repo(REPO)
        .latest()
        .install(|tag| format!("tool-{tag}.tar.gz"))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        InstallOutcome::Upgraded {
            from: "v1.0.0".into(),
            to: "v1.1.0".into()
        }
    );
    assert_eq!(std::fs::read(target.join("bin/tool")).unwrap(), b"new");
    assert_eq!(std::fs::read(target.join("LICENSE")).unwrap(), b"MIT");
    assert!(!target.join("old-only").exists());
    assert!(!target.join("tool-v1.1.0").exists());
    assert!(!target.join("tool-v1.1.0.tar.gz").exists());
    assert_eq!(read_record(&target).unwrap().tag, "v1.1.0");
}

#[tokio::test]
async fn pinned_install_skips_the_api() {
    let server = MockServer::start().await;
    latest_release("v9.0.0", &[]).expect(0).mount(&server).await;
    asset("b1234", "raw.bin", b"payload".to_vec())
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let api = api(&server, dir.path());

    for _ in 0..2 {
        api.repo(REPO)
            .version("b1234")
            .install(|_| "raw.bin".to_owned())
            .await
            .unwrap();
    }

    assert_eq!(std::fs::read(dir.path().join("raw.bin")).unwrap(), b"payload");
    assert_eq!(read_record(dir.path()).unwrap().tag, "b1234");
}

#[tokio::test]
async fn resolution_gives_up_after_retry_count() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/repos/{REPO}/releases/latest")))
        .respond_with(ResponseTemplate::new(502))
        .expect(2)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let err = api(&server, dir.path())
        .repo(REPO)
        .latest()
        .install(|tag| format!("asset-{tag}.zip"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::ResolveFailed { attempts: 2, .. }));
    assert!(!record_path(dir.path()).exists());
}

#[tokio::test]
async fn foreign_install_is_left_alone() {
    let server = MockServer::start().await;
    latest_release("v2.0.0", &[]).expect(0).mount(&server).await;

    let dir = tempfile::tempdir().unwrap();
    write_record(dir.path(), "v1.0.0", "someone/else").unwrap();

    let err = api(&server, dir.path())
        .repo(REPO)
        .latest()
        .install(|tag| format!("asset-{tag}.zip"))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::RepoMismatch { .. }));
    assert_eq!(read_record(dir.path()).unwrap().repo, "someone/else");
}
