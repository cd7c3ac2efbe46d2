mod common;

use common::{MockRegistry, blob_path, layer};
use docker_image_runner::cli::{RunRequest, Runner};
use docker_image_runner::config::RunConfig;
use docker_image_runner::error::RunnerError;
use docker_image_runner::image::{DigestUtils, ImageReference};
use docker_image_runner::runtime::ExitOutcome;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

fn runner(registry: &MockRegistry, root_parent: &Path) -> Runner {
    Runner::new(RunConfig {
        registry: registry.config(),
        quiet: true,
        root_parent: Some(root_parent.to_path_buf()),
        isolate: false,
        ..RunConfig::default()
    })
}

fn request(image: &str, command: &str, args: &[&str]) -> RunRequest {
    RunRequest {
        image: ImageReference::parse(image).unwrap(),
        command: PathBuf::from(command),
        args: args.iter().map(|a| a.to_string()).collect(),
    }
}

fn is_empty_dir(path: &Path) -> bool {
    fs::read_dir(path).unwrap().next().is_none()
}

#[tokio::test]
async fn test_layers_are_applied_in_manifest_order() {
    let base = layer(&[
        ("etc/motd", b"base\n", 0o644),
        ("bin/tool", b"#!/bin/sh\nexit 0\n", 0o755),
    ]);
    let top = layer(&[("etc/motd", b"top\n", 0o600), ("etc/extra", b"x", 0o644)]);
    let layers = vec![base.clone(), top.clone()];

    let registry = MockRegistry::builder()
        .token("pull-token")
        .manifest("busybox", "latest", &layers)
        .blobs("busybox", &layers)
        .start()
        .await;
    let root = tempfile::tempdir().unwrap();

    let stats = runner(&registry, root.path())
        .prepare_root(&request("busybox", "/bin/tool", &[]), root.path())
        .await
        .unwrap();

    assert_eq!(stats.files, 4);
    assert_eq!(fs::read(root.path().join("etc/motd")).unwrap(), b"top\n");
    assert_eq!(fs::read(root.path().join("etc/extra")).unwrap(), b"x");
    let tool_mode = fs::metadata(root.path().join("bin/tool"))
        .unwrap()
        .permissions()
        .mode();
    assert_eq!(tool_mode & 0o777, 0o755);

    assert_eq!(
        registry.paths(),
        vec![
            "/token".to_string(),
            "/v2/library/busybox/manifests/latest".to_string(),
            blob_path("busybox", &DigestUtils::compute_docker_digest(&base)),
            blob_path("busybox", &DigestUtils::compute_docker_digest(&top)),
        ]
    );
}

#[tokio::test]
async fn test_requests_carry_scope_token_and_accept_header() {
    let layers = vec![layer(&[("bin/tool", b"x", 0o755)])];
    let registry = MockRegistry::builder()
        .token("pull-token")
        .manifest("busybox", "latest", &layers)
        .blobs("busybox", &layers)
        .start()
        .await;
    let root = tempfile::tempdir().unwrap();

    runner(&registry, root.path())
        .prepare_root(&request("busybox", "/bin/tool", &[]), root.path())
        .await
        .unwrap();

    let requests = registry.requests();
    let token_query = requests[0].query.clone().unwrap();
    let pairs: Vec<(String, String)> = url::form_urlencoded::parse(token_query.as_bytes())
        .into_owned()
        .collect();
    assert!(pairs.contains(&("service".to_string(), "registry.docker.io".to_string())));
    assert!(pairs.contains(&(
        "scope".to_string(),
        "repository:library/busybox:pull".to_string()
    )));
    assert_eq!(requests[0].authorization, None);

    for request in &requests[1..] {
        assert_eq!(request.authorization.as_deref(), Some("Bearer pull-token"));
    }
    assert_eq!(
        requests[1].accept.as_deref(),
        Some("application/vnd.docker.distribution.manifest.v2+json")
    );
}

#[tokio::test]
async fn test_tag_selects_manifest_and_missing_manifest_aborts() {
    let registry = MockRegistry::builder().token("t").start().await;
    let root = tempfile::tempdir().unwrap();

    let result = runner(&registry, root.path())
        .prepare_root(&request("alpine:3.19", "/bin/sh", &[]), root.path())
        .await;

    assert!(matches!(result, Err(RunnerError::Manifest(_))));
    assert_eq!(
        registry.paths(),
        vec!["/token", "/v2/library/alpine/manifests/3.19"]
    );
}

#[tokio::test]
async fn test_token_failure_stops_before_manifest() {
    let registry = MockRegistry::builder()
        .route("/token", 401, "denied")
        .start()
        .await;
    let root = tempfile::tempdir().unwrap();

    let result = runner(&registry, root.path())
        .prepare_root(&request("busybox", "/bin/sh", &[]), root.path())
        .await;

    assert!(matches!(result, Err(RunnerError::Auth(_))));
    assert_eq!(registry.paths(), vec!["/token"]);
}

#[tokio::test]
async fn test_blob_failure_aborts_and_removes_root() {
    let first = layer(&[("a", b"1", 0o644)]);
    let second = layer(&[("b", b"2", 0o644)]);
    let third = layer(&[("c", b"3", 0o644)]);
    let layers = vec![first.clone(), second.clone(), third];

    let registry = MockRegistry::builder()
        .token("t")
        .manifest("busybox", "latest", &layers)
        .blobs("busybox", &[first])
        .route(
            &blob_path("busybox", &DigestUtils::compute_docker_digest(&second)),
            500,
            "boom",
        )
        .start()
        .await;
    let parent = tempfile::tempdir().unwrap();

    let result = runner(&registry, parent.path())
        .run(&request("busybox", "/bin/sh", &["-c", "exit 0"]))
        .await;

    assert!(matches!(result, Err(RunnerError::Layer(_))));
    assert_eq!(registry.paths().len(), 4);
    assert!(is_empty_dir(parent.path()));
}

#[tokio::test]
async fn test_corrupt_layer_is_a_layer_error() {
    let layers = vec![b"this is not gzip".to_vec()];
    let registry = MockRegistry::builder()
        .token("t")
        .manifest("busybox", "latest", &layers)
        .blobs("busybox", &layers)
        .start()
        .await;
    let parent = tempfile::tempdir().unwrap();

    let result = runner(&registry, parent.path())
        .run(&request("busybox", "/bin/sh", &[]))
        .await;

    assert!(matches!(result, Err(RunnerError::Layer(_))));
    assert!(is_empty_dir(parent.path()));
}

#[tokio::test]
async fn test_digest_verification_rejects_tampered_blob() {
    let genuine = layer(&[("a", b"1", 0o644)]);
    let tampered = layer(&[("a", b"2", 0o644)]);
    let registry = MockRegistry::builder()
        .token("t")
        .manifest("busybox", "latest", &[genuine.clone()])
        .route(
            &blob_path("busybox", &DigestUtils::compute_docker_digest(&genuine)),
            200,
            tampered,
        )
        .start()
        .await;
    let root = tempfile::tempdir().unwrap();

    let runner = Runner::new(RunConfig {
        registry: registry.config(),
        quiet: true,
        verify_digests: true,
        ..RunConfig::default()
    });
    let result = runner
        .prepare_root(&request("busybox", "/bin/sh", &[]), root.path())
        .await;

    assert!(matches!(result, Err(RunnerError::DigestMismatch { .. })));
    assert!(!root.path().join("a").exists());
}

#[tokio::test]
async fn test_run_propagates_exit_code_and_cleans_up() {
    let layers = vec![layer(&[("etc/hostname", b"container\n", 0o644)])];
    let registry = MockRegistry::builder()
        .token("t")
        .manifest("busybox", "latest", &layers)
        .blobs("busybox", &layers)
        .start()
        .await;
    let parent = tempfile::tempdir().unwrap();

    let outcome = runner(&registry, parent.path())
        .run(&request("busybox", "/bin/sh", &["-c", "exit 7"]))
        .await
        .unwrap();

    assert_eq!(outcome, ExitOutcome::Exited(7));
    assert_eq!(outcome.exit_code(), 7);
    assert!(is_empty_dir(parent.path()));
}
