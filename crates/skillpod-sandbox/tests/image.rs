//! Image resolution order: present → pull → build.

mod common;

use std::path::PathBuf;
use std::sync::Arc;

use common::*;
use skillpod_sandbox::fakes::{FakeRuntime, RuntimeCall};
use skillpod_sandbox::image::{ImageAvailability, ImageResolver, ImageSpec};
use skillpod_sandbox::runtime::ContainerRuntime;
use skillpod_sandbox::SandboxError;

#[tokio::test]
async fn test_present_image_needs_no_network() {
    let fake = Arc::new(FakeRuntime::new().with_image(IMAGE));

    let availability = resolver(&fake).resolve().await.unwrap();

    assert_eq!(availability, ImageAvailability::Present);
    assert_eq!(fake.calls(), vec![RuntimeCall::ImageExists(IMAGE.to_string())]);
}

#[tokio::test]
async fn test_missing_image_is_pulled() {
    let fake = Arc::new(FakeRuntime::new());

    let availability = resolver(&fake).resolve().await.unwrap();

    assert_eq!(availability, ImageAvailability::Pulled);
    assert!(fake.has_image(IMAGE));
    assert!(!fake.calls().iter().any(|c| matches!(c, RuntimeCall::Build { .. })));
}

#[tokio::test]
async fn test_failed_pull_falls_back_to_build() {
    let fake = Arc::new(FakeRuntime::new().failing_pull());

    let availability = resolver(&fake).resolve().await.unwrap();

    assert_eq!(availability, ImageAvailability::Built);
    assert_eq!(
        fake.calls(),
        vec![
            RuntimeCall::ImageExists(IMAGE.to_string()),
            RuntimeCall::Pull(IMAGE.to_string()),
            RuntimeCall::Build {
                image: IMAGE.to_string(),
                context: PathBuf::from(CONTEXT),
                dockerfile: None,
            },
        ]
    );
}

#[tokio::test]
async fn test_failed_build_is_fatal() {
    let fake = Arc::new(FakeRuntime::new().failing_pull().failing_build());

    let err = resolver(&fake).resolve().await.unwrap_err();

    match err {
        SandboxError::ImageResolutionFailed { image, reason } => {
            assert_eq!(image, IMAGE);
            assert!(reason.contains("pull failed"));
            assert!(reason.contains(CONTEXT));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_missing_build_context_fails_without_building() {
    let fake = Arc::new(FakeRuntime::new().failing_pull());
    let runtime: Arc<dyn ContainerRuntime> = fake.clone();
    let resolver = ImageResolver::new(
        runtime,
        ImageSpec {
            reference: IMAGE.to_string(),
            operator_supplied: false,
        },
        None,
    );

    let err = resolver.resolve().await.unwrap_err();

    match err {
        SandboxError::ImageResolutionFailed { reason, .. } => {
            assert!(reason.contains("SKILLPOD_BUILD_CONTEXT"));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fake.calls().iter().any(|c| matches!(c, RuntimeCall::Build { .. })));
}

#[tokio::test]
async fn test_unavailable_runtime_is_not_a_pull_failure() {
    let fake = Arc::new(FakeRuntime::unavailable());

    let err = resolver(&fake).resolve().await.unwrap_err();

    assert!(matches!(err, SandboxError::RuntimeUnavailable(_)));
    assert_eq!(fake.calls().len(), 1);
}

#[tokio::test]
async fn test_prewarm_swallows_failures() {
    let fake = Arc::new(FakeRuntime::new().failing_pull().failing_build());

    let handle = resolver(&fake).prewarm();

    assert!(handle.await.is_ok());
    assert!(!fake.has_image(IMAGE));
}

#[tokio::test]
async fn test_prewarm_then_resolve_does_not_pull_twice() {
    let fake = Arc::new(FakeRuntime::new());
    let resolver = resolver(&fake);

    let handle = resolver.prewarm();
    let availability = resolver.resolve().await.unwrap();
    handle.await.unwrap();

    assert!(matches!(
        availability,
        ImageAvailability::Present | ImageAvailability::Pulled
    ));
    let pulls = fake
        .calls()
        .iter()
        .filter(|c| matches!(c, RuntimeCall::Pull(_)))
        .count();
    assert_eq!(pulls, 1);
}
