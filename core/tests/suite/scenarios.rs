use std::time::Duration;

use bundlesync_core::BundleSnapshot;
use bundlesync_core::BundleState;
use bundlesync_core::ErrorKind;
use bundlesync_core::ViewState;
use bundlesync_core::scheduler::Cadence;
use pretty_assertions::assert_eq;

use crate::common::Call;
use crate::common::FakeBackend;
use crate::common::Reply;
use crate::common::bundle_doc;
use crate::common::directory_info;
use crate::common::file_info;
use crate::common::poll_interval;
use crate::common::private_doc;
use crate::common::run_for;
use crate::common::spawn_engine;
use crate::common::wait_for;

#[tokio::test(start_paused = true)]
async fn running_bundle_polls_until_ready() {
    let backend = FakeBackend::new();
    backend.set_metadata(
        "0xa",
        vec![
            Reply::Ok(bundle_doc("0xa", "running")),
            Reply::Ok(bundle_doc("0xa", "ready")),
        ],
    );
    backend.set_contents("0xa", Reply::Ok(file_info()));
    backend.set_summary("0xa", "/", Reply::Ok("hello".to_string()));

    let (handle, _observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xa").unwrap();

    let running = wait_for(&mut rx, |s| s.metadata.is_some()).await;
    let metadata = running.metadata.as_ref().unwrap();
    assert_eq!(metadata.state, Some(BundleState::Running));
    assert_eq!(
        Cadence::for_metadata(Some(metadata), poll_interval()),
        Cadence::Poll(Duration::from_millis(4000))
    );
    assert!(running.polling);

    let ready = wait_for(&mut rx, BundleSnapshot::is_settled).await;
    assert_eq!(
        ready.metadata.as_ref().unwrap().state,
        Some(BundleState::Ready)
    );
    assert_eq!(backend.calls(Call::Metadata, "0xa"), 2);

    run_for(poll_interval() * 5).await;
    assert_eq!(backend.calls(Call::Metadata, "0xa"), 2);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn file_root_fetches_only_the_root_summary() {
    let backend = FakeBackend::new();
    backend.set_metadata("0xb", vec![Reply::Ok(bundle_doc("0xb", "ready"))]);
    backend.set_contents("0xb", Reply::Ok(file_info()));
    backend.set_summary("0xb", "/", Reply::Ok("line 1\nline 2\n".to_string()));

    let (handle, _observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xb").unwrap();

    let settled = wait_for(&mut rx, BundleSnapshot::is_settled).await;
    assert_eq!(
        settled.content.file_contents.as_deref(),
        Some("line 1\nline 2\n")
    );
    assert_eq!(settled.content.stdout, None);
    assert_eq!(settled.content.stderr, None);

    let paths = backend.summary_paths("0xb");
    assert_eq!(paths.len(), backend.calls(Call::ContentsInfo, "0xb"));
    assert!(paths.iter().all(|path| path == "/"), "{paths:?}");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn directory_root_fetches_present_streams_only() {
    let backend = FakeBackend::new();
    backend.set_metadata("0xc", vec![Reply::Ok(bundle_doc("0xc", "ready"))]);
    backend.set_contents("0xc", Reply::Ok(directory_info(&["stdout", "output.csv"])));
    backend.set_summary("0xc", "/stdout", Reply::Ok("epoch 1 done".to_string()));
    backend.set_summary("0xc", "/stderr", Reply::Ok("never requested".to_string()));

    let (handle, _observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xc").unwrap();

    let settled = wait_for(&mut rx, BundleSnapshot::is_settled).await;
    assert_eq!(settled.content.stdout.as_deref(), Some("epoch 1 done"));
    assert_eq!(settled.content.stderr, None);
    assert_eq!(settled.content.file_contents, None);

    let paths = backend.summary_paths("0xc");
    assert!(!paths.is_empty());
    assert!(paths.iter().all(|path| path == "/stdout"), "{paths:?}");

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn directory_with_both_streams_fetches_both() {
    let backend = FakeBackend::new();
    backend.set_metadata("0xc2", vec![Reply::Ok(bundle_doc("0xc2", "failed"))]);
    backend.set_contents("0xc2", Reply::Ok(directory_info(&["stdout", "stderr"])));
    backend.set_summary("0xc2", "/stdout", Reply::Ok("out".to_string()));
    backend.set_summary("0xc2", "/stderr", Reply::Ok("Traceback".to_string()));

    let (handle, _observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xc2").unwrap();

    let settled = wait_for(&mut rx, BundleSnapshot::is_settled).await;
    assert_eq!(settled.content.stdout.as_deref(), Some("out"));
    assert_eq!(settled.content.stderr.as_deref(), Some("Traceback"));

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn metadata_failure_clears_the_view_and_records_one_error() {
    let backend = FakeBackend::new();
    backend.set_metadata(
        "0xd",
        vec![
            Reply::Ok(bundle_doc("0xd", "running")),
            Reply::Network,
            Reply::Ok(bundle_doc("0xd", "running")),
        ],
    );
    backend.set_contents("0xd", Reply::Ok(file_info()));
    backend.set_summary("0xd", "/", Reply::Ok("partial".to_string()));

    let (handle, observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xd").unwrap();

    wait_for(&mut rx, |s| {
        s.errors
            .iter()
            .any(|record| record.kind == ErrorKind::Metadata)
    })
    .await;

    let snapshots = observer.snapshots();
    let before = snapshots
        .iter()
        .position(|s| !s.errors.is_empty())
        .unwrap();
    let failed = &snapshots[before];
    assert_eq!(failed.metadata, None);
    assert!(failed.content.is_empty(), "{:?}", failed.content);
    assert_eq!(failed.errors.len(), snapshots[before - 1].errors.len() + 1);
    assert_eq!(failed.errors.last().unwrap().bundle_id, "0xd");
    assert_eq!(failed.view(), ViewState::Loading);

    // Polling keeps going and the next success restores the view.
    let recovered = wait_for(&mut rx, |s| s.metadata.is_some()).await;
    assert_eq!(recovered.errors.len(), 1);
    assert!(recovered.polling);

    handle.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn private_bundle_is_restricted_whatever_contents_do() {
    let backend = FakeBackend::new();
    backend.set_metadata("0xe", vec![Reply::Ok(private_doc("0xe"))]);
    backend.set_contents("0xe", Reply::Status(403));

    let (handle, _observer) = spawn_engine(&backend);
    let mut rx = handle.subscribe();
    handle.set_bundle("0xe").unwrap();

    let restricted = wait_for(&mut rx, |s| {
        s.metadata.is_some()
            && s.errors
                .iter()
                .any(|record| record.kind == ErrorKind::ContentsInfo)
    })
    .await;
    assert_eq!(restricted.view(), ViewState::Restricted);
    assert!(restricted.is_restricted());
    assert_eq!(restricted.metadata.as_ref().unwrap().state, None);

    // A withheld state counts as transient.
    assert!(restricted.polling);

    handle.shutdown().await;
}
