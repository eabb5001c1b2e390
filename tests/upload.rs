mod common;

use std::collections::BTreeSet;
use std::fs;

use assert_matches::assert_matches;

use histo_dicom_uploader::builder::DicomBuilder;
use histo_dicom_uploader::domain::UidRoot;
use histo_dicom_uploader::error::UploaderError;
use histo_dicom_uploader::pacs::existing_sop_instance_uids;
use histo_dicom_uploader::store::Store;
use histo_dicom_uploader::upload::{FileOutcome, Uploader};

use common::{MockPacs, RecordingSink, Workspace, record};

fn build(workspace: &Workspace, entries: &[(&str, &str)]) -> Store {
    let store = Store::new(&workspace.settings);
    let builder = DicomBuilder::new(store.clone(), UidRoot::default());
    for (src, uid) in entries {
        workspace.write_image(src, 2, 2);
        builder.build(&record(src, uid)).unwrap();
    }
    store
}

#[test]
fn single_new_file_is_posted_once() {
    let workspace = Workspace::new();
    let store = build(&workspace, &[("a.jpg", "1")]);
    let pacs = MockPacs::default();

    let report = Uploader::new(&store, &pacs)
        .upload(&BTreeSet::new(), &RecordingSink::default())
        .unwrap();

    assert_eq!(pacs.store_call_count(), 1);
    assert_eq!(report.uploaded, 1);
    let posted = pacs.stored.lock().unwrap();
    let on_disk = fs::read(workspace.dicom_dir().join("a.dcm").as_std_path()).unwrap();
    assert_eq!(posted[0], on_disk);
}

#[test]
fn files_already_on_pacs_are_never_posted() {
    let workspace = Workspace::new();
    let store = build(&workspace, &[("a.jpg", "1"), ("b.jpg", "2")]);
    let pacs = MockPacs::default();
    let existing = BTreeSet::from(["1.2.826.0.1.3680043.1".to_string()]);

    let report = Uploader::new(&store, &pacs)
        .upload(&existing, &RecordingSink::default())
        .unwrap();

    assert_eq!(pacs.store_call_count(), 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.files[0].file, "a.dcm");
    assert_eq!(report.files[0].outcome, FileOutcome::Skipped);
    assert_eq!(report.files[1].outcome, FileOutcome::Uploaded);
}

#[test]
fn failed_upload_does_not_stop_the_batch() {
    let workspace = Workspace::new();
    let store = build(&workspace, &[("a.jpg", "1"), ("b.jpg", "2")]);
    let pacs = MockPacs {
        failing_stores: BTreeSet::from([0]),
        ..MockPacs::default()
    };
    let sink = RecordingSink::default();

    let report = Uploader::new(&store, &pacs)
        .upload(&BTreeSet::new(), &sink)
        .unwrap();

    assert_eq!(pacs.store_call_count(), 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.uploaded, 1);
    assert_matches!(&report.files[0].outcome, FileOutcome::Failed { reason } if reason.contains("500"));
    assert_eq!(report.files[1].outcome, FileOutcome::Uploaded);
    assert!(sink.warnings().iter().any(|w| w.contains("a.dcm")));
}

#[test]
fn placeholder_is_ignored_and_unreadable_files_are_reported() {
    let workspace = Workspace::new();
    let store = build(&workspace, &[("a.jpg", "1")]);
    fs::write(workspace.dicom_dir().join(".gitignore").as_std_path(), b"*\n").unwrap();
    fs::write(workspace.dicom_dir().join("notes.txt").as_std_path(), b"hello").unwrap();
    let pacs = MockPacs::default();

    let report = Uploader::new(&store, &pacs)
        .upload(&BTreeSet::new(), &RecordingSink::default())
        .unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(report.uploaded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.files[1].file, "notes.txt");
    assert_eq!(pacs.store_call_count(), 1);
}

#[test]
fn remote_uids_are_collected_and_broken_instances_skipped() {
    let mut pacs = MockPacs::with_uids(&["1.2.3", "1.2.4", "1.2.5"]);
    pacs.broken_instances.insert("instance-1".to_string());
    let sink = RecordingSink::default();

    let uids = existing_sop_instance_uids(&pacs, &sink).unwrap();

    assert_eq!(
        uids,
        BTreeSet::from(["1.2.3".to_string(), "1.2.5".to_string()])
    );
    assert_eq!(sink.warnings().len(), 1);
}

#[test]
fn failing_listing_is_an_error() {
    let pacs = MockPacs {
        list_status: Some(503),
        ..MockPacs::with_uids(&["1.2.3"])
    };

    let err = existing_sop_instance_uids(&pacs, &RecordingSink::default()).unwrap_err();
    assert_matches!(err, UploaderError::PacsStatus { status: 503, .. });
}
