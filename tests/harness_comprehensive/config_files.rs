//! Harness knobs loaded from TOML files.

use crate::common::*;
use strata_testkit::{HarnessConfig, StrataError};
use tempfile::TempDir;

#[test]
fn toml_file_drives_commit_interval() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("harness.toml");
    std::fs::write(
        &path,
        "commit_interval_min = 5\ncommit_interval_max = 5\ncommit_growth = 1.0\n",
    )
    .unwrap();
    let harness = HarnessConfig::from_file(&path).unwrap();

    let (_dir, directory) = fs_directory();
    let mut writer = random_writer(9, directory, harness);
    for i in 0..20 {
        writer.add_document(doc(i)).unwrap();
    }
    assert_eq!(writer.inner().unwrap().generation(), 4);
    assert_eq!(writer.next_commit_at(), 25);
    writer.close().unwrap();
}

#[test]
fn invalid_file_is_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("harness.toml");
    std::fs::write(&path, "batch_reroute_one_in = 0\n").unwrap();
    assert!(matches!(
        HarnessConfig::from_file(&path),
        Err(StrataError::Config(_))
    ));
}
