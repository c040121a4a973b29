//! Commits made by the harness survive close and reopen.

use crate::common::*;
use strata_testkit::{
    Directory, DirectoryReader, HarnessConfig, IndexReader, IndexWriter, IndexWriterConfig, Query,
};

#[test]
fn auto_commits_reach_disk() {
    let (_temp, directory) = fs_directory();
    let harness = HarnessConfig {
        commit_interval_min: 10,
        commit_interval_max: 10,
        ..Default::default()
    };
    let mut writer = random_writer(1, directory.clone(), harness);
    for i in 0..25 {
        writer.add_document(doc(i)).unwrap();
    }
    // Thresholds land on 10 and 20
    let committed = DirectoryReader::open(&directory, 2).unwrap();
    assert_eq!(committed.num_docs(), 20);
    assert_eq!(directory.latest_generation().unwrap(), Some(2));
    writer.close().unwrap();

    let reopened = DirectoryReader::open(&directory, 2).unwrap();
    assert_eq!(reopened.num_docs(), 25);
}

#[test]
fn reopen_after_close_sees_all_writes() {
    let (temp, directory) = fs_directory();
    {
        let mut writer = random_writer(2, directory, HarnessConfig::default());
        for i in 0..40 {
            writer.update_document(&id(i % 20), doc(i % 20)).unwrap();
        }
        writer.delete_documents(&id(0)).unwrap();
    }

    let directory = Directory::open_fs(temp.path().join("index")).unwrap();
    let reader = DirectoryReader::open(&directory, 4).unwrap();
    assert_eq!(reader.num_docs(), 19);
    assert!(reader.search(&Query::Term(id(0))).is_empty());

    let writer = IndexWriter::open(directory, IndexWriterConfig::new()).unwrap();
    assert_eq!(writer.num_docs(), 19);
    writer.close().unwrap();
}

#[test]
fn second_harness_on_locked_directory_fails() {
    let (_temp, directory) = fs_directory();
    let first = random_writer(3, directory.clone(), HarnessConfig::default());
    let mut rng = <rand::rngs::StdRng as rand::SeedableRng>::seed_from_u64(4);
    let second = strata_testkit::RandomIndexWriter::<IndexWriter>::new(
        &mut rng,
        directory,
        IndexWriterConfig::new(),
    );
    assert!(second.is_err());
    first.close().unwrap();
}

#[test]
fn every_reader_route_reads_from_disk_consistently() {
    for seed in 0..16 {
        let (_temp, directory) = fs_directory();
        let mut writer = random_writer(seed, directory, HarnessConfig::default());
        for i in 0..30 {
            writer.add_document(doc(i)).unwrap();
        }
        writer.delete_by_query(&Query::NumericRange {
            field: "n".into(),
            min: 0,
            max: 9,
        })
        .unwrap();
        let reader = writer.get_reader().unwrap();
        assert_eq!(reader.num_docs(), 20, "seed={}", seed);
        writer.close().unwrap();
    }
}
