use std::fs::{self, File};
use std::path::Path;

use dv_ingest_core::config::UploadLimits;
use dv_ingest_core::zipper::{plan, BatchZipper};
use tempfile::tempdir;

fn write_sized(root: &Path, name: &str, size: usize) -> String {
    let path = root.join(name);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(&path, vec![b'x'; size]).unwrap();
    name.to_string()
}

fn archive_entries(path: &Path) -> Vec<String> {
    let mut zip = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..zip.len())
        .map(|i| zip.by_index(i).unwrap().name().to_string())
        .collect()
}

#[test]
fn batches_respect_count_and_size_bounds() {
    let tmp = tempdir().unwrap();
    let sizes = [10, 40, 5, 60, 120, 1, 1, 1, 30, 30, 30, 99, 0, 7];
    let files: Vec<String> = sizes
        .iter()
        .enumerate()
        .map(|(i, size)| write_sized(tmp.path(), &format!("f{i:02}.bin"), *size))
        .collect();
    let limits = UploadLimits {
        max_files_per_upload: 3,
        max_upload_size: 100,
    };

    let mut zipper = BatchZipper::new(tmp.path(), files.clone(), limits, None);
    let mut seen = Vec::new();
    while let Some(batch) = zipper.next_batch().unwrap() {
        assert!(!batch.files().is_empty());
        assert!(batch.files().len() <= 3);
        if batch.bytes() > 100 {
            assert_eq!(batch.files().len(), 1, "only a lone file may exceed the size bound");
        }
        assert_eq!(archive_entries(batch.path()), batch.files());
        seen.extend(batch.files().iter().cloned());
        batch.close().unwrap();
    }
    assert_eq!(seen, files, "every file is packed once, in order");
    assert_eq!(zipper.zipped_count(), files.len());
}

#[test]
fn oversized_file_gets_its_own_batch() {
    let tmp = tempdir().unwrap();
    let files = vec![
        write_sized(tmp.path(), "a.bin", 10),
        write_sized(tmp.path(), "huge.bin", 500),
        write_sized(tmp.path(), "b.bin", 10),
    ];
    let limits = UploadLimits {
        max_files_per_upload: 10,
        max_upload_size: 100,
    };

    let batches: Vec<Vec<String>> = BatchZipper::new(tmp.path(), files, limits, None)
        .map(|batch| batch.unwrap().files().to_vec())
        .collect();
    assert_eq!(
        batches,
        vec![
            vec!["a.bin".to_string()],
            vec!["huge.bin".to_string()],
            vec!["b.bin".to_string()],
        ]
    );
}

#[test]
fn archives_keep_relative_layout_and_are_removed() {
    let tmp = tempdir().unwrap();
    let archives = tempdir().unwrap();
    let files = vec![
        write_sized(tmp.path(), "docs/readme.txt", 3),
        write_sized(tmp.path(), "docs/img/logo.png", 4),
        write_sized(tmp.path(), "top.csv", 5),
    ];

    let mut zipper = BatchZipper::new(
        tmp.path(),
        files.clone(),
        UploadLimits::default(),
        Some(archives.path().to_path_buf()),
    );
    let batch = zipper.next_batch().unwrap().expect("one batch");
    assert!(batch.path().starts_with(archives.path()));
    assert_eq!(archive_entries(batch.path()), files);
    assert_eq!(batch.bytes(), 12);

    let archive = batch.path().to_path_buf();
    drop(batch);
    assert!(!archive.exists(), "dropping a batch removes its archive");
    assert!(zipper.next_batch().unwrap().is_none());
}

#[test]
fn missing_payload_file_is_a_resource_error() {
    let tmp = tempdir().unwrap();
    let mut zipper = BatchZipper::new(
        tmp.path(),
        vec!["absent.txt".to_string()],
        UploadLimits::default(),
        None,
    );
    let err = zipper.next_batch().unwrap_err();
    assert_eq!(err.kind(), dv_ingest_core::ErrorKind::Resource);
}

#[test]
fn plan_matches_packed_batches() {
    let tmp = tempdir().unwrap();
    let files: Vec<String> = [25, 25, 25, 25, 25, 80, 5]
        .iter()
        .enumerate()
        .map(|(i, size)| write_sized(tmp.path(), &format!("p{i}.dat"), *size))
        .collect();
    let limits = UploadLimits {
        max_files_per_upload: 4,
        max_upload_size: 75,
    };

    let planned = plan(tmp.path(), &files, limits).unwrap();
    let packed: Vec<(Vec<String>, u64)> = BatchZipper::new(tmp.path(), files.clone(), limits, None)
        .map(|batch| {
            let batch = batch.unwrap();
            (batch.files().to_vec(), batch.bytes())
        })
        .collect();

    assert_eq!(planned.len(), packed.len());
    for (plan, (files, bytes)) in planned.iter().zip(&packed) {
        assert_eq!(&plan.files, files);
        assert_eq!(plan.bytes, *bytes);
    }
}

#[tokio::test(flavor = "current_thread")]
async fn packing_off_the_runtime_yields_the_same_batches() {
    let tmp = tempdir().unwrap();
    let files: Vec<String> = (0..5)
        .map(|i| write_sized(tmp.path(), &format!("dir/f{i}.bin"), 10))
        .collect();
    let limits = UploadLimits {
        max_files_per_upload: 2,
        max_upload_size: 1_000,
    };

    let mut zipper = BatchZipper::new(tmp.path(), files.clone(), limits, None);
    let mut packed = Vec::new();
    loop {
        let (next, batch) = zipper.pack_next().await.unwrap();
        zipper = next;
        let Some(batch) = batch else { break };
        assert_eq!(archive_entries(batch.path()), batch.files());
        packed.push(batch.files().to_vec());
        batch.close().unwrap();
    }

    assert_eq!(zipper.zipped_count(), 5);
    assert_eq!(
        packed,
        vec![
            files[0..2].to_vec(),
            files[2..4].to_vec(),
            files[4..5].to_vec(),
        ]
    );
}
