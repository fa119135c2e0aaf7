//! Bounded batching of payload files into temporary zip archives.
//!
//! Files are taken in order and added to the current batch while both the file-count and
//! the byte bound hold. An empty batch always admits the next file, so a single file larger
//! than the byte bound still gets uploaded, alone in its own batch.
//!
//! Each archive is a [`tempfile::NamedTempFile`]: it is removed when the [`Batch`] is
//! dropped, whatever the exit path. [`Batch::close`] removes it eagerly and reports a
//! failed removal.
//!
//! Packing reads and deflates up to a full batch worth of payload, so async callers use
//! [`BatchZipper::pack_next`], which does the work on tokio's blocking pool.

use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::UploadLimits;
use crate::error::{IngestError, Result};

/// Running totals of the batch being filled.
#[derive(Debug, Clone, Copy)]
pub struct BatchWindow {
    limits: UploadLimits,
    count: usize,
    bytes: u64,
}

impl BatchWindow {
    pub fn new(limits: UploadLimits) -> Self {
        Self {
            limits,
            count: 0,
            bytes: 0,
        }
    }

    /// Whether a file of `size` bytes fits in this batch.
    pub fn admits(&self, size: u64) -> bool {
        if self.count == 0 {
            return true;
        }
        self.count < self.limits.max_files_per_upload
            && self.bytes.saturating_add(size) <= self.limits.max_upload_size
    }

    pub fn push(&mut self, size: u64) {
        self.count += 1;
        self.bytes = self.bytes.saturating_add(size);
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

/// Boundaries of one batch, without an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub files: Vec<String>,
    pub bytes: u64,
}

/// Computes batch boundaries for `files` (relative to `root`) without writing archives.
pub fn plan<'a>(
    root: &Path,
    files: impl IntoIterator<Item = &'a String>,
    limits: UploadLimits,
) -> Result<Vec<BatchPlan>> {
    let mut plans = Vec::new();
    let mut window = BatchWindow::new(limits);
    let mut current = BatchPlan {
        files: Vec::new(),
        bytes: 0,
    };
    for file in files {
        let size = file_size(&root.join(file))?;
        if !window.admits(size) {
            plans.push(std::mem::replace(
                &mut current,
                BatchPlan {
                    files: Vec::new(),
                    bytes: 0,
                },
            ));
            window = BatchWindow::new(limits);
        }
        window.push(size);
        current.files.push(file.clone());
        current.bytes = window.bytes();
    }
    if !current.files.is_empty() {
        plans.push(current);
    }
    Ok(plans)
}

/// A batch of files packed into a temporary archive.
#[derive(Debug)]
pub struct Batch {
    archive: NamedTempFile,
    files: Vec<String>,
    bytes: u64,
}

impl Batch {
    pub fn path(&self) -> &Path {
        self.archive.path()
    }

    /// Relative paths of the files in the archive, in insertion order.
    pub fn files(&self) -> &[String] {
        &self.files
    }

    /// Cumulative uncompressed size of the files in the archive.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Removes the archive from disk.
    pub fn close(self) -> Result<()> {
        let path = self.archive.path().to_path_buf();
        self.archive
            .close()
            .map_err(|e| IngestError::io("remove archive", path, e))
    }
}

/// Lazily turns an ordered sequence of relative paths into bounded archive batches.
pub struct BatchZipper<I>
where
    I: Iterator<Item = String>,
{
    root: PathBuf,
    files: I,
    limits: UploadLimits,
    temp_dir: Option<PathBuf>,
    pending: Option<(String, u64)>,
    zipped: usize,
}

impl<I> BatchZipper<I>
where
    I: Iterator<Item = String>,
{
    pub fn new(
        root: impl Into<PathBuf>,
        files: impl IntoIterator<IntoIter = I>,
        limits: UploadLimits,
        temp_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            root: root.into(),
            files: files.into_iter(),
            limits,
            temp_dir,
            pending: None,
            zipped: 0,
        }
    }

    /// Number of files packed so far, across all batches.
    pub fn zipped_count(&self) -> usize {
        self.zipped
    }

    /// Packs the next batch, or returns `None` once every file has been packed.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let mut window = BatchWindow::new(self.limits);
        let mut selected = Vec::new();
        loop {
            let (file, size) = match self.pending.take() {
                Some(entry) => entry,
                None => match self.files.next() {
                    Some(file) => {
                        let size = file_size(&self.root.join(&file))?;
                        (file, size)
                    }
                    None => break,
                },
            };
            if !window.admits(size) {
                self.pending = Some((file, size));
                break;
            }
            window.push(size);
            selected.push(file);
        }
        if selected.is_empty() {
            return Ok(None);
        }

        let archive = self.create_archive()?;
        self.write_archive(&archive, &selected)?;
        self.zipped += selected.len();
        debug!(
            archive = %archive.path().display(),
            files = selected.len(),
            bytes = window.bytes(),
            cumulative = self.zipped,
            "Packed upload batch"
        );
        Ok(Some(Batch {
            archive,
            files: selected,
            bytes: window.bytes(),
        }))
    }

    fn create_archive(&self) -> Result<NamedTempFile> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("dv-ingest").suffix(".zip");
        match &self.temp_dir {
            Some(dir) => builder
                .tempfile_in(dir)
                .map_err(|e| IngestError::io("create archive", dir, e)),
            None => builder
                .tempfile()
                .map_err(|e| IngestError::io("create archive", std::env::temp_dir(), e)),
        }
    }

    fn write_archive(&self, archive: &NamedTempFile, files: &[String]) -> Result<()> {
        let archive_path = archive.path();
        let mut writer = ZipWriter::new(archive.as_file());
        for file in files {
            let source = self.root.join(file);
            let size = file_size(&source)?;
            let options = FileOptions::default()
                .compression_method(CompressionMethod::Deflated)
                .large_file(size >= u64::from(u32::MAX));
            writer
                .start_file(file.as_str(), options)
                .map_err(|e| IngestError::archive(archive_path, e))?;
            let mut input =
                File::open(&source).map_err(|e| IngestError::io("read payload file", &source, e))?;
            io::copy(&mut input, &mut writer)
                .map_err(|e| IngestError::io("write archive", archive_path, e))?;
        }
        writer
            .finish()
            .map_err(|e| IngestError::archive(archive_path, e))?;
        Ok(())
    }
}

impl<I> BatchZipper<I>
where
    I: Iterator<Item = String> + Send + 'static,
{
    /// Packs the next batch on the blocking thread pool and hands the zipper back with it.
    pub async fn pack_next(mut self) -> Result<(Self, Option<Batch>)> {
        tokio::task::spawn_blocking(move || {
            let batch = self.next_batch()?;
            Ok((self, batch))
        })
        .await
        .map_err(IngestError::task("pack upload batch"))?
    }
}

impl<I> Iterator for BatchZipper<I>
where
    I: Iterator<Item = String>,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch().transpose()
    }
}

fn file_size(path: &Path) -> Result<u64> {
    fs::metadata(path)
        .map(|m| m.len())
        .map_err(|e| IngestError::io("stat payload file", path, e))
}
