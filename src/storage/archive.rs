//! ZIP packaging of a job's working directory

use super::{StorageError, StorageResult};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Writes every regular file under `source` into a new archive at `destination`
///
/// Entry names are paths relative to `source` with `/` separators, written in
/// sorted order. A partially written archive is removed on failure. Returns the
/// number of entries written.
///
/// This is blocking IO; async callers should run it on the blocking pool.
pub fn archive_directory(source: &Path, destination: &Path) -> StorageResult<usize> {
    let mut files = Vec::new();
    collect_files(source, &mut files)?;
    files.sort();

    let result = write_archive(source, destination, &files);
    if result.is_err() {
        let _ = fs::remove_file(destination);
    }
    result
}

fn write_archive(source: &Path, destination: &Path, files: &[PathBuf]) -> StorageResult<usize> {
    let file = File::create(destination).map_err(|e| StorageError::io(destination, e))?;
    let mut writer = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for path in files {
        let name = entry_name(source, path);
        writer.start_file(name, options)?;

        let mut input = File::open(path).map_err(|e| StorageError::io(path, e))?;
        io::copy(&mut input, &mut writer).map_err(|e| StorageError::io(path, e))?;
    }

    writer.finish()?;
    Ok(files.len())
}

fn collect_files(dir: &Path, files: &mut Vec<PathBuf>) -> StorageResult<()> {
    for entry in fs::read_dir(dir).map_err(|e| StorageError::io(dir, e))? {
        let entry = entry.map_err(|e| StorageError::io(dir, e))?;
        let path = entry.path();
        let file_type = entry.file_type().map_err(|e| StorageError::io(&path, e))?;

        if file_type.is_dir() {
            collect_files(&path, files)?;
        } else if file_type.is_file() {
            files.push(path);
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
