use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use serde::Serialize;

pub mod json_writer;
pub mod summary;
pub mod tsv_writer;

const IO_BUF_CAPACITY: usize = 1 << 16;

pub(crate) fn open_maybe_gz(path: &Path) -> std::io::Result<Box<dyn Read>> {
    let file = File::open(path)?;
    if path.extension().and_then(|s| s.to_str()) == Some("gz") {
        let decoder = GzDecoder::new(file);
        Ok(Box::new(decoder))
    } else {
        Ok(Box::new(file))
    }
}

/// Sibling of `path` used while the file is being written. Keeps the original
/// file name as suffix so extension-sniffing writers (`.nii.gz`) still work.
pub fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    path.with_file_name(format!(".partial-{}", name))
}

/// Moves a finished partial file over its destination.
pub fn commit_atomic(partial: &Path, dest: &Path) -> Result<()> {
    fs::rename(partial, dest).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            partial.display(),
            dest.display()
        )
    })
}

/// Writes through a buffered partial file and renames it into place, so readers
/// only ever see a complete file.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = partial_path(path);
    let file = File::create(&tmp).with_context(|| format!("failed to create {}", tmp.display()))?;
    let mut w = BufWriter::with_capacity(IO_BUF_CAPACITY, file);
    if let Err(err) = write(&mut w).and_then(|_| w.flush().map_err(Into::into)) {
        drop(w);
        let _ = fs::remove_file(&tmp);
        return Err(err);
    }
    drop(w);
    commit_atomic(&tmp, path)
}

pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, |w| {
        serde_json::to_writer_pretty(&mut *w, value)?;
        writeln!(w)?;
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_path_keeps_the_suffix() {
        let p = partial_path(Path::new("/tmp/labels/segmentation.nii.gz"));
        assert_eq!(p, PathBuf::from("/tmp/labels/.partial-segmentation.nii.gz"));
    }

    #[test]
    fn atomic_write_leaves_no_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("status.json");
        write_json_atomic(&path, &serde_json::json!({"status": "Pending"})).unwrap();
        assert!(path.exists());
        assert!(!partial_path(&path).exists());
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("Pending"));
    }

    #[test]
    fn failed_write_keeps_the_previous_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("report.tsv");
        fs::write(&path, "old\n").unwrap();
        let result = write_atomic(&path, |w| {
            writeln!(w, "half")?;
            anyhow::bail!("boom")
        });
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "old\n");
        assert!(!partial_path(&path).exists());
    }
}
