//! One ZIP archive per message.
//!
//! The archive is spooled to a temporary file while entries are written.
//! Dropping an [`ArchiveBuilder`] without sealing it deletes the spool file,
//! so a half-written archive can never be delivered.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{RelayError, Result};
use crate::parser::header::strip_path_separators;

/// Longest archive file stem, in bytes, kept below common filesystem limits.
const MAX_STEM_LEN: usize = 200;

/// An open archive accepting entries.
pub struct ArchiveBuilder {
    name: String,
    writer: ZipWriter<NamedTempFile>,
    entries: Vec<String>,
    taken: HashSet<String>,
}

impl ArchiveBuilder {
    /// Start a new archive named `name`, spooled in `spool_dir` (or the
    /// system temp directory).
    pub fn open(name: &str, spool_dir: Option<&Path>) -> Result<Self> {
        let spool = match spool_dir {
            Some(dir) => NamedTempFile::new_in(dir).map_err(|e| RelayError::io(dir, e))?,
            None => NamedTempFile::new().map_err(|e| RelayError::archive(name, e))?,
        };
        debug!(name, spool = %spool.path().display(), "Opened archive");
        Ok(Self {
            name: strip_path_separators(name),
            writer: ZipWriter::new(spool),
            entries: Vec::new(),
            taken: HashSet::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry names written so far, in order.
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Add one deflated entry. Returns the entry name actually used, which
    /// differs from `filename` when it collides with an earlier entry or
    /// contains path separators.
    pub fn write(&mut self, filename: &str, bytes: &[u8]) -> Result<String> {
        let entry = self.unique_entry_name(filename);
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(bytes.len() as u64 >= u64::from(u32::MAX));

        self.writer
            .start_file(entry.as_str(), options)
            .map_err(|e| RelayError::archive(&self.name, e))?;
        self.writer
            .write_all(bytes)
            .map_err(|e| RelayError::archive(&self.name, e))?;

        debug!(archive = %self.name, entry = %entry, size = bytes.len(), "Wrote archive entry");
        self.taken.insert(entry.clone());
        self.entries.push(entry.clone());
        Ok(entry)
    }

    /// Finish the archive. After this no entry can be added.
    pub fn seal(self) -> Result<SealedArchive> {
        let Self {
            name,
            writer,
            entries,
            ..
        } = self;
        let mut file = writer
            .finish()
            .map_err(|e| RelayError::archive(&name, e))?;
        file.flush().map_err(|e| RelayError::archive(&name, e))?;

        info!(archive = %name, entries = entries.len(), "Sealed archive");
        Ok(SealedArchive {
            name,
            file,
            entries,
        })
    }

    /// Entry name with separators replaced and a ` (n)` suffix on collision.
    fn unique_entry_name(&self, filename: &str) -> String {
        let clean: String = filename
            .chars()
            .map(|c| if matches!(c, '/' | '\\') { '_' } else { c })
            .collect();
        if !self.taken.contains(&clean) {
            return clean;
        }

        let (stem, ext) = match clean.rfind('.') {
            Some(dot) if dot > 0 => (&clean[..dot], &clean[dot..]),
            _ => (clean.as_str(), ""),
        };
        (1..)
            .map(|i| format!("{stem} ({i}){ext}"))
            .find(|candidate| !self.taken.contains(candidate))
            .unwrap_or_else(|| format!("{stem}_dup{ext}"))
    }
}

/// `name` cut to at most 200 bytes on a char boundary, for use as a file stem.
pub fn file_stem(name: &str) -> &str {
    let mut end = name.len().min(MAX_STEM_LEN);
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

/// A finished archive, ready to be delivered or stored.
#[derive(Debug)]
pub struct SealedArchive {
    name: String,
    file: NamedTempFile,
    entries: Vec<String>,
}

impl SealedArchive {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// `"<name>.zip"`, with the name shortened if it is very long.
    pub fn file_name(&self) -> String {
        format!("{}.zip", file_stem(&self.name))
    }

    /// Read the whole archive into memory.
    pub fn bytes(&self) -> Result<Vec<u8>> {
        let mut file = self
            .file
            .reopen()
            .map_err(|e| RelayError::io(self.file.path(), e))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| RelayError::io(self.file.path(), e))?;
        Ok(bytes)
    }

    /// Move the archive into `dir` under [`Self::file_name`].
    pub fn persist_into(self, dir: &Path) -> Result<PathBuf> {
        std::fs::create_dir_all(dir).map_err(|e| RelayError::io(dir, e))?;
        let dest = dir.join(self.file_name());

        match self.file.persist(&dest) {
            Ok(_) => Ok(dest),
            Err(e) => {
                // Rename fails across filesystems; copy instead
                warn!(error = %e.error, dest = %dest.display(), "Rename failed, copying archive");
                std::fs::copy(e.file.path(), &dest).map_err(|err| RelayError::io(&dest, err))?;
                Ok(dest)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use zip::ZipArchive;

    fn read_entry(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = ZipArchive::new(Cursor::new(bytes)).expect("valid zip");
        let mut file = archive.by_name(name).expect("entry exists");
        let mut out = Vec::new();
        file.read_to_end(&mut out).expect("read entry");
        out
    }

    #[test]
    fn test_write_and_seal() {
        let mut builder = ArchiveBuilder::open("Test от alice", None).unwrap();
        builder.write("7.txt", b"hello").unwrap();
        builder.write("report.pdf", b"%PDF-1.4\n").unwrap();
        let sealed = builder.seal().unwrap();

        assert_eq!(sealed.file_name(), "Test от alice.zip");
        assert_eq!(sealed.entries(), ["7.txt", "report.pdf"]);

        let bytes = sealed.bytes().unwrap();
        assert_eq!(read_entry(&bytes, "7.txt"), b"hello");
        assert_eq!(read_entry(&bytes, "report.pdf"), b"%PDF-1.4\n");
    }

    #[test]
    fn test_entries_are_deflated() {
        let mut builder = ArchiveBuilder::open("big", None).unwrap();
        builder.write("a.txt", &vec![b'a'; 100_000]).unwrap();
        let bytes = builder.seal().unwrap().bytes().unwrap();
        assert!(bytes.len() < 10_000);

        let mut archive = ZipArchive::new(Cursor::new(&bytes[..])).unwrap();
        let file = archive.by_index(0).unwrap();
        assert_eq!(file.compression(), CompressionMethod::Deflated);
    }

    #[test]
    fn test_colliding_entry_names() {
        let mut builder = ArchiveBuilder::open("dup", None).unwrap();
        assert_eq!(builder.write("a.txt", b"1").unwrap(), "a.txt");
        assert_eq!(builder.write("a.txt", b"2").unwrap(), "a (1).txt");
        assert_eq!(builder.write("a.txt", b"3").unwrap(), "a (2).txt");
        assert_eq!(builder.write("noext", b"4").unwrap(), "noext");
        assert_eq!(builder.write("noext", b"5").unwrap(), "noext (1)");
        let bytes = builder.seal().unwrap().bytes().unwrap();
        assert_eq!(read_entry(&bytes, "a (2).txt"), b"3");
    }

    #[test]
    fn test_separators_removed() {
        let mut builder = ArchiveBuilder::open("Q1/Q2 от a\\b", None).unwrap();
        assert_eq!(builder.name(), "Q1Q2 от ab");
        assert_eq!(builder.write("../etc/passwd", b"x").unwrap(), ".._etc_passwd");
        assert_eq!(builder.seal().unwrap().file_name(), "Q1Q2 от ab.zip");
    }

    #[test]
    fn test_long_name_is_shortened_on_char_boundary() {
        let name = "ж".repeat(300);
        let sealed = ArchiveBuilder::open(&name, None).unwrap().seal().unwrap();
        let file_name = sealed.file_name();
        assert!(file_name.len() <= MAX_STEM_LEN + 4);
        assert!(file_name.ends_with(".zip"));
    }

    #[test]
    fn test_unsealed_archive_is_discarded() {
        let spool = tempfile::tempdir().unwrap();
        let mut builder = ArchiveBuilder::open("broken", Some(spool.path())).unwrap();
        builder.write("1.txt", b"partial").unwrap();
        assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 1);
        drop(builder);
        assert_eq!(std::fs::read_dir(spool.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_persist_into_directory() {
        let out = tempfile::tempdir().unwrap();
        let mut builder = ArchiveBuilder::open("Saved от bob", None).unwrap();
        builder.write("1.html", b"<p>hi</p>").unwrap();
        let path = builder.seal().unwrap().persist_into(out.path()).unwrap();
        assert_eq!(path, out.path().join("Saved от bob.zip"));
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(read_entry(&bytes, "1.html"), b"<p>hi</p>");
    }
}
