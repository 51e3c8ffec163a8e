use crate::StoreError;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const USTAR_OFFSET: usize = 257;
const USTAR_MAGIC: &[u8] = b"ustar";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Sniff the format from the leading bytes, ignoring the file name.
    pub fn detect(header: &[u8]) -> Option<Self> {
        if header.starts_with(&GZIP_MAGIC) {
            return Some(Self::TarGz);
        }
        let end = USTAR_OFFSET + USTAR_MAGIC.len();
        if header.len() >= end && &header[USTAR_OFFSET..end] == USTAR_MAGIC {
            return Some(Self::Tar);
        }
        None
    }
}

/// Unpack `archive` into `dest` and return the source root.
///
/// The source root is the single top-level directory when the archive has
/// exactly one (the layout of release tarballs), otherwise `dest` itself.
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<PathBuf, StoreError> {
    let mut file = File::open(archive)?;
    let mut header = [0u8; 512];
    let read = read_up_to(&mut file, &mut header)?;
    let format = ArchiveFormat::detect(&header[..read]).ok_or_else(|| {
        StoreError::Archive(format!(
            "{} is not a gzip or tar archive",
            archive.display()
        ))
    })?;
    file.seek(SeekFrom::Start(0))?;

    fs::create_dir_all(dest)?;
    let reader = BufReader::new(file);
    let result = match format {
        ArchiveFormat::TarGz => unpack(GzDecoder::new(reader), dest),
        ArchiveFormat::Tar => unpack(reader, dest),
    };
    result.map_err(|e| StoreError::Archive(format!("failed to unpack {}: {e}", archive.display())))?;

    tracing::debug!("extracted {:?} archive into {}", format, dest.display());
    source_root(dest)
}

fn unpack(reader: impl Read, dest: &Path) -> std::io::Result<()> {
    let mut ar = tar::Archive::new(reader);
    ar.set_preserve_permissions(true);
    ar.set_preserve_mtime(false);
    ar.set_unpack_xattrs(false);
    ar.unpack(dest)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = reader.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// Descend into `dir`'s only entry when that entry is a directory.
pub fn source_root(dir: &Path) -> Result<PathBuf, StoreError> {
    let entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    if let [only] = entries.as_slice() {
        if only.file_type()?.is_dir() {
            return Ok(only.path());
        }
    }
    Ok(dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;

    fn tar_bytes(entries: &[(&str, &[u8], u32)]) -> Vec<u8> {
        let mut builder = tar::Builder::new(Vec::new());
        for (path, data, mode) in entries {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(*mode);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap()
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        use std::io::Write;
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        enc.finish().unwrap()
    }

    #[test]
    fn detects_formats() {
        let tar = tar_bytes(&[("a.txt", b"a", 0o644)]);
        assert_eq!(ArchiveFormat::detect(&tar), Some(ArchiveFormat::Tar));
        assert_eq!(ArchiveFormat::detect(&gzip(&tar)), Some(ArchiveFormat::TarGz));
        assert_eq!(ArchiveFormat::detect(b"hello"), None);
    }

    #[test]
    fn extracts_targz_and_descends_into_single_dir() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("0.5.1.tar.gz");
        let tar = tar_bytes(&[
            ("zetamac-rs-0.5.1/Cargo.toml", b"[package]", 0o644),
            ("zetamac-rs-0.5.1/build.sh", b"#!/bin/sh\n", 0o755),
        ]);
        fs::write(&archive, gzip(&tar)).unwrap();

        let root = extract_archive(&archive, &dir.path().join("src")).unwrap();
        assert!(root.ends_with("zetamac-rs-0.5.1"));
        assert_eq!(fs::read(root.join("Cargo.toml")).unwrap(), b"[package]");

        use std::os::unix::fs::PermissionsExt;
        let mode = fs::metadata(root.join("build.sh")).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
    }

    #[test]
    fn flat_archive_root_is_dest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("flat.tar");
        fs::write(
            &archive,
            tar_bytes(&[("a.txt", b"a", 0o644), ("b.txt", b"b", 0o644)]),
        )
        .unwrap();
        let dest = dir.path().join("src");
        assert_eq!(extract_archive(&archive, &dest).unwrap(), dest);
    }

    #[test]
    fn non_archive_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("hello.tar.gz");
        fs::write(&archive, b"hello").unwrap();
        let err = extract_archive(&archive, &dir.path().join("src")).unwrap_err();
        assert!(matches!(err, StoreError::Archive(_)));
    }

    #[test]
    fn truncated_gzip_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bad.tar.gz");
        let mut data = gzip(&tar_bytes(&[("a.txt", b"aaaa", 0o644)]));
        data.truncate(12);
        fs::write(&archive, data).unwrap();
        assert!(extract_archive(&archive, &dir.path().join("src")).is_err());
    }
}
