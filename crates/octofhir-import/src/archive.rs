//! Package archive reader.
//!
//! A package is a gzip-compressed tar whose resources live under `package/`.
//! Opening an archive spools the upload to a temporary file and walks it once
//! to enforce limits, capture `package/package.json`, and record where each
//! canonical URL last occurs. [`PackageArchive::entries`] then streams the
//! resource candidates from a blocking reader over a bounded channel.

use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tar::{Archive, EntryType};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::error::ArchiveError;
use crate::selector::ResourceHeader;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const SPOOL_CHUNK: usize = 64 * 1024;

const PACKAGE_ROOT: &str = "package/";
const MANIFEST_FILE: &str = "package.json";
const INDEX_FILE: &str = ".index.json";

/// Package subdirectories that never hold importable resources.
const EXCLUDED_DIRS: &[&str] = &["other/", "example/", "openapi/", "xml/"];

/// Media type inferred from an entry payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaType {
    #[serde(rename = "application/fhir+json")]
    FhirJson,
    #[serde(rename = "application/fhir+xml")]
    FhirXml,
    #[serde(rename = "application/octet-stream")]
    OctetStream,
}

impl MediaType {
    /// Sniffs the payload by its first non-whitespace byte.
    pub fn sniff(bytes: &[u8]) -> Self {
        let first = bytes
            .strip_prefix(b"\xEF\xBB\xBF")
            .unwrap_or(bytes)
            .iter()
            .find(|b| !b.is_ascii_whitespace());
        match first {
            Some(b'{') => Self::FhirJson,
            Some(b'<') => Self::FhirXml,
            _ => Self::OctetStream,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FhirJson => "application/fhir+json",
            Self::FhirXml => "application/fhir+xml",
            Self::OctetStream => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One resource candidate read from the archive.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Zero-based index among resource candidates, in archive order.
    pub position: usize,
    pub path: String,
    pub bytes: Vec<u8>,
    pub media_type: MediaType,
}

/// NPM-style package descriptor (`package/package.json`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifest {
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fhir_versions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryClass {
    Manifest,
    Resource,
    Ignored,
}

fn classify(path: &str, entry_type: EntryType) -> EntryClass {
    if !entry_type.is_file() {
        return EntryClass::Ignored;
    }
    let path = path.strip_prefix("./").unwrap_or(path);
    let Some(relative) = path.strip_prefix(PACKAGE_ROOT) else {
        return EntryClass::Ignored;
    };
    if relative == MANIFEST_FILE {
        return EntryClass::Manifest;
    }
    if relative == INDEX_FILE
        || relative.is_empty()
        || EXCLUDED_DIRS.iter().any(|dir| relative.starts_with(dir))
        || relative.split('/').any(|segment| segment.starts_with('.'))
    {
        return EntryClass::Ignored;
    }
    EntryClass::Resource
}

/// Facts gathered by the open-time scan.
#[derive(Debug, Default)]
struct ScanSummary {
    manifest: Option<PackageManifest>,
    entry_count: usize,
    candidates: usize,
    last_by_url: HashMap<String, usize>,
}

/// An opened, validated package archive backed by a spooled temporary file.
///
/// The temporary file is deleted when the archive, or the [`EntryStream`]
/// produced from it, is dropped.
#[derive(Debug)]
pub struct PackageArchive {
    spool: NamedTempFile,
    filename: String,
    size: u64,
    summary: ScanSummary,
    max_entry_bytes: u64,
    read_ahead: usize,
}

impl PackageArchive {
    /// Spools `source` to temporary storage and validates it as a package.
    ///
    /// # Errors
    ///
    /// Fails with a format error when the stream is not gzip, is not a
    /// readable tar, or exceeds any configured limit.
    pub async fn open<R>(
        mut source: R,
        filename: &str,
        config: &ArchiveConfig,
    ) -> Result<Self, ArchiveError>
    where
        R: AsyncRead + Unpin,
    {
        let spool = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(spool.reopen()?);

        // One byte past the limit is enough to tell an oversized upload apart.
        // Read failures belong to the caller's stream; write failures are ours.
        let mut limited = (&mut source).take(config.max_archive_bytes.saturating_add(1));
        let mut buf = vec![0u8; SPOOL_CHUNK];
        let mut size = 0u64;
        loop {
            let read = limited
                .read(&mut buf)
                .await
                .map_err(ArchiveError::unreadable_upload)?;
            if read == 0 {
                break;
            }
            file.write_all(&buf[..read]).await?;
            size += read as u64;
        }
        file.flush().await?;
        drop(file);

        if size > config.max_archive_bytes {
            return Err(ArchiveError::TooLarge {
                limit: config.max_archive_bytes,
            });
        }

        let path = spool.path().to_path_buf();
        let limits = config.clone();
        let summary = tokio::task::spawn_blocking(move || scan(&path, &limits))
            .await
            .map_err(|e| ArchiveError::Io(std::io::Error::other(e)))??;

        info!(
            filename = %filename,
            bytes = size,
            entries = summary.entry_count,
            resources = summary.candidates,
            package = summary.manifest.as_ref().map(|m| m.name.as_str()).unwrap_or("-"),
            "package archive opened"
        );

        Ok(Self {
            spool,
            filename: filename.to_string(),
            size,
            summary,
            max_entry_bytes: config.max_entry_bytes,
            read_ahead: config.read_ahead,
        })
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Compressed size of the spooled upload.
    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn manifest(&self) -> Option<&PackageManifest> {
        self.summary.manifest.as_ref()
    }

    /// Number of resource candidates [`entries`](Self::entries) will yield.
    pub fn resource_count(&self) -> usize {
        self.summary.candidates
    }

    /// Position of the last candidate declaring `url`, if any.
    pub fn last_position_of(&self, url: &str) -> Option<usize> {
        self.summary.last_by_url.get(url).copied()
    }

    /// Path of the spooled temporary file.
    pub fn spool_path(&self) -> &Path {
        self.spool.path()
    }

    /// Streams the resource candidates in archive order.
    ///
    /// Consumes the archive: the sequence is single-pass and a second read
    /// requires reopening the upload.
    pub fn entries(self) -> EntryStream {
        let (tx, rx) = mpsc::channel(self.read_ahead.max(1));
        let spool = self.spool;
        let max_entry_bytes = self.max_entry_bytes;
        let filename = self.filename;

        tokio::task::spawn_blocking(move || {
            if let Err(err) = read_candidates(spool.path(), max_entry_bytes, &tx) {
                let _ = tx.blocking_send(Err(err));
            }
            debug!(filename = %filename, "archive reader finished, releasing spool file");
            drop(spool);
        });

        EntryStream {
            rx,
            last_by_url: self.summary.last_by_url,
        }
    }
}

/// Lazy, finite sequence of archive entries.
///
/// Dropping the stream stops the background reader, which then deletes the
/// spooled file.
#[derive(Debug)]
pub struct EntryStream {
    rx: mpsc::Receiver<Result<ArchiveEntry, ArchiveError>>,
    last_by_url: HashMap<String, usize>,
}

impl EntryStream {
    pub async fn next(&mut self) -> Option<Result<ArchiveEntry, ArchiveError>> {
        self.rx.recv().await
    }

    /// True when a later entry declares the same canonical URL.
    pub fn is_superseded(&self, url: &str, position: usize) -> bool {
        self.last_by_url
            .get(url)
            .is_some_and(|&last| last > position)
    }
}

fn open_gzip(path: &Path) -> Result<Archive<GzDecoder<File>>, ArchiveError> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    if read < GZIP_MAGIC.len() || magic != GZIP_MAGIC {
        return Err(ArchiveError::UnsupportedMediaType(
            "expected a gzip-compressed tar package".into(),
        ));
    }
    file.seek(SeekFrom::Start(0))?;
    Ok(Archive::new(GzDecoder::new(file)))
}

fn entry_path<R: Read>(entry: &tar::Entry<'_, R>) -> Result<String, ArchiveError> {
    let path = entry.path().map_err(ArchiveError::read_failure)?;
    Ok(path.to_string_lossy().into_owned())
}

fn read_payload<R: Read>(
    entry: &mut tar::Entry<'_, R>,
    path: &str,
    max_entry_bytes: u64,
) -> Result<Vec<u8>, ArchiveError> {
    let size = entry.size();
    if size > max_entry_bytes {
        return Err(ArchiveError::EntryTooLarge {
            path: path.to_string(),
            size,
            limit: max_entry_bytes,
        });
    }
    let mut bytes = Vec::with_capacity(size as usize);
    entry
        .read_to_end(&mut bytes)
        .map_err(ArchiveError::read_failure)?;
    Ok(bytes)
}

fn scan(path: &Path, config: &ArchiveConfig) -> Result<ScanSummary, ArchiveError> {
    let mut archive = open_gzip(path)?;
    let mut summary = ScanSummary::default();

    for entry in archive.entries().map_err(ArchiveError::read_failure)? {
        let mut entry = entry.map_err(ArchiveError::read_failure)?;
        summary.entry_count += 1;
        if summary.entry_count > config.max_entries {
            return Err(ArchiveError::TooManyEntries {
                limit: config.max_entries,
            });
        }

        let path = entry_path(&entry)?;
        match classify(&path, entry.header().entry_type()) {
            EntryClass::Ignored => {}
            EntryClass::Manifest => {
                let bytes = read_payload(&mut entry, &path, config.max_entry_bytes)?;
                let manifest: PackageManifest = serde_json::from_slice(&bytes).map_err(|e| {
                    ArchiveError::malformed(format!("invalid {PACKAGE_ROOT}{MANIFEST_FILE}: {e}"))
                })?;
                summary.manifest = Some(manifest);
            }
            EntryClass::Resource => {
                let bytes = read_payload(&mut entry, &path, config.max_entry_bytes)?;
                // Only importable kinds can supersede an earlier entry.
                if let Some(url) = ResourceHeader::peek(&bytes)
                    .filter(|h| h.kind().is_some())
                    .and_then(|h| h.url)
                {
                    summary.last_by_url.insert(url, summary.candidates);
                }
                summary.candidates += 1;
            }
        }
    }

    if summary.entry_count == 0 {
        return Err(ArchiveError::malformed("archive contains no entries"));
    }
    Ok(summary)
}

fn read_candidates(
    path: &Path,
    max_entry_bytes: u64,
    tx: &mpsc::Sender<Result<ArchiveEntry, ArchiveError>>,
) -> Result<(), ArchiveError> {
    let mut archive = open_gzip(path)?;
    let mut position = 0;

    for entry in archive.entries().map_err(ArchiveError::read_failure)? {
        let mut entry = entry.map_err(ArchiveError::read_failure)?;
        let path = entry_path(&entry)?;
        if classify(&path, entry.header().entry_type()) != EntryClass::Resource {
            continue;
        }
        let bytes = read_payload(&mut entry, &path, max_entry_bytes)?;
        let item = ArchiveEntry {
            position,
            media_type: MediaType::sniff(&bytes),
            path,
            bytes,
        };
        position += 1;
        if tx.blocking_send(Ok(item)).is_err() {
            // Receiver dropped: the import was cancelled or abandoned.
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    fn build_tgz(files: &[(&str, &[u8])]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (path, data) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_entry_type(EntryType::Regular);
            header.set_cksum();
            builder.append_data(&mut header, path, *data).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    #[test]
    fn classify_follows_package_layout() {
        let file = EntryType::Regular;
        assert_eq!(classify("package/package.json", file), EntryClass::Manifest);
        assert_eq!(classify("package/ValueSet-a.json", file), EntryClass::Resource);
        assert_eq!(classify("./package/ValueSet-a.json", file), EntryClass::Resource);
        assert_eq!(classify("package/.index.json", file), EntryClass::Ignored);
        assert_eq!(classify("package/example/Patient-1.json", file), EntryClass::Ignored);
        assert_eq!(classify("package/other/readme.md", file), EntryClass::Ignored);
        assert_eq!(classify("README.md", file), EntryClass::Ignored);
        assert_eq!(classify("package/", EntryType::Directory), EntryClass::Ignored);
    }

    #[test]
    fn sniff_media_type() {
        assert_eq!(MediaType::sniff(b"  \n{\"a\":1}"), MediaType::FhirJson);
        assert_eq!(MediaType::sniff(b"\xEF\xBB\xBF{}"), MediaType::FhirJson);
        assert_eq!(MediaType::sniff(b"<ValueSet/>"), MediaType::FhirXml);
        assert_eq!(MediaType::sniff(b""), MediaType::OctetStream);
        assert_eq!(MediaType::FhirJson.to_string(), "application/fhir+json");
    }

    #[tokio::test]
    async fn open_scans_manifest_and_duplicates() {
        let tgz = build_tgz(&[
            (
                "package/package.json",
                br#"{"name":"example.pkg","version":"1.0.0","fhirVersions":["4.0.1"]}"#,
            ),
            ("package/CodeSystem-a.json", br#"{"resourceType":"CodeSystem","url":"http://x/a"}"#),
            ("package/CodeSystem-a2.json", br#"{"resourceType":"CodeSystem","url":"http://x/a"}"#),
            ("package/example/Patient.json", br#"{"resourceType":"Patient"}"#),
        ]);

        let archive = PackageArchive::open(tgz.as_slice(), "example.tgz", &ArchiveConfig::default())
            .await
            .unwrap();
        let manifest = archive.manifest().unwrap();
        assert_eq!(manifest.name, "example.pkg");
        assert_eq!(manifest.fhir_versions, vec!["4.0.1"]);
        assert_eq!(archive.resource_count(), 2);
        assert_eq!(archive.last_position_of("http://x/a"), Some(1));

        let mut entries = archive.entries();
        let first = entries.next().await.unwrap().unwrap();
        assert_eq!(first.position, 0);
        assert_eq!(first.media_type, MediaType::FhirJson);
        assert!(entries.is_superseded("http://x/a", first.position));

        let second = entries.next().await.unwrap().unwrap();
        assert_eq!(second.path, "package/CodeSystem-a2.json");
        assert!(!entries.is_superseded("http://x/a", second.position));
        assert!(entries.next().await.is_none());
    }

    #[tokio::test]
    async fn rejects_non_gzip_upload() {
        let err = PackageArchive::open(&b"PK\x03\x04zipdata"[..], "x.zip", &ArchiveConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedMediaType(_)));
    }

    #[tokio::test]
    async fn rejects_oversized_upload() {
        let tgz = build_tgz(&[("package/a.json", br#"{"resourceType":"ValueSet"}"#)]);
        let config = ArchiveConfig {
            max_archive_bytes: 16,
            max_entry_bytes: 16,
            ..ArchiveConfig::default()
        };
        let err = PackageArchive::open(tgz.as_slice(), "x.tgz", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::TooLarge { limit: 16 }));
    }

    #[tokio::test]
    async fn only_recognized_kinds_claim_a_url() {
        let tgz = build_tgz(&[
            ("package/CodeSystem-a.json", br#"{"resourceType":"CodeSystem","url":"http://x/a"}"#),
            ("package/Basic-a.json", br#"{"resourceType":"Basic","url":"http://x/a"}"#),
            ("package/ValueSet-b.json", br#"{"resourceType":"ValueSet","url":"http://x/b","version":2}"#),
        ]);

        let archive = PackageArchive::open(tgz.as_slice(), "x.tgz", &ArchiveConfig::default())
            .await
            .unwrap();
        assert_eq!(archive.last_position_of("http://x/a"), Some(0));
        assert_eq!(archive.last_position_of("http://x/b"), Some(2));
    }

    #[tokio::test]
    async fn failing_upload_stream_is_a_format_error() {
        let tgz = build_tgz(&[("package/a.json", br#"{"resourceType":"ValueSet"}"#)]);
        let source = tokio_test::io::Builder::new()
            .read(&tgz[..8])
            .read_error(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "upload truncated",
            ))
            .build();

        let err = PackageArchive::open(source, "x.tgz", &ArchiveConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::UnreadableUpload(ref msg) if msg == "upload truncated"));
    }

    #[tokio::test]
    async fn enforces_entry_limits() {
        let tgz = build_tgz(&[
            ("package/a.json", b"{}"),
            ("package/b.json", b"{}"),
            ("package/c.json", b"{}"),
        ]);
        let config = ArchiveConfig {
            max_entries: 2,
            ..ArchiveConfig::default()
        };
        let err = PackageArchive::open(tgz.as_slice(), "x.tgz", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::TooManyEntries { limit: 2 }));

        let config = ArchiveConfig {
            max_entry_bytes: 1,
            ..ArchiveConfig::default()
        };
        let err = PackageArchive::open(tgz.as_slice(), "x.tgz", &config)
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::EntryTooLarge { .. }));
    }

    #[tokio::test]
    async fn rejects_invalid_manifest() {
        let tgz = build_tgz(&[("package/package.json", b"{not json")]);
        let err = PackageArchive::open(tgz.as_slice(), "x.tgz", &ArchiveConfig::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("package.json"));
    }

    #[tokio::test]
    async fn rejects_truncated_gzip() {
        let payload: String = (0..2000u32)
            .map(|i| char::from(b'a' + (i.wrapping_mul(7919) % 26) as u8))
            .collect();
        let tgz = build_tgz(&[("package/a.json", payload.as_bytes())]);
        let truncated = &tgz[..tgz.len() / 2];
        let err = PackageArchive::open(truncated, "x.tgz", &ArchiveConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ArchiveError::Malformed(_)));
    }

    #[tokio::test]
    async fn dropping_stream_releases_spool_file() {
        let files: Vec<(String, Vec<u8>)> = (0..8)
            .map(|i| {
                (
                    format!("package/CodeSystem-{i}.json"),
                    format!(r#"{{"resourceType":"CodeSystem","url":"http://x/{i}"}}"#).into_bytes(),
                )
            })
            .collect();
        let refs: Vec<(&str, &[u8])> = files
            .iter()
            .map(|(p, d)| (p.as_str(), d.as_slice()))
            .collect();
        let tgz = build_tgz(&refs);
        let config = ArchiveConfig {
            read_ahead: 1,
            ..ArchiveConfig::default()
        };

        let archive = PackageArchive::open(tgz.as_slice(), "x.tgz", &config)
            .await
            .unwrap();
        let spool = archive.spool_path().to_path_buf();
        assert!(spool.exists());

        let mut entries = archive.entries();
        assert!(entries.next().await.is_some());
        drop(entries);

        for _ in 0..100 {
            if !spool.exists() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert!(!spool.exists());
    }
}
