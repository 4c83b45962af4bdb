use anyhow::{anyhow, Context};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const DB_FILE_NAME: &str = "results.sqlite3";
const MANIFEST_ENTRY: &str = "manifest.json";
const DB_ENTRY: &str = "db/results.sqlite3";
const META_WORKSPACE_ENTRY: &str = "meta/workspace.json";
pub const BUNDLE_FORMAT: &str = "resultsd-workspace-v1";
pub const BARE_SQLITE_FORMAT: &str = "bare-sqlite3";

const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
    pub checksum_verified: bool,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn write_json_entry(
    zip: &mut ZipWriter<File>,
    name: &str,
    value: &serde_json::Value,
    opts: FileOptions,
) -> anyhow::Result<()> {
    zip.start_file(name, opts)
        .with_context(|| format!("failed to start {} entry", name))?;
    zip.write_all(
        serde_json::to_string_pretty(value)
            .with_context(|| format!("failed to serialize {}", name))?
            .as_bytes(),
    )
    .with_context(|| format!("failed to write {} entry", name))?;
    Ok(())
}

/// Write the workspace database into a zip bundle with a checksummed manifest.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE_NAME);
    if !db_path.is_file() {
        return Err(anyhow!(
            "workspace database not found: {}",
            db_path.to_string_lossy()
        ));
    }
    let db_bytes = std::fs::read(&db_path)
        .with_context(|| format!("failed to read database {}", db_path.to_string_lossy()))?;
    let db_sha256 = sha256_hex(&db_bytes);

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let out_file = File::create(out_path).with_context(|| {
        format!(
            "failed to create output file {}",
            out_path.to_string_lossy()
        )
    })?;
    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let manifest = json!({
        "format": BUNDLE_FORMAT,
        "appVersion": env!("CARGO_PKG_VERSION"),
        "exportedAt": chrono::Utc::now().to_rfc3339(),
        "dbSha256": db_sha256,
        "dbBytes": db_bytes.len(),
    });
    write_json_entry(&mut zip, MANIFEST_ENTRY, &manifest, opts)?;

    zip.start_file(DB_ENTRY, opts)
        .context("failed to start database entry")?;
    zip.write_all(&db_bytes)
        .context("failed to write database entry")?;

    let workspace_meta = json!({
        "sourceWorkspace": workspace_path.to_string_lossy(),
    });
    write_json_entry(&mut zip, META_WORKSPACE_ENTRY, &workspace_meta, opts)?;

    zip.finish().context("failed to finalize zip bundle")?;

    Ok(ExportSummary {
        bundle_format: BUNDLE_FORMAT.to_string(),
        entry_count: 3,
        db_sha256,
    })
}

/// Restore a bundle (or a bare SQLite file) as the workspace database. The
/// database is staged next to the destination and swapped in only once it is
/// complete and its checksum matches.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path).with_context(|| {
        format!(
            "failed to create workspace {}",
            workspace_path.to_string_lossy()
        )
    })?;

    let (db_bytes, summary) = match sniff(in_path)? {
        Sniffed::Zip => read_bundle(in_path)?,
        Sniffed::Sqlite => {
            let bytes = std::fs::read(in_path)
                .with_context(|| format!("failed to read {}", in_path.to_string_lossy()))?;
            (
                bytes,
                ImportSummary {
                    bundle_format_detected: BARE_SQLITE_FORMAT.to_string(),
                    checksum_verified: false,
                },
            )
        }
        Sniffed::Unknown => {
            return Err(anyhow!(
                "not a workspace bundle or sqlite database: {}",
                in_path.to_string_lossy()
            ))
        }
    };

    let dst = workspace_path.join(DB_FILE_NAME);
    let tmp_dst = workspace_path.join(format!("{}.importing", DB_FILE_NAME));
    if tmp_dst.exists() {
        let _ = std::fs::remove_file(&tmp_dst);
    }
    let mut db_out = File::create(&tmp_dst).with_context(|| {
        format!(
            "failed to create temp database {}",
            tmp_dst.to_string_lossy()
        )
    })?;
    db_out
        .write_all(&db_bytes)
        .context("failed to write staged database")?;
    db_out
        .flush()
        .context("failed to flush staged database")?;
    drop(db_out);

    if dst.exists() {
        std::fs::remove_file(&dst).with_context(|| {
            format!(
                "failed to remove existing database {}",
                dst.to_string_lossy()
            )
        })?;
    }
    std::fs::rename(&tmp_dst, &dst).with_context(|| {
        format!(
            "failed to move staged database to {}",
            dst.to_string_lossy()
        )
    })?;

    Ok(summary)
}

fn read_bundle(in_path: &Path) -> anyhow::Result<(Vec<u8>, ImportSummary)> {
    let in_file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.to_string_lossy()))?;
    let mut archive = ZipArchive::new(in_file).context("invalid zip archive")?;

    let mut manifest_text = String::new();
    archive
        .by_name(MANIFEST_ENTRY)
        .context("bundle missing manifest.json")?
        .read_to_string(&mut manifest_text)
        .context("failed to read manifest.json")?;
    let manifest: serde_json::Value =
        serde_json::from_str(&manifest_text).context("manifest.json is invalid JSON")?;
    let format = manifest
        .get("format")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    if format != BUNDLE_FORMAT {
        return Err(anyhow!("unsupported bundle format: {}", format));
    }

    let mut db_bytes = Vec::new();
    archive
        .by_name(DB_ENTRY)
        .context("bundle missing db/results.sqlite3")?
        .read_to_end(&mut db_bytes)
        .context("failed to extract database entry")?;

    let expected = manifest.get("dbSha256").and_then(|v| v.as_str());
    if let Some(expected) = expected {
        let actual = sha256_hex(&db_bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(anyhow!(
                "database checksum mismatch: manifest {} but entry hashes to {}",
                expected,
                actual
            ));
        }
    }

    Ok((
        db_bytes,
        ImportSummary {
            bundle_format_detected: BUNDLE_FORMAT.to_string(),
            checksum_verified: expected.is_some(),
        },
    ))
}

enum Sniffed {
    Zip,
    Sqlite,
    Unknown,
}

fn sniff(path: &Path) -> anyhow::Result<Sniffed> {
    let mut f = File::open(path)
        .with_context(|| format!("failed to open input file {}", path.to_string_lossy()))?;
    let mut sig = [0u8; 16];
    let mut read = 0;
    while read < sig.len() {
        let n = f
            .read(&mut sig[read..])
            .context("failed to read file signature")?;
        if n == 0 {
            break;
        }
        read += n;
    }
    if read >= ZIP_MAGIC.len() && sig[..4] == ZIP_MAGIC {
        return Ok(Sniffed::Zip);
    }
    if read == SQLITE_MAGIC.len() && &sig == SQLITE_MAGIC {
        return Ok(Sniffed::Sqlite);
    }
    Ok(Sniffed::Unknown)
}
