use std::io::{self, SeekFrom};
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::types::types::ArtifactKind;

/// Below this an installer payload cannot be genuine.
pub const MIN_ARTIFACT_BYTES: u64 = 5 * 1024 * 1024;

/// Above this the payload is implausibly large, likely corrupted.
pub const MAX_ARTIFACT_BYTES: u64 = 500 * 1024 * 1024;

/// The PE header pointer lives at this fixed offset in the DOS header.
const PE_OFFSET_FIELD: u64 = 60;

/// A DOS header must be at least this long for the PE pointer to exist.
const MIN_DOS_HEADER_LEN: u64 = 64;

const PROBE_LEN: usize = 1024;

/// Outcome of inspecting a completed artifact. An invalid file is a normal
/// result, never an error; the caller decides disposition.
#[derive(Debug, Clone)]
pub struct ValidationResult {
    pub valid: bool,
    pub reason: Option<String>,
}

impl ValidationResult {
    fn pass() -> Self {
        Self {
            valid: true,
            reason: None,
        }
    }

    fn fail(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Inspect `path` for structural correctness.
///
/// Side-effect-free: the file is only ever read. The `Err` arm is reserved
/// for the file being unopenable/unstatable at all; every judgement about
/// the content comes back as an `Ok(ValidationResult)`.
pub async fn validate(path: &Path, kind: ArtifactKind) -> Result<ValidationResult, io::Error> {
    let metadata = tokio::fs::metadata(path).await?;
    let size = metadata.len();
    log::debug!("validating {} ({} bytes)", path.display(), size);

    if size < MIN_ARTIFACT_BYTES {
        return Ok(ValidationResult::fail(format!(
            "file is too small ({} bytes, floor {}), likely corrupted or incomplete",
            size, MIN_ARTIFACT_BYTES
        )));
    }
    if size > MAX_ARTIFACT_BYTES {
        return Ok(ValidationResult::fail(format!(
            "file is unusually large ({} bytes, ceiling {}), possibly corrupted",
            size, MAX_ARTIFACT_BYTES
        )));
    }

    let mut file = File::open(path).await?;

    if kind == ArtifactKind::SelfUpdate {
        if let Err(reason) = check_pe_layout(&mut file, size).await {
            return Ok(ValidationResult::fail(reason));
        }
    }

    if let Err(reason) = check_integrity(&mut file, size).await {
        return Ok(ValidationResult::fail(reason));
    }

    Ok(ValidationResult::pass())
}

/// Walk the executable-format signatures: `MZ` at offset 0, the PE pointer
/// at offset 60, and `PE\0\0` at the pointed-to offset.
async fn check_pe_layout(file: &mut File, size: u64) -> Result<(), String> {
    let mut dos_header = [0u8; MIN_DOS_HEADER_LEN as usize];
    file.seek(SeekFrom::Start(0))
        .await
        .map_err(|e| format!("invalid executable format: {}", e))?;
    file.read_exact(&mut dos_header)
        .await
        .map_err(|e| format!("invalid executable format: {}", e))?;

    if dos_header[0] != 0x4D || dos_header[1] != 0x5A {
        return Err("invalid executable format: missing MZ signature".to_string());
    }

    let pe_offset = u32::from_le_bytes([
        dos_header[PE_OFFSET_FIELD as usize],
        dos_header[PE_OFFSET_FIELD as usize + 1],
        dos_header[PE_OFFSET_FIELD as usize + 2],
        dos_header[PE_OFFSET_FIELD as usize + 3],
    ]) as u64;

    if pe_offset < MIN_DOS_HEADER_LEN || pe_offset > size.saturating_sub(4) {
        return Err(format!(
            "invalid executable format: PE header offset {} out of bounds",
            pe_offset
        ));
    }

    let mut pe_sig = [0u8; 4];
    file.seek(SeekFrom::Start(pe_offset))
        .await
        .map_err(|e| format!("invalid executable format: {}", e))?;
    file.read_exact(&mut pe_sig)
        .await
        .map_err(|e| format!("invalid executable format: {}", e))?;

    if pe_sig != [0x50, 0x45, 0x00, 0x00] {
        return Err("invalid executable format: missing PE signature".to_string());
    }

    Ok(())
}

/// Coarse corruption check: the start, middle, and end of the file must all
/// read back successfully.
async fn check_integrity(file: &mut File, size: u64) -> Result<(), String> {
    let probe = PROBE_LEN.min(size as usize);
    let offsets = [0, size / 2, size.saturating_sub(probe as u64)];

    for offset in offsets {
        let mut buf = vec![0u8; probe.min((size - offset) as usize)];
        if let Err(e) = file.seek(SeekFrom::Start(offset)).await {
            return Err(format!("integrity check failed at offset {}: {}", offset, e));
        }
        if let Err(e) = file.read_exact(&mut buf).await {
            return Err(format!("integrity check failed at offset {}: {}", offset, e));
        }
    }

    Ok(())
}
