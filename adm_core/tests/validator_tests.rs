use std::path::{Path, PathBuf};

use adm_core::types::types::ArtifactKind;
use adm_core::validator::{validate, MAX_ARTIFACT_BYTES, MIN_ARTIFACT_BYTES};

/// Creates a sparse file of exactly `size` bytes (content all zeros).
fn sparse_file(dir: &Path, name: &str, size: u64) -> PathBuf {
    let path = dir.join(name);
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(size).unwrap();
    path
}

/// Builds a minimal well-formed PE image of `size` bytes: MZ magic,
/// `e_lfanew` pointing at 0x80, and the PE signature there.
fn pe_image(size: usize) -> Vec<u8> {
    let mut image = vec![0u8; size];
    image[0] = 0x4D; // 'M'
    image[1] = 0x5A; // 'Z'
    image[60..64].copy_from_slice(&0x80u32.to_le_bytes());
    image[0x80..0x84].copy_from_slice(&[0x50, 0x45, 0x00, 0x00]);
    image
}

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

#[tokio::test]
async fn test_size_floor_boundary() {
    let dir = tempfile::tempdir().unwrap();

    let small = sparse_file(dir.path(), "small.bin", MIN_ARTIFACT_BYTES - 1);
    let result = validate(&small, ArtifactKind::Installer).await.unwrap();
    assert!(!result.valid);
    assert!(result.reason.unwrap().contains("too small"));

    let exact = sparse_file(dir.path(), "exact.bin", MIN_ARTIFACT_BYTES);
    let result = validate(&exact, ArtifactKind::Installer).await.unwrap();
    assert!(result.valid, "exactly 5 MiB must pass: {:?}", result.reason);
}

#[tokio::test]
async fn test_size_ceiling_boundary() {
    let dir = tempfile::tempdir().unwrap();

    let exact = sparse_file(dir.path(), "ceiling.bin", MAX_ARTIFACT_BYTES);
    let result = validate(&exact, ArtifactKind::Installer).await.unwrap();
    assert!(result.valid, "exactly 500 MiB must pass: {:?}", result.reason);

    let over = sparse_file(dir.path(), "over.bin", MAX_ARTIFACT_BYTES + 1);
    let result = validate(&over, ArtifactKind::Installer).await.unwrap();
    assert!(!result.valid);
    assert!(result.reason.unwrap().contains("large"));
}

#[tokio::test]
async fn test_self_update_accepts_well_formed_pe() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "update.exe",
        &pe_image(MIN_ARTIFACT_BYTES as usize),
    );

    let result = validate(&path, ArtifactKind::SelfUpdate).await.unwrap();
    assert!(result.valid, "{:?}", result.reason);
}

#[tokio::test]
async fn test_self_update_rejects_missing_magic_regardless_of_size() {
    let dir = tempfile::tempdir().unwrap();
    // Big enough to pass the size checks, but no MZ signature.
    let path = sparse_file(dir.path(), "not-an-exe.bin", MIN_ARTIFACT_BYTES);

    let result = validate(&path, ArtifactKind::SelfUpdate).await.unwrap();
    assert!(!result.valid);
    assert!(result
        .reason
        .unwrap()
        .contains("invalid executable format"));
}

#[tokio::test]
async fn test_self_update_rejects_out_of_bounds_pe_offset() {
    let dir = tempfile::tempdir().unwrap();
    let mut image = pe_image(MIN_ARTIFACT_BYTES as usize);
    // Point past the end of the file.
    image[60..64].copy_from_slice(&(MIN_ARTIFACT_BYTES as u32).to_le_bytes());
    let path = write_file(dir.path(), "bad-offset.exe", &image);

    let result = validate(&path, ArtifactKind::SelfUpdate).await.unwrap();
    assert!(!result.valid);
    assert!(result.reason.unwrap().contains("out of bounds"));
}

#[tokio::test]
async fn test_self_update_rejects_wrong_secondary_signature() {
    let dir = tempfile::tempdir().unwrap();
    let mut image = pe_image(MIN_ARTIFACT_BYTES as usize);
    image[0x80..0x84].copy_from_slice(b"NOPE");
    let path = write_file(dir.path(), "bad-sig.exe", &image);

    let result = validate(&path, ArtifactKind::SelfUpdate).await.unwrap();
    assert!(!result.valid);
    assert!(result.reason.unwrap().contains("PE signature"));
}

#[tokio::test]
async fn test_installer_kind_skips_pe_checks() {
    let dir = tempfile::tempdir().unwrap();
    // A zip-like bundle: no PE layout, still a valid installer artifact.
    let path = sparse_file(dir.path(), "bundle.zip", MIN_ARTIFACT_BYTES);

    let result = validate(&path, ArtifactKind::Installer).await.unwrap();
    assert!(result.valid);
}

#[tokio::test]
async fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = validate(&dir.path().join("absent.exe"), ArtifactKind::Installer).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_validation_never_deletes_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = sparse_file(dir.path(), "tiny.bin", 1024);

    let result = validate(&path, ArtifactKind::SelfUpdate).await.unwrap();
    assert!(!result.valid);
    assert!(path.exists(), "validation is side-effect-free");
}
