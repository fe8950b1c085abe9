use serde::Serialize;

/// Point-in-time progress for a single transfer.
///
/// Samples are ephemeral: recomputed on a throttled cadence and never
/// persisted. `percent` stays in `0..=99` while bytes are still flowing and
/// becomes exactly `100` only once the destination file has been finalized.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressSample {
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    /// Throughput over the interval since the previous sample, in bytes/sec.
    pub speed_bps: f64,
    /// Remaining bytes at the current throughput; `None` when throughput is
    /// zero or non-finite.
    pub eta_secs: Option<u64>,
    pub percent: u8,
}

impl ProgressSample {
    pub fn zero() -> Self {
        Self {
            bytes_downloaded: 0,
            total_bytes: None,
            speed_bps: 0.0,
            eta_secs: None,
            percent: 0,
        }
    }

    /// The terminal sample for a finished transfer.
    pub fn completed(bytes_downloaded: u64, total_bytes: Option<u64>) -> Self {
        Self {
            bytes_downloaded,
            total_bytes: total_bytes.or(Some(bytes_downloaded)),
            speed_bps: 0.0,
            eta_secs: Some(0),
            percent: 100,
        }
    }
}

/// Human-readable byte formatting.
pub fn format_bytes(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    let b = bytes as f64;
    if b >= GB {
        format!("{:.2} GB", b / GB)
    } else if b >= MB {
        format!("{:.2} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// Throughput formatting for status lines.
pub fn format_speed(bps: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    if bps < KB {
        format!("{:.0} B/s", bps)
    } else if bps < MB {
        format!("{:.0} KB/s", bps / KB)
    } else {
        format!("{:.1} MB/s", bps / MB)
    }
}
