use super::JobStatus;

/// Upper bound reported while pages are still being traversed
pub const TRAVERSAL_CEILING: f64 = 85.0;

/// Value reported while the working directory is being packaged
pub const ARCHIVING_PROGRESS: u8 = 90;

/// Keeps the percentage from saturating while the frontier is still shallow
pub const PROGRESS_HEADROOM: u64 = 5;

/// Computes a job's progress percentage (0–100)
///
/// During traversal this is
/// `min(85, downloaded / max(total, downloaded + headroom) * 85)`, which
/// leaves 85–100 for archiving. `Error` and `Cancelled` keep the traversal
/// value they stopped at.
pub fn progress_percent(status: JobStatus, files_downloaded: u64, total_files: u64) -> u8 {
    match status {
        JobStatus::Completed => 100,
        JobStatus::Archiving => ARCHIVING_PROGRESS,
        _ => {
            let denominator = total_files.max(files_downloaded + PROGRESS_HEADROOM) as f64;
            let ratio = files_downloaded as f64 / denominator;
            (ratio * TRAVERSAL_CEILING).min(TRAVERSAL_CEILING).round() as u8
        }
    }
}
