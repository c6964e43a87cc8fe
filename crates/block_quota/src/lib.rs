//! Pure admission policy for uploads, downloads and deletes.
//!
//! None of these functions touch the database, the cache or the object
//! store: callers gather the inputs (current usage, the size delta, path
//! shape) and the policy just says yes or no. Keeping it pure makes it
//! exhaustively testable without standing up any collaborator.

/// Grace window under which an over-quota meta-file overwrite is still
/// allowed.
pub const METAFILE_THRESHOLD: i64 = 150 * 1024;

/// Hard monthly download traffic ceiling.
pub const TRAFFIC_THRESHOLD: i64 = 100 * 1024 * 1024 * 1024;

/// Upload admission:
/// - if the user isn't over quota, always allow;
/// - blocks (`is_block`) are never allowed past quota, regardless of size;
/// - meta-files get a grace window: an overwrite that shrinks or barely
///   grows the object (`size_change < METAFILE_THRESHOLD`) is still let
///   through so clients can update small book-keeping files even when
///   otherwise full.
pub fn upload(quota_reached: bool, size_change: i64, is_block: bool, is_overwrite: bool) -> bool {
    if !quota_reached {
        return true;
    }
    if is_block {
        return false;
    }
    is_overwrite && size_change < METAFILE_THRESHOLD
}

/// Download admission: a hard gate at the monthly traffic ceiling.
pub fn download(current_traffic_bytes: i64) -> bool {
    current_traffic_bytes <= TRAFFIC_THRESHOLD
}

/// Deletes can only reduce usage, so they are always allowed.
pub fn delete() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_allows_when_quota_not_reached() {
        assert!(upload(false, 999, true, false));
        assert!(upload(false, -1, false, false));
    }

    #[test]
    fn upload_denies_blocks_over_quota() {
        assert!(!upload(true, 1, true, false));
        assert!(!upload(true, 1, true, true));
    }

    #[test]
    fn upload_allows_small_overwrite_of_metafile_over_quota() {
        assert!(upload(true, METAFILE_THRESHOLD - 1, false, true));
        assert!(!upload(true, METAFILE_THRESHOLD, false, true));
    }

    #[test]
    fn upload_denies_non_overwrite_metafile_over_quota() {
        assert!(!upload(true, 1, false, false));
    }

    #[test]
    fn download_allows_up_to_threshold_inclusive() {
        assert!(download(TRAFFIC_THRESHOLD));
        assert!(!download(TRAFFIC_THRESHOLD + 1));
    }

    #[test]
    fn delete_is_always_allowed() {
        assert!(delete());
    }
}
