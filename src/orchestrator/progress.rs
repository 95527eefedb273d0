// Progress identifiers, two-phase blending and host-facing record builders

use crate::models::{DownloadPhase, DownloadProgress, ProgressRecord, Update};
use std::sync::atomic::{AtomicI32, Ordering};

const MB: u64 = 1_048_576;

/// Allocates activity ids for progress records.
///
/// Starts well above zero so records do not collide with ids the host uses for
/// its own progress.
#[derive(Debug)]
pub struct ProgressIds {
    last: AtomicI32,
}

impl ProgressIds {
    pub fn new(base: i32) -> Self {
        Self {
            last: AtomicI32::new(base),
        }
    }

    pub fn next(&self) -> i32 {
        self.last.fetch_add(1, Ordering::Relaxed) + 1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Download,
    Install,
}

/// How many phases the overall bar of a batch spans.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhasePlan {
    Single,
    DownloadThenInstall,
}

/// Map a phase-local percent onto the overall bar.
///
/// With two phases, download covers 0-50 and install covers 50-100; install at
/// 100 maps to exactly 100.
pub fn blend(plan: PhasePlan, phase: Phase, percent: i32) -> u8 {
    let percent = percent.clamp(0, 100) as u8;
    match (plan, phase) {
        (PhasePlan::Single, _) => percent,
        (PhasePlan::DownloadThenInstall, Phase::Download) => percent / 2,
        (PhasePlan::DownloadThenInstall, Phase::Install) => 50 + percent / 2,
    }
}

pub fn batch_record(batch_id: i32, phase: Phase, overall: u8) -> ProgressRecord {
    let (activity, status) = match phase {
        Phase::Download => ("Downloading updates", "Downloading"),
        Phase::Install => ("Installing updates", "Installing"),
    };
    ProgressRecord::new(batch_id, activity, format!("{}... {}%", status, overall))
        .with_percent(overall as i32)
}

pub fn download_record(
    item_id: i32,
    batch_id: i32,
    update: &Update,
    snapshot: &DownloadProgress,
    percent: u8,
) -> ProgressRecord {
    let status = match snapshot.current_item_phase {
        DownloadPhase::Downloading => format!(
            "{}mb / {}mb",
            snapshot.current_item_bytes_downloaded / MB,
            snapshot.current_item_bytes_to_download / MB
        ),
        DownloadPhase::Verifying => "Verifying".to_string(),
        DownloadPhase::Initializing => "Initializing".to_string(),
    };
    ProgressRecord::new(item_id, format!("Downloading {}", update.title), status)
        .with_parent(batch_id)
        .with_percent(percent as i32)
}

pub fn install_record(item_id: i32, batch_id: i32, update: &Update, percent: u8) -> ProgressRecord {
    ProgressRecord::new(
        item_id,
        format!("Installing {}", update.title),
        format!("Installing... {}%", percent),
    )
    .with_parent(batch_id)
    .with_percent(percent as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ids_are_unique_and_above_base() {
        let ids = ProgressIds::new(2000);
        assert_eq!(ids.next(), 2001);
        assert_eq!(ids.next(), 2002);
    }

    #[test]
    fn test_blend_endpoints() {
        let plan = PhasePlan::DownloadThenInstall;
        assert_eq!(blend(plan, Phase::Download, 0), 0);
        assert_eq!(blend(plan, Phase::Download, 100), 50);
        assert_eq!(blend(plan, Phase::Install, 0), 50);
        assert_eq!(blend(plan, Phase::Install, 100), 100);
        assert_eq!(blend(PhasePlan::Single, Phase::Install, 73), 73);
    }

    #[test]
    fn test_download_status_in_megabytes() {
        let update = Update::new("KB42");
        let snapshot = DownloadProgress {
            percent_complete: 40,
            current_item_index: 0,
            current_item_percent_complete: 40,
            current_item_phase: DownloadPhase::Downloading,
            current_item_bytes_downloaded: 3 * MB,
            current_item_bytes_to_download: 10 * MB,
            total_bytes_downloaded: 3 * MB,
            total_bytes_to_download: 10 * MB,
            current_item_result: None,
        };
        let record = download_record(2002, 2001, &update, &snapshot, 40);
        assert_eq!(record.status_description, "3mb / 10mb");
        assert_eq!(record.activity, "Downloading KB42");
        assert_eq!(record.parent_activity_id, Some(2001));
    }

    proptest! {
        #[test]
        fn prop_download_half_stays_in_lower_range(p in 0i32..=100) {
            let overall = blend(PhasePlan::DownloadThenInstall, Phase::Download, p);
            prop_assert!(overall <= 50);
        }

        #[test]
        fn prop_install_half_stays_in_upper_range(p in 0i32..=100) {
            let overall = blend(PhasePlan::DownloadThenInstall, Phase::Install, p);
            prop_assert!((50..=100).contains(&overall));
        }

        #[test]
        fn prop_blend_is_monotonic(a in 0i32..=100, b in 0i32..=100) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            for phase in [Phase::Download, Phase::Install] {
                let plan = PhasePlan::DownloadThenInstall;
                prop_assert!(blend(plan, phase, lo) <= blend(plan, phase, hi));
            }
            prop_assert!(
                blend(PhasePlan::DownloadThenInstall, Phase::Download, a)
                    <= blend(PhasePlan::DownloadThenInstall, Phase::Install, b)
            );
        }
    }
}
