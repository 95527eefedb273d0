use crate::models::Update;
use crate::orchestrator::progress::PhasePlan;

/// How one update is taken through an install request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallMode {
    /// Payload already present; install directly.
    InstallOnly,
    /// Download first, then install.
    DownloadThenInstall,
    /// Not downloaded and downloading is disabled.
    Rejected,
}

impl InstallMode {
    pub fn resolve(update: &Update, download_before_install: bool) -> Self {
        match (update.is_downloaded, download_before_install) {
            (true, _) => Self::InstallOnly,
            (false, true) => Self::DownloadThenInstall,
            (false, false) => Self::Rejected,
        }
    }
}

/// Updates of one install request grouped by [`InstallMode`], input order kept.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InstallPlan {
    pub ready: Vec<Update>,
    pub to_download: Vec<Update>,
    pub rejected: Vec<Update>,
}

impl InstallPlan {
    pub fn build(updates: Vec<Update>, download_before_install: bool) -> Self {
        let mut plan = Self::default();
        for update in updates {
            match InstallMode::resolve(&update, download_before_install) {
                InstallMode::InstallOnly => plan.ready.push(update),
                InstallMode::DownloadThenInstall => plan.to_download.push(update),
                InstallMode::Rejected => plan.rejected.push(update),
            }
        }
        plan
    }

    pub fn phases(&self) -> PhasePlan {
        if self.to_download.is_empty() {
            PhasePlan::Single
        } else {
            PhasePlan::DownloadThenInstall
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.to_download.is_empty()
    }
}
