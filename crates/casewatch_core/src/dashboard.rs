use crate::{CaseStatus, StatusKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusCounts {
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
}

impl StatusCounts {
    pub fn get(&self, kind: StatusKind) -> usize {
        match kind {
            StatusKind::Pending => self.pending,
            StatusKind::Processing => self.processing,
            StatusKind::Completed => self.completed,
            StatusKind::Failed => self.failed,
        }
    }

    fn bump(&mut self, kind: StatusKind) {
        match kind {
            StatusKind::Pending => self.pending += 1,
            StatusKind::Processing => self.processing += 1,
            StatusKind::Completed => self.completed += 1,
            StatusKind::Failed => self.failed += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.pending + self.processing + self.completed + self.failed
    }
}

/// Aggregate over the list-level status endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DashboardSummary {
    pub counts: StatusCounts,
    pub total: usize,
    /// `(completed + failed) / total * 100`, rounded; 0 for an empty list.
    pub progress_percent: u8,
}

pub fn summarize(cases: &[CaseStatus]) -> DashboardSummary {
    let mut counts = StatusCounts::default();
    for case in cases {
        counts.bump(case.status);
    }
    let total = counts.total();
    let progress_percent = if total == 0 {
        0
    } else {
        let finished = (counts.completed + counts.failed) as f64;
        (finished / total as f64 * 100.0).round() as u8
    };
    DashboardSummary {
        counts,
        total,
        progress_percent,
    }
}
