use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::CaseId;

/// IO requested by the reducer; executed by the status observer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    FetchStatus { case_id: CaseId },
    ProbeLive { case_id: CaseId },
    OpenChannel { case_id: CaseId },
    CloseChannel,
    ScheduleReconnect { case_id: CaseId, delay: Duration },
    CancelReconnect,
    StartPolling { case_id: CaseId, interval: Duration },
    StopPolling { case_id: CaseId },
    FetchUpdatesSince {
        case_id: CaseId,
        since: DateTime<Utc>,
    },
}
