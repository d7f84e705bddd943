use casewatch_app::render::{summary_line, TransitionPrinter};
use casewatch_core::{
    summarize, CaseId, CaseStatus, ConnectionState, ErrorKind, StatusError, StatusKind, StatusView,
};
use casewatch_engine::CaseListView;
use chrono::{DateTime, Local, TimeZone};
use pretty_assertions::assert_eq;

fn now() -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
}

fn status(case_id: &str, kind: StatusKind, stage: &str) -> CaseStatus {
    CaseStatus {
        case_id: CaseId::new(case_id),
        status: kind,
        last_update: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        case_stage: stage.to_string(),
        ai_processed: false,
        errors: Vec::new(),
    }
}

fn polling_view(kind: StatusKind, stage: &str) -> StatusView {
    StatusView {
        case_id: Some(CaseId::new("case-42")),
        status: Some(status("case-42", kind, stage)),
        connection: ConnectionState::Polling,
        is_polling: true,
        ..StatusView::default()
    }
}

#[test]
fn prints_only_visible_changes() {
    let mut printer = TransitionPrinter::new();

    let first = printer.observe(&polling_view(StatusKind::Pending, "intake"), now());
    assert_eq!(
        first.as_deref(),
        Some("2024-03-01 09:30:00  case-42  pending  [polling]  stage=intake")
    );
    assert_eq!(
        printer.observe(&polling_view(StatusKind::Pending, "intake"), now()),
        None
    );

    let next = printer.observe(&polling_view(StatusKind::Processing, "analysis"), now());
    assert_eq!(
        next.as_deref(),
        Some("2024-03-01 09:30:00  case-42  processing  [polling]  stage=analysis")
    );
}

#[test]
fn loading_and_errors_are_labelled() {
    let mut printer = TransitionPrinter::new();
    let loading = StatusView {
        case_id: Some(CaseId::new("case-7")),
        is_loading: true,
        ..StatusView::default()
    };
    assert_eq!(
        printer.observe(&loading, now()).as_deref(),
        Some("2024-03-01 09:30:00  case-7  loading  [idle]")
    );

    let failed = StatusView {
        case_id: Some(CaseId::new("case-7")),
        error: Some(StatusError::new(ErrorKind::Auth, "401 Unauthorized")),
        ..StatusView::default()
    };
    let line = printer.observe(&failed, now()).unwrap();
    assert!(line.ends_with("error=auth: 401 Unauthorized"), "{line}");
}

#[test]
fn views_without_a_case_are_skipped() {
    let mut printer = TransitionPrinter::new();
    assert_eq!(printer.observe(&StatusView::default(), now()), None);
}

#[test]
fn summary_lists_every_status_and_progress() {
    let cases = vec![
        status("1", StatusKind::Completed, ""),
        status("2", StatusKind::Processing, ""),
        status("3", StatusKind::Pending, ""),
    ];
    let view = CaseListView {
        summary: summarize(&cases),
        cases_status: cases,
        is_loading: false,
        error: None,
    };
    assert_eq!(
        summary_line(&view, now()),
        "2024-03-01 09:30:00  3 cases  pending 1  processing 1  completed 1  failed 0  progress 33%"
    );
}
