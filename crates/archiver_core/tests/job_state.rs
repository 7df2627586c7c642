use std::time::Duration;

use archiver_core::{DownloadCounters, ExportSummary, JobId, JobState, TransitionError};
use chrono::{TimeZone, Utc};

#[test]
fn job_id_combines_channel_and_start_time() {
    let started = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let id = JobId::new("123", started);
    assert_eq!(id.as_str(), format!("123-{}", started.timestamp_millis()));
}

#[test]
fn full_happy_path_is_accepted() {
    let mut state = JobState::Starting;
    for next in [
        JobState::Fetching,
        JobState::Processing,
        JobState::Fetching,
        JobState::Processing,
        JobState::Rendering,
        JobState::MovingAssets,
        JobState::Finalizing,
        JobState::Succeeded,
    ] {
        state.advance(next).unwrap();
    }
    assert!(state.is_terminal());
}

#[test]
fn empty_history_goes_straight_from_fetching_to_rendering() {
    let mut state = JobState::Starting;
    state.advance(JobState::Fetching).unwrap();
    state.advance(JobState::Rendering).unwrap();
    assert_eq!(state, JobState::Rendering);
}

#[test]
fn any_live_state_may_fail() {
    for from in [
        JobState::Starting,
        JobState::Fetching,
        JobState::Processing,
        JobState::Rendering,
        JobState::MovingAssets,
        JobState::Finalizing,
    ] {
        assert!(from.can_advance_to(JobState::Failed), "{from} -> failed");
    }
}

#[test]
fn terminal_states_are_final() {
    let mut state = JobState::Succeeded;
    let err = state.advance(JobState::Failed).unwrap_err();
    assert_eq!(
        err,
        TransitionError {
            from: JobState::Succeeded,
            to: JobState::Failed
        }
    );
    assert_eq!(state, JobState::Succeeded);
}

#[test]
fn skipping_rendering_is_rejected() {
    let mut state = JobState::Processing;
    assert!(state.advance(JobState::Finalizing).is_err());
    assert_eq!(state, JobState::Processing);
}

#[test]
fn summary_text_reports_counts() {
    let summary = ExportSummary {
        channel_name: "general".into(),
        channel_id: "42".into(),
        batches: 3,
        messages: 250,
        duration: Duration::from_secs(61),
        downloads: DownloadCounters {
            downloaded: 7,
            cache_hits: 4,
            content_duplicates: 1,
            failures: 2,
        },
        stopped_at_batch_limit: true,
    };
    let text = summary.to_text();
    assert!(text.contains("#general (42)"));
    assert!(text.contains("completed in 1m 1s"));
    assert!(text.contains("Batches: 3"));
    assert!(text.contains("Messages: 250"));
    assert!(text.contains("Files downloaded: 7 (cache hits: 4, duplicate content: 1, failed: 2)"));
    assert!(text.contains("batch limit"));
}
