use crate::model::Participant;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Soft-deleted rows are purgeable after this grace window.
pub const PURGE_GRACE_DAYS: i64 = 7;

pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantStats {
    pub count: usize,
    pub avg_score: i64,
    pub max_score: i64,
}

pub fn participant_stats(participants: &[Participant]) -> ParticipantStats {
    if participants.is_empty() {
        return ParticipantStats {
            count: 0,
            avg_score: 0,
            max_score: 0,
        };
    }
    let count = participants.len();
    let sum: f64 = participants.iter().map(|p| p.score).sum();
    let max = participants
        .iter()
        .map(|p| p.score)
        .fold(f64::MIN, f64::max);
    ParticipantStats {
        count,
        avg_score: (sum / count as f64).round() as i64,
        max_score: max.round() as i64,
    }
}

/// Duration in minutes for a session. An explicit stored total wins; else the
/// timestamp delta, rounded, clamped so distinct timestamps never report a
/// zero-minute session. `None` when neither source is usable.
pub fn session_duration_minutes(
    started_at: Option<&str>,
    ended_at: Option<&str>,
    total_time_minutes: Option<i64>,
) -> Option<i64> {
    if let Some(total) = total_time_minutes.filter(|t| *t > 0) {
        return Some(total);
    }
    let start = started_at.and_then(parse_timestamp)?;
    let end = ended_at.and_then(parse_timestamp)?;
    let ms = (end - start).num_milliseconds();
    let minutes = (ms as f64 / 60_000.0).round() as i64;
    Some(minutes.max(1))
}

/// Stable top-N by descending count; ties break on the key so repeated runs
/// over the same input always agree.
pub fn top_n(counts: &HashMap<String, i64>, n: usize) -> Vec<(String, i64)> {
    let mut items: Vec<(String, i64)> = counts.iter().map(|(k, v)| (k.clone(), *v)).collect();
    items.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    items.truncate(n);
    items
}

/// Counts values into a histogram; missing/blank values land under "unknown".
pub fn histogram<'a, I>(values: I) -> HashMap<String, i64>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    let mut counts = HashMap::new();
    for v in values {
        let key = match v {
            Some(s) if !s.is_empty() => s.to_string(),
            _ => "unknown".to_string(),
        };
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

/// Whole days left before a soft-deleted row is permanently purgeable:
/// `max(0, ceil(deleted_at + grace - now))`. Never negative, and
/// non-increasing as `now` advances.
pub fn days_until_purge(deleted_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let deadline = deleted_at + Duration::days(PURGE_GRACE_DAYS);
    let secs = (deadline - now).num_seconds();
    if secs <= 0 {
        0
    } else {
        (secs + 86_399) / 86_400
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(score: f64) -> Participant {
        Participant {
            user_id: None,
            nickname: "p".to_string(),
            score,
            avatar: None,
        }
    }

    #[test]
    fn stats_over_three_participants() {
        let stats = participant_stats(&[p(80.0), p(60.0), p(100.0)]);
        assert_eq!(stats.count, 3);
        assert_eq!(stats.avg_score, 80);
        assert_eq!(stats.max_score, 100);
    }

    #[test]
    fn stats_over_empty_list_are_zero() {
        let stats = participant_stats(&[]);
        assert_eq!(stats.count, 0);
        assert_eq!(stats.avg_score, 0);
        assert_eq!(stats.max_score, 0);
    }

    #[test]
    fn avg_rounds_to_nearest() {
        // 70 + 75 = 145 / 2 = 72.5 -> 73
        let stats = participant_stats(&[p(70.0), p(75.0)]);
        assert_eq!(stats.avg_score, 73);
    }

    #[test]
    fn thirty_second_session_clamps_to_one_minute() {
        let d = session_duration_minutes(
            Some("2026-03-01T10:00:00Z"),
            Some("2026-03-01T10:00:30Z"),
            None,
        );
        assert_eq!(d, Some(1));
    }

    #[test]
    fn timestamp_delta_rounds_to_minutes() {
        let d = session_duration_minutes(
            Some("2026-03-01T10:00:00Z"),
            Some("2026-03-01T10:29:40Z"),
            None,
        );
        assert_eq!(d, Some(30));
    }

    #[test]
    fn explicit_total_wins_over_timestamps() {
        let d = session_duration_minutes(
            Some("2026-03-01T10:00:00Z"),
            Some("2026-03-01T10:29:40Z"),
            Some(45),
        );
        assert_eq!(d, Some(45));
    }

    #[test]
    fn duration_needs_both_timestamps() {
        assert_eq!(
            session_duration_minutes(Some("2026-03-01T10:00:00Z"), None, None),
            None
        );
        assert_eq!(session_duration_minutes(None, None, None), None);
    }

    #[test]
    fn top_n_orders_by_count_then_key() {
        let mut counts = HashMap::new();
        counts.insert("geo".to_string(), 4);
        counts.insert("math".to_string(), 9);
        counts.insert("art".to_string(), 4);
        counts.insert("bio".to_string(), 1);
        let top = top_n(&counts, 3);
        assert_eq!(
            top,
            vec![
                ("math".to_string(), 9),
                ("art".to_string(), 4),
                ("geo".to_string(), 4),
            ]
        );
    }

    #[test]
    fn purge_countdown_is_nonnegative_and_nonincreasing() {
        let deleted = parse_timestamp("2026-03-01T12:00:00Z").unwrap();
        let mut prev = i64::MAX;
        for hours in [0, 1, 24, 100, 167, 168, 500] {
            let now = deleted + Duration::hours(hours);
            let left = days_until_purge(deleted, now);
            assert!(left >= 0);
            assert!(left <= prev);
            prev = left;
        }
        assert_eq!(days_until_purge(deleted, deleted), PURGE_GRACE_DAYS);
        assert_eq!(
            days_until_purge(deleted, deleted + Duration::days(30)),
            0
        );
        // A second short of the deadline still counts as one day left.
        assert_eq!(
            days_until_purge(
                deleted,
                deleted + Duration::days(PURGE_GRACE_DAYS) - Duration::seconds(1)
            ),
            1
        );
    }

    #[test]
    fn histogram_buckets_missing_values_as_unknown() {
        let counts = histogram(vec![Some("science"), Some("science"), None, Some("")]);
        assert_eq!(counts["science"], 2);
        assert_eq!(counts["unknown"], 2);
    }
}
