use chrono::{DateTime, FixedOffset};
use log::warn;

use crate::time_entry::TimeEntry;

/// 同じユーザーで時間帯が重なっているtime entryの組を返す。
///
/// 終了していないtime entryは対象外とする。組は入力順に並ぶ。
pub fn find_overlaps(entries: &[TimeEntry]) -> Vec<(&TimeEntry, &TimeEntry)> {
    let finished: Vec<_> = entries.iter().filter(|entry| entry.end.is_some()).collect();

    finished
        .iter()
        .enumerate()
        .flat_map(|(i, a)| finished[i + 1..].iter().map(move |b| (*a, *b)))
        .filter(|(a, b)| a.user_id == b.user_id && overlaps(a, b))
        .collect()
}

/// 重なっているtime entryを警告として出力し、その件数を返す。
pub fn warn_overlaps(entries: &[TimeEntry]) -> usize {
    let overlaps = find_overlaps(entries);
    for (a, b) in &overlaps {
        warn!(
            "Overlapping time entries found:\n{}\nand\n{}",
            short_summary(a),
            short_summary(b)
        );
    }
    overlaps.len()
}

fn overlaps(a: &TimeEntry, b: &TimeEntry) -> bool {
    match (a.end, b.end) {
        (Some(a_end), Some(b_end)) => a.start < b_end && b.start < a_end,
        _ => false,
    }
}

/// `<description> from 09:00 AM to 10:00 AM`の形式で表示する。
///
/// 時刻はtime entryに記録されたUTCオフセットのまま表示する。
fn short_summary(entry: &TimeEntry) -> String {
    let format = |time: DateTime<FixedOffset>| time.format("%I:%M %p").to_string();
    let end = entry.end.map(format).unwrap_or_else(|| "now".to_string());
    format!("{} from {} to {}", entry.description, format(entry.start), end)
}

#[cfg(test)]
mod tests {
    use chrono::{FixedOffset, TimeZone};
    use rstest::rstest;

    use super::{find_overlaps, short_summary, warn_overlaps};
    use crate::time_entry::TimeEntry;

    /// 2016-03-01の`start_hour`時から`end_hour`時(UTC)までのtime entryを作成する。
    fn entry(user_id: u64, description: &str, start_hour: u32, end_hour: Option<u32>) -> TimeEntry {
        entry_at(0, user_id, description, start_hour, end_hour)
    }

    /// UTCから`offset_hours`時間ずれたオフセットでtime entryを作成する。
    fn entry_at(
        offset_hours: i32,
        user_id: u64,
        description: &str,
        start_hour: u32,
        end_hour: Option<u32>,
    ) -> TimeEntry {
        let offset = FixedOffset::east_opt(offset_hours * 3600).unwrap();
        TimeEntry {
            user_id,
            project: None,
            description: description.to_string(),
            start: offset.with_ymd_and_hms(2016, 3, 1, start_hour, 0, 0).unwrap(),
            end: end_hour.map(|hour| offset.with_ymd_and_hms(2016, 3, 1, hour, 0, 0).unwrap()),
            duration: 0,
            tags: vec![],
        }
    }

    #[rstest]
    #[case::disjoint(vec![entry(1, "a", 9, Some(10)), entry(1, "b", 11, Some(12))], vec![])]
    #[case::adjacent(vec![entry(1, "a", 9, Some(10)), entry(1, "b", 10, Some(11))], vec![])]
    #[case::overlap(vec![entry(1, "a", 9, Some(11)), entry(1, "b", 10, Some(12))], vec![("a", "b")])]
    #[case::contained(vec![entry(1, "a", 9, Some(12)), entry(1, "b", 10, Some(11))], vec![("a", "b")])]
    #[case::other_user(vec![entry(1, "a", 9, Some(11)), entry(2, "b", 10, Some(12))], vec![])]
    #[case::running(vec![entry(1, "a", 9, Some(11)), entry(1, "b", 10, None)], vec![])]
    fn test_find_overlaps(#[case] entries: Vec<TimeEntry>, #[case] expected: Vec<(&str, &str)>) {
        let overlaps: Vec<_> = find_overlaps(&entries)
            .into_iter()
            .map(|(a, b)| (a.description.as_str(), b.description.as_str()))
            .collect();

        assert_eq!(overlaps, expected);
    }

    #[test]
    fn test_warn_overlaps_counts_pairs() {
        let entries = vec![
            entry(1, "a", 9, Some(12)),
            entry(1, "b", 10, Some(11)),
            entry(1, "c", 10, Some(13)),
        ];

        assert_eq!(warn_overlaps(&entries), 3);
    }

    #[test]
    fn test_short_summary_running_entry() {
        assert_eq!(
            short_summary(&entry(1, "coding", 9, None)),
            "coding from 09:00 AM to now"
        );
    }

    /// 時刻は実行環境のタイムゾーンではなく、time entryのオフセットで表示する。
    #[rstest]
    #[case::utc(0)]
    #[case::tokyo(9)]
    #[case::new_york(-5)]
    fn test_short_summary_keeps_entry_offset(#[case] offset_hours: i32) {
        let summary = short_summary(&entry_at(offset_hours, 1, "review", 9, Some(14)));

        assert_eq!(summary, "review from 09:00 AM to 02:00 PM");
    }

    /// オフセットが異なっても同じ時刻を指していれば重なりとして扱う。
    #[test]
    fn test_find_overlaps_across_offsets() {
        let entries = vec![
            entry_at(0, 1, "a", 9, Some(11)),
            entry_at(1, 1, "b", 11, Some(12)),
        ];

        assert_eq!(find_overlaps(&entries).len(), 1);
    }
}
