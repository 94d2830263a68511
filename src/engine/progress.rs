//! Hunt progress aggregation.
//!
//! Everything here is a pure function over scan history and the active-station
//! roster. The scans table is the source of truth; the cached fields on a class
//! are recomputed from it through [`reconcile`].

use crate::entities::scan_entity;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

/// The part of a scan the progress math needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPoint {
    pub station_id: i64,
    pub scanned_at: DateTime<Utc>,
}

impl From<&scan_entity::Model> for ScanPoint {
    fn from(m: &scan_entity::Model) -> Self {
        ScanPoint {
            station_id: m.station_id,
            scanned_at: m.scanned_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressResult {
    /// Distinct active stations scanned
    pub completed_count: usize,
    pub total_stations: usize,
    pub progress_percentage: u32,
    pub is_completed: bool,
    /// Earliest scan of any counted station
    pub start_time: Option<DateTime<Utc>>,
    /// Latest per-station scan, only once completed
    pub end_time: Option<DateTime<Utc>>,
    /// Whole minutes between start and end, only once completed
    pub completion_time_minutes: Option<i64>,
}

/// Computes a class's progress from its scans.
///
/// Only stations present in `active_station_ids` count, and each station counts
/// once no matter how many scans reference it. With zero active stations a class
/// is never complete.
pub fn compute_progress(scans: &[ScanPoint], active_station_ids: &[i64]) -> ProgressResult {
    let active: HashSet<i64> = active_station_ids.iter().copied().collect();
    let total_stations = active.len();

    // station_id -> (first scan, last scan)
    let mut per_station: HashMap<i64, (DateTime<Utc>, DateTime<Utc>)> = HashMap::new();
    for scan in scans.iter().filter(|s| active.contains(&s.station_id)) {
        per_station
            .entry(scan.station_id)
            .and_modify(|(first, last)| {
                if scan.scanned_at < *first {
                    *first = scan.scanned_at;
                }
                if scan.scanned_at > *last {
                    *last = scan.scanned_at;
                }
            })
            .or_insert((scan.scanned_at, scan.scanned_at));
    }

    let completed_count = per_station.len();
    let is_completed = total_stations > 0 && completed_count >= total_stations;

    let start_time = per_station.values().map(|(first, _)| *first).min();
    let end_time = if is_completed {
        per_station.values().map(|(_, last)| *last).max()
    } else {
        None
    };

    let completion_time_minutes = match (start_time, end_time) {
        (Some(start), Some(end)) => Some(minutes_between(start, end)),
        _ => None,
    };

    ProgressResult {
        completed_count,
        total_stations,
        progress_percentage: percentage(completed_count, total_stations),
        is_completed,
        start_time,
        end_time,
        completion_time_minutes,
    }
}

fn percentage(done: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (100.0 * done as f64 / total as f64).round() as u32
}

/// Elapsed time rounded to the nearest whole minute.
pub fn minutes_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    ((end - start).num_milliseconds() as f64 / 60_000.0).round() as i64
}

/// Adds `station_id` to the cached scanned-set. Returns whether it was new.
pub fn merge_scanned_station(stations_scanned: &mut Vec<i64>, station_id: i64) -> bool {
    if stations_scanned.contains(&station_id) {
        return false;
    }
    stations_scanned.push(station_id);
    true
}

/// Completion latch evaluated after a scan.
///
/// A class that was already complete stays complete, even if stations were
/// activated since. Otherwise it completes once its scanned-set covers every
/// active station.
pub fn should_latch_completion(
    already_completed: bool,
    stations_scanned: &[i64],
    active_station_ids: &[i64],
) -> bool {
    if already_completed {
        return true;
    }
    if active_station_ids.is_empty() {
        return false;
    }
    let scanned: HashSet<i64> = stations_scanned.iter().copied().collect();
    active_station_ids.iter().all(|id| scanned.contains(id))
}

/// Denormalized progress fields cached on a class row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedProgress {
    pub stations_scanned: Vec<i64>,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_scan_at: Option<DateTime<Utc>>,
}

impl CachedProgress {
    /// Set-wise comparison; the order of `stations_scanned` is irrelevant.
    pub fn same_as(&self, other: &CachedProgress) -> bool {
        let mut a = self.stations_scanned.clone();
        let mut b = other.stations_scanned.clone();
        a.sort_unstable();
        a.dedup();
        b.sort_unstable();
        b.dedup();
        a == b
            && self.is_completed == other.is_completed
            && self.completed_at == other.completed_at
            && self.last_scan_at == other.last_scan_at
    }
}

/// Rebuilds the cached fields from scan history.
///
/// The scanned-set is every distinct station in the history (inactive ones
/// included) in first-scan order. The completion latch is preserved: a cached
/// completion is never revoked, and a newly detected completion is stamped with
/// the progress end time.
pub fn reconcile(
    cached: &CachedProgress,
    scans: &[ScanPoint],
    active_station_ids: &[i64],
) -> CachedProgress {
    let mut ordered = scans.to_vec();
    ordered.sort_by_key(|s| s.scanned_at);

    let mut stations_scanned = Vec::new();
    for scan in &ordered {
        merge_scanned_station(&mut stations_scanned, scan.station_id);
    }

    let progress = compute_progress(scans, active_station_ids);
    let is_completed =
        should_latch_completion(cached.is_completed, &stations_scanned, active_station_ids);
    let completed_at = match (is_completed, cached.is_completed) {
        (false, _) => None,
        (true, true) => cached.completed_at.or(progress.end_time),
        (true, false) => progress.end_time,
    };

    CachedProgress {
        stations_scanned,
        is_completed,
        completed_at,
        last_scan_at: ordered.last().map(|s| s.scanned_at).or(cached.last_scan_at),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 20, h, m, 0).unwrap()
    }

    fn scan(station_id: i64, when: DateTime<Utc>) -> ScanPoint {
        ScanPoint {
            station_id,
            scanned_at: when,
        }
    }

    #[test]
    fn test_two_station_scenario() {
        let scans = vec![scan(1, at(10, 0)), scan(2, at(10, 5))];
        let p = compute_progress(&scans, &[1, 2]);
        assert_eq!(p.completed_count, 2);
        assert_eq!(p.total_stations, 2);
        assert_eq!(p.progress_percentage, 100);
        assert!(p.is_completed);
        assert_eq!(p.start_time, Some(at(10, 0)));
        assert_eq!(p.end_time, Some(at(10, 5)));
        assert_eq!(p.completion_time_minutes, Some(5));
    }

    #[test]
    fn test_no_scans() {
        let p = compute_progress(&[], &[1, 2, 3]);
        assert_eq!(p.completed_count, 0);
        assert_eq!(p.progress_percentage, 0);
        assert!(!p.is_completed);
        assert_eq!(p.start_time, None);
        assert_eq!(p.end_time, None);
        assert_eq!(p.completion_time_minutes, None);
    }

    #[test]
    fn test_partial_progress_has_start_but_no_end() {
        let scans = vec![scan(1, at(9, 30)), scan(3, at(9, 45))];
        let p = compute_progress(&scans, &[1, 2, 3]);
        assert_eq!(p.completed_count, 2);
        assert_eq!(p.progress_percentage, 67);
        assert!(!p.is_completed);
        assert_eq!(p.start_time, Some(at(9, 30)));
        assert_eq!(p.end_time, None);
        assert_eq!(p.completion_time_minutes, None);
    }

    #[test]
    fn test_percentage_rounds() {
        let p = compute_progress(&[scan(1, at(9, 0))], &[1, 2, 3]);
        assert_eq!(p.progress_percentage, 33);
    }

    #[test]
    fn test_duplicate_scans_are_deduped() {
        // 同一站点重复扫描：start 取全局最早，end 取每站最晚的最大值
        let scans = vec![
            scan(1, at(10, 0)),
            scan(1, at(10, 30)),
            scan(2, at(10, 10)),
        ];
        let p = compute_progress(&scans, &[1, 2]);
        assert_eq!(p.completed_count, 2);
        assert!(p.is_completed);
        assert_eq!(p.start_time, Some(at(10, 0)));
        assert_eq!(p.end_time, Some(at(10, 30)));
        assert_eq!(p.completion_time_minutes, Some(30));
    }

    #[test]
    fn test_inactive_station_scans_do_not_count() {
        let scans = vec![scan(1, at(10, 0)), scan(9, at(10, 5))];
        let p = compute_progress(&scans, &[1, 2]);
        assert_eq!(p.completed_count, 1);
        assert!(!p.is_completed);
    }

    #[test]
    fn test_zero_active_stations_never_complete() {
        let p = compute_progress(&[scan(1, at(10, 0))], &[]);
        assert_eq!(p.total_stations, 0);
        assert_eq!(p.completed_count, 0);
        assert_eq!(p.progress_percentage, 0);
        assert!(!p.is_completed);
    }

    #[test]
    fn test_merge_scanned_station_is_idempotent() {
        let mut scanned = vec![1, 2];
        assert!(!merge_scanned_station(&mut scanned, 2));
        assert_eq!(scanned.len(), 2);
        assert!(merge_scanned_station(&mut scanned, 3));
        assert_eq!(scanned, vec![1, 2, 3]);
    }

    #[test]
    fn test_latch_completes_on_full_coverage() {
        assert!(!should_latch_completion(false, &[1], &[1, 2]));
        assert!(should_latch_completion(false, &[2, 1], &[1, 2]));
        assert!(should_latch_completion(false, &[1, 2, 7], &[1, 2]));
    }

    #[test]
    fn test_latch_never_reverts() {
        // 新启用的站点 3 不会撤销已完成状态
        assert!(should_latch_completion(true, &[1, 2], &[1, 2, 3]));
        assert!(should_latch_completion(true, &[], &[]));
    }

    #[test]
    fn test_latch_with_no_active_stations() {
        assert!(!should_latch_completion(false, &[1, 2], &[]));
    }

    #[test]
    fn test_reconcile_repairs_drifted_cache() {
        let cached = CachedProgress {
            stations_scanned: vec![1],
            is_completed: false,
            completed_at: None,
            last_scan_at: Some(at(10, 0)),
        };
        let scans = vec![scan(2, at(10, 5)), scan(1, at(10, 0))];
        let fixed = reconcile(&cached, &scans, &[1, 2]);
        assert_eq!(fixed.stations_scanned, vec![1, 2]);
        assert!(fixed.is_completed);
        assert_eq!(fixed.completed_at, Some(at(10, 5)));
        assert_eq!(fixed.last_scan_at, Some(at(10, 5)));
        assert!(!fixed.same_as(&cached));
    }

    #[test]
    fn test_reconcile_keeps_latch() {
        let cached = CachedProgress {
            stations_scanned: vec![1, 2],
            is_completed: true,
            completed_at: Some(at(11, 0)),
            last_scan_at: Some(at(11, 0)),
        };
        let scans = vec![scan(1, at(10, 0)), scan(2, at(11, 0))];
        // 站点 3 后来启用，已完成的班级仍保持完成
        let fixed = reconcile(&cached, &scans, &[1, 2, 3]);
        assert!(fixed.is_completed);
        assert_eq!(fixed.completed_at, Some(at(11, 0)));
        assert!(fixed.same_as(&cached));
    }

    #[test]
    fn test_same_as_ignores_order() {
        let a = CachedProgress {
            stations_scanned: vec![2, 1],
            is_completed: false,
            completed_at: None,
            last_scan_at: None,
        };
        let b = CachedProgress {
            stations_scanned: vec![1, 2],
            ..a.clone()
        };
        assert!(a.same_as(&b));
    }
}
