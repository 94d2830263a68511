//! Prize drawing: eligibility, ticket weights and winner selection.
//!
//! Selection is weighted sampling without replacement done the ticket way:
//! every eligible class gets `weight` tickets, the whole pool is shuffled, and
//! the first distinct classes in shuffled order win.

use super::progress::{ProgressResult, ScanPoint, compute_progress};
use crate::entities::{DrawingStatus, drawings::DrawingWinner, drawings::WeightingFactors};
use crate::error::{AppError, AppResult};
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::HashSet;

/// A class competing in a drawing, with its full scan history.
#[derive(Debug, Clone)]
pub struct ClassEntry {
    pub class_id: i64,
    pub class_name: String,
    pub class_code: String,
    pub teacher_id: i64,
    pub scans: Vec<ScanPoint>,
}

/// An eligible class and the number of tickets it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Entrant {
    pub class_id: i64,
    pub class_name: String,
    pub class_code: String,
    pub teacher_id: i64,
    pub completed_count: usize,
    pub completion_time_minutes: Option<i64>,
    pub weight: u32,
}

/// Checks that a drawing may be run at all.
pub fn check_run_preconditions(status: DrawingStatus, number_of_winners: i64) -> AppResult<()> {
    if number_of_winners < 1 {
        return Err(AppError::ValidationError(
            "numberOfWinners must be at least 1".into(),
        ));
    }
    if status == DrawingStatus::Completed {
        return Err(AppError::Conflict("Drawing has already been completed".into()));
    }
    Ok(())
}

/// Ticket count for one eligible class.
///
/// `1 + completed_count * stations_found`, plus a flat `completion_time` bonus
/// when the class found every station with a positive elapsed time. The bonus
/// does not scale with speed. Rounded, never below 1.
pub fn compute_weight(progress: &ProgressResult, factors: &WeightingFactors) -> u32 {
    let mut weight = 1.0;
    weight += progress.completed_count as f64 * factors.stations_found;

    let found_all = progress.completed_count == progress.total_stations;
    if found_all && progress.start_time.is_some() {
        if let Some(minutes) = progress.completion_time_minutes {
            if minutes > 0 && factors.completion_time != 0.0 {
                weight += factors.completion_time;
            }
        }
    }

    let rounded = weight.round();
    if rounded.is_nan() || rounded < 1.0 {
        1
    } else {
        rounded.min(u32::MAX as f64) as u32
    }
}

/// Eligibility pass: keeps the classes that scanned every active station.
///
/// Progress is always recomputed from scan history, never read from the
/// cached flags on the class. Zero active stations is an error because
/// eligibility cannot be decided.
pub fn eligible_entrants(
    classes: &[ClassEntry],
    active_station_ids: &[i64],
    factors: &WeightingFactors,
) -> AppResult<Vec<Entrant>> {
    if active_station_ids.is_empty() {
        return Err(AppError::ValidationError(
            "No active stations; eligibility cannot be determined".into(),
        ));
    }

    let entrants = classes
        .iter()
        .filter_map(|class| {
            let progress = compute_progress(&class.scans, active_station_ids);
            if progress.completed_count < progress.total_stations {
                return None;
            }
            Some(Entrant {
                class_id: class.class_id,
                class_name: class.class_name.clone(),
                class_code: class.class_code.clone(),
                teacher_id: class.teacher_id,
                completed_count: progress.completed_count,
                completion_time_minutes: progress.completion_time_minutes,
                weight: compute_weight(&progress, factors),
            })
        })
        .collect();

    Ok(entrants)
}

/// One ticket per unit of weight, each holding an index into `entrants`.
pub fn build_entry_pool(entrants: &[Entrant]) -> Vec<usize> {
    let capacity = entrants.iter().map(|e| e.weight as usize).sum();
    let mut pool = Vec::with_capacity(capacity);
    for (idx, entrant) in entrants.iter().enumerate() {
        pool.extend(std::iter::repeat(idx).take(entrant.weight as usize));
    }
    pool
}

/// Shuffles the ticket pool and takes the first `number_of_winners` distinct
/// classes. Fewer eligible classes than requested means every class wins.
pub fn select_winners<'a, R: Rng + ?Sized>(
    entrants: &'a [Entrant],
    number_of_winners: usize,
    rng: &mut R,
) -> AppResult<Vec<&'a Entrant>> {
    if number_of_winners == 0 {
        return Err(AppError::ValidationError(
            "numberOfWinners must be at least 1".into(),
        ));
    }

    let mut pool = build_entry_pool(entrants);
    if pool.is_empty() {
        return Err(AppError::ValidationError(
            "No eligible classes found for this drawing".into(),
        ));
    }

    // Fisher–Yates
    pool.shuffle(rng);

    let mut seen = HashSet::new();
    let mut winners = Vec::with_capacity(number_of_winners.min(entrants.len()));
    for idx in pool {
        if winners.len() >= number_of_winners {
            break;
        }
        let entrant = &entrants[idx];
        if seen.insert(entrant.class_id) {
            winners.push(entrant);
        }
    }

    Ok(winners)
}

/// Full draw: selection plus the persisted winner records.
pub fn draw_winners<R: Rng + ?Sized>(
    entrants: &[Entrant],
    number_of_winners: usize,
    prize: &str,
    rng: &mut R,
) -> AppResult<Vec<DrawingWinner>> {
    let winners = select_winners(entrants, number_of_winners, rng)?
        .into_iter()
        .map(|e| DrawingWinner {
            class_id: e.class_id,
            class_name: e.class_name.clone(),
            class_code: e.class_code.clone(),
            teacher_id: e.teacher_id,
            prize: prize.to_string(),
            notified: false,
        })
        .collect();
    Ok(winners)
}
