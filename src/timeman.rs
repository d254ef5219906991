use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use chess::Color;
use once_cell::sync::Lazy;

use crate::search::LimitsType;
use crate::ucioption;

// Soft/hard budget model: the optimum bound is what an iteration should
// normally respect, the maximum bound is the emergency brake checked in
// the node loop. Both are carved from one per-move base share.

/// Moves assumed to remain in a sudden-death game.
const DEFAULT_HORIZON: i64 = 40;
/// The horizon shrinks as the game ages, but never below this.
const LATE_GAME_FLOOR: i64 = 16;
/// The hard bound allows this many base shares in one move.
const HARD_MULT: i64 = 5;

static START_TIME: Lazy<Mutex<Instant>> = Lazy::new(|| Mutex::new(Instant::now()));
static OPTIMUM_TIME: AtomicI64 = AtomicI64::new(0);
static MAXIMUM_TIME: AtomicI64 = AtomicI64::new(0);

pub fn optimum() -> i64 {
    OPTIMUM_TIME.load(Ordering::Relaxed)
}

pub fn maximum() -> i64 {
    MAXIMUM_TIME.load(Ordering::Relaxed)
}

pub fn elapsed() -> i64 {
    START_TIME.lock().unwrap().elapsed().as_millis() as i64
}

/// One move's share of the remaining clock: the time left spread over
/// the expected horizon plus most of the increment, which is income
/// repeating every move.
fn base_share(time_left: i64, inc: i64, movestogo: i32, ply: i32) -> i64 {
    let horizon = if movestogo > 0 {
        (movestogo as i64).min(DEFAULT_HORIZON)
    } else {
        (DEFAULT_HORIZON - (ply as i64) / 4).max(LATE_GAME_FLOOR)
    };
    time_left / horizon + inc * 3 / 4
}

/// Compute the optimum and maximum thinking budgets for this move.
pub fn init(limits: &LimitsType, us: Color, ply: i32) {
    let min_think_time = ucioption::get_i32("Minimum Thinking Time") as i64;
    let move_overhead = ucioption::get_i32("Move Overhead") as i64;
    let slow_mover = ucioption::get_i32("Slow Mover") as i64;

    *START_TIME.lock().unwrap() = limits.start_time;

    let time_left = limits.time[us.to_index()].max(0);
    let inc = limits.inc[us.to_index()].max(0);
    let base = base_share(time_left, inc, limits.movestogo, ply);

    // Never budget more than most of the clock, and always pay the
    // communication overhead off the top.
    let ceiling = (time_left * 4 / 5 - move_overhead).max(0);

    let mut opt = (base * slow_mover / 100 - move_overhead)
        .min(ceiling)
        .max(min_think_time);
    let max = (base * HARD_MULT - move_overhead).min(ceiling).max(opt);

    if ucioption::get_bool("Ponder") {
        // Pondering banks opponent time, so think a little longer.
        opt += opt / 4;
    }

    OPTIMUM_TIME.store(opt, Ordering::Relaxed);
    MAXIMUM_TIME.store(max.max(opt), Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::LimitsType;

    #[test]
    fn budgets_scale_with_remaining_time() {
        ucioption::init();
        let mut limits = LimitsType::new();
        limits.time[0] = 60_000;
        init(&limits, Color::White, 20);
        let small_opt = optimum();
        let small_max = maximum();
        assert!(small_opt > 0);
        assert!(small_max >= small_opt);

        limits.time[0] = 600_000;
        init(&limits, Color::White, 20);
        assert!(optimum() > small_opt);
        assert!(maximum() > small_max);
    }

    #[test]
    fn movestogo_concentrates_the_budget() {
        ucioption::init();
        let mut limits = LimitsType::new();
        limits.time[0] = 60_000;
        init(&limits, Color::White, 20);
        let sudden_death = optimum();

        limits.movestogo = 5;
        init(&limits, Color::White, 20);
        assert!(
            optimum() > sudden_death,
            "five moves to go should spend more per move than sudden death"
        );
    }

    #[test]
    fn hard_bound_stays_on_the_clock() {
        ucioption::init();
        let mut limits = LimitsType::new();
        limits.time[1] = 1_000;
        limits.inc[1] = 0;
        init(&limits, Color::Black, 60);
        assert!(maximum() <= 1_000);
        assert!(maximum() >= optimum());
    }
}
