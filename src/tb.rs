use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tracing::info;

use crate::position::Position;
use crate::search::RootMoves;
use crate::types::*;
use crate::ucioption;

/// Largest piece count any linked probing backend supports. No backend
/// is linked into this build, so every probe reports failure and the
/// search carries on without tablebase information.
pub const MAX_CARDINALITY: i32 = 0;

static PATH: Lazy<Mutex<String>> = Lazy::new(|| Mutex::new(String::new()));
static CARDINALITY: AtomicI32 = AtomicI32::new(0);
static PROBE_DEPTH: AtomicI32 = AtomicI32::new(0);
static ROOT_IN_TB: AtomicBool = AtomicBool::new(false);
static USE_RULE50: AtomicBool = AtomicBool::new(true);

pub fn init(path: &str) {
    let mut p = PATH.lock().unwrap();
    *p = path.to_string();
    if !p.is_empty() && *p != "<empty>" {
        info!(path = %p, "no tablebase backend linked, SyzygyPath has no effect");
    }
}

pub fn cardinality() -> i32 {
    CARDINALITY.load(Ordering::Relaxed)
}

pub fn cardinality_dtm() -> i32 {
    0
}

pub fn probe_depth() -> Depth {
    Depth(PROBE_DEPTH.load(Ordering::Relaxed))
}

pub fn root_in_tb() -> bool {
    ROOT_IN_TB.load(Ordering::Relaxed)
}

pub fn use_rule_50() -> bool {
    USE_RULE50.load(Ordering::Relaxed)
}

/// Win-draw-loss probe. `None` means the probe failed and the caller
/// continues without tablebase information.
pub fn probe_wdl(_pos: &Position) -> Option<i32> {
    None
}

/// Distance-to-mate probe, same failure contract as `probe_wdl`.
pub fn probe_dtm(_pos: &Position, _wdl: i32) -> Option<Value> {
    None
}

/// Refresh the probe policy from the options and rank the root moves.
/// With no backend available every move keeps rank zero and in-search
/// probing stays disabled.
pub fn rank_root_moves(pos: &Position, root_moves: &mut RootMoves) {
    ROOT_IN_TB.store(false, Ordering::Relaxed);
    USE_RULE50.store(ucioption::get_bool("Syzygy50MoveRule"), Ordering::Relaxed);
    PROBE_DEPTH.store(ucioption::get_i32("SyzygyProbeDepth"), Ordering::Relaxed);

    let mut cardinality = ucioption::get_i32("SyzygyProbeLimit");
    if cardinality > MAX_CARDINALITY {
        cardinality = MAX_CARDINALITY;
        PROBE_DEPTH.store(0, Ordering::Relaxed);
    }

    if cardinality < pos.count_all() as i32 || pos.has_castling_right() {
        cardinality = 0;
    }
    CARDINALITY.store(cardinality, Ordering::Relaxed);

    for rm in root_moves.iter_mut() {
        rm.tb_rank = 0;
    }
}
