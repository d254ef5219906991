//! End-to-end search scenarios driven through the worker pool, the way
//! the UCI front end runs them: mate finding, stalemate reporting, draw
//! rules, null-move verification and multiPV ordering.

use std::sync::{Arc, Mutex, OnceLock};

use remora::position::{Position, START_FEN};
use remora::search::{LimitsType, SearchConfig};
use remora::types::*;
use remora::{search, threads, tt, uci, ucioption};

const MATE_IN_ONE_FEN: &str = "6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1";
const STALEMATE_FEN: &str = "7k/5Q2/6K1/8/8/8/8/8 b - - 0 1";
const SHUFFLE_FEN: &str = "7k/8/8/8/8/8/R7/K7 w - - 99 80";
const ZUGZWANG_FEN: &str = "8/8/8/8/k1K5/p7/P7/8 w - - 0 1";

/// The engine state is process-global; tests take this lock to run one
/// search at a time.
fn lock() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(())).lock().unwrap()
}

fn setup() {
    ucioption::init();
    search::init();
    threads::init(1);
}

fn parse_position(fen: &str, moves: &[&str]) -> (Position, Vec<Move>) {
    let mut pos = Position::new(Arc::new(SearchConfig::default()));
    pos.set(fen).unwrap();
    let mut played = Vec::new();
    for s in moves {
        let m = uci::to_move(&pos, s);
        assert!(m != Move::NONE, "illegal move {} in test setup", s);
        pos.do_move(m);
        played.push(m);
    }
    (pos, played)
}

fn go_sync(fen: &str, moves: &[&str], tune: impl FnOnce(&mut LimitsType)) -> threads::Report {
    let (_, played) = parse_position(fen, moves);
    threads::set_position(fen.to_string(), played);
    let mut limits = LimitsType::new();
    tune(&mut limits);
    threads::start_thinking(SearchConfig::from_options(limits, Vec::new(), false));
    threads::wait_for_main();
    threads::reports().into_iter().next().unwrap()
}

#[test]
fn finds_mate_in_one() {
    let _g = lock();
    setup();
    let report = go_sync(MATE_IN_ONE_FEN, &[], |l| l.depth = 3);

    assert_eq!(report.best_move.to_string(), "a1a8");
    assert_eq!(report.score, mate_in(1));

    // The root entry lands in the table as an exact score with the
    // searched depth and the mating move.
    let (pos, _) = parse_position(MATE_IN_ONE_FEN, &[]);
    let (entry, hit) = tt::probe(pos.key());
    assert!(hit, "root position missing from the transposition table");
    assert_eq!(entry.bound(), Bound::EXACT);
    assert_eq!(entry.mov().to_string(), "a1a8");
    assert_eq!(entry.depth(), Depth(3));
}

#[test]
fn stalemate_reports_no_move() {
    let _g = lock();
    setup();
    let report = go_sync(STALEMATE_FEN, &[], |l| l.depth = 4);
    assert_eq!(report.best_move, Move::NONE);
}

#[test]
fn fifty_move_rule_draws_the_search() {
    let _g = lock();
    setup();
    // Rule-50 counter at 99 and only reversible moves available: every
    // reply crosses the threshold, so the search scores a dead draw
    // despite the extra rook.
    let report = go_sync(SHUFFLE_FEN, &[], |l| l.depth = 2);
    assert_eq!(report.score, Value::DRAW);
}

#[test]
fn zugzwang_survives_null_move_pruning() {
    let _g = lock();
    setup();
    let report = go_sync(ZUGZWANG_FEN, &[], |l| l.depth = 12);
    assert!(report.best_move != Move::NONE);
    assert!(
        report.score < Value(150),
        "null-move verification failed to refute the stand-pat cut: {:?}",
        report.score
    );
}

#[test]
fn aspiration_windows_converge_from_start_position() {
    let _g = lock();
    setup();
    // Depth 7 passes through several aspiration iterations (they begin
    // at depth 5); the final score must stay inside sane opening range.
    let report = go_sync(START_FEN, &[], |l| l.depth = 7);
    assert!(report.best_move != Move::NONE);
    assert!(
        report.score.abs() < Value(300),
        "start position scored {:?}",
        report.score
    );
}

#[test]
fn multipv_reports_distinct_ordered_lines() {
    let _g = lock();
    setup();
    ucioption::set("MultiPV", "3");
    let report = go_sync(START_FEN, &[], |l| l.depth = 5);
    ucioption::set("MultiPV", "1");

    assert!(report.lines.len() >= 3);
    let top: Vec<_> = report.lines.iter().take(3).collect();
    assert_ne!(top[0].0, top[1].0);
    assert_ne!(top[1].0, top[2].0);
    assert_ne!(top[0].0, top[2].0);
    assert!(top[0].1 >= top[1].1);
    assert!(top[1].1 >= top[2].1);
}

#[test]
fn fixed_node_search_is_deterministic() {
    let _g = lock();
    setup();

    search::clear();
    let first = go_sync(START_FEN, &["e2e4", "c7c5"], |l| l.nodes = 20_000);
    let first_nodes = threads::nodes_searched();

    search::clear();
    let second = go_sync(START_FEN, &["e2e4", "c7c5"], |l| l.nodes = 20_000);
    let second_nodes = threads::nodes_searched();

    assert_eq!(first.best_move, second.best_move);
    assert_eq!(first.score, second.score);
    assert_eq!(first_nodes, second_nodes);
}

#[test]
fn searchmoves_restricts_the_root() {
    let _g = lock();
    setup();
    let (pos, _) = parse_position(START_FEN, &[]);
    let only = uci::to_move(&pos, "a2a3");
    threads::set_position(START_FEN.to_string(), Vec::new());
    let mut limits = LimitsType::new();
    limits.depth = 4;
    threads::start_thinking(SearchConfig::from_options(limits, vec![only], false));
    threads::wait_for_main();
    let report = threads::reports().into_iter().next().unwrap();
    assert_eq!(report.best_move, only);
}

#[test]
fn perft_counts_match_known_values() {
    let _g = lock();
    setup();
    let (mut pos, _) = parse_position(START_FEN, &[]);
    assert_eq!(search::perft(&mut pos, Depth(1)), 20);
    assert_eq!(search::perft(&mut pos, Depth(2)), 400);
    assert_eq!(search::perft(&mut pos, Depth(3)), 8902);
}
