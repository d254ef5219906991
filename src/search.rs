use std::io::{stdout, Write};
use std::time::Instant;

use chess::{Color, Piece, Square};
use once_cell::sync::Lazy;

use crate::evaluate::{evaluate, TEMPO};
use crate::movepick::{MovePicker, MovePickerPC, MovePickerQ, PieceToHistory, CM_THRESHOLD};
use crate::perceptron::PERC_INPUT;
use crate::position::Position;
use crate::types::*;
use crate::{experience, tb, threads, timeman, tt, uci, ucioption};

/// Per-ply scratch frame. The stack is oversized so that frames from
/// seven plies below to two plies above the current one always exist;
/// the low frames stay zeroed and reference the sentinel history plane.
pub struct Stack {
    pv: Vec<Move>,
    pub cont_history: &'static PieceToHistory,
    ply: i32,
    pub current_move: Move,
    excluded_move: Move,
    pub killers: [Move; 2],
    static_eval: Value,
    stat_score: i32,
    move_count: i32,
}

/// Offset of the current frame inside the stack slice handed to
/// `search`; frames below it reach back to ply-7.
const SS: usize = 7;

#[derive(Clone)]
pub struct RootMove {
    pub score: Value,
    pub previous_score: Value,
    pub tb_score: Value,
    pub tb_rank: i32,
    pub sel_depth: i32,
    pub visits: u64,
    pub z_score: i64,
    pub pv: Vec<Move>,
}

impl RootMove {
    pub fn new(m: Move) -> RootMove {
        RootMove {
            score: -Value::INFINITE,
            previous_score: -Value::INFINITE,
            tb_score: Value::ZERO,
            tb_rank: 0,
            sel_depth: 0,
            visits: 0,
            z_score: 0,
            pv: vec![m],
        }
    }
}

// Best move first: a stable sort on this ordering keeps already-searched
// PV lines in place while the new best rises to the front.
impl Ord for RootMove {
    fn cmp(&self, other: &RootMove) -> std::cmp::Ordering {
        other
            .tb_rank
            .cmp(&self.tb_rank)
            .then(other.score.cmp(&self.score))
            .then(other.previous_score.cmp(&self.previous_score))
    }
}

impl PartialOrd for RootMove {
    fn partial_cmp(&self, other: &RootMove) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RootMove {
    fn eq(&self, other: &RootMove) -> bool {
        self.cmp(other) == std::cmp::Ordering::Equal
    }
}

impl Eq for RootMove {}

pub type RootMoves = Vec<RootMove>;

#[derive(Clone)]
pub struct LimitsType {
    pub time: [i64; 2],
    pub inc: [i64; 2],
    pub movestogo: i32,
    pub depth: i32,
    pub movetime: i64,
    pub mate: i32,
    pub perft: i32,
    pub infinite: bool,
    pub nodes: u64,
    pub start_time: Instant,
}

impl LimitsType {
    pub fn new() -> LimitsType {
        LimitsType {
            time: [0; 2],
            inc: [0; 2],
            movestogo: 0,
            depth: 0,
            movetime: 0,
            mate: 0,
            perft: 0,
            infinite: false,
            nodes: 0,
            start_time: Instant::now(),
        }
    }

    pub fn use_time_management(&self) -> bool {
        self.mate == 0
            && self.movetime == 0
            && self.depth == 0
            && self.nodes == 0
            && self.perft == 0
            && !self.infinite
    }
}

impl Default for LimitsType {
    fn default() -> LimitsType {
        LimitsType::new()
    }
}

/// Immutable snapshot of every option the search reads, taken when the
/// `go` command arrives and shared by all workers.
#[derive(Clone)]
pub struct SearchConfig {
    pub limits: LimitsType,
    pub multi_pv: usize,
    pub contempt_cp: i32,
    pub analysis_contempt: String,
    pub analyse_mode: bool,
    pub less_pruning_mode: i32,
    pub variety: i32,
    pub limit_strength: bool,
    pub uci_elo: i32,
    pub tal: bool,
    pub capablanca: bool,
    pub petrosian: bool,
    pub perceptron_search: bool,
    pub persisted_self_learning: bool,
    pub searchmoves: Vec<Move>,
    pub ponder: bool,
}

impl Default for SearchConfig {
    fn default() -> SearchConfig {
        SearchConfig {
            limits: LimitsType::new(),
            multi_pv: 1,
            contempt_cp: 21,
            analysis_contempt: "Both".to_string(),
            analyse_mode: false,
            less_pruning_mode: 0,
            variety: 0,
            limit_strength: false,
            uci_elo: 2850,
            tal: false,
            capablanca: false,
            petrosian: false,
            perceptron_search: false,
            persisted_self_learning: false,
            searchmoves: Vec::new(),
            ponder: false,
        }
    }
}

impl SearchConfig {
    pub fn from_options(limits: LimitsType, searchmoves: Vec<Move>, ponder: bool) -> SearchConfig {
        SearchConfig {
            limits,
            multi_pv: ucioption::get_i32("MultiPV").max(1) as usize,
            contempt_cp: ucioption::get_i32("Contempt"),
            analysis_contempt: ucioption::get_string("Analysis Contempt"),
            analyse_mode: ucioption::get_bool("UCI_AnalyseMode"),
            less_pruning_mode: ucioption::get_i32("Less Pruning Mode"),
            variety: ucioption::get_i32("Variety"),
            limit_strength: ucioption::get_bool("UCI_LimitStrength"),
            uci_elo: ucioption::get_i32("UCI_Elo"),
            tal: ucioption::get_bool("Tal"),
            capablanca: ucioption::get_bool("Capablanca"),
            petrosian: ucioption::get_bool("Petrosian"),
            perceptron_search: ucioption::get_bool("NN Perceptron Search"),
            persisted_self_learning: ucioption::get_bool("NN Persisted Self-Learning"),
            searchmoves,
            ponder,
        }
    }
}

/// Score-classified playing character, seeded from the style options
/// and re-derived from the root score as it moves. It biases contempt
/// at search start, caps late-move reductions near the root, and keeps
/// the playout exploration out of forcing regimes.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum PlayStyle {
    Solid,
    SolidLeaning,
    Balanced,
    SharpLeaning,
    Sharp,
}

#[derive(Clone, Copy, Debug)]
pub struct StyleState {
    pub style: PlayStyle,
    pub max_lmr: Depth,
}

const STYLE_BALANCED_CP: i32 = 25;
const STYLE_SHARP_CP: i32 = 75;
const LMR_CAP_FULL_CP: i32 = 200;
const LMR_CAP_MIN_CP: i32 = 400;
const LMR_CAP_MAX: i32 = 8;
const LMR_CAP_MIN: i32 = 4;

impl Default for StyleState {
    fn default() -> StyleState {
        StyleState {
            style: PlayStyle::Balanced,
            max_lmr: LMR_CAP_MAX * ONE_PLY,
        }
    }
}

impl StyleState {
    pub fn init(cfg: &SearchConfig) -> StyleState {
        let style = if cfg.tal && !cfg.petrosian {
            PlayStyle::Sharp
        } else if cfg.petrosian && !cfg.tal {
            PlayStyle::Solid
        } else {
            PlayStyle::Balanced
        };
        let cap = if (cfg.tal || cfg.petrosian) && !cfg.capablanca {
            LMR_CAP_MIN
        } else if (cfg.tal && cfg.capablanca && cfg.petrosian) || (!cfg.tal && !cfg.petrosian) {
            LMR_CAP_MAX
        } else {
            (LMR_CAP_MAX + LMR_CAP_MIN) / 2
        };
        StyleState {
            style,
            max_lmr: cap * ONE_PLY,
        }
    }

    pub fn update(&mut self, score_cp: i32) {
        self.style = match score_cp {
            c if c < -STYLE_SHARP_CP => PlayStyle::Solid,
            c if c < -STYLE_BALANCED_CP => PlayStyle::SolidLeaning,
            c if c <= STYLE_BALANCED_CP => PlayStyle::Balanced,
            c if c <= STYLE_SHARP_CP => PlayStyle::SharpLeaning,
            _ => PlayStyle::Sharp,
        };
        let a = score_cp.abs();
        let cap = if a <= LMR_CAP_FULL_CP {
            LMR_CAP_MAX
        } else if a <= LMR_CAP_MIN_CP {
            LMR_CAP_MAX - (a - LMR_CAP_FULL_CP) * (LMR_CAP_MAX - LMR_CAP_MIN) / (LMR_CAP_MIN_CP - LMR_CAP_FULL_CP)
        } else {
            LMR_CAP_MIN
        };
        self.max_lmr = cap * ONE_PLY;
    }

    /// Sharply unbalanced positions are treated as forcing: no playout
    /// exploration, no playout-statistics aspiration trigger.
    pub fn is_forcing(&self) -> bool {
        matches!(self.style, PlayStyle::Sharp | PlayStyle::Solid)
    }
}

struct NonPv;
struct Pv;

trait NodeType {
    const PV: bool;
}

impl NodeType for NonPv {
    const PV: bool = false;
}

impl NodeType for Pv {
    const PV: bool = true;
}

const SKIP_SIZE: [i32; 20] = [1, 1, 2, 2, 2, 2, 3, 3, 3, 3, 3, 3, 4, 4, 4, 4, 4, 4, 4, 4];
const SKIP_PHASE: [i32; 20] = [0, 1, 0, 1, 2, 3, 0, 1, 2, 3, 4, 5, 0, 1, 2, 3, 4, 5, 6, 7];

const RAZOR_MARGIN: i32 = 600;

fn futility_margin(d: Depth, improving: bool) -> Value {
    Value((175 - 50 * improving as i32) * (d / ONE_PLY))
}

fn futility_move_count(improving: bool, depth: i32) -> i32 {
    (5 + depth * depth) * (1 + improving as i32) / 2
}

fn stat_bonus(depth: Depth) -> i32 {
    let d = depth / ONE_PLY;
    if d > 17 {
        0
    } else {
        29 * d * d + 138 * d - 134
    }
}

static REDUCTIONS: Lazy<[i32; 64]> = Lazy::new(|| {
    let mut r = [0i32; 64];
    for (i, e) in r.iter_mut().enumerate().skip(1) {
        *e = (1024.0 * (i as f64).ln() / 1.95f64.sqrt()) as i32;
    }
    r
});

// Alternative table used by Less Pruning Mode.
static REDUCTIONS_ALT: Lazy<Box<[[[i32; 64]; 128]; 2]>> = Lazy::new(|| {
    let mut t = Box::new([[[0i32; 64]; 128]; 2]);
    for imp in 0..2 {
        for d in 1..128 {
            for mc in 1..64 {
                let r = 0.215 * d as f64 * (1.0 - (-8.0 / d as f64).exp()) * (mc as f64).ln();
                t[imp][d][mc] = r.round() as i32;
                if imp == 0 && r > 1.0 {
                    t[imp][d][mc] += 1;
                }
            }
        }
    }
    t
});

fn reduction(cfg: &SearchConfig, pv_node: bool, improving: bool, d: Depth, mn: i32) -> Depth {
    if cfg.less_pruning_mode > 0 {
        let r = REDUCTIONS_ALT[improving as usize][(d / ONE_PLY).min(127) as usize]
            [mn.min(63) as usize];
        return (r - pv_node as i32) * ONE_PLY;
    }
    let r = REDUCTIONS[(d / ONE_PLY).min(63) as usize] * REDUCTIONS[mn.min(63) as usize] / 1024;
    ((r + 512) / 1024 + (!improving && r > 1024) as i32 - pv_node as i32) * ONE_PLY
}

/// Jittered draw value, breaking three-fold blindness by the node
/// counter's low bit.
fn value_draw(depth: Depth, pos: &Position) -> Value {
    if depth < 4 * ONE_PLY {
        Value::DRAW
    } else {
        Value::DRAW + Value(2 * (pos.nodes & 1) as i32 - 1)
    }
}

/// Strength handicap: Elo in [1350, 2850] maps linearly onto levels
/// [0, 20]; level 20 plays full strength.
struct Skill {
    level: i32,
    best: Move,
}

impl Skill {
    fn new(elo: i32) -> Skill {
        Skill {
            level: ((elo - 1350) * 20 / 1500).clamp(0, 20),
            best: Move::NONE,
        }
    }

    fn enabled(&self) -> bool {
        self.level < 20
    }

    fn time_to_pick(&self, depth: Depth) -> bool {
        depth / ONE_PLY == 1 + self.level
    }
}

/// Weakness-weighted randomised pick among the first `multi_pv` lines.
fn skill_pick(root_moves: &RootMoves, multi_pv: usize, level: i32) -> Move {
    let multi_pv = multi_pv.min(root_moves.len());
    let top_score = root_moves[0].score;
    let delta = std::cmp::min(top_score - root_moves[multi_pv - 1].score, PAWN_VALUE_MG);
    let weakness = 120 - 2 * level;
    let mut max_score = -Value::INFINITE;
    let mut best = root_moves[0].pv[0];

    for rm in root_moves.iter().take(multi_pv) {
        let push = (weakness * (top_score - rm.score).0
            + delta.0 * (rand::random::<u32>() % weakness as u32) as i32)
            / 128;
        if rm.score + push >= max_score {
            max_score = rm.score + push;
            best = rm.pv[0];
        }
    }
    best
}

fn effective_multi_pv(cfg: &SearchConfig) -> usize {
    let mut multi_pv = cfg.multi_pv;
    if cfg.less_pruning_mode > 0 {
        multi_pv = 1usize << (cfg.less_pruning_mode - 1) as usize;
    }
    if cfg.limit_strength && Skill::new(cfg.uci_elo).enabled() {
        multi_pv = multi_pv.max(4);
    }
    multi_pv
}

fn perft_inner<Root: Bool>(pos: &mut Position, depth: Depth) -> u64 {
    let mut nodes = 0u64;
    let leaf = depth == 2 * ONE_PLY;
    for m in pos.legal_moves() {
        let cnt;
        if Root::BOOL && depth <= ONE_PLY {
            cnt = 1;
            nodes += 1;
        } else {
            pos.do_move(m);
            cnt = if leaf {
                pos.legal_moves().len() as u64
            } else {
                perft_inner::<False>(pos, depth - ONE_PLY)
            };
            nodes += cnt;
            pos.undo_move(m);
        }
        if Root::BOOL {
            println!("{}: {}", m, cnt);
            stdout().flush().ok();
        }
    }
    nodes
}

/// Legal-move tree count, independent of any search state.
pub fn perft(pos: &mut Position, depth: Depth) -> u64 {
    if depth <= Depth::ZERO {
        return 1;
    }
    perft_inner::<True>(pos, depth)
}

pub fn init() {
    Lazy::force(&REDUCTIONS);
    Lazy::force(&REDUCTIONS_ALT);
}

/// Reset all search state: wait for running searches, wipe the table,
/// schedule the per-thread heuristic clear and reload the tablebase
/// configuration.
pub fn clear() {
    threads::wait_for_all();
    tt::clear();
    threads::request_clear();
    tb::init(&ucioption::get_string("SyzygyPath"));
}

fn tally(pos: &mut Position, ply: i32, v: Value) {
    if pos.cfg.perceptron_search {
        pos.visits += 1;
        pos.all_scores += if ply % 2 == 0 { v.0 as i64 } else { -(v.0 as i64) };
    }
}

fn update_counters(pos: &Position) {
    if let Some(ctrl) = &pos.thread_ctrl {
        ctrl.nodes
            .store(pos.nodes, std::sync::atomic::Ordering::Relaxed);
        ctrl.tb_hits
            .store(pos.tb_hits, std::sync::atomic::Ordering::Relaxed);
    }
}

fn check_time(pos: &Position) {
    if threads::ponder() {
        return;
    }
    let limits = &pos.cfg.limits;
    let elapsed = timeman::elapsed();
    if (limits.use_time_management()
        && (elapsed > timeman::maximum() - 10 || threads::stop_on_ponderhit()))
        || (limits.movetime != 0 && elapsed >= limits.movetime)
        || (limits.nodes != 0 && threads::nodes_searched() >= limits.nodes)
    {
        threads::set_stop(true);
    }
}

/// Dynamic contempt and style reclassification from the latest score.
fn update_style(pos: &mut Position, score: Value, base_ct: i32, us: Color) {
    let v = score.0;
    let dct = base_ct + 88 * v / (v.abs() + 200);
    pos.contempt = if us == Color::White {
        Score::make(dct, dct / 2)
    } else {
        -Score::make(dct, dct / 2)
    };
    pos.style.update(score.0 * 100 / PAWN_VALUE_EG.0);
}

/// Driver entry point for the main worker: time setup, experience
/// bookkeeping, the shared iterative deepening loop, thread voting and
/// the final `bestmove` emission.
pub fn mainthread_search(pos: &mut Position) {
    let cfg = pos.cfg.clone();

    if cfg.limits.perft != 0 {
        let nodes = perft(pos, cfg.limits.perft * ONE_PLY);
        println!("\nNodes searched: {}", nodes);
        stdout().flush().ok();
        return;
    }

    let us = pos.side_to_move();
    timeman::init(&cfg.limits, us, pos.game_ply());
    tt::new_search();

    if cfg.persisted_self_learning {
        experience::ensure_loaded(pos.game_start_key());
        if pos.non_pawn_piece_count() <= 6 {
            experience::ensure_pawn_loaded();
            experience::set_use_exp(true);
        }
    }

    if pos.root_moves.is_empty() {
        pos.root_moves.push(RootMove::new(Move::NONE));
        println!(
            "info depth 0 score {}",
            uci::value(if pos.in_check() {
                -Value::MATE
            } else {
                Value::DRAW
            })
        );
        stdout().flush().ok();
    } else {
        threads::wake_up_slaves();
        thread_search(pos);
    }

    threads::set_stop_on_ponderhit(true);
    while !threads::stop() && (threads::ponder() || cfg.limits.infinite) {
        std::thread::yield_now();
    }
    threads::set_stop(true);
    threads::wait_for_slaves();

    // Vote across workers: each thread backs its own best move with a
    // weight combining score margin and completed depth.
    let mut best_move = pos.root_moves[0].pv[0];
    let mut best_score = pos.root_moves[0].score;
    let mut best_pv = pos.root_moves[0].pv.clone();
    let mut best_depth = pos.completed_depth;
    let skill = Skill::new(cfg.uci_elo);

    if cfg.multi_pv == 1
        && cfg.limits.depth == 0
        && !(cfg.limit_strength && skill.enabled())
        && best_move != Move::NONE
        && threads::worker_count() > 1
    {
        let reports = threads::reports();
        let mut entries: Vec<(Move, Value, Depth, Option<Vec<Move>>)> =
            vec![(best_move, best_score, best_depth, None)];
        for r in reports.iter().skip(1) {
            if r.best_move != Move::NONE {
                entries.push((r.best_move, r.score, r.completed_depth, Some(r.pv.clone())));
            }
        }

        let min_score = entries.iter().map(|e| e.1).min().unwrap_or(best_score);
        let vote = |m: Move| -> i64 {
            entries
                .iter()
                .filter(|e| e.0 == m)
                .map(|e| {
                    let s = (e.1 - min_score + 1).0 as i64;
                    200 + s * s * (e.2 / ONE_PLY) as i64
                })
                .sum()
        };

        let mut best_vote = vote(best_move);
        for e in &entries[1..] {
            if vote(e.0) > best_vote {
                best_vote = vote(e.0);
                best_move = e.0;
                best_score = e.1;
                best_depth = e.2;
                if let Some(pv) = &e.3 {
                    best_pv = pv.clone();
                }
            }
        }

        // Another thread won: repeat its line for the GUI.
        if best_move != pos.root_moves[0].pv[0] {
            print!(
                "info depth {} multipv 1 score {} nodes {} tbhits {} time {} pv",
                best_depth / ONE_PLY,
                uci::value(best_score),
                threads::nodes_searched(),
                threads::tb_hits(),
                timeman::elapsed() + 1
            );
            for m in &best_pv {
                print!(" {}", m);
            }
            println!();
        }
    }

    pos.previous_score = best_score;

    if cfg.persisted_self_learning {
        let pieces = pos.non_pawn_piece_count() as i32;
        if (experience::moves_played() <= 40 || pieces <= 6)
            && best_depth > 4 * ONE_PLY
            && best_move != Move::NONE
        {
            let rec = experience::ExpRecord {
                depth: best_depth / ONE_PLY,
                key: pos.key().0,
                mv: best_move,
                score: best_score.0.clamp(i16::MIN as i32, i16::MAX as i32) as i16,
            };
            let in_opening = experience::moves_played() <= 10 && pieces > 6;
            let opening_key = if experience::moves_played() <= 40 && pieces > 6 {
                Some(pos.game_start_key().0)
            } else {
                None
            };
            experience::record(rec, opening_key, in_opening, pieces <= 2);
            experience::bump_moves_played();
        }
        if !experience::had_hits() {
            experience::set_use_exp(false);
        }
    }

    print!("bestmove {}", best_move);
    if best_pv.len() > 1 {
        print!(" ponder {}", best_pv[1]);
    } else if let Some(p) = extract_ponder_from_tt(pos, best_move) {
        print!(" ponder {}", p);
    }
    println!();
    stdout().flush().ok();
}

/// Iterative deepening with aspiration windows; runs on every worker.
pub fn thread_search(pos: &mut Position) {
    let cfg = pos.cfg.clone();

    let mut stack: Vec<Stack> = (0..(MAX_PLY + 10) as usize)
        .map(|_| Stack {
            pv: Vec::new(),
            cont_history: pos.cont_history.sentinel(),
            ply: 0,
            current_move: Move::NONE,
            excluded_move: Move::NONE,
            killers: [Move::NONE; 2],
            static_eval: Value::ZERO,
            stat_score: 0,
            move_count: 0,
        })
        .collect();

    let mut last_best_move = Move::NONE;
    let mut last_best_move_depth = Depth::ZERO;
    let mut time_reduction = 1.0f64;

    pos.calls_cnt = 0;
    pos.nmp_min_ply = 0;
    pos.completed_depth = Depth::ZERO;
    pos.root_depth = Depth::ZERO;

    let mut alpha = -Value::INFINITE;
    let mut beta = Value::INFINITE;
    let mut delta1 = -Value::INFINITE;
    let mut delta2 = -Value::INFINITE;
    let mut best_value = -Value::INFINITE;

    if pos.is_main {
        pos.failed_low = false;
        pos.best_move_changes = 0.0;
    }

    let us = pos.side_to_move();
    let mut skill = Skill::new(cfg.uci_elo);
    let mut multi_pv = effective_multi_pv(&cfg);
    multi_pv = multi_pv.min(pos.root_moves.len());

    // Base contempt in internal units, biased by the style flags and
    // redirected by the analysis-contempt setting.
    let mut base_ct = cfg.contempt_cp;
    if cfg.tal {
        base_ct += 25;
    }
    if cfg.petrosian {
        base_ct -= 25;
    }
    if cfg.capablanca {
        base_ct /= 2;
    }
    let mut base_ct = base_ct * PAWN_VALUE_EG.0 / 100;
    if cfg.limits.infinite || cfg.analyse_mode {
        base_ct = match cfg.analysis_contempt.as_str() {
            "Off" => 0,
            "White" => {
                if us == Color::Black {
                    -base_ct
                } else {
                    base_ct
                }
            }
            "Black" => {
                if us == Color::White {
                    -base_ct
                } else {
                    base_ct
                }
            }
            _ => base_ct,
        };
    }
    pos.contempt = if us == Color::White {
        Score::make(base_ct, base_ct / 2)
    } else {
        -Score::make(base_ct, base_ct / 2)
    };
    pos.style = StyleState::init(&cfg);

    while !threads::stop() {
        pos.root_depth += ONE_PLY;
        if pos.root_depth >= Depth::MAX
            || (cfg.limits.depth != 0
                && pos.is_main
                && pos.root_depth / ONE_PLY > cfg.limits.depth)
        {
            break;
        }

        // Helpers skip depths in staggered phases for diversity.
        if !pos.is_main {
            let i = ((pos.thread_idx - 1) % 20) as usize;
            if ((pos.root_depth / ONE_PLY + pos.game_ply() + SKIP_PHASE[i]) / SKIP_SIZE[i]) % 2 != 0
            {
                continue;
            }
        }

        if pos.is_main {
            pos.best_move_changes *= 0.517;
            pos.failed_low = false;
        }

        for rm in pos.root_moves.iter_mut() {
            rm.previous_score = rm.score;
        }

        if cfg.perceptron_search {
            pos.visits = 0;
            pos.all_scores = 0;
        }

        let mut pv_first = 0;
        pos.pv_last = 0;
        pos.pv_idx = 0;

        while pos.pv_idx < multi_pv && !threads::stop() {
            if pos.pv_idx == pos.pv_last {
                pv_first = pos.pv_last;
                pos.pv_last += 1;
                while pos.pv_last < pos.root_moves.len() {
                    if pos.root_moves[pos.pv_last].tb_rank != pos.root_moves[pv_first].tb_rank {
                        break;
                    }
                    pos.pv_last += 1;
                }
            }

            pos.sel_depth = 0;

            // Moves already decided by the tablebases keep their rank
            // score without being searched again.
            if pos.root_moves[pos.pv_idx].tb_rank.abs() > 1000 {
                best_value = pos.root_moves[pos.pv_idx].tb_score;
                pos.root_moves[pos.pv_idx].score = best_value;
                if pos.is_main
                    && (threads::stop() || pos.pv_idx + 1 == multi_pv || timeman::elapsed() > 3000)
                {
                    print_pv(pos, pos.root_depth, -Value::INFINITE, Value::INFINITE);
                }
                pos.pv_idx += 1;
                continue;
            }

            if pos.root_depth >= 5 * ONE_PLY {
                let prev = pos.root_moves[pos.pv_idx].previous_score;
                if cfg.less_pruning_mode > 0 {
                    delta1 = if prev < Value::ZERO {
                        Value(12 + (0.07 * prev.0.abs() as f64) as i32)
                    } else {
                        Value(16)
                    };
                    delta2 = if prev > Value::ZERO {
                        Value(12 + (0.07 * prev.0.abs() as f64) as i32)
                    } else {
                        Value(16)
                    };
                } else {
                    delta1 = Value(20);
                    delta2 = Value(20);
                }
                alpha = std::cmp::max(prev - delta1, -Value::INFINITE);
                beta = std::cmp::min(prev + delta2, Value::INFINITE);
                update_style(pos, prev, base_ct, us);
            }

            let mut failed_high_cnt = 0;
            loop {
                let adjusted_depth =
                    std::cmp::max(ONE_PLY, pos.root_depth - failed_high_cnt * ONE_PLY);
                best_value = search::<Pv>(pos, &mut stack, alpha, beta, adjusted_depth, false);
                update_style(pos, best_value, base_ct, us);
                update_counters(pos);

                let pv_last = pos.pv_last;
                pos.root_moves[pos.pv_idx..pv_last].sort();

                if threads::stop() {
                    break;
                }

                if pos.is_main
                    && multi_pv == 1
                    && (best_value <= alpha || best_value >= beta)
                    && timeman::elapsed() > 3000
                {
                    print_pv(pos, pos.root_depth, alpha, beta);
                }

                let playout_fail_low = cfg.perceptron_search && !pos.style.is_forcing() && {
                    let rm = &pos.root_moves[0];
                    rm.visits > 0
                        && Value((rm.z_score / rm.visits as i64) as i32)
                            <= alpha - PAWN_VALUE_MG / 2
                };

                if best_value <= alpha || playout_fail_low {
                    beta = (alpha + beta) / 2;
                    alpha = std::cmp::max(best_value - delta1, -Value::INFINITE);
                    if pos.is_main {
                        failed_high_cnt = 0;
                        pos.failed_low = true;
                        threads::set_stop_on_ponderhit(false);
                    }
                } else if best_value >= beta {
                    beta = std::cmp::min(best_value + delta2, Value::INFINITE);
                    if pos.is_main {
                        failed_high_cnt += 1;
                    }
                } else {
                    break;
                }

                delta1 += delta1 / 4 + 5;
                delta2 += delta2 / 4 + 5;
                debug_assert!(alpha >= -Value::INFINITE && beta <= Value::INFINITE);
            }

            let end = (pos.pv_idx + 1).min(pos.root_moves.len());
            pos.root_moves[pv_first..end].sort();

            if pos.is_main
                && (threads::stop() || pos.pv_idx + 1 == multi_pv || timeman::elapsed() > 3000)
            {
                print_pv(pos, pos.root_depth, alpha, beta);
            }

            pos.pv_idx += 1;
        }

        if !threads::stop() {
            pos.completed_depth = pos.root_depth;
        }

        if pos.root_moves[0].pv[0] != last_best_move {
            last_best_move = pos.root_moves[0].pv[0];
            last_best_move_depth = pos.root_depth;
        }

        if cfg.limits.mate != 0
            && best_value >= Value::MATE_IN_MAX_PLY
            && (Value::MATE - best_value).0 <= 2 * cfg.limits.mate
        {
            threads::set_stop(true);
        }

        if !pos.is_main {
            continue;
        }

        if cfg.limit_strength && skill.enabled() && skill.time_to_pick(pos.root_depth) {
            skill.best = skill_pick(&pos.root_moves, multi_pv, skill.level);
        }

        if cfg.limits.use_time_management()
            && !threads::stop()
            && !threads::stop_on_ponderhit()
        {
            let falling_eval = ((306 + 9 * (pos.previous_score - best_value).0) as f64 / 581.0)
                .clamp(0.5, 1.5);
            time_reduction = if last_best_move_depth + 10 * ONE_PLY < pos.completed_depth {
                1.95
            } else {
                1.0
            };
            let reduction_factor = pos.previous_time_reduction.powf(0.528) / time_reduction;
            let instability = 1.0 + pos.best_move_changes;

            if pos.root_moves.len() == 1
                || timeman::elapsed() as f64
                    > timeman::optimum() as f64 * falling_eval * reduction_factor * instability
            {
                if threads::ponder() {
                    threads::set_stop_on_ponderhit(true);
                } else {
                    threads::set_stop(true);
                }
            }
        }
    }

    if !pos.is_main {
        return;
    }

    pos.previous_time_reduction = time_reduction;

    // Extend the table beyond the horizon along the expected line.
    if cfg.perceptron_search
        && !threads::stop()
        && !pos.style.is_forcing()
        && last_best_move != Move::NONE
    {
        playout(pos, &mut stack, last_best_move, best_value);
    }

    if cfg.limit_strength && skill.enabled() {
        let pick = if skill.best != Move::NONE {
            skill.best
        } else {
            skill_pick(&pos.root_moves, multi_pv, skill.level)
        };
        if let Some(i) = pos.root_moves.iter().position(|rm| rm.pv[0] == pick) {
            pos.root_moves.swap(0, i);
        }
    }
}

/// One step of the playout exploration: play the expected move, search
/// the child with a null window, then keep following table moves while
/// they stay legal and the score stays out of the winning range.
fn playout(pos: &mut Position, ss: &mut [Stack], play_move: Move, mut playout_value: Value) -> Value {
    if threads::stop() || !pos.pseudo_legal(play_move) || !pos.legal(play_move) {
        return Value::NONE;
    }
    if pos.is_draw(ss[SS].ply) {
        return Value::DRAW;
    }

    ss[SS].current_move = play_move;
    ss[SS].cont_history = pos
        .cont_history
        .get(pos.moved_piece_index(play_move), play_move.to());

    pos.do_move(play_move);
    ss[SS + 1].ply = ss[SS].ply + 1;

    let rd = pos.root_depth / ONE_PLY;
    let d = rd * rd / (rd + 4) - 2;

    let (mut tte, mut tt_hit) = tt::probe(pos.key());
    if !tt_hit && d >= 1 && pos.has_legal_moves() {
        playout_value = search::<NonPv>(
            pos,
            &mut ss[1..],
            -playout_value,
            -playout_value + 1,
            Depth(d),
            true,
        );
        let probed = tt::probe(pos.key());
        tte = probed.0;
        tt_hit = probed.1;
    }

    let tt_move = if tt_hit { tte.mov() } else { Move::NONE };
    if tt_hit
        && tt_move != Move::NONE
        && ss[SS].ply < MAX_PLY - 2
        && playout_value.abs() < Value::KNOWN_WIN
    {
        playout_value = -playout(pos, &mut ss[1..], tt_move, -playout_value);
    }

    pos.undo_move(play_move);
    playout_value
}

fn search<NT: NodeType>(
    pos: &mut Position,
    ss: &mut [Stack],
    mut alpha: Value,
    mut beta: Value,
    depth: Depth,
    cut_node: bool,
) -> Value {
    let pv_node = NT::PV;
    let root_node = pv_node && ss[SS].ply == 0;

    // An upcoming repetition draws the score toward zero before any
    // work is spent on the node.
    if pos.rule50_count() >= 3
        && alpha < Value::DRAW
        && !root_node
        && pos.has_game_cycle(ss[SS].ply)
    {
        alpha = value_draw(depth, pos);
        if alpha >= beta {
            let ply = ss[SS].ply;
            tally(pos, ply, alpha);
            return alpha;
        }
    }

    if depth < ONE_PLY {
        let v = if pos.in_check() {
            qsearch::<NT, True>(pos, ss, alpha, beta, Depth::ZERO)
        } else {
            qsearch::<NT, False>(pos, ss, alpha, beta, Depth::ZERO)
        };
        let ply = ss[SS].ply;
        tally(pos, ply, v);
        return v;
    }

    debug_assert!(-Value::INFINITE <= alpha && alpha < beta && beta <= Value::INFINITE);
    debug_assert!(pv_node || alpha == beta - 1);
    debug_assert!(Depth::ZERO < depth && depth < Depth::MAX);
    debug_assert!(!(pv_node && cut_node));

    let cfg = pos.cfg.clone();
    let mut captures_searched = [Move::NONE; 32];
    let mut quiets_searched = [Move::NONE; 64];
    let in_check = pos.in_check();
    let us = pos.side_to_move();
    let mut move_count = 0;
    let mut capture_count = 0;
    let mut quiet_count = 0;
    ss[SS].move_count = 0;
    let mut best_value = -Value::INFINITE;
    let mut max_value = Value::INFINITE;

    pos.calls_cnt -= 1;
    if pos.calls_cnt <= 0 {
        pos.calls_cnt = if cfg.limits.nodes != 0 {
            std::cmp::min(1024, (cfg.limits.nodes / 1024).max(1) as i64) as i32
        } else {
            1024
        };
        update_counters(pos);
        if pos.is_main {
            check_time(pos);
        }
    }

    if pv_node && pos.sel_depth < ss[SS].ply + 1 {
        pos.sel_depth = ss[SS].ply + 1;
    }

    if !root_node {
        if threads::stop() || pos.is_draw(ss[SS].ply) || ss[SS].ply >= MAX_PLY {
            let draw = value_draw(depth, pos);
            let v = if ss[SS].ply >= MAX_PLY && !in_check {
                evaluate(pos)
            } else {
                draw
            };
            let ply = ss[SS].ply;
            tally(pos, ply, v);
            return v;
        }

        // Mate-distance pruning.
        alpha = std::cmp::max(mated_in(ss[SS].ply), alpha);
        beta = std::cmp::min(mate_in(ss[SS].ply + 1), beta);
        if alpha >= beta {
            return alpha;
        }
    }

    debug_assert!(0 <= ss[SS].ply && ss[SS].ply < MAX_PLY);

    ss[SS + 1].ply = ss[SS].ply + 1;
    ss[SS].current_move = Move::NONE;
    ss[SS + 1].excluded_move = Move::NONE;
    let mut best_move = Move::NONE;
    ss[SS].cont_history = pos.cont_history.sentinel();
    ss[SS + 2].killers = [Move::NONE; 2];
    let prev_sq = ss[SS - 1].current_move.to();

    // The grandchildren share this frame's statScore slot; only the
    // first one starts from zero.
    ss[SS + 2].stat_score = 0;

    let excluded_move = ss[SS].excluded_move;
    let pos_key = pos.key() ^ Key((excluded_move.0 as u64) << 16);
    let (mut tte, mut tt_hit) = tt::probe(pos_key);
    let mut tt_value = if tt_hit {
        value_from_tt(tte.value(), ss[SS].ply)
    } else {
        Value::NONE
    };
    let mut tt_move = if root_node {
        pos.root_moves[pos.pv_idx].pv[0]
    } else if tt_hit {
        tte.mov()
    } else {
        Move::NONE
    };
    let tt_pv = (tt_hit && tte.is_pv()) || (pv_node && depth > 4 * ONE_PLY);

    // Shuffling toward the fifty-move horizon with a deeper entry in
    // the table already counts as heading into a draw.
    if pos.rule50_count() > 36
        && ss[SS].ply > 36
        && depth < 3 * ONE_PLY
        && tt_hit
        && tte.depth() > depth
        && pos.pawn_count() > 0
    {
        return Value::DRAW;
    }

    if !pv_node
        && tt_hit
        && tte.depth() >= depth
        && tt_value != Value::NONE
        && (if tt_value >= beta {
            tte.bound() & Bound::LOWER != 0
        } else {
            tte.bound() & Bound::UPPER != 0
        })
    {
        if tt_move != Move::NONE {
            if tt_value >= beta {
                if !pos.capture_or_promotion(tt_move) {
                    update_quiet_stats(pos, ss, tt_move, &[], 0, stat_bonus(depth));
                }
                if (ss[SS - 1].move_count == 1
                    || ss[SS - 1].current_move == ss[SS - 1].killers[0])
                    && pos.captured_piece().is_none()
                {
                    let pc = pos.piece_index_on(prev_sq);
                    update_continuation_histories(ss, pc, prev_sq, -stat_bonus(depth + ONE_PLY));
                }
            } else if !pos.capture_or_promotion(tt_move) {
                let penalty = -stat_bonus(depth);
                pos.main_history.update(us, tt_move, penalty);
                let pc = pos.moved_piece_index(tt_move);
                update_continuation_histories(&ss[1..], pc, tt_move.to(), penalty);
            }
        }
        let ply = ss[SS].ply;
        tally(pos, ply, tt_value);
        return tt_value;
    }

    // Experience store lookup: graft a stored child that is at least as
    // deep as this node and return its score outside the root.
    let mut exp_probe: Option<experience::ExpProbe> = None;
    if cfg.persisted_self_learning && excluded_move == Move::NONE && experience::use_exp() {
        if let Some(p) = experience::probe(pos_key) {
            experience::note_hit();
            exp_probe = Some(p);
            if p.depth >= depth && p.mv != Move::NONE {
                if tt_move == Move::NONE {
                    tt_move = p.mv;
                }
                if !tt_hit {
                    tte.save(
                        pos_key,
                        p.score,
                        tt_pv,
                        Bound::EXACT,
                        p.depth,
                        p.mv,
                        p.score,
                        tt::generation(),
                    );
                    let probed = tt::probe(pos_key);
                    tte = probed.0;
                    tt_hit = probed.1;
                    tt_value = if tt_hit {
                        value_from_tt(tte.value(), ss[SS].ply)
                    } else {
                        Value::NONE
                    };
                }
                if !root_node {
                    if p.score >= beta && !pos.capture_or_promotion(p.mv) {
                        update_quiet_stats(pos, ss, p.mv, &[], 0, stat_bonus(depth));
                        if ss[SS - 1].move_count == 1 && pos.captured_piece().is_none() {
                            let pc = pos.piece_index_on(prev_sq);
                            update_continuation_histories(
                                ss,
                                pc,
                                prev_sq,
                                -stat_bonus(depth + ONE_PLY),
                            );
                        }
                    }
                    pos.tb_hits += 1;
                    let ply = ss[SS].ply;
                    tally(pos, ply, p.score);
                    return p.score;
                }
            }
        }
    }

    // Tablebase probe, when a backend is configured and the position
    // is small enough.
    if !root_node && tb::cardinality() != 0 {
        let pieces_cnt = pos.count_all() as i32;
        if pieces_cnt <= tb::cardinality()
            && (pieces_cnt < tb::cardinality() || depth >= tb::probe_depth())
            && pos.rule50_count() == 0
            && !pos.has_castling_right()
        {
            if let Some(wdl) = tb::probe_wdl(pos) {
                pos.tb_hits += 1;
                let draw_score = if tb::use_rule_50() { 1 } else { 0 };
                let value = if wdl < -draw_score {
                    Value(-Value::MATE.0 + MAX_MATE_PLY + 1 + ss[SS].ply)
                } else if wdl > draw_score {
                    Value(Value::MATE.0 - MAX_MATE_PLY - 1 - ss[SS].ply)
                } else {
                    Value::DRAW + Value(2 * wdl * draw_score)
                };
                let b = if wdl < -draw_score {
                    Bound::UPPER
                } else if wdl > draw_score {
                    Bound::LOWER
                } else {
                    Bound::EXACT
                };
                if b == Bound::EXACT
                    || (if b == Bound::LOWER {
                        value >= beta
                    } else {
                        value <= alpha
                    })
                {
                    tte.save(
                        pos_key,
                        value_to_tt(value, ss[SS].ply),
                        tt_pv,
                        b,
                        std::cmp::min(Depth::MAX - ONE_PLY, depth + 6 * ONE_PLY),
                        Move::NONE,
                        Value::NONE,
                        tt::generation(),
                    );
                    let ply = ss[SS].ply;
                    tally(pos, ply, value);
                    return value;
                }
                if pv_node {
                    if b == Bound::LOWER {
                        best_value = value;
                        alpha = std::cmp::max(alpha, best_value);
                    } else {
                        max_value = value;
                    }
                }
            }
        }
    }

    let mut improving = false;
    let mut pure_static_eval = Value::NONE;

    // Static evaluation and the early pruning steps; skipped entirely
    // when in check.
    loop {
        let eval;
        if in_check {
            ss[SS].static_eval = Value::NONE;
            break;
        } else if tt_hit {
            let mut tmp = tte.eval();
            if tmp == Value::NONE {
                tmp = evaluate(pos);
            }
            ss[SS].static_eval = tmp;
            pure_static_eval = tmp;
            if tt_value != Value::NONE
                && (tte.bound()
                    & (if tt_value > tmp {
                        Bound::LOWER
                    } else {
                        Bound::UPPER
                    }))
                    != 0
            {
                tmp = tt_value;
            }
            eval = tmp;
        } else {
            if ss[SS - 1].current_move != Move::NULL {
                let bonus = -ss[SS - 1].stat_score / 512;
                pure_static_eval = evaluate(pos);
                ss[SS].static_eval = pure_static_eval + bonus;
            } else {
                pure_static_eval = -ss[SS - 1].static_eval + TEMPO * 2;
                ss[SS].static_eval = pure_static_eval;
            }
            eval = ss[SS].static_eval;
            tte.save(
                pos_key,
                Value::NONE,
                tt_pv,
                Bound::NONE,
                Depth::NONE,
                Move::NONE,
                pure_static_eval,
                tt::generation(),
            );
        }

        // Razoring: hopeless shallow nodes drop straight to quiescence.
        if !root_node && depth < 2 * ONE_PLY && eval <= alpha - RAZOR_MARGIN {
            let v = qsearch::<NT, False>(pos, ss, alpha, beta, Depth::ZERO);
            let ply = ss[SS].ply;
            tally(pos, ply, v);
            return v;
        }

        improving = ss[SS].static_eval >= ss[SS - 2].static_eval
            || ss[SS - 2].static_eval == Value::NONE;

        // Futility: a comfortable static margin over beta at shallow
        // depth stands without searching.
        if !pv_node
            && depth < 7 * ONE_PLY
            && eval - futility_margin(depth, improving) >= beta
            && eval < Value::KNOWN_WIN
        {
            let ply = ss[SS].ply;
            tally(pos, ply, eval);
            return eval;
        }

        // Null move with verification.
        if !pv_node
            && ss[SS - 1].current_move != Move::NULL
            && ss[SS - 1].stat_score < 23200
            && eval >= beta
            && pure_static_eval.0
                >= beta.0 - (320.0 * ((depth / ONE_PLY) as f64).ln()) as i32 + 500
            && excluded_move == Move::NONE
            && pos.non_pawn_material_c(us) > BISHOP_VALUE_MG
            && (ss[SS].ply >= pos.nmp_min_ply || us != pos.nmp_color)
        {
            debug_assert!(eval >= beta);

            let r = std::cmp::max(
                1,
                (2.6 * ((depth / ONE_PLY) as f64).ln()) as i32
                    + std::cmp::min((eval - beta).0 / 200, 3),
            ) * ONE_PLY;

            ss[SS].current_move = Move::NULL;
            ss[SS].cont_history = pos.cont_history.sentinel();
            pos.do_null_move();
            let mut null_value = -search::<NonPv>(
                pos,
                &mut ss[1..],
                -beta,
                -beta + 1,
                depth - r,
                !cut_node,
            );
            pos.undo_null_move();

            if null_value >= beta {
                if null_value >= Value::MATE_IN_MAX_PLY {
                    null_value = beta;
                }
                if pos.nmp_min_ply != 0 || (beta.abs() < Value::KNOWN_WIN && depth < 12 * ONE_PLY)
                {
                    let ply = ss[SS].ply;
                    tally(pos, ply, null_value);
                    return null_value;
                }

                debug_assert!(pos.nmp_min_ply == 0);

                // Verify at high depth with null pruning disabled for
                // our side until well past this ply.
                pos.nmp_min_ply = ss[SS].ply + 3 * ((depth - r) / ONE_PLY) / 4;
                pos.nmp_color = us;
                let v = search::<NonPv>(pos, ss, beta - 1, beta, depth - r, false);
                pos.nmp_min_ply = 0;

                if v >= beta {
                    let ply = ss[SS].ply;
                    tally(pos, ply, null_value);
                    return null_value;
                }
            }
        }

        // ProbCut: a good capture clearing a raised beta on a reduced
        // search prunes the node.
        if !pv_node && depth >= 5 * ONE_PLY && beta.abs() < Value::MATE_IN_MAX_PLY {
            let raised_beta = std::cmp::min(
                Value(beta.0 + 216 - 48 * improving as i32),
                Value::INFINITE,
            );
            let mut mp = MovePickerPC::new(pos, tt_move, raised_beta - ss[SS].static_eval);
            let mut prob_cut_count = 0;
            while prob_cut_count < 2 + 2 * cut_node as i32 {
                let m = mp.next_move(pos);
                if m == Move::NONE {
                    break;
                }
                if m == excluded_move || !pos.legal(m) {
                    continue;
                }
                prob_cut_count += 1;

                ss[SS].current_move = m;
                ss[SS].cont_history = pos.cont_history.get(pos.moved_piece_index(m), m.to());

                pos.do_move(m);
                let mut value = if pos.in_check() {
                    -qsearch::<NonPv, True>(
                        pos,
                        &mut ss[1..],
                        -raised_beta,
                        -raised_beta + 1,
                        Depth::ZERO,
                    )
                } else {
                    -qsearch::<NonPv, False>(
                        pos,
                        &mut ss[1..],
                        -raised_beta,
                        -raised_beta + 1,
                        Depth::ZERO,
                    )
                };
                if value >= raised_beta {
                    value = -search::<NonPv>(
                        pos,
                        &mut ss[1..],
                        -raised_beta,
                        -raised_beta + 1,
                        depth - 4 * ONE_PLY,
                        !cut_node,
                    );
                }
                pos.undo_move(m);
                if value >= raised_beta {
                    let ply = ss[SS].ply;
                    tally(pos, ply, value);
                    return value;
                }
            }
        }

        // Internal iterative deepening when the table offers no move.
        if depth >= 8 * ONE_PLY && tt_move == Move::NONE {
            if pv_node {
                search::<Pv>(pos, ss, alpha, beta, depth - 7 * ONE_PLY, cut_node);
            } else {
                search::<NonPv>(pos, ss, alpha, beta, depth - 7 * ONE_PLY, cut_node);
            }
            let probed = tt::probe(pos_key);
            tte = probed.0;
            tt_hit = probed.1;
            tt_value = if tt_hit {
                value_from_tt(tte.value(), ss[SS].ply)
            } else {
                Value::NONE
            };
            tt_move = if tt_hit { tte.mov() } else { Move::NONE };
        }

        break;
    }

    let cont_hist = [
        ss[SS - 1].cont_history,
        ss[SS - 2].cont_history,
        ss[SS - 4].cont_history,
        ss[SS - 6].cont_history,
    ];
    let countermove = pos
        .counter_moves
        .get(pos.piece_index_on(prev_sq), prev_sq);

    let mut mp = MovePicker::new(pos, tt_move, ss[SS].killers, countermove, cont_hist);

    let mut value;
    let tt_capture = tt_move != Move::NONE && pos.capture_or_promotion(tt_move);
    let mut skip_quiets = false;
    let mut exp_singular = false;

    loop {
        let m = mp.next_move(pos, skip_quiets);
        if m == Move::NONE {
            break;
        }
        debug_assert!(m.is_ok());

        if m == excluded_move {
            continue;
        }

        // Respect searchmoves and the multiPV split at the root.
        if root_node
            && !pos.root_moves[pos.pv_idx..pos.pv_last]
                .iter()
                .any(|rm| rm.pv[0] == m)
        {
            continue;
        }

        move_count += 1;
        ss[SS].move_count = move_count;

        if root_node && pos.is_main && timeman::elapsed() > 3000 {
            println!(
                "info depth {} currmove {} currmovenumber {}",
                depth / ONE_PLY,
                m,
                move_count + pos.pv_idx as i32
            );
            stdout().flush().ok();
        }

        if pv_node {
            ss[SS + 1].pv.clear();
        }

        let mut extension = Depth::ZERO;
        let capture_or_promotion = pos.capture_or_promotion(m);
        let moved_piece_idx = pos.moved_piece_index(m);
        let moved_piece = pos.moved_piece(m);
        let gives_check = pos.gives_check(m);
        let move_count_pruning = move_count >= futility_move_count(improving, depth / ONE_PLY);

        if let Some(p) = exp_probe {
            if p.sons == 1 && m == p.mv && p.visits > 6 && pos.legal(m) {
                exp_singular = true;
            }
        }

        // Singular extension: if every alternative fails well below the
        // table value, the table move deserves another ply; if even the
        // reduced search beats beta, several moves do and the node is
        // cut outright.
        if depth >= 8 * ONE_PLY
            && m == tt_move
            && !root_node
            && excluded_move == Move::NONE
            && tt_value.abs() < Value::KNOWN_WIN
            && tt_hit
            && tte.bound() & Bound::LOWER != 0
            && tte.depth() >= depth - 3 * ONE_PLY
            && pos.legal(m)
        {
            let singular_beta = tt_value - Value(2 * (depth / ONE_PLY));
            let half_depth = (depth / ONE_PLY / 2) * ONE_PLY;
            ss[SS].excluded_move = m;
            let v = search::<NonPv>(
                pos,
                ss,
                singular_beta - 1,
                singular_beta,
                half_depth,
                cut_node,
            );
            ss[SS].excluded_move = Move::NONE;

            if v < singular_beta {
                extension = ONE_PLY;
            } else if cut_node && singular_beta >= beta {
                let ply = ss[SS].ply;
                tally(pos, ply, beta);
                return beta;
            }
        } else if gives_check && (pos.discovers_check(m) || pos.see_ge(m, Value::ZERO)) {
            extension = ONE_PLY;
        } else if pos.rule50_count() > 14 && ss[SS].ply > 14 && depth < 3 * ONE_PLY && pv_node {
            // Shuffle extension: grant depth while the counter climbs.
            extension = ONE_PLY;
        } else if pos.is_castling(m) {
            extension = ONE_PLY;
        }

        let new_depth = depth - ONE_PLY + extension;

        // Pruning at shallow depth.
        if !root_node
            && pos.non_pawn_material_c(us) != Value::ZERO
            && best_value > Value::MATED_IN_MAX_PLY
        {
            if !capture_or_promotion && !gives_check && !pos.advanced_pawn_push(m) {
                if move_count_pruning {
                    skip_quiets = true;
                    continue;
                }

                if cfg.persisted_self_learning && exp_singular && move_count > 3 {
                    continue;
                }

                let lmr_depth = std::cmp::max(
                    new_depth - reduction(&cfg, pv_node, improving, depth, move_count),
                    Depth::ZERO,
                ) / ONE_PLY;

                if lmr_depth
                    < 3 + (ss[SS - 1].stat_score > 0 || ss[SS - 1].move_count == 1) as i32
                    && cont_hist[0].get(moved_piece_idx, m.to()) < CM_THRESHOLD
                    && cont_hist[1].get(moved_piece_idx, m.to()) < CM_THRESHOLD
                {
                    continue;
                }

                if lmr_depth < 7
                    && !in_check
                    && ss[SS].static_eval + 256 + 200 * lmr_depth <= alpha
                {
                    continue;
                }

                if !pos.see_ge(m, Value(-29 * lmr_depth * lmr_depth)) {
                    continue;
                }
            } else if !pos.see_ge(m, -PAWN_VALUE_EG * (depth / ONE_PLY)) {
                continue;
            }
        }

        // The picker emits legal moves, but the hash move may be a
        // key-collision stray.
        if !root_node && !pos.legal(m) {
            move_count -= 1;
            ss[SS].move_count = move_count;
            continue;
        }

        ss[SS].current_move = m;
        ss[SS].cont_history = pos.cont_history.get(moved_piece_idx, m.to());

        pos.do_move(m);

        let do_full_depth_search;
        let mut train_features = [0f32; PERC_INPUT];
        let mut train_prediction = -1;

        // Late move reduction: search later moves shallower first and
        // re-search on promise.
        if depth >= 3 * ONE_PLY && move_count > 1 && (!capture_or_promotion || move_count_pruning)
        {
            let mut r = reduction(&cfg, pv_node, improving, depth, move_count);

            if tt_pv {
                r = r - ONE_PLY;
            }
            if ss[SS - 1].move_count > 15 {
                r = r - ONE_PLY;
            }

            if !capture_or_promotion {
                if tt_capture {
                    r = r + ONE_PLY;
                }
                if cut_node {
                    r = r + 2 * ONE_PLY;
                }

                // King walks in the middlegame rarely deserve depth.
                if moved_piece == Some(Piece::King)
                    && pos.non_pawn_material() > Value(8000)
                    && extension == Depth::ZERO
                    && !in_check
                {
                    r = r + ONE_PLY;
                }

                // A move that steps off an attacked square is no late
                // move at all.
                if !pos.see_ge(Move::make(m.to(), m.from()), Value::ZERO) {
                    r = r - 2 * ONE_PLY;
                } else if pos.advanced_pawn_push(m) {
                    r = r - ONE_PLY;
                }

                ss[SS].stat_score = pos.main_history.get(us, m)
                    + cont_hist[0].get(moved_piece_idx, m.to())
                    + cont_hist[1].get(moved_piece_idx, m.to())
                    + cont_hist[3].get(moved_piece_idx, m.to())
                    - 4000;

                if ss[SS].stat_score >= 0 && ss[SS - 1].stat_score < 0 {
                    r = r - ONE_PLY;
                } else if ss[SS - 1].stat_score >= 0 && ss[SS].stat_score < 0 {
                    r = r + ONE_PLY;
                }

                if cfg.perceptron_search {
                    train_features = [
                        (best_value.abs().0 * pos.non_pawn_material().0) as f32,
                        ss[SS].stat_score as f32,
                        move_count as f32,
                        (r / ONE_PLY) as f32,
                    ];
                    train_prediction = pos.perceptron.infer(train_features);
                    if !pos.style.is_forcing() {
                        r = r
                            - Depth(
                                (ss[SS].stat_score + 2000 * (train_prediction - 1)) / 20000,
                            );
                    }
                } else {
                    r = r - Depth(ss[SS].stat_score / 20000);
                }
            }

            // Near the root the playing style caps how far a move may
            // be reduced.
            if new_depth - r + 8 * ONE_PLY < pos.root_depth {
                r = std::cmp::min(r, pos.style.max_lmr);
            }

            let d = std::cmp::max(new_depth - std::cmp::max(r, Depth::ZERO), ONE_PLY);
            value = -search::<NonPv>(pos, &mut ss[1..], -(alpha + 1), -alpha, d, true);

            if train_prediction >= 0 && cfg.perceptron_search {
                let outcome = (value > alpha) as i32;
                if train_prediction != outcome {
                    pos.perceptron.train(train_features, 1e-2);
                }
            }

            do_full_depth_search = value > alpha && d != new_depth;
        } else {
            value = best_value; // placeholder until a real search runs
            do_full_depth_search = !pv_node || move_count > 1;
        }

        if do_full_depth_search {
            value = -search::<NonPv>(pos, &mut ss[1..], -(alpha + 1), -alpha, new_depth, !cut_node);
        }

        if pv_node && (move_count == 1 || (value > alpha && (root_node || value < beta))) {
            ss[SS + 1].pv.clear();
            value = -search::<Pv>(pos, &mut ss[1..], -beta, -alpha, new_depth, false);
        }

        pos.undo_move(m);

        debug_assert!(value > -Value::INFINITE && value < Value::INFINITE);

        // An aborted search leaves partial results everywhere; report
        // nothing.
        if threads::stop() {
            return Value::ZERO;
        }

        if root_node {
            let visits = pos.visits;
            let all_scores = pos.all_scores;
            let sel_depth = pos.sel_depth;
            let is_main = pos.is_main;
            let rm = pos
                .root_moves
                .iter_mut()
                .find(|rm| rm.pv[0] == m)
                .expect("root move missing");

            if cfg.perceptron_search {
                rm.visits += visits;
                rm.z_score += all_scores;
            }

            if move_count == 1 || value > alpha {
                rm.score = value;
                rm.sel_depth = sel_depth;
                rm.pv.truncate(1);
                let child_pv = ss[SS + 1].pv.clone();
                rm.pv.extend_from_slice(&child_pv);
                if move_count > 1 && is_main {
                    pos.best_move_changes += 1.0;
                }
            } else {
                rm.score = -Value::INFINITE;
            }

            if cfg.perceptron_search {
                pos.visits = 0;
                pos.all_scores = 0;
            }
        }

        if value > best_value {
            best_value = value;
            if value > alpha {
                best_move = m;
                if pv_node && !root_node {
                    update_pv(ss, m);
                }
                if pv_node && value < beta {
                    alpha = value;
                } else {
                    debug_assert!(value >= beta);
                    ss[SS].stat_score = 0;
                    break;
                }
            }
        }

        if m != best_move {
            if capture_or_promotion && capture_count < 32 {
                captures_searched[capture_count] = m;
                capture_count += 1;
            } else if !capture_or_promotion && quiet_count < 64 {
                quiets_searched[quiet_count] = m;
                quiet_count += 1;
            }
        }
    }

    if move_count == 0 {
        best_value = if excluded_move != Move::NONE {
            alpha
        } else if in_check {
            mated_in(ss[SS].ply)
        } else {
            Value::DRAW
        };
    } else if best_move != Move::NONE {
        if !pos.capture_or_promotion(best_move) {
            let boost = if best_value > beta + PAWN_VALUE_MG {
                ONE_PLY
            } else {
                Depth::ZERO
            };
            update_quiet_stats(
                pos,
                ss,
                best_move,
                &quiets_searched[..quiet_count],
                quiet_count,
                stat_bonus(depth + boost),
            );
        }
        update_capture_stats(
            pos,
            best_move,
            &captures_searched[..capture_count],
            capture_count,
            stat_bonus(depth + ONE_PLY),
        );

        if (ss[SS - 1].move_count == 1 || ss[SS - 1].current_move == ss[SS - 1].killers[0])
            && pos.captured_piece().is_none()
        {
            let pc = pos.piece_index_on(prev_sq);
            update_continuation_histories(ss, pc, prev_sq, -stat_bonus(depth + ONE_PLY));
        }
    } else if (depth >= 3 * ONE_PLY || pv_node) && pos.captured_piece().is_none() {
        // The prior move steered us into a fail low; reward it.
        let pc = pos.piece_index_on(prev_sq);
        update_continuation_histories(ss, pc, prev_sq, stat_bonus(depth));
    }

    if pv_node {
        best_value = std::cmp::min(best_value, max_value);
    }

    if excluded_move == Move::NONE {
        tte.save(
            pos_key,
            value_to_tt(best_value, ss[SS].ply),
            tt_pv,
            if best_value >= beta {
                Bound::LOWER
            } else if pv_node && best_move != Move::NONE {
                Bound::EXACT
            } else {
                Bound::UPPER
            },
            depth,
            best_move,
            pure_static_eval,
            tt::generation(),
        );
    }

    debug_assert!(best_value > -Value::INFINITE && best_value < Value::INFINITE);
    let ply = ss[SS].ply;
    tally(pos, ply, best_value);
    best_value
}

fn qsearch<NT: NodeType, InCheck: Bool>(
    pos: &mut Position,
    ss: &mut [Stack],
    mut alpha: Value,
    beta: Value,
    depth: Depth,
) -> Value {
    let pv_node = NT::PV;
    let in_check = InCheck::BOOL;

    debug_assert!(in_check == pos.in_check());
    debug_assert!(alpha >= -Value::INFINITE && alpha < beta && beta <= Value::INFINITE);
    debug_assert!(pv_node || alpha == beta - 1);
    debug_assert!(depth <= Depth::ZERO);

    let old_alpha = alpha;
    if pv_node {
        ss[SS].pv.clear();
    }

    ss[SS + 1].ply = ss[SS].ply + 1;
    ss[SS].current_move = Move::NONE;
    ss[SS].cont_history = pos.cont_history.sentinel();
    let mut best_move = Move::NONE;
    let mut move_count = 0;

    if pos.is_draw(ss[SS].ply) || ss[SS].ply >= MAX_PLY {
        return if ss[SS].ply >= MAX_PLY && !in_check {
            evaluate(pos)
        } else {
            Value::DRAW
        };
    }

    debug_assert!(0 <= ss[SS].ply && ss[SS].ply < MAX_PLY);

    // Only two table depths exist down here: with and without checks.
    let tt_depth = if in_check || depth >= Depth::QS_CHECKS {
        Depth::QS_CHECKS
    } else {
        Depth::QS_NO_CHECKS
    };

    let pos_key = pos.key();
    let (tte, tt_hit) = tt::probe(pos_key);
    let tt_move = if tt_hit { tte.mov() } else { Move::NONE };
    let tt_value = if tt_hit {
        value_from_tt(tte.value(), ss[SS].ply)
    } else {
        Value::NONE
    };
    let pv_hit = tt_hit && tte.is_pv();

    if !pv_node
        && tt_hit
        && tte.depth() >= tt_depth
        && tt_value != Value::NONE
        && (if tt_value >= beta {
            tte.bound() & Bound::LOWER != 0
        } else {
            tte.bound() & Bound::UPPER != 0
        })
    {
        return tt_value;
    }

    let mut best_value;
    let futility_base;

    if in_check {
        ss[SS].static_eval = Value::NONE;
        best_value = -Value::INFINITE;
        futility_base = -Value::INFINITE;
    } else {
        if tt_hit {
            let mut tmp = tte.eval();
            if tmp == Value::NONE {
                tmp = evaluate(pos);
            }
            ss[SS].static_eval = tmp;
            best_value = tmp;
            if tt_value != Value::NONE
                && (tte.bound()
                    & (if tt_value > best_value {
                        Bound::LOWER
                    } else {
                        Bound::UPPER
                    }))
                    != 0
            {
                best_value = tt_value;
            }
        } else {
            let v = if ss[SS - 1].current_move != Move::NULL {
                evaluate(pos)
            } else {
                -ss[SS - 1].static_eval + TEMPO * 2
            };
            ss[SS].static_eval = v;
            best_value = v;
        }

        // Stand pat.
        if best_value >= beta {
            if !tt_hit {
                tte.save(
                    pos_key,
                    value_to_tt(best_value, ss[SS].ply),
                    pv_hit,
                    Bound::LOWER,
                    Depth::NONE,
                    Move::NONE,
                    ss[SS].static_eval,
                    tt::generation(),
                );
            }
            return best_value;
        }

        if pv_node && best_value > alpha {
            alpha = best_value;
        }

        futility_base = best_value + 128;
    }

    let mut mp = MovePickerQ::new(pos, tt_move, depth, ss[SS - 1].current_move.to());

    loop {
        let m = mp.next_move(pos);
        if m == Move::NONE {
            break;
        }
        debug_assert!(m.is_ok());

        let gives_check = pos.gives_check(m);
        move_count += 1;

        // Futility pruning on the capture's material ceiling.
        if !in_check
            && !gives_check
            && futility_base > -Value::KNOWN_WIN
            && !pos.advanced_pawn_push(m)
        {
            let futility_value = futility_base + piece_value(EG, pos.piece_on(m.to()));
            if futility_value <= alpha {
                best_value = std::cmp::max(best_value, futility_value);
                continue;
            }
            if futility_base <= alpha && !pos.see_ge(m, Value(1)) {
                best_value = std::cmp::max(best_value, futility_base);
                continue;
            }
        }

        let evasion_prunable = in_check
            && (depth != Depth::ZERO || move_count > 2)
            && best_value > Value::MATED_IN_MAX_PLY
            && !pos.capture(m);

        if (!in_check || evasion_prunable) && !pos.see_ge(m, Value::ZERO) {
            continue;
        }

        if !pos.legal(m) {
            move_count -= 1;
            continue;
        }

        ss[SS].current_move = m;
        pos.do_move(m);
        let value = if gives_check {
            -qsearch::<NT, True>(pos, &mut ss[1..], -beta, -alpha, depth - ONE_PLY)
        } else {
            -qsearch::<NT, False>(pos, &mut ss[1..], -beta, -alpha, depth - ONE_PLY)
        };
        pos.undo_move(m);

        debug_assert!(value > -Value::INFINITE && value < Value::INFINITE);

        if value > best_value {
            best_value = value;
            if value > alpha {
                if pv_node {
                    update_pv(ss, m);
                }
                if pv_node && value < beta {
                    alpha = value;
                    best_move = m;
                } else {
                    tte.save(
                        pos_key,
                        value_to_tt(value, ss[SS].ply),
                        pv_hit,
                        Bound::LOWER,
                        tt_depth,
                        m,
                        ss[SS].static_eval,
                        tt::generation(),
                    );
                    return value;
                }
            }
        }
    }

    // Variety adds a bounded random nudge to near-balanced scores,
    // kept away from the mate range.
    if pos.cfg.variety > 0
        && best_value.abs() < Value::KNOWN_WIN
        && best_value + Value(pos.cfg.variety * PAWN_VALUE_EG.0 / 100) >= Value::ZERO
    {
        best_value += Value((rand::random::<u32>() % (pos.cfg.variety as u32 + 1)) as i32);
    }

    if in_check && best_value == -Value::INFINITE {
        return mated_in(ss[SS].ply);
    }

    tte.save(
        pos_key,
        value_to_tt(best_value, ss[SS].ply),
        pv_hit,
        if best_value >= beta {
            Bound::LOWER
        } else if pv_node && best_value > old_alpha {
            Bound::EXACT
        } else {
            Bound::UPPER
        },
        tt_depth,
        best_move,
        ss[SS].static_eval,
        tt::generation(),
    );

    debug_assert!(best_value > -Value::INFINITE && best_value < Value::INFINITE);
    best_value
}

/// Shift a stored score into the plies-from-current-position frame.
fn value_to_tt(v: Value, ply: i32) -> Value {
    debug_assert!(v != Value::NONE);
    if v >= Value::MATE_IN_MAX_PLY {
        v + ply
    } else if v <= Value::MATED_IN_MAX_PLY {
        v - ply
    } else {
        v
    }
}

/// Inverse of `value_to_tt`.
fn value_from_tt(v: Value, ply: i32) -> Value {
    if v == Value::NONE {
        Value::NONE
    } else if v >= Value::MATE_IN_MAX_PLY {
        v - ply
    } else if v <= Value::MATED_IN_MAX_PLY {
        v + ply
    } else {
        v
    }
}

fn update_pv(ss: &mut [Stack], m: Move) {
    let child_pv = ss[SS + 1].pv.clone();
    let pv = &mut ss[SS].pv;
    pv.clear();
    pv.push(m);
    pv.extend_from_slice(&child_pv);
}

/// Update the continuation planes one, two, four and six plies behind
/// the frame at slice index `SS - 1`, i.e. the frame that owns the move
/// whose piece/destination is being rewarded. Callers pass `&ss[1..]`
/// for the current move and the unshifted slice for the previous one.
fn update_continuation_histories(ss: &[Stack], pc: usize, to: Square, bonus: i32) {
    for i in [1usize, 2, 4, 6] {
        let frame = &ss[SS - 1 - i];
        if frame.current_move.is_ok() {
            frame.cont_history.update(pc, to, bonus);
        }
    }
}

fn update_capture_stats(pos: &Position, m: Move, captures: &[Move], capture_cnt: usize, bonus: i32) {
    if pos.capture_or_promotion(m) {
        if let Some(captured) = pos.captured_by(m) {
            pos.capture_history
                .update(pos.moved_piece_index(m), m.to(), captured, bonus);
        }
    }
    for &c in captures.iter().take(capture_cnt) {
        if let Some(captured) = pos.captured_by(c) {
            pos.capture_history
                .update(pos.moved_piece_index(c), c.to(), captured, -bonus);
        }
    }
}

fn update_quiet_stats(
    pos: &Position,
    ss: &mut [Stack],
    m: Move,
    quiets: &[Move],
    quiets_cnt: usize,
    bonus: i32,
) {
    if ss[SS].killers[0] != m {
        ss[SS].killers[1] = ss[SS].killers[0];
        ss[SS].killers[0] = m;
    }

    let us = pos.side_to_move();
    pos.main_history.update(us, m, bonus);
    update_continuation_histories(&ss[1..], pos.moved_piece_index(m), m.to(), bonus);

    if ss[SS - 1].current_move.is_ok() {
        let prev_sq = ss[SS - 1].current_move.to();
        pos.counter_moves
            .set(pos.piece_index_on(prev_sq), prev_sq, m);
    }

    for &q in quiets.iter().take(quiets_cnt) {
        pos.main_history.update(us, q, -bonus);
        update_continuation_histories(&ss[1..], pos.moved_piece_index(q), q.to(), -bonus);
    }
}

fn print_pv(pos: &mut Position, depth: Depth, alpha: Value, beta: Value) {
    let elapsed = timeman::elapsed() + 1;
    let pv_idx = pos.pv_idx;
    let multi_pv = effective_multi_pv(&pos.cfg).min(pos.root_moves.len());
    let nodes_searched = threads::nodes_searched();
    let tb_hits = threads::tb_hits();

    for i in 0..multi_pv {
        let updated = i <= pv_idx && pos.root_moves[i].score != -Value::INFINITE;
        if depth == ONE_PLY && !updated {
            continue;
        }
        let d = if updated { depth } else { depth - ONE_PLY };
        let mut v = if updated {
            pos.root_moves[i].score
        } else {
            pos.root_moves[i].previous_score
        };
        let tb = tb::root_in_tb() && v.abs() < Value::MATE - MAX_MATE_PLY;
        if tb {
            v = pos.root_moves[i].tb_score;
        }

        print!(
            "info depth {} seldepth {} multipv {} score {} ",
            d / ONE_PLY,
            pos.root_moves[i].sel_depth.max(1),
            i + 1,
            uci::value(v)
        );
        if !tb && i == pv_idx {
            if v >= beta {
                print!("lowerbound ");
            } else if v <= alpha {
                print!("upperbound ");
            }
        }
        print!(
            "nodes {} nps {}",
            nodes_searched,
            nodes_searched * 1000 / (elapsed as u64)
        );
        if elapsed > 1000 {
            print!(" hashfull {}", tt::hashfull());
        }
        print!(" tbhits {} time {} pv", tb_hits, elapsed);
        for m in &pos.root_moves[i].pv {
            print!(" {}", m);
        }
        println!();
    }
    stdout().flush().ok();
}

/// Dig a ponder move out of the table when the PV is one move long.
fn extract_ponder_from_tt(pos: &mut Position, m1: Move) -> Option<Move> {
    if m1 == Move::NONE || !pos.legal(m1) {
        return None;
    }
    pos.do_move(m1);
    let (tte, tt_hit) = tt::probe(pos.key());
    let mut ponder = None;
    if tt_hit {
        let m2 = tte.mov();
        if pos.legal(m2) {
            ponder = Some(m2);
        }
    }
    pos.undo_move(m1);
    ponder
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reduction_table_is_monotonic() {
        init();
        assert_eq!(REDUCTIONS[1], 0);
        for i in 2..64 {
            assert!(REDUCTIONS[i] >= REDUCTIONS[i - 1]);
        }
    }

    #[test]
    fn stat_bonus_matches_formula() {
        assert_eq!(stat_bonus(Depth(1)), 33);
        assert_eq!(stat_bonus(Depth(4)), 882);
        assert_eq!(stat_bonus(Depth(18)), 0);
    }

    #[test]
    fn futility_move_count_grows_with_improvement() {
        for d in 1..16 {
            assert!(futility_move_count(true, d) > futility_move_count(false, d));
        }
        assert_eq!(futility_move_count(false, 2), 4);
        assert_eq!(futility_move_count(true, 2), 9);
    }

    #[test]
    fn skill_level_maps_elo_range() {
        assert_eq!(Skill::new(1350).level, 0);
        assert_eq!(Skill::new(2850).level, 20);
        assert!(!Skill::new(2850).enabled());
        assert!(Skill::new(2000).enabled());
    }

    #[test]
    fn style_classification_tracks_score() {
        let mut s = StyleState::default();
        s.update(0);
        assert_eq!(s.style, PlayStyle::Balanced);
        assert!(!s.is_forcing());
        s.update(300);
        assert_eq!(s.style, PlayStyle::Sharp);
        assert!(s.is_forcing());
        assert!(s.max_lmr < LMR_CAP_MAX * ONE_PLY);
        s.update(-300);
        assert_eq!(s.style, PlayStyle::Solid);
    }

    #[test]
    fn killers_deduplicate() {
        use std::sync::Arc;
        let pos = Position::new(Arc::new(SearchConfig::default()));
        let mut ss: Vec<Stack> = (0..(MAX_PLY + 10) as usize)
            .map(|_| Stack {
                pv: Vec::new(),
                cont_history: pos.cont_history.sentinel(),
                ply: 0,
                current_move: Move::NONE,
                excluded_move: Move::NONE,
                killers: [Move::NONE; 2],
                static_eval: Value::ZERO,
                stat_score: 0,
                move_count: 0,
            })
            .collect();

        let m1 = Move(0x0421);
        let m2 = Move(0x0462);
        update_quiet_stats(&pos, &mut ss, m1, &[], 0, 100);
        update_quiet_stats(&pos, &mut ss, m2, &[], 0, 100);
        assert_eq!(ss[SS].killers, [m2, m1]);

        // Re-installing the same move must not duplicate it.
        update_quiet_stats(&pos, &mut ss, m2, &[], 0, 100);
        assert_eq!(ss[SS].killers, [m2, m1]);
        assert_ne!(ss[SS].killers[0], ss[SS].killers[1]);
    }

    #[test]
    fn root_moves_sort_best_first() {
        let mut moves: RootMoves = (0..3).map(|_| RootMove::new(Move(0x0421))).collect();
        moves[0].score = Value(10);
        moves[1].score = Value(50);
        moves[2].score = Value(-20);
        moves.sort();
        assert_eq!(moves[0].score, Value(50));
        assert_eq!(moves[2].score, Value(-20));
    }

    proptest! {
        #[test]
        fn tt_value_round_trips(v in -31900i32..31900, ply in 0i32..100) {
            let v = Value(v);
            prop_assert_eq!(value_from_tt(value_to_tt(v, ply), ply), v);
        }
    }
}
