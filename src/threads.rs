use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::thread::JoinHandle;

use once_cell::sync::Lazy;

use crate::position::Position;
use crate::search::{self, RootMove, SearchConfig};
use crate::types::*;
use crate::{experience, tb};

const WORKER_STACK: usize = 16 * 1024 * 1024;

/// Final outcome a worker publishes for the driver's vote.
#[derive(Clone)]
pub struct Report {
    pub best_move: Move,
    pub score: Value,
    pub pv: Vec<Move>,
    pub completed_depth: Depth,
    /// Every root line in final order, for multiPV consumers.
    pub lines: Vec<(Move, Value)>,
}

impl Default for Report {
    fn default() -> Report {
        Report {
            best_move: Move::NONE,
            score: -Value::INFINITE,
            pv: Vec::new(),
            completed_depth: Depth::ZERO,
            lines: Vec::new(),
        }
    }
}

struct WorkerState {
    searching: bool,
    quit: bool,
}

/// Shared handle between a worker thread and the rest of the process.
pub struct WorkerCtrl {
    pub idx: usize,
    pub nodes: AtomicU64,
    pub tb_hits: AtomicU64,
    clear_pending: AtomicBool,
    state: Mutex<WorkerState>,
    cv: Condvar,
    pub report: Mutex<Report>,
}

impl WorkerCtrl {
    fn new(idx: usize) -> WorkerCtrl {
        WorkerCtrl {
            idx,
            nodes: AtomicU64::new(0),
            tb_hits: AtomicU64::new(0),
            clear_pending: AtomicBool::new(false),
            state: Mutex::new(WorkerState {
                searching: false,
                quit: false,
            }),
            cv: Condvar::new(),
            report: Mutex::new(Report::default()),
        }
    }

    fn wake(&self) {
        let mut st = self.state.lock().unwrap();
        st.searching = true;
        self.cv.notify_all();
    }

    fn request_quit(&self) {
        let mut st = self.state.lock().unwrap();
        st.quit = true;
        self.cv.notify_all();
    }

    fn wait_idle(&self) {
        let mut st = self.state.lock().unwrap();
        while st.searching {
            st = self.cv.wait(st).unwrap();
        }
    }

    fn mark_idle(&self) {
        let mut st = self.state.lock().unwrap();
        st.searching = false;
        self.cv.notify_all();
    }
}

struct Pool {
    workers: Vec<Arc<WorkerCtrl>>,
    handles: Vec<JoinHandle<()>>,
}

static POOL: Lazy<Mutex<Pool>> = Lazy::new(|| {
    Mutex::new(Pool {
        workers: Vec::new(),
        handles: Vec::new(),
    })
});

static STOP: AtomicBool = AtomicBool::new(true);
static PONDER: AtomicBool = AtomicBool::new(false);
static STOP_ON_PONDERHIT: AtomicBool = AtomicBool::new(false);

/// Root position shared with the workers as fen plus played moves, so
/// each thread rebuilds the full game history for repetition checks.
pub struct PosData {
    pub fen: String,
    pub moves: Vec<Move>,
}

static POS_DATA: Lazy<RwLock<PosData>> = Lazy::new(|| {
    RwLock::new(PosData {
        fen: crate::position::START_FEN.to_string(),
        moves: Vec::new(),
    })
});

static CONFIG: Lazy<RwLock<Arc<SearchConfig>>> =
    Lazy::new(|| RwLock::new(Arc::new(SearchConfig::default())));

pub fn stop() -> bool {
    STOP.load(Ordering::Relaxed)
}

pub fn set_stop(b: bool) {
    STOP.store(b, Ordering::Release);
}

pub fn ponder() -> bool {
    PONDER.load(Ordering::Relaxed)
}

pub fn set_ponder(b: bool) {
    PONDER.store(b, Ordering::Release);
}

pub fn stop_on_ponderhit() -> bool {
    STOP_ON_PONDERHIT.load(Ordering::Relaxed)
}

pub fn set_stop_on_ponderhit(b: bool) {
    STOP_ON_PONDERHIT.store(b, Ordering::Release);
}

pub fn set_position(fen: String, moves: Vec<Move>) {
    let mut pd = POS_DATA.write().unwrap();
    pd.fen = fen;
    pd.moves = moves;
}

pub fn current_config() -> Arc<SearchConfig> {
    CONFIG.read().unwrap().clone()
}

fn worker_loop(ctrl: Arc<WorkerCtrl>) {
    let mut pos = Position::new(Arc::new(SearchConfig::default()));
    pos.thread_idx = ctrl.idx;
    pos.is_main = ctrl.idx == 0;
    pos.thread_ctrl = Some(ctrl.clone());

    loop {
        {
            let mut st = ctrl.state.lock().unwrap();
            while !st.searching && !st.quit {
                st = ctrl.cv.wait(st).unwrap();
            }
            if st.quit {
                return;
            }
        }

        if ctrl.clear_pending.swap(false, Ordering::Relaxed) {
            pos.clear_search_state();
        }

        pos.cfg = current_config();
        let (fen, moves) = {
            let pd = POS_DATA.read().unwrap();
            (pd.fen.clone(), pd.moves.clone())
        };
        if pos.set(&fen).is_ok() {
            for m in moves {
                pos.do_move(m);
            }
        }
        pos.nodes = 0;
        pos.tb_hits = 0;
        ctrl.nodes.store(0, Ordering::Relaxed);
        ctrl.tb_hits.store(0, Ordering::Relaxed);

        let mut root_moves: Vec<RootMove> = pos
            .legal_moves()
            .into_iter()
            .filter(|m| pos.cfg.searchmoves.is_empty() || pos.cfg.searchmoves.contains(m))
            .map(RootMove::new)
            .collect();
        tb::rank_root_moves(&pos, &mut root_moves);
        pos.root_moves = root_moves;

        if ctrl.idx == 0 {
            search::mainthread_search(&mut pos);
        } else {
            search::thread_search(&mut pos);
        }

        {
            let mut report = ctrl.report.lock().unwrap();
            *report = match pos.root_moves.first() {
                Some(rm) => Report {
                    best_move: rm.pv[0],
                    score: rm.score,
                    pv: rm.pv.clone(),
                    completed_depth: pos.completed_depth,
                    lines: pos
                        .root_moves
                        .iter()
                        .map(|rm| (rm.pv[0], rm.score))
                        .collect(),
                },
                None => Report::default(),
            };
        }
        ctrl.nodes.store(pos.nodes, Ordering::Relaxed);
        ctrl.tb_hits.store(pos.tb_hits, Ordering::Relaxed);

        ctrl.mark_idle();
    }
}

/// Spawn `n` workers. Idempotent when the pool already has that size.
pub fn init(n: usize) {
    let n = n.max(1);
    {
        let pool = POOL.lock().unwrap();
        if pool.workers.len() == n {
            return;
        }
    }
    free();
    let mut pool = POOL.lock().unwrap();
    for idx in 0..n {
        let ctrl = Arc::new(WorkerCtrl::new(idx));
        let thread_ctrl = ctrl.clone();
        let handle = std::thread::Builder::new()
            .name(format!("remora-worker-{}", idx))
            .stack_size(WORKER_STACK)
            .spawn(move || worker_loop(thread_ctrl))
            .expect("failed to spawn worker");
        pool.workers.push(ctrl);
        pool.handles.push(handle);
    }
}

pub fn set_thread_count(n: usize) {
    wait_for_all();
    init(n);
}

/// Ask every worker to quit and join them. Any in-flight search is
/// cancelled first.
pub fn free() {
    let (workers, handles) = {
        let mut pool = POOL.lock().unwrap();
        (
            std::mem::take(&mut pool.workers),
            std::mem::take(&mut pool.handles),
        )
    };
    set_stop(true);
    for w in &workers {
        w.request_quit();
    }
    for h in handles {
        let _ = h.join();
    }
}

pub fn worker_count() -> usize {
    POOL.lock().unwrap().workers.len()
}

fn workers() -> Vec<Arc<WorkerCtrl>> {
    POOL.lock().unwrap().workers.clone()
}

pub fn wake_up_slaves() {
    for w in workers().iter().skip(1) {
        w.wake();
    }
}

pub fn wait_for_slaves() {
    for w in workers().iter().skip(1) {
        w.wait_idle();
    }
}

pub fn wait_for_main() {
    if let Some(w) = workers().first() {
        w.wait_idle();
    }
}

pub fn wait_for_all() {
    for w in workers() {
        w.wait_idle();
    }
}

pub fn nodes_searched() -> u64 {
    workers().iter().map(|w| w.nodes.load(Ordering::Relaxed)).sum()
}

pub fn tb_hits() -> u64 {
    workers()
        .iter()
        .map(|w| w.tb_hits.load(Ordering::Relaxed))
        .sum()
}

/// Zero each worker's heuristic state at its next wake-up.
pub fn request_clear() {
    for w in workers() {
        w.clear_pending.store(true, Ordering::Relaxed);
    }
}

/// Collected worker outcomes for the driver's vote.
pub fn reports() -> Vec<Report> {
    workers()
        .iter()
        .map(|w| w.report.lock().unwrap().clone())
        .collect()
}

/// Kick off a search. The caller must have stored the position first
/// via `set_position`; options are snapshotted here into an immutable
/// config the workers share.
pub fn start_thinking(cfg: SearchConfig) {
    wait_for_main();
    experience::reset_hits();
    set_stop_on_ponderhit(false);
    set_ponder(cfg.ponder);
    *CONFIG.write().unwrap() = Arc::new(cfg);
    set_stop(false);
    if let Some(main) = workers().first() {
        main.wake();
    }
}
