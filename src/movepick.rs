use std::cell::Cell;

use chess::{BitBoard, Color, MoveGen, Piece, Square, ALL_SQUARES};

use crate::position::Position;
use crate::types::*;

/// Saturation bound shared by all history tables. The gravity update
/// keeps every entry strictly inside (-HISTORY_MAX, HISTORY_MAX).
pub const HISTORY_MAX: i32 = 10692;

/// Continuation-history threshold below which counter-move pruning fires.
pub const CM_THRESHOLD: i32 = 0;

fn gravity(cell: &Cell<i32>, bonus: i32) {
    debug_assert!(bonus.abs() <= HISTORY_MAX);
    let v = cell.get();
    cell.set(v + bonus - v * bonus.abs() / HISTORY_MAX);
}

/// Butterfly history indexed by side to move and from-to squares.
pub struct ButterflyHistory {
    table: [[Cell<i32>; 4096]; 2],
}

impl ButterflyHistory {
    pub fn new_boxed() -> Box<ButterflyHistory> {
        // Cell<i32> is a valid all-zeroes bit pattern.
        unsafe { Box::new_zeroed().assume_init() }
    }

    pub fn get(&self, c: Color, m: Move) -> i32 {
        self.table[c.to_index()][m.from_to()].get()
    }

    pub fn update(&self, c: Color, m: Move, bonus: i32) {
        gravity(&self.table[c.to_index()][m.from_to()], bonus);
    }

    pub fn clear(&self) {
        for side in &self.table {
            for e in side.iter() {
                e.set(0);
            }
        }
    }
}

/// Capture history indexed by moved piece, destination and victim type.
pub struct CapturePieceToHistory {
    table: [[[Cell<i32>; 6]; 64]; PIECE_NB],
}

impl CapturePieceToHistory {
    pub fn new_boxed() -> Box<CapturePieceToHistory> {
        unsafe { Box::new_zeroed().assume_init() }
    }

    pub fn get(&self, pc: usize, to: Square, captured: Piece) -> i32 {
        self.table[pc][to.to_index()][captured.to_index()].get()
    }

    pub fn update(&self, pc: usize, to: Square, captured: Piece, bonus: i32) {
        gravity(&self.table[pc][to.to_index()][captured.to_index()], bonus);
    }

    pub fn clear(&self) {
        for plane in &self.table {
            for row in plane.iter() {
                for e in row.iter() {
                    e.set(0);
                }
            }
        }
    }
}

/// One continuation-history plane, indexed by (piece, destination).
pub struct PieceToHistory {
    table: [[Cell<i32>; 64]; PIECE_NB],
}

impl PieceToHistory {
    pub fn get(&self, pc: usize, to: Square) -> i32 {
        self.table[pc][to.to_index()].get()
    }

    pub fn update(&self, pc: usize, to: Square, bonus: i32) {
        gravity(&self.table[pc][to.to_index()], bonus);
    }

    fn clear(&self) {
        for row in &self.table {
            for e in row.iter() {
                e.set(0);
            }
        }
    }
}

/// Full continuation history: a plane per (prior piece, prior destination).
pub struct ContinuationHistory {
    planes: [[PieceToHistory; 64]; PIECE_NB],
}

impl ContinuationHistory {
    pub fn new_boxed() -> Box<ContinuationHistory> {
        unsafe { Box::new_zeroed().assume_init() }
    }

    /// The returned reference is tied to the boxed table, which the
    /// owning thread keeps alive for the whole search; stack frames
    /// holding these references never outlive it.
    pub fn get(&self, pc: usize, to: Square) -> &'static PieceToHistory {
        unsafe { &*(&self.planes[pc][to.to_index()] as *const PieceToHistory) }
    }

    /// Zero plane referenced by out-of-range stack frames.
    pub fn sentinel(&self) -> &'static PieceToHistory {
        self.get(NO_PIECE, ALL_SQUARES[0])
    }

    pub fn clear(&self) {
        for row in &self.planes {
            for plane in row.iter() {
                plane.clear();
            }
        }
    }
}

/// Most recent refutation of a (piece, destination) pair.
pub struct CounterMoveHistory {
    table: [[Cell<u16>; 64]; PIECE_NB],
}

impl CounterMoveHistory {
    pub fn new_boxed() -> Box<CounterMoveHistory> {
        unsafe { Box::new_zeroed().assume_init() }
    }

    pub fn get(&self, pc: usize, to: Square) -> Move {
        Move(self.table[pc][to.to_index()].get())
    }

    pub fn set(&self, pc: usize, to: Square, m: Move) {
        self.table[pc][to.to_index()].set(m.0);
    }

    pub fn clear(&self) {
        for row in &self.table {
            for e in row.iter() {
                e.set(0);
            }
        }
    }
}

const RANK_1_BB: BitBoard = BitBoard(0x0000_0000_0000_00ff);
const RANK_8_BB: BitBoard = BitBoard(0xff00_0000_0000_0000);

fn promotion_ranks(c: Color) -> BitBoard {
    if c == Color::White {
        RANK_8_BB
    } else {
        RANK_1_BB
    }
}

fn score_capture(pos: &Position, m: Move) -> i32 {
    let mut s = piece_value(MG, pos.captured_by(m)).0 * 6;
    if let Some(victim) = pos.captured_by(m) {
        s += pos
            .capture_history
            .get(pos.moved_piece_index(m), m.to(), victim);
    }
    match m.promotion() {
        Some(Piece::Queen) => s += QUEEN_VALUE_MG.0,
        Some(_) => s -= QUEEN_VALUE_MG.0,
        None => {}
    }
    s
}

fn score_quiet(pos: &Position, cont_hist: &[&'static PieceToHistory; 4], m: Move) -> i32 {
    let pc = pos.moved_piece_index(m);
    pos.main_history.get(pos.side_to_move(), m)
        + cont_hist[0].get(pc, m.to())
        + cont_hist[1].get(pc, m.to())
        + cont_hist[2].get(pc, m.to())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Stage {
    TtMove,
    CaptureInit,
    GoodCapture,
    Killer0,
    Killer1,
    Counter,
    QuietInit,
    Quiet,
    BadCapture,
    EvasionInit,
    Evasion,
    Done,
}

/// Staged move enumeration for the main search: hash move, winning
/// captures, killers, counter move, history-ordered quiets, losing
/// captures. All yielded moves are legal; the caller re-checks anyway
/// because the hash move may come from a key collision.
pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    killers: [Move; 2],
    counter: Move,
    cont_hist: [&'static PieceToHistory; 4],
    captures: Vec<(Move, i32)>,
    bad_captures: Vec<Move>,
    quiets: Vec<(Move, i32)>,
    cur: usize,
}

impl MovePicker {
    pub fn new(
        pos: &Position,
        tt_move: Move,
        killers: [Move; 2],
        counter: Move,
        cont_hist: [&'static PieceToHistory; 4],
    ) -> MovePicker {
        let stage = if pos.in_check() {
            Stage::EvasionInit
        } else if tt_move != Move::NONE && pos.legal(tt_move) {
            Stage::TtMove
        } else {
            Stage::CaptureInit
        };
        MovePicker {
            stage,
            tt_move,
            killers,
            counter,
            cont_hist,
            captures: Vec::new(),
            bad_captures: Vec::new(),
            quiets: Vec::new(),
            cur: 0,
        }
    }

    fn init_captures(&mut self, pos: &Position) {
        let tt = self.tt_move;
        let mut gen = MoveGen::new_legal(pos.board());
        gen.set_iterator_mask(pos.capture_targets() | promotion_ranks(pos.side_to_move()));
        let mut captures: Vec<(Move, i32)> = gen
            .map(Move::from_chess)
            .filter(|&m| m != tt && pos.capture_or_promotion(m))
            .map(|m| (m, score_capture(pos, m)))
            .collect();
        captures.sort_by_key(|&(_, s)| -s);
        self.captures = captures;
        self.cur = 0;
    }

    fn init_quiets(&mut self, pos: &Position) {
        let tt = self.tt_move;
        let killers = self.killers;
        let counter = self.counter;
        let cont_hist = self.cont_hist;
        let mut quiets: Vec<(Move, i32)> = MoveGen::new_legal(pos.board())
            .map(Move::from_chess)
            .filter(|&m| {
                !pos.capture_or_promotion(m)
                    && m != tt
                    && m != killers[0]
                    && m != killers[1]
                    && m != counter
            })
            .map(|m| (m, score_quiet(pos, &cont_hist, m)))
            .collect();
        quiets.sort_by_key(|&(_, s)| -s);
        self.quiets = quiets;
        self.cur = 0;
    }

    fn init_evasions(&mut self, pos: &Position) {
        // All evasions in one scored list: captures by victim value,
        // quiets by history.
        let tt = self.tt_move;
        let cont_hist = self.cont_hist;
        let mut evasions: Vec<(Move, i32)> = MoveGen::new_legal(pos.board())
            .map(Move::from_chess)
            .filter(|&m| m != tt)
            .map(|m| {
                let s = if pos.capture(m) {
                    (1 << 28) + piece_value(MG, pos.captured_by(m)).0 * 8
                        - pos.moved_piece_index(m) as i32
                } else {
                    score_quiet(pos, &cont_hist, m)
                };
                (m, s)
            })
            .collect();
        evasions.sort_by_key(|&(_, s)| -s);
        self.quiets = evasions;
        self.cur = 0;
    }

    pub fn next_move(&mut self, pos: &Position, skip_quiets: bool) -> Move {
        loop {
            match self.stage {
                Stage::TtMove => {
                    self.stage = Stage::CaptureInit;
                    return self.tt_move;
                }
                Stage::CaptureInit => {
                    self.init_captures(pos);
                    self.stage = Stage::GoodCapture;
                }
                Stage::GoodCapture => {
                    while self.cur < self.captures.len() {
                        let (m, _) = self.captures[self.cur];
                        self.cur += 1;
                        if pos.see_ge(m, Value::ZERO) {
                            return m;
                        }
                        self.bad_captures.push(m);
                    }
                    self.stage = Stage::Killer0;
                }
                Stage::Killer0 => {
                    self.stage = Stage::Killer1;
                    let m = self.killers[0];
                    if m != Move::NONE && m != self.tt_move && !pos.capture(m) && pos.legal(m) {
                        return m;
                    }
                }
                Stage::Killer1 => {
                    self.stage = Stage::Counter;
                    let m = self.killers[1];
                    if m != Move::NONE && m != self.tt_move && !pos.capture(m) && pos.legal(m) {
                        return m;
                    }
                }
                Stage::Counter => {
                    self.stage = Stage::QuietInit;
                    let m = self.counter;
                    if m != Move::NONE
                        && m != self.tt_move
                        && m != self.killers[0]
                        && m != self.killers[1]
                        && !pos.capture(m)
                        && pos.legal(m)
                    {
                        return m;
                    }
                }
                Stage::QuietInit => {
                    self.init_quiets(pos);
                    self.stage = Stage::Quiet;
                }
                Stage::Quiet => {
                    if !skip_quiets && self.cur < self.quiets.len() {
                        let (m, _) = self.quiets[self.cur];
                        self.cur += 1;
                        return m;
                    }
                    self.stage = Stage::BadCapture;
                    self.cur = 0;
                }
                Stage::BadCapture => {
                    if self.cur < self.bad_captures.len() {
                        let m = self.bad_captures[self.cur];
                        self.cur += 1;
                        return m;
                    }
                    self.stage = Stage::Done;
                }
                Stage::EvasionInit => {
                    let tt = self.tt_move;
                    if tt != Move::NONE && pos.legal(tt) {
                        self.stage = Stage::Evasion;
                        self.init_evasions(pos);
                        return tt;
                    }
                    self.init_evasions(pos);
                    self.stage = Stage::Evasion;
                }
                Stage::Evasion => {
                    if self.cur < self.quiets.len() {
                        let (m, _) = self.quiets[self.cur];
                        self.cur += 1;
                        return m;
                    }
                    self.stage = Stage::Done;
                }
                Stage::Done => return Move::NONE,
            }
        }
    }
}

/// Quiescence picker: captures and queen promotions, plus quiet checks
/// at the checks-included depth, plus every evasion when in check. Below
/// the recapture horizon only recaptures on the previous destination.
pub struct MovePickerQ {
    stage: Stage,
    tt_move: Move,
    moves: Vec<(Move, i32)>,
    cur: usize,
}

const QS_RECAPTURES: Depth = Depth(-5);

impl MovePickerQ {
    pub fn new(pos: &Position, tt_move: Move, depth: Depth, prev_sq: Square) -> MovePickerQ {
        let mut picker = MovePickerQ {
            stage: Stage::TtMove,
            tt_move,
            moves: Vec::new(),
            cur: 0,
        };
        if tt_move == Move::NONE || !pos.legal(tt_move) {
            picker.stage = Stage::CaptureInit;
        }
        picker.generate(pos, depth, prev_sq);
        picker
    }

    fn generate(&mut self, pos: &Position, depth: Depth, prev_sq: Square) {
        let tt = self.tt_move;
        let mut moves: Vec<(Move, i32)>;
        if pos.in_check() {
            moves = MoveGen::new_legal(pos.board())
                .map(Move::from_chess)
                .filter(|&m| m != tt)
                .map(|m| {
                    let s = if pos.capture(m) {
                        (1 << 28) + piece_value(MG, pos.captured_by(m)).0
                    } else {
                        pos.main_history.get(pos.side_to_move(), m)
                    };
                    (m, s)
                })
                .collect();
        } else {
            let include_checks = depth >= Depth::QS_CHECKS;
            let recaptures_only = depth <= QS_RECAPTURES;
            let mut gen = MoveGen::new_legal(pos.board());
            gen.set_iterator_mask(pos.capture_targets() | promotion_ranks(pos.side_to_move()));
            moves = gen
                .map(Move::from_chess)
                .filter(|&m| {
                    m != tt
                        && pos.capture_or_promotion(m)
                        && m.promotion().map_or(true, |p| p == Piece::Queen)
                        && (!recaptures_only || m.to() == prev_sq)
                })
                .map(|m| (m, piece_value(MG, pos.captured_by(m)).0 * 6))
                .collect();
            if include_checks && !recaptures_only {
                let quiet_checks: Vec<(Move, i32)> = MoveGen::new_legal(pos.board())
                    .map(Move::from_chess)
                    .filter(|&m| m != tt && !pos.capture_or_promotion(m) && pos.gives_check(m))
                    .map(|m| (m, pos.main_history.get(pos.side_to_move(), m)))
                    .collect();
                moves.extend(quiet_checks);
            }
        }
        moves.sort_by_key(|&(_, s)| -s);
        self.moves = moves;
    }

    pub fn next_move(&mut self, _pos: &Position) -> Move {
        if self.stage == Stage::TtMove {
            self.stage = Stage::CaptureInit;
            return self.tt_move;
        }
        if self.cur < self.moves.len() {
            let (m, _) = self.moves[self.cur];
            self.cur += 1;
            return m;
        }
        Move::NONE
    }
}

/// ProbCut picker: captures whose static exchange clears `threshold`.
pub struct MovePickerPC {
    tt_move: Move,
    tt_pending: bool,
    threshold: Value,
    moves: Vec<(Move, i32)>,
    cur: usize,
}

impl MovePickerPC {
    pub fn new(pos: &Position, tt_move: Move, threshold: Value) -> MovePickerPC {
        let mut gen = MoveGen::new_legal(pos.board());
        gen.set_iterator_mask(pos.capture_targets() | promotion_ranks(pos.side_to_move()));
        let mut moves: Vec<(Move, i32)> = gen
            .map(Move::from_chess)
            .filter(|&m| m != tt_move && pos.capture_or_promotion(m))
            .map(|m| (m, piece_value(MG, pos.captured_by(m)).0))
            .collect();
        moves.sort_by_key(|&(_, s)| -s);
        let tt_pending = tt_move != Move::NONE
            && pos.legal(tt_move)
            && pos.capture_or_promotion(tt_move)
            && pos.see_ge(tt_move, threshold);
        MovePickerPC {
            tt_move,
            tt_pending,
            threshold,
            moves,
            cur: 0,
        }
    }

    pub fn next_move(&mut self, pos: &Position) -> Move {
        if self.tt_pending {
            self.tt_pending = false;
            return self.tt_move;
        }
        while self.cur < self.moves.len() {
            let (m, _) = self.moves[self.cur];
            self.cur += 1;
            if pos.see_ge(m, self.threshold) {
                return m;
            }
        }
        Move::NONE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchConfig;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn pos(fen: &str) -> Position {
        let mut p = Position::new(Arc::new(SearchConfig::default()));
        p.set(fen).unwrap();
        p
    }

    fn drain(pos: &Position, mut mp: MovePicker) -> Vec<Move> {
        let mut out = Vec::new();
        loop {
            let m = mp.next_move(pos, false);
            if m == Move::NONE {
                break;
            }
            out.push(m);
        }
        out
    }

    fn picker(pos: &Position, tt: Move) -> MovePicker {
        let sentinel = pos.cont_history.sentinel();
        MovePicker::new(pos, tt, [Move::NONE; 2], Move::NONE, [sentinel; 4])
    }

    #[test]
    fn yields_every_legal_move_exactly_once() {
        let p = pos("r1bqkbnr/pppp1ppp/2n5/4p3/3P4/5N2/PPP1PPPP/RNBQKB1R w KQkq - 2 3");
        let mut legal = p.legal_moves();
        let mut seen = drain(&p, picker(&p, Move::NONE));
        legal.sort_by_key(|m| m.0);
        seen.sort_by_key(|m| m.0);
        assert_eq!(legal, seen);
    }

    #[test]
    fn tt_move_comes_first() {
        let p = pos(crate::position::START_FEN);
        let tt = p
            .legal_moves()
            .into_iter()
            .find(|m| m.to_string() == "d2d4")
            .unwrap();
        let seen = drain(&p, picker(&p, tt));
        assert_eq!(seen[0], tt);
        assert_eq!(seen.iter().filter(|&&m| m == tt).count(), 1);
    }

    #[test]
    fn winning_capture_before_quiets() {
        // Rook takes an undefended queen.
        let p = pos("4k3/8/8/3q4/8/8/3R4/4K3 w - - 0 1");
        let seen = drain(&p, picker(&p, Move::NONE));
        assert_eq!(seen[0].to_string(), "d2d5");
    }

    #[test]
    fn losing_capture_comes_last() {
        // Rook takes a defended pawn: only capture, SEE-negative.
        let p = pos("4k3/8/2p5/3p4/8/8/3R4/3K4 w - - 0 1");
        let seen = drain(&p, picker(&p, Move::NONE));
        let cap = seen
            .iter()
            .position(|&m| m.to_string() == "d2d5")
            .expect("capture generated");
        assert_eq!(cap, seen.len() - 1);
    }

    #[test]
    fn qsearch_picker_yields_captures_only() {
        let p = pos("r1bqkbnr/pppp1ppp/2n5/4p3/3P4/5N2/PPP1PPPP/RNBQKB1R w KQkq - 2 3");
        let mut mp = MovePickerQ::new(&p, Move::NONE, Depth::QS_NO_CHECKS, ALL_SQUARES[0]);
        loop {
            let m = mp.next_move(&p);
            if m == Move::NONE {
                break;
            }
            assert!(p.capture_or_promotion(m), "{} is not a capture", m);
        }
    }

    #[test]
    fn evasions_cover_check() {
        let p = pos("rnbqkbnr/ppp1pppp/8/1B1p4/4P3/8/PPPP1PPP/RNBQK1NR b KQkq - 1 2");
        assert!(p.in_check());
        let seen = drain(&p, picker(&p, Move::NONE));
        let mut legal = p.legal_moves();
        legal.sort_by_key(|m| m.0);
        let mut seen = seen;
        seen.sort_by_key(|m| m.0);
        assert_eq!(legal, seen);
    }

    proptest! {
        #[test]
        fn history_stays_bounded(bonuses in prop::collection::vec(-10000i32..10000, 1..200)) {
            let h = ButterflyHistory::new_boxed();
            let m = Move(0x0421); // arbitrary from != to
            for b in bonuses {
                h.update(Color::White, m, b);
                prop_assert!(h.get(Color::White, m).abs() < HISTORY_MAX);
            }
        }

        #[test]
        fn capture_history_stays_bounded(bonuses in prop::collection::vec(-10000i32..10000, 1..200)) {
            let h = CapturePieceToHistory::new_boxed();
            let sq = ALL_SQUARES[27];
            for b in bonuses {
                h.update(3, sq, Piece::Pawn, b);
                prop_assert!(h.get(3, sq, Piece::Pawn).abs() < HISTORY_MAX);
            }
        }
    }
}
