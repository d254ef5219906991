use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use chess::{
    get_bishop_moves, get_king_moves, get_knight_moves, get_pawn_attacks, get_rook_moves,
    BitBoard, Board, Color, MoveGen, Piece, Square, EMPTY,
};

use crate::movepick::{
    ButterflyHistory, CapturePieceToHistory, ContinuationHistory, CounterMoveHistory,
};
use crate::perceptron::Perceptron;
use crate::search::{RootMoves, SearchConfig, StyleState};
use crate::threads::WorkerCtrl;
use crate::types::*;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

/// Undo record for one `do_move`/`do_null_move`.
struct StateInfo {
    board: Board,
    rule50: i32,
    plies_from_null: i32,
    captured: Option<Piece>,
}

/// Game state plus the per-thread search state that travels with it.
///
/// The board itself, legality and attack queries are delegated to the
/// `chess` crate; this type adds what the search needs on top: an undo
/// stack, the rule-50 counter and key history (the board collaborator
/// does not track either), static exchange evaluation, and the worker's
/// heuristic tables and counters.
pub struct Position {
    board: Board,
    states: Vec<StateInfo>,
    keys: Vec<u64>,
    rule50: i32,
    plies_from_null: i32,
    game_ply: i32,
    captured: Option<Piece>,

    // Per-thread search state.
    pub root_moves: RootMoves,
    pub pv_idx: usize,
    pub pv_last: usize,
    pub sel_depth: i32,
    pub root_depth: Depth,
    pub completed_depth: Depth,
    pub nodes: u64,
    pub tb_hits: u64,
    pub calls_cnt: i32,
    pub nmp_min_ply: i32,
    pub nmp_color: Color,
    pub is_main: bool,
    pub thread_idx: usize,
    pub failed_low: bool,
    pub best_move_changes: f64,
    pub previous_score: Value,
    pub previous_time_reduction: f64,
    pub visits: u64,
    pub all_scores: i64,
    pub contempt: Score,
    pub style: StyleState,
    pub perceptron: Perceptron,

    pub main_history: Box<ButterflyHistory>,
    pub capture_history: Box<CapturePieceToHistory>,
    pub counter_moves: Box<CounterMoveHistory>,
    pub cont_history: Box<ContinuationHistory>,

    pub thread_ctrl: Option<Arc<WorkerCtrl>>,
    pub cfg: Arc<SearchConfig>,
}

impl Position {
    pub fn new(cfg: Arc<SearchConfig>) -> Position {
        Position {
            board: Board::default(),
            states: Vec::with_capacity(256),
            keys: Vec::with_capacity(256),
            rule50: 0,
            plies_from_null: 0,
            game_ply: 0,
            captured: None,
            root_moves: Vec::new(),
            pv_idx: 0,
            pv_last: 0,
            sel_depth: 0,
            root_depth: Depth::ZERO,
            completed_depth: Depth::ZERO,
            nodes: 0,
            tb_hits: 0,
            calls_cnt: 0,
            nmp_min_ply: 0,
            nmp_color: Color::White,
            is_main: false,
            thread_idx: 0,
            failed_low: false,
            best_move_changes: 0.0,
            previous_score: -Value::INFINITE,
            previous_time_reduction: 1.0,
            visits: 0,
            all_scores: 0,
            contempt: Score::ZERO,
            style: StyleState::default(),
            perceptron: Perceptron::new(),
            main_history: ButterflyHistory::new_boxed(),
            capture_history: CapturePieceToHistory::new_boxed(),
            counter_moves: CounterMoveHistory::new_boxed(),
            cont_history: ContinuationHistory::new_boxed(),
            thread_ctrl: None,
            cfg,
        }
    }

    /// Reset to `fen`, dropping all history.
    pub fn set(&mut self, fen: &str) -> Result<()> {
        let board = Board::from_str(fen).map_err(|e| anyhow!("bad fen: {}", e))?;
        let mut fields = fen.split_whitespace().skip(4);
        let rule50 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(0);
        let fullmove: i32 = fields.next().and_then(|s| s.parse().ok()).unwrap_or(1);
        self.game_ply =
            (2 * (fullmove - 1) + (board.side_to_move() == Color::Black) as i32).max(0);
        self.board = board;
        self.states.clear();
        self.keys.clear();
        self.rule50 = rule50;
        self.plies_from_null = rule50;
        self.captured = None;
        Ok(())
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn side_to_move(&self) -> Color {
        self.board.side_to_move()
    }

    pub fn key(&self) -> Key {
        Key(self.board.get_hash())
    }

    /// Key of the position the game started from.
    pub fn game_start_key(&self) -> Key {
        Key(self.keys.first().copied().unwrap_or_else(|| self.board.get_hash()))
    }

    pub fn checkers(&self) -> BitBoard {
        *self.board.checkers()
    }

    pub fn in_check(&self) -> bool {
        *self.board.checkers() != EMPTY
    }

    pub fn piece_on(&self, sq: Square) -> Option<Piece> {
        self.board.piece_on(sq)
    }

    /// Dense table index of the piece on `sq` (`NO_PIECE` when empty).
    pub fn piece_index_on(&self, sq: Square) -> usize {
        match (self.board.piece_on(sq), self.board.color_on(sq)) {
            (Some(p), Some(c)) => piece_index(c, p),
            _ => NO_PIECE,
        }
    }

    pub fn moved_piece(&self, m: Move) -> Option<Piece> {
        self.board.piece_on(m.from())
    }

    /// Dense table index of the piece moved by `m`.
    pub fn moved_piece_index(&self, m: Move) -> usize {
        match self.board.piece_on(m.from()) {
            Some(p) => piece_index(self.board.side_to_move(), p),
            None => NO_PIECE,
        }
    }

    pub fn captured_piece(&self) -> Option<Piece> {
        self.captured
    }

    pub fn is_en_passant(&self, m: Move) -> bool {
        self.board.piece_on(m.from()) == Some(Piece::Pawn)
            && m.from().get_file() != m.to().get_file()
            && self.board.piece_on(m.to()).is_none()
    }

    pub fn capture(&self, m: Move) -> bool {
        self.board.piece_on(m.to()).is_some() || self.is_en_passant(m)
    }

    pub fn capture_or_promotion(&self, m: Move) -> bool {
        self.capture(m) || m.promotion().is_some()
    }

    /// Piece taken by `m`, accounting for en passant.
    pub fn captured_by(&self, m: Move) -> Option<Piece> {
        if self.is_en_passant(m) {
            Some(Piece::Pawn)
        } else {
            self.board.piece_on(m.to())
        }
    }

    pub fn is_castling(&self, m: Move) -> bool {
        self.board.piece_on(m.from()) == Some(Piece::King)
            && (m.from().get_file().to_index() as i32 - m.to().get_file().to_index() as i32).abs()
                == 2
    }

    pub fn gives_check(&self, m: Move) -> bool {
        *self.board.make_move_new(m.to_chess()).checkers() != EMPTY
    }

    /// Strict legality, safe for moves from the TT or killer slots.
    pub fn legal(&self, m: Move) -> bool {
        m.is_ok() && self.board.legal(m.to_chess())
    }

    /// The board collaborator only enumerates legal moves, so the
    /// pseudo-legality screen coincides with `legal`.
    pub fn pseudo_legal(&self, m: Move) -> bool {
        self.legal(m)
    }

    pub fn has_legal_moves(&self) -> bool {
        MoveGen::new_legal(&self.board).len() > 0
    }

    pub fn legal_moves(&self) -> Vec<Move> {
        MoveGen::new_legal(&self.board)
            .map(Move::from_chess)
            .collect()
    }

    /// Destination mask covering every capture, including en passant.
    pub fn capture_targets(&self) -> BitBoard {
        let mut mask = *self.board.color_combined(!self.board.side_to_move());
        if let Some(ep) = self.board.en_passant() {
            mask = mask | BitBoard::from_square(ep);
            if let Some(behind) = ep.forward(self.board.side_to_move()) {
                mask = mask | BitBoard::from_square(behind);
            }
        }
        mask
    }

    pub fn rule50_count(&self) -> i32 {
        self.rule50
    }

    pub fn game_ply(&self) -> i32 {
        self.game_ply
    }

    pub fn count_all(&self) -> u32 {
        self.board.combined().popcnt()
    }

    pub fn pawn_count(&self) -> u32 {
        self.board.pieces(Piece::Pawn).popcnt()
    }

    /// Knights, bishops, rooks and queens of both sides.
    pub fn non_pawn_piece_count(&self) -> u32 {
        (*self.board.combined()
            ^ *self.board.pieces(Piece::Pawn)
            ^ *self.board.pieces(Piece::King))
        .popcnt()
    }

    pub fn non_pawn_material_c(&self, c: Color) -> Value {
        let b = &self.board;
        let us = *b.color_combined(c);
        Value(
            (us & *b.pieces(Piece::Knight)).popcnt() as i32 * KNIGHT_VALUE_MG.0
                + (us & *b.pieces(Piece::Bishop)).popcnt() as i32 * BISHOP_VALUE_MG.0
                + (us & *b.pieces(Piece::Rook)).popcnt() as i32 * ROOK_VALUE_MG.0
                + (us & *b.pieces(Piece::Queen)).popcnt() as i32 * QUEEN_VALUE_MG.0,
        )
    }

    pub fn non_pawn_material(&self) -> Value {
        self.non_pawn_material_c(Color::White) + self.non_pawn_material_c(Color::Black)
    }

    pub fn has_castling_right(&self) -> bool {
        self.board.castle_rights(Color::White) != chess::CastleRights::NoRights
            || self.board.castle_rights(Color::Black) != chess::CastleRights::NoRights
    }

    pub fn relative_rank(&self, c: Color, sq: Square) -> i32 {
        let r = sq.get_rank().to_index() as i32;
        if c == Color::White {
            r
        } else {
            7 - r
        }
    }

    pub fn advanced_pawn_push(&self, m: Move) -> bool {
        self.board.piece_on(m.from()) == Some(Piece::Pawn)
            && self.relative_rank(self.board.side_to_move(), m.to()) > 4
    }

    pub fn do_move(&mut self, m: Move) {
        let cm = m.to_chess();
        let captured = self.captured_by(m);
        let moved = self.board.piece_on(m.from());
        self.states.push(StateInfo {
            board: self.board.clone(),
            rule50: self.rule50,
            plies_from_null: self.plies_from_null,
            captured: self.captured,
        });
        self.keys.push(self.board.get_hash());
        self.board = self.board.make_move_new(cm);
        self.captured = captured;
        self.rule50 = if moved == Some(Piece::Pawn) || captured.is_some() {
            0
        } else {
            self.rule50 + 1
        };
        self.plies_from_null += 1;
        self.game_ply += 1;
        self.nodes += 1;
    }

    pub fn undo_move(&mut self, _m: Move) {
        let st = self.states.pop().expect("undo without do");
        self.keys.pop();
        self.board = st.board;
        self.rule50 = st.rule50;
        self.plies_from_null = st.plies_from_null;
        self.captured = st.captured;
        self.game_ply -= 1;
    }

    pub fn do_null_move(&mut self) {
        debug_assert!(!self.in_check());
        self.states.push(StateInfo {
            board: self.board.clone(),
            rule50: self.rule50,
            plies_from_null: self.plies_from_null,
            captured: self.captured,
        });
        self.keys.push(self.board.get_hash());
        if let Some(b) = self.board.null_move() {
            self.board = b;
        }
        self.captured = None;
        self.rule50 += 1;
        self.plies_from_null = 0;
        self.game_ply += 1;
        self.nodes += 1;
    }

    pub fn undo_null_move(&mut self) {
        let st = self.states.pop().expect("undo without do");
        self.keys.pop();
        self.board = st.board;
        self.rule50 = st.rule50;
        self.plies_from_null = st.plies_from_null;
        self.captured = st.captured;
        self.game_ply -= 1;
    }

    /// Draw by the fifty-move rule or by repetition. A single repetition
    /// strictly inside the search tree counts; positions repeated before
    /// the root must occur twice.
    pub fn is_draw(&self, ply: i32) -> bool {
        if self.rule50 > 99 && (!self.in_check() || self.has_legal_moves()) {
            return true;
        }
        let end = self.rule50.min(self.plies_from_null);
        if end < 4 {
            return false;
        }
        let key = self.board.get_hash();
        let len = self.keys.len();
        let mut cnt = 0;
        let mut i = 4;
        while i <= end as usize && i <= len {
            if self.keys[len - i] == key {
                cnt += 1;
                if cnt == 2 || ply > i as i32 {
                    return true;
                }
            }
            i += 2;
        }
        false
    }

    /// Conservative upcoming-repetition test: the node has already been
    /// reached within the reversible window, so a repeating line exists.
    pub fn has_game_cycle(&self, _ply: i32) -> bool {
        let end = self.rule50.min(self.plies_from_null);
        if end < 4 {
            return false;
        }
        let key = self.board.get_hash();
        let len = self.keys.len();
        let mut i = 4;
        while i <= end as usize && i <= len {
            if self.keys[len - i] == key {
                return true;
            }
            i += 2;
        }
        false
    }

    /// Pieces shielding `c`'s king from an enemy slider: removing one
    /// of them uncovers a check. Both colours' pieces qualify; callers
    /// intersect with the square they are vacating.
    pub fn blockers_for_king(&self, c: Color) -> BitBoard {
        let b = &self.board;
        let ksq = b.king_square(c);
        let occ = *b.combined();
        let snipers = ((get_bishop_moves(ksq, EMPTY)
            & (*b.pieces(Piece::Bishop) | *b.pieces(Piece::Queen)))
            | (get_rook_moves(ksq, EMPTY) & (*b.pieces(Piece::Rook) | *b.pieces(Piece::Queen))))
            & *b.color_combined(!c);
        let mut blockers = EMPTY;
        for sniper in snipers {
            let shield = chess::between(ksq, sniper) & occ;
            if shield.popcnt() == 1 {
                blockers = blockers | shield;
            }
        }
        blockers
    }

    /// Does `m` uncover a slider check by vacating its origin square?
    pub fn discovers_check(&self, m: Move) -> bool {
        self.blockers_for_king(!self.board.side_to_move()) & BitBoard::from_square(m.from())
            != EMPTY
    }

    fn attackers_to(&self, sq: Square, occ: BitBoard) -> BitBoard {
        let b = &self.board;
        let diag = *b.pieces(Piece::Bishop) | *b.pieces(Piece::Queen);
        let orth = *b.pieces(Piece::Rook) | *b.pieces(Piece::Queen);
        let white_pawns = *b.pieces(Piece::Pawn) & *b.color_combined(Color::White);
        let black_pawns = *b.pieces(Piece::Pawn) & *b.color_combined(Color::Black);
        (get_knight_moves(sq) & *b.pieces(Piece::Knight))
            | (get_king_moves(sq) & *b.pieces(Piece::King))
            | (get_bishop_moves(sq, occ) & diag)
            | (get_rook_moves(sq, occ) & orth)
            | get_pawn_attacks(sq, Color::Black, white_pawns)
            | get_pawn_attacks(sq, Color::White, black_pawns)
    }

    /// Static exchange evaluation: does the capture sequence starting
    /// with `m` net at least `threshold` for the side to move?
    /// Promotions always pass, as does castling.
    pub fn see_ge(&self, m: Move, threshold: Value) -> bool {
        if m.promotion().is_some() || self.is_castling(m) {
            return true;
        }
        let b = &self.board;
        let to = m.to();
        let from = m.from();

        let mut balance = piece_value(MG, self.captured_by(m)).0 - threshold.0;
        if balance < 0 {
            return false;
        }
        balance = piece_value(MG, b.piece_on(from)).0 - balance;
        if balance <= 0 {
            return true;
        }

        let mut occ = *b.combined();
        occ = occ ^ BitBoard::from_square(from);
        occ = occ | BitBoard::from_square(to);
        if self.is_en_passant(m) {
            if let Some(victim) = to.backward(b.side_to_move()) {
                occ = occ ^ BitBoard::from_square(victim);
            }
        }

        let diag = *b.pieces(Piece::Bishop) | *b.pieces(Piece::Queen);
        let orth = *b.pieces(Piece::Rook) | *b.pieces(Piece::Queen);
        let mut attackers = self.attackers_to(to, occ) & occ;
        let mut stm = b.side_to_move();
        let mut result = 1;

        loop {
            stm = !stm;
            attackers = attackers & occ;
            let our = attackers & *b.color_combined(stm);
            if our == EMPTY {
                break;
            }
            result ^= 1;

            // Cheapest attacker recaptures; sliders may uncover x-rays.
            let mut advanced = false;
            for pt in [
                Piece::Pawn,
                Piece::Knight,
                Piece::Bishop,
                Piece::Rook,
                Piece::Queen,
            ] {
                let set = our & *b.pieces(pt);
                if set == EMPTY {
                    continue;
                }
                balance = piece_value(MG, Some(pt)).0 - balance;
                if balance < result {
                    return result != 0;
                }
                occ = occ ^ BitBoard::from_square(set.to_square());
                match pt {
                    Piece::Pawn | Piece::Bishop => {
                        attackers = attackers | (get_bishop_moves(to, occ) & diag);
                    }
                    Piece::Rook => {
                        attackers = attackers | (get_rook_moves(to, occ) & orth);
                    }
                    Piece::Queen => {
                        attackers = attackers
                            | (get_bishop_moves(to, occ) & diag)
                            | (get_rook_moves(to, occ) & orth);
                    }
                    _ => {}
                }
                advanced = true;
                break;
            }
            if !advanced {
                // Only the king attacks; it may recapture only when the
                // square is no longer defended.
                return if (attackers & *b.color_combined(!stm)) == EMPTY {
                    result != 0
                } else {
                    result == 0
                };
            }
        }
        result != 0
    }

    /// Zero the heuristic tables, as `Search::clear` requires.
    pub fn clear_search_state(&mut self) {
        self.main_history.clear();
        self.capture_history.clear();
        self.counter_moves.clear();
        self.cont_history.clear();
        self.previous_score = -Value::INFINITE;
        self.previous_time_reduction = 1.0;
        self.completed_depth = Depth::ZERO;
    }

    pub fn print(&self) {
        for rank in (0..8).rev() {
            let mut line = String::new();
            for file in 0..8 {
                let sq = Square::make_square(
                    chess::Rank::from_index(rank),
                    chess::File::from_index(file),
                );
                let c = match (self.board.piece_on(sq), self.board.color_on(sq)) {
                    (Some(p), Some(color)) => {
                        let s = match p {
                            Piece::Pawn => 'p',
                            Piece::Knight => 'n',
                            Piece::Bishop => 'b',
                            Piece::Rook => 'r',
                            Piece::Queen => 'q',
                            Piece::King => 'k',
                        };
                        if color == Color::White {
                            s.to_ascii_uppercase()
                        } else {
                            s
                        }
                    }
                    _ => '.',
                };
                line.push(c);
                line.push(' ');
            }
            println!("{}", line);
        }
        println!("key: {:016x} rule50: {}", self.key().0, self.rule50);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchConfig;

    fn pos(fen: &str) -> Position {
        let mut p = Position::new(Arc::new(SearchConfig::default()));
        p.set(fen).unwrap();
        p
    }

    fn mv(p: &Position, s: &str) -> Move {
        p.legal_moves()
            .into_iter()
            .find(|m| m.to_string() == s)
            .unwrap_or_else(|| panic!("{} not legal", s))
    }

    #[test]
    fn do_undo_round_trips() {
        let mut p = pos(START_FEN);
        let key = p.key();
        let m = mv(&p, "e2e4");
        p.do_move(m);
        assert_ne!(p.key(), key);
        assert_eq!(p.rule50_count(), 0);
        p.undo_move(m);
        assert_eq!(p.key(), key);
        assert_eq!(p.game_ply(), 0);
    }

    #[test]
    fn rule50_counts_reversible_moves() {
        let mut p = pos(START_FEN);
        p.do_move(mv(&p, "g1f3"));
        assert_eq!(p.rule50_count(), 1);
        p.do_move(mv(&p, "g8f6"));
        assert_eq!(p.rule50_count(), 2);
        p.do_move(mv(&p, "f3g1"));
        p.do_move(mv(&p, "f6g8"));
        assert_eq!(p.rule50_count(), 4);
    }

    #[test]
    fn repetition_inside_search_is_draw() {
        let mut p = pos(START_FEN);
        for s in ["g1f3", "g8f6", "f3g1", "f6g8"] {
            let m = mv(&p, s);
            p.do_move(m);
        }
        // Start position repeated once, with the whole shuffle inside
        // the "search" (ply > distance).
        assert!(p.is_draw(5));
        assert!(!p.is_draw(2));
        assert!(p.has_game_cycle(5));
    }

    #[test]
    fn fifty_move_rule_draw() {
        let mut p = pos("7k/8/8/8/8/8/R7/K7 w - - 99 80");
        assert!(!p.is_draw(1));
        p.do_move(mv(&p, "a2b2"));
        assert_eq!(p.rule50_count(), 100);
        assert!(p.is_draw(1));
    }

    #[test]
    fn see_simple_exchanges() {
        // Pawn takes defended pawn: loses material at any positive bar.
        let p = pos("4k3/8/2p5/3p4/4P3/8/8/4K3 w - - 0 1");
        let m = mv(&p, "e4d5");
        assert!(p.see_ge(m, Value::ZERO));
        assert!(!p.see_ge(m, Value(300)));

        // Queen grabs a defended pawn: clearly losing.
        let p = pos("4k3/8/2p5/3p4/8/8/3Q4/4K3 w - - 0 1");
        let m = mv(&p, "d2d5");
        assert!(!p.see_ge(m, Value::ZERO));

        // Rook takes an undefended rook.
        let p = pos("4k3/8/8/3r4/8/8/3R4/4K3 w - - 0 1");
        let m = mv(&p, "d2d5");
        assert!(p.see_ge(m, Value(1000)));
    }

    #[test]
    fn gives_check_and_legal() {
        let p = pos("6k1/5ppp/8/8/8/8/5PPP/R5K1 w - - 0 1");
        let back_rank = mv(&p, "a1a8");
        assert!(p.gives_check(back_rank));
        assert!(p.legal(back_rank));
        assert!(!p.legal(Move::NONE));
    }

    #[test]
    fn discovered_check_detection() {
        // White knight on d4 shields the black king from the d1 rook.
        let p = pos("3k4/8/8/8/3N4/8/8/3RK3 w - - 0 1");
        assert_ne!(p.blockers_for_king(Color::Black), EMPTY);

        let discovered = mv(&p, "d4f5");
        assert!(p.discovers_check(discovered));
        assert!(p.gives_check(discovered));

        let quiet = mv(&p, "e1e2");
        assert!(!p.discovers_check(quiet));
    }

    #[test]
    fn stalemate_has_no_legal_moves() {
        let p = pos("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1");
        assert!(!p.in_check());
        assert!(!p.has_legal_moves());
    }

    #[test]
    fn null_move_round_trips() {
        let mut p = pos("4k3/8/8/8/8/8/4P3/4K3 w - - 3 10");
        let key = p.key();
        p.do_null_move();
        assert_eq!(p.side_to_move(), Color::Black);
        assert_eq!(p.rule50_count(), 4);
        p.undo_null_move();
        assert_eq!(p.key(), key);
        assert_eq!(p.rule50_count(), 3);
    }
}
