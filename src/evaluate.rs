use chess::{Color, Piece};

use crate::position::Position;
use crate::types::*;

/// Side-to-move bonus, symmetric by construction.
pub const TEMPO: Value = Value(28);

const MIDGAME_LIMIT: i32 = 15258;
const ENDGAME_LIMIT: i32 = 3915;
const PHASE_SCALE: i32 = 128;

// Piece-square tables from White's point of view, written rank 8 first
// so they read like a board. Material is added separately.

#[rustfmt::skip]
const PAWN_MG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     50,  50,  50,  50,  50,  50,  50,  50,
     10,  10,  20,  30,  30,  20,  10,  10,
      5,   5,  10,  25,  25,  10,   5,   5,
      0,   0,   0,  20,  20,   0,   0,   0,
      5,  -5, -10,   0,   0, -10,  -5,   5,
      5,  10,  10, -20, -20,  10,  10,   5,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const PAWN_EG: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
     80,  80,  80,  80,  80,  80,  80,  80,
     50,  50,  50,  50,  50,  50,  50,  50,
     30,  30,  30,  30,  30,  30,  30,  30,
     15,  15,  15,  15,  15,  15,  15,  15,
      5,   5,   5,   5,   5,   5,   5,   5,
      5,   5,   5,   5,   5,   5,   5,   5,
      0,   0,   0,   0,   0,   0,   0,   0,
];

#[rustfmt::skip]
const KNIGHT_PST: [i32; 64] = [
    -50, -40, -30, -30, -30, -30, -40, -50,
    -40, -20,   0,   0,   0,   0, -20, -40,
    -30,   0,  10,  15,  15,  10,   0, -30,
    -30,   5,  15,  20,  20,  15,   5, -30,
    -30,   0,  15,  20,  20,  15,   0, -30,
    -30,   5,  10,  15,  15,  10,   5, -30,
    -40, -20,   0,   5,   5,   0, -20, -40,
    -50, -40, -30, -30, -30, -30, -40, -50,
];

#[rustfmt::skip]
const BISHOP_PST: [i32; 64] = [
    -20, -10, -10, -10, -10, -10, -10, -20,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -10,   0,   5,  10,  10,   5,   0, -10,
    -10,   5,   5,  10,  10,   5,   5, -10,
    -10,   0,  10,  10,  10,  10,   0, -10,
    -10,  10,  10,  10,  10,  10,  10, -10,
    -10,   5,   0,   0,   0,   0,   5, -10,
    -20, -10, -10, -10, -10, -10, -10, -20,
];

#[rustfmt::skip]
const ROOK_PST: [i32; 64] = [
      0,   0,   0,   0,   0,   0,   0,   0,
      5,  10,  10,  10,  10,  10,  10,   5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
     -5,   0,   0,   0,   0,   0,   0,  -5,
      0,   0,   0,   5,   5,   0,   0,   0,
];

#[rustfmt::skip]
const QUEEN_PST: [i32; 64] = [
    -20, -10, -10,  -5,  -5, -10, -10, -20,
    -10,   0,   0,   0,   0,   0,   0, -10,
    -10,   0,   5,   5,   5,   5,   0, -10,
     -5,   0,   5,   5,   5,   5,   0,  -5,
      0,   0,   5,   5,   5,   5,   0,  -5,
    -10,   5,   5,   5,   5,   5,   0, -10,
    -10,   0,   5,   0,   0,   0,   0, -10,
    -20, -10, -10,  -5,  -5, -10, -10, -20,
];

#[rustfmt::skip]
const KING_MG: [i32; 64] = [
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -30, -40, -40, -50, -50, -40, -40, -30,
    -20, -30, -30, -40, -40, -30, -30, -20,
    -10, -20, -20, -20, -20, -20, -20, -10,
     20,  20,   0,   0,   0,   0,  20,  20,
     20,  30,  10,   0,   0,  10,  30,  20,
];

#[rustfmt::skip]
const KING_EG: [i32; 64] = [
    -50, -40, -30, -20, -20, -30, -40, -50,
    -30, -20, -10,   0,   0, -10, -20, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  30,  40,  40,  30, -10, -30,
    -30, -10,  20,  30,  30,  20, -10, -30,
    -30, -30,   0,   0,   0,   0, -30, -30,
    -50, -30, -30, -30, -30, -30, -30, -50,
];

fn piece_score(piece: Piece, table_idx: usize) -> Score {
    match piece {
        Piece::Pawn => Score::make(
            PAWN_VALUE_MG.0 + PAWN_MG[table_idx],
            PAWN_VALUE_EG.0 + PAWN_EG[table_idx],
        ),
        Piece::Knight => Score::make(
            KNIGHT_VALUE_MG.0 + KNIGHT_PST[table_idx],
            KNIGHT_VALUE_EG.0 + KNIGHT_PST[table_idx],
        ),
        Piece::Bishop => Score::make(
            BISHOP_VALUE_MG.0 + BISHOP_PST[table_idx],
            BISHOP_VALUE_EG.0 + BISHOP_PST[table_idx],
        ),
        Piece::Rook => Score::make(
            ROOK_VALUE_MG.0 + ROOK_PST[table_idx],
            ROOK_VALUE_EG.0 + ROOK_PST[table_idx],
        ),
        Piece::Queen => Score::make(
            QUEEN_VALUE_MG.0 + QUEEN_PST[table_idx],
            QUEEN_VALUE_EG.0 + QUEEN_PST[table_idx],
        ),
        Piece::King => Score::make(KING_MG[table_idx], KING_EG[table_idx]),
    }
}

/// Static evaluation from the point of view of the side to move.
pub fn evaluate(pos: &Position) -> Value {
    let b = pos.board();
    let mut score = Score::ZERO;

    for sq in *b.combined() {
        if let (Some(piece), Some(color)) = (b.piece_on(sq), b.color_on(sq)) {
            let idx = sq.to_index();
            // Tables are written rank 8 first; flip ranks for White.
            let table_idx = if color == Color::White { idx ^ 56 } else { idx };
            let s = piece_score(piece, table_idx);
            score = if color == Color::White {
                score + s
            } else {
                score - s
            };
        }
    }

    // Contempt is stored from White's point of view by the driver.
    score = score + pos.contempt;

    let npm = pos
        .non_pawn_material()
        .0
        .clamp(ENDGAME_LIMIT, MIDGAME_LIMIT);
    let phase = (npm - ENDGAME_LIMIT) * PHASE_SCALE / (MIDGAME_LIMIT - ENDGAME_LIMIT);
    let blended = (score.mg * phase + score.eg * (PHASE_SCALE - phase)) / PHASE_SCALE;

    let v = if pos.side_to_move() == Color::White {
        Value(blended)
    } else {
        Value(-blended)
    };
    v + TEMPO
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchConfig;
    use std::sync::Arc;

    fn eval_of(fen: &str) -> Value {
        let mut p = Position::new(Arc::new(SearchConfig::default()));
        p.set(fen).unwrap();
        evaluate(&p)
    }

    #[test]
    fn startpos_is_balanced() {
        let v = eval_of(crate::position::START_FEN);
        assert_eq!(v, TEMPO);
    }

    #[test]
    fn evaluation_is_symmetric() {
        // Mirrored positions evaluate identically for the side to move.
        let w = eval_of("4k3/8/8/8/8/8/4P3/4K3 w - - 0 1");
        let b = eval_of("4k3/4p3/8/8/8/8/8/4K3 b - - 0 1");
        assert_eq!(w, b);
    }

    #[test]
    fn material_advantage_shows() {
        let v = eval_of("4k3/8/8/8/8/8/8/Q3K3 w - - 0 1");
        assert!(v > Value(2000));
        let v = eval_of("4k3/8/8/8/8/8/8/Q3K3 b - - 0 1");
        assert!(v < Value(-2000));
    }
}
