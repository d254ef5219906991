use std::fmt;
use std::ops::{Add, AddAssign, BitAnd, BitXor, Div, Mul, Neg, Sub, SubAssign};

use chess::{ChessMove, Piece, Square, ALL_SQUARES};

pub const MAX_PLY: i32 = 128;
pub const MAX_MATE_PLY: i32 = MAX_PLY;

/// Signed search score in centipawn-like internal units.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Value(pub i32);

impl Value {
    pub const ZERO: Value = Value(0);
    pub const DRAW: Value = Value(0);
    pub const KNOWN_WIN: Value = Value(10000);
    pub const MATE: Value = Value(32000);
    pub const INFINITE: Value = Value(32001);
    pub const NONE: Value = Value(32002);
    pub const MATE_IN_MAX_PLY: Value = Value(Value::MATE.0 - MAX_MATE_PLY);
    pub const MATED_IN_MAX_PLY: Value = Value(-Value::MATE.0 + MAX_MATE_PLY);

    pub fn abs(self) -> Value {
        Value(self.0.abs())
    }
}

pub fn mate_in(ply: i32) -> Value {
    Value(Value::MATE.0 - ply)
}

pub fn mated_in(ply: i32) -> Value {
    Value(-Value::MATE.0 + ply)
}

impl Add for Value {
    type Output = Value;
    fn add(self, rhs: Value) -> Value {
        Value(self.0 + rhs.0)
    }
}

impl Add<i32> for Value {
    type Output = Value;
    fn add(self, rhs: i32) -> Value {
        Value(self.0 + rhs)
    }
}

impl Sub for Value {
    type Output = Value;
    fn sub(self, rhs: Value) -> Value {
        Value(self.0 - rhs.0)
    }
}

impl Sub<i32> for Value {
    type Output = Value;
    fn sub(self, rhs: i32) -> Value {
        Value(self.0 - rhs)
    }
}

impl Neg for Value {
    type Output = Value;
    fn neg(self) -> Value {
        Value(-self.0)
    }
}

impl Mul<i32> for Value {
    type Output = Value;
    fn mul(self, rhs: i32) -> Value {
        Value(self.0 * rhs)
    }
}

impl Div<i32> for Value {
    type Output = Value;
    fn div(self, rhs: i32) -> Value {
        Value(self.0 / rhs)
    }
}

impl AddAssign for Value {
    fn add_assign(&mut self, rhs: Value) {
        self.0 += rhs.0;
    }
}

impl SubAssign for Value {
    fn sub_assign(&mut self, rhs: Value) {
        self.0 -= rhs.0;
    }
}

/// Search depth in plies, kept as its own unit.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Depth(pub i32);

pub const ONE_PLY: Depth = Depth(1);

impl Depth {
    pub const ZERO: Depth = Depth(0);
    pub const QS_CHECKS: Depth = Depth(0);
    pub const QS_NO_CHECKS: Depth = Depth(-1);
    pub const NONE: Depth = Depth(-6);
    pub const MAX: Depth = Depth(MAX_PLY);
}

impl Add for Depth {
    type Output = Depth;
    fn add(self, rhs: Depth) -> Depth {
        Depth(self.0 + rhs.0)
    }
}

impl AddAssign for Depth {
    fn add_assign(&mut self, rhs: Depth) {
        self.0 += rhs.0;
    }
}

impl Sub for Depth {
    type Output = Depth;
    fn sub(self, rhs: Depth) -> Depth {
        Depth(self.0 - rhs.0)
    }
}

impl Neg for Depth {
    type Output = Depth;
    fn neg(self) -> Depth {
        Depth(-self.0)
    }
}

impl Mul<Depth> for i32 {
    type Output = Depth;
    fn mul(self, rhs: Depth) -> Depth {
        Depth(self * rhs.0)
    }
}

impl Div<Depth> for Depth {
    type Output = i32;
    fn div(self, rhs: Depth) -> i32 {
        self.0 / rhs.0
    }
}

/// 64-bit Zobrist position key.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Key(pub u64);

impl BitXor for Key {
    type Output = Key;
    fn bitxor(self, rhs: Key) -> Key {
        Key(self.0 ^ rhs.0)
    }
}

/// Bound kind of a stored score. Bits so that EXACT tests both ways.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Bound(pub u8);

impl Bound {
    pub const NONE: Bound = Bound(0);
    pub const UPPER: Bound = Bound(1);
    pub const LOWER: Bound = Bound(2);
    pub const EXACT: Bound = Bound(3);
}

impl BitAnd for Bound {
    type Output = u8;
    fn bitand(self, rhs: Bound) -> u8 {
        self.0 & rhs.0
    }
}

/// A move packed into 16 bits: destination in bits 0-5, origin in bits
/// 6-11, promotion piece (knight..queen) in bits 12-13 with bit 14 as the
/// promotion flag. `NONE` (a1a1) and `NULL` (b1b1) are never real moves.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Move(pub u16);

impl Move {
    pub const NONE: Move = Move(0);
    pub const NULL: Move = Move(65);

    pub fn make(from: Square, to: Square) -> Move {
        Move(((from.to_index() as u16) << 6) | to.to_index() as u16)
    }

    pub fn make_prom(from: Square, to: Square, prom: Piece) -> Move {
        let code = prom.to_index() as u16 - Piece::Knight.to_index() as u16;
        Move(0x4000 | (code << 12) | ((from.to_index() as u16) << 6) | to.to_index() as u16)
    }

    pub fn from_chess(m: ChessMove) -> Move {
        match m.get_promotion() {
            Some(p) => Move::make_prom(m.get_source(), m.get_dest(), p),
            None => Move::make(m.get_source(), m.get_dest()),
        }
    }

    pub fn to_chess(self) -> ChessMove {
        ChessMove::new(self.from(), self.to(), self.promotion())
    }

    pub fn from(self) -> Square {
        ALL_SQUARES[((self.0 >> 6) & 0x3f) as usize]
    }

    pub fn to(self) -> Square {
        ALL_SQUARES[(self.0 & 0x3f) as usize]
    }

    pub fn promotion(self) -> Option<Piece> {
        if self.0 & 0x4000 != 0 {
            Some(match (self.0 >> 12) & 3 {
                0 => Piece::Knight,
                1 => Piece::Bishop,
                2 => Piece::Rook,
                _ => Piece::Queen,
            })
        } else {
            None
        }
    }

    /// From-to index for butterfly tables, promotion bits stripped.
    pub fn from_to(self) -> usize {
        (self.0 & 0xfff) as usize
    }

    /// A move is "ok" when it is neither `NONE` nor `NULL`.
    pub fn is_ok(self) -> bool {
        self.from() != self.to()
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Move::NONE {
            return write!(f, "(none)");
        }
        if *self == Move::NULL {
            return write!(f, "0000");
        }
        write!(f, "{}{}", self.from(), self.to())?;
        if let Some(p) = self.promotion() {
            let c = match p {
                Piece::Bishop => 'b',
                Piece::Rook => 'r',
                Piece::Queen => 'q',
                _ => 'n',
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

/// Middlegame/endgame score pair, blended by game phase at the eval edge.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Score {
    pub mg: i32,
    pub eg: i32,
}

impl Score {
    pub const ZERO: Score = Score { mg: 0, eg: 0 };

    pub fn make(mg: i32, eg: i32) -> Score {
        Score { mg, eg }
    }
}

impl Add for Score {
    type Output = Score;
    fn add(self, rhs: Score) -> Score {
        Score::make(self.mg + rhs.mg, self.eg + rhs.eg)
    }
}

impl Sub for Score {
    type Output = Score;
    fn sub(self, rhs: Score) -> Score {
        Score::make(self.mg - rhs.mg, self.eg - rhs.eg)
    }
}

impl Neg for Score {
    type Output = Score;
    fn neg(self) -> Score {
        Score::make(-self.mg, -self.eg)
    }
}

pub const MG: usize = 0;
pub const EG: usize = 1;

pub const PAWN_VALUE_MG: Value = Value(136);
pub const PAWN_VALUE_EG: Value = Value(208);
pub const KNIGHT_VALUE_MG: Value = Value(782);
pub const KNIGHT_VALUE_EG: Value = Value(865);
pub const BISHOP_VALUE_MG: Value = Value(830);
pub const BISHOP_VALUE_EG: Value = Value(918);
pub const ROOK_VALUE_MG: Value = Value(1289);
pub const ROOK_VALUE_EG: Value = Value(1378);
pub const QUEEN_VALUE_MG: Value = Value(2529);
pub const QUEEN_VALUE_EG: Value = Value(2687);

const PIECE_VALUES: [[Value; 6]; 2] = [
    [
        PAWN_VALUE_MG,
        KNIGHT_VALUE_MG,
        BISHOP_VALUE_MG,
        ROOK_VALUE_MG,
        QUEEN_VALUE_MG,
        Value::ZERO,
    ],
    [
        PAWN_VALUE_EG,
        KNIGHT_VALUE_EG,
        BISHOP_VALUE_EG,
        ROOK_VALUE_EG,
        QUEEN_VALUE_EG,
        Value::ZERO,
    ],
];

pub fn piece_value(phase: usize, piece: Option<Piece>) -> Value {
    match piece {
        Some(p) => PIECE_VALUES[phase][p.to_index()],
        None => Value::ZERO,
    }
}

/// Dense piece index for history tables: colour * 6 + piece, 12 = empty.
pub const NO_PIECE: usize = 12;
pub const PIECE_NB: usize = 13;

pub fn piece_index(color: chess::Color, piece: Piece) -> usize {
    color.to_index() * 6 + piece.to_index()
}

/// Compile-time booleans for monomorphised search flags.
pub trait Bool {
    const BOOL: bool;
}

pub struct True;
pub struct False;

impl Bool for True {
    const BOOL: bool = true;
}

impl Bool for False {
    const BOOL: bool = false;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess::Square;
    use std::str::FromStr;

    #[test]
    fn move_encoding_round_trips() {
        let from = Square::from_str("e2").unwrap();
        let to = Square::from_str("e4").unwrap();
        let m = Move::make(from, to);
        assert_eq!(m.from(), from);
        assert_eq!(m.to(), to);
        assert_eq!(m.promotion(), None);
        assert!(m.is_ok());
        assert_eq!(m.to_string(), "e2e4");

        let pf = Square::from_str("a7").unwrap();
        let pt = Square::from_str("a8").unwrap();
        let p = Move::make_prom(pf, pt, Piece::Queen);
        assert_eq!(p.promotion(), Some(Piece::Queen));
        assert_eq!(p.to_string(), "a7a8q");
        assert_eq!(p.from_to(), Move::make(pf, pt).from_to());
    }

    #[test]
    fn chess_move_conversion_round_trips() {
        let cm = ChessMove::new(
            Square::from_str("b7").unwrap(),
            Square::from_str("c8").unwrap(),
            Some(Piece::Knight),
        );
        assert_eq!(Move::from_chess(cm).to_chess(), cm);
    }

    #[test]
    fn sentinels_are_not_ok() {
        assert!(!Move::NONE.is_ok());
        assert!(!Move::NULL.is_ok());
        assert_eq!(Move::NONE.to_string(), "(none)");
        assert_eq!(Move::NULL.to_string(), "0000");
    }

    #[test]
    fn mate_helpers() {
        assert_eq!(mate_in(1), Value(31999));
        assert_eq!(mated_in(1), Value(-31999));
        assert!(mate_in(1) > Value::MATE_IN_MAX_PLY);
        assert!(mated_in(1) < Value::MATED_IN_MAX_PLY);
    }

    #[test]
    fn bound_masks() {
        assert_eq!(Bound::EXACT & Bound::LOWER, Bound::LOWER.0);
        assert_eq!(Bound::UPPER & Bound::LOWER, 0);
    }
}
