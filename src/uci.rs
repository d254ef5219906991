use std::sync::Arc;

use crate::misc;
use crate::position::{Position, START_FEN};
use crate::search::{self, LimitsType, SearchConfig};
use crate::types::*;
use crate::{threads, ucioption};

fn position(pos: &mut Position, args: &str) {
    let moves_idx = match args.find("moves") {
        Some(idx) => idx,
        None => args.len(),
    };
    let fen = if args.starts_with("startpos") {
        START_FEN
    } else if args.starts_with("fen") {
        args[3..moves_idx].trim()
    } else {
        return;
    };
    if pos.set(fen).is_err() {
        return;
    }

    let mut played = Vec::new();
    if moves_idx < args.len() {
        for token in args[moves_idx + 5..].split_whitespace() {
            let m = to_move(pos, token);
            if m == Move::NONE {
                break;
            }
            pos.do_move(m);
            played.push(m);
        }
    }
    threads::set_position(fen.to_string(), played);
}

fn setoption(args: &str) {
    let idx = match args.find("name") {
        Some(idx) => idx,
        None => return,
    };
    let args = &args[idx + 4..];
    if let Some(idx) = args.find("value") {
        ucioption::set(args[..idx].trim(), args[idx + 5..].trim());
    } else {
        ucioption::set(args.trim(), "");
    }
}

fn go(pos: &mut Position, args: &str) {
    let mut limits = LimitsType::new();
    let mut searchmoves: Vec<Move> = Vec::new();
    let mut ponder_mode = false;

    let mut iter = args.split_whitespace();
    while let Some(token) = iter.next() {
        match token {
            "searchmoves" => {
                for token in iter.by_ref() {
                    let m = to_move(pos, token);
                    if m != Move::NONE {
                        searchmoves.push(m);
                    }
                }
            }
            "wtime" => limits.time[0] = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "btime" => limits.time[1] = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "winc" => limits.inc[0] = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "binc" => limits.inc[1] = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "movestogo" => {
                limits.movestogo = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0)
            }
            "depth" => limits.depth = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "nodes" => limits.nodes = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "movetime" => limits.movetime = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "mate" => limits.mate = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "perft" => limits.perft = iter.next().and_then(|s| s.parse().ok()).unwrap_or(0),
            "infinite" => limits.infinite = true,
            "ponder" => ponder_mode = true,
            _ => {}
        }
    }

    threads::start_thinking(SearchConfig::from_options(limits, searchmoves, ponder_mode));
}

pub fn cmd_loop() {
    let mut pos = Box::new(Position::new(Arc::new(SearchConfig::default())));
    pos.set(START_FEN).ok();

    loop {
        let mut cmd = String::new();
        if std::io::stdin().read_line(&mut cmd).is_err() {
            cmd = String::from("quit");
        }
        let cmd_slice = cmd.trim();
        let (token, args) = match cmd_slice.find(char::is_whitespace) {
            Some(idx) => cmd_slice.split_at(idx),
            None => (cmd_slice, ""),
        };
        let args = args.trim();

        match token {
            "quit" | "stop" => threads::set_stop(true),
            "ponderhit" => {
                if threads::stop_on_ponderhit() {
                    threads::set_stop(true);
                } else {
                    threads::set_ponder(false);
                }
            }
            "uci" => {
                println!("id name {}", misc::engine_info(true));
                ucioption::print();
                println!("uciok");
            }
            "setoption" => setoption(args),
            "go" => go(&mut pos, args),
            "position" => position(&mut pos, args),
            "ucinewgame" => search::clear(),
            "isready" => println!("readyok"),
            "d" => pos.print(),
            "" => {}
            _ => println!("Unknown command: {} {}", token, args),
        }

        if token == "quit" {
            break;
        }
    }
}

/// Format a score for the GUI: centipawns on the pawn-endgame scale, or
/// a signed distance to mate.
pub fn value(v: Value) -> String {
    let w = v.abs();
    if w < Value::MATE - MAX_PLY {
        format!("cp {}", v.0 * 100 / PAWN_VALUE_EG.0)
    } else {
        let dtm = if v > Value::ZERO {
            (Value::MATE - v).0 + 1
        } else {
            (-Value::MATE - v).0
        };
        format!("mate {}", dtm / 2)
    }
}

/// Parse a coordinate-notation move against the current legal moves.
pub fn to_move(pos: &Position, s: &str) -> Move {
    pos.legal_moves()
        .into_iter()
        .find(|m| m.to_string() == s)
        .unwrap_or(Move::NONE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_formats_cp_and_mate() {
        assert_eq!(value(Value::ZERO), "cp 0");
        assert_eq!(value(Value(208)), "cp 100");
        assert_eq!(value(mate_in(1)), "mate 1");
        assert_eq!(value(mate_in(3)), "mate 2");
        assert_eq!(value(mated_in(2)), "mate -1");
    }

    #[test]
    fn to_move_parses_legal_only() {
        let mut p = Position::new(Arc::new(SearchConfig::default()));
        p.set(START_FEN).unwrap();
        assert_ne!(to_move(&p, "e2e4"), Move::NONE);
        assert_eq!(to_move(&p, "e2e5"), Move::NONE);
        assert_eq!(to_move(&p, "garbage"), Move::NONE);
    }
}
