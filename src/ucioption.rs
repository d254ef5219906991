use std::collections::BTreeMap;
use std::sync::Mutex;

use once_cell::sync::Lazy;

use crate::{threads, tt};

#[derive(Clone)]
enum OptionKind {
    Check(bool),
    Spin(i32, i32, i32),
    Combo(String, Vec<String>),
    Text(String),
    Button,
}

#[derive(Clone)]
struct UciOption {
    name: String,
    kind: OptionKind,
}

static OPTIONS: Lazy<Mutex<BTreeMap<String, UciOption>>> = Lazy::new(|| Mutex::new(BTreeMap::new()));

fn insert(map: &mut BTreeMap<String, UciOption>, name: &str, kind: OptionKind) {
    map.insert(
        name.to_lowercase(),
        UciOption {
            name: name.to_string(),
            kind,
        },
    );
}

pub fn init() {
    let mut map = OPTIONS.lock().unwrap();
    if !map.is_empty() {
        return;
    }
    insert(&mut map, "Threads", OptionKind::Spin(1, 1, 512));
    insert(&mut map, "Hash", OptionKind::Spin(tt::DEFAULT_MB as i32, 1, 131072));
    insert(&mut map, "Clear Hash", OptionKind::Button);
    insert(&mut map, "Ponder", OptionKind::Check(false));
    insert(&mut map, "MultiPV", OptionKind::Spin(1, 1, 500));
    insert(&mut map, "Contempt", OptionKind::Spin(21, -100, 100));
    insert(
        &mut map,
        "Analysis Contempt",
        OptionKind::Combo(
            "Both".to_string(),
            vec![
                "Off".to_string(),
                "White".to_string(),
                "Black".to_string(),
                "Both".to_string(),
            ],
        ),
    );
    insert(&mut map, "Move Overhead", OptionKind::Spin(30, 0, 5000));
    insert(&mut map, "Minimum Thinking Time", OptionKind::Spin(20, 0, 5000));
    insert(&mut map, "Slow Mover", OptionKind::Spin(84, 10, 1000));
    insert(&mut map, "UCI_AnalyseMode", OptionKind::Check(false));
    insert(&mut map, "UCI_LimitStrength", OptionKind::Check(false));
    insert(&mut map, "UCI_Elo", OptionKind::Spin(2850, 1350, 2850));
    insert(&mut map, "SyzygyPath", OptionKind::Text(String::new()));
    insert(&mut map, "SyzygyProbeDepth", OptionKind::Spin(1, 1, 100));
    insert(&mut map, "Syzygy50MoveRule", OptionKind::Check(true));
    insert(&mut map, "SyzygyProbeLimit", OptionKind::Spin(7, 0, 7));
    insert(&mut map, "Less Pruning Mode", OptionKind::Spin(0, 0, 9));
    insert(&mut map, "Variety", OptionKind::Spin(0, 0, 40));
    insert(&mut map, "Tal", OptionKind::Check(false));
    insert(&mut map, "Capablanca", OptionKind::Check(false));
    insert(&mut map, "Petrosian", OptionKind::Check(false));
    insert(&mut map, "NN Perceptron Search", OptionKind::Check(false));
    insert(&mut map, "NN Persisted Self-Learning", OptionKind::Check(false));
}

pub fn get_i32(name: &str) -> i32 {
    let map = OPTIONS.lock().unwrap();
    match map.get(&name.to_lowercase()).map(|o| o.kind.clone()) {
        Some(OptionKind::Spin(v, _, _)) => v,
        Some(OptionKind::Check(b)) => b as i32,
        _ => 0,
    }
}

pub fn get_bool(name: &str) -> bool {
    get_i32(name) != 0
}

pub fn get_string(name: &str) -> String {
    let map = OPTIONS.lock().unwrap();
    match map.get(&name.to_lowercase()).map(|o| o.kind.clone()) {
        Some(OptionKind::Combo(v, _)) | Some(OptionKind::Text(v)) => v,
        _ => String::new(),
    }
}

/// Apply a `setoption` command. Unknown names are reported and ignored;
/// spin values are clamped into range.
pub fn set(name: &str, value: &str) {
    let key = name.to_lowercase();
    {
        let mut map = OPTIONS.lock().unwrap();
        let opt = match map.get_mut(&key) {
            Some(o) => o,
            None => {
                println!("No such option: {}", name);
                return;
            }
        };
        match &mut opt.kind {
            OptionKind::Check(b) => *b = value.eq_ignore_ascii_case("true"),
            OptionKind::Spin(v, min, max) => {
                if let Ok(parsed) = value.parse::<i32>() {
                    *v = parsed.clamp(*min, *max);
                }
            }
            OptionKind::Combo(v, choices) => {
                if let Some(c) = choices.iter().find(|c| c.eq_ignore_ascii_case(value)) {
                    *v = c.clone();
                }
            }
            OptionKind::Text(v) => *v = value.to_string(),
            OptionKind::Button => {}
        }
    }

    // Side effects once the registry lock is released.
    match key.as_str() {
        "hash" => tt::resize(get_i32("Hash") as usize),
        "clear hash" => tt::clear(),
        "threads" => threads::set_thread_count(get_i32("Threads") as usize),
        "syzygypath" => crate::tb::init(&get_string("SyzygyPath")),
        _ => {}
    }
}

/// Print every option in UCI format, in registration-independent
/// (alphabetical) order.
pub fn print() {
    let map = OPTIONS.lock().unwrap();
    for opt in map.values() {
        match &opt.kind {
            OptionKind::Check(b) => {
                println!("option name {} type check default {}", opt.name, b)
            }
            OptionKind::Spin(v, min, max) => println!(
                "option name {} type spin default {} min {} max {}",
                opt.name, v, min, max
            ),
            OptionKind::Combo(v, choices) => {
                print!("option name {} type combo default {}", opt.name, v);
                for c in choices {
                    print!(" var {}", c);
                }
                println!();
            }
            OptionKind::Text(v) => {
                println!("option name {} type string default {}", opt.name, v)
            }
            OptionKind::Button => println!("option name {} type button", opt.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spin_values_clamp() {
        init();
        set("MultiPV", "700");
        assert_eq!(get_i32("MultiPV"), 500);
        set("MultiPV", "0");
        assert_eq!(get_i32("MultiPV"), 1);
        set("MultiPV", "3");
        assert_eq!(get_i32("MultiPV"), 3);
        set("MultiPV", "1");
    }

    #[test]
    fn names_are_case_insensitive() {
        init();
        set("uci_elo", "1500");
        assert_eq!(get_i32("UCI_Elo"), 1500);
        set("UCI_Elo", "2850");
    }

    #[test]
    fn combo_rejects_unknown_choice() {
        init();
        set("Analysis Contempt", "Sideways");
        assert_eq!(get_string("Analysis Contempt"), "Both");
        set("Analysis Contempt", "white");
        assert_eq!(get_string("Analysis Contempt"), "White");
        set("Analysis Contempt", "Both");
    }
}
