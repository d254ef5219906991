use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, Write};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Mutex;

use anyhow::{Context, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use memmap::Mmap;
use once_cell::sync::Lazy;
use tracing::{debug, warn};

use crate::types::*;

/// On-disk record: depth, position key, move, score. Little endian,
/// 16 bytes each, streamed back to back.
pub const ENTRY_SIZE: usize = 16;

pub const GLOBAL_FILE: &str = "experience.bin";
pub const PAWN_FILE: &str = "pawngame.bin";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExpRecord {
    pub depth: i32,
    pub key: u64,
    pub mv: Move,
    pub score: i16,
}

impl ExpRecord {
    fn decode(buf: &[u8]) -> Result<ExpRecord> {
        let mut cur = Cursor::new(buf);
        Ok(ExpRecord {
            depth: cur.read_i32::<LittleEndian>()?,
            key: cur.read_u64::<LittleEndian>()?,
            mv: Move(cur.read_u16::<LittleEndian>()?),
            score: cur.read_i16::<LittleEndian>()?,
        })
    }

    fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = Vec::with_capacity(ENTRY_SIZE);
        buf.write_i32::<LittleEndian>(self.depth).unwrap();
        buf.write_u64::<LittleEndian>(self.key).unwrap();
        buf.write_u16::<LittleEndian>(self.mv.0).unwrap();
        buf.write_i16::<LittleEndian>(self.score).unwrap();
        let mut out = [0u8; ENTRY_SIZE];
        out.copy_from_slice(&buf);
        out
    }
}

#[derive(Clone, Copy)]
struct Child {
    mv: Move,
    score: Value,
    depth: Depth,
}

struct Node {
    children: Vec<Child>,
    total_visits: u32,
}

/// What the search sees on a probe: the deepest stored child plus the
/// node's shape, which drives the singular-child pruning marker.
#[derive(Clone, Copy)]
pub struct ExpProbe {
    pub mv: Move,
    pub score: Value,
    pub depth: Depth,
    pub sons: usize,
    pub visits: u32,
}

struct Store {
    map: HashMap<u64, Node>,
    loaded: bool,
    pawn_loaded: bool,
    enabled: bool,
}

static STORE: Lazy<Mutex<Store>> = Lazy::new(|| {
    Mutex::new(Store {
        map: HashMap::new(),
        loaded: false,
        pawn_loaded: false,
        enabled: true,
    })
});

static EXP_HITS: AtomicBool = AtomicBool::new(false);
static USE_EXP: AtomicBool = AtomicBool::new(true);
static MOVES_PLAYED: AtomicI32 = AtomicI32::new(0);

/// Session flag mirroring whether probing is currently worthwhile; the
/// driver turns it off after a search that never hit the store.
pub fn use_exp() -> bool {
    USE_EXP.load(Ordering::Relaxed)
}

pub fn set_use_exp(b: bool) {
    USE_EXP.store(b, Ordering::Relaxed);
}

pub fn enabled() -> bool {
    STORE.lock().unwrap().enabled
}

fn disable() {
    STORE.lock().unwrap().enabled = false;
}

pub fn note_hit() {
    EXP_HITS.store(true, Ordering::Relaxed);
}

pub fn had_hits() -> bool {
    EXP_HITS.load(Ordering::Relaxed)
}

pub fn reset_hits() {
    EXP_HITS.store(false, Ordering::Relaxed);
}

pub fn moves_played() -> i32 {
    MOVES_PLAYED.load(Ordering::Relaxed)
}

pub fn bump_moves_played() {
    MOVES_PLAYED.fetch_add(1, Ordering::Relaxed);
}

fn fold(map: &mut HashMap<u64, Node>, rec: ExpRecord) {
    let node = map.entry(rec.key).or_insert_with(|| Node {
        children: Vec::new(),
        total_visits: 0,
    });
    node.total_visits += 1;
    match node.children.iter_mut().find(|c| c.mv == rec.mv) {
        Some(c) => {
            if rec.depth > c.depth.0 {
                c.depth = Depth(rec.depth);
                c.score = Value(rec.score as i32);
            }
        }
        None => node.children.push(Child {
            mv: rec.mv,
            score: Value(rec.score as i32),
            depth: Depth(rec.depth),
        }),
    }
    node.children.sort_by_key(|c| c.depth.0);
}

fn load_file(path: &Path) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
    let map = unsafe { Mmap::map(&file) }.with_context(|| format!("map {}", path.display()))?;
    let mut store = STORE.lock().unwrap();
    let mut count = 0;
    for chunk in map.chunks_exact(ENTRY_SIZE) {
        let rec = ExpRecord::decode(chunk)?;
        if rec.mv.is_ok() {
            fold(&mut store.map, rec);
            count += 1;
        }
    }
    Ok(count)
}

fn load_optional(path: &str) {
    if !Path::new(path).exists() {
        return;
    }
    match load_file(Path::new(path)) {
        Ok(n) => debug!(file = path, records = n, "experience loaded"),
        Err(e) => {
            warn!(file = path, error = %e, "experience disabled for this session");
            disable();
        }
    }
}

/// Load the global and per-opening files once per process. The opening
/// file is keyed by the game's starting position.
pub fn ensure_loaded(root_key: Key) {
    {
        let store = STORE.lock().unwrap();
        if store.loaded || !store.enabled {
            return;
        }
    }
    load_optional(GLOBAL_FILE);
    load_optional(&format!("{}.bin", root_key.0));
    STORE.lock().unwrap().loaded = true;
}

/// Load the pawn-ending file the first time such an ending is reached.
pub fn ensure_pawn_loaded() {
    {
        let store = STORE.lock().unwrap();
        if store.pawn_loaded || !store.enabled {
            return;
        }
    }
    load_optional(PAWN_FILE);
    STORE.lock().unwrap().pawn_loaded = true;
}

pub fn probe(key: Key) -> Option<ExpProbe> {
    let store = STORE.lock().unwrap();
    if !store.enabled {
        return None;
    }
    let node = store.map.get(&key.0)?;
    let deepest = node.children.last()?;
    Some(ExpProbe {
        mv: deepest.mv,
        score: deepest.score,
        depth: deepest.depth,
        sons: node.children.len(),
        visits: node.total_visits,
    })
}

fn append_file(path: &str, rec: &ExpRecord) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {} for append", path))?;
    file.write_all(&rec.encode())
        .with_context(|| format!("append to {}", path))?;
    Ok(())
}

/// Persist the played root move. Any I/O failure silently disables the
/// store for the rest of the session.
pub fn record(rec: ExpRecord, opening_key: Option<u64>, in_opening: bool, pawn_ending: bool) {
    if !enabled() {
        return;
    }
    let write = || -> Result<()> {
        if in_opening {
            append_file(GLOBAL_FILE, &rec)?;
        }
        if let Some(k) = opening_key {
            append_file(&format!("{}.bin", k), &rec)?;
        }
        if pawn_ending {
            append_file(PAWN_FILE, &rec)?;
        }
        Ok(())
    };
    if let Err(e) = write() {
        warn!(error = %e, "experience write failed, store disabled");
        disable();
        return;
    }
    // The running session learns from its own games as well.
    fold(&mut STORE.lock().unwrap().map, rec);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_codec_round_trips() {
        let rec = ExpRecord {
            depth: 17,
            key: 0x0123_4567_89ab_cdef,
            mv: Move(0x0421),
            score: -321,
        };
        let buf = rec.encode();
        assert_eq!(ExpRecord::decode(&buf).unwrap(), rec);
    }

    #[test]
    fn deepest_child_wins_probe() {
        let mut map = HashMap::new();
        let key = 42u64;
        for (depth, mv, score) in [(4, Move(0x0421), 10), (9, Move(0x0462), 55)] {
            fold(
                &mut map,
                ExpRecord {
                    depth,
                    key,
                    mv,
                    score,
                },
            );
        }
        let node = map.get(&key).unwrap();
        assert_eq!(node.children.len(), 2);
        assert_eq!(node.total_visits, 2);
        assert_eq!(node.children.last().unwrap().depth, Depth(9));
        assert_eq!(node.children.last().unwrap().mv, Move(0x0462));
    }

    #[test]
    fn repeated_record_keeps_max_depth() {
        let mut map = HashMap::new();
        let key = 7u64;
        let mv = Move(0x0421);
        for depth in [8, 3] {
            fold(
                &mut map,
                ExpRecord {
                    depth,
                    key,
                    mv,
                    score: depth as i16,
                },
            );
        }
        let node = map.get(&key).unwrap();
        assert_eq!(node.children.len(), 1);
        assert_eq!(node.children[0].depth, Depth(8));
        assert_eq!(node.children[0].score, Value(8));
        assert_eq!(node.total_visits, 2);
    }

    #[test]
    fn file_round_trip() {
        let path = std::env::temp_dir().join(format!("remora-exp-test-{}.bin", std::process::id()));
        let rec = ExpRecord {
            depth: 12,
            key: 99,
            mv: Move(0x0421),
            score: 77,
        };
        append_file(path.to_str().unwrap(), &rec).unwrap();
        let loaded = load_file(&path).unwrap();
        assert_eq!(loaded, 1);
        let probe = probe(Key(99)).unwrap();
        assert_eq!(probe.mv, rec.mv);
        assert_eq!(probe.depth, Depth(12));
        std::fs::remove_file(&path).ok();
    }
}
