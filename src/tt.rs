use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicU16, AtomicU64, AtomicU8, Ordering};

use once_cell::sync::Lazy;

use crate::types::*;

pub const DEFAULT_MB: usize = 16;
const CLUSTER_SIZE: usize = 3;

/// One table entry: a 16-bit verification key plus a 64-bit data word
/// packing move, value, static eval, generation|pv|bound and depth.
/// Key and data are separate atomics, so a pair may be torn under
/// contention; readers re-validate values (`Value::NONE`, legality).
pub struct TTEntry {
    key16: AtomicU16,
    data: AtomicU64,
}

const fn pack(m: u16, v: i16, ev: i16, gen_bound: u8, depth: i8) -> u64 {
    (m as u64)
        | ((v as u16 as u64) << 16)
        | ((ev as u16 as u64) << 32)
        | ((gen_bound as u64) << 48)
        | ((depth as u8 as u64) << 56)
}

impl TTEntry {
    fn load(&self) -> u64 {
        self.data.load(Ordering::Relaxed)
    }

    pub fn mov(&self) -> Move {
        Move(self.load() as u16)
    }

    pub fn value(&self) -> Value {
        Value((self.load() >> 16) as u16 as i16 as i32)
    }

    pub fn eval(&self) -> Value {
        Value((self.load() >> 32) as u16 as i16 as i32)
    }

    fn gen_bound(&self) -> u8 {
        (self.load() >> 48) as u8
    }

    pub fn bound(&self) -> Bound {
        Bound(self.gen_bound() & 3)
    }

    pub fn is_pv(&self) -> bool {
        self.gen_bound() & 4 != 0
    }

    pub fn depth(&self) -> Depth {
        Depth(((self.load() >> 56) as u8 as i8) as i32)
    }

    pub fn save(&self, k: Key, v: Value, pv: bool, b: Bound, d: Depth, m: Move, ev: Value, g: u8) {
        let k16 = (k.0 >> 48) as u16;
        let cur_key = self.key16.load(Ordering::Relaxed);
        let cur = self.load();

        // Preserve the old move when the new record has none.
        let mov = if m != Move::NONE || k16 != cur_key {
            m.0
        } else {
            cur as u16
        };

        let cur_depth = ((cur >> 56) as u8 as i8) as i32;
        if k16 != cur_key || d.0 > cur_depth - 4 || b == Bound::EXACT {
            self.key16.store(k16, Ordering::Relaxed);
            self.data.store(
                pack(
                    mov,
                    v.0 as i16,
                    ev.0 as i16,
                    g | ((pv as u8) << 2) | b.0,
                    d.0 as i8,
                ),
                Ordering::Relaxed,
            );
        }
    }

    fn clear(&self) {
        self.key16.store(0, Ordering::Relaxed);
        self.data.store(0, Ordering::Relaxed);
    }
}

struct Cluster {
    entry: [TTEntry; CLUSTER_SIZE],
}

struct Table {
    clusters: UnsafeCell<Vec<Cluster>>,
    generation: AtomicU8,
}

// Entries are atomic; the cluster vector itself is only replaced by
// `resize`, which runs while no search is in flight.
unsafe impl Sync for Table {}

static TABLE: Lazy<Table> = Lazy::new(|| Table {
    clusters: UnsafeCell::new(alloc(DEFAULT_MB)),
    generation: AtomicU8::new(0),
});

fn alloc(mb_size: usize) -> Vec<Cluster> {
    let count = (mb_size.max(1) * 1024 * 1024 / std::mem::size_of::<Cluster>()).max(1);
    let mut v: Vec<Cluster> = Vec::with_capacity(count);
    for _ in 0..count {
        v.push(Cluster {
            entry: [
                TTEntry {
                    key16: AtomicU16::new(0),
                    data: AtomicU64::new(0),
                },
                TTEntry {
                    key16: AtomicU16::new(0),
                    data: AtomicU64::new(0),
                },
                TTEntry {
                    key16: AtomicU16::new(0),
                    data: AtomicU64::new(0),
                },
            ],
        });
    }
    v
}

fn clusters() -> &'static [Cluster] {
    unsafe { &*TABLE.clusters.get() }
}

/// Resize to `mb_size` megabytes. Must only be called while no search
/// is running; a no-op when the size is unchanged.
pub fn resize(mb_size: usize) {
    let count = (mb_size.max(1) * 1024 * 1024 / std::mem::size_of::<Cluster>()).max(1);
    let v = unsafe { &mut *TABLE.clusters.get() };
    if v.len() == count {
        return;
    }
    *v = alloc(mb_size);
}

pub fn clear() {
    for cl in clusters() {
        for e in &cl.entry {
            e.clear();
        }
    }
}

/// Bump the generation; wraps modulo 256 in steps of 8, leaving the
/// low bits free for the bound and was-pv flag.
pub fn new_search() {
    TABLE.generation.fetch_add(8, Ordering::Relaxed);
}

pub fn generation() -> u8 {
    TABLE.generation.load(Ordering::Relaxed) & 0xf8
}

fn cluster_for(key: Key) -> &'static Cluster {
    let cls = clusters();
    debug_assert!(!cls.is_empty());
    let idx = ((key.0 as u32 as u64) * (cls.len() as u64)) >> 32;
    &cls[idx as usize]
}

fn relative_age(gen_bound: u8) -> i32 {
    (263 + generation() as i32 - gen_bound as i32) & 0xf8
}

/// Scan the bucket for `key`. On a match (or an empty slot) return it
/// with the hit flag; otherwise return the replacement victim chosen by
/// depth minus aged generation distance.
pub fn probe(key: Key) -> (&'static TTEntry, bool) {
    let cl = cluster_for(key);
    let key16 = (key.0 >> 48) as u16;

    for e in &cl.entry {
        let k = e.key16.load(Ordering::Relaxed);
        if k == 0 || k == key16 {
            // Refresh the generation of a matched entry.
            if k != 0 && e.gen_bound() & 0xf8 != generation() {
                let cur = e.load();
                let refreshed = (cur & !(0xf8u64 << 48)) | ((generation() as u64) << 48);
                e.data.store(refreshed, Ordering::Relaxed);
            }
            return (e, k != 0);
        }
    }

    let mut victim = &cl.entry[0];
    for e in &cl.entry[1..] {
        if victim.depth().0 - relative_age(victim.gen_bound()) * 2
            > e.depth().0 - relative_age(e.gen_bound()) * 2
        {
            victim = e;
        }
    }
    (victim, false)
}

/// Approximate permille fill of the current generation.
pub fn hashfull() -> i32 {
    let cls = clusters();
    let sample = cls.len().min(1000 / CLUSTER_SIZE);
    let mut cnt = 0;
    for cl in &cls[..sample] {
        for e in &cl.entry {
            if e.load() != 0 && e.gen_bound() & 0xf8 == generation() {
                cnt += 1;
            }
        }
    }
    cnt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        // Force the lazy default allocation; tests use distinct keys.
        let _ = hashfull();
    }

    #[test]
    fn save_then_probe_round_trips() {
        init();
        let key = Key(0x1234_5678_9abc_def0);
        let (e, hit) = probe(key);
        assert!(!hit);
        e.save(
            key,
            Value(123),
            true,
            Bound::EXACT,
            Depth(7),
            Move(0x0421),
            Value(55),
            generation(),
        );
        let (e, hit) = probe(key);
        assert!(hit);
        assert_eq!(e.value(), Value(123));
        assert_eq!(e.eval(), Value(55));
        assert_eq!(e.depth(), Depth(7));
        assert_eq!(e.bound(), Bound::EXACT);
        assert!(e.is_pv());
        assert_eq!(e.mov(), Move(0x0421));
    }

    #[test]
    fn shallow_store_keeps_deep_entry() {
        init();
        let key = Key(0xdead_beef_0000_0001);
        let (e, _) = probe(key);
        e.save(
            key,
            Value(200),
            false,
            Bound::LOWER,
            Depth(12),
            Move(0x0421),
            Value::NONE,
            generation(),
        );
        // A much shallower non-exact store must not clobber it.
        e.save(
            key,
            Value(-5),
            false,
            Bound::UPPER,
            Depth(2),
            Move(0x0462),
            Value::NONE,
            generation(),
        );
        assert_eq!(e.depth(), Depth(12));
        assert_eq!(e.value(), Value(200));
    }

    #[test]
    fn none_move_preserves_existing_move(){
        init();
        let key = Key(0xdead_beef_0000_0002);
        let (e, _) = probe(key);
        e.save(
            key,
            Value(10),
            false,
            Bound::LOWER,
            Depth(4),
            Move(0x0421),
            Value::NONE,
            generation(),
        );
        e.save(
            key,
            Value(11),
            false,
            Bound::EXACT,
            Depth(4),
            Move::NONE,
            Value::NONE,
            generation(),
        );
        assert_eq!(e.mov(), Move(0x0421));
    }

    #[test]
    fn negative_depth_codes_survive() {
        init();
        let key = Key(0xdead_beef_0000_0003);
        let (e, _) = probe(key);
        e.save(
            key,
            Value(1),
            false,
            Bound::UPPER,
            Depth::QS_NO_CHECKS,
            Move::NONE,
            Value(9),
            generation(),
        );
        assert_eq!(e.depth(), Depth::QS_NO_CHECKS);
    }

    #[test]
    fn generations_wrap() {
        init();
        for _ in 0..40 {
            new_search();
        }
        // Still a multiple of 8 after wrapping.
        assert_eq!(generation() & 7, 0);
    }
}
