use std::{borrow::Borrow, fmt, marker::PhantomData, mem::MaybeUninit};

use crate::{
    Allocator, Buffer, DynBitset, Error, Exponential, FxHash, Global, GrowthPolicy, KeyHash,
    LinearProbing, ProbingPolicy, Result,
};

struct Node<K, V> {
    key: K,
    value: V,
}

/// An append-only hash table with open addressing.
///
/// Slot `i` holds an initialized node if and only if bit `i` of the
/// occupancy bitset is set. There are no tombstones: keys are never
/// removed, only dropped all at once by [`Hashmap::clear`].
///
/// The table grows through `G` when it is completely full, and every
/// growth rehashes the live entries into their slots of the new capacity.
pub struct Hashmap<
    K,
    V,
    H = FxHash,
    P = LinearProbing,
    G = Exponential,
    A: Allocator = Global,
> {
    slots: Buffer<MaybeUninit<Node<K, V>>, A>,
    occupancy: DynBitset<u32, A>,
    len: usize,
    _marker: PhantomData<(K, V, fn() -> (H, P, G))>,
}

impl<K, V, H, P, G, A: Allocator> Hashmap<K, V, H, P, G, A> {
    /// Creates an empty table without allocating.
    pub const fn new() -> Self {
        Hashmap {
            slots: Buffer::new(),
            occupancy: DynBitset::empty(),
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Number of stored entries
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the table stores no entry
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    fn occupied(&self, slot: usize) -> bool {
        matches!(self.occupancy.get(slot), Ok(true))
    }

    /// Drops every entry, keeping the slots.
    pub fn clear(&mut self) {
        for slot in 0..self.capacity() {
            // Release the slot first so a panicking destructor cannot cause
            // a double drop
            if self.occupied(slot) && self.occupancy.set(slot, false).is_ok() {
                self.len -= 1;
                // Safety: the slot held an initialized node and is no longer
                // marked occupied
                unsafe { self.slots[slot].assume_init_drop() };
            }
        }
    }

    /// Entries in slot order
    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> + '_ {
        self.occupancy.iter_ones().map(move |slot| {
            // Safety: iter_ones only yields occupied slots
            let node = unsafe { self.slots[slot].assume_init_ref() };
            (&node.key, &node.value)
        })
    }

    /// Keys in slot order
    pub fn keys(&self) -> impl Iterator<Item = &K> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Values in slot order
    pub fn values(&self) -> impl Iterator<Item = &V> + '_ {
        self.iter().map(|(_, value)| value)
    }
}

impl<K, V, H, P, G, A> Hashmap<K, V, H, P, G, A>
where
    K: Eq,
    H: KeyHash<K>,
    P: ProbingPolicy,
    G: GrowthPolicy,
    A: Allocator,
{
    /// Creates an empty table with `capacity` slots.
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        let mut res = Self::new();
        res.resize(capacity)?;
        Ok(res)
    }

    // First free slot on the probe sequence of home
    fn free_slot(occupancy: &DynBitset<u32, A>, home: usize, capacity: usize) -> Result<usize> {
        let is_free = |slot| matches!(occupancy.get(slot), Ok(false));
        if is_free(home) {
            return Ok(home);
        }
        (1..capacity)
            .map(|attempt| P::probe(home, attempt, capacity))
            .find(|&slot| is_free(slot))
            .ok_or(Error::CollisionResolutionFailure { capacity })
    }

    /// Stores `value` under `key`.
    ///
    /// Fails with [`Error::DuplicateKey`] if `key` is already stored,
    /// leaving the table untouched.
    pub fn push(&mut self, key: K, value: V) -> Result<()> {
        if self.find(&key).is_some() {
            return Err(Error::DuplicateKey);
        }
        if self.capacity() == 0 || self.occupancy.all() {
            self.resize(G::next(self.capacity()))?;
        }
        let capacity = self.capacity();
        let slot = Self::free_slot(&self.occupancy, H::hash(&key) % capacity, capacity)?;
        self.occupancy.set(slot, true)?;
        self.slots[slot].write(Node { key, value });
        self.len += 1;
        Ok(())
    }

    /// Grows the table to `capacity` slots, rehashing every entry.
    ///
    /// Never shrinks. If an entry cannot be placed in the new slots, the
    /// table is left as it was.
    pub fn resize(&mut self, capacity: usize) -> Result<()> {
        if capacity <= self.capacity() {
            return Ok(());
        }
        let mut slots = Buffer::<MaybeUninit<Node<K, V>>, A>::with_capacity(capacity)?;
        slots.construct_with(MaybeUninit::uninit);
        let mut occupancy = DynBitset::new(capacity)?;

        // Place every key before moving anything
        let mut moves = Buffer::<(usize, usize), A>::with_capacity(self.len)?;
        for from in self.occupancy.iter_ones() {
            // Safety: iter_ones only yields occupied slots
            let key = unsafe { &self.slots[from].assume_init_ref().key };
            let to = Self::free_slot(&occupancy, H::hash(key) % capacity, capacity)?;
            occupancy.set(to, true)?;
            moves.push((from, to))?;
        }

        for &(from, to) in moves.iter() {
            // Safety: every occupied node is read exactly once, and the
            // old slots are discarded as uninitialized memory
            let node = unsafe { self.slots[from].assume_init_read() };
            slots[to].write(node);
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(
            from = self.capacity(),
            to = capacity,
            entries = self.len,
            "hashmap rehashed"
        );
        self.slots = slots;
        self.occupancy = occupancy;
        Ok(())
    }

    fn find<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let capacity = self.capacity();
        if capacity == 0 {
            return None;
        }
        let home = <H as KeyHash<Q>>::hash(key) % capacity;
        let probes = (1..capacity).map(|attempt| P::probe(home, attempt, capacity));
        for slot in std::iter::once(home).chain(probes) {
            if !self.occupied(slot) {
                // Entries are never removed, so a probe sequence ends at
                // its first free slot
                return None;
            }
            // Safety: the slot is occupied
            let node = unsafe { self.slots[slot].assume_init_ref() };
            if <K as Borrow<Q>>::borrow(&node.key) == key {
                return Some(slot);
            }
        }
        None
    }

    /// The value stored under `key`, if any.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let slot = self.find(key)?;
        // Safety: find only returns occupied slots
        Some(unsafe { &self.slots[slot].assume_init_ref().value })
    }

    /// The value stored under `key`, mutably.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Option<&mut V>
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        let slot = self.find(key)?;
        // Safety: find only returns occupied slots
        Some(unsafe { &mut self.slots[slot].assume_init_mut().value })
    }

    /// Whether `key` is stored
    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + ?Sized,
        H: KeyHash<Q>,
    {
        self.find(key).is_some()
    }
}

impl<K, V, H, P, G, A: Allocator> Drop for Hashmap<K, V, H, P, G, A> {
    fn drop(&mut self) {
        self.clear()
    }
}

impl<K, V, H, P, G, A: Allocator> Default for Hashmap<K, V, H, P, G, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H, P, G, A: Allocator> fmt::Debug
    for Hashmap<K, V, H, P, G, A>
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, rc::Rc};

    use super::*;
    use crate::{
        alloc::testing::{Counting, Tracked},
        IdentityHash, Linear, QuadraticProbing,
    };

    type IdMap<V> = Hashmap<u32, V, IdentityHash, LinearProbing, Linear>;

    #[test]
    fn push_and_get() {
        let mut map: Hashmap<&str, u32> = Hashmap::new();
        assert!(map.is_empty());
        assert_eq!(map.get("missing"), None);
        map.push("shaders/pbr.vert", 1).unwrap();
        map.push("shaders/pbr.frag", 2).unwrap();
        map.push("meshes/cube.gltf", 3).unwrap();
        assert_eq!(map.len(), 3);
        assert_eq!(map.get("shaders/pbr.vert"), Some(&1));
        assert_eq!(map.get("shaders/pbr.frag"), Some(&2));
        assert_eq!(map.get("meshes/cube.gltf"), Some(&3));
        assert_eq!(map.get("meshes/sphere.gltf"), None);
    }

    #[test]
    fn duplicate_key_leaves_table_unchanged() {
        let mut map: Hashmap<u64, &str> = Hashmap::new();
        map.push(7, "first").unwrap();
        map.push(8, "second").unwrap();
        let capacity = map.capacity();
        assert_eq!(map.push(7, "again"), Err(Error::DuplicateKey));
        assert_eq!(map.len(), 2);
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.get(&7), Some(&"first"));
    }

    #[test]
    fn grows_only_when_full() {
        let mut map: Hashmap<u32, ()> = Hashmap::new();
        assert_eq!(map.capacity(), 0);
        map.push(1, ()).unwrap();
        assert_eq!(map.capacity(), 2);
        map.push(2, ()).unwrap();
        assert_eq!(map.capacity(), 2);
        map.push(3, ()).unwrap();
        assert_eq!(map.capacity(), 4);
    }

    #[test]
    fn entries_survive_growth() {
        let mut map: IdMap<u32> = Hashmap::new();
        for key in 0..200 {
            map.push(key * 7, key).unwrap();
        }
        assert_eq!(map.capacity(), 200);
        for key in 0..200 {
            assert_eq!(map.get(&(key * 7)), Some(&key));
        }
        assert_eq!(map.get(&1), None);
    }

    #[test]
    fn linear_probing_resolves_collisions() {
        let mut map: IdMap<char> = Hashmap::with_capacity(8).unwrap();
        map.push(0, 'a').unwrap();
        map.push(8, 'b').unwrap();
        map.push(16, 'c').unwrap();
        map.push(1, 'd').unwrap();
        assert_eq!(map.keys().copied().collect::<Vec<_>>(), [0, 8, 16, 1]);
        assert_eq!(map.get(&16), Some(&'c'));
        assert_eq!(map.get(&1), Some(&'d'));
        assert_eq!(map.get(&24), None);
    }

    #[test]
    fn quadratic_probing_can_fail() {
        let mut map: Hashmap<u32, (), IdentityHash, QuadraticProbing> =
            Hashmap::with_capacity(8).unwrap();
        // home 0 only ever reaches slots 0, 1 and 4
        map.push(0, ()).unwrap();
        map.push(8, ()).unwrap();
        map.push(16, ()).unwrap();
        assert_eq!(
            map.push(24, ()),
            Err(Error::CollisionResolutionFailure { capacity: 8 })
        );
        assert_eq!(map.len(), 3);
        assert_eq!(map.capacity(), 8);
        map.push(2, ()).unwrap();
    }

    #[test]
    fn failed_rehash_keeps_the_table() {
        let mut map: Hashmap<u32, u8, IdentityHash, QuadraticProbing> =
            Hashmap::with_capacity(5).unwrap();
        for key in [0, 8, 16, 24] {
            map.push(key, 0).unwrap();
        }
        // every key lands on home 0 of a capacity 8 table, which only
        // reaches slots 0, 1 and 4
        assert_eq!(
            map.resize(8),
            Err(Error::CollisionResolutionFailure { capacity: 8 })
        );
        assert_eq!(map.capacity(), 5);
        for key in [0, 8, 16, 24] {
            assert!(map.contains_key(&key));
        }
    }

    #[test]
    fn resize_never_shrinks() {
        let mut map: Hashmap<u32, u32> = Hashmap::with_capacity(16).unwrap();
        map.resize(4).unwrap();
        assert_eq!(map.capacity(), 16);
    }

    #[test]
    fn get_mut_updates_in_place() {
        let mut map: Hashmap<u32, Vec<u32>> = Hashmap::new();
        map.push(3, vec![]).unwrap();
        map.get_mut(&3).unwrap().push(9);
        assert_eq!(map.get(&3).unwrap(), &[9]);
        assert!(map.get_mut(&4).is_none());
    }

    #[test]
    fn clear_drops_entries_and_keeps_slots() {
        let drops = Rc::new(Cell::new(0));
        let mut map: Hashmap<u32, Tracked> = Hashmap::new();
        for key in 0..5 {
            map.push(key, Tracked::new(key, &drops)).unwrap();
        }
        let capacity = map.capacity();
        map.clear();
        assert_eq!(drops.get(), 5);
        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.get(&1).map(|t| t.id), None);
        map.push(1, Tracked::new(10, &drops)).unwrap();
        assert_eq!(map.get(&1).map(|t| t.id), Some(10));
    }

    struct PanicOnDrop {
        drops: Rc<Cell<usize>>,
        panics: bool,
    }

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            self.drops.set(self.drops.get() + 1);
            if self.panics {
                panic!("destructor failed");
            }
        }
    }

    #[test]
    fn panicking_destructor_never_drops_twice() {
        let drops = Rc::new(Cell::new(0));
        let mut map: IdMap<PanicOnDrop> = Hashmap::with_capacity(4).unwrap();
        for key in 0..4 {
            let value = PanicOnDrop {
                drops: drops.clone(),
                panics: key == 1,
            };
            map.push(key, value).unwrap();
        }
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| map.clear()));
        assert!(res.is_err());
        assert_eq!(drops.get(), 2);
        assert_eq!(map.len(), 2);
        assert!(!map.contains_key(&1));
        assert!(map.contains_key(&2));

        drop(map);
        assert_eq!(drops.get(), 4);
    }

    #[test]
    fn drop_destroys_each_entry_once() {
        let drops = Rc::new(Cell::new(0));
        {
            let mut map: Hashmap<u32, Tracked> = Hashmap::new();
            for key in 0..33 {
                map.push(key, Tracked::new(key, &drops)).unwrap();
            }
            // rehashing moves the values
            assert_eq!(drops.get(), 0);
        }
        assert_eq!(drops.get(), 33);
    }

    #[test]
    fn blocks_are_returned() {
        let before = Counting::live_blocks();
        {
            let mut map: Hashmap<u32, u32, FxHash, LinearProbing, Exponential, Counting> =
                Hashmap::new();
            for key in 0..100 {
                map.push(key, key).unwrap();
            }
        }
        assert_eq!(Counting::live_blocks(), before);
    }

    #[test]
    fn debug_lists_entries() {
        let mut map: IdMap<&str> = Hashmap::with_capacity(4).unwrap();
        map.push(2, "b").unwrap();
        map.push(0, "a").unwrap();
        assert_eq!(format!("{map:?}"), r#"{0: "a", 2: "b"}"#);
    }
}
