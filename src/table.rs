use super::object::ObjRef;
use super::value::Value;

/// Open-addressed hash map from interned-string keys to `Value`s, grounded
/// directly on the original table.c: linear probing, tombstones left behind
/// on delete so probe chains stay intact, grown at a 0.75 load factor.
///
/// Keys are `ObjRef`s that must point at interned strings; the table trusts
/// its caller for that (it never dereferences the arena itself — hashing
/// and equality both reduce to the string's precomputed FNV-1a hash and
/// `ObjRef` identity, which interning guarantees tracks content equality).
#[derive(Clone)]
enum Slot {
    Empty,
    Tombstone,
    Occupied { hash: u32, key: ObjRef, value: Value },
}

pub struct Table {
    entries: Vec<Slot>,
    count: usize, // occupied + tombstones
}

impl Default for Table {
    fn default() -> Self {
        Self::new()
    }
}

impl Table {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .iter()
            .filter(|s| matches!(s, Slot::Occupied { .. }))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn find_slot(entries: &[Slot], capacity: usize, hash: u32, key: ObjRef) -> usize {
        let mut index = hash as usize & (capacity - 1);
        let mut first_tombstone: Option<usize> = None;
        loop {
            match &entries[index] {
                Slot::Empty => return first_tombstone.unwrap_or(index),
                Slot::Tombstone => {
                    if first_tombstone.is_none() {
                        first_tombstone = Some(index);
                    }
                }
                Slot::Occupied { key: k, .. } if *k == key => return index,
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn grow(&mut self) {
        let new_capacity = if self.capacity() == 0 { 8 } else { self.capacity() * 2 };
        let mut new_entries = vec![Slot::Empty; new_capacity];
        let mut new_count = 0;
        for slot in &self.entries {
            if let Slot::Occupied { hash, key, value } = slot {
                let idx = Self::find_slot(&new_entries, new_capacity, *hash, *key);
                new_entries[idx] = Slot::Occupied {
                    hash: *hash,
                    key: *key,
                    value: *value,
                };
                new_count += 1;
            }
        }
        self.entries = new_entries;
        self.count = new_count;
    }

    /// Returns true if this is a new key (mirrors `tableSet`'s return value,
    /// which the VM relies on to detect an undefined-global assignment).
    pub fn set(&mut self, hash: u32, key: ObjRef, value: Value) -> bool {
        if self.capacity() == 0 || (self.count + 1) as f64 > self.capacity() as f64 * 0.75 {
            self.grow();
        }
        let idx = Self::find_slot(&self.entries, self.capacity(), hash, key);
        let is_new = !matches!(self.entries[idx], Slot::Occupied { .. });
        if is_new && !matches!(self.entries[idx], Slot::Tombstone) {
            self.count += 1;
        }
        self.entries[idx] = Slot::Occupied { hash, key, value };
        is_new
    }

    pub fn get(&self, hash: u32, key: ObjRef) -> Option<Value> {
        if self.capacity() == 0 {
            return None;
        }
        let idx = Self::find_slot(&self.entries, self.capacity(), hash, key);
        match &self.entries[idx] {
            Slot::Occupied { value, .. } => Some(*value),
            _ => None,
        }
    }

    /// Deletes by planting a tombstone (key absent, logically "true"), so a
    /// probe chain that passed through this slot still finds later entries.
    pub fn delete(&mut self, hash: u32, key: ObjRef) -> bool {
        if self.capacity() == 0 {
            return false;
        }
        let idx = Self::find_slot(&self.entries, self.capacity(), hash, key);
        if matches!(self.entries[idx], Slot::Occupied { .. }) {
            self.entries[idx] = Slot::Tombstone;
            true
        } else {
            false
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjRef, Value)> + '_ {
        self.entries.iter().filter_map(|s| match s {
            Slot::Occupied { key, value, .. } => Some((*key, *value)),
            _ => None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(i: usize) -> ObjRef {
        ObjRef::from_index(i)
    }

    #[test]
    fn set_get_delete_roundtrip() {
        let mut t = Table::new();
        assert!(t.set(1, r(0), Value::Number(1.0)));
        assert!(!t.set(1, r(0), Value::Number(2.0)));
        assert_eq!(t.get(1, r(0)), Some(Value::Number(2.0)));
        assert!(t.delete(1, r(0)));
        assert_eq!(t.get(1, r(0)), None);
    }

    #[test]
    fn grows_past_load_factor() {
        let mut t = Table::new();
        for i in 0..100 {
            t.set(i as u32, r(i), Value::Number(i as f64));
        }
        for i in 0..100 {
            assert_eq!(t.get(i as u32, r(i)), Some(Value::Number(i as f64)));
        }
    }
}
