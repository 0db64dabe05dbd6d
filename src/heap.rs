use super::object::{fnv1a_hash, LoxString, Obj, ObjRef};
use super::value::Value;

struct HeapSlot {
    marked: bool,
    obj: Obj,
}

#[derive(Clone, Copy, Debug)]
enum InternSlot {
    Empty,
    Tombstone,
    Occupied { hash: u32, obj: ObjRef },
}

/// The object arena plus the weak string-intern table. An `ObjRef` is just
/// an index into `slots`; freeing an object leaves `None` behind and pushes
/// the index onto `free` for reuse by the next allocation, which is the
/// safe-Rust reading of "intrusive linked list of heap objects rooted at
/// the VM" the source uses.
pub struct Heap {
    slots: Vec<Option<HeapSlot>>,
    free: Vec<usize>,
    interned: Vec<InternSlot>,
    interned_len: usize,
    pub bytes_allocated: usize,
    pub next_gc: usize,
    pub stress_mode: bool,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            interned: Vec::new(),
            interned_len: 0,
            bytes_allocated: 0,
            next_gc: 1024 * 1024,
            stress_mode: false,
        }
    }

    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        self.bytes_allocated += obj.approx_size();
        let slot = HeapSlot { marked: false, obj };
        if let Some(index) = self.free.pop() {
            self.slots[index] = Some(slot);
            ObjRef::from_index(index)
        } else {
            self.slots.push(Some(slot));
            ObjRef::from_index(self.slots.len() - 1)
        }
    }

    pub fn get(&self, r: ObjRef) -> &Obj {
        &self.slots[r.index()].as_ref().expect("dangling ObjRef").obj
    }

    pub fn get_mut(&mut self, r: ObjRef) -> &mut Obj {
        &mut self.slots[r.index()].as_mut().expect("dangling ObjRef").obj
    }

    pub fn should_collect(&self) -> bool {
        self.stress_mode || self.bytes_allocated >= self.next_gc
    }

    pub fn as_string(&self, r: ObjRef) -> &str {
        match self.get(r) {
            Obj::String(s) => &s.chars,
            _ => panic!("ObjRef is not a string"),
        }
    }

    pub fn string_hash(&self, r: ObjRef) -> u32 {
        match self.get(r) {
            Obj::String(s) => s.hash,
            _ => panic!("ObjRef is not a string"),
        }
    }

    // --- interning ---

    fn intern_capacity(&self) -> usize {
        self.interned.len()
    }

    fn intern_find_existing(&self, hash: u32, bytes: &[u8]) -> Option<ObjRef> {
        if self.intern_capacity() == 0 {
            return None;
        }
        let capacity = self.intern_capacity();
        let mut index = hash as usize & (capacity - 1);
        loop {
            match self.interned[index] {
                InternSlot::Empty => return None,
                InternSlot::Occupied { hash: h, obj } if h == hash => {
                    if self.as_string(obj).as_bytes() == bytes {
                        return Some(obj);
                    }
                }
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    fn intern_grow(&mut self) {
        let new_capacity = if self.intern_capacity() == 0 { 8 } else { self.intern_capacity() * 2 };
        let mut new_table = vec![InternSlot::Empty; new_capacity];
        for slot in &self.interned {
            if let InternSlot::Occupied { hash, obj } = slot {
                let mut index = *hash as usize & (new_capacity - 1);
                loop {
                    if matches!(new_table[index], InternSlot::Empty) {
                        new_table[index] = InternSlot::Occupied { hash: *hash, obj: *obj };
                        break;
                    }
                    index = (index + 1) & (new_capacity - 1);
                }
            }
        }
        self.interned = new_table;
    }

    fn intern_insert(&mut self, hash: u32, obj: ObjRef) {
        if self.intern_capacity() == 0 || (self.interned_len + 1) as f64 > self.intern_capacity() as f64 * 0.75 {
            self.intern_grow();
        }
        let capacity = self.intern_capacity();
        let mut index = hash as usize & (capacity - 1);
        loop {
            match self.interned[index] {
                InternSlot::Empty | InternSlot::Tombstone => {
                    self.interned[index] = InternSlot::Occupied { hash, obj };
                    self.interned_len += 1;
                    return;
                }
                _ => {}
            }
            index = (index + 1) & (capacity - 1);
        }
    }

    pub fn intern_str(&mut self, text: &str) -> ObjRef {
        self.intern_bytes(text.as_bytes())
    }

    pub fn intern_bytes(&mut self, bytes: &[u8]) -> ObjRef {
        let hash = fnv1a_hash(bytes);
        if let Some(existing) = self.intern_find_existing(hash, bytes) {
            return existing;
        }
        let obj = Obj::String(LoxString {
            chars: Box::from(std::str::from_utf8(bytes).expect("source is UTF-8 checked by the lexer")),
            hash,
        });
        let r = self.alloc(obj);
        self.intern_insert(hash, r);
        r
    }

    // --- GC ---

    pub fn mark_value(&mut self, value: Value, gray: &mut Vec<ObjRef>) {
        if let Value::Obj(r) = value {
            self.mark_object(r, gray);
        }
    }

    pub fn mark_object(&mut self, r: ObjRef, gray: &mut Vec<ObjRef>) {
        if let Some(slot) = self.slots[r.index()].as_mut() {
            if !slot.marked {
                slot.marked = true;
                gray.push(r);
            }
        }
    }

    /// Pops one object off the gray worklist, marks every object it
    /// references (its children go from white to gray), turning the popped
    /// object itself black.
    pub fn blacken(&mut self, r: ObjRef, gray: &mut Vec<ObjRef>) {
        match self.get(r) {
            Obj::String(_) => {}
            Obj::Upvalue(u) => {
                if let super::object::UpvalueState::Closed(v) = u.state {
                    self.mark_value(v, gray);
                }
            }
            Obj::Closure(c) => {
                let function = c.function;
                let upvalues = c.upvalues.clone();
                self.mark_object(function, gray);
                for uv in upvalues {
                    self.mark_object(uv, gray);
                }
            }
            Obj::Function(f) => {
                if let Some(name) = f.name {
                    self.mark_object(name, gray);
                }
                let constants: Vec<Value> = f.chunk.constants.clone();
                for c in constants {
                    self.mark_value(c, gray);
                }
            }
            Obj::Class(c) => {
                let name = c.name;
                let entries: Vec<(ObjRef, Value)> = c.methods.iter().collect();
                self.mark_object(name, gray);
                for (k, v) in entries {
                    self.mark_object(k, gray);
                    self.mark_value(v, gray);
                }
            }
            Obj::Instance(i) => {
                let class = i.class;
                let entries: Vec<(ObjRef, Value)> = i.fields.iter().collect();
                self.mark_object(class, gray);
                for (k, v) in entries {
                    self.mark_object(k, gray);
                    self.mark_value(v, gray);
                }
            }
            Obj::BoundMethod(b) => {
                let receiver = b.receiver;
                let method = b.method;
                self.mark_value(receiver, gray);
                self.mark_object(method, gray);
            }
        }
    }

    pub fn trace(&mut self, gray: &mut Vec<ObjRef>) {
        while let Some(r) = gray.pop() {
            self.blacken(r, gray);
        }
    }

    fn is_marked(&self, r: ObjRef) -> bool {
        self.slots[r.index()].as_ref().map(|s| s.marked).unwrap_or(false)
    }

    /// Must run after trace and before sweep: a string reachable only
    /// through the intern table is otherwise invisible to the mark phase
    /// and would dangle once sweep frees it.
    pub fn remove_white_strings(&mut self) {
        for slot in &mut self.interned {
            if let InternSlot::Occupied { obj, .. } = *slot {
                if !self.is_marked(obj) {
                    *slot = InternSlot::Tombstone;
                    self.interned_len -= 1;
                }
            }
        }
    }

    pub fn sweep(&mut self) {
        for index in 0..self.slots.len() {
            let free_this = match self.slots[index].as_mut() {
                Some(slot) if slot.marked => {
                    slot.marked = false;
                    false
                }
                Some(_) => true,
                None => false,
            };
            if free_this {
                if let Some(slot) = self.slots[index].take() {
                    self.bytes_allocated = self.bytes_allocated.saturating_sub(slot.obj.approx_size());
                }
                self.free.push(index);
            }
        }
        self.next_gc = self.bytes_allocated.max(1) * 2;
    }

    #[cfg(test)]
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_identity() {
        let mut heap = Heap::new();
        let a = heap.intern_str("abc");
        let b = heap.intern_str("abc");
        assert_eq!(a, b);
    }

    #[test]
    fn unreachable_objects_are_swept() {
        let mut heap = Heap::new();
        let kept = heap.intern_str("kept");
        let _discarded = heap.intern_str("discarded");
        let mut gray = vec![];
        heap.mark_object(kept, &mut gray);
        heap.trace(&mut gray);
        heap.remove_white_strings();
        heap.sweep();
        assert_eq!(heap.live_count(), 1);
        assert_eq!(heap.intern_find_existing(fnv1a_hash(b"discarded"), b"discarded"), None);
    }
}
