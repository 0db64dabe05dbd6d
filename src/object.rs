use super::chunk::Chunk;
use super::table::Table;
use super::value::Value;

/// An index into the heap arena standing in for a raw pointer. Stable for
/// the lifetime of the object: the arena slot an `ObjRef` names never moves,
/// it is only ever freed and later reused after a sweep recycles the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef(usize);

impl ObjRef {
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }

    pub fn index(&self) -> usize {
        self.0
    }
}

pub struct LoxString {
    pub chars: Box<str>,
    pub hash: u32,
}

pub struct Upvalue {
    pub state: UpvalueState,
}

#[derive(Clone, Copy)]
pub enum UpvalueState {
    /// Points at a live value-stack slot.
    Open(usize),
    Closed(Value),
}

pub struct Function {
    pub name: Option<ObjRef>, // interned string; None for the top-level script
    pub arity: u8,
    pub default_count: u8,
    pub upvalue_count: u8,
    pub chunk: Chunk,
}

impl Function {
    pub fn new() -> Self {
        Self {
            name: None,
            arity: 0,
            default_count: 0,
            upvalue_count: 0,
            chunk: Chunk::new(),
        }
    }
}

impl Default for Function {
    fn default() -> Self {
        Self::new()
    }
}

/// Describes one upvalue captured by a `Closure`, exactly as emitted after
/// `OP_CLOSURE`: whether it captures a local slot of the *enclosing* frame
/// or reuses one of the enclosing closure's own upvalues.
#[derive(Clone, Copy)]
pub struct UpvalueCapture {
    pub is_local: bool,
    pub index: u8,
}

pub struct Closure {
    pub function: ObjRef,
    pub upvalues: Vec<ObjRef>, // each an Upvalue object; len == function.upvalue_count
}

pub struct Class {
    pub name: ObjRef,
    pub methods: Table,
}

impl Class {
    pub fn new(name: ObjRef) -> Self {
        Self {
            name,
            methods: Table::new(),
        }
    }
}

pub struct Instance {
    pub class: ObjRef,
    pub fields: Table,
}

impl Instance {
    pub fn new(class: ObjRef) -> Self {
        Self {
            class,
            fields: Table::new(),
        }
    }
}

pub struct BoundMethod {
    pub receiver: Value,
    pub method: ObjRef, // a Closure
}

/// One heap entity. The GC mark bit lives alongside this in the arena slot
/// rather than embedded in every variant — same invariant the intrusive
/// C header gives you, expressed without needing every object to carry its
/// own header field.
pub enum Obj {
    String(LoxString),
    Upvalue(Upvalue),
    Function(Function),
    Closure(Closure),
    Class(Class),
    Instance(Instance),
    BoundMethod(BoundMethod),
}

impl Obj {
    pub fn type_name(&self) -> &'static str {
        match self {
            Obj::String(_) => "string",
            Obj::Upvalue(_) => "upvalue",
            Obj::Function(_) => "function",
            Obj::Closure(_) => "closure",
            Obj::Class(_) => "class",
            Obj::Instance(_) => "instance",
            Obj::BoundMethod(_) => "bound method",
        }
    }

    /// Rough heap cost, used to drive `bytesAllocated`/`nextGC`.
    pub fn approx_size(&self) -> usize {
        use std::mem::size_of_val;
        match self {
            Obj::String(s) => size_of_val(s) + s.chars.len(),
            Obj::Upvalue(u) => size_of_val(u),
            Obj::Function(f) => size_of_val(f) + f.chunk.code.len() + f.chunk.constants.len() * 16,
            Obj::Closure(c) => size_of_val(c) + c.upvalues.len() * 8,
            Obj::Class(c) => size_of_val(c),
            Obj::Instance(i) => size_of_val(i),
            Obj::BoundMethod(b) => size_of_val(b),
        }
    }
}

/// FNV-1a, matching the hashing scheme the original table implementation
/// and string interner both rely on.
pub fn fnv1a_hash(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(16777619);
    }
    hash
}
