use super::chunk::OpCode;
use super::compiler;
use super::heap::Heap;
use super::object::{
    BoundMethod, Class, Closure, Instance, Obj, ObjRef, Upvalue, UpvalueState,
};
use super::report::{CliReporter, Reporter};
use super::table::Table;
use super::value::Value;
use std::convert::TryFrom;
use std::io::Write;
use std::rc::Rc;

const FRAMES_MAX: usize = 64;
const STACK_MAX: usize = FRAMES_MAX * 256;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum InterpretResult {
    Ok,
    CompileError,
    RuntimeError,
}

struct CallFrame {
    closure: ObjRef,
    ip: usize,
    base: usize,
    /// Number of trailing parameter slots that were padded with Nil at call
    /// time and so are still eligible for `SET_DEFAULT` to fill in.
    defaults_required: u8,
}

/// The bytecode interpreter: a fixed-capacity frame stack, a fixed-capacity
/// value stack, the object heap, globals, and the open-upvalue list.
/// Generic over its output sink so tests can capture printed output instead
/// of hard-coding `print!` to stdout.
pub struct Vm<W: Write> {
    heap: Heap,
    frames: Vec<CallFrame>,
    stack: Vec<Value>,
    globals: Table,
    open_upvalues: Vec<ObjRef>, // sorted by decreasing stack slot
    init_string: ObjRef,
    out: W,
    reporter: Box<dyn Reporter>,
}

impl<W: Write> Vm<W> {
    pub fn new(out: W) -> Self {
        Self::with_reporter(out, Box::new(CliReporter))
    }

    /// Same as `new`, but with diagnostics routed through an explicit
    /// `Reporter` instead of stderr — what lets tests swap in a
    /// `CollectingReporter` and assert on the exact messages produced.
    pub fn with_reporter(out: W, reporter: Box<dyn Reporter>) -> Self {
        let mut heap = Heap::new();
        let init_string = heap.intern_str("init");
        Self {
            heap,
            frames: Vec::with_capacity(FRAMES_MAX),
            stack: Vec::with_capacity(STACK_MAX),
            globals: Table::new(),
            open_upvalues: Vec::new(),
            init_string,
            out,
            reporter,
        }
    }

    pub fn set_gc_stress(&mut self, stress: bool) {
        self.heap.stress_mode = stress;
    }

    /// Consumes the VM to recover its output sink, e.g. for a test asserting
    /// on everything `print` wrote to an in-memory buffer.
    pub fn into_output(self) -> W {
        self.out
    }

    pub fn interpret(&mut self, source: &str) -> InterpretResult {
        let source: Rc<str> = Rc::from(source);
        let function = match compiler::compile(source, &mut self.heap) {
            Ok(function) => function,
            Err(errors) => {
                for message in &errors {
                    self.reporter.report(message);
                }
                return InterpretResult::CompileError;
            }
        };

        let function_ref = self.heap.alloc(Obj::Function(function));
        self.stack.push(Value::Obj(function_ref));
        let closure_ref = self.heap.alloc(Obj::Closure(Closure {
            function: function_ref,
            upvalues: Vec::new(),
        }));
        self.stack.pop();
        self.stack.push(Value::Obj(closure_ref));
        self.frames.push(CallFrame {
            closure: closure_ref,
            ip: 0,
            base: 0,
            defaults_required: 0,
        });

        self.run()
    }

    // --- stack helpers ---

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Value {
        self.stack.pop().expect("stack underflow")
    }

    fn peek(&self, distance: usize) -> Value {
        self.stack[self.stack.len() - 1 - distance]
    }

    // --- frame / chunk reading ---

    fn frame(&self) -> &CallFrame {
        self.frames.last().expect("no active frame")
    }

    fn closure_ref(&self) -> ObjRef {
        self.frame().closure
    }

    fn function_ref(&self) -> ObjRef {
        match self.heap.get(self.closure_ref()) {
            Obj::Closure(c) => c.function,
            _ => unreachable!(),
        }
    }

    fn read_byte(&mut self) -> u8 {
        let frame_ip = self.frame().ip;
        let function_ref = self.function_ref();
        let byte = match self.heap.get(function_ref) {
            Obj::Function(f) => f.chunk.code[frame_ip],
            _ => unreachable!(),
        };
        self.frames.last_mut().unwrap().ip += 1;
        byte
    }

    fn read_u16(&mut self) -> u16 {
        let hi = self.read_byte();
        let lo = self.read_byte();
        (hi as u16) << 8 | lo as u16
    }

    fn read_constant(&mut self) -> Value {
        let index = self.read_byte();
        let function_ref = self.function_ref();
        match self.heap.get(function_ref) {
            Obj::Function(f) => f.chunk.constants[index as usize],
            _ => unreachable!(),
        }
    }

    fn current_line(&self) -> usize {
        let ip = self.frame().ip;
        let function_ref = self.function_ref();
        match self.heap.get(function_ref) {
            Obj::Function(f) => {
                let at = ip.saturating_sub(1).min(f.chunk.lines.len().saturating_sub(1));
                f.chunk.lines.get(at).copied().unwrap_or(0)
            }
            _ => 0,
        }
    }

    // --- allocation with GC safe points ---

    /// Roots the freshly (or freshly re-found) object on the stack for the
    /// duration of the post-allocation safe point: a collection triggered
    /// here must not see it as garbage before the caller has had a chance
    /// to install it somewhere durable (the stack, `open_upvalues`, a
    /// table). Popped immediately after, so the caller still receives a
    /// plain `ObjRef` and must root it itself with no further allocation
    /// in between.
    fn alloc(&mut self, obj: Obj) -> ObjRef {
        let r = self.heap.alloc(obj);
        self.stack.push(Value::Obj(r));
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.stack.pop();
        r
    }

    fn intern(&mut self, bytes: &[u8]) -> ObjRef {
        let r = self.heap.intern_bytes(bytes);
        self.stack.push(Value::Obj(r));
        if self.heap.should_collect() {
            self.collect_garbage();
        }
        self.stack.pop();
        r
    }

    fn collect_garbage(&mut self) {
        let mut gray = Vec::new();
        for value in &self.stack {
            self.heap.mark_value(*value, &mut gray);
        }
        for frame in &self.frames {
            self.heap.mark_object(frame.closure, &mut gray);
        }
        for &uv in &self.open_upvalues {
            self.heap.mark_object(uv, &mut gray);
        }
        let global_entries: Vec<(ObjRef, Value)> = self.globals.iter().collect();
        for (k, v) in global_entries {
            self.heap.mark_object(k, &mut gray);
            self.heap.mark_value(v, &mut gray);
        }
        self.heap.mark_object(self.init_string, &mut gray);
        self.heap.trace(&mut gray);
        self.heap.remove_white_strings();
        self.heap.sweep();
    }

    // --- runtime errors ---

    fn runtime_error(&mut self, message: &str) {
        self.reporter.report(message);
        for frame in self.frames.iter().rev() {
            let function_ref = match self.heap.get(frame.closure) {
                Obj::Closure(c) => c.function,
                _ => unreachable!(),
            };
            let (line, name) = match self.heap.get(function_ref) {
                Obj::Function(f) => {
                    let line = f
                        .chunk
                        .lines
                        .get(frame.ip.saturating_sub(1))
                        .copied()
                        .unwrap_or(0);
                    let name = f
                        .name
                        .map(|n| self.heap.as_string(n).to_string())
                        .unwrap_or_else(|| "script".to_string());
                    (line, name)
                }
                _ => (0, "script".to_string()),
            };
            self.reporter.report(&format!("[line {line}] in {name}"));
        }
        self.stack.clear();
        self.frames.clear();
    }

    fn is_falsy(&self, v: Value) -> bool {
        v.is_falsy()
    }

    fn format_value(&self, v: Value) -> String {
        match v {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => {
                if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", n as i64)
                } else {
                    format!("{n}")
                }
            }
            Value::Obj(r) => match self.heap.get(r) {
                Obj::String(s) => s.chars.to_string(),
                Obj::Function(f) => match f.name {
                    Some(n) => format!("<fn {}>", self.heap.as_string(n)),
                    None => "<script>".to_string(),
                },
                Obj::Closure(c) => self.format_value(Value::Obj(c.function)),
                Obj::Class(c) => format!("{}", self.heap.as_string(c.name)),
                Obj::Instance(i) => format!("{} instance", self.heap.as_string(
                    match self.heap.get(i.class) { Obj::Class(c) => c.name, _ => unreachable!() }
                )),
                Obj::BoundMethod(b) => self.format_value(Value::Obj(b.method)),
                Obj::Upvalue(_) => "<upvalue>".to_string(),
            },
        }
    }

    // --- upvalues ---

    fn capture_upvalue(&mut self, stack_slot: usize) -> ObjRef {
        let mut insert_at = self.open_upvalues.len();
        for (i, &uv_ref) in self.open_upvalues.iter().enumerate() {
            let slot = match self.heap.get(uv_ref) {
                Obj::Upvalue(u) => match u.state {
                    UpvalueState::Open(s) => s,
                    UpvalueState::Closed(_) => unreachable!(),
                },
                _ => unreachable!(),
            };
            if slot == stack_slot {
                return uv_ref;
            }
            if slot < stack_slot {
                insert_at = i;
                break;
            }
        }
        let r = self.alloc(Obj::Upvalue(Upvalue {
            state: UpvalueState::Open(stack_slot),
        }));
        self.open_upvalues.insert(insert_at, r);
        r
    }

    fn close_upvalues(&mut self, from_slot: usize) {
        while let Some(&top_ref) = self.open_upvalues.first() {
            let slot = match self.heap.get(top_ref) {
                Obj::Upvalue(u) => match u.state {
                    UpvalueState::Open(s) => s,
                    UpvalueState::Closed(_) => unreachable!(),
                },
                _ => unreachable!(),
            };
            if slot < from_slot {
                break;
            }
            let value = self.stack[slot];
            if let Obj::Upvalue(u) = self.heap.get_mut(top_ref) {
                u.state = UpvalueState::Closed(value);
            }
            self.open_upvalues.remove(0);
        }
    }

    // --- calls ---

    fn call_closure(&mut self, closure_ref: ObjRef, argc: u8) -> Result<(), String> {
        if self.frames.len() >= FRAMES_MAX {
            return Err("Stack overflow.".to_string());
        }
        let function_ref = match self.heap.get(closure_ref) {
            Obj::Closure(c) => c.function,
            _ => unreachable!(),
        };
        let (required, total) = match self.heap.get(function_ref) {
            Obj::Function(f) => (f.arity, f.arity + f.default_count),
            _ => unreachable!(),
        };
        if argc < required || argc > total {
            return Err(if required == total {
                format!("Expected {required} arguments but got {argc}.")
            } else {
                format!("Expected {required}..{total} arguments but got {argc}.")
            });
        }
        let base = self.stack.len() - argc as usize - 1;
        let defaults_required = total - argc;
        for _ in 0..defaults_required {
            self.push(Value::Nil);
        }
        self.frames.push(CallFrame {
            closure: closure_ref,
            ip: 0,
            base,
            defaults_required,
        });
        Ok(())
    }

    fn bind_method(&mut self, class_ref: ObjRef, name_ref: ObjRef) -> Result<ObjRef, String> {
        let hash = self.heap.string_hash(name_ref);
        let method = match self.heap.get(class_ref) {
            Obj::Class(c) => c.methods.get(hash, name_ref),
            _ => unreachable!(),
        };
        match method {
            Some(Value::Obj(closure_ref)) => {
                let receiver = self.peek(0);
                let bound = self.alloc(Obj::BoundMethod(BoundMethod {
                    receiver,
                    method: closure_ref,
                }));
                Ok(bound)
            }
            _ => Err(format!("Undefined property '{}'.", self.heap.as_string(name_ref))),
        }
    }

    fn call_value(&mut self, argc: u8) -> Result<(), String> {
        let callee = self.peek(argc as usize);
        match callee {
            Value::Obj(r) => match self.heap.get(r) {
                Obj::Closure(_) => self.call_closure(r, argc),
                Obj::Class(_) => {
                    let base = self.stack.len() - argc as usize - 1;
                    let instance = self.alloc(Obj::Instance(Instance::new(r)));
                    self.stack[base] = Value::Obj(instance);
                    let init = self.heap.string_hash(self.init_string);
                    let method = match self.heap.get(r) {
                        Obj::Class(c) => c.methods.get(init, self.init_string),
                        _ => unreachable!(),
                    };
                    match method {
                        Some(Value::Obj(closure_ref)) => self.call_closure(closure_ref, argc),
                        _ => {
                            if argc != 0 {
                                Err(format!("Expected 0 arguments but got {argc}."))
                            } else {
                                Ok(())
                            }
                        }
                    }
                }
                Obj::BoundMethod(bm) => {
                    let receiver = bm.receiver;
                    let method = bm.method;
                    let base = self.stack.len() - argc as usize - 1;
                    self.stack[base] = receiver;
                    self.call_closure(method, argc)
                }
                _ => Err("Can only call functions and classes.".to_string()),
            },
            _ => Err("Can only call functions and classes.".to_string()),
        }
    }

    fn close_over(&mut self, function_ref: ObjRef) -> ObjRef {
        let upvalue_count = match self.heap.get(function_ref) {
            Obj::Function(f) => f.upvalue_count,
            _ => unreachable!(),
        };
        let mut upvalues = Vec::with_capacity(upvalue_count as usize);
        for _ in 0..upvalue_count {
            let is_local = self.read_byte() != 0;
            let index = self.read_byte();
            let upvalue_ref = if is_local {
                let slot = self.frame().base + index as usize;
                self.capture_upvalue(slot)
            } else {
                match self.heap.get(self.closure_ref()) {
                    Obj::Closure(c) => c.upvalues[index as usize],
                    _ => unreachable!(),
                }
            };
            upvalues.push(upvalue_ref);
        }
        self.alloc(Obj::Closure(Closure {
            function: function_ref,
            upvalues,
        }))
    }

    // --- main loop ---

    fn run(&mut self) -> InterpretResult {
        loop {
            let byte = self.read_byte();
            let op = match OpCode::try_from(byte) {
                Ok(op) => op,
                Err(_) => {
                    self.runtime_error("Unknown opcode.");
                    return InterpretResult::RuntimeError;
                }
            };
            match self.step(op) {
                Ok(StepResult::Continue) => {}
                Ok(StepResult::Done) => return InterpretResult::Ok,
                Err(message) => {
                    self.runtime_error(&message);
                    return InterpretResult::RuntimeError;
                }
            }
        }
    }

    fn step(&mut self, op: OpCode) -> Result<StepResult, String> {
        match op {
            OpCode::Constant => {
                let v = self.read_constant();
                self.push(v);
            }
            OpCode::Nil => self.push(Value::Nil),
            OpCode::True => self.push(Value::Bool(true)),
            OpCode::False => self.push(Value::Bool(false)),
            OpCode::Pop => {
                self.pop();
            }
            OpCode::Equal => {
                let b = self.pop();
                let a = self.pop();
                self.push(Value::Bool(a == b));
            }
            OpCode::Greater => self.numeric_compare(|a, b| a > b)?,
            OpCode::Less => self.numeric_compare(|a, b| a < b)?,
            OpCode::Add => self.add()?,
            OpCode::Subtract => self.numeric_binary(|a, b| a - b)?,
            OpCode::Multiply => self.numeric_binary(|a, b| a * b)?,
            OpCode::Divide => self.numeric_binary(|a, b| a / b)?,
            OpCode::Mod => self.modulo()?,
            OpCode::Not => {
                let v = self.pop();
                self.push(Value::Bool(self.is_falsy(v)));
            }
            OpCode::Negate => {
                let v = self.pop();
                match v.as_number() {
                    Some(n) => self.push(Value::Number(-n)),
                    None => return Err("Operand must be a number.".to_string()),
                }
            }
            OpCode::Print => {
                let v = self.pop();
                let text = self.format_value(v);
                let _ = writeln!(self.out, "{text}");
            }
            OpCode::DefineGlobal => {
                let name = self.read_constant().as_obj().expect("name constant");
                let hash = self.heap.string_hash(name);
                let value = self.pop();
                self.globals.set(hash, name, value);
            }
            OpCode::GetGlobal => {
                let name = self.read_constant().as_obj().expect("name constant");
                let hash = self.heap.string_hash(name);
                match self.globals.get(hash, name) {
                    Some(v) => self.push(v),
                    None => return Err(format!("Undefined variable '{}'.", self.heap.as_string(name))),
                }
            }
            OpCode::SetGlobal => {
                let name = self.read_constant().as_obj().expect("name constant");
                let hash = self.heap.string_hash(name);
                let value = self.peek(0);
                if self.globals.set(hash, name, value) {
                    self.globals.delete(hash, name);
                    return Err(format!("Undefined variable '{}'.", self.heap.as_string(name)));
                }
            }
            OpCode::GetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.frame().base;
                self.push(self.stack[base + slot]);
            }
            OpCode::SetLocal => {
                let slot = self.read_byte() as usize;
                let base = self.frame().base;
                self.stack[base + slot] = self.peek(0);
            }
            OpCode::GetUpvalue => {
                let slot = self.read_byte() as usize;
                let uv_ref = match self.heap.get(self.closure_ref()) {
                    Obj::Closure(c) => c.upvalues[slot],
                    _ => unreachable!(),
                };
                let value = match self.heap.get(uv_ref) {
                    Obj::Upvalue(u) => match u.state {
                        UpvalueState::Open(s) => self.stack[s],
                        UpvalueState::Closed(v) => v,
                    },
                    _ => unreachable!(),
                };
                self.push(value);
            }
            OpCode::SetUpvalue => {
                let slot = self.read_byte() as usize;
                let value = self.peek(0);
                let uv_ref = match self.heap.get(self.closure_ref()) {
                    Obj::Closure(c) => c.upvalues[slot],
                    _ => unreachable!(),
                };
                let target_slot = match self.heap.get(uv_ref) {
                    Obj::Upvalue(u) => match u.state {
                        UpvalueState::Open(s) => Some(s),
                        UpvalueState::Closed(_) => None,
                    },
                    _ => unreachable!(),
                };
                match target_slot {
                    Some(s) => self.stack[s] = value,
                    None => {
                        if let Obj::Upvalue(u) = self.heap.get_mut(uv_ref) {
                            u.state = UpvalueState::Closed(value);
                        }
                    }
                }
            }
            OpCode::CloseUpvalue => {
                let top = self.stack.len() - 1;
                self.close_upvalues(top);
                self.pop();
            }
            OpCode::Jump => {
                let offset = self.read_u16();
                self.frames.last_mut().unwrap().ip += offset as usize;
            }
            OpCode::JumpIfFalse => {
                let offset = self.read_u16();
                if self.is_falsy(self.peek(0)) {
                    self.frames.last_mut().unwrap().ip += offset as usize;
                }
            }
            OpCode::Loop => {
                let offset = self.read_u16();
                self.frames.last_mut().unwrap().ip -= offset as usize;
            }
            OpCode::Call => {
                let argc = self.read_byte();
                self.call_value(argc)?;
            }
            OpCode::Closure => {
                let function_ref = self.read_constant().as_obj().expect("function constant");
                let closure_ref = self.close_over(function_ref);
                self.push(Value::Obj(closure_ref));
            }
            OpCode::Return => {
                let result = self.pop();
                let base = self.frame().base;
                self.close_upvalues(base);
                self.frames.pop();
                if self.frames.is_empty() {
                    self.stack.clear();
                    return Ok(StepResult::Done);
                }
                self.stack.truncate(base);
                self.push(result);
            }
            OpCode::Class => {
                let name = self.read_constant().as_obj().expect("class name constant");
                let class_ref = self.alloc(Obj::Class(Class::new(name)));
                self.push(Value::Obj(class_ref));
            }
            OpCode::GetProperty => {
                let name = self.read_constant().as_obj().expect("property name constant");
                let instance_ref = match self.peek(0) {
                    Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                    _ => return Err("Only instances have properties.".to_string()),
                };
                let hash = self.heap.string_hash(name);
                let field = match self.heap.get(instance_ref) {
                    Obj::Instance(i) => i.fields.get(hash, name),
                    _ => unreachable!(),
                };
                match field {
                    Some(v) => {
                        self.pop();
                        self.push(v);
                    }
                    None => {
                        let class_ref = match self.heap.get(instance_ref) {
                            Obj::Instance(i) => i.class,
                            _ => unreachable!(),
                        };
                        let bound = self.bind_method(class_ref, name)?;
                        self.pop();
                        self.push(Value::Obj(bound));
                    }
                }
            }
            OpCode::SetProperty => {
                let name = self.read_constant().as_obj().expect("property name constant");
                let instance_ref = match self.peek(1) {
                    Value::Obj(r) if matches!(self.heap.get(r), Obj::Instance(_)) => r,
                    _ => return Err("Only instances have fields.".to_string()),
                };
                let value = self.pop();
                self.pop();
                let hash = self.heap.string_hash(name);
                if let Obj::Instance(i) = self.heap.get_mut(instance_ref) {
                    i.fields.set(hash, name, value);
                }
                self.push(value);
            }
            OpCode::Method => {
                let name = self.read_constant().as_obj().expect("method name constant");
                let method = self.pop();
                let class_ref = self.peek(0).as_obj().expect("class value");
                let hash = self.heap.string_hash(name);
                if let Obj::Class(c) = self.heap.get_mut(class_ref) {
                    c.methods.set(hash, name, method);
                }
            }
            OpCode::SetDefault => {
                let slot = self.read_byte() as usize;
                let value = self.pop();
                let function_ref = self.function_ref();
                let total = match self.heap.get(function_ref) {
                    Obj::Function(f) => (f.arity + f.default_count) as usize,
                    _ => unreachable!(),
                };
                let defaults_required = self.frame().defaults_required as usize;
                let explicit_argc = total - defaults_required;
                if slot > explicit_argc {
                    let base = self.frame().base;
                    self.stack[base + slot] = value;
                }
            }
        }
        Ok(StepResult::Continue)
    }

    fn numeric_binary(&mut self, f: impl Fn(f64, f64) -> f64) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(Value::Number(f(a, b)));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn modulo(&mut self) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                let divisor = b.trunc() as i64;
                if divisor == 0 {
                    return Err("Operands must be numbers.".to_string());
                }
                self.push(Value::Number((a.trunc() as i64 % divisor) as f64));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn numeric_compare(&mut self, f: impl Fn(f64, f64) -> bool) -> Result<(), String> {
        let b = self.pop();
        let a = self.pop();
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.push(Value::Bool(f(a, b)));
                Ok(())
            }
            _ => Err("Operands must be numbers.".to_string()),
        }
    }

    fn add(&mut self) -> Result<(), String> {
        let b = self.peek(0);
        let a = self.peek(1);
        match (a.as_number(), b.as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(Value::Number(a + b));
                Ok(())
            }
            _ => {
                let a_is_str = matches!(a, Value::Obj(r) if matches!(self.heap.get(r), Obj::String(_)));
                let b_is_str = matches!(b, Value::Obj(r) if matches!(self.heap.get(r), Obj::String(_)));
                if a_is_str && b_is_str {
                    let combined = format!("{}{}", self.format_value(a), self.format_value(b));
                    let r = self.intern(combined.as_bytes());
                    self.pop();
                    self.pop();
                    self.push(Value::Obj(r));
                    Ok(())
                } else {
                    Err("Operands must be two numbers or two strings.".to_string())
                }
            }
        }
    }
}

enum StepResult {
    Continue,
    Done,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_capture(src: &str) -> String {
        let mut vm = Vm::new(Vec::new());
        let result = vm.interpret(src);
        assert_eq!(result, InterpretResult::Ok, "program failed to run");
        String::from_utf8(vm.out).unwrap()
    }

    #[test]
    fn precedence() {
        assert_eq!(run_capture("print 1 + 2 * 3;"), "7\n");
    }

    #[test]
    fn for_loop_accumulation() {
        let src = "var a = 0; for(var i = 0; i < 5; i = i + 1) a = a + i; print a;";
        assert_eq!(run_capture(src), "10\n");
    }

    #[test]
    fn closure_over_mutable_upvalue_across_scope_exit() {
        let src = "fun make(){var x=1; fun inc(){x=x+1; return x;} return inc;} \
                   var f = make(); print f(); print f(); print f();";
        assert_eq!(run_capture(src), "2\n3\n4\n");
    }

    #[test]
    fn bound_method_and_init() {
        let src = "class P{init(n){this.n=n;} greet(){print this.n;}} P(\"hi\").greet();";
        assert_eq!(run_capture(src), "hi\n");
    }

    #[test]
    fn default_parameters() {
        let src = "fun f(a, b=10, c=20){print a+b+c;} f(1); f(1,2); f(1,2,3);";
        assert_eq!(run_capture(src), "31\n23\n6\n");
    }

    #[test]
    fn gc_stress_string_concatenation_survives() {
        let mut vm = Vm::new(Vec::new());
        vm.set_gc_stress(true);
        let src = r#"var s = ""; for(var i=0;i<1000;i=i+1) s = s + "x"; print s;"#;
        let result = vm.interpret(src);
        assert_eq!(result, InterpretResult::Ok);
        let out = String::from_utf8(vm.out).unwrap();
        assert_eq!(out.trim_end().len(), 1000);
    }

    #[test]
    fn undefined_global_is_runtime_error() {
        let mut vm = Vm::new(Vec::new());
        let result = vm.interpret("print undefined_name;");
        assert_eq!(result, InterpretResult::RuntimeError);
    }
}
