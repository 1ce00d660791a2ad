//! Heap arena and mark-and-sweep garbage collector.
//!
//! Objects live in a slot arena addressed by [`ObjRef`] handles; a free
//! list gives O(1) allocation and the sweep reclaims in a single pass.
//! Strings are interned, and the interning table is weak: entries whose
//! string dies in a collection are purged.
//!
//! The heap never collects on its own. Its owner (the VM, or the compiler
//! while compilation is in flight) checks [`Heap::should_collect`] before
//! allocating, marks its roots grey, and calls [`Heap::collect`].

use std::collections::HashMap;
use std::mem;

use crate::bytecode::value::{Class, Closure, Function, Instance, Native, Obj, ObjRef, Upvalue, Value};

/// Collection first triggers once this many bytes are live.
const INITIAL_THRESHOLD: usize = 1024 * 1024;

struct Slot {
    marked: bool,
    size: usize,
    obj: Obj,
}

/// Owner of every heap object.
pub struct Heap {
    slots: Vec<Option<Slot>>,
    free: Vec<u32>,
    strings: HashMap<String, ObjRef>,
    grey: Vec<ObjRef>,
    bytes_allocated: usize,
    next_threshold: usize,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            strings: HashMap::new(),
            grey: Vec::new(),
            bytes_allocated: 0,
            next_threshold: INITIAL_THRESHOLD,
        }
    }

    /// Whether the owner should collect before its next allocation.
    pub fn should_collect(&self) -> bool {
        #[cfg(feature = "gc-stress")]
        {
            true
        }
        #[cfg(not(feature = "gc-stress"))]
        {
            self.bytes_allocated > self.next_threshold
        }
    }

    /// Place an object in the arena and return its handle.
    pub fn alloc(&mut self, obj: Obj) -> ObjRef {
        let size = approximate_size(&obj);
        self.bytes_allocated += size;
        let slot = Slot {
            marked: false,
            size,
            obj,
        };
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(slot);
                ObjRef(index)
            }
            None => {
                self.slots.push(Some(slot));
                ObjRef((self.slots.len() - 1) as u32)
            }
        }
    }

    /// Canonical string lookup; allocates only for unseen content.
    pub fn intern(&mut self, text: &str) -> ObjRef {
        if let Some(&existing) = self.strings.get(text) {
            return existing;
        }
        let obj = self.alloc(Obj::Str(text.to_string()));
        self.strings.insert(text.to_string(), obj);
        obj
    }

    pub fn get(&self, obj: ObjRef) -> &Obj {
        &self.slot(obj).obj
    }

    pub fn get_mut(&mut self, obj: ObjRef) -> &mut Obj {
        &mut self.slot_mut(obj).obj
    }

    /// Mark a value grey. No-op for non-object values.
    pub fn mark_value(&mut self, value: Value) {
        if let Value::Obj(obj) = value {
            self.mark_object(obj);
        }
    }

    /// Mark an object grey. Idempotent.
    pub fn mark_object(&mut self, obj: ObjRef) {
        let slot = self.slot_mut(obj);
        if !slot.marked {
            slot.marked = true;
            self.grey.push(obj);
        }
    }

    /// Run a collection. Precondition: the caller has marked every root
    /// grey. Afterwards every reachable object is alive and unmarked,
    /// every unreachable object is freed, dead interned strings are
    /// purged, and the threshold doubles from the surviving size.
    pub fn collect(&mut self) {
        self.trace();

        // Purge interned strings that did not survive the trace.
        let slots = &self.slots;
        self.strings.retain(|_, obj| {
            slots[obj.0 as usize]
                .as_ref()
                .is_some_and(|slot| slot.marked)
        });

        // Sweep: one pass over the arena.
        for index in 0..self.slots.len() {
            let reclaimed = match &mut self.slots[index] {
                Some(slot) if slot.marked => {
                    slot.marked = false;
                    None
                }
                Some(slot) => Some(slot.size),
                None => None,
            };
            if let Some(size) = reclaimed {
                self.bytes_allocated -= size;
                self.slots[index] = None;
                self.free.push(index as u32);
            }
        }

        self.next_threshold = (self.bytes_allocated * 2).max(INITIAL_THRESHOLD);
    }

    /// Propagate grey markings until the grey stack drains.
    fn trace(&mut self) {
        while let Some(obj) = self.grey.pop() {
            self.blacken(obj);
        }
    }

    /// Mark every child of `obj` grey.
    ///
    /// Table keys are interned strings and the interning table is weak, so
    /// keys are traced along with values to keep identity lookups sound.
    fn blacken(&mut self, obj: ObjRef) {
        let mut values: Vec<Value> = Vec::new();
        let mut objects: Vec<ObjRef> = Vec::new();
        match self.get(obj) {
            Obj::Str(_) | Obj::Native(_) => {}
            Obj::Function(function) => values.extend_from_slice(function.chunk.constants()),
            Obj::Upvalue(Upvalue::Open(_)) => {
                // The value is on the VM stack; the root scan covers it.
            }
            Obj::Upvalue(Upvalue::Closed(value)) => values.push(*value),
            Obj::Closure(closure) => {
                objects.push(closure.function);
                objects.extend(closure.upvalues.iter().copied());
            }
            Obj::Class(class) => {
                objects.push(class.name);
                for (name, method) in &class.methods {
                    objects.push(*name);
                    objects.push(*method);
                }
            }
            Obj::Instance(instance) => {
                objects.push(instance.class);
                for (name, value) in &instance.fields {
                    objects.push(*name);
                    values.push(*value);
                }
            }
            Obj::BoundMethod(bound) => {
                objects.push(bound.receiver);
                objects.push(bound.method);
            }
        }
        for value in values {
            self.mark_value(value);
        }
        for child in objects {
            self.mark_object(child);
        }
    }

    pub fn bytes_allocated(&self) -> usize {
        self.bytes_allocated
    }

    /// Iterate the live objects, in arena order.
    pub fn objects(&self) -> impl Iterator<Item = &Obj> {
        self.slots.iter().filter_map(|slot| slot.as_ref().map(|s| &s.obj))
    }

    /// One line per live object, for debugging collector behavior.
    pub fn dump_objects(&self) -> String {
        let mut out = String::new();
        for (index, slot) in self.slots.iter().enumerate() {
            let Some(slot) = slot else { continue };
            out.push_str(&format!(
                "{:4} {} {:5}B {}\n",
                index,
                if slot.marked { "*" } else { " " },
                slot.size,
                self.object_to_string(ObjRef(index as u32)),
            ));
        }
        out
    }

    // ===== Typed accessors =====
    //
    // A handle of the wrong kind behind one of these is an internal
    // invariant violation, so they panic rather than return errors.

    pub fn is_str(&self, obj: ObjRef) -> bool {
        matches!(self.get(obj), Obj::Str(_))
    }

    pub fn is_instance(&self, obj: ObjRef) -> bool {
        matches!(self.get(obj), Obj::Instance(_))
    }

    pub fn as_str(&self, obj: ObjRef) -> &str {
        match self.get(obj) {
            Obj::Str(s) => s,
            other => panic!("expected string, found {}", type_name_of(other)),
        }
    }

    pub fn as_function(&self, obj: ObjRef) -> &Function {
        match self.get(obj) {
            Obj::Function(f) => f,
            other => panic!("expected function, found {}", type_name_of(other)),
        }
    }

    pub fn as_native(&self, obj: ObjRef) -> &Native {
        match self.get(obj) {
            Obj::Native(n) => n,
            other => panic!("expected native function, found {}", type_name_of(other)),
        }
    }

    pub fn as_closure(&self, obj: ObjRef) -> &Closure {
        match self.get(obj) {
            Obj::Closure(c) => c,
            other => panic!("expected closure, found {}", type_name_of(other)),
        }
    }

    pub fn closure_mut(&mut self, obj: ObjRef) -> &mut Closure {
        match self.get_mut(obj) {
            Obj::Closure(c) => c,
            other => panic!("expected closure, found {}", type_name_of(other)),
        }
    }

    pub fn as_upvalue(&self, obj: ObjRef) -> &Upvalue {
        match self.get(obj) {
            Obj::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", type_name_of(other)),
        }
    }

    pub fn upvalue_mut(&mut self, obj: ObjRef) -> &mut Upvalue {
        match self.get_mut(obj) {
            Obj::Upvalue(u) => u,
            other => panic!("expected upvalue, found {}", type_name_of(other)),
        }
    }

    pub fn as_class(&self, obj: ObjRef) -> &Class {
        match self.get(obj) {
            Obj::Class(c) => c,
            other => panic!("expected class, found {}", type_name_of(other)),
        }
    }

    pub fn class_mut(&mut self, obj: ObjRef) -> &mut Class {
        match self.get_mut(obj) {
            Obj::Class(c) => c,
            other => panic!("expected class, found {}", type_name_of(other)),
        }
    }

    pub fn as_instance(&self, obj: ObjRef) -> &Instance {
        match self.get(obj) {
            Obj::Instance(i) => i,
            other => panic!("expected instance, found {}", type_name_of(other)),
        }
    }

    pub fn instance_mut(&mut self, obj: ObjRef) -> &mut Instance {
        match self.get_mut(obj) {
            Obj::Instance(i) => i,
            other => panic!("expected instance, found {}", type_name_of(other)),
        }
    }

    // ===== Rendering =====

    /// Render a value the way `print` shows it. Strings render raw.
    pub fn value_to_string(&self, value: Value) -> String {
        match value {
            Value::Nil => "nil".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::Obj(obj) => self.object_to_string(obj),
        }
    }

    pub fn object_to_string(&self, obj: ObjRef) -> String {
        match self.get(obj) {
            Obj::Str(s) => s.clone(),
            Obj::Function(f) => format!("<fn {}>", function_display_name(&f.name)),
            Obj::Native(n) => format!("<native fn {}>", n.name),
            Obj::Closure(c) => {
                let function = self.as_function(c.function);
                format!("<fn {}>", function_display_name(&function.name))
            }
            Obj::Upvalue(_) => "<upvalue>".to_string(),
            Obj::Class(c) => format!("<class {}>", self.as_str(c.name)),
            Obj::Instance(i) => {
                let class = self.as_class(i.class);
                format!("<{} instance>", self.as_str(class.name))
            }
            Obj::BoundMethod(b) => {
                let method = self.as_closure(b.method);
                let function = self.as_function(method.function);
                format!("<fn {}>", function_display_name(&function.name))
            }
        }
    }

    /// Type name of a value, for error messages.
    pub fn type_name(&self, value: Value) -> &'static str {
        match value {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Number(_) => "number",
            Value::Obj(obj) => type_name_of(self.get(obj)),
        }
    }

    fn slot(&self, obj: ObjRef) -> &Slot {
        self.slots[obj.0 as usize]
            .as_ref()
            .expect("use of freed object")
    }

    fn slot_mut(&mut self, obj: ObjRef) -> &mut Slot {
        self.slots[obj.0 as usize]
            .as_mut()
            .expect("use of freed object")
    }
}

impl Default for Heap {
    fn default() -> Self {
        Self::new()
    }
}

fn function_display_name(name: &str) -> &str {
    if name.is_empty() {
        "<script>"
    } else {
        name
    }
}

fn type_name_of(obj: &Obj) -> &'static str {
    match obj {
        Obj::Str(_) => "string",
        Obj::Function(_) => "function",
        Obj::Native(_) => "native function",
        Obj::Closure(_) => "function",
        Obj::Upvalue(_) => "upvalue",
        Obj::Class(_) => "class",
        Obj::Instance(_) => "instance",
        Obj::BoundMethod(_) => "method",
    }
}

/// Rough byte cost of an object, counting the slot plus owned payload.
fn approximate_size(obj: &Obj) -> usize {
    let payload = match obj {
        Obj::Str(s) => s.len(),
        Obj::Function(f) => {
            f.name.len()
                + f.chunk.code.len()
                + f.chunk.constants().len() * mem::size_of::<Value>()
                + f.upvalues.len() * 2
        }
        Obj::Closure(c) => c.upvalues.len() * mem::size_of::<ObjRef>(),
        Obj::Class(c) => c.methods.len() * 2 * mem::size_of::<ObjRef>(),
        Obj::Instance(i) => {
            i.fields.len() * (mem::size_of::<ObjRef>() + mem::size_of::<Value>())
        }
        Obj::Native(_) | Obj::Upvalue(_) | Obj::BoundMethod(_) => 0,
    };
    mem::size_of::<Obj>() + payload
}
