//! The module: owns functions, globals, and the constant pool, and manages
//! the stack of scopes used during lowering (§4.1).

use crate::common::{intern, Id, Line, Map, Set};

use super::errors::CompileError;
use super::ir::Function;
use super::types::Type;
use super::value::Value;

/// One lexical scope: names visible only within it, innermost-first lookup
/// is implemented by walking `Module::scopes` from the end.
type Scope = Map<Id, Value>;

pub struct Module {
    pub functions: Map<Id, Function>,
    pub globals: Map<Id, Value>,
    const_pool: Map<i32, Value>,
    scopes: Vec<Scope>,
    /// The current function's formal parameters, keyed by name. Consulted
    /// only when a name is not found in `scopes` — this is what makes a
    /// parameter override (§4.3) work for free: the override's shadow
    /// `Local` lives in `scopes` and is therefore found first, while reads
    /// that lexically precede the override still fall through to here.
    formals: Map<Id, Value>,
    current_function: Option<Id>,
    /// Monotonic label counter, reset to zero for every function (§4.4).
    label_counter: u32,
    /// Monotonic fresh-temporary counter, reset to zero for every function.
    /// Deliberately not wall-clock-derived (§9 design notes, open question
    /// 3): determinism is required for golden-file tests.
    temp_counter: u32,
}

impl Module {
    pub fn new() -> Self {
        Module {
            functions: Map::new(),
            globals: Map::new(),
            const_pool: Map::new(),
            scopes: Vec::new(),
            formals: Map::new(),
            current_function: None,
            label_counter: 0,
            temp_counter: 0,
        }
    }

    // -- globals & constants -------------------------------------------------

    pub fn new_global(&mut self, ty: Type, name: Id, init_zero: bool) -> Value {
        let value = Value::Global { name, ty, init_zero };
        self.globals.insert(name, value.clone());
        value
    }

    /// Intern an integer constant, deduplicating by value within the module.
    pub fn new_const(&mut self, v: i32) -> Value {
        self.const_pool
            .entry(v)
            .or_insert(Value::Constant(v))
            .clone()
    }

    // -- functions ------------------------------------------------------------

    pub fn find_function(&self, name: Id) -> Option<&Function> {
        self.functions.get(&name)
    }

    /// Begin lowering a new function: checks for redefinition, resets all
    /// per-function lowering state, and makes `name` current. Exactly one
    /// function is current at a time; nested function definitions are
    /// forbidden by construction (there is no way to call this again
    /// before `finish_function`).
    pub fn begin_function(
        &mut self,
        name: Id,
        ret_type: Type,
        param_specs: &[(Id, Type)],
        line: Line,
    ) -> Result<(), CompileError> {
        if self.current_function.is_some() {
            return Err(CompileError::Internal(format!(
                "begin_function('{name}') called while '{}' is still current",
                self.current_function.unwrap()
            )));
        }
        if self.functions.contains_key(&name) {
            return Err(CompileError::Redefinition { name, line });
        }

        self.label_counter = 0;
        self.temp_counter = 0;
        self.scopes = vec![Scope::new()];
        let params: Vec<Value> = param_specs
            .iter()
            .enumerate()
            .map(|(position, (pname, ty))| Value::FormalParam {
                name: *pname,
                ty: ty.clone(),
                position: position as u32,
            })
            .collect();
        self.formals = params
            .iter()
            .map(|p| (p.name().expect("FormalParam always has a name"), p.clone()))
            .collect();

        let entry_label = self.fresh_label();
        let exit_label = self.fresh_label();

        // Register the function (with no return slot yet) before calling
        // `new_local` below, which needs `current_function` to resolve.
        self.functions.insert(
            name,
            Function::new(name, ret_type.clone(), params, entry_label, exit_label, None),
        );
        self.current_function = Some(name);

        if ret_type != Type::Void {
            let slot = self.new_local(ret_type, Some(intern("ret")));
            self.current_function_mut().return_slot = Some(slot);
        }
        Ok(())
    }

    pub fn finish_function(&mut self) {
        self.current_function = None;
        self.scopes.clear();
        self.formals.clear();
    }

    pub fn current_function_name(&self) -> Option<Id> {
        self.current_function
    }

    pub fn current_function_mut(&mut self) -> &mut Function {
        let name = self.current_function.expect("no function is currently being lowered");
        self.functions.get_mut(&name).expect("current function vanished")
    }

    pub fn current_function_ref(&self) -> &Function {
        let name = self.current_function.expect("no function is currently being lowered");
        self.functions.get(&name).expect("current function vanished")
    }

    // -- scopes -----------------------------------------------------------------

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    pub fn leave_scope(&mut self) {
        self.scopes.pop();
        assert!(!self.scopes.is_empty(), "popped the function-level scope");
    }

    /// Create a local in the current scope. If `name` is given and already
    /// used by *any* local this function has created so far — not just one
    /// visible in the current scope — the binding is mangled so it does not
    /// collide; `None` synthesizes a fresh compiler-chosen temporary name
    /// instead.
    ///
    /// Checking only the current scope is not enough: two sibling, non-
    /// nested scopes (e.g. the `then` and `else` bodies of an `if`/`else`)
    /// are never simultaneously live on `self.scopes`, so a same-named local
    /// declared in each would keep its unmangled name in both — violating
    /// the "a local variable's name is unique within its function across all
    /// scopes" invariant (spec.md §3) and making `back::emitter::FrameLayout`
    /// silently reuse one frame slot for two unrelated, possibly
    /// differently-sized locals.
    pub fn new_local(&mut self, ty: Type, name: Option<Id>) -> Value {
        let base = name.unwrap_or_else(|| self.fresh_temp_name());
        let scope_depth = self.scopes.len() as u32;
        let chosen = self.mangle_for_function(base);
        let value = Value::Local {
            name: chosen,
            ty: ty.clone(),
            scope_depth,
        };
        self.scopes
            .last_mut()
            .expect("no active scope")
            .insert(chosen, value.clone());
        self.current_function_mut().record_local(chosen, ty);
        value
    }

    /// Create the shadow local that models a parameter override (§4.3):
    /// the formal parameter `name` is about to be assigned to for the
    /// first time, so a same-named `Local` is introduced in the current
    /// scope, taking priority over the `FormalParam` binding in all
    /// lookups from this point on.
    pub fn override_param(&mut self, name: Id) -> Value {
        let ty = match self.formals.get(&name) {
            Some(Value::FormalParam { ty, .. }) => ty.clone(),
            _ => panic!("override_param called for a non-parameter name '{name}'"),
        };
        let scope_depth = self.scopes.len() as u32;
        let value = Value::Local {
            name,
            ty: ty.clone(),
            scope_depth,
        };
        self.scopes
            .last_mut()
            .expect("no active scope")
            .insert(name, value.clone());
        self.current_function_mut().record_local(name, ty);
        value
    }

    /// Is `name` a formal parameter with no shadow local yet (i.e. would a
    /// read of it right now resolve to the `FormalParam`, not an override)?
    pub fn is_unshadowed_param(&self, name: Id) -> bool {
        self.formals.contains_key(&name) && !self.scopes.iter().any(|s| s.contains_key(&name))
    }

    /// Resolve a name: scopes innermost-first, then formal parameters, then
    /// globals.
    pub fn find_value(&self, name: Id) -> Option<Value> {
        for scope in self.scopes.iter().rev() {
            if let Some(v) = scope.get(&name) {
                return Some(v.clone());
            }
        }
        if let Some(v) = self.formals.get(&name) {
            return Some(v.clone());
        }
        self.globals.get(&name).cloned()
    }

    // -- naming -------------------------------------------------------------

    pub fn fresh_label(&mut self) -> Id {
        self.label_counter += 1;
        intern(format!("L{}", self.label_counter))
    }

    fn fresh_temp_name(&mut self) -> Id {
        self.temp_counter += 1;
        intern(format!("t{}", self.temp_counter))
    }

    /// Whether any local created so far *anywhere* in the current function
    /// already uses `name` — the full set `Function::locals` has recorded,
    /// not merely the scopes currently on the stack.
    fn name_used_in_function(&self, name: Id) -> bool {
        self.current_function_ref().locals.iter().any(|(n, _)| *n == name)
    }

    fn mangle_for_function(&self, base: Id) -> Id {
        if !self.name_used_in_function(base) {
            return base;
        }
        let mut n = 2;
        loop {
            let candidate = intern(format!("{base}.{n}"));
            if !self.name_used_in_function(candidate) {
                return candidate;
            }
            n += 1;
        }
    }

    // -- invariant checking ---------------------------------------------------

    /// Run the label-uniqueness and branch-closure checks (§8) over every
    /// retained function. Discarded (errored) functions are simply absent
    /// from `self.functions` and are not checked.
    pub fn check_all_label_invariants(&self) -> Result<(), String> {
        for f in self.functions.values() {
            f.check_label_invariants()?;
        }
        Ok(())
    }
}

impl Default for Module {
    fn default() -> Self {
        Module::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redefinition_is_rejected() {
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
        m.finish_function();
        let err = m.begin_function(intern("f"), Type::Void, &[], 2).unwrap_err();
        assert!(matches!(err, CompileError::Redefinition { .. }));
    }

    #[test]
    fn shadowing_in_nested_scope_is_mangled() {
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
        let outer = m.new_local(Type::Int32, Some(intern("x")));
        m.enter_scope();
        let inner = m.new_local(Type::Int32, Some(intern("x")));
        assert_ne!(outer.name(), inner.name());
        m.leave_scope();
        assert_eq!(m.find_value(intern("x")).unwrap().name(), outer.name());
    }

    #[test]
    fn sibling_scopes_never_simultaneously_live_still_mangle_same_name() {
        // Mirrors the `then`/`else` bodies of an `if`/`else`: neither scope
        // is on the stack while the other is being lowered, so a
        // current-scope-only check would let both locals keep the name `x`.
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Void, &[], 1).unwrap();
        m.enter_scope();
        let first = m.new_local(Type::Int32, Some(intern("x")));
        m.leave_scope();
        m.enter_scope();
        let second = m.new_local(Type::array(Type::Int32, 100), Some(intern("x")));
        m.leave_scope();
        assert_ne!(first.name(), second.name());
    }

    #[test]
    fn param_is_visible_until_overridden() {
        let mut m = Module::new();
        m.begin_function(intern("f"), Type::Int32, &[(intern("x"), Type::Int32)], 1)
            .unwrap();
        assert!(matches!(
            m.find_value(intern("x")),
            Some(Value::FormalParam { .. })
        ));
        assert!(m.is_unshadowed_param(intern("x")));
        m.override_param(intern("x"));
        assert!(matches!(m.find_value(intern("x")), Some(Value::Local { .. })));
        assert!(!m.is_unshadowed_param(intern("x")));
    }

    #[test]
    fn constants_are_deduplicated() {
        let mut m = Module::new();
        let a = m.new_const(42);
        let b = m.new_const(42);
        assert_eq!(a, b);
    }
}
