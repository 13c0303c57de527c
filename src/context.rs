//! The Transform Context: mutable state threaded explicitly through
//! transformation (spec §3.3, §9 "Context threading").
//!
//! This is deliberately *not* global state. It is constructed fresh per
//! source file (spec §3.8) and passed by reference to every subtransformer.
//! Its two mutable slots — `visited_paths` and `component_expansion_stack`
//! — are pushed and popped with RAII guards so they are restored on every
//! exit path, including early returns via `?`.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use crate::ast_view::SourceNode;
use crate::error::ErrorFactory;

/// One registered local component: its identifier, declaration span (line),
/// and its declared JSX body — the tree that gets inlined at each usage
/// site (spec §4.4).
#[derive(Debug, Clone)]
pub struct LocalComponent {
    /// Source line the component function was declared on.
    pub declared_at_line: u32,
    /// The component function's returned JSX tree.
    pub body: SourceNode,
}

/// One registered runtime-function wrapper: `const F = runtimeFn(fn)`.
#[derive(Debug, Clone)]
pub struct RuntimeFunctionWrapper {
    /// The callable's own identifier — the name emitted in `ns_fn` calls.
    pub callable_name: String,
}

/// Declarations gathered by the extractor (spec §4.2), queried by the
/// transformer and emitters.
#[derive(Debug, Clone, Default)]
pub struct Declarations {
    /// `const v = useVariable('NAME')` bindings: source identifier -> shell
    /// variable name.
    pub variables: HashMap<String, String>,
    /// `const v = useRuntimeVar<T>('NAME')` bindings: source identifier ->
    /// (shell variable name, opaque type string).
    pub runtime_variables: HashMap<String, (String, Option<String>)>,
    /// `const F = runtimeFn(fn)` bindings: wrapper identifier -> callable.
    pub runtime_functions: HashMap<String, RuntimeFunctionWrapper>,
    /// Local component function declarations, by identifier.
    pub local_components: HashMap<String, LocalComponent>,
    /// Identifiers recognized as source-helper calls (`file`, `bash`,
    /// `value`, `env`) — recorded so duplicate-registration and shadowing
    /// can be detected, even though their behavior is fixed by name.
    pub source_helpers: HashSet<String>,
}

/// RAII guard that pops a pushed entry from a `Vec` on drop, regardless of
/// how the enclosing scope exits (including via `?`). This is how
/// `component_expansion_stack` and `visited_paths` guarantee restoration on
/// unwind, per spec §9.
pub struct StackGuard<'a, T> {
    stack: &'a mut Vec<T>,
}

impl<'a, T> Drop for StackGuard<'a, T> {
    fn drop(&mut self) {
        self.stack.pop();
    }
}

/// The Transform Context (spec §3.3).
#[derive(Debug, Clone)]
pub struct TransformContext {
    /// The file currently being compiled.
    pub current_file: PathBuf,
    /// Namespace derived from the basename (spec GLOSSARY).
    pub namespace: String,
    /// Paths visited while resolving local-component imports across module
    /// boundaries; mutated and restored during recursive traversal.
    pub visited_paths: Vec<PathBuf>,
    /// Identifiers of components currently being expanded, used as a cycle
    /// detector (spec §4.4).
    pub component_expansion_stack: Vec<String>,
    /// Declarations gathered by the extractor.
    pub declarations: Declarations,
    /// Props available to the component currently being expanded (runtime
    /// dialect only).
    pub component_props: HashMap<String, String>,
    /// Error constructor bound to `current_file`.
    pub errors: ErrorFactory,
}

impl TransformContext {
    /// Constructs a fresh context for one source file.
    pub fn new(file: PathBuf, namespace: String) -> Self {
        let errors = ErrorFactory::new(file.clone());
        TransformContext {
            current_file: file,
            namespace,
            visited_paths: Vec::new(),
            component_expansion_stack: Vec::new(),
            declarations: Declarations::default(),
            component_props: HashMap::new(),
            errors,
        }
    }

    /// A context suitable only for unit tests that don't need a real file.
    #[cfg(test)]
    pub fn new_for_test() -> Self {
        Self::new(PathBuf::from("test.tsx"), "test".into())
    }

    /// Resolves a source identifier (e.g. `ctx` in `ctx.error`) to its
    /// emitted shell-variable name, checking runtime variables first, then
    /// plain shell variables. Returns `None` for unknown roots.
    pub fn resolve_script_var(&self, ident: &str) -> Option<String> {
        if let Some((var_name, _)) = self.declarations.runtime_variables.get(ident) {
            return Some(var_name.clone());
        }
        self.declarations.variables.get(ident).cloned()
    }

    /// Declares a shell variable for tests and small call sites that don't
    /// go through the full extractor.
    #[cfg(test)]
    pub fn declare_script_var(&mut self, ident: &str, var_name: &str) {
        self.declarations
            .runtime_variables
            .insert(ident.to_string(), (var_name.to_string(), None));
    }

    /// Pushes a component identifier onto the expansion stack, returning an
    /// error if it is already present (a cycle). On success, returns a
    /// guard that pops the entry when dropped.
    pub fn enter_component_expansion(
        &mut self,
        identifier: &str,
        line: u32,
    ) -> Result<StackGuard<'_, String>, crate::error::CompileError> {
        if self.component_expansion_stack.iter().any(|s| s == identifier) {
            let mut cycle = self.component_expansion_stack.clone();
            cycle.push(identifier.to_string());
            return Err(self.errors.resolution(
                line,
                identifier,
                format!("component expansion cycle detected: {}", cycle.join(" -> ")),
            ));
        }
        self.component_expansion_stack.push(identifier.to_string());
        Ok(StackGuard {
            stack: &mut self.component_expansion_stack,
        })
    }

    /// Marks a path as visited for the duration of the returned guard.
    pub fn enter_visited_path(&mut self, path: PathBuf) -> StackGuard<'_, PathBuf> {
        self.visited_paths.push(path);
        StackGuard {
            stack: &mut self.visited_paths,
        }
    }

    /// True if `path` is already on the visited stack (used to short-circuit
    /// redundant module-boundary re-resolution, not cycle detection itself
    /// — that is `component_expansion_stack`'s job).
    pub fn has_visited(&self, path: &Path) -> bool {
        self.visited_paths.iter().any(|p| p == path)
    }
}

/// Derives the namespace for a source file from its basename: kebab- or
/// snake-case to camelCase (spec GLOSSARY).
pub fn namespace_from_basename(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut result = String::with_capacity(stem.len());
    let mut capitalize_next = false;
    for ch in stem.chars() {
        if ch == '-' || ch == '_' {
            capitalize_next = true;
            continue;
        }
        if capitalize_next {
            result.extend(ch.to_uppercase());
            capitalize_next = false;
        } else {
            result.push(ch);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn namespace_converts_kebab_case() {
        assert_eq!(namespace_from_basename(Path::new("plan-phase.tsx")), "planPhase");
    }

    #[test]
    fn namespace_converts_snake_case() {
        assert_eq!(namespace_from_basename(Path::new("plan_phase.tsx")), "planPhase");
    }

    #[test]
    fn namespace_passes_through_simple_name() {
        assert_eq!(namespace_from_basename(Path::new("init.tsx")), "init");
    }

    #[test]
    fn expansion_cycle_is_detected() {
        let mut ctx = TransformContext::new_for_test();
        let _guard = ctx.enter_component_expansion("Card", 1).unwrap();
        assert!(ctx.enter_component_expansion("Card", 2).is_err());
    }

    #[test]
    fn expansion_stack_pops_on_guard_drop() {
        let mut ctx = TransformContext::new_for_test();
        {
            let _guard = ctx.enter_component_expansion("Card", 1).unwrap();
            assert_eq!(ctx.component_expansion_stack.len(), 1);
        }
        assert!(ctx.component_expansion_stack.is_empty());
    }
}
