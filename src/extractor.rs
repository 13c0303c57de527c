//! The Declaration Extractor (spec §4.2): scans one parsed source file and
//! populates a [`TransformContext`]'s [`Declarations`](crate::context::Declarations)
//! before the transformer dispatcher runs.

use crate::ast_view::{SourceAst, SourceExpr};
use crate::context::{LocalComponent, RuntimeFunctionWrapper, TransformContext};
use crate::error::CompileError;

const SOURCE_HELPERS: [&str; 4] = ["file", "bash", "value", "env"];

/// Dialect of one source file (spec §4.1 "Dialect detection").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Markdown-only output; no companion runtime bundle.
    Static,
    /// Markdown + companion runtime bundle, control flow permitted.
    Runtime,
}

/// Detects dialect: runtime iff the file references `useRuntimeVar` or
/// `runtimeFn`, or imports a module whose specifier ends `/v3`.
pub fn detect_dialect(ast: &SourceAst) -> Dialect {
    let has_runtime_marker = ast
        .const_bindings
        .iter()
        .any(|(_, expr)| matches!(expr, SourceExpr::Call { callee, .. } if callee_is(callee, "useRuntimeVar") || callee_is(callee, "runtimeFn")));
    let has_v3_import = ast.import_specifiers.iter().any(|s| s.ends_with("/v3"));
    if has_runtime_marker || has_v3_import {
        Dialect::Runtime
    } else {
        Dialect::Static
    }
}

fn callee_is(callee: &[String], name: &str) -> bool {
    callee.last().map(|s| s.as_str()) == Some(name)
}

/// Scans `ast` and records its declarations into `ctx`. Does not transform
/// the document body — that is the transformer dispatcher's job.
pub fn extract_declarations(ast: &SourceAst, ctx: &mut TransformContext) -> Result<(), CompileError> {
    for (ident, expr) in &ast.const_bindings {
        extract_binding(ident, expr, ctx)?;
    }

    for (ident, jsx, line) in &ast.functions_returning_jsx {
        if ctx.declarations.local_components.contains_key(ident) {
            return Err(ctx.errors.resolution(
                *line,
                ident.clone(),
                "duplicate declaration of local component",
            ));
        }
        ctx.declarations.local_components.insert(
            ident.clone(),
            LocalComponent {
                declared_at_line: *line,
                body: jsx.clone(),
            },
        );
    }

    Ok(())
}

fn reject_duplicate(ctx: &TransformContext, ident: &str) -> Result<(), CompileError> {
    let already_declared = ctx.declarations.variables.contains_key(ident)
        || ctx.declarations.runtime_variables.contains_key(ident)
        || ctx.declarations.runtime_functions.contains_key(ident)
        || ctx.declarations.local_components.contains_key(ident)
        || ctx.declarations.source_helpers.contains(ident);
    if already_declared {
        return Err(ctx.errors.resolution(
            0,
            ident.to_string(),
            "duplicate identifier registration",
        ));
    }
    Ok(())
}

fn extract_binding(
    ident: &str,
    expr: &SourceExpr,
    ctx: &mut TransformContext,
) -> Result<(), CompileError> {
    let SourceExpr::Call { callee, args } = expr else {
        return Ok(());
    };

    if callee_is(callee, "useVariable") {
        reject_duplicate(ctx, ident)?;
        let name = first_string_arg(args).ok_or_else(|| {
            ctx.errors
                .transform(0, "useVariable", "expected a string literal NAME argument")
        })?;
        ctx.declarations.variables.insert(ident.to_string(), name);
        return Ok(());
    }

    if callee_is(callee, "useRuntimeVar") {
        reject_duplicate(ctx, ident)?;
        let name = first_string_arg(args).ok_or_else(|| {
            ctx.errors
                .transform(0, "useRuntimeVar", "expected a string literal NAME argument")
        })?;
        // The `<T>` type parameter isn't visible on a value-position call
        // expression; it is captured as `None` here and may be refined once
        // the transformer has type-argument access. See DESIGN.md.
        ctx.declarations
            .runtime_variables
            .insert(ident.to_string(), (name, None));
        return Ok(());
    }

    if callee_is(callee, "runtimeFn") {
        reject_duplicate(ctx, ident)?;
        let callable_name = args
            .first()
            .and_then(|a| match a {
                SourceExpr::Ident(chain) => chain.last().cloned(),
                _ => None,
            })
            .ok_or_else(|| {
                ctx.errors
                    .transform(0, "runtimeFn", "expected a function identifier argument")
            })?;
        ctx.declarations
            .runtime_functions
            .insert(ident.to_string(), RuntimeFunctionWrapper { callable_name });
        return Ok(());
    }

    if SOURCE_HELPERS.contains(&callee.last().map(|s| s.as_str()).unwrap_or_default()) {
        ctx.declarations.source_helpers.insert(ident.to_string());
    }

    Ok(())
}

fn first_string_arg(args: &[SourceExpr]) -> Option<String> {
    match args.first()? {
        SourceExpr::Str(s) => Some(s.clone()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> TransformContext {
        TransformContext::new(PathBuf::from("test.tsx"), "test".into())
    }

    fn call(name: &str, args: Vec<SourceExpr>) -> SourceExpr {
        SourceExpr::Call {
            callee: vec![name.to_string()],
            args,
        }
    }

    #[test]
    fn registers_declared_variable() {
        let mut c = ctx();
        let expr = call("useVariable", vec![SourceExpr::Str("STATE".into())]);
        extract_binding("state", &expr, &mut c).unwrap();
        assert_eq!(c.declarations.variables.get("state"), Some(&"STATE".to_string()));
    }

    #[test]
    fn registers_runtime_variable() {
        let mut c = ctx();
        let expr = call("useRuntimeVar", vec![SourceExpr::Str("CTX".into())]);
        extract_binding("ctx", &expr, &mut c).unwrap();
        assert_eq!(
            c.declarations.runtime_variables.get("ctx"),
            Some(&("CTX".to_string(), None))
        );
    }

    #[test]
    fn registers_runtime_function_wrapper() {
        let mut c = ctx();
        let expr = call("runtimeFn", vec![SourceExpr::Ident(vec!["init".into()])]);
        extract_binding("Init", &expr, &mut c).unwrap();
        assert_eq!(
            c.declarations.runtime_functions.get("Init").map(|w| w.callable_name.clone()),
            Some("init".to_string())
        );
    }

    #[test]
    fn rejects_duplicate_registration() {
        let mut c = ctx();
        let expr = call("useVariable", vec![SourceExpr::Str("STATE".into())]);
        extract_binding("state", &expr, &mut c).unwrap();
        assert!(extract_binding("state", &expr, &mut c).is_err());
    }

    #[test]
    fn dialect_detects_runtime_marker() {
        let ast = SourceAst {
            text: String::new(),
            const_bindings: vec![(
                "ctx".into(),
                call("useRuntimeVar", vec![SourceExpr::Str("CTX".into())]),
            )],
            functions_returning_jsx: Vec::new(),
            import_specifiers: Vec::new(),
            referenced_identifiers: Vec::new(),
            default_export: None,
        };
        assert_eq!(detect_dialect(&ast), Dialect::Runtime);
    }

    #[test]
    fn dialect_defaults_to_static() {
        let ast = SourceAst {
            text: String::new(),
            const_bindings: Vec::new(),
            functions_returning_jsx: Vec::new(),
            import_specifiers: Vec::new(),
            referenced_identifiers: Vec::new(),
            default_export: None,
        };
        assert_eq!(detect_dialect(&ast), Dialect::Static);
    }

    #[test]
    fn dialect_detects_v3_import() {
        let ast = SourceAst {
            text: String::new(),
            const_bindings: Vec::new(),
            functions_returning_jsx: Vec::new(),
            import_specifiers: vec!["dinja/v3".into()],
            referenced_identifiers: Vec::new(),
            default_export: None,
        };
        assert_eq!(detect_dialect(&ast), Dialect::Runtime);
    }
}
