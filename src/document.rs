//! Document-kind resolution (spec §3.1): determines whether a source file's
//! default-exported component is a `CommandDocument`, `AgentDocument`, or
//! `SkillDocument` from its root JSX element's tag name, and extracts the
//! header fields from that element's attributes.
//!
//! The specification leaves the exact source-level spelling of "the `kind`
//! tag" unstated (§3.1 says documents are "distinguished by a `kind` tag"
//! without naming the JSX convention that carries it). This module resolves
//! that Open Question (see DESIGN.md) by reading it off the root element's
//! tag name, the same way the dispatcher already reads every other node's
//! kind off its tag name (spec §4.3).

use crate::ast_view::{SourceElement, SourceExpr, SourceNode};
use crate::context::TransformContext;
use crate::error::CompileError;
use crate::ir::{AgentHeader, BlockNode, Document, HeaderMap, LiteralValue, SkillHeader};
use crate::transformer::transform_block_children;

/// Builds a [`Document`] from the root JSX node of a source file's exported
/// component, dispatching on the root element's tag name.
pub fn build_document(root: &SourceNode, ctx: &mut TransformContext) -> Result<Document, CompileError> {
    let SourceNode::Element(el) = root else {
        return Err(ctx.errors.validation(0, "document root must be a single JSX element"));
    };
    match el.name.as_str() {
        "CommandDocument" => build_command(el, ctx),
        "AgentDocument" => build_agent(el, ctx),
        "SkillDocument" => build_skill(el, ctx),
        other => Err(ctx.errors.validation(
            el.line,
            format!("unrecognized document root <{other}>; expected CommandDocument, AgentDocument, or SkillDocument"),
        )),
    }
}

fn build_command(el: &SourceElement, ctx: &mut TransformContext) -> Result<Document, CompileError> {
    let mut header: HeaderMap = HeaderMap::new();
    for (name, value) in &el.attributes {
        if name == "folder" {
            continue;
        }
        if let Some(expr) = value {
            if let Ok(literal) = expr_to_literal(expr) {
                header.insert(name.clone(), literal);
            }
        }
    }
    let body = transform_block_children(&el.children, ctx)?;
    Ok(Document::Command {
        header,
        declared_variables: ctx.declarations.variables.values().cloned().collect(),
        runtime_functions: ctx.declarations.runtime_functions.keys().cloned().collect(),
        body,
    })
}

fn build_agent(el: &SourceElement, ctx: &mut TransformContext) -> Result<Document, CompileError> {
    let name = string_attr(el, "name").ok_or_else(|| ctx.errors.validation(el.line, "AgentDocument requires a name"))?;
    let description = string_attr(el, "description")
        .ok_or_else(|| ctx.errors.validation(el.line, "AgentDocument requires a description"))?;
    let tools = string_list_attr(el, "tools");
    let color = string_attr(el, "color");
    let input_type = string_attr(el, "inputType");
    let output_type = string_attr(el, "outputType");
    let header = AgentHeader { name, description, tools, color, input_type, output_type };
    let body = transform_block_children(&el.children, ctx)?;
    for node in &body {
        node.assert_agent_pure()
            .map_err(|_| ctx.errors.validation(el.line, "runtime-only block variant in an AgentDocument"))?;
    }
    Ok(Document::Agent { header, body })
}

fn build_skill(el: &SourceElement, ctx: &mut TransformContext) -> Result<Document, CompileError> {
    let name = string_attr(el, "name").ok_or_else(|| ctx.errors.validation(el.line, "SkillDocument requires a name"))?;
    let description = string_attr(el, "description")
        .ok_or_else(|| ctx.errors.validation(el.line, "SkillDocument requires a description"))?;
    let tools = string_list_attr(el, "tools");
    let attachments = string_list_attr(el, "attachments")
        .unwrap_or_default()
        .into_iter()
        .map(std::path::PathBuf::from)
        .collect();
    let header = SkillHeader { name, description, tools, attachments };
    let body = transform_block_children(&el.children, ctx)?;
    for node in &body {
        node.assert_agent_pure()
            .map_err(|_| ctx.errors.validation(el.line, "runtime-only block variant in a SkillDocument"))?;
    }
    Ok(Document::Skill { header, body })
}

fn string_attr(el: &SourceElement, name: &str) -> Option<String> {
    el.attributes.iter().find(|(n, _)| n == name).and_then(|(_, v)| match v {
        Some(SourceExpr::Str(s)) => Some(s.clone()),
        _ => None,
    })
}

fn string_list_attr(el: &SourceElement, name: &str) -> Option<Vec<String>> {
    el.attributes.iter().find(|(n, _)| n == name).and_then(|(_, v)| match v {
        Some(SourceExpr::Array(items)) => Some(
            items
                .iter()
                .filter_map(|i| match i {
                    SourceExpr::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
        ),
        Some(SourceExpr::Str(s)) => Some(s.split_whitespace().map(str::to_string).collect()),
        _ => None,
    })
}

fn expr_to_literal(expr: &SourceExpr) -> Result<LiteralValue, ()> {
    match expr {
        SourceExpr::Str(s) => Ok(LiteralValue::String(s.clone())),
        SourceExpr::Num(n) => Ok(LiteralValue::Number(n.clone())),
        SourceExpr::Bool(b) => Ok(LiteralValue::Bool(*b)),
        SourceExpr::Array(items) => Ok(LiteralValue::Array(
            items.iter().map(expr_to_literal).collect::<Result<_, _>>()?,
        )),
        SourceExpr::Object(props) => Ok(LiteralValue::Object(
            props
                .iter()
                .map(|(k, v)| Ok((k.clone(), expr_to_literal(v)?)))
                .collect::<Result<_, _>>()?,
        )),
        _ => Err(()),
    }
}

/// Returns the optional output subfolder named in the document root's
/// `folder` prop (spec §4.1 "Output path policy").
pub fn folder_of(root: &SourceNode) -> Option<String> {
    let SourceNode::Element(el) = root else { return None };
    string_attr(el, "folder")
}

/// Returns `true` if `body` contains any [`BlockNode`] failing the
/// Agent-purity invariant; used by tests and by the orchestrator's
/// belt-and-suspenders check before writing an Agent/Skill document.
pub fn has_runtime_only_node(body: &[BlockNode]) -> bool {
    body.iter().any(|n| n.assert_agent_pure().is_err())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn ctx() -> TransformContext {
        TransformContext::new(PathBuf::from("test.tsx"), "test".into())
    }

    fn el(name: &str, attrs: Vec<(&str, SourceExpr)>, children: Vec<SourceNode>) -> SourceElement {
        SourceElement {
            name: name.to_string(),
            attributes: attrs.into_iter().map(|(k, v)| (k.to_string(), Some(v))).collect(),
            children,
            span: oxc_span::Span::new(0, 0),
            line: 1,
        }
    }

    #[test]
    fn agent_document_requires_name_and_description() {
        let mut c = ctx();
        let root = SourceNode::Element(el("AgentDocument", vec![], vec![]));
        assert!(build_document(&root, &mut c).is_err());
    }

    #[test]
    fn agent_document_builds_with_required_fields() {
        let mut c = ctx();
        let root = SourceNode::Element(el(
            "AgentDocument",
            vec![
                ("name", SourceExpr::Str("researcher".into())),
                ("description", SourceExpr::Str("Research".into())),
            ],
            vec![],
        ));
        let doc = build_document(&root, &mut c).unwrap();
        match doc {
            Document::Agent { header, .. } => assert_eq!(header.name, "researcher"),
            _ => panic!("expected Agent document"),
        }
    }

    #[test]
    fn unrecognized_root_is_error() {
        let mut c = ctx();
        let root = SourceNode::Element(el("div", vec![], vec![]));
        assert!(build_document(&root, &mut c).is_err());
    }
}
