//! The Transformer Dispatcher (spec §4.3): routes one AST-view node (or a
//! sequence of sibling nodes) to the element transformer that matches its
//! tag name, and assembles the resulting [`BlockNode`] tree.

use crate::ast_view::{SourceElement, SourceExpr, SourceNode};
use crate::condition::{parse_condition, ExprNode};
use crate::context::TransformContext;
use crate::error::CompileError;
use crate::ir::{
    BlockNode, ColumnAlignment, DataSource, InlineNode, InterpolatedPath, LiteralMap,
    LiteralValue, NavigationOption, PathSegment, SpawnInput, SpawnInputValue, StateHandle,
    StateWrite, StatusTag, TableRow, TypedBinding,
};

const RESERVED_FRAMEWORK: &[&str] = &[
    "XmlBlock",
    "SpawnAgent",
    "Table",
    "ExecutionContext",
    "SuccessCriteria",
    "OfferNext",
    "Assign",
    "AssignGroup",
    "OnStatus",
    "Step",
    "ReadState",
    "WriteState",
];

const RESERVED_RUNTIME: &[&str] = &["If", "Else", "Loop", "Break", "Return", "AskUser"];

/// Transforms a single node, returning `None` for whitespace-only noise.
pub fn transform_to_block(
    node: &SourceNode,
    ctx: &mut TransformContext,
) -> Result<Option<BlockNode>, CompileError> {
    match node {
        SourceNode::Text(text) => {
            if text.trim().is_empty() {
                Ok(None)
            } else {
                Ok(Some(BlockNode::Paragraph(vec![InlineNode::Text(
                    normalize_text(text),
                )])))
            }
        }
        SourceNode::Expression(expr) => transform_top_level_expression(expr, ctx),
        SourceNode::Fragment(children) => {
            let body = transform_block_children(children, ctx)?;
            Ok(Some(BlockNode::Group(body)))
        }
        SourceNode::Element(el) => transform_element(el, ctx),
    }
}

/// Transforms a sequence of sibling nodes, applying the If/Else pairing rule
/// and accumulating inline runs into paragraphs.
pub fn transform_block_children(
    nodes: &[SourceNode],
    ctx: &mut TransformContext,
) -> Result<Vec<BlockNode>, CompileError> {
    let mut out = Vec::new();
    let mut inline_accum: Vec<InlineNode> = Vec::new();
    let mut i = 0;

    let flush = |accum: &mut Vec<InlineNode>, out: &mut Vec<BlockNode>| {
        if !accum.is_empty() {
            out.push(BlockNode::Paragraph(std::mem::take(accum)));
        }
    };

    while i < nodes.len() {
        let node = &nodes[i];

        if let Some(inline) = try_inline(node) {
            if let Some(text) = inline {
                inline_accum.push(InlineNode::Text(text));
            }
            i += 1;
            continue;
        }
        flush(&mut inline_accum, &mut out);

        if let SourceNode::Element(el) = node {
            if el.name == "If" {
                let if_block = transform_if(el, ctx)?;
                let mut j = i + 1;
                while j < nodes.len() && is_whitespace_text(&nodes[j]) {
                    j += 1;
                }
                if let Some(SourceNode::Element(maybe_else)) = nodes.get(j) {
                    if maybe_else.name == "Else" {
                        let else_children =
                            transform_block_children(&maybe_else.children, ctx)?;
                        out.push(if_block);
                        out.push(BlockNode::Else(else_children));
                        i = j + 1;
                        continue;
                    }
                }
                out.push(if_block);
                i += 1;
                continue;
            }
            if el.name == "Else" {
                return Err(ctx.errors.transform(
                    line_of(el),
                    "Else",
                    "<Else> without a preceding <If>",
                ));
            }
        }

        if let Some(block) = transform_to_block(node, ctx)? {
            out.push(block);
        }
        i += 1;
    }
    flush(&mut inline_accum, &mut out);
    Ok(out)
}

fn is_whitespace_text(node: &SourceNode) -> bool {
    matches!(node, SourceNode::Text(t) if t.trim().is_empty())
}

/// Returns `Some(None)` for whitespace-only text (dropped silently),
/// `Some(Some(text))` for non-empty inline text, `None` if `node` is not
/// accumulable inline content.
fn try_inline(node: &SourceNode) -> Option<Option<String>> {
    match node {
        SourceNode::Text(t) if t.trim().is_empty() => Some(None),
        SourceNode::Text(t) => Some(Some(normalize_text(t))),
        _ => None,
    }
}

fn normalize_text(text: &str) -> String {
    if text.contains('\n') {
        let stripped = strip_common_indent(text);
        collapse_blank_lines(&stripped)
    } else {
        let collapsed: Vec<&str> = text.split_whitespace().collect();
        collapsed.join(" ")
    }
}

fn strip_common_indent(text: &str) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let min_indent = lines
        .iter()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    lines
        .iter()
        .map(|l| if l.len() >= min_indent { &l[min_indent..] } else { l.trim_start() })
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = Vec::new();
    let mut blank_run = 0;
    for line in text.lines() {
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run <= 2 {
                out.push(line);
            }
        } else {
            blank_run = 0;
            out.push(line);
        }
    }
    out.join("\n")
}

fn line_of(el: &SourceElement) -> u32 {
    el.line
}

fn transform_element(
    el: &SourceElement,
    ctx: &mut TransformContext,
) -> Result<Option<BlockNode>, CompileError> {
    match el.name.as_str() {
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = el.name[1..].parse().unwrap_or(1);
            let children = inline_children(&el.children, ctx)?;
            Ok(Some(BlockNode::Heading { level, children }))
        }
        "p" => Ok(Some(BlockNode::Paragraph(inline_children(&el.children, ctx)?))),
        "ul" | "ol" => transform_list(el, ctx).map(Some),
        "pre" => Ok(Some(transform_code_block(el))),
        "blockquote" => Ok(Some(BlockNode::Blockquote(transform_block_children(
            &el.children,
            ctx,
        )?))),
        "hr" => Ok(Some(BlockNode::ThematicBreak)),
        "div" => {
            let children = transform_block_children(&el.children, ctx)?;
            if let Some(Some(name)) = attr_string(el, "name") {
                Ok(Some(BlockNode::XmlBlock {
                    name,
                    attributes: xml_attributes(el)?,
                    children,
                }))
            } else {
                Ok(Some(BlockNode::Group(children)))
            }
        }
        "XmlBlock" => transform_xml_block(el, ctx).map(Some),
        "Table" => transform_table(el, ctx).map(Some),
        "ExecutionContext" => transform_execution_context(el, ctx).map(Some),
        "SuccessCriteria" => transform_success_criteria(el, ctx).map(Some),
        "OfferNext" => transform_offer_next(el, ctx).map(Some),
        "Assign" => transform_assign(el, ctx).map(Some),
        "AssignGroup" => transform_assign_group(el, ctx).map(Some),
        "OnStatus" => transform_on_status(el, ctx).map(Some),
        "Step" => transform_step(el, ctx).map(Some),
        "ReadState" => transform_read_state(el, ctx).map(Some),
        "WriteState" => transform_write_state(el, ctx).map(Some),
        "SpawnAgent" => transform_spawn_agent(el, ctx).map(Some),
        "If" => transform_if(el, ctx).map(Some),
        "Else" => Err(ctx
            .errors
            .transform(line_of(el), "Else", "<Else> without a preceding <If>")),
        "Loop" => transform_loop(el, ctx).map(Some),
        "Break" => Ok(Some(BlockNode::Break {
            message: attr_string(el, "message").flatten(),
        })),
        "Return" => transform_return(el, ctx).map(Some),
        "AskUser" => transform_ask_user(el, ctx).map(Some),
        other if other.ends_with(".Call") => transform_runtime_call(el, ctx).map(Some),
        other if other.chars().next().is_some_and(char::is_uppercase) => {
            transform_custom_component(el, ctx)
        }
        other => Err(ctx.errors.transform(
            line_of(el),
            other,
            format!("unrecognized element <{other}>"),
        )),
    }
}

fn transform_top_level_expression(
    expr: &SourceExpr,
    ctx: &mut TransformContext,
) -> Result<Option<BlockNode>, CompileError> {
    // Render-props unwrap: `{() => { return (...) }}` / `{() => (...)}`.
    if let SourceExpr::RenderProp(node) = expr {
        return transform_to_block(node, ctx);
    }
    if let Some(text) = resolve_component_prop_ref(expr, ctx) {
        return Ok(Some(BlockNode::Paragraph(vec![InlineNode::Text(text)])));
    }
    match resolve_runtime_var_ref(expr, ctx) {
        Some((var_name, path)) => Ok(Some(BlockNode::Paragraph(vec![InlineNode::RuntimeVarRef {
            var_name,
            path,
        }]))),
        None => Ok(None),
    }
}

fn inline_children(
    children: &[SourceNode],
    ctx: &mut TransformContext,
) -> Result<Vec<InlineNode>, CompileError> {
    let mut out = Vec::new();
    for child in children {
        match child {
            SourceNode::Text(t) if !t.trim().is_empty() => out.push(InlineNode::Text(normalize_text(t))),
            SourceNode::Text(_) => {}
            SourceNode::Expression(expr) => {
                if let Some(text) = resolve_component_prop_ref(expr, ctx) {
                    out.push(InlineNode::Text(text));
                } else if let Some((var_name, path)) = resolve_runtime_var_ref(expr, ctx) {
                    out.push(InlineNode::RuntimeVarRef { var_name, path });
                }
            }
            SourceNode::Element(el) => match el.name.as_str() {
                "strong" | "b" => out.push(InlineNode::Bold(inline_children(&el.children, ctx)?)),
                "em" | "i" => out.push(InlineNode::Italic(inline_children(&el.children, ctx)?)),
                "code" => out.push(InlineNode::InlineCode(text_content(&el.children))),
                "a" => out.push(InlineNode::Link {
                    href: attr_string(el, "href").flatten().unwrap_or_default(),
                    label: inline_children(&el.children, ctx)?,
                }),
                "br" => out.push(InlineNode::LineBreak),
                _ => {}
            },
            SourceNode::Fragment(nested) => out.extend(inline_children(nested, ctx)?),
        }
    }
    Ok(out)
}

fn text_content(children: &[SourceNode]) -> String {
    children
        .iter()
        .filter_map(|c| match c {
            SourceNode::Text(t) => Some(t.trim().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("")
}

fn resolve_runtime_var_ref(expr: &SourceExpr, ctx: &TransformContext) -> Option<(String, Vec<String>)> {
    let SourceExpr::Ident(chain) = expr else {
        return None;
    };
    let root = chain.first()?;
    let var_name = ctx.resolve_script_var(root)?;
    Some((var_name, chain[1..].to_vec()))
}

/// Resolves a bare identifier reference against the props of the component
/// currently being expanded (spec §4.4 "nested references"). Only a bare
/// identifier (no property path) can name a prop.
fn resolve_component_prop_ref(expr: &SourceExpr, ctx: &TransformContext) -> Option<String> {
    let SourceExpr::Ident(chain) = expr else {
        return None;
    };
    if chain.len() != 1 {
        return None;
    }
    ctx.component_props.get(&chain[0]).cloned()
}

fn attr_string(el: &SourceElement, name: &str) -> Option<Option<String>> {
    el.attributes.iter().find(|(n, _)| n == name).map(|(_, v)| match v {
        Some(SourceExpr::Str(s)) => Some(s.clone()),
        _ => None,
    })
}

fn attr_expr<'a>(el: &'a SourceElement, name: &str) -> Option<&'a SourceExpr> {
    el.attributes
        .iter()
        .find(|(n, _)| n == name)
        .and_then(|(_, v)| v.as_ref())
}

fn attr_bool(el: &SourceElement, name: &str) -> bool {
    el.attributes.iter().any(|(n, v)| {
        n == name && matches!(v, None | Some(SourceExpr::Bool(true)))
    })
}

fn xml_attributes(el: &SourceElement) -> Result<Vec<(String, String)>, CompileError> {
    let mut out = Vec::new();
    for (name, value) in &el.attributes {
        if name == "name" {
            continue;
        }
        if let Some(SourceExpr::Str(s)) = value {
            out.push((name.clone(), s.clone()));
        }
    }
    Ok(out)
}

fn transform_list(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let ordered = el.name == "ol";
    let start = attr_expr(el, "start").and_then(|e| match e {
        SourceExpr::Num(n) => n.parse().ok(),
        _ => None,
    });
    let mut items = Vec::new();
    for child in &el.children {
        if let SourceNode::Element(li) = child {
            if li.name == "li" {
                items.push(transform_block_children(&li.children, ctx)?);
            }
        }
    }
    Ok(BlockNode::List { ordered, start, items })
}

fn transform_code_block(el: &SourceElement) -> BlockNode {
    let language = attr_string(el, "lang").flatten();
    let body = el
        .children
        .iter()
        .find_map(|c| match c {
            SourceNode::Element(code) if code.name == "code" => Some(text_content(&code.children)),
            _ => None,
        })
        .unwrap_or_else(|| text_content(&el.children));
    BlockNode::CodeBlock { language, body }
}

fn transform_xml_block(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let name = attr_string(el, "name")
        .flatten()
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<XmlBlock> requires a name attribute"))?;
    validate_xml_name(&name, ctx, el)?;
    Ok(BlockNode::XmlBlock {
        name,
        attributes: xml_attributes(el)?,
        children: transform_block_children(&el.children, ctx)?,
    })
}

fn validate_xml_name(name: &str, ctx: &TransformContext, el: &SourceElement) -> Result<(), CompileError> {
    let valid = name.chars().next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(ctx.errors.validation(line_of(el), format!("invalid XmlBlock name '{name}'")))
    }
}

fn transform_table(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let mut header = TableRow::new();
    let mut rows = Vec::new();
    let mut alignment = Vec::new();

    for child in &el.children {
        if let SourceNode::Element(section) = child {
            match section.name.as_str() {
                "thead" => {
                    if let Some(row) = first_row(&section.children) {
                        header = row_cells(row, ctx)?;
                        alignment = vec![ColumnAlignment::None; header.len()];
                    }
                }
                "tbody" => {
                    for row_el in &section.children {
                        if let SourceNode::Element(row) = row_el {
                            if row.name == "tr" {
                                rows.push(row_cells(row, ctx)?);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    Ok(BlockNode::Table { header, rows, alignment })
}

fn first_row(children: &[SourceNode]) -> Option<&SourceElement> {
    children.iter().find_map(|c| match c {
        SourceNode::Element(el) if el.name == "tr" => Some(el),
        _ => None,
    })
}

fn row_cells(row: &SourceElement, ctx: &mut TransformContext) -> Result<Vec<Vec<InlineNode>>, CompileError> {
    let mut cells = Vec::new();
    for cell in &row.children {
        if let SourceNode::Element(cell_el) = cell {
            if cell_el.name == "th" || cell_el.name == "td" {
                cells.push(inline_children(&cell_el.children, ctx)?);
            }
        }
    }
    Ok(cells)
}

fn transform_execution_context(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let prefix = attr_string(el, "prefix").flatten().and_then(|s| s.chars().next()).unwrap_or('@');
    let paths = el
        .attributes
        .iter()
        .find(|(n, _)| n == "paths")
        .and_then(|(_, v)| v.as_ref())
        .map(|v| match v {
            SourceExpr::Array(items) => items
                .iter()
                .filter_map(|i| match i {
                    SourceExpr::Str(s) => Some(s.clone()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
        .unwrap_or_default();
    Ok(BlockNode::ExecutionContext {
        paths,
        prefix,
        children: transform_block_children(&el.children, ctx)?,
    })
}

fn transform_success_criteria(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let mut items = Vec::new();
    for child in &el.children {
        if let SourceNode::Element(li) = child {
            if li.name == "li" {
                items.push(inline_children(&li.children, ctx)?);
            }
        }
    }
    Ok(BlockNode::SuccessCriteria(items))
}

fn transform_offer_next(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let mut options = Vec::new();
    for child in &el.children {
        if let SourceNode::Element(opt) = child {
            if opt.name == "option" || opt.name == "Option" {
                let label = attr_string(opt, "label").flatten().unwrap_or_default();
                let description = inline_children(&opt.children, ctx)?;
                options.push(NavigationOption { label, description });
            }
        }
    }
    Ok(BlockNode::OfferNext(options))
}

fn transform_assign(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let target = resolve_assign_target(el, ctx)?;
    let from = resolve_data_source(el, ctx)?;
    let comment = attr_string(el, "comment").flatten();
    let leading_blank = attr_bool(el, "leadingBlank");
    Ok(BlockNode::Assign {
        target,
        from,
        comment,
        leading_blank,
    })
}

fn resolve_assign_target(el: &SourceElement, ctx: &TransformContext) -> Result<String, CompileError> {
    let var_expr = attr_expr(el, "var")
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<Assign> requires a var attribute"))?;
    match var_expr {
        SourceExpr::Ident(chain) => {
            let ident = chain.first().ok_or_else(|| ctx.errors.validation(line_of(el), "empty var reference"))?;
            ctx.resolve_script_var(ident)
                .ok_or_else(|| ctx.errors.resolution(line_of(el), ident.clone(), "unknown declared variable"))
        }
        _ => Err(ctx.errors.validation(line_of(el), "<Assign> var must be a declared-variable reference")),
    }
}

fn resolve_data_source(el: &SourceElement, ctx: &mut TransformContext) -> Result<DataSource, CompileError> {
    let from = attr_expr(el, "from")
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<Assign> requires a from attribute"))?
        .clone();
    let SourceExpr::Call { callee, args } = &from else {
        return Err(ctx.errors.validation(line_of(el), "<Assign> from must be a source-helper call"));
    };
    let helper = callee.last().map(String::as_str).unwrap_or_default();
    match helper {
        "file" => {
            let path = interpolate_path(args.first(), ctx, el)?;
            let optional = call_option_bool(args.get(1), "optional");
            Ok(DataSource::File { path, optional })
        }
        "bash" => {
            let command = interpolate_path(args.first(), ctx, el)?;
            Ok(DataSource::Bash { command })
        }
        "value" => {
            let value = match args.first() {
                Some(SourceExpr::Str(s)) => s.clone(),
                _ => return Err(ctx.errors.validation(line_of(el), "value() requires a string literal")),
            };
            let raw = call_option_bool(args.get(1), "raw");
            Ok(DataSource::Value { value, raw })
        }
        "env" => {
            let name = match args.first() {
                Some(SourceExpr::Str(s)) => s.clone(),
                _ => return Err(ctx.errors.validation(line_of(el), "env() requires a string literal")),
            };
            Ok(DataSource::Env { name })
        }
        other if ctx.declarations.runtime_functions.contains_key(other) => {
            let wrapper = ctx.declarations.runtime_functions.get(other).unwrap().clone();
            let args_map = match args.first() {
                Some(SourceExpr::Object(props)) => literal_map_from_props(props, ctx, el)?,
                _ => Vec::new(),
            };
            Ok(DataSource::RuntimeFn {
                namespace: ctx.namespace.clone(),
                function: wrapper.callable_name,
                args: args_map,
            })
        }
        other => Err(ctx.errors.resolution(line_of(el), other, "unknown data source")),
    }
}

fn call_option_bool(arg: Option<&SourceExpr>, key: &str) -> bool {
    match arg {
        Some(SourceExpr::Object(props)) => props
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, v)| matches!(v, SourceExpr::Bool(true)))
            .unwrap_or(false),
        _ => false,
    }
}

fn interpolate_path(
    arg: Option<&SourceExpr>,
    ctx: &TransformContext,
    el: &SourceElement,
) -> Result<InterpolatedPath, CompileError> {
    match arg {
        Some(SourceExpr::Str(s)) => Ok(InterpolatedPath::literal(s.clone())),
        Some(SourceExpr::Template(segments)) => {
            let mut out = Vec::new();
            for segment in segments {
                match segment {
                    crate::ast_view::TemplateSegment::Literal(text) => {
                        out.push(PathSegment::Literal(text.clone()))
                    }
                    crate::ast_view::TemplateSegment::Ident(chain) => {
                        let root = chain.first().ok_or_else(|| {
                            ctx.errors.validation(line_of(el), "empty identifier in template")
                        })?;
                        if let Some((_, _)) = ctx.declarations.runtime_variables.get(root) {
                            let var_name = ctx.resolve_script_var(root).unwrap();
                            out.push(PathSegment::RuntimeVarPath {
                                var_name,
                                path: chain[1..].to_vec(),
                            });
                        } else if let Some(var_name) = ctx.declarations.variables.get(root) {
                            out.push(PathSegment::ShellVar(var_name.clone()));
                        } else {
                            return Err(ctx.errors.resolution(
                                line_of(el),
                                root.clone(),
                                "unknown identifier in path interpolation",
                            ));
                        }
                    }
                }
            }
            Ok(InterpolatedPath { segments: out })
        }
        _ => Err(ctx.errors.validation(line_of(el), "expected a string or template-literal path")),
    }
}

fn literal_map_from_props(
    props: &[(String, SourceExpr)],
    ctx: &TransformContext,
    el: &SourceElement,
) -> Result<LiteralMap, CompileError> {
    props
        .iter()
        .map(|(k, v)| Ok((k.clone(), literal_value_from_expr(v, ctx, el)?)))
        .collect()
}

fn literal_value_from_expr(
    expr: &SourceExpr,
    ctx: &TransformContext,
    el: &SourceElement,
) -> Result<LiteralValue, CompileError> {
    match expr {
        SourceExpr::Str(s) => Ok(LiteralValue::String(s.clone())),
        SourceExpr::Num(n) => Ok(LiteralValue::Number(n.clone())),
        SourceExpr::Bool(b) => Ok(LiteralValue::Bool(*b)),
        SourceExpr::Object(props) => Ok(LiteralValue::Object(literal_map_from_props(props, ctx, el)?)),
        SourceExpr::Array(items) => Ok(LiteralValue::Array(
            items
                .iter()
                .map(|i| literal_value_from_expr(i, ctx, el))
                .collect::<Result<_, _>>()?,
        )),
        _ => Err(ctx.errors.validation(
            line_of(el),
            "only literal values are accepted here; runtime-variable substitution is not supported",
        )),
    }
}

fn transform_assign_group(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let mut items = Vec::new();
    for child in &el.children {
        match child {
            SourceNode::Element(assign) if assign.name == "Assign" => {
                items.push(Some(Box::new(transform_assign(assign, ctx)?)));
            }
            SourceNode::Element(br) if br.name == "br" => items.push(None),
            _ => {}
        }
    }
    Ok(BlockNode::AssignGroup { items })
}

fn transform_on_status(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let agent_ref = attr_string(el, "agent").flatten().unwrap_or_default();
    let status_str = attr_string(el, "status").flatten().unwrap_or_default();
    let status = StatusTag::parse(&status_str)
        .ok_or_else(|| ctx.errors.validation(line_of(el), format!("invalid status '{status_str}'")))?;
    Ok(BlockNode::OnStatus {
        agent_ref,
        status,
        children: transform_block_children(&el.children, ctx)?,
    })
}

fn transform_step(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let title = attr_string(el, "title")
        .flatten()
        .map(|s| vec![InlineNode::Text(s)])
        .unwrap_or_default();
    Ok(BlockNode::Step {
        title,
        body: transform_block_children(&el.children, ctx)?,
    })
}

fn state_handle_from_attr(el: &SourceElement, ctx: &TransformContext) -> Result<StateHandle, CompileError> {
    match attr_expr(el, "state") {
        Some(SourceExpr::Ident(chain)) if !chain.is_empty() => Ok(StateHandle {
            handle: chain[0].clone(),
            field_path: chain[1..].to_vec(),
        }),
        _ => Err(ctx.errors.validation(line_of(el), "expected a state handle reference")),
    }
}

fn transform_read_state(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let handle = state_handle_from_attr(el, ctx)?;
    let output_var = attr_expr(el, "output")
        .and_then(|e| match e {
            SourceExpr::Ident(chain) => chain.first().cloned(),
            _ => None,
        })
        .and_then(|ident| ctx.resolve_script_var(&ident))
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<ReadState> requires an output variable"))?;
    Ok(BlockNode::ReadState { handle, output_var })
}

fn transform_write_state(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let handle = state_handle_from_attr(el, ctx)?;
    let write = if let Some(merge_expr) = attr_expr(el, "merge") {
        match merge_expr {
            SourceExpr::Object(props) => StateWrite::Merge(literal_map_from_props(props, ctx, el)?),
            _ => return Err(ctx.errors.validation(line_of(el), "merge must be an object literal")),
        }
    } else if let Some(value_expr) = attr_expr(el, "value") {
        StateWrite::Value(literal_value_from_expr(value_expr, ctx, el)?)
    } else {
        return Err(ctx.errors.validation(line_of(el), "<WriteState> requires a value or merge attribute"));
    };
    Ok(BlockNode::WriteState { handle, write })
}

fn transform_spawn_agent(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let name = attr_string(el, "name").flatten().unwrap_or_default();
    let model = attr_string(el, "model").flatten().unwrap_or_default();
    let description = attr_string(el, "description").flatten().unwrap_or_default();
    let input = match attr_expr(el, "prompt") {
        Some(SourceExpr::Str(s)) => SpawnInput::Prompt(s.clone()),
        _ => match attr_expr(el, "input") {
            Some(SourceExpr::Object(props)) => {
                let mut structured = Vec::new();
                for (key, value) in props {
                    let v = match value {
                        SourceExpr::Str(s) => SpawnInputValue::String(s.clone()),
                        SourceExpr::Ident(chain) => {
                            let root = chain.first().cloned().unwrap_or_default();
                            match ctx.resolve_script_var(&root) {
                                Some(var_name) => SpawnInputValue::RuntimeVarRef {
                                    var_name,
                                    path: chain[1..].to_vec(),
                                },
                                None => {
                                    return Err(ctx.errors.resolution(
                                        line_of(el),
                                        root,
                                        "unknown identifier in spawn input",
                                    ))
                                }
                            }
                        }
                        other => SpawnInputValue::Literal(literal_value_from_expr(other, ctx, el)?),
                    };
                    structured.push((key.clone(), v));
                }
                SpawnInput::Structured(structured)
            }
            _ => SpawnInput::Prompt(String::new()),
        },
    };
    let output = attr_expr(el, "output").and_then(|e| match e {
        SourceExpr::Ident(chain) => chain.first().cloned(),
        _ => None,
    }).and_then(|ident| ctx.resolve_script_var(&ident)).map(|var_name| TypedBinding {
        var_name,
        type_hint: None,
    });
    Ok(BlockNode::SpawnAgent { name, model, description, input, output })
}

fn transform_if(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let condition_expr = attr_expr(el, "condition")
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<If> requires a condition attribute"))?;
    let expr_node = source_expr_to_expr_node(condition_expr, ctx, el)?;
    let condition = parse_condition(&expr_node, ctx, line_of(el))?;
    Ok(BlockNode::If {
        condition,
        children: transform_block_children(&el.children, ctx)?,
    })
}

fn source_expr_to_expr_node(
    expr: &SourceExpr,
    ctx: &TransformContext,
    el: &SourceElement,
) -> Result<ExprNode, CompileError> {
    match expr {
        SourceExpr::Bool(b) => Ok(ExprNode::Bool(*b)),
        SourceExpr::Str(s) => Ok(ExprNode::Str(s.clone())),
        SourceExpr::Num(n) => Ok(ExprNode::Num(n.clone())),
        SourceExpr::Ident(chain) => Ok(ExprNode::Ident(chain.clone())),
        SourceExpr::Not(inner) => Ok(ExprNode::Not(Box::new(source_expr_to_expr_node(inner, ctx, el)?))),
        SourceExpr::And(l, r) => Ok(ExprNode::And(
            Box::new(source_expr_to_expr_node(l, ctx, el)?),
            Box::new(source_expr_to_expr_node(r, ctx, el)?),
        )),
        SourceExpr::Or(l, r) => Ok(ExprNode::Or(
            Box::new(source_expr_to_expr_node(l, ctx, el)?),
            Box::new(source_expr_to_expr_node(r, ctx, el)?),
        )),
        SourceExpr::Binary(op, l, r) => Ok(ExprNode::Binary(
            op,
            Box::new(source_expr_to_expr_node(l, ctx, el)?),
            Box::new(source_expr_to_expr_node(r, ctx, el)?),
        )),
        SourceExpr::Paren(inner) => Ok(ExprNode::Paren(Box::new(source_expr_to_expr_node(inner, ctx, el)?))),
        _ => Err(ctx.errors.transform(line_of(el), "If", "unsupported condition expression")),
    }
}

fn transform_loop(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let max = match attr_expr(el, "max") {
        Some(SourceExpr::Num(n)) => n.parse().map_err(|_| {
            ctx.errors.transform(line_of(el), "Loop", "max must be a positive integer literal")
        })?,
        _ => return Err(ctx.errors.transform(line_of(el), "Loop", "non-literal Loop bound is not supported")),
    };
    let counter = attr_string(el, "counter").flatten();
    Ok(BlockNode::Loop {
        max,
        counter,
        children: transform_block_children(&el.children, ctx)?,
    })
}

fn transform_return(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let status = match attr_string(el, "status").flatten() {
        Some(s) => Some(StatusTag::parse(&s).ok_or_else(|| {
            ctx.errors.validation(line_of(el), format!("invalid Return status '{s}'"))
        })?),
        None => None,
    };
    let message = attr_string(el, "message").flatten();
    Ok(BlockNode::Return { status, message })
}

fn transform_ask_user(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let question = attr_string(el, "question")
        .flatten()
        .map(|s| vec![InlineNode::Text(s)])
        .unwrap_or_default();
    let options = match attr_expr(el, "options") {
        Some(SourceExpr::Array(items)) => items
            .iter()
            .filter_map(|i| match i {
                SourceExpr::Str(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    };
    let output_var = attr_expr(el, "output")
        .and_then(|e| match e {
            SourceExpr::Ident(chain) => chain.first().cloned(),
            _ => None,
        })
        .and_then(|ident| ctx.resolve_script_var(&ident))
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<AskUser> requires an output variable"))?;
    Ok(BlockNode::AskUser { question, options, output_var })
}

fn transform_runtime_call(el: &SourceElement, ctx: &mut TransformContext) -> Result<BlockNode, CompileError> {
    let wrapper_ident = el.name.trim_end_matches(".Call").to_string();
    let wrapper = ctx
        .declarations
        .runtime_functions
        .get(&wrapper_ident)
        .cloned()
        .ok_or_else(|| ctx.errors.resolution(line_of(el), wrapper_ident.clone(), "unknown runtime-function wrapper"))?;
    let args = match attr_expr(el, "args") {
        Some(SourceExpr::Object(props)) => literal_map_from_props(props, ctx, el)?,
        _ => Vec::new(),
    };
    let output_var = attr_expr(el, "output")
        .and_then(|e| match e {
            SourceExpr::Ident(chain) => chain.first().cloned(),
            _ => None,
        })
        .and_then(|ident| ctx.resolve_script_var(&ident))
        .ok_or_else(|| ctx.errors.validation(line_of(el), "<F.Call> requires an output variable"))?;
    Ok(BlockNode::RuntimeCall {
        namespace: ctx.namespace.clone(),
        function: wrapper.callable_name,
        args,
        output_var,
    })
}

/// Custom-component expansion (spec §4.4): inlines a registered local
/// component's own declared body (not the usage site's children), with
/// cycle detection via the expansion stack. String-literal attributes at
/// the usage site become the expansion's `componentProps`, available to
/// identifier references inside the body (runtime dialect, spec §4.4); the
/// static dialect never passes attributes that resolve here, so it is
/// unaffected.
fn transform_custom_component(
    el: &SourceElement,
    ctx: &mut TransformContext,
) -> Result<Option<BlockNode>, CompileError> {
    let component = ctx
        .declarations
        .local_components
        .get(&el.name)
        .cloned()
        .ok_or_else(|| {
            ctx.errors.resolution(
                line_of(el),
                el.name.clone(),
                "unknown local component (static-dialect cross-file component resolution is not supported in this revision)",
            )
        })?;
    let _guard = ctx.enter_component_expansion(&el.name, line_of(el))?;

    let outer_props = std::mem::take(&mut ctx.component_props);
    for (name, value) in &el.attributes {
        if let Some(SourceExpr::Str(s)) = value {
            ctx.component_props.insert(name.clone(), s.clone());
        }
    }
    let result = transform_to_block(&component.body, ctx);
    ctx.component_props = outer_props;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast_view::SourceElement;

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
    fn heading_level_from_tag_name() {
        let mut ctx = TransformContext::new_for_test();
        let node = SourceNode::Element(el("h2", vec![], vec![SourceNode::Text("Title".into())]));
        let block = transform_to_block(&node, &mut ctx).unwrap().unwrap();
        assert_eq!(
            block,
            BlockNode::Heading {
                level: 2,
                children: vec![InlineNode::Text("Title".into())]
            }
        );
    }

    #[test]
    fn assign_from_file_literal_path() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declare_script_var("state", "STATE");
        let assign = el(
            "Assign",
            vec![
                ("var", SourceExpr::Ident(vec!["state".into()])),
                (
                    "from",
                    SourceExpr::Call {
                        callee: vec!["file".into()],
                        args: vec![SourceExpr::Str(".planning/STATE.md".into())],
                    },
                ),
            ],
            vec![],
        );
        let block = transform_assign(&assign, &mut ctx).unwrap();
        match block {
            BlockNode::Assign { target, from: DataSource::File { optional, .. }, .. } => {
                assert_eq!(target, "STATE");
                assert!(!optional);
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn else_without_if_is_error() {
        let mut ctx = TransformContext::new_for_test();
        let nodes = vec![SourceNode::Element(el("Else", vec![], vec![]))];
        assert!(transform_block_children(&nodes, &mut ctx).is_err());
    }

    #[test]
    fn custom_component_inlines_declared_body_not_usage_children() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declarations.local_components.insert(
            "Card".to_string(),
            crate::context::LocalComponent {
                declared_at_line: 1,
                body: SourceNode::Element(el("p", vec![], vec![SourceNode::Text("from template".into())])),
            },
        );
        // Self-closing usage: no children at all, yet the template still emits.
        let usage = SourceNode::Element(el("Card", vec![], vec![]));
        let block = transform_to_block(&usage, &mut ctx).unwrap().unwrap();
        assert_eq!(
            block,
            BlockNode::Paragraph(vec![InlineNode::Text("from template".into())])
        );
    }

    #[test]
    fn custom_component_usage_children_are_ignored() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declarations.local_components.insert(
            "Card".to_string(),
            crate::context::LocalComponent {
                declared_at_line: 1,
                body: SourceNode::Element(el("p", vec![], vec![SourceNode::Text("template text".into())])),
            },
        );
        let usage = SourceNode::Element(el("Card", vec![], vec![SourceNode::Text("usage-site text".into())]));
        let block = transform_to_block(&usage, &mut ctx).unwrap().unwrap();
        assert_eq!(
            block,
            BlockNode::Paragraph(vec![InlineNode::Text("template text".into())])
        );
    }

    #[test]
    fn custom_component_props_are_available_inside_body() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declarations.local_components.insert(
            "Greeting".to_string(),
            crate::context::LocalComponent {
                declared_at_line: 1,
                body: SourceNode::Element(el(
                    "p",
                    vec![],
                    vec![SourceNode::Expression(SourceExpr::Ident(vec!["label".into()]))],
                )),
            },
        );
        let usage = SourceNode::Element(el(
            "Greeting",
            vec![("label", SourceExpr::Str("hello".into()))],
            vec![],
        ));
        let block = transform_to_block(&usage, &mut ctx).unwrap().unwrap();
        assert_eq!(block, BlockNode::Paragraph(vec![InlineNode::Text("hello".into())]));
        assert!(ctx.component_props.is_empty(), "props must not leak past expansion");
    }

    #[test]
    fn unknown_custom_component_is_resolution_error() {
        let mut ctx = TransformContext::new_for_test();
        let usage = SourceNode::Element(el("Mystery", vec![], vec![]));
        assert!(transform_to_block(&usage, &mut ctx).is_err());
    }

    #[test]
    fn leading_blank_is_read_from_boolean_shorthand_attribute() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declare_script_var("state", "STATE");
        let assign = el(
            "Assign",
            vec![
                ("var", SourceExpr::Ident(vec!["state".into()])),
                (
                    "from",
                    SourceExpr::Call {
                        callee: vec!["value".into()],
                        args: vec![SourceExpr::Str("ready".into())],
                    },
                ),
                ("leadingBlank", SourceExpr::Bool(true)),
            ],
            vec![],
        );
        let block = transform_assign(&assign, &mut ctx).unwrap();
        match block {
            BlockNode::Assign { leading_blank, .. } => assert!(leading_blank),
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn runtime_fn_data_source_carries_namespace() {
        let mut ctx = TransformContext::new_for_test();
        ctx.namespace = "planPhase".to_string();
        ctx.declare_script_var("state", "STATE");
        ctx.declarations.runtime_functions.insert(
            "Init".to_string(),
            crate::context::RuntimeFunctionWrapper {
                callable_name: "init".to_string(),
            },
        );
        let assign = el(
            "Assign",
            vec![
                ("var", SourceExpr::Ident(vec!["state".into()])),
                (
                    "from",
                    SourceExpr::Call {
                        callee: vec!["Init".into()],
                        args: vec![],
                    },
                ),
            ],
            vec![],
        );
        let block = transform_assign(&assign, &mut ctx).unwrap();
        match block {
            BlockNode::Assign {
                from: DataSource::RuntimeFn { namespace, function, .. },
                ..
            } => {
                assert_eq!(namespace, "planPhase");
                assert_eq!(function, "init");
            }
            other => panic!("unexpected block: {other:?}"),
        }
    }

    #[test]
    fn if_else_sibling_pairing() {
        let mut ctx = TransformContext::new_for_test();
        ctx.declare_script_var("ctx", "CTX");
        let if_el = el(
            "If",
            vec![("condition", SourceExpr::Ident(vec!["ctx".into(), "error".into()]))],
            vec![SourceNode::Text("A".into())],
        );
        let else_el = el("Else", vec![], vec![SourceNode::Text("B".into())]);
        let nodes = vec![SourceNode::Element(if_el), SourceNode::Element(else_el)];
        let blocks = transform_block_children(&nodes, &mut ctx).unwrap();
        assert_eq!(blocks.len(), 2);
        assert!(matches!(blocks[0], BlockNode::If { .. }));
        assert!(matches!(blocks[1], BlockNode::Else(_)));
    }
}
