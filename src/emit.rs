//! Emitters (spec §4.10): render an IR [`Document`] to Markdown text.
//!
//! Both emitters are total matches over [`BlockNode`] — the compiler itself
//! enforces this: adding a variant to `ir.rs` without a matching arm here is
//! a compile error. A shared list-nesting stack threads ordered/unordered
//! state and indentation depth through recursive block emission.

use crate::ir::{
    BlockNode, ColumnAlignment, DataSource, Document, InlineNode, LiteralValue, StateWrite,
};

/// One entry on the list-nesting stack.
struct ListFrame {
    ordered: bool,
    index: u32,
}

/// Shared emission state: the list-nesting stack, read by both emitters.
#[derive(Default)]
struct EmitState {
    list_stack: Vec<ListFrame>,
}

impl EmitState {
    fn indent(&self) -> String {
        "  ".repeat(self.list_stack.len())
    }
}

/// Joins rendered block fragments with a single blank line, the default
/// block separator (spec §4.10).
fn join_blocks(fragments: &[String]) -> String {
    fragments.join("\n\n")
}

fn emit_inline(nodes: &[InlineNode]) -> String {
    nodes.iter().map(emit_inline_one).collect()
}

fn emit_inline_one(node: &InlineNode) -> String {
    match node {
        InlineNode::Text(t) => t.clone(),
        InlineNode::Bold(children) => format!("**{}**", emit_inline(children)),
        InlineNode::Italic(children) => format!("*{}*", emit_inline(children)),
        InlineNode::InlineCode(code) => format!("`{code}`"),
        InlineNode::Link { href, label } => format!("[{}]({href})", emit_inline(label)),
        InlineNode::LineBreak => "  \n".to_string(),
        InlineNode::RuntimeVarRef { var_name, path } => render_jq_ref(var_name, path),
    }
}

fn render_jq_ref(var_name: &str, path: &[String]) -> String {
    if path.is_empty() {
        format!("${var_name}")
    } else {
        let jq_path: String = path.iter().map(|s| format!(".{s}")).collect();
        format!("$(echo \"${var_name}\" | jq -r '{jq_path}')")
    }
}

/// Emits one [`Document`] to Markdown text, including frontmatter.
pub fn emit_document(doc: &Document, runtime_path: &str) -> String {
    match doc {
        Document::Command {
            header,
            body,
            ..
        } => {
            let frontmatter = emit_command_frontmatter(header);
            let body_text = emit_body(body, runtime_path);
            format!("{frontmatter}\n\n{body_text}\n")
        }
        Document::Agent { header, body } => {
            let frontmatter = emit_agent_frontmatter(&header.name, &header.description, header.tools.as_deref(), header.color.as_deref());
            let body_text = emit_body(body, runtime_path);
            format!("{frontmatter}\n\n{body_text}\n")
        }
        Document::Skill { header, body } => {
            let frontmatter = emit_agent_frontmatter(&header.name, &header.description, header.tools.as_deref(), None);
            let body_text = emit_body(body, runtime_path);
            format!("{frontmatter}\n\n{body_text}\n")
        }
    }
}

fn emit_body(body: &[BlockNode], runtime_path: &str) -> String {
    let mut state = EmitState::default();
    let fragments: Vec<String> = body.iter().map(|b| emit_block(b, &mut state, runtime_path)).collect();
    join_blocks(&fragments)
}

/// Command frontmatter via `serde_yaml`, keys converted camelCase ->
/// kebab-case, emitted in the order the source map yields them (spec
/// §4.10/§6 — "keys in the order returned by the library").
fn emit_command_frontmatter(header: &std::collections::HashMap<String, LiteralValue>) -> String {
    let mut map = serde_yaml::Mapping::new();
    for (key, value) in header {
        map.insert(
            serde_yaml::Value::String(camel_to_kebab(key)),
            literal_to_yaml(value),
        );
    }
    let body = serde_yaml::to_string(&serde_yaml::Value::Mapping(map)).unwrap_or_default();
    format!("---\n{}---", body)
}

fn literal_to_yaml(value: &LiteralValue) -> serde_yaml::Value {
    match value {
        LiteralValue::String(s) => serde_yaml::Value::String(s.clone()),
        LiteralValue::Number(n) => serde_yaml::Value::Number(serde_yaml::Number::from(n.parse::<f64>().unwrap_or(0.0))),
        LiteralValue::Bool(b) => serde_yaml::Value::Bool(*b),
        LiteralValue::Object(map) => {
            let mut m = serde_yaml::Mapping::new();
            for (k, v) in map {
                m.insert(serde_yaml::Value::String(k.clone()), literal_to_yaml(v));
            }
            serde_yaml::Value::Mapping(m)
        }
        LiteralValue::Array(items) => serde_yaml::Value::Sequence(items.iter().map(literal_to_yaml).collect()),
    }
}

fn camel_to_kebab(ident: &str) -> String {
    let mut out = String::with_capacity(ident.len() + 4);
    for (i, ch) in ident.chars().enumerate() {
        if ch.is_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Hand-written Agent/Skill frontmatter (spec §4.10/§6): `tools` is always a
/// single space-separated string, never a YAML array, and optional fields
/// are omitted entirely (not emitted empty) when absent.
fn emit_agent_frontmatter(
    name: &str,
    description: &str,
    tools: Option<&[String]>,
    color: Option<&str>,
) -> String {
    let mut out = String::from("---\n");
    out.push_str(&format!("name: {name}\n"));
    out.push_str(&format!("description: {description}\n"));
    if let Some(tools) = tools {
        if !tools.is_empty() {
            out.push_str(&format!("tools: {}\n", tools.join(" ")));
        }
    }
    if let Some(color) = color {
        out.push_str(&format!("color: {color}\n"));
    }
    out.push_str("---");
    out
}

fn emit_block(node: &BlockNode, state: &mut EmitState, runtime_path: &str) -> String {
    match node {
        BlockNode::Heading { level, children } => {
            format!("{} {}", "#".repeat(*level as usize), emit_inline(children))
        }
        BlockNode::Paragraph(children) => emit_inline(children),
        BlockNode::List { ordered, start, items } => emit_list(*ordered, *start, items, state, runtime_path),
        BlockNode::CodeBlock { language, body } => {
            format!("```{}\n{}\n```", language.as_deref().unwrap_or(""), body)
        }
        BlockNode::Blockquote(children) => {
            emit_body(children, runtime_path)
                .lines()
                .map(|l| format!("> {l}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        BlockNode::ThematicBreak => "---".to_string(),
        BlockNode::Table { header, rows, alignment } => emit_table(header, rows, alignment),
        BlockNode::XmlBlock { name, attributes, children } => emit_xml_block(name, attributes, children, runtime_path),
        BlockNode::Group(children) => children
            .iter()
            .map(|c| emit_block(c, state, runtime_path))
            .collect::<Vec<_>>()
            .join("\n"),
        BlockNode::RawMarkdown(text) => text.clone(),
        BlockNode::Indent { level, children } => {
            let prefix = "  ".repeat(*level as usize);
            emit_body(children, runtime_path)
                .lines()
                .map(|l| format!("{prefix}{l}"))
                .collect::<Vec<_>>()
                .join("\n")
        }
        BlockNode::Assign { leading_blank, .. } => {
            let rendered = format!("```bash\n{}\n```", emit_assign_line(node, runtime_path));
            if *leading_blank {
                format!("\n{rendered}")
            } else {
                rendered
            }
        }
        BlockNode::AssignGroup { items } => emit_assign_group(items, runtime_path),
        BlockNode::OnStatus { agent_ref, status, children } => {
            format!(
                "**If {agent_ref} is {}:**\n\n{}",
                status.as_str(),
                emit_body(children, runtime_path)
            )
        }
        BlockNode::Step { title, body } => {
            format!("### {}\n\n{}", emit_inline(title), emit_body(body, runtime_path))
        }
        BlockNode::ExecutionContext { paths, prefix, children } => {
            let path_lines: Vec<String> = paths.iter().map(|p| format!("{prefix}{p}")).collect();
            format!("{}\n\n{}", path_lines.join("\n"), emit_body(children, runtime_path))
        }
        BlockNode::SuccessCriteria(items) => items
            .iter()
            .map(|item| format!("- [ ] {}", emit_inline(item)))
            .collect::<Vec<_>>()
            .join("\n"),
        BlockNode::OfferNext(options) => options
            .iter()
            .map(|opt| format!("- **{}**: {}", opt.label, emit_inline(&opt.description)))
            .collect::<Vec<_>>()
            .join("\n"),
        BlockNode::ReadState { handle, output_var } => {
            format!(
                "{output_var}=$(read-state {}{})",
                handle.handle,
                handle.field_path.iter().map(|p| format!(".{p}")).collect::<String>()
            )
        }
        BlockNode::WriteState { handle, write } => emit_write_state(handle, write),
        BlockNode::SpawnAgent { name, model, description, input, output } => {
            emit_spawn_agent(name, model, description, input, output.as_ref())
        }
        BlockNode::RuntimeVarDecl { var_name, type_hint } => match type_hint {
            Some(t) => format!("{var_name}: {t}"),
            None => var_name.clone(),
        },
        BlockNode::RuntimeCall { namespace, function, args, output_var } => {
            emit_runtime_call(namespace, function, args, output_var, runtime_path)
        }
        BlockNode::If { condition, children } => {
            format!("**If {}:**\n\n{}", condition.emit_prose(), emit_body(children, runtime_path))
        }
        BlockNode::Else(children) => {
            format!("**Otherwise:**\n\n{}", emit_body(children, runtime_path))
        }
        BlockNode::Loop { max, counter, children } => {
            let header = match counter {
                Some(c) => format!("**Repeat up to {max} times (counter: {c})**"),
                None => format!("**Repeat up to {max} times**"),
            };
            format!("{header}\n\n{}", emit_body(children, runtime_path))
        }
        BlockNode::Break { message } => match message {
            Some(m) => format!("**Break**: {m}"),
            None => "**Break**".to_string(),
        },
        BlockNode::Return { status, message } => {
            let status_str = status.map(|s| s.as_str().to_string()).unwrap_or_default();
            match (status, message) {
                (Some(_), Some(m)) => format!("**Return** {status_str}: {m}"),
                (Some(_), None) => format!("**Return** {status_str}"),
                (None, Some(m)) => format!("**Return**: {m}"),
                (None, None) => "**Return**".to_string(),
            }
        }
        BlockNode::AskUser { question, options, output_var } => {
            let opts = options.iter().map(|o| format!("- {o}")).collect::<Vec<_>>().join("\n");
            format!("**Ask user** ({output_var}): {}\n\n{opts}", emit_inline(question))
        }
    }
}

fn emit_list(
    ordered: bool,
    start: Option<u32>,
    items: &[Vec<BlockNode>],
    state: &mut EmitState,
    runtime_path: &str,
) -> String {
    state.list_stack.push(ListFrame {
        ordered,
        index: start.unwrap_or(1),
    });
    let mut lines = Vec::new();
    for item in items {
        let depth = state.list_stack.len() - 1;
        let indent = "  ".repeat(depth);
        let marker = {
            let frame = state.list_stack.last_mut().unwrap();
            if frame.ordered {
                let i = frame.index;
                frame.index += 1;
                format!("{i}.")
            } else {
                "-".to_string()
            }
        };
        let body = item
            .iter()
            .map(|b| emit_block(b, state, runtime_path))
            .collect::<Vec<_>>()
            .join("\n");
        lines.push(format!("{indent}{marker} {body}"));
    }
    state.list_stack.pop();
    lines.join("\n")
}

fn emit_table(header: &[Vec<InlineNode>], rows: &[Vec<Vec<InlineNode>>], alignment: &[ColumnAlignment]) -> String {
    let header_line = format!(
        "| {} |",
        header.iter().map(|c| emit_inline(c)).collect::<Vec<_>>().join(" | ")
    );
    let sep_line = format!(
        "| {} |",
        alignment
            .iter()
            .map(|a| match a {
                ColumnAlignment::None => "---".to_string(),
                ColumnAlignment::Left => ":---".to_string(),
                ColumnAlignment::Center => ":---:".to_string(),
                ColumnAlignment::Right => "---:".to_string(),
            })
            .collect::<Vec<_>>()
            .join(" | ")
    );
    let mut lines = vec![header_line, sep_line];
    for row in rows {
        lines.push(format!(
            "| {} |",
            row.iter().map(|c| emit_inline(c)).collect::<Vec<_>>().join(" | ")
        ));
    }
    lines.join("\n")
}

fn emit_xml_block(name: &str, attributes: &[(String, String)], children: &[BlockNode], runtime_path: &str) -> String {
    let attrs = if attributes.is_empty() {
        String::new()
    } else {
        format!(
            " {}",
            attributes
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect::<Vec<_>>()
                .join(" ")
        )
    };
    format!("<{name}{attrs}>\n{}\n</{name}>", emit_body(children, runtime_path))
}

fn emit_assign_line(node: &BlockNode, runtime_path: &str) -> String {
    let BlockNode::Assign { target, from, comment, .. } = node else {
        return String::new();
    };
    let rhs = match from {
        DataSource::File { path, optional } => {
            let rendered = render_interpolated(path);
            if *optional {
                format!("$(cat {rendered} 2>/dev/null)")
            } else {
                format!("$(cat {rendered})")
            }
        }
        DataSource::Bash { command } => format!("$({})", render_interpolated(command)),
        DataSource::Value { value, raw } => {
            if *raw {
                value.clone()
            } else {
                format!("\"{value}\"")
            }
        }
        DataSource::Env { name } => format!("${name}"),
        DataSource::RuntimeFn { namespace, function, args } => {
            let json = crate::ir::literal_map_to_json(args).replace('\'', "'\\''");
            format!("$(node {runtime_path} {namespace}_{function} '{json}')")
        }
    };
    let line = format!("{target}={rhs}");
    match comment {
        Some(c) => format!("{line}  # {c}"),
        None => line,
    }
}

fn render_interpolated(path: &crate::ir::InterpolatedPath) -> String {
    use crate::ir::PathSegment;
    // Smart quoting (spec §4.6): shell-variable segments are quoted
    // per-segment so the surrounding literal path stays unquoted and glob
    // characters remain shell-expandable; anything else is passed through
    // literally. A path made entirely of literal text is emitted bare.
    path.segments
        .iter()
        .map(|seg| match seg {
            PathSegment::Literal(text) => text.clone(),
            PathSegment::ShellVar(name) => format!("\"${name}\""),
            PathSegment::RuntimeVarPath { var_name, path } => {
                let jq_path: String = path.iter().map(|p| format!(".{p}")).collect();
                if jq_path.is_empty() {
                    format!("\"${var_name}\"")
                } else {
                    format!("$(echo \"${var_name}\" | jq -r '{jq_path}')")
                }
            }
        })
        .collect()
}

fn emit_assign_group(items: &[Option<Box<BlockNode>>], runtime_path: &str) -> String {
    let lines: Vec<String> = items
        .iter()
        .map(|item| match item {
            Some(assign) => emit_assign_line(assign, runtime_path),
            None => String::new(),
        })
        .collect();
    format!("```bash\n{}\n```", lines.join("\n"))
}

fn emit_write_state(handle: &crate::ir::StateHandle, write: &StateWrite) -> String {
    let field = handle.field_path.iter().map(|p| format!(".{p}")).collect::<String>();
    match write {
        StateWrite::Value(value) => format!("write-state {}{field} {}", handle.handle, value.to_json()),
        StateWrite::Merge(map) => format!(
            "write-state --merge {}{field} {}",
            handle.handle,
            crate::ir::literal_map_to_json(map)
        ),
    }
}

fn emit_spawn_agent(
    name: &str,
    model: &str,
    description: &str,
    input: &crate::ir::SpawnInput,
    output: Option<&crate::ir::TypedBinding>,
) -> String {
    use crate::ir::SpawnInput;
    let prompt = match input {
        SpawnInput::Prompt(text) => text.replace('"', "\\\""),
        SpawnInput::Structured(fields) => fields
            .iter()
            .map(|(k, v)| format!("{k}: {}", emit_spawn_value(v)))
            .collect::<Vec<_>>()
            .join(", "),
    };
    let mut out = format!(
        "Task(\n  prompt: \"{prompt}\",\n  subagent_type: \"{name}\",\n  model: \"{model}\",\n  description: \"{}\"\n)",
        description.replace('"', "\\\"")
    );
    if let Some(binding) = output {
        out.push_str(&format!("\n{} -> {}", binding.var_name, binding.type_hint.as_deref().unwrap_or("")));
    }
    out
}

fn emit_spawn_value(value: &crate::ir::SpawnInputValue) -> String {
    use crate::ir::SpawnInputValue;
    match value {
        SpawnInputValue::String(s) => format!("\"{s}\""),
        SpawnInputValue::Literal(l) => l.to_json(),
        SpawnInputValue::RuntimeVarRef { var_name, path } => render_jq_ref(var_name, path),
    }
}

fn emit_runtime_call(
    namespace: &str,
    function: &str,
    args: &crate::ir::LiteralMap,
    output_var: &str,
    runtime_path: &str,
) -> String {
    let json = crate::ir::literal_map_to_json(args).replace('\'', "'\\''");
    format!("{output_var}=$(node {runtime_path} {namespace}_{function} '{json}')")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{AgentHeader, InterpolatedPath};

    #[test]
    fn agent_frontmatter_omits_absent_optional_fields() {
        let fm = emit_agent_frontmatter("researcher", "Research", None, None);
        assert_eq!(fm, "---\nname: researcher\ndescription: Research\n---");
    }

    #[test]
    fn agent_frontmatter_matches_gsd_scenario() {
        let fm = emit_agent_frontmatter(
            "researcher",
            "Research",
            Some(&["Read".to_string(), "Grep".to_string(), "Glob".to_string()]),
            Some("cyan"),
        );
        assert_eq!(
            fm,
            "---\nname: researcher\ndescription: Research\ntools: Read Grep Glob\ncolor: cyan\n---"
        );
    }

    #[test]
    fn if_else_scenario_matches_spec() {
        let cond = crate::condition::Condition::Ref {
            var_name: "CTX".into(),
            path: vec!["error".into()],
        };
        let if_block = BlockNode::If {
            condition: cond,
            children: vec![BlockNode::Paragraph(vec![InlineNode::Text("A".into())])],
        };
        let else_block = BlockNode::Else(vec![BlockNode::Paragraph(vec![InlineNode::Text("B".into())])]);
        let mut state = EmitState::default();
        let rendered = format!(
            "{}\n\n{}",
            emit_block(&if_block, &mut state, ".claude/runtime/runtime.js"),
            emit_block(&else_block, &mut state, ".claude/runtime/runtime.js")
        );
        assert_eq!(
            rendered,
            "**If $(echo \"$CTX\" | jq -r '.error'):**\n\nA\n\n**Otherwise:**\n\nB"
        );
    }

    #[test]
    fn static_file_read_scenario() {
        let assign = BlockNode::Assign {
            target: "STATE".into(),
            from: DataSource::File {
                path: InterpolatedPath::literal(".planning/STATE.md"),
                optional: false,
            },
            comment: None,
            leading_blank: false,
        };
        assert_eq!(
            emit_block(&assign, &mut EmitState::default(), ".claude/runtime/runtime.js"),
            "```bash\nSTATE=$(cat .planning/STATE.md)\n```"
        );
    }

    #[test]
    fn quoted_value_scenario() {
        let assign = BlockNode::Assign {
            target: "NAME".into(),
            from: DataSource::Value { value: "my project".into(), raw: false },
            comment: None,
            leading_blank: false,
        };
        let rendered = emit_assign_line(&assign, ".claude/runtime/runtime.js");
        assert_eq!(rendered, "NAME=\"my project\"");
    }

    #[test]
    fn raw_value_scenario() {
        let assign = BlockNode::Assign {
            target: "NAME".into(),
            from: DataSource::Value { value: "my project".into(), raw: true },
            comment: None,
            leading_blank: false,
        };
        assert_eq!(emit_assign_line(&assign, ".claude/runtime/runtime.js"), "NAME=my project");
    }

    #[test]
    fn runtime_fn_data_source_substitutes_runtime_path_and_namespace() {
        let assign = BlockNode::Assign {
            target: "CTX".into(),
            from: DataSource::RuntimeFn {
                namespace: "planPhase".into(),
                function: "init".into(),
                args: vec![("arguments".to_string(), LiteralValue::String("$ARGUMENTS".into()))],
            },
            comment: None,
            leading_blank: false,
        };
        let rendered = emit_assign_line(&assign, ".claude/runtime/runtime.js");
        assert_eq!(
            rendered,
            "CTX=$(node .claude/runtime/runtime.js planPhase_init '{\"arguments\":\"$ARGUMENTS\"}')"
        );
    }

    #[test]
    fn leading_blank_adds_an_extra_blank_line_before_the_assign_block() {
        let plain = BlockNode::Assign {
            target: "NAME".into(),
            from: DataSource::Value { value: "x".into(), raw: true },
            comment: None,
            leading_blank: false,
        };
        let blanked = BlockNode::Assign {
            target: "NAME".into(),
            from: DataSource::Value { value: "x".into(), raw: true },
            comment: None,
            leading_blank: true,
        };
        let mut state = EmitState::default();
        let plain_rendered = emit_block(&plain, &mut state, ".claude/runtime/runtime.js");
        let blanked_rendered = emit_block(&blanked, &mut state, ".claude/runtime/runtime.js");
        assert_eq!(blanked_rendered, format!("\n{plain_rendered}"));
    }

    #[test]
    fn runtime_call_scenario() {
        let rendered = emit_runtime_call(
            "planPhase",
            "init",
            &vec![("arguments".to_string(), LiteralValue::String("$ARGUMENTS".into()))],
            "CTX",
            ".claude/runtime/runtime.js",
        );
        assert_eq!(
            rendered,
            "CTX=$(node .claude/runtime/runtime.js planPhase_init '{\"arguments\":\"$ARGUMENTS\"}')"
        );
    }

    #[test]
    fn exhaustiveness_smoke_every_variant_emits_nonempty() {
        let condition = crate::condition::Condition::Bool(true);
        let variants = vec![
            BlockNode::Heading { level: 1, children: vec![InlineNode::Text("x".into())] },
            BlockNode::Paragraph(vec![InlineNode::Text("x".into())]),
            BlockNode::List { ordered: false, start: None, items: vec![vec![BlockNode::Paragraph(vec![InlineNode::Text("x".into())])]] },
            BlockNode::CodeBlock { language: None, body: "x".into() },
            BlockNode::Blockquote(vec![BlockNode::Paragraph(vec![InlineNode::Text("x".into())])]),
            BlockNode::ThematicBreak,
            BlockNode::Group(vec![BlockNode::Paragraph(vec![InlineNode::Text("x".into())])]),
            BlockNode::RawMarkdown("x".into()),
            BlockNode::Break { message: None },
            BlockNode::Return { status: None, message: None },
            BlockNode::If { condition, children: vec![] },
        ];
        for variant in variants {
            let mut state = EmitState::default();
            assert!(!emit_block(&variant, &mut state, "runtime.js").is_empty());
        }
    }
}
