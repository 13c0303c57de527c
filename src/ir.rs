//! The Intermediate Representation: a closed set of node variants between
//! the transformer and the emitters.
//!
//! Every node carries its own `kind` via the enum discriminant itself (Rust
//! gives us this for free with a tagged enum); every emitter contains a
//! total match over the closed set, with a final `unreachable!()` arm that
//! only exists to satisfy the exhaustiveness checker for non-`#[non_exhaustive]`
//! enums imported from elsewhere — adding a variant here without handling it
//! in both emitters is a compile error, which is the single invariant this
//! module exists to protect (see spec §9).

use std::collections::HashMap;

/// Inline nodes, composable within paragraphs, headings, list items, and
/// table cells.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineNode {
    /// Literal text.
    Text(String),
    /// Bold run.
    Bold(Vec<InlineNode>),
    /// Italic run.
    Italic(Vec<InlineNode>),
    /// Inline code span; the literal body is not re-escaped.
    InlineCode(String),
    /// A link with a target URL and an inline-node label.
    Link {
        /// Link target.
        href: String,
        /// Label content.
        label: Vec<InlineNode>,
    },
    /// A hard line break.
    LineBreak,
    /// A runtime-variable reference (runtime dialect only): variable name
    /// plus dotted property path.
    RuntimeVarRef {
        /// Shell variable name (e.g. `CTX`).
        var_name: String,
        /// Dotted property path into the JSON value (e.g. `["error"]`).
        path: Vec<String>,
    },
}

/// Per-column alignment for [`BlockNode::Table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnAlignment {
    /// No explicit alignment.
    None,
    /// Left-aligned.
    Left,
    /// Center-aligned.
    Center,
    /// Right-aligned.
    Right,
}

/// One row of table cells, each cell a run of inline nodes.
pub type TableRow = Vec<Vec<InlineNode>>;

/// One list item: a sequence of block children.
pub type ListItem = Vec<BlockNode>;

/// Status tags for [`BlockNode::OnStatus`] and [`BlockNode::Return`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTag {
    /// The referenced agent call succeeded.
    Success,
    /// The referenced agent call was blocked.
    Blocked,
    /// The referenced agent call found nothing.
    NotFound,
    /// The referenced agent call errored.
    Error,
    /// The referenced agent call produced a checkpoint.
    Checkpoint,
}

impl StatusTag {
    /// Parses a status tag from its source-level spelling, returning `None`
    /// for anything outside the allowed set (a [`crate::error::CompileError::Validation`]
    /// at the call site).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SUCCESS" => Some(StatusTag::Success),
            "BLOCKED" => Some(StatusTag::Blocked),
            "NOT_FOUND" => Some(StatusTag::NotFound),
            "ERROR" => Some(StatusTag::Error),
            "CHECKPOINT" => Some(StatusTag::Checkpoint),
            _ => None,
        }
    }

    /// Renders the tag back to its source-level spelling.
    pub fn as_str(self) -> &'static str {
        match self {
            StatusTag::Success => "SUCCESS",
            StatusTag::Blocked => "BLOCKED",
            StatusTag::NotFound => "NOT_FOUND",
            StatusTag::Error => "ERROR",
            StatusTag::Checkpoint => "CHECKPOINT",
        }
    }
}

/// A data source for [`BlockNode::Assign`] (spec §3.5).
#[derive(Debug, Clone, PartialEq)]
pub enum DataSource {
    /// `file(path)`; `optional` maps to `2>/dev/null`.
    File {
        /// Path, possibly containing `${ident}` / `${ident.path}` segments.
        path: InterpolatedPath,
        /// Whether a missing file should be tolerated.
        optional: bool,
    },
    /// `bash(cmd)`.
    Bash {
        /// Command text, possibly containing interpolation segments.
        command: InterpolatedPath,
    },
    /// `value(str)`.
    Value {
        /// Literal value.
        value: String,
        /// When true, the value is emitted unquoted.
        raw: bool,
    },
    /// `env(name)`.
    Env {
        /// Environment variable name.
        name: String,
    },
    /// `runtimeFn(name, args)`, detected from a `const X = runtimeFn(fn)`
    /// binding (runtime dialect only).
    RuntimeFn {
        /// Namespace the dispatch key is prefixed with (the compiling
        /// file's own namespace, spec §4.6).
        namespace: String,
        /// Emitted function name (the wrapped callable's identifier).
        function: String,
        /// Literal-valued argument map.
        args: LiteralMap,
    },
}

/// A template-literal path with `${ident}` / `${ident.path}` segments
/// already resolved to either a literal run or a variable reference, per
/// spec §4.6.
#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedPath {
    /// Ordered sequence of literal text and variable-reference segments.
    pub segments: Vec<PathSegment>,
}

impl InterpolatedPath {
    /// Builds a path with no interpolation at all.
    pub fn literal(text: impl Into<String>) -> Self {
        InterpolatedPath {
            segments: vec![PathSegment::Literal(text.into())],
        }
    }
}

/// One segment of an [`InterpolatedPath`].
#[derive(Debug, Clone, PartialEq)]
pub enum PathSegment {
    /// Literal text, copied verbatim.
    Literal(String),
    /// A reference to a declared shell variable (`${NAME}` -> `$NAME`).
    ShellVar(String),
    /// A reference to a runtime-variable property path
    /// (`${ctx.a.b}` -> `$(echo "$CTX" | jq -r '.a.b')`).
    RuntimeVarPath {
        /// Shell variable name backing the runtime variable.
        var_name: String,
        /// Dotted property path.
        path: Vec<String>,
    },
}

/// Literal-only argument values accepted in runtime-call argument maps
/// (spec §4.8): string/number/boolean literals and nested literal objects.
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    /// String literal.
    String(String),
    /// Numeric literal (kept as its source text to avoid float round-trip
    /// surprises in the emitted JSON).
    Number(String),
    /// Boolean literal.
    Bool(bool),
    /// Nested object of literal values.
    Object(LiteralMap),
    /// Array of literal values.
    Array(Vec<LiteralValue>),
}

/// An ordered argument map (`args={{k: v, ...}}`). Kept ordered (`Vec` of
/// pairs rather than a `HashMap`) so emitted JSON matches source order,
/// which matters for the bit-exact RuntimeCall format in spec §6.
pub type LiteralMap = Vec<(String, LiteralValue)>;

impl LiteralValue {
    /// Serializes this literal value to JSON text, used both for
    /// `RuntimeCall` emission and `runtimeFn` data sources.
    pub fn to_json(&self) -> String {
        match self {
            LiteralValue::String(s) => serde_json::to_string(s).unwrap_or_default(),
            LiteralValue::Number(n) => n.clone(),
            LiteralValue::Bool(b) => b.to_string(),
            LiteralValue::Object(map) => {
                let mut out = String::from("{");
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&serde_json::to_string(k).unwrap_or_default());
                    out.push(':');
                    out.push_str(&v.to_json());
                }
                out.push('}');
                out
            }
            LiteralValue::Array(items) => {
                let mut out = String::from("[");
                for (i, v) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&v.to_json());
                }
                out.push(']');
                out
            }
        }
    }
}

/// Serializes an ordered [`LiteralMap`] to a JSON object, preserving
/// declaration order.
pub fn literal_map_to_json(map: &LiteralMap) -> String {
    LiteralValue::Object(map.clone()).to_json()
}

/// Structured spawn input (spec §3.6): either a literal prompt string, or a
/// mapping from property names to literal/runtime-variable values.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnInput {
    /// A literal prompt string, possibly containing `{brace}` placeholders
    /// that are preserved verbatim.
    Prompt(String),
    /// A structured input mapping.
    Structured(Vec<(String, SpawnInputValue)>),
}

/// One value in a structured [`SpawnInput`] mapping.
#[derive(Debug, Clone, PartialEq)]
pub enum SpawnInputValue {
    /// Literal string.
    String(String),
    /// JSON-serializable literal (number, bool, nested literal structure).
    Literal(LiteralValue),
    /// A reference to a runtime variable (dotted path allowed).
    RuntimeVarRef {
        /// Shell variable name.
        var_name: String,
        /// Dotted property path.
        path: Vec<String>,
    },
}

/// Optional typed binding for an agent's output, runtime dialect only.
#[derive(Debug, Clone, PartialEq)]
pub struct TypedBinding {
    /// Declared runtime-variable name the binding writes to.
    pub var_name: String,
    /// Opaque type-argument string, captured verbatim from the source's
    /// `useRuntimeVar<T>` generic argument.
    pub type_hint: Option<String>,
}

/// A typed state handle for [`BlockNode::ReadState`] / [`BlockNode::WriteState`].
#[derive(Debug, Clone, PartialEq)]
pub struct StateHandle {
    /// Identifier naming the state object (e.g. `phase`, `project`).
    pub handle: String,
    /// Dotted field path within the state object.
    pub field_path: Vec<String>,
}

/// The value side of a [`BlockNode::WriteState`]: either a direct value or a
/// merge payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StateWrite {
    /// Replace the field with this literal value.
    Value(LiteralValue),
    /// Shallow-merge this literal object into the field.
    Merge(LiteralMap),
}

/// Navigation options for [`BlockNode::OfferNext`].
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationOption {
    /// Label shown to the user/agent.
    pub label: String,
    /// Inline description of what choosing this option does.
    pub description: Vec<InlineNode>,
}

/// Block nodes: the static set from spec §3.3 plus the runtime-only
/// additions from spec §3.4, expressed as one closed union so every emitter
/// match is total over both dialects (the runtime emitter simply rejects the
/// runtime-only variants when asked to emit an `AgentDocument`, per the
/// Agent-purity invariant in spec §3.7/§8).
#[derive(Debug, Clone, PartialEq)]
pub enum BlockNode {
    /// Heading, level 1-6.
    Heading {
        /// Heading level, 1..=6.
        level: u8,
        /// Inline children.
        children: Vec<InlineNode>,
    },
    /// Paragraph of inline children.
    Paragraph(Vec<InlineNode>),
    /// Ordered or unordered list.
    List {
        /// Whether this is an ordered list.
        ordered: bool,
        /// Starting index for ordered lists.
        start: Option<u32>,
        /// List items, each a sequence of block children.
        items: Vec<ListItem>,
    },
    /// Fenced code block.
    CodeBlock {
        /// Optional language tag.
        language: Option<String>,
        /// Literal body.
        body: String,
    },
    /// Blockquote.
    Blockquote(Vec<BlockNode>),
    /// Horizontal rule.
    ThematicBreak,
    /// Table with header row, body rows, and optional per-column alignment.
    Table {
        /// Header row.
        header: TableRow,
        /// Body rows.
        rows: Vec<TableRow>,
        /// Per-column alignment, parallel to `header`.
        alignment: Vec<ColumnAlignment>,
    },
    /// A validated XML-like block: `<name attr="...">children</name>`.
    XmlBlock {
        /// Validated tag name (spec §3.7).
        name: String,
        /// Attribute map; an empty map produces no attributes.
        attributes: Vec<(String, String)>,
        /// Block children.
        children: Vec<BlockNode>,
    },
    /// Tightly-spaced group (produced by `<div>` with no `name` attribute).
    Group(Vec<BlockNode>),
    /// Literal Markdown passthrough.
    RawMarkdown(String),
    /// Indented block.
    Indent {
        /// Indentation level (each level is two spaces, per the emitter's
        /// list-nesting convention).
        level: u32,
        /// Block children.
        children: Vec<BlockNode>,
    },
    /// One shell assignment.
    Assign {
        /// Target shell variable name.
        target: String,
        /// Data source.
        from: DataSource,
        /// Optional inline comment.
        comment: Option<String>,
        /// Whether a blank line should precede this assignment.
        leading_blank: bool,
    },
    /// A sequence of [`BlockNode::Assign`] nodes emitted as one fenced shell
    /// block. A sentinel `<br/>` child in source inserts a blank line;
    /// represented here as `None` in the `items` sequence.
    AssignGroup {
        /// Ordered assign items; `None` marks a blank-line sentinel.
        items: Vec<Option<Box<BlockNode>>>,
    },
    /// Conditional rendering keyed off a prior agent call's status.
    OnStatus {
        /// Reference to the agent output being inspected.
        agent_ref: String,
        /// Required status.
        status: StatusTag,
        /// Block children shown when the status matches.
        children: Vec<BlockNode>,
    },
    /// A workflow step.
    Step {
        /// Step title.
        title: Vec<InlineNode>,
        /// Step body.
        body: Vec<BlockNode>,
    },
    /// A block signaling file references to the host.
    ExecutionContext {
        /// File paths, each emitted with `prefix` prepended.
        paths: Vec<String>,
        /// Prefix character, default `@`.
        prefix: char,
        /// Transformed children following the path list.
        children: Vec<BlockNode>,
    },
    /// A checklist of success criteria.
    SuccessCriteria(Vec<Vec<InlineNode>>),
    /// Navigation options offered to the user/agent.
    OfferNext(Vec<NavigationOption>),
    /// Reads a field from a typed state handle.
    ReadState {
        /// The state handle and field path.
        handle: StateHandle,
        /// Variable the read result is bound to.
        output_var: String,
    },
    /// Writes a field on a typed state handle.
    WriteState {
        /// The state handle and field path.
        handle: StateHandle,
        /// The value or merge payload being written.
        write: StateWrite,
    },
    /// Spawns a sub-agent.
    SpawnAgent {
        /// Agent name.
        name: String,
        /// Model identifier.
        model: String,
        /// Human-readable description.
        description: String,
        /// Literal prompt or structured input.
        input: SpawnInput,
        /// Optional typed output binding (runtime dialect only).
        output: Option<TypedBinding>,
    },

    // --- runtime-only variants (spec §3.4) ---
    /// Declares a runtime variable, optionally with a type descriptor.
    RuntimeVarDecl {
        /// Shell variable name.
        var_name: String,
        /// Opaque type descriptor, if present.
        type_hint: Option<String>,
    },
    /// Invokes a namespaced runtime function.
    RuntimeCall {
        /// Namespace the function lives under.
        namespace: String,
        /// Function name.
        function: String,
        /// Literal-valued argument map.
        args: LiteralMap,
        /// Output variable name.
        output_var: String,
    },
    /// `If` with its condition tree and body.
    If {
        /// Condition tree.
        condition: crate::condition::Condition,
        /// Block children shown when the condition holds.
        children: Vec<BlockNode>,
    },
    /// `Else`, paired by the dispatcher to the immediately preceding `If`.
    Else(Vec<BlockNode>),
    /// Bounded repetition.
    Loop {
        /// Positive integer bound.
        max: u32,
        /// Optional counter variable name.
        counter: Option<String>,
        /// Block children making up the loop body.
        children: Vec<BlockNode>,
    },
    /// Breaks out of the enclosing loop.
    Break {
        /// Optional message.
        message: Option<String>,
    },
    /// Returns from the current document, optionally with a status and message.
    Return {
        /// Optional status tag.
        status: Option<StatusTag>,
        /// Optional message.
        message: Option<String>,
    },
    /// Prompts the user with a question and options, binding the answer.
    AskUser {
        /// Question text.
        question: Vec<InlineNode>,
        /// Offered options.
        options: Vec<String>,
        /// Output variable name.
        output_var: String,
    },
}

impl BlockNode {
    /// True for variants that spec §3.4 marks runtime-only; used to enforce
    /// the Agent-purity invariant (spec §3.7/§8) independent of which
    /// emitter is active.
    pub fn is_runtime_only(&self) -> bool {
        matches!(
            self,
            BlockNode::RuntimeVarDecl { .. }
                | BlockNode::RuntimeCall { .. }
                | BlockNode::If { .. }
                | BlockNode::Else(_)
                | BlockNode::Loop { .. }
                | BlockNode::Break { .. }
                | BlockNode::Return { .. }
                | BlockNode::AskUser { .. }
        )
    }

    /// Recursively checks the Agent-purity invariant: no runtime-only
    /// variant may appear anywhere in the subtree.
    pub fn assert_agent_pure(&self) -> Result<(), &'static str> {
        if self.is_runtime_only() {
            return Err("runtime-only block variant in an AgentDocument");
        }
        for child in self.children() {
            child.assert_agent_pure()?;
        }
        Ok(())
    }

    /// Borrowed view over this node's direct block children, where it has
    /// any. Used by the purity check and by generic tree walks; does not
    /// recurse into inline content (inline nodes carry no runtime-only
    /// variants of their own, aside from `RuntimeVarRef`, which is checked
    /// separately by callers that care).
    pub fn children(&self) -> Vec<&BlockNode> {
        match self {
            BlockNode::Blockquote(children)
            | BlockNode::Group(children)
            | BlockNode::Indent { children, .. }
            | BlockNode::OnStatus { children, .. }
            | BlockNode::ExecutionContext { children, .. }
            | BlockNode::If { children, .. }
            | BlockNode::Else(children)
            | BlockNode::Loop { children, .. } => children.iter().collect(),
            BlockNode::XmlBlock { children, .. } => children.iter().collect(),
            BlockNode::List { items, .. } => items.iter().flatten().collect(),
            BlockNode::Step { body, .. } => body.iter().collect(),
            BlockNode::AssignGroup { items } => items
                .iter()
                .filter_map(|item| item.as_deref())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// Free-form header metadata for [`CommandDocument`].
pub type HeaderMap = HashMap<String, LiteralValue>;

/// Agent document header fields (spec §3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct AgentHeader {
    /// Registered agent name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Space-separated tool list; emitted as a single string, never an array.
    pub tools: Option<Vec<String>>,
    /// UI color tag.
    pub color: Option<String>,
    /// Optional typed input reference.
    pub input_type: Option<String>,
    /// Optional typed output reference.
    pub output_type: Option<String>,
}

/// Skill document header fields, structurally identical to [`AgentHeader`]
/// plus auxiliary file attachments (spec §3.1).
#[derive(Debug, Clone, PartialEq)]
pub struct SkillHeader {
    /// Registered skill name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Optional allowed-tools list.
    pub tools: Option<Vec<String>>,
    /// Auxiliary files carried alongside the compiled skill document.
    pub attachments: Vec<std::path::PathBuf>,
}

/// The three top-level documents, distinguished by `kind` (spec §3.1).
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    /// A command document.
    Command {
        /// Free-form header metadata.
        header: HeaderMap,
        /// Declared shell-variable names.
        declared_variables: Vec<String>,
        /// Declared runtime-function names.
        runtime_functions: Vec<String>,
        /// Ordered block sequence.
        body: Vec<BlockNode>,
    },
    /// An agent document. Runtime control-flow variants are forbidden in
    /// `body` by construction (spec §3.1, §3.7); callers should validate
    /// with [`BlockNode::assert_agent_pure`] before treating a document as
    /// final.
    Agent {
        /// Required agent header.
        header: AgentHeader,
        /// Ordered block sequence.
        body: Vec<BlockNode>,
    },
    /// A skill document, structurally identical to [`Document::Agent`].
    Skill {
        /// Required skill header.
        header: SkillHeader,
        /// Ordered block sequence.
        body: Vec<BlockNode>,
    },
}

impl Document {
    /// Validates the Agent-purity invariant across the whole document body.
    pub fn validate_agent_purity(&self) -> Result<(), &'static str> {
        match self {
            Document::Agent { body, .. } | Document::Skill { body, .. } => {
                for node in body {
                    node.assert_agent_pure()?;
                }
                Ok(())
            }
            Document::Command { .. } => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runtime_only_detection() {
        assert!(BlockNode::Break { message: None }.is_runtime_only());
        assert!(!BlockNode::ThematicBreak.is_runtime_only());
    }

    #[test]
    fn agent_purity_rejects_nested_runtime_variant() {
        let doc = Document::Agent {
            header: AgentHeader {
                name: "researcher".into(),
                description: "Research".into(),
                tools: None,
                color: None,
                input_type: None,
                output_type: None,
            },
            body: vec![BlockNode::Group(vec![BlockNode::Break { message: None }])],
        };
        assert!(doc.validate_agent_purity().is_err());
    }

    #[test]
    fn agent_purity_accepts_static_only_body() {
        let doc = Document::Agent {
            header: AgentHeader {
                name: "researcher".into(),
                description: "Research".into(),
                tools: None,
                color: None,
                input_type: None,
                output_type: None,
            },
            body: vec![BlockNode::Paragraph(vec![InlineNode::Text("hi".into())])],
        };
        assert!(doc.validate_agent_purity().is_ok());
    }

    #[test]
    fn literal_map_to_json_preserves_order() {
        let map: LiteralMap = vec![
            ("b".to_string(), LiteralValue::Number("1".into())),
            ("a".to_string(), LiteralValue::String("x".into())),
        ];
        assert_eq!(literal_map_to_json(&map), r#"{"b":1,"a":"x"}"#);
    }
}
