//! End-to-end pipeline tests: source text in, final Markdown out, exercising
//! parse -> extract -> transform -> emit together rather than any one stage
//! in isolation.

use std::path::PathBuf;

use dinja_compiler::ast_view;
use dinja_compiler::context::{namespace_from_basename, TransformContext};
use dinja_compiler::document::build_document;
use dinja_compiler::emit::emit_document;
use dinja_compiler::extractor;

fn compile(path: &str, text: &str) -> String {
    let path = PathBuf::from(path);
    let ast = ast_view::parse_source(&path, text).expect("parse");
    let namespace = namespace_from_basename(&path);
    let mut ctx = TransformContext::new(path.clone(), namespace);
    extractor::extract_declarations(&ast, &mut ctx).expect("extract");
    let (_, root, _) = ast.document_root().expect("default-exported component").clone();
    let doc = build_document(&root, &mut ctx).expect("build document");
    emit_document(&doc, ".claude/runtime/runtime.js")
}

fn try_compile(path: &str, text: &str) -> Result<String, dinja_compiler::error::CompileError> {
    let path = PathBuf::from(path);
    let ast = ast_view::parse_source(&path, text)?;
    let namespace = namespace_from_basename(&path);
    let mut ctx = TransformContext::new(path.clone(), namespace);
    extractor::extract_declarations(&ast, &mut ctx)?;
    let (_, root, _) = ast
        .document_root()
        .expect("default-exported component")
        .clone();
    let doc = build_document(&root, &mut ctx)?;
    Ok(emit_document(&doc, ".claude/runtime/runtime.js"))
}

#[test]
fn static_command_with_file_read_and_headings() {
    let source = r#"
export default function PlanPhase() {
  const state = useVariable('STATE');
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <h1>Plan phase</h1>
      <p>Reads the current planning state from disk.</p>
      <Assign var={state} from={file('.planning/STATE.md')} />
    </CommandDocument>
  );
}
"#;
    let markdown = compile("plan-phase.tsx", source);
    assert!(markdown.starts_with("---\n"));
    assert!(markdown.contains("name: plan"));
    assert!(markdown.contains("# Plan phase"));
    assert!(markdown.contains("STATE=$(cat .planning/STATE.md)"));
}

#[test]
fn runtime_command_with_if_else_and_runtime_call() {
    let source = r#"
import { F } from 'dinja/v3';

const Init = runtimeFn(init);

export default function PlanPhase() {
  const ctx = useRuntimeVar('CTX');
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <Init.Call args={{ arguments: '$ARGUMENTS' }} output={ctx} />
      <If condition={ctx.ready}>
        <p>Ready to continue.</p>
      </If>
      <Else>
        <p>Not ready yet.</p>
      </Else>
    </CommandDocument>
  );
}
"#;
    let markdown = compile("plan-phase.tsx", source);
    assert!(markdown.contains("CTX=$(node .claude/runtime/runtime.js planPhase_init"));
    assert!(markdown.contains("**If $(echo \"$CTX\" | jq -r '.ready'):**"));
    assert!(markdown.contains("**Otherwise:**"));
}

#[test]
fn agent_document_emits_hand_written_frontmatter() {
    let source = r#"
export default function Researcher() {
  return (
    <AgentDocument name="researcher" description="Research" tools={['Read', 'Grep', 'Glob']} color="cyan">
      <p>Investigates the codebase and reports findings.</p>
    </AgentDocument>
  );
}
"#;
    let markdown = compile("researcher.tsx", source);
    assert!(markdown.starts_with(
        "---\nname: researcher\ndescription: Research\ntools: Read Grep Glob\ncolor: cyan\n---"
    ));
}

#[test]
fn agent_document_rejects_runtime_only_content() {
    let source = r#"
export default function Researcher() {
  const ctx = useRuntimeVar('CTX');
  return (
    <AgentDocument name="researcher" description="Research">
      <If condition={ctx.ready}>
        <p>Ready.</p>
      </If>
    </AgentDocument>
  );
}
"#;
    let result = try_compile("researcher.tsx", source);
    assert!(result.is_err());
}

#[test]
fn same_file_local_component_expands_its_declared_body() {
    let source = r#"
function Card() {
  return <p>reusable card body</p>;
}

export default function PlanPhase() {
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <Card>this usage-site text must not appear</Card>
      <Card />
    </CommandDocument>
  );
}
"#;
    let markdown = compile("plan-phase.tsx", source);
    assert!(markdown.contains("reusable card body"));
    assert!(!markdown.contains("this usage-site text must not appear"));
}

#[test]
fn root_selection_is_unaffected_by_local_component_declared_after_it() {
    let source = r#"
export default function PlanPhase() {
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <Card />
    </CommandDocument>
  );
}

function Card() {
  return <p>helper declared after the root</p>;
}
"#;
    let markdown = compile("plan-phase.tsx", source);
    assert!(markdown.contains("name: plan"));
    assert!(markdown.contains("helper declared after the root"));
}

#[test]
fn runtime_fn_assign_emits_namespaced_runtime_call() {
    let source = r#"
import { F } from 'dinja/v3';

const Init = runtimeFn(init);

export default function PlanPhase() {
  const ctx = useRuntimeVar('CTX');
  const state = useVariable('STATE');
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <Assign var={state} from={Init({ arguments: '$ARGUMENTS' })} />
    </CommandDocument>
  );
}
"#;
    let markdown = compile("plan-phase.tsx", source);
    assert!(markdown.contains("STATE=$(node .claude/runtime/runtime.js planPhase_init '{\"arguments\":\"$ARGUMENTS\"}')"));
}

#[test]
fn unknown_element_surfaces_transform_error() {
    let source = r#"
export default function Plan() {
  return (
    <CommandDocument name="plan" description="Plans">
      <NotARealElement />
    </CommandDocument>
  );
}
"#;
    let result = try_compile("plan.tsx", source);
    assert!(result.is_err());
}
