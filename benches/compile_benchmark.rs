//! Benchmarks the per-file compilation pipeline (parse -> extract -> build
//! document -> emit) end to end, the same boundary `orchestrator::compile_file`
//! drives in production.

use std::path::PathBuf;

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use dinja_compiler::ast_view;
use dinja_compiler::context::{namespace_from_basename, TransformContext};
use dinja_compiler::document::build_document;
use dinja_compiler::emit::emit_document;
use dinja_compiler::extractor;

const COMMAND_SOURCE: &str = r#"
export default function Plan() {
  const ctx = useRuntimeVar<PlanContext>('CTX');
  const state = useVariable('STATE');
  return (
    <CommandDocument name="plan" description="Plans the next phase">
      <h1>Plan phase</h1>
      <p>Reads current state and decides the next step.</p>
      <Assign var={state} from={file('.claude/state/plan.json')} />
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

fn compile_once(text: &str) -> String {
    let path = PathBuf::from("plan-phase.tsx");
    let ast = ast_view::parse_source(&path, text).expect("parse");
    let namespace = namespace_from_basename(&path);
    let mut ctx = TransformContext::new(path.clone(), namespace);
    extractor::extract_declarations(&ast, &mut ctx).expect("extract");
    let (_, root, _) = ast
        .document_root()
        .expect("default-exported component")
        .clone();
    let doc = build_document(&root, &mut ctx).expect("build document");
    emit_document(&doc, ".claude/runtime/runtime.js")
}

fn bench_compile_pipeline(c: &mut Criterion) {
    c.bench_function("compile_command_document", |b| {
        b.iter(|| compile_once(black_box(COMMAND_SOURCE)));
    });
}

criterion_group!(benches, bench_compile_pipeline);
criterion_main!(benches);
