//! The Runtime Bundler (spec §4.11): collects per-file runtime contributions
//! during compilation and, after all files are emitted, hands off to an
//! external JS bundler to produce the companion runtime script bundle.
//!
//! This module only builds the *entry source* handed to the external
//! bundler; invoking the bundler itself is the orchestrator's job (spec §5:
//! "the external bundler may itself be concurrent", a suspension point that
//! belongs outside the CPU-bound transform/emit pipeline).

use std::collections::BTreeMap;

use crate::error::CompileError;

/// One runtime-dialect file's contribution to the bundle.
#[derive(Debug, Clone)]
pub struct RuntimeContribution {
    /// Path to the file's companion TypeScript module exporting its runtime
    /// functions.
    pub module_path: std::path::PathBuf,
    /// Namespace derived from the file's basename.
    pub namespace: String,
    /// Function names actually referenced from this file's `<F.Call>` uses.
    pub used_functions: Vec<String>,
}

/// Accumulates contributions across all compiled files, keyed by namespace
/// (a `BTreeMap` so single-entry generation is deterministic across runs).
#[derive(Debug, Default)]
pub struct RuntimeCollector {
    contributions: BTreeMap<String, RuntimeContribution>,
}

impl RuntimeCollector {
    /// Creates an empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one file's contribution. A namespace collision (two files
    /// sharing a basename-derived namespace) is a bundling error.
    pub fn add(&mut self, contribution: RuntimeContribution) -> Result<(), CompileError> {
        if let Some(existing) = self.contributions.get(&contribution.namespace) {
            if existing.module_path != contribution.module_path {
                return Err(CompileError::Bundling {
                    namespaces: contribution.namespace.clone(),
                    message: format!(
                        "namespace collision between {} and {}",
                        existing.module_path.display(),
                        contribution.module_path.display()
                    ),
                });
            }
        }
        self.contributions.insert(contribution.namespace.clone(), contribution);
        Ok(())
    }

    /// True if no runtime-dialect file was compiled; the bundler is skipped
    /// entirely in this case.
    pub fn is_empty(&self) -> bool {
        self.contributions.is_empty()
    }

    /// Consumes the collector, yielding its contributions. Used to merge a
    /// per-worker collector into the orchestrator's shared one during
    /// parallel builds.
    pub fn into_contributions(self) -> Vec<(String, RuntimeContribution)> {
        self.contributions.into_iter().collect()
    }
}

/// Bundling strategy (spec §6 `--code-split`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleMode {
    /// One synthetic entry module re-exporting every namespace.
    SingleEntry,
    /// One dispatcher plus one output module per namespace.
    CodeSplit,
}

/// One synthesized source file to hand to the external bundler, plus its
/// intended output file name under `<runtime-dir>`.
pub struct SynthesizedModule {
    /// Output file name relative to the runtime output directory.
    pub output_name: String,
    /// Synthesized TypeScript/JavaScript source text.
    pub source: String,
}

/// Generates the synthesized entry module(s) for `mode`, grounded in spec
/// §4.11's exact re-export naming scheme (`ns_fn`) and dispatcher contract
/// (`argv[1]` function name, `argv[2]` JSON args, print the JSON result).
pub fn synthesize(collector: &RuntimeCollector, mode: BundleMode) -> Vec<SynthesizedModule> {
    match mode {
        BundleMode::SingleEntry => vec![synthesize_single_entry(collector)],
        BundleMode::CodeSplit => synthesize_code_split(collector),
    }
}

fn synthesize_single_entry(collector: &RuntimeCollector) -> SynthesizedModule {
    let mut source = String::new();
    let mut registrations = String::new();
    for contribution in collector.contributions.values() {
        let module_spec = contribution.module_path.display();
        for func in &contribution.used_functions {
            let ns = &contribution.namespace;
            source.push_str(&format!("import {{ {func} as {ns}_{func} }} from \"{module_spec}\";\n"));
            registrations.push_str(&format!("  {ns}_{func},\n"));
        }
    }
    source.push_str(&format!("const fns = {{\n{registrations}}};\n"));
    source.push_str(ENTRY_DISPATCHER_BODY);
    SynthesizedModule {
        output_name: "runtime.js".to_string(),
        source,
    }
}

fn synthesize_code_split(collector: &RuntimeCollector) -> Vec<SynthesizedModule> {
    let mut modules = Vec::new();
    let mut dispatcher = String::from(
        "const fnKey = process.argv[2];\nconst argsJson = process.argv[3];\nconst [namespace, fn] = fnKey.split(/_(.+)/).filter(Boolean);\n",
    );
    dispatcher.push_str("const modules = {\n");
    for (namespace, contribution) in &collector.contributions {
        dispatcher.push_str(&format!("  {namespace}: () => import(\"./{namespace}.js\"),\n"));
        modules.push(SynthesizedModule {
            output_name: format!("{namespace}.js"),
            source: format!(
                "export {{ {} }} from \"{}\";\n",
                contribution.used_functions.join(", "),
                contribution.module_path.display()
            ),
        });
    }
    dispatcher.push_str("};\n");
    dispatcher.push_str(DISPATCH_BODY);
    modules.insert(
        0,
        SynthesizedModule {
            output_name: "runtime.js".to_string(),
            source: dispatcher,
        },
    );
    modules
}

const ENTRY_DISPATCHER_BODY: &str = r#"
const fnKey = process.argv[2];
const argsJson = process.argv[3];
const target = fns[fnKey];
if (!target) {
  console.error(`unknown runtime function: ${fnKey}`);
  process.exit(1);
}
Promise.resolve(target(JSON.parse(argsJson || "{}"))).then((result) => {
  process.stdout.write(JSON.stringify(result));
});
"#;

const DISPATCH_BODY: &str = r#"
const mod = modules[namespace];
if (!mod) {
  console.error(`unknown namespace: ${namespace}`);
  process.exit(1);
}
mod().then((ns) => {
  const target = ns[fn];
  if (!target) {
    console.error(`unknown runtime function: ${fnKey}`);
    process.exit(1);
  }
  return Promise.resolve(target(JSON.parse(argsJson || "{}")));
}).then((result) => {
  process.stdout.write(JSON.stringify(result));
});
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_rejects_colliding_namespace() {
        let mut collector = RuntimeCollector::new();
        collector
            .add(RuntimeContribution {
                module_path: "a.runtime.ts".into(),
                namespace: "planPhase".into(),
                used_functions: vec!["init".into()],
            })
            .unwrap();
        let result = collector.add(RuntimeContribution {
            module_path: "b.runtime.ts".into(),
            namespace: "planPhase".into(),
            used_functions: vec!["other".into()],
        });
        assert!(result.is_err());
    }

    #[test]
    fn single_entry_synthesizes_one_module() {
        let mut collector = RuntimeCollector::new();
        collector
            .add(RuntimeContribution {
                module_path: "plan-phase.runtime.ts".into(),
                namespace: "planPhase".into(),
                used_functions: vec!["init".into()],
            })
            .unwrap();
        let modules = synthesize(&collector, BundleMode::SingleEntry);
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].output_name, "runtime.js");
        assert!(modules[0].source.contains("planPhase_init"));
    }

    #[test]
    fn code_split_synthesizes_one_module_per_namespace_plus_dispatcher() {
        let mut collector = RuntimeCollector::new();
        collector
            .add(RuntimeContribution {
                module_path: "plan-phase.runtime.ts".into(),
                namespace: "planPhase".into(),
                used_functions: vec!["init".into()],
            })
            .unwrap();
        let modules = synthesize(&collector, BundleMode::CodeSplit);
        assert_eq!(modules.len(), 2);
        assert!(modules.iter().any(|m| m.output_name == "planPhase.js"));
    }
}
