//! Assembler properties: idempotence, placeholder coverage and hoisting.

use std::collections::BTreeMap;

use optisynth_core::{
    interpreter_available, syntax_check, ExecutionSandbox, FragmentAssembler, ProgramRunner,
    RunContext, SandboxConfig, Template,
};

fn fragments(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

const TEMPLATE: &str = "\
import json
import math

GLOBAL_SCALE = 2


class OptimizationSystem:
    def targetfunction(self, x):
        # {{INSERT_OBJECTIVE_FUNCTION}}
        return float(\"inf\")

    def solve_optimization(self):
        # {{INSERT_OPTIMIZATION_ALGORITHM}}
        return {}


if __name__ == \"__main__\":
    print(json.dumps(OptimizationSystem().solve_optimization()))
";

fn messy_inputs() -> Vec<BTreeMap<String, String>> {
    vec![
        fragments(&[]),
        fragments(&[("OBJECTIVE_FUNCTION", "   "), ("OPTIMIZATION_ALGORITHM", "")]),
        fragments(&[
            ("OBJECTIVE_FUNCTION", "Here is the code:\n```python\ndef f(self, x):\n    return x[0] ** 2\n```"),
            ("OPTIMIZATION_ALGORITHM", "class Particle:\n    def __init__(self):\n        self.best = None\n\ndef solve(self):\n    swarm = [Particle() for _ in range(4)]\n    return {'pso': {'objective': 0.0}}"),
        ]),
        fragments(&[
            ("OBJECTIVE_FUNCTION", "\t\tdef f(self, x):\n\t\t\treturn sum(x)"),
            ("OPTIMIZATION_ALGORITHM", "def solve(self:\n    for i in range(3)\n        pass\n    return {}"),
        ]),
        fragments(&[
            ("OBJECTIVE_FUNCTION", "def f(self, x):\n    \"\"\"Sum of squares.\"\"\"\n    return sum(v * v for v in x)"),
            ("OPTIMIZATION_ALGORITHM", "@dataclass\nclass Config:\n    steps: int = 10\n\nclass Helper:\n    pass\n\nresult = {'ga': {'objective': 1.0}}\nreturn result"),
        ]),
    ]
}

#[test]
fn test_assembly_is_idempotent() {
    let template = Template::parse(TEMPLATE).unwrap();
    let assembler = FragmentAssembler::new();
    for input in messy_inputs() {
        let first = assembler.assemble(&template, &input);
        let second = assembler.assemble(&template, &input);
        assert_eq!(first.program.source(), second.program.source());
        assert_eq!(first.warnings, second.warnings);
    }
}

#[test]
fn test_every_placeholder_is_consumed() {
    let template = Template::parse(TEMPLATE).unwrap();
    let assembler = FragmentAssembler::new();
    for input in messy_inputs() {
        let program = assembler.assemble(&template, &input).program;
        for placeholder in template.placeholders() {
            assert!(
                !program.source().contains(&Template::marker(&placeholder.name)),
                "marker for {} survived",
                placeholder.name
            );
        }
        assert!(!program.source().contains("{{INSERT_"));
    }
}

#[test]
fn test_template_text_outside_insertions_is_preserved() {
    let template = Template::parse(TEMPLATE).unwrap();
    let input = fragments(&[
        ("OBJECTIVE_FUNCTION", "return x[0]"),
        ("OPTIMIZATION_ALGORITHM", "return {'a': {'objective': 0.0}}"),
    ]);
    let program = FragmentAssembler::new().assemble(&template, &input).program;
    let marker_free: Vec<&str> = TEMPLATE
        .lines()
        .filter(|l| !l.contains("{{INSERT_"))
        .collect();
    let produced: Vec<&str> = program.source().lines().collect();
    let mut cursor = produced.iter();
    for line in marker_free {
        assert!(
            cursor.any(|p| *p == line),
            "template line {line:?} missing or out of order"
        );
    }
}

#[test]
fn test_declarations_hoisted_once_before_first_use() {
    let template = Template::parse(TEMPLATE).unwrap();
    let input = &messy_inputs()[4];
    let assembly = FragmentAssembler::new().assemble(&template, input);
    let source = assembly.program.source();

    assert_eq!(assembly.hoisted, 2);
    assert_eq!(source.matches("class Config:").count(), 1);
    assert_eq!(source.matches("class Helper:").count(), 1);

    let config_at = source.find("@dataclass").unwrap();
    let helper_at = source.find("class Helper:").unwrap();
    let imports_end = source.find("import math").unwrap();
    let system_at = source.find("class OptimizationSystem").unwrap();
    let body_at = source.find("result = {'ga'").unwrap();

    assert!(imports_end < config_at);
    assert!(config_at < helper_at);
    assert!(helper_at < system_at);
    assert!(system_at < body_at);
}

#[test]
fn test_same_named_declarations_are_not_deduplicated() {
    let template = Template::parse(TEMPLATE).unwrap();
    let input = fragments(&[
        ("OBJECTIVE_FUNCTION", "class Helper:\n    a = 1\n\nreturn Helper.a"),
        ("OPTIMIZATION_ALGORITHM", "class Helper:\n    a = 2\n\nreturn {}"),
    ]);
    let source = FragmentAssembler::new()
        .assemble(&template, &input)
        .program
        .into_source();
    assert_eq!(source.matches("class Helper:").count(), 2);
    assert!(source.find("a = 1").unwrap() < source.find("a = 2").unwrap());
}

#[test]
fn test_default_template_bodies_indented_to_method_scope() {
    let template = Template::optimization_default().unwrap();
    let input = fragments(&[
        ("OBJECTIVE_FUNCTION", "def f(x):\n  total = 0\n  for v in x:\n    total += v * v\n  return total"),
        ("OPTIMIZATION_ALGORITHM", "return {'noop': {'objective': 0.0}}"),
    ]);
    let assembly = FragmentAssembler::new().assemble(&template, &input);
    let source = assembly.program.source();
    assert!(source.contains("\n        total = 0\n        for v in x:\n            total += v * v\n        return total\n"));
    assert!(optisynth_core::syntax_check(source).is_none(), "{source}");
}

const MAIN_BLOCK_TEMPLATE: &str = "import math\n\nif __name__ == \"__main__\":\n    # {{INSERT_MAIN}}\n";

const METHOD_TEMPLATE: &str = "\
class Greeter:
    def greet(self, x):
        # {{INSERT_BODY}}
        return None


print(Greeter().greet(1))
";

fn nested_class_program() -> String {
    let template = Template::parse(MAIN_BLOCK_TEMPLATE).unwrap();
    let input = fragments(&[("MAIN", "class P:\n    k = 2\n\nprint(P.k * math.pi)")]);
    FragmentAssembler::new()
        .assemble(&template, &input)
        .program
        .into_source()
}

fn flush_left_string_program() -> String {
    let template = Template::parse(METHOD_TEMPLATE).unwrap();
    let input = fragments(&[(
        "BODY",
        "def f(x):\n    msg = \"\"\"\nhello\n\"\"\"\n    return len(msg)",
    )]);
    FragmentAssembler::new()
        .assemble(&template, &input)
        .program
        .into_source()
}

#[test]
fn test_declaration_from_nested_site_hoisted_above_enclosing_block() {
    let source = nested_class_program();
    assert!(syntax_check(&source).is_none(), "{source}");

    let class_at = source.find("\nclass P:\n    k = 2\n").unwrap();
    let main_at = source.find("\nif __name__").unwrap();
    assert!(source.find("import math").unwrap() < class_at);
    assert!(class_at < main_at);
    assert!(source.ends_with("if __name__ == \"__main__\":\n    print(P.k * math.pi)\n"));
}

#[test]
fn test_multiline_string_body_matches_site_indentation() {
    let source = flush_left_string_program();
    assert!(syntax_check(&source).is_none(), "{source}");
    assert!(
        source.contains("    def greet(self, x):\n        msg = \"\"\"\nhello\n\"\"\"\n        return len(msg)\n"),
        "{source}"
    );
}

#[tokio::test]
async fn test_nested_and_string_fragments_run() {
    let config = SandboxConfig::default();
    if !interpreter_available(&config).await {
        eprintln!("python3 not available; skipping");
        return;
    }
    let sandbox = ExecutionSandbox::new(config).unwrap();
    let ctx = RunContext {
        session_id: "assembler-test".into(),
        iteration: 1,
        artifact: "assembled_program".into(),
    };

    let hoisted = optisynth_core::AssembledProgram::new(nested_class_program());
    let result = sandbox.run_source(&hoisted, &ctx).await.unwrap();
    assert!(result.success, "{:?}", result.error);
    assert!(result.stdout.trim().starts_with("6.28318"));

    let stringy = optisynth_core::AssembledProgram::new(flush_left_string_program());
    let result = sandbox.run_source(&stringy, &ctx).await.unwrap();
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.stdout.trim(), "7");
}
