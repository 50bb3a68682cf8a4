//! `stages { … }` walking: stage directives, body selection, scoping.

use crate::error::ConvertError;
use crate::ir::types::*;
use crate::parse::args::ArgValue;
use crate::parse::types::{Block, Item};

use super::{directives, post, steps, when, Lowerer};

/// Inherited context while descending the stage tree.
pub(super) struct Scope {
    /// Names of the enclosing stages, outermost first.
    pub path: Vec<String>,
    /// Environment visible at this depth.
    pub env: Environment,
}

impl Scope {
    fn child(&self, name: &str, env: Environment) -> Scope {
        let mut path = self.path.clone();
        path.push(name.to_string());
        Scope { path, env }
    }
}

const BODY_KINDS: [&str; 4] = ["steps", "stages", "parallel", "matrix"];

/// Lower the `stage` blocks of a `stages { … }` or `parallel { … }` block.
pub(super) fn lower_stages(
    cx: &mut Lowerer,
    block: &Block,
    scope: &Scope,
) -> Result<Vec<Stage>, ConvertError> {
    let mut stages = Vec::new();
    for item in &block.items {
        match item {
            Item::Block(b) if b.name == "stage" => stages.push(lower_stage(cx, b, scope)?),
            _ => cx.unrecognized(scope.path.last().map(String::as_str), item),
        }
    }
    Ok(stages)
}

fn lower_stage(cx: &mut Lowerer, block: &Block, scope: &Scope) -> Result<Stage, ConvertError> {
    let name = block
        .parsed_args()
        .first_str()
        .unwrap_or_default()
        .to_string();
    let here = Some(name.as_str());

    let bodies: Vec<&Block> = block
        .blocks()
        .filter(|b| BODY_KINDS.contains(&b.name.as_str()))
        .collect();
    let body_block = match bodies.as_slice() {
        [single] => *single,
        [] => {
            return Err(ConvertError::lower(
                "L002",
                format!(
                    "stage '{}' (line {}) has no `steps`, `stages`, `parallel` or `matrix` body",
                    name, block.line
                ),
                Some(name),
            ));
        }
        [..] => {
            let kinds: Vec<&str> = bodies.iter().map(|b| b.name.as_str()).collect();
            return Err(ConvertError::lower(
                "L001",
                format!(
                    "stage '{}' (line {}) declares more than one body: {}",
                    name,
                    block.line,
                    kinds.join(", ")
                ),
                Some(name),
            ));
        }
    };

    let mut agent = None;
    let mut environment = Environment::new();
    let mut condition = None;
    let mut stage_post = Post::default();
    let mut options = Options::default();
    let mut tools = Vec::new();
    let mut input = None;
    let mut fail_fast = false;

    for item in &block.items {
        match (item.name(), item) {
            (kind, Item::Block(_)) if BODY_KINDS.contains(&kind) => {}
            ("agent", _) => agent = Some(directives::lower_agent(cx, item, here)),
            ("environment", Item::Block(b)) => {
                environment = directives::lower_environment(cx, b, here);
            }
            ("when", Item::Block(b)) => condition = when::lower_when(cx, b, &name),
            ("options", Item::Block(b)) => options = directives::lower_options(cx, b, here),
            ("tools", Item::Block(b)) => tools = directives::lower_tools(cx, b, here),
            ("post", Item::Block(b)) => stage_post = post::lower_post(cx, b, here),
            ("input", Item::Block(b)) => input = Some(lower_input(cx, b, &name)),
            ("failFast", Item::Statement(s)) => {
                fail_fast = s.parsed_args().first().and_then(ArgValue::as_bool).unwrap_or(true);
            }
            _ => cx.unrecognized(here, item),
        }
    }

    let mut effective_env = scope.env.clone();
    for (key, value) in &environment {
        effective_env.insert(key.clone(), value.clone());
    }
    let inner = scope.child(&name, effective_env.clone());

    let body = match body_block.name.as_str() {
        "steps" => StageBody::Steps(steps::lower_steps(cx, body_block, here)),
        "stages" => StageBody::Sequential(lower_stages(cx, body_block, &inner)?),
        "parallel" => StageBody::Parallel(lower_stages(cx, body_block, &inner)?),
        _ => StageBody::Matrix(lower_matrix(cx, body_block, &name, &inner)?),
    };

    Ok(Stage {
        name,
        path: inner.path,
        agent,
        when: condition,
        environment,
        effective_env,
        post: stage_post,
        options,
        tools,
        input,
        fail_fast,
        body,
        line: block.line,
    })
}

/// Stage-level `input { message …; ok …; submitter …; parameters { … } }`.
fn lower_input(cx: &mut Lowerer, block: &Block, stage: &str) -> ApprovalGate {
    let text = |key: &str| {
        block
            .find_statement(key)
            .and_then(|s| s.parsed_args().first().map(ArgValue::to_text))
    };
    let has_parameters = block.find_block("parameters").is_some();
    if has_parameters {
        cx.manual(
            Some(stage),
            WarningKind::UnsupportedConstruct,
            "approval gate collects parameters; deployment environments only approve or reject",
            Some(format!("input {{ {} }}", block.compact_body())),
        );
    }
    ApprovalGate {
        message: text("message").unwrap_or_else(|| "Approval required".to_string()),
        ok: text("ok"),
        submitter: text("submitter"),
        has_parameters,
    }
}

// ---------------------------------------------------------------------------
// matrix
// ---------------------------------------------------------------------------

fn lower_matrix(
    cx: &mut Lowerer,
    block: &Block,
    stage: &str,
    scope: &Scope,
) -> Result<Matrix, ConvertError> {
    let mut axes = Vec::new();
    let mut excludes = Vec::new();
    let mut stages = Vec::new();

    for item in &block.items {
        match (item.name(), item) {
            ("axes", Item::Block(b)) => {
                axes = b.blocks().filter(|a| a.name == "axis").map(lower_axis).collect();
            }
            ("excludes", Item::Block(b)) => {
                for exclude in b.blocks().filter(|e| e.name == "exclude") {
                    excludes.push(lower_exclude(cx, exclude, stage));
                }
            }
            ("stages", Item::Block(b)) => stages = lower_stages(cx, b, scope)?,
            _ => cx.unrecognized(Some(stage), item),
        }
    }

    let matrix = Matrix {
        axes,
        excludes,
        stages,
    };
    cx.manual(
        Some(stage),
        WarningKind::UnsupportedConstruct,
        format!(
            "matrix of {} cells runs as one job with strategy.matrix; inner stages become consecutive steps",
            matrix.cell_count()
        ),
        Some(format!("matrix {{ {} }}", block.compact_body())),
    );
    Ok(matrix)
}

fn lower_axis(block: &Block) -> Axis {
    Axis {
        name: block
            .find_statement("name")
            .and_then(|s| s.parsed_args().first().map(ArgValue::to_text))
            .unwrap_or_default(),
        values: block
            .find_statement("values")
            .map(|s| s.parsed_args().positional.iter().map(ArgValue::to_text).collect())
            .unwrap_or_default(),
    }
}

fn lower_exclude(cx: &mut Lowerer, block: &Block, stage: &str) -> Exclude {
    let mut entries = Vec::new();
    for axis in block.blocks().filter(|a| a.name == "axis") {
        let (values, negated) = match (axis.find_statement("values"), axis.find_statement("notValues")) {
            (Some(s), _) => (s, false),
            (None, Some(s)) => (s, true),
            (None, None) => continue,
        };
        let entry = ExcludeEntry {
            axis: axis
                .find_statement("name")
                .and_then(|s| s.parsed_args().first().map(ArgValue::to_text))
                .unwrap_or_default(),
            values: values.parsed_args().positional.iter().map(ArgValue::to_text).collect(),
            negated,
        };
        if negated {
            cx.manual(
                Some(stage),
                WarningKind::UnsupportedConstruct,
                format!(
                    "matrix exclude on `{}` uses notValues, which strategy.matrix.exclude cannot express",
                    entry.axis
                ),
                Some(format!("exclude {{ {} }}", block.compact_body())),
            );
        }
        entries.push(entry);
    }
    Exclude { entries }
}

#[cfg(test)]
mod tests {
    use crate::ir::types::*;
    use crate::lower::lower;
    use crate::parse::parse;

    fn lower_src(src: &str) -> Pipeline {
        lower(&parse(src).unwrap()).unwrap()
    }

    #[test]
    fn nested_environment_shadows_without_leaking() {
        let p = lower_src(
            r#"pipeline {
  environment { REGION = 'us-east-1'; TIER = 'base' }
  stages {
    stage('Outer') {
      environment { TIER = 'outer' }
      stages {
        stage('Inner') {
          environment { REGION = 'eu-west-1' }
          steps { sh 'echo $REGION' }
        }
        stage('Sibling') { steps { sh 'echo $REGION' } }
      }
    }
  }
}"#,
        );
        let outer = &p.stages[0];
        let inner = &outer.children()[0];
        let sibling = &outer.children()[1];
        assert_eq!(inner.path, vec!["Outer", "Inner"]);
        assert_eq!(
            inner.effective_env.get("REGION"),
            Some(&EnvValue::Value("eu-west-1".into()))
        );
        assert_eq!(
            inner.effective_env.get("TIER"),
            Some(&EnvValue::Value("outer".into()))
        );
        assert_eq!(
            sibling.effective_env.get("REGION"),
            Some(&EnvValue::Value("us-east-1".into()))
        );
        assert_eq!(p.environment.get("TIER"), Some(&EnvValue::Value("base".into())));
    }

    #[test]
    fn steps_and_stages_together_is_fatal() {
        let err = lower(
            &parse("pipeline { stages { stage('A') { steps { sh 'a' } stages { stage('B') { steps { sh 'b' } } } } } }")
                .unwrap(),
        )
        .unwrap_err();
        assert_eq!(err.code, "L001");
        assert_eq!(err.stage.as_deref(), Some("A"));
    }

    #[test]
    fn stage_without_body_is_fatal() {
        let err = lower(&parse("pipeline { stages { stage('A') { agent any } } }").unwrap()).unwrap_err();
        assert_eq!(err.code, "L002");
    }

    #[test]
    fn parallel_branches_and_fail_fast() {
        let p = lower_src(
            "pipeline { stages { stage('Tests') { failFast true\n parallel { stage('Unit') { steps { sh 'u' } } stage('Lint') { steps { sh 'l' } } } } } }",
        );
        let tests = &p.stages[0];
        assert!(tests.fail_fast);
        assert!(matches!(tests.body, StageBody::Parallel(ref c) if c.len() == 2));
        assert!(!tests.is_leaf());
    }

    #[test]
    fn matrix_axes_excludes_and_flattening_item() {
        let p = lower_src(
            r#"pipeline {
  stages {
    stage('Build') {
      matrix {
        axes {
          axis { name 'OS'; values 'linux', 'windows', 'mac' }
          axis { name 'JDK'; values '11', '17', '21' }
        }
        excludes {
          exclude {
            axis { name 'OS'; values 'mac' }
            axis { name 'JDK'; values '11' }
          }
        }
        stages {
          stage('Compile') { steps { sh './gradlew build' } }
        }
      }
    }
  }
}"#,
        );
        let StageBody::Matrix(ref m) = p.stages[0].body else {
            panic!("expected matrix body");
        };
        assert_eq!(m.axes.len(), 2);
        assert_eq!(m.cell_count(), 9);
        assert_eq!(m.excludes[0].entries.len(), 2);
        assert!(!m.excludes[0].entries[0].negated);
        assert_eq!(m.stages[0].path, vec!["Build", "Compile"]);
        assert_eq!(p.manual_items.len(), 1);
        assert!(p.manual_items[0].reason.contains("9 cells"));
    }

    #[test]
    fn stage_input_becomes_an_approval_gate() {
        let p = lower_src(
            "pipeline { stages { stage('Deploy') { input { message 'Ship to prod?'\n ok 'Ship'\n submitter 'release' } steps { sh 'deploy' } } } }",
        );
        let gate = p.stages[0].input.clone().unwrap();
        assert_eq!(gate.message, "Ship to prod?");
        assert_eq!(gate.ok.as_deref(), Some("Ship"));
        assert_eq!(gate.submitter.as_deref(), Some("release"));
        assert!(p.manual_items.is_empty());
        assert_eq!(p.approval_gate_count(), 1);
    }
}
