//! Lowering phase: block tree → Pipeline IR.
//!
//! Walks the tree once. Structural problems are fatal; everything else that
//! cannot be represented faithfully becomes a [`ManualItem`] and lowering
//! carries on.

mod directives;
mod post;
mod script;
mod stages;
mod steps;
mod when;

use crate::error::ConvertError;
use crate::ir::types::*;
use crate::parse::types::{BlockTree, Item};

/// Lower a parsed block tree into a [`Pipeline`].
pub fn lower(tree: &BlockTree) -> Result<Pipeline, ConvertError> {
    let mut cx = Lowerer::default();
    let root = &tree.pipeline;

    // Parameters first: conditions anywhere in the tree may test them.
    if let Some(block) = root.find_block("parameters") {
        cx.parameters = directives::lower_parameters(&mut cx, block);
    }

    let mut agent = Agent::Any;
    let mut environment = Environment::new();
    let mut options = Options::default();
    let mut triggers = Vec::new();
    let mut tools = Vec::new();
    let mut post = Post::default();
    let mut libraries = tree.preamble.libraries.clone();
    let mut stages_block = None;

    for item in &root.items {
        match (item.name(), item) {
            ("agent", _) => agent = directives::lower_agent(&mut cx, item, None),
            ("parameters", _) => {}
            ("environment", Item::Block(b)) => {
                environment = directives::lower_environment(&mut cx, b, None);
            }
            ("options", Item::Block(b)) => options = directives::lower_options(&mut cx, b, None),
            ("triggers", Item::Block(b)) => triggers = directives::lower_triggers(&mut cx, b),
            ("tools", Item::Block(b)) => tools = directives::lower_tools(&mut cx, b, None),
            ("libraries", Item::Block(b)) => {
                for lib in b.statements() {
                    libraries.extend(lib.parsed_args().first().map(|v| v.to_text()));
                }
            }
            ("stages", Item::Block(b)) => stages_block = Some(b),
            ("post", Item::Block(b)) => post = post::lower_post(&mut cx, b, None),
            _ => cx.unrecognized(None, item),
        }
    }

    let Some(stages_block) = stages_block else {
        return Err(ConvertError::lower(
            "L003",
            "pipeline has no `stages { … }` block",
            None,
        ));
    };

    for lib in &libraries {
        cx.manual(
            None,
            WarningKind::UnsupportedConstruct,
            format!(
                "shared library `{}`: its custom steps must be reimplemented as actions",
                lib
            ),
            None,
        );
    }

    let scope = stages::Scope {
        path: Vec::new(),
        env: environment.clone(),
    };
    let stages = stages::lower_stages(&mut cx, stages_block, &scope)?;

    for def in &tree.trailing {
        cx.manual(
            None,
            WarningKind::UnsupportedConstruct,
            format!(
                "helper function `{}` is not translated; inline its logic where it is called",
                def.args.split('(').next().unwrap_or(&def.args).trim()
            ),
            Some(def.header()),
        );
    }

    let pipeline = Pipeline {
        agent,
        parameters: cx.parameters,
        environment,
        stages,
        post,
        options,
        triggers,
        tools,
        credentials: cx.credentials,
        libraries,
        manual_items: cx.manual_items,
    };
    log::debug!(
        "lowered {} top-level stages, {} parameters, {} credentials, {} manual items",
        pipeline.stages.len(),
        pipeline.parameters.len(),
        pipeline.credentials.len(),
        pipeline.manual_items.len()
    );
    Ok(pipeline)
}

/// Accumulated state while walking the tree.
#[derive(Default)]
pub(crate) struct Lowerer {
    parameters: Vec<Parameter>,
    credentials: Vec<CredentialRef>,
    manual_items: Vec<ManualItem>,
}

impl Lowerer {
    fn manual(
        &mut self,
        stage: Option<&str>,
        kind: WarningKind,
        reason: impl Into<String>,
        raw: Option<String>,
    ) {
        let reason = reason.into();
        log::warn!(
            "manual item ({:?}) in {}: {}",
            kind,
            stage.unwrap_or("pipeline"),
            reason
        );
        self.manual_items.push(ManualItem {
            stage: stage.map(String::from),
            kind,
            reason,
            raw,
        });
    }

    fn unrecognized(&mut self, stage: Option<&str>, item: &Item) {
        self.manual(
            stage,
            WarningKind::UnrecognizedDirective,
            format!("unrecognized directive `{}`", item.name()),
            Some(item.snippet()),
        );
    }

    /// Record a credential id; only the first use of each id is kept.
    fn credential(&mut self, id: &str, usage: CredentialUsage) {
        if !self.credentials.iter().any(|c| c.id == id) {
            self.credentials.push(CredentialRef {
                id: id.to_string(),
                usage,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse;

    fn lower_src(src: &str) -> Pipeline {
        lower(&parse(src).unwrap()).unwrap()
    }

    #[test]
    fn missing_stages_is_fatal() {
        let err = lower(&parse("pipeline { agent any }").unwrap()).unwrap_err();
        assert_eq!(err.code, "L003");
    }

    #[test]
    fn unknown_pipeline_directive_is_a_manual_item() {
        let p = lower_src(
            "pipeline {\n  agent any\n  customThing { foo 'bar' }\n  stages { stage('A') { steps { sh 'a' } } }\n}",
        );
        assert_eq!(p.manual_items.len(), 1);
        assert_eq!(p.manual_items[0].kind, WarningKind::UnrecognizedDirective);
        assert!(p.manual_items[0].raw.as_deref().unwrap().contains("customThing"));
    }

    #[test]
    fn libraries_and_helpers_are_flagged() {
        let p = lower_src(
            "@Library('ci-lib') _\npipeline { stages { stage('A') { steps { sh 'a' } } } }\ndef helper() { echo 'x' }\n",
        );
        assert_eq!(p.libraries, vec!["ci-lib"]);
        assert_eq!(p.manual_items.len(), 2);
        assert!(p.manual_items[1].reason.contains("helper"));
    }

    #[test]
    fn credentials_are_distinct_in_first_use_order() {
        let p = lower_src(
            r#"pipeline {
  environment {
    TOKEN = credentials('api-token')
  }
  stages {
    stage('A') {
      steps {
        withCredentials([string(credentialsId: 'api-token', variable: 'T'), usernamePassword(credentialsId: 'nexus', usernameVariable: 'U', passwordVariable: 'P')]) {
          sh 'deploy'
        }
      }
    }
  }
}"#,
        );
        let ids: Vec<&str> = p.credentials.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["api-token", "nexus"]);
        assert!(matches!(
            p.credentials[0].usage,
            CredentialUsage::Environment { .. }
        ));
    }
}
