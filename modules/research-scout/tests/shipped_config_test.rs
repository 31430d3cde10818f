//! The checked-in config and prompts load and validate.

use std::path::PathBuf;

use research_common::{load_config, PromptRegistry, SchemaRegistry, CONTENT_ANALYSIS_TASK};

fn config_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config/research.toml")
}

#[test]
fn shipped_config_validates() {
    let path = config_path();
    let (config, value) = load_config(&path).unwrap();
    config.validate(&SchemaRegistry::with_defaults()).unwrap();

    let prompts = PromptRegistry::load(&config.prompts, path.parent().unwrap(), &value).unwrap();

    let generation = prompts.query_generation("ACME stock outlook", "2026", "October");
    assert!(generation.system.contains("equity and macro markets"));
    assert!(generation.user.contains("Base query: ACME stock outlook"));
    assert!(generation.user.contains("October 2026"));

    let analysis = prompts.content_analysis("https://a.example", "Text only", "ACME beat estimates");
    assert!(analysis.user.contains("CONTENT TYPE: Text only"));
    assert!(!analysis.user.contains("{{"));

    let task = config.task(CONTENT_ANALYSIS_TASK).unwrap();
    assert_eq!(task.schema_config.as_ref().unwrap().schema_name, "MarketSummary");
}
