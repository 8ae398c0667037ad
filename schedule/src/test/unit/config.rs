use std::collections::HashMap;

use test_case::test_case;

use crate::config::{GraphType, NddmaPolicy, OptimizerOptions, PlatformConfig};

fn options_from(vars: &[(&str, &str)]) -> OptimizerOptions {
    let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    OptimizerOptions::from_vars(|name| vars.get(name).cloned())
}

#[test]
fn builder_defaults_match_standard_platform() {
    assert_eq!(PlatformConfig::builder().build(), PlatformConfig::standard());
    let lite = PlatformConfig::builder().core_num(8).ub_size(128 * 1024).max_concat_inputs(16).build();
    assert_eq!(lite.core_num, 8);
    assert_eq!(lite.workspace_align, 512);
}

#[test]
fn no_variables_gives_defaults() {
    assert_eq!(options_from(&[]), OptimizerOptions::default());
    assert_eq!(OptimizerOptions::builder().build(), OptimizerOptions::default());
}

#[test_case("asc_backend", GraphType::AscBackend ; "snake case")]
#[test_case("ASC_GRAPH", GraphType::AscGraph ; "upper case")]
#[test_case("bogus", GraphType::AscGraph ; "unknown falls back")]
fn graph_type_from_env(value: &str, expected: GraphType) {
    assert_eq!(options_from(&[("TESSERA_GRAPH_TYPE", value)]).graph_type, expected);
}

#[test_case("1", true)]
#[test_case("true", true)]
#[test_case("0", false)]
fn group_parallel_from_env(value: &str, expected: bool) {
    assert_eq!(options_from(&[("TESSERA_GROUP_PARALLEL", value)]).enable_group_parallel, expected);
}

#[test]
fn nddma_and_double_buffer_from_env() {
    let options = options_from(&[("TESSERA_NDDMA", "force"), ("TESSERA_NO_DOUBLE_BUFFER", "1")]);
    assert_eq!(options.nddma, NddmaPolicy::Force);
    assert!(!options.double_buffer);
}
