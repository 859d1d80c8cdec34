//! Common test utilities for building templates and blocks.
use nagare::prelude::*;

/// Adds one to a number, treating anything else as zero.
#[allow(dead_code)]
pub fn increment(value: &Value) -> Value {
    Value::Number(value.as_f64().unwrap_or(0.0) + 1.0)
}

/// `y = x`
#[allow(dead_code)]
pub fn passthrough_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["x"]),
            NodeTemplate::output("out", ["y"]),
        ],
        vec![EdgeTemplate::new("in", "x", "out", "y")],
        IoInterface::new(["x"], ["y"]),
    )
}

/// `total = a + b`
#[allow(dead_code)]
pub fn sum_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["a", "b"]),
            NodeTemplate::sum("sum", 2),
            NodeTemplate::output("out", ["total"]),
        ],
        vec![
            EdgeTemplate::new("in", "a", "sum", "input-0"),
            EdgeTemplate::new("in", "b", "sum", "input-1"),
            EdgeTemplate::new("sum", "output-0", "out", "total"),
        ],
        IoInterface::new(["a", "b"], ["total"]),
    )
}

/// An input field driving a State node that is exposed as `current`.
#[allow(dead_code)]
pub fn state_template(initial: Option<Value>) -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["v"]),
            NodeTemplate::state("state", initial),
            NodeTemplate::output("out", ["current"]),
        ],
        vec![
            EdgeTemplate::new("in", "v", "state", "UpdateHandler"),
            EdgeTemplate::new("state", "State", "out", "current"),
        ],
        IoInterface::new(["v"], ["current"]),
    )
}

/// A State node that feeds `state + 1` back into itself.
#[allow(dead_code)]
pub fn counter_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::state("count", Some(Value::Number(0.0))),
            NodeTemplate::transform("inc", increment),
            NodeTemplate::output("out", ["count"]),
        ],
        vec![
            EdgeTemplate::new("count", "State", "inc", "input-0"),
            EdgeTemplate::new("inc", "output-0", "count", "UpdateHandler"),
            EdgeTemplate::new("count", "State", "out", "count"),
        ],
        IoInterface::new(Vec::<String>::new(), ["count"]),
    )
}

/// `latest` follows whichever of `a` and `b` was written last.
#[allow(dead_code)]
pub fn merge_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["a", "b"]),
            NodeTemplate::merge("merge", 2).allow_add_target_port(),
            NodeTemplate::output("out", ["latest"]),
        ],
        vec![
            EdgeTemplate::new("in", "a", "merge", "input-0"),
            EdgeTemplate::new("in", "b", "merge", "input-1"),
            EdgeTemplate::new("merge", "output-0", "out", "latest"),
        ],
        IoInterface::new(["a", "b"], ["latest"]),
    )
}

/// A Merge node whose output is incremented and fed straight back into it.
///
/// Without a State node in the loop this never settles.
#[allow(dead_code)]
pub fn divergent_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["x"]),
            NodeTemplate::merge("merge", 2),
            NodeTemplate::transform("inc", increment),
            NodeTemplate::output("out", ["y"]),
        ],
        vec![
            EdgeTemplate::new("in", "x", "merge", "input-0"),
            EdgeTemplate::new("merge", "output-0", "inc", "input-0"),
            EdgeTemplate::new("inc", "output-0", "merge", "input-1"),
            EdgeTemplate::new("merge", "output-0", "out", "y"),
        ],
        IoInterface::new(["x"], ["y"]),
    )
}

/// `position = { lat, lon }`
#[allow(dead_code)]
pub fn combine_template() -> ModelTemplate {
    ModelTemplate::new(
        vec![
            NodeTemplate::input("in", ["lat", "lon"]),
            NodeTemplate::combine("combine", ["lat", "lon"]),
            NodeTemplate::output("out", ["position"]),
        ],
        vec![
            EdgeTemplate::new("in", "lat", "combine", "input-0"),
            EdgeTemplate::new("in", "lon", "combine", "input-1"),
            EdgeTemplate::new("combine", "output-0", "out", "position"),
        ],
        IoInterface::new(["lat", "lon"], ["position"]),
    )
}

/// Builds and mounts a block against the global registry.
#[allow(dead_code)]
pub fn mounted(template: ModelTemplate, input: &[(&str, Value)]) -> ModelBlock {
    let mut block = ModelBlock::builder(template)
        .input(input.iter().map(|(field, value)| (*field, value.clone())))
        .build()
        .expect("Failed to build block");
    block.mount().expect("Failed to mount block");
    block
}

/// Reads a single output field.
#[allow(dead_code)]
pub fn output(block: &ModelBlock, field: &str) -> Value {
    block.get_output().expect("Failed to read outputs")[field].clone()
}
