//! Block lifecycle and propagation tests
//!
//! Exercises mounted blocks end to end through the public API.
mod common;
use common::*;
use nagare::prelude::*;
use nagare::trace::StepTrigger;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::sync::Arc;

#[cfg(test)]
mod lifecycle_tests {
    use super::*;

    #[test]
    fn test_operations_before_mount_fail() {
        let mut block = ModelBlock::new(passthrough_template(), Vec::new()).unwrap();
        assert_eq!(block.lifecycle(), Lifecycle::Unmounted);
        assert_eq!(block.get_output(), Err(BlockError::NotMounted));
        assert_eq!(
            block.set_input("x", 1.0).map(|_| ()),
            Err(BlockError::NotMounted)
        );
        assert_eq!(block.tick().map(|_| ()), Err(BlockError::NotMounted));
    }

    #[test]
    fn test_mount_twice_fails() {
        let mut block = mounted(passthrough_template(), &[]);
        assert_eq!(block.lifecycle(), Lifecycle::Mounted);
        assert_eq!(block.mount().map(|_| ()), Err(BlockError::AlreadyMounted));
    }

    #[test]
    fn test_teardown_releases_block() {
        let mut block = mounted(passthrough_template(), &[("x", Value::from(1.0))]);
        block.teardown().unwrap();

        assert_eq!(block.lifecycle(), Lifecycle::TornDown);
        assert!(block.template().is_none());
        assert_eq!(block.get_output(), Err(BlockError::TornDown));
        assert_eq!(block.set_input("x", 2.0).map(|_| ()), Err(BlockError::TornDown));
        assert_eq!(block.mount().map(|_| ()), Err(BlockError::TornDown));
        assert_eq!(block.teardown(), Err(BlockError::TornDown));
    }

    #[test]
    fn test_start_builds_and_mounts() {
        let block = nagare::start(
            passthrough_template(),
            [("x".to_string(), Value::from(3.0))],
        )
        .unwrap();
        assert_eq!(block.lifecycle(), Lifecycle::Mounted);
        assert_eq!(output(&block, "y"), Value::Number(3.0));
    }

    #[test]
    fn test_unknown_input_field_is_rejected() {
        let result = ModelBlock::builder(passthrough_template())
            .with_input("nope", Value::from(1.0))
            .build();
        assert!(matches!(
            result,
            Err(BlockError::UnknownInputField(ref field)) if field == "nope"
        ));

        let mut block = mounted(passthrough_template(), &[]);
        assert_eq!(
            block.set_input("nope", 1.0).map(|_| ()),
            Err(BlockError::UnknownInputField("nope".to_string()))
        );
    }

    #[test]
    fn test_divergent_mount_leaves_block_unmounted() {
        let mut block = ModelBlock::builder(divergent_template())
            .with_input("x", Value::from(1.0))
            .build()
            .unwrap();
        assert_eq!(block.iteration_limit(), 256);

        let result = block.mount();
        assert_eq!(
            result.map(|_| ()),
            Err(BlockError::PropagationDiverged { limit: 256 })
        );
        assert_eq!(block.lifecycle(), Lifecycle::Unmounted);
    }

    #[test]
    fn test_block_config_sets_iteration_limit() {
        let mut block = ModelBlock::builder(divergent_template())
            .with_input("x", Value::from(1.0))
            .config(BlockConfig {
                iteration_factor: 1,
                min_iteration_limit: 8,
            })
            .build()
            .unwrap();
        assert_eq!(
            block.mount().map(|_| ()),
            Err(BlockError::PropagationDiverged { limit: 8 })
        );
    }
}

#[cfg(test)]
mod propagation_tests {
    use super::*;

    #[test]
    fn test_every_output_field_is_present() {
        let block = mounted(passthrough_template(), &[]);
        let outputs = block.get_output().unwrap();
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs["y"], Value::Null);
    }

    #[test]
    fn test_sum_follows_input_changes() {
        let mut block = mounted(
            sum_template(),
            &[("a", Value::from(1.0)), ("b", Value::from(2.0))],
        );
        assert_eq!(output(&block, "total"), Value::Number(3.0));

        block.set_input("b", 5.0).unwrap();
        assert_eq!(output(&block, "total"), Value::Number(6.0));
    }

    #[test]
    fn test_sum_treats_unset_input_as_zero() {
        let block = mounted(sum_template(), &[("a", Value::from(4.0))]);
        assert_eq!(output(&block, "total"), Value::Number(4.0));
    }

    #[test]
    fn test_unchanged_input_stops_at_input_node() {
        let mut block = mounted(
            sum_template(),
            &[("a", Value::from(1.0)), ("b", Value::from(2.0))],
        );
        let report = block.set_input("a", 1.0).unwrap();
        assert_eq!(report.evaluations, 1);
        assert!(!report.evaluated("sum"));
    }

    #[test]
    fn test_failed_pass_rolls_back() {
        let mut block = mounted(
            sum_template(),
            &[("a", Value::from(1.0)), ("b", Value::from(2.0))],
        );
        let result = block.set_input("a", true);
        assert!(matches!(
            result,
            Err(BlockError::OperatorEvaluation {
                ref node_id,
                source: OperatorError::TypeMismatch { .. },
            }) if node_id == "sum"
        ));
        assert_eq!(output(&block, "total"), Value::Number(3.0));
        assert_eq!(
            block.port_value(&PortAddress::new("in", "a")),
            Some(&Value::Number(1.0))
        );

        // The block stays usable after a failed pass.
        block.set_input("a", 10.0).unwrap();
        assert_eq!(output(&block, "total"), Value::Number(12.0));
    }

    #[test]
    fn test_merge_forwards_latest_write() {
        let mut block = mounted(merge_template(), &[]);
        block.set_input("a", 1.0).unwrap();
        assert_eq!(output(&block, "latest"), Value::Number(1.0));
        block.set_input("b", 2.0).unwrap();
        assert_eq!(output(&block, "latest"), Value::Number(2.0));

        let report = block.set_input("a", 3.0).unwrap();
        assert_eq!(output(&block, "latest"), Value::Number(3.0));

        let step = report.steps_for("merge").next().unwrap();
        assert_eq!(step.trigger, StepTrigger::Port("input-0".to_string()));
        assert_eq!(
            step.emitted,
            vec![("output-0".to_string(), Value::Number(3.0))]
        );
    }

    #[test]
    fn test_combine_builds_object_from_present_ports() {
        let mut block = mounted(combine_template(), &[("lat", Value::from(1.0))]);
        let mut expected = BTreeMap::new();
        expected.insert("lat".to_string(), Value::Number(1.0));
        assert_eq!(output(&block, "position"), Value::Object(expected.clone()));

        block.set_input("lon", 2.0).unwrap();
        expected.insert("lon".to_string(), Value::Number(2.0));
        assert_eq!(output(&block, "position"), Value::Object(expected));
    }

    #[test]
    fn test_const_state_fires_on_mount() {
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["a"]),
                NodeTemplate::const_state("ten", Value::from(10.0)),
                NodeTemplate::sum("sum", 2),
                NodeTemplate::output("out", ["total"]),
            ],
            vec![
                EdgeTemplate::new("in", "a", "sum", "input-0"),
                EdgeTemplate::new("ten", "State", "sum", "input-1"),
                EdgeTemplate::new("sum", "output-0", "out", "total"),
            ],
            IoInterface::new(["a"], ["total"]),
        );
        let mut block = mounted(template, &[]);
        assert_eq!(output(&block, "total"), Value::Number(10.0));

        block.set_input("a", 5.0).unwrap();
        assert_eq!(output(&block, "total"), Value::Number(15.0));
    }

    #[test]
    fn test_custom_nodes() {
        let max = CustomFn::new(|input: CustomInput<'_>| {
            let max = input
                .inputs
                .iter()
                .flatten()
                .filter_map(Value::as_f64)
                .fold(f64::MIN, f64::max);
            Ok(CustomOutput {
                outputs: vec![Some(Value::Number(max))],
                state: None,
            })
        });
        let answer = CustomFn::new(|_input: CustomInput<'_>| {
            Ok(CustomOutput {
                outputs: vec![Some(Value::Number(42.0))],
                state: None,
            })
        });
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["a"]),
                NodeTemplate::custom(
                    "answer",
                    Vec::new(),
                    vec![PortSpec::new("value")],
                    answer,
                ),
                NodeTemplate::custom(
                    "max",
                    vec![PortSpec::new("lhs"), PortSpec::new("rhs")],
                    vec![PortSpec::new("max")],
                    max,
                ),
                NodeTemplate::output("out", ["max"]),
            ],
            vec![
                EdgeTemplate::new("in", "a", "max", "lhs"),
                EdgeTemplate::new("answer", "value", "max", "rhs"),
                EdgeTemplate::new("max", "max", "out", "max"),
            ],
            IoInterface::new(["a"], ["max"]),
        );
        let mut block = mounted(template, &[]);
        assert_eq!(output(&block, "max"), Value::Number(42.0));

        block.set_input("a", 100.0).unwrap();
        assert_eq!(output(&block, "max"), Value::Number(100.0));
    }
}

#[cfg(test)]
mod state_tests {
    use super::*;

    #[test]
    fn test_state_settles_to_latest_input() {
        let mut block = mounted(state_template(None), &[("v", Value::from(1.0))]);
        assert_eq!(output(&block, "current"), Value::Number(1.0));

        block.set_input("v", 2.0).unwrap();
        assert_eq!(output(&block, "current"), Value::Number(2.0));
        assert_eq!(block.node_state("state"), Some(&Value::Number(2.0)));
    }

    #[test]
    fn test_initial_input_wins_over_state_default() {
        let block = mounted(
            state_template(Some(Value::from(0.0))),
            &[("v", Value::from(5.0))],
        );
        assert_eq!(output(&block, "current"), Value::Number(5.0));
    }

    #[test]
    fn test_indirect_input_wins_over_state_default() {
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["v"]),
                NodeTemplate::transform("copy", |v: &Value| v.clone()),
                NodeTemplate::state("state", Some(Value::from(0.0))),
                NodeTemplate::output("out", ["current"]),
            ],
            vec![
                EdgeTemplate::new("in", "v", "copy", "input-0"),
                EdgeTemplate::new("copy", "output-0", "state", "UpdateHandler"),
                EdgeTemplate::new("state", "State", "out", "current"),
            ],
            IoInterface::new(["v"], ["current"]),
        );
        let mut block = ModelBlock::builder(template)
            .with_input("v", Value::from(5.0))
            .build()
            .unwrap();
        let report = block.mount().unwrap();

        assert_eq!(output(&block, "current"), Value::Number(5.0));
        assert!(!block.has_pending_feedback());
        assert_eq!(report.steps_for("state").count(), 1);
    }

    #[test]
    fn test_state_evaluates_once_per_pass() {
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["a", "b"]),
                NodeTemplate::state("state", None),
                NodeTemplate::output("out", ["current"]),
            ],
            vec![
                EdgeTemplate::new("in", "a", "state", "UpdateHandler"),
                EdgeTemplate::new("in", "b", "state", "UpdateHandler"),
                EdgeTemplate::new("state", "State", "out", "current"),
            ],
            IoInterface::new(["a", "b"], ["current"]),
        );
        let mut block = ModelBlock::builder(template)
            .with_input("a", Value::from(1.0))
            .with_input("b", Value::from(2.0))
            .build()
            .unwrap();
        let report = block.mount().unwrap();

        assert_eq!(report.steps_for("state").count(), 1);
        assert_eq!(report.deferred, 0);
        assert_eq!(output(&block, "current"), Value::Number(2.0));
    }

    #[test]
    fn test_state_without_default_is_null() {
        let block = mounted(state_template(None), &[]);
        assert_eq!(output(&block, "current"), Value::Null);
        assert_eq!(block.node_state("state"), None);
    }

    #[test]
    fn test_state_rejects_wrong_value_type() {
        let template = state_template(None).with_node(
            NodeTemplate::state("state", None).with_value_type(ValueType::Number),
        );
        let mut block = mounted(template, &[("v", Value::from(1.0))]);
        let result = block.set_input("v", "text");
        assert!(matches!(
            result,
            Err(BlockError::OperatorEvaluation { ref node_id, .. }) if node_id == "state"
        ));
        assert_eq!(output(&block, "current"), Value::Number(1.0));
    }

    #[test]
    fn test_second_write_in_pass_is_deferred() {
        let template = state_template(None)
            .with_node(NodeTemplate::transform("inc", increment))
            .with_edge(EdgeTemplate::new("in", "v", "inc", "input-0"))
            .with_edge(EdgeTemplate::new("inc", "output-0", "state", "UpdateHandler"));
        let mut block = mounted(template, &[]);

        let report = block.set_input("v", 1.0).unwrap();
        assert_eq!(report.deferred, 1);
        assert!(block.has_pending_feedback());
        assert_eq!(output(&block, "current"), Value::Number(1.0));

        block.tick().unwrap();
        assert!(!block.has_pending_feedback());
        assert_eq!(output(&block, "current"), Value::Number(2.0));
    }

    #[test]
    fn test_counter_advances_once_per_tick() {
        let mut block = mounted(counter_template(), &[]);
        assert_eq!(output(&block, "count"), Value::Number(0.0));
        assert!(block.has_pending_feedback());

        block.tick().unwrap();
        assert_eq!(output(&block, "count"), Value::Number(1.0));

        let report = block.tick().unwrap();
        assert_eq!(output(&block, "count"), Value::Number(2.0));
        assert_eq!(report.deferred, 1);
        assert_eq!(block.node_state("count"), Some(&Value::Number(2.0)));
    }
}

#[cfg(test)]
mod effect_tests {
    use super::*;

    fn checked_template() -> ModelTemplate {
        ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["x"]),
                NodeTemplate::effect("check", true, |v: &Value| match v.as_f64() {
                    Some(n) if n < 0.0 => Err(format!("{} is negative", n)),
                    _ => Ok(()),
                }),
                NodeTemplate::transform("double", |v: &Value| {
                    Value::Number(v.as_f64().unwrap_or(0.0) * 2.0)
                }),
                NodeTemplate::output("out", ["checked", "doubled"]),
            ],
            vec![
                EdgeTemplate::new("in", "x", "check", "input-0"),
                EdgeTemplate::new("in", "x", "double", "input-0"),
                EdgeTemplate::new("check", "output-0", "out", "checked"),
                EdgeTemplate::new("double", "output-0", "out", "doubled"),
            ],
            IoInterface::new(["x"], ["checked", "doubled"]),
        )
    }

    #[test]
    fn test_effect_failure_is_reported_not_fatal() {
        let mut block = mounted(checked_template(), &[("x", Value::from(1.0))]);
        assert_eq!(output(&block, "checked"), Value::Number(1.0));

        let report = block.set_input("x", -1.0).unwrap();
        assert_eq!(report.effect_failures.len(), 1);
        assert_eq!(report.effect_failures[0].node_id, "check");
        assert_eq!(report.effect_failures[0].message, "-1 is negative");

        // The failing effect forwards nothing; its siblings still update.
        assert_eq!(output(&block, "checked"), Value::Number(1.0));
        assert_eq!(output(&block, "doubled"), Value::Number(-2.0));
    }

    /// An Effect on `x` that posts `value` to field `y` through the block's queue.
    fn relay(slot: &Arc<OnceCell<InputQueue>>, value: Value) -> NodeTemplate {
        let slot = Arc::clone(slot);
        NodeTemplate::effect("relay", false, move |_v: &Value| {
            if let Some(queue) = slot.get() {
                queue.push("y", value.clone());
            }
            Ok(())
        })
    }

    #[test]
    fn test_failed_queued_write_keeps_block_unmounted() {
        let slot: Arc<OnceCell<InputQueue>> = Arc::new(OnceCell::new());
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["x", "y"]),
                relay(&slot, Value::Bool(true)),
                NodeTemplate::sum("sum", 2),
                NodeTemplate::output("out", ["total"]),
            ],
            vec![
                EdgeTemplate::new("in", "x", "relay", "input-0"),
                EdgeTemplate::new("in", "y", "sum", "input-0"),
                EdgeTemplate::new("sum", "output-0", "out", "total"),
            ],
            IoInterface::new(["x", "y"], ["total"]),
        );
        let mut block = ModelBlock::builder(template)
            .with_input("x", Value::from(1.0))
            .build()
            .unwrap();
        assert!(slot.set(block.input_queue()).is_ok());

        let result = block.mount();
        assert!(matches!(
            result,
            Err(BlockError::OperatorEvaluation { ref node_id, .. }) if node_id == "sum"
        ));
        assert_eq!(block.lifecycle(), Lifecycle::Unmounted);
        assert!(block.input_queue().is_empty());
        assert_eq!(block.port_value(&PortAddress::new("in", "x")), None);
    }

    #[test]
    fn test_failed_pass_drops_queued_writes() {
        let slot: Arc<OnceCell<InputQueue>> = Arc::new(OnceCell::new());
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["x", "y"]),
                relay(&slot, Value::from(5.0)),
                NodeTemplate::sum("sum", 2),
                NodeTemplate::output("out", ["y_out"]),
            ],
            vec![
                EdgeTemplate::new("in", "x", "relay", "input-0"),
                EdgeTemplate::new("in", "x", "sum", "input-0"),
                EdgeTemplate::new("in", "y", "out", "y_out"),
            ],
            IoInterface::new(["x", "y"], ["y_out"]),
        );
        let mut block = ModelBlock::new(template, Vec::new()).unwrap();
        assert!(slot.set(block.input_queue()).is_ok());
        block.mount().unwrap();

        assert!(block.set_input("x", true).is_err());
        assert!(block.input_queue().is_empty());
        assert_eq!(output(&block, "y_out"), Value::Null);

        let report = block.set_input("x", 1.0).unwrap();
        assert_eq!(report.passes, 2);
        assert_eq!(output(&block, "y_out"), Value::Number(5.0));
    }

    #[test]
    fn test_writes_from_effects_are_queued() {
        let slot: Arc<OnceCell<InputQueue>> = Arc::new(OnceCell::new());
        let relay = Arc::clone(&slot);
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["x", "y"]),
                NodeTemplate::effect("relay", false, move |v: &Value| {
                    if let Some(queue) = relay.get() {
                        queue.push("y", Value::Number(v.as_f64().unwrap_or(0.0) * 10.0));
                    }
                    Ok(())
                }),
                NodeTemplate::output("out", ["y_out"]),
            ],
            vec![
                EdgeTemplate::new("in", "x", "relay", "input-0"),
                EdgeTemplate::new("in", "y", "out", "y_out"),
            ],
            IoInterface::new(["x", "y"], ["y_out"]),
        );

        let mut block = ModelBlock::new(template, Vec::new()).unwrap();
        assert!(slot.set(block.input_queue()).is_ok());
        block.mount().unwrap();

        let report = block.set_input("x", 2.0).unwrap();
        assert_eq!(report.passes, 2);
        assert!(block.input_queue().is_empty());
        assert_eq!(output(&block, "y_out"), Value::Number(20.0));
    }
}

#[cfg(test)]
mod dynamic_arity_tests {
    use super::*;

    #[test]
    fn test_add_target_port_to_merge() {
        let mut block = mounted(merge_template(), &[]);
        let port = block.add_target_port("merge").unwrap();
        assert_eq!(port.id, "input-2");
        assert_eq!(port.direction, PortDirection::Target);
        assert_eq!(block.node_ports("merge").unwrap().targets.len(), 3);

        block.set_input("b", 7.0).unwrap();
        assert_eq!(output(&block, "latest"), Value::Number(7.0));
    }

    #[test]
    fn test_connect_grown_sum_adds_delta() {
        let template = ModelTemplate::new(
            vec![
                NodeTemplate::input("in", ["a", "b", "c"]),
                NodeTemplate::sum("sum", 2).allow_add_target_port(),
                NodeTemplate::output("out", ["total"]),
            ],
            vec![
                EdgeTemplate::new("in", "a", "sum", "input-0"),
                EdgeTemplate::new("in", "b", "sum", "input-1"),
                EdgeTemplate::new("sum", "output-0", "out", "total"),
            ],
            IoInterface::new(["a", "b", "c"], ["total"]),
        );
        let mut block = mounted(
            template,
            &[
                ("a", Value::from(1.0)),
                ("b", Value::from(2.0)),
                ("c", Value::from(4.0)),
            ],
        );
        assert_eq!(output(&block, "total"), Value::Number(3.0));

        let port = block.add_target_port("sum").unwrap();
        let report = block
            .connect(EdgeTemplate::new("in", "c", "sum", port.id.as_str()))
            .unwrap();
        assert!(report.evaluated("sum"));
        assert_eq!(output(&block, "total"), Value::Number(7.0));

        let template = block.template().unwrap();
        assert_eq!(template.edges().len(), 4);
        assert_eq!(template.node("sum").unwrap().config.arity, Some(3));

        block.set_input("c", 10.0).unwrap();
        assert_eq!(output(&block, "total"), Value::Number(13.0));
    }

    #[test]
    fn test_connect_grown_merge_before_source_fires() {
        let mut block = mounted(merge_template(), &[]);
        block.add_target_port("merge").unwrap();
        let report = block
            .connect(EdgeTemplate::new("in", "a", "merge", "input-2"))
            .unwrap();
        assert_eq!(report.evaluations, 0);

        block.set_input("a", 9.0).unwrap();
        assert_eq!(output(&block, "latest"), Value::Number(9.0));
    }

    #[test]
    fn test_connect_rejects_invalid_edges() {
        let mut block = mounted(merge_template(), &[]);
        assert!(matches!(
            block.connect(EdgeTemplate::new("in", "a", "ghost", "input-0")),
            Err(BlockError::Validation(GraphValidationError::DanglingEdge { .. }))
        ));
        assert_eq!(
            block.connect(EdgeTemplate::new("in", "b", "out", "latest")),
            Err(BlockError::Validation(GraphValidationError::PortArityMismatch {
                node_id: "out".to_string(),
                port_id: "latest".to_string(),
                count: 2,
            }))
        );
        assert!(matches!(
            block.connect(EdgeTemplate::new("out", "latest", "merge", "input-0")),
            Err(BlockError::Validation(GraphValidationError::DirectionMismatch { .. }))
        ));
        assert_eq!(block.template().unwrap().edges().len(), 3);
    }

    #[test]
    fn test_add_target_port_requires_opt_in() {
        let mut block = mounted(sum_template(), &[]);
        assert_eq!(
            block.add_target_port("sum"),
            Err(BlockError::DynamicArityUnsupported("sum".to_string()))
        );
        assert_eq!(
            block.add_target_port("ghost"),
            Err(BlockError::UnknownNode("ghost".to_string()))
        );
    }
}
