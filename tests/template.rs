//! Template validation and description tests
mod common;
use common::*;
use nagare::prelude::*;

const COUNTER_JSON: &str = r#"{
    "nodes": [
        { "id": "count", "operatorType": "State", "config": { "value": 0, "valueType": "number" } },
        { "id": "inc", "operatorType": "Transform", "config": { "function": "increment" } },
        { "id": "out", "operatorType": "Output" }
    ],
    "edges": [
        { "from": { "node": "count", "port": "State" }, "to": { "node": "inc", "port": "input-0" } },
        { "from": { "node": "inc", "port": "output-0" }, "to": { "node": "count", "port": "UpdateHandler" } },
        { "from": { "node": "count", "port": "State" }, "to": { "node": "out", "port": "count" } }
    ],
    "io": { "inputFields": [], "outputFields": ["count"] }
}"#;

#[cfg(test)]
mod validation_tests {
    use super::*;

    #[test]
    fn test_fixtures_are_valid() {
        let map = OperatorMap::with_builtins();
        for template in [
            passthrough_template(),
            sum_template(),
            state_template(None),
            counter_template(),
            merge_template(),
            divergent_template(),
            combine_template(),
        ] {
            assert_eq!(template.validate(&map), Ok(()));
        }
    }

    #[test]
    fn test_dangling_edge() {
        let template = passthrough_template().with_edge(EdgeTemplate::new("in", "x", "ghost", "input-0"));
        let result = template.validate(&OperatorMap::with_builtins());
        assert!(matches!(
            result,
            Err(GraphValidationError::DanglingEdge { ref to_node, ref missing, .. })
                if to_node == "ghost" && missing == "node 'ghost'"
        ));
    }

    #[test]
    fn test_dangling_port() {
        let template = sum_template().with_edge(EdgeTemplate::new("in", "a", "sum", "input-9"));
        let result = template.validate(&OperatorMap::with_builtins());
        assert!(matches!(
            result,
            Err(GraphValidationError::DanglingEdge { ref missing, .. }) if missing == "port 'sum.input-9'"
        ));
    }

    #[test]
    fn test_second_writer_on_single_port() {
        let template = sum_template().with_edge(EdgeTemplate::new("in", "b", "sum", "input-0"));
        assert_eq!(
            template.validate(&OperatorMap::with_builtins()),
            Err(GraphValidationError::PortArityMismatch {
                node_id: "sum".to_string(),
                port_id: "input-0".to_string(),
                count: 2,
            })
        );
    }

    #[test]
    fn test_merge_accepts_many_writers() {
        let template = merge_template().with_edge(EdgeTemplate::new("in", "b", "merge", "input-0"));
        assert_eq!(template.validate(&OperatorMap::with_builtins()), Ok(()));
    }

    #[test]
    fn test_duplicate_node_id() {
        let mut nodes = passthrough_template().nodes().to_vec();
        nodes.push(NodeTemplate::sum("in", 2));
        let template = ModelTemplate::new(nodes, Vec::new(), IoInterface::new(["x"], ["y"]));
        assert_eq!(
            template.validate(&OperatorMap::with_builtins()),
            Err(GraphValidationError::DuplicateNodeId("in".to_string()))
        );
    }

    #[test]
    fn test_duplicate_port_id_on_node() {
        let node = NodeTemplate::custom(
            "c",
            vec![PortSpec::new("a"), PortSpec::new("a")],
            Vec::new(),
            CustomFn::new(|_input: CustomInput<'_>| Ok(CustomOutput::default())),
        );
        let template = passthrough_template().with_node(node);
        assert_eq!(
            template.validate(&OperatorMap::with_builtins()),
            Err(GraphValidationError::DuplicatePortId {
                node_id: "c".to_string(),
                port_id: "a".to_string(),
            })
        );
    }

    #[test]
    fn test_invalid_node_config() {
        let template = passthrough_template().with_node(NodeTemplate::new("k", "ConstState"));
        assert!(matches!(
            template.validate(&OperatorMap::with_builtins()),
            Err(GraphValidationError::InvalidNodeConfig { ref node_id, .. }) if node_id == "k"
        ));

        let result = ModelBlock::new(
            passthrough_template().with_node(NodeTemplate::sum("s", 1)),
            Vec::new(),
        );
        assert!(matches!(
            result,
            Err(BlockError::Validation(GraphValidationError::InvalidNodeConfig { .. }))
        ));
    }

    #[test]
    fn test_with_added_target_port() {
        let map = OperatorMap::with_builtins();
        let template = merge_template();
        let grown = template.with_added_target_port("merge", &map).unwrap();

        let shapes = grown.port_shapes(&map).unwrap();
        let (_, merge) = shapes.iter().find(|(id, _)| id == "merge").unwrap();
        assert_eq!(merge.targets.len(), 3);
        // The original template is untouched.
        assert_eq!(template.node("merge").unwrap().config.arity, Some(2));

        assert!(sum_template().with_added_target_port("sum", &map).is_err());
    }

    #[test]
    fn test_custom_ports_get_stable_ids() {
        let node = NodeTemplate::custom(
            "c",
            vec![PortSpec::default()],
            Vec::new(),
            CustomFn::new(|_input: CustomInput<'_>| Ok(CustomOutput::default())),
        );
        let generated = node.config.target_ports[0].id.clone().unwrap();
        assert!(!generated.is_empty());

        let template = ModelTemplate::new(vec![node], Vec::new(), IoInterface::default());
        let map = OperatorMap::with_builtins();
        let first = template.port_shapes(&map).unwrap();
        let second = template.port_shapes(&map).unwrap();
        assert_eq!(first[0].1.targets[0].id, generated);
        assert_eq!(first, second);
    }
}

#[cfg(test)]
mod description_tests {
    use super::*;

    #[test]
    fn test_description_runs_as_counter() {
        let template = TemplateDescription::from_json(COUNTER_JSON)
            .and_then(|d| d.resolve(&FunctionTable::with_standard_functions()))
            .expect("Failed to convert counter description");

        let mut block = mounted(template, &[]);
        assert_eq!(output(&block, "count"), Value::Number(0.0));
        block.tick().unwrap();
        block.tick().unwrap();
        assert_eq!(output(&block, "count"), Value::Number(2.0));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            TemplateDescription::from_json("{ not json"),
            Err(TemplateConversionError::JsonParseError(_))
        ));
    }

    #[test]
    fn test_description_round_trips_through_json() {
        let description = TemplateDescription::from_json(COUNTER_JSON).unwrap();
        let json = description.to_json().unwrap();
        let reparsed = TemplateDescription::from_json(&json).unwrap();
        assert_eq!(reparsed.nodes.len(), 3);
        assert_eq!(reparsed.edges.len(), 3);
        assert_eq!(reparsed.io.output_fields, vec!["count".to_string()]);
    }
}
