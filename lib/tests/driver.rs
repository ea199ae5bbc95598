use crate::analysis::fixed_point::Analysis;
use crate::analysis::transfer::{foreign, Dispatcher};
use crate::analysis::NullMonitor;
use crate::bridge::{ClassDescription, TableBridge};
use crate::flowgraph::{Constant, FlowGraph, Operation};
use crate::lattice::{Canonicalizer, Context, Kind, PKey, Value};
use crate::tests::RecordingMonitor;
use crate::{BlockAndContext, Error, Options, OptionsBuilder};

const FOO: &str = "com.example.Foo";

fn bridge() -> TableBridge {
    TableBridge::new().with_class(ClassDescription::new(FOO).method("bar", Value::any_str()))
}

/// ```text
/// 0: v0 = Java; v1 = "com.example.Foo"; v2 = v0.type(v1)
/// 1: v3 = new v2()
/// 2: v4 = null; v5 = v3.bar(v4)
/// 3: result = v5
/// 4: foreign-marker
/// 5:
/// ```
fn interop_program() -> FlowGraph {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let blocks: Vec<usize> = (0..5).map(|_| flow_graph.new_block(0).unwrap()).collect();
    let (b1, b2, b3, b4, b5) = (blocks[0], blocks[1], blocks[2], blocks[3], blocks[4]);

    flow_graph
        .add_node(b0, Operation::read_variable(0, "Java"))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::constant(1, Constant::String(FOO.to_string())))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::method_call(Some(2), 0, "type", vec![1]))
        .unwrap();
    flow_graph
        .add_node(b1, Operation::construct(3, 2, vec![]))
        .unwrap();
    flow_graph
        .add_node(b2, Operation::constant(4, Constant::Null))
        .unwrap();
    flow_graph
        .add_node(b2, Operation::method_call(Some(5), 3, "bar", vec![4]))
        .unwrap();
    flow_graph
        .add_node(b3, Operation::write_variable("result", 5))
        .unwrap();
    flow_graph
        .add_node(b4, Operation::foreign_marker(1))
        .unwrap();

    flow_graph.edge(b0, b1).unwrap();
    flow_graph.edge(b1, b2).unwrap();
    flow_graph.edge(b2, b3).unwrap();
    flow_graph.edge(b3, b4).unwrap();
    flow_graph.edge(b4, b5).unwrap();
    flow_graph
}

#[test]
fn interop_program_end_to_end() {
    let flow_graph = interop_program();
    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = Options::new();
    let mut canonicalizer = Canonicalizer::new();
    let mut bridge = bridge();
    let mut monitor = RecordingMonitor::default();

    let result = Analysis::new(&flow_graph, &dispatcher, &options)
        .run(&mut canonicalizer, &mut bridge, &mut monitor)
        .unwrap();

    assert!(result.is_sound());
    assert_eq!(result.run(), 1);
    assert_eq!(result.states().len(), 6);

    let exit = result.state(5, &Context::main()).unwrap();
    let global = exit.global().clone();
    let stored = exit
        .object(&global)
        .unwrap()
        .get_property(&PKey::str("result"));
    assert!(stored.is_maybe_str());
    assert!(!stored.is_maybe_absent());
    assert!(exit.read_register(3).unwrap().is_foreign_object());

    let members: Vec<&str> = monitor
        .foreign_queries
        .iter()
        .map(|(_, _, member)| member.as_str())
        .collect();
    assert_eq!(members, vec!["<init>", "bar"]);
    assert_eq!(flow_graph.foreign_markers().len(), 1);
}

#[test]
fn loops_reach_a_fixed_point() {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let b1 = flow_graph.new_block(0).unwrap();
    let b2 = flow_graph.new_block(0).unwrap();
    flow_graph.add_node(b0, Operation::new_object(0)).unwrap();
    flow_graph
        .add_node(b0, Operation::constant(1, Constant::Number(1.0)))
        .unwrap();
    flow_graph
        .add_node(b1, Operation::write_property(0, "p", 1))
        .unwrap();
    flow_graph.add_node(b1, Operation::new_object(2)).unwrap();
    flow_graph
        .add_node(b1, Operation::write_property(2, "q", 0))
        .unwrap();
    flow_graph.edge(b0, b1).unwrap();
    flow_graph.edge(b1, b1).unwrap();
    flow_graph.edge(b1, b2).unwrap();

    let dispatcher = Dispatcher::new();
    let options = Options::new();
    let result = Analysis::new(&flow_graph, &dispatcher, &options)
        .run(&mut Canonicalizer::new(), &mut TableBridge::new(), &mut NullMonitor)
        .unwrap();

    assert!(result.iterations() < 10);
    let exit = result.state(b2, &Context::main()).unwrap();
    let object = exit.read_register(0).unwrap().object_labels().clone();
    assert_eq!(exit.read_property(&object, &PKey::str("p")), Value::any_num().join_modified());
}

#[test]
fn iteration_limit() {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let b1 = flow_graph.new_block(0).unwrap();
    flow_graph.add_node(b0, Operation::Nop).unwrap();
    flow_graph.edge(b0, b1).unwrap();

    let dispatcher = Dispatcher::new();
    let options = OptionsBuilder::new().max_iterations(1).build();
    let result = Analysis::new(&flow_graph, &dispatcher, &options).run(
        &mut Canonicalizer::new(),
        &mut TableBridge::new(),
        &mut NullMonitor,
    );
    assert!(matches!(result, Err(Error::Analysis(_))));
}

#[test]
fn calls_in_the_middle_of_a_block_are_rejected() {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let b1 = flow_graph.new_block(0).unwrap();
    flow_graph
        .add_node(b0, Operation::read_variable(0, "Java"))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::constant(1, Constant::String(FOO.to_string())))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::method_call(Some(2), 0, "type", vec![1]))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::constant(3, Constant::Null))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::write_variable("y", 3))
        .unwrap();
    flow_graph.edge(b0, b1).unwrap();

    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = OptionsBuilder::new()
        .continue_on_cross_language_error(true)
        .build();
    let mut monitor = RecordingMonitor::default();
    let result = Analysis::new(&flow_graph, &dispatcher, &options).run(
        &mut Canonicalizer::new(),
        &mut bridge(),
        &mut monitor,
    );
    assert!(matches!(result, Err(Error::InternalInvariant(_))));
    assert!(monitor.variables.is_empty());
}

/// `function f(a) { a = new Foo(); }` next to an empty program body.
#[test]
fn functions_are_entered_with_their_arguments_object() {
    let mut flow_graph = FlowGraph::new();
    let f = flow_graph.add_function("f", vec!["a".to_string()], Vec::new());
    let f0 = flow_graph.function(f).unwrap().entry();
    let f1 = flow_graph.new_block(f).unwrap();
    let f2 = flow_graph.new_block(f).unwrap();
    let f3 = flow_graph.new_block(f).unwrap();
    flow_graph
        .add_node(f0, Operation::read_variable(0, "Java"))
        .unwrap();
    flow_graph
        .add_node(f0, Operation::constant(1, Constant::String(FOO.to_string())))
        .unwrap();
    flow_graph
        .add_node(f0, Operation::method_call(Some(2), 0, "type", vec![1]))
        .unwrap();
    flow_graph
        .add_node(f1, Operation::construct(3, 2, vec![]))
        .unwrap();
    flow_graph
        .add_node(f2, Operation::write_variable("a", 3))
        .unwrap();
    flow_graph.edge(f0, f1).unwrap();
    flow_graph.edge(f1, f2).unwrap();
    flow_graph.edge(f2, f3).unwrap();

    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = Options::new();
    let mut canonicalizer = Canonicalizer::new();
    let result = Analysis::new(&flow_graph, &dispatcher, &options)
        .run(&mut canonicalizer, &mut bridge(), &mut NullMonitor)
        .unwrap();

    let entry = result.state(f0, &Context::main()).unwrap();
    let arguments = canonicalizer.make_label(f, Kind::Arguments);
    assert!(entry
        .object(&arguments)
        .unwrap()
        .get_property(&PKey::str("0"))
        .is_maybe_num());

    let exit = result.state(f3, &Context::main()).unwrap();
    let function = flow_graph.function(f).unwrap();
    assert!(exit
        .read_variable(&mut canonicalizer, function, "a")
        .is_foreign_object());
    let slot = exit
        .object(&arguments)
        .unwrap()
        .get_property(&PKey::str("0"));
    assert!(slot.is_foreign_object());
    assert!(!slot.is_maybe_num());
}

/// `Java.type(1)` in the entry block, followed by one more block.
fn bad_type_call() -> FlowGraph {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let b1 = flow_graph.new_block(0).unwrap();
    flow_graph
        .add_node(b0, Operation::read_variable(0, "Java"))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::constant(1, Constant::Number(1.0)))
        .unwrap();
    flow_graph
        .add_node(b0, Operation::method_call(Some(2), 0, "type", vec![1]))
        .unwrap();
    flow_graph.edge(b0, b1).unwrap();
    flow_graph
}

#[test]
fn cross_language_errors_carry_their_location() {
    let flow_graph = bad_type_call();
    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = Options::new();
    let mut canonicalizer = Canonicalizer::new();
    canonicalizer.reset();

    let error = Analysis::new(&flow_graph, &dispatcher, &options)
        .run(&mut canonicalizer, &mut TableBridge::new(), &mut NullMonitor)
        .unwrap_err();
    match error {
        Error::CrossLanguage { run, location, .. } => {
            assert_eq!(run, Some(2));
            assert_eq!(
                location,
                Some(BlockAndContext {
                    block: 0,
                    context: Context::main(),
                })
            );
        }
        other => panic!("expected a cross-language error, got {}", other),
    }
}

#[test]
fn cross_language_errors_can_mark_the_run_unsound() {
    let flow_graph = bad_type_call();
    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = OptionsBuilder::new()
        .continue_on_cross_language_error(true)
        .build();

    let result = Analysis::new(&flow_graph, &dispatcher, &options)
        .run(&mut Canonicalizer::new(), &mut TableBridge::new(), &mut NullMonitor)
        .unwrap();
    assert!(!result.is_sound());
    assert_eq!(result.unsound().len(), 1);
    assert!(result.unsound()[0].to_string().contains("at block 0"));
    assert!(result.state(1, &Context::main()).is_none());
}

#[test]
fn internal_errors_always_abort() {
    let mut flow_graph = FlowGraph::new();
    let b0 = flow_graph.main().unwrap().entry();
    let marker = flow_graph.new_block(0).unwrap();
    let a = flow_graph.new_block(0).unwrap();
    let b = flow_graph.new_block(0).unwrap();
    flow_graph
        .add_node(marker, Operation::foreign_marker(1))
        .unwrap();
    flow_graph.edge(b0, marker).unwrap();
    flow_graph.edge(marker, a).unwrap();
    flow_graph.edge(marker, b).unwrap();

    let dispatcher = Dispatcher::new().with_layer(foreign::layer());
    let options = OptionsBuilder::new()
        .continue_on_cross_language_error(true)
        .build();
    let result = Analysis::new(&flow_graph, &dispatcher, &options).run(
        &mut Canonicalizer::new(),
        &mut TableBridge::new(),
        &mut NullMonitor,
    );
    match result {
        Err(error) => assert!(error.is_fatal()),
        Ok(_) => panic!("expected a malformed flow graph to be rejected"),
    }
}
