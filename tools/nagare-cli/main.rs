use clap::Parser;
use nagare::prelude::*;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::time::Instant;

/// One step of a driver script: either an input write or a feedback tick.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptStep {
    Write { field: String, value: Value },
    Command(ScriptCommand),
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum ScriptCommand {
    Tick,
}

/// Runs a reactive operator graph from a JSON template
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the template JSON file
    template_path: String,
    /// Optional path to a JSON object with the initial input fields
    input_path: Option<String>,

    /// Optional path to a JSON array of steps (`{"field": .., "value": ..}` or `"tick"`)
    #[arg(short, long)]
    script: Option<String>,

    /// Print every evaluation of every pass
    #[arg(short, long)]
    trace: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let total_start = Instant::now();

    // --- 1. File Loading ---
    let template_json = read_file("template", &cli.template_path);
    let input: BTreeMap<String, Value> = match &cli.input_path {
        Some(path) => serde_json::from_str(&read_file("input", path))
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse input JSON: {}", e))),
        None => BTreeMap::new(),
    };
    let script: Vec<ScriptStep> = match &cli.script {
        Some(path) => serde_json::from_str(&read_file("script", path))
            .unwrap_or_else(|e| exit_with_error(&format!("Failed to parse script JSON: {}", e))),
        None => Vec::new(),
    };

    // --- 2. Conversion ---
    let template = TemplateDescription::from_json(&template_json)
        .and_then(|d| d.resolve(&FunctionTable::with_standard_functions()))
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to convert template: {}", e)));
    println!(
        "Loaded template with {} nodes and {} edges",
        template.nodes().len(),
        template.edges().len()
    );

    // --- 3. Mount ---
    let mut block = ModelBlock::new(template, input)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to construct block: {}", e)));
    let report = block
        .mount()
        .unwrap_or_else(|e| exit_with_error(&format!("Mount failed: {}", e)));
    print_pass("mount", &report, cli.trace);
    print_outputs(&block);

    // --- 4. Script ---
    for (i, step) in script.into_iter().enumerate() {
        let (label, result) = match step {
            ScriptStep::Write { field, value } => {
                let label = format!("#{} {} = {}", i + 1, field, value);
                (label, block.set_input(&field, value))
            }
            ScriptStep::Command(ScriptCommand::Tick) => (format!("#{} tick", i + 1), block.tick()),
        };
        let report = result
            .unwrap_or_else(|e| exit_with_error(&format!("Step {} failed: {}", label, e)));
        print_pass(&label, &report, cli.trace);
        print_outputs(&block);
    }

    block
        .teardown()
        .unwrap_or_else(|e| exit_with_error(&format!("Teardown failed: {}", e)));
    println!("\nTotal Execution: {:?}", total_start.elapsed());
}

fn read_file(kind: &str, path: &str) -> String {
    fs::read_to_string(path)
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read {} file '{}': {}", kind, path, e)))
}

fn print_pass(label: &str, report: &PassReport, trace: bool) {
    println!("\n[{}] {}", label, TraceFormatter::summarize(report));
    if trace && !report.steps.is_empty() {
        println!("{}", TraceFormatter::format_report(report));
    }
}

fn print_outputs(block: &ModelBlock) {
    let outputs = block
        .get_output()
        .unwrap_or_else(|e| exit_with_error(&format!("Failed to read outputs: {}", e)));
    for (field, value) in outputs {
        println!("  -> {} = {}", field, value);
    }
    if block.has_pending_feedback() {
        println!("  (feedback pending, run a tick to apply it)");
    }
}

fn exit_with_error(message: &str) -> ! {
    eprintln!("\nError: {}", message);
    std::process::exit(1);
}
