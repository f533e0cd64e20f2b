//! Command-line interface for nzymes
//! Renders a content file through the engine, against a site described in YAML or JSON.
//!
//! Usage:
//!   nzymes `<path>` --site `<site>` [--item `<id>`] [--stage `<stage>`]   - Render the content
//!   nzymes `<path>` --inspect                                          - Show how each injection parses
//!
//! Logging goes to stderr and is controlled with `RUST_LOG` (default: warn).

use clap::{value_parser, Arg, ArgAction, Command};
use nzymes::nzymes::cleaning::clean;
use nzymes::nzymes::grammar::is_valid_sequence;
use nzymes::nzymes::memory::Site;
use nzymes::nzymes::parsing::parse_sequence;
use nzymes::nzymes::scanning::next_injection;
use nzymes::nzymes::{Diagnostic, Engine, Handler, Pipeline, Sequence, Subject};
use nzymes_config::{Loader, NzymesConfig};
use serde::Serialize;
use std::fs;
use std::sync::Arc;

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let matches = Command::new("nzymes")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Render content with enzyme injections")
        .arg_required_else_help(true)
        .arg(
            Arg::new("path")
                .help("Path to the content file")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::new("site")
                .long("site")
                .short('s')
                .help("Site file (YAML, or JSON with a .json extension)")
                .required_unless_present("inspect"),
        )
        .arg(
            Arg::new("item")
                .long("item")
                .short('i')
                .help("Id of the content item the content belongs to (default: none)")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("stage")
                .long("stage")
                .help("Stage to render")
                .default_value("content"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .help("Configuration file layered over the defaults"),
        )
        .arg(
            Arg::new("format")
                .long("format")
                .short('f')
                .help("Output format")
                .value_parser(["text", "json"])
                .default_value("text"),
        )
        .arg(
            Arg::new("inspect")
                .long("inspect")
                .help("Print how each injection is cleaned and parsed, without evaluating")
                .action(ArgAction::SetTrue),
        )
        .get_matches();

    let path = matches
        .get_one::<String>("path")
        .map(String::as_str)
        .unwrap_or_default();
    let content = fs::read_to_string(path)
        .unwrap_or_else(|e| fail(format!("Cannot read {}: {}", path, e)));

    if matches.get_flag("inspect") {
        handle_inspect_command(&content);
        return;
    }

    let config = load_config(matches.get_one::<String>("config"));
    let site_path = matches
        .get_one::<String>("site")
        .map(String::as_str)
        .unwrap_or_default();
    let site = Site::load(site_path).unwrap_or_else(|e| fail(format!("Site error: {}", e)));
    let subject = match matches.get_one::<u64>("item") {
        Some(id) => Subject::Item(*id),
        None => Subject::Detached,
    };
    let stage = matches
        .get_one::<String>("stage")
        .map(String::as_str)
        .unwrap_or("content");
    let format = matches
        .get_one::<String>("format")
        .map(String::as_str)
        .unwrap_or("text");
    handle_render_command(config, site, &content, subject, stage, format);
}

fn fail(message: String) -> ! {
    eprintln!("{}", message);
    std::process::exit(1);
}

fn load_config(path: Option<&String>) -> NzymesConfig {
    let loader = match path {
        Some(path) => Loader::new().with_file(path),
        None => Loader::new(),
    };
    loader
        .build()
        .unwrap_or_else(|e| fail(format!("Configuration error: {}", e)))
}

#[derive(Serialize)]
struct Rendering {
    content: String,
    diagnostics: Vec<Diagnostic>,
}

/// Handle the render command
fn handle_render_command(
    config: NzymesConfig,
    site: Site,
    content: &str,
    subject: Subject,
    stage: &str,
    format: &str,
) {
    let site = Arc::new(site);
    let priority = config.engine.default_priority;
    let mut engine = Engine::new(site.clone(), site, config.sandbox.sandbox(), config.engine);
    let mut pipeline = Pipeline::new();
    engine.attach_stages(&mut pipeline);
    engine.attach(&mut pipeline, Handler::Absorb, stage, priority);

    let rendered = pipeline.apply(&mut engine, stage, content, subject);
    match format {
        "json" => {
            let rendering = Rendering {
                content: rendered,
                diagnostics: engine.diagnostics().drain(),
            };
            let json = serde_json::to_string_pretty(&rendering)
                .unwrap_or_else(|e| fail(format!("Error formatting output: {}", e)));
            println!("{}", json);
        }
        _ => print!("{}", rendered),
    }
}

#[derive(Serialize)]
struct Inspection {
    raw: String,
    escaped: bool,
    cleaned: String,
    valid: bool,
    sequence: Option<Sequence>,
    errors: Vec<String>,
}

/// Handle the inspect command
fn handle_inspect_command(content: &str) {
    let mut inspections = Vec::new();
    let mut rest = content;
    while let Some(injection) = next_injection(rest) {
        let cleaned = clean(injection.raw);
        let valid = is_valid_sequence(&cleaned);
        let (sequence, errors) = match parse_sequence(&cleaned) {
            Ok(sequence) => (Some(sequence), Vec::new()),
            Err(errors) => (None, errors.iter().map(ToString::to_string).collect()),
        };
        inspections.push(Inspection {
            raw: injection.source(),
            escaped: injection.is_escaped(),
            cleaned,
            valid,
            sequence,
            errors,
        });
        rest = injection.after;
    }
    let json = serde_json::to_string_pretty(&inspections)
        .unwrap_or_else(|e| fail(format!("Error formatting output: {}", e)));
    println!("{}", json);
}
