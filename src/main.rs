use regex_graph_merge::{
    BuildRegex, CharScheme, Capturing, Error, FindAction, MatcherBuilder, ParseOptions, Parser,
    Regex, Template, parse_std_with,
};

use std::io::{self, Write};
use std::process;

use log::info;

fn print_usage() {
    eprintln!(
        "\
Usage: regm [OPTIONS] <COMMAND>

Commands:
  dot     <pattern>                      Output DOT (Graphviz) representation of the automaton
  match   <pattern> <input>...           Match pattern against whole inputs and print captures
  find    <pattern> <input>...           Print leftmost-longest matches inside inputs
  replace <pattern> <template> <input>...  Replace matches; [n] in the template inserts group n
  merge   <pattern>... --input <input>   Merge patterns and report which ones match inside input

Options:
  -i, --ignore-case  Case-insensitive letters
  --std              Read patterns in the syntax of the `regex` crate
  --max-depth <N>    Bound on the pattern merge product depth
  --disjoint         Make 'merge' fail if two patterns accept the same text
  --input <text>     Input searched by 'merge'
  -h, --help         Print this help message"
    );
}

struct Options {
    case_insensitive: bool,
    std: bool,
    max_depth: Option<usize>,
    input: Option<String>,
    disjoint: bool,
}

enum Command {
    Dot {
        pattern: String,
    },
    Match {
        pattern: String,
        inputs: Vec<String>,
    },
    Find {
        pattern: String,
        inputs: Vec<String>,
    },
    Replace {
        pattern: String,
        template: String,
        inputs: Vec<String>,
    },
    Merge {
        input: String,
        patterns: Vec<String>,
    },
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("error: {message}");
    process::exit(1);
}

fn parse_args() -> (Options, Command) {
    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        print_usage();
        process::exit(1);
    }

    let mut options = Options {
        case_insensitive: false,
        std: false,
        max_depth: None,
        input: None,
        disjoint: false,
    };
    let mut positional = Vec::new();

    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            "-i" | "--ignore-case" => options.case_insensitive = true,
            "--std" => options.std = true,
            "--disjoint" => options.disjoint = true,
            "--max-depth" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    fail("--max-depth requires a value");
                };
                let depth = value
                    .parse::<usize>()
                    .unwrap_or_else(|_| fail("--max-depth must be a positive integer"));
                if depth == 0 {
                    fail("--max-depth must be > 0");
                }
                options.max_depth = Some(depth);
            }
            "--input" => {
                i += 1;
                let Some(value) = args.get(i) else {
                    fail("--input requires a value");
                };
                options.input = Some(value.clone());
            }
            "--" => {
                positional.extend(args[i + 1..].iter().cloned());
                break;
            }
            other if other.starts_with('-') && other.len() > 1 => {
                eprintln!("error: unknown option: {other}");
                print_usage();
                process::exit(1);
            }
            _ => positional.push(args[i].clone()),
        }
        i += 1;
    }

    if positional.is_empty() {
        print_usage();
        process::exit(1);
    }

    let command = match positional[0].as_str() {
        "dot" => {
            if positional.len() != 2 {
                fail("'dot' command takes exactly one pattern argument");
            }
            Command::Dot {
                pattern: positional[1].clone(),
            }
        }
        "match" | "find" => {
            if positional.len() < 3 {
                fail(format!(
                    "'{}' command requires a pattern and at least one input",
                    positional[0]
                ));
            }
            let pattern = positional[1].clone();
            let inputs = positional[2..].to_vec();
            if positional[0] == "match" {
                Command::Match { pattern, inputs }
            } else {
                Command::Find { pattern, inputs }
            }
        }
        "replace" => {
            if positional.len() < 4 {
                fail("'replace' command requires a pattern, a template and at least one input");
            }
            Command::Replace {
                pattern: positional[1].clone(),
                template: positional[2].clone(),
                inputs: positional[3..].to_vec(),
            }
        }
        "merge" => {
            if positional.len() < 2 {
                fail("'merge' command requires at least one pattern");
            }
            let Some(input) = options.input.clone() else {
                fail("'merge' command requires --input <input>");
            };
            Command::Merge {
                input,
                patterns: positional[1..].to_vec(),
            }
        }
        other => {
            eprintln!("error: unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    };
    (options, command)
}

fn parse_pattern(pattern: &str, options: &Options) -> BuildRegex {
    let parse_options = ParseOptions {
        case_insensitive: options.case_insensitive,
    };
    let parsed = if options.std {
        parse_std_with(pattern, parse_options)
    } else {
        Parser::with_options(pattern, parse_options)
            .parse()
            .map_err(Error::from)
    };
    parsed.unwrap_or_else(|e| fail(format_args!("failed to parse pattern: {e}")))
}

fn compile(pattern: &str, options: &Options) -> Regex {
    let regex = parse_pattern(pattern, options);
    let compiled = Regex::from_build_regex(pattern, &regex)
        .unwrap_or_else(|e| fail(format_args!("failed to compile pattern: {e}")));
    eprintln!("pattern: {pattern}");
    eprintln!("states: {}", compiled.automaton().state_count());
    eprintln!("memory_size: {} bytes", compiled.automaton().memory_size());
    eprintln!();
    compiled
}

fn run_dot(pattern: &str, options: &Options) {
    let regex = parse_pattern(pattern, options);
    let automaton = regex
        .compile::<CharScheme>()
        .unwrap_or_else(|e| fail(format_args!("failed to compile pattern: {e}")));
    let stdout = io::stdout();
    let mut out = stdout.lock();
    automaton
        .to_dot(&mut out)
        .and_then(|()| out.flush())
        .unwrap_or_else(|e| fail(e));
}

fn run_match(pattern: &str, inputs: &[String], options: &Options) {
    let regex = compile(pattern, options);

    let mut any_failed = false;
    for input in inputs {
        match regex.captures(input) {
            Some(captured) => {
                println!("  \x1b[32mMATCH\x1b[0m  {:?}", input);
                for group in 1..=captured.len() {
                    println!("    [{group}] {:?}", captured.group(group));
                }
            }
            None => {
                println!("  \x1b[31mNO MATCH\x1b[0m  {:?}", input);
                any_failed = true;
            }
        }
    }

    if any_failed {
        process::exit(1);
    }
}

fn run_find(pattern: &str, inputs: &[String], options: &Options) {
    let regex = compile(pattern, options);

    let mut any_failed = false;
    for input in inputs {
        let found = regex.find_iter(input);
        if found.is_empty() {
            println!("  \x1b[31mNO MATCH\x1b[0m  {:?}", input);
            any_failed = true;
            continue;
        }
        let units = CharScheme::encode(input);
        println!("  \x1b[32mMATCH\x1b[0m  {:?}", input);
        for captured in found {
            let span = captured.span();
            println!("    {:?} {:?}", span, CharScheme::decode(&units[span.clone()]));
        }
    }

    if any_failed {
        process::exit(1);
    }
}

fn run_replace(pattern: &str, template: &str, inputs: &[String], options: &Options) {
    let template = Template::parse(template)
        .unwrap_or_else(|e| fail(format_args!("failed to parse template: {e}")));
    let regex = compile(pattern, options);
    for input in inputs {
        println!("{}", regex.replace_all(input, &template));
    }
}

fn run_merge(input: &str, patterns: &[String], options: &Options) {
    let mut builder = MatcherBuilder::<CharScheme, usize>::new().allow_overlap(!options.disjoint);
    if let Some(depth) = options.max_depth {
        builder = builder.max_depth(depth);
    }
    for (id, pattern) in patterns.iter().enumerate() {
        let regex = parse_pattern(pattern, options);
        builder = builder
            .pattern(&regex, move |_, _| id)
            .unwrap_or_else(|e| fail(format_args!("failed to compile `{pattern}`: {e}")));
    }
    let matcher = builder
        .build()
        .unwrap_or_else(|e| fail(format_args!("failed to merge patterns: {e}")));
    info!("merged {} patterns", patterns.len());
    eprintln!("states: {}", matcher.automaton().state_count());
    eprintln!("memory_size: {} bytes", matcher.automaton().memory_size());
    eprintln!();

    let units = CharScheme::encode(input);
    let mut capturing = Capturing::new();
    let mut any = false;
    matcher.find_all(&units, &mut capturing, |found| {
        any = true;
        println!(
            "  \x1b[32mMATCH\x1b[0m  {:?} {:?} {:?}",
            found.span,
            patterns[found.value],
            CharScheme::decode(&units[found.span.clone()])
        );
        FindAction::ContinueAll
    });

    if !any {
        println!("  \x1b[31mNO MATCH\x1b[0m  {:?}", input);
        process::exit(1);
    }
}

fn main() {
    env_logger::init();

    let (options, command) = parse_args();
    match command {
        Command::Dot { pattern } => run_dot(&pattern, &options),
        Command::Match { pattern, inputs } => run_match(&pattern, &inputs, &options),
        Command::Find { pattern, inputs } => run_find(&pattern, &inputs, &options),
        Command::Replace {
            pattern,
            template,
            inputs,
        } => run_replace(&pattern, &template, &inputs, &options),
        Command::Merge { input, patterns } => run_merge(&input, &patterns, &options),
    }
}
