//! SOUL compiler CLI.
//!
//! Exit codes: 0 success, 1 compile error, 2 I/O or usage error.

mod commands;

use commands::{check_file, compile_file, lex_file, parse_file};

fn main() {
    soulc::tracing_setup::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(2);
    }

    let exit_code = match args[1].as_str() {
        "compile" => {
            // compile <source> -o <out> [--main <name>]
            let mut source = None;
            let mut output = None;
            let mut main = None;
            let mut i = 2;
            while i < args.len() {
                match args[i].as_str() {
                    "-o" => {
                        output = args.get(i + 1).cloned();
                        i += 2;
                    }
                    "--main" => {
                        main = args.get(i + 1).cloned();
                        i += 2;
                    }
                    other if !other.starts_with('-') && source.is_none() => {
                        source = Some(other.to_string());
                        i += 1;
                    }
                    other => {
                        eprintln!("soulc: unknown argument '{other}'");
                        std::process::exit(2);
                    }
                }
            }
            let (Some(source), Some(output)) = (source, output) else {
                eprintln!("Usage: soulc compile <source.soul> -o <out.heart> [--main <name>]");
                std::process::exit(2);
            };
            compile_file(&source, &output, main.as_deref())
        }
        "check" => {
            if args.len() < 3 {
                eprintln!("Usage: soulc check <source.soul>");
                std::process::exit(2);
            }
            check_file(&args[2])
        }
        "lex" => {
            if args.len() < 3 {
                eprintln!("Usage: soulc lex <source.soul>");
                std::process::exit(2);
            }
            lex_file(&args[2])
        }
        "parse" => {
            if args.len() < 3 {
                eprintln!("Usage: soulc parse <source.soul>");
                std::process::exit(2);
            }
            parse_file(&args[2])
        }
        "render" | "run" => {
            eprintln!("soulc: '{}' needs the audio runtime, which this build does not include", args[1]);
            2
        }
        "help" | "--help" | "-h" => {
            print_usage();
            0
        }
        other => {
            eprintln!("soulc: unknown command '{other}'");
            print_usage();
            2
        }
    };

    std::process::exit(exit_code);
}

fn print_usage() {
    eprintln!("SOUL compiler");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  soulc compile <source.soul> -o <out.heart> [--main <name>]");
    eprintln!("  soulc check <source.soul>");
    eprintln!("  soulc parse <source.soul>");
    eprintln!("  soulc lex <source.soul>");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  SOUL_LOG       log filter (RUST_LOG syntax)");
    eprintln!("  SOUL_LOG_TREE  hierarchical log output");
}
