//! ulang compiler CLI

use clap::{Args, Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process;
use tracing::{info, Level};
use ulang_codegen::{CompileOptions, Interpreter, LlvmTextBackend};
use ulang_error::{CompileError, DiagnosticRenderer, SourceCache};
use ulang_ir::{lower_program, LoopMode, LoweringOptions, Module};
use ulang_lexer::Lexer;
use ulang_parser::{parse_source, Program};

#[derive(Parser)]
#[command(name = "ulang")]
#[command(version)]
#[command(about = "Compiler for the ulang language", long_about = None)]
struct Cli {
    /// Log more on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Source {
    /// Input file
    #[arg(value_name = "FILE", default_value = "example.unnamedlang")]
    input: PathBuf,

    /// Run every loop body once before its condition is first tested
    #[arg(long)]
    legacy_loops: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Shows file tokens (debug)
    Lex {
        #[command(flatten)]
        source: Source,
    },

    /// Shows file AST (debug)
    Parse {
        #[command(flatten)]
        source: Source,
    },

    /// Shows file IR (debug)
    Ir {
        #[command(flatten)]
        source: Source,
    },

    /// Checks for errors without writing output
    Check {
        #[command(flatten)]
        source: Source,
    },

    /// Writes the program as textual LLVM IR
    Emit {
        #[command(flatten)]
        source: Source,

        /// Output file
        #[arg(short, long, value_name = "FILE", default_value = "output/output.ll")]
        output: PathBuf,
    },

    /// Runs `main` and exits with its return value
    Run {
        #[command(flatten)]
        source: Source,

        /// Abort after this many executed instructions
        #[arg(long, value_name = "N")]
        max_steps: Option<u64>,
    },
}

/// A loaded source file and the cache its diagnostics render against
struct Session {
    cache: SourceCache,
    file_id: u32,
    text: String,
    loop_mode: LoopMode,
}

impl Session {
    fn open(source: &Source) -> Self {
        let text = match fs::read_to_string(&source.input) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("Error reading {}: {}", source.input.display(), e);
                process::exit(1);
            }
        };
        let mut cache = SourceCache::new();
        let file_id = cache.add(source.input.display().to_string(), text.clone());
        let loop_mode = if source.legacy_loops {
            LoopMode::AtLeastOnce
        } else {
            LoopMode::Guarded
        };
        Self {
            cache,
            file_id,
            text,
            loop_mode,
        }
    }

    /// Prints the diagnostic for `err` and exits
    fn fail(&self, err: CompileError) -> ! {
        let diagnostic = err.to_diagnostic();
        eprintln!("{}", DiagnosticRenderer::new(&self.cache).render(&diagnostic));
        process::exit(1);
    }

    fn parse(&self) -> Program {
        match parse_source(&self.text, self.file_id) {
            Ok(program) => {
                info!(
                    functions = program.functions.len(),
                    prototypes = program.prototypes.len(),
                    "parsed"
                );
                program
            }
            Err(e) => self.fail(e),
        }
    }

    fn lower(&self) -> Module {
        let program = self.parse();
        let options = LoweringOptions {
            loop_mode: self.loop_mode,
            ..LoweringOptions::default()
        };
        match lower_program(&program, &options) {
            Ok(module) => {
                info!(functions = module.definitions().count(), "lowered to IR");
                module
            }
            Err(e) => self.fail(e),
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Lex { source } => {
            let session = Session::open(&source);
            for token in Lexer::new().lex(&session.text, session.file_id) {
                match token {
                    Ok(token) => println!("{:<12} {}", token.kind.to_string(), token),
                    Err(e) => session.fail(e),
                }
            }
        }

        Commands::Parse { source } => {
            let session = Session::open(&source);
            println!("{:#?}", session.parse());
        }

        Commands::Ir { source } => {
            let session = Session::open(&source);
            print!("{}", session.lower());
        }

        Commands::Check { source } => {
            let session = Session::open(&source);
            let module = session.lower();
            println!(
                "{}: ok ({} functions)",
                source.input.display(),
                module.definitions().count()
            );
        }

        Commands::Emit { source, output } => {
            let session = Session::open(&source);
            let options = CompileOptions {
                output,
                loop_mode: session.loop_mode,
            };
            let module = session.lower();
            if let Err(e) = LlvmTextBackend::new().save(&module, &options.output) {
                eprintln!("Error: {}", e);
                process::exit(1);
            }
            println!("Wrote {}", options.output.display());
        }

        Commands::Run { source, max_steps } => {
            let session = Session::open(&source);
            let module = session.lower();
            let stdout = std::io::stdout();
            let mut interpreter = Interpreter::new(&module, stdout.lock());
            if let Some(steps) = max_steps {
                interpreter = interpreter.with_max_steps(steps);
            }
            match interpreter.run_main() {
                Ok(value) => {
                    eprintln!("main returned {}", value);
                    process::exit(value as i32);
                }
                Err(e) => {
                    eprintln!("Runtime error: {}", e);
                    process::exit(1);
                }
            }
        }
    }
}
