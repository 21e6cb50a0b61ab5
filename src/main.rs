use clap::{Parser, Subcommand};
use std::path::PathBuf;

use erisc::diagnostics::{render_error, CompileError};

#[derive(Parser)]
#[command(name = "erisc", version, about = "The Eris compiler")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile a source file to target instruction text
    Compile {
        /// Source file path
        file: PathBuf,
        /// Output path; stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse, validate and optimize without generating code
    Check {
        /// Source file path
        file: PathBuf,
    },
    /// Print the optimized AST as JSON
    DumpAst {
        /// Source file path
        file: PathBuf,
    },
}

fn read_source(path: &PathBuf) -> Result<String, CompileError> {
    std::fs::read_to_string(path)
        .map_err(|e| CompileError::codegen(format!("failed to read '{}': {e}", path.display())))
}

fn run(cli: Cli) -> Result<(), (String, CompileError)> {
    match cli.command {
        Commands::Compile { file, output } => {
            let source = read_source(&file).map_err(|e| (String::new(), e))?;
            let code = erisc::compile_source(&source).map_err(|e| (source.clone(), e))?;
            match output {
                Some(path) => std::fs::write(&path, code).map_err(|e| {
                    (
                        source,
                        CompileError::codegen(format!(
                            "failed to write '{}': {e}",
                            path.display()
                        )),
                    )
                })?,
                None => print!("{code}"),
            }
            Ok(())
        }
        Commands::Check { file } => {
            let source = read_source(&file).map_err(|e| (String::new(), e))?;
            erisc::check_source(&source).map_err(|e| (source, e))?;
            Ok(())
        }
        Commands::DumpAst { file } => {
            let source = read_source(&file).map_err(|e| (String::new(), e))?;
            let program = erisc::check_source(&source).map_err(|e| (source, e))?;
            match serde_json::to_string_pretty(&program) {
                Ok(json) => {
                    println!("{json}");
                    Ok(())
                }
                Err(e) => Err((
                    String::new(),
                    CompileError::internal(format!("AST serialization failed: {e}")),
                )),
            }
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err((source, err)) = run(cli) {
        render_error(&source, &err);
        std::process::exit(err.exit_code());
    }
}
