//! SysY Compiler Driver
//!
//! Command-line entry point: runs the optimization pipeline over an IR
//! module, allocates, lowers to RISC-V, and writes the assembly to the
//! destination path. The language front end is an external collaborator;
//! until it is linked in, the input file stem selects one of the built-in
//! sample programs constructed through the Builder API, which keeps the
//! whole pipeline exercisable end to end.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

mod samples;

#[derive(Parser)]
#[command(name = "syc")]
#[command(about = "SysY compiler middle-end and RISC-V back-end")]
#[command(version = "0.1.0")]
struct Cli {
    /// Input source file (the stem selects a built-in sample program)
    input: PathBuf,

    /// Output assembly file; defaults to the input with a .s extension
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Print the textual IR after optimization
    #[arg(long)]
    print_ir: bool,

    /// Save the textual IR to a file
    #[arg(long)]
    emit_ir: Option<PathBuf>,

    /// Dump the IR module as JSON instead of the textual form
    #[arg(long)]
    json_ir: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();
    match compile(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn compile(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    let stem = cli
        .input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let mut module = samples::build(stem).ok_or_else(|| {
        format!(
            "no front end is linked and '{}' is not a built-in sample (available: {})",
            stem,
            samples::NAMES.join(", ")
        )
    })?;

    syc_ir::optimize_module(&mut module);

    if cli.print_ir {
        if cli.json_ir {
            println!("{}", serde_json::to_string_pretty(&module)?);
        } else {
            print!("{}", module);
        }
    }
    if let Some(path) = &cli.emit_ir {
        let text = if cli.json_ir {
            serde_json::to_string_pretty(&module)?
        } else {
            module.to_string()
        };
        std::fs::write(path, text)?;
    }

    let asm = syc_backend::emit_module(&module);
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| cli.input.with_extension("s"));
    asm.write_to(&output)?;
    log::info!("assembly written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_samples_compile_to_assembly() {
        for name in samples::NAMES {
            let mut module = samples::build(name).unwrap();
            syc_ir::optimize_module(&mut module);
            let asm = syc_backend::emit_module(&module);
            let text = asm.render();
            assert!(text.contains(".text"), "{} produced no text section", name);
            assert!(text.contains("  ret"), "{} produced no return", name);
        }
    }

    #[test]
    fn test_unknown_sample_is_an_error() {
        let cli = Cli {
            input: PathBuf::from("no-such-program.sy"),
            output: None,
            print_ir: false,
            emit_ir: None,
            json_ir: false,
        };
        assert!(compile(&cli).is_err());
    }
}
