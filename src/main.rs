mod args;

use args::Mode;
use rustyline::Editor;
use std::{env, fs, io, process::exit};
use vela::vm::{InterpretResult, Vm};

fn main() {
    let mode = match Mode::from_args(env::args()) {
        Ok(mode) => mode,
        Err(err) => {
            eprintln!("{err}");
            exit(exitcode::USAGE);
        }
    };

    let result = match mode {
        Mode::Prompt => run_prompt(),
        Mode::File(path) => run_file(&path),
    };
    exit(match result {
        InterpretResult::Ok => exitcode::OK,
        InterpretResult::CompileError => exitcode::DATAERR,
        InterpretResult::RuntimeError => exitcode::SOFTWARE,
    });
}

/// Single-prompt mode: read one line from standard input — `$` stands in
/// for a newline so a multi-statement program can be pasted on one logical
/// line — and interpret exactly that line. Not a REPL loop: one prompt, one
/// program, then the process exits.
fn run_prompt() -> InterpretResult {
    let mut editor: Editor<()> = Editor::new();
    let line = match editor.readline("> ") {
        Ok(line) => line,
        Err(_) => return InterpretResult::Ok,
    };
    let source = line.replace('$', "\n");
    let mut vm = Vm::new(io::stdout());
    if cfg!(feature = "gc-stress") {
        vm.set_gc_stress(true);
    }
    vm.interpret(&source)
}

fn run_file(path: &std::path::Path) -> InterpretResult {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(err) => {
            eprintln!("{err}");
            exit(exitcode::IOERR);
        }
    };
    let mut vm = Vm::new(io::stdout());
    if cfg!(feature = "gc-stress") {
        vm.set_gc_stress(true);
    }
    vm.interpret(&source)
}
