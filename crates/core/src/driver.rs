use std::path::Path;

use thiserror::Error;
use tracing::debug;

use huffc_fs::{SourceFS, StdSourceFS};
use huffc_isa::OpcodeTable;

use crate::ast::MacroTable;
use crate::config::CompilerConfig;
use crate::diag::{Diagnostic, RenderOptions, render_diagnostic_with_options};
use crate::error::HuffError;
use crate::expand::{Expander, to_hex};
use crate::listing::format_listing;
use crate::loader::load;
use crate::parser::parse_top_level;
use crate::span::{InputMap, SourceLocation};

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub bytecode: Vec<u8>,
    /// One entry per byte of `bytecode`.
    pub sourcemap: Vec<SourceLocation>,
}

impl CompileOutput {
    pub fn bytecode_hex(&self) -> String {
        to_hex(&self.bytecode)
    }

    pub fn listing(&self, opcodes: &OpcodeTable) -> String {
        format_listing(&self.bytecode, &self.sourcemap, opcodes)
    }
}

/// Everything known about a program before any macro is expanded.
#[derive(Debug, Clone)]
pub struct Program {
    pub input_map: InputMap,
    pub macros: MacroTable,
    pub opcodes: OpcodeTable,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CompileRenderOptions {
    pub color: bool,
}

#[derive(Debug, Error)]
#[error("compilation failed")]
pub struct CompileError {
    pub error: HuffError,
    pub location: Option<SourceLocation>,
    pub diagnostic: Diagnostic,
    pub rendered: String,
}

pub fn compile(
    entry_macro: &str,
    entry_file: &Path,
    include_path: &Path,
) -> Result<CompileOutput, CompileError> {
    let fs = StdSourceFS;
    compile_with_fs(
        entry_macro,
        entry_file,
        include_path,
        &fs,
        &CompilerConfig::default(),
    )
}

pub fn compile_with_fs(
    entry_macro: &str,
    entry_file: &Path,
    include_path: &Path,
    fs: &dyn SourceFS,
    config: &CompilerConfig,
) -> Result<CompileOutput, CompileError> {
    compile_with_options(
        entry_macro,
        entry_file,
        include_path,
        fs,
        config,
        CompileRenderOptions::default(),
    )
}

pub fn compile_with_options(
    entry_macro: &str,
    entry_file: &Path,
    include_path: &Path,
    fs: &dyn SourceFS,
    config: &CompilerConfig,
    options: CompileRenderOptions,
) -> Result<CompileOutput, CompileError> {
    let program = load_program(entry_file, include_path, fs, config, options)?;
    let fail = |error| fail_with_rendered(&program.input_map, error, options);

    let expander = Expander::new(&program.opcodes, config.max_expansion_depth);
    let expansion = expander
        .process_macro(entry_macro, 0, &[], &program.macros, false)
        .map_err(fail)?;
    let sourcemap = program
        .input_map
        .locate_all(&expansion.source_indices)
        .map_err(fail)?;
    debug!(
        entry = entry_macro,
        bytes = expansion.len(),
        "compiled entry macro"
    );

    Ok(CompileOutput {
        bytecode: expansion.bytecode,
        sourcemap,
    })
}

/// Loads, strips and parses a program without expanding anything.
pub fn load_program(
    entry_file: &Path,
    include_path: &Path,
    fs: &dyn SourceFS,
    config: &CompilerConfig,
    options: CompileRenderOptions,
) -> Result<Program, CompileError> {
    let loaded = load(entry_file, include_path, fs)
        .map_err(|error| fail_with_rendered(&InputMap::default(), error, options))?;
    let input_map = InputMap::build(loaded.fragments);
    let opcodes = config.opcode_table();
    let macros = match parse_top_level(&loaded.text, &opcodes) {
        Ok(macros) => macros,
        Err(error) => return Err(fail_with_rendered(&input_map, error, options)),
    };
    debug!(macros = macros.len(), "parsed program");

    Ok(Program {
        input_map,
        macros,
        opcodes,
    })
}

fn fail_with_rendered(
    input_map: &InputMap,
    error: HuffError,
    options: CompileRenderOptions,
) -> CompileError {
    let location = error.location().cloned().or_else(|| {
        error
            .span()
            .and_then(|span| input_map.locate(span.start).ok())
    });
    let diagnostic = Diagnostic::from_error(&error).with_location(location.clone());
    let rendered = render_diagnostic_with_options(
        input_map,
        &diagnostic,
        RenderOptions {
            color: options.color,
        },
    );
    CompileError {
        error,
        location,
        diagnostic,
        rendered,
    }
}

#[cfg(test)]
mod tests {
    use huffc_fs::MemorySourceFS;

    use super::*;

    fn compile_memory(fs: &MemorySourceFS, entry_macro: &str) -> Result<CompileOutput, CompileError> {
        compile_with_fs(
            entry_macro,
            Path::new("main.huff"),
            Path::new("/src"),
            fs,
            &CompilerConfig::default(),
        )
    }

    #[test]
    fn compiles_across_includes_with_sourcemap() {
        let fs = MemorySourceFS::new()
            .with_file(
                "/src/lib.huff",
                "// constants\n#define macro FIVE = takes(0) returns(1) {\n    0x05\n}\n",
            )
            .with_file(
                "/src/main.huff",
                "#include \"lib.huff\"\n#define macro MAIN = takes(0) returns(0) {\n    FIVE() 0x03 add\n}\n",
            );
        let output = compile_memory(&fs, "MAIN").expect("compile");
        assert_eq!(output.bytecode_hex(), "6005600301");
        assert_eq!(output.sourcemap.len(), output.bytecode.len());

        assert_eq!(output.sourcemap[0].filename, "lib.huff");
        assert_eq!(output.sourcemap[0].line_number, 2);
        assert_eq!(output.sourcemap[0].line_text, "    0x05");
        assert_eq!(output.sourcemap[4].filename, "main.huff");
        assert_eq!(output.sourcemap[4].line_text, "    FIVE() 0x03 add");
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let fs = MemorySourceFS::new().with_file(
            "/src/main.huff",
            "#define macro MAIN = takes(0) returns(0) { top: 0x01 top jumpi }",
        );
        let first = compile_memory(&fs, "MAIN").expect("compile");
        let second = compile_memory(&fs, "MAIN").expect("compile");
        assert_eq!(first.bytecode, second.bytecode);
        assert_eq!(first.sourcemap, second.sourcemap);
    }

    #[test]
    fn errors_carry_location_and_rendered_report() {
        let fs = MemorySourceFS::new().with_file(
            "/src/main.huff",
            "#define macro MAIN = takes(0) returns(0) {\n    missing jump\n}\n",
        );
        let err = compile_memory(&fs, "MAIN").expect_err("must fail");
        assert!(matches!(err.error, HuffError::UndefinedJumpLabel { .. }));
        let location = err.location.expect("location");
        assert_eq!(location.display_position(), "main.huff:2");
        assert!(err.rendered.contains("jump label 'missing' is not defined in macro 'MAIN'"));
        assert!(err.rendered.contains("main.huff"));
    }

    #[test]
    fn loader_errors_render_without_input_map() {
        let fs = MemorySourceFS::new().with_file("/src/main.huff", "add\n/* open");
        let err = compile_memory(&fs, "MAIN").expect_err("must fail");
        assert_eq!(
            err.rendered,
            "error: unclosed block comment\n --> main.huff:2\n  | /* open"
        );
    }

    #[test]
    fn missing_entry_file() {
        let fs = MemorySourceFS::new();
        let err = compile_memory(&fs, "MAIN").expect_err("must fail");
        assert!(matches!(err.error, HuffError::FileNotFound { .. }));
        assert_eq!(err.rendered, "error: file not found: 'main.huff'");
    }

    #[test]
    fn missing_entry_macro() {
        let fs = MemorySourceFS::new().with_file(
            "/src/main.huff",
            "#define macro OTHER = takes(0) returns(0) { stop }",
        );
        let err = compile_memory(&fs, "MAIN").expect_err("must fail");
        assert_eq!(
            err.rendered,
            "error: unknown macro 'MAIN'\nHelp: check the spelling or the #include that defines it"
        );
    }

    #[test]
    fn config_controls_depth_and_opcodes() {
        let fs = MemorySourceFS::new().with_file(
            "/src/main.huff",
            "#define macro MAIN = takes(0) returns(0) { tload MAIN() }",
        );
        let config = CompilerConfig {
            max_expansion_depth: 4,
            opcodes: vec![crate::config::OpcodeEntry {
                mnemonic: "tload".to_string(),
                opcode: 0x5C,
            }],
            ..CompilerConfig::default()
        };
        let err = compile_with_fs(
            "MAIN",
            Path::new("main.huff"),
            Path::new("/src"),
            &fs,
            &config,
        )
        .expect_err("must fail");
        assert!(matches!(
            err.error,
            HuffError::RecursionLimitExceeded { limit: 4, .. }
        ));
    }

    #[test]
    fn load_program_lists_macros_in_order() {
        let fs = MemorySourceFS::new().with_file(
            "/src/main.huff",
            "#define macro B = takes(0) returns(0) { stop }\n\
             template<X>\n\
             #define macro A = takes(1) returns(1) { <X> }",
        );
        let program = load_program(
            Path::new("main.huff"),
            Path::new("/src"),
            &fs,
            &CompilerConfig::default(),
            CompileRenderOptions::default(),
        )
        .expect("load");
        let names: Vec<_> = program.macros.iter().map(|mac| mac.name.as_str()).collect();
        assert_eq!(names, ["B", "A"]);
    }
}
