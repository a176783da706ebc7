mod body;

use huffc_isa::OpcodeTable;
use tracing::debug;

use crate::ast::{Macro, MacroTable};
use crate::error::HuffError;
use crate::grammar::{Cursor, TopLevelLexeme, top_level_lexemes};
use crate::lexer::lex;

pub use body::parse_macro;

/// Builds the macro table from the concatenated program text.
pub fn parse_top_level(text: &str, opcodes: &OpcodeTable) -> Result<MacroTable, HuffError> {
    let tokens = lex(text, 0)?;
    let mut cursor = Cursor::new(&tokens, text, 0);
    let lexemes = top_level_lexemes(&mut cursor)?;

    let mut macros = MacroTable::new();
    let mut pending_params: Option<Vec<String>> = None;
    for lexeme in lexemes {
        match lexeme {
            TopLevelLexeme::Template { params, .. } => pending_params = Some(params),
            TopLevelLexeme::MacroDefinition {
                name,
                takes,
                returns,
                body,
                span,
            } => {
                let raw_body = &text[body.as_range()];
                let ops = parse_macro(raw_body, &macros, body.start, opcodes)?;
                let template_params = pending_params.take().unwrap_or_default();
                debug!(
                    name = %name,
                    ops = ops.len(),
                    template_params = template_params.len(),
                    "parsed macro"
                );
                macros.insert(Macro {
                    name,
                    template_params,
                    takes,
                    returns,
                    ops,
                    raw_body: raw_body.to_string(),
                    span,
                })?;
            }
            TopLevelLexeme::Include { .. } => {}
        }
    }

    Ok(macros)
}
