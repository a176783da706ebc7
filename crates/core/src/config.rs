use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Deserialize;

use huffc_isa::OpcodeTable;

pub const DEFAULT_MAX_EXPANSION_DEPTH: usize = 256;
pub const DEFAULT_ENTRY: &str = "MAIN";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CompilerConfig {
    #[serde(default = "default_max_expansion_depth")]
    pub max_expansion_depth: usize,
    #[serde(default)]
    pub include_path: Option<PathBuf>,
    #[serde(default)]
    pub entry: Option<String>,
    /// Added to, or overriding, the built-in mnemonic table.
    #[serde(default)]
    pub opcodes: Vec<OpcodeEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpcodeEntry {
    pub mnemonic: String,
    pub opcode: u8,
}

fn default_max_expansion_depth() -> usize {
    DEFAULT_MAX_EXPANSION_DEPTH
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            max_expansion_depth: DEFAULT_MAX_EXPANSION_DEPTH,
            include_path: None,
            entry: None,
            opcodes: Vec::new(),
        }
    }
}

impl CompilerConfig {
    pub fn entry_macro(&self) -> &str {
        self.entry.as_deref().unwrap_or(DEFAULT_ENTRY)
    }

    pub fn opcode_table(&self) -> OpcodeTable {
        let mut table = OpcodeTable::evm();
        for entry in &self.opcodes {
            table.insert(entry.mnemonic.clone(), entry.opcode);
        }
        table
    }

    fn validate(&self) -> Result<()> {
        if self.max_expansion_depth == 0 {
            bail!("max_expansion_depth must be at least 1");
        }
        for entry in &self.opcodes {
            let mut chars = entry.mnemonic.chars();
            let valid = chars
                .next()
                .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
                && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
            if !valid {
                bail!("opcode mnemonic '{}' is not a valid identifier", entry.mnemonic);
            }
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<CompilerConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read compiler config '{}'", path.display()))?;
    parse_config(&text)
        .with_context(|| format!("failed to parse compiler config '{}'", path.display()))
}

pub fn parse_config(text: &str) -> Result<CompilerConfig> {
    let config: CompilerConfig = ron::from_str(text)?;
    config.validate()?;
    Ok(config)
}
