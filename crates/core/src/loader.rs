use std::collections::HashSet;
use std::path::{Path, PathBuf};

use huffc_fs::{FsError, SourceFS};
use tracing::{debug, trace};

use crate::error::HuffError;
use crate::span::{SourceFragment, SourceLocation};

const INCLUDE_DIRECTIVE: &str = "#include";

/// Every file reachable from the entry file, dependencies first.
#[derive(Debug, Clone)]
pub struct LoadedSource {
    pub fragments: Vec<SourceFragment>,
    pub text: String,
}

/// Replaces comments with spaces without changing the byte length of `text`.
pub fn strip_comments(text: &str, filename: &str) -> Result<String, HuffError> {
    let mut out = String::with_capacity(text.len());
    let mut cursor = 0;

    loop {
        let rest = &text[cursor..];
        let block = rest.find("/*");
        let line = rest.find("//");
        let (start, is_block) = match (block, line) {
            (None, None) => break,
            (Some(block), Some(line)) if block < line => (block, true),
            (Some(block), None) => (block, true),
            (_, Some(line)) => (line, false),
        };

        out.push_str(&rest[..start]);
        let comment = &rest[start..];
        let len = if is_block {
            match comment[2..].find("*/") {
                Some(close) => close + 4,
                None => {
                    let fragment = SourceFragment::new(filename, text);
                    let line_number = fragment.line_of(cursor + start);
                    return Err(HuffError::UnclosedComment {
                        location: SourceLocation {
                            filename: filename.to_string(),
                            line_number,
                            line_text: fragment.line_text(line_number).to_string(),
                        },
                    });
                }
            }
        } else {
            comment.find('\n').map_or(comment.len(), |newline| newline + 1)
        };
        out.extend(std::iter::repeat_n(' ', len));
        cursor += start + len;
    }

    out.push_str(&text[cursor..]);
    Ok(out)
}

/// Loads `entry_file` and everything it includes. Relative paths resolve
/// against `include_path`; each canonical path is loaded at most once.
pub fn load(
    entry_file: &Path,
    include_path: &Path,
    fs: &dyn SourceFS,
) -> Result<LoadedSource, HuffError> {
    let mut loader = Loader {
        include_path,
        fs,
        seen: HashSet::new(),
    };

    let entry = entry_file.to_string_lossy().into_owned();
    let canonical = loader.canonicalize(&entry)?;
    loader.seen.insert(canonical);
    let fragments = loader.load_file(&entry)?;

    let text: String = fragments
        .iter()
        .map(|fragment| fragment.text.as_str())
        .collect();
    debug!(
        files = fragments.len(),
        bytes = text.len(),
        "loaded program sources"
    );
    Ok(LoadedSource { fragments, text })
}

struct Loader<'a> {
    include_path: &'a Path,
    fs: &'a dyn SourceFS,
    seen: HashSet<PathBuf>,
}

impl Loader<'_> {
    fn resolve(&self, name: &str) -> PathBuf {
        self.include_path.join(name)
    }

    fn canonicalize(&self, name: &str) -> Result<PathBuf, HuffError> {
        self.fs
            .canonicalize(&self.resolve(name))
            .map_err(|source| file_not_found(name, source))
    }

    fn load_file(&mut self, name: &str) -> Result<Vec<SourceFragment>, HuffError> {
        let path = self.resolve(name);
        trace!(path = %path.display(), "reading source file");
        let raw = self
            .fs
            .read_to_string(&path)
            .map_err(|source| file_not_found(name, source))?;
        let mut text = strip_comments(&raw, name)?;

        let mut fragments = Vec::new();
        let mut cursor = 0;
        while let Some(found) = text[cursor..].find(INCLUDE_DIRECTIVE) {
            let start = cursor + found;
            let Some((target, end)) = parse_include(&text, start + INCLUDE_DIRECTIVE.len())
            else {
                let fragment = SourceFragment::new(name, raw.as_str());
                let line_number = fragment.line_of(start);
                return Err(HuffError::MalformedInclude {
                    location: SourceLocation {
                        filename: name.to_string(),
                        line_number,
                        line_text: fragment.line_text(line_number).to_string(),
                    },
                });
            };
            let target = target.to_string();
            text.replace_range(start..end, &" ".repeat(end - start));
            cursor = end;

            let canonical = self.canonicalize(&target)?;
            if self.seen.insert(canonical) {
                debug!(file = name, include = %target, "resolving include");
                fragments.extend(self.load_file(&target)?);
            } else {
                debug!(file = name, include = %target, "include already loaded, skipping");
            }
        }

        fragments.push(SourceFragment::blanked(name, raw, text));
        Ok(fragments)
    }
}

/// Quoted path following an include directive, and the offset just past its
/// closing quote.
fn parse_include(text: &str, after_directive: usize) -> Option<(&str, usize)> {
    let rest = &text[after_directive..];
    let trimmed = rest.trim_start();
    let open = after_directive + (rest.len() - trimmed.len());
    let quote = trimmed.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let body = &text[open + 1..];
    let close = body.find([quote, '\n'])?;
    if !body[close..].starts_with(quote) || close == 0 {
        return None;
    }
    Some((&body[..close], open + 1 + close + 1))
}

fn file_not_found(name: &str, source: FsError) -> HuffError {
    HuffError::FileNotFound {
        path: name.to_string(),
        source,
    }
}
