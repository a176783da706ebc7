use std::collections::{HashMap, hash_map::Entry};
use std::fmt;

use ariadne::{Cache, Color, ColorGenerator, Config, IndexType, Label, Report, ReportKind, Source};

use crate::error::HuffError;
use crate::span::{InputMap, SourceId, SourceLocation, Span};

#[derive(Debug, Clone)]
pub struct LabelledSpan {
    pub span: Span,
    pub message: String,
}

#[derive(Debug, Clone)]
pub enum Supplemental {
    Help(String),
    Note(String),
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub message: String,
    pub primary: Option<Span>,
    pub location: Option<SourceLocation>,
    pub labels: Vec<LabelledSpan>,
    pub supplements: Vec<Supplemental>,
}

impl Diagnostic {
    pub fn error(primary: Option<Span>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            primary,
            location: None,
            labels: Vec::new(),
            supplements: Vec::new(),
        }
    }

    pub fn with_location(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn with_label(mut self, span: Span, message: impl Into<String>) -> Self {
        self.labels.push(LabelledSpan {
            span,
            message: message.into(),
        });
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.supplements.push(Supplemental::Help(help.into()));
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.supplements.push(Supplemental::Note(note.into()));
        self
    }

    pub fn from_error(error: &HuffError) -> Self {
        let diagnostic =
            Self::error(error.span(), error.to_string()).with_location(error.location().cloned());
        match error {
            HuffError::DuplicateJumpLabel { first, .. } => {
                diagnostic.with_label(*first, "first defined here")
            }
            HuffError::DuplicateMacro { first, .. } => diagnostic
                .with_label(*first, "first defined here")
                .with_help("rename one of the macros"),
            HuffError::UndefinedJumpLabel { .. } => diagnostic
                .with_help("jump labels are only visible inside the macro that defines them"),
            HuffError::UnusedJumpLabel { .. } => {
                diagnostic.with_help("jump to the label or remove it")
            }
            HuffError::LiteralTooLarge { .. } => {
                diagnostic.with_help("split the constant across several pushes")
            }
            HuffError::InvalidByteCount { .. } => {
                diagnostic.with_help("measured template arguments must be between 0 and 0xffff")
            }
            HuffError::UnknownMacro { .. } => {
                diagnostic.with_help("check the spelling or the #include that defines it")
            }
            HuffError::RecursionLimitExceeded { .. } => diagnostic.with_note(
                "raise max_expansion_depth in the compiler config if the recursion is intentional",
            ),
            _ => diagnostic,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

#[derive(Debug)]
struct InputMapCache<'a> {
    input_map: &'a InputMap,
    sources: HashMap<SourceId, Source<&'a str>>,
}

impl<'a> InputMapCache<'a> {
    fn new(input_map: &'a InputMap) -> Self {
        Self {
            input_map,
            sources: HashMap::new(),
        }
    }
}

impl<'a> Cache<SourceId> for InputMapCache<'a> {
    type Storage = &'a str;

    fn fetch(&mut self, id: &SourceId) -> Result<&Source<Self::Storage>, impl fmt::Debug> {
        match self.sources.entry(*id) {
            Entry::Occupied(entry) => Ok::<_, String>(entry.into_mut()),
            Entry::Vacant(entry) => {
                let fragment = self
                    .input_map
                    .get(*id)
                    .ok_or_else(|| format!("missing source for id {:?}", id))?;
                Ok::<_, String>(entry.insert(Source::from(fragment.original())))
            }
        }
    }

    fn display<'b>(&self, id: &'b SourceId) -> Option<impl fmt::Display + 'b> {
        self.input_map.get(*id).map(|fragment| fragment.filename.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    pub color: bool,
}

impl RenderOptions {
    pub const fn plain() -> Self {
        Self { color: false }
    }

    pub const fn colored() -> Self {
        Self { color: true }
    }
}

pub fn render_diagnostic(input_map: &InputMap, diagnostic: &Diagnostic) -> String {
    render_diagnostic_with_options(input_map, diagnostic, RenderOptions::plain())
}

pub fn render_diagnostic_with_options(
    input_map: &InputMap,
    diagnostic: &Diagnostic,
    options: RenderOptions,
) -> String {
    let primary = diagnostic
        .primary
        .and_then(|span| input_map.resolve_span(span).ok());
    let Some(primary_span) = primary else {
        return render_fallback(input_map, diagnostic);
    };

    let mut report = Report::build(ReportKind::Error, primary_span.clone())
        .with_config(
            Config::default()
                .with_index_type(IndexType::Byte)
                .with_color(options.color),
        )
        .with_message(diagnostic.message.clone())
        .with_label(
            Label::new(primary_span)
                .with_color(Color::Red)
                .with_priority(100)
                .with_order(0)
                .with_message("here"),
        );

    let mut colors = ColorGenerator::new();
    for (index, label) in diagnostic.labels.iter().enumerate() {
        let Ok(span) = input_map.resolve_span(label.span) else {
            continue;
        };
        report = report.with_label(
            Label::new(span)
                .with_color(colors.next())
                .with_order((index + 1) as i32)
                .with_message(label.message.clone()),
        );
    }

    for supplement in &diagnostic.supplements {
        report = match supplement {
            Supplemental::Help(help) => report.with_help(help.clone()),
            Supplemental::Note(note) => report.with_note(note.clone()),
        };
    }

    let mut output = Vec::new();
    let mut cache = InputMapCache::new(input_map);
    if report.finish().write(&mut cache, &mut output).is_ok() {
        return String::from_utf8_lossy(&output).into_owned();
    }
    render_fallback(input_map, diagnostic)
}

fn render_fallback(input_map: &InputMap, diagnostic: &Diagnostic) -> String {
    let location = diagnostic.location.clone().or_else(|| {
        diagnostic
            .primary
            .and_then(|span| input_map.locate(span.start).ok())
    });
    let mut fallback = format!("error: {}", diagnostic.message);
    if let Some(location) = location {
        fallback.push_str(&format!(
            "\n --> {}\n  | {}",
            location.display_position(),
            location.line_text
        ));
    }
    for supplement in &diagnostic.supplements {
        match supplement {
            Supplemental::Help(help) => fallback.push_str(&format!("\nHelp: {help}")),
            Supplemental::Note(note) => fallback.push_str(&format!("\nNote: {note}")),
        }
    }
    fallback
}
