use thiserror::Error;

use huffc_eval::EvalError;
use huffc_fs::FsError;

use crate::span::{SourceLocation, Span};

/// Every way a compilation can fail. All of them are fatal.
#[derive(Debug, Error)]
pub enum HuffError {
    #[error("unrecognized syntax at '{found}'")]
    Parse { span: Span, found: String },
    #[error("{message}")]
    MalformedDefinition { span: Span, message: String },
    #[error("unknown macro '{name}'")]
    UnknownMacro { name: String, span: Option<Span> },
    #[error("macro '{name}' is already defined")]
    DuplicateMacro {
        name: String,
        span: Span,
        first: Span,
    },
    #[error("macro '{name}' expects {expected} template argument(s), got {got}")]
    TemplateArityMismatch {
        name: String,
        expected: usize,
        got: usize,
        span: Option<Span>,
    },
    #[error("template parameter '{param}' is not bound in macro '{macro_name}'")]
    UnboundTemplateParameter {
        param: String,
        macro_name: String,
        span: Span,
    },
    #[error("jump label '{label}' is defined more than once")]
    DuplicateJumpLabel {
        label: String,
        span: Span,
        first: Span,
    },
    #[error("jump label '{label}' is not defined in macro '{macro_name}'")]
    UndefinedJumpLabel {
        label: String,
        macro_name: String,
        span: Span,
    },
    #[error("jump label '{label}' is never referenced in macro '{macro_name}'")]
    UnusedJumpLabel {
        label: String,
        macro_name: String,
        span: Span,
    },
    #[error("jump target for '{label}' at offset {offset:#x} does not fit in two bytes")]
    JumpTargetOutOfRange {
        label: String,
        offset: usize,
        span: Span,
    },
    #[error("malformed push: {reason}")]
    MalformedPush { reason: String, span: Span },
    #[error("literal '{literal}' is {bytes} bytes wide, pushes carry at most 32")]
    LiteralTooLarge {
        literal: String,
        bytes: usize,
        span: Span,
    },
    #[error("literal '{literal}' evaluates to a negative value")]
    NegativeLiteral { literal: String, span: Span },
    #[error("template argument '{arg}' is not a byte count")]
    InvalidByteCount { arg: String, span: Span },
    #[error("{source}")]
    Literal {
        #[source]
        source: EvalError,
        span: Span,
    },
    #[error("unclosed block comment")]
    UnclosedComment { location: SourceLocation },
    #[error("#include must be followed by a quoted path")]
    MalformedInclude { location: SourceLocation },
    #[error("file not found: '{path}'")]
    FileNotFound {
        path: String,
        #[source]
        source: FsError,
    },
    #[error("source offset {index} is outside every loaded file")]
    OffsetOutOfRange { index: usize },
    #[error("macro expansion of '{name}' exceeded the depth limit of {limit}")]
    RecursionLimitExceeded {
        name: String,
        limit: usize,
        span: Option<Span>,
    },
}

impl HuffError {
    /// Primary span in the concatenated program text, when one is known.
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::Parse { span, .. }
            | Self::MalformedDefinition { span, .. }
            | Self::DuplicateMacro { span, .. }
            | Self::UnboundTemplateParameter { span, .. }
            | Self::DuplicateJumpLabel { span, .. }
            | Self::UndefinedJumpLabel { span, .. }
            | Self::UnusedJumpLabel { span, .. }
            | Self::JumpTargetOutOfRange { span, .. }
            | Self::MalformedPush { span, .. }
            | Self::LiteralTooLarge { span, .. }
            | Self::NegativeLiteral { span, .. }
            | Self::InvalidByteCount { span, .. }
            | Self::Literal { span, .. } => Some(*span),
            Self::UnknownMacro { span, .. }
            | Self::TemplateArityMismatch { span, .. }
            | Self::RecursionLimitExceeded { span, .. } => *span,
            Self::UnclosedComment { .. }
            | Self::MalformedInclude { .. }
            | Self::FileNotFound { .. }
            | Self::OffsetOutOfRange { .. } => None,
        }
    }

    /// Location resolved before an input map existed.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::UnclosedComment { location } | Self::MalformedInclude { location } => {
                Some(location)
            }
            _ => None,
        }
    }

    /// Attaches a span to errors raised without one, such as a failed lookup
    /// of the entry macro reached again from a call site.
    pub(crate) fn or_at(self, at: Span) -> Self {
        match self {
            Self::UnknownMacro { name, span: None } => Self::UnknownMacro {
                name,
                span: Some(at),
            },
            Self::TemplateArityMismatch {
                name,
                expected,
                got,
                span: None,
            } => Self::TemplateArityMismatch {
                name,
                expected,
                got,
                span: Some(at),
            },
            Self::RecursionLimitExceeded {
                name,
                limit,
                span: None,
            } => Self::RecursionLimitExceeded {
                name,
                limit,
                span: Some(at),
            },
            other => other,
        }
    }
}
