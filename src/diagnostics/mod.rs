use crate::span::Span;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexical error: {msg}")]
    Lex { msg: String, span: Span },

    #[error("Syntax error: {msg}")]
    Syntax { msg: String, span: Span },

    #[error("Semantic error: {msg}")]
    Semantic { msg: String, span: Span, code: i32 },

    #[error("Codegen error: {msg}")]
    Codegen { msg: String },

    #[error("Internal error: {msg}")]
    Internal { msg: String },
}

impl CompileError {
    pub fn lex(msg: impl Into<String>, span: Span) -> Self {
        Self::Lex { msg: msg.into(), span }
    }

    pub fn syntax(msg: impl Into<String>, span: Span) -> Self {
        Self::Syntax { msg: msg.into(), span }
    }

    pub fn semantic(msg: impl Into<String>, span: Span, code: i32) -> Self {
        Self::Semantic { msg: msg.into(), span, code }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        Self::Codegen { msg: msg.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal { msg: msg.into() }
    }

    /// Process exit code carried by this error. Part of the observable
    /// contract: 1 lexical, 2 syntax/structural, 3-6 semantic classes,
    /// 99 compiler-internal invariant violation.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Lex { .. } => 1,
            CompileError::Syntax { .. } => 2,
            CompileError::Semantic { code, .. } => *code,
            CompileError::Codegen { .. } => 99,
            CompileError::Internal { .. } => 99,
        }
    }
}

/// Render a CompileError with ariadne for nice terminal output.
pub fn render_error(source: &str, err: &CompileError) {
    use ariadne::{Label, Report, ReportKind, Source};

    match err {
        CompileError::Lex { msg, span }
        | CompileError::Syntax { msg, span }
        | CompileError::Semantic { msg, span, .. } => {
            let kind_str = match err {
                CompileError::Lex { .. } => "lexical",
                CompileError::Syntax { .. } => "syntax",
                _ => "semantic",
            };
            Report::build(ReportKind::Error, (), span.start)
                .with_message(format!("{kind_str} error"))
                .with_label(
                    Label::new(span.start..span.end)
                        .with_message(msg),
                )
                .finish()
                .eprint(Source::from(source))
                .ok();
        }
        CompileError::Codegen { msg } => {
            eprintln!("error: {msg}");
        }
        CompileError::Internal { msg } => {
            eprintln!("internal compiler error: {msg}");
        }
    }
}
