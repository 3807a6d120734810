use std::fmt;
use thiserror::Error;

/// 1-based source position of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(line: usize, column: usize) -> Self {
        Span { line, column }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Parse error: {0}")]
    ParseError(String, Option<Span>),

    #[error("Type resolution error: {0}")]
    TypeResolutionError(String, Option<Span>),

    #[error("Struct parse error: {0}")]
    StructParseError(String, Option<Span>),

    #[error("Construction error: {0}")]
    ConstructionError(String, Option<Span>),

    #[error("Code generation error: {0}")]
    CodegenError(String, Option<Span>),
}

impl CompilerError {
    pub fn span(&self) -> Option<Span> {
        match self {
            Self::ParseError(_, span) => *span,
            Self::TypeResolutionError(_, span) => *span,
            Self::StructParseError(_, span) => *span,
            Self::ConstructionError(_, span) => *span,
            Self::CodegenError(_, span) => *span,
        }
    }

    /// Attach a location to an error raised without one.
    pub fn at(self, at: Span) -> Self {
        match self {
            Self::ParseError(msg, None) => Self::ParseError(msg, Some(at)),
            Self::TypeResolutionError(msg, None) => Self::TypeResolutionError(msg, Some(at)),
            Self::StructParseError(msg, None) => Self::StructParseError(msg, Some(at)),
            Self::ConstructionError(msg, None) => Self::ConstructionError(msg, Some(at)),
            Self::CodegenError(msg, None) => Self::CodegenError(msg, Some(at)),
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, CompilerError>;

// Bail macros without span

#[macro_export]
macro_rules! bail_type {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::TypeResolutionError(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_struct {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::StructParseError(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_construct {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::ConstructionError(format!($($arg)*), None))
    };
}

#[macro_export]
macro_rules! bail_codegen {
    ($($arg:tt)*) => {
        return Err($crate::error::CompilerError::CodegenError(format!($($arg)*), None))
    };
}

// Bail macros with span

#[macro_export]
macro_rules! bail_parse_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::ParseError(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_struct_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::StructParseError(format!($($arg)*), Some($span)))
    };
}

#[macro_export]
macro_rules! bail_construct_at {
    ($span:expr, $($arg:tt)*) => {
        return Err($crate::error::CompilerError::ConstructionError(format!($($arg)*), Some($span)))
    };
}
