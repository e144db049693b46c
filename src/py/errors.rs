use thiserror::Error;

#[derive(Error, Debug)]
pub enum PyError {
    #[error("failed to set language for parser")]
    LanguageSet,

    #[error("failed to parse source code")]
    ParseFailed,

    #[error("syntax error at line {line}")]
    SyntaxError { line: usize },
}
