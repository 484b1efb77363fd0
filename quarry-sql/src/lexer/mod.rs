//! Lexer module for SQL statements

pub mod scanner;
pub mod token;

pub use scanner::*;
pub use token::*;
