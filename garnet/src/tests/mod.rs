mod eval;
mod lexing;
mod object;
mod parsing;
