use pretty_assertions::assert_eq;

use crate::error::{Position, Syntax, SyntaxError};
use crate::lexing::{Lexer, Token, TokenType};
use crate::stream::TextStream;


fn lex(code: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut lexer = Lexer::new(TextStream::new(code));
    let mut tokens = vec![];
    while let Some(token) = lexer.next_token()? {
        tokens.push(token);
    }
    Ok(tokens)
}

fn kinds(code: &str) -> Vec<(TokenType, String)> {
    lex(code)
        .unwrap()
        .into_iter()
        .map(|token| (token.kind, token.text))
        .collect()
}

fn tok(kind: TokenType, text: &str) -> (TokenType, String) {
    (kind, text.to_owned())
}

fn lex_error(code: &str) -> SyntaxError {
    lex(code).unwrap_err()
}


#[test]
fn basic_tokens() {
    use TokenType::*;

    assert_eq!(
        kinds("x = 1.5 + :sym"),
        vec![
            tok(Identifier, "x"),
            tok(Operator, "="),
            tok(Float, "1.5"),
            tok(Operator, "+"),
            tok(Symbol, "sym"),
        ],
    );

    assert_eq!(
        kinds("puts 1_000, \"a\"; Foo"),
        vec![
            tok(Identifier, "puts"),
            tok(Integer, "1000"),
            tok(Separator, ","),
            tok(String, "a"),
            tok(Separator, ";"),
            tok(Constant, "Foo"),
        ],
    );
}


#[test]
fn dots_after_numbers() {
    use TokenType::*;

    assert_eq!(
        kinds("5.times"),
        vec![tok(Integer, "5"), tok(Separator, "."), tok(Identifier, "times")],
    );
    assert_eq!(
        kinds("1..3"),
        vec![tok(Integer, "1"), tok(Operator, ".."), tok(Integer, "3")],
    );
    assert_eq!(
        kinds("1...3"),
        vec![tok(Integer, "1"), tok(Operator, "..."), tok(Integer, "3")],
    );
    assert_eq!(kinds("2.25"), vec![tok(Float, "2.25")]);
}


#[test]
fn variables() {
    use TokenType::*;

    assert_eq!(
        kinds("@a @@b $c"),
        vec![tok(InstanceVar, "@a"), tok(ClassVar, "@@b"), tok(GlobalVar, "$c")],
    );
    assert_eq!(
        kinds("Foo::Bar"),
        vec![tok(Constant, "Foo"), tok(Separator, "::"), tok(Constant, "Bar")],
    );
}


#[test]
fn identifier_suffixes() {
    use TokenType::*;

    assert_eq!(
        kinds("empty? save!"),
        vec![tok(Identifier, "empty?"), tok(Identifier, "save!")],
    );
    assert_eq!(
        kinds("a!=b"),
        vec![tok(Identifier, "a"), tok(Operator, "!="), tok(Identifier, "b")],
    );
}


#[test]
fn symbols() {
    use TokenType::*;

    assert_eq!(
        kinds(":+ :[]= :name= :@x :\"two words\""),
        vec![
            tok(Symbol, "+"),
            tok(Symbol, "[]="),
            tok(Symbol, "name="),
            tok(Symbol, "@x"),
            tok(Symbol, "two words"),
        ],
    );
    assert_eq!(kinds(":a==:b"), vec![tok(Symbol, "a"), tok(Operator, "=="), tok(Symbol, "b")]);
}


#[test]
fn strings() {
    use TokenType::*;

    assert_eq!(kinds("\"a\\tb\\n\""), vec![tok(String, "a\tb\n")]);
    assert_eq!(kinds("'a\\nb'"), vec![tok(String, "a\\nb")]);
    assert_eq!(kinds("'it\\'s'"), vec![tok(String, "it's")]);
    assert_eq!(kinds("\"say \\\"hi\\\"\""), vec![tok(String, "say \"hi\"")]);
}


#[test]
fn comments_and_newlines() {
    use TokenType::*;

    assert_eq!(
        kinds("a # comment\nb"),
        vec![tok(Identifier, "a"), tok(EndOfLine, "\n"), tok(Identifier, "b")],
    );
    assert_eq!(
        kinds("a \\\n  + b"),
        vec![tok(Identifier, "a"), tok(Operator, "+"), tok(Identifier, "b")],
    );
}


#[test]
fn spacing() {
    let tokens = lex("a [1]").unwrap();
    assert_eq!(tokens[0].spaced, false);
    assert_eq!(tokens[1].spaced, true);

    let tokens = lex("a[1]").unwrap();
    assert_eq!(tokens[1].spaced, false);
}


#[test]
fn positions() {
    let tokens = lex("ab\n  cd").unwrap();
    assert_eq!(tokens.len(), 3);
    assert_eq!(tokens[0].span, Position::new(0, 0, 0).with_length(2));
    assert_eq!(tokens[1].span, Position::new(2, 0, 2).with_length(1));
    assert_eq!(tokens[2].span, Position::new(5, 1, 2).with_length(2));
}


#[test]
fn pushback() {
    let mut lexer = Lexer::new(TextStream::new("foo bar"));
    let first = lexer.next_token().unwrap().unwrap();
    assert_eq!(first.text, "foo");

    lexer.push_token(first.clone());
    assert_eq!(lexer.next_token().unwrap(), Some(first));

    let second = lexer.next_token().unwrap().unwrap();
    assert_eq!(second.text, "bar");
    assert_eq!(lexer.next_token().unwrap(), None);
}


#[test]
fn pushback_several() {
    let mut lexer = Lexer::new(TextStream::new("a b c"));
    let a = lexer.next_token().unwrap().unwrap();
    let b = lexer.next_token().unwrap().unwrap();

    lexer.push_token(b.clone());
    lexer.push_token(a.clone());
    assert_eq!(lexer.next_token().unwrap(), Some(a));
    assert_eq!(lexer.next_token().unwrap(), Some(b));
    assert_eq!(lexer.next_token().unwrap().map(|t| t.text), Some("c".to_owned()));
    assert_eq!(lexer.next_token().unwrap(), None);
}


#[test]
fn errors() {
    let err = lex_error("\"abc");
    assert_eq!(err.reason(), &Syntax::UnterminatedString);
    assert_eq!(err.position(), Position::new(0, 0, 0));
    assert_eq!(err.line_text(), Some("\"abc"));

    let err = lex_error("x = `y`");
    assert_eq!(err.reason(), &Syntax::UnexpectedChar('`'));
    assert_eq!(err.position(), Position::new(4, 0, 4));

    let err = lex_error("12ab");
    assert_eq!(err.reason(), &Syntax::InvalidNumber("12a".to_owned()));

    let err = lex_error("x\n@ y");
    assert_eq!(err.reason(), &Syntax::UnexpectedChar('@'));
    assert_eq!(err.position(), Position::new(2, 1, 0));
    assert_eq!(err.line_text(), Some("@ y"));
}


#[test]
fn error_display() {
    let err = lex_error("x = `y`");
    assert_eq!(err.to_string(), "1:5: unexpected character '`'\nx = `y`\n    ^");
}
