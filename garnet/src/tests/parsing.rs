use std::io::Cursor;

use pretty_assertions::assert_eq;

use crate::ast::{BlockArg, BlockDef, Call, Node, Params};
use crate::error::{Position, Syntax, SyntaxError, Tagged};
use crate::parsing::{parse, parse_reader};


/// Compact rendering of a syntax tree, ignoring source locations.
fn sexp(node: &Tagged<Node>) -> String {
    match node.as_ref() {
        Node::Nil => "nil".to_owned(),
        Node::True => "true".to_owned(),
        Node::False => "false".to_owned(),
        Node::SelfRef => "self".to_owned(),
        Node::Integer(x) => x.to_string(),
        Node::Float(x) => format!("{:?}", x),
        Node::Str(x) => format!("{:?}", x),
        Node::Symbol(x) => format!(":{}", x),

        Node::Array(items) => format!("[{}]", list(items)),
        Node::Hash(pairs) => {
            let pairs: Vec<String> = pairs.iter().map(|(k, v)| format!("{}=>{}", sexp(k), sexp(v))).collect();
            format!("{{{}}}", pairs.join(" "))
        }
        Node::Range { low, high, exclusive } => {
            format!("({} {} {})", if *exclusive { "..." } else { ".." }, sexp(low), sexp(high))
        }

        Node::LocalVar(x) | Node::InstanceVar(x) | Node::ClassVar(x) | Node::GlobalVar(x) | Node::Constant(x) => {
            x.to_string()
        }
        Node::ScopedConstant { scope, name } => format!("{}::{}", sexp(scope), name),

        Node::Call(Call { receiver, name, args, block }) => {
            let mut parts = vec![];
            match receiver {
                Some(receiver) => {
                    parts.push(name.to_string());
                    parts.push(sexp(receiver));
                }
                None => {
                    parts.push("call".to_owned());
                    parts.push(name.to_string());
                }
            }
            parts.extend(args.iter().map(sexp));
            match block {
                Some(BlockArg::Literal(def)) => parts.push(block_def(def)),
                Some(BlockArg::Expr(expr)) => parts.push(format!("&{}", sexp(expr))),
                None => {}
            }
            format!("({})", parts.join(" "))
        }

        Node::Index { receiver, args } => format!("(index {} {})", sexp(receiver), list(args)),
        Node::And(l, r) => format!("(and {} {})", sexp(l), sexp(r)),
        Node::Or(l, r) => format!("(or {} {})", sexp(l), sexp(r)),
        Node::Assign { target, value } => format!("(= {} {})", sexp(target), sexp(value)),

        Node::If { condition, then_branch, else_branch } => {
            format!("(if {} ({}) ({}))", sexp(condition), list(then_branch), list(else_branch))
        }
        Node::While { condition, body } => format!("(while {} {})", sexp(condition), list(body)),
        Node::Until { condition, body } => format!("(until {} {})", sexp(condition), list(body)),
        Node::For { iterable, body } => {
            format!("(for {} {} {})", params(&body.params), sexp(iterable), list(&body.body))
        }

        Node::Def { target, def } => {
            let name = match target {
                Some(target) => format!("{}.{}", sexp(target), def.name),
                None => def.name.to_string(),
            };
            format!("(def {}({}) {})", name, params(&def.params), list(&def.body))
        }
        Node::Class { path, superclass, body } => {
            let mut text = format!("(class {}", sexp(path));
            if let Some(superclass) = superclass {
                text.push_str(&format!(" < {}", sexp(superclass)));
            }
            for node in body {
                text.push(' ');
                text.push_str(&sexp(node));
            }
            text.push(')');
            text
        }
        Node::Module { path, body } => {
            let mut text = format!("(module {}", sexp(path));
            for node in body {
                text.push(' ');
                text.push_str(&sexp(node));
            }
            text.push(')');
            text
        }

        Node::Lambda(def) => format!("(-> {})", block_def(def)),
        Node::Sequence(body) => format!("(begin {})", list(body)),
        Node::Yield(args) => format!("(yield {})", list(args)),

        other => format!("{:?}", other),
    }
}

fn list(nodes: &[Tagged<Node>]) -> String {
    nodes.iter().map(sexp).collect::<Vec<_>>().join(" ")
}

fn params(params: &Params) -> String {
    let mut names: Vec<String> = params.names.iter().map(|x| x.to_string()).collect();
    if let Some(block) = params.block {
        names.push(format!("&{}", block));
    }
    names.join(" ")
}

fn block_def(def: &BlockDef) -> String {
    format!("{{|{}| {}}}", params(&def.params), list(&def.body))
}

fn parse_all(code: &str) -> Vec<String> {
    parse(code, "test").unwrap().body.iter().map(sexp).collect()
}

fn parse_one(code: &str) -> String {
    let mut nodes = parse_all(code);
    assert_eq!(nodes.len(), 1, "expected a single statement in {:?}", code);
    nodes.remove(0)
}

fn parse_error(code: &str) -> SyntaxError {
    parse(code, "test").unwrap_err()
}


#[test]
fn literals() {
    assert_eq!(parse_one("nil"), "nil");
    assert_eq!(parse_one("true"), "true");
    assert_eq!(parse_one("12"), "12");
    assert_eq!(parse_one("-5"), "-5");
    assert_eq!(parse_one("2.5"), "2.5");
    assert_eq!(parse_one("\"hi\""), "\"hi\"");
    assert_eq!(parse_one(":sym"), ":sym");
    assert_eq!(parse_one("[1, 2.5, \"a\", :b, nil]"), "[1 2.5 \"a\" :b nil]");
    assert_eq!(parse_one("[\n  1,\n  2,\n]"), "[1 2]");
    assert_eq!(parse_one("{:a => 1, \"b\" => [2]}"), "{:a=>1 \"b\"=>[2]}");
    assert_eq!(parse_one("{}"), "{}");
}


#[test]
fn precedence() {
    assert_eq!(parse_one("1 + 2 * 3"), "(+ 1 (* 2 3))");
    assert_eq!(parse_one("(1 + 2) * 3"), "(* (+ 1 2) 3)");
    assert_eq!(parse_one("1 - 2 - 3"), "(- (- 1 2) 3)");
    assert_eq!(parse_one("1 + 2 < 4"), "(< (+ 1 2) 4)");
    assert_eq!(parse_one("a && b || c"), "(or (and a b) c)");
    assert_eq!(parse_one("a or b and c"), "(and (or a b) c)");
    assert_eq!(parse_one("1 << 2 + 3"), "(<< 1 (+ 2 3))");
}


#[test]
fn unary() {
    assert_eq!(parse_one("-x"), "(-@ x)");
    assert_eq!(parse_one("!x"), "(! x)");
    assert_eq!(parse_one("not x"), "(! x)");
    assert_eq!(parse_one("-2.5.abs"), "(abs -2.5)");
    assert_eq!(parse_one("x - 1"), "(- x 1)");
}


#[test]
fn ranges() {
    assert_eq!(parse_one("1..3"), "(.. 1 3)");
    assert_eq!(parse_one("1...n"), "(... 1 n)");
    assert_eq!(parse_one("(1..3).to_a"), "(to_a (.. 1 3))");
}


#[test]
fn assignment() {
    assert_eq!(parse_one("x = 1"), "(= x 1)");
    assert_eq!(parse_one("x = y = 1"), "(= x (= y 1))");
    assert_eq!(parse_one("x += 1"), "(= x (+ x 1))");
    assert_eq!(parse_one("@a = $b"), "(= @a $b)");
    assert_eq!(parse_one("@@count *= 2"), "(= @@count (* @@count 2))");
    assert_eq!(parse_one("a[0] = 1"), "(= (index a 0) 1)");
    assert_eq!(parse_one("obj.size = 2"), "(= (size obj) 2)");
    assert_eq!(parse_one("A::B = 1"), "(= A::B 1)");
}


#[test]
fn invalid_assignment() {
    let err = parse_error("1 = 2");
    assert_eq!(err.reason(), &Syntax::InvalidAssignment);
    assert_eq!(err.position(), Position::new(2, 0, 2));

    let err = parse_error("foo(1) = 2");
    assert_eq!(err.reason(), &Syntax::InvalidAssignment);
}


#[test]
fn calls() {
    assert_eq!(parse_one("foo"), "foo");
    assert_eq!(parse_one("foo()"), "(call foo)");
    assert_eq!(parse_one("puts 1, 2"), "(call puts 1 2)");
    assert_eq!(parse_one("puts(1, 2)"), "(call puts 1 2)");
    assert_eq!(parse_one("puts [1]"), "(call puts [1])");
    assert_eq!(parse_one("a.b.c"), "(c (b a))");
    assert_eq!(parse_one("a.b(1).c 2"), "(c (b a 1) 2)");
    assert_eq!(parse_one("Point.new(1, 2)"), "(new Point 1 2)");
    assert_eq!(parse_one("foo :a => 1, :b => 2"), "(call foo {:a=>1 :b=>2})");
    assert_eq!(parse_one("x[1, 2]"), "(index x 1 2)");
    assert_eq!(parse_one("Math::PI"), "Math::PI");
}


#[test]
fn blocks() {
    assert_eq!(parse_one("[1].map { |x| x * 2 }"), "(map [1] {|x| (* x 2)})");
    assert_eq!(
        parse_one("h.each do |k, v|\n  puts k\nend"),
        "(each h {|k v| (call puts k)})",
    );
    assert_eq!(parse_one("5.times { puts 1 }"), "(times 5 {|| (call puts 1)})");
    assert_eq!(parse_one("foo(1) { }"), "(call foo 1 {|| })");
    assert_eq!(parse_one("list.map(&:to_s)"), "(map list &:to_s)");
    assert_eq!(parse_one("-> (x, y) { x + y }"), "(-> {|x y| (+ x y)})");
    assert_eq!(parse_one("yield 1, 2"), "(yield 1 2)");
}


#[test]
fn conditionals() {
    assert_eq!(
        parse_one("if a\n  1\nelsif b\n  2\nelse\n  3\nend"),
        "(if a (1) ((if b (2) (3))))",
    );
    assert_eq!(parse_one("if a then 1 end"), "(if a (1) ())");
    assert_eq!(parse_one("unless a\n  1\nelse\n  2\nend"), "(if a (2) (1))");
    assert_eq!(parse_one("x = 1 if y"), "(if y ((= x 1)) ())");
    assert_eq!(parse_one("puts 1 unless y"), "(if y () ((call puts 1)))");
}


#[test]
fn loops() {
    assert_eq!(parse_one("while x < 5\n  x += 1\nend"), "(while (< x 5) (= x (+ x 1)))");
    assert_eq!(parse_one("while x < 5 do x += 1 end"), "(while (< x 5) (= x (+ x 1)))");
    assert_eq!(parse_one("until done\n  step\nend"), "(until done step)");
    assert_eq!(parse_one("for i in 1..3\n  puts i\nend"), "(for i (.. 1 3) (call puts i))");
    assert_eq!(parse_one("x += 1 while x < 3"), "(while (< x 3) (= x (+ x 1)))");
}


#[test]
fn method_definitions() {
    assert_eq!(parse_one("def add(a, b)\n  a + b\nend"), "(def add(a b) (+ a b))");
    assert_eq!(parse_one("def hello\n  puts 1\nend"), "(def hello() (call puts 1))");
    assert_eq!(parse_one("def each(&blk)\nend"), "(def each(&blk) )");
    assert_eq!(parse_one("def self.make\n  42\nend"), "(def self.make() 42)");
    assert_eq!(parse_one("def obj.greet\nend"), "(def obj.greet() )");
    assert_eq!(parse_one("def name=(v)\n  @name = v\nend"), "(def name=(v) (= @name v))");
    assert_eq!(parse_one("def ==(other)\n  true\nend"), "(def ==(other) true)");
    assert_eq!(parse_one("def [](i)\nend"), "(def [](i) )");
    assert_eq!(parse_one("def empty?; true; end"), "(def empty?() true)");
}


#[test]
fn classes() {
    assert_eq!(parse_one("class A\nend"), "(class A)");
    assert_eq!(parse_one("class B < A\n  def f\n  end\nend"), "(class B < A (def f() ))");
    assert_eq!(parse_one("class A::B\nend"), "(class A::B)");
    assert_eq!(parse_one("module M\n  X = 1\nend"), "(module M (= X 1))");
}


#[test]
fn statements() {
    assert_eq!(parse_all("x = 1; y = 2\n\nx"), vec!["(= x 1)", "(= y 2)", "x"]);
    assert_eq!(parse_all("# only a comment\n"), Vec::<String>::new());
    assert_eq!(parse_one("begin\n  1\n  2\nend"), "(begin 1 2)");
    assert_eq!(parse_one("(a; b)"), "(begin a b)");
    assert_eq!(parse_one("()"), "nil");
}


#[test]
fn spans() {
    let program = parse("foo + bar\n  baz", "test").unwrap();
    assert_eq!(program.body.len(), 2);

    let span = program.body[0].span();
    assert_eq!(span.offset(), 0);
    assert_eq!(span.length(), 9);

    let span = program.body[1].span();
    assert_eq!((span.line(), span.column()), (1, 2));
    assert_eq!(&*program.file, "test");
}


#[test]
fn syntax_errors() {
    let err = parse_error("x = (1");
    assert_eq!(err.reason(), &Syntax::Expected("')'"));
    assert_eq!(err.position(), Position::new(6, 0, 6));
    assert_eq!(err.line_text(), Some("x = (1"));
    assert_eq!(err.to_string(), "1:7: expected ')'\nx = (1\n      ^");

    let err = parse_error("1 +");
    assert_eq!(err.reason(), &Syntax::UnexpectedEof);

    let err = parse_error("def foo\n  1\n");
    assert_eq!(err.reason(), &Syntax::Expected("'end'"));

    let err = parse_error("x = 1\ny = )");
    assert_eq!(err.reason(), &Syntax::UnexpectedToken(")".to_owned()));
    assert_eq!(err.position(), Position::new(10, 1, 4));
    assert_eq!(err.line_text(), Some("y = )"));
}


#[test]
fn reader_input() {
    let program = parse_reader(Cursor::new("x = 1\ny = x + 2\n"), "stdin").unwrap();
    assert_eq!(program.body.len(), 2);
    assert_eq!(&*program.file, "stdin");
    assert_eq!(sexp(&program.body[1]), parse_one("y = x + 2"));

    let err = parse_reader(Cursor::new("x = 1\ny = )\nputs x\n"), "stdin").unwrap_err();
    assert_eq!(err.reason(), &Syntax::UnexpectedToken(")".to_owned()));
    assert_eq!(err.position(), Position::new(10, 1, 4));
    assert_eq!(err.line_text(), Some("y = )"));
}
