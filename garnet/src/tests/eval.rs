use std::io::Cursor;
use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::error::{Argument, Error, ErrorKind, Reason, TypeMismatch};
use crate::eval::{CallableResolver, Vm};
use crate::object::Value;
use crate::types::{Key, Type};
use crate::{Config, SharedBuffer};


fn new_vm() -> (Vm, SharedBuffer) {
    let output = SharedBuffer::new();
    let vm = Vm::new(Config::new().with_output(output.clone()).with_seed(1));
    (vm, output)
}

fn eval(code: &str) -> Result<Value, Error> {
    let (mut vm, _) = new_vm();
    vm.eval_str(code)
}

/// Run a program and return what it printed.
fn output(code: &str) -> String {
    let (mut vm, output) = new_vm();
    vm.eval_str(code).unwrap();
    output.contents()
}

fn eval_err(code: &str) -> Error {
    eval(code).unwrap_err()
}

fn ints(values: &[i64]) -> Value {
    Value::array(values.iter().copied().map(Value::Int).collect())
}

fn strs(values: &[&str]) -> Value {
    Value::array(values.iter().copied().map(Value::str).collect())
}


macro_rules! assert_seq {
    ($x:expr , $y:expr $(,)?) => {
        assert_eq!($x, Ok(Value::from($y)))
    };
}


#[test]
fn literals() {
    assert_seq!(eval("nil"), Value::Nil);
    assert_seq!(eval("true"), true);
    assert_seq!(eval("1"), 1);
    assert_seq!(eval("-1"), -1);
    assert_seq!(eval("1.5"), 1.5);
    assert_seq!(eval("\"abc\""), "abc");
    assert_seq!(eval(":abc"), Value::symbol("abc"));
    assert_seq!(eval("[1, [2]]"), vec![Value::Int(1), ints(&[2])]);
    assert_seq!(eval(""), Value::Nil);
}


#[test]
fn arithmetic() {
    assert_seq!(eval("1 + 2"), 3);
    assert_seq!(eval("1.0 + 2"), 3.0);
    assert_seq!(eval("1 + 2.0"), 3.0);
    assert_seq!(eval("10 - 2 * 3"), 4);
    assert_seq!(eval("7 / 2"), 3);
    assert_seq!(eval("-7 / 2"), -4);
    assert_seq!(eval("7 % -3"), -2);
    assert_seq!(eval("2 ** 10"), 1024);
    assert_seq!(eval("2 ** -1"), 0.5);
    assert_seq!(eval("-(3)"), -3);
    assert_seq!(eval("7.0 / 2"), 3.5);
}


#[test]
fn comparisons() {
    assert_seq!(eval("1 < 2"), true);
    assert_seq!(eval("2.5 >= 2"), true);
    assert_seq!(eval("1 == 1.0"), true);
    assert_seq!(eval("1 != 2"), true);
    assert_seq!(eval("1 <=> 2"), -1);
    assert_seq!(eval("1 < \"a\""), Value::Nil);
    assert_seq!(eval("\"a\" < \"b\""), true);
    assert_seq!(eval("[1, 2] == [1, 2]"), true);
}


#[test]
fn arithmetic_errors() {
    let err = eval_err("1 / 0");
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
    assert_eq!(err.reason(), &Reason::ZeroDivision);

    let err = eval_err("9223372036854775807 + 1");
    assert_eq!(err.kind(), ErrorKind::RangeError);
    assert_eq!(err.reason(), &Reason::Overflow);

    let err = eval_err("1 + \"a\"");
    assert_eq!(err.kind(), ErrorKind::TypeError);
    assert_eq!(
        err.reason(),
        &Reason::Type(TypeMismatch::Coerce {
            from: Type::String,
            to: Type::Integer
        }),
    );
    assert_eq!(err.reason().to_string(), "String can't be coerced into Integer");
}


#[test]
fn while_loop() {
    assert_eq!(output("x = 1\nwhile x < 5\n x = x + 1\nend\nputs x"), "5\n");
    assert_eq!(output("x = 10\nuntil x <= 7\n  x -= 1\nend\nputs x"), "7\n");
    assert_eq!(output("i = 0\ni += 1 while i < 3\nputs i"), "3\n");
}


#[test]
fn conditionals() {
    assert_seq!(eval("if 1 > 2\n  :a\nelsif 2 > 1\n  :b\nelse\n  :c\nend"), Value::symbol("b"));
    assert_seq!(eval("if nil then 1 end"), Value::Nil);
    assert_seq!(eval("unless false\n  1\nelse\n  2\nend"), 1);
    assert_seq!(eval("x = nil\nx || 5"), 5);
    assert_seq!(eval("0 && \"zero is truthy\""), "zero is truthy");
    assert_seq!(eval("!nil"), true);
}


#[test]
fn for_loop() {
    assert_seq!(eval("sum = 0\nfor i in 1..4\n  sum += i\nend\nsum"), 10);
}


#[test]
fn ranges() {
    assert_seq!(eval("(1..3).to_a"), ints(&[1, 2, 3]));
    assert_seq!(eval("(1...3).to_a"), ints(&[1, 2]));
    assert_seq!(eval("(1..0).to_a"), ints(&[]));
    assert_seq!(eval("(1..4).sum"), 10);
    assert_seq!(eval("(1..10).include?(10)"), true);
    assert_seq!(eval("(1...10).include?(10)"), false);

    let err = eval_err("1..\"a\"");
    assert_eq!(err.kind(), ErrorKind::TypeError);
}


#[test]
fn classes() {
    assert_eq!(output("class A\n def greet\n \"hi\"\n end\nend\nputs A.new.greet"), "hi\n");

    assert_seq!(
        eval(
            "class A
               def one
                 1
               end
             end
             class A
               def two
                 2
               end
             end
             a = A.new
             a.one + a.two"
        ),
        3,
    );
}


#[test]
fn inheritance() {
    let code = "
        class Animal
          def speak
            \"...\"
          end

          def intro
            \"I say \" + speak
          end
        end

        class Dog < Animal
          def speak
            \"woof\"
          end
        end
    ";

    let (mut vm, _) = new_vm();
    vm.eval_str(code).unwrap();
    assert_seq!(vm.eval_str("Dog.new.intro"), "I say woof");
    assert_seq!(vm.eval_str("Animal.new.intro"), "I say ...");
    assert_seq!(vm.eval_str("Dog.new.is_a?(Animal)"), true);
    assert_seq!(vm.eval_str("Dog.superclass == Animal"), true);
    assert_seq!(vm.eval_str("Dog.new.class.name"), "Dog");

    let err = vm.eval_str("class Dog < String\nend").unwrap_err();
    assert_eq!(err.reason(), &Reason::Type(TypeMismatch::SuperclassMismatch(Key::new("Dog"))));
}


#[test]
fn initialize_and_attributes() {
    let code = "
        class Point
          attr_accessor :x
          attr_reader :y

          def initialize(x, y)
            @x = x
            @y = y
          end
        end

        pt = Point.new(3, 4)
        pt.x = pt.x + 1
    ";

    let (mut vm, _) = new_vm();
    vm.eval_str(code).unwrap();
    assert_seq!(vm.eval_str("pt.x"), 4);
    assert_seq!(vm.eval_str("pt.y"), 4);
    assert_seq!(vm.eval_str("pt.inspect"), "#<Point @x=4, @y=4>");
    assert_seq!(vm.eval_str("pt.respond_to?(:y=)"), false);
    assert_seq!(vm.eval_str("Point.new(0, 1).instance_variables"), vec![Value::symbol("@x"), Value::symbol("@y")]);
}


#[test]
fn class_variables() {
    let code = "
        class Counter
          @@count = 0

          def self.bump
            @@count += 1
          end
        end

        Counter.bump
        Counter.bump
    ";
    assert_seq!(eval(code), 2);

    let err = eval_err("class A\n  def self.f\n    @@nope\n  end\nend\nA.f");
    assert_eq!(err.reason(), &Reason::UninitializedClassVariable(Key::new("@@nope")));
}


#[test]
fn modules_and_constants() {
    let code = "
        module Geo
          ORIGIN = 0

          class Point
            def origin
              ORIGIN
            end
          end
        end
    ";

    let (mut vm, _) = new_vm();
    vm.eval_str(code).unwrap();
    assert_seq!(vm.eval_str("Geo::Point.new.origin"), 0);
    assert_seq!(vm.eval_str("Geo::Point.name"), "Geo::Point");
    assert_seq!(vm.eval_str("Geo::ORIGIN"), 0);

    let err = vm.eval_str("Nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NameError);
    assert_eq!(err.reason(), &Reason::UninitializedConstant(Key::new("Nope")));
}


#[test]
fn singleton_methods() {
    let code = "
        s = Object.new
        def s.hello
          \"hello\"
        end

        class Factory
          def self.make
            42
          end
        end
    ";

    let (mut vm, _) = new_vm();
    vm.eval_str(code).unwrap();
    assert_seq!(vm.eval_str("s.hello"), "hello");
    assert_seq!(vm.eval_str("Factory.make"), 42);

    let err = vm.eval_str("Object.new.hello").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NoMethodError);

    let err = vm.eval_str("def 5.five\nend").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
}


#[test]
fn method_missing() {
    let code = "
        class Ghost
          def method_missing(name, arg)
            name.to_s + arg
          end
        end
    ";

    let (mut vm, _) = new_vm();
    vm.eval_str(code).unwrap();
    assert_seq!(vm.eval_str("Ghost.new.boo(\"!\")"), "boo!");
    assert_seq!(vm.eval_str("Ghost.new.send(:hey, \"?\")"), "hey?");
}


#[test]
fn no_method_errors() {
    let err = eval_err("\"x\".no_such_method");
    assert_eq!(err.kind(), ErrorKind::NoMethodError);
    assert_eq!(
        err.reason(),
        &Reason::NoMethod {
            name: Key::new("no_such_method"),
            class: Key::new("String"),
        },
    );
    assert_eq!(err.reason().to_string(), "undefined method 'no_such_method' for an instance of String");

    let err = eval_err("bogus(1)");
    assert_eq!(
        err.reason(),
        &Reason::NoMethod {
            name: Key::new("bogus"),
            class: Key::new("Object"),
        },
    );

    let err = eval_err("undefined_thing");
    assert_eq!(err.kind(), ErrorKind::NameError);
    assert_eq!(err.reason(), &Reason::Name(Key::new("undefined_thing")));
}


#[test]
fn methods() {
    let code = "
        def fib(n)
          if n < 2
            n
          else
            fib(n - 1) + fib(n - 2)
          end
        end
        fib(15)
    ";
    assert_seq!(eval(code), 610);

    assert_seq!(eval("def two\n  2\nend\ntwo + two"), 4);
    assert_eq!(eval_err("def f(a, b)\n  b\nend\nf(1)").reason(), &Reason::Name(Key::new("b")));
    assert_seq!(eval("def f\nend"), Value::symbol("f"));
}


#[test]
fn blocks_and_closures() {
    assert_seq!(eval("[1, 2, 3].map { |x| x * 2 }"), ints(&[2, 4, 6]));
    assert_seq!(eval("count = 0\n[1, 2, 3].each { |x| count = count + x }\ncount"), 6);
    assert_seq!(eval("out = []\n3.times { |i| out << i }\nout"), ints(&[0, 1, 2]));
    assert_seq!(eval("[1, 2, 3].select { |x| x.odd? }"), ints(&[1, 3]));
    assert_seq!(eval("[1, 2, 3].reduce(0) { |acc, x| acc + x }"), 6);
    assert_seq!(eval("[[1, 2], [3, 4]].map { |a, b| a * b }"), ints(&[2, 12]));
    assert_seq!(eval("[1, 2].map(&:to_s)"), strs(&["1", "2"]));

    let err = eval_err("[1].each { |x| y = x }\ny");
    assert_eq!(err.reason(), &Reason::Name(Key::new("y")));

    let code = "
        x = 10
        add = lambda { |y| x + y }
        x = 20
        add.call(1)
    ";
    assert_seq!(eval(code), 21);
    assert_seq!(eval("sq = -> (v) { v * v }\nsq.call(5)"), 25);
}


#[test]
fn yield_and_block_params() {
    let code = "
        def twice
          yield 1
          yield 2
        end
        out = []
        twice { |x| out << x }
        out
    ";
    assert_seq!(eval(code), ints(&[1, 2]));

    let code = "
        def apply(x, &blk)
          blk.call(x)
        end
        apply(3) { |v| v * v }
    ";
    assert_seq!(eval(code), 9);

    let err = eval_err("def f\n  yield\nend\nf");
    assert_eq!(err.kind(), ErrorKind::ArgumentError);
}


#[test]
fn reference_semantics() {
    assert_seq!(eval("a = [1, 2]\nb = a\nb << 3\na"), ints(&[1, 2, 3]));
    assert_seq!(eval("a = [1]\nb = a\na.equal?(b)"), true);
    assert_seq!(eval("s = \"a\"\nt = s\nt << \"b\"\ns"), "ab");
    assert_seq!(eval("h = {}\ng = h\ng[:k] = 1\nh[:k]"), 1);
}


#[test]
fn arrays() {
    assert_seq!(eval("a = [1]\na[3] = 4\na"), vec![Value::Int(1), Value::Nil, Value::Nil, Value::Int(4)]);
    assert_seq!(eval("[1][5]"), Value::Nil);
    assert_seq!(eval("[1, 2, 3][-1]"), 3);
    assert_seq!(eval("[3, 1, 2].sort"), ints(&[1, 2, 3]));
    assert_seq!(eval("[1, 2, 3].size"), 3);
    assert_seq!(eval("[1, 2] + [3]"), ints(&[1, 2, 3]));
    assert_seq!(eval("[1, [2, nil]].join(\"-\")"), "1-2-");

    let err = eval_err("a = [1]\na[-3] = 0");
    assert_eq!(err.kind(), ErrorKind::IndexError);
}


#[test]
fn hashes() {
    assert_seq!(eval("h = {:a => 1, \"b\" => 2}\nh[:a] + h[\"b\"]"), 3);
    assert_seq!(eval("h = {}\nh[:x] = 5\nh.keys"), vec![Value::symbol("x")]);
    assert_seq!(eval("{1 => :a}[1.0]"), Value::Nil);
    assert_seq!(eval("{[1, 2] => :pair}[[1, 2]]"), Value::symbol("pair"));
    assert_seq!(eval("{:a => 1}.key?(:a)"), true);
}


#[test]
fn strings() {
    assert_seq!(eval("\"ab\" + \"cd\""), "abcd");
    assert_seq!(eval("\"ab\" * 3"), "ababab");
    assert_seq!(eval("\"Hello\".upcase"), "HELLO");
    assert_seq!(eval("\"a,b\".split(\",\")"), strs(&["a", "b"]));
    assert_seq!(eval(":abc.to_s"), "abc");
    assert_seq!(eval("\"abc\".to_sym"), Value::symbol("abc"));
    assert_seq!(eval("\"abc\".length"), 3);
}


#[test]
fn printing() {
    assert_eq!(output("puts 1, \"a\""), "1\na\n");
    assert_eq!(output("puts [1, [2, 3]]"), "1\n2\n3\n");
    assert_eq!(output("puts nil"), "\n");
    assert_eq!(output("puts"), "\n");
    assert_eq!(output("puts 1.0"), "1.0\n");
    assert_eq!(output("print \"a\", 1"), "a1");
    assert_eq!(output("p \"s\""), "\"s\"\n");
    assert_eq!(output("p [1, \"a\", :b, nil]"), "[1, \"a\", :b, nil]\n");
    assert_eq!(output("h = {:a => 1, 2 => \"x\"}\np h"), "{:a=>1, 2=>\"x\"}\n");
    assert_eq!(output("puts (1..3)"), "1..3\n");
    assert_eq!(output("puts true"), "true\n");
}


#[test]
fn reflection() {
    assert_seq!(eval("1.respond_to?(:+)"), true);
    assert_seq!(eval("[1, 2].send(:size)"), 2);
    assert_seq!(eval("1.class == Integer"), true);
    assert_seq!(eval("nil.nil?"), true);
    assert_seq!(eval("Integer.ancestors.map { |c| c.name }"), strs(&["Integer", "Numeric", "Object"]));
    assert_seq!(eval("class A\n  def f\n  end\nend\nA.instance_methods"), vec![Value::symbol("f")]);
}


#[test]
fn unsupported_control_flow() {
    let err = eval_err("def f\n  return 1\nend\nf");
    assert_eq!(err.kind(), ErrorKind::NotImplementedError);
    assert_eq!(err.reason(), &Reason::NotImplemented("return"));

    let err = eval_err("while true\n  break\nend");
    assert_eq!(err.reason(), &Reason::NotImplemented("break"));
}


#[test]
fn random_numbers() {
    let (mut first, _) = new_vm();
    let (mut second, _) = new_vm();
    let x = first.eval_str("[rand(100), rand(100), rand(100)]").unwrap();
    let y = second.eval_str("[rand(100), rand(100), rand(100)]").unwrap();
    assert_eq!(x, y);

    let value = first.eval_str("rand(1..6)").unwrap().get_int().unwrap();
    assert!((1..=6).contains(&value));

    let value = first.eval_str("rand").unwrap().get_float().unwrap();
    assert!((0.0..1.0).contains(&value));
}


#[test]
fn require() {
    let resolver = CallableResolver::new(|path| match path {
        "lib" => Some("def helper\n  7\nend".to_owned()),
        "bad" => Some("x = 1\n1 / 0".to_owned()),
        _ => None,
    });
    let mut vm = Vm::new(Config::new().with_output(SharedBuffer::new()).with_resolver(resolver));

    assert_seq!(vm.eval_str("require \"lib\""), true);
    assert_seq!(vm.eval_str("require \"lib\""), false);
    assert_seq!(vm.eval_str("helper"), 7);
    assert_eq!(vm.require("lib"), Ok(false));

    let err = vm.eval_str("require \"missing\"").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LoadError);
    assert_eq!(err.reason(), &Reason::Load("missing".to_owned()));

    let err = vm.eval_str("require \"bad\"").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ZeroDivisionError);
    assert_eq!(err.file(), Some("bad"));
}


#[test]
fn error_rendering() {
    let err = eval_err("x = 1\nputs y");
    assert_eq!(
        err.to_string(),
        "main:2:6: NameError: undefined local variable or method 'y'\nputs y\n     ^\nwhile looking up at 2:6",
    );

    let err = eval_err("def f\n  1 / 0\nend\nf");
    assert_eq!(
        err.to_string(),
        "main:2:3: ZeroDivisionError: divided by 0\n  1 / 0\n  ^^^^^\nwhile calling at 2:3\nf\n^\nwhile calling at 4:1",
    );

    let err = eval_err("x = (1");
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.to_string(), "main:1:7: SyntaxError: expected ')'\nx = (1\n      ^\nwhile parsing at 1:7");

    let output = SharedBuffer::new();
    let mut vm = Vm::new(Config::new().with_output(output).with_source_name("script.rb"));
    let err = vm.eval_str("nope").unwrap_err();
    assert_eq!(err.file(), Some("script.rb"));
    assert!(err.to_string().starts_with("script.rb:1:1: NameError"));
}


#[test]
fn reader_source() {
    let (mut vm, output) = new_vm();
    assert_seq!(vm.eval_reader(Cursor::new("x = 2\nputs x * 3\nx\n"), "stdin"), 2);
    assert_eq!(output.contents(), "6\n");

    let err = vm.eval_reader(Cursor::new("x = 1\nputs y\n"), "stdin").unwrap_err();
    assert_eq!(
        err.to_string(),
        "stdin:2:6: NameError: undefined local variable or method 'y'\nputs y\n     ^\nwhile looking up at 2:6",
    );

    let err = vm.eval_reader(Cursor::new("x = 1\ny = )\nputs x\n"), "stdin").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SyntaxError);
    assert_eq!(err.to_string(), "stdin:2:5: SyntaxError: unexpected ')'\ny = )\n    ^\nwhile parsing at 2:5");
}


#[test]
fn huge_sizes() {
    let err = eval_err("a = []\na[4611686018427387904] = 1");
    assert_eq!(err.reason(), &Reason::Argument(Argument::Invalid("size too big")));

    let err = eval_err("\"a\" * 1000000000000000");
    assert_eq!(err.reason(), &Reason::Argument(Argument::Invalid("size too big")));

    let err = eval_err("Array.new(1000000000000000)");
    assert_eq!(err.reason(), &Reason::Argument(Argument::Invalid("size too big")));

    let err = eval_err("\"abcd\" * 4611686018427387904");
    assert_eq!(err.kind(), ErrorKind::RangeError);

    assert_seq!(eval("(\"\" * 1000000000000000).size"), 0);
    assert_seq!(eval("a = []\na[3] = 1\na.size"), 4);
}


#[test]
fn cyclic_collections() {
    assert_eq!(output("a = []\na << a\nh = {}\nh[a] = 1\np a"), "[[...]]\n");
    assert_seq!(eval("a = []\na << a\nh = {}\nh[a] = 1\nh[a]"), 1);
    assert_seq!(eval("a = []\na << a\nb = []\nb << b\na == b"), true);
    assert_seq!(eval("a = [1]\na << a\nb = [2]\nb << b\na == b"), false);
    assert_seq!(eval("h = {}\nh[:self] = h\ng = {}\ng[:self] = g\nh == g"), true);
    assert_eq!(output("h = {}\nh[:self] = h\np h"), "{:self=>{...}}\n");
}


#[test]
fn value_class_subclasses() {
    assert_seq!(eval("class Stack < Array\nend\ns = Stack.new\ns << 1\ns.size"), 1);
    assert_seq!(eval("class Stack < Array\nend\nStack.new.class.name"), "Stack");
    assert_seq!(eval("class Stack < Array\nend\nStack.new.is_a?(Array)"), true);
    assert_seq!(
        eval("class Stack < Array\n  def top\n    last\n  end\nend\ns = Stack.new\ns << 1 << 2\ns.top"),
        2,
    );
    assert_seq!(eval("class Name < String\nend\nn = Name.new(\"ab\")\nn << \"c\"\nn.length"), 3);
    assert_seq!(eval("class Table < Hash\nend\nt = Table.new\nt[:a] = 1\nt.keys"), vec![Value::symbol("a")]);
}


#[test]
fn hash_literal_keys() {
    assert_seq!(eval("k = \"a\"\nh = {k => 1}\nk << \"b\"\nh.keys"), vec![Value::str("a")]);
    assert_seq!(eval("k = \"a\"\nh = {k => 1}\nk << \"b\"\nh[\"a\"]"), 1);
    assert_seq!(eval("k = \"a\"\nh = {}\nh[k] = 1\nk << \"b\"\nh[\"ab\"]"), Value::Nil);
}


// Host interop
// ------------------------------------------------------------------------------------------------

#[test]
fn host_classes() {
    let (mut vm, _) = new_vm();

    let counter = vm.define_class("Counter", None, None);
    vm.set_instance_method(&counter, "bump", |vm, this, args, _block| {
        let step = args.first().and_then(Value::get_int).unwrap_or(1);
        let total = vm.get_ivar(this, Key::new("@n")).get_int().unwrap_or(0) + step;
        vm.set_ivar(this, Key::new("@n"), Value::Int(total))?;
        Ok(Value::Int(total))
    });
    vm.set_class_method(&counter, "make", |vm, this, _args, _block| vm.call(this, "new", &[]));

    assert_seq!(vm.eval_str("c = Counter.new\nc.bump(2)\nc.bump"), 3);
    assert_seq!(vm.eval_str("Counter.make.class == Counter"), true);

    // Reopening a host class from a program
    assert_seq!(vm.eval_str("class Counter\n  def twice\n    bump\n    bump\n  end\nend\nCounter.new.twice"), 2);

    let again = vm.define_class("Counter", None, None);
    assert!(gc::Gc::ptr_eq(&again, &counter));
}


#[test]
fn host_data_and_errors() {
    let (mut vm, _) = new_vm();

    let handle = vm.define_class("Handle", None, None);
    let value = Value::data(handle.clone(), Rc::new(42i64));
    assert_eq!(value.get_data::<i64>().map(|x| *x), Some(42));
    assert_eq!(value.get_data::<String>(), None);

    vm.set_global("$handle", value);
    vm.set_instance_method(&handle, "fail", |_vm, _this, _args, _block| Err(Error::external("boom")));

    assert_seq!(vm.eval_str("$handle.class.name"), "Handle");

    let err = vm.eval_str("$handle.fail").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::RuntimeError);
    assert_eq!(err.reason(), &Reason::External("boom".to_owned()));

    vm.set_global("$answer", Value::Int(41));
    assert_seq!(vm.eval_str("$answer + 1"), 42);
    assert_eq!(vm.global("$answer"), Some(Value::Int(41)));

    assert_eq!(vm.call(&Value::Int(2), "+", &[Value::Int(3)]), Ok(Value::Int(5)));
    assert!(vm.constant("String").is_some());
    assert_eq!(vm.constant("Nope"), None);
}
