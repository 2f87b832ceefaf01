//! Test case counting for generated test files
//!
//! Python, JavaScript/TypeScript and Go are parsed with tree-sitter; the
//! other languages (and any file tree-sitter cannot parse cleanly) use a
//! line scan for the framework's test markers.

use crate::catalog::Language;
use std::cell::RefCell;
use std::path::Path;
use tree_sitter::{Node, Parser, Tree};

thread_local! {
    static JS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        // Ignore error here - will be caught at parse time if language fails
        let _ = p.set_language(&tree_sitter_javascript::LANGUAGE.into());
        p
    });

    static TS_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into());
        p
    });

    static TSX_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_typescript::LANGUAGE_TSX.into());
        p
    });

    static PYTHON_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_python::LANGUAGE.into());
        p
    });

    static GO_PARSER: RefCell<Parser> = RefCell::new({
        let mut p = Parser::new();
        let _ = p.set_language(&tree_sitter_go::LANGUAGE.into());
        p
    });
}

/// Number of test cases defined in `code`.
pub fn count_test_cases(language: Language, code: &str, path: &Path) -> usize {
    if let Some(tree) = parse(language, code, path) {
        if !tree.root_node().has_error() {
            return count_in_tree(language, &tree.root_node(), code);
        }
    }
    count_by_lines(language, code)
}

fn parse(language: Language, code: &str, path: &Path) -> Option<Tree> {
    match language {
        Language::Python => PYTHON_PARSER.with(|p| p.borrow_mut().parse(code, None)),
        Language::Go => GO_PARSER.with(|p| p.borrow_mut().parse(code, None)),
        Language::JavaScript => {
            let ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())
                .unwrap_or_default();
            match ext.as_str() {
                "ts" => TS_PARSER.with(|p| p.borrow_mut().parse(code, None)),
                "tsx" => TSX_PARSER.with(|p| p.borrow_mut().parse(code, None)),
                _ => JS_PARSER.with(|p| p.borrow_mut().parse(code, None)),
            }
        }
        _ => None,
    }
}

fn node_text<'a>(node: &Node, code: &'a str) -> &'a str {
    node.utf8_text(code.as_bytes()).unwrap_or("")
}

fn is_test_node(language: Language, node: &Node, code: &str) -> bool {
    match (language, node.kind()) {
        (Language::Python, "function_definition") => node
            .child_by_field_name("name")
            .map(|n| node_text(&n, code).starts_with("test"))
            .unwrap_or(false),
        (Language::Go, "function_declaration") => node
            .child_by_field_name("name")
            .map(|n| is_go_test_name(node_text(&n, code)))
            .unwrap_or(false),
        (Language::JavaScript, "call_expression") => node
            .child_by_field_name("function")
            .map(|callee| is_js_test_callee(&callee, code))
            .unwrap_or(false),
        _ => false,
    }
}

fn is_go_test_name(name: &str) -> bool {
    match name.strip_prefix("Test") {
        Some(rest) => !rest.starts_with(|c: char| c.is_lowercase()),
        None => false,
    }
}

fn is_js_test_callee(callee: &Node, code: &str) -> bool {
    match callee.kind() {
        "identifier" => matches!(node_text(callee, code), "test" | "it"),
        "member_expression" => {
            let object = callee
                .child_by_field_name("object")
                .map(|n| node_text(&n, code))
                .unwrap_or("");
            let property = callee
                .child_by_field_name("property")
                .map(|n| node_text(&n, code))
                .unwrap_or("");
            matches!(object, "test" | "it") && matches!(property, "only" | "concurrent")
        }
        _ => false,
    }
}

fn count_in_tree(language: Language, root: &Node, code: &str) -> usize {
    let mut count = 0;
    let mut cursor = root.walk();

    loop {
        let node = cursor.node();
        if is_test_node(language, &node, code) {
            count += 1;
        }

        if cursor.goto_first_child() {
            continue;
        }

        while !cursor.goto_next_sibling() {
            if !cursor.goto_parent() {
                return count;
            }
        }
    }
}

fn count_by_lines(language: Language, code: &str) -> usize {
    code.lines()
        .map(str::trim_start)
        .filter(|line| line_marks_test(language, line))
        .count()
}

fn line_marks_test(language: Language, line: &str) -> bool {
    match language {
        Language::Python => line.starts_with("def test") || line.starts_with("async def test"),
        Language::JavaScript => ["test(", "it(", "test.only(", "it.only(", "test.concurrent("]
            .iter()
            .any(|p| line.starts_with(p)),
        Language::Java => ["@Test", "@ParameterizedTest", "@RepeatedTest"]
            .iter()
            .any(|p| {
                line.strip_prefix(p)
                    .map(|rest| rest.is_empty() || rest.starts_with(['(', ' ']))
                    .unwrap_or(false)
            }),
        Language::CSharp => ["[Fact", "[Theory", "[Test]", "[Test(", "[TestMethod", "[TestCase"]
            .iter()
            .any(|p| line.starts_with(p)),
        Language::Go => line
            .strip_prefix("func ")
            .map(is_go_test_name)
            .unwrap_or(false),
        Language::Ruby => ["it ", "it(", "it{", "specify ", "example "]
            .iter()
            .any(|p| line.starts_with(p)),
        Language::Php => {
            line.starts_with("public function test")
                || line.starts_with("function test")
                || line.starts_with("* @test")
                || line.starts_with("#[Test]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_python_counts_test_functions() {
        let code = "import pytest\n\n\
                    def helper():\n    return 1\n\n\
                    def test_add():\n    assert 1 + 1 == 2\n\n\
                    class TestCalc:\n    def test_sub(self):\n        assert 1 - 1 == 0\n";
        assert_eq!(count_test_cases(Language::Python, code, Path::new("tests/test_calc.py")), 2);
    }

    #[test]
    fn test_javascript_counts_calls_not_describe() {
        let code = "describe('calc', () => {\n  it('adds', () => { expect(1).toBe(1); });\n  test('subs', () => {});\n});\n";
        assert_eq!(count_test_cases(Language::JavaScript, code, Path::new("calc.test.js")), 2);
    }

    #[test]
    fn test_typescript_uses_ts_grammar() {
        let code = "import { add } from './calc';\n\ntest('adds', (): void => {\n  const x: number = add(1, 2);\n  expect(x).toBe(3);\n});\n";
        assert_eq!(count_test_cases(Language::JavaScript, code, Path::new("calc.test.ts")), 1);
    }

    #[test]
    fn test_go_counts_test_functions() {
        let code = "package calc\n\nimport \"testing\"\n\nfunc TestAdd(t *testing.T) {}\n\nfunc Testable() {}\n\nfunc helper() {}\n";
        assert_eq!(count_test_cases(Language::Go, code, Path::new("calc_test.go")), 1);
    }

    #[test]
    fn test_broken_python_falls_back_to_lines() {
        let code = "def test_one(:\n    pass\ndef test_two():\n    pass\n";
        assert_eq!(count_test_cases(Language::Python, code, Path::new("t.py")), 2);
    }

    #[test]
    fn test_java_annotations() {
        let code = "class CalcTest {\n  @Test\n  void adds() {}\n  @Test(timeout = 5)\n  void subs() {}\n  @TestFactory\n  Stream<DynamicTest> dyn() {}\n}\n";
        assert_eq!(count_test_cases(Language::Java, code, Path::new("CalcTest.java")), 2);
    }

    #[test]
    fn test_csharp_xunit_attributes() {
        let code = "public class CalcTests {\n  [Fact]\n  public void Adds() {}\n  [Theory]\n  [InlineData(1)]\n  public void Subs(int x) {}\n}\n";
        assert_eq!(count_test_cases(Language::CSharp, code, Path::new("CalcTests.cs")), 2);
    }

    #[test]
    fn test_ruby_and_php() {
        let ruby = "describe Calc do\n  it \"adds\" do\n  end\n  it 'subs' do\n  end\nend\n";
        assert_eq!(count_test_cases(Language::Ruby, ruby, Path::new("calc_spec.rb")), 2);

        let php = "class CalcTest extends TestCase {\n    public function testAdd(): void {}\n    /**\n     * @test\n     */\n    public function subtracts(): void {}\n}\n";
        assert_eq!(count_test_cases(Language::Php, php, Path::new("CalcTest.php")), 2);
    }
}
