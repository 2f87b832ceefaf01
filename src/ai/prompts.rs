use crate::catalog::Language;

pub const SYSTEM_PROMPT: &str =
    "You are an expert software testing engineer specializing in unit testing and test automation.";

pub fn structure_prompt(code: &str, language: Language, path: &str) -> String {
    format!(
        r#"Analyze the following {lang} code from `{path}` and describe its structure for unit testing.

```{fence}
{code}
```

Respond with a single JSON object and nothing else:
{{
  "functions": [{{"name": "", "parameters": [], "return_type": "", "complexity": "low|medium|high", "dependencies": []}}],
  "classes": [{{"name": "", "methods": [], "properties": [], "inheritance": [], "dependencies": []}}],
  "dependencies": [],
  "complexity_score": 5,
  "test_scenarios": []
}}

complexity_score is an integer from 1 (trivial) to 10 (very complex). List external modules, services and I/O the code relies on under dependencies."#,
        lang = language.display_name(),
        path = path,
        fence = language.id(),
        code = code,
    )
}

pub fn generation_prompt(
    code: &str,
    language: Language,
    framework: &str,
    path: &str,
    dependencies: &[String],
) -> String {
    let deps = if dependencies.is_empty() {
        "none".to_string()
    } else {
        dependencies.join(", ")
    };

    format!(
        r#"Write comprehensive unit tests using {framework} for the following {lang} code from `{path}`.

```{fence}
{code}
```

Requirements:
- Follow the Arrange-Act-Assert pattern
- Cover positive and negative cases
- Cover edge cases and boundary values
- Mock external dependencies
- Aim for high statement coverage
- Use clear, descriptive test names
- Follow {framework} best practices and conventions
- Import the code under test relative to the repository root

Dependencies to mock: {deps}

Return only the complete test file in a single fenced code block."#,
        framework = framework,
        lang = language.display_name(),
        path = path,
        fence = language.id(),
        code = code,
        deps = deps,
    )
}

pub fn mock_prompt(code: &str, language: Language, dependencies: &[String]) -> String {
    format!(
        r#"Create mock objects for these dependencies of the {lang} code below: {deps}

```{fence}
{code}
```

Use the idiomatic mocking facilities of {lang} test tooling. Return only code in a single fenced code block."#,
        lang = language.display_name(),
        deps = dependencies.join(", "),
        fence = language.id(),
        code = code,
    )
}
