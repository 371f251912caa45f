//! 필터 표현식 파서
//!
//! 재귀 하강 파서입니다. 우선순위(낮은 것부터): `||`, `&&`, `!`, 비교, 괄호.
//!
//! ```text
//! expr        := orTerm
//! orTerm      := andTerm ( "||" andTerm )*
//! andTerm     := unary ( "&&" unary )*
//! unary       := "!" "(" expr ")" | primary
//! primary     := "(" expr ")" | structural | comparison
//! structural  := ( "hasproperty" | "hasnoproperty" ) "(" propertyName ")"
//! comparison  := propertyName operator value
//! operator    := "&==" | "==" | "!=" | ">=" | "<=" | "~=" | ">" | "<"
//! value       := quotedString | bareToken
//! ```
//!
//! 베어 토큰 `null`을 `==`와 함께 쓰면 널 검사(`IsNull`)가 됩니다.
//! 따옴표로 감싼 `"null"`은 일반 문자열 비교입니다.

use crate::error::EventPipelineError;

use super::comparison::{ComparisonEvaluator, ComparisonKind};
use super::evaluator::FilterNode;

/// 연산자 토큰 (긴 것부터 시도)
const OPERATORS: &[&str] = &["&==", "==", "!=", ">=", "<=", "~=", ">", "<"];

/// 괄호 중첩 상한
const MAX_NESTING_DEPTH: usize = 128;

/// 한 표현식 안의 비교식 수 상한 (AST 깊이를 제한합니다)
const MAX_COMPARISONS: usize = 256;

/// 필터 표현식 파서
pub struct FilterParser;

impl FilterParser {
    /// 표현식 문자열을 AST로 파싱합니다.
    pub fn parse(expression: &str) -> Result<FilterNode, EventPipelineError> {
        let mut cursor = Cursor {
            input: expression,
            pos: 0,
            depth: 0,
            comparisons: 0,
        };

        cursor.skip_whitespace();
        if cursor.at_end() {
            return Err(cursor.error("empty expression"));
        }

        let node = cursor.parse_or()?;

        cursor.skip_whitespace();
        match cursor.peek() {
            None => Ok(node),
            Some(')') => Err(cursor.error("unmatched ')'")),
            Some(_) => Err(cursor.error("unexpected input after expression")),
        }
    }
}

struct Cursor<'a> {
    input: &'a str,
    pos: usize,
    depth: usize,
    comparisons: usize,
}

impl<'a> Cursor<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn at_end(&self) -> bool {
        self.pos >= self.input.len()
    }

    fn advance(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_whitespace(&mut self) {
        while let Some(c) = self.peek() {
            if !c.is_whitespace() {
                break;
            }
            self.advance(c);
        }
    }

    fn eat(&mut self, token: &str) -> bool {
        if self.rest().starts_with(token) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn error(&self, reason: &str) -> EventPipelineError {
        self.error_at(self.pos, reason)
    }

    fn error_at(&self, position: usize, reason: &str) -> EventPipelineError {
        EventPipelineError::FilterParse {
            expression: self.input.to_owned(),
            position,
            reason: reason.to_owned(),
        }
    }

    fn parse_or(&mut self) -> Result<FilterNode, EventPipelineError> {
        let mut left = self.parse_and()?;
        loop {
            self.skip_whitespace();
            if !self.eat("||") {
                return Ok(left);
            }
            let right = self.parse_and()?;
            left = FilterNode::Or(Box::new(left), Box::new(right));
        }
    }

    fn parse_and(&mut self) -> Result<FilterNode, EventPipelineError> {
        let mut left = self.parse_unary()?;
        loop {
            self.skip_whitespace();
            if !self.eat("&&") {
                return Ok(left);
            }
            let right = self.parse_unary()?;
            left = FilterNode::And(Box::new(left), Box::new(right));
        }
    }

    fn parse_unary(&mut self) -> Result<FilterNode, EventPipelineError> {
        self.skip_whitespace();
        if self.peek() == Some('!') {
            self.advance('!');
            self.skip_whitespace();
            if self.peek() != Some('(') {
                return Err(self.error("negation must be followed by a parenthesized expression"));
            }
            let inner = self.parse_group()?;
            return Ok(FilterNode::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<FilterNode, EventPipelineError> {
        self.skip_whitespace();
        match self.peek() {
            Some('(') => self.parse_group(),
            Some('"') => Err(self.error("expected a property name, found a quoted literal")),
            Some(')') => Err(self.error("unmatched ')'")),
            None => Err(self.error("expected an expression")),
            Some(_) => {
                self.comparisons += 1;
                if self.comparisons > MAX_COMPARISONS {
                    return Err(self.error("expression has too many comparisons"));
                }
                self.parse_comparison()
            }
        }
    }

    /// `(` expr `)`
    fn parse_group(&mut self) -> Result<FilterNode, EventPipelineError> {
        let open = self.pos;
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        self.depth += 1;
        self.advance('(');
        self.skip_whitespace();
        if self.peek() == Some(')') {
            return Err(self.error("empty parenthesized group"));
        }
        let inner = self.parse_or()?;
        self.skip_whitespace();
        if !self.eat(")") {
            return Err(self.error_at(open, "unmatched '('"));
        }
        self.depth -= 1;
        Ok(inner)
    }

    fn parse_comparison(&mut self) -> Result<FilterNode, EventPipelineError> {
        let start = self.pos;
        let property = self.read_property_name();
        if property.is_empty() {
            return Err(self.error("expected a property name"));
        }

        self.skip_whitespace();
        if self.peek() == Some('(') {
            let kind = if property.eq_ignore_ascii_case("hasproperty") {
                ComparisonKind::HasProperty
            } else if property.eq_ignore_ascii_case("hasnoproperty") {
                ComparisonKind::HasNoProperty
            } else {
                return Err(self.error_at(start, "unknown function"));
            };
            return self.parse_structural(kind);
        }

        let op_pos = self.pos;
        let Some(op) = OPERATORS.iter().copied().find(|op| self.eat(op)) else {
            return Err(self.error("expected a comparison operator"));
        };
        let mut kind = ComparisonKind::from_operator(op)
            .ok_or_else(|| self.error_at(op_pos, "unknown operator"))?;

        self.skip_whitespace();
        let value_pos = self.pos;
        let (literal, quoted) = if self.peek() == Some('"') {
            (self.read_quoted()?, true)
        } else {
            (self.read_bare_value().to_owned(), false)
        };
        if literal.is_empty() && !quoted {
            return Err(self.error_at(value_pos, "expected a value"));
        }

        if !quoted && kind == ComparisonKind::Equality && literal.eq_ignore_ascii_case("null") {
            kind = ComparisonKind::IsNull;
        }

        ComparisonEvaluator::new(kind, property, literal)
            .map(FilterNode::Comparison)
            .map_err(|e| self.error_at(value_pos, &e.0))
    }

    /// `hasproperty(Name)` / `hasnoproperty(Name)`
    fn parse_structural(&mut self, kind: ComparisonKind) -> Result<FilterNode, EventPipelineError> {
        let open = self.pos;
        self.advance('(');
        self.skip_whitespace();
        let property = if self.peek() == Some('"') {
            self.read_quoted()?
        } else {
            self.read_property_name().to_owned()
        };
        if property.is_empty() {
            return Err(self.error("expected a property name"));
        }
        self.skip_whitespace();
        if !self.eat(")") {
            return Err(self.error_at(open, "unmatched '('"));
        }
        ComparisonEvaluator::new(kind, property, "")
            .map(FilterNode::Comparison)
            .map_err(|e| self.error_at(open, &e.0))
    }

    fn read_property_name(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || "=!<>~&|()\"".contains(c) {
                break;
            }
            self.advance(c);
        }
        &self.input[start..self.pos]
    }

    /// 베어 값: 공백, 괄호, `&&`, `||` 앞에서 끝납니다.
    fn read_bare_value(&mut self) -> &'a str {
        let start = self.pos;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == '(' || c == ')' {
                break;
            }
            let rest = self.rest();
            if rest.starts_with("&&") || rest.starts_with("||") {
                break;
            }
            self.advance(c);
        }
        &self.input[start..self.pos]
    }

    /// 따옴표 문자열: `\"`만 이스케이프로 해석하고 다른 백슬래시는 그대로 둡니다.
    fn read_quoted(&mut self) -> Result<String, EventPipelineError> {
        let open = self.pos;
        self.advance('"');
        let mut value = String::new();
        loop {
            match self.peek() {
                None => return Err(self.error_at(open, "unterminated quoted string")),
                Some('"') => {
                    self.advance('"');
                    return Ok(value);
                }
                Some('\\') if self.rest().starts_with("\\\"") => {
                    self.pos += 2;
                    value.push('"');
                }
                Some(c) => {
                    self.advance(c);
                    value.push(c);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use diagflow_core::event::{EventData, LogLevel};
    use proptest::prelude::*;

    use super::*;

    fn semantics(expr: &str) -> String {
        FilterParser::parse(expr)
            .unwrap_or_else(|e| panic!("{expr}: {e}"))
            .semantics_string()
    }

    fn parse_error(expr: &str) -> String {
        match FilterParser::parse(expr) {
            Ok(node) => panic!("expected '{expr}' to fail, got {node}"),
            Err(e) => e.to_string(),
        }
    }

    #[test]
    fn single_comparisons() {
        assert_eq!(semantics("a==1"), "(__EqualityEvaluator:a==1)");
        assert_eq!(semantics("  a  !=  1  "), "(__InequalityEvaluator:a!=1)");
        assert_eq!(semantics("a>1"), "(__GreaterThanEvaluator:a>1)");
        assert_eq!(semantics("a>=1"), "(__GreaterOrEqualEvaluator:a>=1)");
        assert_eq!(semantics("a<1"), "(__LessThanEvaluator:a<1)");
        assert_eq!(semantics("a<=1"), "(__LessOrEqualEvaluator:a<=1)");
        assert_eq!(semantics("a~=^x.*"), "(__RegexEvaluator:a~=^x.*)");
        assert_eq!(semantics("k&==0x10"), "(__BitwiseEqualityEvaluator:k&==0x10)");
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        assert_eq!(
            semantics("!(a==1) && !(b==2) || !(c==3) || !(d==4) && e==5"),
            "((((NOT((__EqualityEvaluator:a==1)))AND (NOT((__EqualityEvaluator:b==2))))\
             OR(NOT((__EqualityEvaluator:c==3))))\
             OR((NOT((__EqualityEvaluator:d==4)))AND (__EqualityEvaluator:e==5)))"
        );
    }

    #[test]
    fn parentheses_override_precedence() {
        assert_eq!(
            semantics("a==1 && (b==2 || c==3)"),
            "((__EqualityEvaluator:a==1)AND ((__EqualityEvaluator:b==2)OR(__EqualityEvaluator:c==3)))"
        );
        assert_eq!(semantics("((a==1))"), "(__EqualityEvaluator:a==1)");
    }

    #[test]
    fn operators_without_whitespace() {
        assert_eq!(
            semantics("a==1&&b==2||c==3"),
            "(((__EqualityEvaluator:a==1)AND (__EqualityEvaluator:b==2))OR(__EqualityEvaluator:c==3))"
        );
    }

    #[test]
    fn quoted_values() {
        assert_eq!(
            semantics(r#"Message == "hello world && more""#),
            "(__EqualityEvaluator:Message==hello world && more)"
        );
        assert_eq!(
            semantics(r#"Message == "say \"hi\"""#),
            r#"(__EqualityEvaluator:Message==say "hi")"#
        );
        assert_eq!(
            semantics(r#"Path == "C:\temp""#),
            r"(__EqualityEvaluator:Path==C:\temp)"
        );
        assert_eq!(semantics(r#"a == """#), "(__EqualityEvaluator:a==)");
    }

    #[test]
    fn negation_allows_whitespace_before_parenthesis() {
        assert_eq!(semantics("! (a==1)"), "(NOT((__EqualityEvaluator:a==1)))");
    }

    #[test]
    fn structural_operators() {
        assert_eq!(semantics("hasproperty(Foo)"), "(__HasPropertyEvaluator:Foo)");
        assert_eq!(semantics("HasNoProperty( Foo )"), "(__HasNoPropertyEvaluator:Foo)");
        assert_eq!(semantics("Foo == null"), "(__IsNullEvaluator:Foo==null)");
        assert_eq!(semantics("Foo == NULL"), "(__IsNullEvaluator:Foo==NULL)");
        assert_eq!(semantics(r#"Foo == "null""#), "(__EqualityEvaluator:Foo==null)");
        assert_eq!(semantics("Foo != null"), "(__InequalityEvaluator:Foo!=null)");
    }

    #[test]
    fn semantics_are_deterministic() {
        let expr = "a==1 || (b~=x && !(hasproperty(c)))";
        assert_eq!(semantics(expr), semantics(expr));
    }

    #[test]
    fn rejects_malformed_expressions() {
        assert!(parse_error("").contains("empty expression"));
        assert!(parse_error("   ").contains("empty expression"));
        assert!(parse_error("()").contains("empty parenthesized group"));
        assert!(parse_error("(a==1").contains("unmatched '('"));
        assert!(parse_error("a==1)").contains("unmatched ')'"));
        assert!(parse_error("((a==1)").contains("unmatched '('"));
        assert!(parse_error("!a==1").contains("negation"));
        assert!(parse_error(r#""a" == 1"#).contains("quoted literal"));
        assert!(parse_error(r#"a==1 && "b""#).contains("quoted literal"));
        assert!(parse_error("a").contains("operator"));
        assert!(parse_error("a = 1").contains("operator"));
        assert!(parse_error("a ==").contains("expected a value"));
        assert!(parse_error("a == && b==1").contains("expected a value"));
        assert!(parse_error(r#"a == "open"#).contains("unterminated"));
        assert!(parse_error("a==1 &&").contains("expected an expression"));
        assert!(parse_error("|| a==1").contains("property name"));
        assert!(parse_error("a==1 b==2").contains("unexpected input"));
        assert!(parse_error("foo(a)").contains("unknown function"));
    }

    #[test]
    fn rejects_deep_nesting_without_overflow() {
        let deep = format!("{}a==1{}", "(".repeat(10_000), ")".repeat(10_000));
        assert!(parse_error(&deep).contains("nested too deeply"));

        let negated = format!("{}a==1{}", "!(".repeat(10_000), ")".repeat(10_000));
        assert!(parse_error(&negated).contains("nested too deeply"));

        let at_limit = format!(
            "{}a==1{}",
            "(".repeat(MAX_NESTING_DEPTH),
            ")".repeat(MAX_NESTING_DEPTH)
        );
        assert!(FilterParser::parse(&at_limit).is_ok());
    }

    #[test]
    fn rejects_overlong_chains() {
        let chain = vec!["a==1"; 10_000].join(" && ");
        assert!(parse_error(&chain).contains("too many comparisons"));

        let within = vec!["a==1"; MAX_COMPARISONS].join(" || ");
        let node = FilterParser::parse(&within).unwrap();
        let event = EventData::new("p", LogLevel::Verbose).with_payload("a", 1i32);
        assert!(node.evaluate(&event));
    }

    #[test]
    fn rejects_invalid_bitwise_literal() {
        let msg = parse_error("k &== 12abc");
        assert!(msg.contains("bitwise"));
        assert!(FilterParser::parse("k &== 0xFF").is_ok());
    }

    #[test]
    fn error_reports_position() {
        match FilterParser::parse("a==1 && (b==2") {
            Err(EventPipelineError::FilterParse { position, .. }) => assert_eq!(position, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn parsed_filter_evaluates() {
        let event = EventData::new("Diagflow", LogLevel::Error)
            .with_payload("Message", "disk full")
            .with_payload("Code", 28i32);
        let node = FilterParser::parse(
            r#"(Level <= Error && Message ~= "disk") || hasproperty(Missing)"#,
        )
        .unwrap();
        assert!(node.evaluate(&event));

        let node = FilterParser::parse("!(Code == 28) || Missing == null").unwrap();
        assert!(node.evaluate(&event));

        let node = FilterParser::parse("!(Code == 28) && Missing == null").unwrap();
        assert!(!node.evaluate(&event));
    }

    proptest! {
        #[test]
        fn parse_never_panics(input in ".{0,64}") {
            let _ = FilterParser::parse(&input);
        }

        #[test]
        fn parse_never_panics_on_grammar_soup(
            input in r#"[ a-c0-9!()&|=<>~"\\]{0,40}"#
        ) {
            let _ = FilterParser::parse(&input);
        }

        #[test]
        fn evaluation_is_total(
            property in "(Message|Count|Level|Keywords|Timestamp|ProviderName|Missing|Flag)",
            op in "(==|!=|>|>=|<|<=|~=)",
            literal in "[a-zA-Z0-9:.+-]{1,16}",
        ) {
            let expr = format!("{property} {op} {literal}");
            let event = EventData::new("p", LogLevel::Verbose)
                .with_payload("Message", "text")
                .with_payload("Count", 5u64)
                .with_payload("Flag", false);
            if let Ok(node) = FilterParser::parse(&expr) {
                let _ = node.evaluate(&event);
            }
        }
    }
}
