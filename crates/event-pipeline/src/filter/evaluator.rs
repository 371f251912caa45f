//! 필터 표현식 AST
//!
//! 파싱이 끝난 트리는 불변이며, 평가는 부수 효과 없는 순수 함수입니다.

use std::fmt;

use diagflow_core::event::EventData;

use super::comparison::ComparisonEvaluator;

/// 필터 표현식 노드
#[derive(Clone)]
pub enum FilterNode {
    /// 속성 비교 리프
    Comparison(ComparisonEvaluator),
    /// 부정
    Not(Box<FilterNode>),
    /// 논리곱
    And(Box<FilterNode>, Box<FilterNode>),
    /// 논리합
    Or(Box<FilterNode>, Box<FilterNode>),
}

impl FilterNode {
    /// 이벤트에 대해 표현식을 평가합니다.
    pub fn evaluate(&self, event: &EventData) -> bool {
        match self {
            Self::Comparison(c) => c.evaluate(event),
            Self::Not(inner) => !inner.evaluate(event),
            Self::And(l, r) => l.evaluate(event) && r.evaluate(event),
            Self::Or(l, r) => l.evaluate(event) || r.evaluate(event),
        }
    }

    /// 디버그/테스트 비교용 시맨틱 문자열을 만듭니다.
    pub fn semantics_string(&self) -> String {
        let mut out = String::new();
        self.write_semantics(&mut out);
        out
    }

    fn write_semantics(&self, out: &mut String) {
        match self {
            Self::Comparison(c) => out.push_str(&c.semantics_string()),
            Self::Not(inner) => {
                out.push_str("(NOT(");
                inner.write_semantics(out);
                out.push_str("))");
            }
            Self::And(l, r) => {
                out.push('(');
                l.write_semantics(out);
                out.push_str("AND ");
                r.write_semantics(out);
                out.push(')');
            }
            Self::Or(l, r) => {
                out.push('(');
                l.write_semantics(out);
                out.push_str("OR");
                r.write_semantics(out);
                out.push(')');
            }
        }
    }

    /// 트리에 포함된 비교 리프 수
    pub fn comparison_count(&self) -> usize {
        match self {
            Self::Comparison(_) => 1,
            Self::Not(inner) => inner.comparison_count(),
            Self::And(l, r) | Self::Or(l, r) => l.comparison_count() + r.comparison_count(),
        }
    }
}

impl fmt::Debug for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.semantics_string())
    }
}

impl fmt::Display for FilterNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.semantics_string())
    }
}
