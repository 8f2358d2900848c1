//! Linear-chain cyclomatic complexity.
//!
//! Each body statement is a node and consecutive statements are joined by a
//! directed edge. Branching inside a statement is not expanded, so the metric
//! under-approximates real control flow. It is diagnostic only.

use petgraph::graph::DiGraph;

use crate::parser::{FunctionSignature, Statement};

/// Build the statement chain for a function body.
pub fn build_cfg(body: &[Statement]) -> DiGraph<&Statement, ()> {
    let mut cfg = DiGraph::new();
    let mut last = None;
    for stmt in body {
        let node = cfg.add_node(stmt);
        if let Some(prev) = last {
            cfg.add_edge(prev, node, ());
        }
        last = Some(node);
    }
    cfg
}

/// `edges - nodes + 2` over the statement chain.
pub fn cyclomatic_complexity(body: &[Statement]) -> i64 {
    let cfg = build_cfg(body);
    cfg.edge_count() as i64 - cfg.node_count() as i64 + 2
}

/// Complexity of one function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexityReport {
    pub function: String,
    pub complexity: i64,
}

pub fn analyze(sig: &FunctionSignature) -> ComplexityReport {
    ComplexityReport {
        function: sig.name.clone(),
        complexity: cyclomatic_complexity(&sig.body),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmts(n: usize) -> Vec<Statement> {
        (0..n)
            .map(|i| Statement {
                kind: "expression_statement".to_string(),
                line: i as u32 + 1,
            })
            .collect()
    }

    #[test]
    fn chain_has_one_edge_per_adjacent_pair() {
        let body = stmts(4);
        let cfg = build_cfg(&body);
        assert_eq!(cfg.node_count(), 4);
        assert_eq!(cfg.edge_count(), 3);
    }

    #[test]
    fn any_nonempty_chain_has_complexity_one() {
        for n in 1..6 {
            assert_eq!(cyclomatic_complexity(&stmts(n)), 1);
        }
    }

    #[test]
    fn empty_body_has_complexity_two() {
        assert_eq!(cyclomatic_complexity(&[]), 2);
    }

    #[test]
    fn branching_statement_is_a_single_node() {
        let body = vec![Statement {
            kind: "if_statement".to_string(),
            line: 2,
        }];
        assert_eq!(cyclomatic_complexity(&body), 1);
    }

    #[test]
    fn analyze_names_the_function() {
        let sig = FunctionSignature {
            name: "divide".to_string(),
            params: vec!["a".to_string(), "b".to_string()],
            line: 1,
            source: String::new(),
            body: stmts(2),
        };
        assert_eq!(
            analyze(&sig),
            ComplexityReport {
                function: "divide".to_string(),
                complexity: 1
            }
        );
    }
}
