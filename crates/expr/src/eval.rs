use crate::error::EvalError;
use crate::tree::{ExprTree, Node, NodeId};

/// Reference evaluator: folds the whole tree locally.
///
/// The scheduler never uses this for multi-node trees; it exists as the
/// oracle the distributed path must agree with.
pub fn evaluate(tree: &ExprTree) -> Result<f64, EvalError> {
    // Post-order over an explicit stack; operands land on `values` left first.
    let mut values: Vec<f64> = Vec::new();
    let mut stack = vec![(tree.root(), false)];
    while let Some((id, expanded)) = stack.pop() {
        match tree.node(id) {
            Some(Node::Leaf(value)) => values.push(*value),
            Some(Node::Internal { op, left, right, .. }) => {
                if expanded {
                    let (Some(r), Some(l)) = (values.pop(), values.pop()) else {
                        return Err(missing(id));
                    };
                    values.push(op.apply(l, r)?);
                } else {
                    stack.push((id, true));
                    stack.push((*right, false));
                    stack.push((*left, false));
                }
            }
            None => return Err(missing(id)),
        }
    }
    values.pop().ok_or_else(|| missing(tree.root()))
}

fn missing(id: NodeId) -> EvalError {
    EvalError::UnknownOperator(format!("missing node {id}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn eval(text: &str) -> Result<f64, EvalError> {
        evaluate(&parse(text).unwrap())
    }

    #[test]
    fn precedence_and_grouping() {
        assert_eq!(eval("2+3*4"), Ok(14.0));
        assert_eq!(eval("(2+3)*4"), Ok(20.0));
        assert_eq!(eval("10-4-3"), Ok(3.0));
        assert_eq!(eval("16/4/2"), Ok(2.0));
    }

    #[test]
    fn implicit_multiplication_and_unary() {
        assert_eq!(eval("2(3+4)"), Ok(14.0));
        assert_eq!(eval("2(3)(4)"), Ok(24.0));
        assert_eq!(eval("-5+10"), Ok(5.0));
        assert_eq!(eval("--5"), Ok(5.0));
        assert_eq!(eval("-(2+3)*2"), Ok(-10.0));
    }

    #[test]
    fn division_by_zero_is_an_evaluation_error() {
        assert_eq!(eval("10/0"), Err(EvalError::DivisionByZero));
        assert_eq!(eval("1/(2-2)"), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn fractional_values() {
        assert_eq!(eval("0.5*4"), Ok(2.0));
        assert_eq!(eval("7/2"), Ok(3.5));
    }
}
