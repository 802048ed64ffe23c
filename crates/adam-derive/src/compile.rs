//! Lowering of parsed expressions to Polars expressions.

use adam_model::{ColumnRef, CompareOp, Expr, Literal, Operand};
use polars::prelude as pl;
use polars::prelude::{DataFrame, IntoLazy};

use crate::error::{DeriveError, Result};

/// Column the mask of [`evaluate`] is computed into.
const MASK_COLUMN: &str = "__adam_mask";

/// Resolves the names operands refer to in the frame an expression runs on.
pub struct Scope<'a> {
    column_name: &'a dyn Fn(&ColumnRef) -> String,
    subject: Option<&'a str>,
}

impl<'a> Scope<'a> {
    pub fn new(column_name: &'a dyn Fn(&ColumnRef) -> String) -> Self {
        Self {
            column_name,
            subject: None,
        }
    }

    /// Column standing in for the implicit operand of a cut predicate.
    pub fn with_subject(mut self, column: &'a str) -> Self {
        self.subject = Some(column);
        self
    }
}

pub fn compile(expr: &Expr, scope: &Scope<'_>) -> Result<pl::Expr> {
    Ok(match expr {
        Expr::Compare { left, op, right } => compare(left, *op, right, scope)?,
        Expr::IsNull { operand, negated } => {
            let operand = compile_operand(operand, scope)?;
            if *negated {
                operand.is_not_null()
            } else {
                operand.is_null()
            }
        }
        Expr::InList {
            operand,
            values,
            negated,
        } => {
            let target = compile_operand(operand, scope)?;
            let any = values
                .iter()
                .map(|value| equals(target.clone(), value))
                .reduce(pl::Expr::or)
                .unwrap_or_else(|| pl::lit(false));
            if *negated { any.not() } else { any }
        }
        Expr::And(left, right) => compile(left, scope)?.and(compile(right, scope)?),
        Expr::Or(left, right) => compile(left, scope)?.or(compile(right, scope)?),
        Expr::Not(inner) => compile(inner, scope)?.not(),
    })
}

/// Evaluates a predicate on every row of `frame`. Null results count as
/// false.
pub fn evaluate(frame: &DataFrame, predicate: pl::Expr) -> Result<Vec<bool>> {
    let out = frame
        .clone()
        .lazy()
        .with_column(predicate.alias(MASK_COLUMN))
        .collect()?;
    let mask = out.column(MASK_COLUMN)?.bool()?;
    Ok(mask.into_iter().map(|value| value.unwrap_or(false)).collect())
}

/// Keeps the rows of `frame` where `predicate` holds.
pub fn filter(frame: &DataFrame, predicate: pl::Expr) -> Result<DataFrame> {
    Ok(frame.clone().lazy().filter(predicate).collect()?)
}

fn compare(left: &Operand, op: CompareOp, right: &Operand, scope: &Scope<'_>) -> Result<pl::Expr> {
    // `x == null` reads as a null test; ordering against null never holds.
    match (left, right) {
        (Operand::Literal(Literal::Null), other) | (other, Operand::Literal(Literal::Null)) => {
            let operand = compile_operand(other, scope)?;
            return Ok(match op {
                CompareOp::Eq => operand.is_null(),
                CompareOp::Ne => operand.is_not_null(),
                _ => pl::lit(false),
            });
        }
        _ => {}
    }

    let left = compile_operand(left, scope)?;
    let right = compile_operand(right, scope)?;
    Ok(match op {
        CompareOp::Eq => left.eq(right),
        CompareOp::Ne => left.neq(right),
        CompareOp::Lt => left.lt(right),
        CompareOp::Le => left.lt_eq(right),
        CompareOp::Gt => left.gt(right),
        CompareOp::Ge => left.gt_eq(right),
    })
}

fn equals(target: pl::Expr, value: &Literal) -> pl::Expr {
    match value {
        Literal::Null => target.is_null(),
        other => target.eq(literal(other)),
    }
}

fn compile_operand(operand: &Operand, scope: &Scope<'_>) -> Result<pl::Expr> {
    match operand {
        Operand::Column(reference) => Ok(pl::col((scope.column_name)(reference))),
        Operand::Literal(value) => Ok(literal(value)),
        Operand::Subject => scope.subject.map(pl::col).ok_or_else(|| {
            DeriveError::InvalidDerivationSpec(
                "implicit operand used outside a cut predicate".to_string(),
            )
        }),
    }
}

fn literal(value: &Literal) -> pl::Expr {
    match value {
        Literal::Null => pl::lit(pl::Null {}),
        Literal::Bool(v) => pl::lit(*v),
        Literal::Int(v) => pl::lit(*v),
        Literal::Float(v) => pl::lit(*v),
        Literal::Str(v) => pl::lit(v.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::Column;

    fn frame() -> DataFrame {
        DataFrame::new(vec![
            Column::new("USUBJID".into(), &["01", "02", "03", "04"]),
            Column::new("DM.AGE".into(), &[Some(10i64), Some(25), Some(18), None]),
            Column::new("DM.SEX".into(), &["F", "M", "F", "M"]),
        ])
        .expect("frame")
    }

    fn names(reference: &ColumnRef) -> String {
        reference.frame_name("ADSL")
    }

    fn mask(text: &str) -> Vec<bool> {
        let expr = Expr::parse(text).expect("parse");
        let scope = Scope::new(&names);
        evaluate(&frame(), compile(&expr, &scope).expect("compile")).expect("evaluate")
    }

    #[test]
    fn comparisons_and_boolean_operators() {
        assert_eq!(mask("DM.AGE >= 18"), vec![false, true, true, false]);
        assert_eq!(
            mask("DM.AGE >= 18 and DM.SEX == 'F'"),
            vec![false, false, true, false]
        );
        assert_eq!(mask("DM.AGE < 18 or DM.SEX == M"), vec![true, true, false, true]);
        assert_eq!(mask("not DM.SEX == 'F'"), vec![false, true, false, true]);
    }

    #[test]
    fn null_tests_and_lists() {
        assert_eq!(mask("DM.AGE is null"), vec![false, false, false, true]);
        assert_eq!(mask("DM.AGE != null"), vec![true, true, true, false]);
        assert_eq!(mask("DM.AGE in [10, 18]"), vec![true, false, true, false]);
        assert_eq!(mask("DM.SEX not in ['F']"), vec![false, true, false, true]);
    }

    #[test]
    fn cut_predicates_use_the_subject_column() {
        let expr = Expr::parse_cut("[18,65)").expect("parse");
        let scope = Scope::new(&names).with_subject("DM.AGE");
        let mask = evaluate(&frame(), compile(&expr, &scope).expect("compile")).expect("mask");
        assert_eq!(mask, vec![false, true, true, false]);

        let without_subject = Scope::new(&names);
        assert!(compile(&expr, &without_subject).is_err());
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let expr = Expr::parse("DM.SEX == 'M'").expect("parse");
        let filtered = filter(&frame(), compile(&expr, &Scope::new(&names)).expect("compile"))
            .expect("filter");
        assert_eq!(filtered.height(), 2);
    }
}
