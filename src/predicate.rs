//! Vectorized column predicates.
//!
//! A [`ColumnPredicate`] is evaluated against a [`RowBatch`] in place: it
//! narrows `batch.selected` down to the rows that still match, the same
//! contract `comparison_predicate.h`/`in_list_predicate.h` give their
//! `evaluate(VectorizedRowBatch*)` methods.

use crate::common::ColumnId;
use crate::field::Field;
use std::cmp::Ordering;
use std::collections::HashSet;

/// One column's worth of values for a batch of rows, `None` meaning SQL NULL.
pub type ColumnValues = Vec<Option<Field>>;

/// A batch of rows flowing through predicate evaluation: one [`ColumnValues`]
/// per referenced column id, and the surviving row indices.
pub struct RowBatch {
    pub columns: std::collections::HashMap<ColumnId, ColumnValues>,
    pub selected: Vec<usize>,
}

impl RowBatch {
    pub fn new(columns: std::collections::HashMap<ColumnId, ColumnValues>, row_count: usize) -> Self {
        Self { columns, selected: (0..row_count).collect() }
    }

    fn value_at(&self, col: ColumnId, row: usize) -> Option<&Field> {
        self.columns.get(&col).and_then(|v| v[row].as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn accepts(&self, ord: Ordering) -> bool {
        match self {
            CompareOp::Eq => ord == Ordering::Equal,
            CompareOp::Ne => ord != Ordering::Equal,
            CompareOp::Lt => ord == Ordering::Less,
            CompareOp::Le => ord != Ordering::Greater,
            CompareOp::Gt => ord == Ordering::Greater,
            CompareOp::Ge => ord != Ordering::Less,
        }
    }
}

/// A single-column predicate: comparison against one value, or set
/// membership against a value set.
pub enum ColumnPredicate {
    Compare { column: ColumnId, op: CompareOp, value: Field },
    In { column: ColumnId, values: HashSet<String> },
    NotIn { column: ColumnId, values: HashSet<String> },
}

impl ColumnPredicate {
    /// Narrow `batch.selected` to the rows this predicate still accepts.
    /// Order within `selected` is preserved; nulls never match.
    pub fn evaluate(&self, batch: &mut RowBatch) {
        match self {
            ColumnPredicate::Compare { column, op, value } => {
                let mut selected = std::mem::take(&mut batch.selected);
                selected.retain(|&row| match batch.value_at(*column, row) {
                    Some(v) => v.cmp_field(value).map(|ord| op.accepts(ord)).unwrap_or(false),
                    None => false,
                });
                batch.selected = selected;
            }
            ColumnPredicate::In { column, values } => {
                if values.is_empty() {
                    batch.selected.clear();
                    return;
                }
                let mut selected = std::mem::take(&mut batch.selected);
                selected.retain(|&row| match batch.value_at(*column, row) {
                    Some(v) => values.contains(&v.to_string_value()),
                    None => false,
                });
                batch.selected = selected;
            }
            ColumnPredicate::NotIn { column, values } => {
                if values.is_empty() {
                    return; // identity: nothing excluded
                }
                let mut selected = std::mem::take(&mut batch.selected);
                selected.retain(|&row| match batch.value_at(*column, row) {
                    Some(v) => !values.contains(&v.to_string_value()),
                    None => false,
                });
                batch.selected = selected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn batch_of(col: ColumnId, vals: Vec<Option<i32>>) -> RowBatch {
        let n = vals.len();
        let mut columns = HashMap::new();
        columns.insert(col, vals.into_iter().map(|v| v.map(Field::Int32)).collect());
        RowBatch::new(columns, n)
    }

    #[test]
    fn null_evaluates_false_for_comparison() {
        let mut batch = batch_of(1, vec![Some(5), None, Some(10)]);
        let pred = ColumnPredicate::Compare { column: 1, op: CompareOp::Ge, value: Field::Int32(5) };
        pred.evaluate(&mut batch);
        assert_eq!(batch.selected, vec![0, 2]);
    }

    #[test]
    fn empty_in_is_empty_not_in_is_identity() {
        let mut in_batch = batch_of(1, vec![Some(1), Some(2)]);
        ColumnPredicate::In { column: 1, values: HashSet::new() }.evaluate(&mut in_batch);
        assert!(in_batch.selected.is_empty());

        let mut not_in_batch = batch_of(1, vec![Some(1), Some(2)]);
        ColumnPredicate::NotIn { column: 1, values: HashSet::new() }.evaluate(&mut not_in_batch);
        assert_eq!(not_in_batch.selected, vec![0, 1]);
    }

    #[test]
    fn ordering_within_selected_preserved() {
        let mut batch = batch_of(1, vec![Some(9), Some(1), Some(9), Some(1)]);
        let pred = ColumnPredicate::Compare { column: 1, op: CompareOp::Eq, value: Field::Int32(9) };
        pred.evaluate(&mut batch);
        assert_eq!(batch.selected, vec![0, 2]);
    }
}
