//! Delete/filter condition model: `Cond` / `CondColumn` / `Conditions`.
//!
//! Mirrors the original `olap_cond.h` shape: a `Cond` is one operator plus
//! its operand(s), a `CondColumn` is every `Cond` bound to one column, and
//! `Conditions` groups `CondColumn`s by column id. Used both for delete
//! predicates (`delete_conditions_eval`) and for segment pruning
//! (`delta_pruning_filter` / `delete_pruning_filter`).

use crate::common::{ColumnId, ColumnSchema, Schema};
use crate::error::StorageError;
use crate::field::Field;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CondOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
}

impl CondOp {
    fn symbol(&self) -> &'static str {
        match self {
            CondOp::Eq => "=",
            CondOp::Ne => "!=",
            CondOp::Lt => "<<",
            CondOp::Le => "<=",
            CondOp::Gt => ">>",
            CondOp::Ge => ">=",
            CondOp::In => "*=",
        }
    }

    fn parse(s: &str) -> Option<CondOp> {
        match s {
            "=" => Some(CondOp::Eq),
            "!=" => Some(CondOp::Ne),
            "<<" => Some(CondOp::Lt),
            "<=" => Some(CondOp::Le),
            ">>" => Some(CondOp::Gt),
            ">=" => Some(CondOp::Ge),
            "*=" => Some(CondOp::In),
            _ => None,
        }
    }
}

/// One operator plus its operand(s): a single value for comparisons, a
/// value set for `IN`.
#[derive(Debug, Clone)]
pub struct Cond {
    pub op: CondOp,
    pub operand: Option<Field>,
    pub operand_set: Vec<Field>,
}

impl Cond {
    /// Whether the row's value at this column satisfies this condition.
    pub fn eval(&self, value: Option<&Field>) -> bool {
        let value = match value {
            Some(v) => v,
            None => return false,
        };
        match self.op {
            CondOp::In => self.operand_set.iter().any(|v| v.cmp_field(value) == Some(std::cmp::Ordering::Equal)),
            _ => {
                let operand = self.operand.as_ref().expect("comparison Cond always has an operand");
                match value.cmp_field(operand) {
                    Some(ord) => match self.op {
                        CondOp::Eq => ord == std::cmp::Ordering::Equal,
                        CondOp::Ne => ord != std::cmp::Ordering::Equal,
                        CondOp::Lt => ord == std::cmp::Ordering::Less,
                        CondOp::Le => ord != std::cmp::Ordering::Greater,
                        CondOp::Gt => ord == std::cmp::Ordering::Greater,
                        CondOp::Ge => ord != std::cmp::Ordering::Less,
                        CondOp::In => unreachable!(),
                    },
                    None => false,
                }
            }
        }
    }

    /// Given a column's `(min, max)` stats, whether the range can be fully
    /// skipped (true), or must be scanned.
    fn delta_prune(&self, min: &Field, max: &Field) -> bool {
        let lt = |a: &Field, b: &Field| a.cmp_field(b) == Some(std::cmp::Ordering::Less);
        let gt = |a: &Field, b: &Field| a.cmp_field(b) == Some(std::cmp::Ordering::Greater);
        match self.op {
            CondOp::Eq => {
                let v = self.operand.as_ref().unwrap();
                lt(v, min) || gt(v, max)
            }
            CondOp::Gt => {
                let v = self.operand.as_ref().unwrap();
                !gt(max, v)
            }
            CondOp::Ge => {
                let v = self.operand.as_ref().unwrap();
                lt(max, v)
            }
            CondOp::Lt => {
                let v = self.operand.as_ref().unwrap();
                !lt(min, v)
            }
            CondOp::Le => {
                let v = self.operand.as_ref().unwrap();
                gt(min, v)
            }
            CondOp::Ne => false,
            CondOp::In => self.operand_set.iter().all(|v| lt(v, min) || gt(v, max)),
        }
    }

    fn format_operand(&self) -> String {
        match self.op {
            CondOp::In => self
                .operand_set
                .iter()
                .map(|v| v.to_string_value())
                .collect::<Vec<_>>()
                .join(","),
            _ => self.operand.as_ref().unwrap().to_string_value(),
        }
    }
}

/// Every `Cond` bound to one column.
pub struct CondColumn {
    pub column_id: ColumnId,
    pub is_key: bool,
    pub conds: Vec<Cond>,
}

impl CondColumn {
    /// Satisfied iff every bound `Cond` accepts the row's value.
    pub fn eval(&self, value: Option<&Field>) -> bool {
        self.conds.iter().all(|c| c.eval(value))
    }

    fn delta_prune(&self, min: &Field, max: &Field) -> bool {
        self.conds.iter().any(|c| c.delta_prune(min, max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneResult {
    AllDeleted,
    Partial,
    None,
}

/// All condition columns for one request, keyed by column id. Holds a
/// strong reference to the owning tablet for the lifetime of this value so
/// the schema it was validated against cannot be dropped out from under it.
pub struct Conditions<T> {
    columns: BTreeMap<ColumnId, CondColumn>,
    _table_ref: std::sync::Arc<T>,
}

impl<T> Conditions<T> {
    pub fn new(table_ref: std::sync::Arc<T>) -> Self {
        Self { columns: BTreeMap::new(), _table_ref: table_ref }
    }

    /// Validate and add one textual condition against `schema`.
    ///
    /// Rejects: unknown column, floating-point columns (none exist in this
    /// schema's `DataType`, so this check is always satisfied), and
    /// non-key columns, per the stored-header contract.
    pub fn append_condition(&mut self, schema: &Schema, text: &str) -> Result<(), StorageError> {
        let (column_name, op_str, operand_str) = split_condition(text)
            .ok_or_else(|| StorageError::InvalidCondition(format!("malformed condition: {}", text)))?;

        let column = find_column_by_name(schema, column_name)
            .ok_or_else(|| StorageError::InvalidCondition(format!("unknown column: {}", column_name)))?;

        if !column.is_key {
            return Err(StorageError::InvalidCondition(format!(
                "column '{}' is not a key column",
                column_name
            )));
        }
        if column.data_type.is_floating_point() {
            return Err(StorageError::InvalidCondition(format!(
                "column '{}' is floating point",
                column_name
            )));
        }

        let op = CondOp::parse(op_str)
            .ok_or_else(|| StorageError::InvalidCondition(format!("unknown operator: {}", op_str)))?;

        let cond = if op == CondOp::In {
            let operand_set = operand_str
                .split(',')
                .map(|piece| Field::from_string(piece, &column.data_type))
                .collect::<Result<Vec<_>, _>>()?;
            Cond { op, operand: None, operand_set }
        } else {
            let operand = Field::from_string(operand_str, &column.data_type)?;
            Cond { op, operand: Some(operand), operand_set: Vec::new() }
        };

        self.columns
            .entry(column.id)
            .or_insert_with(|| CondColumn { column_id: column.id, is_key: column.is_key, conds: Vec::new() })
            .conds
            .push(cond);

        Ok(())
    }

    pub fn columns(&self) -> &BTreeMap<ColumnId, CondColumn> {
        &self.columns
    }

    /// Row is deleted iff every CondColumn accepts the row (logical AND
    /// across columns, same as row-level `eval`).
    pub fn delete_conditions_eval(&self, row: &std::collections::HashMap<ColumnId, Option<Field>>) -> bool {
        self.eval(row)
    }

    pub fn eval(&self, row: &std::collections::HashMap<ColumnId, Option<Field>>) -> bool {
        self.columns.values().all(|cc| cc.eval(row.get(&cc.column_id).and_then(|v| v.as_ref())))
    }

    /// `true` = this segment/block can be skipped entirely for a scan that
    /// requires these conditions to hold.
    pub fn delta_pruning_filter(&self, stats: &std::collections::HashMap<ColumnId, (Field, Field)>) -> bool {
        for cc in self.columns.values() {
            match stats.get(&cc.column_id) {
                Some((min, max)) => {
                    if cc.delta_prune(min, max) {
                        return true;
                    }
                }
                None => return false,
            }
        }
        false
    }

    /// Whether this predicate deletes all, some, or none of a range given
    /// per-column stats. Used to fast-path whole segments during compaction.
    pub fn delete_pruning_filter(
        &self,
        stats: &std::collections::HashMap<ColumnId, (Field, Field)>,
    ) -> PruneResult {
        let mut any_may_match = false;
        let mut any_fully_deleted = true;

        for cc in self.columns.values() {
            let (min, max) = match stats.get(&cc.column_id) {
                Some(mm) => mm,
                None => return PruneResult::Partial,
            };
            if cc.delta_prune(min, max) {
                any_fully_deleted = false;
            } else {
                any_may_match = true;
                if min.cmp_field(max) != Some(std::cmp::Ordering::Equal) {
                    any_fully_deleted = false;
                }
            }
        }

        if !any_may_match {
            PruneResult::None
        } else if any_fully_deleted {
            PruneResult::AllDeleted
        } else {
            PruneResult::Partial
        }
    }
}

impl fmt::Display for Cond {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.op.symbol(), self.format_operand())
    }
}

fn find_column_by_name<'a>(schema: &'a Schema, name: &str) -> Option<&'a ColumnSchema> {
    schema.iter().find(|c| c.name == name)
}

/// Split `col OP value` into its three pieces, handling the multi-char
/// operators (`<<`, `>>`, `<=`, `>=`, `!=`, `*=`) before the single-char `=`.
fn split_condition(text: &str) -> Option<(&str, &str, &str)> {
    const OPS: &[&str] = &["<<", ">>", "<=", ">=", "!=", "*=", "="];
    for op in OPS {
        if let Some(idx) = text.find(op) {
            let column = text[..idx].trim();
            let rest = text[idx + op.len()..].trim();
            if !column.is_empty() && !rest.is_empty() {
                return Some((column, op, rest));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ColumnSchema;
    use crate::field::DataType;
    use std::collections::HashMap;

    fn schema() -> Schema {
        vec![
            ColumnSchema { id: 0, name: "k1".into(), data_type: DataType::Int32, is_key: true },
            ColumnSchema { id: 1, name: "v1".into(), data_type: DataType::Int32, is_key: false },
        ]
    }

    #[test]
    fn rejects_unknown_and_non_key_columns() {
        let mut conds = Conditions::new(std::sync::Arc::new(()));
        assert!(conds.append_condition(&schema(), "missing=5").is_err());
        assert!(conds.append_condition(&schema(), "v1=5").is_err());
        assert!(conds.append_condition(&schema(), "k1=5").is_ok());
    }

    #[test]
    fn in_list_eval_and_textual_form() {
        let mut conds = Conditions::new(std::sync::Arc::new(()));
        conds.append_condition(&schema(), "k1*=1,2,3").unwrap();
        let mut row = HashMap::new();
        row.insert(0u32, Some(Field::Int32(2)));
        assert!(conds.eval(&row));
        row.insert(0u32, Some(Field::Int32(9)));
        assert!(!conds.eval(&row));
    }

    #[test]
    fn delta_pruning_skips_out_of_range() {
        let mut conds = Conditions::new(std::sync::Arc::new(()));
        conds.append_condition(&schema(), "k1=100").unwrap();
        let mut stats = HashMap::new();
        stats.insert(0u32, (Field::Int32(0), Field::Int32(10)));
        assert!(conds.delta_pruning_filter(&stats));
        stats.insert(0u32, (Field::Int32(50), Field::Int32(150)));
        assert!(!conds.delta_pruning_filter(&stats));
    }
}
