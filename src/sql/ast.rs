//! # Parsed Statement Representation
//!
//! The parser produces one `ParsedStmt` per statement: a flat record
//! discriminated by `StmtKind`, carrying whichever clause fields the
//! operation uses. Expression trees are owned; a prepared statement keeps
//! its AST for the whole statement lifetime.
//!
//! Column references carry a lazily resolved column index (`Cell`), filled
//! in by the executor once the statement is bound to a table layout.
//! Aggregate function nodes carry an aggregate-slot index assigned during
//! SELECT initialization the same way.

use std::cell::Cell;

use crate::database::schema::ColumnDef;
use crate::types::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StmtKind {
    Select,
    Insert,
    Update,
    Delete,
    CreateTable,
    DropTable,
    CreateIndex,
    DropIndex,
    Begin,
    Commit,
    Rollback,
    Savepoint,
    Release,
    RollbackTo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Like,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
    IsNull,
    IsNotNull,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Value),
    Column {
        table: Option<String>,
        name: String,
        /// Resolved position in the current row layout.
        index: Cell<Option<usize>>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Function {
        name: String,
        /// `None` is the `*` placeholder argument, as in `COUNT(*)`.
        args: Vec<Option<Expr>>,
        /// Aggregate state slot, assigned when the statement initializes.
        agg_slot: Cell<Option<usize>>,
    },
    /// 1-based positional parameter.
    Parameter(usize),
}

impl Expr {
    pub fn column(name: impl Into<String>) -> Expr {
        Expr::Column {
            table: None,
            name: name.into(),
            index: Cell::new(None),
        }
    }
}

/// One SELECT output column; `expr` is `None` for `*`.
#[derive(Debug, Clone)]
pub struct SelectCol {
    pub expr: Option<Expr>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OrderBy {
    pub expr: Expr,
    pub desc: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

#[derive(Debug, Clone)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    pub on: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct NewTable {
    pub name: String,
    pub columns: Vec<ColumnDef>,
}

#[derive(Debug, Clone)]
pub struct NewIndex {
    pub name: String,
    pub table: String,
    pub columns: Vec<String>,
    pub unique: bool,
}

/// A parsed statement. Fields not used by `op` stay at their defaults.
#[derive(Debug, Clone, Default)]
pub struct ParsedStmt {
    pub op: Option<StmtKind>,

    // SELECT
    pub columns: Vec<SelectCol>,
    pub tables: Vec<TableRef>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub group_by: Vec<Expr>,
    pub having: Option<Expr>,
    pub order_by: Vec<OrderBy>,
    /// `-1` means no LIMIT.
    pub limit: i64,
    pub offset: i64,

    // INSERT
    pub insert_columns: Vec<String>,
    pub insert_rows: Vec<Vec<Expr>>,

    // UPDATE
    pub update_sets: Vec<(String, Expr)>,

    // DDL
    pub new_table: Option<NewTable>,
    pub new_index: Option<NewIndex>,
    /// DROP TABLE / DROP INDEX target.
    pub target_name: Option<String>,

    // SAVEPOINT / RELEASE / ROLLBACK TO
    pub savepoint_name: Option<String>,

    /// Number of `?` placeholders in the statement.
    pub param_count: usize,
}

impl ParsedStmt {
    pub fn new(op: StmtKind) -> ParsedStmt {
        ParsedStmt {
            op: Some(op),
            limit: -1,
            ..ParsedStmt::default()
        }
    }

    pub fn kind(&self) -> StmtKind {
        self.op.expect("statement kind set by parser")
    }
}
