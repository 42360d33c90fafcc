//! # Statement Executor
//!
//! A prepared [`Statement`] owns its SQL text, parsed AST, bound
//! parameters and current result row; each `step` either produces one row
//! or signals completion. SELECT over a single table streams straight off
//! a B+tree cursor; ORDER BY, JOINs, GROUP BY and aggregates switch to
//! buffered execution, materializing the filtered result before yielding.
//!
//! ## Expression Evaluation
//!
//! Post-order walk with SQL NULL propagation: any NULL operand makes a
//! binary result NULL (the IS operators excepted). Arithmetic over two
//! integers stays integral, anything else promotes to float; division by
//! zero yields NULL. Comparisons use the total order of `Value`; AND/OR
//! treat non-zero as true. `LIKE` matches `%`/`_` patterns over text,
//! ASCII case-insensitively.
//!
//! ## Aggregates and Grouping
//!
//! COUNT/SUM/AVG/MIN/MAX nodes are assigned aggregate slots when the
//! statement initializes. Rows are partitioned by the encoded GROUP BY
//! key (one implicit group without GROUP BY), each group accumulating its
//! slot states in one pass; HAVING filters finished groups, and output
//! expressions read their slot state through the same evaluator.
//!
//! ## Writes
//!
//! INSERT packs each VALUES row under a fresh row id and maintains any
//! secondary indices. UPDATE and DELETE run two-phase: a full scan
//! collects matching keys (and replacement images), then the tree is
//! modified. Write statements outside an explicit transaction commit
//! implicitly when they finish.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;

use crate::btree::{BTree, Cursor};
use crate::database::schema::{IndexDef, TableDef};
use crate::database::Database;
use crate::error::{db_err, ErrorCode};
use crate::storage::{decode_row, encode_row, encode_values};
use crate::types::{col_flags, index_flags, Value, ValueType};

use super::ast::{BinaryOp, Expr, JoinType, NewIndex, OrderBy, ParsedStmt, StmtKind, UnaryOp};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Row,
    Done,
}

/// Row-id keys are biased so plain byte comparison sorts numerically.
pub(crate) fn rowid_key(rowid: i64) -> [u8; 8] {
    ((rowid as u64) ^ (1 << 63)).to_be_bytes()
}

pub(crate) fn rowid_from_key(key: &[u8]) -> i64 {
    let raw = u64::from_be_bytes(key.try_into().unwrap_or([0; 8]));
    (raw ^ (1 << 63)) as i64
}

// --- evaluation ------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AggKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

fn agg_kind(name: &str) -> Option<AggKind> {
    match name.to_ascii_uppercase().as_str() {
        "COUNT" => Some(AggKind::Count),
        "SUM" => Some(AggKind::Sum),
        "AVG" => Some(AggKind::Avg),
        "MIN" => Some(AggKind::Min),
        "MAX" => Some(AggKind::Max),
        _ => None,
    }
}

#[derive(Clone)]
struct AggSpec {
    kind: AggKind,
    arg: Option<Expr>,
}

#[derive(Clone, Default)]
struct AggState {
    count: i64,
    sum: f64,
    min: f64,
    max: f64,
    has_min: bool,
    has_max: bool,
}

impl AggState {
    fn accumulate(&mut self, value: &Value) {
        self.count += 1;
        let Some(v) = value.as_f64() else { return };
        self.sum += v;
        if !self.has_min || v < self.min {
            self.min = v;
            self.has_min = true;
        }
        if !self.has_max || v > self.max {
            self.max = v;
            self.has_max = true;
        }
    }

    fn finalize(&self, kind: AggKind) -> Value {
        match kind {
            AggKind::Count => Value::Int(self.count),
            AggKind::Sum => Value::Float(self.sum),
            AggKind::Avg => {
                if self.count > 0 {
                    Value::Float(self.sum / self.count as f64)
                } else {
                    Value::Null
                }
            }
            AggKind::Min => {
                if self.has_min {
                    Value::Float(self.min)
                } else {
                    Value::Null
                }
            }
            AggKind::Max => {
                if self.has_max {
                    Value::Float(self.max)
                } else {
                    Value::Null
                }
            }
        }
    }
}

struct EvalCtx<'a> {
    row: Option<&'a [Value]>,
    params: &'a [Value],
    aggs: Option<&'a [AggState]>,
}

fn eval(expr: &Expr, ctx: &EvalCtx<'_>) -> Result<Value> {
    match expr {
        Expr::Literal(v) => Ok(v.clone()),

        Expr::Parameter(idx) => ctx
            .params
            .get(idx - 1)
            .cloned()
            .ok_or_else(|| db_err(ErrorCode::Range, format!("parameter {} not bound", idx))),

        Expr::Column { name, index, .. } => {
            let Some(idx) = index.get() else {
                return Err(db_err(
                    ErrorCode::Error,
                    format!("unresolved column '{}'", name),
                ));
            };
            // Absent rows (aggregate output without GROUP BY) and rows
            // narrower than the layout read as NULL.
            Ok(ctx
                .row
                .and_then(|row| row.get(idx))
                .cloned()
                .unwrap_or(Value::Null))
        }

        Expr::Binary { op, left, right } => {
            let l = eval(left, ctx)?;
            let r = eval(right, ctx)?;
            if l.is_null() || r.is_null() {
                return Ok(Value::Null);
            }
            Ok(eval_binary(*op, &l, &r))
        }

        Expr::Unary { op, operand } => {
            let v = eval(operand, ctx)?;
            Ok(match op {
                UnaryOp::IsNull => Value::Int(v.is_null() as i64),
                UnaryOp::IsNotNull => Value::Int(!v.is_null() as i64),
                UnaryOp::Neg => match v {
                    Value::Int(i) => Value::Int(i.wrapping_neg()),
                    Value::Float(f) => Value::Float(-f),
                    _ => Value::Null,
                },
                UnaryOp::Not => match v {
                    Value::Null => Value::Null,
                    other => Value::Int(!other.is_truthy() as i64),
                },
            })
        }

        Expr::Function { name, agg_slot, .. } => {
            if let Some(slot) = agg_slot.get() {
                if let Some(states) = ctx.aggs {
                    let kind = agg_kind(name).expect("slot only set on aggregates");
                    return Ok(states
                        .get(slot)
                        .map(|s| s.finalize(kind))
                        .unwrap_or(Value::Null));
                }
                return Ok(Value::Null);
            }
            // Non-aggregate functions are not part of the dialect.
            Ok(Value::Null)
        }
    }
}

fn eval_binary(op: BinaryOp, l: &Value, r: &Value) -> Value {
    use std::cmp::Ordering;

    match op {
        BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul => {
            if let (Value::Int(a), Value::Int(b)) = (l, r) {
                return Value::Int(match op {
                    BinaryOp::Add => a.wrapping_add(*b),
                    BinaryOp::Sub => a.wrapping_sub(*b),
                    _ => a.wrapping_mul(*b),
                });
            }
            match (l.as_f64(), r.as_f64()) {
                (Some(a), Some(b)) => Value::Float(match op {
                    BinaryOp::Add => a + b,
                    BinaryOp::Sub => a - b,
                    _ => a * b,
                }),
                _ => Value::Null,
            }
        }
        BinaryOp::Div => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_div(*b).map(Value::Int).unwrap_or(Value::Null)
            }
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Value::Null,
                (Some(a), Some(b)) => Value::Float(a / b),
                _ => Value::Null,
            },
        },
        BinaryOp::Mod => match (l, r) {
            (Value::Int(a), Value::Int(b)) => {
                a.checked_rem(*b).map(Value::Int).unwrap_or(Value::Null)
            }
            _ => match (l.as_f64(), r.as_f64()) {
                (Some(_), Some(b)) if b == 0.0 => Value::Null,
                (Some(a), Some(b)) => Value::Float(a % b),
                _ => Value::Null,
            },
        },
        BinaryOp::Eq => Value::Int((l.cmp_sql(r) == Ordering::Equal) as i64),
        BinaryOp::Ne => Value::Int((l.cmp_sql(r) != Ordering::Equal) as i64),
        BinaryOp::Lt => Value::Int((l.cmp_sql(r) == Ordering::Less) as i64),
        BinaryOp::Le => Value::Int((l.cmp_sql(r) != Ordering::Greater) as i64),
        BinaryOp::Gt => Value::Int((l.cmp_sql(r) == Ordering::Greater) as i64),
        BinaryOp::Ge => Value::Int((l.cmp_sql(r) != Ordering::Less) as i64),
        BinaryOp::And => Value::Int((l.is_truthy() && r.is_truthy()) as i64),
        BinaryOp::Or => Value::Int((l.is_truthy() || r.is_truthy()) as i64),
        BinaryOp::Like => match (l, r) {
            (Value::Text(text), Value::Text(pattern)) => {
                Value::Int(like_match(text.as_bytes(), pattern.as_bytes()) as i64)
            }
            _ => Value::Null,
        },
    }
}

/// SQL LIKE: `%` matches any run, `_` one character, ASCII-case-blind.
fn like_match(text: &[u8], pattern: &[u8]) -> bool {
    match pattern.first() {
        None => text.is_empty(),
        Some(b'%') => {
            (0..=text.len()).any(|skip| like_match(&text[skip..], &pattern[1..]))
        }
        Some(b'_') => !text.is_empty() && like_match(&text[1..], &pattern[1..]),
        Some(&p) => match text.first() {
            Some(&t) => {
                t.eq_ignore_ascii_case(&p) && like_match(&text[1..], &pattern[1..])
            }
            None => false,
        },
    }
}

fn is_truthy(v: &Value) -> bool {
    !v.is_null() && v.is_truthy()
}

// --- plans -----------------------------------------------------------------

struct LayoutCol {
    qualifier: String,
    name: String,
}

#[derive(Default)]
struct Layout {
    cols: Vec<LayoutCol>,
}

impl Layout {
    fn extend_with(&mut self, qualifier: &str, table: &TableDef) {
        for column in &table.columns {
            self.cols.push(LayoutCol {
                qualifier: qualifier.to_ascii_lowercase(),
                name: column.name.clone(),
            });
        }
    }

    fn resolve(&self, qualifier: Option<&str>, name: &str) -> Option<usize> {
        self.cols.iter().position(|c| {
            c.name.eq_ignore_ascii_case(name)
                && qualifier
                    .map(|q| c.qualifier.eq_ignore_ascii_case(q))
                    .unwrap_or(true)
        })
    }
}

/// Binds every column reference in `expr` to the layout.
fn resolve_expr(expr: &Expr, layout: &Layout) -> Result<()> {
    match expr {
        Expr::Column { table, name, index } => {
            let idx = layout
                .resolve(table.as_deref(), name)
                .ok_or_else(|| db_err(ErrorCode::Error, format!("no such column: {}", name)))?;
            index.set(Some(idx));
            Ok(())
        }
        Expr::Binary { left, right, .. } => {
            resolve_expr(left, layout)?;
            resolve_expr(right, layout)
        }
        Expr::Unary { operand, .. } => resolve_expr(operand, layout),
        Expr::Function { args, .. } => {
            for arg in args.iter().flatten() {
                resolve_expr(arg, layout)?;
            }
            Ok(())
        }
        Expr::Literal(_) | Expr::Parameter(_) => Ok(()),
    }
}

/// Registers aggregate function nodes into `specs`, tagging each node with
/// its slot. Arguments are cloned after resolution so accumulation can
/// evaluate them independently of the statement's AST borrows.
fn assign_agg_slots(expr: &Expr, specs: &mut Vec<AggSpec>) {
    match expr {
        Expr::Function {
            name,
            args,
            agg_slot,
        } => {
            if let Some(kind) = agg_kind(name) {
                agg_slot.set(Some(specs.len()));
                specs.push(AggSpec {
                    kind,
                    arg: args.first().and_then(|a| a.clone()),
                });
                return;
            }
            for arg in args.iter().flatten() {
                assign_agg_slots(arg, specs);
            }
        }
        Expr::Binary { left, right, .. } => {
            assign_agg_slots(left, specs);
            assign_agg_slots(right, specs);
        }
        Expr::Unary { operand, .. } => assign_agg_slots(operand, specs),
        _ => {}
    }
}

enum OutCol {
    /// Bare column reference with its layout position cached.
    Index(usize),
    Expr(Expr),
}

struct JoinPlan {
    join_type: JoinType,
    table: Arc<TableDef>,
    on: Option<Expr>,
    left_width: usize,
    right_width: usize,
}

struct SelectPlan {
    base: Option<Arc<TableDef>>,
    joins: Vec<JoinPlan>,
    where_clause: Option<Expr>,
    out: Vec<OutCol>,
    order_by: Vec<OrderBy>,
    group_by: Vec<Expr>,
    having: Option<Expr>,
    aggs: Vec<AggSpec>,
    limit: i64,
    offset: i64,
}

impl SelectPlan {
    fn needs_buffering(&self) -> bool {
        !self.joins.is_empty()
            || !self.order_by.is_empty()
            || !self.group_by.is_empty()
            || !self.aggs.is_empty()
    }
}

fn build_plan(db: &Database, parsed: &ParsedStmt) -> Result<(SelectPlan, Vec<String>)> {
    let mut layout = Layout::default();
    let mut base = None;
    let mut joins = Vec::new();

    if let Some(table_ref) = parsed.tables.first() {
        let table = db.find_table(&table_ref.name)?;
        let qualifier = table_ref.alias.as_deref().unwrap_or(&table_ref.name);
        layout.extend_with(qualifier, &table);
        base = Some(table);

        for join in &parsed.joins {
            let table = db.find_table(&join.table)?;
            let left_width = layout.cols.len();
            let qualifier = join.alias.as_deref().unwrap_or(&join.table);
            layout.extend_with(qualifier, &table);
            joins.push(JoinPlan {
                join_type: join.join_type,
                right_width: table.columns.len(),
                table,
                on: join.on.clone(),
                left_width,
            });
        }
    }

    // Resolve every expression against the final layout.
    for col in &parsed.columns {
        if let Some(expr) = &col.expr {
            resolve_expr(expr, &layout)?;
        }
    }
    if let Some(expr) = &parsed.where_clause {
        resolve_expr(expr, &layout)?;
    }
    for expr in &parsed.group_by {
        resolve_expr(expr, &layout)?;
    }
    if let Some(expr) = &parsed.having {
        resolve_expr(expr, &layout)?;
    }
    for item in &parsed.order_by {
        resolve_expr(&item.expr, &layout)?;
    }
    for (join, plan) in parsed.joins.iter().zip(joins.iter_mut()) {
        if let Some(on) = &join.on {
            resolve_expr(on, &layout)?;
            plan.on = Some(on.clone());
        }
    }

    // Aggregate slots, assigned before output expressions are cloned.
    let mut aggs = Vec::new();
    for col in &parsed.columns {
        if let Some(expr) = &col.expr {
            assign_agg_slots(expr, &mut aggs);
        }
    }
    if let Some(having) = &parsed.having {
        assign_agg_slots(having, &mut aggs);
    }

    // Projection and output names; `*` expands to the whole layout.
    let mut out = Vec::new();
    let mut names = Vec::new();
    for col in &parsed.columns {
        match &col.expr {
            None => {
                if layout.cols.is_empty() {
                    return Err(db_err(ErrorCode::Error, "'*' without a FROM table"));
                }
                for (idx, layout_col) in layout.cols.iter().enumerate() {
                    out.push(OutCol::Index(idx));
                    names.push(layout_col.name.clone());
                }
            }
            Some(expr) => {
                let name = col
                    .alias
                    .clone()
                    .or_else(|| match expr {
                        Expr::Column { name, .. } => Some(name.clone()),
                        Expr::Function { name, .. } => Some(name.clone()),
                        _ => None,
                    })
                    .unwrap_or_else(|| format!("column{}", names.len()));
                names.push(name);

                match expr {
                    Expr::Column { index, .. } => {
                        out.push(OutCol::Index(index.get().expect("resolved above")));
                    }
                    other => out.push(OutCol::Expr(other.clone())),
                }
            }
        }
    }

    let plan = SelectPlan {
        base,
        joins,
        where_clause: parsed.where_clause.clone(),
        out,
        order_by: parsed.order_by.clone(),
        group_by: parsed.group_by.clone(),
        having: parsed.having.clone(),
        aggs,
        limit: parsed.limit,
        offset: parsed.offset,
    };
    Ok((plan, names))
}

// --- execution state -------------------------------------------------------

enum ExecState {
    NotStarted,
    /// Streaming single-table scan.
    Scan {
        plan: SelectPlan,
        cursor: Cursor,
        matched: i64,
        emitted: i64,
    },
    /// Materialized result, offset/limit applied while yielding.
    Buffered {
        plan: SelectPlan,
        rows: Vec<Vec<Value>>,
        pos: usize,
        emitted: i64,
    },
    /// Pure-expression SELECT with no FROM clause.
    ExprRow { plan: SelectPlan },
    Finished,
}

/// A prepared statement bound to its connection.
pub struct Statement<'db> {
    db: &'db Database,
    #[allow(dead_code)]
    sql: String,
    parsed: ParsedStmt,
    params: Vec<Value>,
    row: Vec<Value>,
    names: Vec<String>,
    executed: bool,
    has_row: bool,
    step_count: i64,
    exec: ExecState,
}

impl<'db> Statement<'db> {
    pub(crate) fn new(db: &'db Database, sql: String, parsed: ParsedStmt) -> Statement<'db> {
        let params = vec![Value::Null; parsed.param_count];
        Statement {
            db,
            sql,
            parsed,
            params,
            row: Vec::new(),
            names: Vec::new(),
            executed: false,
            has_row: false,
            step_count: 0,
            exec: ExecState::NotStarted,
        }
    }

    pub fn param_count(&self) -> usize {
        self.params.len()
    }

    // --- binding ----------------------------------------------------------

    pub fn bind_value(&mut self, idx: usize, value: Value) -> Result<()> {
        if idx == 0 || idx > self.params.len() {
            return Err(db_err(
                ErrorCode::Range,
                format!("bind index {} out of range 1..={}", idx, self.params.len()),
            ));
        }
        self.params[idx - 1] = value;
        Ok(())
    }

    pub fn bind_null(&mut self, idx: usize) -> Result<()> {
        self.bind_value(idx, Value::Null)
    }

    pub fn bind_int(&mut self, idx: usize, value: i32) -> Result<()> {
        self.bind_value(idx, Value::Int(value as i64))
    }

    pub fn bind_int64(&mut self, idx: usize, value: i64) -> Result<()> {
        self.bind_value(idx, Value::Int(value))
    }

    pub fn bind_double(&mut self, idx: usize, value: f64) -> Result<()> {
        self.bind_value(idx, Value::Float(value))
    }

    pub fn bind_text(&mut self, idx: usize, value: &str) -> Result<()> {
        self.bind_value(idx, Value::Text(value.to_string()))
    }

    pub fn bind_blob(&mut self, idx: usize, value: &[u8]) -> Result<()> {
        self.bind_value(idx, Value::Blob(value.to_vec()))
    }

    pub fn bind_json(&mut self, idx: usize, value: &str) -> Result<()> {
        self.bind_value(idx, Value::Json(value.to_string()))
    }

    pub fn bind_vector(&mut self, idx: usize, value: &[f32]) -> Result<()> {
        self.bind_value(idx, Value::Vector(value.to_vec()))
    }

    // --- column access ----------------------------------------------------

    pub fn column_count(&self) -> usize {
        self.names.len()
    }

    pub fn column_name(&self, idx: usize) -> Option<&str> {
        self.names.get(idx).map(|s| s.as_str())
    }

    pub fn column_type(&self, idx: usize) -> ValueType {
        self.row
            .get(idx)
            .map(|v| v.value_type())
            .unwrap_or(ValueType::Null)
    }

    pub fn column_value(&self, idx: usize) -> Option<&Value> {
        self.row.get(idx)
    }

    pub fn column_int64(&self, idx: usize) -> i64 {
        match self.row.get(idx) {
            Some(Value::Int(i)) => *i,
            Some(Value::Float(f)) => *f as i64,
            Some(Value::Text(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn column_double(&self, idx: usize) -> f64 {
        match self.row.get(idx) {
            Some(Value::Int(i)) => *i as f64,
            Some(Value::Float(f)) => *f,
            Some(Value::Text(s)) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    pub fn column_text(&self, idx: usize) -> Option<String> {
        self.row
            .get(idx)
            .and_then(|v| v.to_text().map(|c| c.into_owned()))
    }

    pub fn column_blob(&self, idx: usize) -> Option<&[u8]> {
        match self.row.get(idx) {
            Some(Value::Blob(b)) => Some(b.as_slice()),
            _ => None,
        }
    }

    // --- stepping ---------------------------------------------------------

    /// Advances one row (`Row`) or finishes (`Done`).
    pub fn step(&mut self) -> Result<StepResult> {
        let result = self.step_inner();
        self.db.note_result(&result);
        result
    }

    /// Re-arms the statement; bound parameters are retained.
    pub fn reset(&mut self) -> Result<()> {
        self.executed = false;
        self.has_row = false;
        self.step_count = 0;
        self.exec = ExecState::NotStarted;
        self.row.clear();
        Ok(())
    }

    fn step_inner(&mut self) -> Result<StepResult> {
        match self.parsed.kind() {
            StmtKind::Select => self.step_select(),
            StmtKind::Insert => self.run_once(Self::execute_insert),
            StmtKind::Update => self.run_once(Self::execute_update),
            StmtKind::Delete => self.run_once(Self::execute_delete),
            StmtKind::CreateTable => self.run_once(Self::execute_create_table),
            StmtKind::DropTable => self.run_once(Self::execute_drop_table),
            StmtKind::CreateIndex => self.run_once(Self::execute_create_index),
            StmtKind::DropIndex => self.run_once(Self::execute_drop_index),
            StmtKind::Begin => self.run_once(|s| s.db.begin()),
            StmtKind::Commit => self.run_once(|s| s.db.commit()),
            StmtKind::Rollback => self.run_once(|s| s.db.rollback()),
            StmtKind::Savepoint => self.run_once(|s| {
                let name = s.savepoint_name()?;
                s.db.savepoint(&name)
            }),
            StmtKind::Release => self.run_once(|s| {
                let name = s.savepoint_name()?;
                s.db.release(&name)
            }),
            StmtKind::RollbackTo => self.run_once(|s| {
                let name = s.savepoint_name()?;
                s.db.rollback_to(&name)
            }),
        }
    }

    fn savepoint_name(&self) -> Result<String> {
        self.parsed
            .savepoint_name
            .clone()
            .ok_or_else(|| db_err(ErrorCode::Misuse, "statement carries no savepoint name"))
    }

    fn run_once(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<StepResult> {
        if self.executed {
            return Ok(StepResult::Done);
        }
        self.executed = true;
        f(self)?;
        Ok(StepResult::Done)
    }

    // --- SELECT -----------------------------------------------------------

    fn step_select(&mut self) -> Result<StepResult> {
        if !self.executed {
            self.init_select()?;
            self.executed = true;
        }

        enum Next {
            Row(Vec<Value>),
            Finished,
            AlreadyDone,
        }

        let params = std::mem::take(&mut self.params);
        let next = (|| -> Result<Next> {
            match &mut self.exec {
                ExecState::ExprRow { plan } => {
                    if self.has_row {
                        return Ok(Next::Finished);
                    }
                    let ctx = EvalCtx {
                        row: None,
                        params: &params,
                        aggs: None,
                    };
                    let mut row = Vec::with_capacity(plan.out.len());
                    for out in &plan.out {
                        row.push(match out {
                            OutCol::Index(_) => Value::Null,
                            OutCol::Expr(expr) => eval(expr, &ctx)?,
                        });
                    }
                    Ok(Next::Row(row))
                }

                ExecState::Scan {
                    plan,
                    cursor,
                    matched,
                    emitted,
                } => loop {
                    if !cursor.is_valid() {
                        return Ok(Next::Finished);
                    }

                    let value = cursor.value()?;
                    cursor.next()?;
                    let source = decode_row(&value)?;

                    let ctx = EvalCtx {
                        row: Some(&source),
                        params: &params,
                        aggs: None,
                    };
                    if let Some(filter) = &plan.where_clause {
                        if !is_truthy(&eval(filter, &ctx)?) {
                            continue;
                        }
                    }

                    *matched += 1;
                    if *matched <= plan.offset {
                        continue;
                    }
                    if plan.limit >= 0 && *emitted >= plan.limit {
                        return Ok(Next::Finished);
                    }

                    let mut row = Vec::with_capacity(plan.out.len());
                    for out in &plan.out {
                        row.push(match out {
                            OutCol::Index(idx) => source.get(*idx).cloned().unwrap_or(Value::Null),
                            OutCol::Expr(expr) => eval(expr, &ctx)?,
                        });
                    }
                    *emitted += 1;
                    return Ok(Next::Row(row));
                },

                ExecState::Buffered {
                    plan,
                    rows,
                    pos,
                    emitted,
                } => {
                    // OFFSET skipping, then LIMIT enforcement, off the buffer.
                    while (*pos as i64) < plan.offset && *pos < rows.len() {
                        *pos += 1;
                    }
                    if *pos >= rows.len() || (plan.limit >= 0 && *emitted >= plan.limit) {
                        return Ok(Next::Finished);
                    }

                    let row = std::mem::take(&mut rows[*pos]);
                    *pos += 1;
                    *emitted += 1;
                    Ok(Next::Row(row))
                }

                ExecState::Finished => Ok(Next::AlreadyDone),
                ExecState::NotStarted => unreachable!("initialized above"),
            }
        })();
        self.params = params;

        match next? {
            Next::Row(row) => {
                self.row = row;
                self.has_row = true;
                self.step_count += 1;
                Ok(StepResult::Row)
            }
            Next::Finished => {
                self.exec = ExecState::Finished;
                Ok(StepResult::Done)
            }
            Next::AlreadyDone => Ok(StepResult::Done),
        }
    }

    fn init_select(&mut self) -> Result<()> {
        let (plan, names) = build_plan(self.db, &self.parsed)?;
        self.names = names;

        let Some(base) = plan.base.clone() else {
            self.exec = ExecState::ExprRow { plan };
            return Ok(());
        };

        if plan.needs_buffering() {
            let rows = self.materialize(&plan)?;
            self.exec = ExecState::Buffered {
                plan,
                rows,
                pos: 0,
                emitted: 0,
            };
        } else {
            let mut cursor = base.tree.cursor();
            cursor.first()?;
            self.exec = ExecState::Scan {
                plan,
                cursor,
                matched: 0,
                emitted: 0,
            };
        }
        Ok(())
    }

    /// Buffered pipeline: scan, join, filter, group/aggregate or project,
    /// sort. Returns fully projected rows in output order.
    fn materialize(&self, plan: &SelectPlan) -> Result<Vec<Vec<Value>>> {
        let base = plan.base.as_ref().expect("buffered select has a table");
        let mut rows = scan_all(&base.tree, base.columns.len())?;

        for join in &plan.joins {
            let right_rows = scan_all(&join.table.tree, join.table.columns.len())?;
            rows = self.apply_join(rows, &right_rows, join)?;
        }

        if let Some(filter) = &plan.where_clause {
            let mut kept = Vec::with_capacity(rows.len());
            for row in rows {
                let ctx = EvalCtx {
                    row: Some(&row),
                    params: &self.params,
                    aggs: None,
                };
                if is_truthy(&eval(filter, &ctx)?) {
                    kept.push(row);
                }
            }
            rows = kept;
        }

        let mut output: Vec<(Vec<Value>, Vec<Value>)> = if !plan.aggs.is_empty()
            || !plan.group_by.is_empty()
        {
            self.aggregate_rows(plan, rows)?
        } else {
            let mut out = Vec::with_capacity(rows.len());
            for row in &rows {
                let ctx = EvalCtx {
                    row: Some(row),
                    params: &self.params,
                    aggs: None,
                };
                out.push((self.project(plan, &ctx)?, self.sort_keys(plan, &ctx)?));
            }
            out
        };

        if !plan.order_by.is_empty() {
            // Stable sort; the comparator closes over the ORDER BY plan.
            let order = &plan.order_by;
            output.sort_by(|a, b| {
                for (i, item) in order.iter().enumerate() {
                    let ord = a.1[i].cmp_sql(&b.1[i]);
                    let ord = if item.desc { ord.reverse() } else { ord };
                    if ord != std::cmp::Ordering::Equal {
                        return ord;
                    }
                }
                std::cmp::Ordering::Equal
            });
        }

        Ok(output.into_iter().map(|(row, _)| row).collect())
    }

    /// Hash partitioning: one aggregate state vector per distinct GROUP BY
    /// key (a single implicit group without GROUP BY), then one output row
    /// per group surviving HAVING.
    fn aggregate_rows(
        &self,
        plan: &SelectPlan,
        rows: Vec<Vec<Value>>,
    ) -> Result<Vec<(Vec<Value>, Vec<Value>)>> {
        struct Group {
            aggs: Vec<AggState>,
            rep: Option<Vec<Value>>,
        }

        let mut lookup: HashMap<Vec<u8>, usize> = HashMap::new();
        let mut groups: Vec<Group> = Vec::new();

        for row in rows {
            let ctx = EvalCtx {
                row: Some(&row),
                params: &self.params,
                aggs: None,
            };

            let key = if plan.group_by.is_empty() {
                Vec::new()
            } else {
                let mut key_values = Vec::with_capacity(plan.group_by.len());
                for expr in &plan.group_by {
                    key_values.push(eval(expr, &ctx)?);
                }
                let mut key = Vec::new();
                encode_values(&mut key, &key_values);
                key
            };

            let group_idx = match lookup.get(&key) {
                Some(&idx) => idx,
                None => {
                    let idx = groups.len();
                    lookup.insert(key, idx);
                    groups.push(Group {
                        aggs: vec![AggState::default(); plan.aggs.len()],
                        rep: Some(row.clone()),
                    });
                    idx
                }
            };

            let group = &mut groups[group_idx];
            for (spec, state) in plan.aggs.iter().zip(group.aggs.iter_mut()) {
                match &spec.arg {
                    None => state.count += 1, // COUNT(*)
                    Some(arg) => {
                        let value = eval(arg, &ctx)?;
                        state.accumulate(&value);
                    }
                }
            }
        }

        // Aggregates over an empty input still produce one summary row.
        if groups.is_empty() && plan.group_by.is_empty() {
            groups.push(Group {
                aggs: vec![AggState::default(); plan.aggs.len()],
                rep: None,
            });
        }

        let mut output = Vec::with_capacity(groups.len());
        for group in &groups {
            let ctx = EvalCtx {
                row: group.rep.as_deref(),
                params: &self.params,
                aggs: Some(&group.aggs),
            };
            if let Some(having) = &plan.having {
                if !is_truthy(&eval(having, &ctx)?) {
                    continue;
                }
            }
            output.push((self.project(plan, &ctx)?, self.sort_keys(plan, &ctx)?));
        }
        Ok(output)
    }

    fn project(&self, plan: &SelectPlan, ctx: &EvalCtx<'_>) -> Result<Vec<Value>> {
        let mut row = Vec::with_capacity(plan.out.len());
        for out in &plan.out {
            row.push(match out {
                OutCol::Index(idx) => ctx
                    .row
                    .and_then(|r| r.get(*idx))
                    .cloned()
                    .unwrap_or(Value::Null),
                OutCol::Expr(expr) => eval(expr, ctx)?,
            });
        }
        Ok(row)
    }

    fn sort_keys(&self, plan: &SelectPlan, ctx: &EvalCtx<'_>) -> Result<Vec<Value>> {
        let mut keys = Vec::with_capacity(plan.order_by.len());
        for item in &plan.order_by {
            keys.push(eval(&item.expr, ctx)?);
        }
        Ok(keys)
    }

    /// Nested-loop join of the accumulated left rows against one table.
    fn apply_join(
        &self,
        left_rows: Vec<Vec<Value>>,
        right_rows: &[Vec<Value>],
        join: &JoinPlan,
    ) -> Result<Vec<Vec<Value>>> {
        let mut out = Vec::new();
        let mut right_matched = vec![false; right_rows.len()];

        for left in &left_rows {
            let mut matched = false;
            for (ri, right) in right_rows.iter().enumerate() {
                let mut combined = left.clone();
                combined.extend(right.iter().cloned());

                let passes = match &join.on {
                    Some(on) => {
                        let ctx = EvalCtx {
                            row: Some(&combined),
                            params: &self.params,
                            aggs: None,
                        };
                        is_truthy(&eval(on, &ctx)?)
                    }
                    None => true,
                };

                if passes {
                    matched = true;
                    right_matched[ri] = true;
                    out.push(combined);
                }
            }

            if join.join_type == JoinType::Left && !matched {
                let mut combined = left.clone();
                combined.extend(std::iter::repeat(Value::Null).take(join.right_width));
                out.push(combined);
            }
        }

        if join.join_type == JoinType::Right {
            for (ri, right) in right_rows.iter().enumerate() {
                if !right_matched[ri] {
                    let mut combined: Vec<Value> = std::iter::repeat(Value::Null)
                        .take(join.left_width)
                        .collect();
                    combined.extend(right.iter().cloned());
                    out.push(combined);
                }
            }
        }

        Ok(out)
    }

    // --- DML ----------------------------------------------------------------

    fn execute_insert(&mut self) -> Result<()> {
        let table = self.db.find_table(&self.table_name()?)?;
        self.db.note_write()?;

        // Map VALUES positions onto table columns.
        let mapping: Vec<usize> = if self.parsed.insert_columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            self.parsed
                .insert_columns
                .iter()
                .map(|name| {
                    table.column_index(name).ok_or_else(|| {
                        db_err(ErrorCode::Error, format!("no such column: {}", name))
                    })
                })
                .collect::<Result<_>>()?
        };

        let mut inserted = 0i64;
        for row_exprs in &self.parsed.insert_rows {
            if row_exprs.len() > mapping.len() {
                return Err(db_err(
                    ErrorCode::Error,
                    format!(
                        "{} values supplied for {} columns",
                        row_exprs.len(),
                        mapping.len()
                    ),
                ));
            }

            let ctx = EvalCtx {
                row: None,
                params: &self.params,
                aggs: None,
            };
            let mut values = vec![Value::Null; table.columns.len()];
            for (expr, &col) in row_exprs.iter().zip(mapping.iter()) {
                values[col] = eval(expr, &ctx)?;
            }

            for (column, value) in table.columns.iter().zip(values.iter()) {
                if column.flags & col_flags::NOT_NULL != 0 && value.is_null() {
                    return Err(db_err(
                        ErrorCode::Constraint,
                        format!("NOT NULL constraint failed: {}.{}", table.name, column.name),
                    ));
                }
            }

            let rowid = self.db.next_rowid();
            table
                .tree
                .insert(&rowid_key(rowid), &encode_row(&values))
                .wrap_err_with(|| format!("inserting row {} into {}", rowid, table.name))?;
            if let Err(e) = insert_index_entries(self.db, &table, rowid, &values) {
                // Undo the row so a failed unique check leaves no orphan.
                table.tree.delete(&rowid_key(rowid)).ok();
                return Err(e);
            }
            inserted += 1;
        }

        self.db.add_changes(inserted);
        self.db.autocommit()
    }

    fn execute_update(&mut self) -> Result<()> {
        let table = self.db.find_table(&self.table_name()?)?;
        self.db.note_write()?;

        // Resolve SET targets and expressions against the table layout.
        let mut layout = Layout::default();
        layout.extend_with(&table.name, &table);
        if let Some(filter) = &self.parsed.where_clause {
            resolve_expr(filter, &layout)?;
        }
        let mut sets: Vec<(usize, &Expr)> = Vec::new();
        for (name, expr) in &self.parsed.update_sets {
            let idx = table
                .column_index(name)
                .ok_or_else(|| db_err(ErrorCode::Error, format!("no such column: {}", name)))?;
            resolve_expr(expr, &layout)?;
            sets.push((idx, expr));
        }

        // Phase one: collect matching rows.
        let mut pending: Vec<(Vec<u8>, Vec<Value>, Vec<Value>)> = Vec::new();
        {
            let mut cursor = table.tree.cursor();
            cursor.first()?;
            while cursor.is_valid() {
                let (key, value) = cursor.entry()?;
                cursor.next()?;
                let old = decode_row(&value)?;

                let passes = match &self.parsed.where_clause {
                    Some(filter) => {
                        let ctx = EvalCtx {
                            row: Some(&old),
                            params: &self.params,
                            aggs: None,
                        };
                        is_truthy(&eval(filter, &ctx)?)
                    }
                    None => true,
                };
                if !passes {
                    continue;
                }

                // SET expressions see the row as it is being updated.
                let mut new = old.clone();
                for (idx, expr) in &sets {
                    let ctx = EvalCtx {
                        row: Some(&new),
                        params: &self.params,
                        aggs: None,
                    };
                    let value = eval(expr, &ctx)?;
                    if *idx < new.len() {
                        new[*idx] = value;
                    }
                }
                pending.push((key, old, new));
            }
        }

        // Phase two: rewrite under the same keys.
        let updated = pending.len() as i64;
        for (key, old, new) in pending {
            let rowid = rowid_from_key(&key);
            table.tree.delete(&key)?;
            remove_index_entries(self.db, &table, rowid, &old)?;
            table
                .tree
                .insert(&key, &encode_row(&new))
                .wrap_err_with(|| format!("rewriting row {} in {}", rowid, table.name))?;
            insert_index_entries(self.db, &table, rowid, &new)?;
        }

        self.db.add_changes(updated);
        self.db.autocommit()
    }

    fn execute_delete(&mut self) -> Result<()> {
        let table = self.db.find_table(&self.table_name()?)?;
        self.db.note_write()?;

        let mut layout = Layout::default();
        layout.extend_with(&table.name, &table);
        if let Some(filter) = &self.parsed.where_clause {
            resolve_expr(filter, &layout)?;
        }

        let mut doomed: Vec<(Vec<u8>, Vec<Value>)> = Vec::new();
        {
            let mut cursor = table.tree.cursor();
            cursor.first()?;
            while cursor.is_valid() {
                let (key, value) = cursor.entry()?;
                cursor.next()?;
                let row = decode_row(&value)?;

                let passes = match &self.parsed.where_clause {
                    Some(filter) => {
                        let ctx = EvalCtx {
                            row: Some(&row),
                            params: &self.params,
                            aggs: None,
                        };
                        is_truthy(&eval(filter, &ctx)?)
                    }
                    None => true,
                };
                if passes {
                    doomed.push((key, row));
                }
            }
        }

        let deleted = doomed.len() as i64;
        for (key, row) in doomed {
            let rowid = rowid_from_key(&key);
            table.tree.delete(&key)?;
            remove_index_entries(self.db, &table, rowid, &row)?;
        }

        self.db.add_changes(deleted);
        self.db.autocommit()
    }

    // --- DDL ----------------------------------------------------------------

    fn execute_create_table(&mut self) -> Result<()> {
        let new_table = self
            .parsed
            .new_table
            .as_ref()
            .ok_or_else(|| db_err(ErrorCode::Misuse, "CREATE TABLE without a definition"))?
            .clone();
        self.db.note_write()?;

        {
            let mut schema = self.db.schema_write()?;
            if schema.table(&new_table.name).is_some() {
                return Err(db_err(
                    ErrorCode::Error,
                    format!("table '{}' already exists", new_table.name),
                ));
            }

            let tree = Arc::new(BTree::create(Arc::clone(self.db.allocator()))?);
            schema.tables.push(Arc::new(TableDef {
                name: new_table.name,
                columns: new_table.columns,
                flags: 0,
                tree,
            }));
        }

        self.db.add_changes(0);
        self.db.autocommit()
    }

    fn execute_drop_table(&mut self) -> Result<()> {
        let name = self
            .parsed
            .target_name
            .clone()
            .ok_or_else(|| db_err(ErrorCode::Misuse, "DROP TABLE without a name"))?;
        self.db.note_write()?;

        {
            let mut schema = self.db.schema_write()?;
            let idx = schema
                .tables
                .iter()
                .position(|t| t.name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| db_err(ErrorCode::Error, format!("no such table: {}", name)))?;

            // Indices over the table go with it.
            let mut kept = Vec::new();
            for index in schema.indices.drain(..) {
                if index.table_name.eq_ignore_ascii_case(&name) {
                    index.tree.free_pages()?;
                } else {
                    kept.push(index);
                }
            }
            schema.indices = kept;

            let table = schema.tables.remove(idx);
            table.tree.free_pages()?;
        }

        self.db.add_changes(0);
        self.db.autocommit()
    }

    fn execute_create_index(&mut self) -> Result<()> {
        let def: NewIndex = self
            .parsed
            .new_index
            .as_ref()
            .ok_or_else(|| db_err(ErrorCode::Misuse, "CREATE INDEX without a definition"))?
            .clone();
        let table = self.db.find_table(&def.table)?;
        self.db.note_write()?;

        let columns: Vec<u32> = def
            .columns
            .iter()
            .map(|name| {
                table
                    .column_index(name)
                    .map(|i| i as u32)
                    .ok_or_else(|| db_err(ErrorCode::Error, format!("no such column: {}", name)))
            })
            .collect::<Result<_>>()?;

        {
            let schema = self.db.schema_read()?;
            if schema.indices.iter().any(|i| i.name.eq_ignore_ascii_case(&def.name)) {
                return Err(db_err(
                    ErrorCode::Error,
                    format!("index '{}' already exists", def.name),
                ));
            }
        }

        let index = IndexDef {
            name: def.name,
            table_name: table.name.clone(),
            columns,
            flags: if def.unique { index_flags::UNIQUE } else { 0 },
            tree: Arc::new(BTree::create(Arc::clone(self.db.allocator()))?),
        };

        // Populate synchronously from the existing rows.
        let populate = (|| -> Result<()> {
            let mut cursor = table.tree.cursor();
            cursor.first()?;
            while cursor.is_valid() {
                let (key, value) = cursor.entry()?;
                cursor.next()?;
                let rowid = rowid_from_key(&key);
                let row = decode_row(&value)?;
                index_insert(&index, rowid, &row)?;
            }
            Ok(())
        })();
        if let Err(e) = populate {
            index.tree.free_pages().ok();
            return Err(e).wrap_err_with(|| format!("building index '{}'", index.name));
        }

        self.db.schema_write()?.indices.push(index);
        self.db.add_changes(0);
        self.db.autocommit()
    }

    fn execute_drop_index(&mut self) -> Result<()> {
        let name = self
            .parsed
            .target_name
            .clone()
            .ok_or_else(|| db_err(ErrorCode::Misuse, "DROP INDEX without a name"))?;
        self.db.note_write()?;

        {
            let mut schema = self.db.schema_write()?;
            let idx = schema
                .indices
                .iter()
                .position(|i| i.name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| db_err(ErrorCode::Error, format!("no such index: {}", name)))?;
            let index = schema.indices.remove(idx);
            index.tree.free_pages()?;
        }

        self.db.add_changes(0);
        self.db.autocommit()
    }

    fn table_name(&self) -> Result<String> {
        self.parsed
            .tables
            .first()
            .map(|t| t.name.clone())
            .ok_or_else(|| db_err(ErrorCode::Misuse, "statement has no target table"))
    }
}

/// Scans every row of a table, padding short rows to the column count.
fn scan_all(tree: &Arc<BTree>, width: usize) -> Result<Vec<Vec<Value>>> {
    let mut rows = Vec::new();
    let mut cursor = tree.cursor();
    cursor.first()?;
    while cursor.is_valid() {
        let value = cursor.value()?;
        cursor.next()?;
        let mut row = decode_row(&value)?;
        row.resize(width, Value::Null);
        rows.push(row);
    }
    Ok(rows)
}

/// Key for a secondary index entry: the encoded indexed column values,
/// with the rowid appended for non-unique indices so duplicates coexist.
fn index_entry_key(index: &IndexDef, rowid: i64, row: &[Value]) -> Vec<u8> {
    let cols: Vec<Value> = index
        .columns
        .iter()
        .map(|&c| row.get(c as usize).cloned().unwrap_or(Value::Null))
        .collect();
    let mut key = Vec::new();
    encode_values(&mut key, &cols);
    if !index.is_unique() {
        key.extend_from_slice(&rowid_key(rowid));
    }
    key
}

fn index_insert(index: &IndexDef, rowid: i64, row: &[Value]) -> Result<()> {
    let key = index_entry_key(index, rowid, row);
    index.tree.insert(&key, &rowid_key(rowid)).map_err(|e| {
        if ErrorCode::of(&e) == ErrorCode::Constraint {
            db_err(
                ErrorCode::Constraint,
                format!("UNIQUE constraint failed: index '{}'", index.name),
            )
        } else {
            e
        }
    })
}

fn insert_index_entries(
    db: &Database,
    table: &Arc<TableDef>,
    rowid: i64,
    row: &[Value],
) -> Result<()> {
    let schema = db.schema_read()?;
    for index in schema
        .indices
        .iter()
        .filter(|i| i.table_name.eq_ignore_ascii_case(&table.name))
    {
        index_insert(index, rowid, row)?;
    }
    Ok(())
}

fn remove_index_entries(
    db: &Database,
    table: &Arc<TableDef>,
    rowid: i64,
    row: &[Value],
) -> Result<()> {
    let schema = db.schema_read()?;
    for index in schema
        .indices
        .iter()
        .filter(|i| i.table_name.eq_ignore_ascii_case(&table.name))
    {
        index.tree.delete(&index_entry_key(index, rowid, row))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rowid_keys_sort_numerically() {
        let ids = [-5i64, -1, 0, 1, 2, 100, i64::MAX];
        let keys: Vec<[u8; 8]> = ids.iter().map(|&i| rowid_key(i)).collect();
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1]);
        }
        for &id in &ids {
            assert_eq!(rowid_from_key(&rowid_key(id)), id);
        }
    }

    #[test]
    fn like_patterns() {
        assert!(like_match(b"hello", b"hello"));
        assert!(like_match(b"hello", b"h%"));
        assert!(like_match(b"hello", b"%llo"));
        assert!(like_match(b"hello", b"h_llo"));
        assert!(like_match(b"HELLO", b"hello"));
        assert!(like_match(b"", b"%"));
        assert!(!like_match(b"hello", b"h_lo"));
        assert!(!like_match(b"hello", b"world"));
        assert!(like_match(b"abc", b"%b%"));
    }

    #[test]
    fn binary_null_propagation() {
        let ctx = EvalCtx {
            row: None,
            params: &[],
            aggs: None,
        };
        let expr = Expr::Binary {
            op: BinaryOp::Add,
            left: Box::new(Expr::Literal(Value::Int(1))),
            right: Box::new(Expr::Literal(Value::Null)),
        };
        assert_eq!(eval(&expr, &ctx).unwrap(), Value::Null);

        // IS NULL does not propagate.
        let expr = Expr::Unary {
            op: UnaryOp::IsNull,
            operand: Box::new(Expr::Literal(Value::Null)),
        };
        assert_eq!(eval(&expr, &ctx).unwrap(), Value::Int(1));
    }

    #[test]
    fn arithmetic_types() {
        assert_eq!(
            eval_binary(BinaryOp::Add, &Value::Int(2), &Value::Int(3)),
            Value::Int(5)
        );
        assert_eq!(
            eval_binary(BinaryOp::Add, &Value::Int(2), &Value::Float(0.5)),
            Value::Float(2.5)
        );
        assert_eq!(
            eval_binary(BinaryOp::Div, &Value::Int(7), &Value::Int(2)),
            Value::Int(3)
        );
        assert_eq!(
            eval_binary(BinaryOp::Div, &Value::Int(1), &Value::Int(0)),
            Value::Null
        );
        assert_eq!(
            eval_binary(BinaryOp::Div, &Value::Float(1.0), &Value::Float(0.0)),
            Value::Null
        );
    }

    #[test]
    fn aggregate_state_tracks_extremes() {
        let mut state = AggState::default();
        for v in [3.0, -1.0, 7.0] {
            state.accumulate(&Value::Float(v));
        }
        state.accumulate(&Value::Null); // counted, not summed

        assert_eq!(state.finalize(AggKind::Count), Value::Int(4));
        assert_eq!(state.finalize(AggKind::Sum), Value::Float(9.0));
        assert_eq!(state.finalize(AggKind::Min), Value::Float(-1.0));
        assert_eq!(state.finalize(AggKind::Max), Value::Float(7.0));
        assert_eq!(state.finalize(AggKind::Avg), Value::Float(2.25));
    }

    #[test]
    fn empty_aggregate_finalization() {
        let state = AggState::default();
        assert_eq!(state.finalize(AggKind::Count), Value::Int(0));
        assert_eq!(state.finalize(AggKind::Sum), Value::Float(0.0));
        assert_eq!(state.finalize(AggKind::Avg), Value::Null);
        assert_eq!(state.finalize(AggKind::Min), Value::Null);
        assert_eq!(state.finalize(AggKind::Max), Value::Null);
    }
}
