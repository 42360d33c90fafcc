//! # SQL Parser
//!
//! Recursive descent over the lexer, one statement per call. Expression
//! precedence, loosest first: OR, AND, comparison (including `IS [NOT]
//! NULL` and `LIKE`), additive, multiplicative, unary. The first error
//! stops the parse and is reported with its line number; the caller can
//! continue with the next statement via the returned tail offset.

use eyre::Result;

use crate::database::schema::ColumnDef;
use crate::error::{db_err, ErrorCode};
use crate::types::{col_flags, Value, ValueType};

use super::ast::{
    BinaryOp, Expr, JoinClause, JoinType, NewIndex, NewTable, OrderBy, ParsedStmt, SelectCol,
    StmtKind, TableRef, UnaryOp,
};
use super::lexer::Lexer;
use super::token::{Keyword, Token};

pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token<'a>,
    params: usize,
}

impl<'a> Parser<'a> {
    pub fn new(sql: &'a str) -> Parser<'a> {
        let mut lexer = Lexer::new(sql);
        let current = lexer.next_token();
        Parser {
            lexer,
            current,
            params: 0,
        }
    }

    /// Byte offset of the first unconsumed token; the statement tail.
    pub fn tail_offset(&self) -> usize {
        self.lexer.token_start()
    }

    /// Parses one statement. `None` when only separators remain.
    pub fn parse_statement(&mut self) -> Result<Option<ParsedStmt>> {
        while matches!(self.current, Token::Semicolon) {
            self.advance()?;
        }
        if self.current.is_eof() {
            return Ok(None);
        }

        self.params = 0;
        let mut stmt = match self.current.clone() {
            Token::Keyword(Keyword::Select) => self.parse_select()?,
            Token::Keyword(Keyword::Insert) => self.parse_insert()?,
            Token::Keyword(Keyword::Update) => self.parse_update()?,
            Token::Keyword(Keyword::Delete) => self.parse_delete()?,
            Token::Keyword(Keyword::Create) => self.parse_create()?,
            Token::Keyword(Keyword::Drop) => self.parse_drop()?,
            Token::Keyword(Keyword::Begin) => {
                self.advance()?;
                self.accept_keyword(Keyword::Transaction)?;
                ParsedStmt::new(StmtKind::Begin)
            }
            Token::Keyword(Keyword::Commit) => {
                self.advance()?;
                ParsedStmt::new(StmtKind::Commit)
            }
            Token::Keyword(Keyword::Rollback) => self.parse_rollback()?,
            Token::Keyword(Keyword::Savepoint) => {
                self.advance()?;
                let mut stmt = ParsedStmt::new(StmtKind::Savepoint);
                stmt.savepoint_name = Some(self.expect_ident("savepoint name")?);
                stmt
            }
            Token::Keyword(Keyword::Release) => {
                self.advance()?;
                self.accept_keyword(Keyword::Savepoint)?;
                let mut stmt = ParsedStmt::new(StmtKind::Release);
                stmt.savepoint_name = Some(self.expect_ident("savepoint name")?);
                stmt
            }
            other => return Err(self.error(format!("unexpected token {:?}", other))),
        };

        // Optional statement terminator.
        if matches!(self.current, Token::Semicolon) {
            self.advance()?;
        }

        stmt.param_count = self.params;
        Ok(Some(stmt))
    }

    // --- statements -------------------------------------------------------

    fn parse_select(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // SELECT
        let mut stmt = ParsedStmt::new(StmtKind::Select);

        loop {
            if matches!(self.current, Token::Star) {
                self.advance()?;
                stmt.columns.push(SelectCol {
                    expr: None,
                    alias: None,
                });
            } else {
                let expr = self.parse_expr()?;
                let alias = self.parse_alias()?;
                stmt.columns.push(SelectCol {
                    expr: Some(expr),
                    alias,
                });
            }
            if !self.accept(&Token::Comma)? {
                break;
            }
        }

        if self.accept_keyword(Keyword::From)? {
            let name = self.expect_ident("table name")?;
            let alias = self.parse_alias()?;
            stmt.tables.push(TableRef { name, alias });

            loop {
                if self.accept(&Token::Comma)? {
                    // Comma list: a cross join in disguise.
                    let name = self.expect_ident("table name")?;
                    let alias = self.parse_alias()?;
                    stmt.joins.push(JoinClause {
                        join_type: JoinType::Cross,
                        table: name,
                        alias,
                        on: None,
                    });
                    continue;
                }

                let join_type = if self.accept_keyword(Keyword::Left)? {
                    self.accept_keyword(Keyword::Outer)?;
                    self.expect_keyword(Keyword::Join)?;
                    Some(JoinType::Left)
                } else if self.accept_keyword(Keyword::Right)? {
                    self.accept_keyword(Keyword::Outer)?;
                    self.expect_keyword(Keyword::Join)?;
                    Some(JoinType::Right)
                } else if self.accept_keyword(Keyword::Inner)? {
                    self.expect_keyword(Keyword::Join)?;
                    Some(JoinType::Inner)
                } else if self.accept_keyword(Keyword::Join)? {
                    Some(JoinType::Inner)
                } else {
                    None
                };

                let Some(join_type) = join_type else { break };
                let table = self.expect_ident("table name")?;
                let alias = self.parse_alias()?;
                let on = if self.accept_keyword(Keyword::On)? {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                stmt.joins.push(JoinClause {
                    join_type,
                    table,
                    alias,
                    on,
                });
            }
        }

        if self.accept_keyword(Keyword::Where)? {
            stmt.where_clause = Some(self.parse_expr()?);
        }

        if self.accept_keyword(Keyword::Group)? {
            self.expect_keyword(Keyword::By)?;
            loop {
                stmt.group_by.push(self.parse_expr()?);
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
        }

        if self.accept_keyword(Keyword::Having)? {
            stmt.having = Some(self.parse_expr()?);
        }

        if self.accept_keyword(Keyword::Order)? {
            self.expect_keyword(Keyword::By)?;
            loop {
                let expr = self.parse_expr()?;
                let desc = if self.accept_keyword(Keyword::Desc)? {
                    true
                } else {
                    self.accept_keyword(Keyword::Asc)?;
                    false
                };
                stmt.order_by.push(OrderBy { expr, desc });
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
        }

        if self.accept_keyword(Keyword::Limit)? {
            stmt.limit = self.expect_integer("LIMIT count")?;
            if self.accept_keyword(Keyword::Offset)? {
                stmt.offset = self.expect_integer("OFFSET count")?;
            }
        }

        Ok(stmt)
    }

    fn parse_insert(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // INSERT
        self.expect_keyword(Keyword::Into)?;
        let mut stmt = ParsedStmt::new(StmtKind::Insert);
        let name = self.expect_ident("table name")?;
        stmt.tables.push(TableRef { name, alias: None });

        if self.accept(&Token::LParen)? {
            loop {
                stmt.insert_columns.push(self.expect_ident("column name")?);
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
            self.expect(&Token::RParen, "')' after column list")?;
        }

        self.expect_keyword(Keyword::Values)?;
        loop {
            self.expect(&Token::LParen, "'(' before row values")?;
            let mut row = Vec::new();
            if !matches!(self.current, Token::RParen) {
                loop {
                    row.push(self.parse_expr()?);
                    if !self.accept(&Token::Comma)? {
                        break;
                    }
                }
            }
            self.expect(&Token::RParen, "')' after row values")?;
            stmt.insert_rows.push(row);
            if !self.accept(&Token::Comma)? {
                break;
            }
        }

        Ok(stmt)
    }

    fn parse_update(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // UPDATE
        let mut stmt = ParsedStmt::new(StmtKind::Update);
        let name = self.expect_ident("table name")?;
        stmt.tables.push(TableRef { name, alias: None });

        self.expect_keyword(Keyword::Set)?;
        loop {
            let column = self.expect_ident("column name")?;
            self.expect(&Token::Eq, "'=' in SET clause")?;
            let value = self.parse_expr()?;
            stmt.update_sets.push((column, value));
            if !self.accept(&Token::Comma)? {
                break;
            }
        }

        if self.accept_keyword(Keyword::Where)? {
            stmt.where_clause = Some(self.parse_expr()?);
        }
        Ok(stmt)
    }

    fn parse_delete(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // DELETE
        self.expect_keyword(Keyword::From)?;
        let mut stmt = ParsedStmt::new(StmtKind::Delete);
        let name = self.expect_ident("table name")?;
        stmt.tables.push(TableRef { name, alias: None });

        if self.accept_keyword(Keyword::Where)? {
            stmt.where_clause = Some(self.parse_expr()?);
        }
        Ok(stmt)
    }

    fn parse_create(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // CREATE

        let unique = self.accept_keyword(Keyword::Unique)?;
        if unique || matches!(self.current, Token::Keyword(Keyword::Index)) {
            self.expect_keyword(Keyword::Index)?;
            let name = self.expect_ident("index name")?;
            self.expect_keyword(Keyword::On)?;
            let table = self.expect_ident("table name")?;
            self.expect(&Token::LParen, "'(' before index columns")?;
            let mut columns = Vec::new();
            loop {
                columns.push(self.expect_ident("column name")?);
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
            self.expect(&Token::RParen, "')' after index columns")?;

            let mut stmt = ParsedStmt::new(StmtKind::CreateIndex);
            stmt.new_index = Some(NewIndex {
                name,
                table,
                columns,
                unique,
            });
            return Ok(stmt);
        }

        self.expect_keyword(Keyword::Table)?;
        let name = self.expect_ident("table name")?;
        self.expect(&Token::LParen, "'(' before column definitions")?;

        let mut columns = Vec::new();
        loop {
            columns.push(self.parse_column_def()?);
            if !self.accept(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::RParen, "')' after column definitions")?;

        let mut stmt = ParsedStmt::new(StmtKind::CreateTable);
        stmt.new_table = Some(NewTable { name, columns });
        Ok(stmt)
    }

    fn parse_column_def(&mut self) -> Result<ColumnDef> {
        let name = self.expect_ident("column name")?;
        let type_name = self.expect_ident("column type")?;
        let col_type = column_type_from_name(&type_name)
            .ok_or_else(|| self.error(format!("unknown column type '{}'", type_name)))?;

        // Optional size suffix, e.g. VARCHAR(255); recorded nowhere.
        if self.accept(&Token::LParen)? {
            self.expect_integer("type size")?;
            self.expect(&Token::RParen, "')' after type size")?;
        }

        let mut flags = 0u8;
        loop {
            if self.accept_keyword(Keyword::Primary)? {
                self.expect_keyword(Keyword::Key)?;
                flags |= col_flags::PRIMARY_KEY;
            } else if self.accept_keyword(Keyword::Not)? {
                self.expect_keyword(Keyword::Null)?;
                flags |= col_flags::NOT_NULL;
            } else if self.accept_keyword(Keyword::Unique)? {
                flags |= col_flags::UNIQUE;
            } else if self.accept_keyword(Keyword::Autoincrement)? {
                flags |= col_flags::AUTOINCREMENT;
            } else if self.accept_keyword(Keyword::Default)? {
                // Default expressions are accepted and discarded.
                self.parse_expr()?;
            } else {
                break;
            }
        }

        Ok(ColumnDef {
            name,
            col_type,
            flags,
        })
    }

    fn parse_drop(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // DROP
        let kind = if self.accept_keyword(Keyword::Table)? {
            StmtKind::DropTable
        } else if self.accept_keyword(Keyword::Index)? {
            StmtKind::DropIndex
        } else {
            return Err(self.error("expected TABLE or INDEX after DROP".into()));
        };

        let mut stmt = ParsedStmt::new(kind);
        stmt.target_name = Some(self.expect_ident("name")?);
        Ok(stmt)
    }

    fn parse_rollback(&mut self) -> Result<ParsedStmt> {
        self.advance()?; // ROLLBACK
        if self.accept_keyword(Keyword::To)? {
            self.accept_keyword(Keyword::Savepoint)?;
            let mut stmt = ParsedStmt::new(StmtKind::RollbackTo);
            stmt.savepoint_name = Some(self.expect_ident("savepoint name")?);
            return Ok(stmt);
        }
        Ok(ParsedStmt::new(StmtKind::Rollback))
    }

    fn parse_alias(&mut self) -> Result<Option<String>> {
        if self.accept_keyword(Keyword::As)? {
            return Ok(Some(self.expect_ident("alias")?));
        }
        if let Token::Ident(name) = &self.current {
            let alias = name.to_string();
            self.advance()?;
            return Ok(Some(alias));
        }
        Ok(None)
    }

    // --- expressions ------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr> {
        let mut left = self.parse_and()?;
        while self.accept_keyword(Keyword::Or)? {
            let right = self.parse_and()?;
            left = Expr::Binary {
                op: BinaryOp::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr> {
        let mut left = self.parse_comparison()?;
        while self.accept_keyword(Keyword::And)? {
            let right = self.parse_comparison()?;
            left = Expr::Binary {
                op: BinaryOp::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr> {
        let mut left = self.parse_term()?;

        loop {
            let op = match self.current {
                Token::Eq => BinaryOp::Eq,
                Token::Ne => BinaryOp::Ne,
                Token::Lt => BinaryOp::Lt,
                Token::Le => BinaryOp::Le,
                Token::Gt => BinaryOp::Gt,
                Token::Ge => BinaryOp::Ge,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_term()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        if self.accept_keyword(Keyword::Is)? {
            let negated = self.accept_keyword(Keyword::Not)?;
            self.expect_keyword(Keyword::Null)?;
            return Ok(Expr::Unary {
                op: if negated {
                    UnaryOp::IsNotNull
                } else {
                    UnaryOp::IsNull
                },
                operand: Box::new(left),
            });
        }

        if self.accept_keyword(Keyword::Like)? {
            let pattern = self.parse_term()?;
            return Ok(Expr::Binary {
                op: BinaryOp::Like,
                left: Box::new(left),
                right: Box::new(pattern),
            });
        }

        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.current {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_factor()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.current {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                Token::Percent => BinaryOp::Mod,
                _ => break,
            };
            self.advance()?;
            let right = self.parse_unary()?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        if matches!(self.current, Token::Minus) {
            self.advance()?;
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                operand: Box::new(operand),
            });
        }
        if self.accept_keyword(Keyword::Not)? {
            let operand = self.parse_unary()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand),
            });
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        match self.current.clone() {
            Token::Integer(i) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Int(i)))
            }
            Token::Float(f) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Float(f)))
            }
            Token::Str(s) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Text(s.to_string())))
            }
            Token::Keyword(Keyword::Null) => {
                self.advance()?;
                Ok(Expr::Literal(Value::Null))
            }
            Token::Param => {
                self.advance()?;
                self.params += 1;
                Ok(Expr::Parameter(self.params))
            }
            Token::Ident(name) => {
                let name = name.to_string();
                self.advance()?;

                if self.accept(&Token::LParen)? {
                    let mut args = Vec::new();
                    if !matches!(self.current, Token::RParen) {
                        loop {
                            if matches!(self.current, Token::Star) {
                                self.advance()?;
                                args.push(None); // COUNT(*)
                            } else {
                                args.push(Some(self.parse_expr()?));
                            }
                            if !self.accept(&Token::Comma)? {
                                break;
                            }
                        }
                    }
                    self.expect(&Token::RParen, "')' after function arguments")?;
                    return Ok(Expr::Function {
                        name,
                        args,
                        agg_slot: std::cell::Cell::new(None),
                    });
                }

                if self.accept(&Token::Dot)? {
                    let column = self.expect_ident("column name after '.'")?;
                    return Ok(Expr::Column {
                        table: Some(name),
                        name: column,
                        index: std::cell::Cell::new(None),
                    });
                }

                Ok(Expr::column(name))
            }
            Token::LParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(&Token::RParen, "')' after expression")?;
                Ok(expr)
            }
            other => Err(self.error(format!("expected expression, found {:?}", other))),
        }
    }

    // --- token plumbing ---------------------------------------------------

    fn advance(&mut self) -> Result<()> {
        self.current = self.lexer.next_token();
        if let Token::Error(msg) = &self.current {
            return Err(db_err(ErrorCode::Error, msg.clone()));
        }
        Ok(())
    }

    fn accept(&mut self, token: &Token<'_>) -> Result<bool> {
        if &self.current == token {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn accept_keyword(&mut self, keyword: Keyword) -> Result<bool> {
        if self.current == Token::Keyword(keyword) {
            self.advance()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn expect(&mut self, token: &Token<'_>, what: &str) -> Result<()> {
        if &self.current == token {
            return self.advance();
        }
        Err(self.error(format!("expected {}", what)))
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Result<()> {
        if self.current == Token::Keyword(keyword) {
            return self.advance();
        }
        Err(self.error(format!("expected {:?}", keyword)))
    }

    fn expect_ident(&mut self, what: &str) -> Result<String> {
        if let Token::Ident(name) = &self.current {
            let name = name.to_string();
            self.advance()?;
            return Ok(name);
        }
        Err(self.error(format!("expected {}", what)))
    }

    fn expect_integer(&mut self, what: &str) -> Result<i64> {
        if let Token::Integer(i) = &self.current {
            let i = *i;
            self.advance()?;
            return Ok(i);
        }
        Err(self.error(format!("expected {}", what)))
    }

    fn error(&self, message: String) -> eyre::Report {
        db_err(
            ErrorCode::Error,
            format!("line {}: {}", self.lexer.line(), message),
        )
    }
}

fn column_type_from_name(name: &str) -> Option<ValueType> {
    match name.to_ascii_uppercase().as_str() {
        "INTEGER" | "INT" | "BIGINT" | "SMALLINT" | "TINYINT" | "BOOLEAN" | "BOOL" => {
            Some(ValueType::Int)
        }
        "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" | "DECIMAL" => Some(ValueType::Float),
        "TEXT" | "VARCHAR" | "CHAR" | "STRING" => Some(ValueType::Text),
        "BLOB" | "BINARY" => Some(ValueType::Blob),
        "JSON" => Some(ValueType::Json),
        "VECTOR" => Some(ValueType::Vector),
        _ => None,
    }
}
