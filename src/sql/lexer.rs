//! # SQL Lexer
//!
//! Single-pass tokenizer over the SQL source. Identifiers and string
//! literals are borrowed slices of the input; no allocation happens on the
//! hot path. Keywords are matched with a compile-time perfect hash map
//! after upper-casing into a small stack buffer.
//!
//! Recognized input: whitespace, `--` line comments, `/* */` block
//! comments, the punctuation and operator set of the grammar
//! (`( ) , . ; + - * / % = <> != < <= > >=`), case-insensitive keywords,
//! identifiers `[A-Za-z_][A-Za-z0-9_]*`, integer and float literals
//! (decimal point and optional exponent), single- or double-quoted string
//! literals with backslash escape pass-through, and `?` positional
//! parameters. Unterminated strings and unexpected characters produce an
//! error token carrying a message; `\n` advances the line counter.

use phf::phf_map;

use super::token::{Keyword, Token};

static KEYWORDS: phf::Map<&'static str, Keyword> = phf_map! {
    "SELECT" => Keyword::Select,
    "FROM" => Keyword::From,
    "WHERE" => Keyword::Where,
    "GROUP" => Keyword::Group,
    "HAVING" => Keyword::Having,
    "ORDER" => Keyword::Order,
    "BY" => Keyword::By,
    "ASC" => Keyword::Asc,
    "DESC" => Keyword::Desc,
    "LIMIT" => Keyword::Limit,
    "OFFSET" => Keyword::Offset,
    "INSERT" => Keyword::Insert,
    "INTO" => Keyword::Into,
    "VALUES" => Keyword::Values,
    "UPDATE" => Keyword::Update,
    "SET" => Keyword::Set,
    "DELETE" => Keyword::Delete,
    "CREATE" => Keyword::Create,
    "DROP" => Keyword::Drop,
    "TABLE" => Keyword::Table,
    "INDEX" => Keyword::Index,
    "ON" => Keyword::On,
    "PRIMARY" => Keyword::Primary,
    "KEY" => Keyword::Key,
    "UNIQUE" => Keyword::Unique,
    "NOT" => Keyword::Not,
    "NULL" => Keyword::Null,
    "DEFAULT" => Keyword::Default,
    "AUTOINCREMENT" => Keyword::Autoincrement,
    "BEGIN" => Keyword::Begin,
    "COMMIT" => Keyword::Commit,
    "ROLLBACK" => Keyword::Rollback,
    "SAVEPOINT" => Keyword::Savepoint,
    "RELEASE" => Keyword::Release,
    "TO" => Keyword::To,
    "TRANSACTION" => Keyword::Transaction,
    "JOIN" => Keyword::Join,
    "LEFT" => Keyword::Left,
    "RIGHT" => Keyword::Right,
    "INNER" => Keyword::Inner,
    "OUTER" => Keyword::Outer,
    "AS" => Keyword::As,
    "AND" => Keyword::And,
    "OR" => Keyword::Or,
    "IN" => Keyword::In,
    "BETWEEN" => Keyword::Between,
    "LIKE" => Keyword::Like,
    "IS" => Keyword::Is,
};

const MAX_KEYWORD_LEN: usize = 13; // AUTOINCREMENT

pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    line: u32,
    token_start: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(src: &'a str) -> Lexer<'a> {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            line: 1,
            token_start: 0,
        }
    }

    /// Byte offset where the most recently returned token began. The
    /// parser reports this for its one-token lookahead as the statement
    /// tail handed back by `prepare`.
    pub fn token_start(&self) -> usize {
        self.token_start
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn next_token(&mut self) -> Token<'a> {
        self.skip_whitespace_and_comments();
        self.token_start = self.pos;

        let Some(&c) = self.bytes.get(self.pos) else {
            return Token::Eof;
        };

        match c {
            b';' => self.single(Token::Semicolon),
            b',' => self.single(Token::Comma),
            b'(' => self.single(Token::LParen),
            b')' => self.single(Token::RParen),
            b'.' => self.single(Token::Dot),
            b'*' => self.single(Token::Star),
            b'+' => self.single(Token::Plus),
            b'-' => self.single(Token::Minus),
            b'/' => self.single(Token::Slash),
            b'%' => self.single(Token::Percent),
            b'?' => self.single(Token::Param),
            b'=' => self.single(Token::Eq),
            b'<' => {
                self.pos += 1;
                match self.bytes.get(self.pos) {
                    Some(b'=') => self.single(Token::Le),
                    Some(b'>') => self.single(Token::Ne),
                    _ => Token::Lt,
                }
            }
            b'>' => {
                self.pos += 1;
                if self.bytes.get(self.pos) == Some(&b'=') {
                    self.single(Token::Ge)
                } else {
                    Token::Gt
                }
            }
            b'!' => {
                self.pos += 1;
                if self.bytes.get(self.pos) == Some(&b'=') {
                    self.single(Token::Ne)
                } else {
                    Token::Error(format!("unexpected character '!' on line {}", self.line))
                }
            }
            b'\'' | b'"' => self.string_literal(c),
            b'0'..=b'9' => self.number(),
            b'a'..=b'z' | b'A'..=b'Z' | b'_' => self.identifier_or_keyword(),
            other => {
                self.pos += 1;
                Token::Error(format!(
                    "unexpected character '{}' on line {}",
                    other as char, self.line
                ))
            }
        }
    }

    fn single(&mut self, token: Token<'a>) -> Token<'a> {
        self.pos += 1;
        token
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.bytes.get(self.pos) {
                Some(b'\n') => {
                    self.line += 1;
                    self.pos += 1;
                }
                Some(b' ' | b'\t' | b'\r') => self.pos += 1,
                Some(b'-') if self.bytes.get(self.pos + 1) == Some(&b'-') => {
                    while let Some(&c) = self.bytes.get(self.pos) {
                        self.pos += 1;
                        if c == b'\n' {
                            self.line += 1;
                            break;
                        }
                    }
                }
                Some(b'/') if self.bytes.get(self.pos + 1) == Some(&b'*') => {
                    self.pos += 2;
                    while self.pos < self.bytes.len() {
                        if self.bytes[self.pos] == b'\n' {
                            self.line += 1;
                        }
                        if self.bytes[self.pos] == b'*'
                            && self.bytes.get(self.pos + 1) == Some(&b'/')
                        {
                            self.pos += 2;
                            break;
                        }
                        self.pos += 1;
                    }
                }
                _ => return,
            }
        }
    }

    fn string_literal(&mut self, quote: u8) -> Token<'a> {
        let start_line = self.line;
        self.pos += 1;
        let start = self.pos;

        while let Some(&c) = self.bytes.get(self.pos) {
            if c == b'\\' {
                // Escape pass-through: keep both bytes in the literal.
                self.pos += 2;
                continue;
            }
            if c == quote {
                let text = &self.src[start..self.pos];
                self.pos += 1;
                return Token::Str(text);
            }
            if c == b'\n' {
                self.line += 1;
            }
            self.pos += 1;
        }

        Token::Error(format!("unterminated string on line {}", start_line))
    }

    fn number(&mut self) -> Token<'a> {
        let start = self.pos;
        while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
            self.pos += 1;
        }

        let mut is_float = false;
        if self.bytes.get(self.pos) == Some(&b'.')
            && matches!(self.bytes.get(self.pos + 1), Some(b'0'..=b'9'))
        {
            is_float = true;
            self.pos += 1;
            while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }

        if matches!(self.bytes.get(self.pos), Some(b'e' | b'E')) {
            let mut lookahead = self.pos + 1;
            if matches!(self.bytes.get(lookahead), Some(b'+' | b'-')) {
                lookahead += 1;
            }
            if matches!(self.bytes.get(lookahead), Some(b'0'..=b'9')) {
                is_float = true;
                self.pos = lookahead;
                while matches!(self.bytes.get(self.pos), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            }
        }

        let text = &self.src[start..self.pos];
        if is_float {
            match text.parse::<f64>() {
                Ok(f) => Token::Float(f),
                Err(_) => Token::Error(format!("bad float literal '{}' on line {}", text, self.line)),
            }
        } else {
            match text.parse::<i64>() {
                Ok(i) => Token::Integer(i),
                Err(_) => Token::Error(format!(
                    "integer literal '{}' out of range on line {}",
                    text, self.line
                )),
            }
        }
    }

    fn identifier_or_keyword(&mut self) -> Token<'a> {
        let start = self.pos;
        while matches!(
            self.bytes.get(self.pos),
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'_')
        ) {
            self.pos += 1;
        }
        let text = &self.src[start..self.pos];

        if text.len() <= MAX_KEYWORD_LEN {
            let mut upper = [0u8; MAX_KEYWORD_LEN];
            for (i, b) in text.bytes().enumerate() {
                upper[i] = b.to_ascii_uppercase();
            }
            let upper = std::str::from_utf8(&upper[..text.len()]).unwrap();
            if let Some(&kw) = KEYWORDS.get(upper) {
                return Token::Keyword(kw);
            }
        }

        Token::Ident(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(sql: &str) -> Vec<Token<'_>> {
        let mut lexer = Lexer::new(sql);
        let mut out = Vec::new();
        loop {
            let token = lexer.next_token();
            let done = token.is_eof();
            out.push(token);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn tokenizes_a_select() {
        let tokens = all_tokens("SELECT id, name FROM t WHERE id > 1");
        assert_eq!(
            tokens,
            vec![
                Token::Keyword(Keyword::Select),
                Token::Ident("id"),
                Token::Comma,
                Token::Ident("name"),
                Token::Keyword(Keyword::From),
                Token::Ident("t"),
                Token::Keyword(Keyword::Where),
                Token::Ident("id"),
                Token::Gt,
                Token::Integer(1),
                Token::Eof,
            ]
        );
    }

    #[test]
    fn keywords_are_case_insensitive() {
        assert_eq!(
            all_tokens("select SeLeCt SELECT")[..3],
            [
                Token::Keyword(Keyword::Select),
                Token::Keyword(Keyword::Select),
                Token::Keyword(Keyword::Select),
            ]
        );
    }

    #[test]
    fn comparison_operators() {
        let tokens = all_tokens("= <> != < <= > >=");
        assert_eq!(
            tokens[..7],
            [
                Token::Eq,
                Token::Ne,
                Token::Ne,
                Token::Lt,
                Token::Le,
                Token::Gt,
                Token::Ge,
            ]
        );
    }

    #[test]
    fn numeric_literals() {
        let tokens = all_tokens("42 3.25 1e3 2.5e-2 7");
        assert_eq!(
            tokens[..5],
            [
                Token::Integer(42),
                Token::Float(3.25),
                Token::Float(1000.0),
                Token::Float(0.025),
                Token::Integer(7),
            ]
        );
    }

    #[test]
    fn trailing_dot_stays_an_integer() {
        // "1." without a digit after the dot is an integer plus a dot.
        let tokens = all_tokens("1.");
        assert_eq!(tokens[..2], [Token::Integer(1), Token::Dot]);
    }

    #[test]
    fn string_literals_and_escapes() {
        let tokens = all_tokens(r#"'hello' "world" 'it\'s'"#);
        assert_eq!(
            tokens[..3],
            [
                Token::Str("hello"),
                Token::Str("world"),
                Token::Str(r"it\'s"),
            ]
        );
    }

    #[test]
    fn unterminated_string_is_an_error() {
        let tokens = all_tokens("'oops");
        assert!(matches!(&tokens[0], Token::Error(msg) if msg.contains("unterminated")));
    }

    #[test]
    fn comments_are_skipped_and_lines_tracked() {
        let mut lexer = Lexer::new("-- first\n/* multi\nline */ SELECT");
        assert_eq!(lexer.next_token(), Token::Keyword(Keyword::Select));
        assert_eq!(lexer.line(), 3);
    }

    #[test]
    fn parameters_and_punctuation() {
        let tokens = all_tokens("(?, ?);");
        assert_eq!(
            tokens[..6],
            [
                Token::LParen,
                Token::Param,
                Token::Comma,
                Token::Param,
                Token::RParen,
                Token::Semicolon,
            ]
        );
    }

    #[test]
    fn unexpected_character_reports_line() {
        let tokens = all_tokens("\n\n@");
        assert!(matches!(&tokens[0], Token::Error(msg) if msg.contains("line 3")));
    }
}
