//! Recursive-descent parser for the SQLFlow DSL, grounded in
//! `sqlflow/parser/parser.py`.

use std::collections::HashMap;

use serde_json::Value;
use sqlflow_core::ast::{
    Branch, ConditionalBlockStep, ExportStep, IncludeStep, LoadMode, LoadStep, Pipeline,
    SetStep, SourceDefinitionStep, SqlBlockStep, Step, TransformMode,
};

use crate::errors::{ParseError, ParserError};
use crate::json_vars::quote_bare_variables;
use crate::lexer::{Lexer, Token, TokenType};

pub struct Parser {
    tokens: Vec<Token>,
    current: usize,
    errors: Vec<ParserError>,
}

impl Parser {
    /// Parse a complete pipeline. Lexer and parse errors are collected and
    /// reported together rather than aborting on the first one.
    pub fn parse(text: &str) -> Result<Pipeline, ParseError> {
        let tokens = match Lexer::new(text).tokenize() {
            Ok(tokens) => tokens,
            Err(e) => return Err(ParseError::from(e)),
        };

        let mut parser = Parser {
            tokens,
            current: 0,
            errors: Vec::new(),
        };

        let mut pipeline = Pipeline::new();
        while !parser.is_at_end() {
            match parser.parse_statement() {
                Ok(Some(step)) => pipeline.add_step(step),
                Ok(None) => {}
                Err(e) => {
                    parser.errors.push(e);
                    parser.synchronize();
                }
            }
        }

        if parser.errors.is_empty() {
            Ok(pipeline)
        } else {
            Err(ParseError(parser.errors))
        }
    }

    fn parse_statement(&mut self) -> Result<Option<Step>, ParserError> {
        let token = self.peek();
        let step = match token.ty {
            TokenType::Source => Step::SourceDefinition(self.parse_source()?),
            TokenType::Load => Step::Load(self.parse_load()?),
            TokenType::Export => Step::Export(self.parse_export()?),
            TokenType::Include => Step::Include(self.parse_include()?),
            TokenType::Set => Step::Set(self.parse_set()?),
            TokenType::Create => Step::SqlBlock(self.parse_sql_block()?),
            TokenType::If => Step::ConditionalBlock(self.parse_conditional_block()?),
            _ => {
                self.advance();
                return Ok(None);
            }
        };
        Ok(Some(step))
    }

    fn parse_source(&mut self) -> Result<SourceDefinitionStep, ParserError> {
        let source_tok = self.consume(TokenType::Source, "expected 'SOURCE'")?;
        let name = self
            .consume(TokenType::Identifier, "expected source name after 'SOURCE'")?
            .value;

        if self.check(TokenType::From) {
            self.advance();
            let profile_name = self
                .consume(TokenType::String, "expected profile connector name after 'FROM'")?
                .value;
            let mut options = HashMap::new();
            if self.check(TokenType::Options) {
                self.advance();
                options = self.parse_json_object("OPTIONS")?;
            }
            self.consume(TokenType::Semicolon, "expected ';' after SOURCE statement")?;
            return Ok(SourceDefinitionStep {
                name,
                connector_type: String::new(),
                params: options,
                is_from_profile: true,
                profile_connector_name: Some(profile_name),
                line_number: source_tok.line,
            });
        }

        self.consume(TokenType::Type, "expected 'TYPE' after source name")?;
        let connector_type = self
            .consume(TokenType::Identifier, "expected connector type after 'TYPE'")?
            .value;
        self.consume(TokenType::Params, "expected 'PARAMS' after connector type")?;
        let params = self.parse_json_object("PARAMS")?;
        self.consume(TokenType::Semicolon, "expected ';' after SOURCE statement")?;

        Ok(SourceDefinitionStep {
            name,
            connector_type,
            params,
            is_from_profile: false,
            profile_connector_name: None,
            line_number: source_tok.line,
        })
    }

    fn parse_load(&mut self) -> Result<LoadStep, ParserError> {
        let load_tok = self.consume(TokenType::Load, "expected 'LOAD'")?;
        let table_name = self
            .consume(TokenType::Identifier, "expected table name after 'LOAD'")?
            .value;
        self.consume(TokenType::From, "expected 'FROM' after table name")?;
        let source_name = self
            .consume(TokenType::Identifier, "expected source name after 'FROM'")?
            .value;

        let mut mode = LoadMode::Append;
        let mut upsert_keys = Vec::new();
        if self.check(TokenType::Mode) {
            self.advance();
            mode = match self.peek().ty {
                TokenType::Replace => {
                    self.advance();
                    LoadMode::Replace
                }
                TokenType::Append => {
                    self.advance();
                    LoadMode::Append
                }
                TokenType::Upsert => {
                    self.advance();
                    LoadMode::Upsert
                }
                _ => {
                    let t = self.peek();
                    return Err(ParserError::new(
                        "expected REPLACE, APPEND or UPSERT after 'MODE'",
                        t.line,
                        t.column,
                    ));
                }
            };
            if self.check(TokenType::Key) {
                self.advance();
                upsert_keys = self.parse_ident_list()?;
            }
            if mode == LoadMode::Upsert && upsert_keys.is_empty() {
                let t = self.peek();
                return Err(ParserError::new(
                    "UPSERT mode requires a KEY clause",
                    t.line,
                    t.column,
                ));
            }
        }

        self.consume(TokenType::Semicolon, "expected ';' after LOAD statement")?;

        Ok(LoadStep {
            table_name,
            source_name,
            mode,
            upsert_keys,
            line_number: load_tok.line,
        })
    }

    fn parse_sql_block(&mut self) -> Result<SqlBlockStep, ParserError> {
        let create_tok = self.consume(TokenType::Create, "expected 'CREATE'")?;
        let mut is_replace = false;
        if self.check(TokenType::Or) {
            self.advance();
            self.consume(TokenType::Replace, "expected 'REPLACE' after 'OR'")?;
            is_replace = true;
        }
        self.consume(TokenType::Table, "expected 'TABLE' after 'CREATE'")?;
        let table_name = self
            .consume(TokenType::Identifier, "expected table name after 'TABLE'")?
            .value;

        let mut mode = None;
        let mut merge_keys = Vec::new();
        let mut time_column = None;
        let mut lookback = None;

        if self.check(TokenType::Mode) {
            self.advance();
            match self.peek().ty {
                TokenType::Replace => {
                    self.advance();
                    mode = Some(TransformMode::Replace);
                    is_replace = true;
                }
                TokenType::Append => {
                    self.advance();
                    mode = Some(TransformMode::Append);
                }
                TokenType::Merge => {
                    self.advance();
                    self.consume(TokenType::Key, "expected 'KEY' after 'MERGE'")?;
                    merge_keys = self.parse_ident_list()?;
                    mode = Some(TransformMode::Merge);
                }
                TokenType::Incremental => {
                    self.advance();
                    self.consume(TokenType::By, "expected 'BY' after 'INCREMENTAL'")?;
                    time_column = Some(
                        self.consume(TokenType::Identifier, "expected column name after 'BY'")?
                            .value,
                    );
                    if self.check(TokenType::Lookback) {
                        self.advance();
                        lookback = Some(self.parse_duration()?);
                    }
                    mode = Some(TransformMode::Incremental);
                }
                _ => {
                    let t = self.peek();
                    return Err(ParserError::new(
                        "expected REPLACE, APPEND, MERGE or INCREMENTAL after 'MODE'",
                        t.line,
                        t.column,
                    ));
                }
            }
        }

        self.consume(TokenType::As, "expected 'AS' after table name")?;
        let sql_query = self.parse_select_body(&[TokenType::Semicolon])?;
        self.consume(TokenType::Semicolon, "expected ';' after SQL query")?;

        Ok(SqlBlockStep {
            table_name,
            sql_query,
            mode,
            is_replace,
            merge_keys,
            time_column,
            lookback,
            line_number: create_tok.line,
        })
    }

    fn parse_export(&mut self) -> Result<ExportStep, ParserError> {
        let export_tok = self.consume(TokenType::Export, "expected 'EXPORT'")?;
        let sql_query = self.parse_select_body(&[TokenType::To])?;
        self.consume(TokenType::To, "expected 'TO' after SQL query")?;
        let destination_uri = self
            .consume(TokenType::String, "expected destination URI string after 'TO'")?
            .value;
        self.consume(TokenType::Type, "expected 'TYPE' after destination URI")?;
        let connector_type = self
            .consume(TokenType::Identifier, "expected connector type after 'TYPE'")?
            .value;
        self.consume(TokenType::Options, "expected 'OPTIONS' after connector type")?;
        let options = self.parse_json_object("OPTIONS")?;
        self.consume(TokenType::Semicolon, "expected ';' after EXPORT statement")?;

        Ok(ExportStep {
            sql_query,
            destination_uri,
            connector_type,
            options,
            line_number: export_tok.line,
        })
    }

    fn parse_include(&mut self) -> Result<IncludeStep, ParserError> {
        let include_tok = self.consume(TokenType::Include, "expected 'INCLUDE'")?;
        let file_path = self
            .consume(TokenType::String, "expected file path string after 'INCLUDE'")?
            .value;
        self.consume(TokenType::As, "expected 'AS' after file path")?;
        let alias = self
            .consume(TokenType::Identifier, "expected alias after 'AS'")?
            .value;
        self.consume(TokenType::Semicolon, "expected ';' after INCLUDE statement")?;
        Ok(IncludeStep {
            file_path,
            alias,
            line_number: include_tok.line,
        })
    }

    fn parse_set(&mut self) -> Result<SetStep, ParserError> {
        let set_tok = self.consume(TokenType::Set, "expected 'SET'")?;
        let variable_name = self
            .consume(TokenType::Identifier, "expected variable name after 'SET'")?
            .value;
        let eq = self.advance();
        if eq.ty != TokenType::Equals {
            return Err(ParserError::new(
                "expected '=' after variable name",
                eq.line,
                eq.column,
            ));
        }

        let mut value_tokens = Vec::new();
        while !self.check(TokenType::Semicolon) && !self.is_at_end() {
            value_tokens.push(self.advance());
        }
        if value_tokens.is_empty() {
            let t = self.peek();
            return Err(ParserError::new("expected value after '='", t.line, t.column));
        }
        let variable_value = value_tokens
            .iter()
            .map(|t| t.value.as_str())
            .collect::<Vec<_>>()
            .join(" ")
            .trim_matches(|c| c == '\'' || c == '"')
            .to_string();

        self.consume(TokenType::Semicolon, "expected ';' after SET statement")?;
        Ok(SetStep {
            variable_name,
            variable_value,
            line_number: set_tok.line,
        })
    }

    fn parse_conditional_block(&mut self) -> Result<ConditionalBlockStep, ParserError> {
        let start_line = self.peek().line;
        let mut branches = Vec::new();

        self.consume(TokenType::If, "expected 'IF'")?;
        let condition = self.parse_condition_expression()?;
        self.consume(TokenType::Then, "expected 'THEN' after condition")?;
        let steps = self.parse_branch_statements(&[
            TokenType::ElseIf,
            TokenType::Else,
            TokenType::EndIf,
        ])?;
        branches.push(Branch { condition, steps });

        while self.check(TokenType::ElseIf) {
            self.advance();
            let condition = self.parse_condition_expression()?;
            self.consume(TokenType::Then, "expected 'THEN' after condition")?;
            let steps = self.parse_branch_statements(&[
                TokenType::ElseIf,
                TokenType::Else,
                TokenType::EndIf,
            ])?;
            branches.push(Branch { condition, steps });
        }

        let mut else_branch = None;
        if self.check(TokenType::Else) {
            self.advance();
            else_branch = Some(self.parse_branch_statements(&[TokenType::EndIf])?);
        }

        self.consume(TokenType::EndIf, "expected 'END IF'")?;
        self.consume(TokenType::Semicolon, "expected ';' after 'END IF'")?;

        Ok(ConditionalBlockStep {
            branches,
            else_branch,
            line_number: start_line,
        })
    }

    fn parse_condition_expression(&mut self) -> Result<String, ParserError> {
        let mut tokens = Vec::new();
        while !self.check(TokenType::Then) && !self.is_at_end() {
            tokens.push(self.advance().value);
        }
        let joined = tokens.join(" ");
        Ok(joined.split_whitespace().collect::<Vec<_>>().join(" "))
    }

    fn parse_branch_statements(
        &mut self,
        terminators: &[TokenType],
    ) -> Result<Vec<Step>, ParserError> {
        let mut steps = Vec::new();
        while !self.check_any(terminators) && !self.is_at_end() {
            match self.parse_statement()? {
                Some(step) => steps.push(step),
                None => {
                    self.advance();
                }
            }
        }
        Ok(steps)
    }

    /// `select_body`: everything from `SELECT` up to (not including) one of
    /// `terminators`, re-joined with single spaces.
    fn parse_select_body(&mut self, terminators: &[TokenType]) -> Result<String, ParserError> {
        self.consume(TokenType::Select, "expected 'SELECT'")?;
        let mut parts = vec!["SELECT".to_string()];
        while !self.check_any(terminators) && !self.is_at_end() {
            let token = self.advance();
            if token.ty == TokenType::String {
                parts.push(quote_sql_literal(&token.value));
            } else {
                parts.push(token.value);
            }
        }
        Ok(parts.join(" "))
    }

    fn parse_ident_list(&mut self) -> Result<Vec<String>, ParserError> {
        let parenthesized = self.check(TokenType::LParen);
        if parenthesized {
            self.advance();
        }
        let mut idents = vec![
            self.consume(TokenType::Identifier, "expected an identifier")?
                .value,
        ];
        while self.check(TokenType::Comma) {
            self.advance();
            idents.push(
                self.consume(TokenType::Identifier, "expected an identifier")?
                    .value,
            );
        }
        if parenthesized {
            self.consume(TokenType::RParen, "expected ')' to close key list")?;
        }
        Ok(idents)
    }

    fn parse_duration(&mut self) -> Result<String, ParserError> {
        let mut parts = Vec::new();
        while !self.check(TokenType::Semicolon)
            && !self.check(TokenType::As)
            && !self.is_at_end()
        {
            if matches!(
                self.peek().ty,
                TokenType::Number | TokenType::Identifier | TokenType::String
            ) {
                parts.push(self.advance().value);
            } else {
                break;
            }
        }
        if parts.is_empty() {
            let t = self.peek();
            return Err(ParserError::new(
                "expected a duration literal after 'LOOKBACK'",
                t.line,
                t.column,
            ));
        }
        Ok(parts.join(" "))
    }

    fn parse_json_object(&mut self, context: &str) -> Result<HashMap<String, Value>, ParserError> {
        let tok = self.consume(TokenType::JsonObject, "expected a JSON object")?;
        let prepared = quote_bare_variables(&tok.value);
        match serde_json::from_str::<Value>(&prepared) {
            Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
            Ok(_) => Err(ParserError::new(
                format!("{context} must be a JSON object"),
                tok.line,
                tok.column,
            )),
            Err(e) => Err(ParserError::new(
                format!("invalid JSON in {context}: {e}"),
                tok.line,
                tok.column,
            )),
        }
    }

    fn advance(&mut self) -> Token {
        let token = self.tokens[self.current].clone();
        if !self.is_at_end() {
            self.current += 1;
        }
        token
    }

    fn consume(&mut self, ty: TokenType, message: &str) -> Result<Token, ParserError> {
        if self.check(ty) {
            return Ok(self.advance());
        }
        let t = self.peek();
        Err(ParserError::new(message, t.line, t.column))
    }

    fn check(&self, ty: TokenType) -> bool {
        !self.is_at_end() && self.peek().ty == ty
    }

    fn check_any(&self, types: &[TokenType]) -> bool {
        types.iter().any(|t| self.check(*t))
    }

    fn is_at_end(&self) -> bool {
        self.peek().ty == TokenType::Eof
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.current]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.current - 1]
    }

    /// Skip tokens until a statement boundary so one malformed statement
    /// doesn't prevent parsing the rest of the file.
    fn synchronize(&mut self) {
        if self.check(TokenType::Semicolon) {
            self.advance();
        }
        while !self.is_at_end() {
            if self.current > 0 && self.previous().ty == TokenType::Semicolon {
                return;
            }
            if matches!(
                self.peek().ty,
                TokenType::Source
                    | TokenType::Load
                    | TokenType::Export
                    | TokenType::Include
                    | TokenType::Set
                    | TokenType::Create
            ) {
                return;
            }
            self.advance();
        }
    }
}

/// Re-quotes a lexed string literal's bare contents for embedding in SQL
/// text, doubling any embedded single quotes the same way
/// `sqlflow_core::vars::SqlFormatter` escapes resolved variables.
fn quote_sql_literal(raw: &str) -> String {
    format!("'{}'", raw.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_pipeline() {
        let text = r#"
            SOURCE customers TYPE CSV PARAMS {"path":"data/customers.csv","has_header":true};
            LOAD raw_customers FROM customers;
            CREATE TABLE clean AS SELECT id, UPPER(name) AS name FROM raw_customers;
            EXPORT SELECT * FROM clean TO "out/clean.csv" TYPE CSV OPTIONS {"header":true};
        "#;
        let pipeline = Parser::parse(text).unwrap();
        assert_eq!(pipeline.steps.len(), 4);
    }

    #[test]
    fn parses_load_with_upsert_mode() {
        let text = "LOAD t FROM src MODE UPSERT KEY (id, region);";
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::Load(s) => {
                assert_eq!(s.mode, LoadMode::Upsert);
                assert_eq!(s.upsert_keys, vec!["id", "region"]);
            }
            _ => panic!("expected a load step"),
        }
    }

    #[test]
    fn upsert_without_key_is_an_error() {
        let text = "LOAD t FROM src MODE UPSERT;";
        assert!(Parser::parse(text).is_err());
    }

    #[test]
    fn parses_incremental_transform_with_lookback() {
        let text = "CREATE TABLE t MODE INCREMENTAL BY ts LOOKBACK 7 days AS SELECT * FROM raw;";
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::SqlBlock(s) => {
                assert_eq!(s.mode, Some(TransformMode::Incremental));
                assert_eq!(s.time_column.as_deref(), Some("ts"));
                assert_eq!(s.lookback.as_deref(), Some("7 days"));
            }
            _ => panic!("expected a sql block step"),
        }
    }

    #[test]
    fn parses_conditional_with_nested_load() {
        let text = r#"
            IF ${env} == 'production' THEN
                LOAD customers FROM cs;
            ELSE
                LOAD customers_raw FROM cs;
            END IF;
        "#;
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::ConditionalBlock(cb) => {
                assert_eq!(cb.branches.len(), 1);
                assert!(cb.else_branch.is_some());
            }
            _ => panic!("expected a conditional block"),
        }
    }

    #[test]
    fn reports_multiple_errors_and_keeps_parsing() {
        let text = "LOAD FROM src;\nLOAD t2 FROM src2;";
        let err = Parser::parse(text).unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn source_from_profile_rejects_params_shape() {
        let text = r#"SOURCE s FROM "profile_conn" OPTIONS {"schema":"public"};"#;
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::SourceDefinition(s) => {
                assert!(s.is_from_profile);
                assert_eq!(s.profile_connector_name.as_deref(), Some("profile_conn"));
            }
            _ => panic!("expected a source definition"),
        }
    }

    #[test]
    fn select_body_preserves_string_literal_quotes() {
        let text = "CREATE OR REPLACE TABLE s AS SELECT count(*) AS c, 'v2' AS v FROM t;";
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::SqlBlock(s) => {
                assert!(s.sql_query.contains("'v2'"), "got: {}", s.sql_query);
                assert!(!s.sql_query.contains(" v2 "), "got: {}", s.sql_query);
            }
            _ => panic!("expected a sql block step"),
        }
    }

    #[test]
    fn select_body_escapes_embedded_quote_in_literal() {
        let text = r#"CREATE TABLE t AS SELECT * FROM raw WHERE name = "O'Brien";"#;
        let pipeline = Parser::parse(text).unwrap();
        match &pipeline.steps[0] {
            Step::SqlBlock(s) => {
                assert!(s.sql_query.contains("'O''Brien'"), "got: {}", s.sql_query);
            }
            _ => panic!("expected a sql block step"),
        }
    }
}
