// ============================================================================
// Object query parser
// ============================================================================
//
// Recursive descent over the token stream, one function per precedence level:
//
//   or -> and -> not -> predicate -> additive -> multiplicative -> unary -> primary

use super::ast::*;
use super::lexer::{tokenize, Token};
use crate::core::{DbError, Result, Value};
use crate::sql::{AggregateFunction, BinaryOperator, ParamRef};

/// Words that end an implicit alias.
const RESERVED: &[&str] = &[
    "SELECT", "FROM", "WHERE", "JOIN", "INNER", "LEFT", "OUTER", "FETCH", "ORDER", "BY", "AND", "OR", "NOT", "SET",
    "AS", "ON", "GROUP", "HAVING",
];

pub fn parse(query: &str) -> Result<QueryStatement> {
    let mut parser = Parser {
        tokens: tokenize(query)?,
        pos: 0,
    };
    let statement = parser.statement()?;
    if parser.peek() != &Token::Eof {
        return Err(parser.unexpected("end of query"));
    }
    Ok(statement)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        &self.tokens[(self.pos + offset).min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn unexpected(&self, wanted: &str) -> DbError {
        DbError::ParseError(format!("Expected {}, found {:?}", wanted, self.peek()))
    }

    fn accept_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_keyword(keyword) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<()> {
        if self.accept_keyword(keyword) {
            Ok(())
        } else {
            Err(self.unexpected(keyword))
        }
    }

    fn accept(&mut self, token: &Token) -> bool {
        if self.peek() == token {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token) -> Result<()> {
        if self.accept(token) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("{:?}", token)))
        }
    }

    fn identifier(&mut self) -> Result<String> {
        match self.peek() {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn dotted_name(&mut self) -> Result<Vec<String>> {
        let mut segments = vec![self.identifier()?];
        while self.accept(&Token::Dot) {
            segments.push(self.identifier()?);
        }
        Ok(segments)
    }

    // ------------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------------

    fn statement(&mut self) -> Result<QueryStatement> {
        if self.accept_keyword("SELECT") {
            self.select().map(QueryStatement::Select)
        } else if self.accept_keyword("UPDATE") {
            self.update().map(QueryStatement::Update)
        } else if self.accept_keyword("DELETE") {
            self.expect_keyword("FROM")?;
            let target = self.range_variable()?;
            let filter = self.where_clause()?;
            Ok(QueryStatement::Delete(DeleteQuery { target, filter }))
        } else {
            Err(self.unexpected("SELECT, UPDATE or DELETE"))
        }
    }

    fn select(&mut self) -> Result<SelectQuery> {
        let distinct = self.accept_keyword("DISTINCT");
        let mut items = vec![self.select_item()?];
        while self.accept(&Token::Comma) {
            items.push(self.select_item()?);
        }

        self.expect_keyword("FROM")?;
        let from = self.range_variable()?;

        let mut joins = Vec::new();
        while let Some(join) = self.join()? {
            joins.push(join);
        }

        let filter = self.where_clause()?;

        let mut order_by = Vec::new();
        if self.accept_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let expr = self.expr()?;
                let descending = if self.accept_keyword("DESC") {
                    true
                } else {
                    self.accept_keyword("ASC");
                    false
                };
                order_by.push(OrderItem { expr, descending });
                if !self.accept(&Token::Comma) {
                    break;
                }
            }
        }

        Ok(SelectQuery {
            distinct,
            items,
            from,
            joins,
            filter,
            order_by,
        })
    }

    fn select_item(&mut self) -> Result<SelectItem> {
        if self.accept_keyword("NEW") {
            let class = self.dotted_name()?.join(".");
            self.expect(&Token::LParen)?;
            let mut args = vec![self.expr()?];
            while self.accept(&Token::Comma) {
                args.push(self.expr()?);
            }
            self.expect(&Token::RParen)?;
            return Ok(SelectItem::Constructor { class, args });
        }
        Ok(SelectItem::Expr(self.expr()?))
    }

    fn update(&mut self) -> Result<UpdateQuery> {
        let target = self.range_variable()?;
        self.expect_keyword("SET")?;
        let mut assignments = Vec::new();
        loop {
            let path = self.dotted_name()?;
            self.expect(&Token::Eq)?;
            assignments.push((path, self.expr()?));
            if !self.accept(&Token::Comma) {
                break;
            }
        }
        let filter = self.where_clause()?;
        Ok(UpdateQuery {
            target,
            assignments,
            filter,
        })
    }

    fn range_variable(&mut self) -> Result<RangeVariable> {
        let entity = self.identifier()?;
        self.accept_keyword("AS");
        let alias = self.alias()?.ok_or_else(|| self.unexpected("identification variable"))?;
        Ok(RangeVariable { entity, alias })
    }

    fn alias(&mut self) -> Result<Option<String>> {
        match self.peek() {
            Token::Ident(name) if !RESERVED.iter().any(|r| name.eq_ignore_ascii_case(r)) => Ok(Some(self.identifier()?)),
            _ => Ok(None),
        }
    }

    fn join(&mut self) -> Result<Option<JoinClause>> {
        let join_type = if self.accept_keyword("LEFT") {
            self.accept_keyword("OUTER");
            self.expect_keyword("JOIN")?;
            JoinType::Left
        } else if self.accept_keyword("INNER") {
            self.expect_keyword("JOIN")?;
            JoinType::Inner
        } else if self.accept_keyword("JOIN") {
            JoinType::Inner
        } else {
            return Ok(None);
        };

        let fetch = self.accept_keyword("FETCH");
        let path = self.dotted_name()?;
        if path.len() < 2 {
            return Err(DbError::ParseError(format!(
                "JOIN needs an association path, found '{}'",
                path.join(".")
            )));
        }
        let explicit_as = self.accept_keyword("AS");
        let alias = self.alias()?;
        if explicit_as && alias.is_none() {
            return Err(self.unexpected("join alias"));
        }
        Ok(Some(JoinClause {
            join_type,
            fetch,
            path,
            alias,
        }))
    }

    fn where_clause(&mut self) -> Result<Option<QueryExpr>> {
        if self.accept_keyword("WHERE") {
            Ok(Some(self.expr()?))
        } else {
            Ok(None)
        }
    }

    // ------------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------------

    fn expr(&mut self) -> Result<QueryExpr> {
        let mut left = self.and()?;
        while self.accept_keyword("OR") {
            let right = self.and()?;
            left = QueryExpr::binary(left, BinaryOperator::Or, right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<QueryExpr> {
        let mut left = self.not()?;
        while self.accept_keyword("AND") {
            let right = self.not()?;
            left = QueryExpr::binary(left, BinaryOperator::And, right);
        }
        Ok(left)
    }

    fn not(&mut self) -> Result<QueryExpr> {
        if self.accept_keyword("NOT") {
            return Ok(QueryExpr::Not(Box::new(self.not()?)));
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<QueryExpr> {
        let left = self.additive()?;

        let comparison = match self.peek() {
            Token::Eq => Some(BinaryOperator::Eq),
            Token::NotEq => Some(BinaryOperator::NotEq),
            Token::Lt => Some(BinaryOperator::Lt),
            Token::LtEq => Some(BinaryOperator::LtEq),
            Token::Gt => Some(BinaryOperator::Gt),
            Token::GtEq => Some(BinaryOperator::GtEq),
            _ => None,
        };
        if let Some(op) = comparison {
            self.advance();
            let right = self.additive()?;
            return Ok(QueryExpr::binary(left, op, right));
        }

        if self.accept_keyword("IS") {
            let negated = self.accept_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(QueryExpr::IsNull {
                expr: Box::new(left),
                negated,
            });
        }

        let negated = if self.peek().is_keyword("NOT")
            && (self.peek_at(1).is_keyword("LIKE") || self.peek_at(1).is_keyword("IN") || self.peek_at(1).is_keyword("BETWEEN"))
        {
            self.advance();
            true
        } else {
            false
        };

        if self.accept_keyword("LIKE") {
            let pattern = self.additive()?;
            return Ok(QueryExpr::Like {
                expr: Box::new(left),
                pattern: Box::new(pattern),
                negated,
            });
        }
        if self.accept_keyword("IN") {
            self.expect(&Token::LParen)?;
            let mut list = vec![self.additive()?];
            while self.accept(&Token::Comma) {
                list.push(self.additive()?);
            }
            self.expect(&Token::RParen)?;
            return Ok(QueryExpr::InList {
                expr: Box::new(left),
                list,
                negated,
            });
        }
        if self.accept_keyword("BETWEEN") {
            let low = self.additive()?;
            self.expect_keyword("AND")?;
            let high = self.additive()?;
            return Ok(QueryExpr::Between {
                expr: Box::new(left),
                low: Box::new(low),
                high: Box::new(high),
                negated,
            });
        }

        Ok(left)
    }

    fn additive(&mut self) -> Result<QueryExpr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinaryOperator::Plus,
                Token::Minus => BinaryOperator::Minus,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.multiplicative()?;
            left = QueryExpr::binary(left, op, right);
        }
    }

    fn multiplicative(&mut self) -> Result<QueryExpr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => return Ok(left),
            };
            self.advance();
            let right = self.unary()?;
            left = QueryExpr::binary(left, op, right);
        }
    }

    fn unary(&mut self) -> Result<QueryExpr> {
        if self.accept(&Token::Minus) {
            return Ok(QueryExpr::Negate(Box::new(self.unary()?)));
        }
        self.accept(&Token::Plus);
        self.primary()
    }

    fn primary(&mut self) -> Result<QueryExpr> {
        match self.advance() {
            Token::Integer(i) => Ok(QueryExpr::Literal(Value::Integer(i))),
            Token::Float(f) => Ok(QueryExpr::Literal(Value::Float(f))),
            Token::Str(s) => Ok(QueryExpr::Literal(Value::Text(s))),
            Token::NamedParam(name) => Ok(QueryExpr::Parameter(ParamRef::Named(name))),
            Token::PositionalParam(index) => Ok(QueryExpr::Parameter(ParamRef::Positional(index))),
            Token::LParen => {
                let inner = self.expr()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Ident(name) => self.identifier_expr(name),
            other => Err(DbError::ParseError(format!("Unexpected {:?} in expression", other))),
        }
    }

    fn identifier_expr(&mut self, name: String) -> Result<QueryExpr> {
        let upper = name.to_ascii_uppercase();
        match upper.as_str() {
            "NULL" => return Ok(QueryExpr::Literal(Value::Null)),
            "TRUE" => return Ok(QueryExpr::Literal(Value::Boolean(true))),
            "FALSE" => return Ok(QueryExpr::Literal(Value::Boolean(false))),
            _ => {}
        }

        if self.peek() != &Token::LParen {
            let mut segments = vec![name];
            while self.accept(&Token::Dot) {
                segments.push(self.identifier()?);
            }
            return Ok(QueryExpr::Path(segments));
        }
        self.advance();

        if upper == "TYPE" {
            let alias = self.identifier()?;
            self.expect(&Token::RParen)?;
            return Ok(QueryExpr::Type(alias));
        }

        if upper == "FUNCTION" {
            let function = match self.advance() {
                Token::Str(function) => function,
                other => {
                    return Err(DbError::ParseError(format!(
                        "FUNCTION expects a quoted function name, found {:?}",
                        other
                    )));
                }
            };
            let func = match AggregateFunction::from_name(&function) {
                Some(AggregateFunction::GroupConcat) => AggregateFunction::GroupConcat,
                _ => {
                    return Err(DbError::ParseError(format!("Unknown function '{}'", function)));
                }
            };
            self.expect(&Token::Comma)?;
            let arg = self.expr()?;
            self.expect(&Token::RParen)?;
            return Ok(QueryExpr::Aggregate {
                func,
                arg: Some(Box::new(arg)),
                distinct: false,
            });
        }

        let func = match AggregateFunction::from_name(&name) {
            Some(AggregateFunction::GroupConcat) | None => {
                return Err(DbError::ParseError(format!("Unknown function '{}'", name)));
            }
            Some(func) => func,
        };
        if func == AggregateFunction::Count && self.accept(&Token::Star) {
            self.expect(&Token::RParen)?;
            return Ok(QueryExpr::Aggregate {
                func,
                arg: None,
                distinct: false,
            });
        }
        let distinct = self.accept_keyword("DISTINCT");
        let arg = self.expr()?;
        self.expect(&Token::RParen)?;
        Ok(QueryExpr::Aggregate {
            func,
            arg: Some(Box::new(arg)),
            distinct,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_select_with_joins_and_order() {
        let QueryStatement::Select(select) = parse(
            "select distinct m from Member m join fetch m.team t left outer join m.orders o \
             where m.age between 10 and 20 and not m.username like 'kim%' order by m.age desc, m.username",
        )
        .unwrap() else {
            panic!("expected a select");
        };

        assert!(select.distinct);
        assert_eq!(select.from, RangeVariable { entity: "Member".into(), alias: "m".into() });
        assert_eq!(select.joins.len(), 2);
        assert!(select.joins[0].fetch);
        assert_eq!(select.joins[0].alias.as_deref(), Some("t"));
        assert_eq!(select.joins[1].join_type, JoinType::Left);
        assert_eq!(select.order_by.len(), 2);
        assert!(select.order_by[0].descending);
        assert!(!select.order_by[1].descending);

        let Some(QueryExpr::Binary { op: BinaryOperator::And, right, .. }) = select.filter else {
            panic!("expected AND");
        };
        assert!(matches!(*right, QueryExpr::Not(_)));
    }

    #[test]
    fn test_parse_projections() {
        let QueryStatement::Select(select) = parse(
            "SELECT NEW jpql.MemberDTO(m.username, m.age), COUNT(*), SUM(DISTINCT m.age), \
             FUNCTION('group_concat', m.username), TYPE(m) FROM Member AS m",
        )
        .unwrap() else {
            panic!("expected a select");
        };

        assert_eq!(select.items.len(), 5);
        assert!(matches!(&select.items[0], SelectItem::Constructor { class, args } if class == "jpql.MemberDTO" && args.len() == 2));
        assert!(matches!(&select.items[1], SelectItem::Expr(QueryExpr::Aggregate { arg: None, .. })));
        assert!(matches!(
            &select.items[2],
            SelectItem::Expr(QueryExpr::Aggregate { func: AggregateFunction::Sum, distinct: true, .. })
        ));
        assert!(matches!(
            &select.items[3],
            SelectItem::Expr(QueryExpr::Aggregate { func: AggregateFunction::GroupConcat, .. })
        ));
        assert_eq!(select.items[4], SelectItem::Expr(QueryExpr::Type("m".into())));
    }

    #[test]
    fn test_parse_precedence() {
        let QueryStatement::Select(select) = parse("SELECT m FROM Member m WHERE m.a = 1 OR m.b = 2 AND m.c + 1 * 2 > ?1").unwrap()
        else {
            panic!("expected a select");
        };
        let Some(QueryExpr::Binary { op: BinaryOperator::Or, right, .. }) = select.filter else {
            panic!("OR must bind loosest");
        };
        let QueryExpr::Binary { op: BinaryOperator::And, right, .. } = *right else {
            panic!("AND binds tighter than OR");
        };
        let QueryExpr::Binary { op: BinaryOperator::Gt, left, right } = *right else {
            panic!("comparison expected");
        };
        assert_eq!(*right, QueryExpr::Parameter(ParamRef::Positional(1)));
        assert!(matches!(*left, QueryExpr::Binary { op: BinaryOperator::Plus, .. }));
    }

    #[test]
    fn test_parse_bulk_statements() {
        let QueryStatement::Update(update) = parse("update Member m set m.age = m.age + 1, m.username = :name where m.age < 20").unwrap()
        else {
            panic!("expected an update");
        };
        assert_eq!(update.assignments.len(), 2);
        assert_eq!(update.assignments[0].0, vec!["m", "age"]);

        let QueryStatement::Delete(delete) = parse("DELETE FROM Member m WHERE m.team IS NOT NULL").unwrap() else {
            panic!("expected a delete");
        };
        assert!(matches!(delete.filter, Some(QueryExpr::IsNull { negated: true, .. })));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse("SELECT m FROM Member"), Err(DbError::ParseError(_))));
        assert!(matches!(parse("SELECT m FROM Member m WHERE"), Err(DbError::ParseError(_))));
        assert!(matches!(parse("SELECT m FROM Member m extra stuff"), Err(DbError::ParseError(_))));
        assert!(matches!(parse("SELECT UPPER(m.x) FROM Member m"), Err(DbError::ParseError(_))));
        assert!(matches!(parse("INSERT INTO Member"), Err(DbError::ParseError(_))));
    }
}
