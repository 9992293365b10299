//! Abstract syntax tree for Drift programs.
//!
//! Statements and expressions are exhaustive sum types so the compiler's
//! lowering and the canonical printers are checked for missing cases at
//! compile time. `Display` renders the canonical printable form used by
//! diagnostics and parser tests.

use std::fmt;

/// A parsed program: the ordered sequence of top-level statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Program {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `let name = value;`
    Let { name: String, value: Expression },
    /// `return value;`
    Return(Expression),
    /// A bare expression used as a statement.
    Expression(Expression),
    /// A braced statement sequence.
    Block(Block),
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Let { name, value } => write!(f, "let {name} = {value};"),
            Self::Return(value) => write!(f, "return {value};"),
            Self::Expression(value) => write!(f, "{value}"),
            Self::Block(block) => write!(f, "{block}"),
        }
    }
}

/// The body of a function, `if` arm, or `macro`.
///
/// Blocks are kept distinct from plain statement lists because each one opens
/// its own lexical scope during compilation.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for statement in &self.statements {
            write!(f, "{statement}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Identifier(String),
    IntegerLiteral(i64),
    StringLiteral(String),
    BooleanLiteral(bool),
    ArrayLiteral(Vec<Expression>),
    /// Key/value pairs in source order; runtime lookup is unordered.
    HashLiteral(Vec<(Expression, Expression)>),
    Prefix {
        operator: PrefixOperator,
        right: Box<Expression>,
    },
    Infix {
        operator: InfixOperator,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    If {
        condition: Box<Expression>,
        consequence: Block,
        alternative: Option<Block>,
    },
    FunctionLiteral {
        /// Set when the literal is the right-hand side of a `let`, enabling
        /// self-reference from the function body.
        name: Option<String>,
        parameters: Vec<String>,
        body: Block,
    },
    Call {
        function: Box<Expression>,
        arguments: Vec<Expression>,
    },
    Index {
        left: Box<Expression>,
        index: Box<Expression>,
    },
    MacroLiteral {
        parameters: Vec<String>,
        body: Block,
    },
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(name) => f.write_str(name),
            Self::IntegerLiteral(value) => write!(f, "{value}"),
            Self::StringLiteral(value) => f.write_str(value),
            Self::BooleanLiteral(value) => write!(f, "{value}"),
            Self::ArrayLiteral(elements) => {
                write!(f, "[{}]", join(elements))
            }
            Self::HashLiteral(pairs) => {
                let rendered: Vec<String> = pairs.iter().map(|(key, value)| format!("{key}:{value}")).collect();
                write!(f, "{{{}}}", rendered.join(", "))
            }
            Self::Prefix { operator, right } => write!(f, "({operator}{right})"),
            Self::Infix { operator, left, right } => write!(f, "({left} {operator} {right})"),
            Self::If {
                condition,
                consequence,
                alternative,
            } => {
                write!(f, "if{condition} {consequence}")?;
                if let Some(alternative) = alternative {
                    write!(f, "else{alternative}")?;
                }
                Ok(())
            }
            Self::FunctionLiteral {
                name,
                parameters,
                body,
            } => {
                f.write_str("fn")?;
                if let Some(name) = name {
                    write!(f, "<{name}>")?;
                }
                write!(f, "({}){body}", parameters.join(", "))
            }
            Self::Call { function, arguments } => {
                write!(f, "{function}({})", join(arguments))
            }
            Self::Index { left, index } => write!(f, "({left}[{index}])"),
            Self::MacroLiteral { parameters, body } => {
                write!(f, "macro({}) {body}", parameters.join(", "))
            }
        }
    }
}

fn join(expressions: &[Expression]) -> String {
    let rendered: Vec<String> = expressions.iter().map(ToString::to_string).collect();
    rendered.join(", ")
}

/// Unary operators; both bind at `PREFIX` precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOperator {
    Bang,
    Minus,
}

impl fmt::Display for PrefixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bang => "!",
            Self::Minus => "-",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfixOperator {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Lt,
    Gt,
}

impl fmt::Display for InfixOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Eq => "==",
            Self::NotEq => "!=",
            Self::Lt => "<",
            Self::Gt => ">",
        })
    }
}
