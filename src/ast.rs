use std::rc::Rc;

use crate::token::Token;

/// Identity of an expression node that the resolver annotates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralValue {
    None,
    Bool(bool),
    Number(f64),
    Str(Rc<str>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(LiteralValue),
    Variable {
        id: ExprId,
        name: Token,
    },
    Assign {
        id: ExprId,
        name: Token,
        value: Box<Expr>,
    },
    Unary {
        operator: Token,
        right: Box<Expr>,
    },
    Binary {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    /// `and` / `or`, which short-circuit and yield an operand.
    Logical {
        left: Box<Expr>,
        operator: Token,
        right: Box<Expr>,
    },
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },
    Grouping(Box<Expr>),
    List {
        elements: Vec<Expr>,
        bracket: Token,
    },
    Dict {
        entries: Vec<(Expr, Expr)>,
        brace: Token,
    },
    /// `object[index]`, or `object[index] = value` when `value` is present.
    Index {
        object: Box<Expr>,
        bracket: Token,
        index: Box<Expr>,
        value: Option<Box<Expr>>,
    },
    Get {
        object: Box<Expr>,
        name: Token,
    },
    Set {
        object: Box<Expr>,
        name: Token,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        paren: Token,
        arguments: Vec<Expr>,
    },
    Await {
        keyword: Token,
        value: Box<Expr>,
    },
    Super {
        id: ExprId,
        keyword: Token,
        method: Token,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Stmt>,
    pub is_async: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassDecl {
    pub name: Token,
    pub superclass: Option<Expr>,
    pub methods: Vec<Rc<FunctionDecl>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<Stmt>),
    Class(ClassDecl),
    Function(Rc<FunctionDecl>),
    Expression(Expr),
    If {
        branches: Vec<(Expr, Stmt)>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        condition: Expr,
        body: Box<Stmt>,
    },
    Return {
        keyword: Token,
        value: Option<Expr>,
    },
}
