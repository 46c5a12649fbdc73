//! Static scope resolution.
//!
//! Walks the tree once before evaluation and records, for every variable
//! read, assignment and `super` expression, how many frames separate the use
//! from the frame that binds it. Names that resolve to no local scope are
//! left out of the table and looked up in globals at run time.

use std::rc::{Rc, Weak};

use rustc_hash::FxHashMap;

use crate::ast::{ClassDecl, Expr, ExprId, FunctionDecl, Stmt};
use crate::error::StaticError;
use crate::token::Token;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FunctionKind {
    None,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClassKind {
    None,
    Class,
    Subclass,
}

/// The ids resolved directly inside one function body. Their distances are
/// needed only while something still holds the declaration.
#[derive(Debug, Clone)]
pub struct FunctionScope {
    pub decl: Weak<FunctionDecl>,
    pub ids: Vec<ExprId>,
}

#[derive(Debug, Clone, Default)]
pub struct Resolution {
    pub locals: FxHashMap<ExprId, usize>,
    pub functions: Vec<FunctionScope>,
    pub errors: Vec<StaticError>,
}

impl Resolution {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

pub struct Resolver {
    /// Each scope maps a name to whether its initializer has finished.
    scopes: Vec<FxHashMap<String, bool>>,
    resolution: Resolution,
    /// Ids recorded so far for each function being resolved, innermost last.
    function_ids: Vec<Vec<ExprId>>,
    current_function: FunctionKind,
    current_class: ClassKind,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            scopes: Vec::new(),
            resolution: Resolution::default(),
            function_ids: Vec::new(),
            current_function: FunctionKind::None,
            current_class: ClassKind::None,
        }
    }

    pub fn resolve(mut self, statements: &[Stmt]) -> Resolution {
        self.resolve_statements(statements);
        tracing::debug!(
            locals = self.resolution.locals.len(),
            errors = self.resolution.errors.len(),
            "resolved program"
        );
        self.resolution
    }

    fn resolve_statements(&mut self, statements: &[Stmt]) {
        for statement in statements {
            self.resolve_statement(statement);
        }
    }

    fn resolve_statement(&mut self, statement: &Stmt) {
        match statement {
            // Blocks share the enclosing scope.
            Stmt::Block(statements) => self.resolve_statements(statements),
            Stmt::Class(class) => self.resolve_class(class),
            Stmt::Function(function) => {
                self.define(&function.name);
                self.resolve_function(function, FunctionKind::Function);
            }
            Stmt::Expression(expr) => self.resolve_expr(expr),
            Stmt::If {
                branches,
                else_branch,
            } => {
                for (condition, body) in branches {
                    self.resolve_expr(condition);
                    self.resolve_statement(body);
                }
                if let Some(else_branch) = else_branch {
                    self.resolve_statement(else_branch);
                }
            }
            Stmt::While { condition, body } => {
                self.resolve_expr(condition);
                self.resolve_statement(body);
            }
            Stmt::Return { keyword, value } => {
                if self.current_function == FunctionKind::None {
                    self.error(keyword, "Can't return from top-level code.");
                }
                if let Some(value) = value {
                    if self.current_function == FunctionKind::Initializer {
                        self.error(keyword, "Can't return a value from an initializer.");
                    }
                    self.resolve_expr(value);
                }
            }
        }
    }

    fn resolve_class(&mut self, class: &ClassDecl) {
        let enclosing_class = self.current_class;
        self.current_class = ClassKind::Class;
        self.define(&class.name);

        if let Some(superclass) = &class.superclass {
            if let Expr::Variable { name, .. } = superclass
                && name.lexeme == class.name.lexeme
            {
                self.error(name, "A class can't inherit from itself.");
            }
            self.current_class = ClassKind::Subclass;
            self.resolve_expr(superclass);
            self.begin_scope();
            self.define_name("super");
        }

        self.begin_scope();
        self.define_name("self");
        for method in &class.methods {
            let kind = if method.name.lexeme == "__init__" {
                FunctionKind::Initializer
            } else {
                FunctionKind::Method
            };
            self.resolve_function(method, kind);
        }
        self.end_scope();

        if class.superclass.is_some() {
            self.end_scope();
        }
        self.current_class = enclosing_class;
    }

    fn resolve_function(&mut self, function: &Rc<FunctionDecl>, kind: FunctionKind) {
        let enclosing_function = self.current_function;
        self.current_function = kind;
        self.function_ids.push(Vec::new());

        self.begin_scope();
        for param in &function.params {
            self.define(param);
        }
        self.resolve_statements(&function.body);
        self.end_scope();

        let ids = self.function_ids.pop().unwrap_or_default();
        self.resolution.functions.push(FunctionScope {
            decl: Rc::downgrade(function),
            ids,
        });
        self.current_function = enclosing_function;
    }

    fn resolve_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Literal(_) => {}
            Expr::Variable { id, name } => {
                if let Some(scope) = self.scopes.last()
                    && scope.get(&name.lexeme) == Some(&false)
                {
                    self.error(name, "Can't read local variable in its own initializer.");
                }
                self.resolve_local(*id, name);
            }
            Expr::Assign { id, name, value } => {
                // A first assignment declares the name in the innermost scope.
                let declared = self
                    .scopes
                    .last_mut()
                    .is_some_and(|scope| {
                        if scope.contains_key(&name.lexeme) {
                            return false;
                        }
                        scope.insert(name.lexeme.clone(), false);
                        true
                    });
                self.resolve_expr(value);
                if declared {
                    self.define(name);
                }
                self.resolve_local(*id, name);
            }
            Expr::Unary { right, .. } => self.resolve_expr(right),
            Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.resolve_expr(condition);
                self.resolve_expr(then_branch);
                self.resolve_expr(else_branch);
            }
            Expr::Grouping(inner) => self.resolve_expr(inner),
            Expr::List { elements, .. } => {
                for element in elements {
                    self.resolve_expr(element);
                }
            }
            Expr::Dict { entries, .. } => {
                for (key, value) in entries {
                    self.resolve_expr(key);
                    self.resolve_expr(value);
                }
            }
            Expr::Index {
                object,
                index,
                value,
                ..
            } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Expr::Get { object, .. } => self.resolve_expr(object),
            Expr::Set { object, value, .. } => {
                self.resolve_expr(value);
                self.resolve_expr(object);
            }
            Expr::Call {
                callee, arguments, ..
            } => {
                self.resolve_expr(callee);
                for argument in arguments {
                    self.resolve_expr(argument);
                }
            }
            Expr::Await { value, .. } => self.resolve_expr(value),
            Expr::Super { id, keyword, .. } => {
                match self.current_class {
                    ClassKind::None => {
                        self.error(keyword, "Can't use 'super' outside of a class.")
                    }
                    ClassKind::Class => {
                        self.error(keyword, "Can't use 'super' in a class with no superclass.")
                    }
                    ClassKind::Subclass => {}
                }
                self.resolve_local(*id, keyword);
            }
        }
    }

    fn resolve_local(&mut self, id: ExprId, name: &Token) {
        if let Some(depth) = self
            .scopes
            .iter()
            .rev()
            .position(|scope| scope.contains_key(&name.lexeme))
        {
            self.resolution.locals.insert(id, depth);
            if let Some(ids) = self.function_ids.last_mut() {
                ids.push(id);
            }
        }
    }

    fn begin_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    fn end_scope(&mut self) {
        self.scopes.pop();
    }

    fn define(&mut self, name: &Token) {
        self.define_name(&name.lexeme);
    }

    fn define_name(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), true);
        }
    }

    fn error(&mut self, token: &Token, message: &str) {
        self.resolution
            .errors
            .push(StaticError::resolve(token, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse_tokens;
    use indoc::indoc;

    fn resolve_source(source: &str) -> (Vec<Stmt>, Resolution) {
        let parsed = parse_tokens(tokenize(source).tokens);
        assert!(parsed.errors.is_empty(), "parse errors: {:?}", parsed.errors);
        let statements = parsed.into_statements();
        let resolution = Resolver::new().resolve(&statements);
        (statements, resolution)
    }

    fn messages(resolution: &Resolution) -> Vec<String> {
        resolution
            .errors
            .iter()
            .map(|error| error.message.clone())
            .collect()
    }

    #[test]
    fn globals_are_left_unresolved() {
        let (_, resolution) = resolve_source("a = 1\nb = a\n");
        assert!(resolution.locals.is_empty());
        assert!(resolution.errors.is_empty());
    }

    #[test]
    fn closure_reads_resolve_to_enclosing_function() {
        let (statements, resolution) = resolve_source(indoc! {"
            def outer(x):
                def inner():
                    return x
                return inner
        "});
        let Stmt::Function(outer) = &statements[0] else {
            panic!("expected function");
        };
        let Stmt::Function(inner) = &outer.body[0] else {
            panic!("expected nested function");
        };
        let Stmt::Return {
            value: Some(Expr::Variable { id, .. }),
            ..
        } = &inner.body[0]
        else {
            panic!("expected return of variable");
        };
        assert_eq!(resolution.locals.get(id), Some(&1));
    }

    #[test]
    fn super_resolves_two_frames_above_method_body() {
        let (statements, resolution) = resolve_source(indoc! {"
            class A:
                def f(self):
                    return 1
            class B(A):
                def f(self):
                    return super.f()
        "});
        let Stmt::Class(class) = &statements[1] else {
            panic!("expected class");
        };
        let Stmt::Return {
            value: Some(Expr::Call { callee, .. }),
            ..
        } = &class.methods[0].body[0]
        else {
            panic!("expected return of call");
        };
        let Expr::Super { id, .. } = callee.as_ref() else {
            panic!("expected super");
        };
        assert_eq!(resolution.locals.get(id), Some(&2));
    }

    #[test]
    fn reports_static_misuse() {
        let (_, resolution) = resolve_source(indoc! {"
            return 1
            class A(A):
                def __init__(self):
                    return 2
                def g(self):
                    return super.g()
            super.x()
        "});
        assert_eq!(
            messages(&resolution),
            [
                "Can't return from top-level code.",
                "A class can't inherit from itself.",
                "Can't return a value from an initializer.",
                "Can't use 'super' outside of a class.",
            ]
        );
    }

    #[test]
    fn reports_super_without_superclass() {
        let (_, resolution) = resolve_source(indoc! {"
            class A:
                def f(self):
                    return super.f()
        "});
        assert_eq!(
            messages(&resolution),
            ["Can't use 'super' in a class with no superclass."]
        );
    }

    #[test]
    fn reports_self_reference_in_local_initializer() {
        let (_, resolution) = resolve_source(indoc! {"
            def f():
                a = a + 1
        "});
        assert_eq!(
            messages(&resolution),
            ["Can't read local variable in its own initializer."]
        );
    }

    #[test]
    fn reassigning_local_reads_previous_value() {
        let (_, resolution) = resolve_source(indoc! {"
            def f():
                a = 1
                a = a + 1
                return a
        "});
        assert!(resolution.errors.is_empty());
    }

    #[test]
    fn bare_return_in_initializer_is_allowed() {
        let (_, resolution) = resolve_source(indoc! {"
            class A:
                def __init__(self):
                    return
        "});
        assert!(resolution.errors.is_empty());
    }
}
