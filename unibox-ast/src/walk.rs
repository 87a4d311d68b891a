// Identifier walkers over a whole file
// Visits every `Ident` node in source order, including member names and
// declaration names. Callers decide which ones matter by span or by name.

use crate::*;

pub fn walk_idents(file: &SourceFile, f: &mut impl FnMut(&Ident)) {
    for import in &file.imports {
        if let Some(alias) = &import.alias {
            f(alias);
        }
    }
    for item in &file.items {
        item_idents(item, f);
    }
}

fn item_idents(item: &Item, f: &mut impl FnMut(&Ident)) {
    match item {
        Item::Function(func) => {
            f(&func.name);
            for param in &func.params {
                f(&param.name);
                type_idents(&param.ty, f);
            }
            if let Some(ret) = &func.return_type {
                type_idents(ret, f);
            }
            block_idents(&func.body, f);
        }
        Item::Var(global) | Item::Const(global) => {
            f(&global.name);
            if let Some(ty) = &global.ty {
                type_idents(ty, f);
            }
            if let Some(value) = &global.value {
                expr_idents(value, f);
            }
        }
        Item::TypeAlias(alias) => {
            f(&alias.name);
            type_idents(&alias.target, f);
        }
        Item::Struct(strukt) => {
            f(&strukt.name);
            for field in &strukt.fields {
                f(&field.name);
                type_idents(&field.ty, f);
            }
        }
    }
}

fn type_idents(ty: &TypeExpr, f: &mut impl FnMut(&Ident)) {
    match ty {
        TypeExpr::Named(name) => f(name),
        TypeExpr::Qualified { qualifier, name } => {
            f(qualifier);
            f(name);
        }
        TypeExpr::Slice(inner) => type_idents(inner, f),
    }
}

fn block_idents(block: &Block, f: &mut impl FnMut(&Ident)) {
    for stmt in &block.statements {
        stmt_idents(stmt, f);
    }
}

fn stmt_idents(stmt: &Statement, f: &mut impl FnMut(&Ident)) {
    match stmt {
        Statement::Let { name, ty, value } => {
            f(name);
            if let Some(ty) = ty {
                type_idents(ty, f);
            }
            expr_idents(value, f);
        }
        Statement::Assign { target, value } => {
            expr_idents(target, f);
            expr_idents(value, f);
        }
        Statement::Return(value) => {
            if let Some(value) = value {
                expr_idents(value, f);
            }
        }
        Statement::If(if_stmt) => if_idents(if_stmt, f),
        Statement::While { condition, body } => {
            expr_idents(condition, f);
            block_idents(body, f);
        }
        Statement::Block(block) => block_idents(block, f),
        Statement::Expression(expr) => expr_idents(expr, f),
    }
}

fn if_idents(if_stmt: &IfStatement, f: &mut impl FnMut(&Ident)) {
    expr_idents(&if_stmt.condition, f);
    block_idents(&if_stmt.then_block, f);
    match &if_stmt.else_branch {
        Some(ElseBranch::Block(block)) => block_idents(block, f),
        Some(ElseBranch::If(nested)) => if_idents(nested, f),
        None => {}
    }
}

fn expr_idents(expr: &Expression, f: &mut impl FnMut(&Ident)) {
    match expr {
        Expression::Literal(_) => {}
        Expression::Ident(ident) => f(ident),
        Expression::Member { object, member } => {
            expr_idents(object, f);
            f(member);
        }
        Expression::Call { callee, args } => {
            expr_idents(callee, f);
            for arg in args {
                expr_idents(arg, f);
            }
        }
        Expression::Index { object, index } => {
            expr_idents(object, f);
            expr_idents(index, f);
        }
        Expression::Binary { left, right, .. } => {
            expr_idents(left, f);
            expr_idents(right, f);
        }
        Expression::Unary { expr, .. } | Expression::Paren(expr) => expr_idents(expr, f),
        Expression::Array(elements) => {
            for element in elements {
                expr_idents(element, f);
            }
        }
    }
}

pub fn walk_idents_mut(file: &mut SourceFile, f: &mut impl FnMut(&mut Ident)) {
    for import in &mut file.imports {
        if let Some(alias) = &mut import.alias {
            f(alias);
        }
    }
    for item in &mut file.items {
        item_idents_mut(item, f);
    }
}

fn item_idents_mut(item: &mut Item, f: &mut impl FnMut(&mut Ident)) {
    match item {
        Item::Function(func) => {
            f(&mut func.name);
            for param in &mut func.params {
                f(&mut param.name);
                type_idents_mut(&mut param.ty, f);
            }
            if let Some(ret) = &mut func.return_type {
                type_idents_mut(ret, f);
            }
            block_idents_mut(&mut func.body, f);
        }
        Item::Var(global) | Item::Const(global) => {
            f(&mut global.name);
            if let Some(ty) = &mut global.ty {
                type_idents_mut(ty, f);
            }
            if let Some(value) = &mut global.value {
                expr_idents_mut(value, f);
            }
        }
        Item::TypeAlias(alias) => {
            f(&mut alias.name);
            type_idents_mut(&mut alias.target, f);
        }
        Item::Struct(strukt) => {
            f(&mut strukt.name);
            for field in &mut strukt.fields {
                f(&mut field.name);
                type_idents_mut(&mut field.ty, f);
            }
        }
    }
}

fn type_idents_mut(ty: &mut TypeExpr, f: &mut impl FnMut(&mut Ident)) {
    match ty {
        TypeExpr::Named(name) => f(name),
        TypeExpr::Qualified { qualifier, name } => {
            f(qualifier);
            f(name);
        }
        TypeExpr::Slice(inner) => type_idents_mut(inner, f),
    }
}

fn block_idents_mut(block: &mut Block, f: &mut impl FnMut(&mut Ident)) {
    for stmt in &mut block.statements {
        stmt_idents_mut(stmt, f);
    }
}

fn stmt_idents_mut(stmt: &mut Statement, f: &mut impl FnMut(&mut Ident)) {
    match stmt {
        Statement::Let { name, ty, value } => {
            f(name);
            if let Some(ty) = ty {
                type_idents_mut(ty, f);
            }
            expr_idents_mut(value, f);
        }
        Statement::Assign { target, value } => {
            expr_idents_mut(target, f);
            expr_idents_mut(value, f);
        }
        Statement::Return(value) => {
            if let Some(value) = value {
                expr_idents_mut(value, f);
            }
        }
        Statement::If(if_stmt) => if_idents_mut(if_stmt, f),
        Statement::While { condition, body } => {
            expr_idents_mut(condition, f);
            block_idents_mut(body, f);
        }
        Statement::Block(block) => block_idents_mut(block, f),
        Statement::Expression(expr) => expr_idents_mut(expr, f),
    }
}

fn if_idents_mut(if_stmt: &mut IfStatement, f: &mut impl FnMut(&mut Ident)) {
    expr_idents_mut(&mut if_stmt.condition, f);
    block_idents_mut(&mut if_stmt.then_block, f);
    match &mut if_stmt.else_branch {
        Some(ElseBranch::Block(block)) => block_idents_mut(block, f),
        Some(ElseBranch::If(nested)) => if_idents_mut(nested, f),
        None => {}
    }
}

fn expr_idents_mut(expr: &mut Expression, f: &mut impl FnMut(&mut Ident)) {
    match expr {
        Expression::Literal(_) => {}
        Expression::Ident(ident) => f(ident),
        Expression::Member { object, member } => {
            expr_idents_mut(object, f);
            f(member);
        }
        Expression::Call { callee, args } => {
            expr_idents_mut(callee, f);
            for arg in args {
                expr_idents_mut(arg, f);
            }
        }
        Expression::Index { object, index } => {
            expr_idents_mut(object, f);
            expr_idents_mut(index, f);
        }
        Expression::Binary { left, right, .. } => {
            expr_idents_mut(left, f);
            expr_idents_mut(right, f);
        }
        Expression::Unary { expr, .. } | Expression::Paren(expr) => expr_idents_mut(expr, f),
        Expression::Array(elements) => {
            for element in elements {
                expr_idents_mut(element, f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SourceFile {
        SourceFile {
            imports: vec![Import {
                alias: Some(Ident::new("s", 7..8)),
                path: "lib/strings".to_string(),
                span: 0..23,
            }],
            items: vec![Item::Function(Function {
                name: Ident::new("main", 28..32),
                params: vec![],
                return_type: None,
                body: Block {
                    statements: vec![Statement::Expression(Expression::Call {
                        callee: Box::new(Expression::Member {
                            object: Box::new(Expression::Ident(Ident::new("s", 37..38))),
                            member: Ident::new("upper", 39..44),
                        }),
                        args: vec![Expression::Ident(Ident::new("name", 45..49))],
                    })],
                },
            })],
        }
    }

    #[test]
    fn test_walk_order() {
        let mut seen = Vec::new();
        walk_idents(&sample(), &mut |ident| seen.push(ident.name.clone()));
        assert_eq!(seen, vec!["s", "main", "s", "upper", "name"]);
    }

    #[test]
    fn test_walk_mut_renames_by_span() {
        let mut file = sample();
        walk_idents_mut(&mut file, &mut |ident| {
            if ident.span == (37..38) {
                ident.name = "s2".to_string();
            }
        });
        let mut seen = Vec::new();
        walk_idents(&file, &mut |ident| seen.push(ident.name.clone()));
        assert_eq!(seen, vec!["s", "main", "s2", "upper", "name"]);
    }
}
