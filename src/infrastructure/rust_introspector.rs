//! Rust source introspector.
//!
//! Builds the declaration tree of a `.rs` file with `syn` and records, for
//! every function and method, the names its body references in evaluation
//! order.

use crate::domain::catalog::{EntityKind, FileRecord};
use crate::domain::declaration::Declaration;
use crate::ports::CodeIntrospector;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::fs;
use syn::punctuated::Punctuated;
use syn::visit::Visit;
use syn::{Block, Expr, ExprMethodCall, ExprPath, ExprStruct, ImplItem, Item, Macro, Token, TraitItem, Type};

/// Handle of one declared Rust item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustSymbol {
    pub qualified_name: String,
    pub references: Vec<String>,
}

#[derive(Debug, Default)]
pub struct RustIntrospector;

impl RustIntrospector {
    /// Declaration tree of one source text, rooted at `scope`.
    pub fn parse_declarations(src: &str, scope: &str) -> Result<Vec<Declaration<RustSymbol>>> {
        let ast = syn::parse_file(src).context("Failed to parse Rust source")?;
        Ok(Self::declare_items(&ast.items, scope))
    }

    fn declare_items(items: &[Item], scope: &str) -> Vec<Declaration<RustSymbol>> {
        let mut decls: Vec<Declaration<RustSymbol>> = Vec::new();
        // type name -> index into decls
        let mut classes: HashMap<String, usize> = HashMap::new();

        for item in items {
            match item {
                Item::Fn(func) => {
                    let name = func.sig.ident.to_string();
                    decls.push(Declaration::new(
                        name.clone(),
                        EntityKind::Function,
                        Self::symbol(scope, &name, Some(&func.block)),
                    ));
                }
                Item::Struct(s) => {
                    Self::class_slot(&mut decls, &mut classes, &s.ident.to_string(), scope);
                }
                Item::Enum(e) => {
                    Self::class_slot(&mut decls, &mut classes, &e.ident.to_string(), scope);
                }
                Item::Union(u) => {
                    Self::class_slot(&mut decls, &mut classes, &u.ident.to_string(), scope);
                }
                Item::Trait(t) => {
                    let type_name = t.ident.to_string();
                    let slot = Self::class_slot(&mut decls, &mut classes, &type_name, scope);
                    let class_scope = format!("{}.{}", scope, type_name);
                    for trait_item in &t.items {
                        if let TraitItem::Fn(method) = trait_item {
                            let name = method.sig.ident.to_string();
                            decls[slot].children.push(Declaration::new(
                                name.clone(),
                                EntityKind::Method,
                                Self::symbol(&class_scope, &name, method.default.as_ref()),
                            ));
                        }
                    }
                }
                Item::Impl(imp) => {
                    let Type::Path(tp) = &*imp.self_ty else {
                        continue;
                    };
                    let Some(segment) = tp.path.segments.last() else {
                        continue;
                    };
                    let type_name = segment.ident.to_string();
                    let slot = Self::class_slot(&mut decls, &mut classes, &type_name, scope);
                    let class_scope = format!("{}.{}", scope, type_name);
                    for impl_item in &imp.items {
                        if let ImplItem::Fn(method) = impl_item {
                            let name = method.sig.ident.to_string();
                            decls[slot].children.push(Declaration::new(
                                name.clone(),
                                EntityKind::Method,
                                Self::symbol(&class_scope, &name, Some(&method.block)),
                            ));
                        }
                    }
                }
                Item::Mod(module) => {
                    // `mod foo;` lives in its own file
                    if let Some((_, content)) = &module.content {
                        let name = module.ident.to_string();
                        let nested = format!("{}.{}", scope, name);
                        decls.push(
                            Declaration::new(name.clone(), EntityKind::Module, Self::symbol(scope, &name, None))
                                .with_children(Self::declare_items(content, &nested)),
                        );
                    }
                }
                _ => {}
            }
        }

        decls
    }

    /// Index of the class declaration for `type_name`, creating it on first use.
    fn class_slot(
        decls: &mut Vec<Declaration<RustSymbol>>,
        classes: &mut HashMap<String, usize>,
        type_name: &str,
        scope: &str,
    ) -> usize {
        if let Some(slot) = classes.get(type_name) {
            return *slot;
        }
        decls.push(Declaration::new(
            type_name,
            EntityKind::Class,
            Self::symbol(scope, type_name, None),
        ));
        classes.insert(type_name.to_string(), decls.len() - 1);
        decls.len() - 1
    }

    fn symbol(scope: &str, name: &str, body: Option<&Block>) -> RustSymbol {
        let references = body.map(collect_references).unwrap_or_default();
        RustSymbol {
            qualified_name: format!("{}.{}", scope, name),
            references,
        }
    }
}

impl CodeIntrospector for RustIntrospector {
    type Symbol = RustSymbol;

    fn declarations(&self, file: &FileRecord) -> Result<Vec<Declaration<RustSymbol>>> {
        let src = fs::read_to_string(&file.full_path)
            .with_context(|| format!("Failed to read file {}", file.full_path))?;
        Self::parse_declarations(&src, &file.import_path)
            .with_context(|| format!("Unable to process file {}", file.full_path))
    }

    fn reference_stream(&self, symbol: &RustSymbol) -> Result<Vec<String>> {
        Ok(symbol.references.clone())
    }
}

/// Names referenced by a body, in evaluation order.
pub fn collect_references(block: &Block) -> Vec<String> {
    let mut collector = ReferenceCollector::default();
    collector.visit_block(block);
    collector.names
}

#[derive(Default)]
struct ReferenceCollector {
    names: Vec<String>,
}

impl<'ast> Visit<'ast> for ReferenceCollector {
    fn visit_expr_path(&mut self, node: &'ast ExprPath) {
        self.names
            .extend(node.path.segments.iter().map(|s| s.ident.to_string()));
    }

    fn visit_expr_struct(&mut self, node: &'ast ExprStruct) {
        if let Some(last) = node.path.segments.last() {
            self.names.push(last.ident.to_string());
        }
        for field in &node.fields {
            self.visit_expr(&field.expr);
        }
        if let Some(rest) = &node.rest {
            self.visit_expr(rest);
        }
    }

    fn visit_expr_method_call(&mut self, node: &'ast ExprMethodCall) {
        self.visit_expr(&node.receiver);
        self.names.push(node.method.to_string());
        for arg in &node.args {
            self.visit_expr(arg);
        }
    }

    fn visit_macro(&mut self, node: &'ast Macro) {
        // Most call-like macros (println!, vec!, assert!) take a comma list.
        if let Ok(args) = node.parse_body_with(Punctuated::<Expr, Token![,]>::parse_terminated) {
            for arg in &args {
                self.visit_expr(arg);
            }
        }
    }

    // Nested items have bodies of their own.
    fn visit_item(&mut self, _node: &'ast Item) {}
}
