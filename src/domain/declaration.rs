// Declaration tree handed over by a code introspector.
// Each node is a declared symbol together with the introspector's own handle
// for it, so reference streams can be requested later without re-reading.

use crate::domain::catalog::{Catalog, EntityId, EntityKind, FileId, NewEntity};
use tracing::debug;

/// A declared symbol and the symbols nested inside it.
#[derive(Debug, Clone)]
pub struct Declaration<S> {
    pub name: String,
    pub kind: EntityKind,
    pub symbol: S,
    pub children: Vec<Declaration<S>>,
}

impl<S> Declaration<S> {
    pub fn new(name: impl Into<String>, kind: EntityKind, symbol: S) -> Self {
        Self {
            name: name.into(),
            kind,
            symbol,
            children: Vec::new(),
        }
    }

    pub fn with_children(mut self, children: Vec<Declaration<S>>) -> Self {
        self.children = children;
        self
    }

    /// Number of declarations in this subtree, including `self`.
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(Declaration::count).sum::<usize>()
    }
}

/// A freshly cataloged executable symbol, waiting for call resolution.
#[derive(Debug, Clone)]
pub struct DiscoveredSymbol<S> {
    pub entity_id: EntityId,
    pub file_id: FileId,
    pub name: String,
    pub symbol: S,
}

/// Register a file's declaration tree in depth-first document order.
///
/// `memberOfClass` is bound from the class's already-assigned id, so
/// containment needs no second pass. Only newly created executable entities
/// are returned for call resolution.
pub fn catalog_declarations<S>(
    catalog: &mut Catalog,
    file_id: FileId,
    import_path: &str,
    declarations: Vec<Declaration<S>>,
) -> Vec<DiscoveredSymbol<S>> {
    let mut discovered = Vec::new();
    for declaration in declarations {
        register(catalog, file_id, import_path, None, declaration, &mut discovered);
    }
    discovered
}

fn register<S>(
    catalog: &mut Catalog,
    file_id: FileId,
    container: &str,
    owner: Option<EntityId>,
    declaration: Declaration<S>,
    discovered: &mut Vec<DiscoveredSymbol<S>>,
) {
    let Declaration {
        name,
        kind,
        symbol,
        children,
    } = declaration;

    let registration = catalog.add_entity(NewEntity {
        file_id,
        name: &name,
        kind,
        import_path: container,
        member_of_class: if kind == EntityKind::Module { None } else { owner },
    });
    if !registration.is_created() {
        debug!(name = %name, container, "entity already cataloged");
    }

    let nested_owner = match kind {
        EntityKind::Class => Some(registration.id()),
        _ => None,
    };
    let nested_path = format!("{}.{}", container, name);

    if kind.is_executable() && registration.is_created() {
        discovered.push(DiscoveredSymbol {
            entity_id: registration.id(),
            file_id,
            name,
            symbol,
        });
    }

    for child in children {
        register(catalog, file_id, &nested_path, nested_owner, child, discovered);
    }
}
