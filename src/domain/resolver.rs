//! Call resolution.
//!
//! Turns the names referenced inside each caller's body into call rows.
//! A referenced name may match several cataloged entities; every candidate
//! is written as its own row and the rows of one call site share a
//! [`CollisionKey`], so ambiguity is kept in the data rather than guessed away.

use crate::domain::catalog::{Catalog, CollisionKey, EntityId, FileId};
use crate::domain::declaration::DiscoveredSymbol;
use crate::ports::CodeIntrospector;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolveOptions {
    /// Drop references to initializer symbols entirely.
    pub suppress_initializer_calls: bool,
    /// Prefer candidates declared in the caller's own file.
    pub match_to_file: bool,
    pub initializer_names: Vec<String>,
    /// Upper bound on rows written for one call site; `None` keeps all.
    /// Non-zero so every matched site writes at least one row.
    pub max_candidates: Option<NonZeroUsize>,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            suppress_initializer_calls: false,
            match_to_file: false,
            initializer_names: vec!["new".to_string(), "__init__".to_string()],
            max_candidates: None,
        }
    }
}

impl ResolveOptions {
    pub fn is_initializer(&self, name: &str) -> bool {
        self.initializer_names.iter().any(|n| n == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveStats {
    pub callers: usize,
    pub skipped_callers: usize,
    pub call_sites: usize,
    pub call_rows: usize,
}

/// Candidate callees for one referenced name.
pub fn candidates(
    catalog: &Catalog,
    name: &str,
    caller_file: FileId,
    options: &ResolveOptions,
) -> Vec<EntityId> {
    let all = catalog.find_entity_ids_by_name(name, None);
    let mut chosen = if options.match_to_file {
        let local: Vec<EntityId> = all
            .iter()
            .copied()
            .filter(|id| catalog.entity(*id).map(|e| e.file_id) == Some(caller_file))
            .collect();
        if local.is_empty() {
            all
        } else {
            local
        }
    } else {
        all
    };
    if let Some(limit) = options.max_candidates {
        chosen.truncate(limit.get());
    }
    chosen
}

/// Write the call rows for one caller's reference stream.
///
/// The call-site sequence advances once per matched, non-suppressed name,
/// however many candidate rows that name produces.
pub fn resolve_caller(
    catalog: &mut Catalog,
    caller: EntityId,
    caller_file: FileId,
    stream: &[String],
    options: &ResolveOptions,
) -> ResolveStats {
    let mut stats = ResolveStats {
        callers: 1,
        ..Default::default()
    };
    let mut sequence = 0usize;

    for name in stream {
        if !catalog.has_name(name) {
            continue;
        }
        if options.suppress_initializer_calls && options.is_initializer(name) {
            continue;
        }

        let key = CollisionKey::new(caller, sequence);
        for callee in candidates(catalog, name, caller_file, options) {
            catalog.add_call(caller, callee, key.clone());
            stats.call_rows += 1;
        }
        stats.call_sites += 1;
        sequence += 1;
    }

    stats
}

/// Resolve every discovered symbol. A symbol whose reference stream cannot
/// be read is skipped and contributes no rows.
pub fn resolve_all<I: CodeIntrospector>(
    catalog: &mut Catalog,
    introspector: &I,
    discovered: &[DiscoveredSymbol<I::Symbol>],
    options: &ResolveOptions,
) -> ResolveStats {
    let mut total = ResolveStats::default();

    for symbol in discovered {
        let stream = match introspector.reference_stream(&symbol.symbol) {
            Ok(stream) => stream,
            Err(e) => {
                warn!(entity = %symbol.entity_id, name = %symbol.name, "cannot read references: {:#}", e);
                total.skipped_callers += 1;
                continue;
            }
        };

        let stats = resolve_caller(catalog, symbol.entity_id, symbol.file_id, &stream, options);
        debug!(
            entity = %symbol.entity_id,
            name = %symbol.name,
            sites = stats.call_sites,
            rows = stats.call_rows,
            "resolved caller"
        );
        total.callers += stats.callers;
        total.call_sites += stats.call_sites;
        total.call_rows += stats.call_rows;
    }

    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::catalog::{EntityKind, FileRecord, NewEntity};
    use crate::domain::declaration::Declaration;
    use std::collections::BTreeMap;

    fn function(catalog: &mut Catalog, file: FileId, name: &str, path: &str) -> EntityId {
        catalog
            .add_entity(NewEntity {
                file_id: file,
                name,
                kind: EntityKind::Function,
                import_path: path,
                member_of_class: None,
            })
            .id()
    }

    fn names(stream: &[&str]) -> Vec<String> {
        stream.iter().map(|s| s.to_string()).collect()
    }

    fn keys_for(catalog: &Catalog, caller: EntityId) -> BTreeMap<String, Vec<EntityId>> {
        let mut groups: BTreeMap<String, Vec<EntityId>> = BTreeMap::new();
        for call in catalog.list_calls().iter().filter(|c| c.caller == caller) {
            groups
                .entry(call.collision_key.as_str().to_string())
                .or_default()
                .push(call.callee);
        }
        groups
    }

    #[test]
    fn test_sequence_advances_once_per_matched_reference() {
        let mut catalog = Catalog::new();
        let a_file = catalog.add_file("/a.rs", "pkg.a", 0);
        let b_file = catalog.add_file("/b.rs", "pkg.b", 0);
        let a1 = function(&mut catalog, a_file, "A", "pkg.a");
        let a2 = function(&mut catalog, b_file, "A", "pkg.b");
        let b = function(&mut catalog, a_file, "B", "pkg.a");
        let caller = function(&mut catalog, a_file, "caller", "pkg.a");

        let stats = resolve_caller(
            &mut catalog,
            caller,
            a_file,
            &names(&["A", "unknown", "B", "A"]),
            &ResolveOptions::default(),
        );

        let groups = keys_for(&catalog, caller);
        let k = |seq: usize| CollisionKey::new(caller, seq).as_str().to_string();
        assert_eq!(groups[&k(0)], vec![a1, a2]);
        assert_eq!(groups[&k(1)], vec![b]);
        assert_eq!(groups[&k(2)], vec![a1, a2]);
        assert_eq!(stats.call_sites, 3);
        assert_eq!(stats.call_rows, 5);
    }

    #[test]
    fn test_match_to_file_prefers_local_candidates() {
        let mut catalog = Catalog::new();
        let a_file = catalog.add_file("/a.rs", "pkg.a", 0);
        let b_file = catalog.add_file("/b.rs", "pkg.b", 0);
        let local = function(&mut catalog, a_file, "f", "pkg.a");
        function(&mut catalog, b_file, "f", "pkg.b");

        let options = ResolveOptions {
            match_to_file: true,
            ..Default::default()
        };
        assert_eq!(candidates(&catalog, "f", a_file, &options), vec![local]);
    }

    #[test]
    fn test_match_to_file_falls_back_to_all_files() {
        let mut catalog = Catalog::new();
        let a_file = catalog.add_file("/a.rs", "pkg.a", 0);
        let b_file = catalog.add_file("/b.rs", "pkg.b", 0);
        let c_file = catalog.add_file("/c.rs", "pkg.c", 0);
        let fb = function(&mut catalog, b_file, "f", "pkg.b");
        let fc = function(&mut catalog, c_file, "f", "pkg.c");

        let options = ResolveOptions {
            match_to_file: true,
            ..Default::default()
        };
        assert_eq!(candidates(&catalog, "f", a_file, &options), vec![fb, fc]);
    }

    #[test]
    fn test_suppressed_initializer_consumes_no_sequence() {
        let mut catalog = Catalog::new();
        let file = catalog.add_file("/a.rs", "pkg.a", 0);
        function(&mut catalog, file, "new", "pkg.a");
        let g = function(&mut catalog, file, "g", "pkg.a");
        let caller = function(&mut catalog, file, "caller", "pkg.a");

        let options = ResolveOptions {
            suppress_initializer_calls: true,
            ..Default::default()
        };
        resolve_caller(&mut catalog, caller, file, &names(&["new", "g"]), &options);

        let groups = keys_for(&catalog, caller);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[CollisionKey::new(caller, 0).as_str()], vec![g]);
    }

    #[test]
    fn test_max_candidates_caps_rows_not_sequence() {
        let mut catalog = Catalog::new();
        let file = catalog.add_file("/a.rs", "pkg.a", 0);
        let first = function(&mut catalog, file, "run", "pkg.a");
        function(&mut catalog, file, "run", "pkg.a.Job");
        let caller = function(&mut catalog, file, "caller", "pkg.a");

        let options = ResolveOptions {
            max_candidates: NonZeroUsize::new(1),
            ..Default::default()
        };
        let stats = resolve_caller(&mut catalog, caller, file, &names(&["run", "run"]), &options);
        assert_eq!(stats.call_sites, 2);
        assert_eq!(stats.call_rows, 2);
        assert!(catalog.list_calls().iter().all(|c| c.callee == first));
    }

    struct FlakyIntrospector;

    impl CodeIntrospector for FlakyIntrospector {
        type Symbol = Option<Vec<String>>;

        fn declarations(&self, _file: &FileRecord) -> anyhow::Result<Vec<Declaration<Self::Symbol>>> {
            Ok(Vec::new())
        }

        fn reference_stream(&self, symbol: &Self::Symbol) -> anyhow::Result<Vec<String>> {
            symbol.clone().ok_or_else(|| anyhow::anyhow!("symbol is not introspectable"))
        }
    }

    #[test]
    fn test_failing_caller_is_skipped() {
        let mut catalog = Catalog::new();
        let file = catalog.add_file("/a.rs", "pkg.a", 0);
        let target = function(&mut catalog, file, "target", "pkg.a");
        let good = function(&mut catalog, file, "good", "pkg.a");
        let bad = function(&mut catalog, file, "bad", "pkg.a");

        let discovered = vec![
            DiscoveredSymbol {
                entity_id: bad,
                file_id: file,
                name: "bad".to_string(),
                symbol: None,
            },
            DiscoveredSymbol {
                entity_id: good,
                file_id: file,
                name: "good".to_string(),
                symbol: Some(names(&["target"])),
            },
        ];
        let stats = resolve_all(&mut catalog, &FlakyIntrospector, &discovered, &ResolveOptions::default());

        assert_eq!(stats.callers, 1);
        assert_eq!(stats.skipped_callers, 1);
        assert_eq!(catalog.list_calls().len(), 1);
        assert_eq!(catalog.list_calls()[0].caller, good);
        assert_eq!(catalog.list_calls()[0].callee, target);
    }
}
