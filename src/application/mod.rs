//! Analysis pipeline: discover, catalog, resolve.
//!
//! Cataloging and resolution each commit in a single store transaction.

pub mod batch;

use crate::domain::catalog::Catalog;
use crate::domain::declaration::{catalog_declarations, DiscoveredSymbol};
use crate::domain::resolver::{resolve_all, ResolveOptions, ResolveStats};
use crate::domain::store::{CatalogBackend, CatalogStore};
use crate::ports::{CodeIntrospector, SourceDiscovery, SourceFile};
use anyhow::{Context, Result};
use tracing::{info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisReport {
    pub files: usize,
    /// Files whose declarations could not be read.
    pub failed_files: usize,
    pub entities: usize,
    pub resolve: ResolveStats,
}

pub struct AnalyzeUsecase<'a, I: CodeIntrospector> {
    pub discovery: &'a dyn SourceDiscovery,
    pub introspector: &'a I,
    pub options: &'a ResolveOptions,
}

impl<'a, I: CodeIntrospector> AnalyzeUsecase<'a, I> {
    /// Rebuild the catalog in `store` from scratch.
    pub fn run<B: CatalogBackend>(&self, store: &mut CatalogStore<B>) -> Result<AnalysisReport> {
        let sources = self.discovery.discover().context("Source discovery failed")?;
        info!(files = sources.len(), "discovered sources");

        store.clear_all().context("Failed to clear catalog")?;

        let (discovered, failed_files) = store
            .transaction(|catalog| -> Result<_> {
                let mut discovered = Vec::new();
                let mut failed = 0;
                for source in &sources {
                    match self.catalog_source(catalog, source) {
                        Ok(symbols) => discovered.extend(symbols),
                        Err(e) => {
                            warn!("{:#}", e);
                            failed += 1;
                        }
                    }
                }
                Ok((discovered, failed))
            })
            .context("Cataloging phase failed")?;

        let resolve = store
            .transaction(|catalog| -> Result<_> {
                Ok(resolve_all(catalog, self.introspector, &discovered, self.options))
            })
            .context("Resolution phase failed")?;

        let catalog = store.catalog();
        let report = AnalysisReport {
            files: catalog.list_files().len(),
            failed_files,
            entities: catalog.list_entities().len(),
            resolve,
        };
        info!(
            files = report.files,
            entities = report.entities,
            calls = report.resolve.call_rows,
            "analysis complete"
        );
        Ok(report)
    }

    fn catalog_source(
        &self,
        catalog: &mut Catalog,
        source: &SourceFile,
    ) -> Result<Vec<DiscoveredSymbol<I::Symbol>>> {
        let file_id = catalog.add_file(&source.full_path, &source.import_path, source.mod_time);
        let file = catalog
            .file(file_id)
            .cloned()
            .with_context(|| format!("File {} missing after registration", source.full_path))?;
        if file.full_path != source.full_path {
            anyhow::bail!(
                "Skipping {}: import path {} already belongs to {}",
                source.full_path,
                source.import_path,
                file.full_path
            );
        }
        let declarations = self.introspector.declarations(&file)?;
        Ok(catalog_declarations(catalog, file_id, &file.import_path, declarations))
    }
}
