//! Per-entity image batch.
//!
//! Every eligible function or method gets its own pruned, simplified graph
//! rasterized to `<out_dir>/<import_path>.<name>.<ext>`. A failed entity is
//! recorded in the report and the batch moves on.

use crate::domain::catalog::{EntityId, EntityKind};
use crate::domain::projection::{ProjectedEntity, Projection};
use crate::domain::prune::prune;
use crate::ports::dot_exporter::{DotExporter, RenderOptions};
use crate::ports::{Rasterizer, RenderError};
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct BatchJob<'a, R: Rasterizer> {
    pub rasterizer: &'a R,
    pub render: &'a RenderOptions,
    /// Initializer and finalizer names; such entities get no image.
    pub excluded_names: Vec<String>,
    pub out_dir: &'a Path,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub entity: EntityId,
    pub name: String,
    pub error: RenderError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

pub fn is_eligible(entity: &ProjectedEntity, excluded_names: &[String]) -> bool {
    matches!(entity.kind, EntityKind::Function | EntityKind::Method)
        && !excluded_names.iter().any(|n| *n == entity.base_name)
}

/// `import_path.name` with anything outside `[A-Za-z0-9_.-]` replaced.
pub fn output_file_name(entity: &ProjectedEntity, extension: &str) -> String {
    let stem: String = format!("{}.{}", entity.import_path, entity.base_name)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.{}", stem, extension)
}

impl<'a, R: Rasterizer> BatchJob<'a, R> {
    pub fn eligible(&self, projection: &Projection) -> Vec<EntityId> {
        projection
            .iter()
            .filter(|(_, entity)| is_eligible(entity, &self.excluded_names))
            .map(|(id, _)| id)
            .collect()
    }

    /// Render and rasterize the graph around one entity.
    pub fn render_entity(&self, projection: &Projection, id: EntityId, entity: &ProjectedEntity) -> Result<PathBuf, RenderError> {
        let selection = BTreeSet::from([id]);
        let pruned = prune(projection, &selection);
        let options = RenderOptions {
            highlight: selection,
            ..self.render.simplified()
        };
        let dot = DotExporter::to_dot(&pruned, &options);

        let path = self
            .out_dir
            .join(output_file_name(entity, self.rasterizer.extension()));
        self.rasterizer.rasterize(&dot, &path)?;
        debug!(entity = %id, path = %path.display(), "rendered entity");
        Ok(path)
    }

    pub fn run(&self, projection: &Projection, pool: &rayon::ThreadPool) -> Result<BatchReport> {
        fs::create_dir_all(self.out_dir)
            .with_context(|| format!("Failed to create output directory {}", self.out_dir.display()))?;

        let eligible = self.eligible(projection);
        info!(entities = eligible.len(), workers = pool.current_num_threads(), "rendering batch");

        let outcomes: Vec<(EntityId, Result<PathBuf, RenderError>)> = pool.install(|| {
            eligible
                .par_iter()
                .filter_map(|id| {
                    let entity = projection.get(*id)?;
                    Some((*id, self.render_entity(projection, *id, entity)))
                })
                .collect()
        });

        let mut report = BatchReport::default();
        for (id, outcome) in outcomes {
            match outcome {
                Ok(path) => report.written.push(path),
                Err(error) => {
                    let name = projection.get(id).map(|e| e.name.clone()).unwrap_or_default();
                    warn!(entity = %id, "skipping image for {}: {}", name, error);
                    report.failures.push(BatchFailure { entity: id, name, error });
                }
            }
        }
        Ok(report)
    }
}
