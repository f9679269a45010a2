// Plain-text outputs: per-file summary and the entity table.

use crate::domain::catalog::{Catalog, EntityId};
use crate::domain::projection::Projection;
use comfy_table::presets::ASCII_MARKDOWN;
use comfy_table::Table;
use std::fmt::Write;

pub struct TextExporter;

impl TextExporter {
    /// Per-file listing of declared entities and what each one calls.
    pub fn summary(catalog: &Catalog, projection: &Projection) -> String {
        let mut out = String::new();
        for file in catalog.list_files() {
            let entities: Vec<_> = projection
                .iter()
                .filter(|(id, _)| catalog.entity(*id).map(|e| e.file_id) == Some(file.id))
                .collect();

            let _ = writeln!(out, "Module: {}", file.import_path);
            let _ = writeln!(out, "({})", file.full_path);
            let _ = writeln!(out, "Defines:");
            for (_, entity) in entities {
                let _ = writeln!(out, "\t- {}", entity.name);
                if entity.calls.is_empty() {
                    let _ = writeln!(out, "\t\t-- No external calls");
                    continue;
                }
                for group in &entity.calls {
                    if let [only] = group.as_slice() {
                        let _ = writeln!(out, "\t\t-- Calls {}", Self::describe(projection, *only));
                    } else {
                        let _ = writeln!(out, "\t\t-- Ambiguous call, may call any of these:");
                        for candidate in group {
                            let _ = writeln!(out, "\t\t\t-- Calls {}", Self::describe(projection, *candidate));
                        }
                    }
                }
            }
            out.push('\n');
        }
        out
    }

    /// Markdown table of entity id, name, kind and file import path.
    pub fn entity_table(projection: &Projection) -> String {
        let mut table = Table::new();
        table
            .load_preset(ASCII_MARKDOWN)
            .set_header(vec!["entityID", "name", "type", "import path"]);
        for (id, entity) in projection.iter() {
            table.add_row(vec![
                id.to_string(),
                entity.name.clone(),
                entity.kind.to_string(),
                entity.file_import_path.clone(),
            ]);
        }
        table.to_string()
    }

    fn describe(projection: &Projection, id: EntityId) -> String {
        match projection.get(id) {
            Some(callee) => format!("{} from {}", callee.name, callee.import_path),
            None => format!("entity {}", id),
        }
    }
}
