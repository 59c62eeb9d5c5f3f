//! Searchable field layout per entity type.

use serde_json::{Map, Value};

use scanvault_core::{EntityType, Record, SearchResult};

use crate::scoring::Scored;

/// How an entity is tied to the owning user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// The table carries the owner column itself.
    Direct(&'static str),
    /// The table references a project, which carries `user_id`.
    ViaProject(&'static str),
}

/// Which columns feed the weighted document of an entity.
#[derive(Debug, Clone, Copy)]
pub struct EntitySpec {
    pub entity_type: EntityType,
    pub table: &'static str,
    /// Weight A.
    pub title_column: &'static str,
    /// Weight B.
    pub path_column: Option<&'static str>,
    /// Weight C.
    pub description_column: &'static str,
    pub scope: Scope,
    /// Columns copied into `SearchResult::metadata`.
    pub metadata_columns: &'static [&'static str],
}

const PROJECT: EntitySpec = EntitySpec {
    entity_type: EntityType::Project,
    table: "projects",
    title_column: "name",
    path_column: Some("path"),
    description_column: "description",
    scope: Scope::Direct("user_id"),
    metadata_columns: &["user_id", "path", "language"],
};

const SCAN: EntitySpec = EntitySpec {
    entity_type: EntityType::Scan,
    table: "scans",
    title_column: "name",
    path_column: None,
    description_column: "summary",
    scope: Scope::ViaProject("project_id"),
    metadata_columns: &["project_id", "status", "file_count", "total_complexity"],
};

const FILE: EntitySpec = EntitySpec {
    entity_type: EntityType::File,
    table: "files",
    title_column: "name",
    path_column: Some("path"),
    description_column: "summary",
    scope: Scope::ViaProject("project_id"),
    metadata_columns: &["project_id", "scan_id", "path", "language", "complexity", "line_count"],
};

const CONFLICT: EntitySpec = EntitySpec {
    entity_type: EntityType::Conflict,
    table: "conflicts",
    title_column: "title",
    path_column: Some("file_path"),
    description_column: "description",
    scope: Scope::ViaProject("project_id"),
    metadata_columns: &["project_id", "file_id", "kind", "severity", "file_path"],
};

impl EntitySpec {
    pub fn of(entity_type: EntityType) -> &'static EntitySpec {
        match entity_type {
            EntityType::Project => &PROJECT,
            EntityType::Scan => &SCAN,
            EntityType::File => &FILE,
            EntityType::Conflict => &CONFLICT,
        }
    }

    /// `search_<table>`.
    pub fn function_name(&self) -> String {
        format!("search_{}", self.table)
    }

    pub fn title<'r>(&self, record: &'r Record) -> Option<&'r str> {
        record.get(self.title_column).and_then(Value::as_str)
    }

    pub fn path<'r>(&self, record: &'r Record) -> Option<&'r str> {
        self.path_column
            .and_then(|column| record.get(column))
            .and_then(Value::as_str)
    }

    pub fn description<'r>(&self, record: &'r Record) -> Option<&'r str> {
        record.get(self.description_column).and_then(Value::as_str)
    }

    fn metadata(&self, record: &Record) -> Value {
        let mut map = Map::new();
        for column in self.metadata_columns {
            if let Some(value) = record.get(column) {
                map.insert(column.to_string(), value.clone());
            }
        }
        Value::Object(map)
    }

    /// Build the search hit for a scored record.
    pub fn to_result(&self, record: &Record, scored: Scored) -> SearchResult {
        SearchResult {
            entity_type: self.entity_type,
            entity_id: record.get_text("id").unwrap_or_default(),
            title: self.title(record).unwrap_or_default().to_string(),
            description: self.description(record).unwrap_or_default().to_string(),
            metadata: self.metadata(record),
            rank: scored.rank,
            match_type: scored.match_type,
            updated_at: record.recency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanvault_core::MatchType;
    use serde_json::json;

    #[test]
    fn test_every_entity_has_a_spec() {
        for entity in EntityType::ALL {
            let spec = EntitySpec::of(entity);
            assert_eq!(spec.entity_type, entity);
            assert_eq!(spec.table, entity.table());
        }
    }

    #[test]
    fn test_to_result_maps_columns() {
        let record = Record::from_json(json!({
            "id": 4,
            "title": "Duplicate handler",
            "description": "two routes",
            "file_path": "src/routes.rs",
            "severity": "high",
            "project_id": 1,
            "created_at": "2026-01-01T00:00:00Z",
        }))
        .unwrap();
        let result = EntitySpec::of(EntityType::Conflict).to_result(
            &record,
            Scored {
                rank: 1.5,
                match_type: MatchType::ExactName,
            },
        );

        assert_eq!(result.entity_id, "4");
        assert_eq!(result.title, "Duplicate handler");
        assert_eq!(result.description, "two routes");
        assert_eq!(
            result.metadata,
            json!({"project_id": 1, "severity": "high", "file_path": "src/routes.rs"})
        );
        assert!(result.updated_at.is_some());
    }
}
