//! Stored row shapes and their conversion to model types.
//!
//! Field names match the table's attribute names exactly. Optional
//! attributes are omitted rather than written as nulls.

use serde::{Deserialize, Serialize};

use crate::dynamodb::Item;
use crate::error::{RepositoryError, Result};
use crate::keys::{self, SortKey};
use crate::model::{
    Assistant, Availability, CourseDraft, CourseLink, CourseMetadata, SectionRecord, SectionType,
    UnitRecord, DEFAULT_GRADE_LEVEL,
};

fn default_grade_level() -> u8 {
    DEFAULT_GRADE_LEVEL
}

fn id_from_sk(item: &Item) -> Result<String> {
    item.sk()
        .and_then(SortKey::parse)
        .and_then(SortKey::into_id)
        .ok_or_else(|| {
            RepositoryError::InvalidData(format!("Malformed sort key: {:?}", item.sk()))
        })
}

// ============================================================================
// Course rows
// ============================================================================

/// `USER#<email>` / `COURSE#<code>`, indexed under `ALLCOURSES`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CourseLinkRow {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_grade_level")]
    pub grade_level: u8,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub created_at: String,
    #[serde(rename = "GSI1PK")]
    pub gsi1_pk: String,
    #[serde(rename = "GSI1SK")]
    pub gsi1_sk: String,
}

impl CourseLinkRow {
    pub fn new(email: &str, code: &str, draft: &CourseDraft, created_at: &str) -> Self {
        Self {
            pk: keys::user_pk(email),
            sk: keys::course_link_sk(code),
            name: draft.name.clone(),
            description: draft.description.clone(),
            grade_level: draft.grade_level,
            availability: draft.availability,
            created_at: created_at.to_string(),
            gsi1_pk: keys::all_courses_gsi1_pk().to_string(),
            gsi1_sk: keys::course_link_sk(code),
        }
    }

    pub fn from_item(item: &Item) -> Result<CourseLink> {
        let code = id_from_sk(item)?;
        let row: Self = item.to_serde()?;
        Ok(CourseLink {
            code,
            name: row.name,
            description: row.description,
            grade_level: row.grade_level,
            availability: row.availability,
            created_at: row.created_at,
        })
    }
}

/// `COURSE#<code>` / `METADATA`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MetadataRow {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_by: String,
    #[serde(default = "default_grade_level")]
    pub grade_level: u8,
    #[serde(default)]
    pub availability: Availability,
    #[serde(default)]
    pub created_at: String,
}

impl MetadataRow {
    pub fn new(code: &str, draft: &CourseDraft, created_by: &str, created_at: &str) -> Self {
        Self {
            pk: keys::course_pk(code),
            sk: keys::metadata_sk().to_string(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            created_by: created_by.to_string(),
            grade_level: draft.grade_level,
            availability: draft.availability,
            created_at: created_at.to_string(),
        }
    }

    pub fn from_item(code: &str, item: &Item) -> Result<CourseMetadata> {
        let row: Self = item.to_serde()?;
        Ok(CourseMetadata {
            code: code.to_string(),
            name: row.name,
            description: row.description,
            grade_level: row.grade_level,
            availability: row.availability,
            created_by: row.created_by,
            created_at: row.created_at,
        })
    }
}

// ============================================================================
// Unit rows
// ============================================================================

/// `COURSE#<code>` / `UNIT#<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct UnitRow {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub order: u32,
}

impl UnitRow {
    pub fn new(code: &str, unit: &UnitRecord) -> Self {
        Self {
            pk: keys::course_pk(code),
            sk: keys::unit_sk(&unit.id),
            title: unit.title.clone(),
            description: unit.description.clone(),
            order: unit.order,
        }
    }

    pub fn from_item(item: &Item) -> Result<UnitRecord> {
        let id = id_from_sk(item)?;
        let row: Self = item.to_serde()?;
        Ok(UnitRecord {
            id,
            title: row.title,
            description: row.description,
            order: row.order,
        })
    }
}

// ============================================================================
// Section rows
// ============================================================================

/// `COURSE#<code>#UNIT#<unit_id>` / `SECTION#<id>`, indexed under
/// `SECTION#<id>` / `METADATA`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct SectionRow {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub overview: String,
    #[serde(default)]
    pub order: u32,
    #[serde(default)]
    pub section_type: SectionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistant_id: Option<String>,
    #[serde(rename = "GSI1PK")]
    pub gsi1_pk: String,
    #[serde(rename = "GSI1SK")]
    pub gsi1_sk: String,
}

impl SectionRow {
    pub fn new(section: &SectionRecord) -> Self {
        Self {
            pk: keys::section_pk(&section.course_code, &section.unit_id),
            sk: keys::section_sk(&section.id),
            title: section.title.clone(),
            overview: section.overview.clone(),
            order: section.order,
            section_type: section.section_type,
            content: section.content.clone(),
            file_path: section.file_path.clone(),
            assistant_id: section.assistant_id.clone(),
            gsi1_pk: keys::section_gsi1_pk(&section.id),
            gsi1_sk: keys::section_gsi1_sk().to_string(),
        }
    }

    pub fn from_item(item: &Item) -> Result<SectionRecord> {
        let id = id_from_sk(item)?;
        let row: Self = item.to_serde()?;
        let partition = keys::SectionPartition::parse(&row.pk).ok_or_else(|| {
            RepositoryError::InvalidData(format!("Malformed section partition: {}", row.pk))
        })?;
        Ok(SectionRecord {
            id,
            course_code: partition.course_code,
            unit_id: partition.unit_id,
            title: row.title,
            overview: row.overview,
            order: row.order,
            section_type: row.section_type,
            content: row.content,
            file_path: row.file_path,
            assistant_id: row.assistant_id,
        })
    }
}

// ============================================================================
// Assistant rows
// ============================================================================

/// `COURSE#<code>` / `ASSISTANT#<id>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AssistantRow {
    #[serde(rename = "PK")]
    pub pk: String,
    #[serde(rename = "SK")]
    pub sk: String,
    pub assistant_id: String,
    pub name: String,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub created_at: String,
}

impl AssistantRow {
    pub fn new(code: &str, assistant: &Assistant) -> Self {
        Self {
            pk: keys::course_pk(code),
            sk: keys::assistant_sk(&assistant.id),
            assistant_id: assistant.id.clone(),
            name: assistant.name.clone(),
            instructions: assistant.instructions.clone(),
            created_at: assistant.created_at.clone(),
        }
    }

    pub fn from_item(item: &Item) -> Result<Assistant> {
        let row: Self = item.to_serde()?;
        Ok(Assistant {
            id: row.assistant_id,
            name: row.name,
            instructions: row.instructions,
            created_at: row.created_at,
        })
    }
}
