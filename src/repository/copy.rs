use std::collections::HashMap;

use tracing::{info, warn};
use uuid::Uuid;

use crate::dynamodb::Item;
use crate::error::{RepositoryError, Result};
use crate::keys;
use crate::model::{
    validate_course_code, Assistant, AssistantSelector, CopySummary, CourseDraft, SectionRecord,
    SectionType, UnitRecord,
};
use crate::objects::normalize_key;
use crate::repository::rows::{AssistantRow, MetadataRow, SectionRow, UnitRow};
use crate::repository::{as_entity, now, CourseRepository};

impl CourseRepository {
    /// Deep-copies a course's metadata, units, sections, files and custom
    /// assistants into `target`.
    ///
    /// Every copied unit, section and assistant gets a fresh id, and section
    /// references to copied assistants follow the new ids. A section whose
    /// file cannot be copied becomes a content section carrying the error.
    ///
    /// When `target` already exists it keeps its own name, owner and creation
    /// time. Its description, grade level and availability are replaced by
    /// the source's. A missing target is created with the source's metadata.
    ///
    /// Only the metadata row is written transactionally. The remaining steps
    /// commit one by one, so a failure part-way leaves a partial target.
    pub async fn copy_course_contents(&self, source: &str, target: &str) -> Result<CopySummary> {
        let result = self.clone_course(source, target).await;
        self.finish_write("copying course contents", result).await
    }

    /// Creates `target` for `email` as a copy of `source` named `name`, then
    /// copies the contents.
    pub async fn duplicate_course(
        &self,
        email: &str,
        source: &str,
        target: &str,
        name: &str,
    ) -> Result<CopySummary> {
        let metadata = self
            .get_course_metadata(source)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Course", source))?;
        let draft = CourseDraft::new(name, metadata.description, metadata.grade_level)
            .with_availability(metadata.availability);
        self.create_course(email, target, &draft).await?;
        self.copy_course_contents(source, target).await
    }

    async fn clone_course(&self, source: &str, target: &str) -> Result<CopySummary> {
        validate_course_code(target)?;
        if source == target {
            return Err(RepositoryError::InvalidData(
                "A course cannot be copied onto itself".to_string(),
            ));
        }
        let source_metadata = self
            .load_course_metadata(source)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Course", source))?;

        let existing = self.load_course_metadata(target).await?;
        let (name, created_by, created_at) = match existing {
            Some(target_metadata) => (
                target_metadata.name,
                target_metadata.created_by,
                target_metadata.created_at,
            ),
            None => (
                source_metadata.name.clone(),
                source_metadata.created_by.clone(),
                now(),
            ),
        };
        let draft = CourseDraft::new(name, source_metadata.description, source_metadata.grade_level)
            .with_availability(source_metadata.availability);
        let metadata = MetadataRow::new(target, &draft, &created_by, &created_at);
        self.store.transact_put(Item::from_serde(&metadata)?).await?;

        let assistants = self.load_custom_assistants(source).await?;
        let assistant_ids: HashMap<String, String> = assistants
            .iter()
            .map(|a| (a.id.clone(), Uuid::new_v4().to_string()))
            .collect();

        let mut summary = CopySummary::default();
        for unit in self.load_course_units(source).await? {
            let new_unit = UnitRecord {
                id: Uuid::new_v4().to_string(),
                ..unit.clone()
            };
            self.store
                .put_if_absent(Item::from_serde(&UnitRow::new(target, &new_unit))?)
                .await
                .map_err(|e| as_entity(e, "Unit"))?;
            summary.units += 1;

            for section in self.load_unit_sections(source, &unit.id).await? {
                let copied = self
                    .copy_section(&section, target, &new_unit.id, &assistant_ids)
                    .await;
                if copied.section_type != section.section_type {
                    summary.degraded_sections += 1;
                }
                self.store
                    .put_if_absent(Item::from_serde(&SectionRow::new(&copied))?)
                    .await
                    .map_err(|e| as_entity(e, "Section"))?;
                summary.sections += 1;
            }
        }

        for assistant in &assistants {
            let copy = Assistant {
                id: assistant_ids
                    .get(&assistant.id)
                    .cloned()
                    .unwrap_or_else(|| Uuid::new_v4().to_string()),
                ..assistant.clone()
            };
            self.store
                .put_if_absent(Item::from_serde(&AssistantRow::new(target, &copy))?)
                .await
                .map_err(|e| as_entity(e, "Assistant"))?;
            summary.assistants += 1;
        }

        info!(
            "Copied '{source}' to '{target}': {} units, {} sections ({} degraded), {} assistants",
            summary.units, summary.sections, summary.degraded_sections, summary.assistants
        );
        Ok(summary)
    }

    async fn copy_section(
        &self,
        section: &SectionRecord,
        target: &str,
        unit_id: &str,
        assistant_ids: &HashMap<String, String>,
    ) -> SectionRecord {
        let id = Uuid::new_v4().to_string();
        let assistant_id = section.assistant_id.as_ref().map(|stored| {
            match AssistantSelector::from_stored(Some(stored.as_str())) {
                AssistantSelector::Custom(old) => {
                    assistant_ids.get(&old).cloned().unwrap_or(old)
                }
                _ => stored.clone(),
            }
        });
        let mut copy = SectionRecord {
            id,
            course_code: target.to_string(),
            unit_id: unit_id.to_string(),
            assistant_id,
            ..section.clone()
        };

        if section.section_type == SectionType::File {
            match self.copy_section_file(section, target, &copy.id).await {
                Ok(key) => copy.file_path = Some(key),
                Err(e) => {
                    warn!("Error copying file for section '{}': {e}", section.id);
                    copy.section_type = SectionType::Content;
                    copy.file_path = None;
                    copy.content = Some(format!(
                        "Error: Could not copy original file content. {e}"
                    ));
                }
            }
        } else {
            copy.content = Some(section.content.clone().unwrap_or_default());
        }
        copy
    }

    async fn copy_section_file(
        &self,
        section: &SectionRecord,
        target: &str,
        new_section_id: &str,
    ) -> Result<String> {
        let path = section.file_path.as_deref().ok_or_else(|| {
            RepositoryError::ObjectStore("Section has no file path".to_string())
        })?;
        let bytes = self
            .objects
            .download(normalize_key(path))
            .await?
            .ok_or_else(|| {
                RepositoryError::ObjectStore("Could not retrieve file content".to_string())
            })?;
        let key = keys::course_object_key(target, &keys::section_file_name(new_section_id));
        self.objects.upload(&key, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use crate::error::RepositoryError;
    use crate::model::{
        AssistantSelector, Availability, CourseDraft, NewSection, SectionBody, SectionType,
    };
    use crate::objects::ObjectStore;
    use crate::repository::testing::{fixture_with_course, Fixture, TEACHER};

    /// astro-12 with two units: one with a text and a file section, one with
    /// a text section using a custom assistant.
    async fn populated() -> (Fixture, String) {
        let f = fixture_with_course("astro-12").await;
        let assistant = f
            .repo
            .create_custom_assistant("astro-12", "Lab Helper", "Guide the lab")
            .await
            .unwrap();

        let stars = f.repo.create_unit("astro-12", "Stars", "Fusion").await.unwrap();
        f.repo
            .create_section(
                "astro-12",
                &stars,
                NewSection::new("Intro", "o", SectionBody::Content("# Stars".into())),
            )
            .await
            .unwrap();
        let key = f
            .repo
            .upload_section_file("astro-12", "reading", b"%PDF".to_vec())
            .await
            .unwrap();
        f.repo
            .create_section(
                "astro-12",
                &stars,
                NewSection::new("Reading", "o", SectionBody::File(key)).with_id("reading"),
            )
            .await
            .unwrap();

        let planets = f.repo.create_unit("astro-12", "Planets", "").await.unwrap();
        f.repo
            .create_section(
                "astro-12",
                &planets,
                NewSection::new("Orbits", "o", SectionBody::Content("Kepler".into()))
                    .with_assistant(AssistantSelector::Custom(assistant.clone())),
            )
            .await
            .unwrap();
        (f, assistant)
    }

    #[tokio::test]
    async fn test_copy_preserves_structure_with_new_ids() {
        let (f, _) = populated().await;

        let summary = f
            .repo
            .copy_course_contents("astro-12", "astro-12-copy")
            .await
            .unwrap();
        assert_eq!((summary.units, summary.sections, summary.assistants), (2, 3, 1));
        assert_eq!(summary.degraded_sections, 0);

        let source_units = f.repo.get_course_units("astro-12").await.unwrap();
        let target_units = f.repo.get_course_units("astro-12-copy").await.unwrap();
        assert_eq!(source_units.len(), target_units.len());

        let mut source_ids = HashSet::new();
        let mut target_ids = HashSet::new();
        for (s, t) in source_units.iter().zip(&target_units) {
            assert_eq!(s.title, t.title);
            assert_eq!(s.order, t.order);
            source_ids.insert(s.id.clone());
            target_ids.insert(t.id.clone());

            let s_sections = f.repo.get_unit_sections("astro-12", &s.id).await.unwrap();
            let t_sections = f.repo.get_unit_sections("astro-12-copy", &t.id).await.unwrap();
            assert_eq!(s_sections.len(), t_sections.len());
            for (ss, ts) in s_sections.iter().zip(&t_sections) {
                assert_eq!(ss.title, ts.title);
                assert_eq!(ss.section_type, ts.section_type);
                if ss.section_type == SectionType::Content {
                    assert_eq!(ss.content, ts.content);
                }
                source_ids.insert(ss.id.clone());
                target_ids.insert(ts.id.clone());
            }
        }
        assert!(source_ids.is_disjoint(&target_ids));

        let metadata = f.repo.get_course_metadata("astro-12-copy").await.unwrap().unwrap();
        assert_eq!(metadata.name, "Astronomy");
        assert_eq!(metadata.grade_level, 9);
    }

    #[tokio::test]
    async fn test_copy_reuploads_files_under_the_target() {
        let (f, _) = populated().await;
        f.repo
            .copy_course_contents("astro-12", "astro-12-copy")
            .await
            .unwrap();

        let copied = f.objects.list_prefix("astro-12-copy/").await.unwrap();
        assert_eq!(copied.len(), 1);
        assert_eq!(
            f.repo.get_file_content(&copied[0]).await.unwrap(),
            Some(b"%PDF".to_vec())
        );
        assert!(f.objects.contains("astro-12/reading.pdf").await);
    }

    #[tokio::test]
    async fn test_copy_remaps_assistant_references() {
        let (f, old_assistant) = populated().await;
        f.repo
            .copy_course_contents("astro-12", "astro-12-copy")
            .await
            .unwrap();

        let new_assistant = &f.repo.get_custom_assistants("astro-12-copy").await.unwrap()[0];
        assert_ne!(new_assistant.id, old_assistant);
        assert_eq!(new_assistant.name, "Lab Helper");

        let units = f.repo.get_course_units("astro-12-copy").await.unwrap();
        let orbits = &f.repo.get_unit_sections("astro-12-copy", &units[1].id).await.unwrap()[0];
        assert_eq!(
            orbits.assistant(),
            AssistantSelector::Custom(new_assistant.id.clone())
        );
    }

    #[tokio::test]
    async fn test_copy_degrades_sections_whose_file_is_gone() {
        let (f, _) = populated().await;
        f.objects.delete("astro-12/reading.pdf").await.unwrap();

        let summary = f
            .repo
            .copy_course_contents("astro-12", "astro-12-copy")
            .await
            .unwrap();
        assert_eq!(summary.sections, 3);
        assert_eq!(summary.degraded_sections, 1);

        let units = f.repo.get_course_units("astro-12-copy").await.unwrap();
        let sections = f.repo.get_unit_sections("astro-12-copy", &units[0].id).await.unwrap();
        let reading = sections.iter().find(|s| s.title == "Reading").unwrap();
        assert_eq!(reading.section_type, SectionType::Content);
        assert_eq!(reading.file_path, None);
        assert!(reading
            .content
            .as_deref()
            .unwrap()
            .starts_with("Error: Could not copy original file content."));
    }

    #[tokio::test]
    async fn test_copy_of_missing_course_fails() {
        let (f, _) = populated().await;
        let result = f.repo.copy_course_contents("nope-1", "astro-12-copy").await;
        assert!(matches!(result, Err(RepositoryError::NotFound { .. })));
        assert!(f.repo.get_course_metadata("astro-12-copy").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_course_keeps_the_new_name() {
        let (f, _) = populated().await;
        let summary = f
            .repo
            .duplicate_course(TEACHER, "astro-12", "astro-12-copy", "Astronomy (Copy)")
            .await
            .unwrap();
        assert_eq!(summary.units, 2);

        let metadata = f.repo.get_course_metadata("astro-12-copy").await.unwrap().unwrap();
        assert_eq!(metadata.name, "Astronomy (Copy)");
        let mine: Vec<_> = f
            .repo
            .get_user_courses(TEACHER)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(mine, vec!["astro-12".to_string(), "astro-12-copy".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_onto_existing_course_keeps_its_identity() {
        let (f, _) = populated().await;
        f.repo
            .create_course(
                "other@example.com",
                "geo-7",
                &CourseDraft::new("Geology", "rocks", 7).with_availability(Availability::OpenToAll),
            )
            .await
            .unwrap();
        let before = f.repo.get_course_metadata("geo-7").await.unwrap().unwrap();

        f.repo.copy_course_contents("astro-12", "geo-7").await.unwrap();

        let after = f.repo.get_course_metadata("geo-7").await.unwrap().unwrap();
        assert_eq!(after.name, "Geology");
        assert_eq!(after.created_by, "other@example.com");
        assert_eq!(after.created_at, before.created_at);
        assert_eq!(after.description, "desc");
        assert_eq!(after.grade_level, 9);
        assert_eq!(after.availability, Availability::RequiresCode);
    }
}
