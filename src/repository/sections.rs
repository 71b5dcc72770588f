use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::dynamodb::{AttributeUpdate, Item};
use crate::error::{RepositoryError, Result};
use crate::keys::{self, SectionPartition};
use crate::model::{
    validate_course_code, NewSection, SectionBody, SectionRecord, SectionType, SectionUpdate,
};
use crate::objects::normalize_key;
use crate::repository::rows::SectionRow;
use crate::repository::{
    as_entity, dense_renumbering, has_duplicate_orders, log_failure, CourseRepository,
};

impl CourseRepository {
    // ========================================================================
    // Create
    // ========================================================================

    /// True when any section anywhere in the table uses this id.
    pub async fn section_id_exists(&self, section_id: &str) -> Result<bool> {
        let result = self
            .store
            .query_index(&keys::section_gsi1_pk(section_id), None)
            .await
            .map(|items| !items.is_empty());
        log_failure("checking section id existence", result)
    }

    /// Appends a section at the end of the unit and returns its id.
    ///
    /// Section ids are unique across the whole table; an id already used by
    /// any course is refused with `AlreadyExists` and nothing is written.
    pub async fn create_section(
        &self,
        code: &str,
        unit_id: &str,
        section: NewSection,
    ) -> Result<String> {
        let result = self.insert_section(code, unit_id, section).await;
        self.finish_write("creating section", result).await
    }

    async fn insert_section(&self, code: &str, unit_id: &str, section: NewSection) -> Result<String> {
        section.validate()?;
        if self.load_unit(code, unit_id).await?.is_none() {
            return Err(RepositoryError::not_found("Unit", unit_id));
        }
        if self.section_id_exists(&section.id).await? {
            return Err(RepositoryError::already_exists("Section", &section.id));
        }

        let siblings = self.load_unit_sections(code, unit_id).await?;
        let section_type = section.body.section_type();
        let (content, file_path) = match section.body {
            SectionBody::Content(content) => (Some(content), None),
            SectionBody::File(path) => (None, Some(path)),
        };
        let record = SectionRecord {
            id: section.id,
            course_code: code.to_string(),
            unit_id: unit_id.to_string(),
            title: section.title,
            overview: section.overview,
            order: siblings.iter().map(|s| s.order).max().unwrap_or(0) + 1,
            section_type,
            content,
            file_path,
            assistant_id: section.assistant.map(|a| a.as_stored().to_string()),
        };
        self.store
            .put_if_absent(Item::from_serde(&SectionRow::new(&record))?)
            .await
            .map_err(|e| as_entity(e, "Section"))?;
        info!(
            "Section '{}' ({section_type}) created in unit '{unit_id}' of '{code}'",
            record.id
        );

        let after = self.load_unit_sections(code, unit_id).await?;
        if has_duplicate_orders(after.iter().map(|s| s.order)) {
            warn!("Duplicate section orders in unit '{unit_id}', reconciling");
            self.renumber_sections(code, unit_id).await?;
        }
        Ok(record.id)
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Sections of a unit sorted by `order`, ties broken by id.
    pub async fn get_unit_sections(&self, code: &str, unit_id: &str) -> Result<Vec<SectionRecord>> {
        let key = CacheKey::UnitSections {
            course_code: code.to_string(),
            unit_id: unit_id.to_string(),
        };
        let result = self
            .cache
            .get_or_load(key, || self.load_unit_sections(code, unit_id))
            .await;
        log_failure("getting unit sections", result)
    }

    pub(super) async fn load_unit_sections(
        &self,
        code: &str,
        unit_id: &str,
    ) -> Result<Vec<SectionRecord>> {
        let items = self
            .store
            .query(&keys::section_pk(code, unit_id), Some(keys::SECTION_PREFIX))
            .await?;
        let mut sections = items
            .iter()
            .map(SectionRow::from_item)
            .collect::<Result<Vec<_>>>()?;
        sections.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(sections)
    }

    pub async fn get_section_record(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
    ) -> Result<Option<SectionRecord>> {
        let key = CacheKey::Section {
            course_code: code.to_string(),
            unit_id: unit_id.to_string(),
            section_id: section_id.to_string(),
        };
        let result = self
            .cache
            .get_or_load(key, || self.load_section(code, unit_id, section_id))
            .await;
        log_failure("getting section", result)
    }

    async fn load_section(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
    ) -> Result<Option<SectionRecord>> {
        self.store
            .get(&keys::section_pk(code, unit_id), &keys::section_sk(section_id))
            .await?
            .map(|item| SectionRow::from_item(&item))
            .transpose()
    }

    /// The `(course_code, unit_id)` a section lives under, found through the
    /// section-id index. `None` for an unknown id.
    pub async fn get_section_location(&self, section_id: &str) -> Result<Option<(String, String)>> {
        let result = self
            .cache
            .get_or_load(CacheKey::SectionLocation(section_id.to_string()), || {
                self.locate_section(section_id)
            })
            .await;
        log_failure("getting section location", result)
    }

    async fn locate_section(&self, section_id: &str) -> Result<Option<(String, String)>> {
        let items = self
            .store
            .query_index(
                &keys::section_gsi1_pk(section_id),
                Some(keys::section_gsi1_sk()),
            )
            .await?;
        let Some(pk) = items.first().and_then(Item::pk) else {
            return Ok(None);
        };
        match SectionPartition::parse(pk) {
            Some(partition) => Ok(Some((partition.course_code, partition.unit_id))),
            None => {
                warn!("Section '{section_id}' has a malformed partition key '{pk}'");
                Ok(None)
            }
        }
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Changes only the supplied fields.
    ///
    /// A content section never carries a `file_path` and a file section never
    /// carries `content`; switching the type removes the field of the old type.
    pub async fn update_section(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
        update: &SectionUpdate,
    ) -> Result<()> {
        let result = self.apply_section_update(code, unit_id, section_id, update).await;
        self.finish_write("updating section", result).await
    }

    async fn apply_section_update(
        &self,
        code: &str,
        unit_id: &str,
        section_id: &str,
        update: &SectionUpdate,
    ) -> Result<()> {
        if update.is_empty() {
            return Ok(());
        }
        let current = self
            .load_section(code, unit_id, section_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;

        let target_type = update.section_type.unwrap_or(current.section_type);
        let switching = target_type != current.section_type;
        match target_type {
            SectionType::Content if update.file_path.is_some() => {
                return Err(RepositoryError::InvalidData(
                    "A content section cannot have a file_path".to_string(),
                ));
            }
            SectionType::File if update.content.is_some() => {
                return Err(RepositoryError::InvalidData(
                    "A file section cannot have content".to_string(),
                ));
            }
            SectionType::File if switching && update.file_path.is_none() => {
                return Err(RepositoryError::InvalidData(
                    "Switching to a file section requires a file_path".to_string(),
                ));
            }
            _ => {}
        }

        let mut updates = Vec::new();
        if let Some(title) = &update.title {
            updates.push(AttributeUpdate::set_string("title", title));
        }
        if let Some(overview) = &update.overview {
            updates.push(AttributeUpdate::set_string("overview", overview));
        }
        if let Some(content) = &update.content {
            updates.push(AttributeUpdate::set_string("content", content));
        }
        if let Some(file_path) = &update.file_path {
            updates.push(AttributeUpdate::set_string("file_path", file_path));
        }
        if let Some(section_type) = update.section_type {
            updates.push(AttributeUpdate::set_string("section_type", section_type.as_str()));
        }
        if switching {
            updates.push(AttributeUpdate::remove(match target_type {
                SectionType::Content => "file_path",
                SectionType::File => "content",
            }));
        }

        self.store
            .update(
                &keys::section_pk(code, unit_id),
                &keys::section_sk(section_id),
                updates,
            )
            .await
            .map_err(|e| as_entity(e, "Section"))?;
        debug!("Section '{section_id}' updated");
        Ok(())
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes the section and its file, then closes the gap in the order of
    /// its siblings.
    pub async fn delete_section(&self, code: &str, unit_id: &str, section_id: &str) -> Result<()> {
        let result = self.remove_section(code, unit_id, section_id).await;
        self.finish_write("deleting section", result).await
    }

    async fn remove_section(&self, code: &str, unit_id: &str, section_id: &str) -> Result<()> {
        let section = self
            .load_section(code, unit_id, section_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Section", section_id))?;

        self.remove_section_row(&section).await?;

        let shifted: Vec<(String, u32)> = self
            .load_unit_sections(code, unit_id)
            .await?
            .into_iter()
            .filter(|s| s.order > section.order)
            .map(|s| (s.id, s.order - 1))
            .collect();
        self.write_section_orders(code, unit_id, &shifted).await?;

        info!("Section '{section_id}' deleted from unit '{unit_id}' of '{code}'");
        Ok(())
    }

    /// Removes a section's file (best effort) and its row, without touching
    /// sibling orders.
    pub(super) async fn remove_section_row(&self, section: &SectionRecord) -> Result<()> {
        if section.section_type == SectionType::File {
            if let Some(path) = &section.file_path {
                let key = normalize_key(path);
                if let Err(e) = self.objects.delete(key).await {
                    warn!("Could not delete file '{key}' of section '{}': {e}", section.id);
                }
            }
        }
        self.store
            .delete(
                &keys::section_pk(&section.course_code, &section.unit_id),
                &keys::section_sk(&section.id),
            )
            .await
    }

    // ========================================================================
    // Ordering
    // ========================================================================

    /// Applies `(section_id, order)` pairs as given. The caller supplies a
    /// dense permutation; it is not re-validated here.
    pub async fn update_section_orders(
        &self,
        code: &str,
        unit_id: &str,
        section_orders: &[(String, u32)],
    ) -> Result<()> {
        let result = self.write_section_orders(code, unit_id, section_orders).await;
        self.finish_write("updating section orders", result).await
    }

    async fn write_section_orders(
        &self,
        code: &str,
        unit_id: &str,
        section_orders: &[(String, u32)],
    ) -> Result<()> {
        let section_pk = keys::section_pk(code, unit_id);
        for (section_id, order) in section_orders {
            self.store
                .update(
                    &section_pk,
                    &keys::section_sk(section_id),
                    vec![AttributeUpdate::set_number("order", *order)],
                )
                .await
                .map_err(|e| as_entity(e, "Section"))?;
        }
        Ok(())
    }

    /// Rewrites section orders of a unit into a dense 1..N sequence, keeping
    /// the current relative order. Returns whether anything changed.
    pub async fn reconcile_section_orders(&self, code: &str, unit_id: &str) -> Result<bool> {
        let result = self.renumber_sections(code, unit_id).await;
        self.finish_write("reconciling section orders", result).await
    }

    async fn renumber_sections(&self, code: &str, unit_id: &str) -> Result<bool> {
        let sections = self.load_unit_sections(code, unit_id).await?;
        let changes = dense_renumbering(sections.into_iter().map(|s| (s.id, s.order)).collect());
        self.write_section_orders(code, unit_id, &changes).await?;
        Ok(!changes.is_empty())
    }

    // ========================================================================
    // Files
    // ========================================================================

    /// Stores a section's PDF as `<code>/<section_id>.pdf` and returns the key.
    pub async fn upload_section_file(
        &self,
        code: &str,
        section_id: &str,
        bytes: Vec<u8>,
    ) -> Result<String> {
        let result = match validate_course_code(code) {
            Ok(()) => {
                let key = keys::course_object_key(code, &keys::section_file_name(section_id));
                self.objects.upload(&key, bytes).await
            }
            Err(e) => Err(e),
        };
        self.finish_write("uploading file", result).await
    }

    /// File bytes for a stored `file_path`, or `None` when the object is gone.
    pub async fn get_file_content(&self, file_path: &str) -> Result<Option<Vec<u8>>> {
        let key = normalize_key(file_path);
        let result = self
            .cache
            .get_or_load(CacheKey::FileContent(key.to_string()), || {
                self.objects.download(key)
            })
            .await;
        log_failure("retrieving file content", result)
    }

    pub async fn delete_content_file(&self, code: &str, file_name: &str) -> Result<()> {
        let result = self
            .objects
            .delete(&keys::course_object_key(code, file_name))
            .await;
        self.finish_write("deleting file", result).await
    }
}
