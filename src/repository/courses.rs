use tracing::{debug, info, warn};

use crate::cache::CacheKey;
use crate::dynamodb::{AttributeUpdate, Item};
use crate::error::{RepositoryError, Result};
use crate::keys::{self, SortKey};
use crate::model::{
    is_valid_course_code, validate_course_code, Availability, CodeStatus, CourseDetails,
    CourseDraft, CourseLink, CourseMetadata,
};
use crate::repository::rows::{AssistantRow, CourseLinkRow, MetadataRow, UnitRow};
use crate::repository::{as_entity, log_failure, now, CourseRepository};

impl CourseRepository {
    // ========================================================================
    // Codes
    // ========================================================================

    /// Checks the code format first and only then asks the store whether the
    /// code is taken.
    pub async fn validate_course_code(&self, code: &str) -> Result<CodeStatus> {
        if !is_valid_course_code(code) {
            return Ok(CodeStatus::Invalid);
        }
        if self.course_code_exists(code).await? {
            Ok(CodeStatus::InUse)
        } else {
            Ok(CodeStatus::Good)
        }
    }

    /// A code is taken when any owner lists it on the index, or when a
    /// metadata row exists without an owner (for example a copy target).
    pub async fn course_code_exists(&self, code: &str) -> Result<bool> {
        let result = self.code_taken(code).await;
        log_failure("checking course code existence", result)
    }

    async fn code_taken(&self, code: &str) -> Result<bool> {
        let linked = self
            .store
            .query_index(keys::all_courses_gsi1_pk(), Some(&keys::course_link_sk(code)))
            .await?;
        if !linked.is_empty() {
            return Ok(true);
        }
        Ok(self
            .store
            .get(&keys::course_pk(code), keys::metadata_sk())
            .await?
            .is_some())
    }

    // ========================================================================
    // Create
    // ========================================================================

    /// Writes the canonical metadata row, then the owner's pointer row.
    ///
    /// The metadata write is conditional, so two racing creators cannot both
    /// claim a code. The two writes are not one transaction: a failure
    /// between them leaves metadata without an owner pointer.
    pub async fn create_course(&self, email: &str, code: &str, draft: &CourseDraft) -> Result<()> {
        let result = self.insert_course(email, code, draft).await;
        self.finish_write("creating course", result).await
    }

    async fn insert_course(&self, email: &str, code: &str, draft: &CourseDraft) -> Result<()> {
        validate_course_code(code)?;
        draft.validate()?;
        if self.code_taken(code).await? {
            return Err(RepositoryError::already_exists("Course", code));
        }

        let created_at = now();
        let metadata = MetadataRow::new(code, draft, email, &created_at);
        self.store
            .put_if_absent(Item::from_serde(&metadata)?)
            .await
            .map_err(|e| as_entity(e, "Course"))?;

        let link = CourseLinkRow::new(email, code, draft, &created_at);
        self.store.put(Item::from_serde(&link)?).await?;

        info!("Course '{code}' created by {email}");
        Ok(())
    }

    // ========================================================================
    // Read
    // ========================================================================

    pub async fn get_user_courses(&self, email: &str) -> Result<Vec<CourseLink>> {
        let result = self
            .cache
            .get_or_load(CacheKey::UserCourses(email.to_string()), || {
                self.load_user_courses(email)
            })
            .await;
        log_failure("getting user courses", result)
    }

    async fn load_user_courses(&self, email: &str) -> Result<Vec<CourseLink>> {
        let items = self
            .store
            .query(&keys::user_pk(email), Some(keys::COURSE_PREFIX))
            .await?;
        items.iter().map(CourseLinkRow::from_item).collect()
    }

    /// Every course of every owner, from the `ALLCOURSES` index.
    pub async fn get_all_courses(&self) -> Result<Vec<CourseLink>> {
        let result = self
            .cache
            .get_or_load(CacheKey::AllCourses, || self.load_all_courses())
            .await;
        log_failure("getting all courses", result)
    }

    async fn load_all_courses(&self) -> Result<Vec<CourseLink>> {
        let items = self
            .store
            .query_index(keys::all_courses_gsi1_pk(), None)
            .await?;
        items.iter().map(CourseLinkRow::from_item).collect()
    }

    /// All rows of the course partition: metadata, units and assistants.
    pub async fn get_course_details(&self, code: &str) -> Result<CourseDetails> {
        let result = self
            .cache
            .get_or_load(CacheKey::CourseDetails(code.to_string()), || {
                self.load_course_details(code)
            })
            .await;
        log_failure("getting course details", result)
    }

    async fn load_course_details(&self, code: &str) -> Result<CourseDetails> {
        let items = self.store.query(&keys::course_pk(code), None).await?;
        let mut details = CourseDetails::default();
        for item in &items {
            match item.sk().and_then(SortKey::parse) {
                Some(SortKey::Metadata) => {
                    details.metadata = Some(MetadataRow::from_item(code, item)?);
                }
                Some(SortKey::Unit(_)) => details.units.push(UnitRow::from_item(item)?),
                Some(SortKey::Assistant(_)) => {
                    details.assistants.push(AssistantRow::from_item(item)?);
                }
                _ => debug!("Skipping unexpected row {:?} in course '{code}'", item.sk()),
            }
        }
        details
            .units
            .sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(details)
    }

    pub async fn get_course_metadata(&self, code: &str) -> Result<Option<CourseMetadata>> {
        let result = self
            .cache
            .get_or_load(CacheKey::CourseMetadata(code.to_string()), || {
                self.load_course_metadata(code)
            })
            .await;
        log_failure("getting course metadata", result)
    }

    /// Uncached metadata read for use inside writes.
    pub(super) async fn load_course_metadata(&self, code: &str) -> Result<Option<CourseMetadata>> {
        self.store
            .get(&keys::course_pk(code), keys::metadata_sk())
            .await?
            .map(|item| MetadataRow::from_item(code, &item))
            .transpose()
    }

    // ========================================================================
    // Update
    // ========================================================================

    /// Updates the owner's pointer row and the metadata row.
    ///
    /// Only the owner has a pointer row, so a non-owner gets `NotFound` and
    /// nothing is written.
    pub async fn update_course(&self, email: &str, code: &str, draft: &CourseDraft) -> Result<()> {
        let result = match draft.validate() {
            Ok(()) => {
                let updates = vec![
                    AttributeUpdate::set_string("name", &draft.name),
                    AttributeUpdate::set_string("description", &draft.description),
                    AttributeUpdate::set_number("grade_level", draft.grade_level),
                    AttributeUpdate::set_string("availability", draft.availability.as_str()),
                ];
                self.update_course_rows(email, code, updates).await
            }
            Err(e) => Err(e),
        };
        if result.is_ok() {
            info!("Course '{code}' updated");
        }
        self.finish_write("updating course", result).await
    }

    pub async fn set_course_availability(
        &self,
        email: &str,
        code: &str,
        availability: Availability,
    ) -> Result<()> {
        let updates = vec![AttributeUpdate::set_string(
            "availability",
            availability.as_str(),
        )];
        let result = self.update_course_rows(email, code, updates).await;
        if result.is_ok() {
            info!("Course '{code}' is now {}", availability.as_str());
        }
        self.finish_write("setting course availability", result).await
    }

    async fn update_course_rows(
        &self,
        email: &str,
        code: &str,
        updates: Vec<AttributeUpdate>,
    ) -> Result<()> {
        self.store
            .update(&keys::user_pk(email), &keys::course_link_sk(code), updates.clone())
            .await
            .map_err(|e| as_entity(e, "Course"))?;
        self.store
            .update(&keys::course_pk(code), keys::metadata_sk(), updates)
            .await
            .map_err(|e| as_entity(e, "Course"))
    }

    // ========================================================================
    // Delete
    // ========================================================================

    /// Deletes every row derived from the course code, the owner's pointer,
    /// and every object under the course prefix.
    ///
    /// Only the owner may delete. When `email` holds no pointer to `code`
    /// nothing is touched and `NotFound` is returned.
    ///
    /// Steps commit one by one. A failed object cleanup is logged and does
    /// not fail the call; the rows are already gone by then.
    pub async fn delete_course(&self, email: &str, code: &str) -> Result<()> {
        let result = self.remove_course(email, code).await;
        self.finish_write("deleting course", result).await
    }

    async fn remove_course(&self, email: &str, code: &str) -> Result<()> {
        validate_course_code(code)?;
        if self
            .store
            .get(&keys::user_pk(email), &keys::course_link_sk(code))
            .await?
            .is_none()
        {
            return Err(RepositoryError::not_found("Course", code));
        }
        let course_pk = keys::course_pk(code);

        let units = self.store.query(&course_pk, Some(keys::UNIT_PREFIX)).await?;
        for unit in &units {
            let unit_id = UnitRow::from_item(unit)?.id;
            let section_pk = keys::section_pk(code, &unit_id);
            for section in self.store.query(&section_pk, Some(keys::SECTION_PREFIX)).await? {
                if let Some(sk) = section.sk() {
                    self.store.delete(&section_pk, sk).await?;
                }
            }
        }

        let rows = self.store.query(&course_pk, None).await?;
        for row in &rows {
            if let Some(sk) = row.sk() {
                self.store.delete(&course_pk, sk).await?;
            }
        }

        self.store
            .delete(&keys::user_pk(email), &keys::course_link_sk(code))
            .await?;

        match self
            .objects
            .delete_prefix(&keys::course_object_prefix(code))
            .await
        {
            Ok(count) => debug!("Deleted {count} objects of course '{code}'"),
            Err(e) => warn!("Course '{code}' rows deleted but its files were not: {e}"),
        }

        info!("Course '{code}' deleted");
        Ok(())
    }
}
