use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::CacheKey;
use crate::dynamodb::{AttributeUpdate, Item};
use crate::error::{RepositoryError, Result};
use crate::keys;
use crate::model::UnitRecord;
use crate::repository::rows::UnitRow;
use crate::repository::{
    as_entity, dense_renumbering, has_duplicate_orders, log_failure, CourseRepository,
};

impl CourseRepository {
    /// Appends a unit at the end of the course and returns its generated id.
    pub async fn create_unit(&self, code: &str, title: &str, description: &str) -> Result<String> {
        let result = self.insert_unit(code, title, description).await;
        self.finish_write("creating unit", result).await
    }

    async fn insert_unit(&self, code: &str, title: &str, description: &str) -> Result<String> {
        if title.trim().is_empty() {
            return Err(RepositoryError::InvalidData("Unit title is required".to_string()));
        }
        if self.load_course_metadata(code).await?.is_none() {
            return Err(RepositoryError::not_found("Course", code));
        }

        let siblings = self.load_course_units(code).await?;
        let unit = UnitRecord {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description: description.to_string(),
            order: siblings.iter().map(|u| u.order).max().unwrap_or(0) + 1,
        };
        self.store
            .put_if_absent(Item::from_serde(&UnitRow::new(code, &unit))?)
            .await
            .map_err(|e| as_entity(e, "Unit"))?;
        info!("Unit '{}' created in course '{code}' at {}", unit.id, unit.order);

        // A concurrent create may have picked the same order.
        let after = self.load_course_units(code).await?;
        if has_duplicate_orders(after.iter().map(|u| u.order)) {
            warn!("Duplicate unit orders in course '{code}', reconciling");
            self.renumber_units(code).await?;
        }
        Ok(unit.id)
    }

    /// Units of a course sorted by `order`, ties broken by id.
    pub async fn get_course_units(&self, code: &str) -> Result<Vec<UnitRecord>> {
        let result = self
            .cache
            .get_or_load(CacheKey::CourseUnits(code.to_string()), || {
                self.load_course_units(code)
            })
            .await;
        log_failure("getting course units", result)
    }

    pub(super) async fn load_course_units(&self, code: &str) -> Result<Vec<UnitRecord>> {
        let items = self
            .store
            .query(&keys::course_pk(code), Some(keys::UNIT_PREFIX))
            .await?;
        let mut units = items
            .iter()
            .map(UnitRow::from_item)
            .collect::<Result<Vec<_>>>()?;
        units.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        Ok(units)
    }

    pub(super) async fn load_unit(&self, code: &str, unit_id: &str) -> Result<Option<UnitRecord>> {
        self.store
            .get(&keys::course_pk(code), &keys::unit_sk(unit_id))
            .await?
            .map(|item| UnitRow::from_item(&item))
            .transpose()
    }

    pub async fn update_unit(
        &self,
        code: &str,
        unit_id: &str,
        title: &str,
        description: &str,
    ) -> Result<()> {
        let updates = vec![
            AttributeUpdate::set_string("title", title),
            AttributeUpdate::set_string("description", description),
        ];
        let result = self
            .store
            .update(&keys::course_pk(code), &keys::unit_sk(unit_id), updates)
            .await
            .map_err(|e| as_entity(e, "Unit"));
        self.finish_write("updating unit", result).await
    }

    /// Deletes the unit's sections (and their files), then the unit, then
    /// closes the gap in the unit order.
    pub async fn delete_unit(&self, code: &str, unit_id: &str) -> Result<()> {
        let result = self.remove_unit(code, unit_id).await;
        self.finish_write("deleting unit", result).await
    }

    async fn remove_unit(&self, code: &str, unit_id: &str) -> Result<()> {
        let unit = self
            .load_unit(code, unit_id)
            .await?
            .ok_or_else(|| RepositoryError::not_found("Unit", unit_id))?;

        for section in self.load_unit_sections(code, unit_id).await? {
            self.remove_section_row(&section).await?;
        }

        self.store
            .delete(&keys::course_pk(code), &keys::unit_sk(unit_id))
            .await?;

        let shifted: Vec<(String, u32)> = self
            .load_course_units(code)
            .await?
            .into_iter()
            .filter(|u| u.order > unit.order)
            .map(|u| (u.id, u.order - 1))
            .collect();
        self.write_unit_orders(code, &shifted).await?;

        info!("Unit '{unit_id}' deleted from course '{code}'");
        Ok(())
    }

    /// Applies `(unit_id, order)` pairs as given. The caller supplies a
    /// dense permutation; it is not re-validated here.
    pub async fn update_unit_orders(&self, code: &str, unit_orders: &[(String, u32)]) -> Result<()> {
        let result = self.write_unit_orders(code, unit_orders).await;
        self.finish_write("updating unit orders", result).await
    }

    async fn write_unit_orders(&self, code: &str, unit_orders: &[(String, u32)]) -> Result<()> {
        let course_pk = keys::course_pk(code);
        for (unit_id, order) in unit_orders {
            self.store
                .update(
                    &course_pk,
                    &keys::unit_sk(unit_id),
                    vec![AttributeUpdate::set_number("order", *order)],
                )
                .await
                .map_err(|e| as_entity(e, "Unit"))?;
        }
        Ok(())
    }

    /// Rewrites unit orders into a dense 1..N sequence, keeping the current
    /// relative order. Returns whether anything changed.
    pub async fn reconcile_unit_orders(&self, code: &str) -> Result<bool> {
        let result = self.renumber_units(code).await;
        self.finish_write("reconciling unit orders", result).await
    }

    async fn renumber_units(&self, code: &str) -> Result<bool> {
        let units = self.load_course_units(code).await?;
        let changes = dense_renumbering(units.into_iter().map(|u| (u.id, u.order)).collect());
        self.write_unit_orders(code, &changes).await?;
        Ok(!changes.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use crate::error::RepositoryError;
    use crate::keys;
    use crate::dynamodb::{Item, KeyValueStore};
    use crate::model::{NewSection, SectionBody};
    use crate::repository::testing::{fixture, fixture_with_course};

    async fn orders(repo: &crate::repository::CourseRepository, code: &str) -> Vec<u32> {
        repo.get_course_units(code)
            .await
            .unwrap()
            .iter()
            .map(|u| u.order)
            .collect()
    }

    #[tokio::test]
    async fn test_create_unit_appends() {
        let f = fixture_with_course("astro-12").await;
        let first = f.repo.create_unit("astro-12", "Stars", "").await.unwrap();
        let second = f.repo.create_unit("astro-12", "Planets", "").await.unwrap();
        assert_ne!(first, second);

        let units = f.repo.get_course_units("astro-12").await.unwrap();
        assert_eq!(units[0].id, first);
        assert_eq!(units[1].id, second);
        assert_eq!(orders(&f.repo, "astro-12").await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_create_unit_requires_course() {
        let f = fixture();
        let result = f.repo.create_unit("no-course", "Stars", "").await;
        assert!(matches!(
            result,
            Err(RepositoryError::NotFound { entity_type: "Course", .. })
        ));
    }

    #[tokio::test]
    async fn test_delete_unit_keeps_orders_dense() {
        let f = fixture_with_course("astro-12").await;
        let a = f.repo.create_unit("astro-12", "A", "").await.unwrap();
        let b = f.repo.create_unit("astro-12", "B", "").await.unwrap();
        let c = f.repo.create_unit("astro-12", "C", "").await.unwrap();

        f.repo.delete_unit("astro-12", &b).await.unwrap();

        let units = f.repo.get_course_units("astro-12").await.unwrap();
        let remaining: Vec<_> = units.iter().map(|u| (u.id.clone(), u.order)).collect();
        assert_eq!(remaining, vec![(a, 1), (c, 2)]);
    }

    #[tokio::test]
    async fn test_delete_unit_cascades_to_sections_and_files() {
        let f = fixture_with_course("astro-12").await;
        let unit = f.repo.create_unit("astro-12", "Stars", "").await.unwrap();
        let key = f
            .repo
            .upload_section_file("astro-12", "s-file", b"%PDF".to_vec())
            .await
            .unwrap();
        f.repo
            .create_section(
                "astro-12",
                &unit,
                NewSection::new("Text", "", SectionBody::Content("hello".into())).with_id("s-text"),
            )
            .await
            .unwrap();
        f.repo
            .create_section(
                "astro-12",
                &unit,
                NewSection::new("Reading", "", SectionBody::File(key.clone())).with_id("s-file"),
            )
            .await
            .unwrap();

        f.repo.delete_unit("astro-12", &unit).await.unwrap();

        let section_pk = keys::section_pk("astro-12", &unit);
        assert!(f.store.query(&section_pk, None).await.unwrap().is_empty());
        assert!(!f.objects.contains(&key).await);
        assert!(!f.repo.section_id_exists("s-text").await.unwrap());
        assert!(f.repo.get_course_units("astro-12").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_unit() {
        let f = fixture_with_course("astro-12").await;
        let result = f.repo.delete_unit("astro-12", "ghost").await;
        assert!(matches!(result, Err(RepositoryError::NotFound { entity_type: "Unit", .. })));
    }

    #[tokio::test]
    async fn test_update_unit() {
        let f = fixture_with_course("astro-12").await;
        let unit = f.repo.create_unit("astro-12", "Stars", "").await.unwrap();
        f.repo.get_course_units("astro-12").await.unwrap();

        f.repo
            .update_unit("astro-12", &unit, "Stellar Physics", "Fusion")
            .await
            .unwrap();

        let units = f.repo.get_course_units("astro-12").await.unwrap();
        assert_eq!(units[0].title, "Stellar Physics");
        assert_eq!(units[0].description, "Fusion");
        assert!(f.repo.update_unit("astro-12", "ghost", "x", "").await.is_err());
    }

    #[tokio::test]
    async fn test_update_unit_orders_applies_verbatim() {
        let f = fixture_with_course("astro-12").await;
        let a = f.repo.create_unit("astro-12", "A", "").await.unwrap();
        let b = f.repo.create_unit("astro-12", "B", "").await.unwrap();

        f.repo
            .update_unit_orders("astro-12", &[(a.clone(), 2), (b.clone(), 1)])
            .await
            .unwrap();

        let ids: Vec<_> = f
            .repo
            .get_course_units("astro-12")
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.id)
            .collect();
        assert_eq!(ids, vec![b, a]);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_duplicate_orders() {
        let f = fixture_with_course("astro-12").await;
        for (id, order) in [("u-a", 1), ("u-b", 1), ("u-c", 4)] {
            f.store
                .put(
                    Item::key(keys::course_pk("astro-12"), keys::unit_sk(id))
                        .set_string("title", id)
                        .set_number("order", order),
                )
                .await
                .unwrap();
        }

        assert!(f.repo.reconcile_unit_orders("astro-12").await.unwrap());
        assert_eq!(orders(&f.repo, "astro-12").await, vec![1, 2, 3]);
        assert!(!f.repo.reconcile_unit_orders("astro-12").await.unwrap());
    }

    #[tokio::test]
    async fn test_create_unit_repairs_a_stale_duplicate() {
        let f = fixture_with_course("astro-12").await;
        for id in ["u-a", "u-b"] {
            f.store
                .put(
                    Item::key(keys::course_pk("astro-12"), keys::unit_sk(id))
                        .set_string("title", id)
                        .set_number("order", 1),
                )
                .await
                .unwrap();
        }

        f.repo.create_unit("astro-12", "C", "").await.unwrap();
        assert_eq!(orders(&f.repo, "astro-12").await, vec![1, 2, 3]);
    }
}
