use shared::domain::{CatalogId, CatalogKind};
use storage::{CatalogEntry, Junction, RelationOp};
use tracing::info;

use crate::{non_empty, BotError, BotResult, Controller};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogOp {
    Create,
    Remove,
}

impl Controller {
    /// Admin-side create/remove of a catalog row by name.
    pub async fn manage_catalog(
        &mut self,
        kind: CatalogKind,
        name: &str,
        op: CatalogOp,
    ) -> BotResult<CatalogEntry> {
        let name = non_empty(name, "name")?;
        let existing = self.session.catalog_by_name(kind, &name).await?;
        match (op, existing) {
            (CatalogOp::Create, Some(entry)) => Err(BotError::already_exists(format!(
                "{kind} '{}'",
                entry.name
            ))),
            (CatalogOp::Create, None) => {
                let id = self.session.insert_catalog(kind, &name).await?;
                info!(kind = %kind, name = %name, "catalog entry created");
                Ok(CatalogEntry { id, kind, name })
            }
            (CatalogOp::Remove, Some(entry)) => {
                self.session.delete_catalog(kind, entry.id).await?;
                info!(kind = %kind, name = %entry.name, "catalog entry removed");
                Ok(entry)
            }
            (CatalogOp::Remove, None) => Err(BotError::not_found(format!("{kind} '{name}'"))),
        }
    }

    pub async fn list_catalog(&mut self, kind: CatalogKind) -> BotResult<Vec<CatalogEntry>> {
        Ok(self.session.list_catalog(kind).await?)
    }

    /// Rows an attach or detach on `subject` may target.
    pub async fn relation_candidates(
        &mut self,
        junction: Junction,
        subject: i64,
        op: RelationOp,
    ) -> BotResult<Vec<CatalogEntry>> {
        Ok(self
            .session
            .relation_candidates(junction, subject, op)
            .await?)
    }

    pub async fn apply_relation(
        &mut self,
        junction: Junction,
        subject: i64,
        target: CatalogId,
        op: RelationOp,
    ) -> BotResult<CatalogEntry> {
        let kind = junction.catalog;
        let entry = self
            .session
            .catalog_by_id(kind, target)
            .await?
            .ok_or_else(|| BotError::not_found(format!("{kind} {target}")))?;
        let attached = self.session.has_relation(junction, subject, target).await?;
        match op {
            RelationOp::Attach if attached => {
                return Err(BotError::already_exists(format!("{kind} '{}'", entry.name)));
            }
            RelationOp::Attach => {
                self.session
                    .insert_relation(junction, subject, target)
                    .await?;
            }
            RelationOp::Detach if !attached => {
                return Err(BotError::not_found(format!("{kind} '{}'", entry.name)));
            }
            RelationOp::Detach => {
                self.session
                    .delete_relation(junction, subject, target)
                    .await?;
            }
        }
        Ok(entry)
    }
}
