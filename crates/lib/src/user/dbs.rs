//! Per-user database management on the user document.

use tracing::info;

use super::{
    UserService,
    sessions::LogoutOp,
    types::PersonalDb,
};
use crate::{Result, config::DbType, events::AuthEvent, util::sessions_of};

impl UserService {
    /// Provision a database for a user and record it on the document.
    ///
    /// Explicitly supplied settings override the configured model.
    /// Permissions are persisted only when supplied here; otherwise
    /// they are resolved from configuration at session time.
    pub async fn add_user_db(
        &self,
        user_id: &str,
        db_name: &str,
        db_type: Option<DbType>,
        permissions: Option<Vec<String>>,
        admin_roles: Option<Vec<String>>,
        member_roles: Option<Vec<String>>,
    ) -> Result<String> {
        let mut resolved = self
            .db_auth()
            .get_db_config(db_name, db_type.unwrap_or(DbType::Private));
        if let Some(db_type) = db_type {
            resolved.db_type = db_type;
        }
        if let Some(admin_roles) = &admin_roles {
            resolved.admin_roles = admin_roles.clone();
        }
        if let Some(member_roles) = &member_roles {
            resolved.member_roles = member_roles.clone();
        }

        let doc = self.store().get(user_id).await?;
        let physical = self
            .db_auth()
            .add_user_db(
                &doc,
                db_name,
                &resolved.design_docs,
                resolved.db_type,
                &resolved.admin_roles,
                &resolved.member_roles,
            )
            .await?;

        let entry = PersonalDb {
            name: db_name.to_string(),
            db_type: resolved.db_type,
            permissions,
            admin_roles,
            member_roles,
        };
        let physical_name = physical.clone();
        self.update_with_retry(user_id, |doc| {
            doc.personal_dbs
                .insert(physical_name.clone(), entry.clone());
            Ok(())
        })
        .await?;

        info!(user_id, db = %physical, "user db added");
        self.emit(AuthEvent::UserDbAdded {
            user_id: user_id.to_string(),
            db_name: db_name.to_string(),
        });
        Ok(physical)
    }

    /// Remove a database from the user document by logical name.
    ///
    /// Physical databases are destroyed only when the caller asks for
    /// it and the type matches.
    pub async fn remove_user_db(
        &self,
        user_id: &str,
        db_name: &str,
        delete_private: bool,
        delete_shared: bool,
    ) -> Result<()> {
        let doc = self.store().get(user_id).await?;
        let matching: Vec<(String, DbType)> = doc
            .personal_dbs
            .iter()
            .filter(|(_, db)| db.name == db_name)
            .map(|(physical, db)| (physical.clone(), db.db_type))
            .collect();

        if matching.is_empty() {
            return Ok(());
        }

        for (physical, db_type) in &matching {
            let destroy = match db_type {
                DbType::Private => delete_private,
                DbType::Shared => delete_shared,
            };
            if destroy {
                self.db_auth().remove_db(physical).await?;
            }
        }

        let physicals: Vec<String> = matching.iter().map(|(p, _)| p.clone()).collect();
        self.update_with_retry(user_id, |doc| {
            for physical in &physicals {
                doc.personal_dbs.remove(physical);
            }
            Ok(())
        })
        .await?;

        info!(user_id, db = %db_name, "user db removed");
        self.emit(AuthEvent::UserDbRemoved {
            user_id: user_id.to_string(),
            db_name: db_name.to_string(),
        });
        Ok(())
    }

    /// Delete an account: revoke every session, optionally destroy the
    /// private databases, then delete the document.
    pub async fn remove(&self, user_id: &str, destroy_dbs: bool) -> Result<()> {
        let mut doc = self.store().get(user_id).await?;
        let rev = doc.rev.clone().unwrap_or_default();
        let all_sessions = sessions_of(&doc);

        self.logout_user_sessions(&mut doc, LogoutOp::All, None)
            .await?;

        if destroy_dbs {
            for (physical, db) in &doc.personal_dbs {
                if db.db_type == DbType::Private {
                    self.db_auth().remove_db(physical).await?;
                }
            }
        }

        self.store().remove(user_id, &rev).await?;
        info!(
            user_id,
            sessions = all_sessions.len(),
            destroy_dbs,
            "user removed"
        );
        Ok(())
    }
}
