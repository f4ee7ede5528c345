//! Typed design documents.
//!
//! Views are data, not code: a view either indexes one or more document
//! field paths or enumerates session keys. The document store interprets
//! these definitions, which keeps every adapter able to answer the same
//! `ddoc/view` queries.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    Result,
    config::Config,
    constants::{
        AUTH_DESIGN_DOC, EMAIL_USERNAME_VIEW, PASSWORD_RESET_VIEW, SESSION_VIEW, VERIFY_EMAIL_VIEW,
    },
};

/// A named set of views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesignDoc {
    pub name: String,
    /// Only documents carrying this `(field, value)` pair are indexed.
    /// The auth views use the configured type field so non-user
    /// documents never show up in lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_filter: Option<(String, String)>,
    pub views: BTreeMap<String, ViewDef>,
}

/// One view definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ViewDef {
    /// Emits the document under each listed field path's value.
    Field { paths: Vec<String> },
    /// Emits the document once per key of its `session` map.
    SessionKeys,
}

impl ViewDef {
    fn field(path: &str) -> Self {
        ViewDef::Field {
            paths: vec![path.to_string()],
        }
    }
}

impl DesignDoc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            doc_filter: None,
            views: BTreeMap::new(),
        }
    }

    /// Load every `.json` design document in a directory.
    pub fn load_dir(dir: &Path) -> Result<Vec<DesignDoc>> {
        let mut docs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let raw = std::fs::read_to_string(&path)?;
            docs.push(serde_json::from_str(&raw)?);
        }
        Ok(docs)
    }
}

/// Build the `auth` design document for the given configuration: one
/// view per enabled login key plus the token and session views.
pub fn auth_design_doc(config: &Config) -> DesignDoc {
    let mut doc = DesignDoc::new(AUTH_DESIGN_DOC);
    doc.doc_filter = Some((
        config.db_server.type_field.clone(),
        crate::constants::USER_TYPE.to_string(),
    ));
    for field in config.username_fields() {
        let def = match field {
            // The document id doubles as the username key value when
            // the login was renamed into `_id` at registration.
            "username" => ViewDef::Field {
                paths: vec!["username".to_string(), "_id".to_string()],
            },
            // Pending addresses count: unconfirmed users must stay
            // findable and their addresses stay reserved.
            "email" => ViewDef::Field {
                paths: vec!["email".to_string(), "unverifiedEmail.email".to_string()],
            },
            _ => ViewDef::field(field),
        };
        doc.views.insert(field.to_string(), def);
    }
    if config.local.email_username {
        doc.views.insert(
            EMAIL_USERNAME_VIEW.to_string(),
            ViewDef::Field {
                paths: vec!["email".to_string(), "unverifiedEmail.email".to_string()],
            },
        );
    }
    doc.views.insert(
        PASSWORD_RESET_VIEW.to_string(),
        ViewDef::field("forgotPassword.token"),
    );
    doc.views.insert(
        VERIFY_EMAIL_VIEW.to_string(),
        ViewDef::field("unverifiedEmail.token"),
    );
    doc.views
        .insert(SESSION_VIEW.to_string(), ViewDef::SessionKeys);
    add_providers_to_design_doc(config, &mut doc);
    doc
}

/// Inject one view per configured federated provider, indexing the
/// provider profile id.
pub fn add_providers_to_design_doc(config: &Config, doc: &mut DesignDoc) {
    for provider in config.providers.keys() {
        doc.views.insert(
            provider.clone(),
            ViewDef::field(&format!("oauth.{provider}.profile.id")),
        );
    }
}
