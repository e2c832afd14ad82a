//! Friendly URL entries: URL titles mapped to a classified resource per
//! group and language.

use crate::error::StoreError;
use crate::finder_path::FinderDescriptor;
use crate::store::{EntityConfig, EntityStore, FinderQuery};
use entity_store_core::{
    Audit, Entity, OrderByComparator, PrimaryKey, QueryExecutor, Schema, Value,
};
use serde::{Deserialize, Serialize};
use std::ops::Deref;

/// Entity name used in messages.
pub const ENTITY_NAME: &str = "FriendlyUrlEntry";
/// Backing table.
pub const TABLE: &str = "CPFriendlyURLEntry";

const COLUMNS: [&str; 13] = [
    "uuid",
    "entryId",
    "groupId",
    "companyId",
    "userId",
    "userName",
    "createDate",
    "modifiedDate",
    "classNameId",
    "classPK",
    "languageId",
    "urlTitle",
    "main",
];

/// Finder names.
pub mod finder {
    /// Entries by uuid.
    pub const UUID: &str = "Uuid";
    /// Entries by uuid within a company.
    pub const UUID_C: &str = "Uuid_C";
    /// Entries of one resource.
    pub const G_C_C_C: &str = "G_C_C_C";
    /// Entries with one URL title across languages.
    pub const G_C_C_U: &str = "G_C_C_U";
    /// Main or alternate entries of one resource.
    pub const G_C_C_C_M: &str = "G_C_C_C_M";
    /// Entry by uuid within a group.
    pub const UUID_G: &str = "UUID_G";
    /// Entry by group, language and URL title.
    pub const G_L_U: &str = "G_L_U";
    /// Entry by class, language and URL title.
    pub const G_C_C_L_U: &str = "G_C_C_L_U";
    /// Entry by resource, language and URL title.
    pub const G_C_C_C_L_U: &str = "G_C_C_C_L_U";
    /// Main entry of one resource in one language.
    pub const G_C_C_C_L_M: &str = "G_C_C_C_L_M";
}

/// A URL title pointing at a resource (`classNameId`, `classPK`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FriendlyUrlEntry {
    /// Primary key.
    pub entry_id: i64,
    /// Site the entry belongs to.
    pub group_id: i64,
    /// Author.
    pub user_id: i64,
    /// Author display name.
    pub user_name: String,
    /// Resource type.
    pub class_name_id: i64,
    /// Resource id.
    #[serde(rename = "classPK")]
    pub class_pk: i64,
    /// Locale, e.g. `en_US`.
    pub language_id: String,
    /// URL segment.
    pub url_title: String,
    /// Whether this is the canonical title of the resource in its language.
    pub main: bool,
    /// Audit columns.
    #[serde(flatten)]
    pub audit: Audit,
    #[serde(skip)]
    new: bool,
}

impl Entity for FriendlyUrlEntry {
    fn with_primary_key(primary_key: PrimaryKey) -> Self {
        Self {
            entry_id: primary_key.as_long().unwrap_or_default(),
            new: true,
            ..Self::default()
        }
    }

    fn primary_key(&self) -> PrimaryKey {
        PrimaryKey::Long(self.entry_id)
    }

    fn is_new(&self) -> bool {
        self.new
    }

    fn set_new(&mut self, new: bool) {
        self.new = new;
    }

    fn audit(&self) -> &Audit {
        &self.audit
    }

    fn audit_mut(&mut self) -> &mut Audit {
        &mut self.audit
    }

    fn column(&self, name: &str) -> Value {
        match name {
            "uuid" => self.audit.uuid.as_str().into(),
            "entryId" => self.entry_id.into(),
            "groupId" => self.group_id.into(),
            "companyId" => self.audit.company_id.into(),
            "userId" => self.user_id.into(),
            "userName" => self.user_name.as_str().into(),
            "createDate" => self.audit.create_date.into(),
            "modifiedDate" => self.audit.modified_date().into(),
            "classNameId" => self.class_name_id.into(),
            "classPK" => self.class_pk.into(),
            "languageId" => self.language_id.as_str().into(),
            "urlTitle" => self.url_title.as_str().into(),
            "main" => self.main.into(),
            _ => Value::Null,
        }
    }
}

/// Schema, finders and default ordering of [`FriendlyUrlEntry`].
///
/// # Errors
/// Returns an error only if the column table above is inconsistent.
pub fn entity_config() -> Result<EntityConfig, StoreError> {
    let schema = Schema::new(ENTITY_NAME, "entryId", &COLUMNS)?
        .with_physical_names([("uuid", "uuid_"), ("entryId", "CPFriendlyURLEntryId")])?;

    let finders = vec![
        FinderDescriptor::non_unique(finder::UUID, &["uuid"]),
        FinderDescriptor::non_unique(finder::UUID_C, &["uuid", "companyId"]),
        FinderDescriptor::non_unique(
            finder::G_C_C_C,
            &["groupId", "companyId", "classNameId", "classPK"],
        ),
        FinderDescriptor::non_unique(
            finder::G_C_C_U,
            &["groupId", "companyId", "classNameId", "urlTitle"],
        ),
        FinderDescriptor::non_unique(
            finder::G_C_C_C_M,
            &["groupId", "companyId", "classNameId", "classPK", "main"],
        ),
        FinderDescriptor::unique(finder::UUID_G, &["uuid", "groupId"]),
        FinderDescriptor::unique(finder::G_L_U, &["groupId", "languageId", "urlTitle"]),
        FinderDescriptor::unique(
            finder::G_C_C_L_U,
            &["groupId", "companyId", "classNameId", "languageId", "urlTitle"],
        ),
        FinderDescriptor::unique(
            finder::G_C_C_C_L_U,
            &["groupId", "companyId", "classNameId", "classPK", "languageId", "urlTitle"],
        ),
        FinderDescriptor::unique(
            finder::G_C_C_C_L_M,
            &["groupId", "companyId", "classNameId", "classPK", "languageId", "main"],
        ),
    ];

    Ok(EntityConfig {
        schema,
        table: TABLE.to_owned(),
        finders,
        default_order: Some(OrderByComparator::asc("urlTitle")),
    })
}

/// Typed finders over an [`EntityStore`] of friendly URL entries.
pub struct FriendlyUrlEntryStore<X: QueryExecutor<FriendlyUrlEntry>> {
    store: EntityStore<FriendlyUrlEntry, X>,
}

impl<X: QueryExecutor<FriendlyUrlEntry>> Deref for FriendlyUrlEntryStore<X> {
    type Target = EntityStore<FriendlyUrlEntry, X>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

impl<X: QueryExecutor<FriendlyUrlEntry>> FriendlyUrlEntryStore<X> {
    /// Wrap a store built from [`entity_config`].
    #[must_use]
    pub const fn new(store: EntityStore<FriendlyUrlEntry, X>) -> Self {
        Self { store }
    }

    /// Underlying generic store.
    #[must_use]
    pub fn into_inner(self) -> EntityStore<FriendlyUrlEntry, X> {
        self.store
    }

    /// Entries with this uuid, sorted by primary key.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn find_by_uuid(&self, uuid: &str) -> Result<Vec<FriendlyUrlEntry>, StoreError> {
        self.store.find(&FinderQuery::new(finder::UUID).arg(uuid))
    }

    /// Number of entries with this uuid.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn count_by_uuid(&self, uuid: &str) -> Result<u64, StoreError> {
        self.store.count(&FinderQuery::new(finder::UUID).arg(uuid))
    }

    /// Entry with this uuid in a group, if any.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn fetch_by_uuid_g(&self, uuid: &str, group_id: i64) -> Result<Option<FriendlyUrlEntry>, StoreError> {
        self.store
            .fetch_unique(&FinderQuery::new(finder::UUID_G).arg(uuid).arg(group_id))
    }

    /// Entries of one resource, sorted by primary key.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn find_by_g_c_c_c(
        &self,
        group_id: i64,
        company_id: i64,
        class_name_id: i64,
        class_pk: i64,
    ) -> Result<Vec<FriendlyUrlEntry>, StoreError> {
        self.store.find(
            &FinderQuery::new(finder::G_C_C_C)
                .arg(group_id)
                .arg(company_id)
                .arg(class_name_id)
                .arg(class_pk),
        )
    }

    /// Entry for a URL title in one group and language, if any.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn fetch_by_g_l_u(
        &self,
        group_id: i64,
        language_id: &str,
        url_title: &str,
    ) -> Result<Option<FriendlyUrlEntry>, StoreError> {
        self.store.fetch_unique(&Self::g_l_u(group_id, language_id, url_title))
    }

    /// Like [`FriendlyUrlEntryStore::fetch_by_g_l_u`], failing when absent.
    ///
    /// # Errors
    /// Returns [`StoreError::EntityNotFound`] when no entry matches.
    pub fn find_by_g_l_u(
        &self,
        group_id: i64,
        language_id: &str,
        url_title: &str,
    ) -> Result<FriendlyUrlEntry, StoreError> {
        self.store.find_unique(&Self::g_l_u(group_id, language_id, url_title))
    }

    /// Zero or one.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn count_by_g_l_u(&self, group_id: i64, language_id: &str, url_title: &str) -> Result<u64, StoreError> {
        self.store.count(&Self::g_l_u(group_id, language_id, url_title))
    }

    /// Main entry of a resource in one language, if any.
    ///
    /// # Errors
    /// Returns an error when the executor fails.
    pub fn fetch_main(
        &self,
        group_id: i64,
        company_id: i64,
        class_name_id: i64,
        class_pk: i64,
        language_id: &str,
    ) -> Result<Option<FriendlyUrlEntry>, StoreError> {
        self.store.fetch_unique(
            &FinderQuery::new(finder::G_C_C_C_L_M)
                .arg(group_id)
                .arg(company_id)
                .arg(class_name_id)
                .arg(class_pk)
                .arg(language_id)
                .arg(true),
        )
    }

    fn g_l_u(group_id: i64, language_id: &str, url_title: &str) -> FinderQuery {
        FinderQuery::new(finder::G_L_U)
            .arg(group_id)
            .arg(language_id)
            .arg(url_title)
    }
}
