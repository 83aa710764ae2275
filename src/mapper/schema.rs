//! Entity schema registry.
//!
//! Each syncable entity has a static descriptor: its external table name, the
//! declared field list, which fields are references to other entities, and
//! the internal-to-external rename table (identity when absent). Translation
//! always goes through a registered descriptor, so field-existence validation
//! cannot be skipped.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{Church, Communication, Person, Task};

/// The syncable entity kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Person,
    Church,
    Task,
    Communication,
}

impl EntityKind {
    pub fn name(&self) -> &'static str {
        match self {
            EntityKind::Person => "Person",
            EntityKind::Church => "Church",
            EntityKind::Task => "Task",
            EntityKind::Communication => "Communication",
        }
    }

    /// The external store table this kind reconciles against.
    pub fn table(&self) -> &'static str {
        match self {
            EntityKind::Person => "people",
            EntityKind::Church => "churches",
            EntityKind::Task => "tasks",
            EntityKind::Communication => "communications",
        }
    }

    pub fn from_table(table: &str) -> Option<Self> {
        match table {
            "people" => Some(EntityKind::Person),
            "churches" => Some(EntityKind::Church),
            "tasks" => Some(EntityKind::Task),
            "communications" => Some(EntityKind::Communication),
            _ => None,
        }
    }

    /// Whether this kind is a contact specialization backed by a shared
    /// contact identity row.
    pub fn is_contact(&self) -> bool {
        matches!(self, EntityKind::Person | EntityKind::Church)
    }
}

/// Static schema descriptor for one entity kind.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    pub name: &'static str,
    pub table: &'static str,
    /// Declared internal field names, in serialization order.
    pub fields: &'static [&'static str],
    /// Fields that reference another entity (foreign-key scalars).
    pub reference_fields: &'static [&'static str],
    /// Internal name -> external column name; identity for unmapped fields.
    pub renames: &'static [(&'static str, &'static str)],
}

impl EntityDescriptor {
    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains(&field)
    }

    /// External column name for an internal field.
    pub fn external_name<'a>(&self, field: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(internal, _)| *internal == field)
            .map(|(_, external)| *external)
            .unwrap_or(field)
    }

    /// Internal field name for an external column.
    pub fn internal_name<'a>(&self, external: &'a str) -> &'a str {
        self.renames
            .iter()
            .find(|(_, ext)| *ext == external)
            .map(|(internal, _)| *internal)
            .unwrap_or(external)
    }
}

static PERSON: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Person,
    name: "Person",
    table: "people",
    fields: &[
        "id",
        "first_name",
        "last_name",
        "email",
        "phone",
        "street_address",
        "city",
        "state",
        "zip_code",
        "notes",
        "status",
        "user_id",
        "office_id",
        "birthday",
        "marital_status",
        "spouse_name",
        "facebook_url",
        "pipeline_stage",
        "assignment",
        "last_synced_at",
        "created_at",
        "updated_at",
    ],
    reference_fields: &["user_id", "office_id"],
    // The legacy external schema kept the people pipeline under its own
    // column name.
    renames: &[("pipeline_stage", "people_pipeline")],
};

static CHURCH: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Church,
    name: "Church",
    table: "churches",
    fields: &[
        "id",
        "name",
        "email",
        "phone",
        "street_address",
        "city",
        "state",
        "zip_code",
        "notes",
        "status",
        "user_id",
        "office_id",
        "denomination",
        "pastor_name",
        "pastor_email",
        "pastor_phone",
        "congregation_size",
        "pipeline_stage",
        "last_synced_at",
        "created_at",
        "updated_at",
    ],
    reference_fields: &["user_id", "office_id"],
    renames: &[],
};

static TASK: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Task,
    name: "Task",
    table: "tasks",
    fields: &[
        "id",
        "title",
        "description",
        "due_date",
        "completed",
        "person_id",
        "church_id",
        "office_id",
        "assigned_to_id",
        "created_by_id",
        "last_synced_at",
        "created_at",
        "updated_at",
    ],
    reference_fields: &[
        "person_id",
        "church_id",
        "office_id",
        "assigned_to_id",
        "created_by_id",
    ],
    renames: &[],
};

static COMMUNICATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Communication,
    name: "Communication",
    table: "communications",
    fields: &[
        "id",
        "comm_type",
        "subject",
        "message",
        "direction",
        "person_id",
        "church_id",
        "office_id",
        "user_id",
        "sent_at",
        "last_synced_at",
        "created_at",
        "updated_at",
    ],
    reference_fields: &["person_id", "church_id", "office_id", "user_id"],
    renames: &[],
};

/// Look up the registered descriptor for an entity kind.
pub fn descriptor(kind: EntityKind) -> &'static EntityDescriptor {
    match kind {
        EntityKind::Person => &PERSON,
        EntityKind::Church => &CHURCH,
        EntityKind::Task => &TASK,
        EntityKind::Communication => &COMMUNICATION,
    }
}

/// A domain entity the sync engine can reconcile.
pub trait SyncEntity: Serialize + DeserializeOwned {
    const KIND: EntityKind;

    /// The entity identity, when assigned.
    fn id(&self) -> Option<i64>;
}

impl SyncEntity for Person {
    const KIND: EntityKind = EntityKind::Person;

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }
}

impl SyncEntity for Church {
    const KIND: EntityKind = EntityKind::Church;

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }
}

impl SyncEntity for Task {
    const KIND: EntityKind = EntityKind::Task;

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }
}

impl SyncEntity for Communication {
    const KIND: EntityKind = EntityKind::Communication;

    fn id(&self) -> Option<i64> {
        Some(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_rename_lookup() {
        let desc = descriptor(EntityKind::Person);
        assert_eq!(desc.external_name("pipeline_stage"), "people_pipeline");
        assert_eq!(desc.external_name("first_name"), "first_name");
        assert_eq!(desc.internal_name("people_pipeline"), "pipeline_stage");
        assert_eq!(desc.internal_name("first_name"), "first_name");
    }

    #[test]
    fn test_church_has_no_renames() {
        let desc = descriptor(EntityKind::Church);
        assert!(desc.renames.is_empty());
        assert_eq!(desc.external_name("pipeline_stage"), "pipeline_stage");
    }

    #[test]
    fn test_kind_table_round_trip() {
        for kind in [
            EntityKind::Person,
            EntityKind::Church,
            EntityKind::Task,
            EntityKind::Communication,
        ] {
            assert_eq!(EntityKind::from_table(kind.table()), Some(kind));
        }
        assert_eq!(EntityKind::from_table("widgets"), None);
    }
}
