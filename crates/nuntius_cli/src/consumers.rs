//! Cache consumers for the chat service tables. Active rows are cached under
//! `PREFIX:key`; rows that become inactive are evicted.

use std::sync::Arc;

use nuntius::prelude::*;
use nuntius::RegistrationError;

use crate::config::StoreConfig;

#[entity(table = "groups_group")]
#[derive(Debug)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub tag: String,
    pub slug: String,
    pub description: String,
    pub image: Option<String>,
    pub is_active: bool,
    pub created_by_id: Option<i64>,
    pub updated_by_id: Option<i64>,
}

#[entity(table = "groups_groupmember")]
#[derive(Debug)]
pub struct GroupMember {
    pub id: i64,
    pub group_id: i64,
    pub user_id: String,
    pub admin: bool,
    pub is_active: bool,
}

#[entity(table = "users_user")]
#[derive(Debug)]
pub struct User {
    pub uuid: String,
    pub email: String,
    pub username: String,
    pub first_name: String,
    pub last_name: Option<String>,
    pub is_active: bool,
}

/// Cache every created or updated row under its key. Rows for which `is_active`
/// returns false are evicted instead.
fn cache_consumer<E: Entity>(
    name: &str,
    store: &Arc<MemoryStore>,
    config: &StoreConfig,
    key: fn(&E) -> String,
    is_active: fn(&E) -> bool,
) -> ConsumerDefinition {
    let store = store.clone();
    let prefix = config.prefix(E::TABLE).to_string();

    ConsumerDefinition::builder::<E>(name)
        .on(Operation::Create, Trigger::Always)
        .on(Operation::Update, Trigger::Always)
        .consume(move |row| {
            let key = format!("{prefix}:{}", key(row));

            if is_active(row) {
                store.set(key, row.to_datatypes());
            } else {
                store.delete(key);
            }

            Ok(())
        })
        .build()
}

pub fn register(
    builder: &mut RegistryBuilder,
    store: &Arc<MemoryStore>,
    config: &StoreConfig,
) -> Result<(), RegistrationError> {
    builder
        .register(cache_consumer::<Group>(
            "groups.GroupSubscriber",
            store,
            config,
            |group| group.id.to_string(),
            |group| group.is_active,
        ))?
        .register(cache_consumer::<GroupMember>(
            "groups.GroupMemberSubscriber",
            store,
            config,
            |member| format!("{}-{}", member.group_id, member.user_id),
            |member| member.is_active,
        ))?
        .register(cache_consumer::<User>(
            "users.UserSubscriber",
            store,
            config,
            |user| user.uuid.clone(),
            |_| true,
        ))?;

    Ok(())
}
