use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::entitlement_repository::EntitlementRepository;
use crate::models::entitlement::{EntitlementUpdate, UserEntitlement};

/// In-memory entitlement store for tests. `should_fail` breaks every call,
/// `fail_writes` only the mutating ones.
#[derive(Default)]
pub struct MockDb {
    pub users: Mutex<HashMap<Uuid, UserEntitlement>>,
    pub should_fail: bool,
    pub fail_writes: bool,
    pub update_calls: Mutex<usize>,
    pub bind_customer_calls: Mutex<usize>,
}

impl MockDb {
    pub fn with_users(users: impl IntoIterator<Item = UserEntitlement>) -> Self {
        Self {
            users: Mutex::new(users.into_iter().map(|u| (u.id, u)).collect()),
            ..Default::default()
        }
    }

    pub fn insert(&self, user: UserEntitlement) {
        self.users.lock().unwrap().insert(user.id, user);
    }

    pub fn get(&self, user_id: Uuid) -> Option<UserEntitlement> {
        self.users.lock().unwrap().get(&user_id).cloned()
    }

    fn check_read(&self) -> Result<(), sqlx::Error> {
        if self.should_fail {
            return Err(sqlx::Error::Protocol("Mock DB failure".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), sqlx::Error> {
        if self.should_fail || self.fail_writes {
            return Err(sqlx::Error::Protocol("Mock DB write failure".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl EntitlementRepository for MockDb {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_read()?;
        Ok(self.get(user_id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_read()?;
        let email = email.trim();
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_subscription_id(
        &self,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_read()?;
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
            .cloned())
    }

    async fn update(
        &self,
        user_id: Uuid,
        update: EntitlementUpdate,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_write()?;
        *self.update_calls.lock().unwrap() += 1;
        let mut users = self.users.lock().unwrap();
        Ok(users.get_mut(&user_id).map(|user| {
            update.apply_to(user);
            user.clone()
        }))
    }

    async fn revoke_if_subscription_matches(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&user_id)
            .filter(|u| u.stripe_subscription_id.as_deref() == Some(subscription_id))
            .map(|user| {
                EntitlementUpdate::revoke().apply_to(user);
                user.clone()
            }))
    }

    async fn bind_customer_id(
        &self,
        user_id: Uuid,
        customer_id: &str,
    ) -> Result<Option<UserEntitlement>, sqlx::Error> {
        self.check_write()?;
        *self.bind_customer_calls.lock().unwrap() += 1;
        let mut users = self.users.lock().unwrap();
        Ok(users
            .get_mut(&user_id)
            .filter(|u| u.stripe_customer_id.is_none())
            .map(|user| {
                user.stripe_customer_id = Some(customer_id.to_string());
                user.clone()
            }))
    }

    async fn link_subscription_if_absent(
        &self,
        user_id: Uuid,
        subscription_id: &str,
    ) -> Result<bool, sqlx::Error> {
        self.check_write()?;
        let mut users = self.users.lock().unwrap();
        match users
            .get_mut(&user_id)
            .filter(|u| u.stripe_subscription_id.is_none())
        {
            Some(user) => {
                user.stripe_subscription_id = Some(subscription_id.to_string());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn clear_expired_premium(&self, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
        self.check_write()?;
        let mut cleared = 0;
        for user in self.users.lock().unwrap().values_mut() {
            let expired = user.premium_expires_at.is_some_and(|at| at <= now);
            if user.is_premium && expired {
                user.is_premium = false;
                user.stripe_subscription_id = None;
                cleared += 1;
            }
        }
        Ok(cleared)
    }
}
