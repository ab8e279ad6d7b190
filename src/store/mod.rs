//! Persistence layer
//!
//! Profiles, goals, transactions and product applications, scoped by user.
//! In-memory by default; Postgres when a database URL is configured.

mod postgres;

pub use postgres::PostgresStore;

use crate::catalog::ApplicationRecord;
use crate::error::AdvisorError;
use crate::models::{FinancialGoal, Transaction, UserProfile};
use crate::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

/// Trait for advisor state persistence
#[async_trait]
pub trait AdvisorStore: Send + Sync {
    async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>>;
    async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> Result<()>;

    /// Goals in creation order
    async fn load_goals(&self, user_id: Uuid) -> Result<Vec<FinancialGoal>>;
    async fn save_goal(&self, user_id: Uuid, goal: &FinancialGoal) -> Result<()>;

    /// Apply a deposit atomically with respect to other writes for the same user
    async fn deposit_to_goal(&self, user_id: Uuid, goal_id: Uuid, amount: f64)
        -> Result<FinancialGoal>;

    async fn load_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>>;
    async fn record_transaction(&self, user_id: Uuid, transaction: &Transaction) -> Result<()>;

    async fn save_application(&self, user_id: Uuid, application: &ApplicationRecord)
        -> Result<()>;
    async fn load_applications(&self, user_id: Uuid) -> Result<Vec<ApplicationRecord>>;
}

#[derive(Debug, Default)]
struct UserRecord {
    profile: Option<UserProfile>,
    goals: Vec<FinancialGoal>,
    transactions: Vec<Transaction>,
    applications: Vec<ApplicationRecord>,
}

/// In-memory store for development. Writes for one user are serialised
/// through that user's mutex.
#[derive(Default)]
pub struct InMemoryStore {
    users: RwLock<HashMap<Uuid, Arc<Mutex<UserRecord>>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lookup for read paths; never creates a record
    async fn existing(&self, user_id: Uuid) -> Option<Arc<Mutex<UserRecord>>> {
        self.users.read().await.get(&user_id).map(Arc::clone)
    }

    /// Record for write paths, created on first write
    async fn user(&self, user_id: Uuid) -> Arc<Mutex<UserRecord>> {
        if let Some(record) = self.existing(user_id).await {
            return record;
        }

        let mut users = self.users.write().await;
        Arc::clone(users.entry(user_id).or_default())
    }

    async fn read<T>(&self, user_id: Uuid, f: impl FnOnce(&UserRecord) -> T) -> Option<T> {
        let user = self.existing(user_id).await?;
        let record = user.lock().await;
        Some(f(&record))
    }
}

#[async_trait]
impl AdvisorStore for InMemoryStore {
    async fn load_profile(&self, user_id: Uuid) -> Result<Option<UserProfile>> {
        Ok(self
            .read(user_id, |record| record.profile.clone())
            .await
            .flatten())
    }

    async fn save_profile(&self, user_id: Uuid, profile: &UserProfile) -> Result<()> {
        let user = self.user(user_id).await;
        user.lock().await.profile = Some(profile.clone());
        Ok(())
    }

    async fn load_goals(&self, user_id: Uuid) -> Result<Vec<FinancialGoal>> {
        Ok(self
            .read(user_id, |record| record.goals.clone())
            .await
            .unwrap_or_default())
    }

    async fn save_goal(&self, user_id: Uuid, goal: &FinancialGoal) -> Result<()> {
        let user = self.user(user_id).await;
        let mut record = user.lock().await;
        match record.goals.iter_mut().find(|g| g.id == goal.id) {
            Some(existing) => *existing = goal.clone(),
            None => record.goals.push(goal.clone()),
        }
        Ok(())
    }

    async fn deposit_to_goal(
        &self,
        user_id: Uuid,
        goal_id: Uuid,
        amount: f64,
    ) -> Result<FinancialGoal> {
        let not_found = || AdvisorError::NotFound(format!("goal {}", goal_id));
        let user = self.existing(user_id).await.ok_or_else(not_found)?;
        let mut record = user.lock().await;
        let goal = record
            .goals
            .iter_mut()
            .find(|g| g.id == goal_id)
            .ok_or_else(not_found)?;

        goal.deposit(amount)?;
        Ok(goal.clone())
    }

    async fn load_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>> {
        Ok(self
            .read(user_id, |record| record.transactions.clone())
            .await
            .unwrap_or_default())
    }

    async fn record_transaction(&self, user_id: Uuid, transaction: &Transaction) -> Result<()> {
        let user = self.user(user_id).await;
        user.lock().await.transactions.push(transaction.clone());
        Ok(())
    }

    async fn save_application(
        &self,
        user_id: Uuid,
        application: &ApplicationRecord,
    ) -> Result<()> {
        let user = self.user(user_id).await;
        user.lock().await.applications.push(application.clone());
        Ok(())
    }

    async fn load_applications(&self, user_id: Uuid) -> Result<Vec<ApplicationRecord>> {
        Ok(self
            .read(user_id, |record| record.applications.clone())
            .await
            .unwrap_or_default())
    }
}

/// Pick the backend from `POSTGRES_URL` / `DATABASE_URL`, in-memory otherwise
pub fn build_store() -> Arc<dyn AdvisorStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok()
        .filter(|url| !url.trim().is_empty());

    if let Some(url) = database_url {
        match PostgresStore::connect_lazy(&url) {
            Ok(store) => {
                info!("Advisor store backend: postgres");
                return Arc::new(store);
            }
            Err(error) => {
                warn!(
                    "Failed to initialize postgres store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("Advisor store backend: in-memory");
    Arc::new(InMemoryStore::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GoalCategory, IslamicImportance, NewGoal, Priority};

    fn goal(target: f64) -> FinancialGoal {
        FinancialGoal::new(NewGoal {
            goal_name: "Хадж".to_string(),
            target_amount: target,
            current_amount: 0.0,
            timeline_months: 24,
            category: GoalCategory::Hajj,
            priority: Priority::Medium,
            islamic_importance: IslamicImportance::Fard,
        })
    }

    #[tokio::test]
    async fn test_reads_for_unknown_users_leave_no_records() {
        let store = InMemoryStore::new();
        for _ in 0..1000 {
            let user = Uuid::new_v4();
            assert!(store.load_profile(user).await.unwrap().is_none());
            assert!(store.load_goals(user).await.unwrap().is_empty());
            assert!(store.load_transactions(user).await.unwrap().is_empty());
            assert!(store.load_applications(user).await.unwrap().is_empty());
            assert!(store.deposit_to_goal(user, Uuid::new_v4(), 10.0).await.is_err());
        }
        assert_eq!(store.users.read().await.len(), 0);

        let writer = Uuid::new_v4();
        store.save_goal(writer, &goal(1_000.0)).await.unwrap();
        assert_eq!(store.users.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_goals_are_scoped_by_user() {
        let store = InMemoryStore::new();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        store.save_goal(alice, &goal(1_000.0)).await.unwrap();
        assert_eq!(store.load_goals(alice).await.unwrap().len(), 1);
        assert!(store.load_goals(bob).await.unwrap().is_empty());
        assert!(store.load_profile(bob).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deposit_completes_goal() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let g = goal(1_000.0);
        store.save_goal(user, &g).await.unwrap();

        let updated = store.deposit_to_goal(user, g.id, 1_000.0).await.unwrap();
        assert!(updated.is_completed);
        assert_eq!(store.load_goals(user).await.unwrap()[0].current_amount, 1_000.0);
    }

    #[tokio::test]
    async fn test_deposit_unknown_goal_is_not_found() {
        let store = InMemoryStore::new();
        let err = store
            .deposit_to_goal(Uuid::new_v4(), Uuid::new_v4(), 10.0)
            .await
            .unwrap_err();
        assert!(matches!(err, AdvisorError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_concurrent_deposits_are_serialised() {
        let store = Arc::new(InMemoryStore::new());
        let user = Uuid::new_v4();
        let g = goal(1_000_000.0);
        store.save_goal(user, &g).await.unwrap();

        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.deposit_to_goal(user, g.id, 10.0).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.load_goals(user).await.unwrap()[0].current_amount, 500.0);
    }
}
