use super::collection::{self, Record};
use super::SqliteDataStore;
use crate::datastore::{
    DataStoreError, Filter, ReportSubscription, ReportSubscriptionRepository, Result,
};
use chrono::Utc;
use tracing::debug;

impl Record for ReportSubscription {
    const COLLECTION: &'static str = "ReportSubscription";

    fn key(&self) -> String {
        self.id.to_string()
    }
}

impl SqliteDataStore {
    fn set_report_subscription_active(
        &self,
        id: u64,
        is_active: bool,
    ) -> Result<ReportSubscription> {
        let subscription = self.with_write(|conn| {
            collection::update::<ReportSubscription, _>(conn, &id.to_string(), |sub| {
                sub.is_active = is_active;
                sub.updated_at = Utc::now();
                Ok(())
            })
        })?;

        debug!(subscription_id = id, is_active, "Updated report subscription");
        Ok(subscription)
    }
}

impl ReportSubscriptionRepository for SqliteDataStore {
    fn get_report_subscription_by_id(&self, id: u64) -> Result<ReportSubscription> {
        self.with_read(|conn| collection::get(conn, &id.to_string()))
    }

    fn list_report_subscriptions(
        &self,
        filter: &dyn Filter<ReportSubscription>,
    ) -> Result<Vec<ReportSubscription>> {
        self.with_read(|conn| collection::scan(conn, filter))
    }

    fn add_report_subscription(
        &self,
        subscription: ReportSubscription,
    ) -> Result<ReportSubscription> {
        if !subscription.is_well_formed() {
            return Err(DataStoreError::InvalidData(format!(
                "report type '{}' does not match metric {:?}",
                subscription.report_type, subscription.metric
            )));
        }

        let stored = self.with_write(move |conn| {
            // Report a missing collection before touching the counter table.
            collection::require(conn, ReportSubscription::COLLECTION)?;

            let mut subscription = subscription;
            subscription.id = collection::next_sequence(conn, ReportSubscription::COLLECTION)?;
            collection::insert(conn, &subscription)?;
            Ok(subscription)
        })?;

        debug!(
            subscription_id = stored.id,
            entity_id = %stored.entity_id,
            report_type = %stored.report_type,
            "Stored report subscription"
        );
        Ok(stored)
    }

    fn delete_report_subscription(&self, id: u64) -> Result<()> {
        self.with_write(|conn| collection::remove::<ReportSubscription>(conn, &id.to_string()))?;
        debug!(subscription_id = id, "Deleted report subscription");
        Ok(())
    }

    fn activate_report_subscription(&self, id: u64) -> Result<ReportSubscription> {
        self.set_report_subscription_active(id, true)
    }

    fn deactivate_report_subscription(&self, id: u64) -> Result<ReportSubscription> {
        self.set_report_subscription_active(id, false)
    }
}
