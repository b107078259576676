//! Composable record predicates used by `list_*` scans.
//!
//! Every condition on a builder starts unset, and an unset condition matches
//! everything. Set conditions are combined with AND. Time bounds are strict.

use super::models::{Command, CommandStatus, ReportSubscription, ReportType};
use chrono::{DateTime, Utc};

/// Membership test over a record type.
pub trait Filter<T> {
    fn check(&self, record: &T) -> bool;
}

/// Filter with no conditions. Matches every record of any type.
#[derive(Debug, Clone, Copy, Default)]
pub struct MatchAll;

impl<T> Filter<T> for MatchAll {
    fn check(&self, _record: &T) -> bool {
        true
    }
}

/// Builder for command scans.
#[derive(Debug, Clone, Default)]
pub struct CommandFilter {
    entity_id: Option<String>,
    status: Option<CommandStatus>,
    issued_after: Option<DateTime<Utc>>,
    issued_before: Option<DateTime<Utc>>,
}

impl CommandFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn by_status(mut self, status: CommandStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn issued_after(mut self, threshold: DateTime<Utc>) -> Self {
        self.issued_after = Some(threshold);
        self
    }

    pub fn issued_before(mut self, threshold: DateTime<Utc>) -> Self {
        self.issued_before = Some(threshold);
        self
    }
}

impl Filter<Command> for CommandFilter {
    fn check(&self, command: &Command) -> bool {
        if let Some(ref entity_id) = self.entity_id {
            if *entity_id != command.entity_id {
                return false;
            }
        }

        if let Some(status) = self.status {
            if status != command.status {
                return false;
            }
        }

        if let Some(after) = self.issued_after {
            if command.issued_at <= after {
                return false;
            }
        }

        if let Some(before) = self.issued_before {
            if command.issued_at >= before {
                return false;
            }
        }

        true
    }
}

/// Builder for report subscription scans.
#[derive(Debug, Clone, Default)]
pub struct ReportSubscriptionFilter {
    entity_id: Option<String>,
    report_type: Option<ReportType>,
    is_active: Option<bool>,
    updated_after: Option<DateTime<Utc>>,
    updated_before: Option<DateTime<Utc>>,
}

impl ReportSubscriptionFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn by_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn by_report_type(mut self, report_type: ReportType) -> Self {
        self.report_type = Some(report_type);
        self
    }

    pub fn by_is_active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn updated_after(mut self, threshold: DateTime<Utc>) -> Self {
        self.updated_after = Some(threshold);
        self
    }

    pub fn updated_before(mut self, threshold: DateTime<Utc>) -> Self {
        self.updated_before = Some(threshold);
        self
    }
}

impl Filter<ReportSubscription> for ReportSubscriptionFilter {
    fn check(&self, subscription: &ReportSubscription) -> bool {
        if let Some(ref entity_id) = self.entity_id {
            if *entity_id != subscription.entity_id {
                return false;
            }
        }

        if let Some(report_type) = self.report_type {
            if report_type != subscription.report_type {
                return false;
            }
        }

        if let Some(is_active) = self.is_active {
            if is_active != subscription.is_active {
                return false;
            }
        }

        if let Some(after) = self.updated_after {
            if subscription.updated_at <= after {
                return false;
            }
        }

        if let Some(before) = self.updated_before {
            if subscription.updated_at >= before {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::Map;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn command(entity_id: &str, status: CommandStatus, issued_at: DateTime<Utc>) -> Command {
        let mut command = Command::pending("cmd", entity_id, Map::new(), issued_at);
        command.status = status;
        command
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        let filter = CommandFilter::new();
        assert!(filter.check(&command("e1", CommandStatus::Pending, at(0))));
        assert!(filter.check(&command("e2", CommandStatus::Failure, at(100))));

        assert!(MatchAll.check(&command("e3", CommandStatus::Success, at(5))));
    }

    #[test]
    fn test_command_filter_conditions_are_anded() {
        let filter = CommandFilter::new()
            .by_entity_id("e1")
            .by_status(CommandStatus::Pending);

        assert!(filter.check(&command("e1", CommandStatus::Pending, at(0))));
        assert!(!filter.check(&command("e1", CommandStatus::Success, at(0))));
        assert!(!filter.check(&command("e2", CommandStatus::Pending, at(0))));
    }

    #[test]
    fn test_command_filter_time_bounds_are_strict() {
        let filter = CommandFilter::new().issued_after(at(10)).issued_before(at(20));

        assert!(!filter.check(&command("e1", CommandStatus::Pending, at(10))));
        assert!(filter.check(&command("e1", CommandStatus::Pending, at(15))));
        assert!(!filter.check(&command("e1", CommandStatus::Pending, at(20))));
        assert!(!filter.check(&command("e1", CommandStatus::Pending, at(25))));
    }

    #[test]
    fn test_report_subscription_filter() {
        let now = at(0);
        let mut inactive = ReportSubscription::metric("e1", "power", now);
        inactive.is_active = false;
        let active_state = ReportSubscription::state("e1", now);
        let other_entity = ReportSubscription::state("e2", now);

        let filter = ReportSubscriptionFilter::new()
            .by_entity_id("e1")
            .by_is_active(true);
        assert!(filter.check(&active_state));
        assert!(!filter.check(&inactive));
        assert!(!filter.check(&other_entity));

        let filter = ReportSubscriptionFilter::new().by_report_type(ReportType::Metric);
        assert!(filter.check(&inactive));
        assert!(!filter.check(&active_state));
    }

    #[test]
    fn test_report_subscription_filter_updated_window() {
        let sub = ReportSubscription::state("e1", at(50));

        assert!(ReportSubscriptionFilter::new()
            .updated_after(at(50) - Duration::seconds(1))
            .check(&sub));
        assert!(!ReportSubscriptionFilter::new().updated_after(at(50)).check(&sub));
        assert!(!ReportSubscriptionFilter::new().updated_before(at(50)).check(&sub));
    }
}
