// Entity, command and report subscription storage
pub mod datastore;

// Publish/subscribe transport
pub mod broker;

// Entity CRUD and command issuance
pub mod service;

// Request body validation
pub mod validation;

// HTTP API
pub mod api;

// Configuration loading
pub mod config;

pub use datastore::{
    Command, CommandFilter, CommandStatus, DataStore, DataStoreError, Entity, Filter,
    ReportSubscription, ReportSubscriptionFilter, ReportType,
};
pub use service::{EntityService, ServiceError};
