pub mod bootstrap;
pub mod calendar_sync;
pub mod reconciler;
pub mod runtime;
pub mod schedule_store;
