//! Observability subsystem
//!
//! - Structured logging (one JSON object per line)
//! - Typed lifecycle events
//! - Begin/complete scopes around long runs
//!
//! Observability is read-only: nothing here changes what a run does.
//!
//! ```ignore
//! use cidmend::observability::{log_event_with_fields, Event, Logger};
//!
//! log_event_with_fields(Event::MigrationRecordSkipped, &[("uri", uri), ("reason", "invalid JSON")]);
//! Logger::info("CUSTOM_EVENT", &[("k", "v")]);
//! ```

mod events;
mod logger;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use scope::ObservationScope;

/// Log a lifecycle event
pub fn log_event(event: Event) {
    log_event_with_fields(event, &[]);
}

/// Log a lifecycle event with fields
///
/// Warning events are emitted at WARN, everything else at INFO.
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_warning() {
        Severity::Warn
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ConfigLoaded);
        log_event(Event::StoreOpened);
    }

    #[test]
    fn test_log_event_with_fields() {
        log_event_with_fields(
            Event::ReconcileRecordUnconfirmed,
            &[("rkey", "3m4b7h7auis2e"), ("collection", "app.bsky.feed.post")],
        );
    }
}
