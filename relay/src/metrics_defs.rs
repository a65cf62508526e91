//! Metrics definitions for the relay.

use shared::metrics_defs::{MetricDef, MetricType};

pub const TRIGGERS_RECEIVED: MetricDef = MetricDef {
    name: "relay.triggers.received",
    metric_type: MetricType::Counter,
    description: "Number of triggers received, tagged by kind",
};

pub const TRIGGERS_SKIPPED: MetricDef = MetricDef {
    name: "relay.triggers.skipped",
    metric_type: MetricType::Counter,
    description: "Number of triggers that did not lead to a relay action, tagged by reason",
};

pub const CALLBACKS_REWRITTEN: MetricDef = MetricDef {
    name: "relay.callbacks.rewritten",
    metric_type: MetricType::Counter,
    description: "Number of editor configs whose callback URL was rewritten",
};

pub const NOTIFICATIONS_SENT: MetricDef = MetricDef {
    name: "relay.notifications.sent",
    metric_type: MetricType::Counter,
    description: "Number of outbound notifications, tagged by outcome",
};

pub const NOTIFICATION_DURATION: MetricDef = MetricDef {
    name: "relay.notifications.duration",
    metric_type: MetricType::Histogram,
    description: "Time to deliver an outbound notification in seconds",
};

pub const HEALTH_PROBES: MetricDef = MetricDef {
    name: "relay.health.probes",
    metric_type: MetricType::Counter,
    description: "Number of backend health probes, tagged by result",
};

pub const ALL_METRICS: &[MetricDef] = &[
    TRIGGERS_RECEIVED,
    TRIGGERS_SKIPPED,
    CALLBACKS_REWRITTEN,
    NOTIFICATIONS_SENT,
    NOTIFICATION_DURATION,
    HEALTH_PROBES,
];
