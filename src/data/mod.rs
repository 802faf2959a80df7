pub mod discrepancy;
pub mod metric;
pub mod notification;
pub mod point;
pub mod setting;
pub mod zone;

pub use discrepancy::{Discrepancy, DiscrepancyKey, DiscrepancyKind};
pub use metric::{AutoLabel, Metric, MetricKey, MetricKind};
pub use notification::{Notification, Severity};
pub use point::{DataPoint, HealthEntry, Payload};
pub use setting::{PingSetting, ProbeMethod};
pub use zone::DisplayZone;
