pub mod aggregator;
pub mod model;

pub use aggregator::{Aggregator, AggregatorStats, Observation, PendingDetail};
pub use model::{
    DetailStatus, Delivery, ImageSet, PageKind, PageRef, Price, ProductId, ProductRecord, VariantType,
};
