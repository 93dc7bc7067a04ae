pub mod feature;
pub mod window;

pub use feature::{Feature, FeatureClass, Field, SpatialReference};
pub use window::{BackfillPlan, BackfillWindows, TimeWindow, UpperBound};
