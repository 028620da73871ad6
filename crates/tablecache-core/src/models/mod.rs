//! Data models for the restaurant reviews service.
//!
//! Payloads coming back from the remote are decoded into these types before
//! they are cached, so malformed data never reaches the store.
//!
//! - `Restaurant`: a restaurant entity with its filterable attributes
//! - `Review`, `NewReview`: stored reviews and reviews being submitted

pub mod restaurant;
pub mod review;

mod lenient;

pub use restaurant::{LatLng, Restaurant};
pub use review::{NewReview, Review};
