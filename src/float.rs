use std::fmt::{Debug, Display};

use num_traits::{Float as NumFloat, FromPrimitive};

/// Marker trait for base floating-point types (`f32`, `f64`).
///
/// Bundles the numeric and utility traits needed throughout jacquard.
pub trait Float: NumFloat + FromPrimitive + Copy + Debug + Display + 'static {}

impl Float for f32 {}
impl Float for f64 {}
