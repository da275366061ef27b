//! Back-pressured operators
//!
//! Each operator guards its state behind one lock and never calls an
//! observer while holding it. Construct them through
//! [`ObservableExt`](crate::observable::ObservableExt).

pub mod cache;
pub mod concat_map;
pub mod flat_map;
pub mod window;
pub mod zip;
