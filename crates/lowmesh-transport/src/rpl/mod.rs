//! RPL-style DODAG maintenance and route selection.
//!
//! - [`Advertisement`]: the periodic MLE/DIO-like broadcast codec.
//! - [`Dodag`]: rank and preferred parent selection; the default route.
//! - [`RoutingTable`]: host routes learned from advertisements, selected per
//!   destination over authenticated neighbors only.

pub mod advertisement;
pub mod constants;
pub mod dodag;
pub mod table;

pub use advertisement::{AdvertisedRoute, Advertisement};
pub use dodag::{Dodag, DodagRole, ParentChange};
pub use table::{RouteChange, RouteState, RoutingConfig, RoutingEntry, RoutingTable};
