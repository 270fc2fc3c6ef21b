//! The interchangeable synchronization protocols.
//!
//! Every mode wires its delta handler in at `init` and drives the
//! iteration clock in `process`; they share the accumulator, the reply
//! registry, and the parameter broadcast primitives.

pub(crate) mod aap;
pub(crate) mod bsp;
pub(crate) mod fsp;
pub(crate) mod pap;
pub(crate) mod sap;
pub(crate) mod ssp;
pub(crate) mod tap;
