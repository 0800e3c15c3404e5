mod core;

pub(crate) use self::core::WeakDelayedCall;
pub use self::core::{DelayOptions, DelayUnit, DelayedCall};
