//! Wire-level pieces of the TFT conversation: frame decoding, the dialect
//! formatting table and the opening-frame classifier.

pub mod classifier;
pub mod dialect;
pub mod frame;

pub use classifier::{Classifier, Verdict};
pub use dialect::{Dialect, DialectSetting, ACKNOWLEDGEMENT};
pub use frame::{Frame, GcodeCommand};
