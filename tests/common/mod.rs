#![allow(dead_code, unused_imports)]

pub use serverwrap_test_utils::builders;
pub use serverwrap_test_utils::{init_tracing, with_timeout, RecordingSink};
