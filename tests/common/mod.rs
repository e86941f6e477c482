#![allow(dead_code)] // Each integration test binary uses a different subset

pub mod builders;
pub mod fakes;
pub mod strategies;

pub use builders::*;
pub use fakes::*;
