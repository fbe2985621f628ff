pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{fresh_serial, seeded_bytes};
