pub mod text;
pub use text::{hex_prefix, trim_and_truncate};
