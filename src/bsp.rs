mod hpmicro;

pub use hpmicro::*;
