#[doc(hidden)]
pub mod test_support;
