#![doc = env!("CARGO_PKG_DESCRIPTION")]

#[doc(inline)]
pub use nerfkit_rays as rays;

#[doc(inline)]
pub use nerfkit_field as field;

#[doc(inline)]
pub use nerfkit_train as train;
