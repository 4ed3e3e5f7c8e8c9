#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod allocator;
mod backfill;
mod entity;
mod error;
mod key;
mod reference;
mod store;

pub use crate::allocator::*;
pub use crate::backfill::*;
pub use crate::entity::*;
pub use crate::error::*;
pub use crate::key::*;
pub use crate::reference::*;
pub use crate::store::*;
