#[cfg(feature = "atomic")]
mod atomic;
mod error;
mod interface;
#[cfg(feature = "lock")]
mod lock;
#[cfg(feature = "sqlite")]
mod sqlite;
mod sync;

#[cfg_attr(docsrs, doc(cfg(feature = "atomic")))]
#[cfg(feature = "atomic")]
pub use atomic::*;
pub use error::*;
pub use interface::*;
#[cfg_attr(docsrs, doc(cfg(feature = "lock")))]
#[cfg(feature = "lock")]
pub use lock::*;
#[cfg_attr(docsrs, doc(cfg(feature = "sqlite")))]
#[cfg(feature = "sqlite")]
pub use sqlite::*;
