pub mod alloc;
pub mod platform;
pub mod region;

pub use platform::{Platform, SystemPlatform};
pub use region::SharedRegion;
