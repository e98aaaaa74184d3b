pub mod camera;
pub mod config;
pub mod encode;
pub mod error;
pub mod events;
pub mod storage;
pub mod processing {
    pub mod compose;
    pub mod layout;
    pub mod resample;
    pub mod resize;
    pub mod slots;
}
pub mod tasks {
    pub mod artifacts;
    pub mod session;
}

pub use error::{Error, Result};
