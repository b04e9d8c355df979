pub mod local;
pub mod overlay;

pub use local::LocalVfs;
pub use overlay::OverlayVfs;
