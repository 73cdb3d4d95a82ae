pub mod overlay;
pub mod surface;

pub use overlay::OverlayStyle;
pub use surface::Surface;
