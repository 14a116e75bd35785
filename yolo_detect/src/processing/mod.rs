pub mod draw;
pub mod post;
pub mod pre;

pub use pre::Letterbox;
