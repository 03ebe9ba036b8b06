pub mod center;
pub mod none;

pub use center::CenterBackend;
pub use none::NoneBackend;
