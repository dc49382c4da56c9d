pub mod before_image;
pub mod locks;
pub mod manager;
