pub mod client;
pub mod gallery;
pub mod media;
pub mod serve;
pub mod session;
pub mod slideshow;
pub mod upload;
pub mod viewer;
